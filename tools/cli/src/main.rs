//! Polystore CLI - Command line access to any configured storage backend.
//!
//! Every subcommand opens one storager from a JSON config file and/or flags,
//! then runs a single operation against it.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use polystore_common::{Object, ObjectType};
use polystore_storage::pairs::{
    with_dir_func, with_file_func, with_object_func, with_offset, with_size,
};
use polystore_storage::{Context as OpContext, Reader, Registry, StorageConfig, Storager};

const CONFIG_FILE: &str = "config.json";

#[derive(Parser)]
#[command(name = "polystore")]
#[command(about = "Polystore - One interface over many storage backends")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Storage config file (default: <config dir>/polystore/config.json).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Backend type, e.g. "fs".
    #[arg(short = 't', long = "type", global = true)]
    backend: Option<String>,

    /// Working directory inside the storage.
    #[arg(short, long, global = true)]
    work_dir: Option<String>,

    /// Credential string such as "hmac:AK:SK" or "env".
    #[arg(long, global = true)]
    credential: Option<String>,

    /// Bucket or container name.
    #[arg(long, global = true)]
    name: Option<String>,

    /// Region or endpoint location.
    #[arg(long, global = true)]
    location: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show metadata of one object.
    Stat {
        path: String,

        /// Print the object as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Write an object's content to stdout.
    Cat {
        path: String,

        /// Start reading at this byte.
        #[arg(long)]
        offset: Option<u64>,

        /// Read at most this many bytes.
        #[arg(long)]
        size: Option<u64>,
    },

    /// Upload a local file ("-" for stdin).
    Put {
        /// Local source file.
        source: PathBuf,

        /// Destination path in the storage.
        dest: String,
    },

    /// Delete an object.
    Rm { path: String },

    /// Copy an object inside the storage.
    Cp { src: String, dst: String },

    /// Move an object inside the storage.
    Mv { src: String, dst: String },

    /// List one directory level.
    Ls {
        #[arg(default_value = "")]
        dir: String,
    },

    /// List every object under a prefix.
    Find {
        #[arg(default_value = "")]
        prefix: String,
    },

    /// Show storage metadata.
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(&cli)?;
    let storage = Registry::with_defaults()
        .open(&config)
        .with_context(|| format!("Failed to open {} storage", config.backend))?;
    debug!("Opened {}", storage);

    let ctx = OpContext::new();
    let on_interrupt = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        info!("Interrupted, cancelling (press Ctrl-C again to exit)");
        on_interrupt.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });

    let storage = storage.as_ref();
    match cli.command {
        Commands::Stat { path, json } => cmd_stat(storage, ctx, &path, json).await,

        Commands::Cat { path, offset, size } => cmd_cat(storage, ctx, &path, offset, size).await,

        Commands::Put { source, dest } => cmd_put(storage, ctx, &source, &dest).await,

        Commands::Rm { path } => cmd_rm(storage, ctx, &path).await,

        Commands::Cp { src, dst } => cmd_cp(storage, ctx, &src, &dst).await,

        Commands::Mv { src, dst } => cmd_mv(storage, ctx, &src, &dst).await,

        Commands::Ls { dir } => cmd_ls(storage, ctx, &dir).await,

        Commands::Find { prefix } => cmd_find(storage, ctx, &prefix).await,

        Commands::Info => cmd_info(storage, ctx).await,
    }
}

/// Build the storage config from the config file, then apply flag overrides.
fn load_config(cli: &Cli) -> Result<StorageConfig> {
    let path = cli.config.clone().or_else(|| {
        dirs::config_dir()
            .map(|d| d.join("polystore").join(CONFIG_FILE))
            .filter(|p| p.exists())
    });

    let mut config = match path {
        Some(path) => {
            debug!("Loading config from {}", path.display());
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            StorageConfig::from_json(&raw).context("Invalid config file")?
        }
        None => StorageConfig::new(""),
    };

    if let Some(v) = &cli.backend {
        config.backend = v.clone();
    }
    if let Some(v) = &cli.work_dir {
        config.work_dir = Some(v.clone());
    }
    if let Some(v) = &cli.credential {
        config.credential = Some(v.clone());
    }
    if let Some(v) = &cli.name {
        config.name = Some(v.clone());
    }
    if let Some(v) = &cli.location {
        config.location = Some(v.clone());
    }

    if config.backend.is_empty() {
        anyhow::bail!("No storage type given. Use --type or a config file");
    }
    Ok(config)
}

fn type_label(t: ObjectType) -> &'static str {
    match t {
        ObjectType::Dir => "[DIR] ",
        ObjectType::File => "[FILE]",
        ObjectType::Stream => "[STRM]",
        ObjectType::Invalid => "[????]",
    }
}

/// Collects objects handed to a listing callback.
fn collector() -> (Arc<Mutex<Vec<Object>>>, impl FnMut(Object) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let push = move |o: Object| {
        if let Ok(mut v) = sink.lock() {
            v.push(o);
        }
    };
    (seen, push)
}

fn drain(seen: Arc<Mutex<Vec<Object>>>) -> Vec<Object> {
    let out = match seen.lock() {
        Ok(mut v) => std::mem::take(&mut *v),
        Err(_) => Vec::new(),
    };
    out
}

/// Show one object.
async fn cmd_stat(storage: &dyn Storager, ctx: OpContext, path: &str, json: bool) -> Result<()> {
    let o = storage
        .stat_with_context(ctx, path, vec![])
        .await
        .context("Failed to stat object")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&o)?);
        return Ok(());
    }

    println!("{}", o.name);
    println!("  ID: {}", o.id);
    println!("  Type: {}", o.object_type);
    println!("  Size: {} bytes", o.size);
    if let Some(t) = o.updated_at {
        println!("  Updated: {}", t.to_rfc3339());
    }
    for (k, v) in o.meta.iter() {
        println!("  {}: {}", k, v);
    }

    Ok(())
}

/// Stream an object to stdout.
async fn cmd_cat(
    storage: &dyn Storager,
    ctx: OpContext,
    path: &str,
    offset: Option<u64>,
    size: Option<u64>,
) -> Result<()> {
    let mut pairs = Vec::new();
    if let Some(v) = offset {
        pairs.push(with_offset(v));
    }
    if let Some(v) = size {
        pairs.push(with_size(v));
    }

    let mut reader = storage
        .read_with_context(ctx.clone(), path, pairs)
        .await
        .context("Failed to read object")?;

    let mut stdout = tokio::io::stdout();
    let copied = copy_until_cancelled(&ctx, &mut reader, &mut stdout)
        .await
        .context("Failed to write to stdout")?;
    debug!("Wrote {} bytes", copied);

    Ok(())
}

/// Stream `reader` into `writer`, stopping as soon as `ctx` is cancelled.
async fn copy_until_cancelled<W>(ctx: &OpContext, reader: &mut Reader, writer: &mut W) -> Result<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let copied = ctx
        .run(async { Ok(tokio::io::copy(&mut *reader, &mut *writer).await?) })
        .await?;
    writer.flush().await?;
    Ok(copied)
}

/// Upload a local file.
async fn cmd_put(storage: &dyn Storager, ctx: OpContext, source: &Path, dest: &str) -> Result<()> {
    info!("Uploading {} to {}", source.display(), dest);

    if source == Path::new("-") {
        // Unknown length: only backends without a required size accept this.
        storage
            .write_with_context(ctx, dest, Box::new(tokio::io::stdin()), vec![])
            .await
            .context("Failed to write object")?;
        println!("Uploaded stdin to {}", dest);
        return Ok(());
    }

    let file = tokio::fs::File::open(source)
        .await
        .with_context(|| format!("Failed to open {}", source.display()))?;
    let size = file.metadata().await?.len();

    storage
        .write_with_context(ctx, dest, Box::new(file), vec![with_size(size)])
        .await
        .context("Failed to write object")?;

    println!("Uploaded {} ({} bytes)", dest, size);
    Ok(())
}

/// Delete an object.
async fn cmd_rm(storage: &dyn Storager, ctx: OpContext, path: &str) -> Result<()> {
    storage
        .delete_with_context(ctx, path, vec![])
        .await
        .context("Failed to delete object")?;

    println!("Deleted {}", path);
    Ok(())
}

/// Copy an object.
async fn cmd_cp(storage: &dyn Storager, ctx: OpContext, src: &str, dst: &str) -> Result<()> {
    let copier = storage
        .copier()
        .with_context(|| format!("{} does not support copy", storage))?;

    copier
        .copy_with_context(ctx, src, dst, vec![])
        .await
        .context("Failed to copy object")?;

    println!("Copied {} -> {}", src, dst);
    Ok(())
}

/// Move an object.
async fn cmd_mv(storage: &dyn Storager, ctx: OpContext, src: &str, dst: &str) -> Result<()> {
    let mover = storage
        .mover()
        .with_context(|| format!("{} does not support move", storage))?;

    mover
        .rename_with_context(ctx, src, dst, vec![])
        .await
        .context("Failed to move object")?;

    println!("Moved {} -> {}", src, dst);
    Ok(())
}

/// List one directory level.
async fn cmd_ls(storage: &dyn Storager, ctx: OpContext, dir: &str) -> Result<()> {
    let (dirs, on_dir) = collector();
    let (files, on_file) = collector();

    storage
        .list_dir_with_context(ctx, dir, vec![with_dir_func(on_dir), with_file_func(on_file)])
        .await
        .context("Failed to list directory")?;

    let dirs = drain(dirs);
    let files = drain(files);

    if dirs.is_empty() && files.is_empty() {
        println!("Directory is empty.");
        return Ok(());
    }

    for o in dirs {
        println!("  {} {}", type_label(o.object_type), o.name);
    }
    for o in files {
        println!("  {} {} ({} bytes)", type_label(o.object_type), o.name, o.size);
    }

    Ok(())
}

/// List everything under a prefix.
async fn cmd_find(storage: &dyn Storager, ctx: OpContext, prefix: &str) -> Result<()> {
    let (seen, on_object) = collector();

    storage
        .list_prefix_with_context(ctx, prefix, vec![with_object_func(on_object)])
        .await
        .context("Failed to list prefix")?;

    let objects = drain(seen);
    for o in &objects {
        println!("{}", o.name);
    }
    debug!("{} objects under {:?}", objects.len(), prefix);

    Ok(())
}

/// Show storage information.
async fn cmd_info(storage: &dyn Storager, ctx: OpContext) -> Result<()> {
    let meta = storage
        .metadata_with_context(ctx, vec![])
        .await
        .context("Failed to read storage metadata")?;

    println!("Storage information:");
    println!("  Backend: {}", storage);
    if !meta.name.is_empty() {
        println!("  Name: {}", meta.name);
    }
    println!("  Work dir: {}", meta.work_dir);
    for (k, v) in &meta.meta {
        println!("  {}: {}", k, v);
    }
    println!(
        "  Copy: {}",
        if storage.copier().is_some() { "yes" } else { "no" }
    );
    println!(
        "  Move: {}",
        if storage.mover().is_some() { "yes" } else { "no" }
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_copy_until_cancelled_copies_everything() {
        let mut reader: Reader = Box::new(std::io::Cursor::new(b"hello".to_vec()));
        let mut out = Vec::new();

        let copied = copy_until_cancelled(&OpContext::new(), &mut reader, &mut out)
            .await
            .unwrap();
        assert_eq!(copied, 5);
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn test_copy_until_cancelled_stops_stalled_stream() {
        // The writer half stays open, so reads never complete on their own.
        let (_tx, rx) = tokio::io::duplex(64);
        let mut reader: Reader = Box::new(rx);
        let mut out = Vec::new();

        let ctx = OpContext::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = copy_until_cancelled(&ctx, &mut reader, &mut out)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<polystore_storage::Error>(),
            Some(polystore_storage::Error::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_copy_until_cancelled_skips_cancelled_context() {
        let mut reader: Reader = Box::new(std::io::Cursor::new(b"unread".to_vec()));
        let mut out = Vec::new();
        let ctx = OpContext::new();
        ctx.cancel();

        assert!(copy_until_cancelled(&ctx, &mut reader, &mut out).await.is_err());
        assert!(out.is_empty());
    }
}
