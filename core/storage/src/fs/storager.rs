use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use polystore_common::{
    Object, ObjectType, Op, Result, StorageError, StorageMeta, STDIO_PATH,
};

use super::pairs::{
    BasicOptions, ListDirOptions, ListPrefixOptions, NewOptions, ReadOptions, WriteOptions,
};
use super::sys::{FileInfo, FileKind, FileSystem, OsFileSystem};
use super::TYPE;
use crate::context::Context;
use crate::iowrap::{self, Reader};
use crate::pairs::Pair;
use crate::storager::{Copier, Mover, StorageResult, Storager};

/// Storager over a directory tree of a local filesystem.
///
/// Logical paths are joined onto the working directory with the host's
/// path rules. `-` reads stdin and writes stdout.
#[derive(Debug, Clone)]
pub struct Storage {
    work_dir: String,
    fs: Arc<dyn FileSystem>,
}

impl Storage {
    /// Storager on the local filesystem.
    ///
    /// Accepts `work_dir`; unrelated pairs are ignored.
    pub fn new(pairs: Vec<Pair>) -> Result<Self> {
        Self::with_file_system(Arc::new(OsFileSystem), pairs)
    }

    pub fn with_file_system(fs: Arc<dyn FileSystem>, pairs: Vec<Pair>) -> Result<Self> {
        let opt = NewOptions::parse(pairs)?;
        Ok(Self {
            work_dir: opt.work_dir.unwrap_or_default(),
            fs,
        })
    }

    pub fn work_dir(&self) -> &str {
        &self.work_dir
    }

    fn abs_path(&self, path: &str) -> PathBuf {
        Path::new(&self.work_dir).join(path.trim_start_matches('/'))
    }

    fn format_error(&self, op: Op, err: polystore_common::Error, path: &[&str]) -> StorageError {
        StorageError::new(op, self, path, err)
    }

    async fn ensure_parent(&self, ctx: &Context, path: &Path) -> Result<()> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                ctx.run(async { Ok(self.fs.create_dir_all(parent).await?) })
                    .await
            }
            _ => Ok(()),
        }
    }

    fn to_object(&self, id: &Path, name: String, info: &FileInfo) -> Object {
        let mut o = Object::new(id.to_string_lossy(), name, info.kind.object_type());
        o.size = info.size;
        o.updated_at = info.modified;
        o
    }

    async fn metadata_inner(&self, pairs: Vec<Pair>) -> Result<StorageMeta> {
        let _opt = BasicOptions::parse(pairs)?;
        Ok(StorageMeta::new("", self.work_dir.as_str()))
    }

    async fn stat_inner(&self, path: &str, pairs: Vec<Pair>) -> Result<Object> {
        let opt = BasicOptions::parse(pairs)?;

        if path == STDIO_PATH {
            return Ok(Object::new(STDIO_PATH, STDIO_PATH, ObjectType::Stream));
        }

        let rp = self.abs_path(path);
        let info = opt
            .context
            .run(async { Ok(self.fs.stat(&rp).await?) })
            .await?;

        Ok(self.to_object(&rp, path.to_string(), &info))
    }

    async fn read_inner(&self, path: &str, pairs: Vec<Pair>) -> Result<Reader> {
        let opt = ReadOptions::parse(pairs)?;

        let reader = if path == STDIO_PATH {
            // Stdin cannot seek, so only size applies.
            iowrap::limit(tokio::io::stdin(), opt.size)
        } else {
            let rp = self.abs_path(path);
            opt.context
                .run(async {
                    let file = self.fs.open(&rp).await?;
                    Ok(iowrap::section(file, opt.offset, opt.size).await?)
                })
                .await?
        };

        Ok(iowrap::with_callback(reader, opt.read_callback))
    }

    async fn write_inner(&self, path: &str, reader: Reader, pairs: Vec<Pair>) -> Result<()> {
        let opt = WriteOptions::parse(pairs)?;
        let ctx = opt.context;
        let mut reader = iowrap::with_callback(reader, opt.read_callback);

        if path == STDIO_PATH {
            let mut stdout = tokio::io::stdout();
            ctx.run(async { Ok(iowrap::copy(&mut reader, &mut stdout, opt.size).await?) })
                .await?;
            return Ok(());
        }

        let rp = self.abs_path(path);
        self.ensure_parent(&ctx, &rp).await?;

        let written = ctx
            .run(async {
                let mut file = self.fs.create(&rp).await?;
                let written = iowrap::copy(&mut reader, &mut file, opt.size).await?;
                file.shutdown().await?;
                Ok(written)
            })
            .await?;

        debug!(path = %rp.display(), bytes = written, "wrote file");
        Ok(())
    }

    async fn delete_inner(&self, path: &str, pairs: Vec<Pair>) -> Result<()> {
        let opt = BasicOptions::parse(pairs)?;
        let rp = self.abs_path(path);
        opt.context
            .run(async { Ok(self.fs.remove(&rp).await?) })
            .await
    }

    async fn list_dir_inner(&self, path: &str, pairs: Vec<Pair>) -> Result<()> {
        let mut opt = ListDirOptions::parse(pairs)?;
        let rp = self.abs_path(path);

        let entries = opt
            .context
            .run(async { Ok(self.fs.read_dir(&rp).await?) })
            .await?;

        for entry in entries {
            let func = if entry.info.kind == FileKind::Dir {
                opt.dir_func.as_mut()
            } else {
                opt.file_func.as_mut()
            };
            if let Some(f) = func {
                let name = Path::new(path).join(&entry.name);
                f(self.to_object(
                    &rp.join(&entry.name),
                    name.to_string_lossy().into_owned(),
                    &entry.info,
                ));
            }
        }
        Ok(())
    }

    async fn list_prefix_inner(&self, prefix: &str, pairs: Vec<Pair>) -> Result<()> {
        let mut opt = ListPrefixOptions::parse(pairs)?;

        // Start from the deepest directory the prefix names.
        let root = match prefix.rfind('/') {
            Some(i) => &prefix[..=i],
            None => "",
        };

        let mut pending = vec![root.to_string()];
        while let Some(dir) = pending.pop() {
            let rp = self.abs_path(&dir);
            let entries = match opt
                .context
                .run(async { Ok(self.fs.read_dir(&rp).await?) })
                .await
            {
                Ok(entries) => entries,
                // Nothing matches a prefix under a missing directory.
                Err(e) if e.is_not_found() && dir == root => return Ok(()),
                Err(e) => return Err(e),
            };

            let mut subdirs = Vec::new();
            for entry in entries {
                let name = format!("{}{}", dir, entry.name);
                if entry.info.kind == FileKind::Dir {
                    let child = format!("{}/", name);
                    if child.starts_with(prefix) || prefix.starts_with(&child) {
                        subdirs.push(child);
                    }
                    continue;
                }
                if name.starts_with(prefix) {
                    (opt.object_func)(self.to_object(&rp.join(&entry.name), name, &entry.info));
                }
            }
            pending.extend(subdirs.into_iter().rev());
        }
        Ok(())
    }

    async fn copy_inner(&self, src: &str, dst: &str, pairs: Vec<Pair>) -> Result<()> {
        let opt = BasicOptions::parse(pairs)?;
        let ctx = opt.context;
        let (rs, rd) = (self.abs_path(src), self.abs_path(dst));

        self.ensure_parent(&ctx, &rd).await?;

        ctx.run(async {
            let mut from = self.fs.open(&rs).await?;
            let mut to = self.fs.create(&rd).await?;
            iowrap::copy(&mut from, &mut to, None).await?;
            to.shutdown().await?;
            Ok(())
        })
        .await
    }

    async fn rename_inner(&self, src: &str, dst: &str, pairs: Vec<Pair>) -> Result<()> {
        let opt = BasicOptions::parse(pairs)?;
        let ctx = opt.context;
        let (rs, rd) = (self.abs_path(src), self.abs_path(dst));

        self.ensure_parent(&ctx, &rd).await?;

        ctx.run(async { Ok(self.fs.rename(&rs, &rd).await?) }).await
    }
}

impl fmt::Display for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Storager {} {{WorkDir: {}}}", TYPE, self.work_dir)
    }
}

#[async_trait]
impl Storager for Storage {
    async fn metadata(&self, pairs: Vec<Pair>) -> StorageResult<StorageMeta> {
        self.metadata_inner(pairs)
            .await
            .map_err(|e| self.format_error(Op::Metadata, e, &[]))
    }

    async fn stat(&self, path: &str, pairs: Vec<Pair>) -> StorageResult<Object> {
        self.stat_inner(path, pairs)
            .await
            .map_err(|e| self.format_error(Op::Stat, e, &[path]))
    }

    async fn read(&self, path: &str, pairs: Vec<Pair>) -> StorageResult<Reader> {
        self.read_inner(path, pairs)
            .await
            .map_err(|e| self.format_error(Op::Read, e, &[path]))
    }

    async fn write(&self, path: &str, reader: Reader, pairs: Vec<Pair>) -> StorageResult<()> {
        self.write_inner(path, reader, pairs)
            .await
            .map_err(|e| self.format_error(Op::Write, e, &[path]))
    }

    async fn delete(&self, path: &str, pairs: Vec<Pair>) -> StorageResult<()> {
        self.delete_inner(path, pairs)
            .await
            .map_err(|e| self.format_error(Op::Delete, e, &[path]))
    }

    async fn list_dir(&self, path: &str, pairs: Vec<Pair>) -> StorageResult<()> {
        self.list_dir_inner(path, pairs)
            .await
            .map_err(|e| self.format_error(Op::ListDir, e, &[path]))
    }

    async fn list_prefix(&self, prefix: &str, pairs: Vec<Pair>) -> StorageResult<()> {
        self.list_prefix_inner(prefix, pairs)
            .await
            .map_err(|e| self.format_error(Op::ListPrefix, e, &[prefix]))
    }

    fn copier(&self) -> Option<&dyn Copier> {
        Some(self)
    }

    fn mover(&self) -> Option<&dyn Mover> {
        Some(self)
    }
}

#[async_trait]
impl Copier for Storage {
    async fn copy(&self, src: &str, dst: &str, pairs: Vec<Pair>) -> StorageResult<()> {
        self.copy_inner(src, dst, pairs)
            .await
            .map_err(|e| self.format_error(Op::Copy, e, &[src, dst]))
    }
}

#[async_trait]
impl Mover for Storage {
    async fn rename(&self, src: &str, dst: &str, pairs: Vec<Pair>) -> StorageResult<()> {
        self.rename_inner(src, dst, pairs)
            .await
            .map_err(|e| self.format_error(Op::Move, e, &[src, dst]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::sys::{DirEntry, SeekRead};
    use crate::iowrap::Writer;
    use crate::pairs::{with_offset, with_size, with_work_dir};
    use async_trait::async_trait;
    use polystore_common::{Error, ErrorCategory};
    use std::io;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    fn storage(tmp: &TempDir) -> Storage {
        Storage::new(vec![with_work_dir(tmp.path().to_string_lossy())]).unwrap()
    }

    fn bytes(data: &[u8]) -> Reader {
        Box::new(io::Cursor::new(data.to_vec()))
    }

    /// Reports every path as a fixed kind, fails everything else.
    #[derive(Debug)]
    struct FixedKind(FileKind);

    #[async_trait]
    impl FileSystem for FixedKind {
        async fn stat(&self, _path: &Path) -> io::Result<FileInfo> {
            Ok(FileInfo {
                kind: self.0,
                size: 0,
                modified: None,
            })
        }
        async fn read_dir(&self, _path: &Path) -> io::Result<Vec<DirEntry>> {
            Err(io::ErrorKind::Unsupported.into())
        }
        async fn open(&self, _path: &Path) -> io::Result<Box<dyn SeekRead>> {
            Err(io::ErrorKind::Unsupported.into())
        }
        async fn create(&self, _path: &Path) -> io::Result<Writer> {
            Err(io::ErrorKind::Unsupported.into())
        }
        async fn create_dir_all(&self, _path: &Path) -> io::Result<()> {
            Err(io::ErrorKind::Unsupported.into())
        }
        async fn remove(&self, _path: &Path) -> io::Result<()> {
            Err(io::ErrorKind::Unsupported.into())
        }
        async fn rename(&self, _from: &Path, _to: &Path) -> io::Result<()> {
            Err(io::ErrorKind::Unsupported.into())
        }
    }

    #[test]
    fn test_display() {
        let s = Storage::new(vec![with_work_dir("/data")]).unwrap();
        assert_eq!(s.to_string(), "Storager fs {WorkDir: /data}");
    }

    #[test]
    fn test_abs_path_stays_under_work_dir() {
        let s = Storage::new(vec![with_work_dir("/data")]).unwrap();
        assert_eq!(s.abs_path("a/b"), PathBuf::from("/data/a/b"));
        assert_eq!(s.abs_path("/etc/passwd"), PathBuf::from("/data/etc/passwd"));
    }

    #[tokio::test]
    async fn test_stat_stdio_without_touching_disk() {
        let s = Storage::with_file_system(Arc::new(FixedKind(FileKind::Other)), vec![]).unwrap();
        let o = s.stat(STDIO_PATH, vec![]).await.unwrap();
        assert_eq!(o.object_type, ObjectType::Stream);
        assert_eq!(o.name, "-");
    }

    #[tokio::test]
    async fn test_stat_classifies_special_files() {
        for (kind, expected) in [
            (FileKind::NamedPipe, ObjectType::Stream),
            (FileKind::CharDevice, ObjectType::Stream),
            (FileKind::Symlink, ObjectType::Invalid),
            (FileKind::Dir, ObjectType::Dir),
        ] {
            let s = Storage::with_file_system(Arc::new(FixedKind(kind)), vec![]).unwrap();
            let o = s.stat("node", vec![]).await.unwrap();
            assert_eq!(o.object_type, expected, "{:?}", kind);
        }
    }

    #[tokio::test]
    async fn test_write_then_read_window() {
        let tmp = TempDir::new().unwrap();
        let s = storage(&tmp);

        s.write("nested/dir/f.txt", bytes(b"0123456789"), vec![with_size(10)])
            .await
            .unwrap();

        let mut r = s
            .read("nested/dir/f.txt", vec![with_offset(2), with_size(3)])
            .await
            .unwrap();
        let mut out = String::new();
        r.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "234");
    }

    #[tokio::test]
    async fn test_write_short_source_is_error() {
        let tmp = TempDir::new().unwrap();
        let s = storage(&tmp);

        let err = s
            .write("short", bytes(b"abc"), vec![with_size(10)])
            .await
            .unwrap_err();
        assert_eq!(err.op, Op::Write);
        assert_eq!(err.category(), ErrorCategory::Backend);
    }

    #[tokio::test]
    async fn test_unsupported_pair_wrapped_once() {
        let tmp = TempDir::new().unwrap();
        let s = storage(&tmp);

        let err = s.delete("x", vec![with_size(1)]).await.unwrap_err();
        assert_eq!(err.op, Op::Delete);
        assert_eq!(err.path, vec!["x".to_string()]);
        assert!(matches!(err.error(), Error::PairUnsupported("size")));
        assert!(err.backend.starts_with("Storager fs"));
    }

    #[tokio::test]
    async fn test_cancelled_context_stops_stat() {
        let tmp = TempDir::new().unwrap();
        let s = storage(&tmp);
        let ctx = Context::new();
        ctx.cancel();

        let err = s.stat_with_context(ctx, "x", vec![]).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Cancellation);
    }
}
