//! Filesystem access behind the fs storager.

use std::fmt;
use std::fs::{FileType, Metadata};
use std::io;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncSeek};

use polystore_common::ObjectType;

use crate::iowrap::Writer;

/// What kind of node a path points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Dir,
    NamedPipe,
    Socket,
    CharDevice,
    BlockDevice,
    /// A link seen in a directory listing.
    Symlink,
    Other,
}

impl FileKind {
    /// Object type reported for this kind of node.
    pub fn object_type(&self) -> ObjectType {
        match self {
            Self::File => ObjectType::File,
            Self::Dir => ObjectType::Dir,
            Self::NamedPipe | Self::Socket | Self::CharDevice | Self::BlockDevice => {
                ObjectType::Stream
            }
            Self::Symlink | Self::Other => ObjectType::Invalid,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    pub kind: FileKind,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DirEntry {
    pub name: String,
    pub info: FileInfo,
}

/// Seekable read stream.
pub trait SeekRead: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin> SeekRead for T {}

/// The filesystem calls the fs storager needs.
#[async_trait]
pub trait FileSystem: Send + Sync + fmt::Debug {
    /// Stat `path`, following links.
    async fn stat(&self, path: &Path) -> io::Result<FileInfo>;

    /// Entries of a directory, sorted by name. Links are not followed.
    async fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>>;

    async fn open(&self, path: &Path) -> io::Result<Box<dyn SeekRead>>;

    /// Create or truncate a file for writing.
    async fn create(&self, path: &Path) -> io::Result<Writer>;

    async fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Remove a file, or a directory if it is empty.
    async fn remove(&self, path: &Path) -> io::Result<()>;

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
}

/// The local filesystem, through `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

#[async_trait]
impl FileSystem for OsFileSystem {
    async fn stat(&self, path: &Path) -> io::Result<FileInfo> {
        let meta = tokio::fs::metadata(path).await?;
        Ok(file_info(&meta))
    }

    async fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(path).await?;

        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            // Links are reported as themselves, never followed.
            let info = file_info(&entry.metadata().await?);
            entries.push(DirEntry { name, info });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn open(&self, path: &Path) -> io::Result<Box<dyn SeekRead>> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Box::new(file))
    }

    async fn create(&self, path: &Path) -> io::Result<Writer> {
        let file = tokio::fs::File::create(path).await?;
        Ok(Box::new(file))
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        let meta = tokio::fs::symlink_metadata(path).await?;
        if meta.is_dir() {
            tokio::fs::remove_dir(path).await
        } else {
            tokio::fs::remove_file(path).await
        }
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        tokio::fs::rename(from, to).await
    }
}

fn file_info(meta: &Metadata) -> FileInfo {
    FileInfo {
        kind: file_kind(meta.file_type()),
        size: meta.len(),
        modified: meta.modified().ok().map(DateTime::<Utc>::from),
    }
}

#[cfg(unix)]
fn file_kind(ft: FileType) -> FileKind {
    use std::os::unix::fs::FileTypeExt;

    if ft.is_dir() {
        FileKind::Dir
    } else if ft.is_file() {
        FileKind::File
    } else if ft.is_fifo() {
        FileKind::NamedPipe
    } else if ft.is_socket() {
        FileKind::Socket
    } else if ft.is_char_device() {
        FileKind::CharDevice
    } else if ft.is_block_device() {
        FileKind::BlockDevice
    } else if ft.is_symlink() {
        FileKind::Symlink
    } else {
        FileKind::Other
    }
}

#[cfg(not(unix))]
fn file_kind(ft: FileType) -> FileKind {
    if ft.is_dir() {
        FileKind::Dir
    } else if ft.is_file() {
        FileKind::File
    } else if ft.is_symlink() {
        FileKind::Symlink
    } else {
        FileKind::Other
    }
}
