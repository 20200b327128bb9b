//! The backend-agnostic storage contract.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info_span, Instrument};

use polystore_common::{Object, StorageError, StorageMeta};

use crate::context::Context;
use crate::iowrap::Reader;
use crate::pairs::Pair;

/// Result type returned by every storager and servicer operation.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Operations every storage backend supports.
///
/// Paths are logical: relative to the storager's working directory, with
/// `-` reserved for the process's stdin/stdout on backends that have them.
/// Each method validates its pairs before touching the backend and returns
/// a [`StorageError`] naming the operation and the paths involved.
///
/// Implementations must be usable from several tasks at once.
#[async_trait]
pub trait Storager: Send + Sync + fmt::Display + fmt::Debug {
    /// Describe this storage.
    async fn metadata(&self, pairs: Vec<Pair>) -> StorageResult<StorageMeta>;

    /// Look up a single object.
    ///
    /// # Errors
    /// A not-found backend error if nothing exists at `path`.
    async fn stat(&self, path: &str, pairs: Vec<Pair>) -> StorageResult<Object>;

    /// Open an object for reading.
    ///
    /// `offset` and `size` select a byte window when the backend supports
    /// them. The returned stream is owned by the caller.
    async fn read(&self, path: &str, pairs: Vec<Pair>) -> StorageResult<Reader>;

    /// Store everything read from `reader` at `path`, replacing any existing
    /// object.
    ///
    /// # Postconditions
    /// On success the object is fully written; a short source is an error.
    async fn write(&self, path: &str, reader: Reader, pairs: Vec<Pair>) -> StorageResult<()>;

    async fn delete(&self, path: &str, pairs: Vec<Pair>) -> StorageResult<()>;

    /// List the direct children of `path`, one callback per entry.
    ///
    /// Directories go to `dir_func`, everything else to `file_func`.
    async fn list_dir(&self, path: &str, pairs: Vec<Pair>) -> StorageResult<()>;

    /// List every object whose path starts with `prefix`, one `object_func`
    /// call per object.
    async fn list_prefix(&self, prefix: &str, pairs: Vec<Pair>) -> StorageResult<()>;

    /// Server-side copy, if the backend has one.
    fn copier(&self) -> Option<&dyn Copier> {
        None
    }

    /// Move, if the backend has one.
    fn mover(&self) -> Option<&dyn Mover> {
        None
    }

    async fn metadata_with_context(
        &self,
        ctx: Context,
        mut pairs: Vec<Pair>,
    ) -> StorageResult<StorageMeta> {
        pairs.push(Pair::Context(ctx));
        let span = info_span!("metadata", storager = %self);
        self.metadata(pairs).instrument(span).await
    }

    async fn stat_with_context(
        &self,
        ctx: Context,
        path: &str,
        mut pairs: Vec<Pair>,
    ) -> StorageResult<Object> {
        pairs.push(Pair::Context(ctx));
        let span = info_span!("stat", storager = %self, path);
        self.stat(path, pairs).instrument(span).await
    }

    async fn read_with_context(
        &self,
        ctx: Context,
        path: &str,
        mut pairs: Vec<Pair>,
    ) -> StorageResult<Reader> {
        pairs.push(Pair::Context(ctx));
        let span = info_span!("read", storager = %self, path);
        self.read(path, pairs).instrument(span).await
    }

    async fn write_with_context(
        &self,
        ctx: Context,
        path: &str,
        reader: Reader,
        mut pairs: Vec<Pair>,
    ) -> StorageResult<()> {
        pairs.push(Pair::Context(ctx));
        let span = info_span!("write", storager = %self, path);
        self.write(path, reader, pairs).instrument(span).await
    }

    async fn delete_with_context(
        &self,
        ctx: Context,
        path: &str,
        mut pairs: Vec<Pair>,
    ) -> StorageResult<()> {
        pairs.push(Pair::Context(ctx));
        let span = info_span!("delete", storager = %self, path);
        self.delete(path, pairs).instrument(span).await
    }

    async fn list_dir_with_context(
        &self,
        ctx: Context,
        path: &str,
        mut pairs: Vec<Pair>,
    ) -> StorageResult<()> {
        pairs.push(Pair::Context(ctx));
        let span = info_span!("list_dir", storager = %self, path);
        self.list_dir(path, pairs).instrument(span).await
    }

    async fn list_prefix_with_context(
        &self,
        ctx: Context,
        prefix: &str,
        mut pairs: Vec<Pair>,
    ) -> StorageResult<()> {
        pairs.push(Pair::Context(ctx));
        let span = info_span!("list_prefix", storager = %self, prefix);
        self.list_prefix(prefix, pairs).instrument(span).await
    }
}

/// Copy within one storage.
#[async_trait]
pub trait Copier: Send + Sync {
    /// Copy `src` to `dst`, overwriting `dst`.
    async fn copy(&self, src: &str, dst: &str, pairs: Vec<Pair>) -> StorageResult<()>;

    async fn copy_with_context(
        &self,
        ctx: Context,
        src: &str,
        dst: &str,
        mut pairs: Vec<Pair>,
    ) -> StorageResult<()> {
        pairs.push(Pair::Context(ctx));
        let span = info_span!("copy", src, dst);
        self.copy(src, dst, pairs).instrument(span).await
    }
}

/// Move within one storage.
#[async_trait]
pub trait Mover: Send + Sync {
    /// Move `src` to `dst`, overwriting `dst`. `src` is gone afterwards.
    async fn rename(&self, src: &str, dst: &str, pairs: Vec<Pair>) -> StorageResult<()>;

    async fn rename_with_context(
        &self,
        ctx: Context,
        src: &str,
        dst: &str,
        mut pairs: Vec<Pair>,
    ) -> StorageResult<()> {
        pairs.push(Pair::Context(ctx));
        let span = info_span!("move", src, dst);
        self.rename(src, dst, pairs).instrument(span).await
    }
}

/// Account-level operations of backends with named containers.
#[async_trait]
pub trait Servicer: Send + Sync + fmt::Display + fmt::Debug {
    /// Create a container and return a storager bound to it.
    async fn create(&self, name: &str, pairs: Vec<Pair>) -> StorageResult<Arc<dyn Storager>>;

    async fn delete(&self, name: &str, pairs: Vec<Pair>) -> StorageResult<()>;

    /// Storager for an existing container.
    async fn get(&self, name: &str, pairs: Vec<Pair>) -> StorageResult<Arc<dyn Storager>>;

    /// Call `storager_func` once per container.
    async fn list(&self, pairs: Vec<Pair>) -> StorageResult<()>;

    async fn create_with_context(
        &self,
        ctx: Context,
        name: &str,
        mut pairs: Vec<Pair>,
    ) -> StorageResult<Arc<dyn Storager>> {
        pairs.push(Pair::Context(ctx));
        let span = info_span!("create", servicer = %self, name);
        self.create(name, pairs).instrument(span).await
    }

    async fn delete_with_context(
        &self,
        ctx: Context,
        name: &str,
        mut pairs: Vec<Pair>,
    ) -> StorageResult<()> {
        pairs.push(Pair::Context(ctx));
        let span = info_span!("delete", servicer = %self, name);
        self.delete(name, pairs).instrument(span).await
    }

    async fn get_with_context(
        &self,
        ctx: Context,
        name: &str,
        mut pairs: Vec<Pair>,
    ) -> StorageResult<Arc<dyn Storager>> {
        pairs.push(Pair::Context(ctx));
        let span = info_span!("get", servicer = %self, name);
        self.get(name, pairs).instrument(span).await
    }

    async fn list_with_context(&self, ctx: Context, mut pairs: Vec<Pair>) -> StorageResult<()> {
        pairs.push(Pair::Context(ctx));
        let span = info_span!("list", servicer = %self);
        self.list(pairs).instrument(span).await
    }
}
