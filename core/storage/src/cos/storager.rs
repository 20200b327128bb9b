use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::header::{HeaderMap, CONTENT_TYPE, ETAG, LAST_MODIFIED};
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use polystore_common::{
    Error, Object, ObjectType, Op, PathResolver, Result, StorageError, StorageMeta,
};

use super::client::{
    BucketClient, ByteRange, ListObjectsRequest, ObjectSummary, PutObjectOptions,
    STORAGE_CLASS_HEADER,
};
use super::pairs::{
    BasicOptions, ListDirOptions, ListPrefixOptions, ReadOptions, StorageNewOptions, WriteOptions,
};
use super::{set_storage_class, TYPE};
use crate::iowrap::{self, Reader};
use crate::pairs::Pair;
use crate::storager::{Copier, Mover, StorageResult, Storager};

/// Keys per listing page.
pub const LIST_PAGE_SIZE: usize = 200;

const DELIMITER: &str = "/";

/// `Last-Modified` header layout.
const HEAD_TIME_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// `LastModified` layout in listing responses.
const LIST_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

/// Storager bound to one COS bucket.
///
/// Keys are the working directory, minus its leading `/`, followed by the
/// logical path.
#[derive(Clone)]
pub struct Storage {
    bucket: Arc<dyn BucketClient>,
    name: String,
    location: String,
    work_dir: String,
    resolver: PathResolver,
}

impl Storage {
    pub(crate) fn new(bucket: Arc<dyn BucketClient>, opt: StorageNewOptions) -> Self {
        let work_dir = opt.work_dir.unwrap_or_else(|| "/".to_string());
        Self {
            bucket,
            name: opt.name,
            location: opt.location,
            resolver: PathResolver::new(&work_dir),
            work_dir,
        }
    }

    /// Bind to a bucket through an existing client.
    ///
    /// Requires `name` and `location`; accepts `work_dir`.
    pub fn with_client(bucket: Arc<dyn BucketClient>, pairs: Vec<Pair>) -> Result<Self> {
        Ok(Self::new(bucket, StorageNewOptions::parse(pairs)?))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub(crate) fn client(&self) -> &Arc<dyn BucketClient> {
        &self.bucket
    }

    fn format_error(&self, op: Op, err: Error, path: &[&str]) -> StorageError {
        StorageError::new(op, self, path, err)
    }

    fn file_object(&self, v: &ObjectSummary) -> Result<Object> {
        let mut o = Object::new(
            v.key.as_str(),
            self.resolver.to_logical(&v.key),
            ObjectType::File,
        );
        o.size = v.size;
        if !v.last_modified.is_empty() {
            o.updated_at = Some(parse_list_time(&v.last_modified)?);
        }
        if !v.etag.is_empty() {
            o.meta.set_etag(v.etag.as_str());
        }
        if !v.storage_class.is_empty() {
            set_storage_class(&mut o.meta, v.storage_class.as_str());
        }
        Ok(o)
    }

    async fn metadata_inner(&self, pairs: Vec<Pair>) -> Result<StorageMeta> {
        let _opt = BasicOptions::parse(pairs)?;
        let mut meta = StorageMeta::new(self.name.as_str(), self.work_dir.as_str());
        meta.meta.insert("location".to_string(), self.location.clone());
        Ok(meta)
    }

    async fn stat_inner(&self, path: &str, pairs: Vec<Pair>) -> Result<Object> {
        let opt = BasicOptions::parse(pairs)?;
        let rp = self.resolver.to_absolute(path);

        let output = opt.context.run(self.bucket.head_object(&rp)).await?;

        let mut o = Object::new(rp.as_str(), path, ObjectType::File);
        o.size = output.content_length;
        apply_headers(&mut o, &output.headers)?;
        Ok(o)
    }

    async fn read_inner(&self, path: &str, pairs: Vec<Pair>) -> Result<Reader> {
        let opt = ReadOptions::parse(pairs)?;
        let rp = self.resolver.to_absolute(path);

        let reader = match (opt.offset, opt.size) {
            (_, Some(0)) => Box::new(tokio::io::empty()) as Reader,
            (None, None) => opt.context.run(self.bucket.get_object(&rp, None)).await?,
            (offset, size) => {
                let range = ByteRange {
                    offset: offset.unwrap_or(0),
                    size,
                };
                opt.context
                    .run(self.bucket.get_object(&rp, Some(range)))
                    .await?
            }
        };

        Ok(iowrap::with_callback(reader, opt.read_callback))
    }

    async fn write_inner(&self, path: &str, reader: Reader, pairs: Vec<Pair>) -> Result<()> {
        let opt = WriteOptions::parse(pairs)?;
        let rp = self.resolver.to_absolute(path);

        let body: Reader = Box::new(iowrap::with_callback(reader, opt.read_callback).take(opt.size));
        let put = PutObjectOptions {
            content_length: opt.size,
            content_md5: opt.checksum,
            storage_class: opt.storage_class,
        };

        opt.context
            .run(self.bucket.put_object(&rp, body, &put))
            .await?;
        debug!(key = %rp, bytes = opt.size, "put object");
        Ok(())
    }

    async fn delete_inner(&self, path: &str, pairs: Vec<Pair>) -> Result<()> {
        let opt = BasicOptions::parse(pairs)?;
        let rp = self.resolver.to_absolute(path);
        opt.context.run(self.bucket.delete_object(&rp)).await
    }

    async fn list_dir_inner(&self, path: &str, pairs: Vec<Pair>) -> Result<()> {
        let mut opt = ListDirOptions::parse(pairs)?;
        let rp = self.resolver.to_absolute(path);

        let mut req = ListObjectsRequest {
            prefix: rp,
            delimiter: Some(DELIMITER.to_string()),
            marker: String::new(),
            max_keys: LIST_PAGE_SIZE,
        };

        loop {
            let page = opt.context.run(self.bucket.list_objects(&req)).await?;

            if let Some(f) = opt.dir_func.as_mut() {
                for prefix in &page.common_prefixes {
                    f(Object::new(
                        prefix.as_str(),
                        self.resolver.to_logical(prefix),
                        ObjectType::Dir,
                    ));
                }
            }

            if let Some(f) = opt.file_func.as_mut() {
                for v in &page.contents {
                    f(self.file_object(v)?);
                }
            }

            if !page.is_truncated {
                break;
            }
            req.marker = next_marker(&page.next_marker, &page.contents, &page.common_prefixes)?;
        }
        Ok(())
    }

    async fn list_prefix_inner(&self, prefix: &str, pairs: Vec<Pair>) -> Result<()> {
        let mut opt = ListPrefixOptions::parse(pairs)?;
        let rp = self.resolver.to_absolute(prefix);

        let mut req = ListObjectsRequest {
            prefix: rp,
            delimiter: None,
            marker: String::new(),
            max_keys: LIST_PAGE_SIZE,
        };

        loop {
            let page = opt.context.run(self.bucket.list_objects(&req)).await?;
            for v in &page.contents {
                (opt.object_func)(self.file_object(v)?);
            }

            if !page.is_truncated {
                break;
            }
            req.marker = next_marker(&page.next_marker, &page.contents, &[])?;
        }
        Ok(())
    }

    async fn copy_inner(&self, src: &str, dst: &str, pairs: Vec<Pair>) -> Result<()> {
        let opt = BasicOptions::parse(pairs)?;
        let (rs, rd) = (self.resolver.to_absolute(src), self.resolver.to_absolute(dst));
        opt.context.run(self.bucket.copy_object(&rs, &rd)).await
    }

    async fn rename_inner(&self, src: &str, dst: &str, pairs: Vec<Pair>) -> Result<()> {
        let opt = BasicOptions::parse(pairs)?;
        let (rs, rd) = (self.resolver.to_absolute(src), self.resolver.to_absolute(dst));

        opt.context.run(self.bucket.copy_object(&rs, &rd)).await?;

        if let Err(e) = opt.context.run(self.bucket.delete_object(&rs)).await {
            warn!(src = %rs, dst = %rd, error = %e, "copied but failed to delete source");
            return Err(e);
        }
        Ok(())
    }
}

/// Marker for the page after a truncated one.
///
/// The service only sends `NextMarker` for delimited listings; otherwise the
/// last key of the page is used.
fn next_marker(next: &str, contents: &[ObjectSummary], prefixes: &[String]) -> Result<String> {
    if !next.is_empty() {
        return Ok(next.to_string());
    }
    let last_key = contents.last().map(|v| v.key.as_str());
    let last_prefix = prefixes.last().map(String::as_str);
    match last_key.max(last_prefix) {
        Some(marker) => Ok(marker.to_string()),
        None => Err(Error::unexpected("truncated listing without a marker")),
    }
}

fn apply_headers(o: &mut Object, headers: &HeaderMap) -> Result<()> {
    if let Some(v) = header_str(headers, LAST_MODIFIED.as_str())? {
        o.updated_at = Some(parse_head_time(v)?);
    }
    if let Some(v) = header_str(headers, CONTENT_TYPE.as_str())? {
        o.meta.set_content_type(v);
    }
    if let Some(v) = header_str(headers, ETAG.as_str())? {
        o.meta.set_etag(v);
    }
    if let Some(v) = header_str(headers, STORAGE_CLASS_HEADER)? {
        set_storage_class(&mut o.meta, v);
    }
    Ok(())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>> {
    match headers.get(name) {
        Some(v) => v
            .to_str()
            .map(Some)
            .map_err(|e| Error::unexpected(format!("header {}: {}", name, e))),
        None => Ok(None),
    }
}

fn parse_head_time(v: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(v, HEAD_TIME_FORMAT)
        .map(|t| t.and_utc())
        .map_err(|e| Error::unexpected(format!("parse last modified [{}]: {}", v, e)))
}

fn parse_list_time(v: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(v, LIST_TIME_FORMAT)
        .map(|t| t.and_utc())
        .map_err(|e| Error::unexpected(format!("parse last modified [{}]: {}", v, e)))
}

/// Render a timestamp the way `Last-Modified` carries it.
pub(crate) fn format_head_time(t: &DateTime<Utc>) -> String {
    t.format(HEAD_TIME_FORMAT).to_string()
}

pub(crate) fn format_list_time(t: &DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

impl fmt::Display for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Storager {} {{Name: {}, WorkDir: {}}}",
            TYPE, self.name, self.work_dir
        )
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("name", &self.name)
            .field("location", &self.location)
            .field("work_dir", &self.work_dir)
            .finish()
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
    /// Server-side copy followed by a delete of the source.
    ///
    /// If the delete fails both objects remain and the error is returned.
    async fn rename(&self, src: &str, dst: &str, pairs: Vec<Pair>) -> StorageResult<()> {
        self.rename_inner(src, dst, pairs)
            .await
            .map_err(|e| self.format_error(Op::Move, e, &[src, dst]))
    }
}
