//! Seam between the COS storager and the wire client.
//!
//! The storager only speaks these traits. A [`Connector`] turns credentials
//! and an HTTP client into per-account and per-bucket clients; errors come
//! back already classified through [`CosError`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use polystore_common::{BackendErrorKind, Error, Result};

use crate::iowrap::Reader;

/// Header carrying an object's storage class.
pub const STORAGE_CLASS_HEADER: &str = "x-cos-storage-class";

/// Secret id / secret key pair used to sign requests.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    pub secret_id: String,
    pub secret_key: String,
}

impl Credentials {
    pub fn new(secret_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            secret_id: secret_id.into(),
            secret_key: secret_key.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("secret_id", &self.secret_id)
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

/// Error response returned by the service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct CosError {
    pub code: String,
    pub message: String,
    pub request_id: Option<String>,
}

impl CosError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            request_id: None,
        }
    }

    pub fn kind(&self) -> BackendErrorKind {
        match self.code.as_str() {
            "NoSuchKey" | "NoSuchBucket" | "NoSuchUpload" => BackendErrorKind::NotFound,
            "AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch" => {
                BackendErrorKind::PermissionDenied
            }
            "BucketAlreadyExists" | "BucketAlreadyOwnedByYou" => BackendErrorKind::AlreadyExists,
            "RequestTimeout" => BackendErrorKind::Timeout,
            "SlowDown" | "TooManyRequests" => BackendErrorKind::RateLimited,
            _ => BackendErrorKind::Unexpected,
        }
    }
}

impl From<CosError> for Error {
    fn from(err: CosError) -> Self {
        Error::backend(err.kind(), err)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListObjectsRequest {
    pub prefix: String,
    /// Roll keys up to the first delimiter after the prefix into common prefixes.
    pub delimiter: Option<String>,
    /// List keys after this one.
    pub marker: String,
    pub max_keys: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub etag: String,
    /// ISO-8601 with a `Z` suffix, as the service sends it.
    pub last_modified: String,
    pub storage_class: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListObjectsOutput {
    pub contents: Vec<ObjectSummary>,
    pub common_prefixes: Vec<String>,
    pub next_marker: String,
    pub is_truncated: bool,
}

#[derive(Debug, Clone, Default)]
pub struct HeadObjectOutput {
    pub content_length: u64,
    pub headers: HeaderMap,
}

/// Byte window of a ranged GET.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub offset: u64,
    /// Open-ended when `None`. Never zero.
    pub size: Option<u64>,
}

impl ByteRange {
    /// Value of the `Range` header.
    pub fn header_value(&self) -> String {
        match self.size {
            Some(n) => {
                let last = self.offset.saturating_add(n.max(1) - 1);
                format!("bytes={}-{}", self.offset, last)
            }
            None => format!("bytes={}-", self.offset),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutObjectOptions {
    pub content_length: u64,
    pub content_md5: Option<String>,
    pub storage_class: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSummary {
    pub name: String,
    pub location: String,
}

/// Object and bucket calls scoped to one bucket.
#[async_trait]
pub trait BucketClient: Send + Sync {
    async fn list_objects(&self, req: &ListObjectsRequest) -> Result<ListObjectsOutput>;

    async fn head_object(&self, key: &str) -> Result<HeadObjectOutput>;

    async fn get_object(&self, key: &str, range: Option<ByteRange>) -> Result<Reader>;

    /// Upload exactly `opts.content_length` bytes from `body`.
    async fn put_object(&self, key: &str, body: Reader, opts: &PutObjectOptions) -> Result<()>;

    async fn delete_object(&self, key: &str) -> Result<()>;

    /// Server-side copy inside this bucket.
    async fn copy_object(&self, src_key: &str, dst_key: &str) -> Result<()>;

    async fn put_bucket(&self) -> Result<()>;

    async fn delete_bucket(&self) -> Result<()>;
}

/// Account-level calls.
#[async_trait]
pub trait ServiceClient: Send + Sync {
    async fn list_buckets(&self) -> Result<Vec<BucketSummary>>;
}

/// Builds wire clients for a set of credentials.
pub trait Connector: Send + Sync {
    fn service(&self, credentials: &Credentials, http: &reqwest::Client)
        -> Result<Arc<dyn ServiceClient>>;

    fn bucket(
        &self,
        credentials: &Credentials,
        http: &reqwest::Client,
        name: &str,
        location: &str,
    ) -> Result<Arc<dyn BucketClient>>;
}
