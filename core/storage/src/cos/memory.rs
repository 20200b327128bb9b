//! In-process COS stand-in.
//!
//! Keeps buckets and objects in memory and answers with the same shapes and
//! error codes the service uses, including marker pagination. Useful for
//! tests and for running the CLI without an account.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, ETAG, LAST_MODIFIED};
use tokio::io::AsyncReadExt;
use uuid::Uuid;

use polystore_common::{Error, Result};

use super::client::{
    BucketClient, BucketSummary, ByteRange, Connector, CosError, Credentials, HeadObjectOutput,
    ListObjectsOutput, ListObjectsRequest, ObjectSummary, PutObjectOptions, ServiceClient,
    STORAGE_CLASS_HEADER,
};
use super::storager::{format_head_time, format_list_time};
use crate::iowrap::Reader;

const DEFAULT_STORAGE_CLASS: &str = "STANDARD";

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    etag: String,
    storage_class: String,
    last_modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Bucket {
    location: String,
    objects: BTreeMap<String, StoredObject>,
}

#[derive(Debug, Default)]
struct State {
    buckets: BTreeMap<String, Bucket>,
    list_requests: AtomicUsize,
    deny_deletes: AtomicBool,
    max_page: Option<usize>,
}

/// Connector backed by process memory.
///
/// Clones share the same buckets.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    state: Arc<RwLock<State>>,
    credentials: Option<Credentials>,
}

impl MemoryConnector {
    /// A connector with no buckets that accepts any credentials.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject clients built with any other credentials.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Cap every listing page at `n` keys.
    pub fn with_max_page(self, n: usize) -> Result<Self> {
        write_state(&self.state)?.max_page = Some(n.max(1));
        Ok(self)
    }

    /// Create a bucket up front.
    pub fn with_bucket(self, name: &str, location: &str) -> Result<Self> {
        write_state(&self.state)?.buckets.insert(
            name.to_string(),
            Bucket {
                location: location.to_string(),
                objects: BTreeMap::new(),
            },
        );
        Ok(self)
    }

    /// Number of listing requests served so far.
    pub fn list_requests(&self) -> Result<usize> {
        Ok(read_state(&self.state)?.list_requests.load(Ordering::SeqCst))
    }

    /// Make object deletes fail with `AccessDenied`.
    pub fn deny_deletes(&self, deny: bool) -> Result<()> {
        read_state(&self.state)?
            .deny_deletes
            .store(deny, Ordering::SeqCst);
        Ok(())
    }

    fn authorize(&self, credentials: &Credentials) -> Result<()> {
        match &self.credentials {
            Some(expected) if expected != credentials => {
                Err(CosError::new("InvalidAccessKeyId", "secret id does not match").into())
            }
            _ => Ok(()),
        }
    }
}

impl Connector for MemoryConnector {
    fn service(
        &self,
        credentials: &Credentials,
        _http: &reqwest::Client,
    ) -> Result<Arc<dyn ServiceClient>> {
        self.authorize(credentials)?;
        Ok(Arc::new(MemoryService {
            state: self.state.clone(),
        }))
    }

    fn bucket(
        &self,
        credentials: &Credentials,
        _http: &reqwest::Client,
        name: &str,
        location: &str,
    ) -> Result<Arc<dyn BucketClient>> {
        self.authorize(credentials)?;
        Ok(Arc::new(MemoryBucket {
            state: self.state.clone(),
            name: name.to_string(),
            location: location.to_string(),
        }))
    }
}

fn read_state(state: &RwLock<State>) -> Result<RwLockReadGuard<'_, State>> {
    state
        .read()
        .map_err(|_| Error::unexpected("memory bucket state poisoned"))
}

fn write_state(state: &RwLock<State>) -> Result<RwLockWriteGuard<'_, State>> {
    state
        .write()
        .map_err(|_| Error::unexpected("memory bucket state poisoned"))
}

struct MemoryService {
    state: Arc<RwLock<State>>,
}

#[async_trait]
impl ServiceClient for MemoryService {
    async fn list_buckets(&self) -> Result<Vec<BucketSummary>> {
        let state = read_state(&self.state)?;
        Ok(state
            .buckets
            .iter()
            .map(|(name, b)| BucketSummary {
                name: name.clone(),
                location: b.location.clone(),
            })
            .collect())
    }
}

struct MemoryBucket {
    state: Arc<RwLock<State>>,
    name: String,
    location: String,
}

impl MemoryBucket {
    fn no_such_bucket(&self) -> Error {
        CosError::new("NoSuchBucket", format!("bucket {} does not exist", self.name)).into()
    }

    fn no_such_key(key: &str) -> Error {
        CosError::new("NoSuchKey", format!("key {} does not exist", key)).into()
    }

    fn object(&self, key: &str) -> Result<StoredObject> {
        let state = read_state(&self.state)?;
        let bucket = state
            .buckets
            .get(&self.name)
            .ok_or_else(|| self.no_such_bucket())?;
        bucket
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| Self::no_such_key(key))
    }
}

#[async_trait]
impl BucketClient for MemoryBucket {
    async fn list_objects(&self, req: &ListObjectsRequest) -> Result<ListObjectsOutput> {
        let state = read_state(&self.state)?;
        state.list_requests.fetch_add(1, Ordering::SeqCst);

        let bucket = state
            .buckets
            .get(&self.name)
            .ok_or_else(|| self.no_such_bucket())?;

        let limit = match state.max_page {
            Some(max) => req.max_keys.min(max),
            None => req.max_keys,
        }
        .max(1);
        let delimiter = req.delimiter.as_deref().filter(|d| !d.is_empty());

        let mut out = ListObjectsOutput::default();
        let mut count = 0;
        let mut last = String::new();

        for (key, obj) in bucket.objects.range(req.prefix.clone()..) {
            if !key.starts_with(&req.prefix) {
                break;
            }
            if !req.marker.is_empty() {
                if key.as_str() <= req.marker.as_str() {
                    continue;
                }
                // A marker that is a rolled up prefix covers every key under it.
                if delimiter.is_some_and(|d| req.marker.ends_with(d))
                    && key.starts_with(&req.marker)
                {
                    continue;
                }
            }

            let common = delimiter.and_then(|d| {
                key[req.prefix.len()..]
                    .find(d)
                    .map(|i| key[..req.prefix.len() + i + d.len()].to_string())
            });
            if let Some(p) = &common {
                if out.common_prefixes.last() == Some(p) {
                    continue;
                }
            }

            if count == limit {
                out.is_truncated = true;
                break;
            }
            count += 1;

            match common {
                Some(p) => {
                    last = p.clone();
                    out.common_prefixes.push(p);
                }
                None => {
                    last = key.clone();
                    out.contents.push(ObjectSummary {
                        key: key.clone(),
                        size: obj.data.len() as u64,
                        etag: obj.etag.clone(),
                        last_modified: format_list_time(&obj.last_modified),
                        storage_class: obj.storage_class.clone(),
                    });
                }
            }
        }

        // The service only hands out a marker for delimited listings.
        if out.is_truncated && delimiter.is_some() {
            out.next_marker = last;
        }
        Ok(out)
    }

    async fn head_object(&self, key: &str) -> Result<HeadObjectOutput> {
        let obj = self.object(key)?;

        let mut headers = HeaderMap::new();
        let values = [
            (LAST_MODIFIED, format_head_time(&obj.last_modified)),
            (CONTENT_TYPE, "application/octet-stream".to_string()),
            (ETAG, obj.etag.clone()),
            (
                HeaderName::from_static(STORAGE_CLASS_HEADER),
                obj.storage_class.clone(),
            ),
        ];
        for (name, value) in values {
            let value = HeaderValue::from_str(&value).map_err(Error::unexpected)?;
            headers.insert(name, value);
        }

        Ok(HeadObjectOutput {
            content_length: obj.data.len() as u64,
            headers,
        })
    }

    async fn get_object(&self, key: &str, range: Option<ByteRange>) -> Result<Reader> {
        let obj = self.object(key)?;
        let len = obj.data.len() as u64;

        let data = match range {
            None => obj.data,
            Some(r) if r.offset >= len && len > 0 => {
                return Err(CosError::new("InvalidRange", r.header_value()).into());
            }
            Some(r) => {
                let start = r.offset.min(len);
                let end = match r.size {
                    Some(n) => start.saturating_add(n).min(len),
                    None => len,
                };
                obj.data.slice(start as usize..end as usize)
            }
        };

        Ok(Box::new(std::io::Cursor::new(data)))
    }

    async fn put_object(&self, key: &str, mut body: Reader, opts: &PutObjectOptions) -> Result<()> {
        let mut data = Vec::with_capacity(opts.content_length as usize);
        body.read_to_end(&mut data).await?;
        if data.len() as u64 != opts.content_length {
            return Err(CosError::new(
                "IncompleteBody",
                format!("expected {} bytes, got {}", opts.content_length, data.len()),
            )
            .into());
        }

        let obj = StoredObject {
            data: Bytes::from(data),
            etag: format!("\"{}\"", Uuid::new_v4().simple()),
            storage_class: opts
                .storage_class
                .clone()
                .unwrap_or_else(|| DEFAULT_STORAGE_CLASS.to_string()),
            last_modified: now(),
        };

        let mut state = write_state(&self.state)?;
        let bucket = state
            .buckets
            .get_mut(&self.name)
            .ok_or_else(|| self.no_such_bucket())?;
        bucket.objects.insert(key.to_string(), obj);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let mut state = write_state(&self.state)?;
        if state.deny_deletes.load(Ordering::SeqCst) {
            return Err(CosError::new("AccessDenied", "deletes are denied").into());
        }
        let bucket = state
            .buckets
            .get_mut(&self.name)
            .ok_or_else(|| self.no_such_bucket())?;
        // Deleting a missing key succeeds, as on the service.
        bucket.objects.remove(key);
        Ok(())
    }

    async fn copy_object(&self, src_key: &str, dst_key: &str) -> Result<()> {
        let mut obj = self.object(src_key)?;
        obj.last_modified = now();

        let mut state = write_state(&self.state)?;
        let bucket = state
            .buckets
            .get_mut(&self.name)
            .ok_or_else(|| self.no_such_bucket())?;
        bucket.objects.insert(dst_key.to_string(), obj);
        Ok(())
    }

    async fn put_bucket(&self) -> Result<()> {
        let mut state = write_state(&self.state)?;
        if state.buckets.contains_key(&self.name) {
            return Err(CosError::new(
                "BucketAlreadyExists",
                format!("bucket {} already exists", self.name),
            )
            .into());
        }
        state.buckets.insert(
            self.name.clone(),
            Bucket {
                location: self.location.clone(),
                objects: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn delete_bucket(&self) -> Result<()> {
        let mut state = write_state(&self.state)?;
        match state.buckets.get(&self.name) {
            None => Err(self.no_such_bucket()),
            Some(b) if !b.objects.is_empty() => Err(CosError::new(
                "BucketNotEmpty",
                format!("bucket {} is not empty", self.name),
            )
            .into()),
            Some(_) => {
                state.buckets.remove(&self.name);
                Ok(())
            }
        }
    }
}

/// Current time truncated to whole milliseconds, the precision listings carry.
fn now() -> DateTime<Utc> {
    let t = Utc::now();
    DateTime::from_timestamp_millis(t.timestamp_millis()).unwrap_or(t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(connector: &MemoryConnector) -> Arc<dyn BucketClient> {
        connector
            .bucket(
                &Credentials::new("id", "key"),
                &reqwest::Client::new(),
                "b",
                "ap-guangzhou",
            )
            .unwrap()
    }

    async fn put(b: &Arc<dyn BucketClient>, key: &str, data: &[u8]) {
        let opts = PutObjectOptions {
            content_length: data.len() as u64,
            ..Default::default()
        };
        b.put_object(key, Box::new(std::io::Cursor::new(data.to_vec())), &opts)
            .await
            .unwrap();
    }

    fn list(prefix: &str, delimiter: Option<&str>, marker: &str, max_keys: usize) -> ListObjectsRequest {
        ListObjectsRequest {
            prefix: prefix.to_string(),
            delimiter: delimiter.map(str::to_string),
            marker: marker.to_string(),
            max_keys,
        }
    }

    #[tokio::test]
    async fn test_delimited_listing_rolls_up_prefixes() {
        let c = MemoryConnector::new().with_bucket("b", "ap-guangzhou").unwrap();
        let b = bucket(&c);
        for key in ["a.txt", "d/1", "d/2", "e/x/y", "z.txt"] {
            put(&b, key, b"x").await;
        }

        let out = b.list_objects(&list("", Some("/"), "", 100)).await.unwrap();
        let keys: Vec<_> = out.contents.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["a.txt", "z.txt"]);
        assert_eq!(out.common_prefixes, vec!["d/".to_string(), "e/".to_string()]);
        assert!(!out.is_truncated);
    }

    #[tokio::test]
    async fn test_marker_skips_rolled_up_prefix() {
        let c = MemoryConnector::new().with_bucket("b", "ap-guangzhou").unwrap();
        let b = bucket(&c);
        for key in ["a/1", "a/2", "b/1", "c"] {
            put(&b, key, b"x").await;
        }

        let first = b.list_objects(&list("", Some("/"), "", 1)).await.unwrap();
        assert_eq!(first.common_prefixes, vec!["a/".to_string()]);
        assert!(first.is_truncated);
        assert_eq!(first.next_marker, "a/");

        let second = b
            .list_objects(&list("", Some("/"), &first.next_marker, 1))
            .await
            .unwrap();
        assert_eq!(second.common_prefixes, vec!["b/".to_string()]);

        let third = b
            .list_objects(&list("", Some("/"), &second.next_marker, 1))
            .await
            .unwrap();
        assert_eq!(third.contents.len(), 1);
        assert_eq!(third.contents[0].key, "c");
        assert!(!third.is_truncated);
    }

    #[tokio::test]
    async fn test_ranged_get() {
        let c = MemoryConnector::new().with_bucket("b", "ap-guangzhou").unwrap();
        let b = bucket(&c);
        put(&b, "k", b"0123456789").await;

        let mut r = b
            .get_object(
                "k",
                Some(ByteRange {
                    offset: 4,
                    size: Some(3),
                }),
            )
            .await
            .unwrap();
        let mut out = String::new();
        r.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "456");

        let err = b
            .get_object(
                "k",
                Some(ByteRange {
                    offset: 10,
                    size: None,
                }),
            )
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("InvalidRange"));
    }

    #[tokio::test]
    async fn test_missing_key_is_not_found() {
        let c = MemoryConnector::new().with_bucket("b", "ap-guangzhou").unwrap();
        let err = bucket(&c).head_object("nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_short_body_rejected() {
        let c = MemoryConnector::new().with_bucket("b", "ap-guangzhou").unwrap();
        let opts = PutObjectOptions {
            content_length: 10,
            ..Default::default()
        };
        let err = bucket(&c)
            .put_object("k", Box::new(std::io::Cursor::new(b"abc".to_vec())), &opts)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("IncompleteBody"));
    }

    #[test]
    fn test_wrong_credentials_rejected() {
        let c = MemoryConnector::new().with_credentials(Credentials::new("id", "key"));
        let http = reqwest::Client::new();
        assert!(c.service(&Credentials::new("id", "key"), &http).is_ok());
        let err = c
            .service(&Credentials::new("id", "other"), &http)
            .err()
            .unwrap();
        assert_eq!(
            err.backend_kind(),
            Some(polystore_common::BackendErrorKind::PermissionDenied)
        );
    }
}
