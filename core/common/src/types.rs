//! Object and metadata model filled in by every backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Classification of a storage entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    File,
    Dir,
    /// Named pipes, sockets and device files.
    Stream,
    Invalid,
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::File => "file",
            Self::Dir => "dir",
            Self::Stream => "stream",
            Self::Invalid => "invalid",
        };
        f.write_str(s)
    }
}

const META_CONTENT_TYPE: &str = "content-type";
const META_ETAG: &str = "etag";
const META_CONTENT_MD5: &str = "content-md5";

/// Extensible object metadata.
///
/// Common attributes have dedicated accessors. Backend specific attributes
/// live under keys prefixed with the backend type (`cos-storage-class`) and
/// are read through that backend's typed getters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    values: BTreeMap<String, String>,
}

impl ObjectMeta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Insert or replace `key`. Returns `self` so calls can be chained.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get(META_CONTENT_TYPE)
    }

    pub fn set_content_type(&mut self, v: impl Into<String>) -> &mut Self {
        self.set(META_CONTENT_TYPE, v)
    }

    pub fn etag(&self) -> Option<&str> {
        self.get(META_ETAG)
    }

    pub fn set_etag(&mut self, v: impl Into<String>) -> &mut Self {
        self.set(META_ETAG, v)
    }

    pub fn content_md5(&self) -> Option<&str> {
        self.get(META_CONTENT_MD5)
    }

    pub fn set_content_md5(&mut self, v: impl Into<String>) -> &mut Self {
        self.set(META_CONTENT_MD5, v)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// A storage entry as reported by Stat or List.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Object {
    /// Backend-native key or absolute path.
    pub id: String,
    /// Caller-visible logical path.
    pub name: String,
    #[serde(rename = "type")]
    pub object_type: ObjectType,
    pub size: u64,
    /// Last modification time, if the backend reported one.
    pub updated_at: Option<DateTime<Utc>>,
    pub meta: ObjectMeta,
}

impl Object {
    /// Create an object with no size, timestamp or metadata.
    pub fn new(id: impl Into<String>, name: impl Into<String>, object_type: ObjectType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            object_type,
            size: 0,
            updated_at: None,
            meta: ObjectMeta::new(),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.object_type == ObjectType::Dir
    }
}

/// Metadata describing a backend instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageMeta {
    pub name: String,
    pub work_dir: String,
    pub meta: BTreeMap<String, String>,
}

impl StorageMeta {
    pub fn new(name: impl Into<String>, work_dir: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            work_dir: work_dir.into(),
            meta: BTreeMap::new(),
        }
    }
}
