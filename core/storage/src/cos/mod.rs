//! Tencent Cloud Object Storage backend.
//!
//! [`Service`] covers bucket management and [`Storage`] the objects of one
//! bucket. Both reach the service through a [`Connector`]; [`MemoryConnector`]
//! serves everything from process memory.
//!
//! Supported credentials are `hmac:<secret id>:<secret key>` and `env`, which
//! reads `COS_SECRETID` and `COS_SECRETKEY`.

mod client;
mod memory;
mod pairs;
mod service;
mod storager;

use std::sync::Arc;

use polystore_common::{ObjectMeta, Result};

use self::pairs::{ServiceNewOptions, StorageNewOptions, NEW};
use crate::pairs::Pair;

pub use client::{
    BucketClient, BucketSummary, ByteRange, Connector, CosError, Credentials, HeadObjectOutput,
    ListObjectsOutput, ListObjectsRequest, ObjectSummary, PutObjectOptions, ServiceClient,
    STORAGE_CLASS_HEADER,
};
pub use memory::MemoryConnector;
pub use pairs::{with_storage_class, PAIR_STORAGE_CLASS};
pub use service::{Service, ENV_SECRET_ID, ENV_SECRET_KEY};
pub use storager::{Storage, LIST_PAGE_SIZE};

/// Backend type name.
pub const TYPE: &str = "cos";

const META_STORAGE_CLASS: &str = "cos-storage-class";

/// Storage class recorded on an object by stat or a listing.
pub fn storage_class(meta: &ObjectMeta) -> Option<&str> {
    meta.get(META_STORAGE_CLASS)
}

/// Record a storage class in object metadata.
pub fn set_storage_class(meta: &mut ObjectMeta, v: impl Into<String>) {
    meta.set(META_STORAGE_CLASS, v);
}

/// Build a service and a storager for one bucket from a single pair list.
///
/// Requires `credential`, `name` and `location`; accepts
/// `http_client_options` and `work_dir`. Unrelated pairs are ignored.
pub fn new(connector: Arc<dyn Connector>, pairs: Vec<Pair>) -> Result<(Service, Storage)> {
    let mut values = NEW.parse_lenient(pairs)?;
    let service_opt = ServiceNewOptions::from_values(&mut values)?;
    let storage_opt = StorageNewOptions::from_values(&mut values)?;

    let service = Service::from_options(connector, service_opt)?;
    let storage = service.new_storage(storage_opt)?;
    Ok((service, storage))
}
