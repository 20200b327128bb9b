//! Accepted pairs for each COS operation.

use polystore_common::Result;
use polystore_credential::Provider;

use crate::context::Context;
use crate::httpclient::HttpClientOptions;
use crate::pairs::{
    keys, required, IoCallback, ObjectFunc, OptionSet, Pair, PairMap, StoragerFunc,
};

/// Storage class pair key.
pub const PAIR_STORAGE_CLASS: &str = keys::COS_STORAGE_CLASS;

/// Storage class for the object being written, e.g. `STANDARD_IA`.
pub fn with_storage_class(v: impl Into<String>) -> Pair {
    Pair::CosStorageClass(v.into())
}

pub(crate) const SERVICE_NEW: OptionSet = OptionSet::new(
    &[keys::CREDENTIAL],
    &[keys::HTTP_CLIENT_OPTIONS],
    &[keys::CONTEXT],
);
pub(crate) const SERVICE_BUCKET: OptionSet =
    OptionSet::new(&[keys::LOCATION], &[], &[keys::CONTEXT]);
pub(crate) const SERVICE_LIST: OptionSet =
    OptionSet::new(&[keys::STORAGER_FUNC], &[], &[keys::CONTEXT]);

pub(crate) const STORAGE_NEW: OptionSet = OptionSet::new(
    &[keys::LOCATION, keys::NAME],
    &[keys::WORK_DIR],
    &[keys::CONTEXT],
);
/// Service and storage construction from one pair list.
pub(crate) const NEW: OptionSet = OptionSet::new(
    &[keys::CREDENTIAL, keys::LOCATION, keys::NAME],
    &[keys::HTTP_CLIENT_OPTIONS, keys::WORK_DIR],
    &[keys::CONTEXT],
);

pub(crate) const CONTEXT_ONLY: OptionSet = OptionSet::new(&[], &[], &[keys::CONTEXT]);
pub(crate) const READ: OptionSet = OptionSet::new(
    &[],
    &[keys::OFFSET, keys::SIZE],
    &[keys::READ_CALLBACK_FUNC, keys::CONTEXT],
);
pub(crate) const WRITE: OptionSet = OptionSet::new(
    &[keys::SIZE],
    &[keys::CHECKSUM, keys::COS_STORAGE_CLASS],
    &[keys::READ_CALLBACK_FUNC, keys::CONTEXT],
);
pub(crate) const LIST_DIR: OptionSet = OptionSet::new(
    &[],
    &[keys::DIR_FUNC, keys::FILE_FUNC],
    &[keys::CONTEXT],
);
pub(crate) const LIST_PREFIX: OptionSet =
    OptionSet::new(&[keys::OBJECT_FUNC], &[], &[keys::CONTEXT]);

pub(crate) struct ServiceNewOptions {
    pub credential: Provider,
    pub http_client_options: HttpClientOptions,
}

impl ServiceNewOptions {
    pub fn parse(pairs: Vec<Pair>) -> Result<Self> {
        Self::from_values(&mut SERVICE_NEW.parse_lenient(pairs)?)
    }

    pub fn from_values(values: &mut PairMap) -> Result<Self> {
        Ok(Self {
            credential: required(values.credential(), keys::CREDENTIAL)?,
            http_client_options: values.http_client_options().unwrap_or_default(),
        })
    }
}

pub(crate) struct StorageNewOptions {
    pub name: String,
    pub location: String,
    pub work_dir: Option<String>,
}

impl StorageNewOptions {
    pub fn parse(pairs: Vec<Pair>) -> Result<Self> {
        Self::from_values(&mut STORAGE_NEW.parse_lenient(pairs)?)
    }

    pub fn from_values(values: &mut PairMap) -> Result<Self> {
        Ok(Self {
            name: required(values.name(), keys::NAME)?,
            location: required(values.location(), keys::LOCATION)?,
            work_dir: values.work_dir(),
        })
    }
}

/// Options of service create, delete and get.
pub(crate) struct BucketOptions {
    pub context: Context,
    pub location: String,
}

impl BucketOptions {
    pub fn parse(pairs: Vec<Pair>) -> Result<Self> {
        let mut values = SERVICE_BUCKET.parse(pairs)?;
        Ok(Self {
            context: values.context().unwrap_or_default(),
            location: required(values.location(), keys::LOCATION)?,
        })
    }
}

pub(crate) struct ServiceListOptions {
    pub context: Context,
    pub storager_func: StoragerFunc,
}

impl ServiceListOptions {
    pub fn parse(pairs: Vec<Pair>) -> Result<Self> {
        let mut values = SERVICE_LIST.parse(pairs)?;
        Ok(Self {
            context: values.context().unwrap_or_default(),
            storager_func: required(values.storager_func(), keys::STORAGER_FUNC)?,
        })
    }
}

/// Options of metadata, stat, delete, copy and move.
pub(crate) struct BasicOptions {
    pub context: Context,
}

impl BasicOptions {
    pub fn parse(pairs: Vec<Pair>) -> Result<Self> {
        let mut values = CONTEXT_ONLY.parse(pairs)?;
        Ok(Self {
            context: values.context().unwrap_or_default(),
        })
    }
}

pub(crate) struct ReadOptions {
    pub context: Context,
    pub offset: Option<u64>,
    pub size: Option<u64>,
    pub read_callback: Option<IoCallback>,
}

impl ReadOptions {
    pub fn parse(pairs: Vec<Pair>) -> Result<Self> {
        let mut values = READ.parse(pairs)?;
        Ok(Self {
            context: values.context().unwrap_or_default(),
            offset: values.offset(),
            size: values.size(),
            read_callback: values.read_callback_func(),
        })
    }
}

pub(crate) struct WriteOptions {
    pub context: Context,
    pub size: u64,
    pub checksum: Option<String>,
    pub storage_class: Option<String>,
    pub read_callback: Option<IoCallback>,
}

impl WriteOptions {
    pub fn parse(pairs: Vec<Pair>) -> Result<Self> {
        let mut values = WRITE.parse(pairs)?;
        Ok(Self {
            context: values.context().unwrap_or_default(),
            size: required(values.size(), keys::SIZE)?,
            checksum: values.checksum(),
            storage_class: values.cos_storage_class(),
            read_callback: values.read_callback_func(),
        })
    }
}

pub(crate) struct ListDirOptions {
    pub context: Context,
    pub dir_func: Option<ObjectFunc>,
    pub file_func: Option<ObjectFunc>,
}

impl ListDirOptions {
    pub fn parse(pairs: Vec<Pair>) -> Result<Self> {
        let mut values = LIST_DIR.parse(pairs)?;
        Ok(Self {
            context: values.context().unwrap_or_default(),
            dir_func: values.dir_func(),
            file_func: values.file_func(),
        })
    }
}

pub(crate) struct ListPrefixOptions {
    pub context: Context,
    pub object_func: ObjectFunc,
}

impl ListPrefixOptions {
    pub fn parse(pairs: Vec<Pair>) -> Result<Self> {
        let mut values = LIST_PREFIX.parse(pairs)?;
        Ok(Self {
            context: values.context().unwrap_or_default(),
            object_func: required(values.object_func(), keys::OBJECT_FUNC)?,
        })
    }
}
