//! Named operation options ("pairs") and their per-operation validation.
//!
//! Every option passed into a `Storager`/`Servicer` call is a [`Pair`]. Keys
//! come from one process-wide namespace ([`keys`]) and each key is bound to
//! exactly one value type by its enum variant, so a pair can never carry a
//! value of the wrong type.
//!
//! Each (backend, operation) declares an [`OptionSet`] of required, optional
//! and generated keys. [`OptionSet::parse`] rejects keys outside the set and
//! reports missing required keys before the adapter touches the backend; the
//! adapter then moves typed values out of the returned [`PairMap`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use polystore_common::{Error, Object, Result};
use polystore_credential::Provider;

use crate::context::Context;
use crate::httpclient::HttpClientOptions;
use crate::storager::Storager;

/// The shared pair-key namespace.
pub mod keys {
    pub const CONTEXT: &str = "context";
    pub const SIZE: &str = "size";
    pub const OFFSET: &str = "offset";
    pub const CHECKSUM: &str = "checksum";
    pub const WORK_DIR: &str = "work_dir";
    pub const NAME: &str = "name";
    pub const LOCATION: &str = "location";
    pub const CREDENTIAL: &str = "credential";
    pub const HTTP_CLIENT_OPTIONS: &str = "http_client_options";
    pub const READ_CALLBACK_FUNC: &str = "read_callback_func";
    pub const DIR_FUNC: &str = "dir_func";
    pub const FILE_FUNC: &str = "file_func";
    pub const OBJECT_FUNC: &str = "object_func";
    pub const STORAGER_FUNC: &str = "storager_func";
    /// Storage class of a COS object.
    pub const COS_STORAGE_CLASS: &str = "cos_storage_class";
}

/// Called with every chunk of bytes flowing through a read or write.
pub type IoCallback = Box<dyn FnMut(&[u8]) + Send + Sync>;

/// Called once per listed entry, on the listing task.
pub type ObjectFunc = Box<dyn FnMut(Object) + Send + Sync>;

/// Called once per storager produced by a service listing.
pub type StoragerFunc = Box<dyn FnMut(Arc<dyn Storager>) + Send + Sync>;

/// A single named option.
pub enum Pair {
    Context(Context),
    Size(u64),
    Offset(u64),
    Checksum(String),
    WorkDir(String),
    Name(String),
    Location(String),
    Credential(Provider),
    HttpClientOptions(HttpClientOptions),
    ReadCallbackFunc(IoCallback),
    DirFunc(ObjectFunc),
    FileFunc(ObjectFunc),
    ObjectFunc(ObjectFunc),
    StoragerFunc(StoragerFunc),
    CosStorageClass(String),
}

impl Pair {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Context(_) => keys::CONTEXT,
            Self::Size(_) => keys::SIZE,
            Self::Offset(_) => keys::OFFSET,
            Self::Checksum(_) => keys::CHECKSUM,
            Self::WorkDir(_) => keys::WORK_DIR,
            Self::Name(_) => keys::NAME,
            Self::Location(_) => keys::LOCATION,
            Self::Credential(_) => keys::CREDENTIAL,
            Self::HttpClientOptions(_) => keys::HTTP_CLIENT_OPTIONS,
            Self::ReadCallbackFunc(_) => keys::READ_CALLBACK_FUNC,
            Self::DirFunc(_) => keys::DIR_FUNC,
            Self::FileFunc(_) => keys::FILE_FUNC,
            Self::ObjectFunc(_) => keys::OBJECT_FUNC,
            Self::StoragerFunc(_) => keys::STORAGER_FUNC,
            Self::CosStorageClass(_) => keys::COS_STORAGE_CLASS,
        }
    }
}

impl fmt::Debug for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = self.key();
        match self {
            Self::Context(v) => write!(f, "{}: {:?}", key, v),
            Self::Size(v) | Self::Offset(v) => write!(f, "{}: {}", key, v),
            Self::Checksum(v)
            | Self::WorkDir(v)
            | Self::Name(v)
            | Self::Location(v)
            | Self::CosStorageClass(v) => write!(f, "{}: {:?}", key, v),
            Self::Credential(v) => write!(f, "{}: {:?}", key, v),
            Self::HttpClientOptions(v) => write!(f, "{}: {:?}", key, v),
            Self::ReadCallbackFunc(_)
            | Self::DirFunc(_)
            | Self::FileFunc(_)
            | Self::ObjectFunc(_)
            | Self::StoragerFunc(_) => write!(f, "{}: <func>", key),
        }
    }
}

/// Cancellation and deadline for one call.
pub fn with_context(v: Context) -> Pair {
    Pair::Context(v)
}

/// Number of bytes to read or write.
pub fn with_size(v: u64) -> Pair {
    Pair::Size(v)
}

/// Byte offset to start reading at.
pub fn with_offset(v: u64) -> Pair {
    Pair::Offset(v)
}

/// Content MD5 of the data being written.
pub fn with_checksum(v: impl Into<String>) -> Pair {
    Pair::Checksum(v.into())
}

pub fn with_work_dir(v: impl Into<String>) -> Pair {
    Pair::WorkDir(v.into())
}

pub fn with_name(v: impl Into<String>) -> Pair {
    Pair::Name(v.into())
}

pub fn with_location(v: impl Into<String>) -> Pair {
    Pair::Location(v.into())
}

/// Credentials for backends that talk to a service.
pub fn with_credential(v: Provider) -> Pair {
    Pair::Credential(v)
}

pub fn with_http_client_options(v: HttpClientOptions) -> Pair {
    Pair::HttpClientOptions(v)
}

/// Called with every chunk that passes through a read or write body.
pub fn with_read_callback_func<F>(f: F) -> Pair
where
    F: FnMut(&[u8]) + Send + Sync + 'static,
{
    Pair::ReadCallbackFunc(Box::new(f))
}

/// Receives each directory found by `list_dir`.
pub fn with_dir_func<F>(f: F) -> Pair
where
    F: FnMut(Object) + Send + Sync + 'static,
{
    Pair::DirFunc(Box::new(f))
}

/// Receives each non-directory entry found by `list_dir`.
pub fn with_file_func<F>(f: F) -> Pair
where
    F: FnMut(Object) + Send + Sync + 'static,
{
    Pair::FileFunc(Box::new(f))
}

/// Receives each object found by `list_prefix`. Required there.
pub fn with_object_func<F>(f: F) -> Pair
where
    F: FnMut(Object) + Send + Sync + 'static,
{
    Pair::ObjectFunc(Box::new(f))
}

/// Receives each storager from `Servicer::list`.
pub fn with_storager_func<F>(f: F) -> Pair
where
    F: FnMut(Arc<dyn Storager>) + Send + Sync + 'static,
{
    Pair::StoragerFunc(Box::new(f))
}

/// Keys accepted by one operation of one backend.
#[derive(Debug, Clone, Copy)]
pub struct OptionSet {
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
    /// Keys injected by the framework rather than the caller, such as the context.
    pub generated: &'static [&'static str],
}

impl OptionSet {
    pub const fn new(
        required: &'static [&'static str],
        optional: &'static [&'static str],
        generated: &'static [&'static str],
    ) -> Self {
        Self {
            required,
            optional,
            generated,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.required.contains(&key) || self.optional.contains(&key) || self.generated.contains(&key)
    }

    /// Validate `pairs` for an operation call.
    ///
    /// Later pairs win over earlier ones with the same key.
    ///
    /// # Errors
    /// - `PairUnsupported` naming the first key outside this set
    /// - `PairRequired` naming the first missing required key
    pub fn parse(&self, pairs: Vec<Pair>) -> Result<PairMap> {
        if let Some(pair) = pairs.iter().find(|p| !self.contains(p.key())) {
            return Err(Error::PairUnsupported(pair.key()));
        }
        self.collect(pairs)
    }

    /// Like [`OptionSet::parse`], but drops keys outside this set.
    ///
    /// Constructors use this: one pair list is shared between a service
    /// and the storages it creates, so keys meant for the other are expected.
    pub fn parse_lenient(&self, pairs: Vec<Pair>) -> Result<PairMap> {
        let pairs = pairs.into_iter().filter(|p| self.contains(p.key())).collect();
        self.collect(pairs)
    }

    fn collect(&self, pairs: Vec<Pair>) -> Result<PairMap> {
        let mut values = HashMap::with_capacity(pairs.len());
        for pair in pairs {
            values.insert(pair.key(), pair);
        }

        if let Some(key) = self.required.iter().copied().find(|k| !values.contains_key(k)) {
            return Err(Error::PairRequired(key));
        }

        Ok(PairMap { values })
    }
}

/// Validated pairs of one call, drained by typed accessors.
///
/// Each accessor moves the value out, returning `None` when the key was
/// not passed.
#[derive(Debug, Default)]
pub struct PairMap {
    values: HashMap<&'static str, Pair>,
}

macro_rules! pair_accessors {
    ($($name:ident => $variant:ident($ty:ty), $key:ident;)*) => {
        $(
            pub fn $name(&mut self) -> Option<$ty> {
                match self.values.remove(keys::$key) {
                    Some(Pair::$variant(v)) => Some(v),
                    _ => None,
                }
            }
        )*
    };
}

impl PairMap {
    pair_accessors! {
        context => Context(Context), CONTEXT;
        size => Size(u64), SIZE;
        offset => Offset(u64), OFFSET;
        checksum => Checksum(String), CHECKSUM;
        work_dir => WorkDir(String), WORK_DIR;
        name => Name(String), NAME;
        location => Location(String), LOCATION;
        credential => Credential(Provider), CREDENTIAL;
        http_client_options => HttpClientOptions(HttpClientOptions), HTTP_CLIENT_OPTIONS;
        read_callback_func => ReadCallbackFunc(IoCallback), READ_CALLBACK_FUNC;
        dir_func => DirFunc(ObjectFunc), DIR_FUNC;
        file_func => FileFunc(ObjectFunc), FILE_FUNC;
        object_func => ObjectFunc(ObjectFunc), OBJECT_FUNC;
        storager_func => StoragerFunc(StoragerFunc), STORAGER_FUNC;
        cos_storage_class => CosStorageClass(String), COS_STORAGE_CLASS;
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Unwrap a required value taken out of a [`PairMap`].
pub fn required<T>(value: Option<T>, key: &'static str) -> Result<T> {
    value.ok_or(Error::PairRequired(key))
}
