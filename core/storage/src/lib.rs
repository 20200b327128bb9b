//! Backend-agnostic storage for polystore.
//!
//! Every backend implements [`Storager`] (and [`Servicer`] when it has named
//! containers), so callers read, write, list and delete objects the same way
//! whether they live on a local disk or in a COS bucket.
//!
//! Operation options are passed as [`Pair`]s. Each backend validates them
//! per operation: unknown options fail with `PairUnsupported` and missing
//! ones with `PairRequired`, before any backend call is made.
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use polystore_storage::{fs, pairs, Storager};
//!
//! let store = fs::Storage::new(vec![pairs::with_work_dir("/var/data")])?;
//! let object = store.stat("reports/2024.csv", vec![]).await?;
//! println!("{} {} bytes", object.name, object.size);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod cos;
pub mod fs;
pub mod httpclient;
pub mod iowrap;
pub mod pairs;
pub mod registry;
pub mod storager;

pub use config::StorageConfig;
pub use context::Context;
pub use httpclient::HttpClientOptions;
pub use iowrap::Reader;
pub use pairs::{OptionSet, Pair, PairMap};
pub use registry::{Registry, StoragerFactory};
pub use storager::{Copier, Mover, Servicer, StorageResult, Storager};

pub use polystore_common::{
    BackendErrorKind, ConfigErrorKind, Error, ErrorCategory, Object, ObjectMeta, ObjectType, Op,
    Result, StorageError, StorageMeta,
};
pub use polystore_credential::{Protocol, Provider};
