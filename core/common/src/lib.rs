//! Common types shared by every polystore backend.
//!
//! This crate holds the pieces every adapter fills in or returns, so the
//! storage contract stays independent of any one backend:
//! - the error taxonomy and the per-call [`StorageError`] envelope
//! - the [`Object`] / [`StorageMeta`] model
//! - the work-directory [`PathResolver`]

pub mod error;
pub mod path;
pub mod types;

pub use error::{
    BackendErrorKind, ConfigErrorKind, Error, ErrorCategory, Op, Result, StorageError,
};
pub use path::{PathResolver, STDIO_PATH};
pub use types::{Object, ObjectMeta, ObjectType, StorageMeta};
