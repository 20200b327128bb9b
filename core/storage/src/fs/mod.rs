//! Local filesystem backend.

mod pairs;
mod storager;
pub mod sys;

pub use storager::Storage;
pub use sys::{FileSystem, OsFileSystem};

/// Backend type name.
pub const TYPE: &str = "fs";
