//! Error taxonomy shared by every backend.
//!
//! Adapters produce [`Error`] internally and wrap it exactly once into a
//! [`StorageError`] at the outermost return of each operation.

use std::fmt;
use std::io;

use thiserror::Error;

/// Why a config was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigErrorKind {
    /// Wrong number of arguments for the selected protocol, or a malformed document.
    #[error("invalid config")]
    InvalidConfig,
    /// The protocol token is not one we know.
    #[error("unsupported protocol")]
    UnsupportedProtocol,
    /// No backend is registered under this type.
    #[error("unsupported storage type")]
    UnsupportedType,
    #[error("storage type already registered")]
    AlreadyRegistered,
}

/// Classification of failures reported by a backend or its transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    NotFound,
    PermissionDenied,
    AlreadyExists,
    Timeout,
    RateLimited,
    Unexpected,
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "object not exist",
            Self::PermissionDenied => "permission denied",
            Self::AlreadyExists => "object already exists",
            Self::Timeout => "timed out",
            Self::RateLimited => "rate limited",
            Self::Unexpected => "unexpected",
        };
        f.write_str(s)
    }
}

/// The four failure categories callers can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Config,
    Option,
    Backend,
    Cancellation,
}

/// Top-level error type for polystore operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed credential string, unsupported protocol or unknown backend type.
    #[error("parse config [{config}]: {kind}")]
    Config {
        config: String,
        kind: ConfigErrorKind,
    },

    /// A pair was passed to an operation that does not accept it.
    #[error("pair [{0}] is not supported")]
    PairUnsupported(&'static str),

    /// A required pair was not passed.
    #[error("pair [{0}] is required")]
    PairRequired(&'static str),

    /// Whatever the filesystem, SDK or transport returned.
    #[error("{kind}: {source}")]
    Backend {
        kind: BackendErrorKind,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// The caller's deadline passed before the operation finished.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl Error {
    /// Build a config error for `config`.
    pub fn config(config: impl Into<String>, kind: ConfigErrorKind) -> Self {
        Self::Config {
            config: config.into(),
            kind,
        }
    }

    /// Wrap a backend failure.
    pub fn backend<E>(kind: BackendErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Backend {
            kind,
            source: source.into(),
        }
    }

    /// Wrap a backend failure that has no more specific classification.
    pub fn unexpected<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::backend(BackendErrorKind::Unexpected, source)
    }

    /// Which family of failure this is, for branching without matching every variant.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config { .. } => ErrorCategory::Config,
            Self::PairUnsupported(_) | Self::PairRequired(_) => ErrorCategory::Option,
            Self::Backend { .. } => ErrorCategory::Backend,
            Self::Cancelled | Self::DeadlineExceeded => ErrorCategory::Cancellation,
        }
    }

    /// Backend classification, if this is a backend error.
    pub fn backend_kind(&self) -> Option<BackendErrorKind> {
        match self {
            Self::Backend { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// True for a backend not-found error.
    pub fn is_not_found(&self) -> bool {
        self.backend_kind() == Some(BackendErrorKind::NotFound)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::NotFound => BackendErrorKind::NotFound,
            io::ErrorKind::PermissionDenied => BackendErrorKind::PermissionDenied,
            io::ErrorKind::AlreadyExists => BackendErrorKind::AlreadyExists,
            io::ErrorKind::TimedOut => BackendErrorKind::Timeout,
            _ => BackendErrorKind::Unexpected,
        };
        Self::backend(kind, err)
    }
}

/// Operation names carried by [`StorageError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    New,
    Metadata,
    Stat,
    Read,
    Write,
    Delete,
    ListDir,
    ListPrefix,
    Copy,
    Move,
    ServiceCreate,
    ServiceDelete,
    ServiceGet,
    ServiceList,
}

impl Op {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Metadata => "metadata",
            Self::Stat => "stat",
            Self::Read => "read",
            Self::Write => "write",
            Self::Delete => "delete",
            Self::ListDir => "list_dir",
            Self::ListPrefix => "list_prefix",
            Self::Copy => "copy",
            Self::Move => "move",
            Self::ServiceCreate => "create",
            Self::ServiceDelete => "delete",
            Self::ServiceGet => "get",
            Self::ServiceList => "list",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure envelope returned by every `Storager` and `Servicer` method.
///
/// `backend` is a rendering of the originating adapter taken at wrap time,
/// so the error never keeps the adapter alive.
#[derive(Debug, Error)]
#[error("{backend} {op} {path:?}: {source}")]
pub struct StorageError {
    pub op: Op,
    pub path: Vec<String>,
    pub backend: String,
    #[source]
    pub source: Error,
}

impl StorageError {
    /// Wrap `source` with the operation, the backend's display string and
    /// the paths involved.
    pub fn new(op: Op, backend: impl fmt::Display, path: &[&str], source: Error) -> Self {
        Self {
            op,
            path: path.iter().map(|p| p.to_string()).collect(),
            backend: backend.to_string(),
            source,
        }
    }

    /// The wrapped cause.
    pub fn error(&self) -> &Error {
        &self.source
    }

    pub fn category(&self) -> ErrorCategory {
        self.source.category()
    }

    pub fn is_not_found(&self) -> bool {
        self.source.is_not_found()
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_classification() {
        let err: Error = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(err.is_not_found());
        assert_eq!(err.category(), ErrorCategory::Backend);

        let err: Error = io::Error::new(io::ErrorKind::PermissionDenied, "no").into();
        assert_eq!(err.backend_kind(), Some(BackendErrorKind::PermissionDenied));

        let err: Error = io::Error::new(io::ErrorKind::Other, "boom").into();
        assert_eq!(err.backend_kind(), Some(BackendErrorKind::Unexpected));
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            Error::config("x", ConfigErrorKind::InvalidConfig).category(),
            ErrorCategory::Config
        );
        assert_eq!(Error::PairRequired("size").category(), ErrorCategory::Option);
        assert_eq!(Error::PairUnsupported("size").category(), ErrorCategory::Option);
        assert_eq!(Error::Cancelled.category(), ErrorCategory::Cancellation);
        assert_eq!(Error::DeadlineExceeded.category(), ErrorCategory::Cancellation);
    }

    #[test]
    fn test_storage_error_carries_op_and_paths() {
        let err = StorageError::new(
            Op::Copy,
            "Storager fs {WorkDir: /tmp}",
            &["a.txt", "b.txt"],
            Error::PairUnsupported("size"),
        );

        assert_eq!(err.op, Op::Copy);
        assert_eq!(err.path, vec!["a.txt".to_string(), "b.txt".to_string()]);
        let msg = err.to_string();
        assert!(msg.contains("copy"));
        assert!(msg.contains("a.txt"));
        assert!(msg.contains("b.txt"));
        assert!(msg.contains("size"));
    }

    #[test]
    fn test_config_error_message_names_config() {
        let err = Error::config("bogus:x", ConfigErrorKind::UnsupportedProtocol);
        let msg = err.to_string();
        assert!(msg.contains("bogus:x"));
        assert!(msg.contains("unsupported protocol"));
    }
}
