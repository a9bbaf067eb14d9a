use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type MigrationResult<T> = Result<T, MigrationError>;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("unknown version `{0}`")]
    UnknownVersion(String),
    #[error("nothing to convert from `{from}` to `{to}`")]
    NothingToDo { from: String, to: String },
    #[error("conversion from `{from}` to `{to}` is not supported")]
    Unimplemented { from: String, to: String },
    #[error("unsupported operating system `{0}`")]
    UnsupportedOs(String),
    #[error("malformed document {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },
    #[error("corrupt state at {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },
    #[error("unknown reference at {}: {reason}", path.display())]
    UnknownReference { path: PathBuf, reason: String },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl MigrationError {
    pub fn malformed(path: &Path, reason: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn corrupt(path: &Path, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn unknown_reference(path: &Path, reason: impl Into<String>) -> Self {
        Self::UnknownReference {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Stable code used in reports and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownVersion(_) => "UNKNOWN_VERSION",
            Self::NothingToDo { .. } => "NOTHING_TO_DO",
            Self::Unimplemented { .. } => "UNIMPLEMENTED_STEP",
            Self::UnsupportedOs(_) => "UNSUPPORTED_OS",
            Self::Malformed { .. } => "MALFORMED_DOCUMENT",
            Self::Corrupt { .. } => "CORRUPT_STATE",
            Self::UnknownReference { .. } => "UNKNOWN_REFERENCE",
            Self::Io { .. } => "IO",
        }
    }
}

/// Attach a lazily built message to an I/O failure, in the spirit of
/// `anyhow::Context::with_context`.
pub trait IoContext<T> {
    fn io_context<F>(self, context: F) -> MigrationResult<T>
    where
        F: FnOnce() -> String;
}

impl<T> IoContext<T> for io::Result<T> {
    fn io_context<F>(self, context: F) -> MigrationResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|source| MigrationError::Io {
            context: context(),
            source,
        })
    }
}
