//! Error taxonomy shared by every core module.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("network error for {context}: {message}")]
    Network { context: String, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unsupported archive format: {0}")]
    UnsupportedFormat(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("{repo} has no older version to roll back to (current: {current})")]
    NoOlderVersion { repo: String, current: String },

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn network(context: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Error::Network {
            context: context.into(),
            message: err.to_string(),
        }
    }

    /// Map an I/O error from a filesystem mutation, keeping denials distinct
    /// from other failures.
    pub fn from_fs(action: &str, path: &std::path::Path, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::PermissionDenied {
            Error::Permission(format!("{} {}: {}", action, path.display(), err))
        } else {
            Error::Io(io::Error::new(
                err.kind(),
                format!("{} {}: {}", action, path.display(), err),
            ))
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Parse(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Parse(err.to_string())
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => Error::Io(e),
            other => Error::Parse(format!("invalid zip archive: {}", other)),
        }
    }
}
