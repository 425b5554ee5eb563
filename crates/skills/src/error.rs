use std::path::PathBuf;

use crate::{fetch::FetchError, validate::ValidationReport};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{what} '{name}' not found")]
    NotFound { what: &'static str, name: String },

    #[error("invalid source: {reason}")]
    InvalidSource { reason: String },

    #[error("failed to fetch skill '{name}': {source}")]
    Fetch {
        name: String,
        #[source]
        source: FetchError,
    },

    #[error("skill '{name}' failed validation: {}", report.summary())]
    ValidationFailed {
        name: String,
        report: ValidationReport,
    },

    #[error("corrupt document {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error(transparent)]
    Registry(#[from] skillshelf_common::Error),

    #[error("failed to {operation} {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn not_found(what: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            name: name.into(),
        }
    }

    #[must_use]
    pub fn invalid_source(reason: impl Into<String>) -> Self {
        Self::InvalidSource {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

impl skillshelf_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

skillshelf_common::impl_context!();
