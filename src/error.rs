use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the streaming record engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Operation invoked on a reader constructed without sources.
    #[error("reader is empty")]
    Empty,

    /// The target array key never appeared in the document.
    #[error("{key} not found")]
    KeyNotFound { key: String },

    /// Token or value decoding failed while streaming a container.
    #[error("record decode failed: {message}")]
    Decode { message: String },

    /// A generic record could not be converted into the caller's shape.
    #[error("record conversion failed: {message}")]
    Conversion { message: String },

    /// A record could not be serialized into a container.
    #[error("record serialization failed: {message}")]
    Serialization { message: String },

    #[error("invalid sort options: {message}")]
    Config { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A container file could not be removed after retries.
    #[error("failed to remove {}: {source}", path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn conversion(err: serde_json::Error) -> Self {
        Error::Conversion {
            message: err.to_string(),
        }
    }

    pub(crate) fn serialization(err: serde_json::Error) -> Self {
        Error::Serialization {
            message: err.to_string(),
        }
    }

    pub(crate) fn decode(err: serde_json::Error) -> Self {
        Error::Decode {
            message: err.to_string(),
        }
    }
}
