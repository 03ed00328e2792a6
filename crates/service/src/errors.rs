use std::{io, path::PathBuf};

use thiserror::Error;

/// Failures raised by the JSON file stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("malformed store file {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("cannot read store file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot write store file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("value at key {key:?} has unexpected shape: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// Stable numeric code for external mapping/logging
    pub fn code(&self) -> u16 {
        match self {
            StoreError::Load { .. } => 2001,
            StoreError::Read { .. } => 2002,
            StoreError::Write { .. } => 2101,
            StoreError::Encode(_) => 2102,
            StoreError::Decode { .. } => 2201,
        }
    }

    pub(crate) fn decode(key: &str, source: serde_json::Error) -> Self {
        Self::Decode { key: key.to_string(), source }
    }
}
