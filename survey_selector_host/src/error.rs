use thiserror::Error;

use survey_selector_core::{RegistryError, StoreError};

pub type HostResult<T> = Result<T, HostError>;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid survey registry: {0}")]
    Registry(#[from] RegistryError),

    #[error("quarantine store failure: {0}")]
    Store(#[from] StoreError),
}

impl HostError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        HostError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
