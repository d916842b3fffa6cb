//! Error types. None of these escape the engine's public decision operations; they are
//! returned by store implementations and registry loading only.

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failures from a key-value backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {message}")]
    Backend { message: String },

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed stored record: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Failures while building a registry from a host document.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("survey definition for {id:?} is not an object")]
    NotAnObject { id: String },

    #[error("survey definition without a usable id")]
    MissingId,

    #[error("registry document must be an object or an array")]
    UnsupportedShape,
}
