//! Error taxonomy shared by every pipeline stage.
//!
//! | Variant | Raised by | HTTP mapping |
//! |---------|-----------|--------------|
//! | [`Error::Configuration`] | config validation, chunker, retriever, generation params | `400 bad_request` |
//! | [`Error::Storage`] | loader, index persist/load, duplicate ids | `500 storage_error` |
//! | [`Error::Model`] | embedder and language-model backends | `503 model_unavailable` |
//! | [`Error::ModelUnavailable`] | generation timeouts, unreachable backends | `503 model_unavailable` |
//!
//! Library code returns [`Result`]; the CLI wraps it in `anyhow` at the edges.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Error::Model(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Error::ModelUnavailable(msg.into())
    }

    /// True for the two model-side variants.
    pub fn is_model_failure(&self) -> bool {
        matches!(self, Error::Model(_) | Error::ModelUnavailable(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            Error::ModelUnavailable(e.to_string())
        } else {
            Error::Model(e.to_string())
        }
    }
}
