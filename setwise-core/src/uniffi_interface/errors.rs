use thiserror::Error as ThisError;
use uniffi::Error;

use crate::config::ConfigError;
use crate::error::{SessionError, StoreError};

#[derive(Debug, ThisError, Error)]
#[uniffi(flat_error)]
#[non_exhaustive]
pub enum SetwiseError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("backend unavailable: {0}")]
    Transient(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<SessionError> for SetwiseError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Validation(m) => SetwiseError::Validation(m),
            SessionError::Unauthorized(m) => SetwiseError::Unauthorized(m),
            SessionError::Transient(m) => SetwiseError::Transient(m),
            SessionError::NotFound(m) => SetwiseError::NotFound(m),
            SessionError::Storage(m) => SetwiseError::Storage(m),
        }
    }
}

impl From<StoreError> for SetwiseError {
    fn from(e: StoreError) -> Self {
        SessionError::from(e).into()
    }
}

impl From<ConfigError> for SetwiseError {
    fn from(e: ConfigError) -> Self {
        SetwiseError::Config(e.to_string())
    }
}

impl From<std::io::Error> for SetwiseError {
    fn from(e: std::io::Error) -> Self {
        SetwiseError::Storage(e.to_string())
    }
}
