//! Error types shared by the store, the session manager and the bindings.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error as ThisError;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failures reported by a persistence or blob collaborator.
#[derive(Debug, ThisError)]
#[non_exhaustive]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store failure: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn not_found(entity: &str, id: i32) -> Self {
        StoreError::NotFound(format!("{} {}", entity, id))
    }

    pub fn forbidden(entity: &str, id: i32) -> Self {
        StoreError::Forbidden(format!("{} {} belongs to another user", entity, id))
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<DieselError> for StoreError {
    fn from(e: DieselError) -> Self {
        match e {
            DieselError::NotFound => StoreError::NotFound("record".to_string()),
            DieselError::DatabaseError(kind, info) => match kind {
                DatabaseErrorKind::UniqueViolation
                | DatabaseErrorKind::ForeignKeyViolation
                | DatabaseErrorKind::NotNullViolation
                | DatabaseErrorKind::CheckViolation => {
                    StoreError::Invalid(info.message().to_string())
                }
                _ => {
                    let message = info.message().to_string();
                    if message.contains("locked") || message.contains("busy") {
                        StoreError::Unavailable(message)
                    } else {
                        StoreError::Internal(message)
                    }
                }
            },
            other => StoreError::Internal(other.to_string()),
        }
    }
}

impl From<diesel::r2d2::PoolError> for StoreError {
    fn from(e: diesel::r2d2::PoolError) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(e: tokio::task::JoinError) -> Self {
        StoreError::Internal(format!("store task failed: {}", e))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => StoreError::NotFound(e.to_string()),
            std::io::ErrorKind::PermissionDenied => StoreError::Forbidden(e.to_string()),
            std::io::ErrorKind::Interrupted
            | std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::WouldBlock => StoreError::Unavailable(e.to_string()),
            _ => StoreError::Internal(e.to_string()),
        }
    }
}

/// Coarse classification callers branch on (retry, re-authenticate, show a
/// corrective message, give up).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Unauthorized,
    Transient,
    NotFound,
    Storage,
}

/// Failures surfaced by the session manager and the auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum SessionError {
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
}

impl SessionError {
    pub fn validation(message: impl Into<String>) -> Self {
        SessionError::Validation(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Validation(_) => ErrorKind::Validation,
            SessionError::Unauthorized(_) => ErrorKind::Unauthorized,
            SessionError::Transient(_) => ErrorKind::Transient,
            SessionError::NotFound(_) => ErrorKind::NotFound,
            SessionError::Storage(_) => ErrorKind::Storage,
        }
    }
}

impl From<StoreError> for SessionError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(m) => SessionError::NotFound(m),
            StoreError::Forbidden(m) => SessionError::Unauthorized(m),
            StoreError::Invalid(m) => SessionError::Validation(m),
            StoreError::Unavailable(m) => SessionError::Transient(m),
            StoreError::Internal(m) => SessionError::Storage(m),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_onto_session_kinds() {
        let cases = [
            (StoreError::not_found("plan", 3), ErrorKind::NotFound),
            (StoreError::forbidden("plan", 3), ErrorKind::Unauthorized),
            (StoreError::Invalid("bad".into()), ErrorKind::Validation),
            (StoreError::Unavailable("down".into()), ErrorKind::Transient),
            (StoreError::Internal("boom".into()), ErrorKind::Storage),
        ];
        for (store_err, kind) in cases {
            assert_eq!(SessionError::from(store_err).kind(), kind);
        }
    }

    #[test]
    fn only_unavailable_is_transient() {
        assert!(StoreError::Unavailable("x".into()).is_transient());
        assert!(!StoreError::Internal("x".into()).is_transient());
        assert!(!StoreError::not_found("session", 1).is_transient());
    }

    #[test]
    fn diesel_not_found_maps_to_not_found() {
        let err = StoreError::from(DieselError::NotFound);
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
