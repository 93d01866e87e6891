use clinic_types::DocumentId;

/// Failures reported by a [`crate::store::DocumentStore`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(DocumentId),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("invalid write: {0}")]
    InvalidWrite(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("subscription failed: {0}")]
    Subscription(#[source] StoreError),
    #[error("write failed: {0}")]
    Write(#[source] StoreError),
    #[error("reconciler task is no longer running")]
    HandleClosed,
}

pub type NotifyResult<T> = std::result::Result<T, NotifyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_not_found_is_detected() {
        let id = DocumentId::parse("abc").unwrap();
        assert!(StoreError::NotFound(id).is_not_found());
        assert!(!StoreError::Unavailable("offline".into()).is_not_found());
    }

    #[test]
    fn test_write_error_keeps_store_error_as_source() {
        use std::error::Error;

        let err = NotifyError::Write(StoreError::PermissionDenied("rules".into()));
        assert_eq!(err.to_string(), "write failed: permission denied: rules");
        assert!(err.source().is_some());
    }
}
