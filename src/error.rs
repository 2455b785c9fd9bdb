// ❗ Error taxonomy for the balance ledger
//
// Core reconciliation is infallible on well-typed input. Everything that can
// fail lives around it: account lookup, input validation, persistence.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Account reference (credit card number) not known to the store
    #[error("unknown account: {0}")]
    UnknownAccount(String),

    /// Malformed observation, rejected before reconciliation
    #[error("invalid observation: {0}")]
    InvalidObservation(String),

    /// Malformed user or card payload
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    Duplicate(String),

    /// Concurrent write on the same account; caller should re-read and retry
    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    /// Errors caused by the caller's request rather than by the service
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            LedgerError::UnknownAccount(_)
                | LedgerError::InvalidObservation(_)
                | LedgerError::Validation(_)
                | LedgerError::NotFound(_)
                | LedgerError::Duplicate(_)
        )
    }

    /// Stable machine-readable code for API payloads
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::UnknownAccount(_) => "UNKNOWN_ACCOUNT",
            LedgerError::InvalidObservation(_) => "INVALID_OBSERVATION",
            LedgerError::Validation(_) => "VALIDATION",
            LedgerError::NotFound(_) => "NOT_FOUND",
            LedgerError::Duplicate(_) => "DUPLICATE",
            LedgerError::Conflict(_) => "CONFLICT",
            LedgerError::Database(_) => "DATABASE",
            LedgerError::Json(_) => "JSON",
            LedgerError::Csv(_) => "CSV",
            LedgerError::Io(_) => "IO",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors() {
        assert!(LedgerError::UnknownAccount("4111".into()).is_client_error());
        assert!(LedgerError::InvalidObservation("bad date".into()).is_client_error());
        assert!(!LedgerError::Conflict("card 4111".into()).is_client_error());
        assert!(!LedgerError::Database(rusqlite::Error::InvalidQuery).is_client_error());
    }

    #[test]
    fn test_error_display() {
        let err = LedgerError::UnknownAccount("4111-0000".to_string());
        assert_eq!(err.to_string(), "unknown account: 4111-0000");
        assert_eq!(err.code(), "UNKNOWN_ACCOUNT");
    }
}
