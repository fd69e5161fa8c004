//! Domain error taxonomy shared by the approval, outbox and scanner subsystems.

use thiserror::Error;

use crate::blockchain::BlockchainError;

/// Errors surfaced by the disbursement core.
#[derive(Debug, Error)]
pub enum DisburseError {
    /// Referenced intent, job, token or chain object does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed request input.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// RPC dial/call failure or a receipt that is not visible yet.
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    /// Signing or serialization failed; the inputs themselves are unusable.
    #[error("Terminal submission error: {0}")]
    TerminalSubmission(String),

    /// A block or transaction row was already persisted.
    #[error("Reconciliation conflict: {0}")]
    ReconciliationConflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl DisburseError {
    /// Whether a later tick may succeed where this attempt failed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientNetwork(_) | Self::Database(_))
    }
}

impl From<BlockchainError> for DisburseError {
    fn from(err: BlockchainError) -> Self {
        match err {
            BlockchainError::Wallet(msg) | BlockchainError::Encoding(msg) => {
                Self::TerminalSubmission(msg)
            }
            BlockchainError::NotFound(msg) => Self::NotFound(msg),
            other => Self::TransientNetwork(other.to_string()),
        }
    }
}

/// Result type for the disbursement core.
pub type DisburseResult<T> = Result<T, DisburseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blockchain_error_mapping() {
        let err: DisburseError = BlockchainError::Wallet("bad key".into()).into();
        assert!(matches!(err, DisburseError::TerminalSubmission(_)));

        let err: DisburseError = BlockchainError::Timeout(100).into();
        assert!(matches!(err, DisburseError::TransientNetwork(_)));
        assert!(err.is_transient());

        let err: DisburseError = BlockchainError::NotFound("block 7".into()).into();
        assert!(matches!(err, DisburseError::NotFound(_)));
        assert!(!err.is_transient());
    }
}
