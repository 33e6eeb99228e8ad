use medx_core::{CanonicalizationError, ExecutionId};
use medx_store::StoreError;
use thiserror::Error;

/// Errors that abort an execution before a record is written.
///
/// Per-directive failures (unreachable network, exhausted notification
/// retries) never surface here; they are recorded as outcome statuses.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// The directive snapshot could not be read or its audit entry written.
    #[error("directive snapshot failed: {0}")]
    Snapshot(#[from] StoreError),

    /// The verification digest could not be computed.
    #[error("execution record canonicalization failed: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    /// No execution with this id is in the ledger.
    #[error("execution {execution_id} not found")]
    NotFound { execution_id: ExecutionId },
}

/// A notification that was not acknowledged. Always retryable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// The target could not be reached.
    #[error("notification target unreachable: {reason}")]
    Unreachable { reason: String },

    /// The target answered but did not acknowledge.
    #[error("notification rejected with status {status}")]
    Rejected { status: u16 },

    /// The request timed out.
    #[error("notification timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Organ-network query failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// The network collaborator is down.
    #[error("organ network unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Anonymization collaborator failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnonymizeError {
    /// The anonymizer refused or failed to package the content.
    #[error("anonymization failed: {reason}")]
    Failed { reason: String },
}
