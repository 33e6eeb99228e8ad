use medx_core::CanonicalizationError;
use thiserror::Error;

use crate::state::ResolutionState;

/// Errors from emergency resolution.
///
/// The first three are surfaced to the caller verbatim; none carries PHI.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// The requester's signature did not match, or the signing service
    /// failed or timed out.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// No directive is stored for the patient.
    #[error("no directive on file")]
    NotFound,

    /// Directives exist but have outlived their retention bound.
    #[error("directive retention period has expired")]
    RetentionExpired,

    /// A transition was attempted from the wrong state.
    #[error("invalid resolution transition from {from} to {to}")]
    InvalidTransition {
        from: ResolutionState,
        to: ResolutionState,
    },

    /// The audit entry could not be written.
    #[error("audit append failed: {0}")]
    Audit(#[from] CanonicalizationError),
}

impl ResolveError {
    /// Outcome code recorded in the audit log and metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "rejected:authentication_failed",
            Self::NotFound => "rejected:not_found",
            Self::RetentionExpired => "rejected:retention_expired",
            Self::InvalidTransition { .. } => "rejected:internal",
            Self::Audit(_) => "rejected:audit_failed",
        }
    }
}
