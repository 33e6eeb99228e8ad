//! # Error Types: Structured Error Hierarchy
//!
//! Error types shared by every crate in the workspace. All errors use
//! `thiserror` for derive-based `Display` and `Error` implementations.
//!
//! ## Design
//!
//! - Messages carry hashes, codes and scores, never raw patient identifiers
//!   or directive text.
//! - Validation errors name the offending field and the rejected value.

use thiserror::Error;

/// Top-level error type for the directive engine.
#[derive(Error, Debug)]
pub enum MedxError {
    /// Canonicalization failed.
    #[error("canonicalization error: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    /// A value failed domain validation.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Content integrity violation (digest mismatch, broken audit chain).
    #[error("integrity error: {0}")]
    Integrity(String),
}

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// Float values are not permitted in canonical representations.
    /// Scores must be carried as [`crate::Score`] basis points.
    #[error("float values are not permitted in canonical representations; use Score or an integer: {0}")]
    FloatRejected(f64),

    /// JSON serialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// Error raised by validated constructors of domain primitives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// An identifier was empty or whitespace only.
    #[error("{kind} must not be empty")]
    EmptyIdentifier {
        /// Which identifier namespace was being constructed.
        kind: &'static str,
    },

    /// A jurisdiction code did not match the accepted format.
    #[error("invalid jurisdiction code {code:?}: expected 2-8 chars of A-Z, 0-9 or '-'")]
    InvalidJurisdiction {
        /// The rejected code.
        code: String,
    },

    /// A score was outside `0..=10000` basis points.
    #[error("score {basis_points} exceeds 10000 basis points")]
    ScoreOutOfRange {
        /// The rejected raw value.
        basis_points: u32,
    },

    /// A hex string had the wrong length or contained non-hex characters.
    #[error("invalid hex for {kind}: {reason}")]
    InvalidHex {
        /// Which value was being parsed.
        kind: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// A timestamp string could not be parsed.
    #[error("invalid timestamp {value:?}: {reason}")]
    InvalidTimestamp {
        /// The rejected input.
        value: String,
        /// Parser diagnostic.
        reason: String,
    },

    /// A directive type, organ or category name was not recognised.
    #[error("unknown {kind}: {value:?}")]
    UnknownVariant {
        /// Which enum was being parsed.
        kind: &'static str,
        /// The rejected input.
        value: String,
    },

    /// A retention period of zero was configured.
    #[error("retention period for {jurisdiction} must be positive")]
    ZeroRetention {
        /// The jurisdiction carrying the bad bound.
        jurisdiction: String,
    },
}
