//! # Classification Metadata
//!
//! How a directive was classified travels with the stored record, so a
//! degraded extraction (escalation timed out, contraindications present)
//! stays visible to every later reader.

use serde::{Deserialize, Serialize};

/// Which tiers produced the classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMethod {
    /// Tier 1 pattern classifier only.
    LocalOnly,
    /// Tier 1 followed by an external escalation attempt.
    Escalated,
}

impl ProcessingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocalOnly => "local_only",
            Self::Escalated => "escalated",
        }
    }
}

impl std::fmt::Display for ProcessingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the Tier 2 escalation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationStatus {
    /// Tier 1 was confident enough.
    NotRequired,
    /// Tier 2 answered in time and its result was merged.
    Completed,
    /// Tier 2 exceeded the hard timeout; Tier 1 result stands.
    TimedOut,
    /// Tier 2 returned an error; Tier 1 result stands.
    Failed,
    /// Escalation was required but no Tier 2 classifier is configured.
    Unavailable,
}

impl EscalationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotRequired => "not_required",
            Self::Completed => "completed",
            Self::TimedOut => "timed_out",
            Self::Failed => "failed",
            Self::Unavailable => "unavailable",
        }
    }
}

impl std::fmt::Display for EscalationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification provenance stored on each directive record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationMetadata {
    pub method: ProcessingMethod,
    pub escalation: EscalationStatus,
    pub requires_human_review: bool,
    /// Conflicting signals found in the source text.
    #[serde(default)]
    pub contraindications: Vec<String>,
}

impl ClassificationMetadata {
    /// Metadata for a directive entered through a trusted, already-reviewed
    /// channel rather than free-text extraction.
    pub fn reviewed() -> Self {
        Self {
            method: ProcessingMethod::LocalOnly,
            escalation: EscalationStatus::NotRequired,
            requires_human_review: false,
            contraindications: Vec::new(),
        }
    }
}
