//! # Resolution State Machine
//!
//! ```text
//! RECEIVED ──► AUTHENTICATED ──► RESOLVED ──► LOGGED
//!     │              │               │
//!     └──────────────┴───────────────┴──► REJECTED
//! ```
//!
//! `LOGGED` and `REJECTED` are terminal. Every transition is recorded with
//! the milliseconds elapsed since the request was received.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::ResolveError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionState {
    Received,
    Authenticated,
    Resolved,
    Logged,
    Rejected,
}

impl ResolutionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "RECEIVED",
            Self::Authenticated => "AUTHENTICATED",
            Self::Resolved => "RESOLVED",
            Self::Logged => "LOGGED",
            Self::Rejected => "REJECTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Logged | Self::Rejected)
    }
}

impl std::fmt::Display for ResolutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: ResolutionState,
    pub to: ResolutionState,
    pub reason: String,
    pub elapsed_ms: u64,
}

/// Per-request state plus its transition trace.
#[derive(Debug)]
pub(crate) struct Resolution {
    state: ResolutionState,
    transitions: Vec<TransitionRecord>,
    started: Instant,
}

impl Resolution {
    pub(crate) fn received() -> Self {
        Self {
            state: ResolutionState::Received,
            transitions: Vec::new(),
            started: Instant::now(),
        }
    }

    pub(crate) fn state(&self) -> ResolutionState {
        self.state
    }

    pub(crate) fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Advance from `expected` to `to`.
    pub(crate) fn advance(
        &mut self,
        expected: ResolutionState,
        to: ResolutionState,
        reason: &str,
    ) -> Result<(), ResolveError> {
        self.require_state(expected, to)?;
        self.do_transition(to, reason);
        Ok(())
    }

    /// Move to `REJECTED` from any non-terminal state.
    pub(crate) fn reject(&mut self, reason: &str) {
        if !self.state.is_terminal() {
            self.do_transition(ResolutionState::Rejected, reason);
        }
    }

    pub(crate) fn into_trace(self) -> Vec<TransitionRecord> {
        self.transitions
    }

    fn require_state(&self, expected: ResolutionState, to: ResolutionState) -> Result<(), ResolveError> {
        if self.state.is_terminal() || self.state != expected {
            return Err(ResolveError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        Ok(())
    }

    fn do_transition(&mut self, to: ResolutionState, reason: &str) {
        self.transitions.push(TransitionRecord {
            from: self.state,
            to,
            reason: reason.to_string(),
            elapsed_ms: self.elapsed_ms(),
        });
        self.state = to;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ResolutionState::*;

    #[test]
    fn happy_path() {
        let mut r = Resolution::received();
        r.advance(Received, Authenticated, "signature verified").unwrap();
        r.advance(Authenticated, Resolved, "directive found").unwrap();
        r.advance(Resolved, Logged, "audit appended").unwrap();
        let trace = r.into_trace();
        let path: Vec<_> = trace.iter().map(|t| t.to).collect();
        assert_eq!(path, vec![Authenticated, Resolved, Logged]);
    }

    #[test]
    fn skipping_a_state_is_rejected() {
        let mut r = Resolution::received();
        let err = r.advance(Authenticated, Resolved, "x").unwrap_err();
        assert!(matches!(err, ResolveError::InvalidTransition { from: Received, to: Resolved }));
    }

    #[test]
    fn reject_from_any_live_state_and_stays_terminal() {
        let mut r = Resolution::received();
        r.advance(Received, Authenticated, "ok").unwrap();
        r.reject("not found");
        assert_eq!(r.state(), Rejected);
        r.reject("again");
        assert!(r.advance(Rejected, Logged, "x").is_err());
        assert_eq!(r.into_trace().len(), 2);
    }

    #[test]
    fn wire_names() {
        assert_eq!(serde_json::to_string(&Authenticated).unwrap(), "\"AUTHENTICATED\"");
    }
}
