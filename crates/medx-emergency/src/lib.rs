//! # medx-emergency: Emergency Directive Resolution
//!
//! Per-request state machine `RECEIVED → AUTHENTICATED → RESOLVED → LOGGED`,
//! with `REJECTED` reachable from any live state:
//!
//! - [`state`]: states and the recorded transition trace.
//! - [`resolver::EmergencyResolver`]: signing-service authentication, store
//!   lookup with the retention check, projection, audit.
//! - [`conditions`]: directive type to emergency-condition table and the
//!   latency budget.
//! - [`situation`]: confidence adjusted for the reported situation and vitals.
//! - [`alerts`]: hospital alerts sent through the executor's notification
//!   channel, and the recent-alert log.
//! - [`risk`]: rule-based recovery risk.

pub mod alerts;
pub mod conditions;
pub mod error;
pub mod resolver;
pub mod risk;
pub mod situation;
pub mod state;

pub use alerts::{AlertConfig, AlertDispatcher, AlertLog, EmergencyAlert};

pub use conditions::{EmergencyConditionTable, EmergencyConfig};
pub use error::ResolveError;
pub use resolver::{
    authorization_message, EmergencyDirective, EmergencyRequest, EmergencyResolver,
    EmergencyResponse,
};
pub use risk::{assess_risk, RiskAssessment, RiskQuery};
pub use situation::{assess_situation, Situation, SituationAssessment, Vitals};
pub use state::{ResolutionState, TransitionRecord};
