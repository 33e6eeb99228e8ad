//! # medx-executor: Post-Mortem Directive Execution
//!
//! Triggered by a verified death event. Reads the patient's directives once,
//! acts on organ-donation and data-sharing directives through outbound
//! collaborators, and seals an immutable [`ExecutionRecord`].
//!
//! ## Collaborators
//!
//! - [`OrganNetwork`]: candidate recipients per organ. [`WaitlistRegistry`]
//!   scores a configured waitlist in process.
//! - [`NotificationChannel`]: `notify(target, payload) → ack | error`.
//!   [`HttpNotificationChannel`] posts JSON; [`LoggingNotifier`] acks locally.
//! - [`Anonymizer`]: packages consented data. [`PseudonymizingAnonymizer`]
//!   replaces the patient hash with a salted pseudonym.
//!
//! Partial failure is a recorded status, never an aborted execution.

pub mod config;
pub mod engine;
pub mod error;
pub mod matching;
pub mod network;
pub mod notify;
pub mod record;
pub mod release;

pub use config::ExecutionConfig;
pub use engine::{DeathEvent, ExecutionEngine};
pub use error::{AnonymizeError, ExecutionError, NetworkError, NotifyError};
pub use matching::{
    rank_recipients, BloodType, CandidateRecipient, DonorProfile, RecipientMatch, UrgencyWeights,
};
pub use network::{OrganNetwork, WaitlistEntry, WaitlistRegistry};
pub use notify::{
    notify_with_retry, Delivery, HttpNotificationChannel, LoggingNotifier, NotificationChannel,
    NotificationPayload, NotificationTarget, RetryPolicy,
};
pub use record::{DirectiveOutcome, ExecutionRecord, OutcomeStatus};
pub use release::{AnonymizedPackage, Anonymizer, DataRelease, PseudonymizingAnonymizer, ResearchTarget};
