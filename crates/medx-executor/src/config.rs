//! Settings read from the `execution` config section.

use std::time::Duration;

use medx_core::Organ;
use serde::{Deserialize, Serialize};

use crate::matching::UrgencyWeights;
use crate::network::WaitlistEntry;
use crate::notify::{NotificationTarget, RetryPolicy};
use crate::release::ResearchTarget;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Recipients notified per organ.
    pub top_n: usize,
    pub retry: RetryPolicy,
    pub urgency_weights: UrgencyWeights,
    pub research_targets: Vec<ResearchTarget>,
    /// Organs offered when a donation directive names none.
    pub default_organs: Vec<Organ>,
    /// In-process waitlist used when no external organ network is wired.
    pub waitlist: Vec<WaitlistEntry>,
    pub notification_timeout_ms: u64,
    /// Salt for the in-process pseudonymizer.
    pub anonymization_salt: String,
    /// EHR system told the status of each acted-on directive. No updates
    /// are sent when unset.
    pub ehr: Option<NotificationTarget>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            top_n: 3,
            retry: RetryPolicy::default(),
            urgency_weights: UrgencyWeights::default(),
            research_targets: Vec::new(),
            default_organs: vec![
                Organ::Kidney,
                Organ::Liver,
                Organ::Heart,
                Organ::Lung,
                Organ::Cornea,
            ],
            waitlist: Vec::new(),
            notification_timeout_ms: 5_000,
            anonymization_salt: "medx".to_string(),
            ehr: None,
        }
    }
}

impl ExecutionConfig {
    pub fn notification_timeout(&self) -> Duration {
        Duration::from_millis(self.notification_timeout_ms)
    }
}
