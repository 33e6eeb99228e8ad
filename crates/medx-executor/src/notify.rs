//! # Outbound Notifications
//!
//! Transplant centers, research institutions, hospital alerting and the EHR
//! are reached only through a [`NotificationChannel`]. Any non-ack is a retryable failure;
//! [`notify_with_retry`] retries with exponential backoff up to the
//! configured attempt count and reports what happened instead of failing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use medx_core::{
    DirectiveType, ExecutionId, FacilityId, HospitalId, InstitutionCategory, Organ, PatientIdHash,
    RecipientId,
};
use serde::{Deserialize, Serialize};

use crate::error::NotifyError;
use crate::record::OutcomeStatus;
use crate::release::AnonymizedPackage;

/// Where a notification goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationTarget {
    pub facility: FacilityId,
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Body of an outbound notification. Carries hashes and references only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationPayload {
    OrganOffer {
        execution_id: ExecutionId,
        donor: PatientIdHash,
        organ: Organ,
        recipient: RecipientId,
        urgency_tier: u8,
    },
    DataRelease {
        execution_id: ExecutionId,
        institution: FacilityId,
        category: InstitutionCategory,
        package: AnonymizedPackage,
    },
    /// Raised to the requesting hospital after an emergency resolution.
    EmergencyAlert {
        alert_id: String,
        patient: PatientIdHash,
        hospital: HospitalId,
        situation: String,
        directive_type: DirectiveType,
        action_required: bool,
    },
    /// Post-execution status of one directive, for the patient's EHR.
    EhrStatusUpdate {
        execution_id: ExecutionId,
        patient: PatientIdHash,
        directive_type: DirectiveType,
        status: OutcomeStatus,
    },
}

impl NotificationPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OrganOffer { .. } => "organ_offer",
            Self::DataRelease { .. } => "data_release",
            Self::EmergencyAlert { .. } => "emergency_alert",
            Self::EhrStatusUpdate { .. } => "ehr_status_update",
        }
    }
}

/// Outbound `notify(target, payload) → ack | error`.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn notify(
        &self,
        target: &NotificationTarget,
        payload: &NotificationPayload,
    ) -> Result<(), NotifyError>;
}

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    200
}

/// Bounded retry with doubling delay: 200ms, 400ms, ... by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first. Values below 1 mean 1.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl RetryPolicy {
    /// Delay after the failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

/// What [`notify_with_retry`] observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: bool,
    pub attempts: u32,
    pub last_error: Option<NotifyError>,
}

/// Send until acknowledged or the attempt budget is spent.
pub async fn notify_with_retry(
    channel: &dyn NotificationChannel,
    target: &NotificationTarget,
    payload: &NotificationPayload,
    policy: &RetryPolicy,
) -> Delivery {
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        match channel.notify(target, payload).await {
            Ok(()) => {
                metrics::counter!("medx_notifications_total", "outcome" => "delivered").increment(1);
                return Delivery {
                    delivered: true,
                    attempts: attempt,
                    last_error: None,
                };
            }
            Err(e) => {
                tracing::warn!(
                    attempt,
                    max_attempts,
                    facility = %target.facility,
                    kind = payload.kind(),
                    "notification failed: {e}"
                );
                last_error = Some(e);
                if attempt < max_attempts {
                    tokio::time::sleep(policy.delay_after(attempt)).await;
                }
            }
        }
    }

    metrics::counter!("medx_notifications_total", "outcome" => "exhausted").increment(1);
    Delivery {
        delivered: false,
        attempts: max_attempts,
        last_error,
    }
}

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

/// Acknowledges everything and logs it. Used when no outbound endpoint is
/// configured.
#[derive(Debug, Default)]
pub struct LoggingNotifier {
    sent: AtomicU64,
}

impl LoggingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl NotificationChannel for LoggingNotifier {
    async fn notify(
        &self,
        target: &NotificationTarget,
        payload: &NotificationPayload,
    ) -> Result<(), NotifyError> {
        self.sent.fetch_add(1, Ordering::Relaxed);
        tracing::info!(facility = %target.facility, kind = payload.kind(), "notification acknowledged");
        Ok(())
    }
}

/// POSTs the payload as JSON to `target.endpoint`.
#[derive(Debug, Clone)]
pub struct HttpNotificationChannel {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpNotificationChannel {
    pub fn new(timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Unreachable {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl NotificationChannel for HttpNotificationChannel {
    async fn notify(
        &self,
        target: &NotificationTarget,
        payload: &NotificationPayload,
    ) -> Result<(), NotifyError> {
        let Some(endpoint) = target.endpoint.as_deref() else {
            return Err(NotifyError::Unreachable {
                reason: format!("no endpoint configured for {}", target.facility),
            });
        };
        let url = endpoint.trim_end_matches('/');

        let resp = self.client.post(url).json(payload).send().await.map_err(|e| {
            if e.is_timeout() {
                NotifyError::Timeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                }
            } else {
                NotifyError::Unreachable {
                    reason: format!("POST {url}: {e}"),
                }
            }
        })?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(NotifyError::Rejected {
                status: status.as_u16(),
            })
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use std::sync::atomic::AtomicU32;

    /// Fails the first `failures` calls, then acks. Counts every call.
    #[derive(Debug, Default)]
    pub struct FlakyChannel {
        pub failures: u32,
        pub calls: AtomicU32,
    }

    impl FlakyChannel {
        pub fn failing(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
            }
        }

        pub fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NotificationChannel for FlakyChannel {
        async fn notify(
            &self,
            _target: &NotificationTarget,
            _payload: &NotificationPayload,
        ) -> Result<(), NotifyError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(NotifyError::Rejected { status: 503 })
            } else {
                Ok(())
            }
        }
    }
}
