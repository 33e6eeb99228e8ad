//! Hospital alerts raised after a successful emergency resolution.
//!
//! Delivery goes through the same [`NotificationChannel`] the executor
//! uses, bounded by `alerts.timeout_ms`. An undelivered alert is logged
//! and kept in the [`AlertLog`]; it never fails the resolution.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use medx_core::{DirectiveType, FacilityId, HospitalId, PatientIdHash, Timestamp};
use medx_executor::{
    notify_with_retry, NotificationChannel, NotificationPayload, NotificationTarget, RetryPolicy,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn default_timeout_ms() -> u64 {
    100
}

fn default_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        base_delay_ms: 20,
    }
}

fn default_history() -> usize {
    256
}

/// The `emergency.alerts` config section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Upper bound on alert delivery, retries included.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_retry")]
    pub retry: RetryPolicy,
    /// Alerts kept for `recent_alerts`.
    #[serde(default = "default_history")]
    pub history: usize,
    /// Per-hospital alert endpoints. Hospitals without one are alerted
    /// through whatever the channel does with an empty endpoint.
    #[serde(default)]
    pub endpoints: BTreeMap<HospitalId, String>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            retry: default_retry(),
            history: default_history(),
            endpoints: BTreeMap::new(),
        }
    }
}

impl AlertConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// One raised alert and whether the hospital acknowledged it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyAlert {
    pub alert_id: String,
    pub patient: PatientIdHash,
    pub hospital: HospitalId,
    pub situation: String,
    pub directive_type: DirectiveType,
    pub action_required: bool,
    pub raised_at: Timestamp,
    pub delivered: bool,
    pub attempts: u32,
}

/// Bounded, newest-last record of raised alerts.
#[derive(Debug)]
pub struct AlertLog {
    entries: Mutex<VecDeque<EmergencyAlert>>,
    capacity: usize,
}

impl AlertLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&self, alert: EmergencyAlert) {
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(alert);
    }

    /// Up to `limit` alerts, newest first.
    pub fn recent(&self, limit: usize) -> Vec<EmergencyAlert> {
        self.entries.lock().iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// What an alert says, before it gets an id.
#[derive(Debug, Clone)]
pub(crate) struct AlertDraft<'a> {
    pub patient: PatientIdHash,
    pub hospital: &'a HospitalId,
    pub situation: &'a str,
    pub directive_type: DirectiveType,
    pub action_required: bool,
    pub raised_at: Timestamp,
}

/// Sends alerts and remembers them.
pub struct AlertDispatcher {
    channel: Arc<dyn NotificationChannel>,
    config: AlertConfig,
    log: AlertLog,
}

impl AlertDispatcher {
    pub fn new(channel: Arc<dyn NotificationChannel>, config: AlertConfig) -> Self {
        Self {
            log: AlertLog::new(config.history),
            channel,
            config,
        }
    }

    pub fn recent_alerts(&self, limit: usize) -> Vec<EmergencyAlert> {
        self.log.recent(limit)
    }

    /// Deliver one alert within the configured timeout and record it.
    pub(crate) async fn raise(&self, draft: AlertDraft<'_>) -> EmergencyAlert {
        let alert_id = format!("ALERT-{}", Uuid::new_v4());
        let mut alert = EmergencyAlert {
            alert_id: alert_id.clone(),
            patient: draft.patient,
            hospital: draft.hospital.clone(),
            situation: draft.situation.to_string(),
            directive_type: draft.directive_type,
            action_required: draft.action_required,
            raised_at: draft.raised_at,
            delivered: false,
            attempts: 0,
        };

        match FacilityId::new(draft.hospital.as_str()) {
            Ok(facility) => {
                let target = NotificationTarget {
                    facility,
                    endpoint: self.config.endpoints.get(draft.hospital).cloned(),
                };
                let payload = NotificationPayload::EmergencyAlert {
                    alert_id,
                    patient: draft.patient,
                    hospital: draft.hospital.clone(),
                    situation: draft.situation.to_string(),
                    directive_type: draft.directive_type,
                    action_required: draft.action_required,
                };
                let send =
                    notify_with_retry(self.channel.as_ref(), &target, &payload, &self.config.retry);
                match tokio::time::timeout(self.config.timeout(), send).await {
                    Ok(delivery) => {
                        alert.delivered = delivery.delivered;
                        alert.attempts = delivery.attempts;
                    }
                    Err(_) => {
                        tracing::warn!(hospital = %draft.hospital, alert_id = %alert.alert_id, "emergency alert timed out");
                    }
                }
            }
            Err(err) => {
                tracing::warn!(hospital = %draft.hospital, error = %err, "hospital id is not a notification target");
            }
        }

        let outcome = if alert.delivered { "delivered" } else { "undelivered" };
        metrics::counter!("medx_emergency_alerts_total", "outcome" => outcome).increment(1);
        tracing::info!(
            patient = %alert.patient,
            hospital = %alert.hospital,
            alert_id = %alert.alert_id,
            delivered = alert.delivered,
            "emergency alert raised"
        );
        self.log.push(alert.clone());
        alert
    }
}

impl std::fmt::Debug for AlertDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertDispatcher")
            .field("timeout_ms", &self.config.timeout_ms)
            .field("logged", &self.log.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(n: u32) -> EmergencyAlert {
        EmergencyAlert {
            alert_id: format!("ALERT-{n}"),
            patient: PatientIdHash::from_patient_id("P1").unwrap(),
            hospital: HospitalId::new("H-1").unwrap(),
            situation: "cardiac_arrest".into(),
            directive_type: DirectiveType::Dnr,
            action_required: true,
            raised_at: Timestamp::from_epoch_secs(1_700_000_000).unwrap(),
            delivered: true,
            attempts: 1,
        }
    }

    #[test]
    fn recent_is_newest_first_and_bounded() {
        let log = AlertLog::new(3);
        for n in 1..=5 {
            log.push(alert(n));
        }
        assert_eq!(log.len(), 3);
        let ids: Vec<_> = log.recent(10).into_iter().map(|a| a.alert_id).collect();
        assert_eq!(ids, ["ALERT-5", "ALERT-4", "ALERT-3"]);
        assert_eq!(log.recent(1)[0].alert_id, "ALERT-5");
    }

    #[test]
    fn config_defaults_fill_missing_keys() {
        let cfg: AlertConfig = serde_yaml::from_str("timeout_ms: 40\nendpoints:\n  H-1: http://h1/alerts\n").unwrap();
        assert_eq!(cfg.timeout(), Duration::from_millis(40));
        assert_eq!(cfg.retry.max_attempts, 2);
        assert_eq!(cfg.history, 256);
        assert_eq!(
            cfg.endpoints.get(&HospitalId::new("H-1").unwrap()).map(String::as_str),
            Some("http://h1/alerts")
        );
    }
}
