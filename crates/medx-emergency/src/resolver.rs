//! # Emergency Resolver
//!
//! The time-critical read path. A hospital presents a signature over
//! `(patient, hospital, situation)`; the resolver asks the signing service
//! for the signature it would produce for that hospital's derivation path
//! and compares the two in constant time.
//!
//! ## Security Invariant
//!
//! - No store read happens before authentication succeeds.
//! - Exactly one audit entry (READ, purpose `emergency`) is appended per call,
//!   whatever the outcome, including authentication failure.
//! - Error responses carry no directive content.
//!
//! The resolver only reads stored, already-classified records. It never runs
//! extraction.
//!
//! After the audit entry is written, the stored confidence is adjusted for
//! the reported situation and vitals, and, when an [`AlertDispatcher`] is
//! attached, the requesting hospital is alerted. Neither step can turn a
//! resolved request into an error.

use std::sync::Arc;

use medx_core::{
    AccessorId, CanonicalBytes, CanonicalizationError, DirectiveType, HospitalId, PatientIdHash,
    Score, Timestamp,
};
use medx_crypto::{signatures_match, DerivationPath, Ed25519Signature, SigningService};
use medx_executor::NotificationChannel;
use medx_store::{
    AuditAction, AuditEvent, AuditPurpose, DirectiveRecord, DirectiveStore, LookupStatus,
};
use serde::{Deserialize, Serialize};

use crate::alerts::{AlertDispatcher, AlertDraft, EmergencyAlert};
use crate::conditions::{EmergencyConditionTable, EmergencyConfig};
use crate::error::ResolveError;
use crate::situation::{assess_situation, SituationAssessment, Vitals};
use crate::state::{Resolution, ResolutionState, TransitionRecord};

/// An authenticated lookup request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyRequest {
    pub patient: PatientIdHash,
    pub hospital: HospitalId,
    pub situation: String,
    pub signature: Ed25519Signature,
    /// Bedside readings. Not covered by the signature.
    #[serde(default)]
    pub vitals: Option<Vitals>,
}

#[derive(Serialize)]
struct AuthorizationMessage<'a> {
    patient_id_hash: String,
    hospital_id: &'a str,
    situation: &'a str,
}

/// The canonical bytes a hospital signs to request emergency access.
pub fn authorization_message(
    patient: &PatientIdHash,
    hospital: &HospitalId,
    situation: &str,
) -> Result<CanonicalBytes, CanonicalizationError> {
    CanonicalBytes::new(&AuthorizationMessage {
        patient_id_hash: patient.to_hex(),
        hospital_id: hospital.as_str(),
        situation,
    })
}

/// Emergency-safe projection of a stored record. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyDirective {
    pub directive_type: DirectiveType,
    pub summary: String,
    pub confidence: Score,
    pub legal_validity: Score,
    /// When the directive was last updated.
    pub recorded_at: Timestamp,
    pub emergency_conditions: Vec<String>,
    /// Conditions extracted from the directive itself.
    pub directive_conditions: Vec<String>,
    pub requires_human_review: bool,
}

/// Successful resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyResponse {
    pub directive: EmergencyDirective,
    /// True when the emergency condition list is non-empty.
    pub action_required: bool,
    pub assessment: SituationAssessment,
    /// Id of the alert raised to the hospital, when alerting is on.
    #[serde(default)]
    pub alert_id: Option<String>,
    pub trace: Vec<TransitionRecord>,
    pub elapsed_ms: u64,
}

/// Authenticates, resolves and audits emergency lookups.
pub struct EmergencyResolver {
    store: Arc<DirectiveStore>,
    signer: Arc<dyn SigningService>,
    conditions: EmergencyConditionTable,
    config: EmergencyConfig,
    alerts: Option<AlertDispatcher>,
}

impl EmergencyResolver {
    pub fn new(
        store: Arc<DirectiveStore>,
        signer: Arc<dyn SigningService>,
        config: EmergencyConfig,
    ) -> Self {
        Self {
            store,
            signer,
            conditions: config.condition_table(),
            config,
            alerts: None,
        }
    }

    /// Alert requesting hospitals through `channel` after each resolution.
    pub fn with_alerts(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.alerts = Some(AlertDispatcher::new(channel, self.config.alerts.clone()));
        self
    }

    pub fn config(&self) -> &EmergencyConfig {
        &self.config
    }

    /// Up to `limit` raised alerts, newest first. Empty when alerting is off.
    pub fn recent_alerts(&self, limit: usize) -> Vec<EmergencyAlert> {
        self.alerts
            .as_ref()
            .map(|a| a.recent_alerts(limit))
            .unwrap_or_default()
    }

    /// Resolve one request. See the module docs for the audit guarantee.
    pub async fn resolve(&self, request: &EmergencyRequest) -> Result<EmergencyResponse, ResolveError> {
        let started = std::time::Instant::now();
        let mut resolution = Resolution::received();

        let result = self.run(request, &mut resolution).await;
        let accessor = AccessorId::hospital(&request.hospital);

        let (event, outcome) = match &result {
            Ok(record) => (
                AuditEvent::new(request.patient, accessor, AuditAction::Read, AuditPurpose::Emergency)
                    .with_directive_type(record.directive_type),
                "ok",
            ),
            Err(err) => {
                resolution.reject(err.outcome());
                (
                    AuditEvent::new(request.patient, accessor, AuditAction::Read, AuditPurpose::Emergency)
                        .with_outcome(err.outcome()),
                    err.outcome(),
                )
            }
        };

        let audited = self.store.audit_log().record(event);
        let elapsed = started.elapsed();
        metrics::histogram!("medx_emergency_resolve_seconds").record(elapsed.as_secs_f64());

        if elapsed > self.config.latency_budget() {
            tracing::warn!(
                patient = %request.patient,
                hospital = %request.hospital,
                elapsed_ms = elapsed.as_millis() as u64,
                budget_ms = self.config.latency_budget_ms,
                "emergency resolution exceeded latency budget"
            );
        }

        if let Err(err) = audited {
            tracing::error!(patient = %request.patient, error = %err, "emergency audit append failed");
            resolution.reject("audit append failed");
            metrics::counter!("medx_emergency_resolutions_total", "outcome" => "rejected:audit_failed")
                .increment(1);
            return Err(ResolveError::Audit(err));
        }
        metrics::counter!("medx_emergency_resolutions_total", "outcome" => outcome).increment(1);

        let record = match result {
            Ok(record) => record,
            Err(err) => {
                tracing::info!(
                    patient = %request.patient,
                    hospital = %request.hospital,
                    outcome,
                    "emergency resolution rejected"
                );
                return Err(err);
            }
        };

        resolution.advance(ResolutionState::Resolved, ResolutionState::Logged, "audit appended")?;
        let directive = self.project(&record);
        let action_required = !directive.emergency_conditions.is_empty();
        let assessment = assess_situation(
            directive.directive_type,
            directive.confidence,
            &request.situation,
            request.vitals.as_ref(),
        );
        let alert_id = match &self.alerts {
            Some(alerts) => {
                let alert = alerts
                    .raise(AlertDraft {
                        patient: request.patient,
                        hospital: &request.hospital,
                        situation: &request.situation,
                        directive_type: directive.directive_type,
                        action_required,
                        raised_at: self.store.now(),
                    })
                    .await;
                Some(alert.alert_id)
            }
            None => None,
        };
        tracing::info!(
            patient = %request.patient,
            hospital = %request.hospital,
            directive_type = %directive.directive_type,
            adjusted_confidence = %assessment.adjusted_confidence,
            elapsed_ms = resolution.elapsed_ms(),
            "emergency directive resolved"
        );
        Ok(EmergencyResponse {
            directive,
            action_required,
            assessment,
            alert_id,
            elapsed_ms: resolution.elapsed_ms(),
            trace: resolution.into_trace(),
        })
    }

    /// RECEIVED → AUTHENTICATED → RESOLVED.
    async fn run(
        &self,
        request: &EmergencyRequest,
        resolution: &mut Resolution,
    ) -> Result<DirectiveRecord, ResolveError> {
        self.authenticate(request).await?;
        resolution.advance(
            ResolutionState::Received,
            ResolutionState::Authenticated,
            "signature verified",
        )?;

        let record = match self.store.lookup_status(&request.patient) {
            LookupStatus::Found(record) => record,
            LookupStatus::Expired { .. } => return Err(ResolveError::RetentionExpired),
            LookupStatus::Absent => return Err(ResolveError::NotFound),
        };
        resolution.advance(
            ResolutionState::Authenticated,
            ResolutionState::Resolved,
            "directive found",
        )?;
        Ok(record)
    }

    async fn authenticate(&self, request: &EmergencyRequest) -> Result<(), ResolveError> {
        let message = authorization_message(&request.patient, &request.hospital, &request.situation)
            .map_err(|_| ResolveError::AuthenticationFailed)?;
        let path = DerivationPath::for_hospital(&request.hospital);

        let expected = match tokio::time::timeout(
            self.config.latency_budget(),
            self.signer.sign(&message, &path),
        )
        .await
        {
            Ok(Ok(sig)) => sig,
            Ok(Err(err)) => {
                tracing::warn!(hospital = %request.hospital, error = %err, "signing service failed");
                return Err(ResolveError::AuthenticationFailed);
            }
            Err(_) => {
                tracing::warn!(hospital = %request.hospital, "signing service timed out");
                return Err(ResolveError::AuthenticationFailed);
            }
        };

        if signatures_match(&expected, &request.signature) {
            Ok(())
        } else {
            Err(ResolveError::AuthenticationFailed)
        }
    }

    fn project(&self, record: &DirectiveRecord) -> EmergencyDirective {
        let base = match record.directive_type {
            DirectiveType::Dnr => "Do not resuscitate",
            DirectiveType::OrganDonation => "Registered organ donor",
            DirectiveType::DataConsent => "Research data-sharing consent",
            DirectiveType::PowerOfAttorney => "Healthcare power of attorney on file",
            DirectiveType::LivingWill => "Living will on file",
        };
        let summary = if record.conditions.is_empty() {
            base.to_string()
        } else {
            format!("{base}: {}", record.conditions.join("; "))
        };

        EmergencyDirective {
            directive_type: record.directive_type,
            summary,
            confidence: record.confidence,
            legal_validity: record.legal_validity,
            recorded_at: record.updated_at,
            emergency_conditions: self.conditions.conditions_for(record.directive_type).to_vec(),
            directive_conditions: record.conditions.clone(),
            requires_human_review: record.classification.requires_human_review,
        }
    }
}

impl std::fmt::Debug for EmergencyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmergencyResolver")
            .field("latency_budget_ms", &self.config.latency_budget_ms)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use medx_core::{
        sha256_digest, BlobRef, ClassificationMetadata, JurisdictionCode, ManualClock,
        RetentionPeriod, RetentionPolicyTable,
    };
    use medx_crypto::{CryptoError, DerivedKeySigner, Ed25519PublicKey};
    use medx_store::DirectiveDraft;
    use std::time::Duration;

    const SEED: [u8; 32] = [42u8; 32];

    fn t0() -> Timestamp {
        Timestamp::from_epoch_secs(1_700_000_000).unwrap()
    }

    fn patient() -> PatientIdHash {
        PatientIdHash::from_patient_id("P1").unwrap()
    }

    fn hospital() -> HospitalId {
        HospitalId::new("H-1").unwrap()
    }

    fn dnr_draft(retention_days: u64) -> DirectiveDraft {
        let content = CanonicalBytes::new(&serde_json::json!({"t": "dnr"})).unwrap();
        DirectiveDraft {
            patient: patient(),
            directive_type: DirectiveType::Dnr,
            content_hash: sha256_digest(&content),
            content_ref: BlobRef::new("blob:1").unwrap(),
            jurisdiction: JurisdictionCode::new("US").unwrap(),
            retention: RetentionPeriod::from_days(retention_days),
            legal_validity: Score::from_f64(0.92),
            confidence: Score::from_f64(0.955),
            conditions: vec!["Recovery probability < 5%".to_string()],
            classification: ClassificationMetadata::reviewed(),
            authorizing_signature: DerivedKeySigner::new(SEED)
                .sign_blocking(&content, &DerivationPath::new(["intake"])),
        }
    }

    fn setup() -> (EmergencyResolver, Arc<DirectiveStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at(t0()));
        let store = Arc::new(DirectiveStore::new(RetentionPolicyTable::standard(), clock.clone()));
        let resolver = EmergencyResolver::new(
            Arc::clone(&store),
            Arc::new(DerivedKeySigner::new(SEED)),
            EmergencyConfig::default(),
        );
        (resolver, store, clock)
    }

    fn valid_request(situation: &str) -> EmergencyRequest {
        let msg = authorization_message(&patient(), &hospital(), situation).unwrap();
        let signature =
            DerivedKeySigner::new(SEED).sign_blocking(&msg, &DerivationPath::for_hospital(&hospital()));
        EmergencyRequest {
            patient: patient(),
            hospital: hospital(),
            situation: situation.to_string(),
            signature,
            vitals: None,
        }
    }

    fn intake() -> AccessorId {
        AccessorId::new("intake:test").unwrap()
    }

    #[tokio::test]
    async fn resolves_dnr_with_conditions() {
        let (resolver, store, _) = setup();
        store.store(dnr_draft(365), &intake()).await.unwrap();

        let resp = resolver.resolve(&valid_request("cardiac_arrest")).await.unwrap();
        assert_eq!(resp.directive.directive_type, DirectiveType::Dnr);
        assert!(resp.directive.emergency_conditions.contains(&"No resuscitation".to_string()));
        assert!(resp.action_required);
        assert!(resp.directive.confidence >= Score::from_f64(0.85));
        assert_eq!(resp.directive.summary, "Do not resuscitate: Recovery probability < 5%");

        let path: Vec<_> = resp.trace.iter().map(|t| t.to).collect();
        assert_eq!(
            path,
            vec![ResolutionState::Authenticated, ResolutionState::Resolved, ResolutionState::Logged]
        );
    }

    #[tokio::test]
    async fn exactly_one_audit_entry_per_call() {
        let (resolver, store, _) = setup();
        store.store(dnr_draft(365), &intake()).await.unwrap();
        let before = store.audit_log().len();
        resolver.resolve(&valid_request("cardiac_arrest")).await.unwrap();
        assert_eq!(store.audit_log().len(), before + 1);

        let last = store.audit_trail(&patient()).pop().unwrap();
        assert_eq!(last.action, AuditAction::Read);
        assert_eq!(last.purpose, AuditPurpose::Emergency);
        assert_eq!(last.accessor, AccessorId::hospital(&hospital()));
    }

    #[tokio::test]
    async fn wrong_signature_is_rejected_and_audited() {
        let (resolver, store, _) = setup();
        store.store(dnr_draft(365), &intake()).await.unwrap();
        let mut req = valid_request("cardiac_arrest");
        req.situation = "different_situation".into();

        let err = resolver.resolve(&req).await.unwrap_err();
        assert!(matches!(err, ResolveError::AuthenticationFailed));
        let last = store.audit_trail(&patient()).pop().unwrap();
        assert_eq!(last.outcome, "rejected:authentication_failed");
        assert_eq!(last.directive_type, None);
    }

    #[tokio::test]
    async fn other_hospitals_signature_fails() {
        let (resolver, store, _) = setup();
        store.store(dnr_draft(365), &intake()).await.unwrap();
        let mut req = valid_request("cardiac_arrest");
        req.hospital = HospitalId::new("H-2").unwrap();
        assert!(matches!(
            resolver.resolve(&req).await,
            Err(ResolveError::AuthenticationFailed)
        ));
    }

    #[tokio::test]
    async fn absent_patient_is_not_found() {
        let (resolver, store, _) = setup();
        let err = resolver.resolve(&valid_request("trauma")).await.unwrap_err();
        assert!(matches!(err, ResolveError::NotFound));
        assert_eq!(store.audit_log().len(), 1);
    }

    #[tokio::test]
    async fn expired_record_is_retention_expired_without_sweep() {
        let (resolver, store, clock) = setup();
        store.store(dnr_draft(30), &intake()).await.unwrap();
        clock.advance_secs(31 * 86_400);
        let err = resolver.resolve(&valid_request("trauma")).await.unwrap_err();
        assert!(matches!(err, ResolveError::RetentionExpired));
        let last = store.audit_trail(&patient()).pop().unwrap();
        assert_eq!(last.outcome, "rejected:retention_expired");
    }

    struct BrokenSigner;

    #[async_trait]
    impl SigningService for BrokenSigner {
        async fn sign(
            &self,
            _message: &CanonicalBytes,
            _path: &DerivationPath,
        ) -> Result<Ed25519Signature, CryptoError> {
            Err(CryptoError::ServiceUnavailable("down".into()))
        }

        async fn public_key(&self, _path: &DerivationPath) -> Result<Ed25519PublicKey, CryptoError> {
            Err(CryptoError::ServiceUnavailable("down".into()))
        }
    }

    struct SlowSigner;

    #[async_trait]
    impl SigningService for SlowSigner {
        async fn sign(
            &self,
            message: &CanonicalBytes,
            path: &DerivationPath,
        ) -> Result<Ed25519Signature, CryptoError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            DerivedKeySigner::new(SEED).sign(message, path).await
        }

        async fn public_key(&self, path: &DerivationPath) -> Result<Ed25519PublicKey, CryptoError> {
            DerivedKeySigner::new(SEED).public_key(path).await
        }
    }

    #[tokio::test]
    async fn signer_failure_is_authentication_failure() {
        let (_, store, _) = setup();
        store.store(dnr_draft(365), &intake()).await.unwrap();
        let resolver =
            EmergencyResolver::new(Arc::clone(&store), Arc::new(BrokenSigner), EmergencyConfig::default());
        assert!(matches!(
            resolver.resolve(&valid_request("x")).await,
            Err(ResolveError::AuthenticationFailed)
        ));
    }

    #[tokio::test]
    async fn signer_timeout_is_authentication_failure() {
        let (_, store, _) = setup();
        let config = EmergencyConfig {
            latency_budget_ms: 20,
            ..EmergencyConfig::default()
        };
        let resolver = EmergencyResolver::new(Arc::clone(&store), Arc::new(SlowSigner), config);
        assert!(matches!(
            resolver.resolve(&valid_request("x")).await,
            Err(ResolveError::AuthenticationFailed)
        ));
        assert_eq!(store.audit_log().len(), 1);
    }

    #[tokio::test]
    async fn situation_and_vitals_adjust_confidence_not_stored_record() {
        let (resolver, store, _) = setup();
        store.store(dnr_draft(365), &intake()).await.unwrap();
        let mut req = valid_request("cardiac_arrest");
        req.vitals = Some(Vitals {
            pulse_bpm: Some(0),
            ..Vitals::default()
        });

        let resp = resolver.resolve(&req).await.unwrap();
        assert_eq!(resp.assessment.stored_confidence, Score::from_f64(0.955));
        assert_eq!(resp.assessment.adjusted_confidence, Score::ONE);
        assert_eq!(resp.directive.confidence, Score::from_f64(0.955));
        assert_eq!(resp.alert_id, None);
        assert_eq!(store.lookup(&patient()).unwrap().confidence, Score::from_f64(0.955));
    }

    /// Refuses every notification, counting attempts.
    #[derive(Default)]
    struct DeadPager {
        calls: std::sync::atomic::AtomicU32,
    }

    #[async_trait]
    impl NotificationChannel for DeadPager {
        async fn notify(
            &self,
            _target: &medx_executor::NotificationTarget,
            _payload: &medx_executor::NotificationPayload,
        ) -> Result<(), medx_executor::NotifyError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Err(medx_executor::NotifyError::Rejected { status: 503 })
        }
    }

    /// Never answers.
    struct SilentPager;

    #[async_trait]
    impl NotificationChannel for SilentPager {
        async fn notify(
            &self,
            _target: &medx_executor::NotificationTarget,
            _payload: &medx_executor::NotificationPayload,
        ) -> Result<(), medx_executor::NotifyError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn resolution_alerts_the_requesting_hospital() {
        let (resolver, store, _) = setup();
        store.store(dnr_draft(365), &intake()).await.unwrap();
        let pager = Arc::new(medx_executor::LoggingNotifier::new());
        let resolver = resolver.with_alerts(pager.clone());

        let first = resolver.resolve(&valid_request("cardiac_arrest")).await.unwrap();
        let second = resolver.resolve(&valid_request("respiratory_failure")).await.unwrap();
        assert_eq!(pager.sent(), 2);

        let recent = resolver.recent_alerts(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(Some(recent[0].alert_id.clone()), second.alert_id);
        assert_eq!(Some(recent[1].alert_id.clone()), first.alert_id);
        assert!(recent.iter().all(|a| a.delivered && a.hospital == hospital()));
        assert_eq!(recent[0].situation, "respiratory_failure");
        assert_eq!(resolver.recent_alerts(1).len(), 1);
    }

    #[tokio::test]
    async fn failed_alert_does_not_fail_resolution() {
        let (resolver, store, _) = setup();
        store.store(dnr_draft(365), &intake()).await.unwrap();
        let pager = Arc::new(DeadPager::default());
        let resolver = resolver.with_alerts(pager.clone());

        let resp = resolver.resolve(&valid_request("cardiac_arrest")).await.unwrap();
        assert!(resp.alert_id.is_some());
        let alert = &resolver.recent_alerts(1)[0];
        assert!(!alert.delivered);
        assert_eq!(alert.attempts, 2);
        assert_eq!(pager.calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn alert_delivery_is_bounded_by_its_timeout() {
        let clock = Arc::new(ManualClock::at(t0()));
        let store = Arc::new(DirectiveStore::new(RetentionPolicyTable::standard(), clock));
        store.store(dnr_draft(365), &intake()).await.unwrap();
        let mut config = EmergencyConfig::default();
        config.alerts.timeout_ms = 20;
        let resolver = EmergencyResolver::new(
            Arc::clone(&store),
            Arc::new(DerivedKeySigner::new(SEED)),
            config,
        )
        .with_alerts(Arc::new(SilentPager));

        let resp = tokio::time::timeout(
            Duration::from_secs(2),
            resolver.resolve(&valid_request("cardiac_arrest")),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(resp.alert_id.is_some());
        assert!(!resolver.recent_alerts(1)[0].delivered);
    }

    #[tokio::test]
    async fn rejected_requests_raise_no_alert() {
        let (resolver, _, _) = setup();
        let pager = Arc::new(medx_executor::LoggingNotifier::new());
        let resolver = resolver.with_alerts(pager.clone());
        assert!(resolver.resolve(&valid_request("trauma")).await.is_err());
        assert_eq!(pager.sent(), 0);
        assert!(resolver.recent_alerts(10).is_empty());
    }

    #[test]
    fn vitals_are_optional_on_the_wire() {
        let req = valid_request("trauma");
        let mut json = serde_json::to_value(&req).unwrap();
        json.as_object_mut().unwrap().remove("vitals");
        let back: EmergencyRequest = serde_json::from_value(json).unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn authorization_message_is_canonical() {
        let msg = authorization_message(&patient(), &hospital(), "cardiac_arrest").unwrap();
        let text = std::str::from_utf8(msg.as_bytes()).unwrap();
        assert!(text.starts_with("{\"hospital_id\":\"H-1\",\"patient_id_hash\":\""));
        assert!(text.ends_with("\"situation\":\"cardiac_arrest\"}"));
    }
}
