//! # Execution Engine
//!
//! Runs once per confirmed death event:
//!
//! 1. Read every live directive for the patient in one audited snapshot.
//! 2. `ORGAN_DONATION`: query the organ network per organ, rank, notify the
//!    top N with bounded retry.
//! 3. `DATA_CONSENT`: anonymize through the collaborator, release to targets
//!    inside the consent's scope.
//! 4. Everything else is recorded as `skipped`.
//! 5. When an EHR target is configured, report each acted-on directive's
//!    status to it.
//! 6. Seal and store an [`ExecutionRecord`].
//!
//! ## Idempotence
//!
//! The ledger is keyed by `(patient, trigger_event_id)`. An execution holds
//! the patient's store write gate from the ledger check until the record is
//! sealed, so it is serialized against other executions and against `store`
//! and `erase` for the same patient. A repeated trigger returns the stored
//! record without touching any collaborator, and a directive cannot be
//! erased while its side effects are still being sent. Different patients
//! run concurrently.
//!
//! The engine never deletes directives.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use medx_core::{
    AccessorId, DirectiveType, ExecutionId, Organ, PatientIdHash, Timestamp, TriggerEventId,
};
use medx_store::{AuditPurpose, DirectiveRecord, DirectiveStore};
use serde::{Deserialize, Serialize};

use crate::config::ExecutionConfig;
use crate::error::ExecutionError;
use crate::matching::{rank_recipients, DonorProfile, RecipientMatch};
use crate::network::OrganNetwork;
use crate::notify::{
    notify_with_retry, NotificationChannel, NotificationPayload, NotificationTarget,
};
use crate::record::{DirectiveOutcome, ExecutionRecord, OutcomeStatus, UnsealedRecord};
use crate::release::{consent_scope, targets_in_scope, Anonymizer, DataRelease};

/// Death confirmation, already verified upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeathEvent {
    pub patient: PatientIdHash,
    pub trigger_event_id: TriggerEventId,
    pub confirmed_at: Timestamp,
    #[serde(default)]
    pub donor: Option<DonorProfile>,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ExecutionLedger {
    by_trigger: DashMap<(PatientIdHash, TriggerEventId), Arc<ExecutionRecord>>,
    by_id: DashMap<ExecutionId, Arc<ExecutionRecord>>,
}

impl ExecutionLedger {
    fn find(&self, patient: &PatientIdHash, trigger: &TriggerEventId) -> Option<Arc<ExecutionRecord>> {
        self.by_trigger
            .get(&(*patient, trigger.clone()))
            .map(|r| Arc::clone(r.value()))
    }

    /// Insert-only. Callers hold the patient's write gate and have checked `find`.
    fn insert(&self, record: Arc<ExecutionRecord>) {
        self.by_id
            .entry(record.execution_id)
            .or_insert_with(|| Arc::clone(&record));
        self.by_trigger
            .entry((record.patient, record.trigger_event_id.clone()))
            .or_insert(record);
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct ExecutionEngine {
    store: Arc<DirectiveStore>,
    network: Arc<dyn OrganNetwork>,
    notifier: Arc<dyn NotificationChannel>,
    anonymizer: Arc<dyn Anonymizer>,
    config: ExecutionConfig,
    ledger: ExecutionLedger,
}

impl ExecutionEngine {
    pub fn new(
        store: Arc<DirectiveStore>,
        network: Arc<dyn OrganNetwork>,
        notifier: Arc<dyn NotificationChannel>,
        anonymizer: Arc<dyn Anonymizer>,
        config: ExecutionConfig,
    ) -> Self {
        Self {
            store,
            network,
            notifier,
            anonymizer,
            config,
            ledger: ExecutionLedger::default(),
        }
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Stored execution by id.
    pub fn get(&self, execution_id: &ExecutionId) -> Result<ExecutionRecord, ExecutionError> {
        self.ledger
            .by_id
            .get(execution_id)
            .map(|r| (**r.value()).clone())
            .ok_or(ExecutionError::NotFound {
                execution_id: *execution_id,
            })
    }

    /// Stored execution for a trigger, if it already ran.
    pub fn find(&self, patient: &PatientIdHash, trigger: &TriggerEventId) -> Option<ExecutionRecord> {
        self.ledger.find(patient, trigger).map(|r| (*r).clone())
    }

    pub fn execution_count(&self) -> usize {
        self.ledger.by_id.len()
    }

    /// Stored executions, oldest first, optionally narrowed to one patient.
    pub fn history(&self, patient: Option<&PatientIdHash>) -> Vec<ExecutionRecord> {
        let mut records: Vec<ExecutionRecord> = self
            .ledger
            .by_id
            .iter()
            .filter(|e| patient.map_or(true, |p| &e.value().patient == p))
            .map(|e| (**e.value()).clone())
            .collect();
        records.sort_by(|a, b| {
            a.executed_at
                .cmp(&b.executed_at)
                .then_with(|| a.trigger_event_id.cmp(&b.trigger_event_id))
        });
        records
    }

    /// Execute the patient's directives for `event`, or return the record of
    /// an earlier execution of the same event.
    pub async fn execute(&self, event: &DeathEvent) -> Result<ExecutionRecord, ExecutionError> {
        let _gate = self.store.lock_patient(&event.patient).await;

        if let Some(existing) = self.ledger.find(&event.patient, &event.trigger_event_id) {
            tracing::info!(
                patient = %event.patient,
                trigger_event_id = %event.trigger_event_id,
                execution_id = %existing.execution_id,
                "execution already recorded for trigger; returning stored record"
            );
            return Ok((*existing).clone());
        }

        let started = Instant::now();
        let execution_id = ExecutionId::new();
        let records = self.store.read_audited(
            &event.patient,
            &AccessorId::execution_engine(),
            AuditPurpose::PostMortemExecution,
        )?;

        let mut outcomes = Vec::with_capacity(records.len());
        for record in &records {
            let outcome = match record.directive_type {
                DirectiveType::OrganDonation => {
                    self.execute_organ_donation(execution_id, record, event.donor.as_ref())
                        .await
                }
                DirectiveType::DataConsent => self.execute_data_release(execution_id, record).await,
                other => DirectiveOutcome::new(other, record.content_hash.clone())
                    .with_note("not actionable post-mortem"),
            };
            let outcome = self.report_to_ehr(execution_id, event.patient, outcome).await;
            tracing::info!(
                patient = %event.patient,
                %execution_id,
                directive_type = %outcome.directive_type,
                status = %outcome.status,
                "directive executed"
            );
            outcomes.push(outcome);
        }

        let record = ExecutionRecord::seal(UnsealedRecord {
            execution_id,
            patient: event.patient,
            trigger_event_id: event.trigger_event_id.clone(),
            confirmed_at: event.confirmed_at,
            executed_at: self.store.now(),
            outcomes,
            total_elapsed_ms: started.elapsed().as_millis() as u64,
        })?;

        self.ledger.insert(Arc::new(record.clone()));
        metrics::counter!("medx_executions_total").increment(1);
        tracing::info!(
            patient = %event.patient,
            %execution_id,
            directives = record.outcomes.len(),
            lives_saved = record.estimated_lives_saved,
            status = %record.status(),
            "execution recorded"
        );
        Ok(record)
    }

    async fn report_to_ehr(
        &self,
        execution_id: ExecutionId,
        patient: PatientIdHash,
        mut outcome: DirectiveOutcome,
    ) -> DirectiveOutcome {
        let Some(ehr) = &self.config.ehr else {
            return outcome;
        };
        if outcome.status == OutcomeStatus::Skipped {
            return outcome;
        }
        let payload = NotificationPayload::EhrStatusUpdate {
            execution_id,
            patient,
            directive_type: outcome.directive_type,
            status: outcome.status,
        };
        let delivery =
            notify_with_retry(self.notifier.as_ref(), ehr, &payload, &self.config.retry).await;
        if !delivery.delivered {
            outcome.notes.push(format!(
                "EHR update to {} exhausted after {} attempts",
                ehr.facility, delivery.attempts
            ));
        }
        outcome.ehr_updated = Some(delivery.delivered);
        outcome
    }

    async fn execute_organ_donation(
        &self,
        execution_id: ExecutionId,
        record: &DirectiveRecord,
        donor: Option<&DonorProfile>,
    ) -> DirectiveOutcome {
        let started = Instant::now();
        let mut outcome = DirectiveOutcome::new(record.directive_type, record.content_hash.clone());

        let mut organs: Vec<Organ> = Vec::new();
        for organ in record.conditions.iter().filter_map(|c| Organ::from_condition(c)) {
            if !organs.contains(&organ) {
                organs.push(organ);
            }
        }
        if organs.is_empty() {
            organs = self.config.default_organs.clone();
            outcome.notes.push("no organ named; default organs offered".into());
        }

        let mut network_failures = 0usize;
        for organ in organs {
            let candidates = match self.network.candidates(organ, donor).await {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(patient = %record.patient, %organ, network = self.network.name(), "organ network query failed: {e}");
                    outcome.notes.push(format!("{organ}: {e}"));
                    network_failures += 1;
                    continue;
                }
            };
            if candidates.is_empty() {
                outcome.notes.push(format!("{organ}: no compatible recipients"));
                continue;
            }

            let ranked = rank_recipients(candidates, &self.config.urgency_weights, self.config.top_n);
            for candidate in ranked {
                let target = NotificationTarget {
                    facility: candidate.facility.clone(),
                    endpoint: candidate.endpoint.clone(),
                };
                let payload = NotificationPayload::OrganOffer {
                    execution_id,
                    donor: record.patient,
                    organ,
                    recipient: candidate.recipient.clone(),
                    urgency_tier: candidate.urgency_tier,
                };
                let delivery =
                    notify_with_retry(self.notifier.as_ref(), &target, &payload, &self.config.retry)
                        .await;
                if !delivery.delivered {
                    outcome.notes.push(format!(
                        "{organ}: notification to {} exhausted after {} attempts",
                        candidate.facility, delivery.attempts
                    ));
                }
                outcome
                    .matches
                    .push(RecipientMatch::from_candidate(candidate, delivery.delivered, delivery.attempts));
            }
        }

        let notified = outcome.matches.iter().filter(|m| m.notified).count();
        let failed = outcome.matches.len() - notified + network_failures;
        outcome.status = OutcomeStatus::from_counts(notified, failed);
        outcome.estimated_lives_saved =
            outcome.matches.iter().filter(|m| m.counts_as_life_saved()).count() as u32;
        outcome.elapsed_ms = started.elapsed().as_millis() as u64;
        outcome
    }

    async fn execute_data_release(
        &self,
        execution_id: ExecutionId,
        record: &DirectiveRecord,
    ) -> DirectiveOutcome {
        let started = Instant::now();
        let mut outcome = DirectiveOutcome::new(record.directive_type, record.content_hash.clone());

        let scope = consent_scope(&record.conditions);
        let targets = targets_in_scope(&self.config.research_targets, &scope);
        if targets.is_empty() {
            outcome.notes.push("no research target in consented scope".into());
            outcome.elapsed_ms = started.elapsed().as_millis() as u64;
            return outcome;
        }

        let package = match self.anonymizer.anonymize(record).await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(patient = %record.patient, "anonymization failed: {e}");
                outcome.status = OutcomeStatus::Failed;
                outcome.notes.push(e.to_string());
                outcome.elapsed_ms = started.elapsed().as_millis() as u64;
                return outcome;
            }
        };

        for target in targets {
            let payload = NotificationPayload::DataRelease {
                execution_id,
                institution: target.institution.clone(),
                category: target.category,
                package: package.clone(),
            };
            let delivery = notify_with_retry(
                self.notifier.as_ref(),
                &NotificationTarget {
                    facility: target.institution.clone(),
                    endpoint: target.endpoint.clone(),
                },
                &payload,
                &self.config.retry,
            )
            .await;
            if !delivery.delivered {
                outcome.notes.push(format!(
                    "release to {} exhausted after {} attempts",
                    target.institution, delivery.attempts
                ));
            }
            outcome.releases.push(DataRelease {
                institution: target.institution.clone(),
                category: target.category,
                package_ref: package.package_ref.clone(),
                released: delivery.delivered,
                attempts: delivery.attempts,
            });
        }

        let released = outcome.releases.iter().filter(|r| r.released).count();
        outcome.status = OutcomeStatus::from_counts(released, outcome.releases.len() - released);
        outcome.elapsed_ms = started.elapsed().as_millis() as u64;
        outcome
    }
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("network", &self.network.name())
            .field("executions", &self.ledger.by_id.len())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use medx_core::{
        sha256_digest, BlobRef, CanonicalBytes, ClassificationMetadata, JurisdictionCode,
        RetentionPeriod, Score,
    };
    use medx_crypto::Ed25519KeyPair;
    use medx_store::DirectiveDraft;

    use super::*;

    pub fn draft(patient_id: &str, directive_type: DirectiveType, conditions: Vec<String>) -> DirectiveDraft {
        let content = CanonicalBytes::new(&serde_json::json!({
            "type": directive_type.as_str(),
            "conditions": conditions,
        }))
        .unwrap();
        DirectiveDraft {
            patient: PatientIdHash::from_patient_id(patient_id).unwrap(),
            directive_type,
            content_hash: sha256_digest(&content),
            content_ref: BlobRef::new(format!("blob:{patient_id}:{directive_type}")).unwrap(),
            jurisdiction: JurisdictionCode::new("US").unwrap(),
            retention: RetentionPeriod::from_days(365),
            legal_validity: Score::from_f64(0.9),
            confidence: Score::from_f64(0.9),
            conditions,
            classification: ClassificationMetadata::reviewed(),
            authorizing_signature: Ed25519KeyPair::from_seed(&[3u8; 32]).sign(&content),
        }
    }

    pub fn record(patient_id: &str, directive_type: DirectiveType, conditions: Vec<String>) -> DirectiveRecord {
        let d = draft(patient_id, directive_type, conditions);
        let now = Timestamp::from_epoch_secs(1_700_000_000).unwrap();
        DirectiveRecord {
            patient: d.patient,
            directive_type: d.directive_type,
            content_hash: d.content_hash,
            content_ref: d.content_ref,
            jurisdiction: d.jurisdiction,
            retention: d.retention,
            legal_validity: d.legal_validity,
            confidence: d.confidence,
            conditions: d.conditions,
            classification: d.classification,
            authorizing_signature: d.authorizing_signature,
            version: 1,
            created_at: now,
            updated_at: now,
            superseded_digests: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::draft;
    use super::*;
    use crate::error::{AnonymizeError, NetworkError};
    use crate::matching::fixtures::candidate;
    use crate::matching::CandidateRecipient;
    use crate::notify::fixtures::FlakyChannel;
    use crate::notify::{LoggingNotifier, RetryPolicy};
    use crate::release::{AnonymizedPackage, PseudonymizingAnonymizer, ResearchTarget};
    use async_trait::async_trait;
    use medx_core::{conditions, FacilityId, InstitutionCategory, ManualClock, RetentionPolicyTable};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fixed candidates per organ, counting queries.
    #[derive(Default)]
    struct ScriptedNetwork {
        candidates: Vec<CandidateRecipient>,
        fail: bool,
        queries: AtomicU32,
    }

    #[async_trait]
    impl OrganNetwork for ScriptedNetwork {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn candidates(
            &self,
            organ: Organ,
            _donor: Option<&DonorProfile>,
        ) -> Result<Vec<CandidateRecipient>, NetworkError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(NetworkError::Unavailable { reason: "offline".into() });
            }
            Ok(self.candidates.iter().filter(|c| c.organ == organ).cloned().collect())
        }
    }

    struct RefusingAnonymizer;

    #[async_trait]
    impl Anonymizer for RefusingAnonymizer {
        async fn anonymize(&self, _record: &DirectiveRecord) -> Result<AnonymizedPackage, AnonymizeError> {
            Err(AnonymizeError::Failed { reason: "refused".into() })
        }
    }

    fn store() -> Arc<DirectiveStore> {
        let clock = Arc::new(ManualClock::at(Timestamp::from_epoch_secs(1_700_000_000).unwrap()));
        Arc::new(DirectiveStore::new(RetentionPolicyTable::standard(), clock))
    }

    fn intake() -> AccessorId {
        AccessorId::new("intake:test").unwrap()
    }

    fn fast_config() -> ExecutionConfig {
        ExecutionConfig {
            retry: RetryPolicy { max_attempts: 2, base_delay_ms: 1 },
            ..ExecutionConfig::default()
        }
    }

    fn kidney_network() -> ScriptedNetwork {
        ScriptedNetwork {
            candidates: vec![
                candidate("R-3", Organ::Kidney, 0.95, 3),
                candidate("R-1", Organ::Kidney, 0.90, 1),
                candidate("R-2", Organ::Kidney, 0.85, 2),
                candidate("R-4", Organ::Kidney, 0.70, 2),
            ],
            ..ScriptedNetwork::default()
        }
    }

    fn event(patient_id: &str, trigger: &str) -> DeathEvent {
        DeathEvent {
            patient: PatientIdHash::from_patient_id(patient_id).unwrap(),
            trigger_event_id: TriggerEventId::new(trigger).unwrap(),
            confirmed_at: Timestamp::from_epoch_secs(1_700_000_100).unwrap(),
            donor: None,
        }
    }

    fn kidney_draft(patient_id: &str) -> medx_store::DirectiveDraft {
        draft(patient_id, DirectiveType::OrganDonation, vec![Organ::Kidney.condition_label().to_string()])
    }

    #[tokio::test]
    async fn organ_donation_notifies_ranked_top_n() {
        let store = store();
        store.store(kidney_draft("P2"), &intake()).await.unwrap();
        let notifier = Arc::new(LoggingNotifier::new());
        let engine = ExecutionEngine::new(
            store,
            Arc::new(kidney_network()),
            notifier.clone(),
            Arc::new(PseudonymizingAnonymizer::new("salt")),
            fast_config(),
        );

        let rec = engine.execute(&event("P2", "E1")).await.unwrap();
        assert_eq!(rec.outcomes.len(), 1);
        let outcome = &rec.outcomes[0];
        assert_eq!(outcome.status, OutcomeStatus::Completed);
        let ids: Vec<_> = outcome.matches.iter().map(|m| m.recipient.as_str()).collect();
        assert_eq!(ids, ["R-1", "R-2", "R-4"]);
        assert!(outcome.matches.iter().all(|m| m.notified));
        assert_eq!(outcome.estimated_lives_saved, 3);
        assert_eq!(rec.estimated_lives_saved, 3);
        assert_eq!(notifier.sent(), 3);
        assert!(rec.verify());
    }

    #[tokio::test]
    async fn second_trigger_returns_identical_record_without_side_effects() {
        let store = store();
        store.store(kidney_draft("P2"), &intake()).await.unwrap();
        let notifier = Arc::new(LoggingNotifier::new());
        let network = Arc::new(kidney_network());
        let engine = ExecutionEngine::new(
            Arc::clone(&store),
            network.clone(),
            notifier.clone(),
            Arc::new(PseudonymizingAnonymizer::new("salt")),
            fast_config(),
        );

        let first = engine.execute(&event("P2", "E1")).await.unwrap();
        let audits = store.audit_log().len();
        let second = engine.execute(&event("P2", "E1")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(notifier.sent(), 3);
        assert_eq!(network.queries.load(Ordering::SeqCst), 1);
        assert_eq!(store.audit_log().len(), audits);
        assert_eq!(engine.execution_count(), 1);
        assert_eq!(engine.get(&first.execution_id).unwrap(), first);
    }

    #[tokio::test]
    async fn new_trigger_for_same_patient_executes_again() {
        let store = store();
        store.store(kidney_draft("P2"), &intake()).await.unwrap();
        let engine = ExecutionEngine::new(
            store,
            Arc::new(kidney_network()),
            Arc::new(LoggingNotifier::new()),
            Arc::new(PseudonymizingAnonymizer::new("salt")),
            fast_config(),
        );
        let a = engine.execute(&event("P2", "E1")).await.unwrap();
        let b = engine.execute(&event("P2", "E2")).await.unwrap();
        assert_ne!(a.execution_id, b.execution_id);
        assert_eq!(engine.execution_count(), 2);
    }

    #[tokio::test]
    async fn exhausted_notifications_stay_in_the_record() {
        let store = store();
        store.store(kidney_draft("P2"), &intake()).await.unwrap();
        let channel = Arc::new(FlakyChannel::failing(2));
        let engine = ExecutionEngine::new(
            store,
            Arc::new(kidney_network()),
            channel.clone(),
            Arc::new(PseudonymizingAnonymizer::new("salt")),
            fast_config(),
        );

        let rec = engine.execute(&event("P2", "E1")).await.unwrap();
        let outcome = &rec.outcomes[0];
        assert_eq!(outcome.matches.len(), 3);
        assert!(!outcome.matches[0].notified);
        assert_eq!(outcome.matches[0].notification_attempts, 2);
        assert!(outcome.matches[1].notified);
        assert_eq!(outcome.status, OutcomeStatus::PartialFailure);
        assert_eq!(channel.calls(), 4);
    }

    #[tokio::test]
    async fn network_outage_fails_only_that_directive() {
        let store = store();
        store.store(kidney_draft("P3"), &intake()).await.unwrap();
        store
            .store(draft("P3", DirectiveType::Dnr, Vec::new()), &intake())
            .await
            .unwrap();
        let network = ScriptedNetwork {
            fail: true,
            ..ScriptedNetwork::default()
        };
        let engine = ExecutionEngine::new(
            store,
            Arc::new(network),
            Arc::new(LoggingNotifier::new()),
            Arc::new(PseudonymizingAnonymizer::new("salt")),
            fast_config(),
        );

        let rec = engine.execute(&event("P3", "E1")).await.unwrap();
        let by_type = |t| rec.outcomes.iter().find(|o| o.directive_type == t).unwrap();
        assert_eq!(by_type(DirectiveType::OrganDonation).status, OutcomeStatus::Failed);
        assert_eq!(by_type(DirectiveType::Dnr).status, OutcomeStatus::Skipped);
    }

    #[tokio::test]
    async fn unnamed_organs_fall_back_to_defaults() {
        let store = store();
        store
            .store(draft("P4", DirectiveType::OrganDonation, Vec::new()), &intake())
            .await
            .unwrap();
        let network = Arc::new(ScriptedNetwork::default());
        let engine = ExecutionEngine::new(
            store,
            network.clone(),
            Arc::new(LoggingNotifier::new()),
            Arc::new(PseudonymizingAnonymizer::new("salt")),
            fast_config(),
        );
        let rec = engine.execute(&event("P4", "E1")).await.unwrap();
        assert_eq!(network.queries.load(Ordering::SeqCst), 5);
        assert_eq!(rec.outcomes[0].status, OutcomeStatus::Completed);
        assert!(rec.outcomes[0].matches.is_empty());
    }

    fn research_config() -> ExecutionConfig {
        let target = |id: &str, category| ResearchTarget {
            institution: FacilityId::new(id).unwrap(),
            category,
            endpoint: None,
        };
        ExecutionConfig {
            research_targets: vec![
                target("NCI", InstitutionCategory::CancerResearch),
                target("GENOME-LAB", InstitutionCategory::GeneticResearch),
                target("UNI", InstitutionCategory::GeneralResearch),
            ],
            ..fast_config()
        }
    }

    #[tokio::test]
    async fn data_release_respects_consent_scope() {
        let store = store();
        store
            .store(
                draft(
                    "P5",
                    DirectiveType::DataConsent,
                    vec![
                        conditions::ANONYMIZATION_REQUIRED.to_string(),
                        conditions::CANCER_RESEARCH.to_string(),
                    ],
                ),
                &intake(),
            )
            .await
            .unwrap();
        let notifier = Arc::new(LoggingNotifier::new());
        let engine = ExecutionEngine::new(
            store,
            Arc::new(ScriptedNetwork::default()),
            notifier.clone(),
            Arc::new(PseudonymizingAnonymizer::new("salt")),
            research_config(),
        );

        let rec = engine.execute(&event("P5", "E1")).await.unwrap();
        let outcome = &rec.outcomes[0];
        assert_eq!(outcome.status, OutcomeStatus::Completed);
        let to: Vec<_> = outcome.releases.iter().map(|r| r.institution.as_str()).collect();
        assert_eq!(to, ["NCI"]);
        assert_eq!(notifier.sent(), 1);
    }

    #[tokio::test]
    async fn anonymizer_failure_releases_nothing() {
        let store = store();
        store
            .store(draft("P6", DirectiveType::DataConsent, Vec::new()), &intake())
            .await
            .unwrap();
        let notifier = Arc::new(LoggingNotifier::new());
        let engine = ExecutionEngine::new(
            store,
            Arc::new(ScriptedNetwork::default()),
            notifier.clone(),
            Arc::new(RefusingAnonymizer),
            research_config(),
        );
        let rec = engine.execute(&event("P6", "E1")).await.unwrap();
        assert_eq!(rec.outcomes[0].status, OutcomeStatus::Failed);
        assert!(rec.outcomes[0].releases.is_empty());
        assert_eq!(notifier.sent(), 0);
    }

    #[tokio::test]
    async fn patient_without_directives_gets_empty_record() {
        let store = store();
        let engine = ExecutionEngine::new(
            Arc::clone(&store),
            Arc::new(ScriptedNetwork::default()),
            Arc::new(LoggingNotifier::new()),
            Arc::new(PseudonymizingAnonymizer::new("salt")),
            fast_config(),
        );
        let rec = engine.execute(&event("P7", "E1")).await.unwrap();
        assert!(rec.outcomes.is_empty());
        assert_eq!(rec.status(), OutcomeStatus::Skipped);
        let trail = store.audit_trail(&rec.patient);
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].purpose, AuditPurpose::PostMortemExecution);
    }

    #[tokio::test]
    async fn execution_never_deletes_directives() {
        let store = store();
        store.store(kidney_draft("P8"), &intake()).await.unwrap();
        let engine = ExecutionEngine::new(
            Arc::clone(&store),
            Arc::new(kidney_network()),
            Arc::new(LoggingNotifier::new()),
            Arc::new(PseudonymizingAnonymizer::new("salt")),
            fast_config(),
        );
        let rec = engine.execute(&event("P8", "E1")).await.unwrap();
        assert_eq!(store.lookup_all(&rec.patient).len(), 1);
    }

    /// Answers every organ query slowly, so a test can act mid-execution.
    struct SlowNetwork {
        inner: ScriptedNetwork,
        delay: std::time::Duration,
    }

    #[async_trait]
    impl OrganNetwork for SlowNetwork {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn candidates(
            &self,
            organ: Organ,
            donor: Option<&DonorProfile>,
        ) -> Result<Vec<CandidateRecipient>, NetworkError> {
            tokio::time::sleep(self.delay).await;
            self.inner.candidates(organ, donor).await
        }
    }

    #[tokio::test]
    async fn erase_waits_for_a_running_execution() {
        let clock = Arc::new(ManualClock::at(Timestamp::from_epoch_secs(1_700_000_000).unwrap()));
        let store = Arc::new(DirectiveStore::new(RetentionPolicyTable::standard(), clock.clone()));
        store.store(kidney_draft("P9"), &intake()).await.unwrap();
        let notifier = Arc::new(LoggingNotifier::new());
        let engine = Arc::new(ExecutionEngine::new(
            Arc::clone(&store),
            Arc::new(SlowNetwork {
                inner: kidney_network(),
                delay: std::time::Duration::from_millis(200),
            }),
            notifier.clone(),
            Arc::new(PseudonymizingAnonymizer::new("salt")),
            fast_config(),
        ));

        let running = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.execute(&event("P9", "E1")).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        clock.advance_secs(10 * 365 * 86_400);
        let uk = medx_core::JurisdictionCode::new("UK").unwrap();
        let patient = PatientIdHash::from_patient_id("P9").unwrap();
        let erased = store.erase(&patient, &uk, &intake()).await.unwrap();

        // The erase only got the gate once every notification had gone out.
        assert_eq!(erased.len(), 1);
        assert_eq!(engine.execution_count(), 1);
        assert_eq!(notifier.sent(), 3);
        let rec = running.await.unwrap().unwrap();
        assert_eq!(rec.outcomes[0].matches.len(), 3);
        assert_eq!(store.active_write_gates(), 0);
    }

    #[tokio::test]
    async fn execution_releases_the_patient_write_gate() {
        let store = store();
        store.store(kidney_draft("P2"), &intake()).await.unwrap();
        let engine = ExecutionEngine::new(
            Arc::clone(&store),
            Arc::new(kidney_network()),
            Arc::new(LoggingNotifier::new()),
            Arc::new(PseudonymizingAnonymizer::new("salt")),
            fast_config(),
        );
        for trigger in ["E1", "E2", "E1"] {
            engine.execute(&event("P2", trigger)).await.unwrap();
        }
        engine.execute(&event("P-none", "E1")).await.unwrap();
        assert_eq!(store.active_write_gates(), 0);
    }

    fn ehr_config() -> ExecutionConfig {
        ExecutionConfig {
            ehr: Some(NotificationTarget {
                facility: FacilityId::new("EHR-MAIN").unwrap(),
                endpoint: None,
            }),
            ..fast_config()
        }
    }

    #[tokio::test]
    async fn acted_on_directives_are_reported_to_the_ehr() {
        let store = store();
        store.store(kidney_draft("P2"), &intake()).await.unwrap();
        store
            .store(draft("P2", DirectiveType::Dnr, Vec::new()), &intake())
            .await
            .unwrap();
        let notifier = Arc::new(LoggingNotifier::new());
        let engine = ExecutionEngine::new(
            store,
            Arc::new(kidney_network()),
            notifier.clone(),
            Arc::new(PseudonymizingAnonymizer::new("salt")),
            ehr_config(),
        );
        let rec = engine.execute(&event("P2", "E1")).await.unwrap();
        let by_type = |t| rec.outcomes.iter().find(|o| o.directive_type == t).unwrap();
        assert_eq!(by_type(DirectiveType::OrganDonation).ehr_updated, Some(true));
        assert_eq!(by_type(DirectiveType::Dnr).ehr_updated, None);
        // Three organ offers plus one EHR update.
        assert_eq!(notifier.sent(), 4);
        assert!(rec.verify());
    }

    #[tokio::test]
    async fn failed_ehr_update_is_noted_without_changing_status() {
        let store = store();
        store
            .store(draft("P4", DirectiveType::OrganDonation, Vec::new()), &intake())
            .await
            .unwrap();
        let channel = Arc::new(FlakyChannel::failing(10));
        let engine = ExecutionEngine::new(
            store,
            Arc::new(ScriptedNetwork::default()),
            channel.clone(),
            Arc::new(PseudonymizingAnonymizer::new("salt")),
            ehr_config(),
        );
        let rec = engine.execute(&event("P4", "E1")).await.unwrap();
        let outcome = &rec.outcomes[0];
        assert_eq!(outcome.status, OutcomeStatus::Completed);
        assert_eq!(outcome.ehr_updated, Some(false));
        assert!(outcome.notes.iter().any(|n| n.starts_with("EHR update to EHR-MAIN")));
        assert_eq!(channel.calls(), 2);
    }

    #[tokio::test]
    async fn history_lists_executions_per_patient() {
        let store = store();
        let engine = ExecutionEngine::new(
            store,
            Arc::new(ScriptedNetwork::default()),
            Arc::new(LoggingNotifier::new()),
            Arc::new(PseudonymizingAnonymizer::new("salt")),
            fast_config(),
        );
        engine.execute(&event("P1", "E2")).await.unwrap();
        engine.execute(&event("P1", "E1")).await.unwrap();
        engine.execute(&event("P2", "E1")).await.unwrap();

        assert_eq!(engine.history(None).len(), 3);
        let p1 = PatientIdHash::from_patient_id("P1").unwrap();
        let triggers: Vec<_> = engine
            .history(Some(&p1))
            .iter()
            .map(|r| r.trigger_event_id.as_str().to_string())
            .collect();
        assert_eq!(triggers, ["E1", "E2"]);
    }

    #[test]
    fn unknown_execution_is_not_found() {
        let engine = ExecutionEngine::new(
            store(),
            Arc::new(ScriptedNetwork::default()),
            Arc::new(LoggingNotifier::new()),
            Arc::new(PseudonymizingAnonymizer::new("salt")),
            ExecutionConfig::default(),
        );
        assert!(matches!(
            engine.get(&ExecutionId::new()),
            Err(ExecutionError::NotFound { .. })
        ));
    }
}
