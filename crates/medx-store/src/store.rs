//! # Directive Store
//!
//! One current [`DirectiveRecord`] per (patient, directive type), keyed by
//! [`PatientIdHash`].
//!
//! ## Retention
//!
//! A record's effective bound is the shorter of its own requested retention
//! and the jurisdiction maximum. Every read path re-checks age against that
//! bound, so an expired record is never returned even if [`DirectiveStore::sweep`]
//! has not yet removed it. The sweep only reclaims space.
//!
//! ## Locking
//!
//! ```text
//! DashMap<PatientIdHash, Arc<RwLock<PatientSlot>>>
//! ```
//!
//! ```text
//! DashMap<PatientIdHash, Arc<tokio::sync::Mutex<()>>>   write gates
//! ```
//!
//! Every writer for a patient (`store`, `erase`, and the execution engine
//! through [`DirectiveStore::lock_patient`]) holds that patient's async write
//! gate for the whole operation, so writes to one key never interleave. The
//! slot lock underneath only guards the record map: lookups take it for
//! reading and return clones, so callers always see a whole record. `sweep`
//! uses `try_lock` on the gate and `try_write` on the slot, and counts keys
//! it had to skip.
//!
//! A blob reference may be shared by several records of one patient (one
//! intake text yielding several directive types). A reference is handed to
//! the sweep for purging only once no remaining record of that patient
//! points at it.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use medx_core::{
    AccessorId, BlobRef, Clock, DirectiveType, JurisdictionCode, PatientIdHash,
    RetentionPolicyTable, Score, Timestamp,
};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::OwnedMutexGuard;

use crate::audit::{AuditAction, AuditEntry, AuditEvent, AuditLog, AuditPurpose};
use crate::error::StoreError;
use crate::record::{DirectiveDraft, DirectiveRecord};

/// Records below this legal-validity score are rejected at creation.
pub const MIN_LEGAL_VALIDITY: Score = Score::saturating_from_basis_points(7_000);

#[derive(Debug, Default)]
struct PatientSlot {
    records: BTreeMap<DirectiveType, DirectiveRecord>,
}

impl PatientSlot {
    fn references(&self, blob: &BlobRef) -> bool {
        self.records.values().any(|r| &r.content_ref == blob)
    }
}

type SlotRef = Arc<RwLock<PatientSlot>>;
type WriteGate = Arc<tokio::sync::Mutex<()>>;
type GateMap = DashMap<PatientIdHash, WriteGate>;

/// Exclusive write access to one patient's records.
///
/// Dropping the guard releases the gate and forgets it once nobody else is
/// waiting on it.
pub struct PatientWriteGuard {
    patient: PatientIdHash,
    held: Option<OwnedMutexGuard<()>>,
    gates: Arc<GateMap>,
}

impl PatientWriteGuard {
    pub fn patient(&self) -> &PatientIdHash {
        &self.patient
    }
}

impl Drop for PatientWriteGuard {
    fn drop(&mut self) {
        drop(self.held.take());
        self.gates
            .remove_if(&self.patient, |_, gate| Arc::strong_count(gate) == 1);
    }
}

impl std::fmt::Debug for PatientWriteGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatientWriteGuard")
            .field("patient", &self.patient)
            .finish()
    }
}

/// Outcome of a retention-aware lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupStatus {
    /// A live record, highest emergency priority first.
    Found(DirectiveRecord),
    /// Records exist but every one has outlived its retention bound.
    Expired { directive_type: DirectiveType },
    /// Nothing stored for the patient.
    Absent,
}

/// Result of one sweep pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Patient keys visited.
    pub examined: usize,
    /// Records removed for exceeding retention.
    pub removed: usize,
    /// Patient keys skipped because a writer held the lock.
    pub skipped_locked: usize,
    /// Blob references no longer referenced by any record of their patient.
    pub purged_refs: Vec<BlobRef>,
}

/// Retention-aware keyed store with an attached audit log.
pub struct DirectiveStore {
    slots: DashMap<PatientIdHash, SlotRef>,
    gates: Arc<GateMap>,
    retention: Arc<RetentionPolicyTable>,
    audit: Arc<AuditLog>,
    clock: Arc<dyn Clock>,
    /// Blob references orphaned by updates or write-time expiry, drained by
    /// the next sweep after re-checking that no record took them back.
    orphaned: Mutex<Vec<(PatientIdHash, BlobRef)>>,
}

impl DirectiveStore {
    /// A store with its own audit log sharing `clock`.
    pub fn new(retention: RetentionPolicyTable, clock: Arc<dyn Clock>) -> Self {
        let audit = Arc::new(AuditLog::new(Arc::clone(&clock)));
        Self::with_audit_log(retention, clock, audit)
    }

    pub fn with_audit_log(
        retention: RetentionPolicyTable,
        clock: Arc<dyn Clock>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            slots: DashMap::new(),
            gates: Arc::new(DashMap::new()),
            retention: Arc::new(retention),
            audit,
            clock,
            orphaned: Mutex::new(Vec::new()),
        }
    }

    pub fn audit_log(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn retention_table(&self) -> &RetentionPolicyTable {
        &self.retention
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Wait for, then hold, the patient's write gate.
    pub async fn lock_patient(&self, patient: &PatientIdHash) -> PatientWriteGuard {
        let gate = Arc::clone(&*self.gates.entry(*patient).or_default());
        let held = gate.lock_owned().await;
        PatientWriteGuard {
            patient: *patient,
            held: Some(held),
            gates: Arc::clone(&self.gates),
        }
    }

    /// Patients whose write gate is currently held or awaited.
    pub fn active_write_gates(&self) -> usize {
        self.gates.len()
    }

    fn slot_for_write(&self, patient: PatientIdHash) -> SlotRef {
        Arc::clone(&*self.slots.entry(patient).or_default())
    }

    fn slot_for_read(&self, patient: &PatientIdHash) -> Option<SlotRef> {
        self.slots.get(patient).map(|s| Arc::clone(&*s))
    }

    /// Drop the patient's slot if it is empty and nobody else holds it.
    fn release_if_empty(&self, patient: &PatientIdHash) {
        self.slots.remove_if(patient, |_, slot| {
            Arc::strong_count(slot) == 1 && slot.try_read().is_some_and(|s| s.records.is_empty())
        });
    }

    fn is_expired(&self, record: &DirectiveRecord, now: &Timestamp) -> bool {
        record.is_expired(now, self.retention.max_retention(&record.jurisdiction))
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Validate and upsert a directive, appending a WRITE audit entry.
    ///
    /// Validation order: unknown jurisdiction, retention bound, legal
    /// validity. Nothing is stored on rejection. Waits for any other writer
    /// of the same patient to finish.
    pub async fn store(
        &self,
        draft: DirectiveDraft,
        accessor: &AccessorId,
    ) -> Result<DirectiveRecord, StoreError> {
        let gate = self.lock_patient(&draft.patient).await;
        self.store_locked(&gate, draft, accessor)
    }

    fn store_locked(
        &self,
        _gate: &PatientWriteGuard,
        draft: DirectiveDraft,
        accessor: &AccessorId,
    ) -> Result<DirectiveRecord, StoreError> {
        if let Err(err) = self.validate(&draft) {
            metrics::counter!("medx_store_rejections_total", "reason" => err.reason()).increment(1);
            tracing::warn!(
                patient = %draft.patient,
                directive_type = %draft.directive_type,
                jurisdiction = %draft.jurisdiction,
                reason = err.reason(),
                "directive rejected"
            );
            return Err(err);
        }

        let patient = draft.patient;
        let directive_type = draft.directive_type;
        let slot = self.slot_for_write(patient);
        let mut guard = slot.write();
        let now = self.clock.now();

        let prev_expired = guard
            .records
            .get(&directive_type)
            .is_some_and(|prev| self.is_expired(prev, &now));
        if prev_expired {
            self.audit.record(
                AuditEvent::new(
                    patient,
                    AccessorId::retention_sweep(),
                    AuditAction::Erase,
                    AuditPurpose::RetentionSweep,
                )
                .with_directive_type(directive_type)
                .with_outcome("expired_on_write"),
            )?;
            if let Some(prev) = guard.records.remove(&directive_type) {
                self.orphaned.lock().push((patient, prev.content_ref));
            }
        }
        let existing = guard.records.get(&directive_type).cloned();

        let replaced_ref = existing.as_ref().map(|prev| prev.content_ref.clone());
        let (record, purpose) = match existing {
            Some(prev) => (prev.superseded_by(draft, now), AuditPurpose::Update),
            None => (DirectiveRecord::first(draft, now), AuditPurpose::Creation),
        };

        self.audit.record(
            AuditEvent::new(patient, accessor.clone(), AuditAction::Write, purpose)
                .with_directive_type(directive_type)
                .with_outcome(format!("version:{}", record.version)),
        )?;
        guard.records.insert(directive_type, record.clone());
        if let Some(stale) = replaced_ref.filter(|blob| !guard.references(blob)) {
            self.orphaned.lock().push((patient, stale));
        }
        drop(guard);

        metrics::counter!(
            "medx_directives_stored_total",
            "directive_type" => directive_type.as_str()
        )
        .increment(1);
        tracing::info!(
            patient = %patient,
            directive_type = %directive_type,
            version = record.version,
            "directive stored"
        );
        Ok(record)
    }

    fn validate(&self, draft: &DirectiveDraft) -> Result<(), StoreError> {
        let max = self.retention.max_retention(&draft.jurisdiction).ok_or_else(|| {
            StoreError::UnknownJurisdiction {
                jurisdiction: draft.jurisdiction.clone(),
            }
        })?;
        if draft.retention > max {
            return Err(StoreError::RetentionExceeded {
                jurisdiction: draft.jurisdiction.clone(),
                requested: draft.retention,
                max,
            });
        }
        if draft.legal_validity < MIN_LEGAL_VALIDITY {
            return Err(StoreError::LowValidity {
                score: draft.legal_validity,
                minimum: MIN_LEGAL_VALIDITY,
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reads (no audit side effect)
    // -----------------------------------------------------------------------

    /// The live record with the highest emergency priority.
    pub fn lookup(&self, patient: &PatientIdHash) -> Option<DirectiveRecord> {
        match self.lookup_status(patient) {
            LookupStatus::Found(record) => Some(record),
            _ => None,
        }
    }

    /// Like [`Self::lookup`], but distinguishes expired from absent.
    pub fn lookup_status(&self, patient: &PatientIdHash) -> LookupStatus {
        let Some(slot) = self.slot_for_read(patient) else {
            return LookupStatus::Absent;
        };
        let guard = slot.read();
        let now = self.clock.now();

        let mut by_priority: Vec<&DirectiveRecord> = guard.records.values().collect();
        by_priority.sort_by_key(|r| r.directive_type.emergency_priority());

        if let Some(live) = by_priority.iter().find(|r| !self.is_expired(r, &now)) {
            return LookupStatus::Found((*live).clone());
        }
        match by_priority.first() {
            Some(expired) => LookupStatus::Expired {
                directive_type: expired.directive_type,
            },
            None => LookupStatus::Absent,
        }
    }

    /// The live record of one type.
    pub fn lookup_type(
        &self,
        patient: &PatientIdHash,
        directive_type: DirectiveType,
    ) -> Option<DirectiveRecord> {
        let slot = self.slot_for_read(patient)?;
        let guard = slot.read();
        let now = self.clock.now();
        guard
            .records
            .get(&directive_type)
            .filter(|r| !self.is_expired(r, &now))
            .cloned()
    }

    /// Every live record for the patient, in directive type order, taken
    /// under a single read lock.
    pub fn lookup_all(&self, patient: &PatientIdHash) -> Vec<DirectiveRecord> {
        let Some(slot) = self.slot_for_read(patient) else {
            return Vec::new();
        };
        let guard = slot.read();
        let now = self.clock.now();
        guard
            .records
            .values()
            .filter(|r| !self.is_expired(r, &now))
            .cloned()
            .collect()
    }

    /// [`Self::lookup_all`] plus one READ audit entry for `purpose`.
    pub fn read_audited(
        &self,
        patient: &PatientIdHash,
        accessor: &AccessorId,
        purpose: AuditPurpose,
    ) -> Result<Vec<DirectiveRecord>, StoreError> {
        let records = self.lookup_all(patient);
        let outcome = if records.is_empty() {
            "not_found".to_string()
        } else {
            format!("records:{}", records.len())
        };
        self.audit.record(
            AuditEvent::new(*patient, accessor.clone(), AuditAction::Read, purpose)
                .with_outcome(outcome),
        )?;
        Ok(records)
    }

    /// Audit entries for the patient, oldest first. Survives erasure.
    pub fn audit_trail(&self, patient: &PatientIdHash) -> Vec<AuditEntry> {
        self.audit.entries_for(patient)
    }

    // -----------------------------------------------------------------------
    // Erasure
    // -----------------------------------------------------------------------

    /// True iff the patient has records and every one is older than the
    /// maximum retention of `jurisdiction`. Unknown jurisdictions are never
    /// eligible.
    pub fn check_erasure_eligible(
        &self,
        patient: &PatientIdHash,
        jurisdiction: &JurisdictionCode,
    ) -> bool {
        let Some(bound) = self.retention.max_retention(jurisdiction) else {
            return false;
        };
        let Some(slot) = self.slot_for_read(patient) else {
            return false;
        };
        let guard = slot.read();
        let now = self.clock.now();
        !guard.records.is_empty()
            && guard
                .records
                .values()
                .all(|r| bound.is_exceeded_by(r.age_secs(&now)))
    }

    /// Remove all of the patient's records if eligible under `jurisdiction`.
    /// Returns the removed records so their blobs can be purged. The ERASE
    /// audit entry is kept. Waits for any other writer of the patient,
    /// including a running execution, to finish first.
    pub async fn erase(
        &self,
        patient: &PatientIdHash,
        jurisdiction: &JurisdictionCode,
        accessor: &AccessorId,
    ) -> Result<Vec<DirectiveRecord>, StoreError> {
        let _gate = self.lock_patient(patient).await;
        let slot = self
            .slot_for_read(patient)
            .ok_or(StoreError::NotFound { patient: *patient })?;
        let mut guard = slot.write();
        if guard.records.is_empty() {
            return Err(StoreError::NotFound { patient: *patient });
        }

        let now = self.clock.now();
        let eligible = self.retention.max_retention(jurisdiction).is_some_and(|bound| {
            guard
                .records
                .values()
                .all(|r| bound.is_exceeded_by(r.age_secs(&now)))
        });
        if !eligible {
            return Err(StoreError::NotEligible {
                patient: *patient,
                jurisdiction: jurisdiction.clone(),
            });
        }

        self.audit.record(
            AuditEvent::new(
                *patient,
                accessor.clone(),
                AuditAction::Erase,
                AuditPurpose::ErasureRequest,
            )
            .with_outcome(format!("erased:{}", guard.records.len())),
        )?;
        let removed: Vec<DirectiveRecord> =
            std::mem::take(&mut guard.records).into_values().collect();
        drop(guard);
        drop(slot);
        self.release_if_empty(patient);

        tracing::info!(
            patient = %patient,
            jurisdiction = %jurisdiction,
            removed = removed.len(),
            "patient directives erased"
        );
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Sweep
    // -----------------------------------------------------------------------

    /// Remove every record past its retention bound. Idempotent. Keys whose
    /// lock is held are skipped and picked up on the next pass.
    pub fn sweep(&self) -> SweepReport {
        let now = self.clock.now();
        let mut report = SweepReport::default();
        let mut freed: Vec<BlobRef> = Vec::new();

        let keys: Vec<(PatientIdHash, SlotRef)> = self
            .slots
            .iter()
            .map(|e| (*e.key(), Arc::clone(e.value())))
            .collect();

        for (patient, slot) in keys {
            report.examined += 1;
            let gate = self.gates.get(&patient).map(|g| Arc::clone(g.value()));
            let held = match gate.as_ref().map(|g| g.try_lock()) {
                Some(Err(_)) => {
                    report.skipped_locked += 1;
                    continue;
                }
                Some(Ok(held)) => Some(held),
                None => None,
            };
            let Some(mut guard) = slot.try_write() else {
                report.skipped_locked += 1;
                continue;
            };

            let expired: Vec<DirectiveType> = guard
                .records
                .values()
                .filter(|r| self.is_expired(r, &now))
                .map(|r| r.directive_type)
                .collect();

            for directive_type in expired {
                let event = AuditEvent::new(
                    patient,
                    AccessorId::retention_sweep(),
                    AuditAction::Erase,
                    AuditPurpose::RetentionSweep,
                )
                .with_directive_type(directive_type);
                if let Err(err) = self.audit.record(event) {
                    tracing::error!(patient = %patient, error = %err, "sweep audit failed; record kept");
                    continue;
                }
                if let Some(record) = guard.records.remove(&directive_type) {
                    report.removed += 1;
                    freed.push(record.content_ref);
                }
            }
            for blob in freed.drain(..) {
                if !guard.references(&blob) && !report.purged_refs.contains(&blob) {
                    report.purged_refs.push(blob);
                }
            }

            drop(guard);
            drop(slot);
            drop(held);
            drop(gate);
            self.release_if_empty(&patient);
        }

        let pending = std::mem::take(&mut *self.orphaned.lock());
        let mut deferred = Vec::new();
        for (patient, blob) in pending {
            let still_used = match self.slot_for_read(&patient) {
                None => Some(false),
                Some(slot) => slot.try_read().map(|s| s.references(&blob)),
            };
            match still_used {
                Some(false) if !report.purged_refs.contains(&blob) => report.purged_refs.push(blob),
                Some(_) => {}
                None => deferred.push((patient, blob)),
            }
        }
        self.orphaned.lock().extend(deferred);

        metrics::counter!("medx_sweep_removed_total").increment(report.removed as u64);
        metrics::counter!("medx_sweep_skipped_locked_total").increment(report.skipped_locked as u64);
        if report.removed > 0 || report.skipped_locked > 0 {
            tracing::info!(
                examined = report.examined,
                removed = report.removed,
                skipped_locked = report.skipped_locked,
                "retention sweep completed"
            );
        }
        report
    }

    /// Number of patients with at least one stored record (live or expired).
    pub fn patient_count(&self) -> usize {
        self.slots.len()
    }

    #[cfg(test)]
    fn hold_write_lock(&self, patient: PatientIdHash) -> SlotRef {
        self.slot_for_write(patient)
    }
}

impl std::fmt::Debug for DirectiveStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectiveStore")
            .field("patients", &self.slots.len())
            .field("jurisdictions", &self.retention.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::fixtures::{draft, patient};
    use medx_core::{ManualClock, RetentionPeriod};
    use proptest::prelude::*;

    const DAY: u64 = 86_400;

    fn t0() -> Timestamp {
        Timestamp::from_epoch_secs(1_700_000_000).unwrap()
    }

    fn table() -> RetentionPolicyTable {
        RetentionPolicyTable::from_days([("US", 3650u64), ("UK", 30)]).unwrap()
    }

    fn store_at(start: Timestamp) -> (DirectiveStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at(start));
        (DirectiveStore::new(table(), clock.clone()), clock)
    }

    fn intake() -> AccessorId {
        AccessorId::new("intake:test").unwrap()
    }

    fn us() -> JurisdictionCode {
        JurisdictionCode::new("US").unwrap()
    }

    #[tokio::test]
    async fn store_then_lookup_has_zero_age() {
        let (store, _) = store_at(t0());
        store.store(draft("p1", DirectiveType::Dnr, "a"), &intake()).await.unwrap();
        let rec = store.lookup(&patient("p1")).unwrap();
        assert_eq!(rec.age_secs(&store.now()), 0);
        assert_eq!(rec.version, 1);
    }

    #[tokio::test]
    async fn retention_above_jurisdiction_max_is_rejected() {
        let (store, _) = store_at(t0());
        let mut d = draft("p1", DirectiveType::Dnr, "a");
        d.retention = RetentionPeriod::from_days(3651);
        let err = store.store(d, &intake()).await.unwrap_err();
        assert!(matches!(err, StoreError::RetentionExceeded { .. }));
        assert!(store.lookup(&patient("p1")).is_none());
        assert!(store.audit_log().is_empty());
    }

    #[tokio::test]
    async fn retention_equal_to_max_is_accepted() {
        let (store, _) = store_at(t0());
        let mut d = draft("p1", DirectiveType::Dnr, "a");
        d.retention = RetentionPeriod::from_days(3650);
        assert!(store.store(d, &intake()).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_jurisdiction_is_rejected() {
        let (store, _) = store_at(t0());
        let mut d = draft("p1", DirectiveType::Dnr, "a");
        d.jurisdiction = JurisdictionCode::new("ZZ").unwrap();
        assert!(matches!(
            store.store(d, &intake()).await,
            Err(StoreError::UnknownJurisdiction { .. })
        ));
    }

    #[tokio::test]
    async fn low_validity_is_rejected_at_boundary() {
        let (store, _) = store_at(t0());
        let mut d = draft("p1", DirectiveType::Dnr, "a");
        d.legal_validity = Score::from_basis_points(6_999).unwrap();
        assert!(matches!(store.store(d, &intake()).await, Err(StoreError::LowValidity { .. })));

        let mut d = draft("p1", DirectiveType::Dnr, "a");
        d.legal_validity = MIN_LEGAL_VALIDITY;
        assert!(store.store(d, &intake()).await.is_ok());
    }

    #[tokio::test]
    async fn store_appends_write_audit() {
        let (store, _) = store_at(t0());
        store.store(draft("p1", DirectiveType::Dnr, "a"), &intake()).await.unwrap();
        let trail = store.audit_trail(&patient("p1"));
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action, AuditAction::Write);
        assert_eq!(trail[0].purpose, AuditPurpose::Creation);
        assert_eq!(trail[0].directive_type, Some(DirectiveType::Dnr));
    }

    #[tokio::test]
    async fn update_bumps_version_and_keeps_created_at() {
        let (store, clock) = store_at(t0());
        store.store(draft("p1", DirectiveType::Dnr, "a"), &intake()).await.unwrap();
        clock.advance_secs(DAY);
        let rec = store.store(draft("p1", DirectiveType::Dnr, "b"), &intake()).await.unwrap();
        assert_eq!(rec.version, 2);
        assert_eq!(rec.created_at, t0());
        assert_eq!(rec.updated_at, t0().plus_secs(DAY));
        assert_eq!(rec.superseded_digests.len(), 1);

        let trail = store.audit_trail(&patient("p1"));
        assert_eq!(trail[1].purpose, AuditPurpose::Update);
        // The superseded blob is handed to the next sweep.
        let report = store.sweep();
        assert_eq!(report.purged_refs, vec![BlobRef::new("blob:a").unwrap()]);
    }

    #[tokio::test]
    async fn lookup_prefers_emergency_priority() {
        let (store, _) = store_at(t0());
        store.store(draft("p1", DirectiveType::OrganDonation, "o"), &intake()).await.unwrap();
        store.store(draft("p1", DirectiveType::DataConsent, "d"), &intake()).await.unwrap();
        store.store(draft("p1", DirectiveType::Dnr, "n"), &intake()).await.unwrap();
        assert_eq!(store.lookup(&patient("p1")).unwrap().directive_type, DirectiveType::Dnr);
        assert_eq!(store.lookup_all(&patient("p1")).len(), 3);
    }

    #[tokio::test]
    async fn expired_record_is_hidden_before_sweep() {
        let (store, clock) = store_at(t0());
        let mut d = draft("p1", DirectiveType::Dnr, "a");
        d.retention = RetentionPeriod::from_days(10);
        store.store(d, &intake()).await.unwrap();

        clock.advance_secs(10 * DAY);
        assert!(store.lookup(&patient("p1")).is_some());

        clock.advance_secs(1);
        assert!(store.lookup(&patient("p1")).is_none());
        assert_eq!(
            store.lookup_status(&patient("p1")),
            LookupStatus::Expired { directive_type: DirectiveType::Dnr }
        );
        assert!(store.lookup_type(&patient("p1"), DirectiveType::Dnr).is_none());
    }

    #[tokio::test]
    async fn absent_patient() {
        let (store, _) = store_at(t0());
        assert_eq!(store.lookup_status(&patient("nobody")), LookupStatus::Absent);
        assert!(store.lookup_all(&patient("nobody")).is_empty());
    }

    #[tokio::test]
    async fn erasure_eligibility_follows_requested_jurisdiction() {
        let (store, clock) = store_at(t0());
        store.store(draft("p1", DirectiveType::Dnr, "a"), &intake()).await.unwrap();
        let uk = JurisdictionCode::new("UK").unwrap();

        clock.advance_secs(30 * DAY);
        assert!(!store.check_erasure_eligible(&patient("p1"), &uk));
        clock.advance_secs(1);
        assert!(store.check_erasure_eligible(&patient("p1"), &uk));
        assert!(!store.check_erasure_eligible(&patient("p1"), &us()));
        assert!(!store.check_erasure_eligible(&patient("p1"), &JurisdictionCode::new("ZZ").unwrap()));
    }

    #[tokio::test]
    async fn erase_requires_eligibility() {
        let (store, _) = store_at(t0());
        store.store(draft("p1", DirectiveType::Dnr, "a"), &intake()).await.unwrap();
        let err = store.erase(&patient("p1"), &us(), &intake()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotEligible { .. }));
        assert!(store.lookup(&patient("p1")).is_some());
    }

    #[tokio::test]
    async fn erase_removes_records_but_keeps_trail() {
        let (store, clock) = store_at(t0());
        store.store(draft("p1", DirectiveType::Dnr, "a"), &intake()).await.unwrap();
        store.store(draft("p1", DirectiveType::OrganDonation, "b"), &intake()).await.unwrap();
        clock.advance_secs(31 * DAY);

        let uk = JurisdictionCode::new("UK").unwrap();
        let removed = store.erase(&patient("p1"), &uk, &intake()).await.unwrap();
        assert_eq!(removed.len(), 2);
        assert!(store.lookup(&patient("p1")).is_none());
        assert_eq!(store.patient_count(), 0);

        let trail = store.audit_trail(&patient("p1"));
        let last = trail.last().unwrap();
        assert_eq!(last.action, AuditAction::Erase);
        assert_eq!(last.purpose, AuditPurpose::ErasureRequest);
        store.audit_log().verify_chain().unwrap();
    }

    #[tokio::test]
    async fn erase_unknown_patient_is_not_found() {
        let (store, _) = store_at(t0());
        assert!(matches!(
            store.erase(&patient("ghost"), &us(), &intake()).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn sweep_removes_only_expired() {
        let (store, clock) = store_at(t0());
        let mut short = draft("p1", DirectiveType::Dnr, "short");
        short.retention = RetentionPeriod::from_days(1);
        store.store(short, &intake()).await.unwrap();
        store.store(draft("p2", DirectiveType::Dnr, "long"), &intake()).await.unwrap();

        clock.advance_secs(2 * DAY);
        let report = store.sweep();
        assert_eq!(report.examined, 2);
        assert_eq!(report.removed, 1);
        assert_eq!(report.purged_refs, vec![BlobRef::new("blob:short").unwrap()]);
        assert_eq!(store.lookup_status(&patient("p1")), LookupStatus::Absent);
        assert!(store.lookup(&patient("p2")).is_some());

        let again = store.sweep();
        assert_eq!(again.removed, 0);
    }

    #[tokio::test]
    async fn sweep_skips_locked_keys() {
        let (store, clock) = store_at(t0());
        let mut d = draft("p1", DirectiveType::Dnr, "a");
        d.retention = RetentionPeriod::from_days(1);
        store.store(d, &intake()).await.unwrap();
        clock.advance_secs(2 * DAY);

        let slot = store.hold_write_lock(patient("p1"));
        let held = slot.write();
        let report = store.sweep();
        assert_eq!(report.skipped_locked, 1);
        assert_eq!(report.removed, 0);
        drop(held);
        drop(slot);

        assert_eq!(store.sweep().removed, 1);
    }

    #[tokio::test]
    async fn sweep_uses_shorter_jurisdiction_bound() {
        let (store, clock) = store_at(t0());
        let mut d = draft("p1", DirectiveType::Dnr, "a");
        d.jurisdiction = JurisdictionCode::new("UK").unwrap();
        d.retention = RetentionPeriod::from_days(30);
        store.store(d, &intake()).await.unwrap();
        clock.advance_secs(31 * DAY);
        assert_eq!(store.sweep().removed, 1);
        let trail = store.audit_trail(&patient("p1"));
        assert_eq!(trail.last().unwrap().purpose, AuditPurpose::RetentionSweep);
    }

    #[tokio::test]
    async fn writing_over_expired_record_starts_fresh() {
        let (store, clock) = store_at(t0());
        let mut d = draft("p1", DirectiveType::Dnr, "a");
        d.retention = RetentionPeriod::from_days(1);
        store.store(d, &intake()).await.unwrap();
        clock.advance_secs(2 * DAY);
        let rec = store.store(draft("p1", DirectiveType::Dnr, "b"), &intake()).await.unwrap();
        assert_eq!(rec.version, 1);
        assert_eq!(rec.created_at, t0().plus_secs(2 * DAY));
        assert!(rec.superseded_digests.is_empty());
    }

    #[tokio::test]
    async fn read_audited_records_purpose() {
        let (store, _) = store_at(t0());
        store.store(draft("p1", DirectiveType::Dnr, "a"), &intake()).await.unwrap();
        let recs = store
            .read_audited(&patient("p1"), &AccessorId::execution_engine(), AuditPurpose::PostMortemExecution)
            .unwrap();
        assert_eq!(recs.len(), 1);
        let last = store.audit_trail(&patient("p1")).pop().unwrap();
        assert_eq!(last.action, AuditAction::Read);
        assert_eq!(last.purpose, AuditPurpose::PostMortemExecution);
        assert_eq!(last.outcome, "records:1");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_for_one_patient_serialize() {
        let (store, _) = store_at(t0());
        let store = Arc::new(store);
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .store(draft("p1", DirectiveType::Dnr, &format!("v{i}")), &intake())
                        .await
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.await.unwrap();
        }
        let rec = store.lookup(&patient("p1")).unwrap();
        assert_eq!(rec.version, 8);
        assert_eq!(rec.superseded_digests.len(), 7);
        assert_eq!(store.active_write_gates(), 0);
        store.audit_log().verify_chain().unwrap();
    }

    #[tokio::test]
    async fn store_waits_for_the_patient_write_gate() {
        let (store, _) = store_at(t0());
        let store = Arc::new(store);
        let gate = store.lock_patient(&patient("p1")).await;

        let writer = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store.store(draft("p1", DirectiveType::Dnr, "a"), &intake()).await
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!writer.is_finished());
        assert!(store.lookup(&patient("p1")).is_none());

        drop(gate);
        writer.await.unwrap().unwrap();
        assert!(store.lookup(&patient("p1")).is_some());
        assert_eq!(store.active_write_gates(), 0);
    }

    #[tokio::test]
    async fn erase_waits_for_the_patient_write_gate() {
        let (store, clock) = store_at(t0());
        let store = Arc::new(store);
        store.store(draft("p1", DirectiveType::Dnr, "a"), &intake()).await.unwrap();
        clock.advance_secs(31 * DAY);

        let gate = store.lock_patient(&patient("p1")).await;
        let eraser = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let uk = JurisdictionCode::new("UK").unwrap();
                store.erase(&patient("p1"), &uk, &intake()).await
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!eraser.is_finished());
        assert_eq!(store.lookup_all(&patient("p1")).len(), 1);

        drop(gate);
        assert_eq!(eraser.await.unwrap().unwrap().len(), 1);
        assert_eq!(store.patient_count(), 0);
    }

    #[tokio::test]
    async fn sweep_skips_keys_whose_write_gate_is_held() {
        let (store, clock) = store_at(t0());
        let mut d = draft("p1", DirectiveType::Dnr, "a");
        d.retention = RetentionPeriod::from_days(1);
        store.store(d, &intake()).await.unwrap();
        clock.advance_secs(2 * DAY);

        let gate = store.lock_patient(&patient("p1")).await;
        let report = store.sweep();
        assert_eq!(report.skipped_locked, 1);
        assert_eq!(report.removed, 0);
        drop(gate);

        assert_eq!(store.sweep().removed, 1);
    }

    #[tokio::test]
    async fn blob_shared_by_sibling_survives_update() {
        let (store, _) = store_at(t0());
        store.store(draft("p1", DirectiveType::Dnr, "a"), &intake()).await.unwrap();
        store.store(draft("p1", DirectiveType::OrganDonation, "a"), &intake()).await.unwrap();
        store.store(draft("p1", DirectiveType::Dnr, "b"), &intake()).await.unwrap();

        assert!(store.sweep().purged_refs.is_empty());
        let organ = store.lookup_type(&patient("p1"), DirectiveType::OrganDonation).unwrap();
        assert_eq!(organ.content_ref, BlobRef::new("blob:a").unwrap());

        store.store(draft("p1", DirectiveType::OrganDonation, "c"), &intake()).await.unwrap();
        assert_eq!(store.sweep().purged_refs, vec![BlobRef::new("blob:a").unwrap()]);
    }

    #[tokio::test]
    async fn blob_shared_by_sibling_survives_partial_expiry() {
        let (store, clock) = store_at(t0());
        let mut short = draft("p1", DirectiveType::Dnr, "a");
        short.retention = RetentionPeriod::from_days(1);
        store.store(short, &intake()).await.unwrap();
        store.store(draft("p1", DirectiveType::OrganDonation, "a"), &intake()).await.unwrap();

        clock.advance_secs(2 * DAY);
        let report = store.sweep();
        assert_eq!(report.removed, 1);
        assert!(report.purged_refs.is_empty());
        assert!(store.lookup_type(&patient("p1"), DirectiveType::OrganDonation).is_some());
    }

    #[tokio::test]
    async fn orphaned_blob_taken_back_before_sweep_is_kept() {
        let (store, _) = store_at(t0());
        store.store(draft("p1", DirectiveType::Dnr, "a"), &intake()).await.unwrap();
        store.store(draft("p1", DirectiveType::Dnr, "b"), &intake()).await.unwrap();
        store.store(draft("p1", DirectiveType::OrganDonation, "a"), &intake()).await.unwrap();
        assert!(store.sweep().purged_refs.is_empty());
    }

    proptest! {
        #[test]
        fn lookup_never_returns_expired(retention_days in 1u64..60, elapsed in 0u64..(90 * DAY)) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let (store, clock) = store_at(t0());
            let mut d = draft("p1", DirectiveType::Dnr, "a");
            d.retention = RetentionPeriod::from_days(retention_days);
            runtime.block_on(store.store(d, &intake())).unwrap();
            clock.advance_secs(elapsed);
            let found = store.lookup(&patient("p1"));
            prop_assert_eq!(found.is_some(), elapsed <= retention_days * DAY);
        }
    }
}
