//! # medx-core: Foundational Types for the Directive Engine
//!
//! Every other crate in the workspace depends on `medx-core`; it depends on
//! nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Opaque patient keys.** Raw patient identifiers are hashed on entry
//!    into [`PatientIdHash`]. Nothing downstream of this crate ever sees, stores
//!    or logs the raw identifier.
//!
//! 2. **`CanonicalBytes` newtype.** All digest computation (content hashes,
//!    audit chain links, execution verification references) flows through
//!    `CanonicalBytes::new()`. No raw `serde_json::to_vec()` for digests.
//!
//! 3. **Fixed-point scores.** Confidence and legal-validity values are carried
//!    as [`Score`] (basis points), so records containing them remain
//!    canonicalizable and compare exactly.
//!
//! 4. **One time base.** [`Timestamp`] is UTC truncated to seconds and
//!    [`RetentionPeriod`] is whole seconds. Days and years exist only at the
//!    configuration boundary.
//!
//! 5. **Retention is configuration.** [`RetentionPolicyTable`] maps
//!    jurisdiction to maximum retention; no retention numbers live in engine
//!    logic.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `medx-*` crates (this is the leaf of the DAG).
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod canonical;
pub mod classification;
pub mod digest;
pub mod directive;
pub mod error;
pub mod identity;
pub mod jurisdiction;
pub mod score;
pub mod temporal;

// Re-export primary types for ergonomic imports.
pub use canonical::CanonicalBytes;
pub use classification::{ClassificationMetadata, EscalationStatus, ProcessingMethod};
pub use digest::{sha256_digest, sha256_hex, ContentDigest, DigestAlgorithm};
pub use directive::{conditions, DirectiveType, InstitutionCategory, Organ};
pub use error::{CanonicalizationError, MedxError, ValidationError};
pub use identity::{
    AccessorId, BlobRef, ExecutionId, FacilityId, HospitalId, PatientIdHash, RecipientId,
    TriggerEventId,
};
pub use jurisdiction::{JurisdictionCode, RetentionPolicyTable};
pub use score::Score;
pub use temporal::{Clock, ManualClock, RetentionPeriod, SystemClock, Timestamp};
