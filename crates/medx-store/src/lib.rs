//! # medx-store: Retention-Aware Directive Store
//!
//! Keyed persistence of directive records with jurisdiction retention
//! enforced on every path:
//!
//! - [`store::DirectiveStore`]: `store`, `lookup`, `check_erasure_eligible`,
//!   `erase`, `sweep`. One current record per (patient, directive type),
//!   versioned on update.
//! - [`audit::AuditLog`]: append-only, hash-chained log of every READ, WRITE
//!   and ERASE. Erasure removes PHI references, never the trail.
//! - [`blob::PhiBlobStore`]: the off-chain encrypted content collaborator.
//!   The store itself holds only hashes and references.
//! - [`sweeper::RetentionSweeper`]: background tokio task that calls `sweep`
//!   on an interval and purges the blobs of removed records.
//!
//! ## Concurrency
//!
//! Each patient key owns a `parking_lot::RwLock` inside a `DashMap`. Writers
//! for one patient serialize on that lock; readers share it; unrelated
//! patients never contend. The sweeper only ever `try_write`s and skips keys
//! it cannot lock.

pub mod audit;
pub mod blob;
pub mod error;
pub mod record;
pub mod store;
pub mod sweeper;

pub use audit::{AuditAction, AuditEntry, AuditEvent, AuditLog, AuditPurpose};
pub use blob::{BlobError, InMemoryBlobStore, PhiBlobStore};
pub use error::StoreError;
pub use record::{DirectiveDraft, DirectiveRecord};
pub use store::{DirectiveStore, LookupStatus, SweepReport, MIN_LEGAL_VALIDITY};
pub use sweeper::{RetentionSweeper, SweeperHandle};
