//! # Tally Engine
//!
//! The deterministic core of Tally's offline-first synchronization.
//!
//! This crate reconciles locally produced tracker records with a remote
//! persistence service under intermittent connectivity: no silent data
//! loss, no duplicate remote writes, bounded retry of failures.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine has no knowledge of files, network, or platform
//! - **Deterministic**: every operation takes explicit timestamps; the same
//!   inputs always produce the same outputs
//! - **Testable**: pure logic, no mocks needed
//!
//! ## Core Concepts
//!
//! ### Mutations and fingerprints
//!
//! A local write intent is a [`MutationRecord`]. Its [`fingerprint`] is a
//! content hash over the normalized significant fields plus a scoping key
//! (owner, and the UTC day for day-scoped kinds). The remote gateway keys
//! upserts by (owner, fingerprint), so resubmitting a write that may or
//! may not have reached the remote is always safe.
//!
//! ### Sync queue
//!
//! Pending mutations wait in the [`SyncQueue`] in FIFO order per
//! [`EntityKind`]. The runtime drains it and maps each gateway
//! [`UpsertOutcome`] to a [`Disposition`]: done, resolve a conflict, or
//! hand off to the dead-letter queue.
//!
//! ### Conflict resolution
//!
//! [`conflict::resolve`] classifies a (local, remote) pair into a
//! [`ConflictKind`] and produces a deterministic [`Resolution`]. Every
//! non-trivial conflict yields exactly one [`ConflictRecord`] and one
//! [`PendingNotification`] for user follow-up. The merge policy is simple
//! by design: disjoint fields from both sides are kept, the remote wins
//! colliding fields, and deletions never destroy newer edits.
//!
//! ### Dead letters and backoff
//!
//! Failed mutations park in the [`DeadLetterQueue`] and retry on an
//! exponential schedule ([`deadletter::backoff_ms`]), capped at
//! [`deadletter::MAX_RETRY_COUNT`] attempts before archival.
//!
//! ## Persistence
//!
//! Every persisted structure travels through the versioned envelope
//! ([`envelope::encode`] / [`envelope::decode`]), which stamps a schema
//! version and migrates older blobs on load.

pub mod conflict;
pub mod deadletter;
pub mod entity;
pub mod envelope;
pub mod error;
pub mod fingerprint;
pub mod mutation;
pub mod notification;
pub mod queue;

// Re-export main types at crate root
pub use conflict::{
    ConflictKind, ConflictLog, ConflictRecord, RemoteState, Resolution, ResolutionAction,
    CONFLICT_RETENTION_MS,
};
pub use deadletter::{
    backoff_ms, DeadLetterItem, DeadLetterQueue, DlqReport, RetryDecision,
    DEAD_LETTER_RETENTION_MS, MAX_RETRY_COUNT,
};
pub use entity::EntityKind;
pub use error::Error;
pub use mutation::{MutationOp, MutationRecord, QueueStatus, SyncQueueItem};
pub use notification::{NotificationLog, PendingNotification, NOTIFICATION_RETENTION_MS};
pub use queue::{disposition, Disposition, QueueReport, SyncQueue, UpsertOutcome};

/// Type aliases for clarity
pub type OwnerId = String;
pub type MutationId = String;
pub type EntityId = String;
pub type NotificationId = String;
pub type Fingerprint = String;
pub type Timestamp = u64;
pub type SchemaVersion = u32;

/// Version of the persisted state format.
pub const STATE_SCHEMA_VERSION: SchemaVersion = 1;
