//! Mutation types - the write intents the sync pipeline carries.

use crate::{fingerprint, EntityId, EntityKind, Fingerprint, MutationId, OwnerId, Timestamp};
use serde::{Deserialize, Serialize};

/// What a mutation does to its entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationOp {
    Create,
    Update,
    Delete,
}

/// One logical write intent for one entity instance.
///
/// `content_hash` is derived from the normalized significant fields plus
/// the owner (and day bucket where relevant), not from the full payload.
/// Invariant: two records with equal (owner, entity, content_hash) are the
/// same logical write and must never both succeed remotely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationRecord {
    /// Unique identifier for this mutation
    pub id: MutationId,
    /// Owner the write belongs to
    pub owner_id: OwnerId,
    /// Entity instance being written
    pub entity_id: EntityId,
    /// Kind of entity
    pub entity: EntityKind,
    /// Create, update, or delete
    pub op: MutationOp,
    /// The submitted payload (JSON value)
    pub payload: serde_json::Value,
    /// Idempotency fingerprint
    pub content_hash: Fingerprint,
    /// When the mutation was produced locally (milliseconds since epoch)
    pub created_at: Timestamp,
}

impl MutationRecord {
    /// Build a mutation and derive its fingerprint.
    pub fn new(
        id: impl Into<MutationId>,
        owner_id: impl Into<OwnerId>,
        entity_id: impl Into<EntityId>,
        entity: EntityKind,
        op: MutationOp,
        payload: serde_json::Value,
        created_at: Timestamp,
    ) -> Self {
        let owner_id = owner_id.into();
        let content_hash = fingerprint::fingerprint(&owner_id, entity, &payload, created_at);
        Self {
            id: id.into(),
            owner_id,
            entity_id: entity_id.into(),
            entity,
            op,
            payload,
            content_hash,
            created_at,
        }
    }
}

/// Queue status of a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueueStatus {
    /// Waiting for a drain to pick it up
    #[default]
    Pending,
    /// Currently being applied remotely by the active drain
    InFlight,
}

/// A mutation wrapped with its queue bookkeeping.
///
/// Owned exclusively by the sync queue: created on local mutation,
/// destroyed on confirmed remote success or hand-off to the dead-letter
/// queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueItem {
    /// The wrapped mutation
    pub mutation: MutationRecord,
    /// Pending or in-flight. Defaults to pending on decode so blobs written
    /// before this field existed (and state left by an aborted run) recover
    /// as retryable.
    #[serde(default)]
    pub status: QueueStatus,
    /// When the item entered the queue
    pub enqueued_at: Timestamp,
}
