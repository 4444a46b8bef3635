//! Conflict detection and resolution.
//!
//! Classification and resolution are pure functions of the (local, remote)
//! pair: given the same inputs they produce the same outputs, with no
//! hidden clock or randomness. The only timestamps involved are the ones
//! the caller records on the audit records.
//!
//! Policy (documented defaults):
//! - last-write-wins when the remote holds nothing or the same content,
//!   local wins timestamp ties
//! - a duplicate create defers to the remote version
//! - an update/update collision merges at the field level; where the same
//!   field differs, the remote wins (conservative, server as source of
//!   truth)
//! - a delete never silently destroys the other side's newer edits

use crate::{
    notification::PendingNotification, EntityId, EntityKind, MutationOp, MutationRecord,
    Timestamp,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Retention window for resolved conflict records: 7 days.
pub const CONFLICT_RETENTION_MS: u64 = 7 * 86_400_000;

/// What the remote reported for the entity during a conflicting upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteState {
    /// The remote payload, if the remote holds a live record
    pub payload: Option<Value>,
    /// When the remote version was last written
    pub updated_at: Timestamp,
    /// Whether the remote holds a tombstone
    pub deleted: bool,
}

/// Conflict categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictKind {
    /// Remote has no record, or an identical one
    None,
    /// Local created; remote already holds the same logical write
    CreateDuplicate,
    /// Both sides mutated the entity since the last synced version
    UpdateConflict,
    /// One side deleted while the other updated
    DeleteConflict,
}

/// Audit record for a detected conflict. Never mutated after resolution
/// except to stamp `resolved_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRecord {
    /// Unique identifier, derived from the conflicting mutation
    pub id: String,
    /// Kind of entity involved
    pub entity: EntityKind,
    /// Entity instance involved
    pub entity_id: EntityId,
    /// The local payload at detection time
    pub local_data: Value,
    /// The remote payload at detection time
    pub remote_data: Option<Value>,
    /// Classification
    pub kind: ConflictKind,
    /// When the conflict was detected
    pub detected_at: Timestamp,
    /// When the conflict was resolved
    pub resolved_at: Option<Timestamp>,
}

/// What the queue should submit after resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionAction {
    /// Submit this payload as the reconciled write
    Submit(Value),
    /// Drop the local write; the remote version stands
    Discard,
}

/// Output of resolving one conflicting mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Classification the resolver acted on
    pub kind: ConflictKind,
    /// The reconciled write, or a discard
    pub action: ResolutionAction,
    /// Audit record; present for every non-`None` classification
    pub record: Option<ConflictRecord>,
    /// User-facing notification; present for every non-`None` classification
    pub notification: Option<PendingNotification>,
}

/// Classify a local mutation against the remote's reported state.
pub fn classify(op: MutationOp, local_payload: &Value, remote: &RemoteState) -> ConflictKind {
    let remote_payload = match &remote.payload {
        Some(p) if !remote.deleted => Some(p),
        _ => None,
    };

    match op {
        MutationOp::Delete => {
            if remote_payload.is_some() {
                ConflictKind::DeleteConflict
            } else {
                // Remote already gone or never existed - nothing to fight over.
                ConflictKind::None
            }
        }
        MutationOp::Create => match remote_payload {
            Some(p) if p == local_payload => ConflictKind::None,
            Some(_) => ConflictKind::CreateDuplicate,
            None => ConflictKind::None,
        },
        MutationOp::Update => {
            if remote.deleted {
                return ConflictKind::DeleteConflict;
            }
            match remote_payload {
                Some(p) if p == local_payload => ConflictKind::None,
                Some(_) => ConflictKind::UpdateConflict,
                None => ConflictKind::None,
            }
        }
    }
}

/// Classify and resolve a conflicting mutation.
///
/// `now` is only recorded on the audit record and notification; the
/// decision itself depends solely on the (local, remote) pair.
pub fn resolve(mutation: &MutationRecord, remote: &RemoteState, now: Timestamp) -> Resolution {
    let kind = classify(mutation.op, &mutation.payload, remote);

    let action = match kind {
        ConflictKind::None => {
            // Last-write-wins; local wins ties.
            if remote.payload.is_none() || mutation.created_at >= remote.updated_at {
                ResolutionAction::Submit(mutation.payload.clone())
            } else {
                ResolutionAction::Discard
            }
        }
        ConflictKind::CreateDuplicate => ResolutionAction::Discard,
        ConflictKind::UpdateConflict => {
            let remote_payload = remote.payload.clone().unwrap_or(Value::Null);
            ResolutionAction::Submit(merge_fields(&mutation.payload, &remote_payload))
        }
        ConflictKind::DeleteConflict => match mutation.op {
            // Local delete vs. remote edit: the remote data survives.
            MutationOp::Delete => ResolutionAction::Discard,
            // Local edit vs. remote tombstone: the local data survives.
            _ => ResolutionAction::Submit(mutation.payload.clone()),
        },
    };

    let (record, notification) = if kind == ConflictKind::None {
        (None, None)
    } else {
        (
            Some(ConflictRecord {
                id: format!("conflict:{}", mutation.id),
                entity: mutation.entity,
                entity_id: mutation.entity_id.clone(),
                local_data: mutation.payload.clone(),
                remote_data: remote.payload.clone(),
                kind,
                detected_at: now,
                resolved_at: Some(now),
            }),
            Some(PendingNotification::for_conflict(mutation, kind, now)),
        )
    };

    Resolution {
        kind,
        action,
        record,
        notification,
    }
}

/// Field-level merge for update/update collisions.
///
/// Fields present on only one side are kept; where both sides hold the
/// same field with different values, the remote value wins. Non-object
/// payloads fall back to the remote wholesale.
pub fn merge_fields(local: &Value, remote: &Value) -> Value {
    let (Value::Object(local_map), Value::Object(remote_map)) = (local, remote) else {
        return remote.clone();
    };

    let mut merged = local_map.clone();
    for (key, remote_value) in remote_map {
        merged.insert(key.clone(), remote_value.clone());
    }
    Value::Object(merged)
}

/// Persisted log of conflict records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictLog {
    records: Vec<ConflictRecord>,
}

impl ConflictLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Append a record.
    pub fn push(&mut self, record: ConflictRecord) {
        self.records.push(record);
    }

    /// All records, oldest first.
    pub fn records(&self) -> &[ConflictRecord] {
        &self.records
    }

    /// Drop records older than the retention window. Returns how many
    /// were removed.
    pub fn prune(&mut self, now: Timestamp, retention_ms: u64) -> usize {
        let before = self.records.len();
        self.records
            .retain(|r| now.saturating_sub(r.detected_at) < retention_ms);
        before - self.records.len()
    }
}
