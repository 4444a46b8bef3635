//! Sync queue - ordered, persisted list of pending local mutations.
//!
//! The queue is a pure state machine: it never talks to the network. The
//! runtime walks it, submits each mutation through the remote gateway, and
//! feeds the outcome back through [`disposition`]. Ordering is FIFO within
//! each entity kind; cross-kind order follows [`EntityKind::ALL`].

use crate::{
    error::Result, EntityKind, Error, MutationId, MutationRecord, QueueStatus, RemoteState,
    SyncQueueItem, Timestamp,
};
use serde::{Deserialize, Serialize};

/// Outcome of one remote upsert, as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum UpsertOutcome {
    /// The write was applied
    Success,
    /// The gateway already holds this (owner, fingerprint) - counts as
    /// success for the queue; the earlier write is the accepted one
    Duplicate,
    /// The remote holds a diverging version of the entity
    Conflict { remote: RemoteState },
    /// Network or server unavailability - retryable
    TransientError { message: String },
    /// The remote schema rejected the payload - never retryable
    ValidationError { message: String },
}

/// What the queue should do with an item after a remote attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// Remove the item; the write is durably remote
    Done,
    /// Route through the conflict resolver, then remove
    Resolve(RemoteState),
    /// Hand the item to the dead-letter queue
    DeadLetter { reason: String, can_retry: bool },
}

/// Map a gateway outcome to a queue disposition.
pub fn disposition(outcome: UpsertOutcome) -> Disposition {
    match outcome {
        UpsertOutcome::Success | UpsertOutcome::Duplicate => Disposition::Done,
        UpsertOutcome::Conflict { remote } => Disposition::Resolve(remote),
        UpsertOutcome::TransientError { message } => Disposition::DeadLetter {
            reason: message,
            can_retry: true,
        },
        UpsertOutcome::ValidationError { message } => Disposition::DeadLetter {
            reason: message,
            can_retry: false,
        },
    }
}

/// Counters for one queue drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueReport {
    /// Items attempted against the gateway
    pub attempted: usize,
    /// Items confirmed remote (including duplicates)
    pub succeeded: usize,
    /// Items resolved through the conflict resolver
    pub conflicts: usize,
    /// Items handed to the dead-letter queue
    pub dead_lettered: usize,
}

/// The per-owner sync queue.
///
/// Enqueue never deduplicates; the fingerprint makes duplicates harmless
/// downstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueue {
    items: Vec<SyncQueueItem>,
}

impl SyncQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Append a mutation. Order of arrival is preserved per entity kind.
    pub fn enqueue(&mut self, mutation: MutationRecord, now: Timestamp) {
        self.items.push(SyncQueueItem {
            mutation,
            status: QueueStatus::Pending,
            enqueued_at: now,
        });
    }

    /// Number of items, pending and in-flight.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the queue holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// All items, in arrival order.
    pub fn items(&self) -> &[SyncQueueItem] {
        &self.items
    }

    /// The next pending item in drain order: FIFO within each kind,
    /// kinds walked in [`EntityKind::ALL`] order. In-flight items are
    /// skipped, so a drain pass never re-attempts them.
    pub fn next_pending(&self) -> Option<&SyncQueueItem> {
        EntityKind::ALL.iter().find_map(|kind| {
            self.items
                .iter()
                .find(|i| i.mutation.entity == *kind && i.status == QueueStatus::Pending)
        })
    }

    /// Mark a pending item in-flight and return its mutation.
    pub fn begin(&mut self, id: &str) -> Result<&MutationRecord> {
        let item = self
            .items
            .iter_mut()
            .find(|i| i.mutation.id == id)
            .ok_or_else(|| Error::ItemNotFound(id.to_string()))?;
        if item.status != QueueStatus::Pending {
            return Err(Error::NotPending(id.to_string()));
        }
        item.status = QueueStatus::InFlight;
        Ok(&item.mutation)
    }

    /// Remove every item whose mutation id is in `ids`, keeping later
    /// arrivals. Returns how many were removed.
    ///
    /// This is how a drain commits its work against the persisted queue:
    /// it reloads the stored copy and subtracts the ids it drained, so
    /// mutations enqueued while the drain ran are untouched.
    pub fn remove_all(&mut self, ids: &[MutationId]) -> usize {
        let before = self.items.len();
        self.items.retain(|i| !ids.contains(&i.mutation.id));
        before - self.items.len()
    }

    /// Remove an item and return its mutation.
    pub fn complete(&mut self, id: &str) -> Result<MutationRecord> {
        let pos = self
            .items
            .iter()
            .position(|i| i.mutation.id == id)
            .ok_or_else(|| Error::ItemNotFound(id.to_string()))?;
        Ok(self.items.remove(pos).mutation)
    }

    /// Reset every in-flight item to pending.
    ///
    /// Run after loading persisted state: a process restart is the only way
    /// to abort a stuck drain, and nothing may stay in-flight across it.
    pub fn release_all_in_flight(&mut self) -> usize {
        let mut released = 0;
        for item in &mut self.items {
            if item.status == QueueStatus::InFlight {
                item.status = QueueStatus::Pending;
                released += 1;
            }
        }
        released
    }
}
