//! Dead-letter queue with exponential backoff.
//!
//! Mutations that failed remote application land here with retry
//! bookkeeping. Retry eligibility, exhaustion, and archival are pure
//! functions of the item and an explicit `now`, so the schedule is fully
//! testable without a clock.

use crate::{error::Result, EntityKind, Error, MutationId, MutationRecord, Timestamp};
use serde::{Deserialize, Serialize};

/// Base retry delay: 1 second.
pub const BASE_BACKOFF_MS: u64 = 1_000;

/// Backoff ceiling: 5 minutes.
pub const MAX_BACKOFF_MS: u64 = 300_000;

/// An item that has failed this many retries is archived instead of
/// retried again.
pub const MAX_RETRY_COUNT: u32 = 5;

/// Archive sweep horizon: dead letters older than 30 days are archived
/// regardless of retry state, bounding queue growth.
pub const DEAD_LETTER_RETENTION_MS: u64 = 30 * 86_400_000;

/// Backoff before retry attempt `n` (0-indexed): `min(1000 * 2^n, 300000)`.
pub fn backoff_ms(retry_count: u32) -> u64 {
    if retry_count >= 16 {
        return MAX_BACKOFF_MS;
    }
    (BASE_BACKOFF_MS << retry_count).min(MAX_BACKOFF_MS)
}

/// A mutation parked after failed remote application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterItem {
    /// Identifier (the wrapped mutation's id)
    pub id: MutationId,
    /// Kind of entity, duplicated for cheap filtering
    pub entity: EntityKind,
    /// The parked mutation
    pub mutation: MutationRecord,
    /// Why the last attempt failed
    pub reason: String,
    /// When the item entered the dead-letter queue
    pub failed_at: Timestamp,
    /// Completed retry attempts
    pub retry_count: u32,
    /// When the last retry was attempted
    pub last_retry_at: Option<Timestamp>,
    /// False for validation failures - never retried
    pub can_retry: bool,
    /// Terminal state; archived items are never retried automatically
    pub archived: bool,
    /// When the item was archived
    pub archived_at: Option<Timestamp>,
}

impl DeadLetterItem {
    /// The timestamp the backoff window counts from.
    pub fn last_attempt(&self) -> Timestamp {
        self.last_retry_at.unwrap_or(self.failed_at)
    }
}

/// What a processing pass should do with one dead letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Terminal; leave it alone
    SkipArchived,
    /// Backoff window has not elapsed
    SkipBackoff,
    /// Retries exhausted (or the item was never retryable); archive it
    Exhausted,
    /// Dispatch to the entity's retry handler
    Retry,
}

/// Counters for one dead-letter processing pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DlqReport {
    /// Items dispatched to a retry handler
    pub retried: usize,
    /// Dispatched items that succeeded and left the queue
    pub succeeded: usize,
    /// Items archived this pass (exhaustion or sweep)
    pub archived: usize,
    /// Dispatched items that failed again
    pub failed: usize,
    /// Items skipped (archived or still backing off)
    pub skipped: usize,
}

/// The per-owner dead-letter queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterQueue {
    items: Vec<DeadLetterItem>,
}

impl DeadLetterQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Park a failed mutation. Non-retryable items are archived on entry.
    pub fn push(
        &mut self,
        mutation: MutationRecord,
        reason: impl Into<String>,
        can_retry: bool,
        now: Timestamp,
    ) {
        self.items.push(DeadLetterItem {
            id: mutation.id.clone(),
            entity: mutation.entity,
            mutation,
            reason: reason.into(),
            failed_at: now,
            retry_count: 0,
            last_retry_at: None,
            can_retry,
            archived: !can_retry,
            archived_at: (!can_retry).then_some(now),
        });
    }

    /// Number of items, live and archived.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the queue holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// All items.
    pub fn items(&self) -> &[DeadLetterItem] {
        &self.items
    }

    /// Items not yet archived.
    pub fn live(&self) -> impl Iterator<Item = &DeadLetterItem> {
        self.items.iter().filter(|i| !i.archived)
    }

    /// Decide what a processing pass should do with an item right now.
    ///
    /// Exhaustion is only declared on an eligible attempt: an item that has
    /// burned its last retry still waits out its final backoff window
    /// before it is archived.
    pub fn decide(item: &DeadLetterItem, now: Timestamp) -> RetryDecision {
        if item.archived {
            return RetryDecision::SkipArchived;
        }
        if !item.can_retry {
            return RetryDecision::Exhausted;
        }
        if now.saturating_sub(item.last_attempt()) < backoff_ms(item.retry_count) {
            return RetryDecision::SkipBackoff;
        }
        if item.retry_count >= MAX_RETRY_COUNT {
            return RetryDecision::Exhausted;
        }
        RetryDecision::Retry
    }

    /// Remove an item after a successful retry.
    pub fn record_success(&mut self, id: &str) -> Result<DeadLetterItem> {
        let pos = self
            .items
            .iter()
            .position(|i| i.id == id)
            .ok_or_else(|| Error::DeadLetterNotFound(id.to_string()))?;
        Ok(self.items.remove(pos))
    }

    /// Bump retry bookkeeping after a failed retry.
    pub fn record_failure(&mut self, id: &str, reason: impl Into<String>, now: Timestamp) -> Result<()> {
        let item = self.get_mut(id)?;
        if item.archived {
            return Err(Error::DeadLetterArchived(id.to_string()));
        }
        item.retry_count += 1;
        item.last_retry_at = Some(now);
        item.reason = reason.into();
        Ok(())
    }

    /// Archive an item. Terminal.
    pub fn archive(&mut self, id: &str, now: Timestamp) -> Result<()> {
        let item = self.get_mut(id)?;
        if !item.archived {
            item.archived = true;
            item.archived_at = Some(now);
        }
        Ok(())
    }

    /// Archive everything older than the retention horizon, whatever its
    /// retry state. Returns how many items were newly archived.
    pub fn sweep(&mut self, now: Timestamp, retention_ms: u64) -> usize {
        let mut archived = 0;
        for item in &mut self.items {
            if !item.archived && now.saturating_sub(item.failed_at) >= retention_ms {
                item.archived = true;
                item.archived_at = Some(now);
                archived += 1;
            }
        }
        archived
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut DeadLetterItem> {
        self.items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| Error::DeadLetterNotFound(id.to_string()))
    }
}
