//! User-facing conflict notifications.
//!
//! A read-mostly projection: one notification per resolved conflict, kept
//! until read (then pruned on the next housekeeping pass) or until the
//! 30-day retention window lapses.

use crate::{
    error::Result, ConflictKind, EntityKind, Error, MutationRecord, NotificationId, Timestamp,
};
use serde::{Deserialize, Serialize};

/// Retention window for unread notifications: 30 days.
pub const NOTIFICATION_RETENTION_MS: u64 = 30 * 86_400_000;

/// A pending notification about a resolved conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingNotification {
    /// Unique identifier, derived from the conflicting mutation
    pub id: NotificationId,
    /// Kind of entity involved
    pub entity: EntityKind,
    /// Human-readable summary of what happened
    pub message: String,
    /// When the notification was created
    pub created_at: Timestamp,
    /// Whether the user has seen it
    pub read: bool,
}

impl PendingNotification {
    /// Build the notification for a resolved conflict.
    pub fn for_conflict(mutation: &MutationRecord, kind: ConflictKind, now: Timestamp) -> Self {
        let message = match kind {
            ConflictKind::None => String::new(),
            ConflictKind::CreateDuplicate => format!(
                "Your {} was already recorded on another device; the existing version was kept.",
                mutation.entity
            ),
            ConflictKind::UpdateConflict => format!(
                "Your {} was changed on another device; differing fields were merged and the server version was kept where they disagreed.",
                mutation.entity
            ),
            ConflictKind::DeleteConflict => format!(
                "A {} was deleted on one device and edited on another; the edited version was kept.",
                mutation.entity
            ),
        };

        Self {
            id: format!("notif:{}", mutation.id),
            entity: mutation.entity,
            message,
            created_at: now,
            read: false,
        }
    }
}

/// Persisted list of pending notifications.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationLog {
    items: Vec<PendingNotification>,
}

impl NotificationLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Append a notification.
    pub fn push(&mut self, notification: PendingNotification) {
        self.items.push(notification);
    }

    /// All notifications, oldest first.
    pub fn items(&self) -> &[PendingNotification] {
        &self.items
    }

    /// Unread notifications, oldest first.
    pub fn unread(&self) -> impl Iterator<Item = &PendingNotification> {
        self.items.iter().filter(|n| !n.read)
    }

    /// Flip the read flag. The only mutation a notification ever sees.
    pub fn mark_read(&mut self, id: &str) -> Result<()> {
        let item = self
            .items
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| Error::NotificationNotFound(id.to_string()))?;
        item.read = true;
        Ok(())
    }

    /// Drop read notifications and anything older than the retention
    /// window. Returns how many were removed.
    pub fn prune(&mut self, now: Timestamp, retention_ms: u64) -> usize {
        let before = self.items.len();
        self.items
            .retain(|n| !n.read && now.saturating_sub(n.created_at) < retention_ms);
        before - self.items.len()
    }
}
