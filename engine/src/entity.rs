//! The closed set of entity kinds the tracker syncs.
//!
//! Dispatch over entity kinds is exhaustive: every retry handler and
//! fingerprint rule is resolved by matching on [`EntityKind`], so an
//! unknown kind cannot reach the sync pipeline at runtime. Persisted
//! blobs carrying a tag outside this set fail at the decode boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A kind of trackable entity.
///
/// Each kind knows which payload fields carry semantic identity (used for
/// fingerprinting) and whether duplicate submissions within the same
/// calendar day should collapse to one logical write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    /// A daily mood check-in (one logical check-in per day)
    MoodCheckin,
    /// A habit completion log (one tick per habit per day)
    HabitLog,
    /// A free-form journal entry
    JournalEntry,
    /// A progress update against a goal
    GoalProgress,
}

impl EntityKind {
    /// All kinds, in the order drains walk them.
    pub const ALL: [EntityKind; 4] = [
        EntityKind::MoodCheckin,
        EntityKind::HabitLog,
        EntityKind::JournalEntry,
        EntityKind::GoalProgress,
    ];

    /// Payload fields that carry semantic identity for this kind.
    ///
    /// Everything else in the payload (client timestamps, device-generated
    /// identifiers, presentation hints) is ignored when fingerprinting.
    pub fn significant_fields(&self) -> &'static [&'static str] {
        match self {
            EntityKind::MoodCheckin => &["mood", "energy", "note"],
            EntityKind::HabitLog => &["habit", "completed"],
            EntityKind::JournalEntry => &["title", "body"],
            EntityKind::GoalProgress => &["goal", "progress"],
        }
    }

    /// Whether same-day resubmissions of this kind collapse to one write.
    pub fn day_scoped(&self) -> bool {
        matches!(self, EntityKind::MoodCheckin | EntityKind::HabitLog)
    }

    /// Stable lowercase name, used in fingerprints and log output.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::MoodCheckin => "mood_checkin",
            EntityKind::HabitLog => "habit_log",
            EntityKind::JournalEntry => "journal_entry",
            EntityKind::GoalProgress => "goal_progress",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
