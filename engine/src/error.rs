//! Error types for the Tally sync engine.

use crate::{MutationId, NotificationId, SchemaVersion};
use thiserror::Error;

/// All possible errors from the Tally sync engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Queue errors
    #[error("queue item not found: {0}")]
    ItemNotFound(MutationId),

    #[error("queue item is not pending: {0}")]
    NotPending(MutationId),

    // Dead-letter errors
    #[error("dead letter not found: {0}")]
    DeadLetterNotFound(MutationId),

    #[error("dead letter is archived: {0}")]
    DeadLetterArchived(MutationId),

    // Notification errors
    #[error("notification not found: {0}")]
    NotificationNotFound(NotificationId),

    // State errors
    #[error("invalid state blob: {0}")]
    InvalidState(String),

    #[error("unsupported state schema version: {actual} (max supported: {supported})")]
    UnsupportedSchemaVersion {
        supported: SchemaVersion,
        actual: SchemaVersion,
    },
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
