//! Unified error handling for the sync runtime.

use thiserror::Error;

/// Error from a state store implementation.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StoreError(pub String);

/// Runtime error type.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("engine error: {0}")]
    Engine(#[from] tally_engine::Error),

    #[error("state store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_convert() {
        let err: SyncError = tally_engine::Error::ItemNotFound("m-1".into()).into();
        assert_eq!(err.to_string(), "engine error: queue item not found: m-1");
    }

    #[test]
    fn store_errors_convert() {
        let err: SyncError = StoreError("disk full".into()).into();
        assert_eq!(err.to_string(), "state store error: disk full");
    }
}
