//! Configuration for the sync runtime.

use std::env;
use tally_engine::{CONFLICT_RETENTION_MS, DEAD_LETTER_RETENTION_MS, NOTIFICATION_RETENTION_MS};

/// Minimum interval between scheduler runs: 60 seconds.
pub const DEFAULT_MIN_RUN_INTERVAL_MS: u64 = 60_000;

/// Sync runtime configuration.
///
/// Defaults match the engine's documented retention windows; environment
/// variables override them for field debugging.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Minimum milliseconds between two scheduler runs
    pub min_run_interval_ms: u64,
    /// Archive sweep horizon for dead letters
    pub dead_letter_retention_ms: u64,
    /// Retention window for conflict records
    pub conflict_retention_ms: u64,
    /// Retention window for unread notifications
    pub notification_retention_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            min_run_interval_ms: DEFAULT_MIN_RUN_INTERVAL_MS,
            dead_letter_retention_ms: DEAD_LETTER_RETENTION_MS,
            conflict_retention_ms: CONFLICT_RETENTION_MS,
            notification_retention_ms: NOTIFICATION_RETENTION_MS,
        }
    }
}

impl SyncConfig {
    /// Load configuration, applying `TALLY_SYNC_*` environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = read_ms("TALLY_SYNC_MIN_RUN_INTERVAL_MS")? {
            config.min_run_interval_ms = value;
        }
        if let Some(value) = read_ms("TALLY_SYNC_DEAD_LETTER_RETENTION_MS")? {
            config.dead_letter_retention_ms = value;
        }
        if let Some(value) = read_ms("TALLY_SYNC_CONFLICT_RETENTION_MS")? {
            config.conflict_retention_ms = value;
        }
        if let Some(value) = read_ms("TALLY_SYNC_NOTIFICATION_RETENTION_MS")? {
            config.notification_retention_ms = value;
        }

        Ok(config)
    }
}

fn read_ms(var: &'static str) -> Result<Option<u64>, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(var)),
        Err(_) => Ok(None),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}")]
    InvalidValue(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_engine_windows() {
        let config = SyncConfig::default();
        assert_eq!(config.min_run_interval_ms, 60_000);
        assert_eq!(config.dead_letter_retention_ms, 30 * 86_400_000);
        assert_eq!(config.conflict_retention_ms, 7 * 86_400_000);
        assert_eq!(config.notification_retention_ms, 30 * 86_400_000);
    }
}
