//! Remote persistence gateway contract.
//!
//! The remote service accepts upserts keyed by (owner, fingerprint) and
//! must treat that pair as a natural unique key: an exact duplicate is
//! acknowledged, never an error. Timeouts on individual calls are the
//! gateway implementation's responsibility; the scheduler only sees the
//! final [`UpsertOutcome`].

use async_trait::async_trait;
use std::collections::HashMap;
use tally_engine::{Fingerprint, MutationRecord, OwnerId, UpsertOutcome};
use tokio::sync::Mutex;

/// The remote persistence service, as the sync core sees it.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Apply one mutation remotely.
    ///
    /// Transport failures map to [`UpsertOutcome::TransientError`]; this
    /// method itself never fails.
    async fn upsert(&self, mutation: &MutationRecord) -> UpsertOutcome;
}

/// In-memory gateway honoring the (owner, fingerprint) unique-key
/// contract. Reference implementation for tests and local development.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    records: Mutex<HashMap<(OwnerId, Fingerprint), serde_json::Value>>,
}

impl MemoryGateway {
    /// Create an empty gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of accepted writes.
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    /// Whether no writes were accepted.
    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    /// Look up an accepted write.
    pub async fn get(&self, owner: &str, fingerprint: &str) -> Option<serde_json::Value> {
        self.records
            .lock()
            .await
            .get(&(owner.to_string(), fingerprint.to_string()))
            .cloned()
    }
}

#[async_trait]
impl RemoteGateway for MemoryGateway {
    async fn upsert(&self, mutation: &MutationRecord) -> UpsertOutcome {
        let mut records = self.records.lock().await;
        let key = (mutation.owner_id.clone(), mutation.content_hash.clone());
        if records.contains_key(&key) {
            return UpsertOutcome::Duplicate;
        }
        records.insert(key, mutation.payload.clone());
        UpsertOutcome::Success
    }
}
