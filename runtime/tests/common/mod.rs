#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tally_engine::{MutationRecord, UpsertOutcome};
use tally_runtime::{
    ManualClock, MemoryStore, RemoteGateway, SignalHub, SyncConfig, SyncService,
};
use tokio::sync::Mutex;

/// A fixed "now" well into the epoch, so day bucketing behaves like
/// production timestamps.
pub const START_MS: u64 = 1_700_000_000_000;

/// Gateway that replays a scripted list of outcomes, then answers
/// `Success`, recording every mutation it was handed.
#[derive(Default)]
pub struct ScriptedGateway {
    script: Mutex<VecDeque<UpsertOutcome>>,
    calls: Mutex<Vec<MutationRecord>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push_outcome(&self, outcome: UpsertOutcome) {
        self.script.lock().await.push_back(outcome);
    }

    pub async fn calls(&self) -> Vec<MutationRecord> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }
}

#[async_trait]
impl RemoteGateway for ScriptedGateway {
    async fn upsert(&self, mutation: &MutationRecord) -> UpsertOutcome {
        self.calls.lock().await.push(mutation.clone());
        self.script
            .lock()
            .await
            .pop_front()
            .unwrap_or(UpsertOutcome::Success)
    }
}

pub struct Harness {
    pub service: SyncService,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub hub: Arc<SignalHub>,
}

pub fn harness(gateway: Arc<dyn RemoteGateway>) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(START_MS));
    let hub = Arc::new(SignalHub::new(true));
    let service = SyncService::new(
        "owner-1",
        gateway,
        store.clone(),
        hub.clone(),
        clock.clone(),
        SyncConfig::default(),
    );
    Harness {
        service,
        store,
        clock,
        hub,
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
