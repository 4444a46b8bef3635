//! Persistent state storage.
//!
//! The host platform supplies a plain key-value store; [`OwnerStore`]
//! layers per-owner key namespacing and the engine's versioned envelope
//! on top. All access is read-entire-structure, mutate in memory,
//! write-entire-structure; concurrent writers (the app enqueueing, the
//! scheduler committing a run) serialize those cycles through the store's
//! write transaction so neither overwrites the other's save.

use crate::error::{Result, StoreError, SyncError};
use crate::scheduler::RunStatus;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tally_engine::{envelope, ConflictLog, DeadLetterQueue, NotificationLog, OwnerId, SyncQueue};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Key suffixes for the persisted structures.
const QUEUE_KEY: &str = "queue";
const DEAD_LETTERS_KEY: &str = "dead_letters";
const CONFLICTS_KEY: &str = "conflicts";
const NOTIFICATIONS_KEY: &str = "notifications";
const RUN_STATUS_KEY: &str = "run_status";

/// Platform key-value store, namespaced per owner by [`OwnerStore`].
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> std::result::Result<Option<Vec<u8>>, StoreError>;
    async fn set(&self, key: &str, value: Vec<u8>) -> std::result::Result<(), StoreError>;
    async fn remove(&self, key: &str) -> std::result::Result<(), StoreError>;
}

/// In-memory store. Reference implementation for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot every key and value, sorted. Lets tests assert that a
    /// no-op run left persisted state byte-for-byte unchanged.
    pub async fn dump(&self) -> BTreeMap<String, Vec<u8>> {
        self.entries
            .lock()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, key: &str) -> std::result::Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> std::result::Result<(), StoreError> {
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> std::result::Result<(), StoreError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

/// Typed, per-owner view over a [`StateStore`].
///
/// Every read-modify-write of a persisted structure must run inside a
/// [`OwnerStore::begin_write`] transaction. Clones share the lock, so the
/// service's enqueue and the scheduler's end-of-run persist serialize
/// against each other instead of overwriting each other's saves.
#[derive(Clone)]
pub struct OwnerStore {
    store: Arc<dyn StateStore>,
    owner: OwnerId,
    writes: Arc<Mutex<()>>,
}

impl OwnerStore {
    /// Create a view scoped to one owner.
    pub fn new(store: Arc<dyn StateStore>, owner: impl Into<OwnerId>) -> Self {
        Self {
            store,
            owner: owner.into(),
            writes: Arc::new(Mutex::new(())),
        }
    }

    /// Enter a write transaction. Hold the guard across the load, the
    /// in-memory mutation, and the save.
    pub async fn begin_write(&self) -> OwnedMutexGuard<()> {
        self.writes.clone().lock_owned().await
    }

    /// The owner this view is scoped to.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    fn key(&self, suffix: &str) -> String {
        format!("tally:{}:{}", self.owner, suffix)
    }

    async fn load_or_default<T: DeserializeOwned + Default>(&self, suffix: &str) -> Result<T> {
        match self.load_opt(suffix).await? {
            Some(value) => Ok(value),
            None => Ok(T::default()),
        }
    }

    async fn load_opt<T: DeserializeOwned>(&self, suffix: &str) -> Result<Option<T>> {
        let Some(bytes) = self.store.get(&self.key(suffix)).await? else {
            return Ok(None);
        };
        let json = String::from_utf8(bytes)
            .map_err(|e| SyncError::Engine(tally_engine::Error::InvalidState(e.to_string())))?;
        Ok(Some(envelope::decode(&json)?))
    }

    async fn save<T: Serialize>(&self, suffix: &str, value: &T) -> Result<()> {
        let json = envelope::encode(value)?;
        self.store.set(&self.key(suffix), json.into_bytes()).await?;
        Ok(())
    }

    pub async fn load_queue(&self) -> Result<SyncQueue> {
        self.load_or_default(QUEUE_KEY).await
    }

    pub async fn save_queue(&self, queue: &SyncQueue) -> Result<()> {
        self.save(QUEUE_KEY, queue).await
    }

    pub async fn load_dead_letters(&self) -> Result<DeadLetterQueue> {
        self.load_or_default(DEAD_LETTERS_KEY).await
    }

    pub async fn save_dead_letters(&self, dlq: &DeadLetterQueue) -> Result<()> {
        self.save(DEAD_LETTERS_KEY, dlq).await
    }

    pub async fn load_conflicts(&self) -> Result<ConflictLog> {
        self.load_or_default(CONFLICTS_KEY).await
    }

    pub async fn save_conflicts(&self, log: &ConflictLog) -> Result<()> {
        self.save(CONFLICTS_KEY, log).await
    }

    pub async fn load_notifications(&self) -> Result<NotificationLog> {
        self.load_or_default(NOTIFICATIONS_KEY).await
    }

    pub async fn save_notifications(&self, log: &NotificationLog) -> Result<()> {
        self.save(NOTIFICATIONS_KEY, log).await
    }

    pub async fn load_run_status(&self) -> Result<Option<RunStatus>> {
        self.load_opt(RUN_STATUS_KEY).await
    }

    pub async fn save_run_status(&self, status: &RunStatus) -> Result<()> {
        self.save(RUN_STATUS_KEY, status).await
    }
}
