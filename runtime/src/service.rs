//! The app-facing sync service.
//!
//! One [`SyncService`] per signed-in owner. Every collaborator comes in
//! through the constructor, so tests assemble a service from a manual
//! clock, an in-memory store, and a scripted gateway without touching
//! global state.

use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::error::Result;
use crate::gateway::RemoteGateway;
use crate::scheduler::{RunOutcome, RunStatus, Scheduler, SyncTrigger};
use crate::signals::{LifecycleEvent, SignalBinding, SignalHub};
use crate::store::{OwnerStore, StateStore};
use serde_json::Value;
use std::sync::Arc;
use tally_engine::{
    ConflictRecord, DeadLetterItem, EntityKind, MutationId, MutationOp, MutationRecord, OwnerId,
    PendingNotification,
};
use tokio::sync::broadcast;

/// Offline-first sync for one owner's tracker data.
pub struct SyncService {
    owner: OwnerId,
    store: OwnerStore,
    clock: Arc<dyn Clock>,
    hub: Arc<SignalHub>,
    scheduler: Arc<Scheduler>,
}

impl SyncService {
    pub fn new(
        owner: impl Into<OwnerId>,
        gateway: Arc<dyn RemoteGateway>,
        state_store: Arc<dyn StateStore>,
        hub: Arc<SignalHub>,
        clock: Arc<dyn Clock>,
        config: SyncConfig,
    ) -> Self {
        let owner = owner.into();
        let store = OwnerStore::new(state_store, owner.clone());
        let scheduler = Arc::new(Scheduler::new(
            gateway,
            store.clone(),
            hub.clone(),
            clock.clone(),
            config,
        ));
        Self {
            owner,
            store,
            clock,
            hub,
            scheduler,
        }
    }

    /// The owner this service syncs for.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Record a local mutation. Returns immediately once the mutation is
    /// durably queued; remote application happens on the next sync run.
    pub async fn submit(
        &self,
        entity: EntityKind,
        op: MutationOp,
        entity_id: impl Into<String>,
        payload: Value,
    ) -> Result<MutationId> {
        let now = self.clock.now_ms();
        let mutation = MutationRecord::new(
            uuid::Uuid::new_v4().to_string(),
            self.owner.clone(),
            entity_id,
            entity,
            op,
            payload,
            now,
        );
        let id = mutation.id.clone();

        // Write transaction: a concurrent drain must not overwrite this
        // enqueue with its own final save.
        {
            let _write = self.store.begin_write().await;
            let mut queue = self.store.load_queue().await?;
            queue.enqueue(mutation, now);
            self.store.save_queue(&queue).await?;
        }

        tracing::debug!(mutation = %id, %entity, "mutation queued");
        Ok(id)
    }

    /// Number of queued mutations not yet confirmed remote.
    pub async fn pending_count(&self) -> Result<usize> {
        Ok(self.store.load_queue().await?.len())
    }

    /// Run a sync now, bypassing the run-interval throttle.
    pub async fn sync_now(&self) -> Result<RunOutcome> {
        self.scheduler.run(SyncTrigger::Manual).await
    }

    /// Summary of the last completed run, if any run has completed.
    pub async fn last_run(&self) -> Result<Option<RunStatus>> {
        self.store.load_run_status().await
    }

    /// Unread conflict notifications, oldest first.
    pub async fn notifications(&self) -> Result<Vec<PendingNotification>> {
        let log = self.store.load_notifications().await?;
        Ok(log.unread().cloned().collect())
    }

    /// Mark a notification read. It is pruned on the next housekeeping
    /// pass, not immediately.
    pub async fn mark_notification_read(&self, id: &str) -> Result<()> {
        let _write = self.store.begin_write().await;
        let mut log = self.store.load_notifications().await?;
        log.mark_read(id)?;
        self.store.save_notifications(&log).await
    }

    /// Conflict audit records still inside the retention window.
    pub async fn conflicts(&self) -> Result<Vec<ConflictRecord>> {
        Ok(self.store.load_conflicts().await?.records().to_vec())
    }

    /// Dead letters not yet archived.
    pub async fn dead_letters(&self) -> Result<Vec<DeadLetterItem>> {
        let dlq = self.store.load_dead_letters().await?;
        Ok(dlq.live().cloned().collect())
    }

    /// Start reacting to platform signals: an offline-to-online edge and
    /// app foregrounding each trigger a run. Dropping the returned binding
    /// stops the listener.
    pub fn attach_signals(&self) -> SignalBinding {
        let scheduler = self.scheduler.clone();
        let mut connectivity = self.hub.watch_connectivity();
        let mut lifecycle = self.hub.subscribe_lifecycle();
        let mut was_connected = *connectivity.borrow();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = connectivity.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let connected = *connectivity.borrow_and_update();
                        if connected && !was_connected {
                            if let Err(error) =
                                scheduler.run(SyncTrigger::ConnectivityRegained).await
                            {
                                tracing::warn!(%error, "connectivity-triggered sync failed");
                            }
                        }
                        was_connected = connected;
                    }
                    event = lifecycle.recv() => {
                        match event {
                            Ok(LifecycleEvent::Foregrounded) => {
                                if let Err(error) =
                                    scheduler.run(SyncTrigger::Foregrounded).await
                                {
                                    tracing::warn!(%error, "foreground-triggered sync failed");
                                }
                            }
                            Ok(LifecycleEvent::Backgrounded) => {}
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                tracing::warn!(skipped, "lifecycle events lagged");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            }
        });

        SignalBinding::new(task)
    }
}
