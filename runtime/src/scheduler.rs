//! Background sync scheduler.
//!
//! One scheduler per owner. A run drains the sync queue, processes the
//! dead-letter queue, and performs housekeeping, all under a single-writer
//! guard: overlapping triggers collapse into one active run. Offline runs
//! are full no-ops; nothing is loaded or persisted before the connectivity
//! check passes.
//!
//! A run works on a snapshot of the persisted state and commits inside the
//! store's write transaction by merging: the queue save subtracts the
//! drained ids from a fresh load, so a mutation enqueued while the run was
//! in flight is never overwritten.

use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::error::Result;
use crate::gateway::RemoteGateway;
use crate::signals::SignalHub;
use crate::store::OwnerStore;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tally_engine::{
    conflict, queue, ConflictRecord, DeadLetterQueue, Disposition, DlqReport, EntityKind,
    MutationId, MutationOp, MutationRecord, PendingNotification, QueueReport, ResolutionAction,
    RetryDecision, SyncQueue, Timestamp, UpsertOutcome,
};

/// What woke the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncTrigger {
    /// Connectivity went from offline to online
    ConnectivityRegained,
    /// The app came to the foreground
    Foregrounded,
    /// Explicit user request; bypasses the run-interval throttle
    Manual,
}

/// Persisted summary of the last completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatus {
    /// What woke the run
    pub trigger: SyncTrigger,
    /// When the run started
    pub started_at: Timestamp,
    /// When the run finished
    pub finished_at: Timestamp,
    /// Queue drain counters
    pub queue: QueueReport,
    /// Dead-letter pass counters
    pub dead_letters: DlqReport,
}

/// How a trigger was handled.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// A full run happened
    Completed(RunStatus),
    /// The device is offline; persisted state was not touched
    SkippedOffline,
    /// The minimum run interval has not elapsed
    SkippedThrottled,
    /// Another run is already active
    SkippedBusy,
}

/// Releases the single-writer flag when the run ends, on every exit path.
struct DrainGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> DrainGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// The per-owner background scheduler.
pub struct Scheduler {
    gateway: Arc<dyn RemoteGateway>,
    store: OwnerStore,
    hub: Arc<SignalHub>,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
    draining: AtomicBool,
    last_run_ms: AtomicU64,
}

impl Scheduler {
    pub fn new(
        gateway: Arc<dyn RemoteGateway>,
        store: OwnerStore,
        hub: Arc<SignalHub>,
        clock: Arc<dyn Clock>,
        config: SyncConfig,
    ) -> Self {
        Self {
            gateway,
            store,
            hub,
            clock,
            config,
            draining: AtomicBool::new(false),
            last_run_ms: AtomicU64::new(0),
        }
    }

    /// Handle one trigger. At most one run is active at a time; a trigger
    /// arriving during a run is dropped, not queued.
    pub async fn run(&self, trigger: SyncTrigger) -> Result<RunOutcome> {
        let Some(_guard) = DrainGuard::try_acquire(&self.draining) else {
            tracing::debug!(?trigger, "sync already running, trigger dropped");
            return Ok(RunOutcome::SkippedBusy);
        };

        // Offline is a complete no-op: no load, no save, no counters.
        if !self.hub.is_connected() {
            tracing::debug!(?trigger, "offline, sync skipped");
            return Ok(RunOutcome::SkippedOffline);
        }

        let started_at = self.clock.now_ms();
        if trigger != SyncTrigger::Manual {
            let last = self.last_run_ms.load(Ordering::Acquire);
            if last != 0 && started_at.saturating_sub(last) < self.config.min_run_interval_ms {
                tracing::debug!(?trigger, "within minimum run interval, sync skipped");
                return Ok(RunOutcome::SkippedThrottled);
            }
        }

        tracing::info!(owner = self.store.owner(), ?trigger, "sync run starting");

        let mut sync_queue = self.store.load_queue().await?;
        let mut dead_letters = self.store.load_dead_letters().await?;

        // Only a restart can abort a drain, so anything still marked
        // in-flight belongs to a dead process and goes back to pending.
        let released = sync_queue.release_all_in_flight();
        if released > 0 {
            tracing::warn!(released, "released stale in-flight items");
        }

        // The ids this run will drain. The final persist subtracts exactly
        // these from the stored queue instead of overwriting it, so
        // mutations enqueued while the run is in flight are untouched.
        let drained: Vec<MutationId> = sync_queue
            .items()
            .iter()
            .map(|i| i.mutation.id.clone())
            .collect();

        let mut new_conflicts = Vec::new();
        let mut new_notifications = Vec::new();

        let queue_report = self
            .drain_queue(
                &mut sync_queue,
                &mut dead_letters,
                &mut new_conflicts,
                &mut new_notifications,
            )
            .await?;
        let mut dlq_report = self
            .process_dead_letters(&mut dead_letters, &mut new_conflicts, &mut new_notifications)
            .await?;

        let finished_at = self.clock.now_ms();
        dlq_report.archived +=
            dead_letters.sweep(finished_at, self.config.dead_letter_retention_ms);

        let status = RunStatus {
            trigger,
            started_at,
            finished_at,
            queue: queue_report,
            dead_letters: dlq_report,
        };

        // Write transaction: reload, merge this run's effects, save.
        {
            let _write = self.store.begin_write().await;

            let mut persisted_queue = self.store.load_queue().await?;
            persisted_queue.remove_all(&drained);

            let mut conflicts = self.store.load_conflicts().await?;
            for record in new_conflicts {
                conflicts.push(record);
            }
            let pruned_conflicts = conflicts.prune(finished_at, self.config.conflict_retention_ms);

            let mut notifications = self.store.load_notifications().await?;
            for notification in new_notifications {
                notifications.push(notification);
            }
            let pruned_notifications =
                notifications.prune(finished_at, self.config.notification_retention_ms);

            if pruned_conflicts + pruned_notifications > 0 {
                tracing::debug!(pruned_conflicts, pruned_notifications, "housekeeping");
            }

            self.store.save_queue(&persisted_queue).await?;
            self.store.save_dead_letters(&dead_letters).await?;
            self.store.save_conflicts(&conflicts).await?;
            self.store.save_notifications(&notifications).await?;
            self.store.save_run_status(&status).await?;
        }
        self.last_run_ms.store(finished_at, Ordering::Release);

        tracing::info!(
            attempted = status.queue.attempted,
            succeeded = status.queue.succeeded,
            conflicts = status.queue.conflicts,
            dead_lettered = status.queue.dead_lettered,
            retried = status.dead_letters.retried,
            archived = status.dead_letters.archived,
            "sync run finished"
        );

        Ok(RunOutcome::Completed(status))
    }

    /// Drain pending mutations: FIFO per entity kind, each attempted once.
    /// Conflict records and notifications produced along the way are
    /// collected for the end-of-run persist.
    async fn drain_queue(
        &self,
        sync_queue: &mut SyncQueue,
        dead_letters: &mut DeadLetterQueue,
        new_conflicts: &mut Vec<ConflictRecord>,
        new_notifications: &mut Vec<PendingNotification>,
    ) -> Result<QueueReport> {
        let mut report = QueueReport::default();

        while let Some(item) = sync_queue.next_pending() {
            let id = item.mutation.id.clone();
            let mutation = sync_queue.begin(&id)?.clone();
            report.attempted += 1;

            let outcome = self.dispatch(&mutation).await;
            match queue::disposition(outcome) {
                Disposition::Done => {
                    sync_queue.complete(&id)?;
                    report.succeeded += 1;
                }
                Disposition::Resolve(remote) => {
                    let now = self.clock.now_ms();
                    let resolution = conflict::resolve(&mutation, &remote, now);

                    if let ResolutionAction::Submit(payload) = resolution.action {
                        self.submit_reconciled(&mutation, payload, dead_letters)
                            .await;
                    }
                    if let Some(record) = resolution.record {
                        new_conflicts.push(record);
                    }
                    if let Some(notification) = resolution.notification {
                        new_notifications.push(notification);
                    }

                    sync_queue.complete(&id)?;
                    if resolution.kind == tally_engine::ConflictKind::None {
                        report.succeeded += 1;
                    } else {
                        report.conflicts += 1;
                    }
                }
                Disposition::DeadLetter { reason, can_retry } => {
                    tracing::warn!(mutation = %id, %reason, can_retry, "mutation dead-lettered");
                    let mutation = sync_queue.complete(&id)?;
                    dead_letters.push(mutation, reason, can_retry, self.clock.now_ms());
                    report.dead_lettered += 1;
                }
            }
        }

        Ok(report)
    }

    /// One pass over the dead-letter queue: retry what is eligible,
    /// archive what is exhausted, skip the rest.
    async fn process_dead_letters(
        &self,
        dead_letters: &mut DeadLetterQueue,
        new_conflicts: &mut Vec<ConflictRecord>,
        new_notifications: &mut Vec<PendingNotification>,
    ) -> Result<DlqReport> {
        let mut report = DlqReport::default();
        let ids: Vec<String> = dead_letters.items().iter().map(|i| i.id.clone()).collect();

        for id in ids {
            let now = self.clock.now_ms();
            let Some(item) = dead_letters.items().iter().find(|i| i.id == id) else {
                continue;
            };

            match DeadLetterQueue::decide(item, now) {
                RetryDecision::SkipArchived | RetryDecision::SkipBackoff => {
                    report.skipped += 1;
                }
                RetryDecision::Exhausted => {
                    tracing::warn!(mutation = %id, "retries exhausted, archiving");
                    dead_letters.archive(&id, now)?;
                    report.archived += 1;
                }
                RetryDecision::Retry => {
                    let mutation = item.mutation.clone();
                    report.retried += 1;

                    let outcome = self.dispatch(&mutation).await;
                    match queue::disposition(outcome) {
                        Disposition::Done => {
                            dead_letters.record_success(&id)?;
                            report.succeeded += 1;
                        }
                        Disposition::Resolve(remote) => {
                            let resolution = conflict::resolve(&mutation, &remote, now);
                            if let ResolutionAction::Submit(payload) = resolution.action {
                                self.submit_reconciled(&mutation, payload, dead_letters)
                                    .await;
                            }
                            if let Some(record) = resolution.record {
                                new_conflicts.push(record);
                            }
                            if let Some(notification) = resolution.notification {
                                new_notifications.push(notification);
                            }
                            dead_letters.record_success(&id)?;
                            report.succeeded += 1;
                        }
                        Disposition::DeadLetter { reason, can_retry } => {
                            // One counter per item: a terminal rejection is
                            // an archival, a retryable failure is a failure.
                            if can_retry {
                                dead_letters.record_failure(&id, reason, now)?;
                                report.failed += 1;
                            } else {
                                tracing::warn!(mutation = %id, %reason, "retry rejected, archiving");
                                dead_letters.archive(&id, now)?;
                                report.archived += 1;
                            }
                        }
                    }
                }
            }
        }

        Ok(report)
    }

    /// Submit the reconciled payload produced by conflict resolution. One
    /// attempt; a second divergence waits for the next run to re-detect.
    async fn submit_reconciled(
        &self,
        original: &MutationRecord,
        payload: serde_json::Value,
        dead_letters: &mut DeadLetterQueue,
    ) {
        let now = self.clock.now_ms();
        let reconciled = MutationRecord::new(
            format!("{}:resolved", original.id),
            original.owner_id.clone(),
            original.entity_id.clone(),
            original.entity,
            MutationOp::Update,
            payload,
            now,
        );

        let outcome = self.dispatch(&reconciled).await;
        match queue::disposition(outcome) {
            Disposition::Done => {}
            Disposition::Resolve(_) => {
                tracing::warn!(
                    mutation = %reconciled.id,
                    "remote moved again during resolution, deferring to next run"
                );
            }
            Disposition::DeadLetter { reason, can_retry } => {
                tracing::warn!(mutation = %reconciled.id, %reason, "reconciled write failed");
                dead_letters.push(reconciled, reason, can_retry, now);
            }
        }
    }

    /// Route one mutation to its kind's remote handler.
    async fn dispatch(&self, mutation: &MutationRecord) -> UpsertOutcome {
        match mutation.entity {
            EntityKind::MoodCheckin => self.upsert_mood_checkin(mutation).await,
            EntityKind::HabitLog => self.upsert_habit_log(mutation).await,
            EntityKind::JournalEntry => self.upsert_journal_entry(mutation).await,
            EntityKind::GoalProgress => self.upsert_goal_progress(mutation).await,
        }
    }

    async fn upsert_mood_checkin(&self, mutation: &MutationRecord) -> UpsertOutcome {
        tracing::debug!(mutation = %mutation.id, fingerprint = %mutation.content_hash, "upserting mood check-in");
        self.gateway.upsert(mutation).await
    }

    async fn upsert_habit_log(&self, mutation: &MutationRecord) -> UpsertOutcome {
        tracing::debug!(mutation = %mutation.id, fingerprint = %mutation.content_hash, "upserting habit log");
        self.gateway.upsert(mutation).await
    }

    async fn upsert_journal_entry(&self, mutation: &MutationRecord) -> UpsertOutcome {
        tracing::debug!(mutation = %mutation.id, fingerprint = %mutation.content_hash, "upserting journal entry");
        self.gateway.upsert(mutation).await
    }

    async fn upsert_goal_progress(&self, mutation: &MutationRecord) -> UpsertOutcome {
        tracing::debug!(mutation = %mutation.id, fingerprint = %mutation.content_hash, "upserting goal progress");
        self.gateway.upsert(mutation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::gateway::MemoryGateway;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn scheduler(connected: bool) -> (Scheduler, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let store = OwnerStore::new(Arc::new(MemoryStore::new()), "owner-1");
        let scheduler = Scheduler::new(
            Arc::new(MemoryGateway::new()),
            store,
            Arc::new(SignalHub::new(connected)),
            clock.clone(),
            SyncConfig::default(),
        );
        (scheduler, clock)
    }

    #[tokio::test]
    async fn offline_run_is_skipped() {
        let (scheduler, _) = scheduler(false);
        let outcome = scheduler.run(SyncTrigger::Manual).await.unwrap();
        assert_eq!(outcome, RunOutcome::SkippedOffline);
    }

    #[tokio::test]
    async fn non_manual_triggers_are_throttled() {
        let (scheduler, clock) = scheduler(true);

        let first = scheduler.run(SyncTrigger::Foregrounded).await.unwrap();
        assert!(matches!(first, RunOutcome::Completed(_)));

        clock.advance(1_000);
        let second = scheduler.run(SyncTrigger::Foregrounded).await.unwrap();
        assert_eq!(second, RunOutcome::SkippedThrottled);

        // Manual bypasses the throttle.
        let manual = scheduler.run(SyncTrigger::Manual).await.unwrap();
        assert!(matches!(manual, RunOutcome::Completed(_)));

        // After the interval elapses, automatic triggers run again.
        clock.advance(60_000);
        let third = scheduler.run(SyncTrigger::ConnectivityRegained).await.unwrap();
        assert!(matches!(third, RunOutcome::Completed(_)));
    }

    #[tokio::test]
    async fn empty_queue_run_reports_zero_work() {
        let (scheduler, _) = scheduler(true);

        let RunOutcome::Completed(status) = scheduler.run(SyncTrigger::Manual).await.unwrap()
        else {
            panic!("expected a completed run");
        };
        assert_eq!(status.queue, QueueReport::default());
        assert_eq!(status.dead_letters, DlqReport::default());
        assert_eq!(status.trigger, SyncTrigger::Manual);
    }

    #[tokio::test]
    async fn drains_pending_mutations() {
        let (scheduler, _) = scheduler(true);

        let mut queue = SyncQueue::new();
        queue.enqueue(
            MutationRecord::new(
                "m-1",
                "owner-1",
                "checkin-1",
                EntityKind::MoodCheckin,
                MutationOp::Create,
                json!({"mood": 4, "energy": 3}),
                1_000_000,
            ),
            1_000_000,
        );
        scheduler.store.save_queue(&queue).await.unwrap();

        let RunOutcome::Completed(status) = scheduler.run(SyncTrigger::Manual).await.unwrap()
        else {
            panic!("expected a completed run");
        };
        assert_eq!(status.queue.attempted, 1);
        assert_eq!(status.queue.succeeded, 1);
        assert!(scheduler.store.load_queue().await.unwrap().is_empty());
    }
}
