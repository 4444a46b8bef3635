//! Dead-letter retry behavior across scheduler runs: exponential backoff,
//! bounded retries, and terminal archival.

mod common;

use common::{harness, ScriptedGateway};
use serde_json::json;
use std::sync::Arc;
use tally_engine::{backoff_ms, EntityKind, MutationOp, UpsertOutcome, MAX_RETRY_COUNT};
use tally_runtime::RunOutcome;

fn transient() -> UpsertOutcome {
    UpsertOutcome::TransientError {
        message: "gateway timeout".into(),
    }
}

async fn submit_checkin(h: &common::Harness) {
    h.service
        .submit(
            EntityKind::MoodCheckin,
            MutationOp::Create,
            "checkin-1",
            json!({"mood": 2, "energy": 1}),
        )
        .await
        .unwrap();
}

async fn completed(h: &common::Harness) -> tally_runtime::RunStatus {
    match h.service.sync_now().await.unwrap() {
        RunOutcome::Completed(status) => status,
        other => panic!("expected a completed run, got {other:?}"),
    }
}

#[tokio::test]
async fn transient_failure_parks_then_retries_to_success() {
    let gateway = Arc::new(ScriptedGateway::new());
    let h = harness(gateway.clone());
    gateway.push_outcome(transient()).await;

    submit_checkin(&h).await;
    let status = completed(&h).await;
    assert_eq!(status.queue.dead_lettered, 1);
    assert_eq!(h.service.dead_letters().await.unwrap().len(), 1);
    assert_eq!(h.service.pending_count().await.unwrap(), 0);

    // After the first backoff window the retry succeeds and the item
    // leaves the queue.
    h.clock.advance(backoff_ms(0));
    let status = completed(&h).await;
    assert_eq!(status.dead_letters.retried, 1);
    assert_eq!(status.dead_letters.succeeded, 1);
    assert!(h.service.dead_letters().await.unwrap().is_empty());
    assert_eq!(gateway.call_count().await, 2);
}

#[tokio::test]
async fn backoff_window_gates_retries() {
    let gateway = Arc::new(ScriptedGateway::new());
    let h = harness(gateway.clone());
    gateway.push_outcome(transient()).await;

    submit_checkin(&h).await;
    completed(&h).await;

    // One millisecond short of the window: skipped, no gateway call.
    h.clock.advance(backoff_ms(0) - 1);
    let status = completed(&h).await;
    assert_eq!(status.dead_letters.retried, 0);
    assert_eq!(status.dead_letters.skipped, 1);
    assert_eq!(gateway.call_count().await, 1);

    // At the boundary: retried.
    h.clock.advance(1);
    let status = completed(&h).await;
    assert_eq!(status.dead_letters.retried, 1);
    assert_eq!(gateway.call_count().await, 2);
}

#[tokio::test]
async fn retries_are_bounded_then_archived() {
    let gateway = Arc::new(ScriptedGateway::new());
    let h = harness(gateway.clone());

    // Every attempt fails: the initial drain plus each retry.
    for _ in 0..=MAX_RETRY_COUNT {
        gateway.push_outcome(transient()).await;
    }

    submit_checkin(&h).await;
    completed(&h).await;

    for n in 0..MAX_RETRY_COUNT {
        h.clock.advance(backoff_ms(n));
        let status = completed(&h).await;
        assert_eq!(status.dead_letters.retried, 1, "retry {n}");
        assert_eq!(status.dead_letters.failed, 1, "retry {n}");
    }

    // The fifth failure opens one more backoff window; until it elapses
    // the item is skipped, not archived.
    let status = completed(&h).await;
    assert_eq!(status.dead_letters.archived, 0);
    assert_eq!(status.dead_letters.skipped, 1);

    // The sixth eligible attempt archives instead of retrying.
    h.clock.advance(backoff_ms(MAX_RETRY_COUNT));
    let status = completed(&h).await;
    assert_eq!(status.dead_letters.retried, 0);
    assert_eq!(status.dead_letters.archived, 1);

    assert!(h.service.dead_letters().await.unwrap().is_empty());
    assert_eq!(gateway.call_count().await, 1 + MAX_RETRY_COUNT as usize);

    // Archived is terminal: further runs never touch the gateway again.
    h.clock.advance(backoff_ms(MAX_RETRY_COUNT));
    completed(&h).await;
    assert_eq!(gateway.call_count().await, 1 + MAX_RETRY_COUNT as usize);
}

#[tokio::test]
async fn rejected_retry_counts_once_as_archived() {
    let gateway = Arc::new(ScriptedGateway::new());
    let h = harness(gateway.clone());
    gateway.push_outcome(transient()).await;
    gateway
        .push_outcome(UpsertOutcome::ValidationError {
            message: "mood out of range".into(),
        })
        .await;

    submit_checkin(&h).await;
    completed(&h).await;

    // The retry is rejected outright: one dispatched item, one archival,
    // and no failure tally for the same item.
    h.clock.advance(backoff_ms(0));
    let status = completed(&h).await;
    assert_eq!(status.dead_letters.retried, 1);
    assert_eq!(status.dead_letters.archived, 1);
    assert_eq!(status.dead_letters.failed, 0);
    assert!(h.service.dead_letters().await.unwrap().is_empty());
    assert_eq!(gateway.call_count().await, 2);
}

#[tokio::test]
async fn validation_failure_is_never_retried() {
    let gateway = Arc::new(ScriptedGateway::new());
    let h = harness(gateway.clone());
    gateway
        .push_outcome(UpsertOutcome::ValidationError {
            message: "mood out of range".into(),
        })
        .await;

    submit_checkin(&h).await;
    let status = completed(&h).await;
    assert_eq!(status.queue.dead_lettered, 1);

    // Archived on entry: not live, and no retry no matter how long we wait.
    assert!(h.service.dead_letters().await.unwrap().is_empty());
    h.clock.advance(86_400_000);
    let status = completed(&h).await;
    assert_eq!(status.dead_letters.retried, 0);
    assert_eq!(gateway.call_count().await, 1);
}

#[tokio::test]
async fn old_dead_letters_are_swept_by_retention() {
    let gateway = Arc::new(ScriptedGateway::new());
    let h = harness(gateway.clone());
    gateway.push_outcome(transient()).await;
    gateway.push_outcome(transient()).await;

    submit_checkin(&h).await;
    completed(&h).await;
    assert_eq!(h.service.dead_letters().await.unwrap().len(), 1);

    // Thirty days later the item is past retention. The run still gives
    // it one eligible retry, then the sweep archives it by age.
    h.clock.advance(30 * 86_400_000);
    let status = completed(&h).await;
    assert_eq!(status.dead_letters.retried, 1);
    assert_eq!(status.dead_letters.archived, 1);
    assert!(h.service.dead_letters().await.unwrap().is_empty());
}
