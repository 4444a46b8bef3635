//! Conflict detection and resolution through a full sync run.

mod common;

use common::{harness, ScriptedGateway};
use serde_json::json;
use std::sync::Arc;
use tally_engine::{ConflictKind, EntityKind, MutationOp, RemoteState, UpsertOutcome};
use tally_runtime::RunOutcome;

#[tokio::test]
async fn update_conflict_merges_and_notifies() {
    let gateway = Arc::new(ScriptedGateway::new());
    let h = harness(gateway.clone());

    // Device A edited the title at T=10; device B edited the mood at T=12
    // and also holds a different title.
    gateway
        .push_outcome(UpsertOutcome::Conflict {
            remote: RemoteState {
                payload: Some(json!({"title": "remote title", "mood": 4})),
                updated_at: 12,
                deleted: false,
            },
        })
        .await;

    h.service
        .submit(
            EntityKind::JournalEntry,
            MutationOp::Update,
            "entry-1",
            json!({"title": "local title", "tags": ["travel"]}),
        )
        .await
        .unwrap();

    let RunOutcome::Completed(status) = h.service.sync_now().await.unwrap() else {
        panic!("expected a completed run");
    };
    assert_eq!(status.queue.conflicts, 1);

    // The reconciled write keeps disjoint fields from both sides and takes
    // the remote value for the shared one.
    let calls = gateway.calls().await;
    assert_eq!(calls.len(), 2);
    assert_eq!(
        calls[1].payload,
        json!({"title": "remote title", "tags": ["travel"], "mood": 4})
    );
    assert_eq!(calls[1].op, MutationOp::Update);

    let conflicts = h.service.conflicts().await.unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].kind, ConflictKind::UpdateConflict);
    assert_eq!(conflicts[0].entity_id, "entry-1");

    let notifications = h.service.notifications().await.unwrap();
    assert_eq!(notifications.len(), 1);
    assert!(notifications[0].message.contains("journal_entry"));
}

#[tokio::test]
async fn create_duplicate_defers_to_remote() {
    let gateway = Arc::new(ScriptedGateway::new());
    let h = harness(gateway.clone());

    gateway
        .push_outcome(UpsertOutcome::Conflict {
            remote: RemoteState {
                payload: Some(json!({"mood": 3})),
                updated_at: 500,
                deleted: false,
            },
        })
        .await;

    h.service
        .submit(
            EntityKind::MoodCheckin,
            MutationOp::Create,
            "checkin-1",
            json!({"mood": 5}),
        )
        .await
        .unwrap();
    h.service.sync_now().await.unwrap();

    // Discarded: no reconciled write follows the conflicting attempt.
    assert_eq!(gateway.call_count().await, 1);
    assert_eq!(h.service.pending_count().await.unwrap(), 0);

    let conflicts = h.service.conflicts().await.unwrap();
    assert_eq!(conflicts[0].kind, ConflictKind::CreateDuplicate);
}

#[tokio::test]
async fn delete_conflict_never_destroys_newer_edits() {
    let gateway = Arc::new(ScriptedGateway::new());
    let h = harness(gateway.clone());

    // Local delete vs. a remote edit: the edit survives, the delete is
    // discarded.
    gateway
        .push_outcome(UpsertOutcome::Conflict {
            remote: RemoteState {
                payload: Some(json!({"title": "edited elsewhere", "body": "kept"})),
                updated_at: 1_500,
                deleted: false,
            },
        })
        .await;

    h.service
        .submit(
            EntityKind::JournalEntry,
            MutationOp::Delete,
            "entry-1",
            json!({}),
        )
        .await
        .unwrap();
    h.service.sync_now().await.unwrap();

    assert_eq!(gateway.call_count().await, 1);
    let conflicts = h.service.conflicts().await.unwrap();
    assert_eq!(conflicts[0].kind, ConflictKind::DeleteConflict);

    let notifications = h.service.notifications().await.unwrap();
    assert!(notifications[0].message.contains("deleted"));
}

#[tokio::test]
async fn identical_conflict_scenarios_resolve_identically() {
    let mut outcomes = Vec::new();

    for _ in 0..2 {
        let gateway = Arc::new(ScriptedGateway::new());
        let h = harness(gateway.clone());
        gateway
            .push_outcome(UpsertOutcome::Conflict {
                remote: RemoteState {
                    payload: Some(json!({"goal": "run", "progress": 80})),
                    updated_at: 12,
                    deleted: false,
                },
            })
            .await;

        h.service
            .submit(
                EntityKind::GoalProgress,
                MutationOp::Update,
                "goal-1",
                json!({"goal": "run", "progress": 60, "note": "tired"}),
            )
            .await
            .unwrap();
        h.service.sync_now().await.unwrap();

        let reconciled = gateway.calls().await[1].payload.clone();
        let record = h.service.conflicts().await.unwrap().remove(0);
        outcomes.push((reconciled, record.kind, record.local_data, record.remote_data));
    }

    assert_eq!(outcomes[0], outcomes[1]);
}

#[tokio::test]
async fn read_notifications_are_pruned_on_the_next_run() {
    let gateway = Arc::new(ScriptedGateway::new());
    let h = harness(gateway.clone());

    gateway
        .push_outcome(UpsertOutcome::Conflict {
            remote: RemoteState {
                payload: Some(json!({"habit": "walk", "completed": false})),
                updated_at: 12,
                deleted: false,
            },
        })
        .await;

    h.service
        .submit(
            EntityKind::HabitLog,
            MutationOp::Update,
            "habit-1",
            json!({"habit": "walk", "completed": true}),
        )
        .await
        .unwrap();
    h.service.sync_now().await.unwrap();

    let notifications = h.service.notifications().await.unwrap();
    assert_eq!(notifications.len(), 1);
    h.service
        .mark_notification_read(&notifications[0].id)
        .await
        .unwrap();

    // Read notifications stay stored until the next housekeeping pass.
    let store = tally_runtime::OwnerStore::new(h.store.clone(), "owner-1");
    assert_eq!(store.load_notifications().await.unwrap().items().len(), 1);

    h.service.sync_now().await.unwrap();
    assert!(store.load_notifications().await.unwrap().items().is_empty());
}
