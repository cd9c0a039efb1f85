use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use taskboard_core::autosave::{AutosaveController, AutosaveOptions, SaveStatus, StoreTarget};
use taskboard_core::board::Board;
use taskboard_core::calendar::MemoryCalendar;
use taskboard_core::calendar_sync::{CalendarSyncOptions, CalendarSyncScheduler, SyncOutcome};
use taskboard_core::datastore::JsonlTaskStore;
use taskboard_core::diff::FieldDiff;
use taskboard_core::error::BoardError;
use taskboard_core::filter::{FilterState, LabelSelector};
use taskboard_core::inbound::{InboundDelivery, InboundTask, create_from_inbound};
use taskboard_core::lanes::GroupBy;
use taskboard_core::sort::SortState;
use taskboard_core::store::{MemoryTaskStore, TaskStore};
use taskboard_core::task::{CalendarLink, Channel, Status, TaskDraft, TaskId};
use tempfile::tempdir;
use tokio::time::sleep;

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

#[tokio::test]
async fn buy_milk_survives_a_reopen_and_undo_stays_local() {
    let temp = tempdir().expect("tempdir");
    let store = Arc::new(JsonlTaskStore::open(temp.path(), "alice").expect("open store"));
    let mut board = Board::new(store.clone());

    let id = board
        .create_task(TaskDraft::titled("Buy milk"))
        .await
        .expect("create");
    board
        .move_task(&id, Status::InProgress)
        .await
        .expect("move");
    assert_eq!(
        board.undo_notice().and_then(|a| a.description.clone()),
        Some("Moved \"Buy milk\" to In Progress".to_string())
    );

    assert!(board.undo());
    assert_eq!(board.task(&id).map(|t| t.status), Some(Status::Pending));

    let reopened = JsonlTaskStore::open(temp.path(), "alice").expect("reopen");
    let persisted = reopened.list().await.expect("list");
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].title, "Buy milk");
    assert_eq!(persisted[0].status, Status::InProgress);

    let stranger = JsonlTaskStore::open(temp.path(), "bob").expect("open as bob");
    assert!(stranger.list().await.expect("list").is_empty());

    let mut fresh = Board::new(Arc::new(reopened));
    assert_eq!(fresh.load().await.expect("load"), 1);
    assert!(!fresh.history().can_undo());
}

#[tokio::test]
async fn bulk_move_is_all_or_nothing_locally() {
    let memory = MemoryTaskStore::new("alice");
    let mut board = Board::new(Arc::new(memory.clone()));
    let mut ids = Vec::new();
    for title in ["A", "B", "C"] {
        ids.push(board.create_task(TaskDraft::titled(title)).await.expect("create"));
    }
    for id in &ids {
        board.select(id.clone());
    }
    memory.fail_on(&ids[1]);

    let err = board.bulk_move(Status::Done).await.expect_err("one call fails");
    match err {
        BoardError::Persistence { ids: failed, .. } => assert_eq!(failed, vec![ids[1].clone()]),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(board.tasks().iter().all(|t| t.status == Status::Pending));
    assert!(board.selection().is_empty());
    assert_eq!(board.history().past_len(), 3);
    assert!(board.history().can_redo());
    assert!(board.undo_notice().is_none());
}

#[tokio::test]
async fn label_bulk_keeps_successes_and_views_reflect_them() {
    let memory = MemoryTaskStore::new("alice");
    let mut board = Board::new(Arc::new(memory.clone()));
    let a = board.create_task(TaskDraft::titled("A")).await.expect("create");
    let b = board.create_task(TaskDraft::titled("B")).await.expect("create");
    board.select(a.clone());
    board.select(b.clone());
    memory.fail_on(&b);

    let err = board.bulk_add_label("Errand").await.expect_err("partial");
    assert_eq!(err.to_string(), "1 of 2 task(s) could not be updated");

    let filters = FilterState {
        labels: vec![LabelSelector::Named("errand".to_string())],
        ..FilterState::default()
    };
    let view = board.view(&filters, SortState::default(), GroupBy::Label, today());
    assert_eq!(view.visible, 1);
    assert_eq!(view.total, 2);
    assert_eq!(view.lanes.len(), 1);
    assert_eq!(view.lanes[0].title, "Errand");
    assert_eq!(view.lanes[0].tasks[0].id, a);

    assert!(board.undo());
    assert!(board.tasks().iter().all(|t| t.labels.is_empty()));
}

#[tokio::test(start_paused = true)]
async fn autosave_collapses_edits_into_one_store_update() {
    let memory = MemoryTaskStore::new("alice");
    let mut board = Board::new(Arc::new(memory.clone()));
    let id = board
        .create_task(TaskDraft::titled("Write report"))
        .await
        .expect("create");
    memory.clear_calls();

    let original = board.task(&id).cloned().expect("task");
    let autosave = AutosaveController::new(
        original.clone(),
        Arc::new(StoreTarget::new(Arc::clone(board.store()), id.clone())),
        AutosaveOptions::default(),
    );

    let mut draft = original;
    for title in ["Write r", "Write rep", "Write the report"] {
        draft.title = title.to_string();
        board.stage_edit(draft.clone()).expect("stage");
        autosave.update(draft.clone());
        sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(autosave.status(), SaveStatus::Dirty);
    assert!(memory.update_calls().is_empty());

    sleep(Duration::from_millis(400)).await;
    let updates = memory.update_calls();
    assert_eq!(updates.len(), 1);
    assert_eq!(
        updates[0].1.get("title"),
        Some(&serde_json::json!("Write the report"))
    );
    assert_eq!(autosave.status(), SaveStatus::Saved);

    sleep(Duration::from_millis(2100)).await;
    assert_eq!(autosave.status(), SaveStatus::Idle);
    assert_eq!(board.history().past_len(), 4);
}

#[tokio::test(start_paused = true)]
async fn calendar_link_is_written_back_after_first_sync() {
    let memory = MemoryTaskStore::new("alice");
    let mut board = Board::new(Arc::new(memory.clone()));
    let mut draft = TaskDraft::titled("Dentist");
    draft.due = NaiveDate::from_ymd_opt(2026, 6, 3);
    let id = board.create_task(draft).await.expect("create");

    let calendar = MemoryCalendar::new();
    let sync = CalendarSyncScheduler::new(
        Arc::new(calendar.clone()),
        CalendarSyncOptions::default(),
    );
    let linked: Arc<Mutex<Option<(TaskId, CalendarLink)>>> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&linked);
    sync.on_linked(move |task_id, link| {
        if let Some(link) = link {
            *sink.lock() = Some((task_id.clone(), link.clone()));
        }
    });

    let mut task = board.task(&id).cloned().expect("task");
    task.calendar = Some(CalendarLink {
        enabled: true,
        ..CalendarLink::default()
    });
    sync.observe(&task);
    sleep(Duration::from_millis(600)).await;

    let event_id = sync.event_id().expect("event created");
    assert!(matches!(sync.last_outcome(), Some(SyncOutcome::Created { .. })));

    let (task_id, link) = linked.lock().clone().expect("hook fired");
    assert_eq!(task_id, id);
    memory
        .update(
            &task_id,
            FieldDiff::single("calendar", &link).expect("encode link"),
        )
        .await
        .expect("store link");
    let stored = memory.snapshot();
    assert_eq!(
        stored[0].calendar.as_ref().and_then(|l| l.event_id.clone()),
        Some(event_id.clone())
    );
    assert_eq!(
        calendar.event("primary", &event_id).map(|e| e.title),
        Some("Dentist".to_string())
    );

    assert_eq!(sync.disable().await, SyncOutcome::Removed);
    assert_eq!(calendar.event_count(), 0);
}

#[tokio::test]
async fn inbound_redelivery_is_deduplicated_on_disk() {
    let temp = tempdir().expect("tempdir");
    let store = JsonlTaskStore::open(temp.path(), "alice").expect("open store");
    let delivery = InboundDelivery {
        channel: Channel::Whatsapp,
        sender: "whatsapp:+15550001111".to_string(),
        dedup_key: "SM42".to_string(),
        received_at: Utc::now(),
    };
    let payload = InboundTask {
        title: "Call plumber".to_string(),
        ..InboundTask::default()
    };

    let first = create_from_inbound(&store, payload.clone(), delivery.clone())
        .await
        .expect("create");
    let reopened = JsonlTaskStore::open(temp.path(), "alice").expect("reopen");
    let again = create_from_inbound(&reopened, payload, delivery)
        .await
        .expect("dedup");

    assert!(again.duplicate);
    assert_eq!(again.task_id, first.task_id);
    let tasks = reopened.list().await.expect("list");
    assert_eq!(tasks.len(), 1);
    assert_eq!(
        tasks[0].source.as_ref().and_then(|s| s.from.clone()),
        Some("****1111".to_string())
    );
}
