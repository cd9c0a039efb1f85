use std::collections::{
  HashMap,
  HashSet
};
use std::sync::Arc;

use chrono::{
  NaiveDate,
  Utc
};
use tokio::task::JoinSet;
use tracing::{
  debug,
  info,
  warn
};

use crate::diff::FieldDiff;
use crate::error::{
  BoardError,
  BulkFailure,
  StoreError
};
use crate::filter::{
  FilterState,
  filter_tasks
};
use crate::history::{
  ActionKind,
  ActionMeta,
  DEFAULT_HISTORY_LIMIT,
  History
};
use crate::label::{
  make_label,
  normalize_name
};
use crate::lanes::{
  GroupBy,
  Lane,
  build_lanes
};
use crate::selection::Selection;
use crate::sort::{
  SortState,
  sort_tasks
};
use crate::store::TaskStore;
use crate::task::{
  Status,
  Task,
  TaskDraft,
  TaskId,
  validate_title
};

/// One projection of the board.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardView<'a> {
  pub lanes:           Vec<Lane<'a>>,
  pub visible:         usize,
  pub total:           usize,
  pub hidden_selected: usize
}

enum Job {
  Update(FieldDiff),
  Delete
}

#[derive(Debug, Default)]
struct Dispatched {
  succeeded: Vec<TaskId>,
  failures:  Vec<BulkFailure>
}

/// The task collection, its history, the
/// selection and the store they persist to.
///
/// Every change is committed optimistically
/// first. A single-task command whose
/// persistence fails undoes its own commit.
pub struct Board {
  history:   History<Vec<Task>>,
  selection: Selection,
  store:     Arc<dyn TaskStore>
}

impl Board {
  pub fn new(store: Arc<dyn TaskStore>) -> Self {
    Self::with_history_limit(
      store,
      DEFAULT_HISTORY_LIMIT
    )
  }

  pub fn with_history_limit(
    store: Arc<dyn TaskStore>,
    limit: usize
  ) -> Self {
    let mut history =
      History::with_limit(Vec::new(), limit);
    history.reset(Arc::new(Vec::new()));
    Self {
      history,
      selection: Selection::new(),
      store
    }
  }

  pub fn store(&self) -> &Arc<dyn TaskStore> {
    &self.store
  }

  pub fn tasks(&self) -> &[Task] {
    self.history.present().as_slice()
  }

  pub fn task(&self, id: &TaskId) -> Option<&Task> {
    self.tasks().iter().find(|t| &t.id == id)
  }

  pub fn history(&self) -> &History<Vec<Task>> {
    &self.history
  }

  pub fn selection(&self) -> &Selection {
    &self.selection
  }

  /// Replaces everything with the store's
  /// current contents and forgets history.
  #[tracing::instrument(skip(self))]
  pub async fn load(
    &mut self
  ) -> Result<usize, BoardError> {
    let tasks = self
      .store
      .list()
      .await
      .map_err(|err| {
        BoardError::from_store(Vec::new(), err)
      })?;
    let count = tasks.len();
    self.history.reset(Arc::new(tasks));
    self.prune_selection();
    info!(count, "loaded board");
    Ok(count)
  }

  pub fn undo(&mut self) -> bool {
    let undone = self.history.undo();
    self.prune_selection();
    undone
  }

  pub fn redo(&mut self) -> bool {
    let redone = self.history.redo();
    self.prune_selection();
    redone
  }

  pub fn reset(&mut self, tasks: Vec<Task>) {
    self.history.reset(Arc::new(tasks));
    self.prune_selection();
  }

  /// The last action when it deserves an
  /// undo toast.
  pub fn undo_notice(&self) -> Option<&ActionMeta> {
    self.history.last_action().filter(|meta| {
      meta.kind.is_undo_notified()
        && meta.description.is_some()
    })
  }

  pub fn toggle_selection(
    &mut self,
    id: &TaskId
  ) -> bool {
    self.selection.toggle(id)
  }

  pub fn select(&mut self, id: TaskId) {
    self.selection.select(id);
  }

  pub fn clear_selection(&mut self) {
    self.selection.clear();
  }

  /// filter, then sort, then group.
  pub fn view(
    &self,
    filters: &FilterState,
    sort: SortState,
    group_by: GroupBy,
    today: NaiveDate
  ) -> BoardView<'_> {
    let visible =
      filter_tasks(self.tasks(), filters, today);
    let sorted = sort_tasks(&visible, sort);
    BoardView {
      hidden_selected: self
        .selection
        .hidden_count(&visible),
      visible:         visible.len(),
      total:           self.tasks().len(),
      lanes:           build_lanes(&sorted, group_by)
    }
  }

  #[tracing::instrument(
    skip(self, draft),
    fields(title = %draft.title)
  )]
  pub async fn create_task(
    &mut self,
    draft: TaskDraft
  ) -> Result<TaskId, BoardError> {
    let task = Task::from_draft(draft, Utc::now())?;
    let id = task.id.clone();

    let mut next = self.tasks().to_vec();
    next.push(task.clone());
    self.commit(
      next,
      ActionMeta::new(ActionKind::Create)
        .with_tasks([id.clone()])
    );

    if let Err(err) = self.store.create(task).await {
      return Err(self.rollback(vec![id], err));
    }
    Ok(id)
  }

  #[tracing::instrument(skip(self))]
  pub async fn move_task(
    &mut self,
    id: &TaskId,
    status: Status
  ) -> Result<(), BoardError> {
    let current = self.require(id)?;
    if current.status == status {
      return Ok(());
    }
    let mut moved = current.clone();
    moved.status = status;
    moved.modified = Utc::now();
    let description = format!(
      "Moved \"{}\" to {}",
      moved.title,
      status.label()
    );

    self.commit(
      self.replaced(moved),
      ActionMeta::new(ActionKind::Move)
        .with_tasks([id.clone()])
        .with_description(description)
    );

    let diff = encode(
      id,
      FieldDiff::single("status", status)
    )?;
    self.persist_update(id, diff).await
  }

  #[tracing::instrument(skip(self, title))]
  pub async fn rename_task(
    &mut self,
    id: &TaskId,
    title: &str
  ) -> Result<(), BoardError> {
    let title = validate_title(title)?;
    let current = self.require(id)?;
    if current.title == title {
      return Ok(());
    }
    let mut renamed = current.clone();
    renamed.title = title.clone();
    renamed.modified = Utc::now();

    self.commit(
      self.replaced(renamed),
      ActionMeta::new(ActionKind::Edit)
        .with_tasks([id.clone()])
    );

    let diff = encode(
      id,
      FieldDiff::single("title", title)
    )?;
    self.persist_update(id, diff).await
  }

  #[tracing::instrument(skip(self))]
  pub async fn delete_task(
    &mut self,
    id: &TaskId
  ) -> Result<(), BoardError> {
    let title = self.require(id)?.title.clone();
    let next: Vec<Task> = self
      .tasks()
      .iter()
      .filter(|t| &t.id != id)
      .cloned()
      .collect();

    self.commit(
      next,
      ActionMeta::new(ActionKind::Delete)
        .with_tasks([id.clone()])
        .with_description(format!(
          "Deleted \"{title}\""
        ))
    );
    self.selection.deselect(id);

    if let Err(err) = self.store.delete(id).await {
      return Err(self.rollback(vec![id.clone()], err));
    }
    Ok(())
  }

  /// Commits an edited copy of a task
  /// without persisting it; an autosave
  /// controller owns that. Returns false
  /// when nothing changed.
  pub fn stage_edit(
    &mut self,
    mut edited: Task
  ) -> Result<bool, BoardError> {
    edited.title = validate_title(&edited.title)?;
    let current = self.require(&edited.id)?;
    if *current == edited {
      return Ok(false);
    }
    let id = edited.id.clone();
    self.commit(
      self.replaced(edited),
      ActionMeta::new(ActionKind::Edit)
        .with_tasks([id])
    );
    Ok(true)
  }

  /// Moves every selected task. Any failed
  /// call undoes the whole move.
  #[tracing::instrument(skip(self))]
  pub async fn bulk_move(
    &mut self,
    status: Status
  ) -> Result<usize, BoardError> {
    let ids = self.selected_existing();
    if ids.is_empty() {
      return Ok(0);
    }
    let targets: HashSet<&TaskId> =
      ids.iter().collect();
    let now = Utc::now();
    let next: Vec<Task> = self
      .tasks()
      .iter()
      .map(|task| {
        let mut task = task.clone();
        if targets.contains(&task.id) {
          task.status = status;
          task.modified = now;
        }
        task
      })
      .collect();

    self.commit(
      next,
      ActionMeta::new(ActionKind::BulkMove)
        .with_tasks(ids.iter().cloned())
        .with_description(format!(
          "Moved {} task(s) to {}",
          ids.len(),
          status.label()
        ))
    );
    self.selection.clear();

    let diff = FieldDiff::single("status", status)
      .map_err(|err| BoardError::Persistence {
        ids:     ids.clone(),
        message: err.to_string()
      })?;
    let jobs = ids
      .iter()
      .map(|id| (id.clone(), Job::Update(diff.clone())))
      .collect();
    let outcome = dispatch(&self.store, jobs).await;
    self.all_or_nothing(outcome, ids.len())
  }

  /// Deletes every selected task. Any failed
  /// call undoes the whole delete.
  #[tracing::instrument(skip(self))]
  pub async fn bulk_delete(
    &mut self
  ) -> Result<usize, BoardError> {
    let ids = self.selected_existing();
    if ids.is_empty() {
      return Ok(0);
    }
    let targets: HashSet<&TaskId> =
      ids.iter().collect();
    let next: Vec<Task> = self
      .tasks()
      .iter()
      .filter(|task| !targets.contains(&task.id))
      .cloned()
      .collect();

    self.commit(
      next,
      ActionMeta::new(ActionKind::BulkDelete)
        .with_tasks(ids.iter().cloned())
        .with_description(format!(
          "Deleted {} task(s)",
          ids.len()
        ))
    );
    self.selection.clear();

    let jobs = ids
      .iter()
      .map(|id| (id.clone(), Job::Delete))
      .collect();
    let outcome = dispatch(&self.store, jobs).await;
    self.all_or_nothing(outcome, ids.len())
  }

  /// Adds a label to every selected task
  /// lacking it (names compared ignoring
  /// case). Successes are kept even when
  /// other tasks fail.
  #[tracing::instrument(skip(self))]
  pub async fn bulk_add_label(
    &mut self,
    name: &str
  ) -> Result<usize, BoardError> {
    let label = make_label(name, None)?;
    let candidates: Vec<Task> = self
      .selected_tasks()
      .into_iter()
      .filter_map(|task| {
        let mut task = task.clone();
        task.add_label(label.clone()).then_some(task)
      })
      .collect();

    let description = format!(
      "Added label \"{}\" to {} task(s)",
      label.name,
      candidates.len()
    );
    self.apply_label_change(candidates, description).await
  }

  /// Removes a label (matched ignoring case)
  /// from every selected task carrying it.
  #[tracing::instrument(skip(self))]
  pub async fn bulk_remove_label(
    &mut self,
    name: &str
  ) -> Result<usize, BoardError> {
    let name = normalize_name(name);
    if name.is_empty() {
      return Err(BoardError::validation(
        "label name"
      ));
    }
    let candidates: Vec<Task> = self
      .selected_tasks()
      .into_iter()
      .filter_map(|task| {
        let mut task = task.clone();
        task.remove_label(&name).then_some(task)
      })
      .collect();

    let description = format!(
      "Removed label \"{}\" from {} task(s)",
      name,
      candidates.len()
    );
    self.apply_label_change(candidates, description).await
  }

  async fn apply_label_change(
    &mut self,
    mut candidates: Vec<Task>,
    description: String
  ) -> Result<usize, BoardError> {
    if candidates.is_empty() {
      return Ok(0);
    }
    let attempted = candidates.len();
    let now = Utc::now();

    let mut jobs = Vec::with_capacity(attempted);
    for task in &mut candidates {
      task.modified = now;
      let diff = encode(
        &task.id,
        FieldDiff::single("labels", &task.labels)
      )?;
      jobs.push((task.id.clone(), Job::Update(diff)));
    }
    let outcome = dispatch(&self.store, jobs).await;

    let succeeded: HashSet<&TaskId> =
      outcome.succeeded.iter().collect();
    let mut updates: HashMap<TaskId, Task> = candidates
      .into_iter()
      .filter(|task| succeeded.contains(&task.id))
      .map(|task| (task.id.clone(), task))
      .collect();

    if !updates.is_empty() {
      let next: Vec<Task> = self
        .tasks()
        .iter()
        .map(|task| {
          updates
            .remove(&task.id)
            .unwrap_or_else(|| task.clone())
        })
        .collect();
      self.commit(
        next,
        ActionMeta::new(ActionKind::Other)
          .with_tasks(outcome.succeeded.iter().cloned())
          .with_description(description)
      );
    }

    if outcome.failures.is_empty() {
      return Ok(outcome.succeeded.len());
    }
    warn!(
      attempted,
      failed = outcome.failures.len(),
      "bulk label change partially failed"
    );
    Err(BoardError::PartialBulkFailure {
      attempted,
      succeeded: outcome.succeeded,
      failures: outcome.failures
    })
  }

  fn commit(
    &mut self,
    next: Vec<Task>,
    meta: ActionMeta
  ) {
    debug!(
      kind = ?meta.kind,
      ids = meta.task_ids.len(),
      "commit"
    );
    self.history.commit(Arc::new(next), Some(meta));
  }

  fn rollback(
    &mut self,
    ids: Vec<TaskId>,
    err: StoreError
  ) -> BoardError {
    warn!(error = %err, "persistence failed; reverting");
    self.undo();
    BoardError::from_store(ids, err)
  }

  async fn persist_update(
    &mut self,
    id: &TaskId,
    diff: FieldDiff
  ) -> Result<(), BoardError> {
    match self.store.update(id, diff).await {
      | Ok(_) => Ok(()),
      | Err(err) => {
        Err(self.rollback(vec![id.clone()], err))
      }
    }
  }

  fn all_or_nothing(
    &mut self,
    outcome: Dispatched,
    attempted: usize
  ) -> Result<usize, BoardError> {
    if outcome.failures.is_empty() {
      return Ok(attempted);
    }
    warn!(
      attempted,
      failed = outcome.failures.len(),
      "bulk persistence failed; reverting"
    );
    self.undo();
    let message = outcome
      .failures
      .iter()
      .map(|f| format!("{}: {}", f.id, f.message))
      .collect::<Vec<_>>()
      .join("; ");
    Err(BoardError::Persistence {
      ids: outcome
        .failures
        .into_iter()
        .map(|f| f.id)
        .collect(),
      message
    })
  }

  fn require(
    &self,
    id: &TaskId
  ) -> Result<&Task, BoardError> {
    self.task(id).ok_or_else(|| {
      BoardError::NotFoundOrUnauthorized(id.clone())
    })
  }

  fn replaced(&self, updated: Task) -> Vec<Task> {
    self
      .tasks()
      .iter()
      .map(|task| {
        if task.id == updated.id {
          updated.clone()
        } else {
          task.clone()
        }
      })
      .collect()
  }

  /// Selected ids still on the board, in
  /// board order.
  fn selected_existing(&self) -> Vec<TaskId> {
    self
      .selected_tasks()
      .into_iter()
      .map(|task| task.id.clone())
      .collect()
  }

  fn selected_tasks(&self) -> Vec<&Task> {
    self
      .tasks()
      .iter()
      .filter(|task| self.selection.contains(&task.id))
      .collect()
  }

  fn prune_selection(&mut self) {
    let present = Arc::clone(self.history.present());
    let dropped =
      self.selection.retain_existing(&present);
    if dropped > 0 {
      debug!(dropped, "pruned selection");
    }
  }
}

fn encode(
  id: &TaskId,
  diff: Result<FieldDiff, serde_json::Error>
) -> Result<FieldDiff, BoardError> {
  diff.map_err(|err| BoardError::Persistence {
    ids:     vec![id.clone()],
    message: err.to_string()
  })
}

/// Runs every job concurrently and waits
/// for all of them.
async fn dispatch(
  store: &Arc<dyn TaskStore>,
  jobs: Vec<(TaskId, Job)>
) -> Dispatched {
  let mut pending: HashSet<TaskId> = HashSet::new();
  let mut set = JoinSet::new();
  for (id, job) in jobs {
    pending.insert(id.clone());
    let store = Arc::clone(store);
    set.spawn(async move {
      let result = match job {
        | Job::Update(diff) => store
          .update(&id, diff)
          .await
          .map(|_| ()),
        | Job::Delete => store.delete(&id).await
      };
      (id, result)
    });
  }

  let mut out = Dispatched::default();
  while let Some(joined) = set.join_next().await {
    match joined {
      | Ok((id, Ok(()))) => {
        pending.remove(&id);
        out.succeeded.push(id);
      }
      | Ok((id, Err(err))) => {
        pending.remove(&id);
        out.failures.push(BulkFailure {
          id,
          message: err.to_string()
        });
      }
      | Err(err) => {
        warn!(
          error = %err,
          "bulk persistence task did not finish"
        );
      }
    }
  }
  // Whatever never reported back failed.
  out.failures.extend(pending.into_iter().map(
    |id| BulkFailure {
      id,
      message: "persistence task aborted".to_string()
    }
  ));
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::filter::LabelSelector;
  use crate::history::ActionKind;
  use crate::lanes::LaneKey;
  use crate::store::MemoryTaskStore;

  fn board() -> (MemoryTaskStore, Board) {
    let store = MemoryTaskStore::new("alice");
    let board = Board::new(Arc::new(store.clone()));
    (store, board)
  }

  async fn seeded(
    titles: &[&str]
  ) -> (MemoryTaskStore, Board, Vec<TaskId>) {
    let (store, mut board) = board();
    let mut ids = Vec::new();
    for title in titles {
      ids.push(
        board
          .create_task(TaskDraft::titled(*title))
          .await
          .unwrap()
      );
    }
    board.load().await.unwrap();
    (store, board, ids)
  }

  fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 10).unwrap()
  }

  #[tokio::test]
  async fn create_undo_redo_round_trip() {
    let (_store, mut board) = board();
    board
      .create_task(TaskDraft::titled("Walk dog"))
      .await
      .unwrap();
    board
      .create_task(TaskDraft::titled("Buy milk"))
      .await
      .unwrap();
    let created = board
      .tasks()
      .iter()
      .find(|t| t.title == "Buy milk")
      .cloned()
      .unwrap();

    assert!(board.undo());
    assert!(
      board.tasks().iter().all(|t| t.title != "Buy milk")
    );

    assert!(board.redo());
    let restored = board
      .tasks()
      .iter()
      .find(|t| t.title == "Buy milk")
      .unwrap();
    assert_eq!(*restored, created);
  }

  #[tokio::test]
  async fn blank_titles_never_reach_history() {
    let (store, mut board) = board();
    let err = board
      .create_task(TaskDraft::titled("   "))
      .await
      .unwrap_err();
    assert_eq!(err, BoardError::validation("title"));
    assert!(!board.history().can_undo());
    assert!(store.calls().is_empty());
  }

  #[tokio::test]
  async fn failed_create_is_undone() {
    let (store, mut board) = board();
    board
      .create_task(TaskDraft::titled("Kept"))
      .await
      .unwrap();
    store.fail_all("backend down");

    let err = board
      .create_task(TaskDraft::titled("Lost"))
      .await
      .unwrap_err();
    assert!(matches!(err, BoardError::Persistence { .. }));
    let titles: Vec<&str> = board
      .tasks()
      .iter()
      .map(|t| t.title.as_str())
      .collect();
    assert_eq!(titles, vec!["Kept"]);
  }

  #[tokio::test]
  async fn move_is_undo_notified_and_reverted_on_failure()
   {
    let (store, mut board, ids) = seeded(&["Report"]).await;
    board
      .move_task(&ids[0], Status::InProgress)
      .await
      .unwrap();
    let notice = board.undo_notice().unwrap();
    assert_eq!(notice.kind, ActionKind::Move);
    assert_eq!(
      notice.description.as_deref(),
      Some("Moved \"Report\" to In Progress")
    );

    store.fail_on(&ids[0]);
    let err = board
      .move_task(&ids[0], Status::Done)
      .await
      .unwrap_err();
    assert!(matches!(err, BoardError::Persistence { .. }));
    assert_eq!(
      board.task(&ids[0]).unwrap().status,
      Status::InProgress
    );
    assert!(board.undo_notice().is_none());
  }

  #[tokio::test]
  async fn foreign_ids_are_not_found() {
    let (_store, mut board) = board();
    let ghost = TaskId::from("ghost");
    assert_eq!(
      board.delete_task(&ghost).await.unwrap_err(),
      BoardError::NotFoundOrUnauthorized(ghost)
    );
  }

  #[tokio::test]
  async fn rename_validates_before_committing() {
    let (store, mut board, ids) = seeded(&["Old"]).await;
    let past = board.history().past_len();
    let blank = board.rename_task(&ids[0], "  ");
    assert!(blank.await.is_err());
    assert_eq!(board.history().past_len(), past);

    board.rename_task(&ids[0], " New ").await.unwrap();
    assert_eq!(board.task(&ids[0]).unwrap().title, "New");
    assert_eq!(store.snapshot()[0].title, "New");
  }

  #[tokio::test]
  async fn bulk_move_commits_once_and_clears_selection() {
    let (store, mut board, ids) =
      seeded(&["a", "b", "c"]).await;
    board.select(ids[0].clone());
    board.select(ids[2].clone());

    let moved =
      board.bulk_move(Status::Done).await.unwrap();
    assert_eq!(moved, 2);
    assert!(board.selection().is_empty());
    assert_eq!(board.history().past_len(), 1);
    assert_eq!(
      board
        .undo_notice()
        .and_then(|m| m.description.clone()),
      Some("Moved 2 task(s) to Done".to_string())
    );
    let done = store
      .snapshot()
      .iter()
      .filter(|t| t.status == Status::Done)
      .count();
    assert_eq!(done, 2);
  }

  #[tokio::test]
  async fn bulk_move_failure_rolls_back_everything() {
    let (store, mut board, ids) =
      seeded(&["a", "b", "c"]).await;
    let before = board.tasks().to_vec();
    for id in &ids {
      board.select(id.clone());
    }
    store.fail_on(&ids[1]);

    let err = board
      .bulk_move(Status::Done)
      .await
      .unwrap_err();
    match err {
      | BoardError::Persistence { ids: failed, .. } => {
        assert_eq!(failed, vec![ids[1].clone()]);
      }
      | other => panic!("unexpected error: {other:?}")
    }
    assert_eq!(board.tasks(), before.as_slice());
  }

  #[tokio::test]
  async fn bulk_delete_removes_selected_tasks() {
    let (store, mut board, ids) =
      seeded(&["a", "b", "c"]).await;
    board.select(ids[1].clone());
    assert_eq!(board.bulk_delete().await.unwrap(), 1);
    assert_eq!(board.tasks().len(), 2);
    assert_eq!(store.snapshot().len(), 2);
    assert_eq!(
      board.undo_notice().map(|m| m.kind),
      Some(ActionKind::BulkDelete)
    );

    assert!(board.undo());
    assert_eq!(board.tasks().len(), 3);
  }

  #[tokio::test]
  async fn bulk_label_partial_failure_keeps_successes() {
    let (store, mut board, ids) =
      seeded(&["a", "b", "c"]).await;
    for id in &ids {
      board.select(id.clone());
    }
    store.fail_on(&ids[0]);

    let err =
      board.bulk_add_label("Billing").await.unwrap_err();
    match &err {
      | BoardError::PartialBulkFailure {
        attempted,
        succeeded,
        failures
      } => {
        assert_eq!(*attempted, 3);
        assert_eq!(succeeded.len(), 2);
        assert_eq!(failures[0].id, ids[0]);
      }
      | other => panic!("unexpected error: {other:?}")
    }
    assert_eq!(
      err.to_string(),
      "1 of 3 task(s) could not be updated"
    );

    let billed = |id: &TaskId| {
      board.task(id).unwrap().has_label("billing")
    };
    assert!(!billed(&ids[0]));
    assert!(billed(&ids[1]));
    assert!(billed(&ids[2]));
    assert_eq!(board.history().past_len(), 1);
  }

  #[tokio::test]
  async fn bulk_label_add_skips_existing_names() {
    let (store, mut board, ids) = seeded(&["a", "b"]).await;
    board.select(ids[0].clone());
    board.bulk_add_label("Urgent").await.unwrap();
    store.clear_calls();

    board.select(ids[1].clone());
    let changed =
      board.bulk_add_label("urgent").await.unwrap();
    assert_eq!(changed, 1);
    assert_eq!(store.update_calls().len(), 1);
    assert_eq!(
      board.task(&ids[0]).unwrap().labels.len(),
      1
    );

    let removed =
      board.bulk_remove_label("URGENT").await.unwrap();
    assert_eq!(removed, 2);
    assert!(
      board.tasks().iter().all(|t| t.labels.is_empty())
    );

    assert!(matches!(
      board.bulk_add_label("  ").await,
      Err(BoardError::Validation { .. })
    ));
  }

  #[tokio::test]
  async fn view_reports_hidden_selection() {
    let (_store, mut board, ids) =
      seeded(&["a", "b"]).await;
    board.select(ids[0].clone());
    board.select(ids[1].clone());
    board.bulk_add_label("ops").await.unwrap();
    assert!(!board.toggle_selection(&ids[1]));
    assert!(board.toggle_selection(&ids[1]));

    let mut unlabeled =
      board.task(&ids[1]).unwrap().clone();
    unlabeled.labels.clear();
    board.stage_edit(unlabeled).unwrap();

    let filters = FilterState {
      labels: vec![LabelSelector::Named("ops".into())],
      ..FilterState::default()
    };
    let view = board.view(
      &filters,
      SortState::default(),
      GroupBy::Label,
      today()
    );
    assert_eq!(view.visible, 1);
    assert_eq!(view.total, 2);
    assert_eq!(view.hidden_selected, 1);
    assert_eq!(
      view.lanes[0].key,
      LaneKey::Label("ops".to_string())
    );
  }

  #[tokio::test]
  async fn deleted_ids_leave_the_selection() {
    let (_store, mut board, ids) = seeded(&["a"]).await;
    board.select(ids[0].clone());
    board.delete_task(&ids[0]).await.unwrap();
    assert!(board.selection().is_empty());
  }
}
