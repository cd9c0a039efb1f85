use std::collections::VecDeque;
use std::sync::Arc;

use tracing::trace;

use crate::task::TaskId;

pub const DEFAULT_HISTORY_LIMIT: usize =
  50;

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum ActionKind {
  Create,
  Delete,
  Move,
  Edit,
  BulkMove,
  BulkDelete,
  Other
}

impl ActionKind {
  /// Kinds that get an undo toast.
  pub fn is_undo_notified(self) -> bool {
    matches!(
      self,
      ActionKind::Delete
        | ActionKind::BulkDelete
        | ActionKind::Move
        | ActionKind::BulkMove
    )
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionMeta {
  pub kind:        ActionKind,
  pub task_ids:    Vec<TaskId>,
  pub description: Option<String>
}

impl ActionMeta {
  pub fn new(kind: ActionKind) -> Self {
    Self {
      kind,
      task_ids: Vec::new(),
      description: None
    }
  }

  pub fn with_tasks<I>(
    mut self,
    ids: I
  ) -> Self
  where
    I: IntoIterator<Item = TaskId>
  {
    self.task_ids = ids.into_iter().collect();
    self
  }

  pub fn with_description(
    mut self,
    description: impl Into<String>
  ) -> Self {
    self.description =
      Some(description.into());
    self
  }
}

/// Undo/redo over whole-value snapshots.
///
/// Snapshots are shared `Arc`s, so a commit
/// of the current present (same pointer) is
/// recognised as a no-op.
#[derive(Debug, Clone)]
pub struct History<T> {
  present:     Arc<T>,
  past:        VecDeque<Arc<T>>,
  future:      VecDeque<Arc<T>>,
  last_action: Option<ActionMeta>,
  limit:       usize,
  tracked:     bool
}

impl<T> History<T> {
  pub fn new(initial: T) -> Self {
    Self::with_limit(
      initial,
      DEFAULT_HISTORY_LIMIT
    )
  }

  pub fn with_limit(
    initial: T,
    limit: usize
  ) -> Self {
    Self {
      present: Arc::new(initial),
      past: VecDeque::new(),
      future: VecDeque::new(),
      last_action: None,
      limit,
      tracked: false
    }
  }

  pub fn present(&self) -> &Arc<T> {
    &self.present
  }

  pub fn last_action(
    &self
  ) -> Option<&ActionMeta> {
    self.last_action.as_ref()
  }

  pub fn can_undo(&self) -> bool {
    !self.past.is_empty()
  }

  pub fn can_redo(&self) -> bool {
    !self.future.is_empty()
  }

  pub fn past_len(&self) -> usize {
    self.past.len()
  }

  pub fn future_len(&self) -> usize {
    self.future.len()
  }

  pub fn limit(&self) -> usize {
    self.limit
  }

  /// False until the first commit or reset.
  pub fn is_tracked(&self) -> bool {
    self.tracked
  }

  /// Returns false when `next` is the
  /// current present.
  pub fn commit(
    &mut self,
    next: Arc<T>,
    meta: Option<ActionMeta>
  ) -> bool {
    if Arc::ptr_eq(&next, &self.present) {
      trace!("commit skipped: unchanged snapshot");
      return false;
    }

    if !self.tracked {
      // First commit seeds the present without an undo step.
      self.tracked = true;
      self.present = next;
      self.past.clear();
      self.future.clear();
      self.last_action = meta;
      return true;
    }

    let previous = std::mem::replace(
      &mut self.present,
      next
    );
    self.past.push_back(previous);
    while self.past.len() > self.limit {
      self.past.pop_front();
    }
    self.future.clear();
    self.last_action = meta;
    trace!(
      past = self.past.len(),
      "committed snapshot"
    );
    true
  }

  pub fn undo(&mut self) -> bool {
    let Some(previous) =
      self.past.pop_back()
    else {
      return false;
    };
    let current = std::mem::replace(
      &mut self.present,
      previous
    );
    self.future.push_front(current);
    self.last_action = None;
    true
  }

  pub fn redo(&mut self) -> bool {
    let Some(next) =
      self.future.pop_front()
    else {
      return false;
    };
    let current = std::mem::replace(
      &mut self.present,
      next
    );
    self.past.push_back(current);
    while self.past.len() > self.limit {
      self.past.pop_front();
    }
    self.last_action = None;
    true
  }

  /// Hard replace after an authoritative
  /// reload.
  pub fn reset(&mut self, next: Arc<T>) {
    self.present = next;
    self.past.clear();
    self.future.clear();
    self.last_action = None;
    self.tracked = true;
  }
}
