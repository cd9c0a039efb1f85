use std::collections::BTreeSet;

use crate::task::{
  Task,
  TaskId
};

/// Multi-select state. Membership survives
/// filtering; hidden members are counted,
/// not dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
  ids: BTreeSet<TaskId>
}

impl Selection {
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns whether the id is selected
  /// afterwards.
  pub fn toggle(&mut self, id: &TaskId) -> bool {
    if self.ids.remove(id) {
      false
    } else {
      self.ids.insert(id.clone());
      true
    }
  }

  pub fn select(&mut self, id: TaskId) {
    self.ids.insert(id);
  }

  pub fn deselect(&mut self, id: &TaskId) {
    self.ids.remove(id);
  }

  pub fn clear(&mut self) {
    self.ids.clear();
  }

  pub fn contains(&self, id: &TaskId) -> bool {
    self.ids.contains(id)
  }

  pub fn len(&self) -> usize {
    self.ids.len()
  }

  pub fn is_empty(&self) -> bool {
    self.ids.is_empty()
  }

  pub fn ids(
    &self
  ) -> impl Iterator<Item = &TaskId> {
    self.ids.iter()
  }

  /// Selected ids not present in `visible`.
  pub fn hidden_count(
    &self,
    visible: &[&Task]
  ) -> usize {
    self
      .ids
      .iter()
      .filter(|id| {
        !visible.iter().any(|t| &t.id == *id)
      })
      .count()
  }

  /// Drops ids that no longer exist; returns
  /// how many were dropped.
  pub fn retain_existing(
    &mut self,
    tasks: &[Task]
  ) -> usize {
    let before = self.ids.len();
    self.ids.retain(|id| {
      tasks.iter().any(|t| &t.id == id)
    });
    before - self.ids.len()
  }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;

  use super::*;
  use crate::task::TaskDraft;

  fn task(title: &str) -> Task {
    Task::from_draft(
      TaskDraft::titled(title),
      Utc::now()
    )
    .unwrap()
  }

  #[test]
  fn toggle_flips_membership() {
    let mut selection = Selection::new();
    let id = TaskId::from("t1");
    assert!(selection.toggle(&id));
    assert!(selection.contains(&id));
    assert!(!selection.toggle(&id));
    assert!(selection.is_empty());
  }

  #[test]
  fn hidden_selected_are_counted_not_dropped()
  {
    let a = task("a");
    let b = task("b");
    let mut selection = Selection::new();
    selection.select(a.id.clone());
    selection.select(b.id.clone());

    assert_eq!(selection.hidden_count(&[&a]), 1);
    assert_eq!(selection.len(), 2);
  }

  #[test]
  fn retain_existing_prunes_deleted_ids() {
    let a = task("a");
    let mut selection = Selection::new();
    selection.select(a.id.clone());
    selection.select(TaskId::from("gone"));

    assert_eq!(
      selection.retain_existing(&[a]),
      1
    );
    assert_eq!(selection.len(), 1);
  }
}
