use chrono::{
  Days,
  NaiveDate
};
use tracing::trace;

use crate::label::names_equal;
use crate::task::{
  Priority,
  Task
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelSelector {
  Named(String),
  /// Matches tasks carrying no labels.
  Unlabeled
}

#[derive(
  Debug, Clone, PartialEq, Eq, Default,
)]
pub enum AssigneeFilter {
  #[default]
  All,
  Unassigned,
  Id(String)
}

#[derive(
  Debug, Clone, PartialEq, Eq, Default,
)]
pub enum DuePreset {
  #[default]
  All,
  Overdue,
  Today,
  Next7,
  None,
  Range {
    from: Option<NaiveDate>,
    to:   Option<NaiveDate>
  }
}

#[derive(
  Debug, Clone, PartialEq, Eq, Default,
)]
pub struct FilterState {
  pub query:      String,
  pub labels:     Vec<LabelSelector>,
  pub assignee:   AssigneeFilter,
  pub due:        DuePreset,
  pub priorities: Vec<Priority>
}

impl FilterState {
  pub fn is_empty(&self) -> bool {
    self.active_count() == 0
  }

  pub fn active_count(&self) -> usize {
    let mut count = 0;
    if !self.query.trim().is_empty() {
      count += 1;
    }
    count += self.labels.len();
    if self.assignee
      != AssigneeFilter::All
    {
      count += 1;
    }
    if self.due != DuePreset::All {
      count += 1;
    }
    count + self.priorities.len()
  }

  pub fn matches(
    &self,
    task: &Task,
    today: NaiveDate
  ) -> bool {
    self.matches_query(task)
      && self.matches_labels(task)
      && self.matches_assignee(task)
      && self.matches_due(task, today)
      && self.matches_priority(task)
  }

  fn matches_query(
    &self,
    task: &Task
  ) -> bool {
    if self.query.trim().is_empty() {
      return true;
    }
    let q = self.query.to_lowercase();
    task.title.to_lowercase().contains(&q)
      || task
        .description
        .to_lowercase()
        .contains(&q)
  }

  fn matches_labels(
    &self,
    task: &Task
  ) -> bool {
    if self.labels.is_empty() {
      return true;
    }
    self.labels.iter().any(|selector| {
      match selector {
        | LabelSelector::Unlabeled => {
          task.labels.is_empty()
        }
        | LabelSelector::Named(name) => {
          task.labels.iter().any(|label| {
            names_equal(&label.name, name)
          })
        }
      }
    })
  }

  fn matches_assignee(
    &self,
    task: &Task
  ) -> bool {
    match &self.assignee {
      | AssigneeFilter::All => true,
      | AssigneeFilter::Unassigned => {
        task.assignee.is_none()
      }
      | AssigneeFilter::Id(id) => task
        .assignee
        .as_ref()
        .is_some_and(|a| &a.id == id)
    }
  }

  fn matches_due(
    &self,
    task: &Task,
    today: NaiveDate
  ) -> bool {
    match &self.due {
      | DuePreset::All => true,
      | DuePreset::Overdue => {
        task.due.is_some_and(|due| {
          due < today
        }) && !task.status.is_terminal()
      }
      | DuePreset::Today => {
        task.due == Some(today)
      }
      | DuePreset::Next7 => {
        let horizon = today
          .checked_add_days(Days::new(7))
          .unwrap_or(NaiveDate::MAX);
        task.due.is_some_and(|due| {
          due >= today && due <= horizon
        })
      }
      | DuePreset::None => {
        task.due.is_none()
      }
      | DuePreset::Range { from, to } => {
        let Some(due) = task.due else {
          return false;
        };
        from.is_none_or(|from| due >= from)
          && to.is_none_or(|to| due <= to)
      }
    }
  }

  fn matches_priority(
    &self,
    task: &Task
  ) -> bool {
    self.priorities.is_empty()
      || self
        .priorities
        .contains(&task.priority)
  }
}

/// Tasks matching every active facet, in
/// input order.
#[tracing::instrument(skip_all, fields(active = filters.active_count()))]
pub fn filter_tasks<'a, I>(
  tasks: I,
  filters: &FilterState,
  today: NaiveDate
) -> Vec<&'a Task>
where
  I: IntoIterator<Item = &'a Task>
{
  let out: Vec<&'a Task> = tasks
    .into_iter()
    .filter(|task| {
      filters.matches(task, today)
    })
    .collect();
  trace!(
    visible = out.len(),
    "filtered tasks"
  );
  out
}
