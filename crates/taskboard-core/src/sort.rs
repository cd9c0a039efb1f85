use std::cmp::Ordering;

use deunicode::deunicode;

use crate::task::Task;

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default,
)]
pub enum SortField {
  #[default]
  Created,
  Due,
  Priority
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default,
)]
pub enum SortOrder {
  Asc,
  #[default]
  Desc
}

/// Defaults to newest first.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default,
)]
pub struct SortState {
  pub field: SortField,
  pub order: SortOrder
}

impl SortState {
  pub fn new(
    field: SortField,
    order: SortOrder
  ) -> Self {
    Self { field, order }
  }
}

/// Collation used for titles and lane
/// names: transliterated, case-folded,
/// then raw text as the final word.
pub fn compare_text(
  a: &str,
  b: &str
) -> Ordering {
  let key_a = deunicode(a).to_lowercase();
  let key_b = deunicode(b).to_lowercase();
  key_a.cmp(&key_b).then_with(|| a.cmp(b))
}

fn apply_order(
  ordering: Ordering,
  order: SortOrder
) -> Ordering {
  match order {
    | SortOrder::Asc => ordering,
    | SortOrder::Desc => ordering.reverse()
  }
}

fn compare_primary(
  a: &Task,
  b: &Task,
  sort: SortState
) -> Ordering {
  match sort.field {
    | SortField::Created => apply_order(
      a.created.cmp(&b.created),
      sort.order
    ),
    | SortField::Priority => apply_order(
      a.priority
        .rank()
        .cmp(&b.priority.rank()),
      sort.order
    ),
    | SortField::Due => {
      match (a.due, b.due) {
        | (Some(x), Some(y)) => {
          apply_order(x.cmp(&y), sort.order)
        }
        // Undated tasks sink in either direction.
        | (None, Some(_)) => Ordering::Greater,
        | (Some(_), None) => Ordering::Less,
        | (None, None) => Ordering::Equal
      }
    }
  }
}

pub fn compare_tasks(
  a: &Task,
  b: &Task,
  sort: SortState
) -> Ordering {
  compare_primary(a, b, sort)
    .then_with(|| b.created.cmp(&a.created))
    .then_with(|| {
      compare_text(&a.title, &b.title)
    })
}

/// Stable sort into a new vector; the input
/// is left untouched.
#[tracing::instrument(skip(tasks), fields(count = tasks.len()))]
pub fn sort_tasks<'a>(
  tasks: &[&'a Task],
  sort: SortState
) -> Vec<&'a Task> {
  let mut sorted = tasks.to_vec();
  sorted.sort_by(|a, b| {
    compare_tasks(a, b, sort)
  });
  sorted
}

#[cfg(test)]
mod tests {
  use chrono::{
    DateTime,
    NaiveDate,
    TimeZone,
    Utc
  };

  use super::*;
  use crate::task::{
    Priority,
    TaskDraft
  };

  fn at(hour: u32) -> DateTime<Utc> {
    Utc
      .with_ymd_and_hms(
        2026, 5, 1, hour, 0, 0
      )
      .unwrap()
  }

  fn task(
    title: &str,
    created_hour: u32
  ) -> Task {
    Task::from_draft(
      TaskDraft::titled(title),
      at(created_hour)
    )
    .unwrap()
  }

  fn titles(tasks: &[&Task]) -> Vec<String> {
    tasks
      .iter()
      .map(|t| t.title.clone())
      .collect()
  }

  #[test]
  fn default_sort_is_newest_first() {
    let old = task("old", 1);
    let new = task("new", 5);
    let tasks = [&old, &new];
    let sorted = sort_tasks(
      &tasks,
      SortState::default()
    );
    assert_eq!(
      titles(&sorted),
      vec!["new", "old"]
    );
    assert_eq!(titles(&tasks), vec!["old", "new"]);
  }

  #[test]
  fn equal_priority_and_created_fall_back_to_title()
   {
    let b = task("B", 3);
    let a = task("A", 3);
    let sorted = sort_tasks(
      &[&b, &a],
      SortState::new(
        SortField::Priority,
        SortOrder::Asc
      )
    );
    assert_eq!(titles(&sorted), vec!["A", "B"]);
  }

  #[test]
  fn priority_ties_prefer_recent_tasks() {
    let mut early = task("early", 1);
    let mut late = task("late", 9);
    let mut top = task("top", 4);
    early.priority = Priority::High;
    late.priority = Priority::High;
    top.priority = Priority::Urgent;

    let sorted = sort_tasks(
      &[&early, &top, &late],
      SortState::new(
        SortField::Priority,
        SortOrder::Desc
      )
    );
    assert_eq!(
      titles(&sorted),
      vec!["top", "late", "early"]
    );
  }

  #[test]
  fn undated_tasks_sort_last_in_both_directions()
   {
    let mut soon = task("soon", 1);
    soon.due =
      NaiveDate::from_ymd_opt(2026, 5, 2);
    let mut later = task("later", 1);
    later.due =
      NaiveDate::from_ymd_opt(2026, 6, 2);
    let undated = task("undated", 8);

    let asc = sort_tasks(
      &[&undated, &later, &soon],
      SortState::new(
        SortField::Due,
        SortOrder::Asc
      )
    );
    assert_eq!(
      titles(&asc),
      vec!["soon", "later", "undated"]
    );

    let desc = sort_tasks(
      &[&undated, &soon, &later],
      SortState::new(
        SortField::Due,
        SortOrder::Desc
      )
    );
    assert_eq!(
      titles(&desc),
      vec!["later", "soon", "undated"]
    );
  }

  #[test]
  fn text_collation_ignores_case_and_accents()
  {
    assert_eq!(
      compare_text("éclair", "Eclipse"),
      Ordering::Less
    );
    assert_eq!(
      compare_text("apple", "Banana"),
      Ordering::Less
    );
  }
}
