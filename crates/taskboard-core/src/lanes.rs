use std::collections::HashMap;

use crate::sort::compare_text;
use crate::task::{
  Priority,
  Task
};

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default,
)]
pub enum GroupBy {
  #[default]
  None,
  Assignee,
  Priority,
  Label
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaneKey {
  All,
  Assignee(String),
  Unassigned,
  Priority(Priority),
  /// Lower-cased label name.
  Label(String),
  NoLabel
}

impl LaneKey {
  pub fn id(&self) -> String {
    match self {
      | LaneKey::All => "all".to_string(),
      | LaneKey::Assignee(id) => {
        format!("assignee-{id}")
      }
      | LaneKey::Unassigned => {
        "unassigned".to_string()
      }
      | LaneKey::Priority(priority) => {
        format!("priority-{priority}")
      }
      | LaneKey::Label(key) => {
        format!("label-{key}")
      }
      | LaneKey::NoLabel => {
        "no-label".to_string()
      }
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lane<'a> {
  pub key:   LaneKey,
  pub title: String,
  pub tasks: Vec<&'a Task>
}

/// Partitions tasks into lanes, keeping
/// input order inside each lane. Label lanes
/// overlap: a task appears once per distinct
/// label it carries.
#[tracing::instrument(skip(tasks), fields(count = tasks.len()))]
pub fn build_lanes<'a>(
  tasks: &[&'a Task],
  group_by: GroupBy
) -> Vec<Lane<'a>> {
  match group_by {
    | GroupBy::None => vec![Lane {
      key:   LaneKey::All,
      title: "All Tasks".to_string(),
      tasks: tasks.to_vec()
    }],
    | GroupBy::Assignee => {
      assignee_lanes(tasks)
    }
    | GroupBy::Priority => {
      priority_lanes(tasks)
    }
    | GroupBy::Label => label_lanes(tasks)
  }
}

fn assignee_lanes<'a>(
  tasks: &[&'a Task]
) -> Vec<Lane<'a>> {
  let mut lanes: Vec<Lane<'a>> = Vec::new();
  let mut index: HashMap<String, usize> =
    HashMap::new();
  let mut unassigned = Vec::new();

  for task in tasks {
    let Some(assignee) =
      task.assignee.as_ref()
    else {
      unassigned.push(*task);
      continue;
    };

    let slot = *index
      .entry(assignee.id.clone())
      .or_insert_with(|| {
        lanes.push(Lane {
          key:   LaneKey::Assignee(
            assignee.id.clone()
          ),
          title: assignee.name.clone(),
          tasks: Vec::new()
        });
        lanes.len() - 1
      });
    lanes[slot].tasks.push(*task);
  }

  lanes.sort_by(|a, b| {
    compare_text(&a.title, &b.title)
      .then_with(|| {
        a.key.id().cmp(&b.key.id())
      })
  });

  if !unassigned.is_empty() {
    lanes.push(Lane {
      key:   LaneKey::Unassigned,
      title: "Unassigned".to_string(),
      tasks: unassigned
    });
  }

  lanes
}

fn priority_lanes<'a>(
  tasks: &[&'a Task]
) -> Vec<Lane<'a>> {
  Priority::DESCENDING
    .into_iter()
    .filter_map(|priority| {
      let members: Vec<&'a Task> = tasks
        .iter()
        .copied()
        .filter(|task| {
          task.priority == priority
        })
        .collect();
      if members.is_empty() {
        return None;
      }
      Some(Lane {
        key:   LaneKey::Priority(priority),
        title: priority.label().to_string(),
        tasks: members
      })
    })
    .collect()
}

fn label_lanes<'a>(
  tasks: &[&'a Task]
) -> Vec<Lane<'a>> {
  let mut lanes: Vec<Lane<'a>> = Vec::new();
  let mut index: HashMap<String, usize> =
    HashMap::new();
  let mut unlabeled = Vec::new();

  for task in tasks {
    if task.labels.is_empty() {
      unlabeled.push(*task);
      continue;
    }

    let mut seen: Vec<String> = Vec::new();
    for label in &task.labels {
      let key = label.name.to_lowercase();
      if seen.contains(&key) {
        continue;
      }
      seen.push(key.clone());

      let slot = *index
        .entry(key.clone())
        .or_insert_with(|| {
          lanes.push(Lane {
            key:   LaneKey::Label(key),
            title: label.name.clone(),
            tasks: Vec::new()
          });
          lanes.len() - 1
        });
      lanes[slot].tasks.push(*task);
    }
  }

  lanes.sort_by(|a, b| {
    compare_text(&a.title, &b.title)
  });

  if !unlabeled.is_empty() {
    lanes.push(Lane {
      key:   LaneKey::NoLabel,
      title: "No Label".to_string(),
      tasks: unlabeled
    });
  }

  lanes
}

#[cfg(test)]
mod tests {
  use chrono::{
    TimeZone,
    Utc
  };

  use super::*;
  use crate::label::make_label;
  use crate::task::{
    Assignee,
    TaskDraft
  };

  fn task(title: &str) -> Task {
    Task::from_draft(
      TaskDraft::titled(title),
      Utc
        .with_ymd_and_hms(
          2026, 1, 5, 10, 0, 0
        )
        .unwrap()
    )
    .unwrap()
  }

  fn labelled(
    title: &str,
    names: &[&str]
  ) -> Task {
    let mut t = task(title);
    for name in names {
      t.labels.push(
        make_label(name, None).unwrap()
      );
    }
    t
  }

  fn lane_titles(
    lanes: &[Lane<'_>]
  ) -> Vec<String> {
    lanes
      .iter()
      .map(|lane| lane.title.clone())
      .collect()
  }

  #[test]
  fn none_yields_one_lane_with_everything()
  {
    let a = task("a");
    let b = task("b");
    let lanes =
      build_lanes(&[&a, &b], GroupBy::None);
    assert_eq!(lanes.len(), 1);
    assert_eq!(lanes[0].key, LaneKey::All);
    assert_eq!(lanes[0].tasks.len(), 2);
  }

  #[test]
  fn assignee_lanes_sorted_by_name_with_trailing_unassigned()
   {
    let mut a = task("a");
    a.assignee = Some(Assignee {
      id:   "u2".to_string(),
      name: "Zoe".to_string()
    });
    let mut b = task("b");
    b.assignee = Some(Assignee {
      id:   "u1".to_string(),
      name: "amir".to_string()
    });
    let c = task("c");
    let mut d = task("d");
    d.assignee = a.assignee.clone();

    let lanes = build_lanes(
      &[&a, &b, &c, &d],
      GroupBy::Assignee
    );
    assert_eq!(
      lane_titles(&lanes),
      vec!["amir", "Zoe", "Unassigned"]
    );
    assert_eq!(lanes[1].tasks.len(), 2);
    assert_eq!(lanes[2].key, LaneKey::Unassigned);
  }

  #[test]
  fn priority_lanes_follow_fixed_order_and_skip_empty()
   {
    let mut low = task("low");
    low.priority = Priority::Low;
    let mut urgent = task("urgent");
    urgent.priority = Priority::Urgent;

    let lanes = build_lanes(
      &[&low, &urgent],
      GroupBy::Priority
    );
    assert_eq!(
      lane_titles(&lanes),
      vec!["Urgent", "Low"]
    );
  }

  #[test]
  fn multi_label_tasks_appear_in_every_lane()
  {
    let both =
      labelled("both", &["urgent-fix", "billing"]);
    let one = labelled("one", &["Billing"]);
    let none = task("none");
    let tasks = [&both, &one, &none];

    let lanes =
      build_lanes(&tasks, GroupBy::Label);
    assert_eq!(
      lane_titles(&lanes),
      vec!["billing", "urgent-fix", "No Label"]
    );

    let billing = &lanes[0];
    assert_eq!(billing.tasks.len(), 2);
    assert!(
      lanes[1]
        .tasks
        .iter()
        .any(|t| t.title == "both")
    );

    let placed: usize = lanes
      .iter()
      .map(|lane| lane.tasks.len())
      .sum();
    assert!(placed > tasks.len());
  }

  #[test]
  fn duplicate_casing_on_one_task_counts_once()
   {
    let t = labelled("t", &["Ops", "ops"]);
    let lanes =
      build_lanes(&[&t], GroupBy::Label);
    assert_eq!(lanes.len(), 1);
    assert_eq!(lanes[0].tasks.len(), 1);
    assert_eq!(
      lanes[0].key,
      LaneKey::Label("ops".to_string())
    );
  }
}
