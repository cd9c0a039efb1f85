use std::collections::BTreeMap;

use serde::{
  Deserialize,
  Deserializer,
  Serialize
};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::error::BoardError;
use crate::task::{
  Assignee,
  Task
};

pub const LABEL_COLORS: [&str; 14] = [
  "#EF4444", "#F59E0B", "#10B981",
  "#3B82F6", "#8B5CF6", "#EC4899",
  "#06B6D4", "#84CC16", "#F97316",
  "#6366F1", "#14B8A6", "#A855F7",
  "#EAB308", "#22C55E"
];

#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
pub struct Label {
  pub id:    String,
  pub name:  String,
  pub color: String
}

/// Trims and collapses inner whitespace.
pub fn normalize_name(
  name: &str
) -> String {
  name
    .split_whitespace()
    .collect::<Vec<_>>()
    .join(" ")
}

pub fn names_equal(
  a: &str,
  b: &str
) -> bool {
  a.to_lowercase() == b.to_lowercase()
}

pub fn color_for(
  name: &str
) -> &'static str {
  let mut hash: i32 = 0;
  for unit in
    name.to_lowercase().encode_utf16()
  {
    hash = hash
      .wrapping_shl(5)
      .wrapping_sub(hash)
      .wrapping_add(i32::from(unit));
  }
  let idx = hash.unsigned_abs() as usize
    % LABEL_COLORS.len();
  LABEL_COLORS[idx]
}

pub fn make_label(
  name: &str,
  color: Option<&str>
) -> Result<Label, BoardError> {
  let normalized = normalize_name(name);
  if normalized.is_empty() {
    return Err(BoardError::validation(
      "label name"
    ));
  }
  Ok(build_label(normalized, color))
}

fn build_label(
  name: String,
  color: Option<&str>
) -> Label {
  let color = color
    .map(str::to_string)
    .unwrap_or_else(|| {
      color_for(&name).to_string()
    });
  Label {
    id: format!("label-{}", Uuid::new_v4()),
    name,
    color
  }
}

/// Stored label entries come in two shapes:
/// full records and bare names from older
/// rows.
#[derive(Deserialize)]
#[serde(untagged)]
enum LabelRepr {
  Record(Label),
  Plain(String),
  Other(Value)
}

pub fn decode_labels(
  raw: Value
) -> Vec<Label> {
  let Value::Array(entries) = raw else {
    return Vec::new();
  };

  entries
    .into_iter()
    .map(|entry| {
      match serde_json::from_value::<
        LabelRepr
      >(entry)
      {
        | Ok(LabelRepr::Record(label)) => {
          label
        }
        | Ok(LabelRepr::Plain(name)) => {
          let normalized =
            normalize_name(&name);
          if normalized.is_empty() {
            build_label(
              "Unknown".to_string(),
              None
            )
          } else {
            debug!(label = %normalized, "upgraded legacy string label");
            build_label(normalized, None)
          }
        }
        | Ok(LabelRepr::Other(_))
        | Err(_) => build_label(
          "Unknown".to_string(),
          None
        )
      }
    })
    .collect()
}

pub(crate) fn deserialize_labels<
  'de,
  D
>(
  deserializer: D
) -> Result<Vec<Label>, D::Error>
where
  D: Deserializer<'de>
{
  let raw =
    Value::deserialize(deserializer)?;
  Ok(decode_labels(raw))
}

/// Distinct labels across tasks, first
/// casing wins, ordered by name.
pub fn distinct_labels<'a, I>(
  tasks: I
) -> Vec<Label>
where
  I: IntoIterator<Item = &'a Task>
{
  let mut by_key: BTreeMap<
    String,
    Label
  > = BTreeMap::new();
  for task in tasks {
    for label in &task.labels {
      by_key
        .entry(label.name.to_lowercase())
        .or_insert_with(|| label.clone());
    }
  }

  let mut labels: Vec<Label> =
    by_key.into_values().collect();
  labels.sort_by(|a, b| {
    crate::sort::compare_text(
      &a.name, &b.name
    )
  });
  labels
}

pub fn distinct_assignees<'a, I>(
  tasks: I
) -> Vec<Assignee>
where
  I: IntoIterator<Item = &'a Task>
{
  let mut by_id: BTreeMap<
    String,
    Assignee
  > = BTreeMap::new();
  for task in tasks {
    if let Some(assignee) =
      task.assignee.as_ref()
    {
      by_id.insert(
        assignee.id.clone(),
        assignee.clone()
      );
    }
  }

  let mut assignees: Vec<Assignee> =
    by_id.into_values().collect();
  assignees.sort_by(|a, b| {
    crate::sort::compare_text(
      &a.name, &b.name
    )
  });
  assignees
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn names_normalize_and_compare_without_case()
   {
    assert_eq!(
      normalize_name("  urgent   fix "),
      "urgent fix"
    );
    assert!(names_equal("Billing", "bILLING"));
    assert!(
      make_label("   ", None).is_err()
    );
  }

  #[test]
  fn color_is_stable_per_name() {
    assert_eq!(
      color_for("Billing"),
      color_for("billing")
    );
    let label =
      make_label("Billing", None).unwrap();
    assert_eq!(
      label.color,
      color_for("Billing")
    );
    assert!(
      LABEL_COLORS
        .contains(&label.color.as_str())
    );
  }

  #[test]
  fn legacy_labels_decode_to_records() {
    let labels = decode_labels(json!([
      "home",
      {"id": "l1", "name": "Work", "color": "#000000"},
      42
    ]));

    assert_eq!(labels.len(), 3);
    assert_eq!(labels[0].name, "home");
    assert!(labels[0].id.starts_with("label-"));
    assert_eq!(labels[1].id, "l1");
    assert_eq!(labels[1].color, "#000000");
    assert_eq!(labels[2].name, "Unknown");

    assert!(
      decode_labels(json!("oops"))
        .is_empty()
    );
  }
}
