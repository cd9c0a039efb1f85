use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{
  DateTime,
  NaiveDate,
  Utc
};
use serde::{
  Deserialize,
  Serialize
};
use uuid::Uuid;

use crate::error::BoardError;
use crate::label::{
  self,
  Label
};

#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
  pub fn generate() -> Self {
    Self(Uuid::new_v4().to_string())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl From<&str> for TaskId {
  fn from(value: &str) -> Self {
    Self(value.to_string())
  }
}

impl From<String> for TaskId {
  fn from(value: String) -> Self {
    Self(value)
  }
}

impl fmt::Display for TaskId {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(&self.0)
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Status {
  Pending,
  InProgress,
  Done
}

impl Status {
  pub fn as_str(self) -> &'static str {
    match self {
      | Status::Pending => "pending",
      | Status::InProgress => {
        "in_progress"
      }
      | Status::Done => "done"
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      | Status::Pending => "To Do",
      | Status::InProgress => {
        "In Progress"
      }
      | Status::Done => "Done"
    }
  }

  pub fn is_terminal(self) -> bool {
    self == Status::Done
  }
}

impl fmt::Display for Status {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Status {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .replace('-', "_")
      .as_str()
    {
      | "pending" | "todo" => {
        Ok(Status::Pending)
      }
      | "in_progress" | "doing" => {
        Ok(Status::InProgress)
      }
      | "done" => Ok(Status::Done),
      | other => Err(anyhow!(
        "unknown status '{other}': \
         expected pending|in_progress|done"
      ))
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Default,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
  Low,
  #[default]
  Medium,
  High,
  Urgent
}

impl Priority {
  /// Lane order, most pressing first.
  pub const DESCENDING: [Priority; 4] = [
    Priority::Urgent,
    Priority::High,
    Priority::Medium,
    Priority::Low
  ];

  pub fn rank(self) -> u8 {
    match self {
      | Priority::Low => 1,
      | Priority::Medium => 2,
      | Priority::High => 3,
      | Priority::Urgent => 4
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      | Priority::Low => "low",
      | Priority::Medium => "medium",
      | Priority::High => "high",
      | Priority::Urgent => "urgent"
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      | Priority::Low => "Low",
      | Priority::Medium => "Medium",
      | Priority::High => "High",
      | Priority::Urgent => "Urgent"
    }
  }
}

impl fmt::Display for Priority {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Priority {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "low" | "l" => Ok(Priority::Low),
      | "medium" | "med" | "m" => {
        Ok(Priority::Medium)
      }
      | "high" | "h" => Ok(Priority::High),
      | "urgent" | "u" => {
        Ok(Priority::Urgent)
      }
      | other => Err(anyhow!(
        "unknown priority '{other}': \
         expected low|medium|high|urgent"
      ))
    }
  }
}

#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
pub struct Assignee {
  pub id:   String,
  pub name: String
}

#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
pub struct ChecklistItem {
  pub id:   String,
  pub text: String,
  #[serde(default)]
  pub done: bool
}

#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
pub struct Attachment {
  pub id:    String,
  pub title: String,
  pub url:   String
}

/// Per-task opt-in mirror to an external
/// calendar.
#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
)]
pub struct CalendarLink {
  #[serde(default)]
  pub enabled:        bool,
  #[serde(default)]
  pub calendar_id:    Option<String>,
  #[serde(default)]
  pub event_id:       Option<String>,
  #[serde(default)]
  pub last_synced_at:
    Option<DateTime<Utc>>
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
  Manual,
  Whatsapp
}

#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
pub struct Provenance {
  pub channel:     Channel,
  #[serde(default)]
  pub from:        Option<String>,
  #[serde(default)]
  pub dedup_key:   Option<String>,
  #[serde(default)]
  pub received_at:
    Option<DateTime<Utc>>
}

#[derive(
  Debug,
  Clone,
  PartialEq,
  Serialize,
  Deserialize,
)]
pub struct Task {
  pub id:          TaskId,
  pub title:       String,
  #[serde(default)]
  pub description: String,
  pub status:      Status,
  #[serde(default)]
  pub priority:    Priority,
  #[serde(default)]
  pub due:         Option<NaiveDate>,
  #[serde(
    default,
    deserialize_with = "label::deserialize_labels"
  )]
  pub labels:      Vec<Label>,
  #[serde(default)]
  pub assignee:    Option<Assignee>,
  #[serde(default)]
  pub checklist:   Vec<ChecklistItem>,
  #[serde(default)]
  pub attachments: Vec<Attachment>,
  #[serde(default)]
  pub calendar:    Option<CalendarLink>,
  #[serde(default)]
  pub source:      Option<Provenance>,
  pub created:     DateTime<Utc>,
  pub modified:    DateTime<Utc>
}

/// Input for a new task, before validation.
#[derive(Debug, Clone, Default)]
pub struct TaskDraft {
  pub title:       String,
  pub description: String,
  pub priority:    Priority,
  pub due:         Option<NaiveDate>,
  pub labels:      Vec<String>,
  pub assignee:    Option<Assignee>
}

impl TaskDraft {
  pub fn titled(
    title: impl Into<String>
  ) -> Self {
    Self {
      title: title.into(),
      ..Self::default()
    }
  }
}

pub fn validate_title(
  raw: &str
) -> Result<String, BoardError> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return Err(BoardError::validation(
      "title"
    ));
  }
  Ok(trimmed.to_string())
}

impl Task {
  pub fn from_draft(
    draft: TaskDraft,
    now: DateTime<Utc>
  ) -> Result<Self, BoardError> {
    let title =
      validate_title(&draft.title)?;

    let mut task = Self {
      id: TaskId::generate(),
      title,
      description: draft.description,
      status: Status::Pending,
      priority: draft.priority,
      due: draft.due,
      labels: Vec::new(),
      assignee: draft.assignee,
      checklist: Vec::new(),
      attachments: Vec::new(),
      calendar: None,
      source: None,
      created: now,
      modified: now
    };

    for name in &draft.labels {
      let label =
        label::make_label(name, None)?;
      task.add_label(label);
    }

    Ok(task)
  }

  pub fn has_label(
    &self,
    name: &str
  ) -> bool {
    self.labels.iter().any(|label| {
      label::names_equal(
        &label.name,
        name
      )
    })
  }

  /// Returns false when a label with the
  /// same name (ignoring case) is present.
  pub fn add_label(
    &mut self,
    label: Label
  ) -> bool {
    if self.has_label(&label.name) {
      return false;
    }
    self.labels.push(label);
    true
  }

  pub fn remove_label(
    &mut self,
    name: &str
  ) -> bool {
    let before = self.labels.len();
    self.labels.retain(|label| {
      !label::names_equal(
        &label.name,
        name
      )
    });
    self.labels.len() != before
  }

  pub fn calendar_enabled(&self) -> bool {
    self
      .calendar
      .as_ref()
      .is_some_and(|link| link.enabled)
  }

  pub fn add_checklist_item(
    &mut self,
    text: &str
  ) -> Result<&ChecklistItem, BoardError>
  {
    let text = text.trim();
    if text.is_empty() {
      return Err(BoardError::validation(
        "checklist item"
      ));
    }
    self.checklist.push(ChecklistItem {
      id:   format!(
        "item-{}",
        Uuid::new_v4()
      ),
      text: text.to_string(),
      done: false
    });
    Ok(&self.checklist
      [self.checklist.len() - 1])
  }

  pub fn toggle_checklist_item(
    &mut self,
    item_id: &str
  ) -> bool {
    match self
      .checklist
      .iter_mut()
      .find(|item| item.id == item_id)
    {
      | Some(item) => {
        item.done = !item.done;
        true
      }
      | None => false
    }
  }

  pub fn remove_checklist_item(
    &mut self,
    item_id: &str
  ) -> bool {
    let before = self.checklist.len();
    self
      .checklist
      .retain(|item| item.id != item_id);
    self.checklist.len() != before
  }

  /// (done, total)
  pub fn checklist_progress(
    &self
  ) -> (usize, usize) {
    let done = self
      .checklist
      .iter()
      .filter(|item| item.done)
      .count();
    (done, self.checklist.len())
  }

  pub fn add_attachment(
    &mut self,
    title: &str,
    url: &str
  ) -> Result<&Attachment, BoardError> {
    let title = title.trim();
    let url = url.trim();
    if title.is_empty() {
      return Err(BoardError::validation(
        "attachment title"
      ));
    }
    if url.is_empty() {
      return Err(BoardError::validation(
        "attachment url"
      ));
    }
    self.attachments.push(Attachment {
      id:    format!(
        "att-{}",
        Uuid::new_v4()
      ),
      title: title.to_string(),
      url:   url.to_string()
    });
    Ok(&self.attachments
      [self.attachments.len() - 1])
  }

  pub fn remove_attachment(
    &mut self,
    attachment_id: &str
  ) -> bool {
    let before = self.attachments.len();
    self.attachments.retain(|item| {
      item.id != attachment_id
    });
    self.attachments.len() != before
  }
}
