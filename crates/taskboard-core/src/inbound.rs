use chrono::{
  DateTime,
  NaiveDate,
  Utc
};
use tracing::{
  info,
  warn
};

use crate::error::BoardError;
use crate::store::TaskStore;
use crate::task::{
  Channel,
  Priority,
  Provenance,
  Task,
  TaskDraft,
  TaskId
};

/// Candidate task extracted from an inbound
/// message.
#[derive(Debug, Clone, Default)]
pub struct InboundTask {
  pub title:       String,
  pub description: String,
  pub priority:    Option<Priority>,
  pub due:         Option<NaiveDate>,
  pub labels:      Vec<String>
}

#[derive(Debug, Clone)]
pub struct InboundDelivery {
  pub channel:     Channel,
  pub sender:      String,
  /// Redelivery of the same key must not
  /// create a second task.
  pub dedup_key:   String,
  pub received_at: DateTime<Utc>
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundOutcome {
  pub task_id:   TaskId,
  pub duplicate: bool
}

/// Keeps only the last four characters of
/// the sender.
pub fn mask_sender(sender: &str) -> String {
  let cleaned = sender
    .strip_prefix("whatsapp:")
    .unwrap_or(sender);
  let chars: Vec<char> = cleaned.chars().collect();
  let tail: String = chars
    [chars.len().saturating_sub(4)..]
    .iter()
    .collect();
  format!("****{tail}")
}

#[tracing::instrument(skip(store, payload), fields(dedup_key = %delivery.dedup_key))]
pub async fn create_from_inbound(
  store: &dyn TaskStore,
  payload: InboundTask,
  delivery: InboundDelivery
) -> Result<InboundOutcome, BoardError> {
  match store
    .find_by_dedup_key(&delivery.dedup_key)
    .await
  {
    | Ok(Some(task_id)) => {
      info!(task = %task_id, "duplicate inbound delivery");
      return Ok(InboundOutcome {
        task_id,
        duplicate: true
      });
    }
    | Ok(None) => {}
    | Err(err) => {
      // A duplicate beats a dropped task.
      warn!(error = %err, "dedup lookup failed; creating anyway");
    }
  }

  let draft = TaskDraft {
    title:       payload.title,
    description: payload.description,
    priority:    payload
      .priority
      .unwrap_or_default(),
    due:         payload.due,
    labels:      payload.labels,
    assignee:    None
  };
  let mut task =
    Task::from_draft(draft, delivery.received_at)?;
  task.source = Some(Provenance {
    channel:     delivery.channel,
    from:        Some(mask_sender(
      &delivery.sender
    )),
    dedup_key:   Some(delivery.dedup_key),
    received_at: Some(delivery.received_at)
  });

  let id = task.id.clone();
  let created = store.create(task).await.map_err(
    |err| BoardError::from_store(vec![id], err)
  )?;
  info!(task = %created.id, "created task from inbound message");
  Ok(InboundOutcome {
    task_id:   created.id,
    duplicate: false
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::MemoryTaskStore;

  fn delivery(key: &str) -> InboundDelivery {
    InboundDelivery {
      channel:     Channel::Whatsapp,
      sender:      "whatsapp:+15551234567"
        .to_string(),
      dedup_key:   key.to_string(),
      received_at: Utc::now()
    }
  }

  fn payload(title: &str) -> InboundTask {
    InboundTask {
      title: title.to_string(),
      labels: vec!["errand".to_string()],
      ..InboundTask::default()
    }
  }

  #[test]
  fn sender_is_masked_to_last_four() {
    assert_eq!(
      mask_sender("whatsapp:+15551234567"),
      "****4567"
    );
    assert_eq!(mask_sender("12"), "****12");
  }

  #[tokio::test]
  async fn redelivery_returns_the_existing_task()
   {
    let store = MemoryTaskStore::new("alice");

    let first = create_from_inbound(
      &store,
      payload("Buy stamps"),
      delivery("SM123")
    )
    .await
    .unwrap();
    assert!(!first.duplicate);

    let again = create_from_inbound(
      &store,
      payload("Buy stamps"),
      delivery("SM123")
    )
    .await
    .unwrap();
    assert!(again.duplicate);
    assert_eq!(again.task_id, first.task_id);

    let tasks = store.snapshot();
    assert_eq!(tasks.len(), 1);
    let task = &tasks[0];
    assert_eq!(task.priority, Priority::Medium);
    let source = task.source.as_ref().unwrap();
    assert_eq!(source.from.as_deref(), Some("****4567"));
    assert_eq!(source.dedup_key.as_deref(), Some("SM123"));
  }

  #[tokio::test]
  async fn blank_titles_are_rejected_before_storing()
   {
    let store = MemoryTaskStore::new("alice");
    let err = create_from_inbound(
      &store,
      payload("  "),
      delivery("SM1")
    )
    .await
    .unwrap_err();
    assert_eq!(err, BoardError::validation("title"));
    assert!(store.calls().iter().all(|c| {
      !matches!(c, crate::store::StoreCall::Create(_))
    }));
  }
}
