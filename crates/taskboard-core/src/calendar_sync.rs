use std::sync::{
  Arc,
  Weak
};
use std::time::Duration;

use chrono::{
  NaiveDate,
  Utc
};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{
  debug,
  info,
  warn
};

use crate::calendar::{
  CalendarClient,
  EventDetails
};
use crate::error::{
  BoardError,
  CalendarError
};
use crate::task::{
  CalendarLink,
  Task,
  TaskId
};

pub const DEFAULT_CALENDAR_DEBOUNCE:
  Duration = Duration::from_millis(500);
pub const DEFAULT_CALENDAR_ID: &str =
  "primary";

/// The fields mirrored into the event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncedFields {
  pub title:       String,
  pub description: String,
  pub due:         Option<NaiveDate>
}

impl SyncedFields {
  pub fn of(task: &Task) -> Self {
    Self {
      title:       task.title.clone(),
      description: task.description.clone(),
      due:         task.due
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
  Created { event_id: String },
  Updated { event_id: String },
  /// Nothing differs from the last
  /// successful sync, or sync is off.
  Unchanged,
  /// Another sync was in flight; a rerun
  /// is queued.
  Deferred,
  SkippedNoDueDate,
  Failed(String),
  Removed
}

/// Passive toggle state for presentation.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default,
)]
pub struct SyncIndicator {
  pub enabled:      bool,
  pub has_event_id: bool,
  pub pending:      bool
}

/// Reports link changes so the caller can
/// commit them; `None` means the link was
/// cleared.
pub type LinkHook = Arc<
  dyn Fn(&TaskId, Option<&CalendarLink>)
    + Send
    + Sync
>;

#[derive(Debug, Clone)]
pub struct CalendarSyncOptions {
  pub debounce:    Duration,
  pub calendar_id: String
}

impl Default for CalendarSyncOptions {
  fn default() -> Self {
    Self {
      debounce:    DEFAULT_CALENDAR_DEBOUNCE,
      calendar_id: DEFAULT_CALENDAR_ID
        .to_string()
    }
  }
}

struct Inner {
  task:         Option<Task>,
  /// Fields as of the last successful
  /// sync.
  synced:       Option<SyncedFields>,
  calendar_id:  String,
  event_id:     Option<String>,
  timer:        Option<JoinHandle<()>>,
  timer_seq:    u64,
  in_flight:    bool,
  rerun:        bool,
  /// Bumped by `disable`; a call that
  /// started under an older generation
  /// must not re-link.
  generation:   u64,
  live:         bool,
  last_outcome: Option<SyncOutcome>,
  on_linked:    Option<LinkHook>
}

impl Inner {
  fn cancel_timer(&mut self) {
    if let Some(timer) = self.timer.take() {
      timer.abort();
    }
  }

  fn needs_sync(&self) -> bool {
    let Some(task) = &self.task else {
      return false;
    };
    task.calendar_enabled()
      && (self.event_id.is_none()
        || self.synced.as_ref()
          != Some(&SyncedFields::of(task)))
  }
}

struct Shared {
  inner:    Mutex<Inner>,
  client:   Arc<dyn CalendarClient>,
  debounce: Duration
}

/// Mirrors one task into an external
/// calendar on its own debounce window.
///
/// Failures are logged and swallowed; the
/// synced snapshot only advances on
/// success, so the next qualifying edit
/// retries.
pub struct CalendarSyncScheduler {
  shared: Arc<Shared>
}

impl CalendarSyncScheduler {
  pub fn new(
    client: Arc<dyn CalendarClient>,
    options: CalendarSyncOptions
  ) -> Self {
    Self {
      shared: Arc::new(Shared {
        inner: Mutex::new(Inner {
          task:         None,
          synced:       None,
          calendar_id:  options.calendar_id,
          event_id:     None,
          timer:        None,
          timer_seq:    0,
          in_flight:    false,
          rerun:        false,
          generation:   0,
          live:         true,
          last_outcome: None,
          on_linked:    None
        }),
        client,
        debounce: options.debounce
      })
    }
  }

  pub fn on_linked(
    &self,
    hook: impl Fn(&TaskId, Option<&CalendarLink>)
    + Send
    + Sync
    + 'static
  ) {
    self.shared.inner.lock().on_linked =
      Some(Arc::new(hook));
  }

  /// Feeds the latest committed version of
  /// the task.
  pub fn observe(&self, task: &Task) {
    let shared = &self.shared;
    let mut inner = shared.inner.lock();
    if !inner.live {
      return;
    }

    if let Some(link) = &task.calendar {
      if let Some(calendar_id) =
        &link.calendar_id
      {
        inner.calendar_id =
          calendar_id.clone();
      }
      if inner.event_id.is_none() {
        inner.event_id =
          link.event_id.clone();
      }
    }

    let fields = SyncedFields::of(task);
    let enabled = task.calendar_enabled();
    let previous =
      inner.task.replace(task.clone());
    let unchanged =
      previous.as_ref().is_some_and(|prev| {
        prev.calendar_enabled() == enabled
          && SyncedFields::of(prev) == fields
      });
    if unchanged {
      return;
    }

    if !enabled {
      inner.cancel_timer();
      return;
    }

    let linked = inner.event_id.is_some();
    if linked && inner.synced.is_none() {
      // Already linked before we started
      // watching.
      inner.synced = Some(fields);
      return;
    }
    if linked
      && inner.synced.as_ref() == Some(&fields)
    {
      inner.cancel_timer();
      return;
    }

    debug!(task = %task.id, "calendar sync scheduled");
    shared.arm_timer(&mut inner);
  }

  /// Cancels the debounce and syncs now.
  /// A missing due date is reported as
  /// `SyncPrecondition` here; calendar
  /// failures still only show up in the
  /// outcome.
  #[tracing::instrument(skip(self))]
  pub async fn sync_now(
    &self
  ) -> Result<SyncOutcome, BoardError> {
    self.shared.inner.lock().cancel_timer();
    Shared::run_sync(&self.shared).await
  }

  /// Deletes the external event (best
  /// effort) and forgets the link. A create
  /// still in flight deletes its own event
  /// when it returns.
  #[tracing::instrument(skip(self))]
  pub async fn disable(&self) -> SyncOutcome {
    let (task_id, calendar_id, event_id) = {
      let mut inner = self.shared.inner.lock();
      inner.cancel_timer();
      inner.generation += 1;
      inner.rerun = false;
      if let Some(link) = inner
        .task
        .as_mut()
        .and_then(|task| task.calendar.as_mut())
      {
        link.enabled = false;
        link.event_id = None;
      }
      (
        inner
          .task
          .as_ref()
          .map(|task| task.id.clone()),
        inner.calendar_id.clone(),
        inner.event_id.take()
      )
    };

    if let Some(event_id) = &event_id
      && let Err(err) = self
        .shared
        .client
        .delete_event(&calendar_id, event_id)
        .await
    {
      warn!(
        event_id = %event_id,
        error = %err,
        "failed to delete calendar event"
      );
    }

    let hook = {
      let mut inner = self.shared.inner.lock();
      inner.synced = None;
      inner.rerun = false;
      inner.last_outcome =
        Some(SyncOutcome::Removed);
      inner.on_linked.clone()
    };
    if let (Some(hook), Some(task_id)) =
      (hook, task_id)
    {
      hook(&task_id, None);
    }
    SyncOutcome::Removed
  }

  pub fn indicator(&self) -> SyncIndicator {
    let inner = self.shared.inner.lock();
    SyncIndicator {
      enabled:      inner
        .task
        .as_ref()
        .is_some_and(Task::calendar_enabled),
      has_event_id: inner.event_id.is_some(),
      pending:      inner.timer.is_some()
        || inner.in_flight
    }
  }

  pub fn last_outcome(
    &self
  ) -> Option<SyncOutcome> {
    self.shared.inner.lock().last_outcome.clone()
  }

  pub fn event_id(&self) -> Option<String> {
    self.shared.inner.lock().event_id.clone()
  }

  /// Drops the pending timer; calls already
  /// in flight run to completion but their
  /// results are ignored.
  pub fn close(&self) {
    let mut inner = self.shared.inner.lock();
    inner.live = false;
    inner.cancel_timer();
  }
}

impl Drop for CalendarSyncScheduler {
  fn drop(&mut self) {
    self.close();
  }
}

impl Shared {
  fn arm_timer(
    self: &Arc<Self>,
    inner: &mut Inner
  ) {
    inner.cancel_timer();
    inner.timer_seq += 1;
    let seq = inner.timer_seq;
    let delay = self.debounce;
    let weak = Arc::downgrade(self);
    inner.timer = Some(tokio::spawn(
      async move {
        tokio::time::sleep(delay).await;
        Self::fire(weak, seq).await;
      }
    ));
  }

  async fn fire(weak: Weak<Self>, seq: u64) {
    let Some(shared) = weak.upgrade() else {
      return;
    };
    {
      let mut inner = shared.inner.lock();
      if inner.timer_seq != seq {
        return;
      }
      inner.timer = None;
    }
    // The precondition skip is already
    // logged and recorded.
    let _ = Self::run_sync(&shared).await;
  }

  async fn run_sync(
    self: &Arc<Self>
  ) -> Result<SyncOutcome, BoardError> {
    let (
      task_id,
      fields,
      calendar_id,
      event_id,
      details,
      generation
    ) = {
      let mut inner = self.inner.lock();
      let Some(task) = inner.task.clone()
      else {
        return Ok(SyncOutcome::Unchanged);
      };
      if !inner.live
        || !task.calendar_enabled()
      {
        return Ok(SyncOutcome::Unchanged);
      }
      if inner.in_flight {
        inner.rerun = true;
        return Ok(SyncOutcome::Deferred);
      }
      let Some(due) = task.due else {
        info!(
          task = %task.id,
          "calendar sync skipped: task has no due date"
        );
        inner.last_outcome =
          Some(SyncOutcome::SkippedNoDueDate);
        return Err(
          BoardError::SyncPrecondition(
            task.id.clone()
          )
        );
      };
      if !inner.needs_sync() {
        return Ok(SyncOutcome::Unchanged);
      }

      inner.in_flight = true;
      let fields = SyncedFields::of(&task);
      let details = EventDetails {
        title: fields.title.clone(),
        description: fields
          .description
          .clone(),
        due
      };
      (
        task.id,
        fields,
        inner.calendar_id.clone(),
        inner.event_id.clone(),
        details,
        inner.generation
      )
    };

    let result = match &event_id {
      | None => self
        .client
        .create_event(&calendar_id, &details)
        .await
        .map(|id| (id, true)),
      | Some(id) => self
        .client
        .update_event(
          &calendar_id,
          id,
          &details
        )
        .await
        .map(|()| (id.clone(), false))
    };

    let (outcome, link, hook, orphan) = {
      let mut inner = self.inner.lock();
      inner.in_flight = false;
      if !inner.live {
        return Ok(SyncOutcome::Unchanged);
      }

      if inner.generation != generation {
        let orphan = match result {
          | Ok((event_id, true)) => Some(event_id),
          | _ => None
        };
        (SyncOutcome::Removed, None, None, orphan)
      } else {
        let (outcome, link) = self.settle(
          &mut inner,
          &task_id,
          fields,
          &calendar_id,
          result
        );
        (outcome, link, inner.on_linked.clone(), None)
      }
    };

    if let Some(event_id) = orphan {
      info!(
        task = %task_id,
        event_id = %event_id,
        "sync disabled mid-call; removing new event"
      );
      if let Err(err) = self
        .client
        .delete_event(&calendar_id, &event_id)
        .await
      {
        warn!(
          event_id = %event_id,
          error = %err,
          "failed to delete calendar event"
        );
      }
      return Ok(SyncOutcome::Removed);
    }

    if let (Some(link), Some(hook)) =
      (link, hook)
    {
      hook(&task_id, Some(&link));
    }
    Ok(outcome)
  }

  /// Applies a completed call that is still
  /// current.
  fn settle(
    self: &Arc<Self>,
    inner: &mut Inner,
    task_id: &TaskId,
    fields: SyncedFields,
    calendar_id: &str,
    result: Result<(String, bool), CalendarError>
  ) -> (SyncOutcome, Option<CalendarLink>) {
    let mut link = None;
    let outcome = match result {
      | Ok((event_id, created)) => {
        inner.synced = Some(fields);
        inner.event_id =
          Some(event_id.clone());
        link = Some(CalendarLink {
          enabled:        true,
          calendar_id:    Some(
            calendar_id.to_string()
          ),
          event_id:       Some(
            event_id.clone()
          ),
          last_synced_at: Some(Utc::now())
        });
        info!(
          task = %task_id,
          event_id = %event_id,
          created,
          "calendar event synced"
        );
        if created {
          SyncOutcome::Created { event_id }
        } else {
          SyncOutcome::Updated { event_id }
        }
      }
      | Err(err) => {
        warn!(
          task = %task_id,
          error = %err,
          "calendar sync failed"
        );
        SyncOutcome::Failed(err.to_string())
      }
    };
    inner.last_outcome =
      Some(outcome.clone());

    if std::mem::take(&mut inner.rerun)
      && inner.timer.is_none()
      && inner.needs_sync()
    {
      self.arm_timer(inner);
    }
    (outcome, link)
  }
}
