use std::sync::{
  Arc,
  Weak
};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{
  debug,
  warn
};

use crate::diff::FieldDiff;
use crate::error::StoreError;
use crate::store::TaskStore;
use crate::task::TaskId;

pub const DEFAULT_AUTOSAVE_DEBOUNCE:
  Duration = Duration::from_millis(400);
pub const DEFAULT_SAVED_COOLDOWN:
  Duration = Duration::from_secs(2);

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default,
)]
pub enum SaveStatus {
  #[default]
  Idle,
  Dirty,
  Saving,
  Saved,
  Error
}

#[derive(
  Debug, Clone, PartialEq, Eq, Default,
)]
pub struct SaveState {
  pub status: SaveStatus,
  pub error:  Option<String>
}

impl SaveState {
  fn with_status(
    status: SaveStatus
  ) -> Self {
    Self {
      status,
      error: None
    }
  }
}

#[derive(Debug, Clone, Copy)]
pub struct AutosaveOptions {
  pub debounce: Duration,
  pub cooldown: Duration
}

impl Default for AutosaveOptions {
  fn default() -> Self {
    Self {
      debounce: DEFAULT_AUTOSAVE_DEBOUNCE,
      cooldown: DEFAULT_SAVED_COOLDOWN
    }
  }
}

/// Receives the changed fields of one
/// entity.
#[async_trait]
pub trait Persist: Send + Sync {
  async fn persist(
    &self,
    diff: FieldDiff
  ) -> Result<(), StoreError>;
}

/// Sends diffs for one task to a store.
pub struct StoreTarget {
  store: Arc<dyn TaskStore>,
  id:    TaskId
}

impl StoreTarget {
  pub fn new(
    store: Arc<dyn TaskStore>,
    id: TaskId
  ) -> Self {
    Self { store, id }
  }
}

#[async_trait]
impl Persist for StoreTarget {
  async fn persist(
    &self,
    diff: FieldDiff
  ) -> Result<(), StoreError> {
    self
      .store
      .update(&self.id, diff)
      .await
      .map(|_| ())
  }
}

pub type ErrorHook =
  Arc<dyn Fn(&StoreError) + Send + Sync>;

struct Inner<T> {
  draft:     T,
  saved:     T,
  /// Latest issued version. Bumped by every
  /// draft change and every save.
  issued:    u64,
  saving:    bool,
  live:      bool,
  timer:     Option<JoinHandle<()>>,
  timer_seq: u64,
  cooldown:  Option<JoinHandle<()>>,
  on_error:  Option<ErrorHook>
}

impl<T> Inner<T> {
  fn cancel_timer(&mut self) {
    if let Some(timer) = self.timer.take() {
      timer.abort();
    }
  }

  fn cancel_cooldown(&mut self) {
    if let Some(cooldown) =
      self.cooldown.take()
    {
      cooldown.abort();
    }
  }
}

struct Shared<T> {
  inner:    Mutex<Inner<T>>,
  persist:  Arc<dyn Persist>,
  options:  AutosaveOptions,
  state_tx: watch::Sender<SaveState>
}

/// Debounced, diff-based persistence for a
/// single entity.
///
/// Timers run on the ambient tokio runtime.
/// Only the most recently issued save may
/// change the visible state or the saved
/// snapshot.
pub struct AutosaveController<T> {
  shared: Arc<Shared<T>>
}

impl<T> AutosaveController<T>
where
  T: Serialize
    + Clone
    + PartialEq
    + Send
    + 'static
{
  pub fn new(
    initial: T,
    persist: Arc<dyn Persist>,
    options: AutosaveOptions
  ) -> Self {
    let (state_tx, _) =
      watch::channel(SaveState::default());
    Self {
      shared: Arc::new(Shared {
        inner: Mutex::new(Inner {
          draft: initial.clone(),
          saved: initial,
          issued: 0,
          saving: false,
          live: true,
          timer: None,
          timer_seq: 0,
          cooldown: None,
          on_error: None
        }),
        persist,
        options,
        state_tx
      })
    }
  }

  pub fn on_error(
    &self,
    hook: impl Fn(&StoreError)
    + Send
    + Sync
    + 'static
  ) {
    self.shared.inner.lock().on_error =
      Some(Arc::new(hook));
  }

  pub fn state(&self) -> SaveState {
    self.shared.state_tx.borrow().clone()
  }

  pub fn status(&self) -> SaveStatus {
    self.shared.state_tx.borrow().status
  }

  pub fn error(&self) -> Option<String> {
    self
      .shared
      .state_tx
      .borrow()
      .error
      .clone()
  }

  pub fn subscribe(
    &self
  ) -> watch::Receiver<SaveState> {
    self.shared.state_tx.subscribe()
  }

  pub fn is_dirty(&self) -> bool {
    let inner = self.shared.inner.lock();
    inner.draft != inner.saved
  }

  pub fn draft(&self) -> T {
    self.shared.inner.lock().draft.clone()
  }

  pub fn saved(&self) -> T {
    self.shared.inner.lock().saved.clone()
  }

  /// Feeds a new draft value. Re-arms the
  /// debounce window when it differs from
  /// the saved snapshot.
  pub fn update(&self, next: T) {
    let shared = &self.shared;
    let mut inner = shared.inner.lock();
    if !inner.live || inner.draft == next {
      return;
    }

    inner.draft = next;
    inner.issued += 1;

    if inner.draft == inner.saved {
      inner.cancel_timer();
      if !inner.saving {
        inner.cancel_cooldown();
        shared.publish(SaveState::default());
      }
      return;
    }

    inner.cancel_cooldown();
    if !inner.saving {
      shared.publish(SaveState::with_status(
        SaveStatus::Dirty
      ));
    }
    shared.arm_timer(&mut inner);
  }

  /// Cancels the pending timer and saves
  /// now. Does nothing while another save
  /// is in flight.
  pub async fn flush(&self) {
    self.shared.inner.lock().cancel_timer();
    Shared::run_save(&self.shared).await;
  }

  /// Accepts the current draft as saved.
  pub fn reset(&self) {
    let mut inner = self.shared.inner.lock();
    inner.cancel_timer();
    inner.cancel_cooldown();
    inner.saved = inner.draft.clone();
    inner.issued += 1;
    self.shared.publish(SaveState::default());
  }

  /// Teardown: best-effort flush, then stop
  /// applying results.
  #[tracing::instrument(skip(self))]
  pub async fn close(&self) {
    {
      let mut inner = self.shared.inner.lock();
      if !inner.live {
        return;
      }
      inner.cancel_timer();
      inner.cancel_cooldown();
    }

    Shared::run_save(&self.shared).await;

    let mut inner = self.shared.inner.lock();
    inner.live = false;
    inner.cancel_timer();
    inner.cancel_cooldown();
  }
}

impl<T> Drop for AutosaveController<T> {
  fn drop(&mut self) {
    let mut inner = self.shared.inner.lock();
    inner.live = false;
    inner.cancel_timer();
    inner.cancel_cooldown();
  }
}

impl<T> Shared<T>
where
  T: Serialize
    + Clone
    + PartialEq
    + Send
    + 'static
{
  fn publish(&self, state: SaveState) {
    self.state_tx.send_replace(state);
  }

  fn arm_timer(
    self: &Arc<Self>,
    inner: &mut Inner<T>
  ) {
    inner.cancel_timer();
    inner.timer_seq += 1;
    let seq = inner.timer_seq;
    let delay = self.options.debounce;
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
      // Detach so a later re-arm cannot
      // abort the save started below.
      inner.timer = None;
    }
    Self::run_save(&shared).await;
  }

  fn arm_cooldown(
    self: &Arc<Self>,
    inner: &mut Inner<T>
  ) {
    inner.cancel_cooldown();
    let delay = self.options.cooldown;
    let weak = Arc::downgrade(self);
    inner.cooldown = Some(tokio::spawn(
      async move {
        tokio::time::sleep(delay).await;
        let Some(shared) = weak.upgrade()
        else {
          return;
        };
        let mut inner = shared.inner.lock();
        inner.cooldown = None;
        if inner.live
          && shared.state_tx.borrow().status
            == SaveStatus::Saved
        {
          shared.publish(SaveState::default());
        }
      }
    ));
  }

  async fn run_save(self: &Arc<Self>) {
    let (diff, snapshot, version) = {
      let mut inner = self.inner.lock();
      if !inner.live
        || inner.saving
        || inner.draft == inner.saved
      {
        return;
      }

      let diff = match FieldDiff::between(
        &inner.saved,
        &inner.draft
      ) {
        | Ok(diff) => diff,
        | Err(err) => {
          let err = StoreError::backend(err);
          let hook = inner.on_error.clone();
          self.publish(SaveState {
            status: SaveStatus::Error,
            error:  Some(err.to_string())
          });
          drop(inner);
          if let Some(hook) = hook {
            hook(&err);
          }
          return;
        }
      };

      if diff.is_empty() {
        // Only untracked fields moved.
        inner.saved = inner.draft.clone();
        self.publish(SaveState::default());
        return;
      }

      inner.saving = true;
      inner.issued += 1;
      inner.cancel_cooldown();
      self.publish(SaveState::with_status(
        SaveStatus::Saving
      ));
      (diff, inner.draft.clone(), inner.issued)
    };

    debug!(
      version,
      fields = diff.len(),
      "saving draft"
    );
    let result =
      self.persist.persist(diff).await;

    let mut inner = self.inner.lock();
    inner.saving = false;
    if !inner.live {
      return;
    }

    if version != inner.issued {
      debug!(
        version,
        latest = inner.issued,
        landed = result.is_ok(),
        "stale save completion"
      );
      // The backend holds this snapshot even
      // though the draft moved on.
      if result.is_ok() {
        inner.saved = snapshot;
      }
      if inner.draft == inner.saved {
        inner.cancel_timer();
        self.publish(SaveState::default());
      } else {
        self.publish(SaveState::with_status(
          SaveStatus::Dirty
        ));
        if inner.timer.is_none() {
          self.arm_timer(&mut inner);
        }
      }
      return;
    }

    match result {
      | Ok(()) => {
        inner.saved = snapshot;
        self.publish(SaveState::with_status(
          SaveStatus::Saved
        ));
        self.arm_cooldown(&mut inner);
      }
      | Err(err) => {
        warn!(error = %err, "autosave failed");
        self.publish(SaveState {
          status: SaveStatus::Error,
          error:  Some(err.to_string())
        });
        let hook = inner.on_error.clone();
        drop(inner);
        if let Some(hook) = hook {
          hook(&err);
        }
      }
    }
  }
}
