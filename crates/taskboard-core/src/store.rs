use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::debug;

use crate::diff::FieldDiff;
use crate::error::StoreError;
use crate::task::{Task, TaskId};

/// Persistence collaborator. Every call is scoped to the principal the
/// handle was opened for; foreign or missing ids are reported as
/// `NotFoundOrUnauthorized`.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn list(&self) -> Result<Vec<Task>, StoreError>;

    async fn create(&self, task: Task) -> Result<Task, StoreError>;

    /// Merges `diff` into the stored record and returns the result.
    async fn update(&self, id: &TaskId, diff: FieldDiff) -> Result<Task, StoreError>;

    async fn delete(&self, id: &TaskId) -> Result<(), StoreError>;

    async fn find_by_dedup_key(&self, key: &str) -> Result<Option<TaskId>, StoreError>;
}

/// Merges a diff into `task` and stamps `modified`.
pub(crate) fn apply_diff(task: &Task, diff: &FieldDiff) -> Result<Task, StoreError> {
    let mut updated = diff.apply_to(task).map_err(StoreError::backend)?;
    updated.id = task.id.clone();
    updated.created = task.created;
    updated.modified = Utc::now();
    Ok(updated)
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    List,
    Create(TaskId),
    Update(TaskId, FieldDiff),
    Delete(TaskId),
}

#[derive(Debug, Clone)]
struct Record {
    owner: String,
    task: Task,
}

#[derive(Debug, Default)]
struct Shared {
    records: Vec<Record>,
    calls: Vec<StoreCall>,
    failing: HashSet<TaskId>,
    fail_all: Option<String>,
    latency: Option<Duration>,
}

impl Shared {
    fn injected_failure(&self, id: Option<&TaskId>) -> Option<StoreError> {
        if let Some(message) = &self.fail_all {
            return Some(StoreError::Backend(message.clone()));
        }
        let id = id?;
        self.failing
            .contains(id)
            .then(|| StoreError::Backend(format!("injected failure for {id}")))
    }

    fn owned_index(&self, owner: &str, id: &TaskId) -> Result<usize, StoreError> {
        self.records
            .iter()
            .position(|r| r.owner == owner && &r.task.id == id)
            .ok_or_else(|| StoreError::NotFoundOrUnauthorized(id.clone()))
    }
}

/// In-memory store. Handles created with [`MemoryTaskStore::for_owner`]
/// share the same records but only see their own.
#[derive(Debug, Clone)]
pub struct MemoryTaskStore {
    owner: String,
    shared: Arc<Mutex<Shared>>,
}

impl MemoryTaskStore {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            shared: Arc::new(Mutex::new(Shared::default())),
        }
    }

    pub fn with_tasks(owner: impl Into<String>, tasks: Vec<Task>) -> Self {
        let store = Self::new(owner);
        {
            let mut shared = store.shared.lock();
            shared.records = tasks
                .into_iter()
                .map(|task| Record {
                    owner: store.owner.clone(),
                    task,
                })
                .collect();
        }
        store
    }

    pub fn for_owner(&self, owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.shared.lock().calls.clone()
    }

    pub fn update_calls(&self) -> Vec<(TaskId, FieldDiff)> {
        self.shared
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                StoreCall::Update(id, diff) => Some((id.clone(), diff.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.shared.lock().calls.clear();
    }

    /// Snapshot of the caller's records, bypassing the call log.
    pub fn snapshot(&self) -> Vec<Task> {
        self.shared
            .lock()
            .records
            .iter()
            .filter(|r| r.owner == self.owner)
            .map(|r| r.task.clone())
            .collect()
    }

    pub fn fail_on(&self, id: &TaskId) {
        self.shared.lock().failing.insert(id.clone());
    }

    pub fn fail_all(&self, message: impl Into<String>) {
        self.shared.lock().fail_all = Some(message.into());
    }

    pub fn heal(&self) {
        let mut shared = self.shared.lock();
        shared.failing.clear();
        shared.fail_all = None;
    }

    /// Delay applied before every mutating call completes.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.shared.lock().latency = latency;
    }

    async fn simulate_latency(&self) {
        let latency = self.shared.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn list(&self) -> Result<Vec<Task>, StoreError> {
        let mut shared = self.shared.lock();
        shared.calls.push(StoreCall::List);
        if let Some(err) = shared.injected_failure(None) {
            return Err(err);
        }
        Ok(shared
            .records
            .iter()
            .filter(|r| r.owner == self.owner)
            .map(|r| r.task.clone())
            .collect())
    }

    #[tracing::instrument(skip(self, task), fields(owner = %self.owner, id = %task.id))]
    async fn create(&self, task: Task) -> Result<Task, StoreError> {
        self.shared.lock().calls.push(StoreCall::Create(task.id.clone()));
        self.simulate_latency().await;

        let mut shared = self.shared.lock();
        if let Some(err) = shared.injected_failure(Some(&task.id)) {
            return Err(err);
        }
        if shared.records.iter().any(|r| r.task.id == task.id) {
            return Err(StoreError::Backend(format!("duplicate task id {}", task.id)));
        }
        shared.records.push(Record {
            owner: self.owner.clone(),
            task: task.clone(),
        });
        debug!(count = shared.records.len(), "stored task");
        Ok(task)
    }

    #[tracing::instrument(skip(self, diff), fields(owner = %self.owner, fields = diff.len()))]
    async fn update(&self, id: &TaskId, diff: FieldDiff) -> Result<Task, StoreError> {
        self.shared
            .lock()
            .calls
            .push(StoreCall::Update(id.clone(), diff.clone()));
        self.simulate_latency().await;

        let mut shared = self.shared.lock();
        if let Some(err) = shared.injected_failure(Some(id)) {
            return Err(err);
        }
        let idx = shared.owned_index(&self.owner, id)?;
        let updated = apply_diff(&shared.records[idx].task, &diff)?;
        shared.records[idx].task = updated.clone();
        Ok(updated)
    }

    #[tracing::instrument(skip(self), fields(owner = %self.owner))]
    async fn delete(&self, id: &TaskId) -> Result<(), StoreError> {
        self.shared.lock().calls.push(StoreCall::Delete(id.clone()));
        self.simulate_latency().await;

        let mut shared = self.shared.lock();
        if let Some(err) = shared.injected_failure(Some(id)) {
            return Err(err);
        }
        let idx = shared.owned_index(&self.owner, id)?;
        shared.records.remove(idx);
        Ok(())
    }

    async fn find_by_dedup_key(&self, key: &str) -> Result<Option<TaskId>, StoreError> {
        let shared = self.shared.lock();
        Ok(shared
            .records
            .iter()
            .filter(|r| r.owner == self.owner)
            .find(|r| {
                r.task
                    .source
                    .as_ref()
                    .and_then(|source| source.dedup_key.as_deref())
                    == Some(key)
            })
            .map(|r| r.task.id.clone()))
    }
}
