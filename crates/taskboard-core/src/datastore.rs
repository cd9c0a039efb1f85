use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use uuid::Uuid;

use crate::calendar::{CalendarClient, EventDetails};
use crate::diff::FieldDiff;
use crate::error::{CalendarError, StoreError};
use crate::store::{TaskStore, apply_diff};
use crate::task::{Task, TaskId};

const TASKS_FILE: &str = "tasks.data";
const EVENTS_FILE: &str = "events.data";

/// File-backed [`TaskStore`]: one JSON record per line, rewritten
/// atomically on every mutation.
#[derive(Debug)]
pub struct JsonlTaskStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
    owner: String,
    write_lock: Mutex<()>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    owner: String,
    task: Task,
}

impl JsonlTaskStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path, owner: &str) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let tasks_path = data_dir.join(TASKS_FILE);
        if !tasks_path.exists() {
            fs::write(&tasks_path, "")?;
        }

        info!(
            data_dir = %data_dir.display(),
            tasks = %tasks_path.display(),
            owner,
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            tasks_path,
            owner: owner.to_string(),
            write_lock: Mutex::new(()),
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    fn load(&self) -> Result<Vec<StoredRecord>, StoreError> {
        load_jsonl(&self.tasks_path)
            .context("failed to load tasks.data")
            .map_err(|err| StoreError::backend(format!("{err:#}")))
    }

    fn save(&self, records: &[StoredRecord]) -> Result<(), StoreError> {
        save_jsonl_atomic(&self.tasks_path, records)
            .context("failed to save tasks.data")
            .map_err(|err| StoreError::backend(format!("{err:#}")))
    }

    fn owned_index(&self, records: &[StoredRecord], id: &TaskId) -> Result<usize, StoreError> {
        records
            .iter()
            .position(|r| r.owner == self.owner && &r.task.id == id)
            .ok_or_else(|| StoreError::NotFoundOrUnauthorized(id.clone()))
    }
}

#[async_trait]
impl TaskStore for JsonlTaskStore {
    #[tracing::instrument(skip(self))]
    async fn list(&self) -> Result<Vec<Task>, StoreError> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|r| r.owner == self.owner)
            .map(|r| r.task)
            .collect())
    }

    #[tracing::instrument(skip(self, task), fields(id = %task.id))]
    async fn create(&self, task: Task) -> Result<Task, StoreError> {
        let _guard = self.write_lock.lock();
        let mut records = self.load()?;
        if records.iter().any(|r| r.task.id == task.id) {
            return Err(StoreError::Backend(format!("duplicate task id {}", task.id)));
        }
        records.push(StoredRecord {
            owner: self.owner.clone(),
            task: task.clone(),
        });
        self.save(&records)?;
        Ok(task)
    }

    #[tracing::instrument(skip(self, diff), fields(fields = diff.len()))]
    async fn update(&self, id: &TaskId, diff: FieldDiff) -> Result<Task, StoreError> {
        let _guard = self.write_lock.lock();
        let mut records = self.load()?;
        let idx = self.owned_index(&records, id)?;
        let updated = apply_diff(&records[idx].task, &diff)?;
        records[idx].task = updated.clone();
        self.save(&records)?;
        Ok(updated)
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, id: &TaskId) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let mut records = self.load()?;
        let idx = self.owned_index(&records, id)?;
        records.remove(idx);
        self.save(&records)
    }

    async fn find_by_dedup_key(&self, key: &str) -> Result<Option<TaskId>, StoreError> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|r| r.owner == self.owner)
            .find(|r| {
                r.task
                    .source
                    .as_ref()
                    .and_then(|source| source.dedup_key.as_deref())
                    == Some(key)
            })
            .map(|r| r.task.id))
    }
}

/// File-backed [`CalendarClient`] for the local CLI. Events live next to
/// the tasks in `events.data`.
#[derive(Debug)]
pub struct JsonlCalendar {
    pub events_path: PathBuf,
    write_lock: Mutex<()>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEvent {
    calendar_id: String,
    event_id: String,
    details: EventDetails,
}

impl JsonlCalendar {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let events_path = data_dir.join(EVENTS_FILE);
        if !events_path.exists() {
            fs::write(&events_path, "")?;
        }
        info!(events = %events_path.display(), "opened calendar");

        Ok(Self {
            events_path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn events(&self) -> anyhow::Result<Vec<(String, EventDetails)>> {
        Ok(load_jsonl::<StoredEvent>(&self.events_path)?
            .into_iter()
            .map(|e| (e.event_id, e.details))
            .collect())
    }

    fn load(&self) -> Result<Vec<StoredEvent>, CalendarError> {
        load_jsonl(&self.events_path)
            .context("failed to load events.data")
            .map_err(|err| CalendarError::Backend(format!("{err:#}")))
    }

    fn save(&self, events: &[StoredEvent]) -> Result<(), CalendarError> {
        save_jsonl_atomic(&self.events_path, events)
            .context("failed to save events.data")
            .map_err(|err| CalendarError::Backend(format!("{err:#}")))
    }
}

fn same_event(event: &StoredEvent, calendar_id: &str, event_id: &str) -> bool {
    event.calendar_id == calendar_id && event.event_id == event_id
}

#[async_trait]
impl CalendarClient for JsonlCalendar {
    #[tracing::instrument(skip(self, details))]
    async fn create_event(
        &self,
        calendar_id: &str,
        details: &EventDetails,
    ) -> Result<String, CalendarError> {
        let _guard = self.write_lock.lock();
        let mut events = self.load()?;
        let event_id = format!("evt-{}", Uuid::new_v4().simple());
        events.push(StoredEvent {
            calendar_id: calendar_id.to_string(),
            event_id: event_id.clone(),
            details: details.clone(),
        });
        self.save(&events)?;
        Ok(event_id)
    }

    #[tracing::instrument(skip(self, details))]
    async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        details: &EventDetails,
    ) -> Result<(), CalendarError> {
        let _guard = self.write_lock.lock();
        let mut events = self.load()?;
        match events
            .iter_mut()
            .find(|e| same_event(e, calendar_id, event_id))
        {
            Some(event) => event.details = details.clone(),
            None => {
                debug!("update of missing event ignored");
                return Ok(());
            }
        }
        self.save(&events)
    }

    #[tracing::instrument(skip(self))]
    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<(), CalendarError> {
        let _guard = self.write_lock.lock();
        let mut events = self.load()?;
        let before = events.len();
        events.retain(|e| !same_event(e, calendar_id, event_id));
        if events.len() == before {
            debug!("delete of missing event ignored");
            return Ok(());
        }
        self.save(&events)
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let record: T = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(record);
    }

    debug!(count = out.len(), "loaded records from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, records))]
fn save_jsonl_atomic<T: Serialize>(path: &Path, records: &[T]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = records.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for record in records {
        let serialized = serde_json::to_string(record)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::task::{Status, TaskDraft};

    #[tokio::test]
    async fn records_survive_reopen_and_stay_owner_scoped() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlTaskStore::open(dir.path(), "alice").unwrap();

        let task = Task::from_draft(TaskDraft::titled("Renew passport"), Utc::now()).unwrap();
        store.create(task.clone()).await.unwrap();
        store
            .update(&task.id, FieldDiff::single("status", Status::Done).unwrap())
            .await
            .unwrap();

        let reopened = JsonlTaskStore::open(dir.path(), "alice").unwrap();
        let listed = reopened.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, Status::Done);

        let other = JsonlTaskStore::open(dir.path(), "bob").unwrap();
        assert!(other.list().await.unwrap().is_empty());
        assert_eq!(
            other.delete(&task.id).await.unwrap_err(),
            StoreError::NotFoundOrUnauthorized(task.id.clone())
        );
    }

    #[tokio::test]
    async fn legacy_string_labels_are_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlTaskStore::open(dir.path(), "alice").unwrap();
        let line = r#"{"owner":"alice","task":{"id":"t1","title":"Old","status":"pending","labels":["Home",{"id":"l1","name":"Work","color":"red"}],"created":"2025-01-01T00:00:00Z","modified":"2025-01-01T00:00:00Z"}}"#;
        fs::write(&store.tasks_path, format!("{line}\n")).unwrap();

        let tasks = store.list().await.unwrap();
        let names: Vec<&str> = tasks[0].labels.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["Home", "Work"]);
    }

    #[tokio::test]
    async fn calendar_events_persist_until_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let calendar = JsonlCalendar::open(dir.path()).unwrap();
        let details = EventDetails {
            title: "Dentist".to_string(),
            description: String::new(),
            due: chrono::NaiveDate::from_ymd_opt(2026, 6, 3).unwrap(),
        };
        let id = calendar.create_event("primary", &details).await.unwrap();

        let moved = EventDetails {
            title: "Dentist 10am".to_string(),
            ..details
        };
        let reopened = JsonlCalendar::open(dir.path()).unwrap();
        reopened.update_event("primary", &id, &moved).await.unwrap();
        assert_eq!(reopened.events().unwrap(), vec![(id.clone(), moved)]);

        reopened.delete_event("work", &id).await.unwrap();
        assert_eq!(reopened.events().unwrap().len(), 1);
        reopened.delete_event("primary", &id).await.unwrap();
        reopened.delete_event("primary", &id).await.unwrap();
        assert!(reopened.events().unwrap().is_empty());
    }
}
