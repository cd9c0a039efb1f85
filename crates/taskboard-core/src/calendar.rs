use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CalendarError;

/// Fields mirrored into an external calendar event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDetails {
    pub title: String,
    pub description: String,
    pub due: NaiveDate,
}

/// External calendar collaborator. Updating or deleting an event that no
/// longer exists must succeed without effect.
#[async_trait]
pub trait CalendarClient: Send + Sync {
    async fn create_event(
        &self,
        calendar_id: &str,
        details: &EventDetails,
    ) -> Result<String, CalendarError>;

    async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        details: &EventDetails,
    ) -> Result<(), CalendarError>;

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<(), CalendarError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarCall {
    Create {
        calendar_id: String,
        details: EventDetails,
    },
    Update {
        calendar_id: String,
        event_id: String,
        details: EventDetails,
    },
    Delete {
        calendar_id: String,
        event_id: String,
    },
}

#[derive(Debug, Default)]
struct CalendarState {
    events: BTreeMap<(String, String), EventDetails>,
    calls: Vec<CalendarCall>,
    failure: Option<String>,
    next_id: u64,
}

impl CalendarState {
    fn check(&self) -> Result<(), CalendarError> {
        match &self.failure {
            Some(message) => Err(CalendarError::Backend(message.clone())),
            None => Ok(()),
        }
    }
}

/// In-process calendar that records every request.
#[derive(Debug, Clone, Default)]
pub struct MemoryCalendar {
    state: Arc<Mutex<CalendarState>>,
}

impl MemoryCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<CalendarCall> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    pub fn event(&self, calendar_id: &str, event_id: &str) -> Option<EventDetails> {
        self.state
            .lock()
            .events
            .get(&(calendar_id.to_string(), event_id.to_string()))
            .cloned()
    }

    pub fn event_count(&self) -> usize {
        self.state.lock().events.len()
    }

    pub fn fail_with(&self, message: impl Into<String>) {
        self.state.lock().failure = Some(message.into());
    }

    pub fn heal(&self) {
        self.state.lock().failure = None;
    }
}

#[async_trait]
impl CalendarClient for MemoryCalendar {
    async fn create_event(
        &self,
        calendar_id: &str,
        details: &EventDetails,
    ) -> Result<String, CalendarError> {
        let mut state = self.state.lock();
        state.calls.push(CalendarCall::Create {
            calendar_id: calendar_id.to_string(),
            details: details.clone(),
        });
        state.check()?;

        state.next_id += 1;
        let event_id = format!("evt-{}", state.next_id);
        state
            .events
            .insert((calendar_id.to_string(), event_id.clone()), details.clone());
        debug!(calendar_id, event_id = %event_id, "created calendar event");
        Ok(event_id)
    }

    async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        details: &EventDetails,
    ) -> Result<(), CalendarError> {
        let mut state = self.state.lock();
        state.calls.push(CalendarCall::Update {
            calendar_id: calendar_id.to_string(),
            event_id: event_id.to_string(),
            details: details.clone(),
        });
        state.check()?;

        let key = (calendar_id.to_string(), event_id.to_string());
        match state.events.get_mut(&key) {
            Some(event) => *event = details.clone(),
            None => debug!(calendar_id, event_id, "update of missing event ignored"),
        }
        Ok(())
    }

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<(), CalendarError> {
        let mut state = self.state.lock();
        state.calls.push(CalendarCall::Delete {
            calendar_id: calendar_id.to_string(),
            event_id: event_id.to_string(),
        });
        state.check()?;

        let key = (calendar_id.to_string(), event_id.to_string());
        if state.events.remove(&key).is_none() {
            debug!(calendar_id, event_id, "delete of missing event ignored");
        }
        Ok(())
    }
}
