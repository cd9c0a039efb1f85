use thiserror::Error;

use crate::task::TaskId;

/// Failures reported by a persistence collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
  #[error(
    "task {0} not found or not owned \
     by the current principal"
  )]
  NotFoundOrUnauthorized(TaskId),

  #[error("{0}")]
  Backend(String)
}

impl StoreError {
  pub fn backend(
    err: impl std::fmt::Display
  ) -> Self {
    Self::Backend(err.to_string())
  }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CalendarError {
  #[error("calendar request failed: {0}")]
  Backend(String)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkFailure {
  pub id:      TaskId,
  pub message: String
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BoardError {
  #[error("{field} cannot be empty")]
  Validation { field: &'static str },

  #[error(
    "task {0} not found or not owned \
     by the current principal"
  )]
  NotFoundOrUnauthorized(TaskId),

  #[error("failed to save changes: {message}")]
  Persistence {
    ids:     Vec<TaskId>,
    message: String
  },

  #[error(
    "{} of {} task(s) could not be updated",
    .failures.len(),
    .attempted
  )]
  PartialBulkFailure {
    attempted: usize,
    succeeded: Vec<TaskId>,
    failures:  Vec<BulkFailure>
  },

  #[error(
    "task {0} needs a due date before it \
     can be synced to a calendar"
  )]
  SyncPrecondition(TaskId)
}

impl BoardError {
  pub fn validation(
    field: &'static str
  ) -> Self {
    Self::Validation { field }
  }

  pub(crate) fn from_store(
    ids: Vec<TaskId>,
    err: StoreError
  ) -> Self {
    match err {
      | StoreError::NotFoundOrUnauthorized(id) => {
        Self::NotFoundOrUnauthorized(id)
      }
      | StoreError::Backend(message) => {
        Self::Persistence { ids, message }
      }
    }
  }
}
