//! Error types for the task scheduler.

use thiserror::Error;

/// Submission-time failures; the task is never queued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulingError {
    /// No handler is registered for the task kind.
    #[error("no handler registered for job kind '{kind}'")]
    UnregisteredKind { kind: String },

    /// The scheduler loop has shut down.
    #[error("scheduler is not running")]
    Closed,

    /// No Tokio runtime was available to host the scheduler.
    #[error("scheduler requires a running Tokio runtime")]
    RuntimeUnavailable,
}

impl SchedulingError {
    pub fn unregistered(kind: impl Into<String>) -> Self {
        Self::UnregisteredKind { kind: kind.into() }
    }
}

/// Failures of a task that was dequeued for execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// The job body returned an error.
    #[error("job failed: {message}")]
    Job { message: String },

    /// The job body panicked.
    #[error("job panicked")]
    Panicked,

    /// The execution unit was forcibly terminated by `stop_all`.
    #[error("job terminated")]
    Terminated,

    /// The unit could not be started (its handler is gone).
    #[error("no execution unit available for job kind '{kind}'")]
    Unavailable { kind: String },
}

/// Error reported by a job handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct JobError {
    message: String,
}

impl JobError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<serde_json::Error> for JobError {
    fn from(error: serde_json::Error) -> Self {
        Self::new(format!("invalid job payload: {error}"))
    }
}

/// The failure delivered to a task's callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error(transparent)]
    Scheduling(#[from] SchedulingError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// The task was still pending when `stop_all` ran.
    #[error("task cancelled before it started")]
    Cancelled,
}
