//! Task identity, priority, lifecycle and the job-handler seam.

use std::fmt;
use std::future::Future;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{JobError, TaskError};

/// Opaque task identifier; ids increase in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub(crate) u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Dequeue priority. High is always dequeued before medium, medium before low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    High,
    #[default]
    Medium,
    Low,
}

impl TaskPriority {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    /// Queue tier index, 0 being served first.
    pub(crate) fn tier(self) -> usize {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TaskPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            _ => Err(format!("invalid task priority: {s}")),
        }
    }
}

/// Task lifecycle: `pending → processing → {completed, failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a job handler receives: the only data crossing into a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    pub task_id: TaskId,
    pub action: String,
    pub payload: Value,
}

/// Result delivered to a task's callback, exactly once.
pub type TaskOutcome = Result<Value, TaskError>;

/// Completion callback supplied at submission.
pub type TaskCallback = Box<dyn FnOnce(TaskOutcome) + Send + 'static>;

/// Point-in-time view of a task record.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub kind: String,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub added_at: Instant,
    pub started_at: Option<Instant>,
    pub completed_at: Option<Instant>,
    /// Job output, retained for completed tasks until cleanup.
    pub result: Option<Value>,
    /// Failure description for failed tasks.
    pub error: Option<String>,
}

/// A queued task awaiting a free slot.
pub(crate) struct PendingTask {
    pub id: TaskId,
    pub kind: String,
    pub payload: Value,
    pub priority: TaskPriority,
    pub callback: TaskCallback,
}

impl fmt::Debug for PendingTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTask")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Executable body for one job kind.
///
/// This trait uses `async_trait` so handlers can be stored as
/// `Arc<dyn JobHandler>` in the scheduler's registry.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Runs one task. Runs inside its own execution unit; a panic fails only
    /// this task.
    async fn handle(&self, request: TaskRequest) -> Result<Value, JobError>;
}

/// Adapter turning an async closure into a [`JobHandler`].
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> JobHandler for FnHandler<F>
where
    F: Fn(TaskRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, JobError>> + Send + 'static,
{
    async fn handle(&self, request: TaskRequest) -> Result<Value, JobError> {
        (self.0)(request).await
    }
}

/// Wraps `f` as a [`JobHandler`].
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(TaskRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, JobError>> + Send + 'static,
{
    FnHandler(f)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_round_trips_through_str() {
        for priority in [TaskPriority::High, TaskPriority::Medium, TaskPriority::Low] {
            assert_eq!(priority.as_str().parse::<TaskPriority>().unwrap(), priority);
        }
        assert!("urgent".parse::<TaskPriority>().is_err());
        assert_eq!(TaskPriority::default(), TaskPriority::Medium);
    }

    #[test]
    fn test_status_terminal() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Processing.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
    }

    #[test]
    fn test_task_request_serializes_camel_case() {
        let request = TaskRequest {
            task_id: TaskId(3),
            action: "analyze".to_string(),
            payload: serde_json::json!({"url": "https://a.com/x.jpg"}),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["taskId"], 3);
        assert_eq!(json["action"], "analyze");
    }

    #[tokio::test]
    async fn test_handler_fn_adapts_closures() {
        let handler = handler_fn(|request: TaskRequest| async move {
            Ok(serde_json::json!({"echo": request.action}))
        });
        let value = handler
            .handle(TaskRequest {
                task_id: TaskId(1),
                action: "ping".to_string(),
                payload: Value::Null,
            })
            .await
            .unwrap();
        assert_eq!(value["echo"], "ping");
    }
}
