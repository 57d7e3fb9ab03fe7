//! Task scheduler: bounded-concurrency, priority-ordered job runner.
//!
//! A [`Scheduler`] is a cheap, cloneable handle to a single control loop
//! that owns all bookkeeping (queue, records, counters). Handles talk to the
//! loop by message; every job body runs in its own Tokio task (an execution
//! unit) and reports back by message too, so no unit ever touches the
//! scheduler's state.
//!
//! # Concurrency Model
//!
//! - At most N units run at once, N = max(1, min(max_workers, parallelism))
//! - Whenever a slot frees up (completion, failure, panic) the next task is
//!   dequeued immediately
//! - High is served before medium before low; FIFO within a tier
//! - No timeouts: a hung unit holds its slot until [`Scheduler::stop_all`]
//!
//! # Example
//!
//! ```no_run
//! use media_scout_core::scheduler::{Scheduler, SchedulerConfig, TaskPriority, handler_fn};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let scheduler = Scheduler::new(SchedulerConfig::default())?;
//! scheduler.register_job_kind("echo", Arc::new(handler_fn(|request| async move {
//!     Ok(request.payload)
//! })));
//! let id = scheduler.submit("echo", serde_json::json!({"n": 1}), TaskPriority::High, |outcome| {
//!     println!("echo finished: {outcome:?}");
//! })?;
//! scheduler.wait_idle().await;
//! println!("{id}: {:?}", scheduler.task(id).await);
//! # Ok(())
//! # }
//! ```

mod actor;
mod error;
mod queue;
mod task;

pub use error::{ExecutionError, JobError, SchedulingError, TaskError};
pub use task::{
    FnHandler, JobHandler, TaskCallback, TaskId, TaskOutcome, TaskPriority, TaskRequest,
    TaskSnapshot, TaskStatus, handler_fn,
};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, instrument, warn};

use actor::{Actor, Command};
use task::PendingTask;

/// Default upper bound on concurrently executing tasks.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Shared registry of job kinds.
pub(crate) type Registry = Arc<RwLock<HashMap<String, Arc<dyn JobHandler>>>>;

/// Scheduler construction options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Configured maximum number of concurrent units.
    pub max_workers: usize,
    /// Available-parallelism hint; `None` asks the OS.
    pub parallelism_hint: Option<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            parallelism_hint: None,
        }
    }
}

impl SchedulerConfig {
    /// N = max(1, min(max_workers, parallelism)).
    #[must_use]
    pub fn capacity(&self) -> usize {
        let parallelism = self.parallelism_hint.unwrap_or_else(|| {
            std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
        });
        self.max_workers.min(parallelism).max(1)
    }
}

/// Counters reported by [`Scheduler::status`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub queued: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub capacity: usize,
    /// `active / capacity`, between 0 and 1.
    pub utilization: f64,
}

impl SchedulerStatus {
    pub(crate) fn idle(capacity: usize) -> Self {
        Self {
            queued: 0,
            active: 0,
            completed: 0,
            failed: 0,
            capacity,
            utilization: 0.0,
        }
    }

    /// No queued and no active tasks.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.queued == 0 && self.active == 0
    }
}

/// What `stop_all` did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StopReport {
    /// Active units forcibly terminated.
    pub terminated: usize,
    /// Pending tasks failed with a cancellation error.
    pub cancelled: usize,
}

/// Handle to the scheduling loop. Clones share the same loop.
#[derive(Clone)]
pub struct Scheduler {
    commands: mpsc::UnboundedSender<Command>,
    registry: Registry,
    next_id: Arc<AtomicU64>,
    status: watch::Receiver<SchedulerStatus>,
    capacity: usize,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("capacity", &self.capacity)
            .field("status", &*self.status.borrow())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Starts the scheduling loop on the current Tokio runtime.
    ///
    /// The loop stops once every handle has been dropped, terminating any
    /// units still running.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulingError::RuntimeUnavailable`] outside a Tokio runtime.
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulingError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| SchedulingError::RuntimeUnavailable)?;

        let capacity = config.capacity();
        let registry: Registry = Arc::default();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(SchedulerStatus::idle(capacity));

        let actor = Actor::new(capacity, Arc::clone(&registry), status_tx);
        runtime.spawn(actor.run(command_rx));
        debug!(capacity, "scheduler started");

        Ok(Self {
            commands,
            registry,
            next_id: Arc::new(AtomicU64::new(1)),
            status,
            capacity,
        })
    }

    /// Maximum number of concurrently executing tasks.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Associates `kind` with a handler, replacing any previous one.
    pub fn register_job_kind(&self, kind: impl Into<String>, handler: Arc<dyn JobHandler>) {
        let kind = kind.into();
        debug!(kind = %kind, "job kind registered");
        self.registry_write().insert(kind, handler);
    }

    /// Removes a job kind. Queued tasks of that kind fail when dequeued.
    pub fn unregister_job_kind(&self, kind: &str) -> bool {
        self.registry_write().remove(kind).is_some()
    }

    #[must_use]
    pub fn is_registered(&self, kind: &str) -> bool {
        self.registry
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains_key(kind)
    }

    /// Queues a task and returns its id.
    ///
    /// `callback` is invoked exactly once with the task's outcome, except
    /// when the task is withdrawn with [`cancel`](Self::cancel).
    ///
    /// # Errors
    ///
    /// Returns [`SchedulingError`] (after delivering the same error to
    /// `callback`) when `kind` is unregistered or the loop has stopped. The
    /// task is not queued.
    #[instrument(skip_all, fields(kind = %kind, priority = %priority))]
    pub fn submit<F>(
        &self,
        kind: &str,
        payload: Value,
        priority: TaskPriority,
        callback: F,
    ) -> Result<TaskId, SchedulingError>
    where
        F: FnOnce(TaskOutcome) + Send + 'static,
    {
        if !self.is_registered(kind) {
            let error = SchedulingError::unregistered(kind);
            warn!(error = %error, "submission rejected");
            callback(Err(TaskError::Scheduling(error.clone())));
            return Err(error);
        }

        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let task = PendingTask {
            id,
            kind: kind.to_string(),
            payload,
            priority,
            callback: Box::new(callback),
        };

        if let Err(mpsc::error::SendError(command)) = self.commands.send(Command::Submit(task)) {
            if let Command::Submit(task) = command {
                (task.callback)(Err(TaskError::Scheduling(SchedulingError::Closed)));
            }
            return Err(SchedulingError::Closed);
        }

        debug!(task_id = %id, "task submitted");
        Ok(id)
    }

    /// Withdraws a task that is still pending. The callback is dropped
    /// without being called. Returns false once the task has started.
    pub async fn cancel(&self, id: TaskId) -> bool {
        self.request(|reply| Command::Cancel { id, reply })
            .await
            .unwrap_or(false)
    }

    /// Snapshot of a task record, if it is still retained.
    pub async fn task(&self, id: TaskId) -> Option<TaskSnapshot> {
        self.request(|reply| Command::Inspect { id, reply })
            .await
            .flatten()
    }

    /// Evicts terminal records older than `max_age`. Returns how many.
    pub async fn cleanup(&self, max_age: Duration) -> usize {
        self.request(|reply| Command::Cleanup { max_age, reply })
            .await
            .unwrap_or(0)
    }

    /// Terminates every active unit and fails every pending task.
    #[instrument(skip(self))]
    pub async fn stop_all(&self) -> StopReport {
        self.request(|reply| Command::StopAll { reply })
            .await
            .unwrap_or_default()
    }

    /// Counters as of the last event the loop processed.
    #[must_use]
    pub fn status(&self) -> SchedulerStatus {
        *self.status.borrow()
    }

    /// Resolves once nothing is queued or running.
    pub async fn wait_idle(&self) {
        // Every command sent before this point has been applied once the
        // barrier is answered, so the status below reflects them.
        if self.request(|reply| Command::Barrier { reply }).await.is_none() {
            return;
        }
        let mut status = self.status.clone();
        let _ = status.wait_for(SchedulerStatus::is_idle).await;
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Option<T> {
        let (reply, response) = oneshot::channel();
        self.commands.send(build(reply)).ok()?;
        response.await.ok()
    }

    fn registry_write(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<dyn JobHandler>>> {
        self.registry
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_is_bounded_by_parallelism_and_at_least_one() {
        let config = |max_workers, hint| SchedulerConfig {
            max_workers,
            parallelism_hint: Some(hint),
        };
        assert_eq!(config(8, 2).capacity(), 2);
        assert_eq!(config(2, 8).capacity(), 2);
        assert_eq!(config(0, 8).capacity(), 1);
        assert_eq!(config(4, 0).capacity(), 1);
    }

    #[test]
    fn test_new_outside_runtime_fails() {
        assert_eq!(
            Scheduler::new(SchedulerConfig::default()).unwrap_err(),
            SchedulingError::RuntimeUnavailable
        );
    }

    #[tokio::test]
    async fn test_submit_unregistered_kind_is_rejected_synchronously() {
        let scheduler = Scheduler::new(SchedulerConfig::default()).unwrap();
        let (tx, rx) = std::sync::mpsc::channel();

        let result = scheduler.submit("missing", Value::Null, TaskPriority::High, move |outcome| {
            tx.send(outcome).unwrap();
        });

        assert_eq!(result, Err(SchedulingError::unregistered("missing")));
        let delivered = rx.try_recv().unwrap();
        assert_eq!(
            delivered,
            Err(TaskError::Scheduling(SchedulingError::unregistered("missing")))
        );
        assert!(scheduler.status().is_idle());
    }

    #[tokio::test]
    async fn test_status_starts_idle() {
        let scheduler = Scheduler::new(SchedulerConfig {
            max_workers: 3,
            parallelism_hint: Some(16),
        })
        .unwrap();
        let status = scheduler.status();
        assert_eq!(status.capacity, 3);
        assert!(status.is_idle());
        assert!(status.utilization.abs() < f64::EPSILON);
        scheduler.wait_idle().await;
    }
}
