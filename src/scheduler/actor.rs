//! The scheduling loop. Sole owner of queue, records and counters.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use super::error::{ExecutionError, TaskError};
use super::queue::TaskQueue;
use super::task::{PendingTask, TaskCallback, TaskId, TaskOutcome, TaskRequest, TaskSnapshot, TaskStatus};
use super::{Registry, SchedulerStatus, StopReport};

/// Messages from handles to the loop.
pub(crate) enum Command {
    Submit(PendingTask),
    Cancel {
        id: TaskId,
        reply: oneshot::Sender<bool>,
    },
    Inspect {
        id: TaskId,
        reply: oneshot::Sender<Option<TaskSnapshot>>,
    },
    Cleanup {
        max_age: Duration,
        reply: oneshot::Sender<usize>,
    },
    StopAll {
        reply: oneshot::Sender<StopReport>,
    },
    Barrier {
        reply: oneshot::Sender<()>,
    },
}

/// Message from a finished execution unit.
struct Completion {
    id: TaskId,
    outcome: Result<Value, ExecutionError>,
}

struct ActiveUnit {
    callback: TaskCallback,
    abort: AbortHandle,
}

pub(crate) struct Actor {
    capacity: usize,
    registry: Registry,
    status: watch::Sender<SchedulerStatus>,
    queue: TaskQueue,
    active: HashMap<TaskId, ActiveUnit>,
    records: HashMap<TaskId, TaskSnapshot>,
    completed: usize,
    failed: usize,
}

impl Actor {
    pub fn new(capacity: usize, registry: Registry, status: watch::Sender<SchedulerStatus>) -> Self {
        Self {
            capacity,
            registry,
            status,
            queue: TaskQueue::default(),
            active: HashMap::new(),
            records: HashMap::new(),
            completed: 0,
            failed: 0,
        }
    }

    /// Runs until every handle is dropped.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completion>();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(completion) = done_rx.recv() => self.finish(completion),
            }
            self.dispatch(&done_tx);
            self.publish();
        }

        let report = self.stop_all();
        if report.terminated + report.cancelled > 0 {
            info!(
                terminated = report.terminated,
                cancelled = report.cancelled,
                "scheduler dropped with outstanding tasks"
            );
        }
        self.publish();
        debug!("scheduler stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Submit(task) => {
                self.records.insert(
                    task.id,
                    TaskSnapshot {
                        id: task.id,
                        kind: task.kind.clone(),
                        priority: task.priority,
                        status: TaskStatus::Pending,
                        added_at: Instant::now(),
                        started_at: None,
                        completed_at: None,
                        result: None,
                        error: None,
                    },
                );
                self.queue.push(task);
            }
            Command::Cancel { id, reply } => {
                let cancelled = self.queue.remove(id).is_some();
                if cancelled {
                    self.records.remove(&id);
                    debug!(task_id = %id, "pending task cancelled");
                }
                let _ = reply.send(cancelled);
            }
            Command::Inspect { id, reply } => {
                let _ = reply.send(self.records.get(&id).cloned());
            }
            Command::Cleanup { max_age, reply } => {
                let _ = reply.send(self.cleanup(max_age));
            }
            Command::StopAll { reply } => {
                let report = self.stop_all();
                info!(
                    terminated = report.terminated,
                    cancelled = report.cancelled,
                    "all tasks stopped"
                );
                let _ = reply.send(report);
            }
            Command::Barrier { reply } => {
                let _ = reply.send(());
            }
        }
    }

    /// Starts queued tasks while slots are free.
    fn dispatch(&mut self, done_tx: &mpsc::UnboundedSender<Completion>) {
        while self.active.len() < self.capacity {
            let Some(task) = self.queue.pop() else {
                break;
            };
            self.start(task, done_tx);
        }
    }

    fn start(&mut self, task: PendingTask, done_tx: &mpsc::UnboundedSender<Completion>) {
        let PendingTask {
            id,
            kind,
            payload,
            callback,
            ..
        } = task;

        let handler = self
            .registry
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&kind)
            .cloned();

        let Some(handler) = handler else {
            let error = ExecutionError::Unavailable { kind };
            warn!(task_id = %id, error = %error, "task could not be started");
            self.settle(id, Err(error.clone()));
            deliver(id, callback, Err(TaskError::Execution(error)));
            return;
        };

        if let Some(record) = self.records.get_mut(&id) {
            record.status = TaskStatus::Processing;
            record.started_at = Some(Instant::now());
        }
        debug!(task_id = %id, kind = %kind, "task started");

        let request = TaskRequest {
            task_id: id,
            action: kind,
            payload,
        };
        let unit = tokio::spawn(async move { handler.handle(request).await });
        let abort = unit.abort_handle();

        let done = done_tx.clone();
        tokio::spawn(async move {
            let outcome = match unit.await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(error)) => Err(ExecutionError::Job {
                    message: error.message().to_string(),
                }),
                Err(join_error) if join_error.is_panic() => Err(ExecutionError::Panicked),
                Err(_) => Err(ExecutionError::Terminated),
            };
            let _ = done.send(Completion { id, outcome });
        });

        self.active.insert(id, ActiveUnit { callback, abort });
    }

    fn finish(&mut self, completion: Completion) {
        let Completion { id, outcome } = completion;
        // Units already settled by stop_all still report in; ignore them.
        let Some(unit) = self.active.remove(&id) else {
            return;
        };

        match &outcome {
            Ok(_) => debug!(task_id = %id, "task completed"),
            Err(error) => warn!(task_id = %id, error = %error, "task failed"),
        }

        self.settle(id, outcome.clone());
        deliver(id, unit.callback, outcome.map_err(TaskError::Execution));
    }

    /// Moves a record to its terminal state and bumps the counters.
    fn settle(&mut self, id: TaskId, outcome: Result<Value, ExecutionError>) {
        let now = Instant::now();
        let record = self.records.get_mut(&id);
        match outcome {
            Ok(value) => {
                self.completed += 1;
                if let Some(record) = record {
                    record.status = TaskStatus::Completed;
                    record.completed_at = Some(now);
                    record.result = Some(value);
                }
            }
            Err(error) => {
                self.failed += 1;
                if let Some(record) = record {
                    record.status = TaskStatus::Failed;
                    record.completed_at = Some(now);
                    record.error = Some(error.to_string());
                }
            }
        }
    }

    fn stop_all(&mut self) -> StopReport {
        let mut report = StopReport::default();

        let active: Vec<(TaskId, ActiveUnit)> = self.active.drain().collect();
        for (id, unit) in active {
            unit.abort.abort();
            self.settle(id, Err(ExecutionError::Terminated));
            deliver(id, unit.callback, Err(TaskError::Execution(ExecutionError::Terminated)));
            report.terminated += 1;
        }

        for task in self.queue.drain() {
            self.failed += 1;
            if let Some(record) = self.records.get_mut(&task.id) {
                record.status = TaskStatus::Failed;
                record.completed_at = Some(Instant::now());
                record.error = Some(TaskError::Cancelled.to_string());
            }
            deliver(task.id, task.callback, Err(TaskError::Cancelled));
            report.cancelled += 1;
        }

        report
    }

    fn cleanup(&mut self, max_age: Duration) -> usize {
        let now = Instant::now();
        let before = self.records.len();
        self.records.retain(|_, record| {
            let expired = record
                .completed_at
                .is_some_and(|at| now.duration_since(at) >= max_age);
            !(record.status.is_terminal() && expired)
        });
        let evicted = before - self.records.len();
        if evicted > 0 {
            debug!(evicted, "task records cleaned up");
        }
        evicted
    }

    #[allow(clippy::cast_precision_loss)]
    fn publish(&self) {
        let active = self.active.len();
        self.status.send_replace(SchedulerStatus {
            queued: self.queue.len(),
            active,
            completed: self.completed,
            failed: self.failed,
            capacity: self.capacity,
            utilization: active as f64 / self.capacity as f64,
        });
    }
}

/// Invokes a task callback; a panicking callback is logged and contained.
fn deliver(id: TaskId, callback: TaskCallback, outcome: TaskOutcome) {
    if catch_unwind(AssertUnwindSafe(move || callback(outcome))).is_err() {
        warn!(task_id = %id, "task callback panicked");
    }
}
