//! Three-tier FIFO priority queue.

use std::collections::VecDeque;

use super::task::{PendingTask, TaskId};

/// Pending tasks, strict priority across tiers and FIFO within a tier.
#[derive(Debug, Default)]
pub(crate) struct TaskQueue {
    tiers: [VecDeque<PendingTask>; 3],
}

impl TaskQueue {
    pub fn push(&mut self, task: PendingTask) {
        self.tiers[task.priority.tier()].push_back(task);
    }

    /// Next task: oldest of the highest non-empty tier.
    pub fn pop(&mut self) -> Option<PendingTask> {
        self.tiers.iter_mut().find_map(VecDeque::pop_front)
    }

    /// Removes a pending task by id.
    pub fn remove(&mut self, id: TaskId) -> Option<PendingTask> {
        for tier in &mut self.tiers {
            if let Some(position) = tier.iter().position(|task| task.id == id) {
                return tier.remove(position);
            }
        }
        None
    }

    /// Empties the queue, highest priority first.
    pub fn drain(&mut self) -> Vec<PendingTask> {
        self.tiers
            .iter_mut()
            .flat_map(|tier| tier.drain(..))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tiers.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.iter().all(VecDeque::is_empty)
    }
}
