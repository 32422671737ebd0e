//! Execution context handed to executors.

use serde_json::{Map, Value};

use crate::control::AbortToken;
use crate::events::{SchedulerEvent, TaskDataUpdated};
use crate::model::{QueueId, TaskId, TaskStatus};

use super::{Scheduler, TaskData};

/// Shallow merge of a partial value into task data.
pub trait MergeData {
    type Partial;

    fn merge(&mut self, partial: Self::Partial);
}

impl MergeData for Value {
    type Partial = Map<String, Value>;

    /// Objects take the partial's keys; any other value is replaced by the
    /// partial object.
    fn merge(&mut self, partial: Map<String, Value>) {
        match self {
            Value::Object(map) => map.extend(partial),
            other => *other = Value::Object(partial),
        }
    }
}

impl MergeData for Map<String, Value> {
    type Partial = Map<String, Value>;

    fn merge(&mut self, partial: Map<String, Value>) {
        self.extend(partial);
    }
}

/// Per-attempt handle given to an executor alongside the task data.
///
/// Updates only reach the live task while this attempt is still the one the
/// scheduler counts as running.
pub struct TaskContext<T: TaskData> {
    scheduler: Scheduler<T>,
    queue_id: QueueId,
    task_id: TaskId,
    attempt: u64,
    abort: AbortToken,
    initial: T,
}

impl<T: TaskData> TaskContext<T> {
    pub(crate) fn new(
        scheduler: Scheduler<T>,
        queue_id: QueueId,
        task_id: TaskId,
        attempt: u64,
        abort: AbortToken,
        initial: T,
    ) -> Self {
        Self {
            scheduler,
            queue_id,
            task_id,
            attempt,
            abort,
            initial,
        }
    }

    pub fn queue_id(&self) -> &QueueId {
        &self.queue_id
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// 1-based dispatch number of this attempt.
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// Current task data, including updates made so far. Falls back to the
    /// data this attempt started with once the task is gone.
    pub fn data(&self) -> T {
        self.scheduler
            .with_task(&self.queue_id, &self.task_id, |task| task.data.clone())
            .unwrap_or_else(|| self.initial.clone())
    }

    /// True once the scheduler paused, cancelled, cleared or removed the task.
    pub fn is_aborted(&self) -> bool {
        self.abort.is_aborted()
    }

    pub fn abort_token(&self) -> AbortToken {
        self.abort.clone()
    }

    /// Merge `partial` into the live task data and emit `TaskDataUpdated`.
    pub fn update_task_data(&self, partial: <T as MergeData>::Partial) -> bool
    where
        T: MergeData,
    {
        self.modify_task_data(|data| data.merge(partial))
    }

    /// Mutate the live task data in place and emit `TaskDataUpdated`.
    /// Returns false if this attempt no longer owns the task.
    pub fn modify_task_data<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut T),
    {
        let attempt = self.attempt;
        let event = self.scheduler.with_task_mut(&self.queue_id, &self.task_id, |task| {
            if task.attempt != attempt || task.status != TaskStatus::Running {
                return None;
            }
            f(&mut task.data);
            task.updated_at = tokio::time::Instant::now();
            Some(SchedulerEvent::TaskDataUpdated(TaskDataUpdated {
                queue_id: self.queue_id.clone(),
                data: task.data.clone(),
                task: task.clone(),
            }))
        });
        match event.flatten() {
            Some(event) => {
                self.scheduler.emit_all(vec![event]);
                true
            }
            None => false,
        }
    }
}
