//! Queue creation and the max-queue-size admission check.

use uuid::Uuid;

use crate::error::SchedulerError;
use crate::events::SchedulerEvent;
use crate::model::{
    Queue, QueueId, QueueOptions, Task, TaskId, DEFAULT_MAX_RETRIES, DEFAULT_PRIORITY,
};

use super::{Scheduler, State, TaskData};

fn generate_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

fn effective_priority(options: &QueueOptions) -> f64 {
    match options.priority {
        Some(p) if p.is_finite() && p > 0.0 => p,
        Some(p) => {
            tracing::warn!(priority = p, "ignoring non-positive queue priority");
            DEFAULT_PRIORITY
        }
        None => DEFAULT_PRIORITY,
    }
}

/// Check the combined size of every queue plus `requested` new tasks
/// against `max_queue_size`.
fn admit<T>(
    state: &State<T>,
    max: Option<usize>,
    queue_id: &QueueId,
    requested: usize,
) -> Result<(), SchedulerError> {
    let Some(max) = max else {
        return Ok(());
    };
    let current = state.total_tasks();
    if current + requested >= max {
        return Err(SchedulerError::QueueFull {
            queue_id: queue_id.clone(),
            requested,
            current,
            max,
        });
    }
    Ok(())
}

impl<T: TaskData> Scheduler<T> {
    /// Create a queue of Pending tasks from `items` and, with `auto_start`,
    /// start dispatching it.
    ///
    /// Fails with `QueueFull` (and emits `QueueFull`) without touching any
    /// state when the new total would reach `max_queue_size`.
    pub fn add_queue(
        &self,
        task_type: &str,
        items: Vec<T>,
        options: QueueOptions,
    ) -> Result<QueueId, SchedulerError> {
        let mut ids = self.insert_queues(task_type, vec![items], &options, false)?;
        Ok(ids.remove(0))
    }

    /// Batched `add_queue`: one queue per inner vector. Admission is checked
    /// once for the whole batch. An explicit `options.id` gets an `_{index}`
    /// suffix per queue.
    pub fn add_queues(
        &self,
        task_type: &str,
        batches: Vec<Vec<T>>,
        options: QueueOptions,
    ) -> Result<Vec<QueueId>, SchedulerError> {
        if batches.is_empty() {
            return Ok(Vec::new());
        }
        self.insert_queues(task_type, batches, &options, true)
    }

    fn insert_queues(
        &self,
        task_type: &str,
        batches: Vec<Vec<T>>,
        options: &QueueOptions,
        suffix_ids: bool,
    ) -> Result<Vec<QueueId>, SchedulerError> {
        let ids: Vec<QueueId> = (0..batches.len())
            .map(|i| match &options.id {
                Some(id) if suffix_ids => QueueId(format!("{id}_{i}")),
                Some(id) => QueueId(id.clone()),
                None => QueueId(generate_id(task_type)),
            })
            .collect();
        let requested: usize = batches.iter().map(Vec::len).sum();

        let admitted = {
            let mut state = self.lock();
            let check = admit(&state, self.config().size_limit(), &ids[0], requested);
            if check.is_ok() {
                if let Some(dup) = ids.iter().find(|id| state.queues.contains_key(*id)) {
                    return Err(SchedulerError::DuplicateQueue(dup.clone()));
                }
                let max_retries = options.max_retries.unwrap_or(DEFAULT_MAX_RETRIES);
                let priority = effective_priority(options);
                for (id, items) in ids.iter().zip(batches) {
                    let tasks = items
                        .into_iter()
                        .map(|data| {
                            let task_id = TaskId(generate_id(&format!("{task_type}_task")));
                            Task::new(task_id, data, max_retries)
                        })
                        .collect();
                    let mut queue = Queue::new(id.clone(), task_type.to_string(), tasks, priority);
                    queue.metadata = options.metadata.clone();
                    tracing::info!(
                        queue_id = %id,
                        task_type,
                        tasks = queue.tasks.len(),
                        priority,
                        "queue added"
                    );
                    state.queues.insert(id.clone(), queue);
                }
            }
            check
        };

        if let Err(e) = admitted {
            tracing::warn!(queue_id = %ids[0], "{}", e);
            self.emit_all(vec![SchedulerEvent::for_queue(SchedulerEvent::QueueFull, &ids[0])]);
            return Err(e);
        }

        if self.config().auto_start {
            for id in &ids {
                // A queue over the running-queue cap stays Pending; the
                // dispatcher promotes it once a running queue finishes.
                if let Err(e) = self.start(Some(id)) {
                    tracing::debug!(queue_id = %id, "auto start skipped: {}", e);
                }
            }
        }
        Ok(ids)
    }
}
