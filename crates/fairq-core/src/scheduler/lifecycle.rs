//! Caller-driven control: pause, resume, cancel, clear and remove.
//!
//! Each call applies to the tasks selected by an optional predicate (or the
//! whole queue), frees the slot of any task it moves out of Running, signals
//! that task's abort token and re-derives the queue status. Dispatch then
//! resumes so freed slots are refilled.

use crate::control::TaskControl;
use crate::error::SchedulerError;
use crate::events::{QueueEvent, SchedulerEvent, TaskEvent};
use crate::model::{Queue, QueueId, QueueStatus, Task, TaskStatus};

use super::budget::SlotBudget;
use super::{Scheduler, State, TaskData, TaskFilter};

fn selected<T>(filter: Option<TaskFilter<'_, T>>, task: &Task<T>) -> bool {
    filter.map_or(true, |f| f(task))
}

/// Give back the slot held by a Running task and tell its executor to stop.
/// The late result of that attempt is discarded by the generation check.
fn vacate<T>(control: &TaskControl, budget: &mut SlotBudget, task_slots: &mut usize, task: &Task<T>) {
    if task.status != TaskStatus::Running {
        return;
    }
    budget.release();
    *task_slots = task_slots.saturating_sub(1);
    control.request_abort(&task.id);
}

type TaskKind<T> = fn(TaskEvent<T>) -> SchedulerEvent<T>;
type QueueKind<T> = fn(QueueEvent) -> SchedulerEvent<T>;

#[derive(Clone, Copy)]
enum Teardown {
    Clear,
    Remove,
}

impl<T: TaskData> Scheduler<T> {
    fn not_found(queue_id: &QueueId) -> SchedulerError {
        SchedulerError::QueueNotFound(queue_id.clone())
    }

    /// Pause Running tasks. Without a predicate the whole queue is paused and
    /// its Pending tasks are no longer dispatched; with one, the queue pauses
    /// once none of its tasks is still Running.
    pub fn pause_task(&self, queue_id: &QueueId, filter: Option<TaskFilter<'_, T>>) -> Result<(), SchedulerError> {
        let mut events = Vec::new();
        {
            let mut state = self.lock();
            let State { queues, budget, .. } = &mut *state;
            let queue = queues.get_mut(queue_id).ok_or_else(|| Self::not_found(queue_id))?;

            let mut paused = 0;
            for task in queue.tasks.iter_mut() {
                if task.status != TaskStatus::Running || !selected(filter, task) {
                    continue;
                }
                vacate(self.control(), budget, &mut queue.task_slots, task);
                if task.transition(TaskStatus::Paused) {
                    paused += 1;
                    events.push(SchedulerEvent::for_task(SchedulerEvent::TaskPaused, &queue.id, task));
                }
            }

            let rederive = filter.is_none() || (paused > 0 && queue.count(TaskStatus::Running) == 0);
            if rederive
                && matches!(queue.status, QueueStatus::Pending | QueueStatus::Running)
                && queue.set_status(QueueStatus::Paused)
            {
                tracing::info!(queue_id = %queue.id, paused, "queue paused");
                events.push(SchedulerEvent::for_queue(SchedulerEvent::QueuePaused, &queue.id));
            }
        }
        self.emit_all(events);
        self.process();
        Ok(())
    }

    /// Move Paused tasks back to Pending. A Paused queue returns to Pending
    /// (and is promoted again by the dispatcher) once none of its tasks is
    /// still Paused.
    pub fn resume_task(&self, queue_id: &QueueId, filter: Option<TaskFilter<'_, T>>) -> Result<(), SchedulerError> {
        let mut events = Vec::new();
        {
            let mut state = self.lock();
            let queue = state
                .queues
                .get_mut(queue_id)
                .ok_or_else(|| Self::not_found(queue_id))?;

            let mut resumed = 0;
            for task in queue.tasks.iter_mut() {
                if task.status != TaskStatus::Paused || !selected(filter, task) {
                    continue;
                }
                if task.transition(TaskStatus::Pending) {
                    resumed += 1;
                    events.push(SchedulerEvent::for_task(SchedulerEvent::TaskResumed, &queue.id, task));
                }
            }

            let rederive = filter.is_none() || (resumed > 0 && queue.count(TaskStatus::Paused) == 0);
            if rederive && queue.status == QueueStatus::Paused && queue.set_status(QueueStatus::Pending) {
                tracing::info!(queue_id = %queue.id, resumed, "queue resumed");
                events.push(SchedulerEvent::for_queue(SchedulerEvent::QueueResumed, &queue.id));
            }
        }
        self.emit_all(events);
        self.process();
        Ok(())
    }

    /// Cancel Pending, Running and Paused tasks. The queue is cancelled when
    /// no predicate is given or when no active task remains.
    pub fn cancel_task(&self, queue_id: &QueueId, filter: Option<TaskFilter<'_, T>>) -> Result<(), SchedulerError> {
        let mut events = Vec::new();
        {
            let mut state = self.lock();
            let State { queues, budget, .. } = &mut *state;
            let queue = queues.get_mut(queue_id).ok_or_else(|| Self::not_found(queue_id))?;

            let mut cancelled = 0;
            for task in queue.tasks.iter_mut() {
                if !task.status.is_active() || !selected(filter, task) {
                    continue;
                }
                vacate(self.control(), budget, &mut queue.task_slots, task);
                if task.transition(TaskStatus::Cancelled) {
                    cancelled += 1;
                    events.push(SchedulerEvent::for_task(SchedulerEvent::TaskCancelled, &queue.id, task));
                }
            }

            let rederive = filter.is_none() || (cancelled > 0 && !queue.has_active());
            if rederive && queue.set_status(QueueStatus::Cancelled) {
                tracing::info!(queue_id = %queue.id, cancelled, "queue cancelled");
                events.push(SchedulerEvent::for_queue(SchedulerEvent::QueueCancelled, &queue.id));
            }
        }
        self.emit_all(events);
        self.process();
        Ok(())
    }

    /// Drop the selected active tasks (cancelling them first). Without a
    /// predicate every task goes and the queue is deleted; with one, the
    /// queue is deleted once it holds no task at all.
    pub fn clear_queue(&self, queue_id: &QueueId, filter: Option<TaskFilter<'_, T>>) -> Result<(), SchedulerError> {
        self.teardown(queue_id, filter, Teardown::Clear)
    }

    /// Drop the selected tasks whatever their status, cancelling active ones.
    /// Without a predicate, or once no task remains, the queue is deleted.
    pub fn remove_task(&self, queue_id: &QueueId, filter: Option<TaskFilter<'_, T>>) -> Result<(), SchedulerError> {
        self.teardown(queue_id, filter, Teardown::Remove)
    }

    fn teardown(
        &self,
        queue_id: &QueueId,
        filter: Option<TaskFilter<'_, T>>,
        mode: Teardown,
    ) -> Result<(), SchedulerError> {
        let (task_event, queue_event): (TaskKind<T>, QueueKind<T>) = match mode {
            Teardown::Clear => (SchedulerEvent::TaskCleared, SchedulerEvent::QueueCleared),
            Teardown::Remove => (SchedulerEvent::TaskRemoved, SchedulerEvent::QueueRemoved),
        };
        let mut events = Vec::new();
        {
            let mut state = self.lock();
            let State { queues, budget, .. } = &mut *state;
            let queue: &mut Queue<T> = queues.get_mut(queue_id).ok_or_else(|| Self::not_found(queue_id))?;

            let tasks = std::mem::take(&mut queue.tasks);
            for mut task in tasks {
                let take = match (mode, filter) {
                    (_, None) => true,
                    (Teardown::Clear, Some(f)) => task.status.is_active() && f(&task),
                    (Teardown::Remove, Some(f)) => f(&task),
                };
                if !take {
                    queue.tasks.push(task);
                    continue;
                }
                vacate(self.control(), budget, &mut queue.task_slots, &task);
                if task.status.is_active() {
                    task.transition(TaskStatus::Cancelled);
                }
                events.push(SchedulerEvent::for_task(task_event, &queue.id, &task));
            }

            if filter.is_none() || queue.tasks.is_empty() {
                queues.shift_remove(queue_id);
                tracing::info!(queue_id = %queue_id, "queue deleted");
                events.push(SchedulerEvent::for_queue(queue_event, queue_id));
            }
        }
        self.emit_all(events);
        self.process();
        Ok(())
    }
}
