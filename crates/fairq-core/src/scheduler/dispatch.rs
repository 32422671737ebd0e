//! Dispatch loop: queue promotion, slot allocation and settling attempts.
//!
//! `process` is an explicit loop rather than self-recursion: each pass
//! recomputes the fair-share choice under the lock, and every settled
//! attempt re-enters the loop from its own spawned task.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::time::Instant;

use crate::control::AbortToken;
use crate::error::SchedulerError;
use crate::events::{QueueDrained, SchedulerEvent, TaskFailed, TaskRetry};
use crate::model::{QueueId, QueueStatus, TaskId, TaskStatus};
use crate::retry::RetryDecision;

use super::choose::rank_running_queues;
use super::context::TaskContext;
use super::{Scheduler, State, TaskData};

/// One task handed from the locked bookkeeping to an executor.
struct Dispatch<T> {
    queue_id: QueueId,
    task_id: TaskId,
    task_type: String,
    data: T,
    attempt: u64,
    abort: AbortToken,
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl<T: TaskData> Scheduler<T> {
    /// Promote a Pending queue to Running (the named one, or the first
    /// Pending queue) unless `max_queue_concurrent` queues already run, then
    /// fill free slots. Returns whether a queue was promoted.
    pub fn start(&self, queue_id: Option<&QueueId>) -> Result<bool, SchedulerError> {
        let mut events = Vec::new();
        let promoted = {
            let mut state = self.lock();
            let target = match queue_id {
                Some(id) => Some(
                    state
                        .queues
                        .get_index_of(id)
                        .ok_or_else(|| SchedulerError::QueueNotFound(id.clone()))?,
                ),
                None => state
                    .queues
                    .values()
                    .position(|q| q.status == QueueStatus::Pending),
            };
            let at_limit = self
                .config()
                .queue_limit()
                .map_or(false, |limit| state.running_queues() >= limit);
            match target.and_then(|i| state.queues.get_index_mut(i)) {
                Some((_, queue)) if queue.status == QueueStatus::Pending => {
                    if at_limit {
                        tracing::debug!(queue_id = %queue.id, "queue concurrency limit reached; queue stays pending");
                        false
                    } else {
                        queue.set_status(QueueStatus::Running);
                        tracing::info!(queue_id = %queue.id, "queue started");
                        events.push(SchedulerEvent::for_queue(SchedulerEvent::QueueStarted, &queue.id));
                        true
                    }
                }
                _ => false,
            }
        };
        self.emit_all(events);
        self.process();
        Ok(promoted)
    }

    /// Dispatch ready tasks until capacity or ready work runs out.
    pub(crate) fn process(&self) {
        let Ok(handle) = Handle::try_current() else {
            tracing::warn!("no tokio runtime; dispatch deferred");
            return;
        };
        loop {
            let (events, next) = {
                let mut state = self.lock();
                self.next_dispatch(&mut state)
            };
            self.emit_all(events);
            match next {
                Some(job) => self.spawn_attempt(&handle, job),
                None => break,
            }
        }
    }

    /// Move Pending queues to Running in insertion order while the
    /// running-queue cap allows.
    fn promote_pending(&self, state: &mut State<T>, events: &mut Vec<SchedulerEvent<T>>) {
        let limit = self.config().queue_limit();
        let mut running = state.running_queues();
        for queue in state.queues.values_mut() {
            if limit.map_or(false, |l| running >= l) {
                break;
            }
            if queue.status == QueueStatus::Pending && queue.set_status(QueueStatus::Running) {
                running += 1;
                tracing::info!(queue_id = %queue.id, "queue started");
                events.push(SchedulerEvent::for_queue(SchedulerEvent::QueueStarted, &queue.id));
            }
        }
    }

    /// Re-derive Running queues that can no longer dispatch. A queue with no
    /// pending, running or paused task is Completed; one whose only active
    /// tasks are Paused is Paused. Returns whether any queue gave up its
    /// running-queue slot.
    fn sweep_running(&self, state: &mut State<T>, events: &mut Vec<SchedulerEvent<T>>) -> bool {
        let mut any = false;
        for queue in state.queues.values_mut() {
            if queue.status != QueueStatus::Running {
                continue;
            }
            if queue.has_active() {
                if !queue.has_pending()
                    && queue.count(TaskStatus::Running) == 0
                    && queue.set_status(QueueStatus::Paused)
                {
                    any = true;
                    tracing::info!(queue_id = %queue.id, "queue paused: only paused tasks remain");
                    events.push(SchedulerEvent::for_queue(SchedulerEvent::QueuePaused, &queue.id));
                }
                continue;
            }
            if queue.set_status(QueueStatus::Completed) {
                any = true;
                tracing::info!(queue_id = %queue.id, stats = ?queue.stats(), "queue completed");
                events.push(SchedulerEvent::for_queue(SchedulerEvent::TaskEmpty, &queue.id));
                events.push(SchedulerEvent::QueueCompleted(QueueDrained {
                    queue_id: Some(queue.id.clone()),
                }));
            }
        }
        any
    }

    /// Pending tasks waiting out a retry backoff in a dispatchable queue.
    fn has_delayed(state: &State<T>, now: Instant) -> bool {
        state
            .queues
            .values()
            .filter(|q| matches!(q.status, QueueStatus::Pending | QueueStatus::Running))
            .flat_map(|q| q.tasks.iter())
            .any(|t| t.status == TaskStatus::Pending && t.ready_at.map_or(false, |at| at > now))
    }

    fn next_dispatch(&self, state: &mut State<T>) -> (Vec<SchedulerEvent<T>>, Option<Dispatch<T>>) {
        let now = Instant::now();
        let mut events = Vec::new();
        loop {
            if self.config().auto_start {
                self.promote_pending(state, &mut events);
            }
            if !self.sweep_running(state, &mut events) {
                break;
            }
        }

        if !state.budget.has_capacity() {
            return (events, None);
        }

        let ranked = rank_running_queues(
            &state.queues,
            state.budget.max_total(),
            self.config().priority_enabled,
        );
        let pick = ranked
            .into_iter()
            .find_map(|qi| state.queues[qi].next_ready(now).map(|ti| (qi, ti)));

        let Some((qi, ti)) = pick else {
            if state.budget.in_use() == 0 && !state.idle_announced && !Self::has_delayed(state, now) {
                state.idle_announced = true;
                tracing::info!("no work left to dispatch");
                events.push(SchedulerEvent::QueueEmpty(QueueDrained { queue_id: None }));
            }
            return (events, None);
        };

        let State {
            queues,
            budget,
            idle_announced,
        } = state;
        let Some((_, queue)) = queues.get_index_mut(qi) else {
            return (events, None);
        };
        let task = &mut queue.tasks[ti];
        if !task.transition(TaskStatus::Running) || !budget.reserve() {
            return (events, None);
        }
        task.ready_at = None;
        queue.task_slots += 1;
        *idle_announced = false;

        let abort = self.control().register(&task.id);
        tracing::debug!(
            queue_id = %queue.id,
            task_id = %task.id,
            attempt = task.attempt,
            running = budget.in_use(),
            slots = queue.task_slots,
            "task started"
        );
        events.push(SchedulerEvent::for_task(SchedulerEvent::TaskStarted, &queue.id, task));
        let job = Dispatch {
            queue_id: queue.id.clone(),
            task_id: task.id.clone(),
            task_type: queue.task_type.clone(),
            data: task.data.clone(),
            attempt: task.attempt,
            abort,
        };
        (events, Some(job))
    }

    fn spawn_attempt(&self, handle: &Handle, job: Dispatch<T>) {
        let executor = self.executor(&job.task_type);
        let ctx = TaskContext::new(
            self.clone(),
            job.queue_id.clone(),
            job.task_id.clone(),
            job.attempt,
            job.abort.clone(),
            job.data.clone(),
        );
        let scheduler = self.clone();
        handle.spawn(async move {
            let result = match executor {
                Some(executor) => {
                    let run = AssertUnwindSafe(executor.execute(job.data.clone(), ctx));
                    match run.catch_unwind().await {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(e)) => Err(format!("{:#}", e)),
                        Err(panic) => {
                            Err(SchedulerError::ExecutorPanicked(panic_message(&*panic)).to_string())
                        }
                    }
                }
                None => Err(SchedulerError::MissingExecutor(job.task_type.clone()).to_string()),
            };
            scheduler.settle(job, result);
            scheduler.process();
        });
    }

    /// Apply an attempt's outcome, unless the task was paused, cancelled,
    /// cleared or removed while it ran.
    fn settle(&self, job: Dispatch<T>, result: Result<(), String>) {
        let mut events = Vec::new();
        let mut wake_after = None;
        {
            let mut state = self.lock();
            let State { queues, budget, .. } = &mut *state;
            let Some(queue) = queues.get_mut(&job.queue_id) else {
                tracing::debug!(queue_id = %job.queue_id, task_id = %job.task_id, "result for removed queue ignored");
                return;
            };
            let Some(task) = queue.tasks.iter_mut().find(|t| t.id == job.task_id) else {
                tracing::debug!(queue_id = %job.queue_id, task_id = %job.task_id, "result for removed task ignored");
                return;
            };
            if task.attempt != job.attempt || task.status != TaskStatus::Running {
                tracing::debug!(
                    queue_id = %job.queue_id,
                    task_id = %job.task_id,
                    status = %task.status,
                    "stale attempt result ignored"
                );
                return;
            }

            self.control().unregister(&task.id);
            queue.task_slots -= 1;
            budget.release();

            match result {
                Ok(()) => {
                    task.transition(TaskStatus::Completed);
                    tracing::debug!(queue_id = %queue.id, task_id = %task.id, "task completed");
                    events.push(SchedulerEvent::for_task(SchedulerEvent::TaskCompleted, &queue.id, task));
                }
                Err(error) => {
                    task.retries += 1;
                    match self.retry_policy().decide(task.retries, task.max_retries) {
                        RetryDecision::GiveUp => {
                            task.error = Some(error.clone());
                            task.transition(TaskStatus::Failed);
                            tracing::warn!(
                                queue_id = %queue.id,
                                task_id = %task.id,
                                retries = task.retries,
                                "task failed: {}",
                                error
                            );
                            events.push(SchedulerEvent::TaskFailed(TaskFailed {
                                queue_id: queue.id.clone(),
                                task: task.clone(),
                                error,
                            }));
                        }
                        RetryDecision::RetryAfter(delay) => {
                            task.transition(TaskStatus::Pending);
                            if !delay.is_zero() {
                                task.ready_at = Some(Instant::now() + delay);
                                wake_after = Some(delay);
                            }
                            tracing::info!(
                                queue_id = %queue.id,
                                task_id = %task.id,
                                attempt = task.retries,
                                delay_ms = delay.as_millis() as u64,
                                "task will retry: {}",
                                error
                            );
                            events.push(SchedulerEvent::TaskRetry(TaskRetry {
                                queue_id: queue.id.clone(),
                                task: task.clone(),
                                attempt: task.retries,
                            }));
                        }
                    }
                }
            }
        }
        self.emit_all(events);
        if let Some(delay) = wake_after {
            self.schedule_wakeup(delay);
        }
    }

    /// Re-enter the dispatch loop once a retry backoff has elapsed.
    fn schedule_wakeup(&self, delay: Duration) {
        let Ok(handle) = Handle::try_current() else {
            return;
        };
        let scheduler = self.clone();
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            scheduler.process();
        });
    }
}
