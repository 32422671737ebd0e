//! Priority-weighted multi-queue task scheduler.
//!
//! Owns every queue and task, decides which Running queue is most owed a
//! slot before each dispatch, runs executors on the tokio runtime, applies
//! the retry policy and reports everything through typed events.
//!
//! All bookkeeping sits behind one mutex. It is never held across an
//! `.await` or while event handlers run, so handlers may call back in.

mod admission;
mod budget;
mod choose;
mod context;
mod dispatch;
mod executor;
mod lifecycle;

pub use context::{MergeData, TaskContext};
pub use executor::Executor;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use indexmap::IndexMap;

use crate::config::SchedulerConfig;
use crate::control::TaskControl;
use crate::events::{Event, EventBus, EventKind, HandlerId, SchedulerEvent};
use crate::model::{Queue, QueueId, QueueStats, QueueStatus, Task, TaskId};
use crate::retry::RetryPolicy;

use budget::SlotBudget;

/// Bounds required of task payloads.
pub trait TaskData: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> TaskData for T {}

/// Caller-supplied task predicate used by the control and query calls.
pub type TaskFilter<'a, T> = &'a dyn Fn(&Task<T>) -> bool;

/// Caller-supplied queue predicate for `get_queue`.
pub type QueueFilter<'a, T> = &'a dyn Fn(&Queue<T>) -> bool;

pub(crate) struct State<T> {
    pub(crate) queues: IndexMap<QueueId, Queue<T>>,
    pub(crate) budget: SlotBudget,
    /// Set once the "nothing left to do" event went out; cleared on dispatch.
    pub(crate) idle_announced: bool,
}

impl<T> State<T> {
    pub(crate) fn total_tasks(&self) -> usize {
        self.queues.values().map(|q| q.tasks.len()).sum()
    }

    pub(crate) fn running_queues(&self) -> usize {
        self.queues
            .values()
            .filter(|q| q.status == QueueStatus::Running)
            .count()
    }
}

struct Inner<T: TaskData> {
    config: SchedulerConfig,
    retry: RetryPolicy,
    state: Mutex<State<T>>,
    executors: RwLock<HashMap<String, Arc<dyn Executor<T>>>>,
    bus: EventBus<SchedulerEvent<T>>,
    control: TaskControl,
}

/// Handle to a scheduler. Clones share the same queues, counters and
/// subscriptions.
pub struct Scheduler<T: TaskData> {
    inner: Arc<Inner<T>>,
}

impl<T: TaskData> Clone for Scheduler<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: TaskData> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl<T: TaskData> Scheduler<T> {
    pub fn new(config: SchedulerConfig) -> Self {
        let retry = RetryPolicy::from_config(&config);
        Self::with_retry_policy(config, retry)
    }

    /// Build with an explicit retry policy instead of the one derived from config.
    pub fn with_retry_policy(config: SchedulerConfig, retry: RetryPolicy) -> Self {
        let budget = SlotBudget::new(config.task_limit());
        Self {
            inner: Arc::new(Inner {
                config,
                retry,
                state: Mutex::new(State {
                    queues: IndexMap::new(),
                    budget,
                    idle_announced: false,
                }),
                executors: RwLock::new(HashMap::new()),
                bus: EventBus::new(),
                control: TaskControl::new(),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.inner.retry
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn control(&self) -> &TaskControl {
        &self.inner.control
    }

    // ========== executors ==========

    /// Associate `executor` with queues of `task_type`, replacing any previous one.
    pub fn register_executor<E>(&self, task_type: impl Into<String>, executor: E)
    where
        E: Executor<T>,
    {
        let task_type = task_type.into();
        tracing::debug!(task_type = %task_type, "registered executor");
        self.inner
            .executors
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(task_type, Arc::new(executor));
    }

    pub fn unregister_executor(&self, task_type: &str) -> bool {
        self.inner
            .executors
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(task_type)
            .is_some()
    }

    pub fn has_executor(&self, task_type: &str) -> bool {
        self.executor(task_type).is_some()
    }

    pub(crate) fn executor(&self, task_type: &str) -> Option<Arc<dyn Executor<T>>> {
        self.inner
            .executors
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(task_type)
            .cloned()
    }

    // ========== events ==========

    /// Subscribe to events of `kind`.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(&SchedulerEvent<T>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.bus.on(kind, handler)
    }

    pub fn off(&self, kind: EventKind, id: HandlerId) -> bool {
        self.inner.bus.off(kind, id)
    }

    /// Publish events collected under the lock. A failing handler only cuts
    /// delivery of that one event short.
    pub(crate) fn emit_all(&self, events: Vec<SchedulerEvent<T>>) {
        for event in events {
            let kind = event.kind();
            tracing::debug!(
                event = kind.name(),
                queue_id = event.queue_id().map(|q| q.as_str()).unwrap_or("-"),
                task_id = event.task().map(|t| t.id.as_str()).unwrap_or("-"),
                "event"
            );
            if let Err(e) = self.inner.bus.emit(&event) {
                tracing::warn!(event = kind.name(), "event handler failed: {:#}", e);
            }
        }
    }

    // ========== queries ==========

    /// Snapshot of the queue's tasks, optionally filtered. `None` if the queue
    /// does not exist.
    pub fn get_task(&self, queue_id: &QueueId, filter: Option<TaskFilter<'_, T>>) -> Option<Vec<Task<T>>> {
        let state = self.lock();
        let queue = state.queues.get(queue_id)?;
        Some(
            queue
                .tasks
                .iter()
                .filter(|t| filter.map_or(true, |f| f(t)))
                .cloned()
                .collect(),
        )
    }

    /// Snapshot of all queues (insertion order), optionally filtered.
    pub fn get_queue(&self, filter: Option<QueueFilter<'_, T>>) -> IndexMap<QueueId, Queue<T>> {
        let state = self.lock();
        state
            .queues
            .iter()
            .filter(|(_, q)| filter.map_or(true, |f| f(q)))
            .map(|(id, q)| (id.clone(), q.clone()))
            .collect()
    }

    /// Task counts by status for one queue.
    pub fn get_stats(&self, queue_id: &QueueId) -> Option<QueueStats> {
        self.lock().queues.get(queue_id).map(Queue::stats)
    }

    /// Global running counter.
    pub fn running(&self) -> usize {
        self.lock().budget.in_use()
    }

    pub fn queue_ids(&self) -> Vec<QueueId> {
        self.lock().queues.keys().cloned().collect()
    }

    pub(crate) fn with_task<R>(
        &self,
        queue_id: &QueueId,
        task_id: &TaskId,
        f: impl FnOnce(&Task<T>) -> R,
    ) -> Option<R> {
        let state = self.lock();
        let queue = state.queues.get(queue_id)?;
        queue.tasks.iter().find(|t| &t.id == task_id).map(f)
    }

    pub(crate) fn with_task_mut<R>(
        &self,
        queue_id: &QueueId,
        task_id: &TaskId,
        f: impl FnOnce(&mut Task<T>) -> R,
    ) -> Option<R> {
        let mut state = self.lock();
        let queue = state.queues.get_mut(queue_id)?;
        queue.tasks.iter_mut().find(|t| &t.id == task_id).map(f)
    }
}
