//! Simple queue manager: the unweighted fallback to [`crate::scheduler::Scheduler`].
//!
//! Queues are started strictly in arrival order, at most `max_active_queues`
//! at a time. Each queue is a list of sub-queues run one after another; the
//! tasks of a sub-queue run concurrently, bounded by one global
//! [`Semaphore`] shared by every queue. A failed task fails its queue and the
//! remaining sub-queues of that queue are skipped. No retries.

use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use indexmap::IndexMap;
use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::events::{Event, EventBus, HandlerId};
use crate::semaphore::Semaphore;

type TaskFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

/// A one-shot unit of work.
pub struct SimpleTask {
    pub id: String,
    run: TaskFn,
}

impl SimpleTask {
    pub fn new<F, Fut>(id: impl Into<String>, run: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            id: id.into(),
            run: Box::new(move || run().boxed()),
        }
    }
}

pub struct SubQueue {
    pub id: String,
    pub tasks: Vec<SimpleTask>,
}

pub struct SimpleQueue {
    pub id: String,
    pub sub_queues: Vec<SubQueue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimpleStatus {
    Waiting,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerEvent {
    QueueStarted { queue_id: String },
    QueueCompleted { queue_id: String },
    QueueFailed { queue_id: String, error: String },
    SubQueueStarted { queue_id: String, sub_queue_id: String },
    SubQueueCompleted { queue_id: String, sub_queue_id: String },
    TaskStarted { task_id: String },
    TaskCompleted { task_id: String },
    TaskFailed { task_id: String, error: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManagerEventKind {
    QueueStarted,
    QueueCompleted,
    QueueFailed,
    SubQueueStarted,
    SubQueueCompleted,
    TaskStarted,
    TaskCompleted,
    TaskFailed,
}

impl ManagerEventKind {
    pub fn name(self) -> &'static str {
        match self {
            ManagerEventKind::QueueStarted => "QUEUE_STARTED",
            ManagerEventKind::QueueCompleted => "QUEUE_COMPLETED",
            ManagerEventKind::QueueFailed => "QUEUE_FAILED",
            ManagerEventKind::SubQueueStarted => "SUBQUEUE_STARTED",
            ManagerEventKind::SubQueueCompleted => "SUBQUEUE_COMPLETED",
            ManagerEventKind::TaskStarted => "TASK_STARTED",
            ManagerEventKind::TaskCompleted => "TASK_COMPLETED",
            ManagerEventKind::TaskFailed => "TASK_FAILED",
        }
    }

    pub const ALL: [ManagerEventKind; 8] = [
        ManagerEventKind::QueueStarted,
        ManagerEventKind::QueueCompleted,
        ManagerEventKind::QueueFailed,
        ManagerEventKind::SubQueueStarted,
        ManagerEventKind::SubQueueCompleted,
        ManagerEventKind::TaskStarted,
        ManagerEventKind::TaskCompleted,
        ManagerEventKind::TaskFailed,
    ];
}

impl Event for ManagerEvent {
    type Kind = ManagerEventKind;

    fn kind(&self) -> ManagerEventKind {
        match self {
            ManagerEvent::QueueStarted { .. } => ManagerEventKind::QueueStarted,
            ManagerEvent::QueueCompleted { .. } => ManagerEventKind::QueueCompleted,
            ManagerEvent::QueueFailed { .. } => ManagerEventKind::QueueFailed,
            ManagerEvent::SubQueueStarted { .. } => ManagerEventKind::SubQueueStarted,
            ManagerEvent::SubQueueCompleted { .. } => ManagerEventKind::SubQueueCompleted,
            ManagerEvent::TaskStarted { .. } => ManagerEventKind::TaskStarted,
            ManagerEvent::TaskCompleted { .. } => ManagerEventKind::TaskCompleted,
            ManagerEvent::TaskFailed { .. } => ManagerEventKind::TaskFailed,
        }
    }
}

struct ManagerState {
    waiting: VecDeque<SimpleQueue>,
    active: usize,
    statuses: IndexMap<String, SimpleStatus>,
}

struct ManagerInner {
    max_active_queues: usize,
    gate: Semaphore,
    state: Mutex<ManagerState>,
    bus: EventBus<ManagerEvent>,
    /// Queues added but not yet finished; `join` waits for zero.
    outstanding: watch::Sender<usize>,
}

/// Handle to a simple manager. Clones share state.
#[derive(Clone)]
pub struct SimpleManager {
    inner: Arc<ManagerInner>,
}

impl SimpleManager {
    /// `max_active_queues` and `max_concurrency` are clamped to at least 1.
    pub fn new(max_active_queues: usize, max_concurrency: usize) -> Self {
        let (outstanding, _) = watch::channel(0);
        Self {
            inner: Arc::new(ManagerInner {
                max_active_queues: max_active_queues.max(1),
                gate: Semaphore::new(max_concurrency.max(1)),
                state: Mutex::new(ManagerState {
                    waiting: VecDeque::new(),
                    active: 0,
                    statuses: IndexMap::new(),
                }),
                bus: EventBus::new(),
                outstanding,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn on<F>(&self, kind: ManagerEventKind, handler: F) -> HandlerId
    where
        F: Fn(&ManagerEvent) -> Result<()> + Send + Sync + 'static,
    {
        self.inner.bus.on(kind, handler)
    }

    pub fn off(&self, kind: ManagerEventKind, id: HandlerId) -> bool {
        self.inner.bus.off(kind, id)
    }

    fn emit(&self, event: ManagerEvent) {
        tracing::debug!(event = event.kind().name(), "manager event");
        if let Err(e) = self.inner.bus.emit(&event) {
            tracing::warn!(event = event.kind().name(), "event handler failed: {:#}", e);
        }
    }

    /// Enqueue `queue` and start it if an active slot is free.
    pub fn add_queue(&self, queue: SimpleQueue) {
        {
            let mut state = self.lock();
            state.statuses.insert(queue.id.clone(), SimpleStatus::Waiting);
            state.waiting.push_back(queue);
        }
        self.inner.outstanding.send_modify(|n| *n += 1);
        self.schedule();
    }

    pub fn status(&self, queue_id: &str) -> Option<SimpleStatus> {
        self.lock().statuses.get(queue_id).copied()
    }

    pub fn active_queues(&self) -> usize {
        self.lock().active
    }

    pub fn waiting_queues(&self) -> usize {
        self.lock().waiting.len()
    }

    /// Resolve once every queue added so far has finished.
    pub async fn join(&self) {
        let mut rx = self.inner.outstanding.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    fn schedule(&self) {
        let Ok(handle) = Handle::try_current() else {
            tracing::warn!("no tokio runtime; queues stay waiting");
            return;
        };
        loop {
            let next = {
                let mut state = self.lock();
                if state.active >= self.inner.max_active_queues {
                    None
                } else {
                    let queue = state.waiting.pop_front();
                    if let Some(q) = &queue {
                        state.active += 1;
                        state.statuses.insert(q.id.clone(), SimpleStatus::Running);
                    }
                    queue
                }
            };
            let Some(queue) = next else {
                break;
            };
            let manager = self.clone();
            handle.spawn(async move { manager.run_queue(queue).await });
        }
    }

    async fn run_queue(self, queue: SimpleQueue) {
        let queue_id = queue.id;
        tracing::info!(queue_id = %queue_id, sub_queues = queue.sub_queues.len(), "simple queue started");
        self.emit(ManagerEvent::QueueStarted {
            queue_id: queue_id.clone(),
        });

        let mut failure = None;
        for sub in queue.sub_queues {
            if let Err(error) = self.run_sub_queue(&queue_id, sub).await {
                failure = Some(error);
                break;
            }
        }

        let status = match failure {
            None => {
                tracing::info!(queue_id = %queue_id, "simple queue completed");
                self.emit(ManagerEvent::QueueCompleted {
                    queue_id: queue_id.clone(),
                });
                SimpleStatus::Completed
            }
            Some(error) => {
                tracing::warn!(queue_id = %queue_id, "simple queue failed: {}", error);
                self.emit(ManagerEvent::QueueFailed {
                    queue_id: queue_id.clone(),
                    error,
                });
                SimpleStatus::Failed
            }
        };

        {
            let mut state = self.lock();
            state.active = state.active.saturating_sub(1);
            state.statuses.insert(queue_id, status);
        }
        self.inner.outstanding.send_modify(|n| *n = n.saturating_sub(1));
        self.schedule();
    }

    /// Run every task of `sub` concurrently; the first failure is returned
    /// after all of them have settled.
    async fn run_sub_queue(&self, queue_id: &str, sub: SubQueue) -> Result<(), String> {
        self.emit(ManagerEvent::SubQueueStarted {
            queue_id: queue_id.to_string(),
            sub_queue_id: sub.id.clone(),
        });
        let results = join_all(sub.tasks.into_iter().map(|task| self.run_task(task))).await;
        if let Some(error) = results.into_iter().find_map(Result::err) {
            return Err(error);
        }
        self.emit(ManagerEvent::SubQueueCompleted {
            queue_id: queue_id.to_string(),
            sub_queue_id: sub.id,
        });
        Ok(())
    }

    async fn run_task(&self, task: SimpleTask) -> Result<(), String> {
        self.emit(ManagerEvent::TaskStarted {
            task_id: task.id.clone(),
        });
        let _permit = self.inner.gate.acquire().await;
        let outcome = match AssertUnwindSafe((task.run)()).catch_unwind().await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(format!("{:#}", e)),
            Err(_) => Err("task panicked".to_string()),
        };
        match &outcome {
            Ok(()) => self.emit(ManagerEvent::TaskCompleted { task_id: task.id }),
            Err(error) => self.emit(ManagerEvent::TaskFailed {
                task_id: task.id,
                error: error.clone(),
            }),
        }
        outcome
    }
}
