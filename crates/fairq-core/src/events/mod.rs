//! Typed lifecycle events published by the scheduler.
//!
//! Every event is a variant of [`SchedulerEvent`] carrying its own payload
//! struct; handlers subscribe per [`EventKind`] through an [`EventBus`].

mod bus;

pub use bus::{Event, EventBus, HandlerId};

use crate::model::{QueueId, Task};

/// Payload for queue-level events that name a single queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEvent {
    pub queue_id: QueueId,
}

/// Payload for events whose queue id is optional: absent when the scheduler
/// as a whole ran out of work rather than one queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDrained {
    pub queue_id: Option<QueueId>,
}

/// Payload for task-level events.
#[derive(Debug, Clone)]
pub struct TaskEvent<T> {
    pub queue_id: QueueId,
    pub task: Task<T>,
}

#[derive(Debug, Clone)]
pub struct TaskFailed<T> {
    pub queue_id: QueueId,
    pub task: Task<T>,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct TaskRetry<T> {
    pub queue_id: QueueId,
    pub task: Task<T>,
    /// 1-based retry number (equal to `task.retries`).
    pub attempt: u32,
}

#[derive(Debug, Clone)]
pub struct TaskDataUpdated<T> {
    pub queue_id: QueueId,
    pub data: T,
    pub task: Task<T>,
}

/// Everything the scheduler reports back to callers.
#[derive(Debug, Clone)]
pub enum SchedulerEvent<T> {
    QueueFull(QueueEvent),
    QueueStarted(QueueEvent),
    QueuePaused(QueueEvent),
    QueueResumed(QueueEvent),
    QueueCancelled(QueueEvent),
    QueueCompleted(QueueDrained),
    QueueRemoved(QueueEvent),
    QueueCleared(QueueEvent),
    QueueEmpty(QueueDrained),
    TaskStarted(TaskEvent<T>),
    TaskCompleted(TaskEvent<T>),
    TaskFailed(TaskFailed<T>),
    TaskRetry(TaskRetry<T>),
    TaskPaused(TaskEvent<T>),
    TaskResumed(TaskEvent<T>),
    TaskCancelled(TaskEvent<T>),
    TaskRemoved(TaskEvent<T>),
    TaskCleared(TaskEvent<T>),
    TaskEmpty(QueueEvent),
    TaskDataUpdated(TaskDataUpdated<T>),
}

/// Discriminant of [`SchedulerEvent`], used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    QueueFull,
    QueueStarted,
    QueuePaused,
    QueueResumed,
    QueueCancelled,
    QueueCompleted,
    QueueRemoved,
    QueueCleared,
    QueueEmpty,
    TaskStarted,
    TaskCompleted,
    TaskFailed,
    TaskRetry,
    TaskPaused,
    TaskResumed,
    TaskCancelled,
    TaskRemoved,
    TaskCleared,
    TaskEmpty,
    TaskDataUpdated,
}

impl EventKind {
    /// Conventional `scope:action` name, used in logs and CLI output.
    pub fn name(self) -> &'static str {
        match self {
            EventKind::QueueFull => "queue:full",
            EventKind::QueueStarted => "queue:started",
            EventKind::QueuePaused => "queue:paused",
            EventKind::QueueResumed => "queue:resumed",
            EventKind::QueueCancelled => "queue:cancelled",
            EventKind::QueueCompleted => "queue:completed",
            EventKind::QueueRemoved => "queue:removed",
            EventKind::QueueCleared => "queue:cleared",
            EventKind::QueueEmpty => "queue:empty",
            EventKind::TaskStarted => "task:started",
            EventKind::TaskCompleted => "task:completed",
            EventKind::TaskFailed => "task:failed",
            EventKind::TaskRetry => "task:retry",
            EventKind::TaskPaused => "task:paused",
            EventKind::TaskResumed => "task:resumed",
            EventKind::TaskCancelled => "task:cancelled",
            EventKind::TaskRemoved => "task:removed",
            EventKind::TaskCleared => "task:cleared",
            EventKind::TaskEmpty => "task:empty",
            EventKind::TaskDataUpdated => "task:dataUpdated",
        }
    }

    pub const ALL: [EventKind; 20] = [
        EventKind::QueueFull,
        EventKind::QueueStarted,
        EventKind::QueuePaused,
        EventKind::QueueResumed,
        EventKind::QueueCancelled,
        EventKind::QueueCompleted,
        EventKind::QueueRemoved,
        EventKind::QueueCleared,
        EventKind::QueueEmpty,
        EventKind::TaskStarted,
        EventKind::TaskCompleted,
        EventKind::TaskFailed,
        EventKind::TaskRetry,
        EventKind::TaskPaused,
        EventKind::TaskResumed,
        EventKind::TaskCancelled,
        EventKind::TaskRemoved,
        EventKind::TaskCleared,
        EventKind::TaskEmpty,
        EventKind::TaskDataUpdated,
    ];
}

impl<T> SchedulerEvent<T> {
    pub(crate) fn for_queue(kind: fn(QueueEvent) -> Self, queue_id: &QueueId) -> Self {
        kind(QueueEvent {
            queue_id: queue_id.clone(),
        })
    }

    pub(crate) fn for_task(kind: fn(TaskEvent<T>) -> Self, queue_id: &QueueId, task: &Task<T>) -> Self
    where
        T: Clone,
    {
        kind(TaskEvent {
            queue_id: queue_id.clone(),
            task: task.clone(),
        })
    }

    /// The queue this event concerns, if any.
    pub fn queue_id(&self) -> Option<&QueueId> {
        match self {
            SchedulerEvent::QueueFull(e)
            | SchedulerEvent::QueueStarted(e)
            | SchedulerEvent::QueuePaused(e)
            | SchedulerEvent::QueueResumed(e)
            | SchedulerEvent::QueueCancelled(e)
            | SchedulerEvent::QueueRemoved(e)
            | SchedulerEvent::QueueCleared(e)
            | SchedulerEvent::TaskEmpty(e) => Some(&e.queue_id),
            SchedulerEvent::QueueCompleted(e) | SchedulerEvent::QueueEmpty(e) => {
                e.queue_id.as_ref()
            }
            SchedulerEvent::TaskStarted(e)
            | SchedulerEvent::TaskCompleted(e)
            | SchedulerEvent::TaskPaused(e)
            | SchedulerEvent::TaskResumed(e)
            | SchedulerEvent::TaskCancelled(e)
            | SchedulerEvent::TaskRemoved(e)
            | SchedulerEvent::TaskCleared(e) => Some(&e.queue_id),
            SchedulerEvent::TaskFailed(e) => Some(&e.queue_id),
            SchedulerEvent::TaskRetry(e) => Some(&e.queue_id),
            SchedulerEvent::TaskDataUpdated(e) => Some(&e.queue_id),
        }
    }

    /// The task snapshot carried by task-level events.
    pub fn task(&self) -> Option<&Task<T>> {
        match self {
            SchedulerEvent::TaskStarted(e)
            | SchedulerEvent::TaskCompleted(e)
            | SchedulerEvent::TaskPaused(e)
            | SchedulerEvent::TaskResumed(e)
            | SchedulerEvent::TaskCancelled(e)
            | SchedulerEvent::TaskRemoved(e)
            | SchedulerEvent::TaskCleared(e) => Some(&e.task),
            SchedulerEvent::TaskFailed(e) => Some(&e.task),
            SchedulerEvent::TaskRetry(e) => Some(&e.task),
            SchedulerEvent::TaskDataUpdated(e) => Some(&e.task),
            _ => None,
        }
    }
}

impl<T> Event for SchedulerEvent<T> {
    type Kind = EventKind;

    fn kind(&self) -> EventKind {
        match self {
            SchedulerEvent::QueueFull(_) => EventKind::QueueFull,
            SchedulerEvent::QueueStarted(_) => EventKind::QueueStarted,
            SchedulerEvent::QueuePaused(_) => EventKind::QueuePaused,
            SchedulerEvent::QueueResumed(_) => EventKind::QueueResumed,
            SchedulerEvent::QueueCancelled(_) => EventKind::QueueCancelled,
            SchedulerEvent::QueueCompleted(_) => EventKind::QueueCompleted,
            SchedulerEvent::QueueRemoved(_) => EventKind::QueueRemoved,
            SchedulerEvent::QueueCleared(_) => EventKind::QueueCleared,
            SchedulerEvent::QueueEmpty(_) => EventKind::QueueEmpty,
            SchedulerEvent::TaskStarted(_) => EventKind::TaskStarted,
            SchedulerEvent::TaskCompleted(_) => EventKind::TaskCompleted,
            SchedulerEvent::TaskFailed(_) => EventKind::TaskFailed,
            SchedulerEvent::TaskRetry(_) => EventKind::TaskRetry,
            SchedulerEvent::TaskPaused(_) => EventKind::TaskPaused,
            SchedulerEvent::TaskResumed(_) => EventKind::TaskResumed,
            SchedulerEvent::TaskCancelled(_) => EventKind::TaskCancelled,
            SchedulerEvent::TaskRemoved(_) => EventKind::TaskRemoved,
            SchedulerEvent::TaskCleared(_) => EventKind::TaskCleared,
            SchedulerEvent::TaskEmpty(_) => EventKind::TaskEmpty,
            SchedulerEvent::TaskDataUpdated(_) => EventKind::TaskDataUpdated,
        }
    }
}
