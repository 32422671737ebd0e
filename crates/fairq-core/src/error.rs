//! Scheduler error type.

use thiserror::Error;

use crate::model::QueueId;

/// Errors returned synchronously by scheduler calls.
///
/// Failures inside the dispatch loop never surface here; they are reported
/// through `TaskRetry` / `TaskFailed` events instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchedulerError {
    #[error("queue is full: {current} queued + {requested} new reaches the limit of {max}")]
    QueueFull {
        queue_id: QueueId,
        requested: usize,
        current: usize,
        max: usize,
    },

    #[error("queue {0} already exists")]
    DuplicateQueue(QueueId),

    #[error("queue {0} not found")]
    QueueNotFound(QueueId),

    #[error("no executor registered for task type: {0}")]
    MissingExecutor(String),

    #[error("executor panicked: {0}")]
    ExecutorPanicked(String),
}
