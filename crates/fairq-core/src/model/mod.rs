//! Data model: tasks, queues and their lifecycle states.

mod queue;
mod stats;
mod task;

pub use queue::{
    Queue, QueueId, QueueOptions, QueueStatus, DEFAULT_MAX_RETRIES, DEFAULT_PRIORITY,
};
pub use stats::QueueStats;
pub use task::{Task, TaskId, TaskStatus};
