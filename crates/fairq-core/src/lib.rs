//! Priority-weighted multi-queue task scheduler.

pub mod config;
pub mod control;
pub mod error;
pub mod events;
pub mod logging;
pub mod manager;
pub mod model;
pub mod retry;
pub mod scheduler;
pub mod semaphore;

pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use events::{EventKind, SchedulerEvent};
pub use model::{Queue, QueueId, QueueOptions, QueueStats, QueueStatus, Task, TaskId, TaskStatus};
pub use scheduler::{Executor, MergeData, QueueFilter, Scheduler, TaskContext, TaskData, TaskFilter};
