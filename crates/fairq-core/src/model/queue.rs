//! Queue record, queue lifecycle states and creation options.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::time::Instant;

use super::stats::QueueStats;
use super::task::{Task, TaskStatus};

/// Opaque queue identifier, unique within a scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueueId(pub String);

impl QueueId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QueueId {
    fn from(s: &str) -> Self {
        QueueId(s.to_string())
    }
}

impl From<String> for QueueId {
    fn from(s: String) -> Self {
        QueueId(s)
    }
}

/// Aggregate state of a queue, derived from the states of its tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Cancelled,
}

impl QueueStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Running => "running",
            QueueStatus::Paused => "paused",
            QueueStatus::Completed => "completed",
            QueueStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, QueueStatus::Completed | QueueStatus::Cancelled)
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-queue options accepted by `Scheduler::add_queue`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueOptions {
    /// Explicit queue id; generated from the task type when absent.
    #[serde(default)]
    pub id: Option<String>,
    /// Relative weight under fair sharing (default 1).
    #[serde(default)]
    pub priority: Option<f64>,
    /// Retries allowed per task before it is marked failed (default 3).
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

impl QueueOptions {
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

pub const DEFAULT_PRIORITY: f64 = 1.0;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// An ordered group of tasks sharing a task type and a relative priority.
#[derive(Debug, Clone)]
pub struct Queue<T> {
    pub id: QueueId,
    /// Selects the registered executor.
    pub task_type: String,
    pub tasks: Vec<Task<T>>,
    /// Number of this queue's tasks currently running.
    pub task_slots: usize,
    pub priority: f64,
    pub status: QueueStatus,
    pub created_at: Instant,
    pub updated_at: Instant,
    pub metadata: Option<Map<String, Value>>,
}

impl<T> Queue<T> {
    pub(crate) fn new(id: QueueId, task_type: String, tasks: Vec<Task<T>>, priority: f64) -> Self {
        let now = Instant::now();
        Self {
            id,
            task_type,
            tasks,
            task_slots: 0,
            priority,
            status: QueueStatus::Pending,
            created_at: now,
            updated_at: now,
            metadata: None,
        }
    }

    /// Set a new aggregate status. Returns false (and leaves the queue alone)
    /// if the queue already reached a terminal status or nothing changes.
    pub(crate) fn set_status(&mut self, next: QueueStatus) -> bool {
        if self.status == next {
            return false;
        }
        if self.status.is_terminal() {
            tracing::warn!(
                queue_id = %self.id,
                from = %self.status,
                to = %next,
                "refused transition out of terminal queue status"
            );
            return false;
        }
        self.status = next;
        self.updated_at = Instant::now();
        true
    }

    pub fn count(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }

    /// Pending, running or paused tasks remain.
    pub fn has_active(&self) -> bool {
        self.tasks.iter().any(|t| t.status.is_active())
    }

    pub fn has_pending(&self) -> bool {
        self.tasks.iter().any(|t| t.status == TaskStatus::Pending)
    }

    /// Index of the first task that can be dispatched right now (FIFO).
    pub(crate) fn next_ready(&self, now: Instant) -> Option<usize> {
        self.tasks.iter().position(|t| t.is_ready(now))
    }

    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats {
            total: self.tasks.len(),
            ..QueueStats::default()
        };
        for task in &self.tasks {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Paused => stats.paused += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }
}
