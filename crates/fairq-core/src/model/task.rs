//! Task record and task lifecycle states.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::time::Instant;

/// Opaque task identifier, unique within a scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        TaskId(s.to_string())
    }
}

/// Lifecycle state of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Paused => "paused",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Completed, Failed and Cancelled tasks never change state again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// States a task can still be cancelled, cleared or removed from.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            TaskStatus::Pending | TaskStatus::Running | TaskStatus::Paused
        )
    }

    /// Whether `self -> next` is a legal edge of the task state machine.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, next) {
            (Pending, Running) | (Pending, Cancelled) => true,
            (Running, Completed)
            | (Running, Failed)
            | (Running, Paused)
            | (Running, Cancelled)
            | (Running, Pending) => true,
            (Paused, Pending) | (Paused, Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single unit of caller work owned by a queue.
#[derive(Debug, Clone)]
pub struct Task<T> {
    pub id: TaskId,
    pub data: T,
    pub status: TaskStatus,
    /// Failed attempts so far.
    pub retries: u32,
    pub max_retries: u32,
    pub created_at: Instant,
    pub updated_at: Instant,
    pub started_at: Option<Instant>,
    pub completed_at: Option<Instant>,
    /// Last failure message once the task has failed for good.
    pub error: Option<String>,
    pub metadata: Option<Map<String, Value>>,
    /// Earliest time a requeued task may be dispatched again (retry backoff).
    pub ready_at: Option<Instant>,
    /// Dispatch generation; bumped every time the task starts running.
    pub attempt: u64,
}

impl<T> Task<T> {
    pub(crate) fn new(id: TaskId, data: T, max_retries: u32) -> Self {
        let now = Instant::now();
        Self {
            id,
            data,
            status: TaskStatus::Pending,
            retries: 0,
            max_retries,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            error: None,
            metadata: None,
            ready_at: None,
            attempt: 0,
        }
    }

    /// Move to `next` if the state machine allows it. Illegal moves (in
    /// particular anything out of a terminal state) are refused and logged.
    pub(crate) fn transition(&mut self, next: TaskStatus) -> bool {
        if !self.status.can_transition_to(next) {
            tracing::warn!(
                task_id = %self.id,
                from = %self.status,
                to = %next,
                "refused illegal task transition"
            );
            return false;
        }
        let now = Instant::now();
        self.status = next;
        self.updated_at = now;
        match next {
            TaskStatus::Running => {
                self.started_at = Some(now);
                self.attempt += 1;
            }
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled => {
                self.completed_at = Some(now);
                self.ready_at = None;
            }
            TaskStatus::Pending | TaskStatus::Paused => {}
        }
        true
    }

    /// Pending and past any retry backoff.
    pub fn is_ready(&self, now: Instant) -> bool {
        self.status == TaskStatus::Pending && self.ready_at.map_or(true, |at| at <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        use TaskStatus::*;
        let all = [Pending, Running, Paused, Completed, Failed, Cancelled];
        for from in [Completed, Failed, Cancelled] {
            for to in all {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be refused");
            }
        }
    }

    #[test]
    fn transition_bumps_attempt_and_refuses_after_terminal() {
        let mut task = Task::new(TaskId::from("t1"), 7u32, 3);
        assert!(task.transition(TaskStatus::Running));
        assert_eq!(task.attempt, 1);
        assert!(task.started_at.is_some());
        assert!(task.transition(TaskStatus::Pending));
        assert!(task.transition(TaskStatus::Running));
        assert_eq!(task.attempt, 2);
        assert!(task.transition(TaskStatus::Completed));
        assert!(task.completed_at.is_some());
        assert!(!task.transition(TaskStatus::Pending));
        assert_eq!(task.status, TaskStatus::Completed);
    }

    #[test]
    fn pending_cannot_be_paused_directly() {
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Paused));
        assert!(TaskStatus::Paused.can_transition_to(TaskStatus::Pending));
    }

    #[test]
    fn ready_respects_backoff() {
        let mut task = Task::new(TaskId::from("t"), (), 0);
        let now = Instant::now();
        assert!(task.is_ready(now));
        task.ready_at = Some(now + std::time::Duration::from_secs(5));
        assert!(!task.is_ready(now));
        assert!(task.is_ready(now + std::time::Duration::from_secs(6)));
    }
}
