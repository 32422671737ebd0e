//! Abort tokens for running tasks.
//!
//! Every dispatched task is registered with a fresh token. Pausing,
//! cancelling, clearing or removing a running task sets its token; the
//! executor sees it through its `TaskContext` and may stop early. The
//! scheduler ignores whatever the abandoned attempt returns.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::model::TaskId;

/// Error an executor can return when it stops because its token was set.
#[derive(Debug)]
pub struct TaskAborted;

impl std::fmt::Display for TaskAborted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task aborted by scheduler")
    }
}

impl std::error::Error for TaskAborted {}

/// Shared flag set when the scheduler stops counting a task as running.
#[derive(Debug, Clone, Default)]
pub struct AbortToken(Arc<AtomicBool>);

impl AbortToken {
    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn abort(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Registry of task id -> abort token for the tasks currently running.
#[derive(Debug, Default)]
pub struct TaskControl {
    tasks: RwLock<HashMap<TaskId, AbortToken>>,
}

impl TaskControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task that is about to run; returns the token handed to its executor.
    pub fn register(&self, task_id: &TaskId) -> AbortToken {
        let token = AbortToken::default();
        self.tasks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(task_id.clone(), token.clone());
        token
    }

    /// Forget a task (call when its attempt has been settled).
    pub fn unregister(&self, task_id: &TaskId) {
        self.tasks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(task_id);
    }

    /// Set and forget the task's token. Returns false if it was not registered.
    pub fn request_abort(&self, task_id: &TaskId) -> bool {
        let token = self
            .tasks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(task_id);
        match token {
            Some(token) => {
                token.abort();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_abort_sets_token_once() {
        let control = TaskControl::new();
        let id = TaskId::from("t1");
        let token = control.register(&id);
        assert!(!token.is_aborted());
        assert!(control.request_abort(&id));
        assert!(token.is_aborted());
        assert!(!control.request_abort(&id));
        assert!(control.is_empty());
    }

    #[test]
    fn unregister_leaves_token_untouched() {
        let control = TaskControl::new();
        let id = TaskId::from("t2");
        let token = control.register(&id);
        control.unregister(&id);
        assert!(!control.request_abort(&id));
        assert!(!token.is_aborted());
    }
}
