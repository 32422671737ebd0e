//! Retry and backoff policy.
//!
//! Decides, after a task's executor fails, whether the task is requeued and
//! how long it waits before it may be dispatched again.

mod policy;

pub use policy::{RetryDecision, RetryPolicy};
