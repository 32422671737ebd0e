//! Shared helpers for scheduler integration tests.

#![allow(dead_code)]

pub mod recorder;

use std::time::Duration;

use fairq_core::{QueueId, QueueStatus, Scheduler, SchedulerConfig, TaskContext, TaskData};

/// Config with the given limits and immediate retries.
pub fn config(max_tasks: usize, max_queues: usize) -> SchedulerConfig {
    SchedulerConfig {
        max_task_concurrent: Some(max_tasks),
        max_queue_concurrent: Some(max_queues),
        retry_delay_ms: 0,
        ..SchedulerConfig::default()
    }
}

/// Register a `sleep` executor: each task sleeps for its value in milliseconds.
pub fn register_sleep(s: &Scheduler<u64>) {
    s.register_executor("sleep", |ms: u64, _ctx: TaskContext<u64>| async move {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok::<_, anyhow::Error>(())
    });
}

/// Poll (on the paused test clock) until `cond` holds.
pub async fn wait_until<T: TaskData>(s: &Scheduler<T>, cond: impl Fn(&Scheduler<T>) -> bool) {
    for _ in 0..100_000 {
        if cond(s) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("scheduler never reached the expected state");
}

/// Wait until every queue is terminal and nothing runs.
pub async fn wait_idle<T: TaskData>(s: &Scheduler<T>) {
    wait_until(s, |s| {
        s.running() == 0
            && s
                .get_queue(None)
                .values()
                .all(|q| matches!(q.status, QueueStatus::Completed | QueueStatus::Cancelled))
    })
    .await;
}

pub fn slots<T: TaskData>(s: &Scheduler<T>, id: &QueueId) -> usize {
    s.get_queue(None)[id].task_slots
}
