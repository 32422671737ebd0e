//! Integration tests: end-to-end dispatch scenarios on the paused tokio clock.
//!
//! Each test builds a scheduler, registers executors, adds queues and drives
//! the runtime until the queues settle, then checks statuses, counters and
//! the recorded event stream.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::recorder::Recorder;
use common::{config, register_sleep, slots, wait_idle};
use fairq_core::config::{BackoffMode, RetryConfig};
use fairq_core::events::QueueDrained;
use fairq_core::{
    EventKind, QueueId, QueueOptions, QueueStatus, Scheduler, SchedulerConfig, SchedulerError,
    SchedulerEvent, Task, TaskContext, TaskStatus,
};
use serde_json::{json, Map, Value};

#[tokio::test(start_paused = true)]
async fn instant_successes_complete_queue_once() {
    let s: Scheduler<u64> = Scheduler::new(config(3, 2));
    s.register_executor("ok", |_: u64, _ctx: TaskContext<u64>| async {
        Ok::<_, anyhow::Error>(())
    });
    let rec = Recorder::attach(&s);

    let id = s.add_queue("ok", vec![1, 2, 3, 4, 5], QueueOptions::default()).unwrap();
    wait_idle(&s).await;

    let tasks = s.get_task(&id, None).unwrap();
    assert!(tasks.iter().all(|t| t.status == TaskStatus::Completed));
    assert_eq!(s.running(), 0);
    assert_eq!(rec.count(EventKind::TaskStarted), 5);
    assert_eq!(rec.count(EventKind::TaskCompleted), 5);

    let completed: Vec<Option<QueueId>> = rec
        .events()
        .into_iter()
        .filter_map(|e| match e {
            SchedulerEvent::QueueCompleted(QueueDrained { queue_id }) => Some(queue_id),
            _ => None,
        })
        .collect();
    assert_eq!(completed, vec![Some(id.clone())], "queue:completed fires exactly once");
    assert_eq!(rec.count(EventKind::QueueEmpty), 1);
    assert_eq!(s.get_queue(None)[&id].status, QueueStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn failing_tasks_retry_once_then_fail() {
    let s: Scheduler<u64> = Scheduler::new(config(2, 2));
    s.register_executor("bad", |_: u64, _ctx: TaskContext<u64>| async {
        Err::<(), _>(anyhow::anyhow!("always broken"))
    });
    let rec = Recorder::attach(&s);

    let id = s
        .add_queue("bad", vec![1, 2, 3], QueueOptions::default().with_max_retries(1))
        .unwrap();
    wait_idle(&s).await;

    let tasks = s.get_task(&id, None).unwrap();
    for task in &tasks {
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.retries, 2);
        assert_eq!(task.error.as_deref(), Some("always broken"));
    }
    let retries: Vec<u32> = rec
        .events()
        .into_iter()
        .filter_map(|e| match e {
            SchedulerEvent::TaskRetry(r) => Some(r.attempt),
            _ => None,
        })
        .collect();
    assert_eq!(retries, vec![1, 1, 1]);
    assert_eq!(rec.count(EventKind::TaskFailed), 3);
    assert_eq!(rec.count(EventKind::TaskStarted), 6);
}

#[tokio::test(start_paused = true)]
async fn slots_split_by_priority_while_saturated() {
    let s: Scheduler<u64> = Scheduler::new(config(4, 2));
    register_sleep(&s);

    let low = s
        .add_queue("sleep", vec![10; 40], QueueOptions::default().with_priority(1.0))
        .unwrap();
    let high = s
        .add_queue("sleep", vec![10; 40], QueueOptions::default().with_priority(3.0))
        .unwrap();
    assert_eq!(slots(&s, &low), 4, "first queue fills the idle scheduler");

    tokio::time::sleep(Duration::from_millis(15)).await;
    for _ in 0..3 {
        assert_eq!((slots(&s, &low), slots(&s, &high)), (1, 3));
        assert_eq!(s.running(), 4);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn started_tasks_follow_priority_ratio() {
    let s: Scheduler<u64> = Scheduler::new(config(4, 2));
    register_sleep(&s);
    let started = Arc::new(Mutex::new((0usize, 0usize)));

    let a = s
        .add_queue("sleep", vec![10; 200], QueueOptions::default().with_priority(1.0))
        .unwrap();
    let b = s
        .add_queue("sleep", vec![10; 200], QueueOptions::default().with_priority(3.0))
        .unwrap();
    let counts = Arc::clone(&started);
    let (qa, qb) = (a.clone(), b.clone());
    s.on(EventKind::TaskStarted, move |event| {
        let mut c = counts.lock().unwrap();
        match event.queue_id() {
            Some(q) if *q == qa => c.0 += 1,
            Some(q) if *q == qb => c.1 += 1,
            _ => {}
        }
        Ok::<_, anyhow::Error>(())
    });

    tokio::time::sleep(Duration::from_millis(405)).await;
    let (na, nb) = *started.lock().unwrap();
    assert_eq!((na, nb), (40, 120));
}

#[tokio::test(start_paused = true)]
async fn cancelling_running_task_frees_slot_immediately() {
    let s: Scheduler<u64> = Scheduler::new(config(2, 2));
    register_sleep(&s);
    let rec = Recorder::attach(&s);

    let id = s.add_queue("sleep", vec![50, 50, 50], QueueOptions::default()).unwrap();
    assert_eq!(s.running(), 2);
    let victim = s.get_task(&id, None).unwrap()[0].id.clone();

    s.cancel_task(&id, Some(&|t: &Task<u64>| t.id == victim)).unwrap();
    // The third task takes the freed slot straight away.
    assert_eq!(s.running(), 2);
    assert_eq!(slots(&s, &id), 2);
    let statuses: Vec<TaskStatus> = s.get_task(&id, None).unwrap().iter().map(|t| t.status).collect();
    assert_eq!(
        statuses,
        vec![TaskStatus::Cancelled, TaskStatus::Running, TaskStatus::Running]
    );

    wait_idle(&s).await;
    let tasks = s.get_task(&id, None).unwrap();
    assert_eq!(tasks[0].status, TaskStatus::Cancelled);
    assert!(tasks[1..].iter().all(|t| t.status == TaskStatus::Completed));
    assert_eq!(rec.count(EventKind::TaskCompleted), 2);
    assert_eq!(rec.count(EventKind::TaskCancelled), 1);
    assert_eq!(s.get_queue(None)[&id].status, QueueStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn fixed_backoff_delays_redispatch() {
    let s: Scheduler<u64> = Scheduler::new(SchedulerConfig {
        retry_delay_ms: 100,
        ..config(2, 2)
    });
    s.register_executor("flaky", |_: u64, ctx: TaskContext<u64>| async move {
        if ctx.attempt() == 1 {
            anyhow::bail!("first attempt fails");
        }
        Ok::<_, anyhow::Error>(())
    });
    let starts = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&starts);
    s.on(EventKind::TaskStarted, move |_| {
        seen.lock().unwrap().push(tokio::time::Instant::now());
        Ok(())
    });
    let rec = Recorder::attach(&s);

    let id = s.add_queue("flaky", vec![0], QueueOptions::default()).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(rec.count(EventKind::QueueEmpty), 0, "backoff is not idleness");
    assert_eq!(s.get_task(&id, None).unwrap()[0].status, TaskStatus::Pending);

    wait_idle(&s).await;
    let starts = starts.lock().unwrap().clone();
    assert_eq!(starts.len(), 2);
    assert!(starts[1] - starts[0] >= Duration::from_millis(100));
    let task = &s.get_task(&id, None).unwrap()[0];
    assert_eq!((task.status, task.retries), (TaskStatus::Completed, 1));
}

#[tokio::test(start_paused = true)]
async fn exponential_backoff_doubles_and_caps() {
    let s: Scheduler<u64> = Scheduler::new(SchedulerConfig {
        retry_delay_ms: 100,
        retry: Some(RetryConfig {
            backoff: BackoffMode::Exponential,
            max_delay_ms: 300,
        }),
        ..config(1, 1)
    });
    s.register_executor("flaky", |_: u64, ctx: TaskContext<u64>| async move {
        if ctx.attempt() <= 3 {
            anyhow::bail!("attempt {} fails", ctx.attempt());
        }
        Ok::<_, anyhow::Error>(())
    });
    let starts = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&starts);
    s.on(EventKind::TaskStarted, move |_| {
        seen.lock().unwrap().push(tokio::time::Instant::now());
        Ok(())
    });

    s.add_queue("flaky", vec![0], QueueOptions::default().with_max_retries(3))
        .unwrap();
    wait_idle(&s).await;

    let starts = starts.lock().unwrap().clone();
    let gaps: Vec<u128> = starts.windows(2).map(|w| (w[1] - w[0]).as_millis()).collect();
    assert_eq!(gaps.len(), 3);
    assert!(gaps[0] >= 100 && gaps[0] < 200);
    assert!(gaps[1] >= 200 && gaps[1] < 300);
    assert!(gaps[2] >= 300 && gaps[2] < 400);
}

#[tokio::test(start_paused = true)]
async fn admission_rejects_and_emits_queue_full() {
    let s: Scheduler<u64> = Scheduler::new(SchedulerConfig {
        max_queue_size: Some(4),
        auto_start: false,
        ..config(2, 2)
    });
    let rec = Recorder::attach(&s);

    s.add_queue("sleep", vec![1, 2], QueueOptions::default()).unwrap();
    let err = s
        .add_queue("sleep", vec![3, 4], QueueOptions::default().with_id("big"))
        .unwrap_err();
    assert!(matches!(err, SchedulerError::QueueFull { current: 2, requested: 2, max: 4, .. }));
    assert_eq!(rec.kinds(), vec![EventKind::QueueFull]);
    assert_eq!(s.get_queue(None).len(), 1);
    assert!(s.get_task(&QueueId::from("big"), None).is_none());
}

#[tokio::test(start_paused = true)]
async fn executor_updates_task_data() {
    let s: Scheduler<Value> = Scheduler::new(config(2, 2));
    s.register_executor("progress", |data: Value, ctx: TaskContext<Value>| async move {
        let mut partial = Map::new();
        partial.insert("progress".into(), json!(50));
        assert!(ctx.update_task_data(partial));
        assert_eq!(ctx.data()["progress"], json!(50));
        assert_eq!(ctx.data()["name"], data["name"]);
        ctx.modify_task_data(|d| d["progress"] = json!(100));
        Ok::<_, anyhow::Error>(())
    });
    let updates = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&updates);
    s.on(EventKind::TaskDataUpdated, move |event| {
        if let SchedulerEvent::TaskDataUpdated(update) = event {
            assert_eq!(update.data, update.task.data);
        }
        count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let id = s
        .add_queue("progress", vec![json!({"name": "a"})], QueueOptions::default())
        .unwrap();
    wait_idle(&s).await;

    let task = &s.get_task(&id, None).unwrap()[0];
    assert_eq!(task.data, json!({"name": "a", "progress": 100}));
    assert_eq!(updates.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn failing_handler_does_not_stop_dispatch() {
    let s: Scheduler<u64> = Scheduler::new(config(2, 2));
    register_sleep(&s);
    s.on(EventKind::TaskStarted, |_| anyhow::bail!("handler exploded"));
    let later = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&later);
    s.on(EventKind::TaskStarted, move |_| {
        count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let id = s.add_queue("sleep", vec![1, 1, 1], QueueOptions::default()).unwrap();
    wait_idle(&s).await;
    assert_eq!(s.get_stats(&id).unwrap().completed, 3);
    assert_eq!(later.load(Ordering::SeqCst), 0, "first error stops delivery");
}
