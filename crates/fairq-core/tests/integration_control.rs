//! Integration tests: pause/resume/cancel/clear/remove and the counter
//! invariants that must hold across them.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::recorder::Recorder;
use common::{config, register_sleep, slots, wait_idle, wait_until};
use fairq_core::events::QueueDrained;
use fairq_core::{
    EventKind, QueueOptions, QueueStatus, Scheduler, SchedulerEvent, Task, TaskStatus,
};

/// Every event: Σ task_slots == running <= max tasks, running queues <= max queues.
fn check_invariants(s: &Scheduler<u64>, violations: Arc<Mutex<Vec<String>>>) {
    let probe = s.clone();
    for kind in EventKind::ALL {
        let probe = probe.clone();
        let violations = Arc::clone(&violations);
        s.on(kind, move |_| {
            let queues = probe.get_queue(None);
            let slot_sum: usize = queues.values().map(|q| q.task_slots).sum();
            let running = probe.running();
            let running_queues = queues
                .values()
                .filter(|q| q.status == QueueStatus::Running)
                .count();
            let cfg = probe.config();
            let mut v = violations.lock().unwrap();
            if slot_sum != running {
                v.push(format!("{}: slots {} != running {}", kind.name(), slot_sum, running));
            }
            if cfg.task_limit().map_or(false, |max| running > max) {
                v.push(format!("{}: running {} over limit", kind.name(), running));
            }
            if cfg.queue_limit().map_or(false, |max| running_queues > max) {
                v.push(format!("{}: {} running queues over limit", kind.name(), running_queues));
            }
            Ok(())
        });
    }
}

#[tokio::test(start_paused = true)]
async fn invariants_hold_through_mixed_control() {
    let s: Scheduler<u64> = Scheduler::new(config(3, 2));
    register_sleep(&s);
    let violations = Arc::new(Mutex::new(Vec::new()));
    check_invariants(&s, Arc::clone(&violations));

    let a = s.add_queue("sleep", vec![20; 6], QueueOptions::default().with_priority(2.0)).unwrap();
    let b = s.add_queue("sleep", vec![15; 6], QueueOptions::default()).unwrap();
    let c = s.add_queue("sleep", vec![5; 4], QueueOptions::default()).unwrap();

    tokio::time::sleep(Duration::from_millis(7)).await;
    s.pause_task(&a, None).unwrap();
    tokio::time::sleep(Duration::from_millis(7)).await;
    s.cancel_task(&b, Some(&|t: &Task<u64>| t.status == TaskStatus::Running)).unwrap();
    tokio::time::sleep(Duration::from_millis(7)).await;
    s.resume_task(&a, None).unwrap();
    wait_idle(&s).await;

    assert!(violations.lock().unwrap().is_empty(), "{:?}", violations.lock().unwrap());
    assert_eq!(s.running(), 0);
    for id in [&a, &b, &c] {
        let stats = s.get_stats(id).unwrap();
        assert_eq!(stats.pending + stats.running + stats.paused, 0);
    }
    assert_eq!(s.get_stats(&a).unwrap().completed, 6);
}

#[tokio::test(start_paused = true)]
async fn whole_queue_pause_holds_pending_work() {
    let s: Scheduler<u64> = Scheduler::new(config(2, 2));
    register_sleep(&s);
    let rec = Recorder::attach(&s);
    let id = s.add_queue("sleep", vec![10; 4], QueueOptions::default()).unwrap();

    s.pause_task(&id, None).unwrap();
    assert_eq!(s.running(), 0);
    assert_eq!(s.get_queue(None)[&id].status, QueueStatus::Paused);
    let stats = s.get_stats(&id).unwrap();
    assert_eq!((stats.paused, stats.pending), (2, 2));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(s.get_stats(&id).unwrap().completed, 0, "paused queue is not dispatched");
    assert_eq!(rec.count(EventKind::TaskPaused), 2);
    assert_eq!(rec.count(EventKind::QueuePaused), 1);

    s.resume_task(&id, None).unwrap();
    assert_eq!(rec.count(EventKind::TaskResumed), 2);
    assert_eq!(rec.count(EventKind::QueueResumed), 1);
    wait_idle(&s).await;
    assert_eq!(s.get_stats(&id).unwrap().completed, 4);
}

#[tokio::test(start_paused = true)]
async fn filtered_pause_pauses_queue_once_nothing_runs() {
    let s: Scheduler<u64> = Scheduler::new(config(1, 1));
    register_sleep(&s);
    let id = s.add_queue("sleep", vec![30, 30], QueueOptions::default()).unwrap();
    let running = |t: &Task<u64>| t.status == TaskStatus::Running;

    s.pause_task(&id, Some(&running)).unwrap();
    assert_eq!(s.get_queue(None)[&id].status, QueueStatus::Paused);
    let first = s.get_task(&id, None).unwrap()[0].id.clone();

    s.resume_task(&id, Some(&|t: &Task<u64>| t.id == first)).unwrap();
    wait_idle(&s).await;
    assert_eq!(s.get_stats(&id).unwrap().completed, 2);
}

#[tokio::test(start_paused = true)]
async fn terminal_queue_and_tasks_stay_terminal() {
    let s: Scheduler<u64> = Scheduler::new(config(2, 2));
    register_sleep(&s);
    let id = s.add_queue("sleep", vec![10, 10, 10], QueueOptions::default()).unwrap();

    s.cancel_task(&id, None).unwrap();
    assert_eq!(s.get_queue(None)[&id].status, QueueStatus::Cancelled);
    assert!(s.get_task(&id, None).unwrap().iter().all(|t| t.status == TaskStatus::Cancelled));

    s.resume_task(&id, None).unwrap();
    s.pause_task(&id, None).unwrap();
    assert_eq!(s.start(Some(&id)), Ok(false));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(s.get_queue(None)[&id].status, QueueStatus::Cancelled);
    assert!(s.get_task(&id, None).unwrap().iter().all(|t| t.status == TaskStatus::Cancelled));
    assert_eq!(s.running(), 0);
}

#[tokio::test(start_paused = true)]
async fn queue_limit_promotes_in_insertion_order() {
    let s: Scheduler<u64> = Scheduler::new(config(4, 1));
    register_sleep(&s);
    let order = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&order);
    s.on(EventKind::QueueStarted, move |event| {
        seen.lock().unwrap().push(event.queue_id().cloned().unwrap());
        Ok(())
    });

    let ids: Vec<_> = (0..3)
        .map(|_| s.add_queue("sleep", vec![5, 5], QueueOptions::default()).unwrap())
        .collect();
    assert_eq!(slots(&s, &ids[0]), 2);
    wait_idle(&s).await;
    assert_eq!(*order.lock().unwrap(), ids);
}

#[tokio::test(start_paused = true)]
async fn clear_with_predicate_keeps_finished_tasks() {
    let s: Scheduler<u64> = Scheduler::new(config(1, 1));
    register_sleep(&s);
    let rec = Recorder::attach(&s);
    let id = s.add_queue("sleep", vec![5, 50, 50], QueueOptions::default()).unwrap();
    wait_until(&s, |s| s.get_stats(&id).unwrap().completed == 1).await;

    s.clear_queue(&id, Some(&|_: &Task<u64>| true)).unwrap();
    let left = s.get_task(&id, None).unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].status, TaskStatus::Completed);
    assert_eq!(rec.count(EventKind::TaskCleared), 2);
    assert_eq!(rec.count(EventKind::QueueCleared), 0);
    assert_eq!(s.running(), 0);

    s.remove_task(&id, None).unwrap();
    assert!(s.get_queue(None).is_empty());
    assert_eq!(rec.count(EventKind::QueueRemoved), 1);
    let empties: Vec<_> = rec
        .events()
        .into_iter()
        .filter(|e| matches!(e, SchedulerEvent::QueueEmpty(QueueDrained { queue_id: None })))
        .collect();
    assert_eq!(empties.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn manual_start_runs_one_queue_at_a_time() {
    let s: Scheduler<u64> = Scheduler::new(fairq_core::SchedulerConfig {
        auto_start: false,
        ..config(2, 1)
    });
    register_sleep(&s);
    let a = s.add_queue("sleep", vec![5], QueueOptions::default()).unwrap();
    let b = s.add_queue("sleep", vec![5], QueueOptions::default()).unwrap();

    assert_eq!(s.start(None), Ok(true));
    assert_eq!(s.start(None), Ok(false), "queue limit reached");
    assert_eq!(s.get_queue(None)[&b].status, QueueStatus::Pending);

    wait_until(&s, |s| s.get_queue(None)[&a].status == QueueStatus::Completed).await;
    assert_eq!(s.get_queue(None)[&b].status, QueueStatus::Pending);
    assert_eq!(s.start(None), Ok(true));
    wait_idle(&s).await;
}

#[tokio::test(start_paused = true)]
async fn queue_left_with_only_paused_tasks_yields_its_queue_slot() {
    let s: Scheduler<u64> = Scheduler::new(config(2, 1));
    register_sleep(&s);
    let rec = Recorder::attach(&s);
    let a = s.add_queue("sleep", vec![50, 10], QueueOptions::default()).unwrap();
    let b = s.add_queue("sleep", vec![5], QueueOptions::default()).unwrap();
    assert_eq!(s.get_queue(None)[&b].status, QueueStatus::Pending);

    let first = s.get_task(&a, None).unwrap()[0].id.clone();
    s.pause_task(&a, Some(&|t: &Task<u64>| t.id == first)).unwrap();
    assert_eq!(s.get_queue(None)[&a].status, QueueStatus::Running, "second task still runs");

    wait_until(&s, |s| s.get_queue(None)[&b].status == QueueStatus::Completed).await;
    assert_eq!(s.get_queue(None)[&a].status, QueueStatus::Paused);
    assert_eq!(rec.count(EventKind::QueuePaused), 1);
    let stats = s.get_stats(&a).unwrap();
    assert_eq!((stats.paused, stats.completed, stats.running), (1, 1, 0));

    s.resume_task(&a, None).unwrap();
    wait_idle(&s).await;
    assert_eq!(s.get_queue(None)[&a].status, QueueStatus::Completed);
    assert_eq!(s.get_stats(&a).unwrap().completed, 2);
}
