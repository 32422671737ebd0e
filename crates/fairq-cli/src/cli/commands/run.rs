//! `fairq run` – load a workload file and run it to completion.

use anyhow::{bail, Context, Result};
use fairq_core::control::AbortToken;
use fairq_core::events::Event;
use fairq_core::manager::{
    ManagerEvent, ManagerEventKind, SimpleManager, SimpleQueue, SimpleStatus, SimpleTask, SubQueue,
};
use fairq_core::{EventKind, Scheduler, SchedulerConfig, SchedulerEvent, TaskContext};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

use super::builtins::{self, BUILTIN_TYPES};
use super::workload::{self, Workload};

/// Command-line overrides for a run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub simple: bool,
    pub max_tasks: Option<usize>,
    pub max_queues: Option<usize>,
}

pub async fn run_workload(mut cfg: SchedulerConfig, path: &Path, opts: RunOptions) -> Result<()> {
    let workload = workload::load(path)?;
    workload.check_types(&BUILTIN_TYPES)?;

    if let Some(n) = opts.max_tasks {
        cfg.max_task_concurrent = Some(n);
    }
    if let Some(n) = opts.max_queues {
        cfg.max_queue_concurrent = Some(n);
    }
    // A one-shot run has nobody to call start().
    cfg.auto_start = true;

    if opts.simple {
        run_simple(&cfg, workload).await
    } else {
        run_scheduled(cfg, workload).await
    }
}

fn describe(event: &SchedulerEvent<Value>) -> String {
    let mut line = format!("{:<18}", event.kind().name());
    if let Some(queue_id) = event.queue_id() {
        line.push_str(&format!(" queue={}", queue_id));
    }
    if let Some(task) = event.task() {
        line.push_str(&format!(" task={}", task.id));
    }
    match event {
        SchedulerEvent::TaskFailed(e) => line.push_str(&format!(" error={:?}", e.error)),
        SchedulerEvent::TaskRetry(e) => line.push_str(&format!(" retry={}", e.attempt)),
        SchedulerEvent::TaskDataUpdated(e) => line.push_str(&format!(" data={}", e.data)),
        _ => {}
    }
    line
}

fn all_finished(scheduler: &Scheduler<Value>) -> bool {
    scheduler.running() == 0
        && scheduler
            .get_queue(None)
            .values()
            .all(|q| q.status.is_terminal())
}

async fn run_scheduled(cfg: SchedulerConfig, workload: Workload) -> Result<()> {
    let scheduler: Scheduler<Value> = Scheduler::new(cfg);

    for task_type in BUILTIN_TYPES {
        scheduler.register_executor(task_type, move |data: Value, ctx: TaskContext<Value>| async move {
            let outputs = builtins::execute(task_type, data, ctx.attempt(), ctx.abort_token()).await?;
            if !outputs.is_empty() {
                ctx.update_task_data(outputs);
            }
            Ok::<_, anyhow::Error>(())
        });
    }

    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
    let progress = Arc::new(Notify::new());
    for kind in EventKind::ALL {
        let line_tx = line_tx.clone();
        let progress = Arc::clone(&progress);
        scheduler.on(kind, move |event| {
            let _ = line_tx.send(describe(event));
            if matches!(kind, EventKind::QueueCompleted | EventKind::QueueEmpty) {
                progress.notify_one();
            }
            Ok(())
        });
    }
    drop(line_tx);

    for (i, spec) in workload.queues.iter().enumerate() {
        let id = scheduler
            .add_queue(&spec.task_type, spec.expanded_items(), spec.options())
            .with_context(|| format!("add queue #{} ({})", i, spec.task_type))?;
        tracing::debug!(queue_id = %id, task_type = %spec.task_type, "queued");
    }

    let mut interrupted = false;
    while !all_finished(&scheduler) {
        tokio::select! {
            Some(line) = line_rx.recv() => println!("{}", line),
            _ = progress.notified() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("interrupted, cancelling all queues");
                for id in scheduler.queue_ids() {
                    if let Err(e) = scheduler.cancel_task(&id, None) {
                        tracing::warn!(queue_id = %id, "cancel failed: {}", e);
                    }
                }
                interrupted = true;
                break;
            }
        }
    }
    while let Ok(line) = line_rx.try_recv() {
        println!("{}", line);
    }

    println!();
    println!(
        "{:<24} {:<8} {:<6} {:<10} {:>6} {:>6} {:>9} {:>6}",
        "QUEUE", "TYPE", "PRIO", "STATUS", "DONE", "FAILED", "CANCELLED", "TOTAL"
    );
    let mut failed = 0;
    for queue in scheduler.get_queue(None).values() {
        let stats = queue.stats();
        failed += stats.failed;
        println!(
            "{:<24} {:<8} {:<6} {:<10} {:>6} {:>6} {:>9} {:>6}",
            queue.id,
            queue.task_type,
            queue.priority,
            queue.status,
            stats.completed,
            stats.failed,
            stats.cancelled,
            stats.total
        );
    }

    if interrupted {
        bail!("run interrupted");
    }
    if failed > 0 {
        bail!("{} task(s) failed", failed);
    }
    Ok(())
}

fn describe_simple(event: &ManagerEvent) -> String {
    let name = event.kind().name();
    match event {
        ManagerEvent::QueueStarted { queue_id } | ManagerEvent::QueueCompleted { queue_id } => {
            format!("{:<18} queue={}", name, queue_id)
        }
        ManagerEvent::QueueFailed { queue_id, error } => {
            format!("{:<18} queue={} error={:?}", name, queue_id, error)
        }
        ManagerEvent::SubQueueStarted {
            queue_id,
            sub_queue_id,
        }
        | ManagerEvent::SubQueueCompleted {
            queue_id,
            sub_queue_id,
        } => format!("{:<18} queue={} sub_queue={}", name, queue_id, sub_queue_id),
        ManagerEvent::TaskStarted { task_id } | ManagerEvent::TaskCompleted { task_id } => {
            format!("{:<18} task={}", name, task_id)
        }
        ManagerEvent::TaskFailed { task_id, error } => {
            format!("{:<18} task={} error={:?}", name, task_id, error)
        }
    }
}

/// Split a workload queue into sub-queues of `batch` tasks each.
fn build_simple_queue(id: &str, task_type: &'static str, items: Vec<Value>, batch: Option<usize>) -> SimpleQueue {
    let size = batch.filter(|n| *n > 0).unwrap_or(items.len().max(1));
    let mut sub_queues = Vec::new();
    let mut items = items.into_iter().enumerate().peekable();
    while items.peek().is_some() {
        let sub_id = format!("{}-part{}", id, sub_queues.len());
        let tasks = items
            .by_ref()
            .take(size)
            .map(|(n, data)| {
                SimpleTask::new(format!("{}-{}", id, n), move || async move {
                    builtins::execute(task_type, data, 1, AbortToken::default()).await?;
                    Ok::<_, anyhow::Error>(())
                })
            })
            .collect();
        sub_queues.push(SubQueue { id: sub_id, tasks });
    }
    SimpleQueue {
        id: id.to_string(),
        sub_queues,
    }
}

async fn run_simple(cfg: &SchedulerConfig, workload: Workload) -> Result<()> {
    let manager = SimpleManager::new(
        cfg.queue_limit().unwrap_or(usize::MAX),
        cfg.task_limit().unwrap_or(usize::MAX),
    );
    for kind in ManagerEventKind::ALL {
        manager.on(kind, |event| {
            println!("{}", describe_simple(event));
            Ok(())
        });
    }

    let mut ids = Vec::with_capacity(workload.queues.len());
    for (i, spec) in workload.queues.iter().enumerate() {
        let id = spec.id.clone().unwrap_or_else(|| format!("queue-{}", i));
        let task_type = BUILTIN_TYPES
            .iter()
            .copied()
            .find(|t| *t == spec.task_type)
            .with_context(|| format!("unknown task type {:?}", spec.task_type))?;
        manager.add_queue(build_simple_queue(&id, task_type, spec.expanded_items(), spec.batch));
        ids.push(id);
    }

    tokio::select! {
        _ = manager.join() => {}
        _ = tokio::signal::ctrl_c() => {
            bail!("run interrupted");
        }
    }

    println!();
    println!("{:<24} {:<10}", "QUEUE", "STATUS");
    let mut failed = 0;
    for id in &ids {
        let status = manager.status(id);
        if status == Some(SimpleStatus::Failed) {
            failed += 1;
        }
        let label = match status {
            Some(SimpleStatus::Waiting) => "waiting",
            Some(SimpleStatus::Running) => "running",
            Some(SimpleStatus::Completed) => "completed",
            Some(SimpleStatus::Failed) => "failed",
            None => "-",
        };
        println!("{:<24} {:<10}", id, label);
    }

    if failed > 0 {
        bail!("{} queue(s) failed", failed);
    }
    Ok(())
}
