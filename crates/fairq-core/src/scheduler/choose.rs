//! Weighted fair-share queue selection.

use std::cmp::Ordering;

use indexmap::IndexMap;

use crate::model::{Queue, QueueId, QueueStatus};

/// Fair-share deficit of a queue: its priority-proportional share of
/// `max_tasks` minus the slots it already holds.
pub(crate) fn deficit(max_tasks: usize, weight: f64, total_weight: f64, task_slots: usize) -> f64 {
    if total_weight <= 0.0 {
        return -(task_slots as f64);
    }
    max_tasks as f64 * (weight / total_weight) - task_slots as f64
}

/// Orders the Running queues by how much they are owed a slot.
///
/// With a task cap, the largest deficit comes first; without one, the queue
/// holding the fewest slots does. Ties keep insertion order.
pub(crate) fn rank_running_queues<T>(
    queues: &IndexMap<QueueId, Queue<T>>,
    max_tasks: Option<usize>,
    weighted: bool,
) -> Vec<usize> {
    let weight = |q: &Queue<T>| if weighted { q.priority } else { 1.0 };
    let mut running: Vec<usize> = queues
        .values()
        .enumerate()
        .filter(|(_, q)| q.status == QueueStatus::Running)
        .map(|(i, _)| i)
        .collect();

    match max_tasks {
        Some(max) => {
            let total: f64 = running.iter().map(|&i| weight(&queues[i])).sum();
            let mut scored: Vec<(usize, f64)> = running
                .iter()
                .map(|&i| {
                    let q = &queues[i];
                    (i, deficit(max, weight(q), total, q.task_slots))
                })
                .collect();
            // `sort_by` is stable, so equal deficits keep insertion order.
            scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
            scored.into_iter().map(|(i, _)| i).collect()
        }
        None => {
            running.sort_by_key(|&i| queues[i].task_slots);
            running
        }
    }
}
