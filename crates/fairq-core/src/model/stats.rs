//! Per-queue task counts (CLI-friendly snapshot).

use serde::Serialize;

/// Counts of a queue's tasks by status, as returned by `Scheduler::get_stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub pending: usize,
    pub running: usize,
    pub paused: usize,
    pub cancelled: usize,
}

impl QueueStats {
    /// Tasks that reached a terminal status.
    pub fn finished(&self) -> usize {
        self.completed + self.failed + self.cancelled
    }

    /// Fraction finished in [0.0, 1.0]; an empty queue counts as done.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        (self.finished() as f64 / self.total as f64).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_counts_terminal_tasks() {
        let s = QueueStats {
            total: 4,
            completed: 1,
            failed: 1,
            pending: 2,
            ..QueueStats::default()
        };
        assert_eq!(s.finished(), 2);
        assert!((s.fraction() - 0.5).abs() < 1e-9);
        assert_eq!(QueueStats::default().fraction(), 1.0);
    }
}
