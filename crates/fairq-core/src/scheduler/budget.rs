//! Global running-task budget shared by all queues.
//!
//! Lives inside the scheduler state, so every reserve/release happens under
//! the scheduler lock together with the matching `task_slots` update.

/// Counts running tasks against the optional `max_task_concurrent` cap.
#[derive(Debug, Clone)]
pub(crate) struct SlotBudget {
    max_total: Option<usize>,
    in_use: usize,
}

impl SlotBudget {
    pub(crate) fn new(max_total: Option<usize>) -> Self {
        Self {
            max_total,
            in_use: 0,
        }
    }

    /// Slots currently reserved (the global running counter).
    pub(crate) fn in_use(&self) -> usize {
        self.in_use
    }

    pub(crate) fn max_total(&self) -> Option<usize> {
        self.max_total
    }

    /// Free slots; `None` when the budget is unbounded.
    pub(crate) fn available(&self) -> Option<usize> {
        self.max_total.map(|max| max.saturating_sub(self.in_use))
    }

    pub(crate) fn has_capacity(&self) -> bool {
        self.available().map_or(true, |n| n > 0)
    }

    /// Reserve one slot if capacity allows.
    pub(crate) fn reserve(&mut self) -> bool {
        if !self.has_capacity() {
            return false;
        }
        self.in_use += 1;
        true
    }

    /// Release one slot. Call once per successful `reserve`.
    pub(crate) fn release(&mut self) {
        debug_assert!(self.in_use > 0, "released more slots than reserved");
        self.in_use = self.in_use.saturating_sub(1);
    }
}
