//! Counting semaphore with FIFO hand-off.
//!
//! A plain global concurrency cap for callers that do not need weighted
//! queues. `release` gives the freed unit straight to the oldest waiter, so a
//! woken waiter never has to re-check availability.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;

#[derive(Debug)]
struct GateState {
    count: usize,
    waiters: VecDeque<oneshot::Sender<SemaphorePermit>>,
}

/// Shared counting semaphore. Clones refer to the same counter.
#[derive(Debug, Clone)]
pub struct Semaphore {
    state: Arc<Mutex<GateState>>,
}

/// One unit of the semaphore. Returns the unit when dropped.
#[derive(Debug)]
pub struct SemaphorePermit {
    owner: Option<Semaphore>,
}

impl SemaphorePermit {
    fn armed(owner: Semaphore) -> Self {
        Self { owner: Some(owner) }
    }

    /// Keep the unit without returning it on drop; pair with a manual
    /// `Semaphore::release` later.
    pub fn forget(mut self) {
        self.owner = None;
    }
}

impl Drop for SemaphorePermit {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.take() {
            owner.release();
        }
    }
}

impl Semaphore {
    pub fn new(count: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(GateState {
                count,
                waiters: VecDeque::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Units free right now.
    pub fn available(&self) -> usize {
        self.lock().count
    }

    /// Callers currently suspended in `acquire`.
    pub fn waiting(&self) -> usize {
        self.lock().waiters.len()
    }

    /// Take one unit, suspending in FIFO order while none is free.
    pub async fn acquire(&self) -> SemaphorePermit {
        loop {
            let rx = {
                let mut state = self.lock();
                if state.count > 0 {
                    state.count -= 1;
                    return SemaphorePermit::armed(self.clone());
                }
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                rx
            };
            // The sender is only consumed by `release`, which always sends.
            if let Ok(permit) = rx.await {
                return permit;
            }
        }
    }

    /// Take one unit only if one is free right now.
    pub fn try_acquire(&self) -> Option<SemaphorePermit> {
        let mut state = self.lock();
        if state.count > 0 {
            state.count -= 1;
            Some(SemaphorePermit::armed(self.clone()))
        } else {
            None
        }
    }

    /// Return one unit. If callers are waiting, the oldest one still alive
    /// receives it directly and the count is left unchanged.
    pub fn release(&self) {
        let mut state = self.lock();
        while let Some(tx) = state.waiters.pop_front() {
            match tx.send(SemaphorePermit::armed(self.clone())) {
                Ok(()) => return,
                // Waiter gave up; disarm so the drop does not re-enter.
                Err(permit) => permit.forget(),
            }
        }
        state.count += 1;
    }
}
