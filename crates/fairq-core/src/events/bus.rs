//! Synchronous publish/subscribe keyed by event kind.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use anyhow::Result;

/// An event that can be routed by its fieldless discriminant.
pub trait Event {
    type Kind: Copy + Eq + Hash + std::fmt::Debug;

    fn kind(&self) -> Self::Kind;
}

/// Handle returned by `EventBus::on`, used to unregister the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Handler<E> = Arc<dyn Fn(&E) -> Result<()> + Send + Sync>;

/// Registry of handlers per event kind.
///
/// Handlers run synchronously in registration order. The first handler that
/// returns an error stops delivery of that event to the remaining handlers and
/// the error is handed back to the emitter.
pub struct EventBus<E: Event> {
    handlers: RwLock<HashMap<E::Kind, Vec<(HandlerId, Handler<E>)>>>,
    next_id: AtomicU64,
}

impl<E: Event> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<E: Event> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events of `kind`.
    pub fn on<F>(&self, kind: E::Kind, handler: F) -> HandlerId
    where
        F: Fn(&E) -> Result<()> + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        handlers.entry(kind).or_default().push((id, Arc::new(handler)));
        id
    }

    /// Remove the registration `id` for `kind`. Returns whether it was present.
    pub fn off(&self, kind: E::Kind, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        let Some(list) = handlers.get_mut(&kind) else {
            return false;
        };
        match list.iter().position(|(h, _)| *h == id) {
            Some(index) => {
                list.remove(index);
                true
            }
            None => false,
        }
    }

    /// Deliver `event` to every handler registered for its kind.
    pub fn emit(&self, event: &E) -> Result<()> {
        // Snapshot so handlers may call on/off without deadlocking.
        let snapshot: Vec<Handler<E>> = {
            let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
            match handlers.get(&event.kind()) {
                Some(list) => list.iter().map(|(_, h)| Arc::clone(h)).collect(),
                None => return Ok(()),
            }
        };
        for handler in snapshot {
            handler(event)?;
        }
        Ok(())
    }

    pub fn handler_count(&self, kind: E::Kind) -> usize {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        handlers.get(&kind).map_or(0, Vec::len)
    }
}
