//! Event recorder: subscribes to every event kind and keeps them in order.

use std::sync::{Arc, Mutex};

use fairq_core::events::Event;
use fairq_core::{EventKind, Scheduler, SchedulerEvent, TaskData};

#[derive(Clone)]
pub struct Recorder<T> {
    events: Arc<Mutex<Vec<SchedulerEvent<T>>>>,
}

impl<T: TaskData> Recorder<T> {
    pub fn attach(s: &Scheduler<T>) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        for kind in EventKind::ALL {
            let events = Arc::clone(&events);
            s.on(kind, move |event| {
                events.lock().unwrap().push(event.clone());
                Ok(())
            });
        }
        Self { events }
    }

    pub fn events(&self) -> Vec<SchedulerEvent<T>> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events().iter().map(Event::kind).collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events().iter().filter(|e| e.kind() == kind).count()
    }
}
