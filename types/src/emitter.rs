//! Typed listener registry.
//!
//! Each event source owns one `Emitter<E>` per event type; listeners are
//! called synchronously, in registration order, on `emit`.

use std::fmt;

type Listener<E> = Box<dyn FnMut(&E) + Send>;

/// Handle returned by [`Emitter::on`], used to remove the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub struct Emitter<E> {
    listeners: Vec<(ListenerId, Listener<E>)>,
    next_id: u64,
}

impl<E> Default for Emitter<E> {
    fn default() -> Self {
        Self {
            listeners: Vec::new(),
            next_id: 0,
        }
    }
}

impl<E> fmt::Debug for Emitter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl<E> Emitter<E> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&mut self, listener: impl FnMut(&E) + Send + 'static) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Returns `false` if the listener was already removed.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    pub fn emit(&mut self, event: &E) {
        for (_, listener) in &mut self.listeners {
            listener(event);
        }
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn listeners_run_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut emitter = Emitter::<u32>::new();
        for tag in ["a", "b"] {
            let seen = Arc::clone(&seen);
            emitter.on(move |n| seen.lock().unwrap().push(format!("{tag}{n}")));
        }
        emitter.emit(&1);
        assert_eq!(*seen.lock().unwrap(), ["a1", "b1"]);
    }

    #[test]
    fn removed_listener_is_not_called() {
        let hits = Arc::new(Mutex::new(0));
        let mut emitter = Emitter::<()>::new();
        let counter = Arc::clone(&hits);
        let id = emitter.on(move |_| *counter.lock().unwrap() += 1);
        emitter.emit(&());
        assert!(emitter.remove_listener(id));
        assert!(!emitter.remove_listener(id));
        emitter.emit(&());
        assert_eq!(*hits.lock().unwrap(), 1);
        assert_eq!(emitter.listener_count(), 0);
    }
}
