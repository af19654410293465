use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// Cross-context signal. One well-defined message instead of ad hoc
/// event-name strings: the only coordination the core needs is "the
/// cursor for this feed changed in durable storage".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    CursorChanged { feed: String },
}

pub type Listener = dyn Fn(&Signal) + Send + Sync;

/// Broadcasts cursor-change signals to every execution context sharing
/// the same durable storage. Listeners are held weakly; a subscriber
/// keeps its own callback alive and is dropped from the bus with it, so
/// teardown needs no explicit deregistration.
#[derive(Clone, Default)]
pub struct SignalBus {
    listeners: Arc<Mutex<Vec<Weak<Listener>>>>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: &Arc<Listener>) {
        self.listeners.lock().push(Arc::downgrade(listener));
    }

    pub fn emit(&self, signal: Signal) {
        // Collect live listeners first so callbacks run without the lock
        let live: Vec<Arc<Listener>> = {
            let mut listeners = self.listeners.lock();
            listeners.retain(|l| l.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };

        for listener in live {
            listener(&signal);
        }
    }

    #[cfg(test)]
    fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .iter()
            .filter(|l| l.strong_count() > 0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_emit_reaches_all_listeners() {
        let bus = SignalBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let listeners: Vec<Arc<Listener>> = (0..2)
            .map(|_| {
                let hits = hits.clone();
                let listener: Arc<Listener> = Arc::new(move |signal: &Signal| {
                    assert_eq!(
                        *signal,
                        Signal::CursorChanged {
                            feed: "submissions".to_string()
                        }
                    );
                    hits.fetch_add(1, Ordering::SeqCst);
                });
                bus.subscribe(&listener);
                listener
            })
            .collect();

        bus.emit(Signal::CursorChanged {
            feed: "submissions".to_string(),
        });
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        drop(listeners);
    }

    #[test]
    fn test_dropped_listeners_are_pruned() {
        let bus = SignalBus::new();
        let listener: Arc<Listener> = Arc::new(|_| {});
        bus.subscribe(&listener);
        assert_eq!(bus.listener_count(), 1);

        drop(listener);
        bus.emit(Signal::CursorChanged {
            feed: "submissions".to_string(),
        });
        assert_eq!(bus.listener_count(), 0);
    }
}
