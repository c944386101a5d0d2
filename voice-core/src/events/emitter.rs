//! Emitter trait and stock implementations for the Event Fabric.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::BroadcastEvent;

/// Observes every [`BroadcastEvent`] a session's subsystems produce.
///
/// Implementations must not block; emission happens inline on the session's
/// serialized control path.
pub trait EventEmitter: Send + Sync {
    /// Called once per emitted event.
    fn emit(&self, event: BroadcastEvent);
}

/// Emitter that discards everything. Used where no audit sink or live
/// subscriber is attached (e.g. most unit tests).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit(&self, _event: BroadcastEvent) {}
}

/// Emitter that logs every event at debug level via `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit(&self, event: BroadcastEvent) {
        tracing::debug!(?event, "event");
    }
}

/// Emitter used in tests to assert on emission count and to inspect the
/// events that were produced.
#[derive(Clone, Default)]
pub struct CountingEventEmitter {
    count: Arc<AtomicUsize>,
    events: Arc<Mutex<Vec<BroadcastEvent>>>,
}

impl CountingEventEmitter {
    /// Creates a fresh counting emitter with no recorded events.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of events emitted so far.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Returns a clone of every event emitted so far, in order.
    #[must_use]
    pub fn events(&self) -> Vec<BroadcastEvent> {
        self.events.lock().clone()
    }
}

impl EventEmitter for CountingEventEmitter {
    fn emit(&self, event: BroadcastEvent) {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ArbitratorEvent, Event, EventSource};

    #[test]
    fn counting_emitter_records_events() {
        let emitter = CountingEventEmitter::new();
        emitter.emit(BroadcastEvent::Arbitrator(ArbitratorEvent::PlayReflex));
        emitter.emit(BroadcastEvent::Raw(Event::new(
            "s1",
            EventSource::Session,
            "noop",
            serde_json::json!({}),
        )));
        assert_eq!(emitter.count(), 2);
        assert_eq!(emitter.events().len(), 2);
    }
}
