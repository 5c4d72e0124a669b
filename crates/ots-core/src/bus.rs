use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use ots_protocol::{Event, EventKind};
use tracing::warn;

/// Queue depth used when the configuration does not say otherwise.
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// Result of [`EventBus::post`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOutcome {
    Queued,
    /// The queue was full; the oldest event (of this kind) was discarded.
    DroppedOldest(EventKind),
}

#[derive(Debug)]
struct Queue {
    events: VecDeque<Event>,
    capacity: usize,
    dropped: u64,
}

impl Queue {
    fn push(&mut self, event: Event) -> PostOutcome {
        let mut outcome = PostOutcome::Queued;
        if self.events.len() >= self.capacity {
            if let Some(oldest) = self.events.pop_front() {
                self.dropped += 1;
                warn!(
                    dropped = %oldest.kind,
                    incoming = %event.kind,
                    total_dropped = self.dropped,
                    "event queue full, dropping oldest"
                );
                outcome = PostOutcome::DroppedOldest(oldest.kind);
            }
        }
        self.events.push_back(event);
        outcome
    }
}

fn lock(inner: &Mutex<Queue>) -> MutexGuard<'_, Queue> {
    // A producer that panicked mid-push leaves the queue structurally valid.
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A bounded FIFO event queue shared between producers and the runtime.
///
/// The runtime loop uses the bus in a two-phase cycle:
/// 1. **Post**: the transport reader, input polling and the runtime itself
///    push events. Posting never blocks; when the queue is full the oldest
///    event is dropped with a warning.
/// 2. **Pop**: the single consumer pulls events out one at a time, in
///    arrival order, and fans each out to the registry.
///
/// The lock is held only for one push or pop.
#[derive(Debug, Clone)]
pub struct EventBus {
    inner: Arc<Mutex<Queue>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl EventBus {
    /// Create an empty bus. A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(Queue {
                events: VecDeque::with_capacity(capacity),
                capacity,
                dropped: 0,
            })),
        }
    }

    /// A cloneable handle producers on other threads can post through.
    pub fn sender(&self) -> EventSender {
        EventSender {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Enqueue an event at the back of the queue.
    pub fn post(&self, event: Event) -> PostOutcome {
        lock(&self.inner).push(event)
    }

    /// Remove and return the oldest pending event.
    pub fn pop(&self) -> Option<Event> {
        lock(&self.inner).events.pop_front()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).events.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        lock(&self.inner).capacity
    }

    /// Events discarded by overflow since creation.
    pub fn dropped(&self) -> u64 {
        lock(&self.inner).dropped
    }
}

/// Producer half of an [`EventBus`].
#[derive(Debug, Clone)]
pub struct EventSender {
    inner: Arc<Mutex<Queue>>,
}

impl EventSender {
    pub fn post(&self, event: Event) -> PostOutcome {
        lock(&self.inner).push(event)
    }
}
