//! Pub/sub fan-out for input events.
//!
//! One publisher (the input scanner) feeds N subscribers, each behind a
//! bounded channel. Delivery is strictly non-blocking: a subscriber that
//! stops draining loses events (counted, never surfaced as an error) while
//! everyone else keeps receiving. Subscribers unregister with the token
//! returned at subscription time, so nobody has to hold a bus pointer
//! inside the subscription itself.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::input::{EventSource, InputEvent};

/// Events buffered per subscriber before the bus starts dropping.
pub const SUBSCRIBER_CAPACITY: usize = 100;

// ── EventFilter ──────────────────────────────────────────────────

/// Optional per-subscriber match. Unset fields are wildcards; an event
/// passes iff every set field matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub source: Option<EventSource>,
    pub event_type: Option<u16>,
}

impl EventFilter {
    /// Match a single source, any event type.
    pub fn source(source: EventSource) -> Self {
        Self {
            source: Some(source),
            event_type: None,
        }
    }

    pub fn matches(&self, event: &InputEvent) -> bool {
        self.source.is_none_or(|s| s == event.source)
            && self.event_type.is_none_or(|t| t == event.event_type)
    }
}

// ── Subscription ─────────────────────────────────────────────────

/// Opaque handle identifying a registration on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberToken(u64);

/// The receiving half handed to a subscriber.
pub struct Subscription {
    token: SubscriberToken,
    rx: mpsc::Receiver<InputEvent>,
}

impl Subscription {
    pub fn token(&self) -> SubscriberToken {
        self.token
    }

    /// Receive the next event; `None` once unsubscribed.
    pub async fn recv(&mut self) -> Option<InputEvent> {
        self.rx.recv().await
    }

    /// Non-blocking receive, for drain loops and tests.
    pub fn try_recv(&mut self) -> Option<InputEvent> {
        self.rx.try_recv().ok()
    }

    /// Split into the unsubscribe token and the raw receiver, for callers
    /// that adapt the channel into a stream.
    pub fn into_parts(self) -> (SubscriberToken, mpsc::Receiver<InputEvent>) {
        (self.token, self.rx)
    }
}

// ── EventBus ─────────────────────────────────────────────────────

struct Registration {
    token: SubscriberToken,
    filter: Option<EventFilter>,
    tx: mpsc::Sender<InputEvent>,
}

/// Fan-out hub between the input scanner and its consumers.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Registration>>,
    next_token: AtomicU64,
    dropped: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber with an optional filter.
    pub fn subscribe(&self, filter: Option<EventFilter>) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let token = SubscriberToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.lock_subscribers().push(Registration { token, filter, tx });
        Subscription { token, rx }
    }

    /// Remove a registration and close its channel. Idempotent: unknown or
    /// already-removed tokens are a no-op.
    pub fn unsubscribe(&self, token: SubscriberToken) {
        self.lock_subscribers().retain(|reg| reg.token != token);
    }

    /// Deliver an event to every matching subscriber without ever waiting.
    /// Full channels drop the event; closed channels are pruned.
    pub fn publish(&self, event: InputEvent) {
        let mut subscribers = self.lock_subscribers();
        subscribers.retain(|reg| {
            if reg.filter.is_some_and(|f| !f.matches(&event)) {
                return true;
            }
            match reg.tx.try_send(event) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }

    /// Events dropped because a subscriber's buffer was full.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Current number of registrations.
    pub fn subscriber_count(&self) -> usize {
        self.lock_subscribers().len()
    }

    fn lock_subscribers(&self) -> std::sync::MutexGuard<'_, Vec<Registration>> {
        // A panicked holder cannot leave the table half-updated; keep
        // serving rather than poisoning every publisher.
        self.subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

// ── Tests ────────────────────────────────────────────────────────
