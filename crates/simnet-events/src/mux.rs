//! Typed publish/subscribe event mux.
//!
//! Subscribers register for one or more [`EventType`]s and receive every
//! matching [`Event`] on their own unbounded queue, in the order events were
//! posted. Posting happens under the mux lock, so concurrent posters are
//! serialised into a single total order that every subscriber observes.
//!
//! Unsubscribing removes the sender side of the queue. Events already queued
//! are still delivered, after which [`Subscription::recv`] yields `None`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use simnet_types::{Event, EventType};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Errors returned by the event mux.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MuxError {
    /// The mux has been stopped and accepts no new posts or subscribers.
    #[error("event mux is stopped")]
    Stopped,

    /// A subscription was requested without any event types.
    #[error("subscription must name at least one event type")]
    NoEventTypes,
}

/// Identifier of a live subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl core::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Debug)]
struct Subscriber {
    types: BTreeSet<EventType>,
    tx: mpsc::UnboundedSender<Event>,
}

#[derive(Debug, Default)]
struct MuxState {
    subscribers: BTreeMap<SubscriptionId, Subscriber>,
    next_id: u64,
    stopped: bool,
}

/// Fan-out hub routing events to subscribers by type.
#[derive(Debug, Default)]
pub struct EventMux {
    state: Mutex<MuxState>,
}

impl EventMux {
    /// Create a new, running mux.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, MuxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register interest in the given event types.
    ///
    /// # Errors
    ///
    /// Returns [`MuxError::NoEventTypes`] if `types` is empty and
    /// [`MuxError::Stopped`] if the mux has been stopped.
    pub fn subscribe(self: &Arc<Self>, types: &[EventType]) -> Result<Subscription, MuxError> {
        if types.is_empty() {
            return Err(MuxError::NoEventTypes);
        }

        let mut state = self.lock();
        if state.stopped {
            return Err(MuxError::Stopped);
        }

        let id = SubscriptionId(state.next_id);
        state.next_id = state.next_id.saturating_add(1);

        let (tx, receiver) = mpsc::unbounded_channel();
        let types: BTreeSet<EventType> = types.iter().copied().collect();
        debug!(subscription = %id, ?types, "Subscriber registered");
        state.subscribers.insert(id, Subscriber { types, tx });

        Ok(Subscription {
            receiver,
            handle: Unsubscriber {
                id,
                mux: Arc::downgrade(self),
            },
        })
    }

    /// Deliver an event to every subscriber of its type.
    ///
    /// Returns the number of subscribers the event was queued for; zero
    /// subscribers is not an error. Subscribers whose receiving half has
    /// been dropped are removed.
    ///
    /// # Errors
    ///
    /// Returns [`MuxError::Stopped`] if the mux has been stopped.
    pub fn post(&self, event: Event) -> Result<usize, MuxError> {
        let mut state = self.lock();
        if state.stopped {
            return Err(MuxError::Stopped);
        }

        let event_type = event.event_type();
        let mut delivered: usize = 0;
        let mut gone = Vec::new();

        for (id, sub) in &state.subscribers {
            if !sub.types.contains(&event_type) {
                continue;
            }
            if sub.tx.send(event.clone()).is_ok() {
                delivered = delivered.saturating_add(1);
            } else {
                gone.push(*id);
            }
        }

        for id in gone {
            state.subscribers.remove(&id);
            debug!(subscription = %id, "Pruned subscriber with dropped receiver");
        }

        trace!(
            event_id = %event.id,
            event_type = %event_type,
            action = %event.action,
            delivered,
            "Event posted"
        );
        Ok(delivered)
    }

    /// Stop the mux, closing every subscription.
    ///
    /// Queued events remain readable by subscribers; later posts and
    /// subscriptions fail with [`MuxError::Stopped`].
    pub fn stop(&self) {
        let mut state = self.lock();
        state.stopped = true;
        let closed = state.subscribers.len();
        state.subscribers.clear();
        debug!(closed, "Event mux stopped");
    }

    /// Whether [`stop`](Self::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.lock().subscribers.remove(&id).is_some();
        if removed {
            debug!(subscription = %id, "Subscriber removed");
        }
        removed
    }
}

/// Cloneable handle that can cancel a subscription.
///
/// Holds only a weak reference to the mux, so it never keeps a stopped or
/// dropped mux alive.
#[derive(Debug, Clone)]
pub struct Unsubscriber {
    id: SubscriptionId,
    mux: Weak<EventMux>,
}

impl Unsubscriber {
    /// The subscription this handle controls.
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Cancel the subscription. Returns `true` if it was still live.
    ///
    /// Safe to call any number of times.
    pub fn unsubscribe(&self) -> bool {
        self.mux
            .upgrade()
            .is_some_and(|mux| mux.unsubscribe(self.id))
    }
}

/// The receiving end of a mux subscription.
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::UnboundedReceiver<Event>,
    handle: Unsubscriber,
}

impl Subscription {
    /// The subscription identifier.
    pub const fn id(&self) -> SubscriptionId {
        self.handle.id
    }

    /// Receive the next event.
    ///
    /// Returns `None` once the subscription has been cancelled (or the mux
    /// stopped) and every queued event has been received.
    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    /// Receive an already queued event without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.receiver.try_recv().ok()
    }

    /// Cancel the subscription.
    pub fn unsubscribe(&self) -> bool {
        self.handle.unsubscribe()
    }

    /// A cloneable handle that can cancel this subscription.
    pub fn handle(&self) -> Unsubscriber {
        self.handle.clone()
    }

    /// Split into the cancel handle and the raw receiver.
    pub fn into_parts(self) -> (Unsubscriber, mpsc::UnboundedReceiver<Event>) {
        (self.handle, self.receiver)
    }
}
