//! Loss-free, cursor-based journal over a mux subscription.
//!
//! A [`Journal`] owns one subscription and one background consumer task.
//! The consumer appends every received event to an in-memory buffer; readers
//! pull unread entries with [`Journal::read`], which advances the cursor and
//! discards consumed history beyond the configured replay window.
//!
//! # Positions
//!
//! Positions are absolute: entry `k` is the `k`-th event ever appended
//! (0-based). [`Journal::counter`] is the number of events appended so far,
//! [`Journal::cursor`] the position of the next unread entry and
//! [`Journal::earliest`] the position of the oldest retained entry. At all
//! times `earliest <= cursor <= counter`.
//!
//! # Locking
//!
//! Buffer, cursor and counter share one mutex; every public operation holds
//! it for its full duration. The predicate passed to [`Journal::read`] runs
//! under that lock and must not call back into the journal.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use simnet_types::{Event, EventType};
use tokio::sync::{Notify, mpsc};
use tracing::{debug, info};

use crate::mux::{EventMux, MuxError, Unsubscriber};

/// Errors returned by journal operations.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    /// The underlying subscription could not be created.
    #[error("failed to subscribe journal: {source}")]
    Subscribe {
        /// The mux error.
        #[from]
        source: MuxError,
    },

    /// The journal was created outside a Tokio runtime.
    #[error("journal requires a running tokio runtime")]
    NoRuntime,

    /// The journal stopped receiving before enough entries arrived.
    #[error("journal closed with {available} unread entries, {wanted} wanted")]
    Closed {
        /// Entries the caller waited for.
        wanted: usize,
        /// Unread entries at the time the journal closed.
        available: usize,
    },

    /// Waiting for entries exceeded the deadline.
    #[error("timed out after {timeout_ms}ms waiting for {wanted} entries ({available} available)")]
    Timeout {
        /// Entries the caller waited for.
        wanted: usize,
        /// Unread entries when the deadline expired.
        available: usize,
        /// The deadline in milliseconds.
        timeout_ms: u64,
    },

    /// A seek target lies outside the retained history.
    #[error("position {requested} outside retained range {earliest}..={latest}")]
    SeekOutOfRange {
        /// The requested absolute position.
        requested: usize,
        /// Oldest retained position.
        earliest: usize,
        /// Newest valid position (the counter).
        latest: usize,
    },
}

/// Journal tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JournalConfig {
    /// Number of already-read entries kept after each read so the cursor
    /// can be moved back with [`Journal::reset`]. Zero keeps none.
    #[serde(default)]
    pub replay_window: usize,
}

#[derive(Debug, Default)]
struct JournalState {
    /// Retained entries; `events[0]` sits at absolute position `base`.
    events: VecDeque<Event>,
    base: usize,
    /// Index into `events` of the first unread entry.
    cursor: usize,
    counter: usize,
    finished: bool,
}

impl JournalState {
    fn unread(&self) -> usize {
        self.events.len().saturating_sub(self.cursor)
    }

    fn position(&self) -> usize {
        self.base.saturating_add(self.cursor)
    }

    /// Drop consumed entries beyond `window`.
    fn trim(&mut self, window: usize) {
        let excess = self.cursor.saturating_sub(window);
        if excess == 0 {
            return;
        }
        self.events.drain(..excess);
        self.cursor = self.cursor.saturating_sub(excess);
        self.base = self.base.saturating_add(excess);
    }
}

/// Ordered record of the events of interest on one subscription.
#[derive(Debug)]
pub struct Journal {
    state: Mutex<JournalState>,
    notify: Notify,
    handle: Unsubscriber,
    types: Vec<EventType>,
    config: JournalConfig,
}

impl Journal {
    /// Subscribe to `types` on `mux` and start consuming in the background.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Subscribe`] if the mux refuses the
    /// subscription and [`JournalError::NoRuntime`] outside a runtime.
    pub fn new(
        mux: &Arc<EventMux>,
        types: &[EventType],
        config: JournalConfig,
    ) -> Result<Arc<Self>, JournalError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_err| JournalError::NoRuntime)?;

        let subscription = mux.subscribe(types)?;
        let (handle, receiver) = subscription.into_parts();

        let journal = Arc::new(Self {
            state: Mutex::new(JournalState::default()),
            notify: Notify::new(),
            handle,
            types: types.to_vec(),
            config,
        });

        info!(
            subscription = %journal.handle.id(),
            types = ?journal.types,
            replay_window = config.replay_window,
            "Journal started"
        );

        runtime.spawn(consume(Arc::downgrade(&journal), receiver));
        Ok(journal)
    }

    fn lock(&self) -> MutexGuard<'_, JournalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn append(&self, event: Event) {
        let counter = {
            let mut state = self.lock();
            state.events.push_back(event);
            state.counter = state.counter.saturating_add(1);
            state.counter
        };
        debug!(counter, "Journal entry appended");
        self.notify.notify_waiters();
    }

    fn finish(&self) {
        let counter = {
            let mut state = self.lock();
            state.finished = true;
            state.counter
        };
        info!(subscription = %self.handle.id(), counter, "Journal consumer stopped");
        self.notify.notify_waiters();
    }

    /// The event types this journal records.
    pub fn event_types(&self) -> &[EventType] {
        &self.types
    }

    /// The configuration the journal was created with.
    pub const fn config(&self) -> JournalConfig {
        self.config
    }

    /// Number of appended entries not yet read.
    pub fn new_entries(&self) -> usize {
        self.lock().unread()
    }

    /// Wait until at least `n` unread entries are available.
    ///
    /// Sleeps on a signal raised by every append; no polling.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Closed`] if the consumer stops before `n`
    /// entries are available.
    pub async fn wait_entries(&self, n: usize) -> Result<(), JournalError> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so an append between the check and
            // the await is not missed.
            notified.as_mut().enable();
            {
                let state = self.lock();
                let available = state.unread();
                if available >= n {
                    return Ok(());
                }
                if state.finished {
                    return Err(JournalError::Closed {
                        wanted: n,
                        available,
                    });
                }
            }
            notified.await;
        }
    }

    /// [`wait_entries`](Self::wait_entries) with a deadline.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Timeout`] when the deadline expires and
    /// [`JournalError::Closed`] as for `wait_entries`.
    pub async fn wait_entries_timeout(
        &self,
        n: usize,
        timeout: Duration,
    ) -> Result<(), JournalError> {
        match tokio::time::timeout(timeout, self.wait_entries(n)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(JournalError::Timeout {
                wanted: n,
                available: self.new_entries(),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    /// Consume unread entries in order while `predicate` returns `true`.
    ///
    /// Stops at the first entry the predicate rejects; that entry stays
    /// unread. Consumed history beyond the replay window is discarded.
    /// Returns the number of entries consumed.
    ///
    /// # Errors
    ///
    /// Currently never fails.
    pub fn read<F>(&self, mut predicate: F) -> Result<usize, JournalError>
    where
        F: FnMut(&Event) -> bool,
    {
        let mut guard = self.lock();
        let state = &mut *guard;
        let mut read: usize = 0;
        while let Some(event) = state.events.get(state.cursor) {
            if !predicate(event) {
                break;
            }
            state.cursor = state.cursor.saturating_add(1);
            read = read.saturating_add(1);
        }
        state.trim(self.config.replay_window);
        debug!(read, cursor = state.position(), "Journal read");
        Ok(read)
    }

    /// Move the read position to absolute position `position`.
    ///
    /// Moving back re-exposes retained entries; moving forward skips
    /// entries. Consumed history beyond the replay window is discarded
    /// afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::SeekOutOfRange`] unless
    /// `earliest() <= position <= counter()`; the journal is unchanged.
    pub fn reset(&self, position: usize) -> Result<(), JournalError> {
        let mut state = self.lock();
        let earliest = state.base;
        let latest = state.counter;
        if position < earliest || position > latest {
            return Err(JournalError::SeekOutOfRange {
                requested: position,
                earliest,
                latest,
            });
        }
        state.cursor = position.saturating_sub(earliest);
        state.trim(self.config.replay_window);
        debug!(position, earliest = state.base, "Journal cursor moved");
        Ok(())
    }

    /// Total number of entries ever appended.
    pub fn counter(&self) -> usize {
        self.lock().counter
    }

    /// Absolute position of the next unread entry.
    pub fn cursor(&self) -> usize {
        self.lock().position()
    }

    /// Absolute position of the oldest retained entry.
    pub fn earliest(&self) -> usize {
        self.lock().base
    }

    /// Number of entries currently held in memory, read or not.
    pub fn retained(&self) -> usize {
        self.lock().events.len()
    }

    /// Copy up to `limit` unread entries without consuming them.
    pub fn peek(&self, limit: usize) -> Vec<Event> {
        let state = self.lock();
        state
            .events
            .iter()
            .skip(state.cursor)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Cancel the subscription.
    ///
    /// Events that were already queued are still appended; nothing posted
    /// afterwards is. Use [`closed`](Self::closed) to wait for the consumer
    /// to finish draining.
    pub fn close(&self) {
        if self.handle.unsubscribe() {
            info!(subscription = %self.handle.id(), "Journal closing");
        }
    }

    /// Whether the consumer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.lock().finished
    }

    /// Wait for the consumer task to stop.
    pub async fn closed(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_closed() {
                return;
            }
            notified.await;
        }
    }
}

impl Drop for Journal {
    fn drop(&mut self) {
        self.handle.unsubscribe();
    }
}

/// Background consumer: append every received event until the channel
/// closes or the journal is dropped.
async fn consume(journal: Weak<Journal>, mut receiver: mpsc::UnboundedReceiver<Event>) {
    while let Some(event) = receiver.recv().await {
        let Some(journal) = journal.upgrade() else {
            return;
        };
        journal.append(event);
    }
    if let Some(journal) = journal.upgrade() {
        journal.finish();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use simnet_types::{Action, EventObject, NodeId, SimNode};
    use uuid::Uuid;

    use super::*;

    fn node_event(n: u128) -> Event {
        Event::node(Action::On, SimNode::new(NodeId(Uuid::from_u128(n))))
    }

    fn post_nodes(mux: &EventMux, range: core::ops::RangeInclusive<u128>) {
        for n in range {
            mux.post(node_event(n)).unwrap();
        }
    }

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn trim_keeps_window() {
        let mut state = JournalState::default();
        for n in 0..6 {
            state.events.push_back(node_event(n));
            state.counter = state.counter.saturating_add(1);
        }
        state.cursor = 5;
        state.trim(2);
        assert_eq!(state.events.len(), 3);
        assert_eq!(state.cursor, 2);
        assert_eq!(state.base, 3);
        assert_eq!(state.position(), 5);
        assert_eq!(state.unread(), 1);
    }

    #[test]
    fn new_outside_runtime_fails() {
        let mux = EventMux::new();
        let result = Journal::new(&mux, &[EventType::Node], JournalConfig::default());
        assert!(matches!(result, Err(JournalError::NoRuntime)));
        assert_eq!(mux.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn subscribe_failure_propagates() {
        let mux = EventMux::new();
        mux.stop();
        let result = Journal::new(&mux, &[EventType::Node], JournalConfig::default());
        assert!(matches!(
            result,
            Err(JournalError::Subscribe {
                source: MuxError::Stopped
            })
        ));
    }

    #[tokio::test]
    async fn read_all_consumes_backlog() {
        let mux = EventMux::new();
        let journal = Journal::new(&mux, &[EventType::Node], JournalConfig::default()).unwrap();
        post_nodes(&mux, 1..=4);
        journal.wait_entries_timeout(4, WAIT).await.unwrap();

        assert_eq!(journal.read(|_| true).unwrap(), 4);
        assert_eq!(journal.new_entries(), 0);
        assert_eq!(journal.cursor(), 4);
        assert_eq!(journal.counter(), 4);
        assert_eq!(journal.retained(), 0);
    }

    #[tokio::test]
    async fn read_stops_before_rejected_entry() {
        let mux = EventMux::new();
        let journal = Journal::new(&mux, &[EventType::Node], JournalConfig::default()).unwrap();
        post_nodes(&mux, 1..=5);
        journal.wait_entries_timeout(5, WAIT).await.unwrap();

        // Reject the third unread entry.
        let mut seen = 0_usize;
        let read = journal
            .read(|_| {
                seen += 1;
                seen < 3
            })
            .unwrap();
        assert_eq!(read, 2);
        assert_eq!(journal.cursor(), 2);
        assert_eq!(journal.new_entries(), 3);

        // The rejected entry is the next one handed out.
        let expected = EventObject::Node(SimNode::new(NodeId(Uuid::from_u128(3))));
        let next = journal.peek(1);
        assert_eq!(next.first().map(|ev| ev.object), Some(expected));
    }

    #[tokio::test]
    async fn entries_arrive_in_post_order() {
        let mux = EventMux::new();
        let journal = Journal::new(&mux, &[EventType::Node], JournalConfig::default()).unwrap();
        let posted: Vec<Event> = (1..=50).map(node_event).collect();
        for ev in &posted {
            mux.post(ev.clone()).unwrap();
        }
        journal.wait_entries_timeout(50, WAIT).await.unwrap();

        let mut delivered = Vec::new();
        journal
            .read(|ev| {
                delivered.push(ev.clone());
                true
            })
            .unwrap();
        assert_eq!(delivered, posted);
    }

    #[tokio::test]
    async fn reset_seeks_within_replay_window() {
        let mux = EventMux::new();
        let config = JournalConfig { replay_window: 10 };
        let journal = Journal::new(&mux, &[EventType::Node], config).unwrap();
        post_nodes(&mux, 1..=5);
        journal.wait_entries_timeout(5, WAIT).await.unwrap();

        assert_eq!(journal.read(|_| true).unwrap(), 5);
        assert_eq!(journal.earliest(), 0);

        journal.reset(2).unwrap();
        assert_eq!(journal.cursor(), 2);
        assert_eq!(journal.new_entries(), 3);
        assert_eq!(journal.read(|_| true).unwrap(), 3);

        let err = journal.reset(6).unwrap_err();
        assert!(matches!(
            err,
            JournalError::SeekOutOfRange {
                requested: 6,
                earliest: 0,
                latest: 5
            }
        ));
        assert_eq!(journal.cursor(), 5);
    }

    #[tokio::test]
    async fn reset_cannot_rewind_past_trimmed_history() {
        let mux = EventMux::new();
        let journal = Journal::new(&mux, &[EventType::Node], JournalConfig::default()).unwrap();
        post_nodes(&mux, 1..=5);
        journal.wait_entries_timeout(5, WAIT).await.unwrap();
        journal.read(|_| true).unwrap();

        assert_eq!(journal.earliest(), 5);
        assert!(journal.reset(0).is_err());
        // Seeking to the current position is always valid.
        journal.reset(5).unwrap();
        assert_eq!(journal.counter(), 5);
    }

    #[tokio::test]
    async fn reset_forward_skips_entries() {
        let mux = EventMux::new();
        let journal = Journal::new(&mux, &[EventType::Node], JournalConfig::default()).unwrap();
        post_nodes(&mux, 1..=4);
        journal.wait_entries_timeout(4, WAIT).await.unwrap();

        journal.reset(3).unwrap();
        assert_eq!(journal.new_entries(), 1);
        assert_eq!(journal.earliest(), 3);
    }

    #[tokio::test]
    async fn wait_entries_wakes_on_append() {
        let mux = EventMux::new();
        let journal = Journal::new(&mux, &[EventType::Node], JournalConfig::default()).unwrap();

        let poster = Arc::clone(&mux);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            post_nodes(&poster, 1..=2);
        });

        journal.wait_entries_timeout(2, WAIT).await.unwrap();
        assert!(journal.new_entries() >= 2);
    }

    #[tokio::test]
    async fn wait_entries_times_out() {
        let mux = EventMux::new();
        let journal = Journal::new(&mux, &[EventType::Node], JournalConfig::default()).unwrap();
        let err = journal
            .wait_entries_timeout(1, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            JournalError::Timeout {
                wanted: 1,
                available: 0,
                timeout_ms: 20
            }
        ));
    }

    #[tokio::test]
    async fn wait_entries_fails_after_close() {
        let mux = EventMux::new();
        let journal = Journal::new(&mux, &[EventType::Node], JournalConfig::default()).unwrap();
        journal.close();
        let err = journal.wait_entries_timeout(1, WAIT).await.unwrap_err();
        assert!(matches!(
            err,
            JournalError::Closed {
                wanted: 1,
                available: 0
            }
        ));
    }

    #[tokio::test]
    async fn drop_unsubscribes() {
        let mux = EventMux::new();
        let journal = Journal::new(&mux, &[EventType::Node], JournalConfig::default()).unwrap();
        assert_eq!(mux.subscriber_count(), 1);
        drop(journal);
        assert_eq!(mux.subscriber_count(), 0);
    }
}
