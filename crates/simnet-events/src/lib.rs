//! Event routing and journaling for the simnet topology simulator.
//!
//! Drivers post topology [`Event`]s to an [`EventMux`]; a [`Journal`]
//! subscribes to the types it cares about and keeps a loss-free, ordered
//! record that readers consume incrementally.
//!
//! # Modules
//!
//! - [`mux`] -- [`EventMux`], [`Subscription`] and [`Unsubscriber`]
//! - [`journal`] -- [`Journal`], [`JournalConfig`] and [`JournalError`]
//!
//! [`Event`]: simnet_types::Event

pub mod journal;
pub mod mux;

pub use journal::{Journal, JournalConfig, JournalError};
pub use mux::{EventMux, MuxError, Subscription, SubscriptionId, Unsubscriber};
