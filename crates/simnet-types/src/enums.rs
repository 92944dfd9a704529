//! Enumeration types for simulated topology events.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// The class of entity an event is about.
///
/// This is also the key subscribers filter on when they register with the
/// event mux.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum EventType {
    /// A peer joined or left the network.
    Node,
    /// A connection between two peers was established or dropped.
    Conn,
}

impl EventType {
    /// Every event type, in declaration order.
    pub const ALL: [Self; 2] = [Self::Node, Self::Conn];
}

impl core::fmt::Display for EventType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Node => f.write_str("Node"),
            Self::Conn => f.write_str("Conn"),
        }
    }
}

/// Whether the entity is switched on or off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum Action {
    /// The entity comes up.
    On,
    /// The entity goes down.
    Off,
}

impl Action {
    /// Return the opposite action.
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::On => Self::Off,
            Self::Off => Self::On,
        }
    }
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::On => f.write_str("On"),
            Self::Off => f.write_str("Off"),
        }
    }
}
