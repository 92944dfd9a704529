//! Event payloads and the event envelope.
//!
//! An [`Event`] pairs an [`Action`] with the object it applies to and is
//! never modified after construction. The event type is derived from the
//! payload so the two cannot disagree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{Action, EventType};
use crate::ids::{EventId, NodeId};

/// A simulated peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SimNode {
    /// Identity of the peer.
    pub id: NodeId,
}

impl SimNode {
    /// Wrap a node identity.
    pub const fn new(id: NodeId) -> Self {
        Self { id }
    }
}

/// A connection between two peers.
///
/// Endpoints are canonical: `caller` always sorts strictly before `callee`,
/// so a connection has exactly one representation regardless of which side
/// dialled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SimConn {
    /// Endpoint with the lower identity.
    pub caller: NodeId,
    /// Endpoint with the higher identity.
    pub callee: NodeId,
}

impl SimConn {
    /// Build a canonical connection between two peers.
    ///
    /// Returns `None` for a self connection.
    pub fn new(a: NodeId, b: NodeId) -> Option<Self> {
        match a.cmp(&b) {
            core::cmp::Ordering::Less => Some(Self {
                caller: a,
                callee: b,
            }),
            core::cmp::Ordering::Greater => Some(Self {
                caller: b,
                callee: a,
            }),
            core::cmp::Ordering::Equal => None,
        }
    }

    /// Whether `node` is one of the endpoints.
    pub fn involves(&self, node: NodeId) -> bool {
        self.caller == node || self.callee == node
    }
}

/// The object an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "object")]
#[ts(export, export_to = "bindings/")]
pub enum EventObject {
    /// A node lifecycle change.
    Node(SimNode),
    /// A connection lifecycle change.
    Conn(SimConn),
}

impl EventObject {
    /// The event type matching this payload.
    pub const fn event_type(&self) -> EventType {
        match self {
            Self::Node(_) => EventType::Node,
            Self::Conn(_) => EventType::Conn,
        }
    }
}

/// A timestamped topology event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Event {
    /// Unique event identifier.
    pub id: EventId,
    /// Whether the object comes up or goes down.
    pub action: Action,
    /// The node or connection the event is about.
    #[serde(flatten)]
    pub object: EventObject,
    /// When the event was created.
    pub posted_at: DateTime<Utc>,
}

impl Event {
    /// Build an event for an arbitrary payload.
    pub fn new(action: Action, object: EventObject) -> Self {
        Self {
            id: EventId::new(),
            action,
            object,
            posted_at: Utc::now(),
        }
    }

    /// Build a node lifecycle event.
    pub fn node(action: Action, node: SimNode) -> Self {
        Self::new(action, EventObject::Node(node))
    }

    /// Build a connection lifecycle event.
    pub fn conn(action: Action, conn: SimConn) -> Self {
        Self::new(action, EventObject::Conn(conn))
    }

    /// The event type, derived from the payload.
    pub const fn event_type(&self) -> EventType {
        self.object.event_type()
    }
}
