//! Topology reconstructed from replayed events.
//!
//! [`TopologyView`] folds node and connection events into the set of
//! currently-on nodes and connections. It is the consumer side of a
//! journal: `journal.read(|ev| view.apply(ev))` drains every unread entry.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use simnet_types::{Action, Event, EventObject, NodeId, SimConn};
use tracing::debug;

/// Serializable picture of a [`TopologyView`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologySnapshot {
    /// Nodes currently on, in identity order.
    pub nodes: Vec<NodeId>,
    /// Connections currently on, in canonical order.
    pub conns: Vec<SimConn>,
    /// Events applied so far.
    pub applied: u64,
    /// Applied events that did not change the topology.
    pub redundant: u64,
}

/// Live topology rebuilt from node and connection events.
#[derive(Debug, Clone, Default)]
pub struct TopologyView {
    nodes: BTreeSet<NodeId>,
    conns: BTreeSet<SimConn>,
    applied: u64,
    redundant: u64,
}

impl TopologyView {
    /// An empty topology.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event.
    ///
    /// Always returns `true` so it can be handed directly to
    /// `Journal::read` as the predicate.
    pub fn apply(&mut self, event: &Event) -> bool {
        let changed = match (event.action, event.object) {
            (Action::On, EventObject::Node(node)) => self.nodes.insert(node.id),
            (Action::Off, EventObject::Node(node)) => self.nodes.remove(&node.id),
            (Action::On, EventObject::Conn(conn)) => self.conns.insert(conn),
            (Action::Off, EventObject::Conn(conn)) => self.conns.remove(&conn),
        };
        self.applied = self.applied.saturating_add(1);
        if !changed {
            self.redundant = self.redundant.saturating_add(1);
            debug!(
                event = %event.id,
                action = %event.action,
                kind = %event.event_type(),
                "Event did not change topology"
            );
        }
        true
    }

    /// Number of nodes currently on.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of connections currently on.
    pub fn conn_count(&self) -> usize {
        self.conns.len()
    }

    /// Whether `id` is on.
    pub fn is_node_on(&self, id: NodeId) -> bool {
        self.nodes.contains(&id)
    }

    /// Whether `conn` is on.
    pub fn is_conn_on(&self, conn: &SimConn) -> bool {
        self.conns.contains(conn)
    }

    /// Events applied so far.
    pub const fn applied(&self) -> u64 {
        self.applied
    }

    /// Applied events that left the topology unchanged.
    pub const fn redundant(&self) -> u64 {
        self.redundant
    }

    /// Copy the current state into a snapshot.
    pub fn snapshot(&self) -> TopologySnapshot {
        TopologySnapshot {
            nodes: self.nodes.iter().copied().collect(),
            conns: self.conns.iter().copied().collect(),
            applied: self.applied,
            redundant: self.redundant,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use simnet_types::SimNode;
    use uuid::Uuid;

    use super::*;

    fn id(n: u128) -> NodeId {
        NodeId::from(Uuid::from_u128(n))
    }

    #[test]
    fn nodes_and_conns_toggle() {
        let mut view = TopologyView::new();
        let conn = SimConn::new(id(2), id(1)).unwrap();

        assert!(view.apply(&Event::node(Action::On, SimNode::new(id(1)))));
        assert!(view.apply(&Event::node(Action::On, SimNode::new(id(2)))));
        assert!(view.apply(&Event::conn(Action::On, conn)));
        assert_eq!(view.node_count(), 2);
        assert_eq!(view.conn_count(), 1);
        assert!(view.is_conn_on(&conn));

        view.apply(&Event::conn(Action::Off, conn));
        assert!(!view.is_conn_on(&conn));
        view.apply(&Event::node(Action::Off, SimNode::new(id(1))));
        assert!(!view.is_node_on(id(1)));
        assert!(view.is_node_on(id(2)));
        assert_eq!(view.applied(), 5);
        assert_eq!(view.redundant(), 0);
    }

    #[test]
    fn redundant_events_are_counted_and_accepted() {
        let mut view = TopologyView::new();
        let conn = SimConn::new(id(1), id(2)).unwrap();
        assert!(view.apply(&Event::conn(Action::Off, conn)));
        assert!(view.apply(&Event::node(Action::On, SimNode::new(id(3)))));
        assert!(view.apply(&Event::node(Action::On, SimNode::new(id(3)))));
        assert_eq!(view.applied(), 3);
        assert_eq!(view.redundant(), 2);
        assert_eq!(view.node_count(), 1);
    }

    #[test]
    fn snapshot_is_ordered_and_serializable() {
        let mut view = TopologyView::new();
        for n in [5, 3, 9] {
            view.apply(&Event::node(Action::On, SimNode::new(id(n))));
        }
        let snap = view.snapshot();
        assert_eq!(snap.nodes, vec![id(3), id(5), id(9)]);

        let json = serde_json::to_string(&snap).unwrap();
        let back: TopologySnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
    }
}
