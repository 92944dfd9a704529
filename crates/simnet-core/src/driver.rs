//! Topology drivers: synthetic node and connection churn.
//!
//! A [`TopologyDriver`] is stepped once per tick and posts the resulting
//! lifecycle events to an [`EventMux`]. Two drivers are provided:
//!
//! - [`RandomTopology`] -- seeds a topology on tick 0, then flips nodes and
//!   connections on and off at random.
//! - [`ToggleTopology`] -- a fixed two-node scenario whose connection is
//!   toggled every third tick; handy for checking a journal by eye.
//!
//! All randomness comes from an injected generator, so a seeded driver
//! always produces the same event sequence.

use rand::Rng;
use serde::{Deserialize, Serialize};
use simnet_events::{EventMux, MuxError};
use simnet_types::{Action, Event, NodeId, SimConn, SimNode};
use tracing::debug;

use crate::config::ChurnConfig;
use crate::delta::deltas;

/// Upper bound on draws spent looking for a new connection.
const MAX_CONN_DRAWS: usize = 256;

/// Errors raised while driving the topology.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// The event mux rejected an event.
    #[error("failed to post event at tick {tick}: {source}")]
    Post {
        /// The tick being processed.
        tick: u64,
        /// The mux error.
        source: MuxError,
    },
}

/// What one driver step did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSummary {
    /// The tick index.
    pub tick: u64,
    /// Nodes switched on.
    pub nodes_on: usize,
    /// Nodes switched off.
    pub nodes_off: usize,
    /// Connections switched on.
    pub conns_on: usize,
    /// Connections switched off.
    pub conns_off: usize,
}

impl StepSummary {
    /// An empty summary for `tick`.
    pub const fn new(tick: u64) -> Self {
        Self {
            tick,
            nodes_on: 0,
            nodes_off: 0,
            conns_on: 0,
            conns_off: 0,
        }
    }

    /// Total events posted in this step.
    pub const fn posted(&self) -> usize {
        self.nodes_on
            .saturating_add(self.nodes_off)
            .saturating_add(self.conns_on)
            .saturating_add(self.conns_off)
    }
}

/// A source of topology events, stepped once per tick.
pub trait TopologyDriver: Send {
    /// Run one tick, posting every generated event to `mux`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Post`] as soon as the mux rejects an event;
    /// the remaining work for the tick is abandoned.
    fn step(&mut self, tick: u64, mux: &EventMux) -> Result<StepSummary, DriverError>;
}

fn post(mux: &EventMux, tick: u64, event: Event) -> Result<(), DriverError> {
    mux.post(event)
        .map(|_delivered| ())
        .map_err(|source| DriverError::Post { tick, source })
}

fn random_index<R: Rng + ?Sized>(rng: &mut R, len: usize) -> Option<usize> {
    (len > 0).then(|| rng.random_range(0..len))
}

/// Random churn over a fixed pool of node identities.
#[derive(Debug, Clone)]
pub struct RandomTopology<R> {
    rng: R,
    churn: ChurnConfig,
    on_nodes: Vec<NodeId>,
    off_nodes: Vec<NodeId>,
    on_conns: Vec<SimConn>,
}

impl<R: Rng> RandomTopology<R> {
    /// Create a driver with `node_pool` fresh identities, all switched off.
    pub fn new(mut rng: R, node_pool: usize, churn: ChurnConfig) -> Self {
        let off_nodes = NodeId::random_pool(&mut rng, node_pool);
        Self::with_nodes(rng, off_nodes, churn)
    }

    /// Create a driver over an explicit pool of identities.
    pub const fn with_nodes(rng: R, nodes: Vec<NodeId>, churn: ChurnConfig) -> Self {
        Self {
            rng,
            churn,
            on_nodes: Vec::new(),
            off_nodes: nodes,
            on_conns: Vec::new(),
        }
    }

    /// Nodes currently switched on.
    pub fn on_nodes(&self) -> &[NodeId] {
        &self.on_nodes
    }

    /// Nodes currently switched off.
    pub fn off_nodes(&self) -> &[NodeId] {
        &self.off_nodes
    }

    /// Connections currently switched on.
    pub fn on_conns(&self) -> &[SimConn] {
        &self.on_conns
    }

    fn nodes_on(&mut self, count: usize, tick: u64, mux: &EventMux) -> Result<usize, DriverError> {
        let mut done = 0_usize;
        for _ in 0..count {
            let Some(idx) = random_index(&mut self.rng, self.off_nodes.len()) else {
                break;
            };
            let Some(id) = self.off_nodes.get(idx).copied() else {
                break;
            };
            post(mux, tick, Event::node(Action::On, SimNode::new(id)))?;
            self.off_nodes.remove(idx);
            self.on_nodes.push(id);
            done = done.saturating_add(1);
        }
        Ok(done)
    }

    fn nodes_off(&mut self, count: usize, tick: u64, mux: &EventMux) -> Result<usize, DriverError> {
        let mut done = 0_usize;
        for _ in 0..count {
            let Some(idx) = random_index(&mut self.rng, self.on_nodes.len()) else {
                break;
            };
            let Some(id) = self.on_nodes.get(idx).copied() else {
                break;
            };
            post(mux, tick, Event::node(Action::Off, SimNode::new(id)))?;
            self.on_nodes.remove(idx);
            self.off_nodes.push(id);
            done = done.saturating_add(1);
        }
        Ok(done)
    }

    /// Draw a connection between two on-nodes that is not already on.
    ///
    /// Caller and callee are drawn independently and the draw is repeated
    /// unless the caller sorts strictly before the callee.
    fn draw_new_conn(&mut self) -> Option<SimConn> {
        let len = self.on_nodes.len();
        if len < 2 {
            return None;
        }
        for _ in 0..MAX_CONN_DRAWS {
            let caller = self.on_nodes.get(self.rng.random_range(0..len)).copied()?;
            let callee = self.on_nodes.get(self.rng.random_range(0..len)).copied()?;
            if caller >= callee {
                continue;
            }
            let conn = SimConn { caller, callee };
            if !self.on_conns.contains(&conn) {
                return Some(conn);
            }
        }
        None
    }

    fn conns_on(&mut self, count: usize, tick: u64, mux: &EventMux) -> Result<usize, DriverError> {
        let mut done = 0_usize;
        for _ in 0..count {
            let Some(conn) = self.draw_new_conn() else {
                debug!(tick, on_nodes = self.on_nodes.len(), "No free connection to switch on");
                break;
            };
            post(mux, tick, Event::conn(Action::On, conn))?;
            self.on_conns.push(conn);
            done = done.saturating_add(1);
        }
        Ok(done)
    }

    fn conns_off(&mut self, count: usize, tick: u64, mux: &EventMux) -> Result<usize, DriverError> {
        let mut done = 0_usize;
        for _ in 0..count {
            let Some(idx) = random_index(&mut self.rng, self.on_conns.len()) else {
                break;
            };
            let Some(conn) = self.on_conns.get(idx).copied() else {
                break;
            };
            post(mux, tick, Event::conn(Action::Off, conn))?;
            self.on_conns.remove(idx);
            done = done.saturating_add(1);
        }
        Ok(done)
    }
}

impl<R: Rng + Send> TopologyDriver for RandomTopology<R> {
    fn step(&mut self, tick: u64, mux: &EventMux) -> Result<StepSummary, DriverError> {
        let d = deltas(tick, &self.churn, &mut self.rng);
        let summary = StepSummary {
            tick,
            nodes_on: self.nodes_on(d.nodes.on, tick, mux)?,
            nodes_off: self.nodes_off(d.nodes.off, tick, mux)?,
            conns_on: self.conns_on(d.conns.on, tick, mux)?,
            conns_off: self.conns_off(d.conns.off, tick, mux)?,
        };
        debug!(
            tick,
            nodes_on = summary.nodes_on,
            nodes_off = summary.nodes_off,
            conns_on = summary.conns_on,
            conns_off = summary.conns_off,
            live_nodes = self.on_nodes.len(),
            live_conns = self.on_conns.len(),
            "Random topology step"
        );
        Ok(summary)
    }
}

/// Two nodes and one connection toggled every third tick.
///
/// Tick 0 switches both nodes on; ticks 3, 6, 9, ... alternately switch the
/// connection on and off.
#[derive(Debug, Clone)]
pub struct ToggleTopology {
    conn: SimConn,
    last: Action,
}

impl ToggleTopology {
    /// Build the scenario over a fixed connection.
    pub const fn new(conn: SimConn) -> Self {
        Self {
            conn,
            last: Action::Off,
        }
    }

    /// Build the scenario over two random identities.
    pub fn from_rng<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let first = NodeId::random(rng);
        loop {
            if let Some(conn) = SimConn::new(first, NodeId::random(rng)) {
                return Self::new(conn);
            }
        }
    }

    /// The toggled connection.
    pub const fn conn(&self) -> SimConn {
        self.conn
    }
}

impl TopologyDriver for ToggleTopology {
    fn step(&mut self, tick: u64, mux: &EventMux) -> Result<StepSummary, DriverError> {
        let mut summary = StepSummary::new(tick);
        if tick == 0 {
            for id in [self.conn.caller, self.conn.callee] {
                post(mux, tick, Event::node(Action::On, SimNode::new(id)))?;
            }
            summary.nodes_on = 2;
        } else if tick.checked_rem(3) == Some(0) {
            let action = self.last.toggled();
            post(mux, tick, Event::conn(action, self.conn))?;
            self.last = action;
            match action {
                Action::On => summary.conns_on = 1,
                Action::Off => summary.conns_off = 1,
            }
        }
        debug!(tick, posted = summary.posted(), "Toggle topology step");
        Ok(summary)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeSet;

    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use simnet_types::{EventObject, EventType};

    use super::*;

    fn drain(sub: &mut simnet_events::Subscription) -> Vec<Event> {
        std::iter::from_fn(|| sub.try_recv()).collect()
    }

    #[test]
    fn first_tick_seeds_ten_nodes_and_twenty_conns() {
        let mux = EventMux::new();
        let mut sub = mux.subscribe(&EventType::ALL).unwrap();
        let mut driver = RandomTopology::new(StdRng::seed_from_u64(11), 100, ChurnConfig::default());

        let summary = driver.step(0, &mux).unwrap();
        assert_eq!(summary.nodes_on, 10);
        assert_eq!(summary.conns_on, 20);
        assert_eq!(summary.posted(), 30);

        let events = drain(&mut sub);
        let node_on = events
            .iter()
            .filter(|e| e.event_type() == EventType::Node && e.action == Action::On)
            .count();
        let conn_on = events
            .iter()
            .filter(|e| e.event_type() == EventType::Conn && e.action == Action::On)
            .count();
        assert_eq!(node_on, 10);
        assert_eq!(conn_on, 20);
        assert_eq!(events.len(), 30);

        for ev in &events {
            if let EventObject::Conn(conn) = ev.object {
                assert!(conn.caller < conn.callee);
            }
        }
        assert_eq!(driver.on_nodes().len(), 10);
        assert_eq!(driver.off_nodes().len(), 90);
    }

    #[test]
    fn node_and_conn_sets_stay_consistent() {
        let mux = EventMux::new();
        let mut driver = RandomTopology::new(StdRng::seed_from_u64(5), 40, ChurnConfig::default());
        for tick in 0..300 {
            driver.step(tick, &mux).unwrap();
            let live: BTreeSet<NodeId> = driver.on_nodes().iter().copied().collect();
            let conns: BTreeSet<SimConn> = driver.on_conns().iter().copied().collect();
            assert_eq!(conns.len(), driver.on_conns().len());
            assert_eq!(live.len(), driver.on_nodes().len());
            assert_eq!(live.len() + driver.off_nodes().len(), 40);
        }
    }

    #[test]
    fn small_pool_caps_node_flips() {
        let mux = EventMux::new();
        let mut driver = RandomTopology::new(StdRng::seed_from_u64(9), 3, ChurnConfig::default());
        let summary = driver.step(0, &mux).unwrap();
        assert_eq!(summary.nodes_on, 3);
        // Only three distinct pairs exist among three nodes.
        assert_eq!(summary.conns_on, 3);
    }

    #[test]
    fn single_node_gets_no_connections() {
        let mux = EventMux::new();
        let mut driver = RandomTopology::new(StdRng::seed_from_u64(9), 1, ChurnConfig::default());
        let summary = driver.step(0, &mux).unwrap();
        assert_eq!(summary.nodes_on, 1);
        assert_eq!(summary.conns_on, 0);
    }

    #[test]
    fn same_seed_same_events() {
        let run = |seed: u64| {
            let mux = EventMux::new();
            let mut sub = mux.subscribe(&EventType::ALL).unwrap();
            let mut driver =
                RandomTopology::new(StdRng::seed_from_u64(seed), 50, ChurnConfig::default());
            for tick in 0..50 {
                driver.step(tick, &mux).unwrap();
            }
            drain(&mut sub)
                .into_iter()
                .map(|e| (e.action, e.object))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(21), run(21));
    }

    #[test]
    fn post_failure_is_returned() {
        let mux = EventMux::new();
        mux.stop();
        let mut driver = RandomTopology::new(StdRng::seed_from_u64(1), 10, ChurnConfig::default());
        let err = driver.step(0, &mux).unwrap_err();
        assert!(matches!(
            err,
            DriverError::Post {
                tick: 0,
                source: MuxError::Stopped
            }
        ));
        // State is untouched by the rejected event.
        assert!(driver.on_nodes().is_empty());
        assert_eq!(driver.off_nodes().len(), 10);
    }

    #[test]
    fn toggle_alternates_every_third_tick() {
        let mux = EventMux::new();
        let mut sub = mux.subscribe(&EventType::ALL).unwrap();
        let mut driver = ToggleTopology::from_rng(&mut StdRng::seed_from_u64(3));

        let mut posted = Vec::new();
        for tick in 0..10 {
            posted.push(driver.step(tick, &mux).unwrap().posted());
        }
        assert_eq!(posted, vec![2, 0, 0, 1, 0, 0, 1, 0, 0, 1]);

        let events = drain(&mut sub);
        let kinds: Vec<(EventType, Action)> =
            events.iter().map(|e| (e.event_type(), e.action)).collect();
        assert_eq!(
            kinds,
            vec![
                (EventType::Node, Action::On),
                (EventType::Node, Action::On),
                (EventType::Conn, Action::On),
                (EventType::Conn, Action::Off),
                (EventType::Conn, Action::On),
            ]
        );
    }
}
