//! Per-tick flip counts for the random topology driver.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::ChurnConfig;

/// How many entities of one class to switch on and off in a tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    /// Entities to switch on.
    pub on: usize,
    /// Entities to switch off.
    pub off: usize,
}

impl Delta {
    /// Build a delta.
    pub const fn new(on: usize, off: usize) -> Self {
        Self { on, off }
    }
}

/// Flip counts for one tick: nodes first, then connections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickDeltas {
    /// Node flips.
    pub nodes: Delta,
    /// Connection flips.
    pub conns: Delta,
}

/// Return 1 with probability `1 / odds`, otherwise 0.
///
/// `odds == 0` never fires; `odds == 1` always does.
pub fn one_out_of<R: Rng + ?Sized>(rng: &mut R, odds: u32) -> usize {
    if odds == 0 {
        return 0;
    }
    usize::from(rng.random_range(0..odds) == 0)
}

/// Draw the flip counts for `tick`.
///
/// Tick 0 seeds the topology with the configured initial counts and no
/// removals. Later ticks draw each of the four counts independently.
pub fn deltas<R: Rng + ?Sized>(tick: u64, churn: &ChurnConfig, rng: &mut R) -> TickDeltas {
    if tick == 0 {
        return TickDeltas {
            nodes: Delta::new(churn.initial_nodes, 0),
            conns: Delta::new(churn.initial_conns, 0),
        };
    }
    let node_on = one_out_of(rng, churn.node_flip_odds);
    let node_off = one_out_of(rng, churn.node_flip_odds);
    let conn_on = one_out_of(rng, churn.conn_flip_odds);
    let conn_off = one_out_of(rng, churn.conn_flip_odds);
    TickDeltas {
        nodes: Delta::new(node_on, node_off),
        conns: Delta::new(conn_on, conn_off),
    }
}
