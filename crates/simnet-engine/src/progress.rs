//! Step callback that keeps running totals and logs progress.

use chrono::{DateTime, Utc};
use simnet_core::driver::StepSummary;
use simnet_core::runner::StepCallback;
use tracing::{debug, info};

/// Ticks between info-level progress lines.
const REPORT_EVERY: u64 = 100;

fn widen(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

/// Running totals of what the driver switched on and off.
#[derive(Debug, Default)]
pub struct ProgressLogger {
    steps: u64,
    nodes_on: u64,
    nodes_off: u64,
    conns_on: u64,
    conns_off: u64,
    last_at: Option<DateTime<Utc>>,
}

impl ProgressLogger {
    /// A logger with zeroed totals.
    pub fn new() -> Self {
        Self::default()
    }

    /// Nodes the driver currently holds on.
    pub const fn live_nodes(&self) -> u64 {
        self.nodes_on.saturating_sub(self.nodes_off)
    }

    /// Connections the driver currently holds on.
    pub const fn live_conns(&self) -> u64 {
        self.conns_on.saturating_sub(self.conns_off)
    }

    /// Steps observed so far.
    pub const fn steps(&self) -> u64 {
        self.steps
    }

    /// Wall-clock time of the last observed step.
    pub const fn last_at(&self) -> Option<DateTime<Utc>> {
        self.last_at
    }
}

impl StepCallback for ProgressLogger {
    fn on_step(&mut self, summary: &StepSummary, at: DateTime<Utc>) {
        self.steps = self.steps.saturating_add(1);
        self.nodes_on = self.nodes_on.saturating_add(widen(summary.nodes_on));
        self.nodes_off = self.nodes_off.saturating_add(widen(summary.nodes_off));
        self.conns_on = self.conns_on.saturating_add(widen(summary.conns_on));
        self.conns_off = self.conns_off.saturating_add(widen(summary.conns_off));
        self.last_at = Some(at);

        debug!(
            tick = summary.tick,
            posted = summary.posted(),
            at = %at,
            "Tick complete"
        );
        if summary.tick.checked_rem(REPORT_EVERY) == Some(0) {
            info!(
                tick = summary.tick,
                live_nodes = self.live_nodes(),
                live_conns = self.live_conns(),
                "Topology progress"
            );
        }
    }
}
