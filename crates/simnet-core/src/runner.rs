//! Tick source and driver loop.
//!
//! [`ticker`] turns a wall-clock interval into a channel of tick
//! timestamps. [`run_driver`] steps a [`TopologyDriver`] once per received
//! tick until the channel closes or the tick limit is reached, and hands
//! every step summary to a [`StepCallback`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use simnet_events::EventMux;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::driver::{DriverError, StepSummary, TopologyDriver};

/// Why the driver loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverEndReason {
    /// The tick source closed.
    TicksExhausted,
    /// The configured `max_ticks` limit was reached.
    MaxTicksReached,
}

/// Result of a driver run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverResult {
    /// Why the loop ended.
    pub end_reason: DriverEndReason,
    /// Number of ticks processed.
    pub total_ticks: u64,
    /// Number of events posted across all ticks.
    pub events_posted: u64,
    /// Summary of the last processed tick, if any.
    pub final_summary: Option<StepSummary>,
}

/// Callback invoked after each driver step.
pub trait StepCallback: Send {
    /// Called after a step completes successfully.
    fn on_step(&mut self, summary: &StepSummary, at: DateTime<Utc>);
}

/// A no-op step callback.
pub struct NoOpCallback;

impl StepCallback for NoOpCallback {
    fn on_step(&mut self, _summary: &StepSummary, _at: DateTime<Utc>) {}
}

/// Spawn a task emitting the current time once per `period`.
///
/// The first tick fires immediately. Ticks that cannot be delivered on time
/// are delayed rather than bunched up. The task ends when the receiver is
/// dropped. Must be called from within a Tokio runtime; a zero period is
/// raised to one millisecond.
pub fn ticker(period: Duration) -> mpsc::Receiver<DateTime<Utc>> {
    let period = period.max(Duration::from_millis(1));
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if tx.send(Utc::now()).await.is_err() {
                break;
            }
        }
    });
    rx
}

/// Step `driver` once per tick received on `ticks`.
///
/// Tick indices start at 0. The loop ends when `ticks` closes or, if
/// `max_ticks > 0`, after `max_ticks` ticks.
///
/// # Errors
///
/// Returns the first [`DriverError`]; no further ticks are processed.
pub async fn run_driver<D>(
    driver: &mut D,
    mux: &EventMux,
    ticks: &mut mpsc::Receiver<DateTime<Utc>>,
    max_ticks: u64,
    callback: &mut dyn StepCallback,
) -> Result<DriverResult, DriverError>
where
    D: TopologyDriver + ?Sized,
{
    let mut total_ticks: u64 = 0;
    let mut events_posted: u64 = 0;
    let mut final_summary = None;

    info!(max_ticks, "Topology driver starting");

    let end_reason = loop {
        if max_ticks > 0 && total_ticks >= max_ticks {
            break DriverEndReason::MaxTicksReached;
        }
        let Some(at) = ticks.recv().await else {
            break DriverEndReason::TicksExhausted;
        };

        let summary = match driver.step(total_ticks, mux) {
            Ok(summary) => summary,
            Err(e) => {
                warn!(tick = total_ticks, error = %e, "Topology driver failed");
                return Err(e);
            }
        };

        events_posted =
            events_posted.saturating_add(u64::try_from(summary.posted()).unwrap_or(u64::MAX));
        total_ticks = total_ticks.saturating_add(1);
        callback.on_step(&summary, at);
        final_summary = Some(summary);
    };

    let result = DriverResult {
        end_reason,
        total_ticks,
        events_posted,
        final_summary,
    };
    info!(
        reason = ?result.end_reason,
        total_ticks = result.total_ticks,
        events_posted = result.events_posted,
        "Topology driver stopped"
    );
    Ok(result)
}
