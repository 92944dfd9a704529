//! Simulator binary for simnet.
//!
//! Wires a topology driver, an event mux and a journal together, replays
//! the journal into a topology view while the driver runs, and prints the
//! final topology as JSON on stdout.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `simnet-config.yaml` (or `SIMNET_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Create the event mux and a journal on node and connection events
//! 4. Build the configured driver from the seed
//! 5. Run the driver over a ticker while a reader drains the journal
//! 6. Close the journal, wait for the reader, log and print the result

mod error;
mod progress;
mod replay;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use simnet_core::config::{DriverKind, SimnetConfig};
use simnet_core::driver::{RandomTopology, ToggleTopology, TopologyDriver};
use simnet_core::runner::{self, DriverResult};
use simnet_core::view::TopologySnapshot;
use simnet_events::{EventMux, Journal};
use simnet_types::EventType;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::progress::ProgressLogger;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "simnet-config.yaml";

/// Application entry point for the simulator.
///
/// # Errors
///
/// Returns an error if any initialization step or the run itself fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration. Logging is not up yet; what happened is
    //    reported once it is.
    let config_path = config_path();
    let (config, found) = load_config(&config_path)?;

    // 2. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    info!("simnet-engine starting");
    if found {
        info!(path = %config_path.display(), "Config file loaded");
    } else {
        info!(path = %config_path.display(), "Config file not found, using defaults");
    }
    info!(
        seed = config.world.seed,
        node_pool = config.world.node_pool,
        tick_interval_ms = config.world.tick_interval_ms,
        max_ticks = config.world.max_ticks,
        driver = ?config.world.driver,
        replay_window = config.journal.replay_window,
        "Configuration loaded"
    );

    let (result, snapshot) = run(&config).await?;

    info!(
        end_reason = ?result.end_reason,
        total_ticks = result.total_ticks,
        events_posted = result.events_posted,
        nodes = snapshot.nodes.len(),
        conns = snapshot.conns.len(),
        "simnet-engine shutdown complete"
    );

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

/// Run the driver to completion and return its result with the replayed
/// topology.
async fn run(config: &SimnetConfig) -> Result<(DriverResult, TopologySnapshot), EngineError> {
    // 3. Mux and journal.
    let mux = EventMux::new();
    let journal = Journal::new(&mux, &EventType::ALL, config.journal.journal_config())?;
    info!(types = ?journal.event_types(), "Journal subscribed");

    // 4. Driver.
    let mut driver = build_driver(config);

    // 5. Driver task and journal reader.
    let wait = Duration::from_millis(config.journal.wait_timeout_ms);
    let reader = tokio::spawn(replay::replay(Arc::clone(&journal), wait));

    let interval = Duration::from_millis(config.world.tick_interval_ms);
    let max_ticks = config.world.max_ticks;
    let driver_mux = Arc::clone(&mux);
    let driver_task = tokio::spawn(async move {
        let mut ticks = runner::ticker(interval);
        let mut progress = ProgressLogger::new();
        let result = runner::run_driver(
            driver.as_mut(),
            &driver_mux,
            &mut ticks,
            max_ticks,
            &mut progress,
        )
        .await;
        (result, progress)
    });

    let (driver_result, progress) = driver_task.await?;

    // 6. Close, drain, report.
    journal.close();
    journal.closed().await;
    let view = reader.await?;
    let result = driver_result?;

    if view.applied() != result.events_posted {
        warn!(
            applied = view.applied(),
            posted = result.events_posted,
            "Replayed event count differs from posted count"
        );
    }
    let nodes = u64::try_from(view.node_count()).unwrap_or(u64::MAX);
    let conns = u64::try_from(view.conn_count()).unwrap_or(u64::MAX);
    if nodes != progress.live_nodes() || conns != progress.live_conns() {
        warn!(
            view_nodes = nodes,
            view_conns = conns,
            driver_nodes = progress.live_nodes(),
            driver_conns = progress.live_conns(),
            "Replayed topology differs from driver totals"
        );
    }
    info!(
        steps = progress.steps(),
        last_tick_at = ?progress.last_at(),
        counter = journal.counter(),
        cursor = journal.cursor(),
        retained = journal.retained(),
        "Journal final state"
    );

    Ok((result, view.snapshot()))
}

/// Build the configured driver, seeded from `world.seed`.
fn build_driver(config: &SimnetConfig) -> Box<dyn TopologyDriver> {
    let mut rng = StdRng::seed_from_u64(config.world.seed);
    match config.world.driver {
        DriverKind::Random => Box::new(RandomTopology::new(
            rng,
            config.world.node_pool,
            config.churn,
        )),
        DriverKind::Toggle => Box::new(ToggleTopology::from_rng(&mut rng)),
    }
}

/// Config file location: `SIMNET_CONFIG` if set, else the default path.
fn config_path() -> PathBuf {
    std::env::var_os("SIMNET_CONFIG").map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
}

/// Load the configuration, falling back to defaults when the file is
/// missing. Environment overrides apply either way.
///
/// Returns the config and whether the file was found.
fn load_config(path: &Path) -> Result<(SimnetConfig, bool), EngineError> {
    if path.exists() {
        Ok((SimnetConfig::from_file(path)?, true))
    } else {
        let mut config = SimnetConfig::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok((config, false))
    }
}
