//! Topology churn, tick loop, and replay for the simnet simulator.
//!
//! This crate produces the synthetic network activity that a journal
//! records: drivers decide which nodes and connections come up or go down
//! on each tick and post the resulting events to an event mux.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `simnet-config.yaml` into
//!   strongly-typed structs.
//! - [`delta`] -- Per-tick flip counts and the `one_out_of` draw.
//! - [`driver`] -- [`TopologyDriver`] trait, [`RandomTopology`] and
//!   [`ToggleTopology`].
//! - [`runner`] -- Tick source and the driver loop.
//! - [`view`] -- [`TopologyView`], a topology rebuilt from replayed events.
//!
//! [`TopologyDriver`]: driver::TopologyDriver
//! [`RandomTopology`]: driver::RandomTopology
//! [`ToggleTopology`]: driver::ToggleTopology
//! [`TopologyView`]: view::TopologyView

pub mod config;
pub mod delta;
pub mod driver;
pub mod runner;
pub mod view;
