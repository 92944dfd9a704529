//! Shared type definitions for the simnet topology simulator.
//!
//! Every crate in the workspace speaks in these types: the event mux routes
//! [`Event`]s by [`EventType`], the journal buffers them, and the drivers
//! build them. Types are exported to `TypeScript` via `ts-rs` so a
//! visualisation front-end can decode journal dumps.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for node and event identifiers
//! - [`enums`] -- [`EventType`] and [`Action`]
//! - [`structs`] -- [`SimNode`], [`SimConn`] and the [`Event`] envelope

pub mod enums;
pub mod ids;
pub mod structs;

pub use enums::{Action, EventType};
pub use ids::{EventId, NodeId};
pub use structs::{Event, EventObject, SimConn, SimNode};
