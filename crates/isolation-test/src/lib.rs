//! Test infrastructure for the PDR isolation daemon
//!
//! Provides:
//! - A recording in-memory `FabricManager` that behaves like UFM
//! - Telemetry fixtures for common port conditions

pub mod fixtures;
mod mock_fabric;

pub use fixtures::*;
pub use mock_fabric::{CallCounts, MockFabric};
