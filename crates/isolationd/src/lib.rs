//! PDR isolation daemon
//!
//! Watches per-port health counters reported by UFM, isolates ports that
//! drop packets, overheat or exceed their BER thresholds, and returns them
//! to service once they have stayed healthy for a grace period.
//!
//! # Architecture
//!
//! ```text
//!                 +------------------------------------------+
//!                 |               IsolationMgr               |
//!   UFM           |                                          |
//!   isolated  --->|  PortStateStore  <--- reconcile          |
//!   ports         |                                          |
//!   telemetry --->|  AnomalyDetector ---> PortTelemetryStore |
//!                 |        |                                 |
//!                 |        v                                 |
//!                 |  IsolationPolicy   DeisolationPolicy     |---> isolate /
//!                 |                                          |     deisolate /
//!                 +------------------------------------------+     event
//!                         ^                 |
//!                  mpsc   |                 | watch
//!                 +------------------------------------------+
//!                 |            admin API (axum)              |
//!                 +------------------------------------------+
//! ```

pub mod admin;
pub mod config;
pub mod controller;
pub mod counters;
pub mod deisolation;
pub mod detector;
pub mod error;
pub mod isolation;
pub mod reference;
pub mod state;
pub mod telemetry;
pub mod types;

pub use config::IsolationConfig;
pub use controller::{
    AdminCommand, ControllerSnapshot, CycleReport, IsolationMgr, IsolationStats,
};
pub use error::{IsolationError, Result};
pub use reference::{BerThresholdRow, BerThresholdTable, FecLookup, ReferenceData};
pub use types::{canonical_port_name, Issue, IssueCause, PortState, PortStateKind};
