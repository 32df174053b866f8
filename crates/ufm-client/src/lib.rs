//! UFM client for the PDR isolation daemon.
//!
//! The isolation engine treats the fabric manager as an external
//! collaborator. This crate defines that contract and a REST implementation:
//!
//! - [`FabricManager`]: telemetry, isolated-port list, port actions,
//!   inventory lookups and event injection
//! - [`UfmClient`]: `reqwest` implementation against the UFM REST API
//! - [`UfmError`]: transport and decoding failures
//!
//! # Architecture
//!
//! ```text
//! +-----------------+        +------------------+        +-----------+
//! | isolation loop  |------->|  FabricManager   |------->|    UFM    |
//! | (decision core) |        |  (UfmClient)     |  REST  |           |
//! +-----------------+        +------------------+        +-----------+
//! ```

pub mod api;
pub mod client;
pub mod endpoints;
pub mod error;

pub use api::{
    ActionResponse, FabricManager, IsolatedPorts, PortMetadata, PortStatistics,
    TelemetrySnapshot, STATUS_OK,
};
pub use client::{parse_telemetry, UfmClient, UfmClientConfig};
pub use error::{Result, UfmError};
