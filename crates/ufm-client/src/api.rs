//! Fabric manager contract consumed by the isolation engine.
//!
//! The decision engine never talks HTTP directly. It is written against
//! [`FabricManager`], which [`crate::UfmClient`] implements for a live UFM
//! and which tests replace with a recording mock.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// HTTP status UFM returns for an accepted port action.
pub const STATUS_OK: u16 = 200;

/// Counters reported for one port in a telemetry sample.
///
/// Values are kept as raw JSON so that a single malformed counter only hides
/// that counter instead of failing the whole sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortStatistics {
    #[serde(default)]
    pub statistics: HashMap<String, Value>,
}

impl PortStatistics {
    /// Builds statistics from numeric counters.
    pub fn from_counters<'a>(counters: impl IntoIterator<Item = (&'a str, f64)>) -> Self {
        Self {
            statistics: counters
                .into_iter()
                .map(|(name, value)| (name.to_string(), Value::from(value)))
                .collect(),
        }
    }

    /// Numeric value of a counter, if present and numeric.
    pub fn counter(&self, name: &str) -> Option<f64> {
        self.statistics.get(name).and_then(Value::as_f64)
    }

    /// Numeric value of a counter, or 0 when absent.
    pub fn counter_or_zero(&self, name: &str) -> f64 {
        self.counter(name).unwrap_or(0.0)
    }
}

/// One fabric's telemetry sample, keyed by port name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetrySnapshot {
    pub ports: BTreeMap<String, PortStatistics>,
}

impl TelemetrySnapshot {
    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }
}

/// Remote source of truth for isolation, as reported by UFM.
///
/// Identifiers are returned exactly as UFM reports them; callers canonicalise.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IsolatedPorts {
    #[serde(default, rename = "isolated_ports")]
    pub ports: Vec<String>,
}

/// Inventory record for one port.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub active_speed: Option<String>,
}

/// Result of a mutating port action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResponse {
    pub status: u16,
    pub body: String,
}

impl ActionResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
        }
    }

    /// Success is exactly HTTP 200.
    pub fn is_success(&self) -> bool {
        self.status == STATUS_OK
    }
}

/// Remote fabric manager operations.
///
/// Read operations return `Err` for transient failures (transport error,
/// non-success status, empty document). Mutating operations return the
/// status UFM answered with; `Err` only when no answer was received.
#[async_trait]
pub trait FabricManager: Send + Sync {
    /// Fetch the current per-port counters of one fabric.
    async fn get_telemetry(&self) -> Result<TelemetrySnapshot>;

    /// Fetch the ports UFM currently holds isolated.
    async fn get_isolated_ports(&self) -> Result<IsolatedPorts>;

    /// Isolate a port.
    async fn isolate_port(&self, port: &str) -> Result<ActionResponse>;

    /// Return a port to service.
    async fn deisolate_port(&self, port: &str) -> Result<ActionResponse>;

    /// Fetch inventory records for every port.
    async fn get_ports_metadata(&self) -> Result<Vec<PortMetadata>>;

    /// Fetch inventory records for one port.
    async fn get_port_metadata(&self, port: &str) -> Result<Vec<PortMetadata>>;

    /// Raise an external event in UFM.
    async fn send_event(&self, message: &str) -> Result<()>;
}
