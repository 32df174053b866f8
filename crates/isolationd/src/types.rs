//! Port state and issue types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the controller believes it has done to a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortStateKind {
    Normal,
    Isolated,
    /// Maintenance was done on the link; re-evaluate for return to service.
    Treated,
}

impl PortStateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortStateKind::Normal => "normal",
            PortStateKind::Isolated => "isolated",
            PortStateKind::Treated => "treated",
        }
    }
}

impl fmt::Display for PortStateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a port is (or was) considered unhealthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCause {
    Init,
    /// Out of normal operating conditions (overheating).
    Oonoc,
    /// Packet drop rate above threshold.
    Pdr,
    /// Bit error rate above the speed/FEC threshold.
    Ber,
    PdrBer,
}

impl IssueCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCause::Init => "init",
            IssueCause::Oonoc => "oonoc",
            IssueCause::Pdr => "pdr",
            IssueCause::Ber => "ber",
            IssueCause::PdrBer => "pdr_ber",
        }
    }
}

impl fmt::Display for IssueCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracked state of one port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortState {
    pub name: String,
    pub state: PortStateKind,
    pub cause: IssueCause,
    /// Populated for interface compatibility; not consulted by any decision.
    pub maybe_fixed: bool,
    pub change_time: DateTime<Utc>,
}

impl PortState {
    pub fn new(name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            state: PortStateKind::Normal,
            cause: IssueCause::Init,
            maybe_fixed: false,
            change_time: now,
        }
    }

    /// Transition to `state` with `cause`, stamping the change time.
    pub fn update(&mut self, state: PortStateKind, cause: IssueCause, now: DateTime<Utc>) {
        self.state = state;
        self.cause = cause;
        self.change_time = now;
    }
}

/// A port found anomalous in the current cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub port: String,
    pub cause: IssueCause,
}

impl Issue {
    pub fn new(port: impl Into<String>, cause: IssueCause) -> Self {
        Self {
            port: port.into(),
            cause,
        }
    }
}

/// Strips the UFM prefix from an isolated-port identifier.
///
/// `0xe41d2d0300062380_3` becomes `e41d2d0300062380_3`; everything after the
/// last `x` is the canonical name.
pub fn canonical_port_name(raw: &str) -> &str {
    raw.rsplit('x').next().unwrap_or(raw)
}
