//! Telemetry fixtures
//!
//! Builders for the per-port counter samples UFM reports.

use pdr_ufm_client::{PortStatistics, TelemetrySnapshot};

/// Counter names as UFM reports them
pub mod counter_names {
    pub const RCV_PACKETS: &str = "PortRcvPktsExtended";
    pub const RCV_ERRORS: &str = "PortRcvErrorsExtended";
    pub const RCV_REMOTE_PHY_ERRORS: &str = "PortRcvRemotePhysicalErrorsExtended";
    pub const TEMPERATURE: &str = "Module_Temperature";
    pub const FEC_MODE: &str = "fec_mode_active";
    pub const RAW_BER: &str = "raw_ber";
    pub const EFF_BER: &str = "eff_ber";
    pub const SYMBOL_BER: &str = "symbol_ber";
}

use counter_names::*;

/// One port's counters in a sample
#[derive(Debug, Clone)]
pub struct PortSample {
    pub port: String,
    pub counters: Vec<(&'static str, f64)>,
}

impl PortSample {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            counters: Vec::new(),
        }
    }

    /// Add a counter
    pub fn with_counter(mut self, name: &'static str, value: f64) -> Self {
        self.counters.push((name, value));
        self
    }

    /// Receive packet and local error counters
    pub fn with_traffic(self, packets: f64, errors: f64) -> Self {
        self.with_counter(RCV_PACKETS, packets)
            .with_counter(RCV_ERRORS, errors)
    }

    pub fn with_temperature(self, celsius: f64) -> Self {
        self.with_counter(TEMPERATURE, celsius)
    }

    /// FEC mode code plus symbol BER
    pub fn with_symbol_ber(self, fec_code: f64, symbol_ber: f64) -> Self {
        self.with_counter(FEC_MODE, fec_code)
            .with_counter(SYMBOL_BER, symbol_ber)
    }

    pub fn statistics(&self) -> PortStatistics {
        PortStatistics::from_counters(self.counters.iter().copied())
    }
}

/// Build a snapshot from port samples
pub fn snapshot<I>(samples: I) -> TelemetrySnapshot
where
    I: IntoIterator<Item = PortSample>,
{
    let mut snapshot = TelemetrySnapshot::default();
    for sample in samples {
        snapshot.ports.insert(sample.port.clone(), sample.statistics());
    }
    snapshot
}

/// Common port conditions
pub mod port_fixtures {
    use super::*;

    /// Traffic flowing with no errors, no temperature reported
    pub fn healthy(port: &str, packets: f64) -> PortSample {
        PortSample::new(port).with_traffic(packets, 0.0)
    }

    /// Traffic flowing with the given error count, no temperature reported
    pub fn dropping(port: &str, packets: f64, errors: f64) -> PortSample {
        PortSample::new(port).with_traffic(packets, errors)
    }

    /// No traffic at a high temperature
    pub fn overheating(port: &str, celsius: f64) -> PortSample {
        PortSample::new(port)
            .with_traffic(0.0, 5.0)
            .with_temperature(celsius)
    }
}
