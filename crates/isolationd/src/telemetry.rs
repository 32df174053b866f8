//! Per-port telemetry store.
//!
//! Holds the last observed value of every counter the detector looks at, plus
//! the resolved active link speed. Entries are created lazily and never
//! removed; the port set is bounded and changes slowly.

use std::collections::HashMap;
use std::time::Duration;

use crate::counters::{SYMBOL_BER, TEMP_COUNTER};

/// Last observed counters for one port.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortTelemetry {
    pub counters: HashMap<String, f64>,
    pub active_speed: Option<String>,
}

/// Port name -> last observed telemetry.
#[derive(Debug, Clone)]
pub struct PortTelemetryStore {
    /// Rate window in seconds. Equal to the polling interval, not the
    /// measured time between samples.
    interval_secs: f64,
    tmax: f64,
    ports: HashMap<String, PortTelemetry>,
}

impl PortTelemetryStore {
    pub fn new(interval: Duration, tmax: f64) -> Self {
        Self {
            interval_secs: interval.as_secs_f64(),
            tmax,
            ports: HashMap::new(),
        }
    }

    fn entry(&mut self, port: &str) -> &mut PortTelemetry {
        self.ports.entry(port.to_string()).or_default()
    }

    /// Derives a per-interval rate for `counter` and stores `new_value` as the
    /// new baseline.
    ///
    /// The rate is `(previous - new_value) / interval` when a non-zero
    /// previous value exists and `new_value` grew past it; otherwise 0. The
    /// stored value is overwritten in every case.
    pub fn update_rate(&mut self, port: &str, counter: &str, new_value: f64) -> f64 {
        let interval = self.interval_secs;
        let telemetry = self.entry(port);

        let rate = match telemetry.counters.get(counter) {
            Some(&previous) if previous != 0.0 && new_value > previous => {
                (previous - new_value) / interval
            }
            _ => 0.0,
        };

        telemetry.counters.insert(counter.to_string(), new_value);
        rate
    }

    /// Stores a new temperature reading and returns the absolute change from
    /// the previous one. A port with no stored reading has a 0 baseline, so
    /// its first delta is the reading itself.
    pub fn update_temperature(&mut self, port: &str, temperature: f64) -> f64 {
        let telemetry = self.entry(port);
        let previous = telemetry.counters.get(TEMP_COUNTER).copied();
        let delta = (previous.unwrap_or(0.0) - temperature).abs();

        telemetry
            .counters
            .insert(TEMP_COUNTER.to_string(), temperature);
        delta
    }

    pub fn temperature(&self, port: &str) -> Option<f64> {
        self.value(port, TEMP_COUNTER)
    }

    /// Stores a raw counter value without deriving anything from it.
    pub fn record_value(&mut self, port: &str, counter: &str, value: f64) {
        self.entry(port).counters.insert(counter.to_string(), value);
    }

    pub fn value(&self, port: &str, counter: &str) -> Option<f64> {
        self.ports
            .get(port)
            .and_then(|telemetry| telemetry.counters.get(counter))
            .copied()
    }

    /// Latest symbol BER, 0 when never reported.
    pub fn symbol_ber(&self, port: &str) -> f64 {
        self.value(port, SYMBOL_BER).unwrap_or(0.0)
    }

    pub fn active_speed(&self, port: &str) -> Option<&str> {
        self.ports
            .get(port)
            .and_then(|telemetry| telemetry.active_speed.as_deref())
    }

    pub fn set_active_speed(&mut self, port: &str, speed: impl Into<String>) {
        self.entry(port).active_speed = Some(speed.into());
    }

    /// True iff the last recorded temperature is above `tmax`. No reading
    /// means false.
    pub fn is_out_of_operating_conditions(&self, port: &str) -> bool {
        self.temperature(port).is_some_and(|t| t > self.tmax)
    }

    pub fn get(&self, port: &str) -> Option<&PortTelemetry> {
        self.ports.get(port)
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}
