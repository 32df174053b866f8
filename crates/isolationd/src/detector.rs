//! Anomaly detection over one telemetry snapshot.
//!
//! Each port is evaluated independently:
//! 1. Packet drop ratio (error rate over receive rate) above `max_pdr`: PDR.
//! 2. Otherwise, temperature above `tmax` or a jump above `d_tmax`: OONOC.
//! 3. With BER checking on, a BER threshold match upgrades PDR to PDR_BER
//!    and records BER for a port with no issue yet. OONOC is left alone.
//!
//! Every evaluation writes the sampled counters back to the telemetry store.

use std::collections::BTreeMap;

use pdr_ufm_client::{FabricManager, PortStatistics, TelemetrySnapshot};
use tracing::{debug, error, instrument, warn};

use crate::config::IsolationConfig;
use crate::counters::{
    EFF_BER, ERRORS_COUNTER, FEC_MODE, RAW_BER, RCV_ERRORS_COUNTER, RCV_PACKETS_COUNTER,
    RCV_REMOTE_PHY_ERROR_COUNTER, SYMBOL_BER, TEMP_COUNTER,
};
use crate::reference::{BerMeasurement, ReferenceData};
use crate::telemetry::PortTelemetryStore;
use crate::types::{Issue, IssueCause};

/// Detection thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorThresholds {
    pub max_pdr: f64,
    pub tmax: f64,
    pub d_tmax: f64,
    pub ber_check: bool,
}

impl DetectorThresholds {
    pub fn from_config(config: &IsolationConfig) -> Self {
        Self {
            max_pdr: config.common.max_pdr,
            tmax: config.common.tmax,
            d_tmax: config.common.d_tmax,
            ber_check: config.common.configured_ber_check,
        }
    }
}

pub struct AnomalyDetector {
    thresholds: DetectorThresholds,
    reference: ReferenceData,
}

impl AnomalyDetector {
    pub fn new(thresholds: DetectorThresholds, reference: ReferenceData) -> Self {
        Self {
            thresholds,
            reference,
        }
    }

    pub fn thresholds(&self) -> &DetectorThresholds {
        &self.thresholds
    }

    /// Fetches telemetry and evaluates it.
    ///
    /// A failed fetch yields no issues; the cycle carries on.
    #[instrument(skip_all)]
    pub async fn read_issues<F: FabricManager + ?Sized>(
        &self,
        client: &F,
        store: &mut PortTelemetryStore,
    ) -> BTreeMap<String, Issue> {
        match client.get_telemetry().await {
            Ok(snapshot) => self.evaluate(client, &snapshot, store).await,
            Err(e) if e.is_transient() => {
                warn!(error = %e, "Telemetry unavailable, no issues this cycle");
                BTreeMap::new()
            }
            Err(e) => {
                error!(error = %e, "Failed to retrieve telemetry, no issues this cycle");
                BTreeMap::new()
            }
        }
    }

    /// Evaluates a snapshot, returning at most one issue per port.
    pub async fn evaluate<F: FabricManager + ?Sized>(
        &self,
        client: &F,
        snapshot: &TelemetrySnapshot,
        store: &mut PortTelemetryStore,
    ) -> BTreeMap<String, Issue> {
        let mut issues = BTreeMap::new();

        for (port, stats) in &snapshot.ports {
            let mut cause = self.check_rates(port, stats, store);

            let measured = BerMeasurement {
                raw: stats.counter(RAW_BER),
                effective: stats.counter(EFF_BER),
                symbol: stats.counter(SYMBOL_BER),
            };
            record_ber(port, &measured, store);

            if self.thresholds.ber_check
                && !measured.is_empty()
                && self.ber_exceeded(client, port, stats, &measured, store).await
            {
                cause = match cause {
                    Some(IssueCause::Pdr) => Some(IssueCause::PdrBer),
                    None => Some(IssueCause::Ber),
                    other => other,
                };
            }

            if let Some(cause) = cause {
                debug!(port = %port, cause = %cause, "Detected port issue");
                issues.insert(port.clone(), Issue::new(port.clone(), cause));
            }
        }

        issues
    }

    /// PDR then OONOC. Always updates the stored baselines.
    fn check_rates(
        &self,
        port: &str,
        stats: &PortStatistics,
        store: &mut PortTelemetryStore,
    ) -> Option<IssueCause> {
        let errors = stats.counter_or_zero(RCV_ERRORS_COUNTER)
            + stats.counter_or_zero(RCV_REMOTE_PHY_ERROR_COUNTER);
        let error_rate = store.update_rate(port, ERRORS_COUNTER, errors);
        let packets = stats.counter_or_zero(RCV_PACKETS_COUNTER);
        let packet_rate = store.update_rate(port, RCV_PACKETS_COUNTER, packets);

        let temperature = stats.counter(TEMP_COUNTER);
        let delta = temperature
            .map(|t| store.update_temperature(port, t))
            .unwrap_or(0.0);

        if packet_rate != 0.0 && error_rate / packet_rate > self.thresholds.max_pdr {
            return Some(IssueCause::Pdr);
        }

        // a zero reading means the module does not report temperature
        let overheating = temperature.is_some_and(|t| {
            t != 0.0 && (t > self.thresholds.tmax || delta > self.thresholds.d_tmax)
        });
        overheating.then_some(IssueCause::Oonoc)
    }

    async fn ber_exceeded<F: FabricManager + ?Sized>(
        &self,
        client: &F,
        port: &str,
        stats: &PortStatistics,
        measured: &BerMeasurement,
        store: &mut PortTelemetryStore,
    ) -> bool {
        let Some(fec_mode) = self
            .reference
            .fec_lookup
            .resolve_counter(stats.counter(FEC_MODE))
        else {
            debug!(port = %port, "Unknown FEC mode, skipping BER check");
            return false;
        };

        let Some(speed) = resolve_speed(client, port, store).await else {
            debug!(port = %port, "Active speed unknown, skipping BER check");
            return false;
        };

        self.reference.ber_table.exceeds(&speed, fec_mode, measured)
    }
}

fn record_ber(port: &str, measured: &BerMeasurement, store: &mut PortTelemetryStore) {
    let values = [
        (RAW_BER, measured.raw),
        (EFF_BER, measured.effective),
        (SYMBOL_BER, measured.symbol),
    ];
    for (counter, value) in values {
        if let Some(value) = value {
            store.record_value(port, counter, value);
        }
    }
}

/// Cached active speed, falling back to a one-off metadata lookup.
async fn resolve_speed<F: FabricManager + ?Sized>(
    client: &F,
    port: &str,
    store: &mut PortTelemetryStore,
) -> Option<String> {
    if let Some(speed) = store.active_speed(port) {
        return Some(speed.to_string());
    }

    match client.get_port_metadata(port).await {
        Ok(records) => {
            let speed = records.into_iter().find_map(|record| record.active_speed)?;
            store.set_active_speed(port, speed.clone());
            Some(speed)
        }
        Err(e) => {
            warn!(port = %port, error = %e, "Failed to fetch port metadata");
            None
        }
    }
}
