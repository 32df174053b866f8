//! Deisolation policy.
//!
//! Per tracked port, in order:
//! - not isolated in UFM any more: drop the local entry
//! - overheating: stay isolated as OONOC, grace timer restarted
//! - changed less than `consider_time` ago: wait
//! - symbol BER above `max_ber`: stay isolated as BER, grace timer restarted
//! - otherwise: return the port to service

use chrono::Duration;
use pdr_ufm_client::FabricManager;
use tracing::{debug, info, instrument, warn};

use crate::isolation::PolicyContext;
use crate::state::PortStateStore;
use crate::types::{IssueCause, PortStateKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeisolationOutcome {
    NotTracked,
    /// UFM no longer isolates the port; the local entry was removed.
    StaleDropped,
    HeldOutOfConditions,
    GracePeriod,
    HeldHighBer,
    /// Port returned to service (or would have been, in dry-run).
    Deisolated,
    /// UFM refused or did not answer; local state untouched.
    Failed { status: Option<u16> },
}

#[derive(Debug, Clone, Copy)]
pub struct DeisolationPolicy {
    dry_run: bool,
    max_ber: f64,
    consider_time: Duration,
}

impl DeisolationPolicy {
    pub fn new(dry_run: bool, max_ber: f64, consider_time: Duration) -> Self {
        Self {
            dry_run,
            max_ber,
            consider_time,
        }
    }

    pub fn consider_time(&self) -> Duration {
        self.consider_time
    }

    #[instrument(skip(self, ctx, states), fields(dry_run = self.dry_run))]
    pub async fn eval_deisolate<F: FabricManager + ?Sized>(
        &self,
        ctx: &PolicyContext<'_, F>,
        states: &mut PortStateStore,
        port: &str,
    ) -> DeisolationOutcome {
        let Some(change_time) = states.get(port).map(|state| state.change_time) else {
            return DeisolationOutcome::NotTracked;
        };

        if !ctx.remote_isolated.contains(port) {
            info!(port = %port, "Port no longer isolated in UFM, dropping local state");
            states.remove(port);
            return DeisolationOutcome::StaleDropped;
        }

        if ctx.telemetry.is_out_of_operating_conditions(port) {
            debug!(port = %port, "Port still out of operating conditions");
            states.upsert(port, PortStateKind::Isolated, IssueCause::Oonoc, ctx.now);
            return DeisolationOutcome::HeldOutOfConditions;
        }

        if ctx.now - change_time < self.consider_time {
            return DeisolationOutcome::GracePeriod;
        }

        let symbol_ber = ctx.telemetry.symbol_ber(port);
        if symbol_ber > self.max_ber {
            debug!(port = %port, symbol_ber, max_ber = self.max_ber, "Port BER still high");
            states.upsert(port, PortStateKind::Isolated, IssueCause::Ber, ctx.now);
            return DeisolationOutcome::HeldHighBer;
        }

        if !self.dry_run {
            match ctx.client.deisolate_port(port).await {
                Ok(response) if response.is_success() => {}
                Ok(response) => {
                    warn!(
                        port = %port,
                        status = response.status,
                        body = %response.body,
                        "Failed to deisolate port"
                    );
                    return DeisolationOutcome::Failed {
                        status: Some(response.status),
                    };
                }
                Err(e) => {
                    warn!(port = %port, error = %e, "Failed to deisolate port");
                    return DeisolationOutcome::Failed { status: None };
                }
            }
        }

        states.remove(port);
        warn!(port = %port, dry_run = self.dry_run, "Deisolated port");
        DeisolationOutcome::Deisolated
    }
}
