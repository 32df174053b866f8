//! Isolation policy.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use pdr_ufm_client::FabricManager;
use tracing::{debug, instrument, warn};

use crate::state::PortStateStore;
use crate::telemetry::PortTelemetryStore;
use crate::types::{IssueCause, PortStateKind};

/// Read-only inputs shared by the isolation and deisolation policies for one
/// cycle.
pub struct PolicyContext<'a, F: FabricManager + ?Sized> {
    pub client: &'a F,
    /// Canonical names of the ports UFM reported isolated this cycle.
    pub remote_isolated: &'a HashSet<String>,
    pub telemetry: &'a PortTelemetryStore,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationOutcome {
    /// UFM already holds the port isolated; nothing was sent.
    AlreadyIsolated,
    /// Port isolated (or would have been, in dry-run).
    Isolated { cause: IssueCause },
    /// UFM refused or did not answer; local state untouched.
    Failed { status: Option<u16> },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IsolationPolicy {
    dry_run: bool,
}

impl IsolationPolicy {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Isolates `port` for `cause` unless UFM already has it isolated.
    ///
    /// Local state moves to `{Isolated, cause}` only after UFM answers 200
    /// (immediately in dry-run). Overheating overrides the detected cause.
    #[instrument(skip(self, ctx, states), fields(dry_run = self.dry_run))]
    pub async fn eval_isolation<F: FabricManager + ?Sized>(
        &self,
        ctx: &PolicyContext<'_, F>,
        states: &mut PortStateStore,
        port: &str,
        cause: IssueCause,
    ) -> IsolationOutcome {
        if ctx.remote_isolated.contains(port) {
            debug!(port = %port, "Port already isolated in UFM");
            return IsolationOutcome::AlreadyIsolated;
        }

        let cause = if ctx.telemetry.is_out_of_operating_conditions(port) {
            IssueCause::Oonoc
        } else {
            cause
        };

        if !self.dry_run {
            match ctx.client.isolate_port(port).await {
                Ok(response) if response.is_success() => {}
                Ok(response) => {
                    warn!(
                        port = %port,
                        status = response.status,
                        body = %response.body,
                        "Failed to isolate port"
                    );
                    return IsolationOutcome::Failed {
                        status: Some(response.status),
                    };
                }
                Err(e) => {
                    warn!(port = %port, error = %e, "Failed to isolate port");
                    return IsolationOutcome::Failed { status: None };
                }
            }
        }

        states.upsert(port, PortStateKind::Isolated, cause, ctx.now);
        warn!(port = %port, cause = %cause, dry_run = self.dry_run, "Isolated port");
        IsolationOutcome::Isolated { cause }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::TEMP_COUNTER;
    use pdr_isolation_test::MockFabric;
    use std::time::Duration;

    fn telemetry() -> PortTelemetryStore {
        PortTelemetryStore::new(Duration::from_secs(300), 70.0)
    }

    #[tokio::test]
    async fn test_isolate_success_updates_state() {
        let fabric = MockFabric::new();
        let remote = HashSet::new();
        let telemetry = telemetry();
        let mut states = PortStateStore::new();
        let now = Utc::now();
        let ctx = PolicyContext {
            client: &fabric,
            remote_isolated: &remote,
            telemetry: &telemetry,
            now,
        };

        let outcome = IsolationPolicy::new(false)
            .eval_isolation(&ctx, &mut states, "p1", IssueCause::Pdr)
            .await;

        assert_eq!(outcome, IsolationOutcome::Isolated { cause: IssueCause::Pdr });
        assert_eq!(fabric.isolate_calls(), vec!["p1".to_string()]);
        let state = states.get("p1").unwrap();
        assert_eq!(state.state, PortStateKind::Isolated);
        assert_eq!(state.change_time, now);
    }

    #[tokio::test]
    async fn test_already_isolated_remotely_is_skipped() {
        let fabric = MockFabric::new();
        let remote: HashSet<String> = ["p1".to_string()].into_iter().collect();
        let telemetry = telemetry();
        let mut states = PortStateStore::new();
        let ctx = PolicyContext {
            client: &fabric,
            remote_isolated: &remote,
            telemetry: &telemetry,
            now: Utc::now(),
        };

        let outcome = IsolationPolicy::new(false)
            .eval_isolation(&ctx, &mut states, "p1", IssueCause::Pdr)
            .await;

        assert_eq!(outcome, IsolationOutcome::AlreadyIsolated);
        assert_eq!(fabric.calls().isolate, 0);
        assert!(states.is_empty());
    }

    #[tokio::test]
    async fn test_overheating_forces_oonoc() {
        let fabric = MockFabric::new();
        let remote = HashSet::new();
        let mut telemetry = telemetry();
        telemetry.record_value("p1", TEMP_COUNTER, 85.0);
        let mut states = PortStateStore::new();
        let ctx = PolicyContext {
            client: &fabric,
            remote_isolated: &remote,
            telemetry: &telemetry,
            now: Utc::now(),
        };

        let outcome = IsolationPolicy::new(false)
            .eval_isolation(&ctx, &mut states, "p1", IssueCause::Ber)
            .await;

        assert_eq!(outcome, IsolationOutcome::Isolated { cause: IssueCause::Oonoc });
        assert_eq!(states.get("p1").unwrap().cause, IssueCause::Oonoc);
    }

    #[tokio::test]
    async fn test_rejected_isolation_leaves_state() {
        let fabric = MockFabric::new();
        fabric.set_isolate_status(500);
        let remote = HashSet::new();
        let telemetry = telemetry();
        let mut states = PortStateStore::new();
        let ctx = PolicyContext {
            client: &fabric,
            remote_isolated: &remote,
            telemetry: &telemetry,
            now: Utc::now(),
        };

        let outcome = IsolationPolicy::new(false)
            .eval_isolation(&ctx, &mut states, "p1", IssueCause::Pdr)
            .await;

        assert_eq!(outcome, IsolationOutcome::Failed { status: Some(500) });
        assert!(states.is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_never_calls_ufm() {
        let fabric = MockFabric::new();
        let remote = HashSet::new();
        let telemetry = telemetry();
        let mut states = PortStateStore::new();
        let ctx = PolicyContext {
            client: &fabric,
            remote_isolated: &remote,
            telemetry: &telemetry,
            now: Utc::now(),
        };

        let outcome = IsolationPolicy::new(true)
            .eval_isolation(&ctx, &mut states, "p1", IssueCause::Pdr)
            .await;

        assert_eq!(outcome, IsolationOutcome::Isolated { cause: IssueCause::Pdr });
        assert_eq!(fabric.calls().isolate, 0);
        assert_eq!(states.get("p1").unwrap().state, PortStateKind::Isolated);
    }
}
