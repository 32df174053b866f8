//! Isolation control loop.
//!
//! `IsolationMgr` owns both stores and is their only writer. One cycle:
//! 1. Fetch the UFM isolated list and reconcile local state with it.
//! 2. Detect issues from a fresh telemetry sample.
//! 3. Too many issues: raise one UFM event and isolate nothing.
//!    Otherwise run the isolation policy for every issue.
//! 4. Run the deisolation policy for tracked ports that qualify.
//!
//! The loop logs a failed cycle and carries on. Admin requests arrive over a
//! channel and are applied between cycles.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pdr_ufm_client::FabricManager;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::IsolationConfig;
use crate::deisolation::{DeisolationOutcome, DeisolationPolicy};
use crate::detector::{AnomalyDetector, DetectorThresholds};
use crate::error::Result;
use crate::isolation::{IsolationOutcome, IsolationPolicy, PolicyContext};
use crate::reference::ReferenceData;
use crate::state::{PortStateStore, ReconcileSummary};
use crate::telemetry::PortTelemetryStore;
use crate::types::{canonical_port_name, IssueCause, PortState, PortStateKind};

/// Loop-level settings.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub interval: Duration,
    pub max_num_isolate: usize,
    pub automatic_deisolate: bool,
}

impl ControllerSettings {
    pub fn from_config(config: &IsolationConfig) -> Self {
        Self {
            interval: config.interval(),
            max_num_isolate: config.common.max_num_isolate,
            automatic_deisolate: config.common.automatic_deisolate,
        }
    }
}

/// Cumulative controller counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IsolationStats {
    pub cycles: u64,
    pub failed_cycles: u64,
    pub issues_detected: u64,
    pub isolations: u64,
    pub failed_isolations: u64,
    pub deisolations: u64,
    pub failed_deisolations: u64,
    pub circuit_breaker_trips: u64,
    pub discovered_isolations: u64,
    pub stale_dropped: u64,
}

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub issues: usize,
    pub circuit_breaker_tripped: bool,
    pub isolated: Vec<String>,
    pub failed_isolations: Vec<String>,
    pub deisolated: Vec<String>,
    pub failed_deisolations: Vec<String>,
    pub discovered: Vec<String>,
    pub dropped: Vec<String>,
}

/// State published after every cycle for the admin interface.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ControllerSnapshot {
    pub ports: BTreeMap<String, PortState>,
    pub stats: IsolationStats,
    pub last_cycle: Option<DateTime<Utc>>,
}

/// Requests from the admin interface.
#[derive(Debug)]
pub enum AdminCommand {
    /// Mark tracked ports as treated; replies with the ports that changed.
    MarkTreated {
        ports: HashMap<String, PortStateKind>,
        reply: oneshot::Sender<Vec<String>>,
    },
}

pub struct IsolationMgr<F: FabricManager + ?Sized> {
    client: Arc<F>,
    settings: ControllerSettings,
    telemetry: PortTelemetryStore,
    states: PortStateStore,
    detector: AnomalyDetector,
    isolation: IsolationPolicy,
    deisolation: DeisolationPolicy,
    /// Canonical names UFM reports isolated, plus ports isolated this cycle.
    remote_isolated: HashSet<String>,
    stats: IsolationStats,
    last_cycle: Option<DateTime<Utc>>,
    admin_rx: Option<mpsc::Receiver<AdminCommand>>,
    snapshot_tx: watch::Sender<ControllerSnapshot>,
}

impl<F: FabricManager + ?Sized> IsolationMgr<F> {
    pub fn new(client: Arc<F>, config: &IsolationConfig, reference: ReferenceData) -> Self {
        let (snapshot_tx, _) = watch::channel(ControllerSnapshot::default());

        Self {
            client,
            settings: ControllerSettings::from_config(config),
            telemetry: PortTelemetryStore::new(config.interval(), config.common.tmax),
            states: PortStateStore::new(),
            detector: AnomalyDetector::new(DetectorThresholds::from_config(config), reference),
            isolation: IsolationPolicy::new(config.common.dry_run),
            deisolation: DeisolationPolicy::new(
                config.common.dry_run,
                config.common.max_ber,
                config.deisolate_consider_time(),
            ),
            remote_isolated: HashSet::new(),
            stats: IsolationStats::default(),
            last_cycle: None,
            admin_rx: None,
            snapshot_tx,
        }
    }

    /// Accept admin commands from `rx`.
    pub fn with_admin(mut self, rx: mpsc::Receiver<AdminCommand>) -> Self {
        self.admin_rx = Some(rx);
        self
    }

    /// Watch the snapshot published after every cycle.
    pub fn subscribe(&self) -> watch::Receiver<ControllerSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn stats(&self) -> &IsolationStats {
        &self.stats
    }

    pub fn states(&self) -> &PortStateStore {
        &self.states
    }

    pub fn telemetry(&self) -> &PortTelemetryStore {
        &self.telemetry
    }

    pub fn remote_isolated(&self) -> &HashSet<String> {
        &self.remote_isolated
    }

    // ===== Startup =====

    /// Caches every port's active speed. On failure the detector falls back
    /// to per-port lookups.
    pub async fn prefetch_port_metadata(&mut self) -> usize {
        match self.client.get_ports_metadata().await {
            Ok(records) => {
                let mut cached = 0;
                for record in records {
                    let Some(speed) = record.active_speed else {
                        continue;
                    };
                    if record.name.is_empty() {
                        continue;
                    }
                    self.telemetry.set_active_speed(&record.name, speed);
                    cached += 1;
                }
                info!(ports = cached, "Cached port active speeds");
                cached
            }
            Err(e) => {
                warn!(error = %e, "Failed to prefetch port metadata");
                0
            }
        }
    }

    // ===== Cycle steps =====

    /// Fetches the UFM isolated list and reconciles local state with it.
    pub async fn refresh_isolation_state(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<ReconcileSummary> {
        let isolated = self.client.get_isolated_ports().await?;

        self.remote_isolated = isolated
            .ports
            .iter()
            .map(|raw| canonical_port_name(raw).to_string())
            .collect();

        let summary = self.states.reconcile(&self.remote_isolated, now);
        self.stats.discovered_isolations += summary.discovered.len() as u64;
        self.stats.stale_dropped += summary.dropped.len() as u64;
        Ok(summary)
    }

    /// Marks tracked ports whose requested state is treated.
    pub fn set_ports_as_treated(
        &mut self,
        ports: &HashMap<String, PortStateKind>,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        let marked = self.states.mark_treated(ports, now);
        if !marked.is_empty() {
            info!(ports = ?marked, "Ports marked as treated");
            self.publish();
        }
        marked
    }

    /// Runs one cycle. `Err` means the UFM isolated list could not be read
    /// and nothing else was attempted.
    #[instrument(skip(self))]
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleReport> {
        self.stats.cycles += 1;
        self.last_cycle = Some(now);

        let summary = self.refresh_isolation_state(now).await?;
        let mut report = CycleReport {
            discovered: summary.discovered,
            dropped: summary.dropped,
            ..Default::default()
        };

        let issues = self
            .detector
            .read_issues(self.client.as_ref(), &mut self.telemetry)
            .await;
        report.issues = issues.len();
        self.stats.issues_detected += issues.len() as u64;

        if issues.len() > self.settings.max_num_isolate {
            let message = format!(
                "got too many ports detected as unhealthy: {}, skipping isolation",
                issues.len()
            );
            warn!(issues = issues.len(), max = self.settings.max_num_isolate, "{}", message);
            self.stats.circuit_breaker_trips += 1;
            report.circuit_breaker_tripped = true;

            if let Err(e) = self.client.send_event(&message).await {
                warn!(error = %e, "Failed to send UFM event");
            }
        } else {
            let ctx = PolicyContext {
                client: self.client.as_ref(),
                remote_isolated: &self.remote_isolated,
                telemetry: &self.telemetry,
                now,
            };

            for issue in issues.values() {
                let outcome = self
                    .isolation
                    .eval_isolation(&ctx, &mut self.states, &issue.port, issue.cause)
                    .await;
                match outcome {
                    IsolationOutcome::Isolated { .. } => {
                        self.stats.isolations += 1;
                        report.isolated.push(issue.port.clone());
                    }
                    IsolationOutcome::Failed { .. } => {
                        self.stats.failed_isolations += 1;
                        report.failed_isolations.push(issue.port.clone());
                    }
                    IsolationOutcome::AlreadyIsolated => {}
                }
            }
        }

        // UFM accepted these; they are isolated even though this cycle's
        // list predates them.
        self.remote_isolated.extend(report.isolated.iter().cloned());

        self.scan_for_deisolation(now, &mut report).await;
        self.publish();

        Ok(report)
    }

    fn should_evaluate_deisolation(&self, state: &PortState) -> bool {
        self.settings.automatic_deisolate
            || state.cause == IssueCause::Oonoc
            || state.state == PortStateKind::Treated
    }

    async fn scan_for_deisolation(&mut self, now: DateTime<Utc>, report: &mut CycleReport) {
        let candidates: Vec<String> = self
            .states
            .names()
            .into_iter()
            .filter(|port| {
                self.states
                    .get(port)
                    .is_some_and(|state| self.should_evaluate_deisolation(state))
            })
            .collect();

        let ctx = PolicyContext {
            client: self.client.as_ref(),
            remote_isolated: &self.remote_isolated,
            telemetry: &self.telemetry,
            now,
        };

        for port in candidates {
            let outcome = self
                .deisolation
                .eval_deisolate(&ctx, &mut self.states, &port)
                .await;
            debug!(port = %port, outcome = ?outcome, "Deisolation evaluated");
            match outcome {
                DeisolationOutcome::Deisolated => {
                    self.stats.deisolations += 1;
                    report.deisolated.push(port);
                }
                DeisolationOutcome::Failed { .. } => {
                    self.stats.failed_deisolations += 1;
                    report.failed_deisolations.push(port);
                }
                DeisolationOutcome::StaleDropped => {
                    self.stats.stale_dropped += 1;
                    report.dropped.push(port);
                }
                _ => {}
            }
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(ControllerSnapshot {
            ports: self.states.snapshot(),
            stats: self.stats.clone(),
            last_cycle: self.last_cycle,
        });
    }

    // ===== Loop =====

    /// Runs cycles until `cancel` fires. A failed cycle is logged and the
    /// loop proceeds to the next one.
    pub async fn run(&mut self, cancel: CancellationToken) {
        info!(
            interval_secs = self.settings.interval.as_secs(),
            dry_run = self.isolation.dry_run(),
            "Isolation manager initialized, starting isolation loop"
        );
        self.prefetch_port_metadata().await;

        loop {
            match self.run_cycle(Utc::now()).await {
                Ok(report) => info!(
                    issues = report.issues,
                    isolated = report.isolated.len(),
                    deisolated = report.deisolated.len(),
                    tracked = self.states.len(),
                    "Isolation cycle complete"
                ),
                Err(e) => {
                    self.stats.failed_cycles += 1;
                    if e.is_transient() {
                        warn!(error = %e, "Isolation cycle failed, retrying next cycle");
                    } else {
                        error!(error = %e, "Isolation cycle failed");
                    }
                    self.publish();
                }
            }

            if self.wait_next_cycle(&cancel).await {
                break;
            }
        }

        info!(stats = ?self.stats, "Isolation loop stopped");
    }

    /// Sleeps one interval while serving admin commands. Returns true when
    /// cancelled.
    async fn wait_next_cycle(&mut self, cancel: &CancellationToken) -> bool {
        let sleep = tokio::time::sleep(self.settings.interval);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return true,
                _ = &mut sleep => return false,
                Some(command) = recv_admin(&mut self.admin_rx) => self.handle_admin(command),
            }
        }
    }

    fn handle_admin(&mut self, command: AdminCommand) {
        match command {
            AdminCommand::MarkTreated { ports, reply } => {
                let marked = self.set_ports_as_treated(&ports, Utc::now());
                if reply.send(marked).is_err() {
                    debug!("Admin requester went away before the reply");
                }
            }
        }
    }
}

async fn recv_admin(rx: &mut Option<mpsc::Receiver<AdminCommand>>) -> Option<AdminCommand> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdr_isolation_test::{port_fixtures, MockFabric};
    use pretty_assertions::assert_eq;

    fn config(max_num_isolate: usize) -> IsolationConfig {
        let mut config = IsolationConfig::default();
        config.common.max_num_isolate = max_num_isolate;
        config.common.tmax = 80.0;
        config.common.configured_ber_check = false;
        config
    }

    fn manager(fabric: &Arc<MockFabric>, config: &IsolationConfig) -> IsolationMgr<MockFabric> {
        IsolationMgr::new(Arc::clone(fabric), config, ReferenceData::default())
    }

    #[tokio::test]
    async fn test_cycle_isolates_and_keeps_state() {
        let fabric = Arc::new(MockFabric::new());
        fabric.set_samples([port_fixtures::overheating("p1", 95.0)]);
        let mut mgr = manager(&fabric, &config(10));
        let now = Utc::now();

        let report = mgr.run_cycle(now).await.unwrap();

        assert_eq!(report.isolated, vec!["p1".to_string()]);
        assert!(report.dropped.is_empty());
        let state = mgr.states().get("p1").unwrap();
        assert_eq!(state.state, PortStateKind::Isolated);
        assert_eq!(state.cause, IssueCause::Oonoc);
        assert_eq!(mgr.stats().isolations, 1);
    }

    #[tokio::test]
    async fn test_circuit_breaker() {
        let fabric = Arc::new(MockFabric::new());
        fabric.set_samples([
            port_fixtures::overheating("p1", 95.0),
            port_fixtures::overheating("p2", 95.0),
            port_fixtures::overheating("p3", 95.0),
        ]);
        let mut mgr = manager(&fabric, &config(2));

        let report = mgr.run_cycle(Utc::now()).await.unwrap();

        assert!(report.circuit_breaker_tripped);
        assert_eq!(fabric.calls().isolate, 0);
        assert_eq!(
            fabric.events(),
            vec!["got too many ports detected as unhealthy: 3, skipping isolation".to_string()]
        );
        assert_eq!(mgr.stats().circuit_breaker_trips, 1);
    }

    #[tokio::test]
    async fn test_isolated_list_failure_fails_cycle() {
        let fabric = Arc::new(MockFabric::new());
        fabric.fail_isolated_ports(true);
        let mut mgr = manager(&fabric, &config(10));

        assert!(mgr.run_cycle(Utc::now()).await.is_err());
        assert_eq!(fabric.calls().telemetry, 0);
    }

    #[tokio::test]
    async fn test_prefetch_caches_speeds() {
        let fabric = Arc::new(MockFabric::new());
        fabric.set_speed("p1", "HDR");
        fabric.set_speed("p2", "NDR");
        let mut mgr = manager(&fabric, &config(10));

        assert_eq!(mgr.prefetch_port_metadata().await, 2);
        assert_eq!(mgr.telemetry().active_speed("p2"), Some("NDR"));
    }

    #[tokio::test]
    async fn test_snapshot_published_after_cycle() {
        let fabric = Arc::new(MockFabric::new());
        fabric.set_isolated(&["0xp7"]);
        let mut mgr = manager(&fabric, &config(10));
        let snapshots = mgr.subscribe();

        mgr.run_cycle(Utc::now()).await.unwrap();

        let snapshot = snapshots.borrow();
        assert!(snapshot.ports.contains_key("p7"));
        assert_eq!(snapshot.stats.cycles, 1);
        assert!(snapshot.last_cycle.is_some());
    }

    #[tokio::test]
    async fn test_run_serves_admin_and_stops_on_cancel() {
        let fabric = Arc::new(MockFabric::new());
        fabric.set_isolated(&["0xp1"]);
        let (tx, rx) = mpsc::channel(4);
        let mut mgr = manager(&fabric, &config(10)).with_admin(rx);
        let snapshots = mgr.subscribe();
        let cancel = CancellationToken::new();

        let loop_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            mgr.run(loop_cancel).await;
            mgr
        });

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(AdminCommand::MarkTreated {
            ports: HashMap::from([("p1".to_string(), PortStateKind::Treated)]),
            reply: reply_tx,
        })
        .await
        .unwrap();
        assert_eq!(reply_rx.await.unwrap(), vec!["p1".to_string()]);
        assert_eq!(
            snapshots.borrow().ports["p1"].state,
            PortStateKind::Treated
        );

        cancel.cancel();
        let mgr = handle.await.unwrap();
        assert_eq!(mgr.stats().cycles, 1);
        assert_eq!(fabric.calls().ports_metadata, 1);
    }
}
