//! In-memory fabric manager
//!
//! Behaves like UFM for the calls the daemon makes: a successful isolate adds
//! the port (with the `0x` prefix UFM reports) to the isolated list, and a
//! successful deisolate removes it. Every call is recorded.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use pdr_ufm_client::{
    ActionResponse, FabricManager, IsolatedPorts, PortMetadata, Result, TelemetrySnapshot,
    UfmError, STATUS_OK,
};

use crate::fixtures::{snapshot, PortSample};

/// Number of calls per operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub telemetry: usize,
    pub isolated_ports: usize,
    pub isolate: usize,
    pub deisolate: usize,
    pub ports_metadata: usize,
    pub port_metadata: usize,
    pub events: usize,
}

#[derive(Debug)]
struct MockState {
    telemetry: TelemetrySnapshot,
    fail_telemetry: bool,
    isolated: BTreeSet<String>,
    fail_isolated_ports: bool,
    isolate_status: u16,
    deisolate_status: u16,
    speeds: HashMap<String, String>,
    fail_metadata: bool,
    isolate_log: Vec<String>,
    deisolate_log: Vec<String>,
    events: Vec<String>,
    calls: CallCounts,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            telemetry: TelemetrySnapshot::default(),
            fail_telemetry: false,
            isolated: BTreeSet::new(),
            fail_isolated_ports: false,
            isolate_status: STATUS_OK,
            deisolate_status: STATUS_OK,
            speeds: HashMap::new(),
            fail_metadata: false,
            isolate_log: Vec::new(),
            deisolate_log: Vec::new(),
            events: Vec::new(),
            calls: CallCounts::default(),
        }
    }
}

/// Recording fabric manager for tests
#[derive(Debug, Default)]
pub struct MockFabric {
    state: Mutex<MockState>,
}

impl MockFabric {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ===== Setup =====

    pub fn set_telemetry(&self, telemetry: TelemetrySnapshot) {
        self.lock().telemetry = telemetry;
    }

    /// Replace the telemetry with the given samples
    pub fn set_samples<I>(&self, samples: I)
    where
        I: IntoIterator<Item = PortSample>,
    {
        self.set_telemetry(snapshot(samples));
    }

    pub fn fail_telemetry(&self, fail: bool) {
        self.lock().fail_telemetry = fail;
    }

    /// Replace the remote isolated list; names are stored as given
    pub fn set_isolated(&self, ports: &[&str]) {
        self.lock().isolated = ports.iter().map(|p| p.to_string()).collect();
    }

    pub fn fail_isolated_ports(&self, fail: bool) {
        self.lock().fail_isolated_ports = fail;
    }

    pub fn set_isolate_status(&self, status: u16) {
        self.lock().isolate_status = status;
    }

    pub fn set_deisolate_status(&self, status: u16) {
        self.lock().deisolate_status = status;
    }

    pub fn set_speed(&self, port: &str, speed: &str) {
        self.lock().speeds.insert(port.to_string(), speed.to_string());
    }

    pub fn fail_metadata(&self, fail: bool) {
        self.lock().fail_metadata = fail;
    }

    // ===== Inspection =====

    pub fn calls(&self) -> CallCounts {
        self.lock().calls.clone()
    }

    /// Ports passed to `isolate_port`, in call order
    pub fn isolate_calls(&self) -> Vec<String> {
        self.lock().isolate_log.clone()
    }

    /// Ports passed to `deisolate_port`, in call order
    pub fn deisolate_calls(&self) -> Vec<String> {
        self.lock().deisolate_log.clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.lock().events.clone()
    }

    /// Remote isolated list as UFM would report it
    pub fn remote_isolated(&self) -> Vec<String> {
        self.lock().isolated.iter().cloned().collect()
    }
}

fn unavailable(what: &str) -> UfmError {
    UfmError::Empty(format!("mock://{}", what))
}

#[async_trait]
impl FabricManager for MockFabric {
    async fn get_telemetry(&self) -> Result<TelemetrySnapshot> {
        let mut state = self.lock();
        state.calls.telemetry += 1;
        if state.fail_telemetry {
            return Err(unavailable("telemetry"));
        }
        Ok(state.telemetry.clone())
    }

    async fn get_isolated_ports(&self) -> Result<IsolatedPorts> {
        let mut state = self.lock();
        state.calls.isolated_ports += 1;
        if state.fail_isolated_ports {
            return Err(unavailable("isolated_ports"));
        }
        Ok(IsolatedPorts {
            ports: state.isolated.iter().cloned().collect(),
        })
    }

    async fn isolate_port(&self, port: &str) -> Result<ActionResponse> {
        let mut state = self.lock();
        state.calls.isolate += 1;
        state.isolate_log.push(port.to_string());

        let response = ActionResponse::new(state.isolate_status);
        if response.is_success() {
            state.isolated.insert(format!("0x{}", port));
        }
        Ok(response)
    }

    async fn deisolate_port(&self, port: &str) -> Result<ActionResponse> {
        let mut state = self.lock();
        state.calls.deisolate += 1;
        state.deisolate_log.push(port.to_string());

        let response = ActionResponse::new(state.deisolate_status);
        if response.is_success() {
            state.isolated.remove(port);
            state.isolated.remove(&format!("0x{}", port));
        }
        Ok(response)
    }

    async fn get_ports_metadata(&self) -> Result<Vec<PortMetadata>> {
        let mut state = self.lock();
        state.calls.ports_metadata += 1;
        if state.fail_metadata {
            return Err(unavailable("ports"));
        }
        let mut records: Vec<PortMetadata> = state
            .speeds
            .iter()
            .map(|(name, speed)| PortMetadata {
                name: name.clone(),
                active_speed: Some(speed.clone()),
            })
            .collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    async fn get_port_metadata(&self, port: &str) -> Result<Vec<PortMetadata>> {
        let mut state = self.lock();
        state.calls.port_metadata += 1;
        if state.fail_metadata {
            return Err(unavailable("ports"));
        }
        Ok(state
            .speeds
            .get(port)
            .map(|speed| PortMetadata {
                name: port.to_string(),
                active_speed: Some(speed.clone()),
            })
            .into_iter()
            .collect())
    }

    async fn send_event(&self, message: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.events += 1;
        state.events.push(message.to_string());
        Ok(())
    }
}
