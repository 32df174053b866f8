//! UFM REST endpoint paths and JSON field names.

/// Isolated (unhealthy) port list.
pub const ISOLATED_PORTS_PATH: &str = "/ufmRestV2/app/isolated_ports";

/// Port health policy updates (isolate / mark healthy).
pub const UNHEALTHY_PORTS_PATH: &str = "/ufmRestV2/app/unhealthy_ports";

/// Port inventory.
pub const PORTS_PATH: &str = "/ufmRestV2/resources/ports";

/// External event injection.
pub const EXTERNAL_EVENT_PATH: &str = "/ufmRestV2/app/events/external_event";

/// Event id used for plugin-raised warnings.
pub const EXTERNAL_EVENT_ID: u32 = 554;

/// Field names used in UFM JSON documents
pub mod fields {
    pub const PORTS: &str = "Ports";
    pub const POLICY_UNHEALTHY: &str = "UNHEALTHY";
    pub const POLICY_HEALTHY: &str = "HEALTHY";
    pub const ACTION_ISOLATE: &str = "isolate";
}
