//! Configuration file support for isolationd
//!
//! Loads and validates isolationd configuration from TOML files.
//! Default location: /etc/pdr/isolationd.conf

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{IsolationError, Result};

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/pdr/isolationd.conf";

/// Decision engine thresholds and switches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommonConfig {
    /// Polling interval in seconds; also the rate window
    #[serde(default = "default_t_isolate")]
    pub t_isolate_secs: u64,

    /// Issue count above which no port is isolated in a cycle
    #[serde(default = "default_max_num_isolate")]
    pub max_num_isolate: usize,

    /// Maximum module temperature (Celsius)
    #[serde(default = "default_tmax")]
    pub tmax: f64,

    /// Maximum temperature change between two samples (Celsius)
    #[serde(default = "default_d_tmax")]
    pub d_tmax: f64,

    /// Maximum packet drop ratio
    #[serde(default = "default_max_pdr")]
    pub max_pdr: f64,

    /// Maximum symbol BER tolerated before deisolation
    #[serde(default = "default_max_ber")]
    pub max_ber: f64,

    /// Evaluate BER against the threshold matrix
    #[serde(default = "default_true")]
    pub configured_ber_check: bool,

    /// Decide and track, but never call isolate/deisolate
    #[serde(default)]
    pub dry_run: bool,

    /// Minutes a port must stay unchanged before deisolation is considered
    #[serde(default = "default_deisolate_consider_time")]
    pub deisolate_consider_time_mins: u64,

    /// Deisolate any recovered port, not only OONOC or treated ones
    #[serde(default = "default_true")]
    pub automatic_deisolate: bool,
}

/// UFM connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UfmConfig {
    #[serde(default = "default_ufm_base_url")]
    pub base_url: String,

    /// Telemetry endpoint; may live on a different host than the REST API
    #[serde(default = "default_telemetry_url")]
    pub telemetry_url: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Reference data locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceConfig {
    #[serde(default = "default_ber_matrix_path")]
    pub ber_matrix_path: PathBuf,

    #[serde(default = "default_fec_lookup_path")]
    pub fec_lookup_path: PathBuf,
}

/// Administrative HTTP interface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_admin_listen_addr")]
    pub listen_addr: String,
}

/// Complete isolationd configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IsolationConfig {
    #[serde(default)]
    pub common: CommonConfig,

    #[serde(default)]
    pub ufm: UfmConfig,

    #[serde(default)]
    pub reference: ReferenceConfig,

    #[serde(default)]
    pub admin: AdminConfig,
}

// Default functions
fn default_t_isolate() -> u64 {
    300
}

fn default_max_num_isolate() -> usize {
    10
}

fn default_tmax() -> f64 {
    70.0
}

fn default_d_tmax() -> f64 {
    10.0
}

fn default_max_pdr() -> f64 {
    1e-12
}

fn default_max_ber() -> f64 {
    1e-12
}

fn default_true() -> bool {
    true
}

fn default_deisolate_consider_time() -> u64 {
    5
}

fn default_ufm_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_telemetry_url() -> String {
    "http://127.0.0.1:9002/csv/xcset/low_freq_debug".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_ber_matrix_path() -> PathBuf {
    PathBuf::from("/etc/pdr/ber_matrix.toml")
}

fn default_fec_lookup_path() -> PathBuf {
    PathBuf::from("/etc/pdr/fec_lookup.json")
}

fn default_admin_listen_addr() -> String {
    "127.0.0.1:9090".to_string()
}

// Default implementations
impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            t_isolate_secs: default_t_isolate(),
            max_num_isolate: default_max_num_isolate(),
            tmax: default_tmax(),
            d_tmax: default_d_tmax(),
            max_pdr: default_max_pdr(),
            max_ber: default_max_ber(),
            configured_ber_check: true,
            dry_run: false,
            deisolate_consider_time_mins: default_deisolate_consider_time(),
            automatic_deisolate: true,
        }
    }
}

impl Default for UfmConfig {
    fn default() -> Self {
        Self {
            base_url: default_ufm_base_url(),
            telemetry_url: default_telemetry_url(),
            username: String::new(),
            password: String::new(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            ber_matrix_path: default_ber_matrix_path(),
            fec_lookup_path: default_fec_lookup_path(),
        }
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: default_admin_listen_addr(),
        }
    }
}

impl IsolationConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content).map_err(|e| {
                IsolationError::Configuration(format!(
                    "Failed to parse config file {}: {}",
                    path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(IsolationError::Io(e)),
        }
    }

    pub fn from_toml_str(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Polling interval (and rate window) as Duration
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.common.t_isolate_secs)
    }

    /// Deisolation grace period
    pub fn deisolate_consider_time(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.common.deisolate_consider_time_mins as i64)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.ufm.request_timeout_secs)
    }

    /// Parsed admin listen address
    pub fn admin_addr(&self) -> Result<SocketAddr> {
        self.admin.listen_addr.parse().map_err(|e| {
            IsolationError::Configuration(format!(
                "invalid admin listen_addr '{}': {}",
                self.admin.listen_addr, e
            ))
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.common.t_isolate_secs == 0 {
            return Err(IsolationError::Configuration(
                "t_isolate_secs must be > 0".to_string(),
            ));
        }

        let thresholds = [
            ("tmax", self.common.tmax),
            ("d_tmax", self.common.d_tmax),
            ("max_pdr", self.common.max_pdr),
            ("max_ber", self.common.max_ber),
        ];
        for (name, value) in thresholds {
            if !value.is_finite() || value < 0.0 {
                return Err(IsolationError::Configuration(format!(
                    "{} must be a non-negative number",
                    name
                )));
            }
        }

        if self.ufm.base_url.trim().is_empty() {
            return Err(IsolationError::Configuration(
                "ufm.base_url must not be empty".to_string(),
            ));
        }

        if self.ufm.request_timeout_secs == 0 {
            return Err(IsolationError::Configuration(
                "request_timeout_secs must be > 0".to_string(),
            ));
        }

        if self.admin.enabled {
            self.admin_addr()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = IsolationConfig::default();
        assert_eq!(config.common.t_isolate_secs, 300);
        assert_eq!(config.common.max_num_isolate, 10);
        assert_eq!(config.common.tmax, 70.0);
        assert!(config.common.configured_ber_check);
        assert!(!config.common.dry_run);
        assert!(config.common.automatic_deisolate);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = IsolationConfig::from_toml_str(
            r#"
[common]
t_isolate_secs = 60
dry_run = true

[ufm]
base_url = "https://ufm.example.net"
"#,
        )
        .unwrap();

        assert_eq!(config.interval(), Duration::from_secs(60));
        assert!(config.common.dry_run);
        assert_eq!(config.common.d_tmax, 10.0);
        assert_eq!(config.ufm.base_url, "https://ufm.example.net");
        assert_eq!(config.ufm.request_timeout_secs, 30);
        assert_eq!(config.deisolate_consider_time(), chrono::Duration::minutes(5));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = IsolationConfig::default();
        config.common.t_isolate_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_negative_threshold() {
        let mut config = IsolationConfig::default();
        config.common.max_pdr = -1.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_pdr"));
    }

    #[test]
    fn test_validate_rejects_empty_base_url() {
        let mut config = IsolationConfig::default();
        config.ufm.base_url = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_admin_addr() {
        let mut config = IsolationConfig::default();
        config.admin.listen_addr = "not-an-addr".to_string();
        assert!(config.validate().is_err());

        config.admin.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = IsolationConfig::load_or_default("/nonexistent/isolationd.conf").unwrap();
        assert_eq!(config.common.t_isolate_secs, 300);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[common]\nmax_num_isolate = 3\nautomatic_deisolate = false").unwrap();

        let config = IsolationConfig::load_or_default(file.path()).unwrap();
        assert_eq!(config.common.max_num_isolate, 3);
        assert!(!config.common.automatic_deisolate);
    }

    #[test]
    fn test_load_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[common\nmax_num_isolate = ").unwrap();

        let result = IsolationConfig::load_or_default(file.path());
        assert!(matches!(result, Err(IsolationError::Configuration(_))));
    }
}
