//! Static reference data: BER threshold matrix and FEC mode lookup.
//!
//! Both are loaded once at startup and read-only afterwards.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{IsolationError, Result};

/// One row of the BER threshold matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BerThresholdRow {
    pub active_speed: String,
    pub fec_mode: String,
    pub raw_ber: f64,
    pub eff_ber: f64,
    pub symbol_ber: f64,
}

impl BerThresholdRow {
    /// True if any measured value is above this row's threshold for it.
    pub fn is_exceeded_by(&self, measured: &BerMeasurement) -> bool {
        let above = |value: Option<f64>, threshold: f64| value.is_some_and(|v| v > threshold);

        above(measured.raw, self.raw_ber)
            || above(measured.effective, self.eff_ber)
            || above(measured.symbol, self.symbol_ber)
    }
}

/// BER values reported for one port in one sample.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BerMeasurement {
    pub raw: Option<f64>,
    pub effective: Option<f64>,
    pub symbol: Option<f64>,
}

impl BerMeasurement {
    /// True when no BER value was reported. UFM reports 0 for ports without
    /// BER data, so zeros count as absent.
    pub fn is_empty(&self) -> bool {
        [self.raw, self.effective, self.symbol]
            .into_iter()
            .all(|value| value.unwrap_or(0.0) == 0.0)
    }
}

/// BER thresholds keyed by (active speed, FEC mode).
///
/// Rows are unordered; a single matching row that is exceeded is enough.
///
/// File format (TOML):
/// ```toml
/// [[row]]
/// active_speed = "HDR"
/// fec_mode = "RS-FEC"
/// raw_ber = 1e-5
/// eff_ber = 1e-8
/// symbol_ber = 1e-12
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BerThresholdTable {
    #[serde(default, rename = "row")]
    rows: Vec<BerThresholdRow>,
}

impl BerThresholdTable {
    pub fn new(rows: Vec<BerThresholdRow>) -> Self {
        Self { rows }
    }

    pub fn from_toml_str(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Loads the matrix from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| IsolationError::reference(path.display().to_string(), e.to_string()))?;
        let table = Self::from_toml_str(&content)
            .map_err(|e| IsolationError::reference(path.display().to_string(), e.to_string()))?;

        info!(rows = table.len(), path = %path.display(), "Loaded BER threshold matrix");
        Ok(table)
    }

    pub fn rows(&self) -> &[BerThresholdRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// True if some row for `(speed, fec_mode)` is exceeded by `measured`.
    pub fn exceeds(&self, speed: &str, fec_mode: &str, measured: &BerMeasurement) -> bool {
        self.rows.iter().any(|row| {
            row.active_speed == speed && row.fec_mode == fec_mode && row.is_exceeded_by(measured)
        })
    }
}

/// Maps a numeric FEC mode code to its symbolic name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FecLookup {
    modes: HashMap<i64, String>,
}

impl FecLookup {
    pub fn new(modes: HashMap<i64, String>) -> Self {
        Self { modes }
    }

    /// Parses a JSON object of `"code": "mode"` pairs.
    pub fn from_json_str(content: &str) -> std::result::Result<Self, String> {
        let raw: HashMap<String, String> =
            serde_json::from_str(content).map_err(|e| e.to_string())?;

        let mut modes = HashMap::with_capacity(raw.len());
        for (code, mode) in raw {
            let code: i64 = code
                .trim()
                .parse()
                .map_err(|_| format!("key '{}' is not an integer FEC code", code))?;
            modes.insert(code, mode);
        }

        Ok(Self { modes })
    }

    /// Loads the lookup from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| IsolationError::reference(path.display().to_string(), e.to_string()))?;
        let lookup = Self::from_json_str(&content)
            .map_err(|e| IsolationError::reference(path.display().to_string(), e))?;

        info!(modes = lookup.len(), path = %path.display(), "Loaded FEC mode lookup");
        Ok(lookup)
    }

    pub fn len(&self) -> usize {
        self.modes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }

    /// Resolves a code; an absent or unknown code resolves to `None`.
    pub fn resolve(&self, code: Option<i64>) -> Option<&str> {
        code.and_then(|code| self.modes.get(&code)).map(String::as_str)
    }

    /// Resolves a code as reported in telemetry (a JSON number).
    pub fn resolve_counter(&self, value: Option<f64>) -> Option<&str> {
        let code = value.filter(|v| v.fract() == 0.0).map(|v| v as i64);
        self.resolve(code)
    }
}

/// Reference datasets handed to the detector.
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    pub ber_table: BerThresholdTable,
    pub fec_lookup: FecLookup,
}

impl ReferenceData {
    pub fn load(ber_matrix: impl AsRef<Path>, fec_lookup: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            ber_table: BerThresholdTable::load(ber_matrix)?,
            fec_lookup: FecLookup::load(fec_lookup)?,
        })
    }
}
