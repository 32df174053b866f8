//! Shared setup for isolationd integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use pdr_isolation_test::MockFabric;
use pdr_isolationd::{
    BerThresholdRow, BerThresholdTable, FecLookup, IsolationConfig, IsolationMgr, ReferenceData,
};
use tempfile::NamedTempFile;

/// FEC code reported for RS-FEC links
pub const RS_FEC_CODE: f64 = 2.0;

/// Cycle clock anchor
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub fn at_minute(minutes: i64) -> DateTime<Utc> {
    t0() + Duration::minutes(minutes)
}

/// Thresholds used across scenarios: tmax 80, 10 minute grace period
pub fn test_config() -> IsolationConfig {
    let mut config = IsolationConfig::default();
    config.common.t_isolate_secs = 300;
    config.common.max_num_isolate = 5;
    config.common.tmax = 80.0;
    config.common.d_tmax = 10.0;
    config.common.max_pdr = 1e-12;
    config.common.max_ber = 1e-12;
    config.common.deisolate_consider_time_mins = 10;
    config.common.automatic_deisolate = true;
    config.admin.enabled = false;
    config
}

pub fn ber_rows() -> Vec<BerThresholdRow> {
    vec![
        BerThresholdRow {
            active_speed: "25G".to_string(),
            fec_mode: "RS".to_string(),
            raw_ber: 1e-5,
            eff_ber: 1e-8,
            symbol_ber: 1e-12,
        },
        BerThresholdRow {
            active_speed: "50G".to_string(),
            fec_mode: "RS".to_string(),
            raw_ber: 1e-5,
            eff_ber: 1e-8,
            symbol_ber: 1e-6,
        },
    ]
}

pub fn reference_data(rows: Vec<BerThresholdRow>) -> ReferenceData {
    ReferenceData {
        ber_table: BerThresholdTable::new(rows),
        fec_lookup: FecLookup::new(HashMap::from([
            (0, "NO-FEC".to_string()),
            (2, "RS".to_string()),
        ])),
    }
}

pub fn manager(fabric: &Arc<MockFabric>, config: &IsolationConfig) -> IsolationMgr<MockFabric> {
    IsolationMgr::new(Arc::clone(fabric), config, reference_data(ber_rows()))
}

/// Write `rows` as a BER matrix file
pub fn ber_matrix_file(rows: &[BerThresholdRow]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    for row in rows {
        writeln!(
            file,
            "[[row]]\nactive_speed = \"{}\"\nfec_mode = \"{}\"\n\
             raw_ber = {:e}\neff_ber = {:e}\nsymbol_ber = {:e}\n",
            row.active_speed, row.fec_mode, row.raw_ber, row.eff_ber, row.symbol_ber
        )
        .expect("write BER matrix");
    }
    file
}

/// FEC lookup file mapping code 2 to RS
pub fn fec_lookup_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    write!(file, r#"{{"0": "NO-FEC", "1": "FC", "2": "RS"}}"#).expect("write FEC lookup");
    file
}
