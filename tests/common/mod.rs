//! Shared fixtures for the integration suites.
//!
//! Records are built as uploaded JSON so every test goes through ingestion.
//! Import via `mod common;` from a suite's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use serde_json::{json, Value};
use std::sync::Once;
pub use tcqc::{
    analyze_batch, classify_runs, normalize_record, Analysis, Defect, InMemorySource, QcConfig,
    ScriptedOperator, Stream, Temperature, TestKind, TestRun,
};

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Route log events to the test writer, once per process.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// Devices
// ============================================================================

pub const MODULE: &str = "20USBML0000001";
pub const HYBRIDS: [&str; 2] = ["20USBH00000001", "20USBH00000002"];
pub const INSTITUTION: &str = "UBC";
pub const DATE: &str = "2024-03-12T10:00:00Z";

/// Device record with child slots and listed test runs
pub fn component(serial: &str, children: &[&str], tests: Value) -> Value {
    let slots: Vec<Value> = children
        .iter()
        .map(|c| json!({ "component": { "serialNumber": c } }))
        .collect();
    json!({ "serialNumber": serial, "children": slots, "tests": tests })
}

/// Run header as listed on a component
pub fn header(id: &str, run_number: &str) -> Value {
    json!({
        "id": id,
        "date": DATE,
        "institution": { "code": INSTITUTION },
        "runNumber": run_number,
    })
}

// ============================================================================
// Records
// ============================================================================

/// Cold section lists `cold`, warm section lists `warm`
pub fn history(cold: &[&str], warm: &[&str]) -> Value {
    json!({
        "0_TURN_ON": { "start_time": 0.0, "stop_time": 50.0 },
        "1_COOLDOWN": { "start_time": 60.0, "stop_time": 1000.0 },
        "2_TC_COLD_TEST_0": {
            "start_time": 1010.0, "stop_time": 2000.0,
            "itsdaq_test_info": { "all_tests": cold }
        },
        "3_WARMUP": { "start_time": 2010.0, "stop_time": 3000.0 },
        "4_TC_WARM_TEST_0": {
            "start_time": 3010.0, "stop_time": 4000.0,
            "itsdaq_test_info": { "all_tests": warm }
        }
    })
}

/// Thermal-cycle summary record carrying a session catalog
pub fn summary_record(id: &str, history: Value) -> Value {
    json!({
        "id": id,
        "testType": { "code": "MODULE_TC" },
        "components": [{ "serialNumber": MODULE }],
        "date": DATE,
        "institution": { "code": INSTITUTION },
        "runNumber": "1201",
        "results": {
            "summary": {
                "max_temperature": 35.2, "min_temperature": -35.0,
                "max_humidity": 1.2, "min_humidity": 0.1,
                "cold_tests": 1, "cold_shunted_tests": 0, "warm_tests": 1,
                "duration_hours": 12.5,
                "coldjig_runNumbers": ["1201"],
                "itsdaq_runNumbers": ["10", "12"]
            }
        },
        "properties": [{ "code": "ColdJig_History", "value": history }],
        "defects": []
    })
}

/// Hybrid-level electrical record
pub fn electrical_record(
    id: &str,
    code: &str,
    hybrid: &str,
    date: &str,
    scans: &[&str],
    results: Value,
    defects: Value,
) -> Value {
    json!({
        "id": id,
        "testType": { "code": code },
        "components": [{ "serialNumber": MODULE }, { "serialNumber": hybrid }],
        "date": date,
        "institution": { "code": INSTITUTION },
        "runNumber": id,
        "results": results,
        "properties": [
            { "code": "itsdaq_test_info", "value": { "all_tests": scans, "failed_tests": [] } }
        ],
        "defects": defects
    })
}

/// Pedestal-trim record with one scan and `channels` values per stream
pub fn trim_record(id: &str, hybrid: &str, scan: &str, channels: u32, defects: Value) -> Value {
    let values: Vec<u32> = (0..channels).collect();
    electrical_record(
        id,
        "PEDESTAL_TRIM_TC",
        hybrid,
        DATE,
        &[scan],
        json!({ "trim_away": [values], "trim_under": [values] }),
        defects,
    )
}

/// Response-curve record stamped at `date`
pub fn response_curve_record(id: &str, hybrid: &str, date: &str) -> Value {
    electrical_record(
        id,
        "RESPONSE_CURVE_TC",
        hybrid,
        date,
        &[],
        json!({}),
        json!([]),
    )
}

/// Raw single-channel defect
pub fn channel_defect(name: &str, bank: &str, run_number: &str, channel: u32) -> Value {
    json!({
        "name": name,
        "properties": { "chip_bank": bank, "runNumber": run_number, "channel": channel }
    })
}

/// Raw whole-chip defect
pub fn chip_defect(name: &str, bank: &str, run_number: &str, chip: u32) -> Value {
    json!({
        "name": name,
        "properties": { "chip_bank": bank, "runNumber": run_number, "chip_in_histo": chip }
    })
}

/// Normalize a record built by this module
pub fn run(record: &Value) -> TestRun {
    normalize_record(record).expect("fixture record normalizes")
}
