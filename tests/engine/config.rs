//! Configuration Tests
//!
//! Settings loaded from `tcqc.toml` reach the analysis.

use crate::common::*;
use serde_json::json;
use std::fs;
use tcqc::{NoiseThreshold, CONFIG_FILE_NAME};
use tempfile::TempDir;

fn batch() -> Vec<TestRun> {
    vec![
        run(&summary_record("tc", history(&["10-1_PEDESTAL_TRIM_HCC"], &[]))),
        run(&trim_record("10-1", HYBRIDS[0], "10-1_PEDESTAL_TRIM_HCC", 4, json!([]))),
        run(&trim_record("12-1", HYBRIDS[0], "12-1_PEDESTAL_TRIM_HCC", 4, json!([]))),
    ]
}

fn load(content: &str) -> tcqc::Result<QcConfig> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    fs::write(&path, content).unwrap();
    QcConfig::from_file(&path)
}

#[test]
fn written_default_loads_as_default() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    QcConfig::write_default_if_missing(&path).unwrap();
    assert_eq!(QcConfig::from_file(&path).unwrap(), QcConfig::default());
}

#[test]
fn strict_mode_from_file_reports_unlisted_scans() {
    init_tracing();
    let config = load("temperature_mode = \"strict\"\n").unwrap();

    let analysis = analyze_batch(batch(), &config, &mut ScriptedOperator::silent()).unwrap();

    assert_eq!(
        analysis.diagnostics.unresolved_scans,
        vec!["12-1_PEDESTAL_TRIM_HCC".to_string()]
    );
    let device = analysis.device(HYBRIDS[0]).unwrap();
    assert_eq!(device.runs_at(TestKind::PedestalTrim, Temperature::Cold).len(), 1);
    assert!(device.runs_at(TestKind::PedestalTrim, Temperature::Warm).is_empty());
}

#[test]
fn lenient_mode_makes_unlisted_scans_warm() {
    let analysis = analyze_batch(batch(), &QcConfig::default(), &mut ScriptedOperator::silent()).unwrap();

    assert!(analysis.diagnostics.unresolved_scans.is_empty());
    let device = analysis.device(HYBRIDS[0]).unwrap();
    assert_eq!(device.runs_at(TestKind::PedestalTrim, Temperature::Warm).len(), 1);
}

#[test]
fn threshold_override_reaches_devices() {
    let config = load(
        r#"
[[noise_thresholds]]
family = "H0"
stream = "under"
expected = 500
max = 700
"#,
    )
    .unwrap();

    let analysis = analyze_batch(batch(), &config, &mut ScriptedOperator::silent()).unwrap();

    let device = analysis.device(HYBRIDS[0]).unwrap();
    assert_eq!(
        device.noise_thresholds[&Stream::Under],
        Some(NoiseThreshold { expected: 500, max: 700 })
    );
    assert_eq!(device.noise_thresholds[&Stream::Away], None);
}

#[test]
fn bad_window_is_rejected_at_load() {
    assert!(load("last_cold_window_secs = 0.0\n").is_err());
    assert!(load("temperature_mode = \"warmish\"\n").is_err());
}
