//! Hierarchy and Round Fetching Tests
//!
//! Module → hybrids walk and round assembly against an in-memory source.

use crate::common::*;
use serde_json::json;
use tcqc::{fetch_round, find_module, resolve_hybrids, Error};

fn pt_tests(runs: &[(&str, &str)]) -> serde_json::Value {
    let headers: Vec<_> = runs.iter().map(|(id, rn)| header(id, rn)).collect();
    json!([{ "code": "PEDESTAL_TRIM_TC", "testRuns": headers }])
}

/// Module with two hybrids, one cold and one warm trim each, and one summary
fn round_source() -> InMemorySource {
    let mut source = InMemorySource::new();
    source
        .add_component(component(
            MODULE,
            &HYBRIDS,
            json!([{ "code": "MODULE_TC", "testRuns": [header("tc", "1201")] }]),
        ))
        .unwrap();
    for (n, hybrid) in HYBRIDS.iter().enumerate() {
        let cold = format!("10-{}", n + 1);
        let warm = format!("12-{}", n + 1);
        let tests = pt_tests(&[(cold.as_str(), cold.as_str()), (warm.as_str(), warm.as_str())]);
        source.add_component(component(hybrid, &[], tests)).unwrap();
        for id in [cold.as_str(), warm.as_str()] {
            let scan = format!("{}_PEDESTAL_TRIM_HCC", id);
            source.add_run(trim_record(id, hybrid, &scan, 4, json!([]))).unwrap();
        }
    }
    source.add_run(summary_record("tc", history(&[], &[]))).unwrap();
    source
}

#[test]
fn unsplit_module_resolves_both_hybrids() {
    let source = round_source();
    let module = find_module(&source, MODULE).unwrap();
    let hybrids = resolve_hybrids(&source, &module).unwrap();
    let serials: Vec<&str> = hybrids.iter().map(|h| h.serial.as_str()).collect();
    assert_eq!(serials, HYBRIDS.to_vec());
}

#[test]
fn split_module_walks_through_half_modules() {
    let mut source = InMemorySource::new();
    source
        .add_component(component("20USEM40000080", &["20USEHM4000001", "20USEHM4000002"], json!([])))
        .unwrap();
    source
        .add_component(component("20USEHM4000001", &["20USEH40000101", "20USEH40000102"], json!([])))
        .unwrap();
    // second half-module is not in the source
    source.add_component(component("20USEH40000101", &[], json!([]))).unwrap();
    source.add_component(component("20USEH40000102", &[], json!([]))).unwrap();

    let module = find_module(&source, "20USEM40000080").unwrap();
    let hybrids = resolve_hybrids(&source, &module).unwrap();
    assert_eq!(hybrids.len(), 2);
}

#[test]
fn unknown_module_is_not_found() {
    let source = InMemorySource::new();
    assert!(matches!(find_module(&source, MODULE), Err(Error::DeviceNotFound(_))));
}

#[test]
fn fetch_round_collects_every_run() {
    init_tracing();
    let source = round_source();
    let mut operator = ScriptedOperator::silent();

    let report = fetch_round(&source, MODULE, &QcConfig::default(), &mut operator).unwrap();

    assert!(report.is_clean());
    assert_eq!(report.runs.len(), 5);
    assert!(report.runs.iter().any(|r| r.id == "tc"));
    assert!(operator.prompts().is_empty());
}

#[test]
fn missing_run_is_rejected_not_fatal() {
    let mut source = round_source();
    source
        .add_component(component(
            HYBRIDS[0],
            &[],
            pt_tests(&[("10-1", "10-1"), ("12-1", "12-1"), ("lost", "14-1")]),
        ))
        .unwrap();

    let report = fetch_round(&source, MODULE, &QcConfig::default(), &mut ScriptedOperator::silent()).unwrap();

    assert_eq!(report.runs.len(), 5);
    assert_eq!(report.rejected.len(), 1);
    assert!(report.rejected[0].source.contains("lost"));
}

#[test]
fn oversized_round_is_narrowed_by_the_operator() {
    let config = QcConfig {
        rounds: tcqc::RoundsConfig {
            baseline: 1,
            runs_per_hybrid: 1,
            ..Default::default()
        },
        ..Default::default()
    };
    let mut operator = ScriptedOperator::new(["UBC", "10-"]);

    let report = fetch_round(&round_source(), MODULE, &config, &mut operator).unwrap();

    let mut ids: Vec<&str> = report.runs.iter().map(|r| r.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["10-1", "10-2", "tc"]);
    assert_eq!(operator.prompts().len(), 2);
}
