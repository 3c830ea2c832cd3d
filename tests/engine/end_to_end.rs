//! End-to-End Tests
//!
//! One module with two hybrids, each with a cold and a warm pedestal trim,
//! and three defects between them.

use crate::common::*;
use serde_json::json;
use tcqc::{DeviceAnalysis, SummaryResolution, TaggedRun};

const CHANNELS: u32 = 256;

fn scan(id: &str) -> String {
    format!("{}_PEDESTAL_TRIM_HCC", id)
}

fn round() -> Vec<TestRun> {
    let cold = [scan("10-1"), scan("10-2")];
    let warm = [scan("12-1"), scan("12-2")];
    let history = history(
        &[cold[0].as_str(), cold[1].as_str()],
        &[warm[0].as_str(), warm[1].as_str()],
    );
    vec![
        run(&trim_record(
            "10-1",
            HYBRIDS[0],
            &cold[0],
            CHANNELS,
            json!([channel_defect("DEAD", "away", "10-1", 5)]),
        )),
        run(&trim_record(
            "12-1",
            HYBRIDS[0],
            &warm[0],
            CHANNELS,
            json!([channel_defect("NOISY", "away", "12-1", 200)]),
        )),
        run(&trim_record(
            "10-2",
            HYBRIDS[1],
            &cold[1],
            CHANNELS,
            json!([chip_defect("BAD_CHIP", "under", "10-2", 1)]),
        )),
        run(&trim_record("12-2", HYBRIDS[1], &warm[1], CHANNELS, json!([]))),
        run(&summary_record("tc", history)),
    ]
}

fn only<'a>(device: &'a DeviceAnalysis, temperature: Temperature) -> &'a TaggedRun {
    let runs = device.runs_at(TestKind::PedestalTrim, temperature);
    assert_eq!(runs.len(), 1, "{} {}", device.device, temperature);
    runs[0]
}

fn bad(run: &TaggedRun, code: &str) -> Vec<u32> {
    let partitions: Vec<_> = run.partitions_of(code).collect();
    assert_eq!(partitions.len(), 1);
    assert_eq!(partitions[0].partition.total(), CHANNELS as usize);
    partitions[0].partition.bad_indices.clone()
}

#[test]
fn two_hybrids_each_get_a_warm_cold_pair() {
    init_tracing();
    let analysis = analyze_batch(round(), &QcConfig::default(), &mut ScriptedOperator::silent()).unwrap();

    assert_eq!(analysis.summary, SummaryResolution::Resolved { id: "tc".to_string() });
    assert_eq!(analysis.devices.len(), 2);
    for hybrid in HYBRIDS {
        let device = analysis.device(hybrid).unwrap();
        assert_eq!(device.runs_of(TestKind::PedestalTrim).len(), 2);
        assert_eq!(only(device, Temperature::Cold).temperature(), Some(Temperature::Cold));
        assert_eq!(only(device, Temperature::Warm).temperature(), Some(Temperature::Warm));
    }
}

#[test]
fn exactly_the_covered_channels_are_bad() {
    let analysis = analyze_batch(round(), &QcConfig::default(), &mut ScriptedOperator::silent()).unwrap();
    let first = analysis.device(HYBRIDS[0]).unwrap();
    let second = analysis.device(HYBRIDS[1]).unwrap();

    assert_eq!(bad(only(first, Temperature::Cold), "trim_away"), vec![5]);
    assert!(bad(only(first, Temperature::Cold), "trim_under").is_empty());
    assert_eq!(bad(only(first, Temperature::Warm), "trim_away"), vec![200]);
    assert!(bad(only(first, Temperature::Warm), "trim_under").is_empty());

    assert_eq!(
        bad(only(second, Temperature::Cold), "trim_under"),
        (128..256).collect::<Vec<u32>>()
    );
    assert!(bad(only(second, Temperature::Cold), "trim_away").is_empty());
    assert!(bad(only(second, Temperature::Warm), "trim_under").is_empty());
    assert!(bad(only(second, Temperature::Warm), "trim_away").is_empty());
}

#[test]
fn round_summaries_are_built() {
    let analysis = analyze_batch(round(), &QcConfig::default(), &mut ScriptedOperator::silent()).unwrap();

    let diagnostics = &analysis.diagnostics;
    assert_eq!(diagnostics.unrecognized_sections, vec!["0_TURN_ON".to_string()]);
    assert_eq!(diagnostics.skipped_defects, 0);
    assert!(diagnostics.out_of_range_indices.is_empty());
    assert!(diagnostics.unresolved_scans.is_empty());
    assert!(diagnostics.failed_aggregates.is_empty(), "{:?}", diagnostics.failed_aggregates);

    let environment = analysis.environment.as_ref().unwrap();
    assert_eq!(environment.coldjig_run_numbers, vec!["1201".to_string()]);
    assert_eq!(environment.cold_tests, 1);

    let rows = analysis.results_table.as_ref().unwrap();
    let sections: Vec<&str> = rows.iter().map(|r| r.section.as_str()).collect();
    assert_eq!(sections, vec!["2_TC_COLD_TEST_0", "4_TC_WARM_TEST_0"]);

    let failures = analysis.failure_summary.as_ref().unwrap();
    assert!(failures.all_passed());

    let progression = analysis
        .device(HYBRIDS[1])
        .and_then(|d| d.section_defects.as_ref())
        .unwrap();
    assert_eq!(progression.cold.len(), 1);
    assert_eq!(progression.cold[0].counts.get(&TestKind::PedestalTrim), Some(&1));
}

#[test]
fn analysis_serializes() {
    let analysis = analyze_batch(round(), &QcConfig::default(), &mut ScriptedOperator::silent()).unwrap();
    let value = serde_json::to_value(&analysis).unwrap();
    assert_eq!(value["summary"]["status"], "resolved");
    assert!(value["devices"][HYBRIDS[0]]["runs"].is_object());
}
