//! Classification Tests
//!
//! Every run lands in exactly one bucket, and response curves pair by time
//! whatever order the pool lists them in.

use crate::common::*;
use proptest::prelude::*;
use serde_json::json;
use std::collections::BTreeMap;
use tcqc::TestTypeCode;

fn record_of(index: usize, code: TestTypeCode, hybrid: &str, day: u32) -> TestRun {
    run(&electrical_record(
        &format!("run-{}", index),
        code.as_str(),
        hybrid,
        &format!("2024-03-{:02}T10:00:00Z", day),
        &[],
        json!({}),
        json!([]),
    ))
}

fn occurrences(runs: &tcqc::Classification) -> BTreeMap<String, usize> {
    let mut seen = BTreeMap::new();
    for bucket in runs.buckets.values() {
        for run in bucket {
            *seen.entry(run.id.clone()).or_insert(0) += 1;
        }
    }
    seen
}

// ============================================================================
// Completeness
// ============================================================================

#[test]
fn one_run_of_every_code_is_bucketed_once() {
    init_tracing();
    let runs: Vec<TestRun> = TestTypeCode::ALL
        .iter()
        .enumerate()
        .map(|(i, code)| record_of(i, *code, HYBRIDS[0], 12))
        .collect();

    let classification = classify_runs(runs);

    assert_eq!(classification.len(), TestTypeCode::ALL.len());
    assert!(occurrences(&classification).values().all(|n| *n == 1));
    // the lone response curve has no sibling
    assert_eq!(classification.unpaired, vec!["run-3".to_string()]);
    assert_eq!(classification.runs(TestKind::ThreePointGain).len(), 1);
    assert!(classification.runs(TestKind::TenPointGain).is_empty());
}

#[test]
fn module_level_runs_attach_to_the_module() {
    let iv = record_of(0, TestTypeCode::ModuleIv, HYBRIDS[0], 12);
    let trim = record_of(1, TestTypeCode::PedestalTrim, HYBRIDS[0], 12);
    assert_eq!(iv.physical_component, MODULE);
    assert_eq!(trim.physical_component, HYBRIDS[0]);
}

proptest! {
    #[test]
    fn classification_is_complete(
        picks in prop::collection::vec((0usize..8, 0usize..2, 1u32..28), 0..24)
    ) {
        let runs: Vec<TestRun> = picks
            .iter()
            .enumerate()
            .map(|(i, (code, hybrid, day))| record_of(i, TestTypeCode::ALL[*code], HYBRIDS[*hybrid], *day))
            .collect();
        let count = runs.len();

        let classification = classify_runs(runs);
        let seen = occurrences(&classification);

        prop_assert_eq!(classification.len(), count);
        prop_assert_eq!(seen.len(), count);
        prop_assert!(seen.values().all(|n| *n == 1));
    }
}

// ============================================================================
// Response-curve pairing
// ============================================================================

fn response_curves() -> Vec<TestRun> {
    vec![
        run(&response_curve_record("a-early", HYBRIDS[0], "2024-03-12T09:00:00Z")),
        run(&response_curve_record("a-late", HYBRIDS[0], "2024-03-12T11:00:00Z")),
        run(&response_curve_record("b-early", HYBRIDS[1], "2024-03-12T08:30:00Z")),
        run(&response_curve_record("b-late", HYBRIDS[1], "2024-03-13T08:30:00Z")),
    ]
}

fn ids(runs: &[TestRun]) -> Vec<String> {
    let mut ids: Vec<String> = runs.iter().map(|r| r.id.clone()).collect();
    ids.sort();
    ids
}

proptest! {
    #[test]
    fn pairing_ignores_pool_order(order in Just((0..4).collect::<Vec<usize>>()).prop_shuffle()) {
        let pool = response_curves();
        let shuffled: Vec<TestRun> = order.iter().map(|i| pool[*i].clone()).collect();

        let classification = classify_runs(shuffled);

        prop_assert_eq!(
            ids(classification.runs(TestKind::ThreePointGain)),
            vec!["a-early".to_string(), "b-early".to_string()]
        );
        prop_assert_eq!(
            ids(classification.runs(TestKind::TenPointGain)),
            vec!["a-late".to_string(), "b-late".to_string()]
        );
        prop_assert!(classification.unpaired.is_empty());
    }
}

#[test]
fn third_curve_of_a_hybrid_starts_a_new_pair() {
    let mut pool = response_curves();
    pool.push(run(&response_curve_record("a-third", HYBRIDS[0], "2024-03-14T09:00:00Z")));

    let classification = classify_runs(pool);

    assert_eq!(classification.unpaired, vec!["a-third".to_string()]);
    assert_eq!(classification.runs(TestKind::ThreePointGain).len(), 3);
    assert_eq!(classification.runs(TestKind::TenPointGain).len(), 2);
}
