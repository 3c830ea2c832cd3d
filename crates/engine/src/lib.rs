//! Analysis engine for tcqc
//!
//! This crate turns the normalized runs of a thermal-cycling round into
//! per-device, temperature-tagged, defect-partitioned data:
//! - Hierarchy: module → hybrids walk over a device source
//! - Classifier: run bucketing, response-curve pairing, round selection
//! - Temperature: warm/cold resolution of sections and scans
//! - Defects: good/bad partition of per-scan arrays, defect aggregates
//! - Series / Summary: per-scan series, results table, failure rates
//! - Pipeline: end-to-end batch analysis
//!
//! Decisions the data cannot settle are asked of an [`Operator`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod classifier;
pub mod config;
pub mod defects;
pub mod hierarchy;
pub mod operator;
pub mod pipeline;
pub mod series;
pub mod summary;
pub mod temperature;

pub use classifier::{
    classify_runs, collect_round, expected_run_count, resolve_summary_run, select_round,
    Classification, PairState, ResponseCurvePair, ResponseCurvePairer, RoundCandidates, RunStamp,
};
pub use config::{QcConfig, RoundsConfig, CONFIG_FILE_NAME};
pub use defects::{
    bare_run_number, defect_chip_counts, defect_name_counts, defects_by_section, partition_scan,
    DefectProgression, ScanPartition, SectionDefects,
};
pub use hierarchy::{
    find_module, lookup_module, module_layout, resolve_hybrids, Component, DeviceSource,
    InMemorySource, ModuleLayout, RunHeader,
};
pub use operator::{Operator, ScriptedOperator, StdinOperator};
pub use pipeline::{
    analyze_batch, fetch_round, Analysis, DeviceAnalysis, Diagnostics, SummaryResolution,
    TaggedRun,
};
pub use series::{
    channel_stats, channels, chips, hv_stability_currents, iv_curves, scan_values,
    split_by_temperature, ChannelStats, IvCurve, TemperatureSeries,
};
pub use summary::{
    collect_failed_tests, environmental_summary, failure_summary, results_table,
    EnvironmentalSummary, FailureStats, FailureSummary, ResultsRow, ScanCategory,
};
pub use temperature::{section_validity, ScanSplit, SectionClass, TemperatureMode, TemperatureResolver};
