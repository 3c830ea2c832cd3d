//! End-to-end analysis of one thermal-cycling round
//!
//! [`analyze_batch`] takes the normalized runs of a round and produces:
//! - runs bucketed by kind and grouped per device (logical hybrid)
//! - every scan tagged warm or cold against the round's session catalog
//! - every electrical scan's arrays partitioned by the run's defects
//! - round summaries and a diagnostics block
//!
//! Failures stay local. Without a resolved thermal-cycle summary run the runs
//! are still bucketed and partitioned, but carry no temperatures and the
//! catalog-based summaries are absent.
//!
//! [`fetch_round`] assembles such a batch from a [`DeviceSource`].

use crate::classifier::{
    classify_runs, collect_round, expected_run_count, resolve_summary_run, select_round,
    Classification,
};
use crate::config::QcConfig;
use crate::defects::{
    defect_chip_counts, defect_name_counts, defects_by_section, partition_scan,
    undecodable_defects, DefectProgression, ScanPartition,
};
use crate::hierarchy::{find_module, resolve_hybrids, DeviceSource};
use crate::operator::Operator;
use crate::series::{chips, scan_values, series_code};
use crate::summary::{
    collect_failed_tests, environmental_summary, failure_summary, results_table,
    EnvironmentalSummary, FailureSummary, ResultsRow,
};
use crate::temperature::TemperatureResolver;
use serde::Serialize;
use std::collections::BTreeMap;
use tcqc_core::{
    ingest_batch, Defect, IngestReport, NoiseThreshold, NoiseThresholds, RawSource, Rejection,
    Result, Stream, Temperature, TestKind, TestRun,
};
use tracing::{debug, info, warn};

/// Kinds whose defects are counted per test section
const PROGRESSION_KINDS: [TestKind; 5] = [
    TestKind::PedestalTrim,
    TestKind::StrobeDelay,
    TestKind::ThreePointGain,
    TestKind::TenPointGain,
    TestKind::NoiseOccupancy,
];

// ============================================================================
// Output model
// ============================================================================

/// A scan of a run with its temperature
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanTag {
    /// Scan name
    pub name: String,
    /// Temperature, absent when unresolved
    pub temperature: Option<Temperature>,
}

/// Defect partition of one scan of one series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPartition {
    /// Scan name
    pub scan: String,
    /// Stream
    pub stream: Stream,
    /// Results code of the series
    pub code: String,
    /// Good/bad split
    pub partition: ScanPartition,
}

/// A classified run with temperature tags and defect partitions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaggedRun {
    /// Bucket the run was classified into
    pub kind: TestKind,
    /// The run
    pub run: TestRun,
    /// Scans in execution order
    pub scans: Vec<ScanTag>,
    /// Partitions of every defect-partitioned series, per stream and scan
    pub partitions: Vec<SeriesPartition>,
}

impl TaggedRun {
    /// Temperature shared by every scan of the run
    pub fn temperature(&self) -> Option<Temperature> {
        let first = self.scans.first()?.temperature?;
        self.scans
            .iter()
            .all(|s| s.temperature == Some(first))
            .then_some(first)
    }

    /// Partitions of one series code
    pub fn partitions_of<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a SeriesPartition> {
        self.partitions.iter().filter(move |p| p.code == code)
    }
}

/// Everything known about one logical hybrid
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceAnalysis {
    /// Logical hybrid identity
    pub device: String,
    /// Physical hybrid serial
    pub physical: String,
    /// Runs per kind, chronological
    pub runs: BTreeMap<TestKind, Vec<TaggedRun>>,
    /// Noise limits per stream, absent for unknown families
    pub noise_thresholds: BTreeMap<Stream, Option<NoiseThreshold>>,
    /// Defects per chip, per stream and kind
    pub chip_counts: BTreeMap<Stream, BTreeMap<TestKind, Vec<usize>>>,
    /// Defects per name, per stream
    pub name_counts: BTreeMap<Stream, Vec<(String, usize)>>,
    /// Defects per test section, when temperatures are known
    pub section_defects: Option<DefectProgression>,
}

impl DeviceAnalysis {
    /// Runs of one kind
    pub fn runs_of(&self, kind: TestKind) -> &[TaggedRun] {
        self.runs.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Runs of one kind whose scans are all at one temperature
    pub fn runs_at(&self, kind: TestKind, temperature: Temperature) -> Vec<&TaggedRun> {
        self.runs_of(kind)
            .iter()
            .filter(|r| r.temperature() == Some(temperature))
            .collect()
    }

    fn defects_of(&self, kind: TestKind) -> Vec<Defect> {
        self.runs_of(kind)
            .iter()
            .flat_map(|r| r.run.defects.iter().cloned())
            .collect()
    }
}

/// Outcome of the summary-run lookup
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SummaryResolution {
    /// A single summary run was identified
    Resolved {
        /// Its id
        id: String,
    },
    /// No summary run could be identified
    Unresolved {
        /// Why
        reason: String,
        /// Summary runs in the batch
        candidates: usize,
    },
}

impl SummaryResolution {
    /// Id of the resolved run
    pub fn id(&self) -> Option<&str> {
        match self {
            SummaryResolution::Resolved { id } => Some(id),
            SummaryResolution::Unresolved { .. } => None,
        }
    }
}

/// A defect index the scan's array does not have
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct OutOfRangeIndex {
    /// Run id
    pub run: String,
    /// Scan name
    pub scan: String,
    /// Stream
    pub stream: Stream,
    /// Index named by the defect
    pub index: u32,
}

/// Conditions reported during the analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    /// Defects whose addressing could not be decoded
    pub skipped_defects: usize,
    /// Defect indices outside their scan's array
    pub out_of_range_indices: Vec<OutOfRangeIndex>,
    /// Sections matching no warm or cold rule
    pub unrecognized_sections: Vec<String>,
    /// Scans without a temperature
    pub unresolved_scans: Vec<String>,
    /// Response curves classified without a sibling
    pub unpaired_response_curves: Vec<String>,
    /// Aggregates that could not be built, with the reason
    pub failed_aggregates: Vec<String>,
}

impl Diagnostics {
    /// Whether nothing was reported
    pub fn is_clean(&self) -> bool {
        *self == Diagnostics::default()
    }
}

/// Analysis of one round
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    /// Thermal-cycle summary run
    pub summary: SummaryResolution,
    /// Hybrid-level runs per logical hybrid
    pub devices: BTreeMap<String, DeviceAnalysis>,
    /// Module-level runs per kind (IV, HV stability, thermal-cycle summary)
    pub module_runs: BTreeMap<TestKind, Vec<TaggedRun>>,
    /// Results table, when temperatures are known
    pub results_table: Option<Vec<ResultsRow>>,
    /// Failure rates, when temperatures are known
    pub failure_summary: Option<FailureSummary>,
    /// Environmental summary of the summary run
    pub environment: Option<EnvironmentalSummary>,
    /// Failed tests of every non-HV-stability run
    pub failed_tests: Vec<String>,
    /// Reported conditions
    pub diagnostics: Diagnostics,
    /// Warm/cold oracle of the round
    #[serde(skip)]
    pub resolver: Option<TemperatureResolver>,
}

impl Analysis {
    /// Analysis of one logical hybrid
    pub fn device(&self, device: &str) -> Option<&DeviceAnalysis> {
        self.devices.get(device)
    }

    /// Temperature of a scan, `None` when unresolved or without a catalog
    pub fn scan_temperature(&self, scan: &str) -> Option<Temperature> {
        self.resolver.as_ref()?.scan_temperature(scan).ok()
    }

    /// Module-level runs of one kind
    pub fn module_runs_of(&self, kind: TestKind) -> &[TaggedRun] {
        self.module_runs.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }
}

// ============================================================================
// Analysis
// ============================================================================

/// Analyze the runs of one round
///
/// Only an invalid configuration fails the call; everything else is reported
/// in the diagnostics.
pub fn analyze_batch(
    runs: Vec<TestRun>,
    config: &QcConfig,
    operator: &mut dyn Operator,
) -> Result<Analysis> {
    let mode = config.temperature_mode()?;
    let thresholds = config.thresholds();
    info!(target: "tcqc::pipeline", runs = runs.len(), ?mode, "Analyzing batch");

    let failed_tests = collect_failed_tests(&runs);
    let classification = classify_runs(runs);
    let mut diagnostics = Diagnostics {
        unpaired_response_curves: classification.unpaired.clone(),
        ..Default::default()
    };

    let (summary, summary_run) = resolve_summary(&classification, operator);
    if let SummaryResolution::Unresolved { reason, .. } = &summary {
        diagnostics.failed_aggregates.push(reason.clone());
    }

    let resolver = summary_run.map(|run| {
        TemperatureResolver::new(run.history(), mode, config.last_cold_window_secs)
    });
    if let Some(resolver) = &resolver {
        diagnostics.unrecognized_sections = resolver
            .unrecognized_sections()
            .into_iter()
            .map(str::to_string)
            .collect();
    }

    let environment = summary_run.and_then(|run| match environmental_summary(run) {
        Ok(env) => Some(env),
        Err(e) => {
            warn!(target: "tcqc::pipeline", run = %run.id, error = %e, "No environmental summary");
            diagnostics.failed_aggregates.push(format!("environmental summary: {}", e));
            None
        }
    });

    let mut devices: BTreeMap<String, DeviceAnalysis> = BTreeMap::new();
    let mut module_runs: BTreeMap<TestKind, Vec<TaggedRun>> = BTreeMap::new();

    for (kind, bucket) in &classification.buckets {
        let mut bucket: Vec<&TestRun> = bucket.iter().collect();
        bucket.sort_by(|a, b| a.chronological_cmp(b).then_with(|| a.id.cmp(&b.id)));

        for run in bucket {
            let tagged = tag_run(*kind, run, resolver.as_ref(), &mut diagnostics);
            if kind.code().is_module_level() {
                module_runs.entry(*kind).or_default().push(tagged);
                continue;
            }
            devices
                .entry(run.component.clone())
                .or_insert_with(|| empty_device(run, &thresholds))
                .runs
                .entry(*kind)
                .or_default()
                .push(tagged);
        }
    }

    for device in devices.values_mut() {
        aggregate_defects(device, resolver.as_ref(), &mut diagnostics);
    }

    let (results, failures) = match &resolver {
        Some(resolver) => (
            Some(results_table(resolver, &failed_tests)),
            Some(failure_summary(resolver, &failed_tests)),
        ),
        None => (None, None),
    };

    info!(
        target: "tcqc::pipeline",
        devices = devices.len(),
        summary = ?summary.id(),
        skipped_defects = diagnostics.skipped_defects,
        unresolved_scans = diagnostics.unresolved_scans.len(),
        "Batch analyzed"
    );

    Ok(Analysis {
        summary,
        devices,
        module_runs,
        results_table: results,
        failure_summary: failures,
        environment,
        failed_tests,
        diagnostics,
        resolver,
    })
}

fn resolve_summary<'a>(
    classification: &'a Classification,
    operator: &mut dyn Operator,
) -> (SummaryResolution, Option<&'a TestRun>) {
    let summaries = classification.runs(TestKind::ThermalCycle);
    let electrical: Vec<&TestRun> = classification
        .buckets
        .iter()
        .filter(|(kind, _)| **kind != TestKind::ThermalCycle)
        .flat_map(|(_, runs)| runs.iter())
        .collect();

    if summaries.is_empty() {
        warn!(target: "tcqc::pipeline", "Batch has no thermal-cycle summary run");
        return (
            SummaryResolution::Unresolved {
                reason: "no thermal-cycle summary run in batch".to_string(),
                candidates: 0,
            },
            None,
        );
    }

    match resolve_summary_run(summaries, &electrical, operator) {
        Ok(run) => (
            SummaryResolution::Resolved {
                id: run.id.clone(),
            },
            Some(run),
        ),
        Err(e) => (
            SummaryResolution::Unresolved {
                reason: e.to_string(),
                candidates: summaries.len(),
            },
            None,
        ),
    }
}

fn empty_device(run: &TestRun, thresholds: &NoiseThresholds) -> DeviceAnalysis {
    DeviceAnalysis {
        device: run.component.clone(),
        physical: run.physical_component.clone(),
        runs: BTreeMap::new(),
        noise_thresholds: Stream::ALL
            .iter()
            .map(|s| (*s, thresholds.lookup(&run.component, *s)))
            .collect(),
        chip_counts: BTreeMap::new(),
        name_counts: BTreeMap::new(),
        section_defects: None,
    }
}

fn tag_run(
    kind: TestKind,
    run: &TestRun,
    resolver: Option<&TemperatureResolver>,
    diagnostics: &mut Diagnostics,
) -> TaggedRun {
    let scans = run
        .scans()
        .iter()
        .map(|scan| {
            let temperature = resolver.and_then(|r| match r.scan_temperature(scan) {
                Ok(t) => Some(t),
                Err(_) => {
                    if !diagnostics.unresolved_scans.contains(scan) {
                        diagnostics.unresolved_scans.push(scan.clone());
                    }
                    None
                }
            });
            ScanTag {
                name: scan.clone(),
                temperature,
            }
        })
        .collect();

    diagnostics.skipped_defects += undecodable_defects(&run.defects, kind);

    let mut partitions = Vec::new();
    for stream in Stream::ALL {
        for base in kind.partition_series() {
            let code = series_code(base, stream);
            if run.series(&code).is_none() {
                continue;
            }
            for (index, scan) in run.scans().iter().enumerate() {
                let partition = scan_values(run, &code, index)
                    .and_then(|values| partition_scan(&run.defects, kind, stream, scan, &values));
                match partition {
                    Ok(partition) => {
                        for missing in &partition.out_of_range {
                            let issue = OutOfRangeIndex {
                                run: run.id.clone(),
                                scan: scan.clone(),
                                stream,
                                index: *missing,
                            };
                            if !diagnostics.out_of_range_indices.contains(&issue) {
                                diagnostics.out_of_range_indices.push(issue);
                            }
                        }
                        partitions.push(SeriesPartition {
                            scan: scan.clone(),
                            stream,
                            code: code.clone(),
                            partition,
                        });
                    }
                    Err(e) => {
                        warn!(target: "tcqc::pipeline", run = %run.id, scan = %scan, code = %code, error = %e, "Could not partition scan");
                        diagnostics
                            .failed_aggregates
                            .push(format!("run {} scan {} {}: {}", run.id, scan, code, e));
                    }
                }
            }
        }
    }

    debug!(target: "tcqc::pipeline", run = %run.id, %kind, partitions = partitions.len(), "Tagged run");
    TaggedRun {
        kind,
        run: run.clone(),
        scans,
        partitions,
    }
}

fn aggregate_defects(
    device: &mut DeviceAnalysis,
    resolver: Option<&TemperatureResolver>,
    diagnostics: &mut Diagnostics,
) {
    let chip_count = device
        .runs_of(TestKind::StrobeDelay)
        .first()
        .map(|sd| chips(&sd.run));
    match chip_count {
        Some(Ok(chip_list)) => {
            for stream in Stream::ALL {
                let per_kind = TestKind::ALL
                    .iter()
                    .filter(|k| k.granularity().is_some())
                    .map(|k| (*k, defect_chip_counts(&device.defects_of(*k), stream, chip_list.len())))
                    .collect();
                device.chip_counts.insert(stream, per_kind);
            }
        }
        Some(Err(e)) => {
            diagnostics
                .failed_aggregates
                .push(format!("chip list of {}: {}", device.device, e));
        }
        None => {
            debug!(target: "tcqc::pipeline", device = %device.device, "No strobe delay run, skipping chip counts");
        }
    }

    let electrical: Vec<Defect> = TestKind::ALL
        .iter()
        .filter(|k| k.granularity().is_some())
        .flat_map(|k| device.defects_of(*k))
        .collect();
    for stream in Stream::ALL {
        device
            .name_counts
            .insert(stream, defect_name_counts(&electrical, stream));
    }

    if let Some(resolver) = resolver {
        let per_kind: Vec<(TestKind, Vec<Defect>)> = PROGRESSION_KINDS
            .iter()
            .map(|k| (*k, device.defects_of(*k)))
            .collect();
        let borrowed: Vec<(TestKind, &[Defect])> = per_kind
            .iter()
            .map(|(k, defects)| (*k, defects.as_slice()))
            .collect();
        device.section_defects = Some(defects_by_section(resolver, &borrowed));
    }
}

// ============================================================================
// Fetching
// ============================================================================

/// Fetch the runs of one round of a module
///
/// Walks the module to its hybrids, narrows the listed runs to one round,
/// resolves the round's summary run and fetches every selected run. Runs that
/// cannot be fetched or normalized end up in the report's rejections. An
/// unresolved summary run is left out, so the analysis reports it.
pub fn fetch_round(
    source: &dyn DeviceSource,
    module_serial: &str,
    config: &QcConfig,
    operator: &mut dyn Operator,
) -> Result<IngestReport> {
    let module = find_module(source, module_serial)?;
    let hybrids = resolve_hybrids(source, &module)?;
    let candidates = collect_round(&module, &hybrids);
    let expected = expected_run_count(&module.serial, hybrids.len(), &config.rounds);
    let round = select_round(candidates, expected, operator);

    let mut ids: Vec<String> = round.electrical.iter().map(|r| r.id.clone()).collect();
    match resolve_summary_run(&round.summaries, &round.electrical, operator) {
        Ok(summary) => ids.push(summary.id.clone()),
        Err(e) => {
            warn!(target: "tcqc::pipeline", module = %module.serial, error = %e, "Fetching round without a summary run");
        }
    }

    let mut sources = Vec::with_capacity(ids.len());
    let mut failed = Vec::new();
    for id in &ids {
        match source.test_runs(std::slice::from_ref(id)) {
            Ok(records) => sources.extend(records.into_iter().map(RawSource::Inline)),
            Err(error) => {
                warn!(target: "tcqc::pipeline", run = %id, error = %error, "Could not fetch run");
                failed.push(Rejection {
                    source: format!("test run {}", id),
                    error,
                });
            }
        }
    }

    let mut report = ingest_batch(sources);
    report.rejected.extend(failed);
    info!(
        target: "tcqc::pipeline",
        module = %module.serial,
        hybrids = hybrids.len(),
        runs = report.runs.len(),
        rejected = report.rejected.len(),
        "Fetched round"
    );
    Ok(report)
}
