//! Round summaries built on the thermal-cycle session catalog
//!
//! - Results table: one row per test section, one cell per test kind
//! - Failure summary: failure counts per scan category and temperature
//! - Environmental summary: the summary block of the thermal-cycle run

use crate::temperature::{section_validity, TemperatureResolver};
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tcqc_core::fields::{flex_string, string_list};
use tcqc_core::{Error, PatternTable, Result, Section, Temperature, TestRun, TestTypeCode};
use tracing::warn;

/// Union of the failed tests of every run except HV-stability runs, first-seen order
pub fn collect_failed_tests<'a, I>(runs: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a TestRun>,
{
    let mut failed: Vec<String> = Vec::new();
    for run in runs {
        if run.test_type == TestTypeCode::HvStability {
            continue;
        }
        for test in run.failed_tests() {
            if !failed.contains(test) {
                failed.push(test.clone());
            }
        }
    }
    failed
}

// ============================================================================
// Scan categories
// ============================================================================

/// Test category of a scan name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ScanCategory {
    /// Module IV
    #[serde(rename = "IV")]
    Iv,
    /// Pedestal trim
    #[serde(rename = "PT")]
    PedestalTrim,
    /// Strobe delay
    #[serde(rename = "SD")]
    StrobeDelay,
    /// Response curve, 3-point and 10-point together
    #[serde(rename = "RC")]
    ResponseCurve,
    /// Noise occupancy
    #[serde(rename = "NO")]
    NoiseOccupancy,
    /// Open channel search
    #[serde(rename = "OCS")]
    OpenChannelSearch,
    /// HV stability
    #[serde(rename = "HVS")]
    HvStability,
}

static SCAN_CATEGORIES: Lazy<PatternTable<ScanCategory>> = Lazy::new(|| {
    PatternTable::new()
        .rule("MODULE_IV_AMAC", ScanCategory::Iv)
        .rule("PEDESTAL_TRIM", ScanCategory::PedestalTrim)
        .rule("STROBE_DELAY", ScanCategory::StrobeDelay)
        .rule("RESPONSE_CURVE", ScanCategory::ResponseCurve)
        .rule("_NO", ScanCategory::NoiseOccupancy)
        .rule("OPEN_CHANNEL_SEARCH", ScanCategory::OpenChannelSearch)
        .rule("HVSTABILITY", ScanCategory::HvStability)
});

impl ScanCategory {
    /// Category of a scan name, `None` when no rule matches
    pub fn of(scan: &str) -> Option<ScanCategory> {
        SCAN_CATEGORIES.classify(scan).copied()
    }
}

fn valid_sections(resolver: &TemperatureResolver) -> impl Iterator<Item = &Section> {
    resolver.catalog().iter().filter(|section| match section_validity(&section.name) {
        Some(valid) => valid,
        None => {
            warn!(target: "tcqc::temperature", section = %section.name, "Unrecognized test section, discarding");
            false
        }
    })
}

// ============================================================================
// Results table
// ============================================================================

/// Column headers of the results table
pub const RESULTS_COLUMNS: [&str; 8] = [
    "IV",
    "Pedestal Trim",
    "Strobe Delay",
    "3-Point Gain",
    "10-Point Gain",
    "NO",
    "OCS",
    "HV Stability",
];

/// One cell of the results table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultCell {
    /// Scan name
    pub test: String,
    /// Test number shown in the cell
    pub label: String,
    /// Whether the scan is in the failed-test list
    pub failed: bool,
}

/// One section of the results table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultsRow {
    /// Section name
    pub section: String,
    /// Section temperature
    pub temperature: Temperature,
    /// Cells in [`RESULTS_COLUMNS`] order
    pub cells: [Option<ResultCell>; 8],
}

fn column(scan: &str, seen_response_curve: &mut bool) -> Option<usize> {
    if scan.contains("IV") {
        return Some(0);
    }
    let col = match ScanCategory::of(scan)? {
        ScanCategory::Iv => 0,
        ScanCategory::PedestalTrim => 1,
        ScanCategory::StrobeDelay => 2,
        ScanCategory::ResponseCurve if !*seen_response_curve => {
            *seen_response_curve = true;
            3
        }
        ScanCategory::ResponseCurve => 4,
        ScanCategory::NoiseOccupancy => 5,
        ScanCategory::OpenChannelSearch => 6,
        ScanCategory::HvStability => 7,
    };
    Some(col)
}

/// Scan name without upper-case letters and underscores
pub fn cell_label(scan: &str) -> String {
    scan.chars()
        .filter(|c| !c.is_ascii_uppercase() && *c != '_')
        .collect()
}

/// Results table of a round
///
/// Within a section the first response curve is the 3-point gain and any
/// later one the 10-point gain; otherwise the last scan of a kind fills the cell.
/// Sections without a temperature get no row.
pub fn results_table(resolver: &TemperatureResolver, failed: &[String]) -> Vec<ResultsRow> {
    valid_sections(resolver)
        .filter_map(|section| {
            let temperature = match resolver.section_temperature(&section.name) {
                Ok(temperature) => temperature,
                Err(_) => {
                    warn!(target: "tcqc::temperature", section = %section.name, "Testing section could not be labelled warm or cold, no row");
                    return None;
                }
            };
            if section.tests().is_empty() {
                warn!(target: "tcqc::temperature", section = %section.name, "Tests for section not found");
            }
            let mut cells: [Option<ResultCell>; 8] = Default::default();
            let mut seen_response_curve = false;
            for scan in section.tests() {
                if let Some(col) = column(scan, &mut seen_response_curve) {
                    cells[col] = Some(ResultCell {
                        test: scan.clone(),
                        label: cell_label(scan),
                        failed: failed.contains(scan),
                    });
                }
            }
            Some(ResultsRow {
                section: section.name.clone(),
                temperature,
                cells,
            })
        })
        .collect()
}

// ============================================================================
// Failure summary
// ============================================================================

/// Failure counts of one category at one temperature
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FailureStats {
    /// Scans run
    pub total: usize,
    /// Scans in the failed-test list
    pub failed: usize,
}

impl FailureStats {
    /// Failed fraction, `None` when no scans ran
    pub fn rate(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(self.failed as f64 / self.total as f64)
        }
    }
}

/// Failure rates of a round
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FailureSummary {
    /// Warm counts per category
    pub warm: BTreeMap<ScanCategory, FailureStats>,
    /// Cold counts per category
    pub cold: BTreeMap<ScanCategory, FailureStats>,
    /// Scans whose category could not be identified
    pub unclassified: Vec<String>,
    /// Every failed test of the round
    pub failed_tests: Vec<String>,
}

impl FailureSummary {
    /// Counts of one category at one temperature
    pub fn stats(&self, category: ScanCategory, temperature: Temperature) -> FailureStats {
        let side = match temperature {
            Temperature::Warm => &self.warm,
            Temperature::Cold => &self.cold,
        };
        side.get(&category).copied().unwrap_or_default()
    }

    /// Whether every test passed
    pub fn all_passed(&self) -> bool {
        self.failed_tests.is_empty()
    }
}

/// Count scans and failures per category over the valid sections
pub fn failure_summary(resolver: &TemperatureResolver, failed: &[String]) -> FailureSummary {
    let mut summary = FailureSummary {
        failed_tests: failed.to_vec(),
        ..Default::default()
    };

    for section in valid_sections(resolver) {
        let side = match resolver.section_temperature(&section.name) {
            Ok(Temperature::Warm) => &mut summary.warm,
            Ok(Temperature::Cold) => &mut summary.cold,
            Err(_) => {
                warn!(target: "tcqc::temperature", section = %section.name, "Testing section could not be labelled warm or cold");
                continue;
            }
        };
        for scan in section.tests() {
            match ScanCategory::of(scan) {
                Some(category) => {
                    let stats = side.entry(category).or_default();
                    stats.total += 1;
                    if failed.contains(scan) {
                        stats.failed += 1;
                    }
                }
                None => {
                    warn!(target: "tcqc::temperature", scan = %scan, "Could not identify test type");
                    summary.unclassified.push(scan.clone());
                }
            }
        }
    }
    summary
}

// ============================================================================
// Environmental summary
// ============================================================================

/// Environmental conditions and counts of a thermal-cycling round
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvironmentalSummary {
    /// Maximum chuck temperature (°C)
    pub max_temperature: f64,
    /// Minimum chuck temperature (°C)
    pub min_temperature: f64,
    /// Maximum humidity (%)
    pub max_humidity: f64,
    /// Minimum humidity (%)
    pub min_humidity: f64,
    /// Cold tests run
    pub cold_tests: u64,
    /// Cold tests run shunted
    pub cold_shunted_tests: u64,
    /// Warm tests run
    pub warm_tests: u64,
    /// Duration of the cycling
    pub duration_hours: f64,
    /// Cold-jig run numbers
    pub coldjig_run_numbers: Vec<String>,
    /// DAQ run numbers
    pub itsdaq_run_numbers: Vec<String>,
}

fn float(block: &Value, key: &str) -> Result<f64> {
    block
        .get(key)
        .ok_or_else(|| Error::missing(format!("results.summary.{}", key), "thermal-cycle run"))?
        .as_f64()
        .ok_or_else(|| Error::invalid(format!("results.summary.{}", key), "not a number"))
}

fn count(block: &Value, key: &str) -> Result<u64> {
    let value = float(block, key)?;
    if value < 0.0 || value.fract() != 0.0 {
        return Err(Error::invalid(
            format!("results.summary.{}", key),
            "not a count",
        ));
    }
    Ok(value as u64)
}

fn run_numbers(block: &Value, key: &str) -> Vec<String> {
    match block.get(key) {
        Some(list @ Value::Array(_)) => string_list(list),
        Some(single) => flex_string(single).into_iter().collect(),
        None => Vec::new(),
    }
}

/// Read the `summary` results block of a thermal-cycle run
pub fn environmental_summary(run: &TestRun) -> Result<EnvironmentalSummary> {
    let block = run
        .series("summary")
        .ok_or_else(|| Error::missing("results.summary", format!("run {}", run.id)))?;
    Ok(EnvironmentalSummary {
        max_temperature: float(block, "max_temperature")?,
        min_temperature: float(block, "min_temperature")?,
        max_humidity: float(block, "max_humidity")?,
        min_humidity: float(block, "min_humidity")?,
        cold_tests: count(block, "cold_tests")?,
        cold_shunted_tests: count(block, "cold_shunted_tests")?,
        warm_tests: count(block, "warm_tests")?,
        duration_hours: float(block, "duration_hours")?,
        coldjig_run_numbers: run_numbers(block, "coldjig_runNumbers"),
        itsdaq_run_numbers: run_numbers(block, "itsdaq_runNumbers"),
    })
}
