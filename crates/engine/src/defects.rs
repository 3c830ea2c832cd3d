//! Defect cross-referencing
//!
//! Defects name the bare run number of the scan they were found in, while
//! scan names carry a fixed, test-type specific suffix after it. A defect
//! applies to a scan when its stream matches and its run number equals the
//! scan name with that suffix removed.
//!
//! Partitioning a scan's per-channel (or per-chip) array marks every index
//! covered by an applicable defect as bad; everything else is good. Indices a
//! defect names that the array does not have are reported as out of range. A
//! span running past the end of the array is reported once, at its first
//! missing index.

use crate::temperature::{section_validity, TemperatureResolver};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeInclusive;
use tcqc_core::fields::char_prefix;
use tcqc_core::{Defect, Error, Granularity, Result, Stream, Temperature, TestKind};
use tracing::{debug, warn};

/// Scan name with the kind's suffix removed
///
/// `None` when the kind names no suffix or the scan is too short to carry one.
pub fn bare_run_number(scan: &str, kind: TestKind) -> Option<&str> {
    let suffix = kind.scan_suffix_len()?;
    let len = scan.chars().count();
    if len < suffix {
        return None;
    }
    Some(char_prefix(scan, len - suffix))
}

/// Good/bad split of one scan's array
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanPartition {
    /// Unaffected indices, ascending
    pub good_indices: Vec<u32>,
    /// Values at `good_indices`
    pub good_values: Vec<f64>,
    /// Affected indices, in the order the defects mark them
    pub bad_indices: Vec<u32>,
    /// Values at `bad_indices`
    pub bad_values: Vec<f64>,
    /// Applicable defects whose addressing could not be decoded
    pub skipped_defects: usize,
    /// Indices named by applicable defects that the array does not have
    ///
    /// Placeholder slots are listed individually; a span reaching past the
    /// end of the array contributes only its first index past the end.
    pub out_of_range: Vec<u32>,
}

impl ScanPartition {
    /// Number of partitioned indices
    pub fn total(&self) -> usize {
        self.good_indices.len() + self.bad_indices.len()
    }

    /// Whether any index was marked bad
    pub fn has_defects(&self) -> bool {
        !self.bad_indices.is_empty()
    }
}

fn marked_indices(defect: &Defect, granularity: Granularity) -> RangeInclusive<u32> {
    match granularity {
        Granularity::Channel => defect.span.channels(),
        Granularity::Chip => defect.affected_chips(),
    }
}

/// Defects whose addressing marks no index of the kind's arrays
pub fn undecodable_defects(defects: &[Defect], kind: TestKind) -> usize {
    match kind.granularity() {
        Some(granularity) => defects
            .iter()
            .filter(|d| marked_indices(d, granularity).is_empty())
            .count(),
        None => 0,
    }
}

/// Split one scan's array into defect-affected and unaffected indices
///
/// `values` is the flat array of the scan in the given stream. Placeholder
/// slots of the kind are not indices of the array and are never partitioned.
pub fn partition_scan(
    defects: &[Defect],
    kind: TestKind,
    stream: Stream,
    scan: &str,
    values: &[f64],
) -> Result<ScanPartition> {
    let granularity = kind
        .granularity()
        .ok_or_else(|| Error::invalid("kind", format!("{} has no defect-partitioned data", kind)))?;
    let placeholder = kind.placeholder();
    let is_index = |i: u32| {
        values
            .get(i as usize)
            .map(|v| Some(*v) != placeholder)
            .unwrap_or(false)
    };

    let mut partition = ScanPartition::default();
    let mut bad = BTreeSet::new();

    if let Some(bare) = bare_run_number(scan, kind) {
        for defect in defects.iter().filter(|d| d.matches(stream, bare)) {
            let marked = marked_indices(defect, granularity);
            if marked.is_empty() {
                partition.skipped_defects += 1;
                warn!(
                    target: "tcqc::defects",
                    defect = %defect.name,
                    scan = %scan,
                    "Defect addressing could not be decoded, skipping"
                );
                continue;
            }
            for index in marked {
                if index as usize >= values.len() {
                    // spans ascend, the rest lies past the end too
                    partition.out_of_range.push(index);
                    break;
                }
                if !is_index(index) {
                    partition.out_of_range.push(index);
                } else if bad.insert(index) {
                    partition.bad_indices.push(index);
                    partition.bad_values.push(values[index as usize]);
                }
            }
        }
    }

    for (i, value) in values.iter().enumerate() {
        let i = i as u32;
        if is_index(i) && !bad.contains(&i) {
            partition.good_indices.push(i);
            partition.good_values.push(*value);
        }
    }

    if !partition.out_of_range.is_empty() {
        warn!(
            target: "tcqc::defects",
            scan = %scan,
            stream = %stream,
            indices = ?partition.out_of_range,
            "Defect indices outside the scan's array"
        );
    }
    debug!(
        target: "tcqc::defects",
        scan = %scan,
        stream = %stream,
        good = partition.good_indices.len(),
        bad = partition.bad_indices.len(),
        "Partitioned scan"
    );
    Ok(partition)
}

/// Defects per chip in one stream
///
/// Each defect counts once, at its chip index or else at the chip of its
/// first channel. Chips at or beyond `chip_count` are ignored.
pub fn defect_chip_counts(defects: &[Defect], stream: Stream, chip_count: usize) -> Vec<usize> {
    let mut counts = vec![0; chip_count];
    for defect in defects.iter().filter(|d| d.in_stream(stream)) {
        if let Some(chip) = defect.affected_chips().next() {
            if let Some(slot) = counts.get_mut(chip as usize) {
                *slot += 1;
            }
        }
    }
    counts
}

/// Defects per name in one stream, in first-seen order
pub fn defect_name_counts(defects: &[Defect], stream: Stream) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for defect in defects.iter().filter(|d| d.in_stream(stream)) {
        match counts.iter_mut().find(|(name, _)| *name == defect.name) {
            Some((_, n)) => *n += 1,
            None => counts.push((defect.name.clone(), 1)),
        }
    }
    counts
}

/// Defect counts of one test section
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionDefects {
    /// Section name
    pub section: String,
    /// Scans of the section other than IV scans
    pub tests: Vec<String>,
    /// Defects per test kind found in the section's scans
    pub counts: BTreeMap<TestKind, usize>,
}

/// Per-section defect counts split by section temperature
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DefectProgression {
    /// Warm sections, catalog order
    pub warm: Vec<SectionDefects>,
    /// Cold sections, catalog order
    pub cold: Vec<SectionDefects>,
}

/// Scan name reduced to its digits and dashes (`"231-5_PEDESTAL_TRIM_HCC"` → `"231-5"`)
pub fn test_number(scan: &str) -> String {
    scan.chars()
        .filter(|c| c.is_ascii_digit() || *c == '-')
        .collect()
}

/// Count defects of each kind across the test sections of a round
///
/// Only valid sections are counted, and IV, HV and open-channel sections are
/// left out. Defects are matched by run number against the test number of
/// every scan the section lists.
pub fn defects_by_section(
    resolver: &TemperatureResolver,
    defects_by_kind: &[(TestKind, &[Defect])],
) -> DefectProgression {
    let mut progression = DefectProgression::default();

    for section in resolver.catalog().iter() {
        let name = section.name.as_str();
        if section_validity(name) != Some(true)
            || ["IV", "HV", "OPEN"].iter().any(|p| name.contains(p))
        {
            continue;
        }
        if section.tests().is_empty() {
            warn!(target: "tcqc::defects", section = %name, "Tests for section could not be found");
        }

        let mut counts = BTreeMap::new();
        for (kind, defects) in defects_by_kind {
            let found = section
                .tests()
                .iter()
                .map(|scan| {
                    let number = test_number(scan);
                    defects.iter().filter(|d| d.run_number == number).count()
                })
                .sum::<usize>();
            *counts.entry(*kind).or_insert(0) += found;
        }

        let entry = SectionDefects {
            section: name.to_string(),
            tests: section
                .tests()
                .iter()
                .filter(|t| !t.contains("IV"))
                .cloned()
                .collect(),
            counts,
        };
        match resolver.section_temperature(name) {
            Ok(Temperature::Warm) => progression.warm.push(entry),
            Ok(Temperature::Cold) => progression.cold.push(entry),
            Err(_) => {}
        }
    }
    progression
}
