//! Per-scan series extraction
//!
//! Results series of the electrical tests hold one entry per scan, in the
//! order of the run's scan list. An entry is either a flat list of values or a
//! list of per-chip lists; both are read as one flat list.

use crate::temperature::TemperatureResolver;
use serde::Serialize;
use serde_json::Value;
use tcqc_core::{Error, Result, Stream, Temperature, TestKind, TestRun};

/// Results code of a series base name and stream (`trim` → `trim_away`)
pub fn series_code(base: &str, stream: Stream) -> String {
    format!("{}_{}", base, stream.as_str())
}

fn number(code: &str, value: &Value) -> Result<f64> {
    value.as_f64().ok_or_else(|| Error::MalformedSeries {
        code: code.to_string(),
        reason: format!("non-numeric entry {}", value),
    })
}

/// Flatten one level of nesting into numbers
fn flatten(code: &str, entry: &Value) -> Result<Vec<f64>> {
    let items = entry.as_array().ok_or_else(|| Error::MalformedSeries {
        code: code.to_string(),
        reason: "scan entry is not a list".to_string(),
    })?;
    let mut values = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::Array(inner) => {
                for v in inner {
                    values.push(number(code, v)?);
                }
            }
            other => values.push(number(code, other)?),
        }
    }
    Ok(values)
}

fn per_scan<'a>(run: &'a TestRun, code: &str) -> Result<&'a Vec<Value>> {
    run.series(code)
        .ok_or_else(|| Error::MalformedSeries {
            code: code.to_string(),
            reason: format!("missing from run {}", run.id),
        })?
        .as_array()
        .ok_or_else(|| Error::MalformedSeries {
            code: code.to_string(),
            reason: "not a list".to_string(),
        })
}

/// Flat values of one scan of a series
pub fn scan_values(run: &TestRun, code: &str, scan_index: usize) -> Result<Vec<f64>> {
    let entry = per_scan(run, code)?
        .get(scan_index)
        .ok_or_else(|| Error::MalformedSeries {
            code: code.to_string(),
            reason: format!("no entry for scan {}", scan_index),
        })?;
    flatten(code, entry)
}

/// Channel indices of a run, from the first scan of its reference series
pub fn channels(run: &TestRun, kind: TestKind) -> Result<Vec<u32>> {
    let code = kind
        .reference_series()
        .ok_or_else(|| Error::invalid("kind", format!("{} has no per-channel series", kind)))?;
    let count = scan_values(run, code, 0)?.len();
    Ok((0..count as u32).collect())
}

/// Chip indices, from the first strobe-delay scan without placeholder slots
pub fn chips(strobe_delay: &TestRun) -> Result<Vec<u32>> {
    let placeholder = TestKind::StrobeDelay.placeholder();
    let count = scan_values(strobe_delay, "StrobeDelay_away", 0)?
        .into_iter()
        .filter(|v| Some(*v) != placeholder)
        .count();
    Ok((0..count as u32).collect())
}

/// Per-scan arrays of one series, split by scan temperature
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TemperatureSeries {
    /// Results code
    pub code: String,
    /// Warm scans, in scan order
    pub warm: Vec<Vec<f64>>,
    /// Cold scans, in scan order
    pub cold: Vec<Vec<f64>>,
    /// Scans with no temperature
    pub unresolved: Vec<String>,
}

/// Split every scan of a series by temperature
///
/// Placeholder slots of the run's kind are dropped.
pub fn split_by_temperature(
    run: &TestRun,
    kind: TestKind,
    code: &str,
    resolver: &TemperatureResolver,
) -> Result<TemperatureSeries> {
    let entries = per_scan(run, code)?;
    let placeholder = kind.placeholder();
    let mut series = TemperatureSeries {
        code: code.to_string(),
        ..Default::default()
    };

    for (scan, entry) in run.scans().iter().zip(entries) {
        let values: Vec<f64> = flatten(code, entry)?
            .into_iter()
            .filter(|v| Some(*v) != placeholder)
            .collect();
        match resolver.scan_temperature(scan) {
            Ok(Temperature::Warm) => series.warm.push(values),
            Ok(Temperature::Cold) => series.cold.push(values),
            Err(_) => series.unresolved.push(scan.clone()),
        }
    }
    Ok(series)
}

/// Mean and population standard deviation of one channel across scans
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChannelStats {
    /// Mean
    pub mean: f64,
    /// Population standard deviation
    pub std_dev: f64,
}

/// Per-position statistics across scans
///
/// Position `i` uses every scan long enough to have an `i`th value.
pub fn channel_stats(scans: &[Vec<f64>]) -> Vec<ChannelStats> {
    let width = scans.iter().map(Vec::len).max().unwrap_or(0);
    (0..width)
        .map(|i| {
            let column: Vec<f64> = scans.iter().filter_map(|s| s.get(i).copied()).collect();
            let n = column.len() as f64;
            let mean = column.iter().sum::<f64>() / n;
            let variance = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            ChannelStats {
                mean,
                std_dev: variance.sqrt(),
            }
        })
        .collect()
}

/// Breakdown voltages above this are outside the IV range
pub const MAX_BREAKDOWN_VOLTAGE: f64 = 550.0;

/// One IV curve
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IvCurve {
    /// Scan name, when the run lists one
    pub scan: Option<String>,
    /// Bias voltages
    pub voltage: Vec<f64>,
    /// Leakage currents
    pub current: Vec<f64>,
    /// Breakdown voltage, absent when above the IV range or not given
    pub breakdown: Option<f64>,
}

/// IV curves of a module IV run, one per scan
pub fn iv_curves(run: &TestRun) -> Result<Vec<IvCurve>> {
    let voltages = per_scan(run, "VOLTAGE")?;
    let currents = per_scan(run, "CURRENT")?;
    let breakdowns = run
        .series("VBD")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    voltages
        .iter()
        .zip(currents)
        .enumerate()
        .map(|(i, (voltage, current))| {
            Ok(IvCurve {
                scan: run.scans().get(i).cloned(),
                voltage: flatten("VOLTAGE", voltage)?,
                current: flatten("CURRENT", current)?,
                breakdown: breakdowns
                    .get(i)
                    .and_then(Value::as_f64)
                    .filter(|v| *v <= MAX_BREAKDOWN_VOLTAGE),
            })
        })
        .collect()
}

/// Current readings of an HV-stability run
pub fn hv_stability_currents(run: &TestRun) -> Result<Vec<f64>> {
    let raw = run.series("CURRENT").ok_or_else(|| Error::MalformedSeries {
        code: "CURRENT".to_string(),
        reason: format!("missing from run {}", run.id),
    })?;
    flatten("CURRENT", raw)
}
