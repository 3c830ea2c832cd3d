//! Ingestion normalization
//!
//! Raw records arrive either inline (already parsed) or as a path to a stored
//! JSON file. [`normalize_record`] turns one raw record into a [`TestRun`]:
//!
//! - results given as a `[{code, value}]` list become a mapping keyed by code
//! - the four known properties are pulled into fixed, always-present fields
//! - defect channel addressing is decoded once
//! - a dual-HCC hybrid's identity is rewritten to its logical hybrid name
//!
//! Normalization is idempotent: `normalize_record(&run.to_value())` yields
//! `run` again.

use crate::defect::Defect;
use crate::error::{Error, Result};
use crate::fields::{flex_string, get_path};
use crate::record::{RunProperties, TestRun, PROP_DET_INFO};
use crate::types::{is_dual_hcc, is_hybrid_serial, is_module_serial, TestTypeCode};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Where a raw record comes from
#[derive(Debug, Clone, PartialEq)]
pub enum RawSource {
    /// Already-parsed record
    Inline(Value),
    /// Path to a stored JSON record
    Stored(PathBuf),
}

impl RawSource {
    /// Resolve to the parsed record
    pub fn load(&self) -> Result<Value> {
        match self {
            RawSource::Inline(value) => Ok(value.clone()),
            RawSource::Stored(path) => {
                let content = std::fs::read_to_string(path)?;
                Ok(serde_json::from_str(&content)?)
            }
        }
    }
}

impl fmt::Display for RawSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawSource::Inline(value) => match value.get("id").and_then(flex_string) {
                Some(id) => write!(f, "inline record {}", id),
                None => write!(f, "inline record"),
            },
            RawSource::Stored(path) => write!(f, "{}", path.display()),
        }
    }
}

impl From<Value> for RawSource {
    fn from(value: Value) -> Self {
        RawSource::Inline(value)
    }
}

impl From<PathBuf> for RawSource {
    fn from(path: PathBuf) -> Self {
        RawSource::Stored(path)
    }
}

/// A source that could not be turned into a run
#[derive(Debug)]
pub struct Rejection {
    /// Description of the source
    pub source: String,
    /// Why it was rejected
    pub error: Error,
}

/// Outcome of ingesting a batch
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Normalized runs, in input order
    pub runs: Vec<TestRun>,
    /// Rejected sources, in input order
    pub rejected: Vec<Rejection>,
}

impl IngestReport {
    /// Whether every source was accepted
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Normalize every source, collecting rejections instead of failing the batch
pub fn ingest_batch<I>(sources: I) -> IngestReport
where
    I: IntoIterator<Item = RawSource>,
{
    let mut report = IngestReport::default();
    for source in sources {
        match source.load().and_then(|raw| normalize_record(&raw)) {
            Ok(run) => report.runs.push(run),
            Err(error) => {
                warn!(target: "tcqc::ingest", source = %source, error = %error, "Rejected record");
                report.rejected.push(Rejection {
                    source: source.to_string(),
                    error,
                });
            }
        }
    }
    debug!(
        target: "tcqc::ingest",
        accepted = report.runs.len(),
        rejected = report.rejected.len(),
        "Batch ingested"
    );
    report
}

/// Convert one raw record into canonical form
pub fn normalize_record(raw: &Value) -> Result<TestRun> {
    if !raw.is_object() {
        return Err(Error::invalid("record", "expected a mapping"));
    }

    let code = get_path(raw, &["testType", "code"])
        .and_then(Value::as_str)
        .ok_or_else(|| Error::missing("testType.code", "record"))?;
    let test_type =
        TestTypeCode::from_code(code).ok_or_else(|| Error::UnknownTestType(code.to_string()))?;

    let date = raw
        .get("date")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::missing("date", code))?
        .to_string();
    let run_number = raw
        .get("runNumber")
        .and_then(flex_string)
        .ok_or_else(|| Error::missing("runNumber", code))?;
    let institution = get_path(raw, &["institution", "code"])
        .or_else(|| raw.get("institution"))
        .and_then(flex_string)
        .ok_or_else(|| Error::missing("institution.code", code))?;

    let id = match raw.get("id").and_then(flex_string) {
        Some(id) => id,
        None => {
            let synthesized = format!("{}:{}:{}", code, run_number, date);
            debug!(target: "tcqc::ingest", id = %synthesized, "Record has no id, synthesized one");
            synthesized
        }
    };

    let results = code_value_map(raw.get("results"), "results")
        .and_then(|m| m.ok_or_else(|| Error::missing("results", id.clone())))?;

    let properties = match code_value_map(raw.get("properties"), "properties")? {
        Some(map) => map,
        None => {
            warn!(target: "tcqc::ingest", id = %id, "Record has no properties");
            Map::new()
        }
    };
    let properties = RunProperties::from_map(&properties);

    let defects = match raw.get("defects") {
        Some(Value::Array(items)) => items.iter().map(Defect::from_value).collect(),
        Some(Value::Null) | None => {
            warn!(target: "tcqc::ingest", id = %id, "Record has no defects list");
            Vec::new()
        }
        Some(_) => return Err(Error::invalid("defects", "expected a list")),
    };

    let mut components = component_serials(raw.get("components"));
    let declared = raw.get("component").and_then(|c| {
        flex_string(c).or_else(|| c.get("serialNumber").and_then(flex_string))
    });
    let physical_component = physical_serial(test_type, &components)
        .or(declared)
        .ok_or_else(|| Error::missing("components", id.clone()))?;
    if components.is_empty() {
        components.push(physical_component.clone());
    }

    let component = logical_identity(&id, &physical_component, &properties);

    Ok(TestRun {
        id,
        test_type,
        component,
        physical_component,
        components,
        date,
        uploaded: raw.get("cts").and_then(Value::as_str).map(str::to_string),
        institution,
        run_number,
        results: results.into_iter().collect::<BTreeMap<_, _>>(),
        defects,
        properties,
    })
}

/// Read a `[{code, value}]` list or a mapping into a mapping keyed by code
fn code_value_map(value: Option<&Value>, field: &str) -> Result<Option<Map<String, Value>>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map.clone())),
        Some(Value::Array(entries)) => {
            let mut map = Map::new();
            for entry in entries {
                let code = entry
                    .get("code")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::invalid(field, "entry without a code"))?;
                let value = entry.get("value").cloned().unwrap_or(Value::Null);
                map.insert(code.to_string(), value);
            }
            Ok(Some(map))
        }
        Some(_) => Err(Error::invalid(field, "expected a list or a mapping")),
    }
}

fn component_serials(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    item.get("serialNumber")
                        .and_then(flex_string)
                        .or_else(|| flex_string(item))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Serial of the device the run is attached to
///
/// Module-level tests attach to the module, everything else to a hybrid.
fn physical_serial(test_type: TestTypeCode, components: &[String]) -> Option<String> {
    let at_level = |serial: &&String| {
        if test_type.is_module_level() {
            is_module_serial(serial)
        } else {
            is_hybrid_serial(serial)
        }
    };
    components
        .iter()
        .find(at_level)
        .or_else(|| components.first())
        .cloned()
}

fn logical_identity(id: &str, physical: &str, properties: &RunProperties) -> String {
    if !is_hybrid_serial(physical) || !is_dual_hcc(physical) {
        return physical.to_string();
    }
    match properties.det_info.name.as_deref() {
        Some(name) if name.chars().count() > 2 => name.chars().skip(2).collect(),
        _ => {
            warn!(
                target: "tcqc::ingest",
                id = %id,
                component = %physical,
                "Dual-HCC hybrid without {}.name, keeping physical serial",
                PROP_DET_INFO
            );
            physical.to_string()
        }
    }
}
