//! Canonical test-run record
//!
//! Every record entering the engine has been through
//! [`normalize_record`](crate::ingest::normalize_record) and has this shape:
//! results keyed by code, the four known properties in fixed fields, decoded
//! defects, and the component identity already resolved to the logical hybrid.

use crate::defect::Defect;
use crate::error::{Error, Result};
use crate::fields::{as_int, char_prefix, get_path, string_list};
use crate::types::TestTypeCode;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Property code of the per-run test metadata (scan names, failures)
pub const PROP_TEST_INFO: &str = "itsdaq_test_info";
/// Property code of the thermal-cycling session catalog
pub const PROP_HISTORY: &str = "ColdJig_History";
/// Property code of the response-curve fit discriminator
pub const PROP_FIT_TYPE: &str = "fit_type_code";
/// Property code of the device-identity annotation
pub const PROP_DET_INFO: &str = "det_info";

/// Fit-type discriminator of a 3-point gain
pub const FIT_TYPE_THREE_POINT: i64 = 4;
/// Fit-type discriminator of a 10-point gain
pub const FIT_TYPE_TEN_POINT: i64 = 3;

/// Test-run metadata: the scans performed and which of them failed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestInfo {
    /// Scan names, in execution order
    #[serde(default)]
    pub all_tests: Vec<String>,
    /// Scan names that failed
    #[serde(default)]
    pub failed_tests: Vec<String>,
    /// Any other metadata, kept as uploaded
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Device-identity annotation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetInfo {
    /// Logical device name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Any other annotation, kept as uploaded
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

// ============================================================================
// Sections
// ============================================================================

/// One named phase of a thermal-cycling round
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    /// Section name, e.g. `41_TC_WARM_TEST_4`
    pub name: String,
    /// Start time in seconds
    pub start_time: Option<f64>,
    /// Stop time in seconds
    pub stop_time: Option<f64>,
    /// Scans performed in this section, `None` when the catalog lists none
    pub tests: Option<Vec<String>>,
    raw: Value,
}

impl Section {
    /// Build a section from its catalog entry
    pub fn from_entry(name: &str, entry: &Value) -> Section {
        Section {
            name: name.to_string(),
            start_time: entry.get("start_time").and_then(Value::as_f64),
            stop_time: entry.get("stop_time").and_then(Value::as_f64),
            tests: get_path(entry, &[PROP_TEST_INFO, "all_tests"])
                .filter(|v| v.is_array())
                .map(string_list),
            raw: entry.clone(),
        }
    }

    /// Build a section from its parts
    pub fn new(name: &str, start_time: f64, stop_time: f64, tests: &[&str]) -> Section {
        let entry = json!({
            "start_time": start_time,
            "stop_time": stop_time,
            PROP_TEST_INFO: { "all_tests": tests },
        });
        Self::from_entry(name, &entry)
    }

    /// Scans of this section, empty when none are listed
    pub fn tests(&self) -> &[String] {
        self.tests.as_deref().unwrap_or(&[])
    }

    /// Whether the scan was performed in this section
    pub fn contains(&self, scan: &str) -> bool {
        self.tests().iter().any(|t| t == scan)
    }

    /// Catalog entry as uploaded
    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

/// Ordered catalog of the sections of a thermal-cycling round
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectionCatalog {
    sections: Vec<Section>,
}

impl SectionCatalog {
    /// Build from the uploaded mapping (section name → entry), keeping order
    pub fn from_value(value: &Value) -> SectionCatalog {
        let sections = value
            .as_object()
            .map(|entries| {
                entries
                    .iter()
                    .map(|(name, entry)| Section::from_entry(name, entry))
                    .collect()
            })
            .unwrap_or_default();
        SectionCatalog { sections }
    }

    /// Build from sections in order
    pub fn from_sections(sections: Vec<Section>) -> SectionCatalog {
        SectionCatalog { sections }
    }

    /// Sections in catalog order
    pub fn iter(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter()
    }

    /// Look up a section by name
    pub fn get(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Number of sections
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    /// Whether the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Mapping form, in catalog order
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        for section in &self.sections {
            map.insert(section.name.clone(), section.raw.clone());
        }
        Value::Object(map)
    }
}

// ============================================================================
// Properties
// ============================================================================

/// The four properties the engine reads, always present
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunProperties {
    /// Scans and failures of this run
    pub test_info: TestInfo,
    /// Session catalog (only on thermal-cycle summary runs)
    pub history: SectionCatalog,
    /// Response-curve fit discriminator
    pub fit_type_code: Option<i64>,
    /// Device-identity annotation
    pub det_info: DetInfo,
}

impl RunProperties {
    /// Build from a mapping keyed by property code
    ///
    /// Absent or malformed entries fall back to their empty default.
    pub fn from_map(map: &Map<String, Value>) -> RunProperties {
        RunProperties {
            test_info: map
                .get(PROP_TEST_INFO)
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default(),
            history: map
                .get(PROP_HISTORY)
                .map(SectionCatalog::from_value)
                .unwrap_or_default(),
            fit_type_code: map.get(PROP_FIT_TYPE).and_then(as_int),
            det_info: map
                .get(PROP_DET_INFO)
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default(),
        }
    }

    /// Mapping form with all four keys
    pub fn to_value(&self) -> Value {
        json!({
            PROP_TEST_INFO: serde_json::to_value(&self.test_info).unwrap_or(Value::Null),
            PROP_HISTORY: self.history.to_value(),
            PROP_FIT_TYPE: self.fit_type_code,
            PROP_DET_INFO: serde_json::to_value(&self.det_info).unwrap_or(Value::Null),
        })
    }
}

// ============================================================================
// TestRun
// ============================================================================

/// A single uploaded test run in canonical form
#[derive(Debug, Clone, PartialEq)]
pub struct TestRun {
    /// Unique identifier
    pub id: String,
    /// Declared test-type code
    pub test_type: TestTypeCode,
    /// Device identity: the logical hybrid for dual-HCC hybrids, otherwise
    /// the physical serial
    pub component: String,
    /// Serial of the physical device the run is attached to
    pub physical_component: String,
    /// Serials of all components listed on the run
    pub components: Vec<String>,
    /// Test timestamp as uploaded
    pub date: String,
    /// Upload timestamp, when known
    pub uploaded: Option<String>,
    /// Institution code
    pub institution: String,
    /// Run number as uploaded
    pub run_number: String,
    /// Results keyed by series code
    pub results: BTreeMap<String, Value>,
    /// Decoded defects
    pub defects: Vec<Defect>,
    /// Known properties
    pub properties: RunProperties,
}

impl TestRun {
    /// Scan names of this run, in execution order
    pub fn scans(&self) -> &[String] {
        &self.properties.test_info.all_tests
    }

    /// Scans that failed
    pub fn failed_tests(&self) -> &[String] {
        &self.properties.test_info.failed_tests
    }

    /// Position of a scan in the per-scan result arrays
    pub fn scan_index(&self, scan: &str) -> Result<usize> {
        self.scans()
            .iter()
            .position(|s| s == scan)
            .ok_or_else(|| Error::ScanNotFound(format!("{} in run {}", scan, self.id)))
    }

    /// Results series by code
    pub fn series(&self, code: &str) -> Option<&Value> {
        self.results.get(code)
    }

    /// Session catalog carried by the run
    pub fn history(&self) -> &SectionCatalog {
        &self.properties.history
    }

    /// Calendar date of the test (`YYYY-MM-DD`)
    pub fn date_prefix(&self) -> &str {
        char_prefix(&self.date, 10)
    }

    /// Calendar date of the upload
    pub fn upload_prefix(&self) -> Option<&str> {
        self.uploaded.as_deref().map(|u| char_prefix(u, 10))
    }

    /// Parsed test timestamp
    pub fn timestamp(&self) -> Option<DateTime<FixedOffset>> {
        parse_timestamp(&self.date)
    }

    /// Order two runs by test time
    ///
    /// Parsed timestamps are compared when both parse; otherwise the raw
    /// strings, which sort chronologically for ISO-8601 input.
    pub fn chronological_cmp(&self, other: &TestRun) -> Ordering {
        match (self.timestamp(), other.timestamp()) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => self.date.cmp(&other.date),
        }
    }

    /// Canonical mapping form, accepted again by ingestion unchanged
    pub fn to_value(&self) -> Value {
        let components: Vec<Value> = self
            .components
            .iter()
            .map(|serial| json!({ "serialNumber": serial }))
            .collect();
        let results: Map<String, Value> = self
            .results
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let mut value = json!({
            "id": self.id,
            "testType": { "code": self.test_type.as_str() },
            "component": self.component,
            "components": components,
            "date": self.date,
            "institution": { "code": self.institution },
            "runNumber": self.run_number,
            "results": Value::Object(results),
            "defects": self.defects.iter().map(Defect::to_value).collect::<Vec<_>>(),
            "properties": self.properties.to_value(),
        });
        if let (Some(uploaded), Some(map)) = (&self.uploaded, value.as_object_mut()) {
            map.insert("cts".to_string(), json!(uploaded));
        }
        value
    }
}

impl Serialize for TestRun {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

/// Parse an upload timestamp, accepting RFC 3339 with or without offset
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(&format!("{}Z", raw)).ok())
}
