//! Device hierarchy resolution
//!
//! A module owns its hybrids either directly (unsplit layouts) or through
//! half-modules (split layouts), so hybrids sit one or two levels down. The
//! layout is encoded in the module serial.
//!
//! Lookups go through [`DeviceSource`]. [`InMemorySource`] answers them from
//! components and runs added to it.

use crate::operator::Operator;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::BTreeMap;
use tcqc_core::fields::{flex_string, get_path};
use tcqc_core::{is_hybrid_serial, Error, PatternTable, Result};
use tracing::{debug, info, warn};

// ============================================================================
// Device records
// ============================================================================

/// Header of a test run as listed on its component
#[derive(Debug, Clone, PartialEq)]
pub struct RunHeader {
    /// Test-run identifier
    pub id: String,
    /// Test timestamp
    pub date: String,
    /// Upload timestamp
    pub uploaded: Option<String>,
    /// Institution code
    pub institution: String,
    /// Run number
    pub run_number: String,
}

impl RunHeader {
    /// Decode a listed test run
    pub fn from_value(value: &Value) -> Result<RunHeader> {
        let id = value
            .get("id")
            .and_then(flex_string)
            .ok_or_else(|| Error::missing("id", "test run header"))?;
        Ok(RunHeader {
            date: value
                .get("date")
                .and_then(flex_string)
                .ok_or_else(|| Error::missing("date", id.clone()))?,
            uploaded: value.get("cts").and_then(flex_string),
            institution: get_path(value, &["institution", "code"])
                .and_then(flex_string)
                .ok_or_else(|| Error::missing("institution.code", id.clone()))?,
            run_number: value
                .get("runNumber")
                .and_then(flex_string)
                .unwrap_or_default(),
            id,
        })
    }
}

/// Test type listed on a component with its runs
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentTest {
    /// Test-type code
    pub code: String,
    /// Runs of that type
    pub runs: Vec<RunHeader>,
}

impl ComponentTest {
    /// Whether the test belongs to thermal cycling
    pub fn is_thermal_cycling(&self) -> bool {
        self.code.contains("TC") || self.code.contains("HVSTABILITY")
    }
}

/// A device as returned by the device source
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    /// Serial number
    pub serial: String,
    /// Child slots; `None` for an empty slot
    pub children: Vec<Option<String>>,
    /// Tests uploaded to the device
    pub tests: Vec<ComponentTest>,
}

impl Component {
    /// Decode a device record
    ///
    /// Expects `serialNumber`, `children[].component.serialNumber` (a null
    /// component is an empty slot) and `tests[].{code, testRuns}`. Malformed
    /// run headers are dropped with a warning.
    pub fn from_value(value: &Value) -> Result<Component> {
        let serial = value
            .get("serialNumber")
            .and_then(flex_string)
            .ok_or_else(|| Error::missing("serialNumber", "component"))?;

        let children = value
            .get("children")
            .and_then(Value::as_array)
            .map(|slots| {
                slots
                    .iter()
                    .map(|slot| get_path(slot, &["component", "serialNumber"]).and_then(flex_string))
                    .collect()
            })
            .unwrap_or_default();

        let mut tests = Vec::new();
        for test in value.get("tests").and_then(Value::as_array).into_iter().flatten() {
            let Some(code) = test.get("code").and_then(flex_string) else {
                continue;
            };
            let mut runs = Vec::new();
            for raw in test.get("testRuns").and_then(Value::as_array).into_iter().flatten() {
                match RunHeader::from_value(raw) {
                    Ok(header) => runs.push(header),
                    Err(e) => {
                        warn!(target: "tcqc::hierarchy", component = %serial, error = %e, "Dropping malformed run header");
                    }
                }
            }
            tests.push(ComponentTest { code, runs });
        }

        Ok(Component {
            serial,
            children,
            tests,
        })
    }

    /// Serials of the occupied child slots
    pub fn child_serials(&self) -> impl Iterator<Item = &str> {
        self.children.iter().filter_map(|c| c.as_deref())
    }

    /// Thermal-cycling runs with their test-type code
    pub fn thermal_cycling_runs(&self) -> impl Iterator<Item = (&str, &RunHeader)> {
        self.tests
            .iter()
            .filter(|t| t.is_thermal_cycling())
            .flat_map(|t| t.runs.iter().map(move |r| (t.code.as_str(), r)))
    }
}

// ============================================================================
// DeviceSource
// ============================================================================

/// Supplier of device records and full test runs
pub trait DeviceSource {
    /// Look up a device by serial number
    fn component(&self, serial: &str) -> Result<Component>;

    /// Fetch full test-run records by id
    fn test_runs(&self, ids: &[String]) -> Result<Vec<Value>>;
}

/// Device source backed by in-memory records
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    components: BTreeMap<String, Value>,
    runs: BTreeMap<String, Value>,
}

impl InMemorySource {
    /// Empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device record (keyed by its `serialNumber`)
    pub fn add_component(&mut self, component: Value) -> Result<()> {
        let serial = component
            .get("serialNumber")
            .and_then(flex_string)
            .ok_or_else(|| Error::missing("serialNumber", "component"))?;
        self.components.insert(serial, component);
        Ok(())
    }

    /// Add a full test-run record (keyed by its `id`)
    pub fn add_run(&mut self, run: Value) -> Result<()> {
        let id = run
            .get("id")
            .and_then(flex_string)
            .ok_or_else(|| Error::missing("id", "test run"))?;
        self.runs.insert(id, run);
        Ok(())
    }
}

impl DeviceSource for InMemorySource {
    fn component(&self, serial: &str) -> Result<Component> {
        let raw = self
            .components
            .get(serial)
            .ok_or_else(|| Error::DeviceNotFound(serial.to_string()))?;
        Component::from_value(raw)
    }

    fn test_runs(&self, ids: &[String]) -> Result<Vec<Value>> {
        ids.iter()
            .map(|id| {
                self.runs
                    .get(id)
                    .cloned()
                    .ok_or_else(|| Error::missing(id.clone(), "test-run store"))
            })
            .collect()
    }
}

// ============================================================================
// Layout
// ============================================================================

/// How a module holds its hybrids
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleLayout {
    /// Hybrids are grandchildren, under half-modules
    Split,
    /// Hybrids are direct children
    Unsplit,
}

static LAYOUTS: Lazy<PatternTable<ModuleLayout>> = Lazy::new(|| {
    PatternTable::new()
        .rules(["M4", "M5"], ModuleLayout::Split)
        .rules(["M0", "M1", "M2", "3L", "3R", "MS", "ML"], ModuleLayout::Unsplit)
});

/// Layout of a module from its serial
pub fn module_layout(serial: &str) -> Result<ModuleLayout> {
    LAYOUTS
        .classify(serial)
        .copied()
        .ok_or_else(|| Error::UnrecognizedSerial(serial.to_string()))
}

/// Look up a module by serial number
pub fn find_module(source: &dyn DeviceSource, serial: &str) -> Result<Component> {
    match source.component(serial) {
        Ok(module) => {
            info!(target: "tcqc::hierarchy", module = %module.serial, "Found module");
            Ok(module)
        }
        Err(e) => {
            warn!(target: "tcqc::hierarchy", module = %serial, error = %e, "Could not find module");
            Err(Error::DeviceNotFound(serial.to_string()))
        }
    }
}

/// Ask the operator for a module serial and look it up
pub fn lookup_module(source: &dyn DeviceSource, operator: &mut dyn Operator) -> Result<Component> {
    let serial = operator
        .ask("Module serial number (e.g. 20USEM40000080):")
        .ok_or_else(|| Error::Unresolved("module serial number".to_string()))?;
    find_module(source, &serial)
}

/// Hybrids of a module, in child order
///
/// Empty slots and non-hybrid children are skipped. A child that cannot be
/// fetched is skipped with a warning; the walk continues with its siblings.
pub fn resolve_hybrids(source: &dyn DeviceSource, module: &Component) -> Result<Vec<Component>> {
    let layout = module_layout(&module.serial)?;
    debug!(target: "tcqc::hierarchy", module = %module.serial, ?layout, "Resolving hybrids");

    let mut hybrids = Vec::new();
    match layout {
        ModuleLayout::Unsplit => collect_hybrids(source, module, &mut hybrids),
        ModuleLayout::Split => {
            for half_serial in module.child_serials() {
                match source.component(half_serial) {
                    Ok(half) => collect_hybrids(source, &half, &mut hybrids),
                    Err(e) => {
                        warn!(target: "tcqc::hierarchy", component = %half_serial, error = %e, "Skipping half-module");
                    }
                }
            }
        }
    }
    Ok(hybrids)
}

fn collect_hybrids(source: &dyn DeviceSource, parent: &Component, hybrids: &mut Vec<Component>) {
    for serial in parent.child_serials().filter(|s| is_hybrid_serial(s)) {
        match source.component(serial) {
            Ok(hybrid) => {
                info!(target: "tcqc::hierarchy", hybrid = %serial, "Found hybrid");
                hybrids.push(hybrid);
            }
            Err(e) => {
                warn!(target: "tcqc::hierarchy", hybrid = %serial, error = %e, "Skipping hybrid");
            }
        }
    }
}
