//! Warm/cold resolution of sections and scans
//!
//! Sections are classified by name through an ordered rule table, warm rules
//! first. A section matching no rule is last-cold when it starts within the
//! configured window of the end of the last cooldown, which is how the final
//! cold IV section is tagged. Anything else is an unrecognized section.
//!
//! A scan is cold when a cold section lists it. Otherwise:
//!
//! | Mode      | Scan listed in a warm section | Scan listed nowhere else |
//! |-----------|-------------------------------|--------------------------|
//! | Lenient   | warm                          | warm                     |
//! | Strict    | warm                          | unresolved               |
//!
//! Unrecognized sections have no temperature in either mode. They are
//! reported, and left out of every per-temperature section listing. The mode
//! only decides what happens to scans.

use crate::config::QcConfig;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tcqc_core::{Error, PatternTable, Result, SectionCatalog, Temperature};
use tracing::{debug, warn};

/// How scans outside every cold section are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureMode {
    /// Warm by elimination
    Lenient,
    /// Warm only when a warm section lists them
    Strict,
}

/// Name classification of a section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionClass {
    /// Warm by name
    Warm,
    /// Cold by name
    Cold,
    /// Cold because it starts right after the last cooldown
    LastCold,
    /// Matches no rule
    Unrecognized,
}

impl SectionClass {
    /// Temperature of a recognized class
    pub fn temperature(&self) -> Option<Temperature> {
        match self {
            SectionClass::Warm => Some(Temperature::Warm),
            SectionClass::Cold | SectionClass::LastCold => Some(Temperature::Cold),
            SectionClass::Unrecognized => None,
        }
    }
}

static SECTION_TEMPERATURES: Lazy<PatternTable<Temperature>> = Lazy::new(|| {
    PatternTable::new()
        .rules(
            ["WARM", "PRE_TC", "POST_TC", "TC_END", "ROOM_TEMPERATURE", "TC_START"],
            Temperature::Warm,
        )
        .rules(["COLD", "COOLDOWN"], Temperature::Cold)
});

static SECTION_VALIDITY: Lazy<PatternTable<bool>> = Lazy::new(|| {
    PatternTable::new()
        .rules(["TEST", "IV", "HV", "OPEN"], true)
        .rules(
            ["COOLDOWN", "WARMUP", "TC_START", "ROOM_TEMPERATURE", "TURN_ON", "TC_END"],
            false,
        )
});

/// Whether a section carries electrical tests, `None` when unrecognized
pub fn section_validity(name: &str) -> Option<bool> {
    SECTION_VALIDITY.classify(name).copied()
}

/// Warm/cold oracle over one session catalog
#[derive(Debug, Clone)]
pub struct TemperatureResolver {
    catalog: SectionCatalog,
    mode: TemperatureMode,
    classes: Vec<(String, SectionClass)>,
}

impl TemperatureResolver {
    /// Classify every section of the catalog
    pub fn new(catalog: &SectionCatalog, mode: TemperatureMode, window_secs: f64) -> Self {
        // the last COOLDOWN section in catalog order
        let cooldown_end = catalog
            .iter()
            .filter(|s| s.name.contains("COOLDOWN"))
            .last()
            .and_then(|s| s.stop_time);

        let classes = catalog
            .iter()
            .map(|section| {
                let class = match SECTION_TEMPERATURES.classify(&section.name) {
                    Some(Temperature::Warm) => SectionClass::Warm,
                    Some(Temperature::Cold) => SectionClass::Cold,
                    None => match (section.start_time, cooldown_end) {
                        (Some(start), Some(end)) if (start - end).abs() < window_secs => {
                            SectionClass::LastCold
                        }
                        _ => SectionClass::Unrecognized,
                    },
                };
                if class == SectionClass::Unrecognized {
                    warn!(target: "tcqc::temperature", section = %section.name, "Section could not be flagged as warm or cold");
                }
                (section.name.clone(), class)
            })
            .collect();

        debug!(target: "tcqc::temperature", sections = catalog.len(), ?mode, "Classified sections");
        TemperatureResolver {
            catalog: catalog.clone(),
            mode,
            classes,
        }
    }

    /// Resolver using the configured mode and window
    pub fn from_config(catalog: &SectionCatalog, config: &QcConfig) -> Result<Self> {
        Ok(Self::new(
            catalog,
            config.temperature_mode()?,
            config.last_cold_window_secs,
        ))
    }

    /// Mode in effect
    pub fn mode(&self) -> TemperatureMode {
        self.mode
    }

    /// The catalog being resolved
    pub fn catalog(&self) -> &SectionCatalog {
        &self.catalog
    }

    /// Name classification of a section
    pub fn classify_section(&self, name: &str) -> Result<SectionClass> {
        self.classes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, class)| *class)
            .ok_or_else(|| Error::UnrecognizedSection(name.to_string()))
    }

    /// Temperature of a section
    ///
    /// Fails with [`Error::UnrecognizedSection`] for sections that matched no
    /// rule, whatever the mode.
    pub fn section_temperature(&self, name: &str) -> Result<Temperature> {
        self.classify_section(name)?
            .temperature()
            .ok_or_else(|| Error::UnrecognizedSection(name.to_string()))
    }

    /// Sections that matched no rule, in catalog order
    pub fn unrecognized_sections(&self) -> Vec<&str> {
        self.classes
            .iter()
            .filter(|(_, c)| *c == SectionClass::Unrecognized)
            .map(|(n, _)| n.as_str())
            .collect()
    }

    /// Sections of one temperature, in catalog order
    pub fn sections_at(&self, temperature: Temperature) -> Vec<&str> {
        self.classes
            .iter()
            .filter(|(n, _)| self.section_temperature(n).ok() == Some(temperature))
            .map(|(n, _)| n.as_str())
            .collect()
    }

    /// Temperature of a scan
    pub fn scan_temperature(&self, scan: &str) -> Result<Temperature> {
        let listed_in = |temperature: Temperature| {
            self.catalog.iter().any(|section| {
                section.contains(scan)
                    && self.section_temperature(&section.name).ok() == Some(temperature)
            })
        };

        if listed_in(Temperature::Cold) {
            return Ok(Temperature::Cold);
        }
        match self.mode {
            TemperatureMode::Lenient => Ok(Temperature::Warm),
            TemperatureMode::Strict if listed_in(Temperature::Warm) => Ok(Temperature::Warm),
            TemperatureMode::Strict => Err(Error::Unresolved(format!("temperature of scan {}", scan))),
        }
    }

    /// Split scans into warm, cold and unresolved, keeping order
    pub fn split_scans<S: AsRef<str>>(&self, scans: &[S]) -> ScanSplit {
        let mut split = ScanSplit::default();
        for scan in scans {
            let scan = scan.as_ref();
            match self.scan_temperature(scan) {
                Ok(Temperature::Warm) => split.warm.push(scan.to_string()),
                Ok(Temperature::Cold) => split.cold.push(scan.to_string()),
                Err(_) => {
                    warn!(target: "tcqc::temperature", scan = %scan, "Scan could not be labelled warm or cold");
                    split.unresolved.push(scan.to_string());
                }
            }
        }
        split
    }
}

/// Scans split by temperature
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSplit {
    /// Warm scans
    pub warm: Vec<String>,
    /// Cold scans
    pub cold: Vec<String>,
    /// Scans with no temperature (strict mode only)
    pub unresolved: Vec<String>,
}
