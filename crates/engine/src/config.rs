//! Analysis configuration via `tcqc.toml`
//!
//! Every field has a default, so an empty or missing file gives the standard
//! behavior. To change settings, edit the file and rerun.

use crate::temperature::TemperatureMode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tcqc_core::{Error, NoiseThresholds, Result, ThresholdEntry};

/// Config file name looked up next to the analyzed data.
pub const CONFIG_FILE_NAME: &str = "tcqc.toml";

/// Volume threshold above which a device is known to carry several test rounds.
///
/// A round uploads `baseline + runs_per_hybrid * hybrids` runs. Modules whose
/// serial contains `reduced_family_marker` always count as having
/// `reduced_family_hybrids` hybrids.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundsConfig {
    /// Module-level runs per round
    #[serde(default = "default_baseline")]
    pub baseline: usize,
    /// Runs per hybrid per round
    #[serde(default = "default_runs_per_hybrid")]
    pub runs_per_hybrid: usize,
    /// Serial marker of the family with a fixed hybrid count
    #[serde(default = "default_reduced_family_marker")]
    pub reduced_family_marker: String,
    /// Hybrid count used for that family
    #[serde(default = "default_reduced_family_hybrids")]
    pub reduced_family_hybrids: usize,
}

fn default_baseline() -> usize {
    3
}

fn default_runs_per_hybrid() -> usize {
    6
}

fn default_reduced_family_marker() -> String {
    "M2".to_string()
}

fn default_reduced_family_hybrids() -> usize {
    2
}

impl Default for RoundsConfig {
    fn default() -> Self {
        Self {
            baseline: default_baseline(),
            runs_per_hybrid: default_runs_per_hybrid(),
            reduced_family_marker: default_reduced_family_marker(),
            reduced_family_hybrids: default_reduced_family_hybrids(),
        }
    }
}

/// Analysis configuration loaded from `tcqc.toml`.
///
/// # Example
///
/// ```toml
/// # "lenient" (default): scans outside every cold section are warm
/// # "strict": such scans are reported as unresolved
/// temperature_mode = "lenient"
/// last_cold_window_secs = 100.0
///
/// [rounds]
/// baseline = 3
/// runs_per_hybrid = 6
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QcConfig {
    /// Temperature mode: `"lenient"` or `"strict"`.
    #[serde(default = "default_temperature_mode_str")]
    pub temperature_mode: String,
    /// Window around the end of the last cooldown, in seconds.
    #[serde(default = "default_last_cold_window")]
    pub last_cold_window_secs: f64,
    /// Round-volume threshold.
    #[serde(default)]
    pub rounds: RoundsConfig,
    /// Replacement noise-threshold table, in rule order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noise_thresholds: Option<Vec<ThresholdEntry>>,
}

fn default_temperature_mode_str() -> String {
    "lenient".to_string()
}

fn default_last_cold_window() -> f64 {
    100.0
}

impl Default for QcConfig {
    fn default() -> Self {
        Self {
            temperature_mode: default_temperature_mode_str(),
            last_cold_window_secs: default_last_cold_window(),
            rounds: RoundsConfig::default(),
            noise_thresholds: None,
        }
    }
}

impl QcConfig {
    /// Parse the temperature mode string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not `"lenient"` or `"strict"`.
    pub fn temperature_mode(&self) -> Result<TemperatureMode> {
        match self.temperature_mode.as_str() {
            "lenient" => Ok(TemperatureMode::Lenient),
            "strict" => Ok(TemperatureMode::Strict),
            other => Err(Error::ConfigError(format!(
                "Invalid temperature mode '{}' in tcqc.toml. Expected \"lenient\" or \"strict\".",
                other
            ))),
        }
    }

    /// Noise thresholds in effect: the override when given, else the standard table.
    pub fn thresholds(&self) -> NoiseThresholds {
        match &self.noise_thresholds {
            Some(entries) => NoiseThresholds::from_entries(entries),
            None => NoiseThresholds::standard().clone(),
        }
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# tcqc analysis configuration
#
# Temperature mode: "lenient" (default) or "strict"
#   "lenient" = scans not listed in any cold section are warm
#   "strict"  = such scans are reported as unresolved
temperature_mode = "lenient"

# A section starting within this many seconds of the end of the last
# cooldown is the last cold test (strict less-than).
last_cold_window_secs = 100.0

# A device with more runs than baseline + runs_per_hybrid * hybrids holds
# several thermal-cycling rounds, and the operator is asked which one to use.
[rounds]
baseline = 3
runs_per_hybrid = 6
reduced_family_marker = "M2"
reduced_family_hybrids = 2

# Replace the standard noise-threshold table. Rules are tried in order,
# first family code found in the hybrid serial wins.
# [[noise_thresholds]]
# family = "H0"
# stream = "under"
# expected = 589
# max = 798
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: QcConfig = toml::from_str(&content).map_err(|e| {
            Error::ConfigError(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.temperature_mode()?;
        let window = config.last_cold_window_secs;
        if window.is_nan() || window <= 0.0 {
            return Err(Error::ConfigError(format!(
                "last_cold_window_secs must be positive, got {}",
                config.last_cold_window_secs
            )));
        }
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::ConfigError(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::ConfigError(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
