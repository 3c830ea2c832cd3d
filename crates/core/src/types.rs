//! Core identifiers for the tcqc data model
//!
//! - `Stream`: one of the two readout paths of a hybrid
//! - `TestTypeCode`: the declared test-type code of an uploaded run
//! - `TestKind`: the classified bucket a run ends up in
//! - `Temperature`: warm/cold tag of a section or scan
//! - Serial-number helpers for the device taxonomy

use serde::{Deserialize, Serialize};
use std::fmt;

/// Channels read out by one chip
pub const CHANNELS_PER_CHIP: u32 = 128;

/// Serial prefixes of the two hybrid families (endcap, barrel)
pub const HYBRID_PREFIXES: [&str; 2] = ["20USEH", "20USBH"];

/// Serial prefixes of module-level devices
pub const MODULE_PREFIXES: [&str; 3] = ["20USEM", "20USBM", "20USE3"];

/// Marker of a physical hybrid hosting two logical hybrids (two HCCs)
pub const DUAL_HCC_MARKER: &str = "H4";

/// Whether the serial belongs to one of the hybrid families
pub fn is_hybrid_serial(serial: &str) -> bool {
    HYBRID_PREFIXES.iter().any(|p| serial.contains(p))
}

/// Whether the serial belongs to a module-level device
pub fn is_module_serial(serial: &str) -> bool {
    MODULE_PREFIXES.iter().any(|p| serial.contains(p))
}

/// Whether the physical hybrid carries two logical hybrids
pub fn is_dual_hcc(serial: &str) -> bool {
    serial.contains(DUAL_HCC_MARKER)
}

// ============================================================================
// Stream
// ============================================================================

/// Readout path of a hybrid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    /// "under" stream
    Under,
    /// "away" stream
    Away,
}

impl Stream {
    /// Both streams, under first
    pub const ALL: [Stream; 2] = [Stream::Under, Stream::Away];

    /// Lower-case form used in defect `chip_bank` fields and series codes
    pub fn as_str(&self) -> &'static str {
        match self {
            Stream::Under => "under",
            Stream::Away => "away",
        }
    }

    /// Parse a stream name, ignoring case
    pub fn parse(name: &str) -> Option<Stream> {
        match name.trim().to_ascii_lowercase().as_str() {
            "under" => Some(Stream::Under),
            "away" => Some(Stream::Away),
            _ => None,
        }
    }

    /// Whether a defect's `chip_bank` names this stream (case-normalized)
    pub fn matches_bank(&self, chip_bank: &str) -> bool {
        chip_bank.trim().eq_ignore_ascii_case(self.as_str())
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Under => write!(f, "Under"),
            Stream::Away => write!(f, "Away"),
        }
    }
}

// ============================================================================
// TestTypeCode
// ============================================================================

/// Declared test-type code carried by every uploaded run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TestTypeCode {
    /// `MODULE_IV_AMAC_TC`
    ModuleIv,
    /// `PEDESTAL_TRIM_TC`
    PedestalTrim,
    /// `STROBE_DELAY_TC`
    StrobeDelay,
    /// `RESPONSE_CURVE_TC`, both the 3-point and 10-point gain
    ResponseCurve,
    /// `NO_TC`
    NoiseOccupancy,
    /// `OPEN_CHANNEL_SEARCH_TC`
    OpenChannelSearch,
    /// `HVSTABILITY`
    HvStability,
    /// `MODULE_TC`, the thermal-cycle summary
    ThermalCycle,
}

impl TestTypeCode {
    /// All codes in upload-table order
    pub const ALL: [TestTypeCode; 8] = [
        TestTypeCode::ModuleIv,
        TestTypeCode::PedestalTrim,
        TestTypeCode::StrobeDelay,
        TestTypeCode::ResponseCurve,
        TestTypeCode::NoiseOccupancy,
        TestTypeCode::OpenChannelSearch,
        TestTypeCode::HvStability,
        TestTypeCode::ThermalCycle,
    ];

    /// Code string as uploaded
    pub fn as_str(&self) -> &'static str {
        match self {
            TestTypeCode::ModuleIv => "MODULE_IV_AMAC_TC",
            TestTypeCode::PedestalTrim => "PEDESTAL_TRIM_TC",
            TestTypeCode::StrobeDelay => "STROBE_DELAY_TC",
            TestTypeCode::ResponseCurve => "RESPONSE_CURVE_TC",
            TestTypeCode::NoiseOccupancy => "NO_TC",
            TestTypeCode::OpenChannelSearch => "OPEN_CHANNEL_SEARCH_TC",
            TestTypeCode::HvStability => "HVSTABILITY",
            TestTypeCode::ThermalCycle => "MODULE_TC",
        }
    }

    /// Exact lookup of an uploaded code
    pub fn from_code(code: &str) -> Option<TestTypeCode> {
        Self::ALL.iter().copied().find(|c| c.as_str() == code)
    }

    /// Whether runs of this type are uploaded to the module rather than a hybrid
    pub fn is_module_level(&self) -> bool {
        matches!(
            self,
            TestTypeCode::ModuleIv | TestTypeCode::HvStability | TestTypeCode::ThermalCycle
        )
    }

    /// Bucket for every code except the response curve, which needs pairing
    pub fn direct_kind(&self) -> Option<TestKind> {
        match self {
            TestTypeCode::ModuleIv => Some(TestKind::Iv),
            TestTypeCode::PedestalTrim => Some(TestKind::PedestalTrim),
            TestTypeCode::StrobeDelay => Some(TestKind::StrobeDelay),
            TestTypeCode::ResponseCurve => None,
            TestTypeCode::NoiseOccupancy => Some(TestKind::NoiseOccupancy),
            TestTypeCode::OpenChannelSearch => Some(TestKind::OpenChannelSearch),
            TestTypeCode::HvStability => Some(TestKind::HvStability),
            TestTypeCode::ThermalCycle => Some(TestKind::ThermalCycle),
        }
    }
}

impl fmt::Display for TestTypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// TestKind
// ============================================================================

/// Addressing unit of a per-scan data array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    /// One value per channel
    Channel,
    /// One value per chip
    Chip,
}

/// Classified test bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TestKind {
    /// Module IV curve
    #[serde(rename = "IV")]
    Iv,
    /// Pedestal trim
    #[serde(rename = "PT")]
    PedestalTrim,
    /// Strobe delay
    #[serde(rename = "SD")]
    StrobeDelay,
    /// 3-point gain response curve
    #[serde(rename = "3PG")]
    ThreePointGain,
    /// 10-point gain response curve
    #[serde(rename = "10PG")]
    TenPointGain,
    /// Noise occupancy
    #[serde(rename = "NO")]
    NoiseOccupancy,
    /// Open channel search
    #[serde(rename = "OCS")]
    OpenChannelSearch,
    /// HV stability
    #[serde(rename = "HVS")]
    HvStability,
    /// Thermal-cycle summary
    #[serde(rename = "TC")]
    ThermalCycle,
}

impl TestKind {
    /// All kinds in report order
    pub const ALL: [TestKind; 9] = [
        TestKind::Iv,
        TestKind::PedestalTrim,
        TestKind::StrobeDelay,
        TestKind::ThreePointGain,
        TestKind::TenPointGain,
        TestKind::NoiseOccupancy,
        TestKind::OpenChannelSearch,
        TestKind::HvStability,
        TestKind::ThermalCycle,
    ];

    /// Short tag used in reports
    pub fn short(&self) -> &'static str {
        match self {
            TestKind::Iv => "IV",
            TestKind::PedestalTrim => "PT",
            TestKind::StrobeDelay => "SD",
            TestKind::ThreePointGain => "3PG",
            TestKind::TenPointGain => "10PG",
            TestKind::NoiseOccupancy => "NO",
            TestKind::OpenChannelSearch => "OCS",
            TestKind::HvStability => "HVS",
            TestKind::ThermalCycle => "TC",
        }
    }

    /// Human-readable name
    pub fn label(&self) -> &'static str {
        match self {
            TestKind::Iv => "IV",
            TestKind::PedestalTrim => "Pedestal Trim",
            TestKind::StrobeDelay => "Strobe Delay",
            TestKind::ThreePointGain => "3-Point Gain",
            TestKind::TenPointGain => "10-Point Gain",
            TestKind::NoiseOccupancy => "Noise Occupancy",
            TestKind::OpenChannelSearch => "Open Channel Search",
            TestKind::HvStability => "HV Stability",
            TestKind::ThermalCycle => "Thermal Cycle",
        }
    }

    /// Declared code runs of this kind are uploaded with
    pub fn code(&self) -> TestTypeCode {
        match self {
            TestKind::Iv => TestTypeCode::ModuleIv,
            TestKind::PedestalTrim => TestTypeCode::PedestalTrim,
            TestKind::StrobeDelay => TestTypeCode::StrobeDelay,
            TestKind::ThreePointGain | TestKind::TenPointGain => TestTypeCode::ResponseCurve,
            TestKind::NoiseOccupancy => TestTypeCode::NoiseOccupancy,
            TestKind::OpenChannelSearch => TestTypeCode::OpenChannelSearch,
            TestKind::HvStability => TestTypeCode::HvStability,
            TestKind::ThermalCycle => TestTypeCode::ThermalCycle,
        }
    }

    /// Length of the scan-name suffix that follows the bare run number
    ///
    /// Defects record only the run number; each test type appends a fixed
    /// suffix to it when naming its scans.
    pub fn scan_suffix_len(&self) -> Option<usize> {
        match self {
            TestKind::PedestalTrim => Some(18),
            TestKind::StrobeDelay => Some(17),
            TestKind::ThreePointGain | TestKind::TenPointGain => Some(19),
            TestKind::NoiseOccupancy => Some(7),
            TestKind::OpenChannelSearch => Some(24),
            TestKind::Iv | TestKind::HvStability | TestKind::ThermalCycle => None,
        }
    }

    /// Addressing unit of this kind's per-scan arrays, `None` when it has no
    /// defect-partitioned data
    pub fn granularity(&self) -> Option<Granularity> {
        match self {
            TestKind::PedestalTrim
            | TestKind::ThreePointGain
            | TestKind::TenPointGain
            | TestKind::OpenChannelSearch => Some(Granularity::Channel),
            TestKind::StrobeDelay | TestKind::NoiseOccupancy => Some(Granularity::Chip),
            TestKind::Iv | TestKind::HvStability | TestKind::ThermalCycle => None,
        }
    }

    /// Base names of the per-scan series that are partitioned by defects
    ///
    /// The results code is `<base>_<stream>`.
    pub fn partition_series(&self) -> &'static [&'static str] {
        match self {
            TestKind::PedestalTrim => &["trim"],
            TestKind::StrobeDelay => &["StrobeDelay"],
            TestKind::ThreePointGain | TestKind::TenPointGain => &["innse", "gain", "vt50"],
            TestKind::NoiseOccupancy => &["occupancy_mean"],
            TestKind::OpenChannelSearch => &["noise"],
            TestKind::Iv | TestKind::HvStability | TestKind::ThermalCycle => &[],
        }
    }

    /// Series whose first scan defines the channel (or chip) list
    pub fn reference_series(&self) -> Option<&'static str> {
        match self {
            TestKind::PedestalTrim => Some("trim_away"),
            TestKind::StrobeDelay => Some("StrobeDelay_away"),
            TestKind::ThreePointGain | TestKind::TenPointGain => Some("gain_away"),
            TestKind::NoiseOccupancy => Some("occupancy_mean_away"),
            TestKind::OpenChannelSearch => Some("noise_away"),
            TestKind::Iv | TestKind::HvStability | TestKind::ThermalCycle => None,
        }
    }

    /// Value marking array slots that do not correspond to a physical chip
    pub fn placeholder(&self) -> Option<f64> {
        match self {
            TestKind::StrobeDelay => Some(-1.0),
            _ => None,
        }
    }

    /// Parse a short tag (`"PT"`, `"3PG"`, ...)
    pub fn from_short(tag: &str) -> Option<TestKind> {
        Self::ALL.iter().copied().find(|k| k.short() == tag)
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short())
    }
}

// ============================================================================
// Temperature
// ============================================================================

/// Thermal context of a section or scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Temperature {
    /// Warm, room-temperature or pre/post-cycle phase
    Warm,
    /// Cold phase or cooldown
    Cold,
}

impl Temperature {
    /// Lower-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            Temperature::Warm => "warm",
            Temperature::Cold => "cold",
        }
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
