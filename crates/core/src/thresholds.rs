//! Noise thresholds per hybrid family and stream
//!
//! The family is encoded in the hybrid serial (`20USEH4...` is an H4 hybrid).
//! Families are matched by substring in rule order, so the dual-HCC family
//! comes first and `HX2` is tried before `HX`.

use crate::patterns::PatternTable;
use crate::types::Stream;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Expected and maximum acceptable noise (ENC) for one family and stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoiseThreshold {
    /// Typical noise
    pub expected: u32,
    /// Largest acceptable noise
    pub max: u32,
}

/// One row of a threshold table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdEntry {
    /// Family code matched against the hybrid identity
    pub family: String,
    /// Stream the row applies to
    pub stream: Stream,
    /// Typical noise
    pub expected: u32,
    /// Largest acceptable noise
    pub max: u32,
}

/// Threshold lookup table keyed by (family code, stream)
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseThresholds {
    families: PatternTable<[NoiseThreshold; 2]>,
}

// (family, under, away) as (expected, max)
const STANDARD: [(&str, (u32, u32), (u32, u32)); 16] = [
    ("H4", (650, 999), (595, 1035)),
    ("H0", (589, 798), (527, 785)),
    ("H1", (625, 815), (598, 876)),
    ("H2", (613, 916), (524, 908)),
    ("H3", (595, 963), (510, 996)),
    ("H5", (672, 1075), (571, 1057)),
    ("H6", (608, 1075), (571, 1057)),
    ("H7", (669, 1092), (564, 1043)),
    ("H8", (605, 1092), (564, 1147)),
    ("H9", (862, 1154), (792, 1172)),
    ("HA", (842, 1154), (792, 1172)),
    ("HB", (917, 1229), (668, 1233)),
    ("HC", (896, 1229), (668, 1233)),
    ("HX2", (824, 1243), (779, 1243)),
    ("HX", (610, 918), (577, 918)),
    ("HY", (610, 918), (577, 918)),
];

static STANDARD_TABLE: Lazy<NoiseThresholds> = Lazy::new(|| {
    let families = STANDARD
        .iter()
        .fold(PatternTable::new(), |table, (family, under, away)| {
            table.rule(
                *family,
                [
                    NoiseThreshold {
                        expected: under.0,
                        max: under.1,
                    },
                    NoiseThreshold {
                        expected: away.0,
                        max: away.1,
                    },
                ],
            )
        });
    NoiseThresholds { families }
});

fn slot(stream: Stream) -> usize {
    match stream {
        Stream::Under => 0,
        Stream::Away => 1,
    }
}

impl NoiseThresholds {
    /// The standard table
    pub fn standard() -> &'static NoiseThresholds {
        &STANDARD_TABLE
    }

    /// Build a table from explicit rows, in rule order
    ///
    /// A family given for only one stream has no threshold for the other.
    pub fn from_entries(entries: &[ThresholdEntry]) -> NoiseThresholds {
        let mut order: Vec<&str> = Vec::new();
        for entry in entries {
            if !order.contains(&entry.family.as_str()) {
                order.push(&entry.family);
            }
        }
        let families = order.into_iter().fold(PatternTable::new(), |table, family| {
            let mut pair = [NoiseThreshold { expected: 0, max: 0 }; 2];
            for entry in entries.iter().filter(|e| e.family == family) {
                pair[slot(entry.stream)] = NoiseThreshold {
                    expected: entry.expected,
                    max: entry.max,
                };
            }
            table.rule(family, pair)
        });
        NoiseThresholds { families }
    }

    /// Rows of the table in rule order
    pub fn entries(&self) -> Vec<ThresholdEntry> {
        self.families
            .iter()
            .flat_map(|rule| {
                Stream::ALL.iter().map(move |stream| {
                    let t = rule.category[slot(*stream)];
                    ThresholdEntry {
                        family: rule.pattern.clone(),
                        stream: *stream,
                        expected: t.expected,
                        max: t.max,
                    }
                })
            })
            .filter(|e| e.max > 0)
            .collect()
    }

    /// Thresholds for a hybrid identity and stream, `None` for unknown families
    pub fn lookup(&self, hybrid: &str, stream: Stream) -> Option<NoiseThreshold> {
        self.families
            .classify(hybrid)
            .map(|pair| pair[slot(stream)])
            .filter(|t| t.max > 0)
    }
}

impl Default for NoiseThresholds {
    fn default() -> Self {
        NoiseThresholds::standard().clone()
    }
}
