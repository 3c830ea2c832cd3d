//! Defect annotations
//!
//! A defect flags part of a hybrid as faulty for one stream of one scan. Its
//! `properties` block addresses the affected channels in one of three ways,
//! tried in this order:
//!
//! 1. `channel` - a single channel
//! 2. `channel_from` / `channel_to` - an inclusive channel range
//! 3. `chip_in_histo` alone - the whole 128-channel block of that chip
//!
//! Decoding happens once, at ingestion. A defect whose fields resolve to none
//! of the modes decodes to [`ChannelSpan::Unresolved`] and marks nothing. So
//! does a chip index whose channel block lies beyond `u32`.
//!
//! Covered channels and chips are yielded as ranges, never materialized.

use crate::fields::{as_index, flex_string};
use crate::types::{Stream, CHANNELS_PER_CHIP};
use serde_json::{json, Map, Value};
use std::ops::RangeInclusive;

/// Property keys of a defect
pub mod keys {
    /// Stream the defect belongs to
    pub const CHIP_BANK: &str = "chip_bank";
    /// Bare run number of the scan
    pub const RUN_NUMBER: &str = "runNumber";
    /// Single channel
    pub const CHANNEL: &str = "channel";
    /// First channel of a range
    pub const CHANNEL_FROM: &str = "channel_from";
    /// Last channel of a range (inclusive)
    pub const CHANNEL_TO: &str = "channel_to";
    /// Chip index
    pub const CHIP_IN_HISTO: &str = "chip_in_histo";
}

/// Decoded channel addressing of a defect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelSpan {
    /// One channel
    Single(u32),
    /// Inclusive channel range
    Range {
        /// First channel
        from: u32,
        /// Last channel
        to: u32,
    },
    /// All channels of one chip
    WholeChip(u32),
    /// Addressing fields present but not resolvable
    Unresolved,
}

fn present<'a>(props: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    props.get(key).filter(|v| !v.is_null())
}

/// Channel block of a chip, `None` when it does not fit in `u32`
fn chip_block(chip: u32) -> Option<RangeInclusive<u32>> {
    let first = chip.checked_mul(CHANNELS_PER_CHIP)?;
    let last = first.checked_add(CHANNELS_PER_CHIP - 1)?;
    Some(first..=last)
}

fn nothing() -> RangeInclusive<u32> {
    RangeInclusive::new(1, 0)
}

impl ChannelSpan {
    /// Decode the addressing fields of a defect's properties
    pub fn decode(props: &Map<String, Value>) -> ChannelSpan {
        if let Some(channel) = present(props, keys::CHANNEL) {
            return as_index(channel)
                .map(ChannelSpan::Single)
                .unwrap_or(ChannelSpan::Unresolved);
        }

        let from = present(props, keys::CHANNEL_FROM);
        let to = present(props, keys::CHANNEL_TO);
        match (from, to) {
            (Some(from), Some(to)) => {
                return match (as_index(from), as_index(to)) {
                    (Some(from), Some(to)) if from <= to => ChannelSpan::Range { from, to },
                    _ => ChannelSpan::Unresolved,
                };
            }
            (None, None) => {}
            // half a range
            _ => return ChannelSpan::Unresolved,
        }

        present(props, keys::CHIP_IN_HISTO)
            .and_then(as_index)
            .filter(|chip| chip_block(*chip).is_some())
            .map(ChannelSpan::WholeChip)
            .unwrap_or(ChannelSpan::Unresolved)
    }

    /// Channels covered, ascending
    ///
    /// Empty for an unresolved span and for a chip past the last addressable
    /// channel block.
    pub fn channels(&self) -> RangeInclusive<u32> {
        match *self {
            ChannelSpan::Single(channel) => channel..=channel,
            ChannelSpan::Range { from, to } => from..=to,
            ChannelSpan::WholeChip(chip) => chip_block(chip).unwrap_or_else(nothing),
            ChannelSpan::Unresolved => nothing(),
        }
    }

    /// Chips touched by the covered channels, ascending
    pub fn chips(&self) -> RangeInclusive<u32> {
        match *self {
            ChannelSpan::Single(channel) => {
                let chip = channel / CHANNELS_PER_CHIP;
                chip..=chip
            }
            ChannelSpan::Range { from, to } => from / CHANNELS_PER_CHIP..=to / CHANNELS_PER_CHIP,
            ChannelSpan::WholeChip(chip) if chip_block(chip).is_some() => chip..=chip,
            ChannelSpan::WholeChip(_) | ChannelSpan::Unresolved => nothing(),
        }
    }

    /// Whether the span covers at least one channel
    pub fn is_resolved(&self) -> bool {
        !self.channels().is_empty()
    }
}

/// A defect annotation attached to a test run
#[derive(Debug, Clone, PartialEq)]
pub struct Defect {
    /// Defect type name (e.g. `"DEAD_CHANNEL"`)
    pub name: String,
    /// Stream as uploaded, compared case-insensitively
    pub chip_bank: String,
    /// Bare run number of the scan the defect was found in
    pub run_number: String,
    /// Decoded channel addressing
    pub span: ChannelSpan,
    /// Chip index when given
    pub chip: Option<u32>,
    properties: Map<String, Value>,
}

impl Defect {
    /// Decode a raw defect mapping
    ///
    /// Never fails: missing fields leave the defect unable to match any scan.
    pub fn from_value(value: &Value) -> Defect {
        let name = value
            .get("name")
            .and_then(flex_string)
            .unwrap_or_default();
        let properties = value
            .get("properties")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        Self::from_properties(name, properties)
    }

    fn from_properties(name: String, properties: Map<String, Value>) -> Defect {
        let chip_bank = properties
            .get(keys::CHIP_BANK)
            .and_then(flex_string)
            .unwrap_or_default();
        let run_number = properties
            .get(keys::RUN_NUMBER)
            .and_then(flex_string)
            .unwrap_or_default();
        let chip = present(&properties, keys::CHIP_IN_HISTO).and_then(as_index);
        let span = ChannelSpan::decode(&properties);
        Defect {
            name,
            chip_bank,
            run_number,
            span,
            chip,
            properties,
        }
    }

    /// Single-channel defect
    pub fn single(name: &str, stream: Stream, run_number: &str, channel: u32) -> Defect {
        Self::build(
            name,
            stream,
            run_number,
            json!({ keys::CHANNEL: channel, keys::CHIP_IN_HISTO: channel / CHANNELS_PER_CHIP }),
        )
    }

    /// Channel-range defect
    pub fn range(name: &str, stream: Stream, run_number: &str, from: u32, to: u32) -> Defect {
        Self::build(
            name,
            stream,
            run_number,
            json!({ keys::CHANNEL_FROM: from, keys::CHANNEL_TO: to, keys::CHIP_IN_HISTO: from / CHANNELS_PER_CHIP }),
        )
    }

    /// Whole-chip defect
    pub fn whole_chip(name: &str, stream: Stream, run_number: &str, chip: u32) -> Defect {
        Self::build(name, stream, run_number, json!({ keys::CHIP_IN_HISTO: chip }))
    }

    fn build(name: &str, stream: Stream, run_number: &str, addressing: Value) -> Defect {
        let mut properties = Map::new();
        properties.insert(keys::CHIP_BANK.to_string(), json!(stream.as_str()));
        properties.insert(keys::RUN_NUMBER.to_string(), json!(run_number));
        if let Value::Object(fields) = addressing {
            properties.extend(fields);
        }
        Self::from_properties(name.to_string(), properties)
    }

    /// Raw properties as uploaded
    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    /// Whether the defect belongs to the stream and bare run number
    pub fn matches(&self, stream: Stream, run_number: &str) -> bool {
        stream.matches_bank(&self.chip_bank) && self.run_number == run_number
    }

    /// Whether the defect belongs to the stream
    pub fn in_stream(&self, stream: Stream) -> bool {
        stream.matches_bank(&self.chip_bank)
    }

    /// Chips marked by this defect, preferring the explicit chip index
    pub fn affected_chips(&self) -> RangeInclusive<u32> {
        match self.chip {
            Some(chip) => chip..=chip,
            None => self.span.chips(),
        }
    }

    /// Canonical mapping form
    pub fn to_value(&self) -> Value {
        json!({
            "name": self.name,
            "properties": Value::Object(self.properties.clone()),
        })
    }
}
