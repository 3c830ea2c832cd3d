//! Defect Cross-Referencing Tests

use crate::common::*;
use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use tcqc::{bare_run_number, partition_scan, ChannelSpan};

const SCAN: &str = "10-1_PEDESTAL_TRIM_HCC";

/// Addressing fields over the whole `u32` range, mostly near the array
fn arb_field() -> impl Strategy<Value = u32> {
    prop_oneof![3 => 0u32..512, 1 => any::<u32>(), 1 => (u32::MAX - 512)..=u32::MAX]
}

fn arb_defect() -> impl Strategy<Value = Defect> {
    let stream = prop_oneof![Just("under"), Just("away")];
    let run_number = prop_oneof![Just("10-1"), Just("10-2")];
    (stream, run_number, 0u8..3, arb_field(), arb_field()).prop_map(|(stream, run_number, mode, a, b)| {
        let addressing = match mode {
            0 => json!({"channel": a}),
            1 => json!({"channel_from": a, "channel_to": b}),
            _ => json!({"chip_in_histo": a}),
        };
        let mut properties = json!({"chip_bank": stream, "runNumber": run_number});
        if let (Some(props), Value::Object(fields)) = (properties.as_object_mut(), addressing) {
            props.extend(fields);
        }
        Defect::from_value(&json!({"name": "DEFECT", "properties": properties}))
    })
}

proptest! {
    #[test]
    fn partition_is_total_and_disjoint(
        width in 1usize..400,
        defects in prop::collection::vec(arb_defect(), 0..6),
    ) {
        let values: Vec<f64> = (0..width).map(|i| i as f64 * 0.5).collect();
        let p = partition_scan(&defects, TestKind::PedestalTrim, Stream::Away, SCAN, &values).unwrap();

        let good: BTreeSet<u32> = p.good_indices.iter().copied().collect();
        let bad: BTreeSet<u32> = p.bad_indices.iter().copied().collect();
        let all: BTreeSet<u32> = (0..width as u32).collect();

        prop_assert_eq!(p.total(), width);
        prop_assert!(good.is_disjoint(&bad));
        prop_assert_eq!(good.union(&bad).copied().collect::<BTreeSet<u32>>(), all);
        prop_assert_eq!(bad.len(), p.bad_indices.len());
        prop_assert_eq!(p.good_values.len(), p.good_indices.len());
        prop_assert_eq!(p.bad_values.len(), p.bad_indices.len());
    }

    #[test]
    fn bad_channels_are_exactly_those_covered(
        defects in prop::collection::vec(arb_defect(), 0..6),
    ) {
        let values = vec![1.0; 256];
        let p = partition_scan(&defects, TestKind::PedestalTrim, Stream::Under, SCAN, &values).unwrap();

        let mut in_range = BTreeSet::new();
        let mut past_end = Vec::new();
        let mut skipped = 0;
        for defect in defects.iter().filter(|d| d.matches(Stream::Under, "10-1")) {
            let channels = defect.span.channels();
            if channels.is_empty() {
                skipped += 1;
                continue;
            }
            let (first, last) = (*channels.start(), *channels.end());
            if first < 256 {
                in_range.extend(first..=last.min(255));
            }
            if last >= 256 {
                past_end.push(first.max(256));
            }
        }

        prop_assert_eq!(p.bad_indices.iter().copied().collect::<BTreeSet<u32>>(), in_range);
        prop_assert_eq!(&p.out_of_range, &past_end);
        prop_assert_eq!(p.skipped_defects, skipped);
        prop_assert_eq!(p.total(), 256);
    }

    #[test]
    fn chip_partition_reports_every_applicable_defect(
        defects in prop::collection::vec(arb_defect(), 0..6),
    ) {
        let scan = "10-1_STROBE_DELAY_HCC";
        let values = vec![30.0, 31.0, 29.0, -1.0];
        let p = partition_scan(&defects, TestKind::StrobeDelay, Stream::Under, scan, &values).unwrap();

        prop_assert_eq!(p.total(), 3);
        prop_assert!(p.bad_indices.iter().all(|i| *i < 3));
        prop_assert!(p.out_of_range.iter().all(|i| *i >= 3));

        let mut skipped = 0;
        for defect in defects.iter().filter(|d| d.matches(Stream::Under, "10-1")) {
            let chips = defect.affected_chips();
            if chips.is_empty() {
                skipped += 1;
                continue;
            }
            let first = *chips.start();
            if first < 3 {
                prop_assert!(p.bad_indices.contains(&first));
            } else {
                prop_assert!(p.out_of_range.contains(&first));
            }
        }
        prop_assert_eq!(p.skipped_defects, skipped);
    }
}

// ============================================================================
// Decoding
// ============================================================================

#[test]
fn range_and_chip_fallback_decode() {
    let range = Defect::from_value(&json!({
        "name": "NOISY",
        "properties": {"chip_bank": "away", "runNumber": "10-1", "channel_from": 10, "channel_to": 12}
    }));
    assert_eq!(range.span.channels().collect::<Vec<u32>>(), vec![10, 11, 12]);

    let chip = Defect::from_value(&chip_defect("BAD_CHIP", "away", "10-1", 2));
    assert_eq!(chip.span, ChannelSpan::WholeChip(2));
    assert_eq!(chip.span.channels(), 256..=383);
}

#[test]
fn huge_addressing_is_skipped_or_out_of_range() {
    let huge_chip = Defect::from_value(&chip_defect("BAD_CHIP", "away", "10-1", 40_000_000));
    assert_eq!(huge_chip.span, ChannelSpan::Unresolved);
    let whole = Defect::range("NOISY", Stream::Away, "10-1", 0, u32::MAX);
    let values = vec![0.0; 128];

    let p = partition_scan(&[huge_chip, whole], TestKind::PedestalTrim, Stream::Away, SCAN, &values).unwrap();

    assert_eq!(p.skipped_defects, 1);
    assert_eq!(p.bad_indices, (0..128).collect::<Vec<u32>>());
    assert_eq!(p.out_of_range, vec![128]);
    assert_eq!(p.total(), 128);
}

#[test]
fn half_range_is_skipped_and_counted() {
    let broken = Defect::from_value(&json!({
        "name": "NOISY",
        "properties": {"chip_bank": "away", "runNumber": "10-1", "channel_from": 10}
    }));
    let values = vec![0.0; 128];
    let p = partition_scan(&[broken], TestKind::PedestalTrim, Stream::Away, SCAN, &values).unwrap();
    assert_eq!(p.skipped_defects, 1);
    assert!(!p.has_defects());
    assert_eq!(p.good_indices.len(), 128);
}

#[test]
fn strobe_delay_partitions_chips() {
    let scan = "10-2_STROBE_DELAY_HCC";
    assert_eq!(bare_run_number(scan, TestKind::StrobeDelay), Some("10-2"));

    let values = vec![31.0, 29.0, 30.0, -1.0, -1.0];
    let defects = vec![
        Defect::whole_chip("BAD_CHIP", Stream::Away, "10-2", 1),
        Defect::whole_chip("BAD_CHIP", Stream::Away, "10-2", 3),
    ];
    let p = partition_scan(&defects, TestKind::StrobeDelay, Stream::Away, scan, &values).unwrap();

    assert_eq!(p.bad_indices, vec![1]);
    assert_eq!(p.bad_values, vec![29.0]);
    assert_eq!(p.good_indices, vec![0, 2]);
    assert_eq!(p.out_of_range, vec![3]);
    assert_eq!(p.total(), 3);
}

#[test]
fn other_streams_and_runs_do_not_mark() {
    let defects = vec![
        Defect::single("DEAD", Stream::Under, "10-1", 3),
        Defect::single("DEAD", Stream::Away, "10-9", 4),
    ];
    let values = vec![0.0; 8];
    let p = partition_scan(&defects, TestKind::PedestalTrim, Stream::Away, SCAN, &values).unwrap();
    assert!(p.bad_indices.is_empty());
    assert_eq!(p.good_indices.len(), 8);
}
