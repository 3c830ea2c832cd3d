//! Temperature Tests
//!
//! Warm/cold tagging of scans against a session catalog.

use crate::common::*;
use proptest::prelude::*;
use tcqc::{Section, SectionCatalog, SectionClass, TemperatureMode, TemperatureResolver};

const NAMES: [&str; 6] = [
    "TC_WARM_TEST",
    "TC_COLD_TEST",
    "COOLDOWN",
    "WARMUP",
    "POST_TC_IV",
    "MYSTERY",
];

fn catalog_with_trailing(offset: f64) -> SectionCatalog {
    SectionCatalog::from_sections(vec![
        Section::new("1_COOLDOWN", 0.0, 500.0, &[]),
        Section::new("2_TC_COLD_TEST_0", 510.0, 600.0, &["a"]),
        Section::new("3_COOLDOWN", 700.0, 1000.0, &[]),
        Section::new("4_MODULE_IV_AMAC", 1000.0 + offset, 1200.0, &["iv"]),
    ])
}

// ============================================================================
// Last cold test
// ============================================================================

#[test]
fn trailing_section_within_window_is_cold() {
    let resolver = TemperatureResolver::from_config(&catalog_with_trailing(99.0), &QcConfig::default()).unwrap();
    assert_eq!(resolver.classify_section("4_MODULE_IV_AMAC").unwrap(), SectionClass::LastCold);
    assert_eq!(resolver.scan_temperature("iv").unwrap(), Temperature::Cold);
}

#[test]
fn trailing_section_at_window_is_warm() {
    let resolver = TemperatureResolver::from_config(&catalog_with_trailing(100.0), &QcConfig::default()).unwrap();
    assert_eq!(resolver.classify_section("4_MODULE_IV_AMAC").unwrap(), SectionClass::Unrecognized);
    assert_eq!(resolver.scan_temperature("iv").unwrap(), Temperature::Warm);
    assert_eq!(resolver.unrecognized_sections(), vec!["4_MODULE_IV_AMAC"]);
    assert!(resolver.section_temperature("4_MODULE_IV_AMAC").is_err());
    assert!(!resolver.sections_at(Temperature::Warm).contains(&"4_MODULE_IV_AMAC"));
}

#[test]
fn window_follows_the_last_cooldown_only() {
    // 30 after the first cooldown, far from the last one
    let catalog = SectionCatalog::from_sections(vec![
        Section::new("1_COOLDOWN", 0.0, 500.0, &[]),
        Section::new("2_MODULE_IV_AMAC", 530.0, 600.0, &["iv"]),
        Section::new("3_COOLDOWN", 700.0, 1000.0, &[]),
    ]);
    let resolver = TemperatureResolver::new(&catalog, TemperatureMode::Lenient, 100.0);
    assert_eq!(resolver.scan_temperature("iv").unwrap(), Temperature::Warm);
}

#[test]
fn strict_mode_leaves_trailing_scan_unresolved() {
    let config = QcConfig {
        temperature_mode: "strict".to_string(),
        ..QcConfig::default()
    };
    let resolver = TemperatureResolver::from_config(&catalog_with_trailing(100.0), &config).unwrap();
    assert!(resolver.scan_temperature("iv").is_err());
    assert!(resolver.section_temperature("4_MODULE_IV_AMAC").is_err());
    assert_eq!(resolver.scan_temperature("a").unwrap(), Temperature::Cold);
}

// ============================================================================
// Partition properties
// ============================================================================

fn arb_catalog() -> impl Strategy<Value = (SectionCatalog, Vec<String>)> {
    let scans: Vec<String> = (0..12).map(|i| format!("{}_SCAN", i)).collect();
    prop::collection::vec((0usize..NAMES.len(), 0.0f64..5000.0, prop::collection::vec(0usize..12, 0..5)), 0..8)
        .prop_map(move |entries| {
            let sections = entries
                .iter()
                .enumerate()
                .map(|(i, (name, start, listed))| {
                    let tests: Vec<&str> = listed.iter().map(|s| scans[*s].as_str()).collect();
                    Section::new(&format!("{}_{}", i, NAMES[*name]), *start, start + 50.0, &tests)
                })
                .collect();
            (SectionCatalog::from_sections(sections), scans.clone())
        })
}

proptest! {
    #[test]
    fn lenient_split_is_total_and_disjoint((catalog, scans) in arb_catalog()) {
        let resolver = TemperatureResolver::new(&catalog, TemperatureMode::Lenient, 100.0);
        let split = resolver.split_scans(&scans);

        prop_assert!(split.unresolved.is_empty());
        prop_assert_eq!(split.warm.len() + split.cold.len(), scans.len());
        for scan in &scans {
            prop_assert!(split.warm.contains(scan) != split.cold.contains(scan));
        }
    }

    #[test]
    fn strict_split_never_overlaps((catalog, scans) in arb_catalog()) {
        let resolver = TemperatureResolver::new(&catalog, TemperatureMode::Strict, 100.0);
        let split = resolver.split_scans(&scans);

        prop_assert_eq!(split.warm.len() + split.cold.len() + split.unresolved.len(), scans.len());
        for scan in &split.cold {
            prop_assert!(!split.warm.contains(scan));
            prop_assert!(!split.unresolved.contains(scan));
        }
    }

    #[test]
    fn unrecognized_sections_have_no_temperature((catalog, _scans) in arb_catalog()) {
        for mode in [TemperatureMode::Lenient, TemperatureMode::Strict] {
            let resolver = TemperatureResolver::new(&catalog, mode, 100.0);
            let warm = resolver.sections_at(Temperature::Warm);
            let cold = resolver.sections_at(Temperature::Cold);
            for name in resolver.unrecognized_sections() {
                prop_assert!(resolver.section_temperature(name).is_err());
                prop_assert!(!warm.contains(&name));
                prop_assert!(!cold.contains(&name));
            }
        }
    }

    #[test]
    fn cold_listing_wins_in_every_mode((catalog, scans) in arb_catalog()) {
        let lenient = TemperatureResolver::new(&catalog, TemperatureMode::Lenient, 100.0);
        let strict = TemperatureResolver::new(&catalog, TemperatureMode::Strict, 100.0);
        prop_assert_eq!(lenient.split_scans(&scans).cold, strict.split_scans(&scans).cold);
    }
}
