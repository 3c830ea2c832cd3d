//! tcqc - thermal-cycling quality control for detector modules
//!
//! Classifies the test runs uploaded for a module's thermal-cycling round,
//! tags every scan warm or cold against the round's session catalog and
//! cross-references the runs' defect annotations with their per-channel data.
//!
//! # Quick Start
//!
//! ```ignore
//! use tcqc::{analyze_batch, ingest_batch, QcConfig, RawSource, StdinOperator, TestKind};
//!
//! let report = ingest_batch(paths.into_iter().map(RawSource::Stored));
//! let analysis = analyze_batch(report.runs, &QcConfig::default(), &mut StdinOperator::new())?;
//!
//! for (device, data) in &analysis.devices {
//!     println!("{}: {} pedestal trims", device, data.runs_of(TestKind::PedestalTrim).len());
//! }
//! ```
//!
//! # Architecture
//!
//! [`tcqc_core`] holds the record model and ingestion, [`tcqc_engine`] the
//! hierarchy walk, classification, temperature resolution and defect
//! cross-referencing. Both are re-exported here.

pub use tcqc_core;
pub use tcqc_engine;

pub use tcqc_core::*;
pub use tcqc_engine::*;
