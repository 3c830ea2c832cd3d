//! Core types for tcqc
//!
//! This crate defines the record model every later stage works on:
//! - TestRun: canonical form of one uploaded test run
//! - Defect / ChannelSpan: defect annotations with decoded channel addressing
//! - Stream, TestTypeCode, TestKind, Temperature: identifiers of the data model
//! - PatternTable: ordered substring rules for serials and section names
//! - NoiseThresholds: per-family noise limits
//! - Ingestion: raw record → TestRun
//! - Error: error type shared by all crates

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod defect;
pub mod error;
pub mod fields;
pub mod ingest;
pub mod patterns;
pub mod record;
pub mod thresholds;
pub mod types;

pub use defect::{ChannelSpan, Defect};
pub use error::{Error, Result};
pub use ingest::{ingest_batch, normalize_record, IngestReport, RawSource, Rejection};
pub use patterns::{PatternRule, PatternTable};
pub use record::{
    parse_timestamp, DetInfo, RunProperties, Section, SectionCatalog, TestInfo, TestRun,
};
pub use thresholds::{NoiseThreshold, NoiseThresholds, ThresholdEntry};
pub use types::{
    is_dual_hcc, is_hybrid_serial, is_module_serial, Granularity, Stream, Temperature, TestKind,
    TestTypeCode, CHANNELS_PER_CHIP,
};
