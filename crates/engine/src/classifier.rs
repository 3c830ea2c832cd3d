//! Test classification
//!
//! Runs are bucketed by their declared test-type code. Response curves carry
//! one code for two tests, so they are paired per logical hybrid: the earlier
//! run of a pair is the 3-point gain, the later the 10-point gain.
//!
//! The module-level side of a round is resolved here too: how many runs a
//! single round uploads, which round to keep when a device carries several,
//! and which thermal-cycle summary run belongs to the kept round.

use crate::config::RoundsConfig;
use crate::hierarchy::{Component, RunHeader};
use crate::operator::Operator;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tcqc_core::fields::char_prefix;
use tcqc_core::record::FIT_TYPE_TEN_POINT;
use tcqc_core::{Error, Result, TestKind, TestRun, TestTypeCode};
use tracing::{debug, info, warn};

// ============================================================================
// Run stamps
// ============================================================================

/// Identity and timing fields shared by full runs and run headers
pub trait RunStamp {
    /// Test-run identifier
    fn id(&self) -> &str;
    /// Test timestamp
    fn date(&self) -> &str;
    /// Upload timestamp
    fn uploaded(&self) -> Option<&str>;
    /// Institution code
    fn institution(&self) -> &str;
    /// Run number
    fn run_number(&self) -> &str;
}

impl RunStamp for TestRun {
    fn id(&self) -> &str {
        &self.id
    }
    fn date(&self) -> &str {
        &self.date
    }
    fn uploaded(&self) -> Option<&str> {
        self.uploaded.as_deref()
    }
    fn institution(&self) -> &str {
        &self.institution
    }
    fn run_number(&self) -> &str {
        &self.run_number
    }
}

impl<T: RunStamp> RunStamp for &T {
    fn id(&self) -> &str {
        (**self).id()
    }
    fn date(&self) -> &str {
        (**self).date()
    }
    fn uploaded(&self) -> Option<&str> {
        (**self).uploaded()
    }
    fn institution(&self) -> &str {
        (**self).institution()
    }
    fn run_number(&self) -> &str {
        (**self).run_number()
    }
}

impl RunStamp for RunHeader {
    fn id(&self) -> &str {
        &self.id
    }
    fn date(&self) -> &str {
        &self.date
    }
    fn uploaded(&self) -> Option<&str> {
        self.uploaded.as_deref()
    }
    fn institution(&self) -> &str {
        &self.institution
    }
    fn run_number(&self) -> &str {
        &self.run_number
    }
}

// ============================================================================
// Response-curve pairing
// ============================================================================

/// Pairing state of one logical hybrid
#[derive(Debug, Clone, PartialEq)]
pub enum PairState {
    /// No run waiting
    Empty,
    /// One run waiting for its sibling
    Pending(TestRun),
}

/// A 3-point/10-point pair of one logical hybrid
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseCurvePair {
    /// Earlier run
    pub three_point: TestRun,
    /// Later run
    pub ten_point: TestRun,
}

/// Pairs response-curve runs per logical hybrid
///
/// Feed runs in chronological order for order-independent results; with equal
/// timestamps the run already pending counts as the earlier one.
#[derive(Debug, Default)]
pub struct ResponseCurvePairer {
    states: HashMap<String, PairState>,
    order: Vec<String>,
}

impl ResponseCurvePairer {
    /// Pairer with no pending runs
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a run; emits a pair when it completes one
    pub fn push(&mut self, run: TestRun) -> Option<ResponseCurvePair> {
        let key = run.component.clone();
        if !self.states.contains_key(&key) {
            self.order.push(key.clone());
        }
        let state = self.states.entry(key.clone()).or_insert(PairState::Empty);
        match std::mem::replace(state, PairState::Empty) {
            PairState::Empty => {
                *state = PairState::Pending(run);
                None
            }
            PairState::Pending(pending) => {
                let pair = if run.chronological_cmp(&pending).is_lt() {
                    ResponseCurvePair {
                        three_point: run,
                        ten_point: pending,
                    }
                } else {
                    ResponseCurvePair {
                        three_point: pending,
                        ten_point: run,
                    }
                };
                debug!(
                    target: "tcqc::classifier",
                    hybrid = %key,
                    three_point = %pair.three_point.id,
                    ten_point = %pair.ten_point.id,
                    "Paired response curves"
                );
                Some(pair)
            }
        }
    }

    /// State of one logical hybrid
    pub fn state(&self, hybrid: &str) -> Option<&PairState> {
        self.states.get(hybrid)
    }

    /// Runs still waiting for a sibling, in first-seen hybrid order
    pub fn finish(mut self) -> Vec<TestRun> {
        self.order
            .iter()
            .filter_map(|key| match self.states.remove(key) {
                Some(PairState::Pending(run)) => Some(run),
                _ => None,
            })
            .collect()
    }
}

/// Kind of a response curve without a sibling
///
/// Falls back to the fit-type discriminator; without one the run is a 3-point
/// gain, the first response curve of a round.
pub fn unpaired_kind(run: &TestRun) -> TestKind {
    match run.properties.fit_type_code {
        Some(FIT_TYPE_TEN_POINT) => TestKind::TenPointGain,
        _ => TestKind::ThreePointGain,
    }
}

// ============================================================================
// Classification
// ============================================================================

/// Runs bucketed by kind
#[derive(Debug, Clone, Default, Serialize)]
pub struct Classification {
    /// One bucket per kind, every kind present
    pub buckets: BTreeMap<TestKind, Vec<TestRun>>,
    /// Ids of response curves classified without a sibling
    pub unpaired: Vec<String>,
}

impl Classification {
    /// Runs of one kind
    pub fn runs(&self, kind: TestKind) -> &[TestRun] {
        self.buckets.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total runs over all buckets
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// Whether every bucket is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sort runs into one bucket per kind
///
/// Every run lands in exactly one bucket. Response curves are paired per
/// logical hybrid in chronological order.
pub fn classify_runs(runs: Vec<TestRun>) -> Classification {
    let mut classification = Classification {
        buckets: TestKind::ALL.iter().map(|k| (*k, Vec::new())).collect(),
        unpaired: Vec::new(),
    };

    let mut response_curves = Vec::new();
    for run in runs {
        match run.test_type.direct_kind() {
            Some(kind) => classification.buckets.entry(kind).or_default().push(run),
            None => response_curves.push(run),
        }
    }

    response_curves.sort_by(|a, b| a.chronological_cmp(b).then_with(|| a.id.cmp(&b.id)));
    let mut pairer = ResponseCurvePairer::new();
    for run in response_curves {
        if let Some(pair) = pairer.push(run) {
            classification
                .buckets
                .entry(TestKind::ThreePointGain)
                .or_default()
                .push(pair.three_point);
            classification
                .buckets
                .entry(TestKind::TenPointGain)
                .or_default()
                .push(pair.ten_point);
        }
    }
    for run in pairer.finish() {
        let kind = unpaired_kind(&run);
        warn!(
            target: "tcqc::classifier",
            run = %run.id,
            hybrid = %run.component,
            kind = %kind,
            "Response curve has no sibling"
        );
        classification.unpaired.push(run.id.clone());
        classification.buckets.entry(kind).or_default().push(run);
    }

    debug!(target: "tcqc::classifier", runs = classification.len(), "Classified runs");
    classification
}

// ============================================================================
// Rounds
// ============================================================================

/// Runs listed for one module and its hybrids
#[derive(Debug, Clone, PartialEq)]
pub struct RoundCandidates<R> {
    /// Electrical test runs
    pub electrical: Vec<R>,
    /// Thermal-cycle summary runs
    pub summaries: Vec<R>,
}

impl<R> RoundCandidates<R> {
    /// Total listed runs
    pub fn len(&self) -> usize {
        self.electrical.len() + self.summaries.len()
    }

    /// Whether nothing is listed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Collect the thermal-cycling run headers of the hybrids and the module
pub fn collect_round(module: &Component, hybrids: &[Component]) -> RoundCandidates<RunHeader> {
    let mut candidates = RoundCandidates {
        electrical: Vec::new(),
        summaries: Vec::new(),
    };
    for component in hybrids.iter().chain(std::iter::once(module)) {
        for (code, header) in component.thermal_cycling_runs() {
            if code == TestTypeCode::ThermalCycle.as_str() {
                candidates.summaries.push(header.clone());
            } else {
                candidates.electrical.push(header.clone());
            }
        }
    }
    debug!(
        target: "tcqc::classifier",
        module = %module.serial,
        electrical = candidates.electrical.len(),
        summaries = candidates.summaries.len(),
        "Collected round candidates"
    );
    candidates
}

/// Runs a single thermal-cycling round uploads for a module
pub fn expected_run_count(module_serial: &str, hybrid_count: usize, rounds: &RoundsConfig) -> usize {
    let hybrids = if module_serial.contains(&rounds.reduced_family_marker) {
        rounds.reduced_family_hybrids
    } else {
        hybrid_count
    };
    rounds.baseline + rounds.runs_per_hybrid * hybrids
}

/// Keep the electrical runs of one round
///
/// Below the expected count every run is kept. Above it the operator names
/// the institution and (part of) the run number; a blank answer keeps
/// nothing.
pub fn select_round<R: RunStamp>(
    candidates: RoundCandidates<R>,
    expected: usize,
    operator: &mut dyn Operator,
) -> RoundCandidates<R> {
    if candidates.len() <= expected {
        return candidates;
    }

    info!(
        target: "tcqc::classifier",
        runs = candidates.len(),
        expected,
        "Multiple thermal-cycling rounds found"
    );
    let institution = operator.ask("Institute code tests were run at (e.g. UBC):");
    let run_number = operator.ask("ITSDAQ runNumber(s):");

    let RoundCandidates {
        electrical,
        summaries,
    } = candidates;
    let electrical = match (institution, run_number) {
        (Some(institution), Some(run_number)) => electrical
            .into_iter()
            .filter(|r| r.institution() == institution && r.run_number().contains(&run_number))
            .collect(),
        _ => {
            warn!(target: "tcqc::classifier", "No round selected");
            Vec::new()
        }
    };
    RoundCandidates {
        electrical,
        summaries,
    }
}

/// Pick the summary run belonging to the electrical runs
///
/// Summary runs are numbered by a separate clock, so they are matched by date
/// (test or upload) and institution. A unique match is authoritative; several
/// matches are settled by asking for the summary run number; none is
/// unresolved.
pub fn resolve_summary_run<'a, S, E>(
    summaries: &'a [S],
    electrical: &[E],
    operator: &mut dyn Operator,
) -> Result<&'a S>
where
    S: RunStamp,
    E: RunStamp,
{
    let dates: Vec<&str> = electrical.iter().map(|r| char_prefix(r.date(), 10)).collect();
    let uploads: Vec<&str> = electrical
        .iter()
        .filter_map(|r| r.uploaded())
        .map(|u| char_prefix(u, 10))
        .collect();
    let institutions: Vec<&str> = electrical.iter().map(|r| r.institution()).collect();

    let matches: Vec<&S> = summaries
        .iter()
        .filter(|s| {
            let date_match = dates.contains(&char_prefix(s.date(), 10))
                || s.uploaded()
                    .map(|u| uploads.contains(&char_prefix(u, 10)))
                    .unwrap_or(false);
            date_match && institutions.contains(&s.institution())
        })
        .collect();

    match matches.as_slice() {
        [] => {
            warn!(target: "tcqc::classifier", candidates = summaries.len(), "No thermal-cycle summary run matches");
            Err(Error::Unresolved("thermal-cycle summary run".to_string()))
        }
        [only] => {
            info!(target: "tcqc::classifier", run = %only.id(), "Resolved thermal-cycle summary run");
            Ok(*only)
        }
        several => {
            warn!(
                target: "tcqc::classifier",
                candidates = several.len(),
                "Multiple thermal-cycle summary runs on the same dates from the same institution"
            );
            let answer = operator
                .ask("ColdJig runNumber:")
                .ok_or_else(|| Error::Unresolved("thermal-cycle summary run".to_string()))?;
            several
                .iter()
                .find(|s| s.run_number() == answer)
                .copied()
                .ok_or_else(|| Error::Unresolved(format!("summary run with runNumber {}", answer)))
        }
    }
}
