//! Batch runs over sessions, units and protocols
//!
//! Every entry point here processes a list of inputs and skips the ones
//! the engine refuses, logging why, so one bad session or unit never
//! aborts a whole report.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use trialsync_core::align::{AlignedTrials, AlignmentTable, ConditionResolver, EventMarker};
use trialsync_core::condition::ConditionRequest;
use trialsync_core::error::EngineResult;
use trialsync_core::latent::LatentVariableTable;
use trialsync_core::period::{Period, PeriodTable};
use trialsync_core::photostim::{LateralityCache, Photostim, PhotostimBrainRegion};
use trialsync_core::quantile::latent_groups;
use trialsync_core::session::{RecordedUnit, SessionRecords};
use trialsync_core::types::{SessionKey, UnitKey};
use trialsync_native::pipeline::SessionPipeline;
use trialsync_native::regression::{align_period_activity, linear_fit, LinearFit, PeriodActivity};
use trialsync_native::SyncResult;

// ============================================================================
// Laterality
// ============================================================================

/// Target of one photostim protocol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LateralityRow {
    /// Session of the protocol
    pub session: SessionKey,
    /// Protocol number
    pub photo_stim: u16,
    /// Resolved area and side
    pub region: PhotostimBrainRegion,
}

/// Resolve every protocol, skipping those that fail.
pub fn laterality(protocols: &[Photostim]) -> Vec<LateralityRow> {
    let mut cache = LateralityCache::new();
    let mut rows = Vec::with_capacity(protocols.len());

    for protocol in protocols {
        match cache.get_or_resolve(protocol) {
            Ok(region) => rows.push(LateralityRow {
                session: protocol.session,
                photo_stim: protocol.photo_stim,
                region: region.clone(),
            }),
            Err(e) => tracing::warn!(
                "Skipping photostim {} of session {} ({}): {}",
                protocol.photo_stim,
                protocol.session,
                e.kind(),
                e
            ),
        }
    }

    rows
}

// ============================================================================
// Segmentation
// ============================================================================

/// Sample span of one trial segment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentSpan {
    /// Trial number
    pub trial: u16,
    /// First sample
    pub start: u64,
    /// One past the last sample
    pub end: u64,
}

/// Synchronization result of one session, without the sample values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentSummary {
    /// Session
    pub session: SessionKey,
    /// Acquisition file
    pub stream_path: Option<PathBuf>,
    /// Acquisition sample rate
    pub sample_rate: f64,
    /// Trial start times on the acquisition clock (s)
    pub trial_start_times: Vec<f64>,
    /// Segment spans in trial order
    pub segments: Vec<SegmentSpan>,
}

/// Segment every session, skipping those that fail.
pub fn segment(pipeline: &SessionPipeline, sessions: &[SessionRecords]) -> Vec<SegmentSummary> {
    let mut out = Vec::with_capacity(sessions.len());

    for records in sessions {
        match pipeline.segment_session(records) {
            Ok(result) => out.push(SegmentSummary {
                session: result.session,
                stream_path: result.stream_path,
                sample_rate: result.starts.sample_rate,
                trial_start_times: result.starts.times(),
                segments: result
                    .segments
                    .iter()
                    .map(|s| SegmentSpan { trial: s.trial, start: s.start, end: s.end })
                    .collect(),
            }),
            Err(e) => tracing::warn!("Skipping session {} ({}): {}", records.key(), e.kind(), e),
        }
    }

    tracing::info!("Segmented {}/{} sessions", out.len(), sessions.len());
    out
}

// ============================================================================
// Condition Alignment
// ============================================================================

/// Condition of an alignment request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionSpec {
    /// Entry of the condition table, e.g. `LR_hit_noearlylick`
    Named(String),
    /// Hemisphere-relative condition
    Relative(ConditionRequest),
}

/// One condition + alignment request applied to every unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlignRequest {
    /// Trial condition
    pub condition: ConditionSpec,
    /// Alignment type name
    pub align: String,
    /// Trial offset on top of the alignment type's own
    pub offset: i32,
    /// Alignment types to place median markers for
    pub markers: Vec<String>,
}

/// Alignment result of one unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitAlignment {
    /// Unit
    pub unit: UnitKey,
    /// Whether the `_bitcode` fallback was applied
    pub bitcode_fallback: bool,
    /// Selected trials and reference times
    pub aligned: AlignedTrials,
    /// Median event markers
    pub markers: Vec<EventMarker>,
}

fn align_unit(
    records: &SessionRecords,
    unit: &RecordedUnit,
    table: &AlignmentTable,
    request: &AlignRequest,
) -> EngineResult<UnitAlignment> {
    let resolver = ConditionResolver::new(records, unit, table);
    let aligned = match &request.condition {
        ConditionSpec::Named(name) => resolver.resolve_named(name, &request.align, request.offset)?,
        ConditionSpec::Relative(condition) => resolver.resolve(*condition, &request.align, request.offset)?,
    };
    let source: Vec<u16> = aligned.trials.iter().map(|t| t.source_trial).collect();
    let markers = resolver.event_markers(&request.markers, &request.align, &source)?;

    Ok(UnitAlignment { unit: unit.key.clone(), bitcode_fallback: resolver.uses_bitcode_fallback(), aligned, markers })
}

/// Resolve `request` for every unit, skipping units that fail.
///
/// A unit with no matching trial is reported with an empty trial list.
pub fn align(
    records: &SessionRecords,
    units: &[RecordedUnit],
    table: &AlignmentTable,
    request: &AlignRequest,
) -> Vec<UnitAlignment> {
    units
        .iter()
        .filter_map(|unit| match align_unit(records, unit, table, request) {
            Ok(result) => {
                if result.aligned.is_empty() {
                    tracing::info!("Unit {}: no trials match", unit.key);
                }
                Some(result)
            }
            Err(e) => {
                tracing::warn!("Skipping unit {} ({}): {}", unit.key, e.kind(), e);
                None
            }
        })
        .collect()
}

// ============================================================================
// Latent-Variable Quantiles
// ============================================================================

/// Aligned trials of one quantile group of one unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuantileAlignment {
    /// Unit
    pub unit: UnitKey,
    /// 0-based group, in value order
    pub group: usize,
    /// Value range of the group
    pub range: (f64, f64),
    /// Trials of the group aligned to the requested event
    pub aligned: AlignedTrials,
}

/// Quantile request applied to every unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuantileRequest {
    /// Latent variable name
    pub variable: String,
    /// Group count
    pub groups: usize,
    /// Latent trial to activity trial offset
    pub offset: i32,
    /// Alignment type name
    pub align: String,
}

fn quantile_unit(
    records: &SessionRecords,
    unit: &RecordedUnit,
    table: &AlignmentTable,
    latent: &LatentVariableTable,
    request: &QuantileRequest,
) -> EngineResult<Vec<QuantileAlignment>> {
    let resolver = ConditionResolver::new(records, unit, table);
    // Latent and alignment offsets add up and are intersected with the unit once
    latent_groups(latent, &request.variable, request.groups)?
        .into_iter()
        .map(|g| {
            Ok(QuantileAlignment {
                unit: unit.key.clone(),
                group: g.group,
                range: g.range,
                aligned: resolver.resolve_trials(g.source_trials, &request.align, request.offset)?,
            })
        })
        .collect()
}

/// Group trials of every unit by a latent variable, skipping units that fail.
pub fn quantiles(
    records: &SessionRecords,
    units: &[RecordedUnit],
    table: &AlignmentTable,
    latent: &LatentVariableTable,
    request: &QuantileRequest,
) -> Vec<QuantileAlignment> {
    let mut out = Vec::new();
    for unit in units {
        match quantile_unit(records, unit, table, latent, request) {
            Ok(groups) => out.extend(groups),
            Err(e) => tracing::warn!("Skipping unit {} ({}): {}", unit.key, e.kind(), e),
        }
    }
    out
}

// ============================================================================
// Period Tuning
// ============================================================================

/// Period firing regressed on latent variables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TuningReport {
    /// Period the firing rates were taken over
    pub period: Period,
    /// Trials used
    pub trials: Vec<u16>,
    /// Fit
    pub fit: LinearFit,
}

/// Fit a unit's firing rates in `period` against latent variables.
///
/// `firing` holds the caller's per-trial rates over the named period's
/// window; the period must exist in `periods`.
///
/// # Errors
///
/// Returns unknown-period, unknown-variable and regression errors.
pub fn tuning<S: AsRef<str>>(
    periods: &PeriodTable,
    period: &str,
    latent: &LatentVariableTable,
    firing: &BTreeMap<u16, f64>,
    variables: &[S],
    intercept: bool,
) -> SyncResult<TuningReport> {
    let period = periods.lookup(period)?.clone();
    let PeriodActivity { trials, firing, names, rows } = align_period_activity(latent, variables, firing)?;
    tracing::debug!("Tuning fit over {} trials of the {} period", trials.len(), period.name);
    let fit = linear_fit(&firing, &rows, &names, intercept)?;
    Ok(TuningReport { period, trials, fit })
}
