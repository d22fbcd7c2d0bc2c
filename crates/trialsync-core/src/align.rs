//! Alignment events and per-trial reference times
//!
//! An alignment type names the event a PSTH is locked to, which trial
//! (relative to the one selected by the condition) supplies that event, and
//! the default plotting window. [`ConditionResolver`] combines a condition,
//! an alignment type and an optional extra trial offset into the triple the
//! external PSTH builder needs: reference times, the trial set and the
//! window.
//!
//! Sessions recorded without lickport motor feedback (`zaberready`) cannot
//! mark trial start that way; for them every alignment name containing
//! `trial_start` is rewritten to its `_bitcode` variant by
//! [`bitcode_fallback`].

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

use crate::condition::{select_trials, shift_trials, ConditionRequest, SelectedTrial, TrialCondition};
use crate::error::{ConfigError, EngineResult};
use crate::session::{RecordedUnit, SessionRecords};
use crate::types::TrialEventType;

/// Suffix appended by the bitcode fallback
pub const BITCODE_SUFFIX: &str = "_bitcode";

/// Substring that marks an alignment name as a trial-start alignment
pub const TRIAL_START_MARKER: &str = "trial_start";

// ============================================================================
// Alignment Table
// ============================================================================

/// Event an alignment type locks to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignEvent {
    /// A logged trial event
    Event(TrialEventType),
    /// The first lick after a logged trial event
    FirstLickAfter(TrialEventType),
}

/// One row of the alignment table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlignType {
    /// Alignment name, e.g. `go_cue`
    pub name: String,
    /// Event locked to
    pub event: AlignEvent,
    /// Trial supplying the event, relative to the condition's trial
    pub trial_offset: i32,
    /// Seconds added to the event time
    pub time_offset: f64,
    /// Default plotting window (seconds around the event)
    pub window: (f64, f64),
}

impl AlignType {
    fn new(name: &str, event: AlignEvent, trial_offset: i32, window: (f64, f64)) -> Self {
        Self { name: name.into(), event, trial_offset, time_offset: 0.0, window }
    }

    /// Whether this type locks to the bitcode onset
    #[must_use]
    pub fn is_bitcode(&self) -> bool {
        matches!(self.event, AlignEvent::Event(TrialEventType::BitcodeStart))
    }
}

/// The set of alignment types a resolver accepts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlignmentTable {
    types: Vec<AlignType>,
}

impl AlignmentTable {
    /// Standard foraging alignment types
    #[must_use]
    pub fn standard() -> Self {
        use AlignEvent::{Event, FirstLickAfter};
        use TrialEventType::{BitcodeStart, Go, TrialEnd, ZaberReady};

        Self {
            types: vec![
                AlignType::new("trial_start", Event(ZaberReady), 0, (-3.0, 2.0)),
                AlignType::new("go_cue", Event(Go), 0, (-2.0, 3.0)),
                AlignType::new("first_lick_after_go_cue", FirstLickAfter(Go), 0, (-2.0, 3.0)),
                AlignType::new("iti_start", Event(TrialEnd), 0, (-3.0, 2.0)),
                AlignType::new("next_trial_start", Event(ZaberReady), 1, (-3.0, 2.0)),
                AlignType::new("trial_start_bitcode", Event(BitcodeStart), 0, (-3.0, 2.0)),
                AlignType::new("next_trial_start_bitcode", Event(BitcodeStart), 1, (-3.0, 2.0)),
            ],
        }
    }

    /// Add a fixed correction (seconds) to every bitcode-locked type.
    ///
    /// The bitcode onset lags the true trial start by a rig-specific amount.
    #[must_use]
    pub fn with_bitcode_correction(mut self, seconds: f64) -> Self {
        for t in self.types.iter_mut().filter(|t| t.is_bitcode()) {
            t.time_offset += seconds;
        }
        self
    }

    /// Add or replace an alignment type
    pub fn insert(&mut self, align_type: AlignType) {
        match self.types.iter_mut().find(|t| t.name == align_type.name) {
            Some(existing) => *existing = align_type,
            None => self.types.push(align_type),
        }
    }

    /// Look up an alignment type by name
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownAlignment`] for names not in the table.
    pub fn lookup(&self, name: &str) -> Result<&AlignType, ConfigError> {
        self.types
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| ConfigError::UnknownAlignment { name: name.into() })
    }

    /// All alignment types
    #[must_use]
    pub fn types(&self) -> &[AlignType] {
        &self.types
    }
}

impl Default for AlignmentTable {
    fn default() -> Self {
        Self::standard()
    }
}

// ============================================================================
// Bitcode Fallback Policy
// ============================================================================

/// Rewrite one alignment name for a session without zaber feedback.
///
/// Substring match on `trial_start`, suffix append of `_bitcode`; nothing
/// else is inspected.
#[must_use]
pub fn bitcode_fallback_name(name: &str, has_zaber_feedback: bool) -> String {
    if !has_zaber_feedback && name.contains(TRIAL_START_MARKER) {
        alloc::format!("{name}{BITCODE_SUFFIX}")
    } else {
        name.into()
    }
}

/// Apply [`bitcode_fallback_name`] to a whole list of alignment names.
#[must_use]
pub fn bitcode_fallback<S: AsRef<str>>(names: &[S], has_zaber_feedback: bool) -> Vec<String> {
    names
        .iter()
        .map(|n| bitcode_fallback_name(n.as_ref(), has_zaber_feedback))
        .collect()
}

// ============================================================================
// Resolution Output
// ============================================================================

/// Reference time of one selected trial.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrialReference {
    /// Trial that satisfied the condition
    pub source_trial: u16,
    /// Trial whose event supplies the time
    pub trial: u16,
    /// Seconds from the start of `trial`
    pub time: f64,
}

/// Everything an external PSTH builder needs for one request.
///
/// `trials` is the full set used for rate estimation; `references` only
/// holds trials that have the alignment event and is what a raster draws.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlignedTrials {
    /// Alignment type actually used (after fallback)
    pub align_type: String,
    /// Effective trial offset
    pub trial_offset: i32,
    /// Default plotting window
    pub window: (f64, f64),
    /// All selected trials
    pub trials: Vec<SelectedTrial>,
    /// Trials with a valid reference time
    pub references: Vec<TrialReference>,
}

impl AlignedTrials {
    /// True when no trial matched; an answer, not an error
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    /// Selected trials without the alignment event
    #[must_use]
    pub fn missing_reference(&self) -> usize {
        self.trials.len() - self.references.len()
    }
}

/// Median time of one alignment event relative to another over a set of
/// trials, used as a vertical marker on PSTH figures.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventMarker {
    /// Alignment type of the marked event
    pub align_type: String,
    /// Median seconds relative to the aligned event
    pub time: f64,
}

// ============================================================================
// Condition Resolver
// ============================================================================

/// Resolves condition + alignment requests for one unit.
#[derive(Debug)]
pub struct ConditionResolver<'a> {
    records: &'a SessionRecords,
    unit: &'a RecordedUnit,
    table: &'a AlignmentTable,
    has_zaber_feedback: bool,
}

impl<'a> ConditionResolver<'a> {
    /// Create a resolver; zaber feedback is checked once here.
    #[must_use]
    pub fn new(records: &'a SessionRecords, unit: &'a RecordedUnit, table: &'a AlignmentTable) -> Self {
        let has_zaber_feedback = records.has_event_type(TrialEventType::ZaberReady);
        Self { records, unit, table, has_zaber_feedback }
    }

    /// Whether trial-start alignments fall back to bitcode onsets
    #[must_use]
    pub fn uses_bitcode_fallback(&self) -> bool {
        !self.has_zaber_feedback
    }

    /// Requested alignment names after the fallback policy
    #[must_use]
    pub fn align_names<S: AsRef<str>>(&self, requested: &[S]) -> Vec<String> {
        bitcode_fallback(requested, self.has_zaber_feedback)
    }

    /// Alignment type for a requested name, after the fallback policy
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownAlignment`] if the rewritten name is
    /// not in the table.
    pub fn align_type(&self, requested: &str) -> EngineResult<&'a AlignType> {
        let name = bitcode_fallback_name(requested, self.has_zaber_feedback);
        Ok(self.table.lookup(&name)?)
    }

    /// Resolve a hemisphere-relative condition aligned to `align`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownAlignment`] for unknown alignment names.
    pub fn resolve(
        &self,
        request: ConditionRequest,
        align: &str,
        extra_offset: i32,
    ) -> EngineResult<AlignedTrials> {
        self.resolve_condition(request.resolve(self.unit.hemisphere), align, extra_offset)
    }

    /// Resolve a condition given by table name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownCondition`] or
    /// [`ConfigError::UnknownAlignment`] for unknown names.
    pub fn resolve_named(&self, condition: &str, align: &str, extra_offset: i32) -> EngineResult<AlignedTrials> {
        let condition = TrialCondition::lookup(condition)?;
        self.resolve_condition(condition, align, extra_offset)
    }

    /// Resolve an absolute condition aligned to `align`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownAlignment`] for unknown alignment names.
    pub fn resolve_condition(
        &self,
        condition: TrialCondition,
        align: &str,
        extra_offset: i32,
    ) -> EngineResult<AlignedTrials> {
        let align_type = self.align_type(align)?;
        let offset = align_type.trial_offset + extra_offset;
        let trials = select_trials(self.records, condition, offset, self.unit);
        Ok(self.attach_references(align_type, offset, trials))
    }

    /// Resolve an explicit list of source trials (e.g. one latent-variable
    /// quantile group) aligned to `align`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownAlignment`] for unknown alignment names.
    pub fn resolve_trials<I>(&self, source_trials: I, align: &str, extra_offset: i32) -> EngineResult<AlignedTrials>
    where
        I: IntoIterator<Item = u16>,
    {
        let align_type = self.align_type(align)?;
        let offset = align_type.trial_offset + extra_offset;
        let trials = shift_trials(source_trials, offset, self.unit);
        Ok(self.attach_references(align_type, offset, trials))
    }

    /// Event time of `align_type` in `trial`, seconds from trial start
    #[must_use]
    pub fn reference_time(&self, trial: u16, align_type: &AlignType) -> Option<f64> {
        let time = match align_type.event {
            AlignEvent::Event(event) => self.records.event_time(trial, event),
            AlignEvent::FirstLickAfter(event) => self.records.first_lick_after(trial, event),
        }?;
        Some(time + align_type.time_offset)
    }

    /// Median times of the `markers` events relative to `align_to` over
    /// `source_trials`.
    ///
    /// Both names go through the fallback policy. Markers with no trial
    /// carrying both events are omitted.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownAlignment`] for unknown alignment names.
    pub fn event_markers<S: AsRef<str>>(
        &self,
        markers: &[S],
        align_to: &str,
        source_trials: &[u16],
    ) -> EngineResult<Vec<EventMarker>> {
        let anchor = self.align_type(align_to)?;
        let mut out = Vec::with_capacity(markers.len());

        for name in markers {
            let marker = self.align_type(name.as_ref())?;
            let mut deltas: Vec<f64> = source_trials
                .iter()
                .filter_map(|&t| {
                    let at = self.session_time(t, marker)?;
                    let anchor_at = self.session_time(t, anchor)?;
                    Some(at - anchor_at)
                })
                .collect();

            if let Some(time) = median(&mut deltas) {
                out.push(EventMarker { align_type: marker.name.clone(), time });
            }
        }

        Ok(out)
    }

    /// Seconds from session start of `align_type`'s event for the trial
    /// `source_trial + trial_offset`
    fn session_time(&self, source_trial: u16, align_type: &AlignType) -> Option<f64> {
        let trial = u16::try_from(i32::from(source_trial) + align_type.trial_offset).ok()?;
        let start = self.records.trials.iter().find(|t| t.trial == trial)?.start_time;
        Some(start + self.reference_time(trial, align_type)?)
    }

    fn attach_references(&self, align_type: &AlignType, offset: i32, trials: Vec<SelectedTrial>) -> AlignedTrials {
        let references = trials
            .iter()
            .filter_map(|s| {
                self.reference_time(s.trial, align_type).map(|time| TrialReference {
                    source_trial: s.source_trial,
                    trial: s.trial,
                    time,
                })
            })
            .collect();

        AlignedTrials {
            align_type: align_type.name.clone(),
            trial_offset: offset,
            window: align_type.window,
            trials,
            references,
        }
    }
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::tests::unit;
    use crate::condition::{OutcomeFilter, RelativePort};
    use crate::error::EngineError;
    use crate::session::tests::{behavior, event, records};
    use crate::types::{EarlyLick, Hemisphere, Outcome, WaterPort};

    fn foraging_session(with_zaber: bool) -> SessionRecords {
        let mut recs = records(6);
        recs.behavior = vec![
            behavior(1, WaterPort::Left, Outcome::Hit, EarlyLick::NoEarly),
            behavior(2, WaterPort::Right, Outcome::Hit, EarlyLick::NoEarly),
            behavior(3, WaterPort::Left, Outcome::Miss, EarlyLick::NoEarly),
            behavior(4, WaterPort::Left, Outcome::Hit, EarlyLick::Early),
            behavior(5, WaterPort::Right, Outcome::Miss, EarlyLick::NoEarly),
            behavior(6, WaterPort::Left, Outcome::Hit, EarlyLick::NoEarly),
        ];
        for t in 1..=6 {
            recs.events.push(event(t, 1, TrialEventType::BitcodeStart, 0.05));
            recs.events.push(event(t, 3, TrialEventType::Go, 2.0));
            recs.events.push(event(t, 4, TrialEventType::TrialEnd, 5.0));
            if with_zaber {
                recs.events.push(event(t, 2, TrialEventType::ZaberReady, 0.1));
            }
        }
        // trial 6 lost its go cue
        recs.events.retain(|e| !(e.trial == 6 && e.event_type == TrialEventType::Go));
        recs
    }

    #[test]
    fn test_fallback_policy() {
        let requested = ["trial_start", "go_cue", "first_lick_after_go_cue", "iti_start", "next_trial_start"];
        assert_eq!(
            bitcode_fallback(&requested, false),
            vec![
                "trial_start_bitcode",
                "go_cue",
                "first_lick_after_go_cue",
                "iti_start",
                "next_trial_start_bitcode",
            ]
        );
        assert_eq!(bitcode_fallback(&requested, true), requested.to_vec());
    }

    #[test]
    fn test_fallback_is_pure_substring_rule() {
        // no reinterpretation: an already-suffixed name is suffixed again
        assert_eq!(bitcode_fallback_name("trial_start_bitcode", false), "trial_start_bitcode_bitcode");
        assert_eq!(bitcode_fallback_name("my_trial_start_custom", false), "my_trial_start_custom_bitcode");
    }

    #[test]
    fn test_resolver_uses_bitcode_without_zaber() {
        let recs = foraging_session(false);
        let u = unit(1..=6, Hemisphere::Left);
        let table = AlignmentTable::standard();
        let resolver = ConditionResolver::new(&recs, &u, &table);
        assert!(resolver.uses_bitcode_fallback());

        let request = ConditionRequest::new(RelativePort::Ipsi, OutcomeFilter::Hit, false);
        let aligned = resolver.resolve(request, "trial_start", 0).unwrap();
        assert_eq!(aligned.align_type, "trial_start_bitcode");
        assert!(aligned.references.iter().all(|r| (r.time - 0.05).abs() < 1e-12));
    }

    #[test]
    fn test_resolver_keeps_names_with_zaber() {
        let recs = foraging_session(true);
        let u = unit(1..=6, Hemisphere::Left);
        let table = AlignmentTable::standard();
        let resolver = ConditionResolver::new(&recs, &u, &table);
        assert!(!resolver.uses_bitcode_fallback());
        assert_eq!(resolver.align_names(&["trial_start"]), vec!["trial_start"]);

        let request = ConditionRequest::new(RelativePort::Ipsi, OutcomeFilter::Hit, false);
        let aligned = resolver.resolve(request, "trial_start", 0).unwrap();
        assert_eq!(aligned.align_type, "trial_start");
        assert_eq!(aligned.trials.len(), 3); // trials 1, 4, 6
        assert!(aligned.references.iter().all(|r| (r.time - 0.1).abs() < 1e-12));
    }

    #[test]
    fn test_missing_event_drops_reference_not_trial() {
        let recs = foraging_session(true);
        let u = unit(1..=6, Hemisphere::Left);
        let table = AlignmentTable::standard();
        let resolver = ConditionResolver::new(&recs, &u, &table);

        let request = ConditionRequest::new(RelativePort::Ipsi, OutcomeFilter::Hit, false);
        let aligned = resolver.resolve(request, "go_cue", 0).unwrap();
        assert_eq!(aligned.trials.len(), 3);
        assert_eq!(aligned.references.len(), 2);
        assert_eq!(aligned.missing_reference(), 1);
        assert_eq!(aligned.window, (-2.0, 3.0));
    }

    #[test]
    fn test_next_trial_alignment_shifts_by_one() {
        let recs = foraging_session(true);
        let u = unit(1..=6, Hemisphere::Right);
        let table = AlignmentTable::standard();
        let resolver = ConditionResolver::new(&recs, &u, &table);

        let aligned = resolver.resolve_named("R_hit", "next_trial_start", 0).unwrap();
        assert_eq!(aligned.trial_offset, 1);
        assert_eq!(aligned.trials, vec![SelectedTrial { source_trial: 2, trial: 3 }]);
    }

    #[test]
    fn test_unknown_names_are_config_errors() {
        let recs = foraging_session(true);
        let u = unit(1..=6, Hemisphere::Right);
        let table = AlignmentTable::standard();
        let resolver = ConditionResolver::new(&recs, &u, &table);

        assert!(matches!(
            resolver.resolve_named("R_hit", "reward_delivery", 0),
            Err(EngineError::Config(ConfigError::UnknownAlignment { .. }))
        ));
        assert!(matches!(
            resolver.resolve_named("X_hit", "go_cue", 0),
            Err(EngineError::Config(ConfigError::UnknownCondition { .. }))
        ));
    }

    #[test]
    fn test_zero_matches_is_empty_not_error() {
        let recs = foraging_session(true);
        let u = unit(1..=6, Hemisphere::Right);
        let table = AlignmentTable::standard();
        let resolver = ConditionResolver::new(&recs, &u, &table);

        let aligned = resolver.resolve_named("LR_ignore", "go_cue", 0).unwrap();
        assert!(aligned.is_empty());
    }

    #[test]
    fn test_bitcode_correction() {
        let table = AlignmentTable::standard().with_bitcode_correction(-0.1);
        assert_eq!(table.lookup("trial_start_bitcode").map(|t| t.time_offset), Ok(-0.1));
        assert_eq!(table.lookup("trial_start").map(|t| t.time_offset), Ok(0.0));
    }

    #[test]
    fn test_first_lick_alignment() {
        let mut recs = foraging_session(true);
        recs.actions.push(crate::session::ActionEvent {
            trial: 1,
            action_event_id: 1,
            side: crate::types::LickSide::Left,
            time: 2.25,
        });
        let u = unit(1..=6, Hemisphere::Left);
        let table = AlignmentTable::standard();
        let resolver = ConditionResolver::new(&recs, &u, &table);

        let aligned = resolver.resolve_named("L_hit", "first_lick_after_go_cue", 0).unwrap();
        assert_eq!(aligned.references.len(), 1);
        assert!((aligned.references[0].time - 2.25).abs() < 1e-12);
    }

    #[test]
    fn test_event_markers_relative_to_go() {
        let recs = foraging_session(true);
        let u = unit(1..=6, Hemisphere::Left);
        let table = AlignmentTable::standard();
        let resolver = ConditionResolver::new(&recs, &u, &table);

        let markers = resolver
            .event_markers(&["trial_start", "iti_start", "next_trial_start"], "go_cue", &[1, 2, 3])
            .unwrap();
        assert_eq!(markers.len(), 3);
        assert!((markers[0].time - (0.1 - 2.0)).abs() < 1e-9);
        assert!((markers[1].time - 3.0).abs() < 1e-9);
        // next trial starts 10 s after this one in the fixture
        assert!((markers[2].time - (10.0 + 0.1 - 2.0)).abs() < 1e-9);
    }

    #[test]
    fn test_median() {
        let mut empty: [f64; 0] = [];
        assert_eq!(median(&mut empty), None);
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&mut [4.0, 1.0, 2.0, 3.0]), Some(2.5));
    }
}
