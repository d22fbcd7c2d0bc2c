//! Trial conditions and the trial-set resolver
//!
//! A condition is a point in the fixed space
//! {port choice} × {outcome} × {early-lick exclusion}. Names such as
//! `L_hit` or `LR_miss_noearlylick` are only accepted if they appear in
//! [`TrialCondition::ALL`]; nothing is assembled from string fragments.
//!
//! Requests are usually phrased relative to the recorded hemisphere
//! (ipsi/contra); [`ConditionRequest::resolve`] turns them into an absolute
//! [`TrialCondition`] once per unit.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::session::{BehaviorTrial, RecordedUnit, SessionRecords};
use crate::types::{Hemisphere, Outcome, WaterPort};

// ============================================================================
// Condition Space
// ============================================================================

/// Which chosen port a condition selects.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortChoice {
    /// Left port (`L`)
    Left,
    /// Right port (`R`)
    Right,
    /// Either the left or the right port (`LR`)
    Either,
}

impl PortChoice {
    const fn tag(self) -> &'static str {
        match self {
            Self::Left => "L",
            Self::Right => "R",
            Self::Either => "LR",
        }
    }

    /// Whether a trial with `port` chosen matches
    #[must_use]
    pub fn matches(self, port: Option<WaterPort>) -> bool {
        match (self, port) {
            (Self::Left, Some(WaterPort::Left)) | (Self::Right, Some(WaterPort::Right)) => true,
            (Self::Either, Some(WaterPort::Left | WaterPort::Right)) => true,
            _ => false,
        }
    }
}

/// Which outcome a condition selects.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeFilter {
    /// Rewarded
    Hit,
    /// Unrewarded
    Miss,
    /// No response
    Ignore,
}

impl OutcomeFilter {
    const fn tag(self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::Ignore => "ignore",
        }
    }

    /// Whether `outcome` matches
    #[must_use]
    pub const fn matches(self, outcome: Outcome) -> bool {
        matches!(
            (self, outcome),
            (Self::Hit, Outcome::Hit) | (Self::Miss, Outcome::Miss) | (Self::Ignore, Outcome::Ignore)
        )
    }
}

/// An absolute trial condition.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TrialCondition {
    /// Chosen port
    pub port: PortChoice,
    /// Outcome
    pub outcome: OutcomeFilter,
    /// Drop trials with any early lick
    pub exclude_early_lick: bool,
}

const fn condition(port: PortChoice, outcome: OutcomeFilter, exclude_early_lick: bool) -> TrialCondition {
    TrialCondition { port, outcome, exclude_early_lick }
}

impl TrialCondition {
    /// Every condition the engine knows.
    pub const ALL: [Self; 18] = [
        condition(PortChoice::Left, OutcomeFilter::Hit, false),
        condition(PortChoice::Left, OutcomeFilter::Miss, false),
        condition(PortChoice::Left, OutcomeFilter::Ignore, false),
        condition(PortChoice::Right, OutcomeFilter::Hit, false),
        condition(PortChoice::Right, OutcomeFilter::Miss, false),
        condition(PortChoice::Right, OutcomeFilter::Ignore, false),
        condition(PortChoice::Either, OutcomeFilter::Hit, false),
        condition(PortChoice::Either, OutcomeFilter::Miss, false),
        condition(PortChoice::Either, OutcomeFilter::Ignore, false),
        condition(PortChoice::Left, OutcomeFilter::Hit, true),
        condition(PortChoice::Left, OutcomeFilter::Miss, true),
        condition(PortChoice::Left, OutcomeFilter::Ignore, true),
        condition(PortChoice::Right, OutcomeFilter::Hit, true),
        condition(PortChoice::Right, OutcomeFilter::Miss, true),
        condition(PortChoice::Right, OutcomeFilter::Ignore, true),
        condition(PortChoice::Either, OutcomeFilter::Hit, true),
        condition(PortChoice::Either, OutcomeFilter::Miss, true),
        condition(PortChoice::Either, OutcomeFilter::Ignore, true),
    ];

    /// Table name, e.g. `R_miss_noearlylick`
    #[must_use]
    pub fn name(self) -> String {
        let suffix = if self.exclude_early_lick { "_noearlylick" } else { "" };
        alloc::format!("{}_{}{}", self.port.tag(), self.outcome.tag(), suffix)
    }

    /// Look a name up in [`Self::ALL`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownCondition`] for names outside the table.
    pub fn lookup(name: &str) -> Result<Self, ConfigError> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.name() == name)
            .ok_or_else(|| ConfigError::UnknownCondition { name: name.into() })
    }

    /// Whether a behavior trial satisfies this condition
    #[must_use]
    pub fn matches(self, trial: &BehaviorTrial) -> bool {
        self.port.matches(trial.water_port)
            && self.outcome.matches(trial.outcome)
            && !(self.exclude_early_lick && trial.early_lick.is_early())
    }
}

impl fmt::Display for TrialCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for TrialCondition {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::lookup(s)
    }
}

impl TryFrom<String> for TrialCondition {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::lookup(&value)
    }
}

impl From<TrialCondition> for String {
    fn from(condition: TrialCondition) -> Self {
        condition.name()
    }
}

// ============================================================================
// Hemisphere-Relative Requests
// ============================================================================

/// Port side relative to the recorded hemisphere.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelativePort {
    /// Same side as the recording
    Ipsi,
    /// Opposite side
    Contra,
    /// Either side
    Both,
}

/// A condition phrased relative to the recorded hemisphere.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConditionRequest {
    /// Relative port
    pub port: RelativePort,
    /// Outcome
    pub outcome: OutcomeFilter,
    /// Drop trials with any early lick
    #[serde(default)]
    pub exclude_early_lick: bool,
}

impl ConditionRequest {
    /// Create a new request
    #[must_use]
    pub const fn new(port: RelativePort, outcome: OutcomeFilter, exclude_early_lick: bool) -> Self {
        Self { port, outcome, exclude_early_lick }
    }

    /// Absolute condition for a recording in `hemisphere`
    #[must_use]
    pub fn resolve(self, hemisphere: Hemisphere) -> TrialCondition {
        let port = match (self.port, hemisphere) {
            (RelativePort::Both, _) => PortChoice::Either,
            (RelativePort::Ipsi, Hemisphere::Left) | (RelativePort::Contra, Hemisphere::Right) => {
                PortChoice::Left
            }
            (RelativePort::Ipsi, Hemisphere::Right) | (RelativePort::Contra, Hemisphere::Left) => {
                PortChoice::Right
            }
        };
        TrialCondition { port, outcome: self.outcome, exclude_early_lick: self.exclude_early_lick }
    }

    /// The four choice × outcome requests drawn on a foraging PSTH figure:
    /// ipsi hit, contra hit, ipsi miss, contra miss.
    #[must_use]
    pub const fn choice_outcome_grid(exclude_early_lick: bool) -> [Self; 4] {
        [
            Self::new(RelativePort::Ipsi, OutcomeFilter::Hit, exclude_early_lick),
            Self::new(RelativePort::Contra, OutcomeFilter::Hit, exclude_early_lick),
            Self::new(RelativePort::Ipsi, OutcomeFilter::Miss, exclude_early_lick),
            Self::new(RelativePort::Contra, OutcomeFilter::Miss, exclude_early_lick),
        ]
    }
}

// ============================================================================
// Trial-Set Resolver
// ============================================================================

/// A trial chosen by a condition, addressed at a (possibly shifted) trial.
///
/// `source_trial` is the trial that matched the condition; `trial` is where
/// neural activity is read, `source_trial + offset`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SelectedTrial {
    /// Trial that satisfied the condition
    pub source_trial: u16,
    /// Trial addressed after applying the offset
    pub trial: u16,
}

/// Shift `source_trials` by `offset` and keep those the unit has data for.
///
/// Shifted trials that fall outside the unit's trials are dropped, never
/// wrapped or clamped.
#[must_use]
pub fn shift_trials<I>(source_trials: I, offset: i32, unit: &RecordedUnit) -> Vec<SelectedTrial>
where
    I: IntoIterator<Item = u16>,
{
    let mut selected: Vec<SelectedTrial> = source_trials
        .into_iter()
        .filter_map(|source_trial| {
            let shifted = i32::from(source_trial) + offset;
            let trial = u16::try_from(shifted).ok()?;
            unit.has_trial(trial).then_some(SelectedTrial { source_trial, trial })
        })
        .collect();
    selected.sort_unstable();
    selected.dedup();
    selected
}

/// Trials of `records` matching `condition`, shifted by `offset` and
/// intersected with the unit's trials.
#[must_use]
pub fn select_trials(
    records: &SessionRecords,
    condition: TrialCondition,
    offset: i32,
    unit: &RecordedUnit,
) -> Vec<SelectedTrial> {
    let matching = records
        .behavior
        .iter()
        .filter(|b| condition.matches(b))
        .map(|b| b.trial);
    shift_trials(matching, offset, unit)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::session::tests::{behavior, records};
    use crate::types::{EarlyLick, SessionKey, UnitKey};
    use alloc::collections::BTreeSet;
    use alloc::vec;

    pub(crate) fn unit(trials: impl IntoIterator<Item = u16>, hemisphere: Hemisphere) -> RecordedUnit {
        RecordedUnit {
            key: UnitKey {
                session: SessionKey::new(473_361, 47),
                insertion_number: 1,
                clustering_method: "kilosort2".into(),
                unit: 541,
            },
            hemisphere,
            trials: trials.into_iter().collect::<BTreeSet<u16>>(),
        }
    }

    #[test]
    fn test_condition_names_round_trip_through_table() {
        for c in TrialCondition::ALL {
            assert_eq!(TrialCondition::lookup(&c.name()), Ok(c));
        }
        assert_eq!(
            TrialCondition::lookup("L_hit").map(|c| c.port),
            Ok(PortChoice::Left)
        );
        assert_eq!(
            TrialCondition::lookup("LR_miss_noearlylick"),
            Ok(TrialCondition {
                port: PortChoice::Either,
                outcome: OutcomeFilter::Miss,
                exclude_early_lick: true,
            })
        );
    }

    #[test]
    fn test_unknown_condition() {
        assert_eq!(
            TrialCondition::lookup("good_noearlylick_left_hit"),
            Err(ConfigError::UnknownCondition { name: "good_noearlylick_left_hit".into() })
        );
    }

    #[test]
    fn test_relative_resolution() {
        let ipsi = ConditionRequest::new(RelativePort::Ipsi, OutcomeFilter::Hit, false);
        let contra = ConditionRequest::new(RelativePort::Contra, OutcomeFilter::Hit, false);
        assert_eq!(ipsi.resolve(Hemisphere::Left).name(), "L_hit");
        assert_eq!(contra.resolve(Hemisphere::Left).name(), "R_hit");
        assert_eq!(ipsi.resolve(Hemisphere::Right).name(), "R_hit");
        assert_eq!(contra.resolve(Hemisphere::Right).name(), "L_hit");

        let both = ConditionRequest::new(RelativePort::Both, OutcomeFilter::Miss, true);
        assert_eq!(both.resolve(Hemisphere::Right).name(), "LR_miss_noearlylick");
    }

    #[test]
    fn test_select_with_early_lick_exclusion() {
        let mut recs = records(4);
        recs.behavior = vec![
            behavior(1, WaterPort::Left, Outcome::Hit, EarlyLick::NoEarly),
            behavior(2, WaterPort::Left, Outcome::Hit, EarlyLick::Early),
            behavior(3, WaterPort::Right, Outcome::Hit, EarlyLick::NoEarly),
            behavior(4, WaterPort::Left, Outcome::Miss, EarlyLick::NoEarly),
        ];
        let u = unit(1..=4, Hemisphere::Left);

        let all_hits = select_trials(&recs, TrialCondition::lookup("L_hit").unwrap(), 0, &u);
        assert_eq!(all_hits.iter().map(|s| s.trial).collect::<Vec<_>>(), vec![1, 2]);

        let clean = select_trials(&recs, TrialCondition::lookup("L_hit_noearlylick").unwrap(), 0, &u);
        assert_eq!(clean.iter().map(|s| s.trial).collect::<Vec<_>>(), vec![1]);

        let either = select_trials(&recs, TrialCondition::lookup("LR_hit").unwrap(), 0, &u);
        assert_eq!(either.len(), 3);
    }

    #[test]
    fn test_offset_keeps_identity_and_drops_out_of_range() {
        let mut recs = records(5);
        recs.behavior = (1..=5)
            .map(|t| behavior(t, WaterPort::Right, Outcome::Hit, EarlyLick::NoEarly))
            .collect();
        let u = unit(1..=5, Hemisphere::Right);
        let cond = TrialCondition::lookup("R_hit").unwrap();

        let base = select_trials(&recs, cond, 0, &u);
        let next = select_trials(&recs, cond, 1, &u);

        let base_ids: Vec<u16> = base.iter().map(|s| s.source_trial).collect();
        let next_ids: Vec<u16> = next.iter().map(|s| s.source_trial).collect();
        assert_eq!(base_ids, vec![1, 2, 3, 4, 5]);
        // trial 5 + 1 has no data and is dropped, not clamped
        assert_eq!(next_ids, vec![1, 2, 3, 4]);
        assert!(next.iter().all(|s| s.trial == s.source_trial + 1));
    }

    #[test]
    fn test_negative_offset_never_wraps() {
        let u = unit(1..=3, Hemisphere::Left);
        let shifted = shift_trials([1, 2, 3], -1, &u);
        assert_eq!(
            shifted,
            vec![
                SelectedTrial { source_trial: 2, trial: 1 },
                SelectedTrial { source_trial: 3, trial: 2 },
            ]
        );
    }

    #[test]
    fn test_unit_range_intersection() {
        let u = unit([2, 3], Hemisphere::Left);
        let shifted = shift_trials([1, 2, 3, 4], 0, &u);
        assert_eq!(shifted.iter().map(|s| s.trial).collect::<Vec<_>>(), vec![2, 3]);
    }
}
