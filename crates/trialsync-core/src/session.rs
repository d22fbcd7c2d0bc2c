//! Per-session records consumed by the engine
//!
//! These are read-only views of what the ingest collaborator stores for a
//! session: trials, behavior labels, timed events, licks, controller notes
//! and foraging blocks. The engine never mutates them.

use alloc::collections::BTreeSet;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AvailabilityError, EngineResult};
use crate::types::{
    EarlyLick, Hemisphere, LickSide, Outcome, SessionKey, TrialEventType, TrialInstruction,
    TrialNoteType, UnitKey, WaterPort,
};

// ============================================================================
// Session
// ============================================================================

/// Calendar date of a session.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionDate {
    /// Year, e.g. 2021
    pub year: u16,
    /// Month 1–12
    pub month: u8,
    /// Day 1–31
    pub day: u8,
}

impl SessionDate {
    /// Create a new date
    #[must_use]
    pub const fn new(year: u16, month: u8, day: u8) -> Self {
        Self { year, month, day }
    }

    /// Date as `YYYYMMDD`, the form used in acquisition folder names
    #[must_use]
    pub fn compact(self) -> String {
        alloc::format!("{:04}{:02}{:02}", self.year, self.month, self.day)
    }
}

impl fmt::Display for SessionDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// Wall-clock start of a session.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionTime {
    /// Hour 0–23
    pub hour: u8,
    /// Minute 0–59
    pub minute: u8,
    /// Second 0–59
    pub second: u8,
}

/// One recording session for one subject.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Session key
    pub key: SessionKey,
    /// Water-restriction id of the subject (used in folder names)
    pub water_restriction: String,
    /// Session date
    pub date: SessionDate,
    /// Session start time
    #[serde(default)]
    pub time: SessionTime,
    /// Rig the session ran on
    #[serde(default)]
    pub rig: String,
    /// Experimenter
    #[serde(default)]
    pub username: String,
}

// ============================================================================
// Trials
// ============================================================================

/// One behavioral trial within a session.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionTrial {
    /// Trial number, 1-based
    pub trial: u16,
    /// Unique across sessions and subjects
    pub trial_uid: u32,
    /// Start, seconds from session start
    pub start_time: f64,
    /// Stop, seconds from session start
    pub stop_time: f64,
}

/// Behavioral labels of a trial.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BehaviorTrial {
    /// Trial number, 1-based
    pub trial: u16,
    /// Task name, e.g. `foraging`
    pub task: String,
    /// Task protocol number
    pub task_protocol: u8,
    /// Instruction given on this trial
    pub trial_instruction: TrialInstruction,
    /// Early-lick label
    pub early_lick: EarlyLick,
    /// Outcome
    pub outcome: Outcome,
    /// Water given after response time regardless of correctness
    #[serde(default)]
    pub auto_water: bool,
    /// Empty trial with water given, no trial structure
    #[serde(default)]
    pub free_water: bool,
    /// Port chosen by the animal, if any
    #[serde(default)]
    pub water_port: Option<WaterPort>,
}

/// Named, timed event within a trial.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrialEvent {
    /// Trial number, 1-based
    pub trial: u16,
    /// Per-trial event id
    pub event_id: u16,
    /// Event type
    pub event_type: TrialEventType,
    /// Seconds from trial start
    pub time: f64,
    /// Seconds
    #[serde(default)]
    pub duration: f64,
}

/// Lick recorded within a trial.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionEvent {
    /// Trial number, 1-based
    pub trial: u16,
    /// Per-trial action id
    pub action_event_id: u16,
    /// Lick direction
    pub side: LickSide,
    /// Seconds from trial start
    pub time: f64,
}

/// Free-form note written by the controller for a trial.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialNote {
    /// Trial number, 1-based
    pub trial: u16,
    /// Note type
    pub note_type: TrialNoteType,
    /// Note text
    pub note: String,
}

/// Contiguous run of foraging trials sharing reward probabilities.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionBlock {
    /// Block number, 1-based
    pub block: u16,
    /// Seconds from session start
    pub block_start_time: f64,
    /// Reward probability per water port
    pub reward_probabilities: Vec<(WaterPort, f64)>,
    /// Member trials in order
    pub trials: Vec<u16>,
}

impl SessionBlock {
    /// Reward probability of `port` in this block
    #[must_use]
    pub fn reward_probability(&self, port: WaterPort) -> Option<f64> {
        self.reward_probabilities
            .iter()
            .find(|(p, _)| *p == port)
            .map(|(_, prob)| *prob)
    }

    /// Whether `trial` belongs to this block
    #[must_use]
    pub fn contains(&self, trial: u16) -> bool {
        self.trials.contains(&trial)
    }
}

// ============================================================================
// Session Records
// ============================================================================

/// Everything the engine reads about one session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionRecords {
    /// Session
    pub session: Session,
    /// All trials, ordered by trial number
    pub trials: Vec<SessionTrial>,
    /// Behavior labels (absent for photostim-only trials)
    #[serde(default)]
    pub behavior: Vec<BehaviorTrial>,
    /// Timed events
    #[serde(default)]
    pub events: Vec<TrialEvent>,
    /// Licks
    #[serde(default)]
    pub actions: Vec<ActionEvent>,
    /// Controller notes
    #[serde(default)]
    pub notes: Vec<TrialNote>,
    /// Foraging blocks
    #[serde(default)]
    pub blocks: Vec<SessionBlock>,
}

impl SessionRecords {
    /// Session key
    #[inline]
    #[must_use]
    pub fn key(&self) -> SessionKey {
        self.session.key
    }

    /// Check that trial numbers run 1, 2, 3, ... without gaps.
    ///
    /// # Errors
    ///
    /// Returns [`AvailabilityError::NonContiguousTrials`] at the first gap.
    pub fn validate(&self) -> EngineResult<()> {
        for (i, trial) in self.trials.iter().enumerate() {
            let expected = u16::try_from(i + 1).unwrap_or(u16::MAX);
            if trial.trial != expected {
                return Err(AvailabilityError::NonContiguousTrials {
                    expected,
                    found: trial.trial,
                }
                .into());
            }
        }
        Ok(())
    }

    /// Behavior labels of `trial`
    #[must_use]
    pub fn behavior_trial(&self, trial: u16) -> Option<&BehaviorTrial> {
        self.behavior.iter().find(|b| b.trial == trial)
    }

    /// Time of the first `event_type` event in `trial` (seconds from trial start)
    #[must_use]
    pub fn event_time(&self, trial: u16, event_type: TrialEventType) -> Option<f64> {
        self.events
            .iter()
            .filter(|e| e.trial == trial && e.event_type == event_type)
            .min_by_key(|e| e.event_id)
            .map(|e| e.time)
    }

    /// Whether any trial of the session has an event of `event_type`
    #[must_use]
    pub fn has_event_type(&self, event_type: TrialEventType) -> bool {
        self.events.iter().any(|e| e.event_type == event_type)
    }

    /// Time of the first lick strictly after the `event_type` event of `trial`
    #[must_use]
    pub fn first_lick_after(&self, trial: u16, event_type: TrialEventType) -> Option<f64> {
        let after = self.event_time(trial, event_type)?;
        self.actions
            .iter()
            .filter(|a| a.trial == trial && a.time > after)
            .map(|a| a.time)
            .min_by(f64::total_cmp)
    }

    /// Trial-start bitcodes written by the behavioral controller as
    /// `(trial, bitcode)`, one per behavior trial, in trial order.
    ///
    /// Trials without behavior labels (photostim-only) have no bitcode and
    /// are absent, so positions do not equal trial numbers.
    ///
    /// Bitcode notes are binary digit strings, most significant bit first.
    ///
    /// # Errors
    ///
    /// Returns [`AvailabilityError::MissingBitcode`] when a behavior trial
    /// has no bitcode note and [`AvailabilityError::MalformedBitcode`] when
    /// the note is not a binary digit string.
    pub fn behavior_bitcodes(&self) -> EngineResult<Vec<(u16, u32)>> {
        let mut trials: Vec<u16> = self.behavior.iter().map(|b| b.trial).collect();
        trials.sort_unstable();

        trials
            .into_iter()
            .map(|trial| -> EngineResult<(u16, u32)> {
                let note = self
                    .notes
                    .iter()
                    .find(|n| n.trial == trial && n.note_type == TrialNoteType::Bitcode)
                    .ok_or(AvailabilityError::MissingBitcode { trial })?;
                let bitcode = parse_bitcode(&note.note).ok_or_else(|| AvailabilityError::MalformedBitcode {
                    trial,
                    note: note.note.clone(),
                })?;
                Ok((trial, bitcode))
            })
            .collect()
    }

    /// Block containing `trial`
    #[must_use]
    pub fn block_of_trial(&self, trial: u16) -> Option<&SessionBlock> {
        self.blocks.iter().find(|b| b.contains(trial))
    }
}

/// Parse a binary digit string (MSB first) into a bitcode value.
#[must_use]
pub fn parse_bitcode(note: &str) -> Option<u32> {
    let digits = note.trim();
    if digits.is_empty() || digits.len() > 32 || !digits.bytes().all(|b| b == b'0' || b == b'1') {
        return None;
    }
    u32::from_str_radix(digits, 2).ok()
}

// ============================================================================
// Recorded Unit
// ============================================================================

/// A sorted unit together with where it was recorded and which trials
/// have spike data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedUnit {
    /// Unit key
    pub key: UnitKey,
    /// Hemisphere of the recording site
    pub hemisphere: Hemisphere,
    /// Trials with spike data for this unit
    pub trials: BTreeSet<u16>,
}

impl RecordedUnit {
    /// Whether the unit has spike data for `trial`
    #[inline]
    #[must_use]
    pub fn has_trial(&self, trial: u16) -> bool {
        self.trials.contains(&trial)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloc::vec;

    pub(crate) fn behavior(trial: u16, port: WaterPort, outcome: Outcome, early: EarlyLick) -> BehaviorTrial {
        BehaviorTrial {
            trial,
            task: "foraging".into(),
            task_protocol: 100,
            trial_instruction: TrialInstruction::None,
            early_lick: early,
            outcome,
            auto_water: false,
            free_water: false,
            water_port: Some(port),
        }
    }

    pub(crate) fn event(trial: u16, event_id: u16, event_type: TrialEventType, time: f64) -> TrialEvent {
        TrialEvent { trial, event_id, event_type, time, duration: 0.0 }
    }

    pub(crate) fn records(n_trials: u16) -> SessionRecords {
        SessionRecords {
            session: Session {
                key: SessionKey::new(473_361, 47),
                water_restriction: "HH09".into(),
                date: SessionDate::new(2021, 3, 8),
                time: SessionTime::default(),
                rig: "RRig-MTL".into(),
                username: "HH".into(),
            },
            trials: (1..=n_trials)
                .map(|t| SessionTrial {
                    trial: t,
                    trial_uid: 1000 + u32::from(t),
                    start_time: f64::from(t - 1) * 10.0,
                    stop_time: f64::from(t) * 10.0 - 1.0,
                })
                .collect(),
            behavior: Vec::new(),
            events: Vec::new(),
            actions: Vec::new(),
            notes: Vec::new(),
            blocks: Vec::new(),
        }
    }

    #[test]
    fn test_validate_contiguous() {
        let mut recs = records(3);
        assert!(recs.validate().is_ok());

        recs.trials[2].trial = 5;
        assert_eq!(
            recs.validate(),
            Err(AvailabilityError::NonContiguousTrials { expected: 3, found: 5 }.into())
        );
    }

    #[test]
    fn test_event_lookup() {
        let mut recs = records(2);
        recs.events = vec![
            event(1, 2, TrialEventType::Go, 2.5),
            event(1, 1, TrialEventType::Go, 2.0),
            event(2, 1, TrialEventType::ZaberReady, 0.1),
        ];
        assert_eq!(recs.event_time(1, TrialEventType::Go), Some(2.0));
        assert_eq!(recs.event_time(2, TrialEventType::Go), None);
        assert!(recs.has_event_type(TrialEventType::ZaberReady));
        assert!(!recs.has_event_type(TrialEventType::BitcodeStart));
    }

    #[test]
    fn test_first_lick_after_go() {
        let mut recs = records(1);
        recs.events = vec![event(1, 1, TrialEventType::Go, 2.0)];
        recs.actions = vec![
            ActionEvent { trial: 1, action_event_id: 1, side: LickSide::Left, time: 1.5 },
            ActionEvent { trial: 1, action_event_id: 3, side: LickSide::Right, time: 2.9 },
            ActionEvent { trial: 1, action_event_id: 2, side: LickSide::Left, time: 2.3 },
        ];
        assert_eq!(recs.first_lick_after(1, TrialEventType::Go), Some(2.3));
    }

    #[test]
    fn test_behavior_bitcodes() {
        let mut recs = records(2);
        recs.behavior = vec![
            behavior(2, WaterPort::Left, Outcome::Hit, EarlyLick::NoEarly),
            behavior(1, WaterPort::Right, Outcome::Miss, EarlyLick::NoEarly),
        ];
        recs.notes = vec![
            TrialNote { trial: 1, note_type: TrialNoteType::Bitcode, note: "0000000101".into() },
            TrialNote { trial: 2, note_type: TrialNoteType::Bitcode, note: "0000000110".into() },
            TrialNote { trial: 2, note_type: TrialNoteType::Bad, note: "1".into() },
        ];
        assert_eq!(recs.behavior_bitcodes(), Ok(vec![(1, 5), (2, 6)]));

        recs.notes.remove(1);
        assert_eq!(
            recs.behavior_bitcodes(),
            Err(AvailabilityError::MissingBitcode { trial: 2 }.into())
        );
    }

    #[test]
    fn test_behavior_bitcodes_skip_photostim_only_trials() {
        let mut recs = records(3);
        recs.behavior = vec![
            behavior(1, WaterPort::Left, Outcome::Hit, EarlyLick::NoEarly),
            behavior(3, WaterPort::Right, Outcome::Hit, EarlyLick::NoEarly),
        ];
        recs.notes = vec![
            TrialNote { trial: 1, note_type: TrialNoteType::Bitcode, note: "11".into() },
            TrialNote { trial: 3, note_type: TrialNoteType::Bitcode, note: "100".into() },
        ];
        assert_eq!(recs.behavior_bitcodes(), Ok(vec![(1, 3), (3, 4)]));
    }

    #[test]
    fn test_parse_bitcode() {
        assert_eq!(parse_bitcode("101"), Some(5));
        assert_eq!(parse_bitcode(" 0011 "), Some(3));
        assert_eq!(parse_bitcode("12"), None);
        assert_eq!(parse_bitcode(""), None);
    }

    #[test]
    fn test_block_lookup() {
        let mut recs = records(4);
        recs.blocks = vec![
            SessionBlock {
                block: 1,
                block_start_time: 0.0,
                reward_probabilities: vec![(WaterPort::Left, 0.8), (WaterPort::Right, 0.1)],
                trials: vec![1, 2],
            },
            SessionBlock {
                block: 2,
                block_start_time: 20.0,
                reward_probabilities: vec![(WaterPort::Left, 0.1), (WaterPort::Right, 0.8)],
                trials: vec![3, 4],
            },
        ];
        let block = recs.block_of_trial(3).map(|b| b.block);
        assert_eq!(block, Some(2));
        assert_eq!(recs.blocks[0].reward_probability(WaterPort::Left), Some(0.8));
        assert_eq!(recs.blocks[0].reward_probability(WaterPort::Middle), None);
    }
}
