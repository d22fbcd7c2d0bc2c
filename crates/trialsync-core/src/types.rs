//! Core vocabulary types shared by every component
//!
//! This module provides the fixed vocabularies of the behavioral rig:
//! - Session and unit keys
//! - Water ports, outcomes and early-lick labels
//! - Trial event and lick event types
//! - Hemisphere and stimulation laterality

use alloc::string::String;
use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

// ============================================================================
// Keys
// ============================================================================

/// Identifies one recording session of one subject.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    /// Subject identifier
    pub subject_id: u32,
    /// Session number for this subject
    pub session: u16,
}

impl SessionKey {
    /// Create a new session key
    #[must_use]
    pub const fn new(subject_id: u32, session: u16) -> Self {
        Self { subject_id, session }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.subject_id, self.session)
    }
}

/// Identifies one sorted unit on one probe insertion.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitKey {
    /// Owning session
    pub session: SessionKey,
    /// Probe insertion number (1-based)
    pub insertion_number: u8,
    /// Spike sorter used, e.g. `kilosort2`
    pub clustering_method: String,
    /// Unit number within the insertion
    pub unit: u32,
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} imec{} {} #{}",
            self.session,
            self.insertion_number.saturating_sub(1),
            self.clustering_method,
            self.unit
        )
    }
}

// ============================================================================
// Water Ports
// ============================================================================

/// Lick/water port the animal can choose.
///
/// The multi-target-licking ports are arranged as a 3×3 number pad,
/// numbered 1–9.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum WaterPort {
    /// Left port
    Left,
    /// Right port
    Right,
    /// Middle port (three-lickport foraging)
    Middle,
    /// Multi-target-licking port `mtl-N`
    MultiTarget(u8),
}

impl WaterPort {
    /// Canonical lowercase name, e.g. `left` or `mtl-4`
    #[must_use]
    pub fn name(self) -> String {
        match self {
            Self::Left => "left".into(),
            Self::Right => "right".into(),
            Self::Middle => "middle".into(),
            Self::MultiTarget(n) => alloc::format!("mtl-{n}"),
        }
    }
}

impl FromStr for WaterPort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "middle" => Ok(Self::Middle),
            other => other
                .strip_prefix("mtl-")
                .and_then(|n| n.parse::<u8>().ok())
                .filter(|n| (1..=9).contains(n))
                .map(Self::MultiTarget)
                .ok_or_else(|| alloc::format!("unknown water port: {other}")),
        }
    }
}

impl TryFrom<String> for WaterPort {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WaterPort> for String {
    fn from(port: WaterPort) -> Self {
        port.name()
    }
}

// ============================================================================
// Trial Labels
// ============================================================================

/// Instruction given to the animal on a trial.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrialInstruction {
    /// Lick left
    Left,
    /// Lick right
    Right,
    /// Lick middle
    Middle,
    /// Free choice (foraging)
    None,
}

/// Trial outcome.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// Rewarded response
    #[serde(rename = "hit")]
    Hit,
    /// Unrewarded response
    #[serde(rename = "miss")]
    Miss,
    /// No response
    #[serde(rename = "ignore")]
    Ignore,
    /// Outcome not applicable (e.g. free water)
    #[serde(rename = "N/A")]
    NotApplicable,
}

/// Early-lick label of a trial.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EarlyLick {
    /// Early lick during sample and/or delay
    #[serde(rename = "early")]
    Early,
    /// Early lick in the presample period only
    #[serde(rename = "early, presample only")]
    PresampleOnly,
    /// No early lick
    #[serde(rename = "no early")]
    NoEarly,
}

impl EarlyLick {
    /// Whether the trial had any early lick
    #[inline]
    #[must_use]
    pub const fn is_early(self) -> bool {
        !matches!(self, Self::NoEarly)
    }
}

// ============================================================================
// Events
// ============================================================================

/// Type of a timed trial event.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrialEventType {
    /// Presample period onset
    Presample,
    /// Sample period onset
    Sample,
    /// Delay period onset
    Delay,
    /// Go cue
    Go,
    /// End of trial (ITI start)
    TrialEnd,
    /// Lickport motor feedback marking trial start
    ZaberReady,
    /// Bitcode onset marking trial start on the acquisition clock
    BitcodeStart,
    /// Choice (first response lick) as logged by the controller
    Choice,
}

impl TrialEventType {
    /// Canonical name as used in the event vocabulary
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Presample => "presample",
            Self::Sample => "sample",
            Self::Delay => "delay",
            Self::Go => "go",
            Self::TrialEnd => "trialend",
            Self::ZaberReady => "zaberready",
            Self::BitcodeStart => "bitcodestart",
            Self::Choice => "choice",
        }
    }
}

impl fmt::Display for TrialEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lick direction of an action event.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LickSide {
    /// `left lick`
    #[serde(rename = "left lick")]
    Left,
    /// `right lick`
    #[serde(rename = "right lick")]
    Right,
    /// `middle lick`
    #[serde(rename = "middle lick")]
    Middle,
}

/// Type of a per-trial note written by the behavioral controller.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrialNoteType {
    /// Autolearn state
    #[serde(rename = "autolearn")]
    Autolearn,
    /// Protocol number
    #[serde(rename = "protocol #")]
    Protocol,
    /// Trial flagged bad
    #[serde(rename = "bad")]
    Bad,
    /// Trial-start bitcode
    #[serde(rename = "bitcode")]
    Bitcode,
    /// Autowater state
    #[serde(rename = "autowater")]
    Autowater,
    /// Random seed at trial start
    #[serde(rename = "random_seed_start")]
    RandomSeedStart,
}

// ============================================================================
// Laterality
// ============================================================================

/// Brain hemisphere of a recording site.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hemisphere {
    /// Left hemisphere
    Left,
    /// Right hemisphere
    Right,
}

impl Hemisphere {
    /// Port on the same side as this hemisphere
    #[must_use]
    pub const fn ipsi_port(self) -> WaterPort {
        match self {
            Self::Left => WaterPort::Left,
            Self::Right => WaterPort::Right,
        }
    }

    /// Port on the opposite side of this hemisphere
    #[must_use]
    pub const fn contra_port(self) -> WaterPort {
        match self {
            Self::Left => WaterPort::Right,
            Self::Right => WaterPort::Left,
        }
    }
}

/// Stimulated side(s) of a photostim protocol.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Laterality {
    /// All sites left of midline
    Left,
    /// All sites right of midline
    Right,
    /// Sites on both sides
    Both,
}

impl fmt::Display for Laterality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => f.write_str("left"),
            Self::Right => f.write_str("right"),
            Self::Both => f.write_str("both"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_water_port_names() {
        assert_eq!("left".parse::<WaterPort>(), Ok(WaterPort::Left));
        assert_eq!("mtl-7".parse::<WaterPort>(), Ok(WaterPort::MultiTarget(7)));
        assert!("mtl-10".parse::<WaterPort>().is_err());
        assert!("purple".parse::<WaterPort>().is_err());
        assert_eq!(WaterPort::MultiTarget(3).name(), "mtl-3");
    }

    #[test]
    fn test_hemisphere_ports() {
        assert_eq!(Hemisphere::Left.ipsi_port(), WaterPort::Left);
        assert_eq!(Hemisphere::Left.contra_port(), WaterPort::Right);
        assert_eq!(Hemisphere::Right.ipsi_port(), WaterPort::Right);
    }

    #[test]
    fn test_early_lick() {
        assert!(EarlyLick::Early.is_early());
        assert!(EarlyLick::PresampleOnly.is_early());
        assert!(!EarlyLick::NoEarly.is_early());
    }
}
