//! Error types for the trial-synchronization engine
//!
//! Errors fall into three families and callers are expected to treat them
//! differently:
//!
//! - [`ConfigError`]: the request itself is wrong (unknown names, an
//!   inconsistent protocol definition). Always actionable by the caller.
//! - [`AvailabilityError`]: the data needed to answer is missing. May be
//!   legitimate depending on which sessions are queried.
//! - [`AmbiguityError`]: the data exists but does not support an answer.
//!   Requires upstream data correction.
//!
//! All three are wrapped by [`EngineError`], whose [`EngineError::kind`]
//! exposes the family without matching on every variant.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use serde::{Deserialize, Serialize};

use crate::types::SessionKey;

// ============================================================================
// Error Families
// ============================================================================

/// Coarse classification of every engine error.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Unknown names or inconsistent definitions
    Configuration,
    /// Missing files, missing trials, too few bitcodes
    DataAvailability,
    /// Deliberate refusal to pick a default
    Ambiguity,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::DataAvailability => write!(f, "data availability"),
            Self::Ambiguity => write!(f, "ambiguity"),
        }
    }
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// The caller asked for something the engine does not know about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigError {
    /// Condition name not present in the condition table
    UnknownCondition {
        /// Requested name
        name: String,
    },
    /// Alignment name not present in the alignment table
    UnknownAlignment {
        /// Requested (possibly rewritten) name
        name: String,
    },
    /// Latent variable not present in the model's table
    UnknownVariable {
        /// Requested variable name
        name: String,
    },
    /// Period name not present in the period table
    UnknownPeriod {
        /// Requested period name
        name: String,
    },
    /// A photostim protocol reports more than one target brain area
    MultipleBrainAreas {
        /// Distinct areas found, sorted
        areas: Vec<String>,
    },
    /// Quantile partition requested with zero groups
    InvalidGroupCount {
        /// Requested group count
        requested: usize,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownCondition { name } => write!(f, "Unknown trial condition: {name}"),
            Self::UnknownAlignment { name } => write!(f, "Unknown alignment type: {name}"),
            Self::UnknownVariable { name } => write!(f, "Unknown latent variable: {name}"),
            Self::UnknownPeriod { name } => write!(f, "Unknown period: {name}"),
            Self::MultipleBrainAreas { areas } => {
                write!(
                    f,
                    "Multiple different brain areas for one photostim protocol is unsupported: {areas:?}"
                )
            }
            Self::InvalidGroupCount { requested } => {
                write!(f, "Invalid quantile group count: {requested}")
            }
        }
    }
}

// ============================================================================
// Data-Availability Errors
// ============================================================================

/// Data required to answer a request is absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AvailabilityError {
    /// No session folder matched on any configured rig path
    SessionFolderNotFound {
        /// Water-restriction id of the subject
        water_restriction: String,
        /// Session date as YYYYMMDD
        date: String,
    },
    /// Session folder exists but holds no matching acquisition stream
    StreamNotFound {
        /// Session the stream was searched for
        session: SessionKey,
    },
    /// The acquisition stream carries fewer bitcodes than there are trials
    BitcodeTrialMismatch {
        /// Bitcodes decoded from the stream
        decoded: usize,
        /// Behavioral trials expected
        trials: usize,
    },
    /// A trial's bitcode was not found in order in the stream
    UnmatchedBitcode {
        /// 1-based trial number
        trial: u16,
        /// Expected bitcode value
        bitcode: u32,
    },
    /// A behavior trial carries no bitcode note
    MissingBitcode {
        /// 1-based trial number
        trial: u16,
    },
    /// A bitcode note is not a binary digit string
    MalformedBitcode {
        /// 1-based trial number
        trial: u16,
        /// Raw note text
        note: String,
    },
    /// Session trial numbers are not 1, 2, 3, ...
    NonContiguousTrials {
        /// Trial number expected at this position
        expected: u16,
        /// Trial number found
        found: u16,
    },
    /// Segmentation was asked to run with no trial starts
    NoTrialStarts,
    /// Trial starts are not strictly increasing or fall outside the stream
    InvalidTrialStarts {
        /// Index into the start list of the first offending entry
        index: usize,
        /// Offending sample index
        sample: u64,
        /// Total samples in the stream
        stream_len: u64,
    },
    /// Channel index outside the stream's channel list
    ChannelOutOfRange {
        /// Requested channel
        channel: usize,
        /// Channels available
        available: usize,
    },
    /// Session records are not loaded for this key
    SessionNotFound {
        /// Missing session
        session: SessionKey,
    },
    /// Photostim protocol has no location rows
    NoPhotostimLocations {
        /// Protocol number
        photo_stim: u16,
    },
}

impl fmt::Display for AvailabilityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionFolderNotFound { water_restriction, date } => {
                write!(f, "No session folder found for {water_restriction}/{date}")
            }
            Self::StreamNotFound { session } => {
                write!(f, "No acquisition stream found for session {session}")
            }
            Self::BitcodeTrialMismatch { decoded, trials } => {
                write!(
                    f,
                    "Stream-trial mismatch: {decoded} bitcodes decoded for {trials} behavioral trials"
                )
            }
            Self::UnmatchedBitcode { trial, bitcode } => {
                write!(f, "Bitcode {bitcode} of trial {trial} not found in acquisition stream")
            }
            Self::MissingBitcode { trial } => write!(f, "Trial {trial} has no bitcode note"),
            Self::MalformedBitcode { trial, note } => {
                write!(f, "Trial {trial} has malformed bitcode note {note:?}")
            }
            Self::NonContiguousTrials { expected, found } => {
                write!(f, "Non-contiguous trial numbers: expected {expected}, found {found}")
            }
            Self::NoTrialStarts => write!(f, "Data not found: no trial start indices"),
            Self::InvalidTrialStarts { index, sample, stream_len } => {
                write!(
                    f,
                    "Invalid trial start #{index} at sample {sample} (stream has {stream_len} samples)"
                )
            }
            Self::ChannelOutOfRange { channel, available } => {
                write!(f, "Channel {channel} out of range ({available} channels)")
            }
            Self::SessionNotFound { session } => write!(f, "Session {session} not found"),
            Self::NoPhotostimLocations { photo_stim } => {
                write!(f, "Photostim protocol {photo_stim} has no locations")
            }
        }
    }
}

// ============================================================================
// Ambiguity Errors
// ============================================================================

/// The data cannot support an unambiguous answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AmbiguityError {
    /// Medial-lateral coordinates of a protocol sit on the midline
    AmbiguousHemisphere {
        /// Protocol number
        photo_stim: u16,
    },
    /// Fewer than two distinct finite values to partition
    InsufficientVariation {
        /// Distinct finite values found
        distinct: usize,
    },
}

impl fmt::Display for AmbiguityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AmbiguousHemisphere { photo_stim } => {
                write!(f, "Ambiguous hemisphere: ML locations of protocol {photo_stim} include the midline")
            }
            Self::InsufficientVariation { distinct } => {
                write!(f, "Insufficient variation: {distinct} distinct finite value(s)")
            }
        }
    }
}

// ============================================================================
// Engine Error
// ============================================================================

/// Any error raised by the engine's pure components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineError {
    /// See [`ConfigError`]
    Config(ConfigError),
    /// See [`AvailabilityError`]
    Availability(AvailabilityError),
    /// See [`AmbiguityError`]
    Ambiguity(AmbiguityError),
}

impl EngineError {
    /// Error family
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Configuration,
            Self::Availability(_) => ErrorKind::DataAvailability,
            Self::Ambiguity(_) => ErrorKind::Ambiguity,
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "{e}"),
            Self::Availability(e) => write!(f, "{e}"),
            Self::Ambiguity(e) => write!(f, "{e}"),
        }
    }
}

impl From<ConfigError> for EngineError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<AvailabilityError> for EngineError {
    fn from(e: AvailabilityError) -> Self {
        Self::Availability(e)
    }
}

impl From<AmbiguityError> for EngineError {
    fn from(e: AmbiguityError) -> Self {
        Self::Ambiguity(e)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

#[cfg(feature = "std")]
impl std::error::Error for AvailabilityError {}

#[cfg(feature = "std")]
impl std::error::Error for AmbiguityError {}

#[cfg(feature = "std")]
impl std::error::Error for EngineError {}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use alloc::vec;

    #[test]
    fn test_kind_classification() {
        let config: EngineError = ConfigError::UnknownCondition { name: "X_hit".into() }.into();
        assert_eq!(config.kind(), ErrorKind::Configuration);

        let missing: EngineError = AvailabilityError::NoTrialStarts.into();
        assert_eq!(missing.kind(), ErrorKind::DataAvailability);

        let ambiguous: EngineError = AmbiguityError::InsufficientVariation { distinct: 1 }.into();
        assert_eq!(ambiguous.kind(), ErrorKind::Ambiguity);
    }

    #[test]
    fn test_display_messages() {
        let e = AvailabilityError::BitcodeTrialMismatch { decoded: 3, trials: 5 };
        assert_eq!(
            e.to_string(),
            "Stream-trial mismatch: 3 bitcodes decoded for 5 behavioral trials"
        );

        let e = ConfigError::MultipleBrainAreas { areas: vec!["ALM".into(), "M2".into()] };
        assert!(e.to_string().contains("ALM"));
    }
}
