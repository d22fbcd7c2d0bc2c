//! Bitcode decoding and trial synchronization
//!
//! The behavioral controller emits a short pulse code at every trial start
//! on a digital line that the acquisition system records. Decoding that
//! line gives `(onset sample, value)` pairs on the acquisition clock;
//! matching the values, in order, against the bitcodes the controller
//! logged per trial gives the acquisition sample at which each trial began.
//!
//! Code layout on the line: at least `min_gap_s` low, a start pulse of
//! `start_pulse_s` high, then `bit_count` slots of `bit_s`, most
//! significant bit first, each high for 1 and low for 0.

use serde::{Deserialize, Serialize};
use trialsync_core::error::{AvailabilityError, EngineResult};

use crate::acquisition::AcquisitionStream;
use crate::error::SyncResult;

/// Timing of the trial-start pulse code.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BitcodeScheme {
    /// Bits per code
    pub bit_count: u8,
    /// Start pulse length (s)
    pub start_pulse_s: f64,
    /// Bit slot length (s)
    pub bit_s: f64,
    /// Minimum low time before a start pulse (s)
    pub min_gap_s: f64,
    /// Bit of the digital word carrying the code line
    pub digital_bit: u8,
}

impl Default for BitcodeScheme {
    fn default() -> Self {
        Self { bit_count: 10, start_pulse_s: 0.02, bit_s: 0.02, min_gap_s: 0.1, digital_bit: 0 }
    }
}

impl BitcodeScheme {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn samples(seconds: f64, sample_rate: f64) -> usize {
        (seconds * sample_rate).round().max(1.0) as usize
    }

    /// Samples from a code's onset to the end of its last bit slot
    #[must_use]
    pub fn code_samples(&self, sample_rate: f64) -> usize {
        Self::samples(self.start_pulse_s, sample_rate)
            + usize::from(self.bit_count) * Self::samples(self.bit_s, sample_rate)
    }
}

/// One decoded code.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedBitcode {
    /// Sample index of the start pulse's rising edge
    pub sample: u64,
    /// Code value
    pub value: u32,
}

/// Decode every complete code on a digital word channel.
///
/// A code cut off by the end of the stream is discarded.
#[must_use]
pub fn decode(words: &[i16], sample_rate: f64, scheme: &BitcodeScheme) -> Vec<DecodedBitcode> {
    let mask = 1u16 << scheme.digital_bit.min(15);
    #[allow(clippy::cast_sign_loss)]
    let high = |i: usize| (words[i] as u16) & mask != 0;

    let start = BitcodeScheme::samples(scheme.start_pulse_s, sample_rate);
    let bit = BitcodeScheme::samples(scheme.bit_s, sample_rate);
    let gap = BitcodeScheme::samples(scheme.min_gap_s, sample_rate);
    let span = scheme.code_samples(sample_rate);

    let mut codes = Vec::new();
    // start of the current low run; a run beginning at sample 0 always counts as a gap
    let mut low_since: Option<usize> = None;
    let mut busy_until = 0usize;

    for i in 0..words.len() {
        if !high(i) {
            low_since.get_or_insert(i);
            continue;
        }
        // only a high sample that follows a low run is a rising edge
        let Some(run_start) = low_since.take() else {
            continue;
        };
        if i < busy_until || (run_start > 0 && i - run_start < gap) {
            continue;
        }
        if i + span > words.len() {
            tracing::debug!("Discarding truncated bitcode at sample {}", i);
            break;
        }

        let value = (0..usize::from(scheme.bit_count)).fold(0u32, |acc, k| {
            let centre = i + start + k * bit + bit / 2;
            (acc << 1) | u32::from(high(centre))
        });
        codes.push(DecodedBitcode { sample: i as u64, value });
        busy_until = i + span;
    }

    codes
}

/// Read the digital word channel of `stream` and decode it.
///
/// # Errors
///
/// Propagates channel and I/O errors from the stream.
pub fn read_bitcodes<S>(stream: &mut S, channel: usize, scheme: &BitcodeScheme) -> SyncResult<Vec<DecodedBitcode>>
where
    S: AcquisitionStream + ?Sized,
{
    let words = stream.read_channel(channel, 0..stream.sample_count())?;
    let codes = decode(&words, stream.sample_rate(), scheme);
    tracing::debug!("Decoded {} bitcodes from channel {}", codes.len(), channel);
    Ok(codes)
}

// ============================================================================
// Synchronization
// ============================================================================

/// Acquisition sample at which each trial started, in trial order.
///
/// `trials[i]` is the trial number whose start is `samples[i]`; sessions
/// with photostim-only trials have gaps in the numbering.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrialStarts {
    /// Trial number per start
    pub trials: Vec<u16>,
    /// One sample index per trial
    pub samples: Vec<u64>,
    /// Acquisition sample rate
    pub sample_rate: f64,
}

impl TrialStarts {
    /// Starts for consecutive trials numbered from 1
    #[must_use]
    pub fn numbered(samples: Vec<u64>, sample_rate: f64) -> Self {
        let trials = (1..=samples.len()).map(|i| u16::try_from(i).unwrap_or(u16::MAX)).collect();
        Self { trials, samples, sample_rate }
    }

    /// Convert `(trial, start time in s)` pairs to sample indices,
    /// truncating toward zero
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_times(times: &[(u16, f64)], sample_rate: f64) -> Self {
        let trials = times.iter().map(|(trial, _)| *trial).collect();
        let samples = times.iter().map(|(_, t)| (t * sample_rate).max(0.0) as u64).collect();
        Self { trials, samples, sample_rate }
    }

    /// Start times in seconds on the acquisition clock
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn times(&self) -> Vec<f64> {
        self.samples.iter().map(|&s| s as f64 / self.sample_rate).collect()
    }

    /// Number of trials
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no trial start is known
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Match the controller's `(trial, bitcode)` pairs against decoded codes.
///
/// Matching is exact and in order: each trial takes the first decoded code
/// with its value after the previous trial's match. Extra decoded codes
/// (recording started early or ran past the session) are skipped.
///
/// # Errors
///
/// - [`AvailabilityError::BitcodeTrialMismatch`] if fewer codes were decoded
///   than there are trials
/// - [`AvailabilityError::UnmatchedBitcode`] if a trial's code is not found
pub fn synchronize(expected: &[(u16, u32)], decoded: &[DecodedBitcode], sample_rate: f64) -> EngineResult<TrialStarts> {
    if decoded.len() < expected.len() {
        return Err(AvailabilityError::BitcodeTrialMismatch { decoded: decoded.len(), trials: expected.len() }.into());
    }

    let mut trials = Vec::with_capacity(expected.len());
    let mut samples = Vec::with_capacity(expected.len());
    let mut cursor = 0;
    for &(trial, bitcode) in expected {
        let found = decoded[cursor..]
            .iter()
            .position(|d| d.value == bitcode)
            .ok_or(AvailabilityError::UnmatchedBitcode { trial, bitcode })?;
        trials.push(trial);
        samples.push(decoded[cursor + found].sample);
        cursor += found + 1;
    }

    Ok(TrialStarts { trials, samples, sample_rate })
}
