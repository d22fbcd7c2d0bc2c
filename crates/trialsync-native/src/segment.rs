//! Per-trial signal segmentation
//!
//! Trial `i` owns samples `[start_i, start_{i+1})`; the last trial runs to
//! the end of the stream, so inter-trial dead time belongs to the trial
//! before it. Segments are read as raw counts ([`RawSegment`]) and become
//! physical values ([`TrialSegment`]) only through
//! [`RawSegment::gain_correct`], which consumes the raw segment.

use serde::{Deserialize, Serialize};
use trialsync_core::error::AvailabilityError;

use crate::acquisition::{AcquisitionStream, SensorType};
use crate::bitcode::TrialStarts;
use crate::error::SyncResult;

/// Unit of gain-corrected samples.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalUnit {
    /// µV (probe streams)
    Microvolts,
    /// mV (analog-input streams)
    Millivolts,
}

impl SignalUnit {
    /// Unit a sensor type is reported in
    #[must_use]
    pub const fn for_sensor(sensor: SensorType) -> Self {
        match sensor {
            SensorType::Imec => Self::Microvolts,
            SensorType::Nidq => Self::Millivolts,
        }
    }

    /// Multiplier from volts
    #[must_use]
    pub const fn per_volt(self) -> f64 {
        match self {
            Self::Microvolts => 1e6,
            Self::Millivolts => 1e3,
        }
    }
}

/// Raw counts of one trial.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawSegment {
    /// Trial number, 1-based
    pub trial: u16,
    /// First sample (inclusive)
    pub start: u64,
    /// Last sample (exclusive)
    pub end: u64,
    /// Sample rate of the stream
    pub sample_rate: f64,
    /// Sensor type of the stream
    pub sensor_type: SensorType,
    /// Segmented channels
    pub channels: Vec<usize>,
    /// Volts per count, one per entry of `channels`
    pub conversions: Vec<f64>,
    /// Counts, channel-major
    pub counts: Vec<i16>,
}

impl RawSegment {
    /// Samples per channel
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn samples_per_channel(&self) -> usize {
        (self.end - self.start) as usize
    }

    /// Apply the channel conversion and the sensor's unit scale.
    #[must_use]
    pub fn gain_correct(self) -> TrialSegment {
        let unit = SignalUnit::for_sensor(self.sensor_type);
        let n = self.samples_per_channel();
        let values = if n == 0 {
            Vec::new()
        } else {
            self.counts
                .chunks(n)
                .zip(&self.conversions)
                .flat_map(|(chunk, &conv)| {
                    let factor = conv * unit.per_volt();
                    chunk.iter().map(move |&c| f64::from(c) * factor)
                })
                .collect()
        };

        TrialSegment {
            trial: self.trial,
            start: self.start,
            end: self.end,
            sample_rate: self.sample_rate,
            unit,
            channels: self.channels,
            values,
        }
    }
}

/// Gain-corrected samples of one trial.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrialSegment {
    /// Trial number, 1-based
    pub trial: u16,
    /// First sample (inclusive)
    pub start: u64,
    /// Last sample (exclusive)
    pub end: u64,
    /// Sample rate of the stream
    pub sample_rate: f64,
    /// Unit of `values`
    pub unit: SignalUnit,
    /// Segmented channels
    pub channels: Vec<usize>,
    /// Values, channel-major
    pub values: Vec<f64>,
}

impl TrialSegment {
    /// Samples per channel
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn samples_per_channel(&self) -> usize {
        (self.end - self.start) as usize
    }

    /// Values of the `k`-th segmented channel
    #[must_use]
    pub fn channel(&self, k: usize) -> &[f64] {
        let n = self.samples_per_channel();
        self.values.get(k * n..(k + 1) * n).unwrap_or(&[])
    }

    /// Seconds from trial start of each sample
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn timestamps(&self) -> Vec<f64> {
        (0..self.samples_per_channel())
            .map(|i| i as f64 / self.sample_rate)
            .collect()
    }

    /// Concatenate the `k`-th channel of consecutive segments
    #[must_use]
    pub fn concat(segments: &[Self], k: usize) -> Vec<f64> {
        segments.iter().flat_map(|s| s.channel(k).iter().copied()).collect()
    }
}

/// Cut `channels` of `stream` into one raw segment per trial start.
///
/// Each segment carries the trial number of its start, not its position.
///
/// # Errors
///
/// - [`AvailabilityError::NoTrialStarts`] if `starts` is empty
/// - [`AvailabilityError::BitcodeTrialMismatch`] if `starts` has a different
///   number of trial labels and samples
/// - [`AvailabilityError::InvalidTrialStarts`] if starts are not strictly
///   increasing or fall outside the stream
/// - [`AvailabilityError::ChannelOutOfRange`] for unknown channels
/// - I/O errors from the stream
///
/// Nothing is returned unless every trial was read.
pub fn segment_trials<S>(stream: &mut S, starts: &TrialStarts, channels: &[usize]) -> SyncResult<Vec<RawSegment>>
where
    S: AcquisitionStream + ?Sized,
{
    if starts.is_empty() {
        return Err(AvailabilityError::NoTrialStarts.into());
    }
    if starts.trials.len() != starts.samples.len() {
        return Err(AvailabilityError::BitcodeTrialMismatch {
            decoded: starts.samples.len(),
            trials: starts.trials.len(),
        }
        .into());
    }

    let stream_len = stream.sample_count();
    let mut previous: Option<u64> = None;
    for (index, &sample) in starts.samples.iter().enumerate() {
        if sample >= stream_len || previous.is_some_and(|p| sample <= p) {
            return Err(AvailabilityError::InvalidTrialStarts { index, sample, stream_len }.into());
        }
        previous = Some(sample);
    }

    let conversions = channels
        .iter()
        .map(|&c| stream.conversion(c))
        .collect::<SyncResult<Vec<f64>>>()?;

    let sample_rate = stream.sample_rate();
    let sensor_type = stream.sensor_type();
    let ends = starts.samples.iter().skip(1).copied().chain(std::iter::once(stream_len));

    let mut segments = Vec::with_capacity(starts.len());
    for ((&trial, &start), end) in starts.trials.iter().zip(&starts.samples).zip(ends) {
        let mut counts = Vec::new();
        for &channel in channels {
            counts.extend(stream.read_channel(channel, start..end)?);
        }
        segments.push(RawSegment {
            trial,
            start,
            end,
            sample_rate,
            sensor_type,
            channels: channels.to_vec(),
            conversions: conversions.clone(),
            counts,
        });
    }

    tracing::debug!("Segmented {} trials over {} channel(s)", segments.len(), channels.len());
    Ok(segments)
}
