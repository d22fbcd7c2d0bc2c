//! Acquisition stream backed by in-memory samples

use std::ops::Range;

use super::{check_channel, clamp_range, AcquisitionStream, SensorType};
use crate::error::SyncResult;

/// Channel-major samples held in memory.
#[derive(Clone, Debug, PartialEq)]
pub struct InMemoryStream {
    sample_rate: f64,
    sensor_type: SensorType,
    conversions: Vec<f64>,
    channels: Vec<Vec<i16>>,
}

impl InMemoryStream {
    /// Create a stream with one conversion factor shared by every channel.
    ///
    /// Channels shorter than the longest one are treated as ending early;
    /// [`AcquisitionStream::sample_count`] reports the shortest.
    #[must_use]
    pub fn new(sample_rate: f64, sensor_type: SensorType, conversion: f64, channels: Vec<Vec<i16>>) -> Self {
        let conversions = vec![conversion; channels.len()];
        Self { sample_rate, sensor_type, conversions, channels }
    }

    /// Override per-channel conversion factors
    #[must_use]
    pub fn with_conversions(mut self, conversions: Vec<f64>) -> Self {
        self.conversions = conversions;
        self
    }
}

impl AcquisitionStream for InMemoryStream {
    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn sample_count(&self) -> u64 {
        self.channels.iter().map(|c| c.len() as u64).min().unwrap_or(0)
    }

    fn sensor_type(&self) -> SensorType {
        self.sensor_type
    }

    fn conversion(&self, channel: usize) -> SyncResult<f64> {
        check_channel(channel, self.conversions.len())?;
        Ok(self.conversions[channel])
    }

    #[allow(clippy::cast_possible_truncation)]
    fn read_channel(&mut self, channel: usize, range: Range<u64>) -> SyncResult<Vec<i16>> {
        check_channel(channel, self.channels.len())?;
        let range = clamp_range(range, self.sample_count());
        Ok(self.channels[channel][range.start as usize..range.end as usize].to_vec())
    }
}
