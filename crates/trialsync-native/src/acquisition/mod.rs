//! Raw acquisition streams
//!
//! The engine only needs a handful of operations from an acquisition file:
//! header facts (sample rate, channel count, sensor type, per-channel
//! conversion) and a random-access read of one channel over a sample
//! range. [`AcquisitionStream`] is that seam.
//!
//! - [`SpikeGlxStream`]: interleaved `int16` `.bin` file with a `.meta` header
//! - [`InMemoryStream`]: samples already held in memory

pub mod gain;
pub mod memory;
pub mod meta;
pub mod spikeglx;

use std::ops::Range;

pub use gain::SensorType;
pub use memory::InMemoryStream;
pub use meta::MetaData;
pub use spikeglx::SpikeGlxStream;

use crate::error::SyncResult;

/// Read-only access to a multi-channel sample buffer.
pub trait AcquisitionStream {
    /// Samples per second per channel
    fn sample_rate(&self) -> f64;

    /// Saved channels
    fn channel_count(&self) -> usize;

    /// Samples per channel
    fn sample_count(&self) -> u64;

    /// Declared sensor type
    fn sensor_type(&self) -> SensorType;

    /// Volts per ADC count of `channel`
    ///
    /// # Errors
    ///
    /// Returns `ChannelOutOfRange` for channels the stream does not have.
    fn conversion(&self, channel: usize) -> SyncResult<f64>;

    /// Raw counts of `channel` over `range` (sample indices)
    ///
    /// # Errors
    ///
    /// Returns `ChannelOutOfRange` for unknown channels and I/O errors from
    /// the underlying storage.
    fn read_channel(&mut self, channel: usize, range: Range<u64>) -> SyncResult<Vec<i16>>;

    /// Stream duration in seconds
    #[allow(clippy::cast_precision_loss)]
    fn duration(&self) -> f64 {
        self.sample_count() as f64 / self.sample_rate()
    }
}

/// Check `channel` against `available`
pub(crate) fn check_channel(channel: usize, available: usize) -> SyncResult<()> {
    if channel < available {
        Ok(())
    } else {
        Err(trialsync_core::error::AvailabilityError::ChannelOutOfRange { channel, available }.into())
    }
}

/// Clamp `range` to `[0, len)`
pub(crate) fn clamp_range(range: Range<u64>, len: u64) -> Range<u64> {
    let end = range.end.min(len);
    range.start.min(end)..end
}
