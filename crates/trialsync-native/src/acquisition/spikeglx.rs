//! SpikeGLX binary streams
//!
//! Samples are little-endian `int16`, interleaved by channel (one row of
//! `nSavedChans` values per sample). The file handle is owned by the stream
//! and released when it is dropped, on every exit path.

use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::ops::Range;
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt};

use super::gain::{self, SensorType};
use super::meta::MetaData;
use super::{check_channel, clamp_range, AcquisitionStream};
use crate::error::{SyncError, SyncResult};

/// Rows read per I/O call
const CHUNK_SAMPLES: u64 = 65_536;

/// An open SpikeGLX `.bin` stream and its parsed header.
#[derive(Debug)]
pub struct SpikeGlxStream {
    bin_path: PathBuf,
    reader: BufReader<File>,
    meta: MetaData,
    sensor_type: SensorType,
    sample_rate: f64,
    channel_count: usize,
    sample_count: u64,
    conversions: Vec<f64>,
}

impl SpikeGlxStream {
    /// Open `bin_path` and its sibling `.meta` header.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Io`] if either file cannot be read and
    /// [`SyncError::Header`] if the header lacks a required key.
    pub fn open(bin_path: &Path) -> SyncResult<Self> {
        let meta = MetaData::read(bin_path)?;
        let sensor_type = SensorType::from_meta(&meta)?;
        let sample_rate: f64 = meta.parse_value(sensor_type.sample_rate_key())?;
        let channel_count: usize = meta.parse_value("nSavedChans")?;
        if channel_count == 0 || sample_rate <= 0.0 {
            return Err(SyncError::header(meta.path(), "no saved channels or non-positive sample rate"));
        }

        let conversions = gain::conversions(&meta, sensor_type)?;
        if conversions.len() != channel_count {
            return Err(SyncError::header(
                meta.path(),
                format!("{} gain entries for {channel_count} saved channels", conversions.len()),
            ));
        }

        let file = File::open(bin_path).map_err(|e| SyncError::io(bin_path, e))?;
        let size_bytes = if meta.contains("fileSizeBytes") {
            meta.parse_value("fileSizeBytes")?
        } else {
            file.metadata().map_err(|e| SyncError::io(bin_path, e))?.len()
        };
        let sample_count = size_bytes / (2 * channel_count as u64);

        tracing::debug!(
            "Opened {} ({:?}, {} channels, {} samples at {} Hz)",
            bin_path.display(),
            sensor_type,
            channel_count,
            sample_count,
            sample_rate
        );

        Ok(Self {
            bin_path: bin_path.to_path_buf(),
            reader: BufReader::with_capacity(1 << 16, file),
            meta,
            sensor_type,
            sample_rate,
            channel_count,
            sample_count,
            conversions,
        })
    }

    /// Path of the `.bin` file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.bin_path
    }

    /// Parsed header
    #[must_use]
    pub fn meta(&self) -> &MetaData {
        &self.meta
    }
}

impl AcquisitionStream for SpikeGlxStream {
    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn channel_count(&self) -> usize {
        self.channel_count
    }

    fn sample_count(&self) -> u64 {
        self.sample_count
    }

    fn sensor_type(&self) -> SensorType {
        self.sensor_type
    }

    fn conversion(&self, channel: usize) -> SyncResult<f64> {
        check_channel(channel, self.channel_count)?;
        Ok(self.conversions[channel])
    }

    #[allow(clippy::cast_possible_truncation)]
    fn read_channel(&mut self, channel: usize, range: Range<u64>) -> SyncResult<Vec<i16>> {
        check_channel(channel, self.channel_count)?;
        let range = clamp_range(range, self.sample_count);
        let row = self.channel_count as u64;

        let path = &self.bin_path;
        self.reader
            .seek(SeekFrom::Start(range.start * row * 2))
            .map_err(|e| SyncError::io(path, e))?;

        let mut out = Vec::with_capacity((range.end - range.start) as usize);
        let mut buf = Vec::new();
        let mut remaining = range.end - range.start;
        while remaining > 0 {
            let rows = remaining.min(CHUNK_SAMPLES);
            buf.resize((rows * row) as usize, 0i16);
            self.reader
                .read_i16_into::<LittleEndian>(&mut buf)
                .map_err(|e| SyncError::io(path, e))?;
            out.extend(buf.chunks_exact(self.channel_count).map(|r| r[channel]));
            remaining -= rows;
        }
        Ok(out)
    }
}
