//! Per-session synchronization pipeline
//!
//! Locate the session folder, open the acquisition stream, decode its
//! bitcodes, lock them to the controller's per-trial bitcodes and cut the
//! configured channels into gain-corrected trial segments. Any failure
//! aborts the session; skipping it and moving on is the caller's decision.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use trialsync_core::session::SessionRecords;
use trialsync_core::types::SessionKey;

use crate::acquisition::{AcquisitionStream, SpikeGlxStream};
use crate::bitcode::{read_bitcodes, synchronize, TrialStarts};
use crate::config::EngineConfig;
use crate::error::SyncResult;
use crate::locate::{find_stream, locate_session_dir};
use crate::segment::{segment_trials, RawSegment, TrialSegment};

/// Segmented signal of one session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSegments {
    /// Session
    pub session: SessionKey,
    /// Acquisition file the segments were read from
    pub stream_path: Option<PathBuf>,
    /// Trial starts on the acquisition clock
    pub starts: TrialStarts,
    /// One segment per trial, in trial order
    pub segments: Vec<TrialSegment>,
}

/// Runs the synchronization steps for one session at a time.
#[derive(Clone, Debug, Default)]
pub struct SessionPipeline {
    config: EngineConfig,
}

impl SessionPipeline {
    /// Create a pipeline
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Acquisition file of a session
    ///
    /// # Errors
    ///
    /// Returns `SessionFolderNotFound` or `StreamNotFound` when the files
    /// are missing.
    pub fn stream_path(&self, records: &SessionRecords) -> SyncResult<PathBuf> {
        let acq = &self.config.acquisition;
        let session = &records.session;
        let dir = locate_session_dir(acq, &session.water_restriction, session.date)?;
        find_stream(&dir, &acq.stream_suffix, session)
    }

    /// Locate, open and segment a session's acquisition stream.
    ///
    /// The stream is closed before this returns, whether or not it succeeds.
    ///
    /// # Errors
    ///
    /// Any locate, header, bitcode or segmentation error; no partial
    /// output is produced.
    pub fn segment_session(&self, records: &SessionRecords) -> SyncResult<SessionSegments> {
        let path = self.stream_path(records)?;
        let mut segments = self.segment_file(records, &path)?;
        segments.stream_path = Some(path);
        Ok(segments)
    }

    fn segment_file(&self, records: &SessionRecords, path: &Path) -> SyncResult<SessionSegments> {
        let mut stream = SpikeGlxStream::open(path)?;
        self.segment_stream(records, &mut stream)
    }

    /// Trial starts of `records` on the clock of `stream`
    ///
    /// # Errors
    ///
    /// Returns record-validation, bitcode and stream errors.
    pub fn trial_starts<S>(&self, records: &SessionRecords, stream: &mut S) -> SyncResult<TrialStarts>
    where
        S: AcquisitionStream + ?Sized,
    {
        records.validate()?;
        let expected = records.behavior_bitcodes()?;

        let acq = &self.config.acquisition;
        let channel = acq
            .bitcode_channel
            .unwrap_or_else(|| stream.channel_count().saturating_sub(1));
        let decoded = read_bitcodes(stream, channel, &acq.bitcode)?;

        tracing::info!(
            "Session {}: {} bitcodes decoded for {} behavior trials",
            records.key(),
            decoded.len(),
            expected.len()
        );
        Ok(synchronize(&expected, &decoded, stream.sample_rate())?)
    }

    /// Synchronize and segment an already open stream
    ///
    /// # Errors
    ///
    /// Returns bitcode, channel and stream errors.
    pub fn segment_stream<S>(&self, records: &SessionRecords, stream: &mut S) -> SyncResult<SessionSegments>
    where
        S: AcquisitionStream + ?Sized,
    {
        let starts = self.trial_starts(records, stream)?;
        let segments: Vec<TrialSegment> = segment_trials(stream, &starts, &self.config.acquisition.signal_channels)?
            .into_iter()
            .map(RawSegment::gain_correct)
            .collect();

        tracing::info!("Session {}: {} trial segments", records.key(), segments.len());
        Ok(SessionSegments { session: records.key(), stream_path: None, starts, segments })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::spikeglx::tests::write_nidq;
    use crate::acquisition::{InMemoryStream, SensorType};
    use crate::bitcode::tests::encode;
    use crate::bitcode::BitcodeScheme;
    use crate::error::SyncError;
    use crate::segment::SignalUnit;
    use std::fs;
    use trialsync_core::error::{AvailabilityError, EngineError};
    use trialsync_core::session::{BehaviorTrial, Session, SessionDate, SessionTime, SessionTrial, TrialNote};
    use trialsync_core::types::{EarlyLick, Outcome, TrialInstruction, TrialNoteType, WaterPort};

    const RATE: f64 = 1000.0;

    fn records(bitcodes: &[u32]) -> SessionRecords {
        let n = u16::try_from(bitcodes.len()).unwrap();
        SessionRecords {
            session: Session {
                key: SessionKey::new(473_361, 47),
                water_restriction: "HH09".into(),
                date: SessionDate::new(2021, 3, 8),
                time: SessionTime::default(),
                rig: "RRig-MTL".into(),
                username: "HH".into(),
            },
            trials: (1..=n)
                .map(|t| SessionTrial {
                    trial: t,
                    trial_uid: u32::from(t),
                    start_time: f64::from(t),
                    stop_time: f64::from(t) + 1.0,
                })
                .collect(),
            behavior: (1..=n)
                .map(|t| BehaviorTrial {
                    trial: t,
                    task: "multi-target-licking".into(),
                    task_protocol: 1,
                    trial_instruction: TrialInstruction::None,
                    early_lick: EarlyLick::NoEarly,
                    outcome: Outcome::Hit,
                    auto_water: false,
                    free_water: false,
                    water_port: Some(WaterPort::Left),
                })
                .collect(),
            events: Vec::new(),
            actions: Vec::new(),
            notes: bitcodes
                .iter()
                .zip(1..=n)
                .map(|(code, t)| TrialNote {
                    trial: t,
                    note_type: TrialNoteType::Bitcode,
                    note: format!("{code:010b}"),
                })
                .collect(),
            blocks: Vec::new(),
        }
    }

    /// Signal on channel 0, digital word on channel 1, codes every 1000 samples
    fn channels(bitcodes: &[u32], len: usize) -> Vec<Vec<i16>> {
        let onsets: Vec<(usize, u32)> = bitcodes.iter().enumerate().map(|(i, &c)| (200 + i * 1000, c)).collect();
        let digital = encode(len, &onsets, RATE, &BitcodeScheme::default());
        let signal: Vec<i16> = (0..len).map(|i| (i % 500) as i16).collect();
        vec![signal, digital]
    }

    fn config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.acquisition.signal_channels = vec![0];
        config
    }

    #[test]
    fn test_segment_in_memory_stream() {
        let codes = [3, 900, 17, 512];
        let mut stream = InMemoryStream::new(RATE, SensorType::Nidq, 1e-3, channels(&codes, 4_600));
        let pipeline = SessionPipeline::new(config());

        let out = pipeline.segment_stream(&records(&codes), &mut stream).unwrap();
        assert_eq!(out.starts.samples, vec![200, 1200, 2200, 3200]);
        assert_eq!(out.segments.len(), 4);
        assert_eq!(out.segments[3].end, 4_600);
        assert_eq!(out.segments[0].unit, SignalUnit::Millivolts);
        // 1e-3 V per count in mV is the raw count
        assert!((out.segments[0].values[1] - 201.0).abs() < 1e-9);
    }

    #[test]
    fn test_segments_follow_trial_numbers_past_photostim_only_trial() {
        let codes = [3, 900, 17];
        let mut recs = records(&[0, 3, 900, 17]);
        // trial 1 is photostim-only: no behavior row and no bitcode
        recs.behavior.retain(|b| b.trial != 1);
        recs.notes.retain(|n| n.trial != 1);

        let mut stream = InMemoryStream::new(RATE, SensorType::Nidq, 1e-3, channels(&codes, 3_600));
        let out = SessionPipeline::new(config()).segment_stream(&recs, &mut stream).unwrap();

        assert_eq!(out.starts.trials, vec![2, 3, 4]);
        let labels: Vec<u16> = out.segments.iter().map(|s| s.trial).collect();
        assert_eq!(labels, vec![2, 3, 4]);
        assert_eq!((out.segments[0].start, out.segments[0].end), (200, 1200));
    }

    #[test]
    fn test_fewer_bitcodes_than_trials_aborts() {
        let codes = [3, 900, 17];
        let mut stream = InMemoryStream::new(RATE, SensorType::Nidq, 1e-3, channels(&codes[..2], 3_000));
        let pipeline = SessionPipeline::new(config());

        let err = pipeline.segment_stream(&records(&codes), &mut stream).unwrap_err();
        assert!(matches!(
            err,
            SyncError::Engine(EngineError::Availability(AvailabilityError::BitcodeTrialMismatch {
                decoded: 2,
                trials: 3
            }))
        ));
    }

    #[test]
    fn test_segment_session_from_disk() {
        let rig = tempfile::tempdir().unwrap();
        let session_dir = rig.path().join("HH09").join("catgt_20210308_g0");
        fs::create_dir_all(&session_dir).unwrap();

        let codes = [5, 6, 7];
        write_nidq(&session_dir, "20210308_g0_t0", &channels(&codes, 3_500), RATE);

        let mut config = config();
        config.acquisition.rig_roots = vec![rig.path().to_path_buf()];
        let pipeline = SessionPipeline::new(config);

        let out = pipeline.segment_session(&records(&codes)).unwrap();
        assert_eq!(out.starts.len(), 3);
        assert_eq!(out.segments[2].end, 3_500);
        assert!(out.stream_path.is_some_and(|p| p.ends_with("20210308_g0_t0.nidq.bin")));
    }

    #[test]
    fn test_missing_session_folder() {
        let rig = tempfile::tempdir().unwrap();
        let mut config = config();
        config.acquisition.rig_roots = vec![rig.path().to_path_buf()];
        let pipeline = SessionPipeline::new(config);

        let err = pipeline.segment_session(&records(&[1])).unwrap_err();
        assert_eq!(err.kind(), trialsync_core::error::ErrorKind::DataAvailability);
    }
}
