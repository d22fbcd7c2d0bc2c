//! Trialsync Native - Host-side acquisition I/O and session synchronization
//!
//! This crate does everything that needs files or heavier numerics on top
//! of `trialsync-core`:
//! - Reading SpikeGLX-style `.bin`/`.meta` acquisition streams
//! - Decoding trial-start bitcodes and locking them to behavior trials
//! - Cutting channels into gain-corrected per-trial segments
//! - Period tuning regression against latent variables
//!
//! # Modules
//!
//! - [`acquisition`]: Stream trait, file and in-memory streams, gain tables
//! - [`bitcode`]: Pulse-code decoding and trial synchronization
//! - [`segment`]: Per-trial segmentation and gain correction
//! - [`locate`]: Session folder lookup over rig data roots
//! - [`pipeline`]: One-session synchronization pipeline
//! - [`regression`]: Least-squares fit of firing rate on latent variables
//! - [`config`]: TOML engine configuration

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod acquisition;
pub mod bitcode;
pub mod config;
pub mod error;
pub mod locate;
pub mod pipeline;
pub mod regression;
pub mod segment;

// Re-export key types
pub use acquisition::{AcquisitionStream, InMemoryStream, SensorType, SpikeGlxStream};
pub use bitcode::{BitcodeScheme, DecodedBitcode, TrialStarts};
pub use config::EngineConfig;
pub use error::{SyncError, SyncResult};
pub use pipeline::{SessionPipeline, SessionSegments};
pub use regression::{LinearFit, PeriodActivity};
pub use segment::{RawSegment, SignalUnit, TrialSegment};
