//! Engine configuration
//!
//! Every entry point takes an [`EngineConfig`] explicitly; there is no
//! process-wide configuration. All sections and fields have defaults so a
//! partial TOML file is valid.
//!
//! ```toml
//! [acquisition]
//! rig_roots = ["/data/rig1/ephys", "/data/rig2/ephys"]
//! session_dir_templates = ["catgt_{date}_g0", "{date}_g0"]
//! stream_suffix = ".nidq.bin"
//! signal_channels = [2]
//!
//! [acquisition.bitcode]
//! bit_count = 10
//!
//! [alignment]
//! bitcode_time_correction = 0.0
//!
//! [analysis]
//! quantile_groups = 5
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use trialsync_core::align::AlignmentTable;

use crate::bitcode::BitcodeScheme;
use crate::error::{SyncError, SyncResult};

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Where acquisition files live and how to read them
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    /// Alignment table adjustments
    #[serde(default)]
    pub alignment: AlignmentConfig,
    /// Grouped-analysis defaults
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Io`] if the file cannot be read and
    /// [`SyncError::ConfigParse`] if it is not valid configuration.
    pub fn load(path: &Path) -> SyncResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| SyncError::io(path, e))?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ConfigParse`] for invalid TOML or field types.
    pub fn from_toml_str(text: &str) -> SyncResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Serialize to TOML text
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ConfigSerialize`] if serialization fails.
    pub fn to_toml_string(&self) -> SyncResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Standard alignment table with this configuration's adjustments
    #[must_use]
    pub fn alignment_table(&self) -> AlignmentTable {
        AlignmentTable::standard().with_bitcode_correction(self.alignment.bitcode_time_correction)
    }
}

/// Acquisition file layout and channel selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Rig data roots, searched in order
    pub rig_roots: Vec<PathBuf>,
    /// Session folder names under `<root>/<h2o>/`; `{h2o}` and `{date}`
    /// (YYYYMMDD) are substituted
    pub session_dir_templates: Vec<String>,
    /// File name suffix of the stream to open inside the session folder
    pub stream_suffix: String,
    /// Channels to segment
    pub signal_channels: Vec<usize>,
    /// Channel carrying the digital word; the last saved channel if unset
    pub bitcode_channel: Option<usize>,
    /// Bitcode timing
    pub bitcode: BitcodeScheme,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            rig_roots: Vec::new(),
            session_dir_templates: vec!["catgt_{date}_g0".to_string(), "{date}_g0".to_string()],
            stream_suffix: ".nidq.bin".to_string(),
            signal_channels: vec![2],
            bitcode_channel: None,
            bitcode: BitcodeScheme::default(),
        }
    }
}

/// Alignment table adjustments.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    /// Seconds added to every bitcode-locked alignment type
    pub bitcode_time_correction: f64,
}

/// Defaults for grouped analyses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Quantile groups per latent variable
    pub quantile_groups: usize,
    /// Trials between a latent estimate and the activity it is compared to
    pub latent_trial_offset: i32,
    /// Drop early-lick trials from condition requests
    pub exclude_early_lick: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self { quantile_groups: 5, latent_trial_offset: 0, exclude_early_lick: false }
    }
}
