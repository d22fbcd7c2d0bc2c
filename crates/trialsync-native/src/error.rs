//! Error types for host-side synchronization
//!
//! Error types for acquisition I/O, header parsing, configuration and
//! regression using `thiserror`. Engine errors from `trialsync-core` pass
//! through unchanged.

use std::path::PathBuf;

use thiserror::Error;
use trialsync_core::error::{EngineError, ErrorKind};

/// Synchronization error types
#[derive(Error, Debug)]
pub enum SyncError {
    /// Error raised by a pure engine component
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Reading an acquisition or configuration file failed
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Acquisition header is missing a key or holds an unparsable value
    #[error("Invalid acquisition header {}: {reason}", path.display())]
    Header {
        /// Header file
        path: PathBuf,
        /// What was wrong
        reason: String,
    },

    /// Configuration file could not be parsed
    #[error("Invalid configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration could not be serialized
    #[error("Configuration serialization failed: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// Least-squares fit impossible for the given data
    #[error("Regression failed: {reason}")]
    Regression {
        /// Reason for failure
        reason: String,
    },
}

impl SyncError {
    /// Build an I/O error for `path`
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    /// Build a header error for `path`
    pub fn header(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Header { path: path.into(), reason: reason.into() }
    }

    /// Error family, on the same taxonomy as [`EngineError::kind`]
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Engine(e) => e.kind(),
            Self::Io { .. } | Self::Header { .. } | Self::Regression { .. } => {
                ErrorKind::DataAvailability
            }
            Self::ConfigParse(_) | Self::ConfigSerialize(_) => ErrorKind::Configuration,
        }
    }
}

impl From<trialsync_core::error::ConfigError> for SyncError {
    fn from(e: trialsync_core::error::ConfigError) -> Self {
        Self::Engine(e.into())
    }
}

impl From<trialsync_core::error::AvailabilityError> for SyncError {
    fn from(e: trialsync_core::error::AvailabilityError) -> Self {
        Self::Engine(e.into())
    }
}

impl From<trialsync_core::error::AmbiguityError> for SyncError {
    fn from(e: trialsync_core::error::AmbiguityError) -> Self {
        Self::Engine(e.into())
    }
}

/// Result type for synchronization operations
pub type SyncResult<T> = Result<T, SyncError>;
