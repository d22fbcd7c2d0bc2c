//! Trialsync Core - `no_std` trial records and synchronization algorithms
//!
//! This crate holds the pure half of the trial-synchronization engine: the
//! per-session records it reads, the fixed vocabularies of the behavioral
//! rig, and every algorithm that does not touch a file. It builds without
//! the standard library (only `alloc`), so the same tables can be shared
//! with tooling that runs outside a full host environment.
//!
//! # Modules
//!
//! - [`types`]: Keys and vocabulary enums (ports, outcomes, events, sides)
//! - [`session`]: Session, trial, event, note and block records
//! - [`photostim`]: Photostim protocols and the laterality resolver
//! - [`condition`]: Condition table and the trial-set resolver
//! - [`align`]: Alignment table, bitcode fallback and reference times
//! - [`quantile`]: Equal-frequency partitioning of latent variables
//! - [`latent`]: Latent-variable tables from a fitted behavioral model
//! - [`period`]: Task periods between trial events
//! - [`error`]: Configuration, availability and ambiguity errors
//!
//! # Features
//!
//! - `std`: Enable standard library support (`std::error::Error` impls)
//!
//! # Example
//!
//! ```rust
//! use trialsync_core::condition::{ConditionRequest, OutcomeFilter, RelativePort};
//! use trialsync_core::types::Hemisphere;
//!
//! let request = ConditionRequest::new(RelativePort::Contra, OutcomeFilter::Hit, true);
//! assert_eq!(request.resolve(Hemisphere::Left).name(), "R_hit_noearlylick");
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod align;
pub mod condition;
pub mod error;
pub mod latent;
pub mod period;
pub mod photostim;
pub mod quantile;
pub mod session;
pub mod types;

// Re-export commonly used types at crate root
pub use align::{AlignType, AlignedTrials, AlignmentTable, ConditionResolver, TrialReference};
pub use condition::{ConditionRequest, SelectedTrial, TrialCondition};
pub use error::{AmbiguityError, AvailabilityError, ConfigError, EngineError, EngineResult, ErrorKind};
pub use latent::LatentVariableTable;
pub use period::{Period, PeriodTable};
pub use photostim::{LateralityCache, PhotostimBrainRegion, PhotostimLocation};
pub use quantile::{LatentGroup, QuantilePartition, TrialGroup};
pub use session::{RecordedUnit, SessionRecords};
pub use types::{Hemisphere, Laterality, SessionKey, UnitKey};
