//! Named task periods between two trial events

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::session::SessionRecords;
use crate::types::TrialEventType;

/// A window from one trial event to another, each with a time shift.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Period {
    /// Period name, e.g. `delay`
    pub name: String,
    /// Event opening the window
    pub start_event: TrialEventType,
    /// Seconds added to the start event
    #[serde(default)]
    pub start_shift: f64,
    /// Event closing the window
    pub end_event: TrialEventType,
    /// Seconds added to the end event
    #[serde(default)]
    pub end_shift: f64,
}

impl Period {
    /// Create a period
    #[must_use]
    pub fn new(name: &str, start_event: TrialEventType, start_shift: f64, end_event: TrialEventType, end_shift: f64) -> Self {
        Self { name: name.into(), start_event, start_shift, end_event, end_shift }
    }

    /// `(start, end)` of this period in `trial`, seconds from trial start.
    ///
    /// `None` if either event is missing from the trial.
    #[must_use]
    pub fn window(&self, records: &SessionRecords, trial: u16) -> Option<(f64, f64)> {
        let start = records.event_time(trial, self.start_event)? + self.start_shift;
        let end = records.event_time(trial, self.end_event)? + self.end_shift;
        Some((start, end))
    }
}

/// Known periods.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeriodTable {
    periods: Vec<Period>,
}

impl PeriodTable {
    /// `sample` (sample → delay), `delay` (delay → go) and `response`
    /// (go → go + 1.2 s)
    #[must_use]
    pub fn standard() -> Self {
        use TrialEventType::{Delay, Go, Sample};
        Self {
            periods: vec![
                Period::new("sample", Sample, 0.0, Delay, 0.0),
                Period::new("delay", Delay, 0.0, Go, 0.0),
                Period::new("response", Go, 0.0, Go, 1.2),
            ],
        }
    }

    /// Look up a period by name
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownPeriod`] for names not in the table.
    pub fn lookup(&self, name: &str) -> Result<&Period, ConfigError> {
        self.periods
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| ConfigError::UnknownPeriod { name: name.into() })
    }

    /// All periods
    #[must_use]
    pub fn periods(&self) -> &[Period] {
        &self.periods
    }
}

impl Default for PeriodTable {
    fn default() -> Self {
        Self::standard()
    }
}
