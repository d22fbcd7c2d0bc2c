//! Per-trial latent variables from a fitted behavioral model

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// One named latent variable.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LatentVariable {
    /// Human-readable description for figure labels
    #[serde(default)]
    pub description: String,
    /// Value per trial number; trials without an estimate are absent or NaN
    pub values: BTreeMap<u16, f64>,
}

/// Latent variables of one model fitted to one session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LatentVariableTable {
    /// Fitted model id
    pub model_id: u32,
    /// Variables by name, e.g. `relative_action_value_ic`
    pub variables: BTreeMap<String, LatentVariable>,
}

impl LatentVariableTable {
    /// Create an empty table
    #[must_use]
    pub fn new(model_id: u32) -> Self {
        Self { model_id, variables: BTreeMap::new() }
    }

    /// Add a variable, replacing any previous one with the same name
    pub fn insert<I>(&mut self, name: &str, description: &str, values: I)
    where
        I: IntoIterator<Item = (u16, f64)>,
    {
        self.variables.insert(
            name.into(),
            LatentVariable { description: description.into(), values: values.into_iter().collect() },
        );
    }

    /// Look up a variable
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownVariable`] if the model has no such variable.
    pub fn variable(&self, name: &str) -> Result<&LatentVariable, ConfigError> {
        self.variables
            .get(name)
            .ok_or_else(|| ConfigError::UnknownVariable { name: name.into() })
    }

    /// `(trial, value)` pairs of a variable in trial order
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownVariable`] if the model has no such variable.
    pub fn series(&self, name: &str) -> Result<Vec<(u16, f64)>, ConfigError> {
        Ok(self.variable(name)?.values.iter().map(|(&t, &v)| (t, v)).collect())
    }

    /// Description string of a variable, empty if none was provided
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownVariable`] if the model has no such variable.
    pub fn description(&self, name: &str) -> Result<&str, ConfigError> {
        Ok(self.variable(name)?.description.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_series_in_trial_order() {
        let mut table = LatentVariableTable::new(11);
        table.insert("q_left", "Action value (left)", [(3, 0.3), (1, 0.1), (2, f64::NAN)]);

        let series = table.series("q_left").unwrap();
        assert_eq!(series.iter().map(|(t, _)| *t).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(series[1].1.is_nan());
        assert_eq!(table.description("q_left"), Ok("Action value (left)"));
    }

    #[test]
    fn test_unknown_variable() {
        let table = LatentVariableTable::new(11);
        assert_eq!(
            table.series("rpe"),
            Err(ConfigError::UnknownVariable { name: "rpe".into() })
        );
    }
}
