//! Period tuning regression
//!
//! Relates a unit's firing rate in a task period to latent variables of a
//! fitted behavioral model with ordinary least squares:
//! `y = b0 + b1 * x1 + b2 * x2 + ...`.

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};
use trialsync_core::latent::LatentVariableTable;

use crate::error::{SyncError, SyncResult};

/// Name of the intercept column
pub const INTERCEPT: &str = "const";

/// Firing rates paired with latent-variable rows, one per trial.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeriodActivity {
    /// Trial numbers
    pub trials: Vec<u16>,
    /// Firing rate per trial (spikes/s)
    pub firing: Vec<f64>,
    /// Regressor names
    pub names: Vec<String>,
    /// Regressor values per trial
    pub rows: Vec<Vec<f64>>,
}

/// Pair latent-variable estimates with period firing rates.
///
/// Model trials beyond the last trial with neural data are cut off (the
/// recording is assumed to start with the first behavior trial). Trials
/// with no firing rate or a non-finite estimate are left out.
///
/// # Errors
///
/// Returns the `UnknownVariable` configuration error for names the model
/// does not have.
pub fn align_period_activity<S: AsRef<str>>(
    table: &LatentVariableTable,
    variables: &[S],
    firing: &BTreeMap<u16, f64>,
) -> SyncResult<PeriodActivity> {
    let series = variables
        .iter()
        .map(|v| table.variable(v.as_ref()).map(|var| &var.values))
        .collect::<Result<Vec<_>, _>>()?;

    let last_ephys_trial = firing.keys().next_back().copied().unwrap_or(0);
    let model_trials = series.first().map(|s| s.keys().copied().collect::<Vec<u16>>()).unwrap_or_default();

    let mut activity = PeriodActivity {
        trials: Vec::new(),
        firing: Vec::new(),
        names: variables.iter().map(|v| v.as_ref().to_string()).collect(),
        rows: Vec::new(),
    };

    for trial in model_trials.into_iter().filter(|&t| t <= last_ephys_trial) {
        let Some(&rate) = firing.get(&trial) else {
            continue;
        };
        let row: Option<Vec<f64>> = series
            .iter()
            .map(|s| s.get(&trial).copied().filter(|v| v.is_finite()))
            .collect();
        if let Some(row) = row {
            activity.trials.push(trial);
            activity.firing.push(rate);
            activity.rows.push(row);
        }
    }

    Ok(activity)
}

// ============================================================================
// Least Squares
// ============================================================================

/// Estimate for one column of the design matrix.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coefficient {
    /// Column name
    pub name: String,
    /// Estimate
    pub value: f64,
    /// Standard error
    pub std_err: f64,
    /// t statistic
    pub t_value: f64,
    /// Two-sided p value
    pub p_value: f64,
}

/// Pearson correlation of one regressor with the response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    /// Regressor name
    pub name: String,
    /// Pearson r
    pub r: f64,
    /// Two-sided p value
    pub p_value: f64,
}

/// Result of [`linear_fit`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    /// Coefficients, intercept first if fitted
    pub coefficients: Vec<Coefficient>,
    /// Coefficient of determination
    pub r_squared: f64,
    /// Adjusted r²
    pub r_squared_adj: f64,
    /// Per-regressor Pearson correlation (intercept excluded)
    pub correlations: Vec<Correlation>,
    /// Samples used
    pub n_samples: usize,
}

impl LinearFit {
    /// Coefficient by column name
    #[must_use]
    pub fn coefficient(&self, name: &str) -> Option<&Coefficient> {
        self.coefficients.iter().find(|c| c.name == name)
    }
}

fn regression_error(reason: impl Into<String>) -> SyncError {
    SyncError::Regression { reason: reason.into() }
}

fn two_sided_p(t: f64, df: f64) -> SyncResult<f64> {
    if !t.is_finite() {
        return Ok(0.0);
    }
    let dist = StudentsT::new(0.0, 1.0, df).map_err(|e| regression_error(e.to_string()))?;
    Ok(2.0 * (1.0 - dist.cdf(t.abs())))
}

#[allow(clippy::cast_precision_loss)]
fn pearson(x: &[f64], y: &[f64]) -> SyncResult<(f64, f64)> {
    let n = x.len() as f64;
    let mx = x.iter().sum::<f64>() / n;
    let my = y.iter().sum::<f64>() / n;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        sxy += (a - mx) * (b - my);
        sxx += (a - mx).powi(2);
        syy += (b - my).powi(2);
    }
    if sxx == 0.0 || syy == 0.0 {
        return Ok((f64::NAN, f64::NAN));
    }
    let r = (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0);
    let df = n - 2.0;
    let t = r * (df / (1.0 - r * r)).sqrt();
    Ok((r, two_sided_p(t, df)?))
}

/// Ordinary least squares of `y` on the columns of `rows`.
///
/// # Errors
///
/// Returns [`SyncError::Regression`] when rows are ragged, there are no
/// more samples than parameters, or the design matrix is singular.
#[allow(clippy::cast_precision_loss)]
pub fn linear_fit<S: AsRef<str>>(y: &[f64], rows: &[Vec<f64>], names: &[S], intercept: bool) -> SyncResult<LinearFit> {
    let n = y.len();
    let k = names.len();
    if rows.len() != n || rows.iter().any(|r| r.len() != k) {
        return Err(regression_error(format!("design matrix is not {n} x {k}")));
    }
    let offset = usize::from(intercept);
    let p = k + offset;
    if n <= p {
        return Err(regression_error(format!("{n} samples for {p} parameters")));
    }

    let x = DMatrix::from_fn(n, p, |i, j| if j < offset { 1.0 } else { rows[i][j - offset] });
    let yv = DVector::from_column_slice(y);
    let xtx_inv = (x.transpose() * &x)
        .try_inverse()
        .ok_or_else(|| regression_error("singular design matrix"))?;
    let beta = &xtx_inv * x.transpose() * &yv;

    let residuals = &yv - &x * &beta;
    let ssr = residuals.norm_squared();
    let df_resid = (n - p) as f64;
    let sigma2 = ssr / df_resid;

    let mut coefficients = Vec::with_capacity(p);
    for j in 0..p {
        let name = if j < offset { INTERCEPT.to_string() } else { names[j - offset].as_ref().to_string() };
        let std_err = (sigma2 * xtx_inv[(j, j)]).sqrt();
        let t_value = beta[j] / std_err;
        coefficients.push(Coefficient { name, value: beta[j], std_err, t_value, p_value: two_sided_p(t_value, df_resid)? });
    }

    // centred total sum of squares with an intercept, uncentred without
    let sst = if intercept {
        let mean = yv.mean();
        yv.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
    } else {
        yv.norm_squared()
    };
    let r_squared = if sst > 0.0 { 1.0 - ssr / sst } else { f64::NAN };
    let r_squared_adj = 1.0 - (n - offset) as f64 / df_resid * (1.0 - r_squared);

    let correlations = (0..k)
        .map(|j| {
            let column: Vec<f64> = rows.iter().map(|r| r[j]).collect();
            let (r, p_value) = pearson(&column, y)?;
            Ok(Correlation { name: names[j].as_ref().to_string(), r, p_value })
        })
        .collect::<SyncResult<Vec<_>>>()?;

    Ok(LinearFit { coefficients, r_squared, r_squared_adj, correlations, n_samples: n })
}
