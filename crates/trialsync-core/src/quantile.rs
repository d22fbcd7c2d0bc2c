//! Equal-frequency partitioning of a per-trial series
//!
//! Edges are linear-interpolated sample quantiles at `i / k`. Duplicate
//! edges are dropped, so ties can collapse bins and yield fewer than `k`
//! groups. Bins are right-closed with the lowest edge included. Bins left
//! empty are removed and the remaining groups renumbered `0..n` in value
//! order, so group 0 always holds the smallest values.

use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

use crate::condition::{shift_trials, SelectedTrial};
use crate::error::{AmbiguityError, ConfigError, EngineResult};
use crate::latent::LatentVariableTable;
use crate::session::RecordedUnit;

/// Result of [`partition`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuantilePartition {
    /// Group per input value, `None` for non-finite values
    pub groups: Vec<Option<usize>>,
    /// Value range `(low, high]` per group (the first is closed below)
    pub ranges: Vec<(f64, f64)>,
}

impl QuantilePartition {
    /// Number of non-empty groups
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.ranges.len()
    }

    /// Indices of the input values assigned to `group`
    #[must_use]
    pub fn members(&self, group: usize) -> Vec<usize> {
        self.groups
            .iter()
            .enumerate()
            .filter_map(|(i, g)| (*g == Some(group)).then_some(i))
            .collect()
    }
}

/// Split `values` into at most `k` equal-frequency groups.
///
/// # Errors
///
/// - [`ConfigError::InvalidGroupCount`] if `k` is 0
/// - [`AmbiguityError::InsufficientVariation`] if fewer than two distinct
///   finite values are present
#[allow(clippy::cast_precision_loss)]
pub fn partition(values: &[f64], k: usize) -> EngineResult<QuantilePartition> {
    if k == 0 {
        return Err(ConfigError::InvalidGroupCount { requested: k }.into());
    }

    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_unstable_by(f64::total_cmp);

    let mut distinct = sorted.clone();
    distinct.dedup();
    if distinct.len() < 2 {
        return Err(AmbiguityError::InsufficientVariation { distinct: distinct.len() }.into());
    }

    let mut edges: Vec<f64> = (0..=k)
        .map(|i| quantile(&sorted, i as f64 / k as f64))
        .collect();
    edges.dedup();

    let bin_of = |v: f64| -> usize {
        // first upper edge >= v; the lowest edge is included in bin 0
        edges[1..].partition_point(|&e| e < v).min(edges.len() - 2)
    };

    let mut occupied = alloc::vec![false; edges.len() - 1];
    for &v in &sorted {
        occupied[bin_of(v)] = true;
    }

    let mut renumber = alloc::vec![None; occupied.len()];
    let mut ranges = Vec::new();
    for (bin, &used) in occupied.iter().enumerate() {
        if used {
            renumber[bin] = Some(ranges.len());
            ranges.push((edges[bin], edges[bin + 1]));
        }
    }

    let groups = values
        .iter()
        .map(|&v| if v.is_finite() { renumber[bin_of(v)] } else { None })
        .collect();

    Ok(QuantilePartition { groups, ranges })
}

/// Linear-interpolated quantile of sorted, non-empty `sorted`
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

// ============================================================================
// Latent-Variable Groups
// ============================================================================

/// Source trials of one quantile group, before any trial offset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LatentGroup {
    /// 0-based group index, in value order
    pub group: usize,
    /// Value range of the group
    pub range: (f64, f64),
    /// Trials whose estimate falls in the group
    pub source_trials: Vec<u16>,
}

/// Partition a latent variable into `k` groups of source trials.
///
/// Trials with non-finite estimates are left out. No offset is applied, so
/// callers that shift the trials themselves intersect with the unit once.
///
/// # Errors
///
/// Returns [`ConfigError::UnknownVariable`] for unknown variables and the
/// errors of [`partition`].
pub fn latent_groups(table: &LatentVariableTable, variable: &str, k: usize) -> EngineResult<Vec<LatentGroup>> {
    let series = table.series(variable)?;
    let values: Vec<f64> = series.iter().map(|(_, v)| *v).collect();
    let split = partition(&values, k)?;

    Ok(split
        .ranges
        .iter()
        .enumerate()
        .map(|(group, &range)| LatentGroup {
            group,
            range,
            source_trials: split.members(group).into_iter().map(|i| series[i].0).collect(),
        })
        .collect())
}

/// Trials of one quantile group, addressed after the trial offset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrialGroup {
    /// 0-based group index, in value order
    pub group: usize,
    /// Value range of the group
    pub range: (f64, f64),
    /// Selected trials, `trial = source_trial + offset`
    pub trials: Vec<SelectedTrial>,
}

/// Partition a latent variable into `k` groups and map each group's trials
/// onto the unit's trials with `offset`.
///
/// A variable estimated at trial `t` compared with activity at `t + offset`
/// goes through the same shift/intersect rule as condition selection.
///
/// # Errors
///
/// Returns the errors of [`latent_groups`].
pub fn group_trials(
    table: &LatentVariableTable,
    variable: &str,
    k: usize,
    offset: i32,
    unit: &RecordedUnit,
) -> EngineResult<Vec<TrialGroup>> {
    Ok(latent_groups(table, variable, k)?
        .into_iter()
        .map(|g| TrialGroup { group: g.group, range: g.range, trials: shift_trials(g.source_trials, offset, unit) })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::tests::unit;
    use crate::error::EngineError;
    use crate::types::Hemisphere;
    use alloc::vec;

    #[test]
    fn test_five_unique_values_five_groups() {
        let values: Vec<f64> = (0..100).map(|i| f64::from(i % 5 + 1)).collect();
        let split = partition(&values, 5).unwrap();

        assert_eq!(split.group_count(), 5);
        assert!(split.groups.iter().all(Option::is_some));
        for (v, g) in values.iter().zip(&split.groups) {
            // value 1 -> group 0, ..., value 5 -> group 4
            assert_eq!(*g, Some(*v as usize - 1));
        }
        for g in 0..5 {
            assert_eq!(split.members(g).len(), 20);
        }
    }

    #[test]
    fn test_identical_values_refused() {
        let values = vec![0.5; 100];
        assert_eq!(
            partition(&values, 5),
            Err(AmbiguityError::InsufficientVariation { distinct: 1 }.into())
        );
    }

    #[test]
    fn test_zero_groups_refused() {
        assert!(matches!(
            partition(&[1.0, 2.0], 0),
            Err(EngineError::Config(ConfigError::InvalidGroupCount { requested: 0 }))
        ));
    }

    #[test]
    fn test_non_finite_excluded() {
        let values = [f64::NAN, 1.0, 2.0, f64::INFINITY, 3.0, 4.0];
        let split = partition(&values, 2).unwrap();
        assert_eq!(split.groups[0], None);
        assert_eq!(split.groups[3], None);
        assert_eq!(split.groups[1], Some(0));
        assert_eq!(split.groups[5], Some(1));
    }

    #[test]
    fn test_only_nan_and_one_value_refused() {
        let values = [f64::NAN, 7.0, 7.0];
        assert_eq!(
            partition(&values, 3),
            Err(AmbiguityError::InsufficientVariation { distinct: 1 }.into())
        );
    }

    #[test]
    fn test_ties_collapse_bins() {
        let values: Vec<f64> = (0..100).map(|i| if i < 50 { 0.0 } else { 1.0 }).collect();
        let split = partition(&values, 4).unwrap();
        assert_eq!(split.group_count(), 2);
        assert_eq!(split.ranges, vec![(0.0, 0.5), (0.5, 1.0)]);
    }

    #[test]
    fn test_empty_bins_renumbered() {
        // edges 0, 2.5, 5, 7.5, 10: the middle bins hold nothing
        let split = partition(&[0.0, 10.0], 4).unwrap();
        assert_eq!(split.group_count(), 2);
        assert_eq!(split.groups, vec![Some(0), Some(1)]);
    }

    #[test]
    fn test_groups_monotonic_in_value() {
        let values: Vec<f64> = (0..37).map(|i| f64::from((i * 7919) % 101) / 10.0).collect();
        let split = partition(&values, 4).unwrap();
        for a in 0..values.len() {
            for b in 0..values.len() {
                if values[a] < values[b] {
                    assert!(split.groups[a] <= split.groups[b]);
                }
            }
        }
    }

    #[test]
    fn test_group_trials_with_offset() {
        let mut table = LatentVariableTable::new(1);
        table.insert("q", "value", (1..=10).map(|t| (t, f64::from(t))));
        let u = unit(1..=10, Hemisphere::Left);

        let groups = group_trials(&table, "q", 2, 1, &u).unwrap();
        assert_eq!(groups.len(), 2);
        let low: Vec<u16> = groups[0].trials.iter().map(|s| s.source_trial).collect();
        let high: Vec<u16> = groups[1].trials.iter().map(|s| s.source_trial).collect();
        assert_eq!(low, vec![1, 2, 3, 4, 5]);
        // trial 10 + 1 has no data
        assert_eq!(high, vec![6, 7, 8, 9]);
    }

    #[test]
    fn test_latent_groups_keep_source_trials_unshifted() {
        let mut table = LatentVariableTable::new(1);
        table.insert("q", "value", [(1, 0.1), (2, 0.9), (3, f64::NAN), (4, 0.2), (5, 0.8)]);

        let groups = latent_groups(&table, "q", 2).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].source_trials, vec![1, 4]);
        assert_eq!(groups[1].source_trials, vec![2, 5]);
        assert!(groups[0].range.1 <= groups[1].range.0);
    }

    #[test]
    fn test_group_trials_unknown_variable() {
        let table = LatentVariableTable::new(1);
        let u = unit(1..=10, Hemisphere::Left);
        assert!(matches!(
            group_trials(&table, "rpe", 5, 0, &u),
            Err(EngineError::Config(ConfigError::UnknownVariable { .. }))
        ));
    }
}
