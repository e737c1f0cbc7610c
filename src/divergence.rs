//! Divergence profiling: how often did the spread cross each candidate
//! entry threshold, and how reliably did it come back?
//!
//! The profiler only ever sees z-scores up to the evaluation cutoff. It
//! contains no forward-looking logic relative to the decision point it
//! supports; "reverted" means reverted within the historical window, full
//! stop.

use serde::{Deserialize, Serialize};

use crate::error::EvalError;

/// Default candidate entry ladder, in z units.
pub const DEFAULT_THRESHOLD_LADDER: [f64; 5] = [1.0, 1.5, 2.0, 2.5, 3.0];

/// |z| below this counts as "reverted to the mean".
pub const REVERTED_BAND: f64 = 0.5;

/// Outcome counts for one candidate threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdStats {
    pub threshold: f64,
    pub events: usize,
    pub reverted: usize,
    pub reversion_rate: f64,
}

/// Empirical threshold→reversion table for one pair over one window.
///
/// Stale after the window advances; the engine rebuilds it rather than
/// trade on old crossings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DivergenceProfile {
    pub thresholds: Vec<ThresholdStats>,
    pub optimal_entry_threshold: f64,
    pub max_historical_abs_z: f64,
    /// Last timestamp of the window this profile was built from.
    pub cutoff_ts: i64,
}

impl DivergenceProfile {
    /// Reject a profile whose window has advanced more than `max_age_secs`
    /// past its cutoff.
    pub fn ensure_fresh(&self, now_ts: i64, max_age_secs: i64) -> Result<(), EvalError> {
        let age = now_ts.saturating_sub(self.cutoff_ts);
        if age > max_age_secs {
            return Err(EvalError::StaleDivergenceProfile { age_secs: age });
        }
        Ok(())
    }

    pub fn stats_for(&self, threshold: f64) -> Option<&ThresholdStats> {
        self.thresholds
            .iter()
            .find(|t| (t.threshold - threshold).abs() < 1e-9)
    }
}

/// Count crossing events of `threshold` and how many reverted into the
/// band before the series ended.
fn scan_threshold(z_series: &[f64], threshold: f64) -> (usize, usize) {
    let mut events = 0usize;
    let mut reverted = 0usize;
    let mut prev_below = true;
    for (i, z) in z_series.iter().enumerate() {
        let above = z.abs() >= threshold;
        if above && prev_below {
            events += 1;
            if z_series[i + 1..].iter().any(|f| f.abs() < REVERTED_BAND) {
                reverted += 1;
            }
        }
        prev_below = !above;
    }
    (events, reverted)
}

/// Build a profile from a z-score series and a candidate ladder.
///
/// The optimal entry is the highest rung with at least one event and a
/// perfect historical reversion record; with no qualifying rung the
/// profile falls back to `fallback_floor` (clamped to never sit below the
/// ladder minimum — a low-sample ladder must not produce a sub-1.0 entry).
pub fn build_profile(
    z_series: &[f64],
    ladder: &[f64],
    fallback_floor: f64,
    cutoff_ts: i64,
) -> DivergenceProfile {
    let mut rungs: Vec<f64> = ladder.to_vec();
    rungs.sort_by(|a, b| a.partial_cmp(b).expect("ladder must not contain NaN"));

    let mut thresholds = Vec::with_capacity(rungs.len());
    for t in &rungs {
        let (events, reverted) = scan_threshold(z_series, *t);
        let reversion_rate = if events == 0 {
            0.0
        } else {
            reverted as f64 / events as f64
        };
        thresholds.push(ThresholdStats {
            threshold: *t,
            events,
            reverted,
            reversion_rate,
        });
    }

    let ladder_min = rungs.first().copied().unwrap_or(1.0);
    let optimal_entry_threshold = thresholds
        .iter()
        .rev()
        .find(|t| t.events >= 1 && (t.reversion_rate - 1.0).abs() < f64::EPSILON)
        .map(|t| t.threshold)
        .unwrap_or_else(|| fallback_floor.max(ladder_min));

    let max_historical_abs_z = z_series.iter().fold(0.0f64, |acc, z| acc.max(z.abs()));

    DivergenceProfile {
        thresholds,
        optimal_entry_threshold,
        max_historical_abs_z,
        cutoff_ts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_crossing_that_reverts_counts_once() {
        // One excursion above 2.0, back below 0.5 before the end.
        let z = vec![0.1, 0.4, 1.2, 2.3, 1.8, 0.9, 0.3, 0.2];
        let profile = build_profile(&z, &DEFAULT_THRESHOLD_LADDER, 1.5, 0);
        let stats = profile.stats_for(2.0).unwrap();
        assert_eq!(stats.events, 1);
        assert_eq!(stats.reverted, 1);
        assert!((stats.reversion_rate - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn crossing_without_reversion_is_counted_but_not_reverted() {
        let z = vec![0.1, 2.5, 2.2, 1.9, 1.1, 0.8];
        let profile = build_profile(&z, &DEFAULT_THRESHOLD_LADDER, 1.5, 0);
        let stats = profile.stats_for(2.0).unwrap();
        assert_eq!(stats.events, 1);
        assert_eq!(stats.reverted, 0);
        assert_eq!(stats.reversion_rate, 0.0);
    }

    #[test]
    fn negative_excursions_count_via_absolute_value() {
        let z = vec![-0.2, -2.6, -1.4, -0.3, 0.0, 2.1, 0.4];
        let profile = build_profile(&z, &DEFAULT_THRESHOLD_LADDER, 1.5, 0);
        let stats = profile.stats_for(2.0).unwrap();
        assert_eq!(stats.events, 2);
        assert_eq!(stats.reverted, 2);
    }

    #[test]
    fn optimal_entry_is_highest_fully_reverting_rung() {
        // Crosses 2.5 once and reverts; crosses 3.0 never.
        let z = vec![0.0, 1.1, 2.7, 1.5, 0.4, 0.1, 1.6, 0.3];
        let profile = build_profile(&z, &DEFAULT_THRESHOLD_LADDER, 1.5, 0);
        assert_eq!(profile.optimal_entry_threshold, 2.5);
        assert!((profile.max_historical_abs_z - 2.7).abs() < 1e-12);
    }

    #[test]
    fn fallback_floor_applies_when_nothing_qualifies() {
        // Quiet series: no rung is ever crossed.
        let z = vec![0.1, -0.2, 0.3, 0.0, -0.1, 0.2];
        let profile = build_profile(&z, &DEFAULT_THRESHOLD_LADDER, 1.5, 0);
        assert_eq!(profile.optimal_entry_threshold, 1.5);

        // The floor can never dip below the ladder minimum.
        let profile = build_profile(&z, &DEFAULT_THRESHOLD_LADDER, 0.4, 0);
        assert_eq!(profile.optimal_entry_threshold, 1.0);
    }

    #[test]
    fn repeated_excursion_without_dip_is_one_event() {
        // Stays above 2.0 for several points; one event, not three.
        let z = vec![0.2, 2.1, 2.4, 2.2, 0.3];
        let profile = build_profile(&z, &DEFAULT_THRESHOLD_LADDER, 1.5, 0);
        let stats = profile.stats_for(2.0).unwrap();
        assert_eq!(stats.events, 1);
    }

    #[test]
    fn staleness_is_enforced() {
        let z = vec![0.1, 2.3, 0.2];
        let profile = build_profile(&z, &DEFAULT_THRESHOLD_LADDER, 1.5, 1_000);
        assert!(profile.ensure_fresh(1_500, 3_600).is_ok());
        let err = profile.ensure_fresh(10_000, 3_600).unwrap_err();
        assert_eq!(err, EvalError::StaleDivergenceProfile { age_secs: 9_000 });
    }
}
