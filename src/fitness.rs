//! Per-pair fitness evaluation: one verdict and one divergence profile per
//! call, recomputed from scratch every time. Nothing here is cached or
//! mutated in place.

use serde::{Deserialize, Serialize};

use crate::coint::{self, HalfLife};
use crate::divergence::{self, DivergenceProfile};
use crate::error::EvalError;
use crate::series::{PairSeries, MIN_ALIGNED_OBS};
use crate::stats;

/// The tradeability statistics for one pair at one evaluation instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitnessVerdict {
    pub symbol1: String,
    pub symbol2: String,
    pub correlation: f64,
    pub beta: f64,
    pub mean_spread: f64,
    pub std_dev_spread: f64,
    pub current_z_score: f64,
    pub half_life: HalfLife,
    pub is_cointegrated: bool,
    pub mean_reversion_rate: f64,
    /// Timestamp of the last observation that informed this verdict.
    pub evaluated_at: i64,
}

impl FitnessVerdict {
    pub fn pair_key(&self) -> String {
        format!("{}/{}", self.symbol1, self.symbol2)
    }
}

/// Evaluator configuration: the rolling window for z-scores and the
/// candidate entry ladder handed to the divergence profiler.
#[derive(Debug, Clone)]
pub struct PairFitnessEvaluator {
    pub window: usize,
    pub ladder: Vec<f64>,
    pub entry_floor: f64,
}

impl Default for PairFitnessEvaluator {
    fn default() -> Self {
        Self {
            window: 30,
            ladder: divergence::DEFAULT_THRESHOLD_LADDER.to_vec(),
            entry_floor: 1.5,
        }
    }
}

impl PairFitnessEvaluator {
    /// Evaluate a pair, optionally as of `cutoff` (unix seconds).
    ///
    /// Data after the cutoff is excluded before any statistic touches it,
    /// so a backtest evaluation is bit-identical to what a live evaluation
    /// at that instant would have produced. Rejections: fewer than 15
    /// aligned observations (`InsufficientData`), zero spread standard
    /// deviation (`DegenerateSpread`). Upstream fetch failures are not
    /// retried here; that is the data source's job.
    pub fn evaluate(
        &self,
        series: &PairSeries,
        cutoff: Option<i64>,
    ) -> Result<(FitnessVerdict, DivergenceProfile), EvalError> {
        let end = match cutoff {
            Some(c) => series.timestamps.partition_point(|ts| *ts <= c),
            None => series.len(),
        };
        if end < MIN_ALIGNED_OBS {
            return Err(EvalError::InsufficientData {
                required: MIN_ALIGNED_OBS,
                actual: end,
            });
        }
        let closes1 = &series.closes1[..end];
        let closes2 = &series.closes2[..end];
        let evaluated_at = series.timestamps[end - 1];

        let r1 = stats::returns(closes1);
        let r2 = stats::returns(closes2);
        let correlation = stats::correlation(&r1, &r2)?;
        let beta = stats::beta(&r1, &r2)?;

        let spread = stats::log_spread(closes1, closes2, beta);
        let tail_start = spread.len().saturating_sub(self.window);
        let (mean_spread, std_dev_spread) = stats::mean_std(&spread[tail_start..]);
        if std_dev_spread <= f64::EPSILON {
            return Err(EvalError::DegenerateSpread);
        }
        let current_z_score = stats::rolling_z_score(&spread, self.window)?;

        let est = coint::estimate(&spread)?;

        let z_series = stats::rolling_z_series(&spread, self.window);
        let profile =
            divergence::build_profile(&z_series, &self.ladder, self.entry_floor, evaluated_at);

        let verdict = FitnessVerdict {
            symbol1: series.symbol1.clone(),
            symbol2: series.symbol2.clone(),
            correlation,
            beta,
            mean_spread,
            std_dev_spread,
            current_z_score,
            half_life: est.half_life(),
            is_cointegrated: est.is_cointegrated,
            mean_reversion_rate: est.mean_reversion_rate,
            evaluated_at,
        };
        Ok((verdict, profile))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::{PricePoint, PriceSeries};
    use rust_decimal::prelude::FromPrimitive;
    use rust_decimal::Decimal;

    fn day(i: i64) -> i64 {
        1_700_000_000 + i * 86_400
    }

    fn series_from(symbol: &str, closes: &[f64]) -> PriceSeries {
        PriceSeries::new(
            symbol,
            closes
                .iter()
                .enumerate()
                .map(|(i, c)| PricePoint {
                    ts: day(i as i64),
                    close: Decimal::from_f64(*c).unwrap(),
                })
                .collect(),
        )
    }

    /// Two legs sharing a sinusoidal log-spread around a stable ratio.
    fn oscillating_pair(n: usize) -> (PriceSeries, PriceSeries) {
        let p2: Vec<f64> = (0..n).map(|i| 50.0 + (i as f64 * 0.11).sin()).collect();
        let p1: Vec<f64> = p2
            .iter()
            .enumerate()
            .map(|(i, b)| 2.0 * b * ((i as f64 * 0.5).sin() * 0.01).exp())
            .collect();
        (series_from("AAA", &p1), series_from("BBB", &p2))
    }

    #[test]
    fn rejects_insufficient_aligned_data() {
        let (s1, s2) = oscillating_pair(60);
        let pair = PairSeries::align(&s1, &s2, None).unwrap();
        let eval = PairFitnessEvaluator::default();
        // A cutoff before the 15th observation starves the evaluator.
        let err = eval.evaluate(&pair, Some(day(9))).unwrap_err();
        assert_eq!(
            err,
            EvalError::InsufficientData {
                required: MIN_ALIGNED_OBS,
                actual: 10
            }
        );
    }

    #[test]
    fn rejects_constant_spread() {
        // Exactly proportional legs: the log-spread never moves.
        let p2: Vec<f64> = (0..40).map(|i| 50.0 + i as f64).collect();
        let p1: Vec<f64> = p2.iter().map(|v| v * 3.0).collect();
        let s1 = series_from("AAA", &p1);
        let s2 = series_from("BBB", &p2);
        let pair = PairSeries::align(&s1, &s2, None).unwrap();
        let eval = PairFitnessEvaluator::default();
        assert_eq!(
            eval.evaluate(&pair, None).unwrap_err(),
            EvalError::DegenerateSpread
        );
    }

    #[test]
    fn cutoff_changes_the_verdict_window() {
        let (s1, s2) = oscillating_pair(120);
        let pair = PairSeries::align(&s1, &s2, None).unwrap();
        let eval = PairFitnessEvaluator::default();
        let (full, _) = eval.evaluate(&pair, None).unwrap();
        let (cut, _) = eval.evaluate(&pair, Some(day(59))).unwrap();
        assert_eq!(cut.evaluated_at, day(59));
        assert!(full.evaluated_at > cut.evaluated_at);
    }

    #[test]
    fn oscillating_pair_is_cointegrated_and_bounded() {
        let (s1, s2) = oscillating_pair(200);
        let pair = PairSeries::align(&s1, &s2, None).unwrap();
        let eval = PairFitnessEvaluator::default();
        let (verdict, profile) = eval.evaluate(&pair, None).unwrap();
        assert!((-1.0..=1.0).contains(&verdict.correlation));
        assert!(verdict.std_dev_spread > 0.0);
        assert!(verdict.is_cointegrated);
        assert!(profile.optimal_entry_threshold >= 1.0);
        assert_eq!(profile.cutoff_ts, verdict.evaluated_at);
    }

    #[test]
    fn verdict_round_trips_through_serde() {
        let (s1, s2) = oscillating_pair(80);
        let pair = PairSeries::align(&s1, &s2, None).unwrap();
        let eval = PairFitnessEvaluator::default();
        let (verdict, _) = eval.evaluate(&pair, None).unwrap();
        let json = serde_json::to_string(&verdict).unwrap();
        let back: FitnessVerdict = serde_json::from_str(&json).unwrap();
        assert_eq!(back.symbol1, verdict.symbol1);
        assert_eq!(back.correlation, verdict.correlation);
        assert_eq!(back.beta, verdict.beta);
        assert_eq!(back.half_life, verdict.half_life);
        assert_eq!(back.is_cointegrated, verdict.is_cointegrated);
        assert_eq!(back.evaluated_at, verdict.evaluated_at);
    }
}
