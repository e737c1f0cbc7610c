//! Stationarity verdict and half-life estimation for a log-spread series.
//!
//! The cointegration verdict here is a cheap autocorrelation-based proxy,
//! NOT an Augmented Dickey-Fuller test. It is calibrated against the
//! trading rules in this crate and must not be read as a statistically
//! rigorous stationarity result by anything making risk decisions.

use serde::{Deserialize, Serialize};

use crate::error::EvalError;
use crate::stats;

/// Spread observations required before estimating anything.
pub const MIN_SPREAD_OBS: usize = 10;

/// Proxy statistic rejection threshold (`adf_stat < -2.5` ⇒ stationary).
const ADF_PROXY_THRESHOLD: f64 = -2.5;

/// Half-lives outside this many days are not tradeable on a time basis.
const MAX_HALF_LIFE_DAYS: f64 = 1000.0;

/// Relative disagreement between the two half-life estimators above which
/// the estimate is flagged as a data-quality signal.
const DISAGREEMENT_FLAG_RATIO: f64 = 0.30;

/// Mean-reversion half-life in days. `Infinite` means no reversion was
/// detected and the pair is not tradeable on a time-stop basis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "Option<f64>", into = "Option<f64>")]
pub enum HalfLife {
    Finite(f64),
    Infinite,
}

impl HalfLife {
    /// Clamp a raw estimate into the tradeable range, mapping everything
    /// non-finite or outside (0, 1000) days to `Infinite`.
    pub fn from_days(days: f64) -> Self {
        if days.is_finite() && days > 0.0 && days < MAX_HALF_LIFE_DAYS {
            HalfLife::Finite(days)
        } else {
            HalfLife::Infinite
        }
    }

    pub fn days(&self) -> Option<f64> {
        match self {
            HalfLife::Finite(d) => Some(*d),
            HalfLife::Infinite => None,
        }
    }

    pub fn is_finite(&self) -> bool {
        matches!(self, HalfLife::Finite(_))
    }
}

impl From<Option<f64>> for HalfLife {
    fn from(value: Option<f64>) -> Self {
        value.map_or(HalfLife::Infinite, HalfLife::from_days)
    }
}

impl From<HalfLife> for Option<f64> {
    fn from(value: HalfLife) -> Self {
        value.days()
    }
}

/// Output of [`estimate`]: the stationarity proxy plus both half-life
/// estimators, kept side by side. The two formulas measure different
/// things and can disagree by more than 50%; `estimators_disagree` marks
/// a gap above 30% so callers treat it as a data-quality signal instead
/// of silently trusting either number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CointegrationEstimate {
    /// Lag-1 autocorrelation of the spread's first differences.
    pub rho: f64,
    /// `-rho * sqrt(n)` — the ADF-style proxy statistic.
    pub adf_stat: f64,
    /// Fraction of adjacent spread moves pointing back toward the mean.
    pub mean_reversion_rate: f64,
    pub is_cointegrated: bool,
    /// `-ln(2) / ln(1 + rho)`, valid only for `-1 < rho < 0`.
    pub half_life_autocorr: HalfLife,
    /// AR(1) method: regress `spread[t]` on `spread[t-1]` for slope phi,
    /// then `-ln(2) / ln(phi)`, valid only for `0 < phi < 1`.
    pub half_life_ar1: HalfLife,
    pub estimators_disagree: bool,
}

impl CointegrationEstimate {
    /// The half-life used for trading decisions: the AR(1) estimate when
    /// finite, else the autocorrelation one.
    pub fn half_life(&self) -> HalfLife {
        if self.half_life_ar1.is_finite() {
            self.half_life_ar1
        } else {
            self.half_life_autocorr
        }
    }
}

/// Lag-1 autocorrelation of a series.
fn lag1_autocorrelation(values: &[f64]) -> Option<f64> {
    if values.len() < 3 {
        return None;
    }
    let m = stats::mean(values);
    let mut num = 0.0;
    let mut den = 0.0;
    for i in 0..values.len() {
        let d = values[i] - m;
        den += d * d;
        if i + 1 < values.len() {
            num += d * (values[i + 1] - m);
        }
    }
    if den <= f64::EPSILON {
        return None;
    }
    Some(num / den)
}

/// Fraction of adjacent moves that head back toward the window mean.
fn mean_reversion_rate(spread: &[f64]) -> f64 {
    let m = stats::mean(spread);
    let mut toward = 0usize;
    let mut total = 0usize;
    for w in spread.windows(2) {
        let prev = w[0];
        let curr = w[1];
        if (prev - m).abs() <= f64::EPSILON || prev == curr {
            continue;
        }
        total += 1;
        let moved_toward = if prev > m { curr < prev } else { curr > prev };
        if moved_toward {
            toward += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        toward as f64 / total as f64
    }
}

/// AR(1) slope of `spread[t]` on `spread[t-1]` (with intercept).
fn ar1_slope(spread: &[f64]) -> Option<f64> {
    let n = spread.len() - 1;
    if n < 2 {
        return None;
    }
    let x = &spread[..n];
    let y = &spread[1..];
    let mean_x = stats::mean(x);
    let mean_y = stats::mean(y);
    let mut num = 0.0;
    let mut den = 0.0;
    for i in 0..n {
        let dx = x[i] - mean_x;
        num += dx * (y[i] - mean_y);
        den += dx * dx;
    }
    if den <= f64::EPSILON {
        return None;
    }
    Some(num / den)
}

/// Estimate stationarity and half-life for a log-spread series.
///
/// Requires at least [`MIN_SPREAD_OBS`] points; a constant spread is
/// `DegenerateSpread`.
pub fn estimate(spread: &[f64]) -> Result<CointegrationEstimate, EvalError> {
    if spread.len() < MIN_SPREAD_OBS {
        return Err(EvalError::InsufficientData {
            required: MIN_SPREAD_OBS,
            actual: spread.len(),
        });
    }

    let diffs: Vec<f64> = spread.windows(2).map(|w| w[1] - w[0]).collect();
    let rho = lag1_autocorrelation(&diffs).ok_or(EvalError::DegenerateSpread)?;
    let n = diffs.len() as f64;
    let adf_stat = -rho * n.sqrt();
    let reversion_rate = mean_reversion_rate(spread);

    let is_cointegrated =
        adf_stat < ADF_PROXY_THRESHOLD || (reversion_rate > 0.5 && rho.abs() < 0.3);

    let half_life_autocorr = if rho > -1.0 && rho < 0.0 {
        HalfLife::from_days(-(2.0f64.ln()) / (1.0 + rho).ln())
    } else {
        HalfLife::Infinite
    };

    let half_life_ar1 = match ar1_slope(spread) {
        Some(phi) if phi > 0.0 && phi < 1.0 => HalfLife::from_days(-(2.0f64.ln()) / phi.ln()),
        _ => HalfLife::Infinite,
    };

    let estimators_disagree = match (half_life_autocorr.days(), half_life_ar1.days()) {
        (Some(a), Some(b)) => {
            let smaller = a.min(b).max(f64::EPSILON);
            (a - b).abs() / smaller > DISAGREEMENT_FLAG_RATIO
        }
        (Some(_), None) | (None, Some(_)) => true,
        (None, None) => false,
    };
    if estimators_disagree {
        log::warn!(
            "[COINT] half-life estimators disagree: autocorr={:?} ar1={:?} rho={:.3}",
            half_life_autocorr.days(),
            half_life_ar1.days(),
            rho
        );
    }

    Ok(CointegrationEstimate {
        rho,
        adf_stat,
        mean_reversion_rate: reversion_rate,
        is_cointegrated,
        half_life_autocorr,
        half_life_ar1,
        estimators_disagree,
    })
}
