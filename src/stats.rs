//! Pure numeric primitives shared by the evaluator, the scanner, and the
//! monitoring loop. Everything here is a free function over `f64` slices
//! with no side effects; callers own alignment and window selection.

use crate::error::EvalError;

/// Minimum observations for a usable variance estimate.
pub const MIN_VARIANCE_OBS: usize = 10;

/// Simple period-over-period percentage returns. Output length is
/// `prices.len() - 1`; an input shorter than 2 yields an empty vector.
pub fn returns(prices: &[f64]) -> Vec<f64> {
    prices
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect()
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population mean and standard deviation.
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let m = mean(values);
    let var = values
        .iter()
        .map(|v| {
            let d = v - m;
            d * d
        })
        .sum::<f64>()
        / values.len() as f64;
    (m, var.sqrt())
}

/// Pearson correlation on paired return series.
///
/// Rejects with `DegenerateSpread` when either series has zero variance —
/// a flat leg makes the pair unusable, and substituting 0 would let it
/// through the scanner's correlation gate.
pub fn correlation(r1: &[f64], r2: &[f64]) -> Result<f64, EvalError> {
    let n = r1.len().min(r2.len());
    if n < 2 {
        return Err(EvalError::InsufficientData {
            required: 2,
            actual: n,
        });
    }
    let mean_1 = mean(&r1[..n]);
    let mean_2 = mean(&r2[..n]);
    let mut cov = 0.0;
    let mut var_1 = 0.0;
    let mut var_2 = 0.0;
    for i in 0..n {
        let d1 = r1[i] - mean_1;
        let d2 = r2[i] - mean_2;
        cov += d1 * d2;
        var_1 += d1 * d1;
        var_2 += d2 * d2;
    }
    if var_1 <= f64::EPSILON || var_2 <= f64::EPSILON {
        return Err(EvalError::DegenerateSpread);
    }
    let corr = cov / (var_1.sqrt() * var_2.sqrt());
    if corr.is_finite() {
        Ok(corr.clamp(-1.0, 1.0))
    } else {
        Err(EvalError::DegenerateSpread)
    }
}

/// OLS slope of asset1 returns on asset2 returns: `cov(r1,r2) / var(r2)`.
///
/// Single-factor regression coefficient; outliers are not downweighted.
pub fn beta(r1: &[f64], r2: &[f64]) -> Result<f64, EvalError> {
    let n = r1.len().min(r2.len());
    if n < 2 {
        return Err(EvalError::InsufficientData {
            required: 2,
            actual: n,
        });
    }
    let mean_1 = mean(&r1[..n]);
    let mean_2 = mean(&r2[..n]);
    let mut cov = 0.0;
    let mut var_2 = 0.0;
    for i in 0..n {
        let d1 = r1[i] - mean_1;
        let d2 = r2[i] - mean_2;
        cov += d1 * d2;
        var_2 += d2 * d2;
    }
    if var_2 <= f64::EPSILON {
        return Err(EvalError::DegenerateSpread);
    }
    Ok(cov / var_2)
}

/// Elementwise log-spread: `ln(p1) - beta * ln(p2)`.
pub fn log_spread(p1: &[f64], p2: &[f64], beta: f64) -> Vec<f64> {
    p1.iter()
        .zip(p2.iter())
        .filter(|(a, b)| **a > 0.0 && **b > 0.0)
        .map(|(a, b)| a.ln() - beta * b.ln())
        .collect()
}

/// Z-score of the last spread point against its trailing window.
///
/// Mean and std come from the last `window` points only (the fixed rolling
/// window), not the full history. A zero std is `DegenerateSpread`.
pub fn rolling_z_score(spread: &[f64], window: usize) -> Result<f64, EvalError> {
    if spread.len() < 2 || window < 2 {
        return Err(EvalError::InsufficientData {
            required: 2,
            actual: spread.len().min(window),
        });
    }
    let start = spread.len().saturating_sub(window);
    let tail = &spread[start..];
    let (m, std) = mean_std(tail);
    if std <= f64::EPSILON {
        return Err(EvalError::DegenerateSpread);
    }
    let latest = *spread.last().expect("non-empty checked above");
    Ok((latest - m) / std)
}

/// Z-score series over a fixed window, one value per point once the window
/// is full. Used by the divergence profiler, which needs the whole path.
pub fn rolling_z_series(spread: &[f64], window: usize) -> Vec<f64> {
    if spread.len() < window || window < 2 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(spread.len() - window + 1);
    for end in window..=spread.len() {
        let tail = &spread[end - window..end];
        let (m, std) = mean_std(tail);
        if std <= f64::EPSILON {
            continue;
        }
        out.push((tail[window - 1] - m) / std);
    }
    out
}
