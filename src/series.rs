//! Price series containers and pair alignment.
//!
//! Closes cross the collaborator boundary as `Decimal` and are converted to
//! `f64` exactly once, at alignment time; everything downstream of a
//! `PairSeries` is plain float math.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::EvalError;

/// Minimum aligned observations before any pair statistic is computed.
pub const MIN_ALIGNED_OBS: usize = 15;

/// One close observation. Timestamps are unix seconds, strictly increasing
/// within a series; gap handling is the data source's job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PricePoint {
    pub ts: i64,
    pub close: Decimal,
}

/// Ordered close history for one symbol. Immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSeries {
    pub symbol: String,
    pub points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(symbol: impl Into<String>, points: Vec<PricePoint>) -> Self {
        Self {
            symbol: symbol.into(),
            points,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Two series inner-joined on timestamp, ready for pair statistics.
#[derive(Debug, Clone)]
pub struct PairSeries {
    pub symbol1: String,
    pub symbol2: String,
    pub timestamps: Vec<i64>,
    pub closes1: Vec<f64>,
    pub closes2: Vec<f64>,
    /// Last aligned closes kept in source precision for trade records.
    pub last_close1: Decimal,
    pub last_close2: Decimal,
}

impl PairSeries {
    /// Inner-join two series on timestamp, dropping everything after
    /// `cutoff` when set (backtests must not see post-cutoff data at all).
    ///
    /// Rejects with `InsufficientData` when fewer than `MIN_ALIGNED_OBS`
    /// observations survive the join.
    pub fn align(
        s1: &PriceSeries,
        s2: &PriceSeries,
        cutoff: Option<i64>,
    ) -> Result<Self, EvalError> {
        let index2: BTreeMap<i64, Decimal> = s2
            .points
            .iter()
            .filter(|p| cutoff.map_or(true, |c| p.ts <= c))
            .map(|p| (p.ts, p.close))
            .collect();

        let mut timestamps = Vec::new();
        let mut closes1 = Vec::new();
        let mut closes2 = Vec::new();
        let mut last1 = Decimal::ZERO;
        let mut last2 = Decimal::ZERO;
        for p in &s1.points {
            if let Some(c) = cutoff {
                if p.ts > c {
                    continue;
                }
            }
            let Some(other) = index2.get(&p.ts) else {
                continue;
            };
            let (Some(c1), Some(c2)) = (p.close.to_f64(), other.to_f64()) else {
                continue;
            };
            if c1 <= 0.0 || c2 <= 0.0 {
                continue;
            }
            timestamps.push(p.ts);
            closes1.push(c1);
            closes2.push(c2);
            last1 = p.close;
            last2 = *other;
        }

        if timestamps.len() < MIN_ALIGNED_OBS {
            return Err(EvalError::InsufficientData {
                required: MIN_ALIGNED_OBS,
                actual: timestamps.len(),
            });
        }

        Ok(Self {
            symbol1: s1.symbol.clone(),
            symbol2: s2.symbol.clone(),
            timestamps,
            closes1,
            closes2,
            last_close1: last1,
            last_close2: last2,
        })
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn last_ts(&self) -> i64 {
        *self.timestamps.last().unwrap_or(&0)
    }

    pub fn key(&self) -> String {
        format!("{}/{}", self.symbol1, self.symbol2)
    }
}
