use thiserror::Error;

/// Per-pair rejection conditions.
///
/// Every variant is a local rejection: the affected pair drops out of the
/// current cycle's output and the pipeline keeps going for everything else.
/// Nothing here ever aborts a batch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    /// Fewer aligned observations than the statistics need.
    #[error("insufficient data: need at least {required} aligned observations, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    /// Spread standard deviation is zero; z-scores are undefined for the
    /// pair and it must be rejected, never scored as z=0.
    #[error("degenerate spread: zero variance over the evaluation window")]
    DegenerateSpread,

    /// A divergence profile was computed for a window that has since
    /// advanced; it must be rebuilt before any entry decision uses it.
    #[error("stale divergence profile: {age_secs}s past its window")]
    StaleDivergenceProfile { age_secs: i64 },

    /// Entry signal dropped because the global live-trade cap is reached.
    /// The signal is not queued; the pair is re-evaluated fresh next cycle.
    #[error("concurrency cap reached ({cap} live trades); entry dropped")]
    ConcurrencyCapExceeded { cap: usize },

    /// Entry signal for a pair that already has a live trade. Ignored.
    #[error("pair {pair} already has a live trade; entry ignored")]
    DuplicateTradeAttempt { pair: String },
}

impl EvalError {
    /// Cap and duplicate-entry rejections are normal steady-state traffic,
    /// not data problems. Callers log them at info, not error.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            EvalError::ConcurrencyCapExceeded { .. } | EvalError::DuplicateTradeAttempt { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_rejections_are_flagged() {
        assert!(EvalError::ConcurrencyCapExceeded { cap: 3 }.is_expected());
        assert!(EvalError::DuplicateTradeAttempt {
            pair: "BTC/ETH".to_string()
        }
        .is_expected());
        assert!(!EvalError::DegenerateSpread.is_expected());
        assert!(!EvalError::InsufficientData {
            required: 15,
            actual: 3
        }
        .is_expected());
    }
}
