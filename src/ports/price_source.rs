//! Price-data collaborator boundary.
//!
//! The core never knows which upstream served a series (exchange REST,
//! cache, replay file). Retry/backoff lives here, at the boundary, and
//! nowhere inside the statistics layer.

use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Duration};

use crate::series::PricePoint;

/// Universe metadata used by the scanner's liquidity gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolMeta {
    pub symbol: String,
    pub volume_24h: Decimal,
    pub open_interest: Decimal,
}

/// Narrow read-only interface to whatever serves prices.
///
/// Implementations must return series with strictly increasing timestamps
/// and no duplicate entries; alignment across symbols is the caller's job.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn get_universe(&self) -> Result<Vec<SymbolMeta>>;

    /// Last `days` daily closes for one symbol, oldest first.
    async fn get_daily_closes(&self, symbol: &str, days: u32) -> Result<Vec<PricePoint>>;

    /// Hourly closes in `[from, to]` (unix seconds), oldest first.
    async fn get_hourly_closes(&self, symbol: &str, from: i64, to: i64)
        -> Result<Vec<PricePoint>>;
}

/// Retry-with-backoff decorator for a flaky upstream.
///
/// Delay doubles per attempt from `base_delay_ms`, with up to half a base
/// delay of jitter so parallel deployments do not hammer in lockstep.
pub struct RetryingSource<S> {
    inner: S,
    max_attempts: u32,
    base_delay_ms: u64,
}

impl<S: PriceSource> RetryingSource<S> {
    pub fn new(inner: S, max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            base_delay_ms,
        }
    }

    async fn with_retries<T, F, Fut>(&self, what: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        return Err(err);
                    }
                    let backoff = self.base_delay_ms.saturating_mul(1 << (attempt - 1));
                    let jitter = if self.base_delay_ms > 1 {
                        rand::thread_rng().gen_range(0..self.base_delay_ms / 2)
                    } else {
                        0
                    };
                    log::warn!(
                        "[FETCH] {} failed (attempt {}/{}): {:?}; retrying in {}ms",
                        what,
                        attempt,
                        self.max_attempts,
                        err,
                        backoff + jitter
                    );
                    sleep(Duration::from_millis(backoff + jitter)).await;
                }
            }
        }
    }
}

#[async_trait]
impl<S: PriceSource> PriceSource for RetryingSource<S> {
    async fn get_universe(&self) -> Result<Vec<SymbolMeta>> {
        self.with_retries("get_universe", || self.inner.get_universe())
            .await
    }

    async fn get_daily_closes(&self, symbol: &str, days: u32) -> Result<Vec<PricePoint>> {
        self.with_retries("get_daily_closes", || {
            self.inner.get_daily_closes(symbol, days)
        })
        .await
    }

    async fn get_hourly_closes(
        &self,
        symbol: &str,
        from: i64,
        to: i64,
    ) -> Result<Vec<PricePoint>> {
        self.with_retries("get_hourly_closes", || {
            self.inner.get_hourly_closes(symbol, from, to)
        })
        .await
    }
}
