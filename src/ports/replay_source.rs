//! Replay price source for backtests: a JSONL dump of per-cycle close
//! snapshots, walked forward one line per monitoring cycle. History
//! requests only ever see data up to the cursor, so a replayed run makes
//! the same decisions a live run would have.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use crate::ports::price_source::{PriceSource, SymbolMeta};
use crate::series::PricePoint;

#[derive(Debug, Clone, Deserialize)]
struct DumpedEntry {
    /// Unix seconds of the snapshot.
    timestamp: i64,
    /// Symbol → close at that instant.
    closes: HashMap<String, Decimal>,
}

#[derive(Debug)]
pub struct ReplaySource {
    data: Vec<DumpedEntry>,
    cursor: AtomicUsize,
    /// Liquidity reported for every replayed symbol; replays predate the
    /// liquidity gate, so the gate is effectively disabled for them.
    replay_liquidity: Decimal,
}

impl ReplaySource {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let file = File::open(path_ref)
            .with_context(|| format!("failed to open replay file {}", path_ref.display()))?;
        let reader = BufReader::new(file);
        let mut data = Vec::new();
        for line in reader.lines() {
            let line = line.context("failed to read replay line")?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: DumpedEntry = serde_json::from_str(&line)
                .with_context(|| format!("failed to parse replay entry '{}'", line))?;
            data.push(entry);
        }
        if data.is_empty() {
            return Err(anyhow!("replay file {} is empty", path_ref.display()));
        }
        data.sort_by_key(|e| e.timestamp);
        Ok(Self {
            data,
            cursor: AtomicUsize::new(0),
            replay_liquidity: Decimal::MAX,
        })
    }

    /// Advance one snapshot. Returns false at end of data.
    pub fn tick(&self) -> bool {
        let current = self.cursor.load(AtomicOrdering::SeqCst);
        if current + 1 < self.data.len() {
            self.cursor.fetch_add(1, AtomicOrdering::SeqCst);
            true
        } else {
            false
        }
    }

    pub fn current_timestamp(&self) -> Option<i64> {
        self.data
            .get(self.cursor.load(AtomicOrdering::SeqCst))
            .map(|e| e.timestamp)
    }

    fn closes_up_to_cursor(&self, symbol: &str, limit: usize) -> Vec<PricePoint> {
        let end = self.cursor.load(AtomicOrdering::SeqCst) + 1;
        let points: Vec<PricePoint> = self.data[..end.min(self.data.len())]
            .iter()
            .filter_map(|e| {
                e.closes.get(symbol).map(|c| PricePoint {
                    ts: e.timestamp,
                    close: *c,
                })
            })
            .collect();
        let start = points.len().saturating_sub(limit);
        points[start..].to_vec()
    }
}

#[async_trait]
impl PriceSource for ReplaySource {
    async fn get_universe(&self) -> Result<Vec<SymbolMeta>> {
        let current = self.cursor.load(AtomicOrdering::SeqCst);
        let entry = self
            .data
            .get(current)
            .ok_or_else(|| anyhow!("replay cursor out of bounds"))?;
        let mut symbols: Vec<&String> = entry.closes.keys().collect();
        symbols.sort();
        Ok(symbols
            .into_iter()
            .map(|s| SymbolMeta {
                symbol: s.clone(),
                volume_24h: self.replay_liquidity,
                open_interest: self.replay_liquidity,
            })
            .collect())
    }

    async fn get_daily_closes(&self, symbol: &str, days: u32) -> Result<Vec<PricePoint>> {
        Ok(self.closes_up_to_cursor(symbol, days as usize))
    }

    async fn get_hourly_closes(
        &self,
        symbol: &str,
        from: i64,
        to: i64,
    ) -> Result<Vec<PricePoint>> {
        let end = self.cursor.load(AtomicOrdering::SeqCst) + 1;
        Ok(self.data[..end.min(self.data.len())]
            .iter()
            .filter(|e| e.timestamp >= from && e.timestamp <= to)
            .filter_map(|e| {
                e.closes.get(symbol).map(|c| PricePoint {
                    ts: e.timestamp,
                    close: *c,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_replay(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file
    }

    #[tokio::test]
    async fn replay_never_reads_past_the_cursor() {
        let file = write_replay(&[
            r#"{"timestamp": 100, "closes": {"BTC": "50000", "ETH": "3000"}}"#,
            r#"{"timestamp": 200, "closes": {"BTC": "51000", "ETH": "3100"}}"#,
            r#"{"timestamp": 300, "closes": {"BTC": "52000", "ETH": "3200"}}"#,
        ]);
        let source = ReplaySource::new(file.path()).unwrap();

        let closes = source.get_daily_closes("BTC", 10).await.unwrap();
        assert_eq!(closes.len(), 1);
        assert_eq!(closes[0].ts, 100);

        assert!(source.tick());
        let closes = source.get_daily_closes("BTC", 10).await.unwrap();
        assert_eq!(closes.len(), 2);
        assert_eq!(closes.last().unwrap().ts, 200);

        assert!(source.tick());
        assert!(!source.tick());
    }

    #[tokio::test]
    async fn universe_lists_snapshot_symbols() {
        let file = write_replay(&[r#"{"timestamp": 100, "closes": {"ETH": "3000", "BTC": "50000"}}"#]);
        let source = ReplaySource::new(file.path()).unwrap();
        let universe = source.get_universe().await.unwrap();
        let symbols: Vec<&str> = universe.iter().map(|m| m.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["BTC", "ETH"]);
    }

    #[test]
    fn empty_replay_file_is_an_error() {
        let file = write_replay(&[]);
        assert!(ReplaySource::new(file.path()).is_err());
    }
}
