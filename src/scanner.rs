//! Watchlist discovery: universe → liquidity gate → sector partition →
//! candidate pairs → fitness evaluation → scored, bounded watchlist.
//!
//! A scan is a batch recomputation. The output replaces the persisted
//! watchlist wholesale; nothing is patched incrementally, which is what
//! makes running a scan next to a live monitoring cycle safe.

use anyhow::{Context, Result};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::time::{sleep, Duration};

use crate::fitness::{FitnessVerdict, PairFitnessEvaluator};
use crate::ports::price_source::{PriceSource, SymbolMeta};
use crate::sector::{self, Sector};
use crate::series::{PairSeries, PriceSeries};

/// Sector label for the bounded cross-sector candidate set.
const CROSS_SECTOR_LABEL: &str = "cross";

const SCORE_EPSILON: f64 = 1e-6;

/// One pair that survived the fitness gates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub pair: String,
    pub symbol1: String,
    pub symbol2: String,
    pub sector: String,
    pub verdict: FitnessVerdict,
    pub entry_threshold: f64,
    pub exit_threshold: f64,
    /// Historical reversion rate at the chosen entry threshold.
    pub reversion_rate_at_entry: f64,
    pub max_historical_abs_z: f64,
    pub quality_score: f64,
    /// `min(|z| / entry_threshold, 1)` — how close the pair is to firing.
    pub signal_strength: f64,
}

/// The full watchlist document. Rebuilt wholesale on every scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Watchlist {
    pub generated_at: i64,
    pub entries: Vec<WatchlistEntry>,
}

/// Scan-time knobs, all pass-through configuration.
#[derive(Debug, Clone)]
pub struct ScanParams {
    pub min_volume_24h: f64,
    pub min_open_interest: f64,
    pub blacklist: Vec<String>,
    pub min_correlation: f64,
    pub max_half_life_days: f64,
    pub lookback_days: u32,
    pub top_n_per_sector: usize,
    /// Cross-sector candidates pair the top-K most liquid symbols of each
    /// sector against each other; 0 disables the extension.
    pub cross_sector_top_k: usize,
    pub entry_floor: f64,
    pub entry_ceiling: f64,
    pub exit_threshold: f64,
    /// Courtesy delay between symbol fetches.
    pub fetch_delay_ms: u64,
}

#[derive(Debug, Clone)]
struct Candidate {
    symbol1: String,
    symbol2: String,
    sector: String,
}

pub struct WatchlistScanner {
    params: ScanParams,
    evaluator: PairFitnessEvaluator,
}

/// Composite pair quality: correlation, inverse half-life, and historical
/// reversion reliability, scaled to a readable magnitude.
pub fn quality_score(correlation: f64, half_life_days: f64, mean_reversion_rate: f64) -> f64 {
    correlation * (1.0 / half_life_days.max(SCORE_EPSILON)) * mean_reversion_rate * 100.0
}

impl WatchlistScanner {
    pub fn new(params: ScanParams, evaluator: PairFitnessEvaluator) -> Self {
        Self { params, evaluator }
    }

    /// Run the full discovery pipeline and build a replacement watchlist.
    ///
    /// Per-pair evaluation failures are local: the pair is skipped and the
    /// scan continues. Only a universe fetch failure aborts the scan.
    pub async fn scan(&self, source: &dyn PriceSource, now: i64) -> Result<Watchlist> {
        let universe = source
            .get_universe()
            .await
            .context("failed to fetch universe")?;
        let liquid = self.filter_liquid(universe);
        log::info!("[SCAN] {} symbols past the liquidity gate", liquid.len());

        let candidates = self.generate_candidates(&liquid);
        log::info!("[SCAN] {} candidate pairs", candidates.len());

        let histories = self.fetch_histories(source, &candidates).await;

        let mut entries = Vec::new();
        for candidate in &candidates {
            let (Some(s1), Some(s2)) = (
                histories.get(&candidate.symbol1),
                histories.get(&candidate.symbol2),
            ) else {
                continue;
            };
            match self.evaluate_candidate(candidate, s1, s2) {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => {}
                Err(err) => {
                    log::debug!(
                        "[SCAN] {}/{} rejected: {}",
                        candidate.symbol1,
                        candidate.symbol2,
                        err
                    );
                }
            }
        }

        let entries = self.rank_and_bound(entries);
        log::info!("[SCAN] watchlist rebuilt with {} entries", entries.len());
        Ok(Watchlist {
            generated_at: now,
            entries,
        })
    }

    fn filter_liquid(&self, universe: Vec<SymbolMeta>) -> Vec<SymbolMeta> {
        let min_volume =
            Decimal::from_f64(self.params.min_volume_24h).unwrap_or(Decimal::ZERO);
        let min_oi = Decimal::from_f64(self.params.min_open_interest).unwrap_or(Decimal::ZERO);
        let blacklist: HashSet<&str> = self.params.blacklist.iter().map(|s| s.as_str()).collect();
        universe
            .into_iter()
            .filter(|m| {
                if blacklist.contains(m.symbol.as_str()) {
                    return false;
                }
                m.volume_24h >= min_volume && m.open_interest >= min_oi
            })
            .collect()
    }

    /// All same-sector combinations, optionally extended with cross-sector
    /// pairs drawn from each sector's most liquid symbols to bound the
    /// combinatorial blow-up.
    fn generate_candidates(&self, liquid: &[SymbolMeta]) -> Vec<Candidate> {
        let mut by_sector: BTreeMap<String, Vec<&SymbolMeta>> = BTreeMap::new();
        for meta in liquid {
            let sector = sector::sector_of(&meta.symbol);
            if sector == Sector::Unknown {
                log::debug!("[SCAN] {} has no sector mapping; skipped", meta.symbol);
                continue;
            }
            by_sector.entry(sector.to_string()).or_default().push(meta);
        }

        let mut candidates = Vec::new();
        for (sector_name, members) in &by_sector {
            for i in 0..members.len() {
                for j in (i + 1)..members.len() {
                    let (a, b) = ordered(&members[i].symbol, &members[j].symbol);
                    candidates.push(Candidate {
                        symbol1: a,
                        symbol2: b,
                        sector: sector_name.clone(),
                    });
                }
            }
        }

        if self.params.cross_sector_top_k > 0 {
            let mut elite: Vec<&SymbolMeta> = Vec::new();
            for members in by_sector.values() {
                let mut sorted = members.clone();
                sorted.sort_by(|a, b| b.volume_24h.cmp(&a.volume_24h));
                elite.extend(sorted.into_iter().take(self.params.cross_sector_top_k));
            }
            for i in 0..elite.len() {
                for j in (i + 1)..elite.len() {
                    if sector::sector_of(&elite[i].symbol) == sector::sector_of(&elite[j].symbol) {
                        continue;
                    }
                    let (a, b) = ordered(&elite[i].symbol, &elite[j].symbol);
                    candidates.push(Candidate {
                        symbol1: a,
                        symbol2: b,
                        sector: CROSS_SECTOR_LABEL.to_string(),
                    });
                }
            }
        }
        candidates
    }

    /// Fetch the common lookback window for every symbol appearing in any
    /// candidate. A failed symbol is logged and dropped; its pairs are
    /// skipped this scan, not retried here.
    async fn fetch_histories(
        &self,
        source: &dyn PriceSource,
        candidates: &[Candidate],
    ) -> HashMap<String, PriceSeries> {
        let mut symbols: Vec<String> = candidates
            .iter()
            .flat_map(|c| [c.symbol1.clone(), c.symbol2.clone()])
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        symbols.sort();

        let mut histories = HashMap::new();
        for symbol in symbols {
            match source
                .get_daily_closes(&symbol, self.params.lookback_days)
                .await
            {
                Ok(points) => {
                    histories.insert(symbol.clone(), PriceSeries::new(symbol, points));
                }
                Err(err) => {
                    log::warn!("[SCAN] history fetch for {} failed: {:?}", symbol, err);
                }
            }
            if self.params.fetch_delay_ms > 0 {
                sleep(Duration::from_millis(self.params.fetch_delay_ms)).await;
            }
        }
        histories
    }

    fn evaluate_candidate(
        &self,
        candidate: &Candidate,
        s1: &PriceSeries,
        s2: &PriceSeries,
    ) -> Result<Option<WatchlistEntry>, crate::error::EvalError> {
        let pair = PairSeries::align(s1, s2, None)?;
        let (verdict, profile) = self.evaluator.evaluate(&pair, None)?;

        if verdict.correlation < self.params.min_correlation {
            return Ok(None);
        }
        if !verdict.is_cointegrated {
            return Ok(None);
        }
        let Some(half_life_days) = verdict.half_life.days() else {
            return Ok(None);
        };
        if half_life_days > self.params.max_half_life_days {
            return Ok(None);
        }

        let entry_threshold = profile
            .optimal_entry_threshold
            .clamp(self.params.entry_floor, self.params.entry_ceiling);
        let reversion_rate_at_entry = profile
            .stats_for(profile.optimal_entry_threshold)
            .map(|t| t.reversion_rate)
            .unwrap_or(0.0);
        let signal_strength = (verdict.current_z_score.abs() / entry_threshold).min(1.0);
        let score = quality_score(
            verdict.correlation,
            half_life_days,
            verdict.mean_reversion_rate,
        );

        Ok(Some(WatchlistEntry {
            pair: format!("{}/{}", verdict.symbol1, verdict.symbol2),
            symbol1: verdict.symbol1.clone(),
            symbol2: verdict.symbol2.clone(),
            sector: candidate.sector.clone(),
            verdict,
            entry_threshold,
            exit_threshold: self.params.exit_threshold,
            reversion_rate_at_entry,
            max_historical_abs_z: profile.max_historical_abs_z,
            quality_score: score,
            signal_strength,
        }))
    }

    /// Sort descending by score and keep the top N per sector.
    fn rank_and_bound(&self, entries: Vec<WatchlistEntry>) -> Vec<WatchlistEntry> {
        let mut by_sector: BTreeMap<String, Vec<WatchlistEntry>> = BTreeMap::new();
        for entry in entries {
            by_sector.entry(entry.sector.clone()).or_default().push(entry);
        }
        let mut bounded = Vec::new();
        for (_, mut group) in by_sector {
            group.sort_by(|a, b| {
                b.quality_score
                    .partial_cmp(&a.quality_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            group.truncate(self.params.top_n_per_sector);
            bounded.extend(group);
        }
        bounded.sort_by(|a, b| {
            b.quality_score
                .partial_cmp(&a.quality_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        bounded
    }
}

fn ordered(a: &str, b: &str) -> (String, String) {
    if a < b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::PricePoint;
    use anyhow::anyhow;
    use async_trait::async_trait;

    fn day(i: i64) -> i64 {
        1_700_000_000 + i * 86_400
    }

    /// Deterministic universe: three L1 symbols sharing an oscillating
    /// common factor (pairwise tradeable), one illiquid L1, one DeFi
    /// symbol with nothing to pair against, one symbol that always fails
    /// to fetch.
    struct FakeSource;

    fn synthetic_closes(base: f64, scale: f64, n: usize) -> Vec<PricePoint> {
        (0..n)
            .map(|i| {
                let common = (i as f64 * 0.13).sin();
                let own = (i as f64 * 0.41 + scale).sin() * 0.012;
                let price = base * (scale * common * 0.02 + own).exp();
                PricePoint {
                    ts: day(i as i64),
                    close: Decimal::from_f64(price).unwrap(),
                }
            })
            .collect()
    }

    #[async_trait]
    impl PriceSource for FakeSource {
        async fn get_universe(&self) -> anyhow::Result<Vec<SymbolMeta>> {
            let meta = |symbol: &str, volume: i64| SymbolMeta {
                symbol: symbol.to_string(),
                volume_24h: Decimal::new(volume, 0),
                open_interest: Decimal::new(volume / 2, 0),
            };
            Ok(vec![
                meta("BTC", 5_000_000),
                meta("ETH", 4_000_000),
                meta("SOL", 3_000_000),
                meta("ADA", 100), // under the liquidity floor
                meta("AAVE", 2_000_000),
                meta("AVAX", 2_500_000), // fetch always fails
            ])
        }

        async fn get_daily_closes(&self, symbol: &str, days: u32) -> anyhow::Result<Vec<PricePoint>> {
            let n = days as usize;
            match symbol {
                "BTC" => Ok(synthetic_closes(50_000.0, 1.0, n)),
                "ETH" => Ok(synthetic_closes(3_000.0, 1.05, n)),
                "SOL" => Ok(synthetic_closes(150.0, 0.95, n)),
                "AAVE" => Ok(synthetic_closes(90.0, 1.0, n)),
                _ => Err(anyhow!("no data for {}", symbol)),
            }
        }

        async fn get_hourly_closes(
            &self,
            _symbol: &str,
            _from: i64,
            _to: i64,
        ) -> anyhow::Result<Vec<PricePoint>> {
            Ok(vec![])
        }
    }

    fn params() -> ScanParams {
        ScanParams {
            min_volume_24h: 1_000.0,
            min_open_interest: 500.0,
            blacklist: vec![],
            min_correlation: -1.0,
            max_half_life_days: 1_000.0,
            lookback_days: 90,
            top_n_per_sector: 5,
            cross_sector_top_k: 2,
            entry_floor: 1.5,
            entry_ceiling: 3.0,
            exit_threshold: 0.5,
            fetch_delay_ms: 0,
        }
    }

    #[tokio::test]
    async fn scan_builds_bounded_sorted_watchlist() {
        let scanner = WatchlistScanner::new(params(), PairFitnessEvaluator::default());
        let watchlist = scanner.scan(&FakeSource, day(90)).await.unwrap();

        assert!(!watchlist.entries.is_empty());
        // Sorted descending by score.
        for pair in watchlist.entries.windows(2) {
            assert!(pair[0].quality_score >= pair[1].quality_score);
        }
        // The illiquid symbol and the failing symbol never appear.
        for entry in &watchlist.entries {
            assert_ne!(entry.symbol1, "ADA");
            assert_ne!(entry.symbol2, "ADA");
            assert_ne!(entry.symbol1, "AVAX");
            assert_ne!(entry.symbol2, "AVAX");
            assert!(entry.signal_strength <= 1.0);
            assert!(entry.entry_threshold >= 1.5);
        }
    }

    #[tokio::test]
    async fn blacklist_removes_symbols_before_pairing() {
        let mut p = params();
        p.blacklist = vec!["BTC".to_string()];
        let scanner = WatchlistScanner::new(p, PairFitnessEvaluator::default());
        let watchlist = scanner.scan(&FakeSource, day(90)).await.unwrap();
        for entry in &watchlist.entries {
            assert_ne!(entry.symbol1, "BTC");
            assert_ne!(entry.symbol2, "BTC");
        }
    }

    #[tokio::test]
    async fn top_n_per_sector_bounds_the_output() {
        let mut p = params();
        p.top_n_per_sector = 1;
        p.cross_sector_top_k = 0;
        let scanner = WatchlistScanner::new(p, PairFitnessEvaluator::default());
        let watchlist = scanner.scan(&FakeSource, day(90)).await.unwrap();
        let l1_count = watchlist.entries.iter().filter(|e| e.sector == "l1").count();
        assert!(l1_count <= 1);
    }

    #[tokio::test]
    async fn correlation_gate_filters_pairs() {
        let mut p = params();
        p.min_correlation = 1.01; // impossible: everything must be filtered
        let scanner = WatchlistScanner::new(p, PairFitnessEvaluator::default());
        let watchlist = scanner.scan(&FakeSource, day(90)).await.unwrap();
        assert!(watchlist.entries.is_empty());
    }

    #[tokio::test]
    async fn watchlist_round_trips_through_serde() {
        let scanner = WatchlistScanner::new(params(), PairFitnessEvaluator::default());
        let watchlist = scanner.scan(&FakeSource, day(90)).await.unwrap();
        let json = serde_json::to_string(&watchlist).unwrap();
        let back: Watchlist = serde_json::from_str(&json).unwrap();
        assert_eq!(back.entries.len(), watchlist.entries.len());
        assert_eq!(back.generated_at, watchlist.generated_at);
    }
}
