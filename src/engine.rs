//! The monitoring engine: one polling cycle at a time, each cycle an
//! owned snapshot of the trade book driven through the state machine and
//! swapped back wholesale. Pair failures are isolated — a fetch or
//! evaluation error skips that pair for the cycle and never forces a
//! state transition.

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::time::{interval, sleep, Duration};

use crate::config::EngineConfig;
use crate::divergence::DivergenceProfile;
use crate::error::EvalError;
use crate::fitness::{FitnessVerdict, PairFitnessEvaluator};
use crate::ports::notifier::Notifier;
use crate::ports::price_source::PriceSource;
use crate::ports::replay_source::ReplaySource;
use crate::ports::store::{read_json, write_json, StateStore};
use crate::scanner::{Watchlist, WatchlistScanner};
use crate::series::{PairSeries, PriceSeries};
use crate::signal::{
    CycleEvent, PairLifecycle, TradeBook, TradeHistory, TradeHistoryRecord,
    TradeSignalStateMachine,
};

pub const WATCHLIST_DOC: &str = "watchlist";
pub const TRADE_BOOK_DOC: &str = "trade_book";
pub const TRADE_HISTORY_DOC: &str = "trade_history";
pub const STATUS_DOC: &str = "status";

/// Compact per-cycle status document, swapped atomically each cycle.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct StatusSnapshot {
    pub ts: i64,
    pub updated_at: String,
    pub live_trades: usize,
    pub watchlist_entries: usize,
    pub pairs_evaluated: usize,
    pub pairs_skipped: usize,
}

#[derive(Debug, Default)]
pub struct CycleSummary {
    pub evaluated: usize,
    pub entered: usize,
    pub exited: usize,
    pub dropped: usize,
    pub skipped: usize,
}

pub struct MonitorEngine {
    cfg: EngineConfig,
    source: Arc<dyn PriceSource>,
    store: Arc<dyn StateStore>,
    notifier: Arc<dyn Notifier>,
    evaluator: PairFitnessEvaluator,
    machine: TradeSignalStateMachine,
    lifecycles: HashMap<String, PairLifecycle>,
}

impl MonitorEngine {
    pub fn new(
        cfg: EngineConfig,
        source: Arc<dyn PriceSource>,
        store: Arc<dyn StateStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let evaluator = cfg.evaluator();
        let machine = cfg.state_machine();
        Self {
            cfg,
            source,
            store,
            notifier,
            evaluator,
            machine,
            lifecycles: HashMap::new(),
        }
    }

    /// Live loop: one cycle per configured interval, forever. A failed
    /// cycle is logged and the loop keeps going.
    pub async fn run(&mut self) -> Result<()> {
        log::info!(
            "[MONITOR] starting: interval={}s cap={} exit_z={}",
            self.cfg.interval_secs,
            self.cfg.max_live_trades,
            self.cfg.exit_z
        );
        let mut ticker = interval(Duration::from_secs(self.cfg.interval_secs));
        loop {
            ticker.tick().await;
            let now = Utc::now().timestamp();
            match self.cycle(now).await {
                Ok(summary) => log::info!(
                    "[MONITOR] cycle done: evaluated={} entered={} exited={} dropped={} skipped={}",
                    summary.evaluated,
                    summary.entered,
                    summary.exited,
                    summary.dropped,
                    summary.skipped
                ),
                Err(err) => log::error!("[MONITOR] cycle failed: {:?}", err),
            }
        }
    }

    /// Replay loop: one cycle per recorded snapshot, to end of data.
    pub async fn run_replay(&mut self, replay: Arc<ReplaySource>) -> Result<()> {
        log::info!("[MONITOR] running in replay mode");
        loop {
            let now = replay
                .current_timestamp()
                .ok_or_else(|| anyhow!("replay cursor exhausted"))?;
            if let Err(err) = self.cycle(now).await {
                log::error!("[MONITOR] replay cycle at {} failed: {:?}", now, err);
            }
            if !replay.tick() {
                log::info!("[MONITOR] end of replay data");
                break;
            }
        }
        Ok(())
    }

    /// One monitoring cycle over the persisted watchlist plus any pairs
    /// with live trades that have since dropped off the watchlist.
    pub async fn cycle(&mut self, now: i64) -> Result<CycleSummary> {
        let watchlist: Watchlist = read_json(self.store.as_ref(), WATCHLIST_DOC)
            .await?
            .unwrap_or_default();
        let mut book: TradeBook = read_json(self.store.as_ref(), TRADE_BOOK_DOC)
            .await?
            .unwrap_or_default();

        // pair key → (symbol1, symbol2); live trades stay monitored even
        // after a rescan evicts them from the watchlist.
        let mut targets: BTreeMap<String, (String, String)> = BTreeMap::new();
        for entry in &watchlist.entries {
            targets.insert(
                entry.pair.clone(),
                (entry.symbol1.clone(), entry.symbol2.clone()),
            );
        }
        for trade in book.trades.values() {
            targets.insert(
                trade.pair.clone(),
                (trade.symbol1.clone(), trade.symbol2.clone()),
            );
        }
        if targets.is_empty() {
            log::info!("[MONITOR] watchlist empty; nothing to do");
            return Ok(CycleSummary::default());
        }

        let histories = self.fetch_histories(&targets).await;

        let mut summary = CycleSummary::default();
        let mut book_dirty = false;
        let mut closed: Vec<TradeHistoryRecord> = Vec::new();
        for (pair, (sym1, sym2)) in &targets {
            let (Some(s1), Some(s2)) = (histories.get(sym1), histories.get(sym2)) else {
                log::warn!("[MONITOR] {} skipped this cycle: history missing", pair);
                summary.skipped += 1;
                continue;
            };
            let (verdict, profile) = match self.evaluate(s1, s2) {
                Ok(v) => v,
                Err(err) => {
                    log::warn!("[MONITOR] {} skipped this cycle: {}", pair, err);
                    summary.skipped += 1;
                    continue;
                }
            };
            summary.evaluated += 1;

            let lifecycle = self.lifecycles.entry(pair.clone()).or_default();
            let last_prices = verdict_prices(s1, s2, &verdict);
            match self
                .machine
                .on_verdict(&mut book, lifecycle, &verdict, &profile, last_prices, now)
            {
                Ok(CycleEvent::Entered(trade)) => {
                    summary.entered += 1;
                    book_dirty = true;
                    log::info!(
                        "[ENTRY] {} {:?} z={:.2} beta={:.3} weights={:.3}/{:.3}",
                        trade.pair,
                        trade.direction,
                        trade.entry_z_score,
                        trade.beta,
                        trade.long_weight,
                        trade.short_weight
                    );
                    self.notifier.notify(&format!(
                        "ENTER {} {:?}: long {} / short {} at z={:.2}",
                        trade.pair,
                        trade.direction,
                        trade.long_symbol,
                        trade.short_symbol,
                        trade.entry_z_score
                    ));
                }
                Ok(CycleEvent::Exited(record)) => {
                    summary.exited += 1;
                    book_dirty = true;
                    log::info!(
                        "[EXIT] {} reason={} z={:.2} pnl={}%",
                        record.trade.pair,
                        record.exit_reason,
                        record.exit_z_score,
                        record.realized_pnl_pct
                    );
                    self.notifier.notify(&format!(
                        "EXIT {} ({}): pnl {}%",
                        record.trade.pair, record.exit_reason, record.realized_pnl_pct
                    ));
                    closed.push(record);
                }
                Ok(CycleEvent::EntryDropped(reason)) => {
                    summary.dropped += 1;
                    // Expected steady-state traffic, not a data problem.
                    log::info!("[ENTRY] {} signal dropped: {}", pair, reason);
                }
                Ok(CycleEvent::Hold) => {}
                Err(err) if err.is_expected() => {
                    log::info!("[MONITOR] {}: {}", pair, err);
                }
                Err(err) => {
                    log::warn!("[MONITOR] {} skipped this cycle: {}", pair, err);
                    summary.skipped += 1;
                }
            }
        }

        if book_dirty {
            book.version += 1;
            write_json(self.store.as_ref(), TRADE_BOOK_DOC, &book).await?;
        }
        if !closed.is_empty() {
            let mut history: TradeHistory = read_json(self.store.as_ref(), TRADE_HISTORY_DOC)
                .await?
                .unwrap_or_default();
            history.records.extend(closed);
            write_json(self.store.as_ref(), TRADE_HISTORY_DOC, &history).await?;
        }
        let status = StatusSnapshot {
            ts: now,
            updated_at: Utc::now().to_rfc3339(),
            live_trades: book.live_count(),
            watchlist_entries: watchlist.entries.len(),
            pairs_evaluated: summary.evaluated,
            pairs_skipped: summary.skipped,
        };
        if let Err(err) = write_json(self.store.as_ref(), STATUS_DOC, &status).await {
            log::warn!("[STATUS] failed to write status document: {:?}", err);
        }
        Ok(summary)
    }

    /// Run a discovery scan and swap the persisted watchlist.
    pub async fn run_scan(&self, now: i64) -> Result<Watchlist> {
        let scanner = WatchlistScanner::new(self.cfg.scan_params(), self.cfg.evaluator());
        let watchlist = scanner.scan(self.source.as_ref(), now).await?;
        write_json(self.store.as_ref(), WATCHLIST_DOC, &watchlist)
            .await
            .context("failed to persist watchlist")?;
        Ok(watchlist)
    }

    /// Single-pair evaluation for the CLI.
    pub async fn analyze(
        &self,
        symbol1: &str,
        symbol2: &str,
    ) -> Result<(FitnessVerdict, DivergenceProfile)> {
        let s1 = self.fetch_series(symbol1).await?;
        let s2 = self.fetch_series(symbol2).await?;
        self.evaluate(&s1, &s2)
            .map_err(|err| anyhow!("{}/{} not evaluable: {}", symbol1, symbol2, err))
    }

    /// Operator entry by pair name ("BTC/ETH").
    pub async fn force_enter(&mut self, pair: &str, now: i64) -> Result<()> {
        let (sym1, sym2) = split_pair(pair)?;
        let s1 = self.fetch_series(&sym1).await?;
        let s2 = self.fetch_series(&sym2).await?;
        let (verdict, profile) = self
            .evaluate(&s1, &s2)
            .map_err(|err| anyhow!("{} not evaluable: {}", pair, err))?;
        let mut book: TradeBook = read_json(self.store.as_ref(), TRADE_BOOK_DOC)
            .await?
            .unwrap_or_default();
        let last_prices = verdict_prices(&s1, &s2, &verdict);
        let trade = self
            .machine
            .force_enter(&mut book, &verdict, &profile, last_prices, now)
            .map_err(|err| anyhow!("entry rejected: {}", err))?;
        book.version += 1;
        write_json(self.store.as_ref(), TRADE_BOOK_DOC, &book).await?;
        self.lifecycles.insert(
            trade.pair.clone(),
            PairLifecycle {
                phase: crate::signal::TradePhase::InTrade,
                last_exit_at: None,
            },
        );
        self.notifier.notify(&format!(
            "ENTER {} {:?} (manual): long {} / short {}",
            trade.pair, trade.direction, trade.long_symbol, trade.short_symbol
        ));
        Ok(())
    }

    /// Operator close by pair name.
    pub async fn force_exit(&mut self, pair: &str, now: i64) -> Result<TradeHistoryRecord> {
        let (sym1, sym2) = split_pair(pair)?;
        let s1 = self.fetch_series(&sym1).await?;
        let s2 = self.fetch_series(&sym2).await?;
        let (verdict, _) = self
            .evaluate(&s1, &s2)
            .map_err(|err| anyhow!("{} not evaluable: {}", pair, err))?;
        let mut book: TradeBook = read_json(self.store.as_ref(), TRADE_BOOK_DOC)
            .await?
            .unwrap_or_default();
        let last_prices = verdict_prices(&s1, &s2, &verdict);
        let record = self
            .machine
            .force_exit(&mut book, pair, &verdict, last_prices, now)
            .ok_or_else(|| anyhow!("no live trade for {}", pair))?;
        book.version += 1;
        write_json(self.store.as_ref(), TRADE_BOOK_DOC, &book).await?;
        let mut history: TradeHistory = read_json(self.store.as_ref(), TRADE_HISTORY_DOC)
            .await?
            .unwrap_or_default();
        history.records.push(record.clone());
        write_json(self.store.as_ref(), TRADE_HISTORY_DOC, &history).await?;
        self.lifecycles
            .insert(pair.to_string(), PairLifecycle::default());
        self.notifier.notify(&format!(
            "EXIT {} (manual): pnl {}%",
            pair, record.realized_pnl_pct
        ));
        Ok(record)
    }

    pub async fn history(&self) -> Result<TradeHistory> {
        Ok(read_json(self.store.as_ref(), TRADE_HISTORY_DOC)
            .await?
            .unwrap_or_default())
    }

    fn evaluate(
        &self,
        s1: &PriceSeries,
        s2: &PriceSeries,
    ) -> Result<(FitnessVerdict, DivergenceProfile), EvalError> {
        let pair = PairSeries::align(s1, s2, None)?;
        self.evaluator.evaluate(&pair, None)
    }

    async fn fetch_series(&self, symbol: &str) -> Result<PriceSeries> {
        let points = self
            .source
            .get_daily_closes(symbol, self.cfg.lookback_days)
            .await
            .with_context(|| format!("failed to fetch closes for {}", symbol))?;
        Ok(PriceSeries::new(symbol, points))
    }

    async fn fetch_histories(
        &self,
        targets: &BTreeMap<String, (String, String)>,
    ) -> HashMap<String, PriceSeries> {
        let mut symbols: Vec<String> = targets
            .values()
            .flat_map(|(a, b)| [a.clone(), b.clone()])
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        symbols.sort();

        let mut histories = HashMap::new();
        for symbol in symbols {
            match self
                .source
                .get_daily_closes(&symbol, self.cfg.lookback_days)
                .await
            {
                Ok(points) => {
                    histories.insert(symbol.clone(), PriceSeries::new(symbol, points));
                }
                Err(err) => {
                    log::warn!("[MONITOR] history fetch for {} failed: {:?}", symbol, err);
                }
            }
            if self.cfg.fetch_delay_ms > 0 {
                sleep(Duration::from_millis(self.cfg.fetch_delay_ms)).await;
            }
        }
        histories
    }
}

/// Last aligned closes in source precision, for trade records.
fn verdict_prices(
    s1: &PriceSeries,
    s2: &PriceSeries,
    verdict: &FitnessVerdict,
) -> (rust_decimal::Decimal, rust_decimal::Decimal) {
    let at = verdict.evaluated_at;
    let find = |s: &PriceSeries| {
        s.points
            .iter()
            .rev()
            .find(|p| p.ts <= at)
            .map(|p| p.close)
            .unwrap_or_default()
    };
    (find(s1), find(s2))
}

fn split_pair(pair: &str) -> Result<(String, String)> {
    let mut parts = pair.split('/');
    let a = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("invalid pair: {}", pair))?;
    let b = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("invalid pair: {}", pair))?;
    Ok((a.to_string(), b.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::notifier::NullNotifier;
    use crate::ports::store::JsonFileStore;
    use crate::scanner::WatchlistEntry;
    use crate::series::PricePoint;
    use rust_decimal::prelude::FromPrimitive;
    use rust_decimal::Decimal;
    use std::io::Write;

    const DAY: i64 = 86_400;
    const T0: i64 = 1_700_000_000;

    /// Synthetic pair with hedge ratio 1.5 and a scripted log-spread:
    /// a small sinusoidal base, one historical excursion that reverted,
    /// and a second deep dip near the end for the live entry.
    fn synthetic_prices(n: usize) -> (Vec<f64>, Vec<f64>) {
        let mut p1 = Vec::with_capacity(n);
        let mut p2 = Vec::with_capacity(n);
        for i in 0..n {
            let base2 = 100.0 * (0.01 * (i as f64 * 0.3).sin()).exp();
            // Slow sinusoid spanning roughly one rolling window, so the
            // baseline z-path stays inside ±1.5.
            let mut spread = 0.004 * (i as f64 * 0.2).sin();
            // Historical excursion near a baseline zero-crossing; deep
            // enough to cross the lower ladder rungs, reverted within a
            // few days.
            spread += dip(i as i64, 47, 0.005);
            // The live excursion the monitored entry fires on.
            spread += dip(i as i64, 79, 0.0064);
            let price1 = (1.5 * base2.ln() + 0.7 + spread).exp();
            p1.push(price1);
            p2.push(base2);
        }
        (p1, p2)
    }

    /// Triangular dip: ramps down over 2 days, peaks at `depth`, decays
    /// over the following 3 days.
    fn dip(i: i64, center: i64, depth: f64) -> f64 {
        let d = i - center;
        let scale = match d {
            -2 => 0.3,
            -1 => 0.7,
            0 => 1.0,
            1 => 0.55,
            2 => 0.25,
            3 => 0.1,
            _ => 0.0,
        };
        -depth * scale
    }

    fn write_replay_file(n: usize) -> tempfile::NamedTempFile {
        let (p1, p2) = synthetic_prices(n);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for i in 0..n {
            writeln!(
                file,
                r#"{{"timestamp": {}, "closes": {{"AAA": "{:.6}", "BBB": "{:.6}"}}}}"#,
                T0 + i as i64 * DAY,
                p1[i],
                p2[i]
            )
            .unwrap();
        }
        file
    }

    fn test_config(state_dir: &str) -> EngineConfig {
        let mut cfg = EngineConfig::default();
        cfg.state_dir = state_dir.to_string();
        cfg.fetch_delay_ms = 0;
        cfg.cooldown_secs = 0;
        // Daily replay bars: a profile from the previous bar is still
        // fresh two days later.
        cfg.interval_secs = DAY as u64;
        cfg
    }

    fn seeded_watchlist(verdict: FitnessVerdict) -> Watchlist {
        Watchlist {
            generated_at: T0,
            entries: vec![WatchlistEntry {
                pair: "AAA/BBB".to_string(),
                symbol1: "AAA".to_string(),
                symbol2: "BBB".to_string(),
                sector: "l1".to_string(),
                verdict,
                entry_threshold: 2.0,
                exit_threshold: 0.5,
                reversion_rate_at_entry: 1.0,
                max_historical_abs_z: 2.2,
                quality_score: 10.0,
                signal_strength: 0.5,
            }],
        }
    }

    #[test]
    fn synthetic_pair_meets_the_fitness_contract() {
        let (p1, p2) = synthetic_prices(100);
        let to_series = |symbol: &str, prices: &[f64]| {
            PriceSeries::new(
                symbol,
                prices
                    .iter()
                    .enumerate()
                    .map(|(i, c)| PricePoint {
                        ts: T0 + i as i64 * DAY,
                        close: Decimal::from_f64(*c).unwrap(),
                    })
                    .collect(),
            )
        };
        let pair = PairSeries::align(&to_series("AAA", &p1), &to_series("BBB", &p2), None).unwrap();
        let evaluator = PairFitnessEvaluator::default();
        // Evaluate just before the live dip.
        let (verdict, profile) = evaluator.evaluate(&pair, Some(T0 + 77 * DAY)).unwrap();
        assert!(verdict.is_cointegrated);
        assert!(
            (verdict.beta - 1.5).abs() < 0.3,
            "beta={} should recover the 1.5 hedge ratio",
            verdict.beta
        );
        assert!(
            profile.optimal_entry_threshold <= 2.2,
            "optimal={} must sit at or below the historical excursion",
            profile.optimal_entry_threshold
        );
    }

    #[tokio::test]
    async fn replay_run_completes_a_full_trade_lifecycle() {
        let replay_file = write_replay_file(100);
        let state_dir = tempfile::tempdir().unwrap();
        let cfg = test_config(state_dir.path().to_str().unwrap());

        let replay = Arc::new(ReplaySource::new(replay_file.path()).unwrap());
        let store = Arc::new(JsonFileStore::new(state_dir.path()));

        // Seed the watchlist: discovery is the scanner's job, monitoring
        // starts from the persisted document.
        let (p1, p2) = synthetic_prices(100);
        let to_series = |symbol: &str, prices: &[f64]| {
            PriceSeries::new(
                symbol,
                prices
                    .iter()
                    .enumerate()
                    .map(|(i, c)| PricePoint {
                        ts: T0 + i as i64 * DAY,
                        close: Decimal::from_f64(*c).unwrap(),
                    })
                    .collect(),
            )
        };
        let pair = PairSeries::align(&to_series("AAA", &p1), &to_series("BBB", &p2), None).unwrap();
        let (verdict, _) = PairFitnessEvaluator::default()
            .evaluate(&pair, Some(T0 + 40 * DAY))
            .unwrap();
        write_json(store.as_ref(), WATCHLIST_DOC, &seeded_watchlist(verdict))
            .await
            .unwrap();

        let mut engine = MonitorEngine::new(
            cfg,
            replay.clone(),
            store.clone(),
            Arc::new(NullNotifier),
        );
        engine.run_replay(replay.clone()).await.unwrap();

        // The deep dip entered long (asset1 cheap) and the reversion
        // closed it at a profit.
        let history: TradeHistory = read_json(store.as_ref(), TRADE_HISTORY_DOC)
            .await
            .unwrap()
            .expect("at least one closed trade");
        assert!(!history.records.is_empty());
        let winner = history
            .records
            .iter()
            .find(|r| {
                r.trade.direction == crate::signal::Direction::Long
                    && r.realized_pnl_pct > Decimal::ZERO
            })
            .expect("the scripted dip trade should close in profit");
        assert_eq!(winner.trade.long_symbol, "AAA");
        assert!((winner.trade.long_weight + winner.trade.short_weight - 1.0).abs() < 1e-9);

        // Status document reflects the final cycle.
        let status: StatusSnapshot = read_json(store.as_ref(), STATUS_DOC)
            .await
            .unwrap()
            .expect("status written every cycle");
        assert_eq!(status.watchlist_entries, 1);
    }

    #[tokio::test]
    async fn failed_fetch_skips_the_pair_without_transitions() {
        use crate::ports::price_source::{PriceSource, SymbolMeta};
        use async_trait::async_trait;

        struct DeadSource;
        #[async_trait]
        impl PriceSource for DeadSource {
            async fn get_universe(&self) -> Result<Vec<SymbolMeta>> {
                Ok(vec![])
            }
            async fn get_daily_closes(&self, _: &str, _: u32) -> Result<Vec<PricePoint>> {
                Err(anyhow!("upstream down"))
            }
            async fn get_hourly_closes(&self, _: &str, _: i64, _: i64) -> Result<Vec<PricePoint>> {
                Err(anyhow!("upstream down"))
            }
        }

        let state_dir = tempfile::tempdir().unwrap();
        let cfg = test_config(state_dir.path().to_str().unwrap());
        let store = Arc::new(JsonFileStore::new(state_dir.path()));

        // A live trade exists; the dead feed must not close it.
        let (p1, p2) = synthetic_prices(100);
        let to_series = |symbol: &str, prices: &[f64]| {
            PriceSeries::new(
                symbol,
                prices
                    .iter()
                    .enumerate()
                    .map(|(i, c)| PricePoint {
                        ts: T0 + i as i64 * DAY,
                        close: Decimal::from_f64(*c).unwrap(),
                    })
                    .collect(),
            )
        };
        let pair = PairSeries::align(&to_series("AAA", &p1), &to_series("BBB", &p2), None).unwrap();
        let (verdict, profile) = PairFitnessEvaluator::default()
            .evaluate(&pair, Some(T0 + 81 * DAY))
            .unwrap();
        let machine = EngineConfig::default().state_machine();
        let mut book = TradeBook::default();
        machine
            .force_enter(
                &mut book,
                &verdict,
                &profile,
                (Decimal::new(100, 0), Decimal::new(100, 0)),
                T0 + 81 * DAY,
            )
            .unwrap();
        write_json(store.as_ref(), TRADE_BOOK_DOC, &book).await.unwrap();

        let mut engine =
            MonitorEngine::new(cfg, Arc::new(DeadSource), store.clone(), Arc::new(NullNotifier));
        let summary = engine.cycle(T0 + 82 * DAY).await.unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.exited, 0);

        let book_after: TradeBook = read_json(store.as_ref(), TRADE_BOOK_DOC)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(book_after.live_count(), 1, "no implicit exit on fetch failure");
    }
}
