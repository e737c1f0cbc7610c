//! Trade lifecycle: WATCHING → ENTRY_SIGNAL → IN_TRADE → EXIT_SIGNAL →
//! CLOSED, driven by one fresh fitness verdict per polling cycle.
//!
//! Entry admission (one live trade per pair, global concurrency cap) and
//! trade creation happen inside a single-writer cycle against an owned
//! `TradeBook` snapshot, so the check-then-create sequence is atomic by
//! construction. Dropped signals are logged and forgotten, never queued.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::divergence::DivergenceProfile;
use crate::error::EvalError;
use crate::fitness::FitnessVerdict;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Long asset1 / short asset2 — the spread is below its mean.
    Long,
    /// Short asset1 / long asset2 — the spread is above its mean.
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradePhase {
    Watching,
    EntrySignal,
    InTrade,
    ExitSignal,
    Closed,
}

/// A live position in one pair. Owned exclusively by the state machine
/// from entry until close, when it becomes a [`TradeHistoryRecord`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub pair: String,
    pub symbol1: String,
    pub symbol2: String,
    pub direction: Direction,
    pub entry_time: i64,
    pub entry_z_score: f64,
    pub entry_price1: Decimal,
    pub entry_price2: Decimal,
    pub beta: f64,
    pub long_symbol: String,
    pub short_symbol: String,
    pub long_weight: f64,
    pub short_weight: f64,
    pub entry_threshold: f64,
    pub exit_threshold: f64,
}

/// A closed trade with exit fields and realized P&L (percent of deployed
/// notional, beta-weighted).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeHistoryRecord {
    #[serde(flatten)]
    pub trade: Trade,
    pub exit_time: i64,
    pub exit_z_score: f64,
    pub exit_price1: Decimal,
    pub exit_price2: Decimal,
    pub exit_reason: String,
    pub realized_pnl_pct: Decimal,
}

/// The set of live trades, versioned and replaced wholesale on write.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeBook {
    pub version: u64,
    pub trades: HashMap<String, Trade>,
}

impl TradeBook {
    pub fn live_count(&self) -> usize {
        self.trades.len()
    }
}

/// Closed-trade log, appended on each close and swapped wholesale.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeHistory {
    pub records: Vec<TradeHistoryRecord>,
}

/// Per-pair lifecycle state. `Closed` is terminal: closing replaces the
/// instance with a fresh `Watching` one carrying the exit time for the
/// cooldown gate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PairLifecycle {
    pub phase: TradePhase,
    pub last_exit_at: Option<i64>,
}

impl Default for PairLifecycle {
    fn default() -> Self {
        Self {
            phase: TradePhase::Watching,
            last_exit_at: None,
        }
    }
}

impl PairLifecycle {
    fn fresh_after_close(exit_time: i64) -> Self {
        Self {
            phase: TradePhase::Watching,
            last_exit_at: Some(exit_time),
        }
    }
}

/// One guard condition that can force an exit. The z-score rule is the
/// primary exit; stop-loss and time-stop ship in-tree and callers may
/// register more (take-profit, regime shift) without touching the machine.
pub trait ExitRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn triggered(&self, trade: &Trade, verdict: &FitnessVerdict, now: i64) -> bool;
}

/// Primary exit: the spread has reverted to within the trade's fixed exit
/// band.
pub struct ZScoreExit;

impl ExitRule for ZScoreExit {
    fn name(&self) -> &'static str {
        "exit_z"
    }

    fn triggered(&self, trade: &Trade, verdict: &FitnessVerdict, _now: i64) -> bool {
        verdict.current_z_score.abs() <= trade.exit_threshold
    }
}

/// The divergence kept widening past the stop level.
pub struct StopLossExit {
    pub z: f64,
}

impl ExitRule for StopLossExit {
    fn name(&self) -> &'static str {
        "stop_loss_z"
    }

    fn triggered(&self, _trade: &Trade, verdict: &FitnessVerdict, _now: i64) -> bool {
        verdict.current_z_score.abs() >= self.z
    }
}

/// Held past a multiple of the pair's half-life without reverting.
pub struct TimeStopExit {
    pub half_life_multiple: f64,
}

impl ExitRule for TimeStopExit {
    fn name(&self) -> &'static str {
        "time_stop"
    }

    fn triggered(&self, trade: &Trade, verdict: &FitnessVerdict, now: i64) -> bool {
        let Some(days) = verdict.half_life.days() else {
            return false;
        };
        let budget_secs = (days * self.half_life_multiple * 86_400.0) as i64;
        budget_secs > 0 && now.saturating_sub(trade.entry_time) >= budget_secs
    }
}

/// What one verdict did to one pair this cycle.
#[derive(Debug)]
pub enum CycleEvent {
    Entered(Trade),
    Exited(TradeHistoryRecord),
    /// Entry signal fired but was dropped; carries the (expected)
    /// rejection so telemetry can tell it apart from data errors.
    EntryDropped(EvalError),
    Hold,
}

pub struct TradeSignalStateMachine {
    pub max_live_trades: usize,
    pub exit_threshold: f64,
    pub entry_floor: f64,
    pub entry_ceiling: f64,
    pub cooldown_secs: i64,
    pub profile_max_age_secs: i64,
    exit_rules: Vec<Box<dyn ExitRule>>,
}

impl TradeSignalStateMachine {
    pub fn new(
        max_live_trades: usize,
        exit_threshold: f64,
        entry_floor: f64,
        entry_ceiling: f64,
        cooldown_secs: i64,
        profile_max_age_secs: i64,
        stop_loss_z: f64,
        time_stop_half_lives: f64,
    ) -> Self {
        // Guard rules run before the primary z-exit, the same precedence
        // an operator would apply by hand.
        let exit_rules: Vec<Box<dyn ExitRule>> = vec![
            Box::new(StopLossExit { z: stop_loss_z }),
            Box::new(TimeStopExit {
                half_life_multiple: time_stop_half_lives,
            }),
            Box::new(ZScoreExit),
        ];
        Self {
            max_live_trades,
            exit_threshold,
            entry_floor,
            entry_ceiling,
            cooldown_secs,
            profile_max_age_secs,
            exit_rules,
        }
    }

    pub fn push_exit_rule(&mut self, rule: Box<dyn ExitRule>) {
        self.exit_rules.push(rule);
    }

    fn exit_reason(&self, trade: &Trade, verdict: &FitnessVerdict, now: i64) -> Option<&'static str> {
        self.exit_rules
            .iter()
            .find(|rule| rule.triggered(trade, verdict, now))
            .map(|rule| rule.name())
    }

    /// Feed one fresh verdict for one pair. Mutates the book (the owned
    /// cycle snapshot) and the pair's lifecycle; the caller persists the
    /// book wholesale afterwards.
    ///
    /// A pair whose fetch failed this cycle must simply not be fed — a
    /// missing verdict is never an exit signal.
    pub fn on_verdict(
        &self,
        book: &mut TradeBook,
        lifecycle: &mut PairLifecycle,
        verdict: &FitnessVerdict,
        profile: &DivergenceProfile,
        last_prices: (Decimal, Decimal),
        now: i64,
    ) -> Result<CycleEvent, EvalError> {
        profile.ensure_fresh(now, self.profile_max_age_secs)?;
        let pair = verdict.pair_key();
        let entry_threshold = profile
            .optimal_entry_threshold
            .clamp(self.entry_floor, self.entry_ceiling);
        let z = verdict.current_z_score;

        if book.trades.contains_key(&pair) {
            lifecycle.phase = TradePhase::InTrade;
            if let Some(reason) = self.exit_reason(&book.trades[&pair], verdict, now) {
                lifecycle.phase = TradePhase::ExitSignal;
                let trade = book
                    .trades
                    .remove(&pair)
                    .expect("trade present, checked above");
                let record = close_trade(trade, verdict, last_prices, now, reason);
                lifecycle.phase = TradePhase::Closed;
                *lifecycle = PairLifecycle::fresh_after_close(now);
                return Ok(CycleEvent::Exited(record));
            }
            if z.abs() >= entry_threshold {
                // Exclusivity: a second qualifying signal while in trade
                // is ignored, not an error.
                return Ok(CycleEvent::EntryDropped(EvalError::DuplicateTradeAttempt {
                    pair,
                }));
            }
            return Ok(CycleEvent::Hold);
        }

        lifecycle.phase = TradePhase::Watching;
        if z.abs() < entry_threshold {
            return Ok(CycleEvent::Hold);
        }
        if let Some(exited_at) = lifecycle.last_exit_at {
            if now.saturating_sub(exited_at) < self.cooldown_secs {
                log::debug!("[ENTRY] {} in cooldown; signal skipped", pair);
                return Ok(CycleEvent::Hold);
            }
        }

        lifecycle.phase = TradePhase::EntrySignal;
        if book.trades.len() >= self.max_live_trades {
            lifecycle.phase = TradePhase::Watching;
            return Ok(CycleEvent::EntryDropped(EvalError::ConcurrencyCapExceeded {
                cap: self.max_live_trades,
            }));
        }

        let trade = open_trade(
            verdict,
            entry_threshold,
            self.exit_threshold,
            last_prices,
            now,
        );
        book.trades.insert(pair, trade.clone());
        lifecycle.phase = TradePhase::InTrade;
        Ok(CycleEvent::Entered(trade))
    }

    /// Operator-initiated entry: skips the z-threshold check but still
    /// goes through the same admission gates as an automatic entry.
    pub fn force_enter(
        &self,
        book: &mut TradeBook,
        verdict: &FitnessVerdict,
        profile: &DivergenceProfile,
        last_prices: (Decimal, Decimal),
        now: i64,
    ) -> Result<Trade, EvalError> {
        let pair = verdict.pair_key();
        if book.trades.contains_key(&pair) {
            return Err(EvalError::DuplicateTradeAttempt { pair });
        }
        if book.trades.len() >= self.max_live_trades {
            return Err(EvalError::ConcurrencyCapExceeded {
                cap: self.max_live_trades,
            });
        }
        let entry_threshold = profile
            .optimal_entry_threshold
            .clamp(self.entry_floor, self.entry_ceiling);
        let trade = open_trade(
            verdict,
            entry_threshold,
            self.exit_threshold,
            last_prices,
            now,
        );
        book.trades.insert(pair, trade.clone());
        Ok(trade)
    }

    /// Operator-initiated close. Returns `None` when the pair has no live
    /// trade.
    pub fn force_exit(
        &self,
        book: &mut TradeBook,
        pair: &str,
        verdict: &FitnessVerdict,
        last_prices: (Decimal, Decimal),
        now: i64,
    ) -> Option<TradeHistoryRecord> {
        book.trades
            .remove(pair)
            .map(|trade| close_trade(trade, verdict, last_prices, now, "manual"))
    }
}

/// Build a trade from an entry-qualifying verdict. Weights are
/// beta-neutral, not dollar-neutral: `w1 = 1/(1+|β|)` on asset1 and
/// `w2 = |β|/(1+|β|)` on asset2, summing to 1.
fn open_trade(
    verdict: &FitnessVerdict,
    entry_threshold: f64,
    exit_threshold: f64,
    last_prices: (Decimal, Decimal),
    now: i64,
) -> Trade {
    let z = verdict.current_z_score;
    // The cheaper leg relative to the model recovers: spread below mean
    // means asset1 is cheap, so go long asset1.
    let direction = if z < 0.0 {
        Direction::Long
    } else {
        Direction::Short
    };
    let abs_beta = verdict.beta.abs();
    let w1 = 1.0 / (1.0 + abs_beta);
    let w2 = abs_beta / (1.0 + abs_beta);
    let (long_symbol, short_symbol, long_weight, short_weight) = match direction {
        Direction::Long => (verdict.symbol1.clone(), verdict.symbol2.clone(), w1, w2),
        Direction::Short => (verdict.symbol2.clone(), verdict.symbol1.clone(), w2, w1),
    };
    Trade {
        pair: verdict.pair_key(),
        symbol1: verdict.symbol1.clone(),
        symbol2: verdict.symbol2.clone(),
        direction,
        entry_time: now,
        entry_z_score: z,
        entry_price1: last_prices.0,
        entry_price2: last_prices.1,
        beta: verdict.beta,
        long_symbol,
        short_symbol,
        long_weight,
        short_weight,
        entry_threshold,
        exit_threshold,
    }
}

fn close_trade(
    trade: Trade,
    verdict: &FitnessVerdict,
    last_prices: (Decimal, Decimal),
    now: i64,
    reason: &str,
) -> TradeHistoryRecord {
    let realized_pnl_pct = realized_pnl_pct(&trade, last_prices.0, last_prices.1);
    TradeHistoryRecord {
        trade,
        exit_time: now,
        exit_z_score: verdict.current_z_score,
        exit_price1: last_prices.0,
        exit_price2: last_prices.1,
        exit_reason: reason.to_string(),
        realized_pnl_pct,
    }
}

/// Realized P&L as a percentage: per-leg simple return times leg weight,
/// long leg positive, short leg negated, summed.
pub fn realized_pnl_pct(trade: &Trade, exit_price1: Decimal, exit_price2: Decimal) -> Decimal {
    if trade.entry_price1.is_zero() || trade.entry_price2.is_zero() {
        return Decimal::ZERO;
    }
    let r1 = (exit_price1 - trade.entry_price1) / trade.entry_price1;
    let r2 = (exit_price2 - trade.entry_price2) / trade.entry_price2;
    let abs_beta = trade.beta.abs();
    let w1 = Decimal::from_f64(1.0 / (1.0 + abs_beta)).unwrap_or(Decimal::ZERO);
    let w2 = Decimal::from_f64(abs_beta / (1.0 + abs_beta)).unwrap_or(Decimal::ZERO);
    let pnl = match trade.direction {
        Direction::Long => r1 * w1 - r2 * w2,
        Direction::Short => r2 * w2 - r1 * w1,
    };
    pnl * Decimal::ONE_HUNDRED
}
