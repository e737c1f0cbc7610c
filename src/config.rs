//! Engine configuration. Everything here is pass-through: the core never
//! branches on where a value came from. A YAML file (STATARB_CONFIG_PATH)
//! is the primary source when present, environment variables override it,
//! and plain-env operation works with no file at all.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::env;
use std::fs::File;
use std::path::Path;
use std::str::FromStr;

use crate::divergence::DEFAULT_THRESHOLD_LADDER;
use crate::fitness::PairFitnessEvaluator;
use crate::scanner::ScanParams;
use crate::signal::TradeSignalStateMachine;

const DEFAULT_INTERVAL_SECS: u64 = 3_600;
const DEFAULT_ROLLING_WINDOW: usize = 30;
const DEFAULT_ENTRY_FLOOR: f64 = 1.5;
const DEFAULT_ENTRY_CEILING: f64 = 3.0;
const DEFAULT_EXIT_Z: f64 = 0.5;
const DEFAULT_STOP_LOSS_Z: f64 = 4.0;
const DEFAULT_TIME_STOP_HALF_LIVES: f64 = 3.0;
const DEFAULT_COOLDOWN_SECS: i64 = 7_200;
const DEFAULT_MAX_LIVE_TRADES: usize = 3;
const DEFAULT_MIN_CORRELATION: f64 = 0.8;
const DEFAULT_MAX_HALF_LIFE_DAYS: f64 = 30.0;
const DEFAULT_MIN_VOLUME_24H: f64 = 1_000_000.0;
const DEFAULT_MIN_OPEN_INTEREST: f64 = 500_000.0;
const DEFAULT_LOOKBACK_DAYS: u32 = 90;
const DEFAULT_TOP_N_PER_SECTOR: usize = 5;
const DEFAULT_CROSS_SECTOR_TOP_K: usize = 3;
const DEFAULT_FETCH_DELAY_MS: u64 = 250;
const DEFAULT_FETCH_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_FETCH_BASE_DELAY_MS: u64 = 500;
const DEFAULT_STATE_DIR: &str = "statarb_state";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
struct EngineYaml {
    interval_secs: Option<u64>,
    rolling_window: Option<usize>,
    threshold_ladder: Option<Vec<f64>>,
    entry_floor: Option<f64>,
    entry_ceiling: Option<f64>,
    exit_z_score: Option<f64>,
    stop_loss_z_score: Option<f64>,
    time_stop_half_lives: Option<f64>,
    cooldown_secs: Option<i64>,
    max_live_trades: Option<usize>,
    min_correlation: Option<f64>,
    max_half_life_days: Option<f64>,
    min_volume_24h: Option<f64>,
    min_open_interest: Option<f64>,
    blacklist: Option<Vec<String>>,
    lookback_days: Option<u32>,
    top_n_per_sector: Option<usize>,
    cross_sector_top_k: Option<usize>,
    fetch_delay_ms: Option<u64>,
    fetch_max_attempts: Option<u32>,
    fetch_base_delay_ms: Option<u64>,
    state_dir: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub interval_secs: u64,
    pub rolling_window: usize,
    pub threshold_ladder: Vec<f64>,
    pub entry_floor: f64,
    pub entry_ceiling: f64,
    pub exit_z: f64,
    pub stop_loss_z: f64,
    pub time_stop_half_lives: f64,
    pub cooldown_secs: i64,
    pub max_live_trades: usize,
    pub min_correlation: f64,
    pub max_half_life_days: f64,
    pub min_volume_24h: f64,
    pub min_open_interest: f64,
    pub blacklist: Vec<String>,
    pub lookback_days: u32,
    pub top_n_per_sector: usize,
    pub cross_sector_top_k: usize,
    pub fetch_delay_ms: u64,
    pub fetch_max_attempts: u32,
    pub fetch_base_delay_ms: u64,
    pub state_dir: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
            rolling_window: DEFAULT_ROLLING_WINDOW,
            threshold_ladder: DEFAULT_THRESHOLD_LADDER.to_vec(),
            entry_floor: DEFAULT_ENTRY_FLOOR,
            entry_ceiling: DEFAULT_ENTRY_CEILING,
            exit_z: DEFAULT_EXIT_Z,
            stop_loss_z: DEFAULT_STOP_LOSS_Z,
            time_stop_half_lives: DEFAULT_TIME_STOP_HALF_LIVES,
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            max_live_trades: DEFAULT_MAX_LIVE_TRADES,
            min_correlation: DEFAULT_MIN_CORRELATION,
            max_half_life_days: DEFAULT_MAX_HALF_LIFE_DAYS,
            min_volume_24h: DEFAULT_MIN_VOLUME_24H,
            min_open_interest: DEFAULT_MIN_OPEN_INTEREST,
            blacklist: Vec::new(),
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            top_n_per_sector: DEFAULT_TOP_N_PER_SECTOR,
            cross_sector_top_k: DEFAULT_CROSS_SECTOR_TOP_K,
            fetch_delay_ms: DEFAULT_FETCH_DELAY_MS,
            fetch_max_attempts: DEFAULT_FETCH_MAX_ATTEMPTS,
            fetch_base_delay_ms: DEFAULT_FETCH_BASE_DELAY_MS,
            state_dir: DEFAULT_STATE_DIR.to_string(),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_list(key: &str) -> Option<Vec<String>> {
    env::var(key).ok().map(|v| {
        v.split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()
    })
}

fn env_f64_list(key: &str) -> Option<Vec<f64>> {
    env_list(key).map(|items| items.iter().filter_map(|v| v.parse().ok()).collect())
}

impl EngineConfig {
    pub fn from_env_or_yaml() -> Result<Self> {
        let config_path = env::var("STATARB_CONFIG_PATH")
            .ok()
            .filter(|value| !value.trim().is_empty());
        let mut cfg = if let Some(path) = config_path {
            Self::from_yaml_path(path)?
        } else {
            Self::default()
        };
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let file = File::open(path_ref)
            .with_context(|| format!("failed to open config {}", path_ref.display()))?;
        let yaml: EngineYaml = serde_yaml::from_reader(file)
            .with_context(|| format!("failed to parse config {}", path_ref.display()))?;
        let defaults = Self::default();
        Ok(Self {
            interval_secs: yaml.interval_secs.unwrap_or(defaults.interval_secs),
            rolling_window: yaml.rolling_window.unwrap_or(defaults.rolling_window),
            threshold_ladder: yaml
                .threshold_ladder
                .unwrap_or_else(|| defaults.threshold_ladder.clone()),
            entry_floor: yaml.entry_floor.unwrap_or(defaults.entry_floor),
            entry_ceiling: yaml.entry_ceiling.unwrap_or(defaults.entry_ceiling),
            exit_z: yaml.exit_z_score.unwrap_or(defaults.exit_z),
            stop_loss_z: yaml.stop_loss_z_score.unwrap_or(defaults.stop_loss_z),
            time_stop_half_lives: yaml
                .time_stop_half_lives
                .unwrap_or(defaults.time_stop_half_lives),
            cooldown_secs: yaml.cooldown_secs.unwrap_or(defaults.cooldown_secs),
            max_live_trades: yaml.max_live_trades.unwrap_or(defaults.max_live_trades),
            min_correlation: yaml.min_correlation.unwrap_or(defaults.min_correlation),
            max_half_life_days: yaml
                .max_half_life_days
                .unwrap_or(defaults.max_half_life_days),
            min_volume_24h: yaml.min_volume_24h.unwrap_or(defaults.min_volume_24h),
            min_open_interest: yaml
                .min_open_interest
                .unwrap_or(defaults.min_open_interest),
            blacklist: yaml.blacklist.unwrap_or_default(),
            lookback_days: yaml.lookback_days.unwrap_or(defaults.lookback_days),
            top_n_per_sector: yaml.top_n_per_sector.unwrap_or(defaults.top_n_per_sector),
            cross_sector_top_k: yaml
                .cross_sector_top_k
                .unwrap_or(defaults.cross_sector_top_k),
            fetch_delay_ms: yaml.fetch_delay_ms.unwrap_or(defaults.fetch_delay_ms),
            fetch_max_attempts: yaml
                .fetch_max_attempts
                .unwrap_or(defaults.fetch_max_attempts),
            fetch_base_delay_ms: yaml
                .fetch_base_delay_ms
                .unwrap_or(defaults.fetch_base_delay_ms),
            state_dir: yaml.state_dir.unwrap_or(defaults.state_dir),
        })
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parse("INTERVAL_SECS") {
            self.interval_secs = v;
        }
        if let Some(v) = env_parse("ROLLING_WINDOW") {
            self.rolling_window = v;
        }
        if let Some(v) = env_f64_list("THRESHOLD_LADDER") {
            if !v.is_empty() {
                self.threshold_ladder = v;
            }
        }
        if let Some(v) = env_parse("ENTRY_FLOOR") {
            self.entry_floor = v;
        }
        if let Some(v) = env_parse("ENTRY_CEILING") {
            self.entry_ceiling = v;
        }
        if let Some(v) = env_parse("EXIT_Z_SCORE") {
            self.exit_z = v;
        }
        if let Some(v) = env_parse("STOP_LOSS_Z_SCORE") {
            self.stop_loss_z = v;
        }
        if let Some(v) = env_parse("TIME_STOP_HALF_LIVES") {
            self.time_stop_half_lives = v;
        }
        if let Some(v) = env_parse("COOLDOWN_SECS") {
            self.cooldown_secs = v;
        }
        if let Some(v) = env_parse("MAX_LIVE_TRADES") {
            self.max_live_trades = v;
        }
        if let Some(v) = env_parse("MIN_CORRELATION") {
            self.min_correlation = v;
        }
        if let Some(v) = env_parse("MAX_HALF_LIFE_DAYS") {
            self.max_half_life_days = v;
        }
        if let Some(v) = env_parse("MIN_VOLUME_24H") {
            self.min_volume_24h = v;
        }
        if let Some(v) = env_parse("MIN_OPEN_INTEREST") {
            self.min_open_interest = v;
        }
        if let Some(v) = env_list("BLACKLIST") {
            self.blacklist = v;
        }
        if let Some(v) = env_parse("LOOKBACK_DAYS") {
            self.lookback_days = v;
        }
        if let Some(v) = env_parse("TOP_N_PER_SECTOR") {
            self.top_n_per_sector = v;
        }
        if let Some(v) = env_parse("CROSS_SECTOR_TOP_K") {
            self.cross_sector_top_k = v;
        }
        if let Some(v) = env_parse("FETCH_DELAY_MS") {
            self.fetch_delay_ms = v;
        }
        if let Some(v) = env_parse("FETCH_MAX_ATTEMPTS") {
            self.fetch_max_attempts = v;
        }
        if let Some(v) = env_parse("FETCH_BASE_DELAY_MS") {
            self.fetch_base_delay_ms = v;
        }
        if let Ok(v) = env::var("STATE_DIR") {
            if !v.trim().is_empty() {
                self.state_dir = v.trim().to_string();
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.threshold_ladder.is_empty() {
            return Err(anyhow!("threshold_ladder must not be empty"));
        }
        if self.threshold_ladder.iter().any(|t| *t < 1.0) {
            return Err(anyhow!("threshold_ladder rungs must be >= 1.0"));
        }
        if self.entry_floor > self.entry_ceiling {
            return Err(anyhow!(
                "entry_floor {} exceeds entry_ceiling {}",
                self.entry_floor,
                self.entry_ceiling
            ));
        }
        if self.exit_z >= self.entry_floor {
            return Err(anyhow!(
                "exit_z_score {} must sit below entry_floor {}",
                self.exit_z,
                self.entry_floor
            ));
        }
        if self.rolling_window < 2 {
            return Err(anyhow!("rolling_window must be at least 2"));
        }
        if self.max_live_trades == 0 {
            return Err(anyhow!("max_live_trades must be positive"));
        }
        Ok(())
    }

    pub fn evaluator(&self) -> PairFitnessEvaluator {
        PairFitnessEvaluator {
            window: self.rolling_window,
            ladder: self.threshold_ladder.clone(),
            entry_floor: self.entry_floor,
        }
    }

    pub fn scan_params(&self) -> ScanParams {
        ScanParams {
            min_volume_24h: self.min_volume_24h,
            min_open_interest: self.min_open_interest,
            blacklist: self.blacklist.clone(),
            min_correlation: self.min_correlation,
            max_half_life_days: self.max_half_life_days,
            lookback_days: self.lookback_days,
            top_n_per_sector: self.top_n_per_sector,
            cross_sector_top_k: self.cross_sector_top_k,
            entry_floor: self.entry_floor,
            entry_ceiling: self.entry_ceiling,
            exit_threshold: self.exit_z,
            fetch_delay_ms: self.fetch_delay_ms,
        }
    }

    pub fn state_machine(&self) -> TradeSignalStateMachine {
        TradeSignalStateMachine::new(
            self.max_live_trades,
            self.exit_z,
            self.entry_floor,
            self.entry_ceiling,
            self.cooldown_secs,
            // A profile is good for two polling intervals past its cutoff.
            self.interval_secs as i64 * 2,
            self.stop_loss_z,
            self.time_stop_half_lives,
        )
    }
}
