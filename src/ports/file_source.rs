//! File-backed price source: a directory holding `universe.json` (symbol
//! metadata) and one `<SYMBOL>.json` close series per symbol. This is the
//! default collaborator for the CLI; a cache-refreshing fetcher can drop
//! files into the directory without the core knowing or caring.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::fs;
use std::path::PathBuf;

use crate::ports::price_source::{PriceSource, SymbolMeta};
use crate::series::PricePoint;

#[derive(Debug, Clone)]
pub struct FileSource {
    dir: PathBuf,
}

impl FileSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn read_points(&self, symbol: &str) -> Result<Vec<PricePoint>> {
        let path = self.dir.join(format!("{}.json", symbol));
        let payload = fs::read_to_string(&path)
            .with_context(|| format!("no close data for {} at {}", symbol, path.display()))?;
        let mut points: Vec<PricePoint> = serde_json::from_str(&payload)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        points.sort_by_key(|p| p.ts);
        points.dedup_by_key(|p| p.ts);
        Ok(points)
    }
}

#[async_trait]
impl PriceSource for FileSource {
    async fn get_universe(&self) -> Result<Vec<SymbolMeta>> {
        let path = self.dir.join("universe.json");
        let payload = fs::read_to_string(&path)
            .with_context(|| format!("no universe file at {}", path.display()))?;
        let universe: Vec<SymbolMeta> = serde_json::from_str(&payload)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        if universe.is_empty() {
            return Err(anyhow!("universe file {} is empty", path.display()));
        }
        Ok(universe)
    }

    async fn get_daily_closes(&self, symbol: &str, days: u32) -> Result<Vec<PricePoint>> {
        let points = self.read_points(symbol)?;
        let start = points.len().saturating_sub(days as usize);
        Ok(points[start..].to_vec())
    }

    async fn get_hourly_closes(
        &self,
        symbol: &str,
        from: i64,
        to: i64,
    ) -> Result<Vec<PricePoint>> {
        let points = self.read_points(symbol)?;
        Ok(points
            .into_iter()
            .filter(|p| p.ts >= from && p.ts <= to)
            .collect())
    }
}
