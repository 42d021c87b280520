use crate::domain::errors::{ForecastError, Result};
use crate::domain::market::PriceBar;
use crate::domain::ports::MarketDataProvider;
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct BarRecord {
    #[serde(alias = "Date")]
    date: NaiveDate,
    #[serde(alias = "Open")]
    open: f64,
    #[serde(alias = "High")]
    high: f64,
    #[serde(alias = "Low")]
    low: f64,
    #[serde(alias = "Close")]
    close: f64,
    #[serde(alias = "vol", alias = "Volume")]
    volume: f64,
}

/// Reads daily bars from CSV files with a `date,open,high,low,close,volume`
/// header (dates as `YYYY-MM-DD`).
///
/// When `root` is a directory the file for a symbol is `<root>/<symbol>.csv`;
/// when it is a file, that file is used for every symbol.
#[derive(Debug, Clone)]
pub struct CsvMarketDataProvider {
    root: PathBuf,
}

impl CsvMarketDataProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, symbol: &str) -> PathBuf {
        if self.root.is_dir() {
            self.root.join(format!("{}.csv", symbol))
        } else {
            self.root.clone()
        }
    }

    fn read_all(path: &Path, symbol: &str) -> Result<Vec<PriceBar>> {
        let unavailable = |reason: String| ForecastError::DataUnavailable {
            symbol: symbol.to_string(),
            reason,
        };

        let file = File::open(path).map_err(|e| unavailable(format!("{:?}: {}", path, e)))?;
        let mut rdr = csv::Reader::from_reader(BufReader::new(file));

        let mut bars = Vec::new();
        for (line, result) in rdr.deserialize().enumerate() {
            let record: BarRecord = result.map_err(|e| ForecastError::InvalidData {
                reason: format!("{:?} record {}: {}", path, line + 1, e),
            })?;
            bars.push(PriceBar::new(
                record.date,
                record.open,
                record.high,
                record.low,
                record.close,
                record.volume,
            ));
        }
        debug!("Read {} records from {:?}", bars.len(), path);
        Ok(bars)
    }
}

impl MarketDataProvider for CsvMarketDataProvider {
    fn fetch_daily_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>> {
        let path = self.path_for(symbol);
        let mut bars = Self::read_all(&path, symbol)?;
        bars.retain(|b| b.date >= start && b.date <= end);
        bars.sort_by_key(|b| b.date);

        if bars.is_empty() {
            return Err(ForecastError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: format!("no rows between {} and {} in {:?}", start, end, path),
            });
        }
        info!("Loaded {} bars for {} from {:?}", bars.len(), symbol, path);
        Ok(bars)
    }

    fn name(&self) -> &str {
        "csv"
    }
}
