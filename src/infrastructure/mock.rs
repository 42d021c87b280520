use crate::domain::errors::{ForecastError, Result};
use crate::domain::market::PriceBar;
use crate::domain::ports::MarketDataProvider;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;

/// Deterministic synthetic daily bars for demos and tests.
///
/// Closes follow a multiplicative random walk with drift and a monthly
/// seasonal term. Weekends are skipped.
#[derive(Debug, Clone)]
pub struct SyntheticMarketData {
    seed: u64,
    pub start_price: f64,
    pub drift: f64,
    pub volatility: f64,
    pub base_volume: f64,
}

impl SyntheticMarketData {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            start_price: 100.0,
            drift: 0.0005,
            volatility: 0.01,
            base_volume: 1_000_000.0,
        }
    }

    fn is_trading_day(date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }

    fn bars(
        &self,
        seed: u64,
        start: NaiveDate,
        mut keep_going: impl FnMut(NaiveDate, usize) -> bool,
    ) -> Vec<PriceBar> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut bars = Vec::new();
        let mut date = start;
        let mut prev_close = self.start_price;

        while keep_going(date, bars.len()) {
            if Self::is_trading_day(date) {
                let t = bars.len() as f64;
                let seasonal = 0.002 * (2.0 * PI * t / 21.0).sin();
                let shock = rng.random_range(-1.0..1.0) * self.volatility;
                let close = prev_close * (1.0 + self.drift + seasonal + shock);
                let open = prev_close * (1.0 + rng.random_range(-0.5..0.5) * self.volatility);
                let high = open.max(close) * (1.0 + rng.random_range(0.0..0.01));
                let low = open.min(close) * (1.0 - rng.random_range(0.0..0.01));
                let volume = self.base_volume * (1.0 + rng.random_range(-0.5..0.5));

                bars.push(PriceBar::new(date, open, high, low, close, volume));
                prev_close = close;
            }
            date += Duration::days(1);
        }
        bars
    }

    /// `count` consecutive trading-day bars starting on or after `start`.
    pub fn generate(&self, start: NaiveDate, count: usize) -> Vec<PriceBar> {
        self.bars(self.seed, start, |_, produced| produced < count)
    }

    fn symbol_seed(&self, symbol: &str) -> u64 {
        symbol
            .bytes()
            .fold(self.seed, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64))
    }
}

impl MarketDataProvider for SyntheticMarketData {
    fn fetch_daily_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>> {
        let bars = self.bars(self.symbol_seed(symbol), start, |date, _| date <= end);
        if bars.is_empty() {
            return Err(ForecastError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: format!("no trading days between {} and {}", start, end),
            });
        }
        Ok(bars)
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}
