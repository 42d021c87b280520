use crate::domain::errors::Result;
use crate::domain::market::PriceBar;
use chrono::NaiveDate;

/// Source of historical daily bars.
///
/// Implementations surface fetch failures and empty results as
/// `ForecastError::DataUnavailable`. Retries, if any, live in the
/// implementation; the forecasting core never retries.
pub trait MarketDataProvider: Send + Sync {
    fn fetch_daily_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>>;

    fn name(&self) -> &str;
}
