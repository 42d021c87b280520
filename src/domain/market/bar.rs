use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One daily OHLCV observation as returned by a market-data provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    pub fn new(date: NaiveDate, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

/// Technical indicators derived for a single bar.
///
/// `None` marks the rolling-window warm-up region. These values are never
/// back-filled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorValues {
    pub ma5: Option<f64>,
    pub ma10: Option<f64>,
    pub ma20: Option<f64>,
    pub macd: Option<f64>,
    pub signal_line: Option<f64>,
    pub rsi: Option<f64>,
    pub volatility: Option<f64>,
}

impl IndicatorValues {
    /// True once every indicator has left its warm-up region.
    pub fn is_complete(&self) -> bool {
        self.ma5.is_some()
            && self.ma10.is_some()
            && self.ma20.is_some()
            && self.macd.is_some()
            && self.signal_line.is_some()
            && self.rsi.is_some()
            && self.volatility.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnrichedBar {
    pub bar: PriceBar,
    pub indicators: IndicatorValues,
}

impl EnrichedBar {
    pub fn date(&self) -> NaiveDate {
        self.bar.date
    }

    pub fn close(&self) -> f64 {
        self.bar.close
    }
}
