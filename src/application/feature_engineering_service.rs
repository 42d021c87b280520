//! Technical indicator computation over a daily price series.
//!
//! All indicators are causal: the value at bar `i` only reads bars `0..=i`.
//! Rolling indicators stay `None` until their window is full.

use crate::domain::errors::{ForecastError, Result};
use crate::domain::market::{EnrichedBar, IndicatorValues, PriceBar};
use statrs::statistics::Statistics;
use ta::Next;
use ta::indicators::{MovingAverageConvergenceDivergence, SimpleMovingAverage};

pub const MA_SHORT_PERIOD: usize = 5;
pub const MA_MEDIUM_PERIOD: usize = 10;
pub const MA_LONG_PERIOD: usize = 20;
pub const MACD_FAST_PERIOD: usize = 12;
pub const MACD_SLOW_PERIOD: usize = 26;
pub const MACD_SIGNAL_PERIOD: usize = 9;
pub const RSI_PERIOD: usize = 14;
pub const VOLATILITY_PERIOD: usize = 20;

/// RSI reported when the trailing window has gains but no losses.
pub const RSI_NO_LOSS: f64 = 100.0;
/// RSI reported for a perfectly flat trailing window.
pub const RSI_FLAT: f64 = 50.0;

/// Computes MA5/10/20, MACD, signal line, RSI(14) and 20-bar volatility.
#[derive(Debug, Clone, Default)]
pub struct IndicatorEngine;

impl IndicatorEngine {
    pub fn new() -> Self {
        Self
    }

    /// Number of leading bars whose indicators are still undefined.
    pub fn warmup_bars(&self) -> usize {
        MA_LONG_PERIOD.max(VOLATILITY_PERIOD).max(RSI_PERIOD + 1) - 1
    }

    /// Enriches `bars` (ascending by date) with indicators. Output has the
    /// same length and order as the input; the input is not modified.
    pub fn compute(&self, bars: &[PriceBar]) -> Result<Vec<EnrichedBar>> {
        if let Some(pair) = bars.windows(2).find(|w| w[0].date >= w[1].date) {
            return Err(ForecastError::InvalidData {
                reason: format!(
                    "bars must be strictly ascending by date ({} then {})",
                    pair[0].date, pair[1].date
                ),
            });
        }

        let mut ma5 = Self::sma(MA_SHORT_PERIOD)?;
        let mut ma10 = Self::sma(MA_MEDIUM_PERIOD)?;
        let mut ma20 = Self::sma(MA_LONG_PERIOD)?;
        let mut macd = MovingAverageConvergenceDivergence::new(
            MACD_FAST_PERIOD,
            MACD_SLOW_PERIOD,
            MACD_SIGNAL_PERIOD,
        )
        .map_err(|e| ForecastError::invalid_config(format!("MACD parameters: {:?}", e)))?;

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let mut enriched = Vec::with_capacity(bars.len());

        for (i, bar) in bars.iter().enumerate() {
            let seen = i + 1;
            let ma5_val = ma5.next(bar.close);
            let ma10_val = ma10.next(bar.close);
            let ma20_val = ma20.next(bar.close);
            let macd_val = macd.next(bar.close);

            let indicators = IndicatorValues {
                ma5: (seen >= MA_SHORT_PERIOD).then_some(ma5_val),
                ma10: (seen >= MA_MEDIUM_PERIOD).then_some(ma10_val),
                ma20: (seen >= MA_LONG_PERIOD).then_some(ma20_val),
                macd: Some(macd_val.macd),
                signal_line: Some(macd_val.signal),
                rsi: relative_strength_index(&closes[..seen], RSI_PERIOD),
                volatility: rolling_std_dev(&closes[..seen], VOLATILITY_PERIOD),
            };

            enriched.push(EnrichedBar {
                bar: *bar,
                indicators,
            });
        }

        Ok(enriched)
    }

    fn sma(period: usize) -> Result<SimpleMovingAverage> {
        SimpleMovingAverage::new(period)
            .map_err(|e| ForecastError::invalid_config(format!("SMA({}): {:?}", period, e)))
    }
}

/// RSI over the last `period` day-over-day deltas of `closes`.
///
/// Average gain and average loss are simple means over the window. A window
/// without losses returns [`RSI_NO_LOSS`], a flat window [`RSI_FLAT`].
pub fn relative_strength_index(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let window = &closes[closes.len() - period - 1..];
    let (mut gains, mut losses) = (0.0, 0.0);
    for pair in window.windows(2) {
        let delta = pair[1] - pair[0];
        if delta > 0.0 {
            gains += delta;
        } else {
            losses -= delta;
        }
    }

    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;

    if avg_loss == 0.0 {
        return Some(if avg_gain > 0.0 { RSI_NO_LOSS } else { RSI_FLAT });
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Sample standard deviation of the trailing `period` values.
pub fn rolling_std_dev(values: &[f64], period: usize) -> Option<f64> {
    if period < 2 || values.len() < period {
        return None;
    }
    Some(values[values.len() - period..].iter().std_dev())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn series(closes: &[f64]) -> Vec<PriceBar> {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                let date = start + chrono::Duration::days(i as i64);
                PriceBar::new(date, c, c + 0.5, c - 0.5, c, 1_000.0 + i as f64)
            })
            .collect()
    }

    #[test]
    fn test_output_preserves_length_and_order() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + (i as f64 * 0.3).sin()).collect();
        let bars = series(&closes);
        let enriched = IndicatorEngine::new().compute(&bars).unwrap();

        assert_eq!(enriched.len(), bars.len());
        for (e, b) in enriched.iter().zip(bars.iter()) {
            assert_eq!(e.bar, *b);
        }
    }

    #[test]
    fn test_warmup_region_is_undefined() {
        let closes: Vec<f64> = (0..30).map(|i| 50.0 + i as f64).collect();
        let engine = IndicatorEngine::new();
        let enriched = engine.compute(&series(&closes)).unwrap();

        assert_eq!(engine.warmup_bars(), 19);
        assert!(enriched[3].indicators.ma5.is_none());
        assert!(enriched[4].indicators.ma5.is_some());
        assert!(enriched[18].indicators.ma20.is_none());
        assert!(enriched[18].indicators.volatility.is_none());
        assert!(enriched[13].indicators.rsi.is_none());
        assert!(enriched[14].indicators.rsi.is_some());
        assert!(!enriched[18].indicators.is_complete());
        assert!(enriched[19].indicators.is_complete());
    }

    #[test]
    fn test_moving_averages_match_trailing_mean() {
        let closes: Vec<f64> = (1..=25).map(|i| i as f64).collect();
        let enriched = IndicatorEngine::new().compute(&series(&closes)).unwrap();

        // closes 6..=10
        assert!((enriched[9].indicators.ma5.unwrap() - 8.0).abs() < 1e-9);
        // closes 1..=10
        assert!((enriched[9].indicators.ma10.unwrap() - 5.5).abs() < 1e-9);
        // closes 6..=25
        assert!((enriched[24].indicators.ma20.unwrap() - 15.5).abs() < 1e-9);
    }

    #[test]
    fn test_macd_follows_unadjusted_ema_recursion() {
        let closes = [10.0, 11.0, 12.5, 11.75, 13.0, 12.0];
        let enriched = IndicatorEngine::new().compute(&series(&closes)).unwrap();

        let (k12, k26, k9) = (2.0 / 13.0, 2.0 / 27.0, 2.0 / 10.0);
        let (mut e12, mut e26) = (closes[0], closes[0]);
        let mut signal = 0.0;
        for (i, &c) in closes.iter().enumerate() {
            if i > 0 {
                e12 = k12 * c + (1.0 - k12) * e12;
                e26 = k26 * c + (1.0 - k26) * e26;
            }
            let macd = e12 - e26;
            signal = if i == 0 { macd } else { k9 * macd + (1.0 - k9) * signal };

            assert!((enriched[i].indicators.macd.unwrap() - macd).abs() < 1e-9);
            assert!((enriched[i].indicators.signal_line.unwrap() - signal).abs() < 1e-9);
        }
        assert_eq!(enriched[0].indicators.macd, Some(0.0));
    }

    #[test]
    fn test_rsi_monotonic_series_returns_sentinel() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let enriched = IndicatorEngine::new().compute(&series(&closes)).unwrap();

        for row in &enriched[RSI_PERIOD..] {
            let rsi = row.indicators.rsi.unwrap();
            assert!(rsi.is_finite());
            assert_eq!(rsi, RSI_NO_LOSS);
        }
    }

    #[test]
    fn test_rsi_flat_series_is_neutral() {
        let closes = vec![42.0; 16];
        assert_eq!(relative_strength_index(&closes, 14), Some(RSI_FLAT));
    }

    #[test]
    fn test_rsi_mixed_deltas() {
        // 14 deltas: seven +2, seven -1 -> RS = 2, RSI = 66.67
        let mut closes = vec![100.0];
        for i in 0..14 {
            let last = *closes.last().unwrap();
            closes.push(if i % 2 == 0 { last + 2.0 } else { last - 1.0 });
        }
        let rsi = relative_strength_index(&closes, 14).unwrap();
        assert!((rsi - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_volatility_is_sample_std_dev() {
        let values: Vec<f64> = (1..=20).map(|i| i as f64).collect();
        let std = rolling_std_dev(&values, 20).unwrap();
        // variance of 1..=20 with n-1 denominator is 35
        assert!((std - 35f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_unsorted_input_rejected() {
        let mut bars = series(&[1.0, 2.0, 3.0]);
        bars.swap(0, 2);
        assert!(IndicatorEngine::new().compute(&bars).is_err());
    }

    #[test]
    fn test_empty_input_yields_empty_output() {
        assert!(IndicatorEngine::new().compute(&[]).unwrap().is_empty());
    }
}
