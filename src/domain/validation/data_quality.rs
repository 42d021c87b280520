use crate::domain::errors::{ForecastError, Result};
use crate::domain::market::PriceBar;
use tracing::{debug, warn};

/// Centralized validator for raw price series.
///
/// Orders bars by date and rejects series that cannot be trusted for
/// indicator computation (non-finite prices, inverted ranges, conflicting
/// duplicates).
pub struct BarSanitizer;

impl BarSanitizer {
    /// Validates a single bar. Returns the reason it was rejected, if any.
    pub fn check_bar(bar: &PriceBar) -> Option<String> {
        let prices = [bar.open, bar.high, bar.low, bar.close];
        if prices.iter().any(|p| !p.is_finite()) || !bar.volume.is_finite() {
            return Some(format!("bar {} has non-finite values", bar.date));
        }
        if prices.iter().any(|p| *p <= 0.0) {
            return Some(format!("bar {} has non-positive price component(s)", bar.date));
        }
        if bar.low > bar.high {
            return Some(format!(
                "bar {} has low {} > high {}",
                bar.date, bar.low, bar.high
            ));
        }
        if bar.volume < 0.0 {
            return Some(format!("bar {} has negative volume {}", bar.date, bar.volume));
        }
        None
    }

    /// Sorts bars by date, drops exact duplicate rows and rejects invalid bars
    /// or conflicting rows that share a date.
    pub fn sanitize(bars: &[PriceBar]) -> Result<Vec<PriceBar>> {
        let mut sorted = bars.to_vec();
        sorted.sort_by_key(|b| b.date);

        let mut cleaned: Vec<PriceBar> = Vec::with_capacity(sorted.len());
        let mut duplicates = 0usize;

        for bar in sorted {
            if let Some(reason) = Self::check_bar(&bar) {
                warn!("Validation FAILED: {}", reason);
                return Err(ForecastError::InvalidData { reason });
            }

            match cleaned.last() {
                Some(prev) if prev.date == bar.date => {
                    if *prev == bar {
                        duplicates += 1;
                        continue;
                    }
                    warn!("Validation FAILED: conflicting bars for {}", bar.date);
                    return Err(ForecastError::InvalidData {
                        reason: format!("conflicting bars share date {}", bar.date),
                    });
                }
                _ => cleaned.push(bar),
            }
        }

        if duplicates > 0 {
            debug!("Dropped {} duplicate bar(s)", duplicates);
        }

        Ok(cleaned)
    }
}
