use crate::domain::market::EnrichedBar;
use serde::{Deserialize, Serialize};

/// A named column of the model input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureColumn {
    Open,
    High,
    Low,
    Close,
    Volume,
    Ma5,
    Ma10,
    Ma20,
    Macd,
    SignalLine,
    Rsi,
    Volatility,
}

/// Ordered feature schema.
/// This order MUST be identical between training and inference.
/// Any change here is a breaking change for persisted models.
pub const FEATURE_SCHEMA: [FeatureColumn; 12] = [
    FeatureColumn::Open,
    FeatureColumn::High,
    FeatureColumn::Low,
    FeatureColumn::Close,
    FeatureColumn::Volume,
    FeatureColumn::Ma5,
    FeatureColumn::Ma10,
    FeatureColumn::Ma20,
    FeatureColumn::Macd,
    FeatureColumn::SignalLine,
    FeatureColumn::Rsi,
    FeatureColumn::Volatility,
];

impl FeatureColumn {
    pub fn name(&self) -> &'static str {
        match self {
            FeatureColumn::Open => "open",
            FeatureColumn::High => "high",
            FeatureColumn::Low => "low",
            FeatureColumn::Close => "close",
            FeatureColumn::Volume => "volume",
            FeatureColumn::Ma5 => "MA5",
            FeatureColumn::Ma10 => "MA10",
            FeatureColumn::Ma20 => "MA20",
            FeatureColumn::Macd => "MACD",
            FeatureColumn::SignalLine => "SignalLine",
            FeatureColumn::Rsi => "RSI",
            FeatureColumn::Volatility => "Volatility",
        }
    }

    /// Reads this column from an enriched bar. `None` while the indicator warms up.
    pub fn extract(&self, row: &EnrichedBar) -> Option<f64> {
        let bar = &row.bar;
        let ind = &row.indicators;
        match self {
            FeatureColumn::Open => Some(bar.open),
            FeatureColumn::High => Some(bar.high),
            FeatureColumn::Low => Some(bar.low),
            FeatureColumn::Close => Some(bar.close),
            FeatureColumn::Volume => Some(bar.volume),
            FeatureColumn::Ma5 => ind.ma5,
            FeatureColumn::Ma10 => ind.ma10,
            FeatureColumn::Ma20 => ind.ma20,
            FeatureColumn::Macd => ind.macd,
            FeatureColumn::SignalLine => ind.signal_line,
            FeatureColumn::Rsi => ind.rsi,
            FeatureColumn::Volatility => ind.volatility,
        }
    }
}

/// Converts a bar into a feature vector following `schema`.
/// Returns `None` if any field is still undefined; rows are never imputed.
pub fn features_to_vector(row: &EnrichedBar, schema: &[FeatureColumn]) -> Option<Vec<f64>> {
    schema
        .iter()
        .map(|col| col.extract(row).filter(|v| v.is_finite()))
        .collect()
}
