use thiserror::Error;

/// Errors raised by the forecasting core.
///
/// The core never prints; callers decide how to present these.
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("Market data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error("Insufficient data for {context}: need more than {required} rows, got {available}")]
    InsufficientData {
        context: String,
        required: usize,
        available: usize,
    },

    #[error("Model not trained: {model}")]
    ModelNotTrained { model: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    #[error("Invalid market data: {reason}")]
    InvalidData { reason: String },

    #[error("Shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    #[error("{model} backend failure: {reason}")]
    Backend { model: String, reason: String },
}

impl ForecastError {
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    pub fn not_trained(model: impl Into<String>) -> Self {
        Self::ModelNotTrained {
            model: model.into(),
        }
    }

    pub fn insufficient(context: impl Into<String>, required: usize, available: usize) -> Self {
        Self::InsufficientData {
            context: context.into(),
            required,
            available,
        }
    }

    pub fn backend(model: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Backend {
            model: model.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ForecastError>;
