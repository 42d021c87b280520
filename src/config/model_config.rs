//! Model hyperparameters parsed from environment variables or TOML.
//!
//! Defaults reproduce the documented reference setup: a 100→50 LSTM trained
//! for 50 epochs and a 1000-tree boosted ensemble with early stopping.

use super::parse_var;
use crate::domain::errors::{ForecastError, Result as ForecastResult};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;

/// Hidden widths of the two stacked recurrent layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SequenceProfile {
    /// 100 → 50
    Wide,
    /// 50 → 50
    Compact,
}

impl SequenceProfile {
    pub fn hidden_sizes(&self) -> (usize, usize) {
        match self {
            SequenceProfile::Wide => (100, 50),
            SequenceProfile::Compact => (50, 50),
        }
    }
}

impl FromStr for SequenceProfile {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "wide" => Ok(SequenceProfile::Wide),
            "compact" => Ok(SequenceProfile::Compact),
            _ => anyhow::bail!("Invalid LSTM_PROFILE: {}. Must be 'wide' or 'compact'", s),
        }
    }
}

impl fmt::Display for SequenceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequenceProfile::Wide => write!(f, "wide"),
            SequenceProfile::Compact => write!(f, "compact"),
        }
    }
}

/// Recurrent model configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceModelConfig {
    pub profile: SequenceProfile,
    pub epochs: usize,
    pub batch_size: usize,
    /// Trailing fraction of the training windows held out for validation.
    pub validation_split: f64,
    pub learning_rate: f64,
    pub dropout: f64,
    pub dense_units: usize,
    pub seed: u64,
}

impl Default for SequenceModelConfig {
    fn default() -> Self {
        Self {
            profile: SequenceProfile::Wide,
            epochs: 50,
            batch_size: 32,
            validation_split: 0.2,
            learning_rate: 0.001,
            dropout: 0.2,
            dense_units: 25,
            seed: 42,
        }
    }
}

impl SequenceModelConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let profile = env::var("LSTM_PROFILE")
            .unwrap_or_else(|_| defaults.profile.to_string())
            .parse::<SequenceProfile>()
            .context("Failed to parse LSTM_PROFILE")?;

        Ok(Self {
            profile,
            epochs: parse_var("LSTM_EPOCHS", defaults.epochs)?,
            batch_size: parse_var("LSTM_BATCH_SIZE", defaults.batch_size)?,
            validation_split: parse_var("LSTM_VALIDATION_SPLIT", defaults.validation_split)?,
            learning_rate: parse_var("LSTM_LEARNING_RATE", defaults.learning_rate)?,
            dropout: parse_var("LSTM_DROPOUT", defaults.dropout)?,
            dense_units: parse_var("LSTM_DENSE_UNITS", defaults.dense_units)?,
            seed: parse_var("LSTM_SEED", defaults.seed)?,
        })
    }

    pub fn validate(&self) -> ForecastResult<()> {
        if self.epochs == 0 || self.batch_size == 0 || self.dense_units == 0 {
            return Err(ForecastError::invalid_config(
                "LSTM epochs, batch size and dense units must be positive",
            ));
        }
        if !(0.0..1.0).contains(&self.validation_split) {
            return Err(ForecastError::invalid_config(format!(
                "LSTM validation split must be in [0, 1), got {}",
                self.validation_split
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ForecastError::invalid_config(format!(
                "LSTM dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(ForecastError::invalid_config(format!(
                "LSTM learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }
}

/// Gradient-boosted tree configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeModelConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: u16,
    pub min_child_weight: usize,
    pub subsample: f64,
    pub colsample_bytree: f64,
    /// Stop after this many rounds without eval improvement. `None` disables.
    pub early_stopping_rounds: Option<usize>,
    pub seed: u64,
}

impl Default for TreeModelConfig {
    fn default() -> Self {
        Self {
            n_estimators: 1000,
            learning_rate: 0.01,
            max_depth: 5,
            min_child_weight: 1,
            subsample: 0.8,
            colsample_bytree: 0.8,
            early_stopping_rounds: Some(10),
            seed: 42,
        }
    }
}

impl TreeModelConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        // 0 disables early stopping
        let early_stopping: usize = parse_var(
            "XGB_EARLY_STOPPING_ROUNDS",
            defaults.early_stopping_rounds.unwrap_or(0),
        )?;

        Ok(Self {
            n_estimators: parse_var("XGB_N_ESTIMATORS", defaults.n_estimators)?,
            learning_rate: parse_var("XGB_LEARNING_RATE", defaults.learning_rate)?,
            max_depth: parse_var("XGB_MAX_DEPTH", defaults.max_depth)?,
            min_child_weight: parse_var("XGB_MIN_CHILD_WEIGHT", defaults.min_child_weight)?,
            subsample: parse_var("XGB_SUBSAMPLE", defaults.subsample)?,
            colsample_bytree: parse_var("XGB_COLSAMPLE_BYTREE", defaults.colsample_bytree)?,
            early_stopping_rounds: (early_stopping > 0).then_some(early_stopping),
            seed: parse_var("XGB_SEED", defaults.seed)?,
        })
    }

    pub fn validate(&self) -> ForecastResult<()> {
        if self.n_estimators == 0 || self.max_depth == 0 {
            return Err(ForecastError::invalid_config(
                "tree count and max depth must be positive",
            ));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(ForecastError::invalid_config(format!(
                "boosting learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        for (name, frac) in [
            ("subsample", self.subsample),
            ("colsample_bytree", self.colsample_bytree),
        ] {
            if !(frac > 0.0 && frac <= 1.0) {
                return Err(ForecastError::invalid_config(format!(
                    "{} must be in (0, 1], got {}",
                    name, frac
                )));
            }
        }
        if self.early_stopping_rounds == Some(0) {
            return Err(ForecastError::invalid_config(
                "early stopping rounds must be positive when set",
            ));
        }
        Ok(())
    }
}
