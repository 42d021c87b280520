//! Pipeline configuration parsing from environment variables.
//!
//! This module handles windowing, splitting, cross-validation and ensemble
//! weighting parameters.

use super::parse_var;
use crate::domain::errors::{ForecastError, Result as ForecastResult};
use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineEnvConfig {
    pub sequence_length: usize,
    pub train_fraction: f64,

    // Cross-validation
    pub cv_splits: usize,
    pub cv_gap: usize,
    pub cv_max_train_size: Option<usize>,

    // Ensemble
    pub sequence_weight: f64,
    pub tree_weight: f64,

    pub parallel_training: bool,
}

impl Default for PipelineEnvConfig {
    fn default() -> Self {
        Self {
            sequence_length: 10,
            train_fraction: 0.8,
            cv_splits: 5,
            cv_gap: 0,
            cv_max_train_size: None,
            sequence_weight: 0.6,
            tree_weight: 0.4,
            parallel_training: false,
        }
    }
}

impl PipelineEnvConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        // 0 means an expanding window
        let max_train: usize = parse_var("FORECAST_CV_MAX_TRAIN_SIZE", 0)?;

        Ok(Self {
            sequence_length: parse_var("FORECAST_SEQUENCE_LENGTH", defaults.sequence_length)?,
            train_fraction: parse_var("FORECAST_TRAIN_FRACTION", defaults.train_fraction)?,
            cv_splits: parse_var("FORECAST_CV_SPLITS", defaults.cv_splits)?,
            cv_gap: parse_var("FORECAST_CV_GAP", defaults.cv_gap)?,
            cv_max_train_size: (max_train > 0).then_some(max_train),
            sequence_weight: parse_var("FORECAST_SEQUENCE_WEIGHT", defaults.sequence_weight)?,
            tree_weight: parse_var("FORECAST_TREE_WEIGHT", defaults.tree_weight)?,
            parallel_training: parse_var("FORECAST_PARALLEL_TRAINING", false)?,
        })
    }

    pub fn validate(&self) -> ForecastResult<()> {
        if self.sequence_length == 0 {
            return Err(ForecastError::invalid_config(
                "sequence length must be positive",
            ));
        }
        if !(self.train_fraction > 0.0 && self.train_fraction < 1.0) {
            return Err(ForecastError::invalid_config(format!(
                "train fraction must be in (0, 1), got {}",
                self.train_fraction
            )));
        }
        if self.cv_splits < 2 {
            return Err(ForecastError::invalid_config(format!(
                "cross-validation needs at least 2 splits, got {}",
                self.cv_splits
            )));
        }
        if self.cv_max_train_size == Some(0) {
            return Err(ForecastError::invalid_config(
                "cross-validation max train size must be positive when set",
            ));
        }
        Ok(())
    }
}
