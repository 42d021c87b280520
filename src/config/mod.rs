//! Configuration module for Rustforecast.
//!
//! This module provides structured configuration loading from environment
//! variables or a TOML file, organized by concern: Pipeline, Sequence model
//! and Tree model.

mod model_config;
mod pipeline_config;

pub use model_config::{SequenceModelConfig, SequenceProfile, TreeModelConfig};
pub use pipeline_config::PipelineEnvConfig;

use crate::domain::errors::Result as ForecastResult;
use crate::domain::ml::EnsembleWeights;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;

/// Main forecasting configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub pipeline: PipelineEnvConfig,
    pub sequence: SequenceModelConfig,
    pub tree: TreeModelConfig,
}

impl ForecastConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let pipeline = PipelineEnvConfig::from_env().context("Failed to load pipeline config")?;
        let sequence =
            SequenceModelConfig::from_env().context("Failed to load sequence model config")?;
        let tree = TreeModelConfig::from_env().context("Failed to load tree model config")?;

        Ok(Self {
            pipeline,
            sequence,
            tree,
        })
    }

    /// Parse a TOML document. Missing sections and keys keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse forecast config TOML")
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> ForecastResult<()> {
        self.pipeline.validate()?;
        self.sequence.validate()?;
        self.tree.validate()?;
        self.weights()?;
        Ok(())
    }

    pub fn weights(&self) -> ForecastResult<EnsembleWeights> {
        EnsembleWeights::new(self.pipeline.sequence_weight, self.pipeline.tree_weight)
    }
}

/// Reads `key` from the environment, falling back to `default` when unset.
pub(crate) fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr + ToString,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse::<T>()
        .context(format!("Failed to parse {}", key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_partial_override() {
        let config = ForecastConfig::from_toml_str(
            r#"
            [pipeline]
            sequence_length = 20
            sequence_weight = 0.5
            tree_weight = 0.5

            [tree]
            n_estimators = 200
            early_stopping_rounds = 25
            "#,
        )
        .unwrap();

        assert_eq!(config.pipeline.sequence_length, 20);
        assert_eq!(config.pipeline.train_fraction, 0.8);
        assert_eq!(config.tree.n_estimators, 200);
        assert_eq!(config.tree.early_stopping_rounds, Some(25));
        assert_eq!(config.tree.max_depth, 5);
        assert_eq!(config.sequence, SequenceModelConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_profile_name() {
        let config = ForecastConfig::from_toml_str("[sequence]\nprofile = \"compact\"\n").unwrap();
        assert_eq!(config.sequence.profile, SequenceProfile::Compact);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(ForecastConfig::from_toml_str("[pipeline]\nsequence_length = \"ten\"").is_err());
    }

    #[test]
    fn test_negative_weight_fails_validation() {
        let mut config = ForecastConfig::default();
        config.pipeline.tree_weight = -1.0;
        assert!(config.validate().is_err());
    }
}
