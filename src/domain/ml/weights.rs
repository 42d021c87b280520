use crate::domain::errors::{ForecastError, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Linear blend of the sequence and tree predictions.
///
/// Both weights must be finite and non-negative. They are expected to sum to
/// 1.0; other sums are accepted but logged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnsembleWeights {
    sequence: f64,
    tree: f64,
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self {
            sequence: 0.6,
            tree: 0.4,
        }
    }
}

impl EnsembleWeights {
    pub fn new(sequence: f64, tree: f64) -> Result<Self> {
        for (name, w) in [("sequence", sequence), ("tree", tree)] {
            if !w.is_finite() || w < 0.0 {
                return Err(ForecastError::invalid_config(format!(
                    "{} weight must be finite and non-negative, got {}",
                    name, w
                )));
            }
        }
        if ((sequence + tree) - 1.0).abs() > 1e-6 {
            warn!(
                "Ensemble weights ({}, {}) sum to {} instead of 1.0",
                sequence,
                tree,
                sequence + tree
            );
        }
        Ok(Self { sequence, tree })
    }

    /// Weight pair from the sequence-model share alone (tree gets the rest).
    pub fn from_sequence_share(sequence: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&sequence) {
            return Err(ForecastError::invalid_config(format!(
                "sequence share must be in [0, 1], got {}",
                sequence
            )));
        }
        Self::new(sequence, 1.0 - sequence)
    }

    pub fn sequence(&self) -> f64 {
        self.sequence
    }

    pub fn tree(&self) -> f64 {
        self.tree
    }

    pub fn combine(&self, sequence_pred: f64, tree_pred: f64) -> f64 {
        self.sequence * sequence_pred + self.tree * tree_pred
    }
}
