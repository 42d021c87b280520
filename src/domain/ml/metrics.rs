use crate::domain::errors::{ForecastError, Result};
use serde::{Deserialize, Serialize};

/// Regression quality of a prediction vector against ground truth.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
}

impl RegressionMetrics {
    /// Computes MSE, RMSE, MAE and R².
    ///
    /// R² follows the usual convention for a constant target: 1.0 when the
    /// prediction is exact, 0.0 otherwise.
    pub fn compute(y_true: &[f64], y_pred: &[f64]) -> Result<Self> {
        if y_true.len() != y_pred.len() {
            return Err(ForecastError::ShapeMismatch {
                context: "evaluate".to_string(),
                expected: y_true.len(),
                actual: y_pred.len(),
            });
        }
        if y_true.is_empty() {
            return Err(ForecastError::insufficient("evaluate", 0, 0));
        }

        let n = y_true.len() as f64;
        let ss_res: f64 = y_true
            .iter()
            .zip(y_pred.iter())
            .map(|(t, p)| (t - p).powi(2))
            .sum();
        let mae = y_true
            .iter()
            .zip(y_pred.iter())
            .map(|(t, p)| (t - p).abs())
            .sum::<f64>()
            / n;

        let mean_true = y_true.iter().sum::<f64>() / n;
        let ss_tot: f64 = y_true.iter().map(|t| (t - mean_true).powi(2)).sum();

        let r2 = if ss_tot > 0.0 {
            1.0 - ss_res / ss_tot
        } else if ss_res == 0.0 {
            1.0
        } else {
            0.0
        };

        let mse = ss_res / n;
        Ok(Self {
            mse,
            rmse: mse.sqrt(),
            mae,
            r2,
        })
    }

    /// Arithmetic mean of each metric. `None` for an empty slice.
    pub fn mean(all: &[RegressionMetrics]) -> Option<Self> {
        if all.is_empty() {
            return None;
        }
        let n = all.len() as f64;
        Some(Self {
            mse: all.iter().map(|m| m.mse).sum::<f64>() / n,
            rmse: all.iter().map(|m| m.rmse).sum::<f64>() / n,
            mae: all.iter().map(|m| m.mae).sum::<f64>() / n,
            r2: all.iter().map(|m| m.r2).sum::<f64>() / n,
        })
    }
}
