//! Min-max feature scaling.
//!
//! The scaler is fit exactly once on the cleaned feature matrix of a dataset.
//! The resulting [`ScalingState`] is an immutable value that is threaded
//! explicitly into every later `transform`, so training windows and
//! inference windows share one scale.

use crate::domain::errors::{ForecastError, Result};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingState {
    min: Vec<f64>,
    max: Vec<f64>,
}

impl ScalingState {
    /// Fits per-column min/max on `matrix` (rows = observations).
    pub fn fit(matrix: &Array2<f64>) -> Result<Self> {
        if matrix.nrows() == 0 || matrix.ncols() == 0 {
            return Err(ForecastError::insufficient("scaler fit", 0, matrix.nrows()));
        }

        let mut min = Vec::with_capacity(matrix.ncols());
        let mut max = Vec::with_capacity(matrix.ncols());
        for column in matrix.axis_iter(Axis(1)) {
            let lo = column.iter().cloned().fold(f64::INFINITY, f64::min);
            let hi = column.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            if !lo.is_finite() || !hi.is_finite() {
                return Err(ForecastError::InvalidData {
                    reason: "feature matrix contains non-finite values".to_string(),
                });
            }
            min.push(lo);
            max.push(hi);
        }

        Ok(Self { min, max })
    }

    pub fn n_features(&self) -> usize {
        self.min.len()
    }

    pub fn min(&self) -> &[f64] {
        &self.min
    }

    pub fn max(&self) -> &[f64] {
        &self.max
    }

    // Constant columns keep a unit range and therefore map to 0.
    fn range(&self, col: usize) -> f64 {
        let range = self.max[col] - self.min[col];
        if range == 0.0 { 1.0 } else { range }
    }

    fn check_width(&self, matrix: &Array2<f64>, context: &str) -> Result<()> {
        if matrix.ncols() != self.n_features() {
            return Err(ForecastError::ShapeMismatch {
                context: context.to_string(),
                expected: self.n_features(),
                actual: matrix.ncols(),
            });
        }
        Ok(())
    }

    /// Scales every column into [0, 1] relative to the fitted range.
    /// Values outside the fitted range extrapolate linearly.
    pub fn transform(&self, matrix: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_width(matrix, "scaler transform")?;
        let mut out = matrix.clone();
        for (j, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
            let lo = self.min[j];
            let range = self.range(j);
            column.mapv_inplace(|v| (v - lo) / range);
        }
        Ok(out)
    }

    pub fn inverse_transform(&self, matrix: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_width(matrix, "scaler inverse transform")?;
        let mut out = matrix.clone();
        for (j, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
            let lo = self.min[j];
            let range = self.range(j);
            column.mapv_inplace(|v| v * range + lo);
        }
        Ok(out)
    }
}
