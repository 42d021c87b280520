use crate::domain::errors::{ForecastError, Result};
use chrono::NaiveDate;
use ndarray::{Array1, Array2, Array3, Axis, s};
use std::ops::Range;

/// Supervised windows produced by the window builder.
///
/// `x` has shape (windows, sequence_length, features) and holds scaled
/// features; `y[i]` is the raw close of the bar right after window `i`.
#[derive(Debug, Clone)]
pub struct WindowedDataset {
    x: Array3<f64>,
    y: Array1<f64>,
    target_dates: Vec<NaiveDate>,
}

impl WindowedDataset {
    pub fn new(x: Array3<f64>, y: Array1<f64>, target_dates: Vec<NaiveDate>) -> Result<Self> {
        if x.len_of(Axis(0)) != y.len() {
            return Err(ForecastError::ShapeMismatch {
                context: "windowed dataset targets".to_string(),
                expected: x.len_of(Axis(0)),
                actual: y.len(),
            });
        }
        if target_dates.len() != y.len() {
            return Err(ForecastError::ShapeMismatch {
                context: "windowed dataset dates".to_string(),
                expected: y.len(),
                actual: target_dates.len(),
            });
        }
        Ok(Self { x, y, target_dates })
    }

    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    pub fn sequence_length(&self) -> usize {
        self.x.len_of(Axis(1))
    }

    pub fn n_features(&self) -> usize {
        self.x.len_of(Axis(2))
    }

    pub fn x(&self) -> &Array3<f64> {
        &self.x
    }

    pub fn y(&self) -> &Array1<f64> {
        &self.y
    }

    pub fn target_dates(&self) -> &[NaiveDate] {
        &self.target_dates
    }

    /// Contiguous sub-range of windows, order preserved.
    pub fn slice(&self, range: Range<usize>) -> Result<Self> {
        if range.start > range.end || range.end > self.len() {
            return Err(ForecastError::ShapeMismatch {
                context: "dataset slice end".to_string(),
                expected: self.len(),
                actual: range.end,
            });
        }
        Ok(Self {
            x: self.x.slice(s![range.clone(), .., ..]).to_owned(),
            y: self.y.slice(s![range.clone()]).to_owned(),
            target_dates: self.target_dates[range].to_vec(),
        })
    }

    /// Prefix/suffix split: the first `floor(len * train_fraction)` windows
    /// train, the rest test. No shuffling.
    pub fn train_test_split(&self, train_fraction: f64) -> Result<(Self, Self)> {
        if !(train_fraction > 0.0 && train_fraction < 1.0) {
            return Err(ForecastError::invalid_config(format!(
                "train fraction must be in (0, 1), got {}",
                train_fraction
            )));
        }
        let split = (self.len() as f64 * train_fraction).floor() as usize;
        if split == 0 || split == self.len() {
            return Err(ForecastError::insufficient("train/test split", 1, self.len()));
        }
        Ok((self.slice(0..split)?, self.slice(split..self.len())?))
    }

    /// Each window reshaped to one flat row of `sequence_length * n_features`.
    pub fn flattened_x(&self) -> Result<Array2<f64>> {
        flatten_windows(&self.x)
    }
}

/// Row-major flattening of (windows, steps, features) into (windows, steps * features).
pub fn flatten_windows(x: &Array3<f64>) -> Result<Array2<f64>> {
    let (n, steps, features) = x.dim();
    x.to_shape((n, steps * features))
        .map(|flat| flat.into_owned())
        .map_err(|e| ForecastError::InvalidData {
            reason: format!("cannot flatten windows of shape {:?}: {}", x.dim(), e),
        })
}
