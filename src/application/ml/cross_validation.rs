use crate::domain::errors::{ForecastError, Result};
use crate::domain::ml::RegressionMetrics;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Expanding-window time-series splitter.
///
/// With `n_splits = k` over `n` samples, every validation block holds
/// `n / (k + 1)` samples and the blocks tile the tail of the series. Each
/// training range ends `gap` samples before its validation block and
/// starts at 0 unless `max_train_size` caps it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSeriesSplit {
    pub n_splits: usize,
    pub max_train_size: Option<usize>,
    pub gap: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    pub train: Range<usize>,
    pub validation: Range<usize>,
}

impl TimeSeriesSplit {
    pub fn new(n_splits: usize) -> Self {
        Self {
            n_splits,
            max_train_size: None,
            gap: 0,
        }
    }

    pub fn with_gap(mut self, gap: usize) -> Self {
        self.gap = gap;
        self
    }

    pub fn with_max_train_size(mut self, max_train_size: Option<usize>) -> Self {
        self.max_train_size = max_train_size;
        self
    }

    pub fn split(&self, n_samples: usize) -> Result<Vec<Fold>> {
        if self.n_splits < 2 {
            return Err(ForecastError::invalid_config(format!(
                "cross-validation needs at least 2 splits, got {}",
                self.n_splits
            )));
        }
        if self.max_train_size == Some(0) {
            return Err(ForecastError::invalid_config(
                "max train size must be positive when set",
            ));
        }

        let n_folds = self.n_splits + 1;
        let test_size = n_samples / n_folds;
        let needed = self.n_splits * test_size + self.gap;
        if test_size == 0 || needed >= n_samples {
            return Err(ForecastError::insufficient(
                "cross-validation",
                n_folds.max(self.n_splits + self.gap),
                n_samples,
            ));
        }

        let first_test = n_samples - self.n_splits * test_size;
        let folds = (0..self.n_splits)
            .map(|k| {
                let test_start = first_test + k * test_size;
                let train_end = test_start - self.gap;
                let train_start = match self.max_train_size {
                    Some(max) if max < train_end => train_end - max,
                    _ => 0,
                };
                Fold {
                    train: train_start..train_end,
                    validation: test_start..test_start + test_size,
                }
            })
            .collect();
        Ok(folds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldReport {
    pub fold: usize,
    pub train: Range<usize>,
    pub validation: Range<usize>,
    pub metrics: RegressionMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidationReport {
    pub folds: Vec<FoldReport>,
    /// Element-wise mean of the fold metrics.
    pub mean: RegressionMetrics,
}

impl CrossValidationReport {
    pub fn from_folds(folds: Vec<FoldReport>) -> Result<Self> {
        let metrics: Vec<RegressionMetrics> = folds.iter().map(|f| f.metrics).collect();
        let mean = RegressionMetrics::mean(&metrics)
            .ok_or_else(|| ForecastError::insufficient("cross-validation report", 0, 0))?;
        Ok(Self { folds, mean })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expanding_folds() {
        let folds = TimeSeriesSplit::new(5).split(60).unwrap();

        assert_eq!(folds.len(), 5);
        assert_eq!(folds[0].train, 0..10);
        assert_eq!(folds[0].validation, 10..20);
        assert_eq!(folds[4].train, 0..50);
        assert_eq!(folds[4].validation, 50..60);
        for fold in &folds {
            assert!(fold.train.end <= fold.validation.start);
        }
    }

    #[test]
    fn test_remainder_goes_to_first_training_block() {
        let folds = TimeSeriesSplit::new(3).split(10).unwrap();
        // test_size = 10 / 4 = 2
        assert_eq!(folds[0].train, 0..4);
        assert_eq!(folds[0].validation, 4..6);
        assert_eq!(folds[2].validation, 8..10);
    }

    #[test]
    fn test_gap_and_max_train_size() {
        let folds = TimeSeriesSplit::new(2)
            .with_gap(2)
            .with_max_train_size(Some(5))
            .split(30)
            .unwrap();

        assert_eq!(folds[0].validation, 10..20);
        assert_eq!(folds[0].train, 3..8);
        assert_eq!(folds[1].train, 13..18);
    }

    #[test]
    fn test_too_few_samples() {
        assert!(matches!(
            TimeSeriesSplit::new(5).split(5),
            Err(ForecastError::InsufficientData { .. })
        ));
        assert!(TimeSeriesSplit::new(1).split(100).is_err());
    }

    #[test]
    fn test_report_mean() {
        let fold = |mse: f64| FoldReport {
            fold: 0,
            train: 0..1,
            validation: 1..2,
            metrics: RegressionMetrics {
                mse,
                rmse: mse.sqrt(),
                mae: mse,
                r2: 0.5,
            },
        };
        let report = CrossValidationReport::from_folds(vec![fold(1.0), fold(3.0)]).unwrap();
        assert_eq!(report.mean.mse, 2.0);
        assert!(CrossValidationReport::from_folds(vec![]).is_err());
    }
}
