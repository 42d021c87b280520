use super::cross_validation::{CrossValidationReport, FoldReport, TimeSeriesSplit};
use super::predictor::Regressor;
use super::sequence_model::SequenceModel;
use super::tree_model::TreeModel;
use crate::domain::errors::{ForecastError, Result};
use crate::domain::ml::{EnsembleWeights, RegressionMetrics};
use ndarray::{Array1, Array3, Axis, Zip, s};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::{info, warn};

/// The two component regressors.
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelPair<S = SequenceModel, T = TreeModel> {
    pub sequence: S,
    pub tree: T,
}

/// Per-model and blended predictions over the same windows.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentPredictions {
    pub sequence: Array1<f64>,
    pub tree: Array1<f64>,
}

impl ComponentPredictions {
    pub fn blend(&self, weights: EnsembleWeights) -> Array1<f64> {
        let mut out = Array1::zeros(self.sequence.len());
        Zip::from(&mut out)
            .and(&self.sequence)
            .and(&self.tree)
            .for_each(|o, &a, &b| *o = weights.combine(a, b));
        out
    }
}

/// Trains both regressors on the same windows and blends their predictions.
pub struct EnsembleForecaster<S = SequenceModel, T = TreeModel> {
    models: ModelPair<S, T>,
    weights: EnsembleWeights,
    parallel_training: bool,
}

impl<S: Regressor, T: Regressor> EnsembleForecaster<S, T> {
    pub fn new(sequence: S, tree: T, weights: EnsembleWeights) -> Self {
        Self {
            models: ModelPair { sequence, tree },
            weights,
            parallel_training: false,
        }
    }

    pub fn from_models(models: ModelPair<S, T>, weights: EnsembleWeights) -> Self {
        Self {
            models,
            weights,
            parallel_training: false,
        }
    }

    /// Train the two models concurrently on the rayon pool.
    pub fn with_parallel_training(mut self, parallel: bool) -> Self {
        self.parallel_training = parallel;
        self
    }

    pub fn models(&self) -> &ModelPair<S, T> {
        &self.models
    }

    pub fn weights(&self) -> EnsembleWeights {
        self.weights
    }

    pub fn set_weights(&mut self, weights: EnsembleWeights) {
        self.weights = weights;
    }

    pub fn is_trained(&self) -> bool {
        self.models.sequence.is_trained() && self.models.tree.is_trained()
    }

    pub fn reset(&mut self) {
        self.models.sequence.reset();
        self.models.tree.reset();
    }

    /// Fits both models from scratch on the same training windows.
    pub fn train_models(&mut self, x: &Array3<f64>, y: &Array1<f64>) -> Result<()> {
        if x.len_of(Axis(0)) != y.len() {
            return Err(ForecastError::ShapeMismatch {
                context: "ensemble training targets".to_string(),
                expected: x.len_of(Axis(0)),
                actual: y.len(),
            });
        }
        if y.is_empty() {
            return Err(ForecastError::insufficient("ensemble training", 0, 0));
        }

        self.reset();
        info!(
            "Training {} and {} on {} windows",
            self.models.sequence.name(),
            self.models.tree.name(),
            y.len()
        );

        let ModelPair { sequence, tree } = &mut self.models;
        if self.parallel_training {
            let (seq_result, tree_result) = rayon::join(|| sequence.fit(x, y), || tree.fit(x, y));
            seq_result?;
            tree_result?;
        } else {
            sequence.fit(x, y)?;
            tree.fit(x, y)?;
        }
        Ok(())
    }

    pub fn predict_components(&self, x: &Array3<f64>) -> Result<ComponentPredictions> {
        let sequence = self.models.sequence.predict(x)?;
        let tree = self.models.tree.predict(x)?;
        if sequence.len() != tree.len() {
            return Err(ForecastError::ShapeMismatch {
                context: "component predictions".to_string(),
                expected: sequence.len(),
                actual: tree.len(),
            });
        }
        Ok(ComponentPredictions { sequence, tree })
    }

    /// `weights.sequence * seq_pred + weights.tree * tree_pred` per window.
    pub fn predict(&self, x: &Array3<f64>, weights: EnsembleWeights) -> Result<Array1<f64>> {
        Ok(self.predict_components(x)?.blend(weights))
    }

    /// Prediction with the configured weights.
    pub fn predict_default(&self, x: &Array3<f64>) -> Result<Array1<f64>> {
        self.predict(x, self.weights)
    }

    pub fn evaluate(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<RegressionMetrics> {
        RegressionMetrics::compute(&y_true.to_vec(), &y_pred.to_vec())
    }

    /// Walk-forward validation. Every fold trains a fresh pair of models, so
    /// the models held by `self` are left untouched.
    pub fn cross_validate(
        &self,
        x: &Array3<f64>,
        y: &Array1<f64>,
        splitter: &TimeSeriesSplit,
    ) -> Result<CrossValidationReport> {
        let n = y.len();
        if x.len_of(Axis(0)) != n {
            return Err(ForecastError::ShapeMismatch {
                context: "cross-validation targets".to_string(),
                expected: x.len_of(Axis(0)),
                actual: n,
            });
        }

        let folds = splitter.split(n)?;
        let mut reports = Vec::with_capacity(folds.len());

        for (k, fold) in folds.into_iter().enumerate() {
            let (train_x, train_y) = take(x, y, fold.train.clone());
            let (val_x, val_y) = take(x, y, fold.validation.clone());

            let mut fold_models = EnsembleForecaster::new(
                self.models.sequence.fresh(),
                self.models.tree.fresh(),
                self.weights,
            )
            .with_parallel_training(self.parallel_training);
            fold_models.train_models(&train_x, &train_y)?;

            let pred = fold_models.predict_default(&val_x)?;
            let metrics = Self::evaluate(&val_y, &pred)?;
            if !metrics.rmse.is_finite() {
                warn!("Fold {} produced a non-finite RMSE", k + 1);
            }
            info!(
                "Fold {}: train {:?}, validation {:?}, RMSE {:.4}, MAE {:.4}, R2 {:.4}",
                k + 1,
                fold.train,
                fold.validation,
                metrics.rmse,
                metrics.mae,
                metrics.r2
            );

            reports.push(FoldReport {
                fold: k + 1,
                train: fold.train,
                validation: fold.validation,
                metrics,
            });
        }

        let report = CrossValidationReport::from_folds(reports)?;
        info!(
            "Cross-validation mean: RMSE {:.4}, MAE {:.4}, R2 {:.4}",
            report.mean.rmse, report.mean.mae, report.mean.r2
        );
        Ok(report)
    }
}

fn take(x: &Array3<f64>, y: &Array1<f64>, range: Range<usize>) -> (Array3<f64>, Array1<f64>) {
    (
        x.slice(s![range.clone(), .., ..]).to_owned(),
        y.slice(s![range]).to_owned(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    /// Predicts a fixed offset from the first feature of the last step.
    struct Offset {
        offset: f64,
        trained: bool,
    }

    impl Offset {
        fn new(offset: f64) -> Self {
            Self {
                offset,
                trained: false,
            }
        }
    }

    impl Regressor for Offset {
        fn fit(&mut self, _x: &Array3<f64>, _y: &Array1<f64>) -> Result<()> {
            self.trained = true;
            Ok(())
        }

        fn predict(&self, x: &Array3<f64>) -> Result<Array1<f64>> {
            if !self.trained {
                return Err(ForecastError::not_trained("Offset"));
            }
            let last = x.dim().1 - 1;
            Ok(x.slice(s![.., last, 0]).mapv(|v| v + self.offset))
        }

        fn reset(&mut self) {
            self.trained = false;
        }

        fn is_trained(&self) -> bool {
            self.trained
        }

        fn fresh(&self) -> Self {
            Self::new(self.offset)
        }

        fn name(&self) -> &str {
            "Offset"
        }
    }

    fn data(n: usize) -> (Array3<f64>, Array1<f64>) {
        let x = Array3::from_shape_fn((n, 2, 1), |(i, t, _)| (i + t) as f64);
        let y = Array1::from_iter((0..n).map(|i| (i + 2) as f64));
        (x, y)
    }

    fn forecaster() -> EnsembleForecaster<Offset, Offset> {
        EnsembleForecaster::new(Offset::new(1.0), Offset::new(3.0), EnsembleWeights::default())
    }

    #[test]
    fn test_predict_requires_training() {
        let (x, _) = data(4);
        assert!(matches!(
            forecaster().predict_default(&x),
            Err(ForecastError::ModelNotTrained { .. })
        ));
    }

    #[test]
    fn test_unit_weights_reproduce_components() {
        let (x, y) = data(6);
        let mut ens = forecaster();
        ens.train_models(&x, &y).unwrap();

        let components = ens.predict_components(&x).unwrap();
        let seq_only = ens.predict(&x, EnsembleWeights::new(1.0, 0.0).unwrap()).unwrap();
        let tree_only = ens.predict(&x, EnsembleWeights::new(0.0, 1.0).unwrap()).unwrap();

        assert_eq!(seq_only, components.sequence);
        assert_eq!(tree_only, components.tree);
    }

    #[test]
    fn test_default_blend() {
        let (x, y) = data(3);
        let mut ens = forecaster();
        ens.train_models(&x, &y).unwrap();

        // last-step feature is i + 1; 0.6 * (i + 2) + 0.4 * (i + 4) = i + 2.8
        let pred = ens.predict_default(&x).unwrap();
        let expected = array![2.8, 3.8, 4.8];
        for (p, e) in pred.iter().zip(expected.iter()) {
            assert!((p - e).abs() < 1e-12);
        }
    }

    #[test]
    fn test_parallel_training_trains_both() {
        let (x, y) = data(5);
        let mut ens = forecaster().with_parallel_training(true);
        ens.train_models(&x, &y).unwrap();
        assert!(ens.is_trained());
    }

    #[test]
    fn test_cross_validation_fold_layout() {
        let (x, y) = data(36);
        let ens = forecaster();
        let report = ens
            .cross_validate(&x, &y, &TimeSeriesSplit::new(5))
            .unwrap();

        assert_eq!(report.folds.len(), 5);
        for fold in &report.folds {
            assert!(fold.train.end <= fold.validation.start);
            assert_eq!(fold.validation.len(), 6);
            // Sequence stub is exact, tree stub is +2: blend error is 0.8.
            assert!((fold.metrics.mae - 0.8).abs() < 1e-9);
        }
        assert!((report.mean.mae - 0.8).abs() < 1e-9);
        // The coordinator's own models are untouched.
        assert!(!ens.is_trained());
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        let (x, _) = data(4);
        let y = Array1::zeros(3);
        assert!(forecaster().train_models(&x, &y).is_err());
    }
}
