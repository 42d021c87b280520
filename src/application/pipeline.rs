//! End-to-end forecasting flow: raw bars → indicators → scaled windows →
//! ensemble training, evaluation and next-day prediction.

use crate::application::feature_engineering_service::IndicatorEngine;
use crate::application::ml::{
    CrossValidationReport, EnsembleForecaster, ModelPair, Regressor, SequenceModel,
    TimeSeriesSplit, TreeModel, WindowBuilder,
};
use crate::config::ForecastConfig;
use crate::domain::errors::{ForecastError, Result};
use crate::domain::market::{EnrichedBar, PriceBar};
use crate::domain::ml::{
    EnsembleWeights, FeatureColumn, RegressionMetrics, ScalingState, WindowedDataset,
};
use crate::domain::ports::MarketDataProvider;
use crate::domain::validation::BarSanitizer;
use chrono::NaiveDate;
use ndarray::{Array1, Array3};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Fetches bars for `symbol` and validates them.
pub fn fetch_bars(
    provider: &dyn MarketDataProvider,
    symbol: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<PriceBar>> {
    if start > end {
        return Err(ForecastError::invalid_config(format!(
            "start date {} is after end date {}",
            start, end
        )));
    }
    let bars = provider.fetch_daily_bars(symbol, start, end)?;
    if bars.is_empty() {
        return Err(ForecastError::DataUnavailable {
            symbol: symbol.to_string(),
            reason: format!("{} returned no bars for {}..{}", provider.name(), start, end),
        });
    }
    info!(
        "Fetched {} bars for {} from {}",
        bars.len(),
        symbol,
        provider.name()
    );
    BarSanitizer::sanitize(&bars)
}

fn enrich(engine: &IndicatorEngine, raw_bars: &[PriceBar]) -> Result<Vec<EnrichedBar>> {
    let bars = BarSanitizer::sanitize(raw_bars)?;
    engine.compute(&bars)
}

/// Raw bars to scaled windows plus the scaling state fitted on them.
pub fn prepare(
    raw_bars: &[PriceBar],
    sequence_length: usize,
) -> Result<(WindowedDataset, ScalingState)> {
    let rows = enrich(&IndicatorEngine::new(), raw_bars)?;
    WindowBuilder::new(sequence_length)?.fit_transform(&rows)
}

/// Outcome of a chronological train/test run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldoutReport {
    pub train_windows: usize,
    pub test_windows: usize,
    pub weights: EnsembleWeights,
    pub target_dates: Vec<NaiveDate>,
    pub actual: Vec<f64>,
    pub sequence_predictions: Vec<f64>,
    pub tree_predictions: Vec<f64>,
    pub ensemble_predictions: Vec<f64>,
    pub sequence_metrics: RegressionMetrics,
    pub tree_metrics: RegressionMetrics,
    pub ensemble_metrics: RegressionMetrics,
}

/// Next-close forecast from the latest window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NextPrediction {
    /// Date of the last bar in the input window.
    pub as_of: NaiveDate,
    pub sequence: f64,
    pub tree: f64,
    pub ensemble: f64,
}

pub struct ForecastPipeline<S = SequenceModel, T = TreeModel> {
    config: ForecastConfig,
    engine: IndicatorEngine,
    builder: WindowBuilder,
    scaling: Option<ScalingState>,
    forecaster: EnsembleForecaster<S, T>,
}

impl ForecastPipeline<SequenceModel, TreeModel> {
    pub fn new(config: ForecastConfig) -> Result<Self> {
        let sequence = SequenceModel::new(config.sequence.clone());
        let tree = TreeModel::new(config.tree.clone());
        Self::with_models(config, sequence, tree)
    }
}

impl<S: Regressor, T: Regressor> ForecastPipeline<S, T> {
    /// Pipeline around caller-supplied regressors.
    pub fn with_models(config: ForecastConfig, sequence: S, tree: T) -> Result<Self> {
        config.validate()?;
        let builder = WindowBuilder::new(config.pipeline.sequence_length)?;
        let forecaster = EnsembleForecaster::new(sequence, tree, config.weights()?)
            .with_parallel_training(config.pipeline.parallel_training);
        Ok(Self {
            config,
            engine: IndicatorEngine::new(),
            builder,
            scaling: None,
            forecaster,
        })
    }

    /// Reassembles a pipeline from previously trained parts.
    pub fn from_parts(
        config: ForecastConfig,
        schema: Vec<FeatureColumn>,
        scaling: ScalingState,
        models: ModelPair<S, T>,
    ) -> Result<Self> {
        config.validate()?;
        if scaling.n_features() != schema.len() {
            return Err(ForecastError::ShapeMismatch {
                context: "restored scaling state".to_string(),
                expected: schema.len(),
                actual: scaling.n_features(),
            });
        }
        let builder = WindowBuilder::with_schema(config.pipeline.sequence_length, schema)?;
        let forecaster = EnsembleForecaster::from_models(models, config.weights()?)
            .with_parallel_training(config.pipeline.parallel_training);
        Ok(Self {
            config,
            engine: IndicatorEngine::new(),
            builder,
            scaling: Some(scaling),
            forecaster,
        })
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    pub fn schema(&self) -> &[FeatureColumn] {
        self.builder.schema()
    }

    pub fn scaling_state(&self) -> Option<&ScalingState> {
        self.scaling.as_ref()
    }

    pub fn forecaster(&self) -> &EnsembleForecaster<S, T> {
        &self.forecaster
    }

    /// Replaces the blend weights. The config is updated too, so a saved
    /// pipeline reloads with the same weights.
    pub fn set_weights(&mut self, weights: EnsembleWeights) {
        self.config.pipeline.sequence_weight = weights.sequence();
        self.config.pipeline.tree_weight = weights.tree();
        self.forecaster.set_weights(weights);
    }

    /// Sanitizes, enriches and windows `raw_bars`, fitting the scaler on
    /// them. The fitted state is kept for later prediction.
    pub fn prepare(&mut self, raw_bars: &[PriceBar]) -> Result<WindowedDataset> {
        let rows = enrich(&self.engine, raw_bars)?;
        let (dataset, scaling) = self.builder.fit_transform(&rows)?;
        info!(
            "Prepared {} windows of length {} from {} bars",
            dataset.len(),
            dataset.sequence_length(),
            raw_bars.len()
        );
        self.scaling = Some(scaling);
        Ok(dataset)
    }

    pub fn train_models(&mut self, train: &WindowedDataset) -> Result<()> {
        self.forecaster.train_models(train.x(), train.y())
    }

    pub fn predict(&self, x: &Array3<f64>, weights: EnsembleWeights) -> Result<Array1<f64>> {
        self.forecaster.predict(x, weights)
    }

    pub fn evaluate(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<RegressionMetrics> {
        EnsembleForecaster::<S, T>::evaluate(y_true, y_pred)
    }

    /// Walk-forward validation using the configured splits, gap and
    /// training-window cap.
    pub fn cross_validate(&self, dataset: &WindowedDataset) -> Result<CrossValidationReport> {
        let p = &self.config.pipeline;
        let splitter = TimeSeriesSplit::new(p.cv_splits)
            .with_gap(p.cv_gap)
            .with_max_train_size(p.cv_max_train_size);
        self.forecaster
            .cross_validate(dataset.x(), dataset.y(), &splitter)
    }

    /// Prepares `raw_bars`, trains on the leading `train_fraction` of the
    /// windows and scores every model on the rest.
    pub fn run_holdout(&mut self, raw_bars: &[PriceBar]) -> Result<HoldoutReport> {
        let dataset = self.prepare(raw_bars)?;
        let (train, test) = dataset.train_test_split(self.config.pipeline.train_fraction)?;
        info!(
            "Holdout: {} training windows, {} test windows",
            train.len(),
            test.len()
        );

        self.train_models(&train)?;
        let weights = self.forecaster.weights();
        let components = self.forecaster.predict_components(test.x())?;
        let ensemble = components.blend(weights);

        let sequence_metrics = Self::evaluate(test.y(), &components.sequence)?;
        let tree_metrics = Self::evaluate(test.y(), &components.tree)?;
        let ensemble_metrics = Self::evaluate(test.y(), &ensemble)?;
        info!(
            "Holdout RMSE: sequence {:.4}, tree {:.4}, ensemble {:.4}",
            sequence_metrics.rmse, tree_metrics.rmse, ensemble_metrics.rmse
        );
        if ensemble_metrics.rmse > sequence_metrics.rmse.min(tree_metrics.rmse) {
            warn!("Ensemble underperforms its best component on the holdout set");
        }

        Ok(HoldoutReport {
            train_windows: train.len(),
            test_windows: test.len(),
            weights,
            target_dates: test.target_dates().to_vec(),
            actual: test.y().to_vec(),
            sequence_predictions: components.sequence.to_vec(),
            tree_predictions: components.tree.to_vec(),
            ensemble_predictions: ensemble.to_vec(),
            sequence_metrics,
            tree_metrics,
            ensemble_metrics,
        })
    }

    /// Forecasts the close after the last bar of `raw_bars`, using the
    /// scaling state fitted during `prepare`.
    pub fn predict_next(&self, raw_bars: &[PriceBar]) -> Result<NextPrediction> {
        let scaling = self.require_scaling()?;
        let rows = enrich(&self.engine, raw_bars)?;
        let (window, as_of) = self.builder.latest_window(&rows, scaling)?;

        let components = self.forecaster.predict_components(&window)?;
        let weights = self.forecaster.weights();
        let (Some(&sequence), Some(&tree)) = (components.sequence.get(0), components.tree.get(0))
        else {
            return Err(ForecastError::ShapeMismatch {
                context: "next-close prediction".to_string(),
                expected: 1,
                actual: 0,
            });
        };
        Ok(NextPrediction {
            as_of,
            sequence,
            tree,
            ensemble: weights.combine(sequence, tree),
        })
    }

    fn require_scaling(&self) -> Result<&ScalingState> {
        self.scaling
            .as_ref()
            .ok_or_else(|| ForecastError::not_trained("scaling state (call prepare first)"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mock::SyntheticMarketData;

    /// Constant prediction per window, or no predictions at all.
    struct Fixed {
        value: f64,
        empty: bool,
    }

    impl Regressor for Fixed {
        fn fit(&mut self, _x: &Array3<f64>, _y: &Array1<f64>) -> Result<()> {
            Ok(())
        }

        fn predict(&self, x: &Array3<f64>) -> Result<Array1<f64>> {
            let n = if self.empty { 0 } else { x.dim().0 };
            Ok(Array1::from_elem(n, self.value))
        }

        fn reset(&mut self) {}

        fn is_trained(&self) -> bool {
            true
        }

        fn fresh(&self) -> Self {
            Self {
                value: self.value,
                empty: self.empty,
            }
        }

        fn name(&self) -> &str {
            "Fixed"
        }
    }

    fn fixed_pipeline(empty: bool) -> ForecastPipeline<Fixed, Fixed> {
        let mut config = ForecastConfig::default();
        config.pipeline.sequence_length = 5;
        ForecastPipeline::with_models(
            config,
            Fixed { value: 10.0, empty },
            Fixed { value: 20.0, empty },
        )
        .unwrap()
    }

    fn bars(count: usize) -> Vec<PriceBar> {
        SyntheticMarketData::new(2).generate(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), count)
    }

    #[test]
    fn test_prepare_requires_enough_bars() {
        let bars = SyntheticMarketData::new(1).generate(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), 25);
        // 25 bars leave 6 rows after indicator warm-up, fewer than 10 + 1.
        assert!(matches!(
            prepare(&bars, 10),
            Err(ForecastError::InsufficientData { .. })
        ));
        assert_eq!(prepare(&bars, 5).unwrap().0.len(), 1);
    }

    #[test]
    fn test_predict_next_without_prepare_fails() {
        let pipeline = ForecastPipeline::new(ForecastConfig::default()).unwrap();
        let bars = SyntheticMarketData::new(1).generate(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), 60);
        assert!(matches!(
            pipeline.predict_next(&bars),
            Err(ForecastError::ModelNotTrained { .. })
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = ForecastConfig::default();
        config.pipeline.sequence_length = 0;
        assert!(ForecastPipeline::new(config).is_err());
    }

    #[test]
    fn test_predict_next_with_empty_component_output_fails() {
        let bars = bars(60);
        let mut pipeline = fixed_pipeline(true);
        pipeline.prepare(&bars).unwrap();
        assert!(matches!(
            pipeline.predict_next(&bars),
            Err(ForecastError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_set_weights_applies_to_predictions_and_config() {
        let bars = bars(60);
        let mut pipeline = fixed_pipeline(false);
        pipeline.prepare(&bars).unwrap();
        assert!((pipeline.predict_next(&bars).unwrap().ensemble - 14.0).abs() < 1e-12);

        pipeline.set_weights(EnsembleWeights::from_sequence_share(0.25).unwrap());
        let next = pipeline.predict_next(&bars).unwrap();
        assert!((next.ensemble - 17.5).abs() < 1e-12);
        assert_eq!(pipeline.config().pipeline.sequence_weight, 0.25);
        assert_eq!(pipeline.config().pipeline.tree_weight, 0.75);
    }
}
