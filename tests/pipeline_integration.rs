use chrono::{Duration, NaiveDate};
use ndarray::{Array1, Array3, s};
use rustforecast::application::ml::Regressor;
use rustforecast::application::pipeline::{ForecastPipeline, prepare};
use rustforecast::config::{ForecastConfig, SequenceProfile};
use rustforecast::domain::errors::{ForecastError, Result};
use rustforecast::domain::market::PriceBar;
use rustforecast::domain::ml::EnsembleWeights;
use rustforecast::infrastructure::SyntheticMarketData;

// --- Helpers ---

fn ramp(n: usize) -> Vec<PriceBar> {
    let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    (0..n)
        .map(|i| {
            let close = 100.0 + i as f64;
            PriceBar::new(
                start + Duration::days(i as i64),
                close - 0.5,
                close + 1.0,
                close - 1.0,
                close,
                10_000.0 + 10.0 * i as f64,
            )
        })
        .collect()
}

fn small_config() -> ForecastConfig {
    let mut config = ForecastConfig::default();
    config.sequence.profile = SequenceProfile::Compact;
    config.sequence.epochs = 3;
    config.sequence.batch_size = 16;
    config.tree.n_estimators = 30;
    config.tree.learning_rate = 0.1;
    config.pipeline.cv_splits = 3;
    config
}

/// Echoes the scaled close of the last step, shifted by a constant.
struct LastClose {
    shift: f64,
    trained: bool,
}

impl LastClose {
    fn new(shift: f64) -> Self {
        Self {
            shift,
            trained: false,
        }
    }
}

impl Regressor for LastClose {
    fn fit(&mut self, _x: &Array3<f64>, _y: &Array1<f64>) -> Result<()> {
        self.trained = true;
        Ok(())
    }

    fn predict(&self, x: &Array3<f64>) -> Result<Array1<f64>> {
        if !self.trained {
            return Err(ForecastError::not_trained("LastClose"));
        }
        let last = x.dim().1 - 1;
        Ok(x.slice(s![.., last, 3]).mapv(|v| v + self.shift))
    }

    fn reset(&mut self) {
        self.trained = false;
    }

    fn is_trained(&self) -> bool {
        self.trained
    }

    fn fresh(&self) -> Self {
        Self::new(self.shift)
    }

    fn name(&self) -> &str {
        "LastClose"
    }
}

// --- Tests ---

#[test]
fn test_ramp_windows_and_targets() {
    // 19 warm-up bars leave 30 complete rows.
    let bars = ramp(49);
    let (dataset, scaling) = prepare(&bars, 10).unwrap();

    assert_eq!(dataset.len(), 20);
    assert_eq!(dataset.x().dim(), (20, 10, 12));
    assert_eq!(scaling.n_features(), 12);
    for i in 0..20 {
        assert_eq!(dataset.y()[i], bars[19 + 10 + i].close);
        assert_eq!(dataset.target_dates()[i], bars[19 + 10 + i].date);
    }
    assert!(dataset.x().iter().all(|v| (0.0..=1.0).contains(v)));
}

#[test]
fn test_shuffled_input_is_sorted_before_indicators() {
    let mut bars = ramp(49);
    bars.reverse();
    let (dataset, _) = prepare(&bars, 10).unwrap();
    assert_eq!(dataset.y()[0], 129.0);
}

#[test]
fn test_stub_models_cross_validation() {
    let config = small_config();
    let mut pipeline =
        ForecastPipeline::with_models(config, LastClose::new(0.0), LastClose::new(1.0)).unwrap();
    let dataset = pipeline.prepare(&ramp(80)).unwrap();

    let report = pipeline.cross_validate(&dataset).unwrap();

    assert_eq!(report.folds.len(), 3);
    for pair in report.folds.windows(2) {
        assert!(pair[0].validation.end <= pair[1].validation.start);
    }
    for fold in &report.folds {
        assert!(fold.train.end <= fold.validation.start);
        assert!(fold.metrics.rmse.is_finite());
    }
    // Folds train fresh models; the pipeline's own pair stays untrained.
    assert!(!pipeline.forecaster().is_trained());
}

#[test]
fn test_stub_models_weights_select_components() {
    let mut pipeline = ForecastPipeline::with_models(
        small_config(),
        LastClose::new(0.0),
        LastClose::new(1.0),
    )
    .unwrap();
    let dataset = pipeline.prepare(&ramp(60)).unwrap();
    pipeline.train_models(&dataset).unwrap();

    let x = dataset.x();
    let seq = pipeline
        .predict(x, EnsembleWeights::new(1.0, 0.0).unwrap())
        .unwrap();
    let tree = pipeline
        .predict(x, EnsembleWeights::new(0.0, 1.0).unwrap())
        .unwrap();

    for (a, b) in seq.iter().zip(tree.iter()) {
        assert!((b - a - 1.0).abs() < 1e-12);
    }
}

#[test]
fn test_holdout_and_next_day_prediction() {
    let bars = SyntheticMarketData::new(11).generate(NaiveDate::from_ymd_opt(2022, 1, 3).unwrap(), 140);
    let mut pipeline = ForecastPipeline::new(small_config()).unwrap();

    let report = pipeline.run_holdout(&bars).unwrap();

    // 140 bars, 19 warm-up, 10-step windows: 111 windows split 88 / 23.
    assert_eq!(report.train_windows, 88);
    assert_eq!(report.test_windows, 23);
    assert_eq!(report.actual.len(), 23);
    assert_eq!(report.ensemble_predictions.len(), 23);
    assert!(report.ensemble_metrics.rmse.is_finite());
    for i in 0..23 {
        let blended = 0.6 * report.sequence_predictions[i] + 0.4 * report.tree_predictions[i];
        assert!((blended - report.ensemble_predictions[i]).abs() < 1e-9);
    }

    let next = pipeline.predict_next(&bars).unwrap();
    assert_eq!(next.as_of, bars.last().unwrap().date);
    assert!(next.ensemble.is_finite());
    assert!((next.ensemble - (0.6 * next.sequence + 0.4 * next.tree)).abs() < 1e-9);
}

#[test]
fn test_cross_validation_with_lstm_and_trees() {
    let bars = SyntheticMarketData::new(5).generate(NaiveDate::from_ymd_opt(2022, 1, 3).unwrap(), 140);
    let mut config = small_config();
    config.pipeline.cv_splits = 2;
    let mut pipeline = ForecastPipeline::new(config).unwrap();
    let dataset = pipeline.prepare(&bars).unwrap();
    assert_eq!(dataset.len(), 111);

    let report = pipeline.cross_validate(&dataset).unwrap();

    assert_eq!(report.folds.len(), 2);
    assert_eq!(report.folds[0].train, 0..37);
    assert_eq!(report.folds[0].validation, 37..74);
    assert_eq!(report.folds[1].train, 0..74);
    assert_eq!(report.folds[1].validation, 74..111);
    for fold in &report.folds {
        assert!(fold.metrics.rmse.is_finite());
        assert!(fold.metrics.mae.is_finite());
    }
    assert!(report.mean.rmse.is_finite());
    assert!(!pipeline.forecaster().is_trained());
}

#[test]
fn test_too_few_bars_is_insufficient_data() {
    let mut pipeline = ForecastPipeline::new(small_config()).unwrap();
    assert!(matches!(
        pipeline.run_holdout(&ramp(29)),
        Err(ForecastError::InsufficientData { .. })
    ));
}
