use super::optimizer::Adam;
use super::predictor::Regressor;
use super::recurrent::LstmNetwork;
use crate::config::SequenceModelConfig;
use crate::domain::errors::{ForecastError, Result};
use ndarray::{Array1, Array3, Axis};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const MODEL_NAME: &str = "SequenceModel";

/// Per-epoch loss curves. Validation curves are empty when no validation
/// split was used.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub loss: Vec<f64>,
    pub mae: Vec<f64>,
    pub val_loss: Vec<f64>,
    pub val_mae: Vec<f64>,
}

impl TrainingHistory {
    pub fn epochs(&self) -> usize {
        self.loss.len()
    }

    pub fn final_loss(&self) -> Option<f64> {
        self.loss.last().copied()
    }
}

/// Stacked LSTM regressor over windowed features.
///
/// Each call to [`SequenceModel::train`] rebuilds the network from the
/// configured seed, so repeated training never accumulates state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceModel {
    config: SequenceModelConfig,
    network: Option<LstmNetwork>,
    history: Option<TrainingHistory>,
}

impl SequenceModel {
    pub fn new(config: SequenceModelConfig) -> Self {
        Self {
            config,
            network: None,
            history: None,
        }
    }

    pub fn config(&self) -> &SequenceModelConfig {
        &self.config
    }

    pub fn history(&self) -> Option<&TrainingHistory> {
        self.history.as_ref()
    }

    /// Mini-batch training with MSE loss and Adam.
    ///
    /// The trailing `validation_split` fraction of the windows is held out
    /// and scored after every epoch; the remaining windows are shuffled each
    /// epoch.
    pub fn train(
        &mut self,
        x: &Array3<f64>,
        y: &Array1<f64>,
        validation_split: f64,
        epochs: usize,
        batch_size: usize,
    ) -> Result<TrainingHistory> {
        let (n, steps, n_features) = x.dim();
        if n != y.len() {
            return Err(ForecastError::ShapeMismatch {
                context: "sequence model targets".to_string(),
                expected: n,
                actual: y.len(),
            });
        }
        if steps == 0 || n_features == 0 {
            return Err(ForecastError::InvalidData {
                reason: format!("empty window shape ({}, {}, {})", n, steps, n_features),
            });
        }
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(ForecastError::InvalidData {
                reason: "non-finite value in sequence model input".to_string(),
            });
        }
        if !(0.0..1.0).contains(&validation_split) {
            return Err(ForecastError::invalid_config(format!(
                "validation split must be in [0, 1), got {}",
                validation_split
            )));
        }
        if epochs == 0 || batch_size == 0 {
            return Err(ForecastError::invalid_config(
                "epochs and batch size must be positive",
            ));
        }

        let split_at = (n as f64 * (1.0 - validation_split)).floor() as usize;
        if split_at == 0 {
            return Err(ForecastError::insufficient("sequence model training", 1, n));
        }

        let train_x = x.slice(ndarray::s![..split_at, .., ..]).to_owned();
        let train_y = y.slice(ndarray::s![..split_at]).to_owned();
        let validation = (split_at < n).then(|| {
            (
                x.slice(ndarray::s![split_at.., .., ..]).to_owned(),
                y.slice(ndarray::s![split_at..]).to_owned(),
            )
        });

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut network = LstmNetwork::new(
            n_features,
            self.config.profile.hidden_sizes(),
            self.config.dense_units,
            self.config.dropout,
            &mut rng,
        );
        let mut optimizer = Adam::new(self.config.learning_rate);
        let mut history = TrainingHistory::default();
        let mut indices: Vec<usize> = (0..split_at).collect();

        info!(
            "SequenceModel: training on {} windows ({} validation), {} epochs, profile {}",
            split_at,
            n - split_at,
            epochs,
            self.config.profile
        );

        for epoch in 0..epochs {
            indices.shuffle(&mut rng);
            let mut loss_sum = 0.0;
            let mut mae_sum = 0.0;

            for batch in indices.chunks(batch_size) {
                let bx = train_x.select(Axis(0), batch);
                let by = train_y.select(Axis(0), batch);

                let (pred, cache) = network.forward_train(&bx, &mut rng);
                let diff = &pred - &by;
                let m = batch.len() as f64;
                loss_sum += diff.mapv(|d| d * d).sum();
                mae_sum += diff.mapv(f64::abs).sum();

                let d_pred = diff * (2.0 / m);
                let grads = network.backward(&cache, &d_pred);
                optimizer.step(network.params_mut(), &grads.into_vec())?;
            }

            let loss = loss_sum / split_at as f64;
            let mae = mae_sum / split_at as f64;
            if !loss.is_finite() {
                return Err(ForecastError::backend(
                    MODEL_NAME,
                    format!("training diverged at epoch {}", epoch + 1),
                ));
            }
            history.loss.push(loss);
            history.mae.push(mae);

            if let Some((vx, vy)) = &validation {
                let diff = network.predict(vx) - vy;
                let count = vy.len() as f64;
                history.val_loss.push(diff.mapv(|d| d * d).sum() / count);
                history.val_mae.push(diff.mapv(f64::abs).sum() / count);
            }

            debug!(
                "SequenceModel epoch {}/{}: loss={:.6} mae={:.6} val_loss={:?}",
                epoch + 1,
                epochs,
                loss,
                mae,
                history.val_loss.last()
            );
        }

        info!(
            "SequenceModel: finished, final loss {:.6}",
            history.final_loss().unwrap_or(f64::NAN)
        );

        self.network = Some(network);
        self.history = Some(history.clone());
        Ok(history)
    }
}

impl Regressor for SequenceModel {
    fn fit(&mut self, x: &Array3<f64>, y: &Array1<f64>) -> Result<()> {
        let (split, epochs, batch) = (
            self.config.validation_split,
            self.config.epochs,
            self.config.batch_size,
        );
        self.train(x, y, split, epochs, batch).map(|_| ())
    }

    fn predict(&self, x: &Array3<f64>) -> Result<Array1<f64>> {
        let network = self
            .network
            .as_ref()
            .ok_or_else(|| ForecastError::not_trained(MODEL_NAME))?;

        let (n, steps, n_features) = x.dim();
        if n_features != network.n_features() {
            return Err(ForecastError::ShapeMismatch {
                context: "sequence model features".to_string(),
                expected: network.n_features(),
                actual: n_features,
            });
        }
        if steps == 0 {
            return Err(ForecastError::ShapeMismatch {
                context: "sequence model window length".to_string(),
                expected: 1,
                actual: 0,
            });
        }
        if n == 0 {
            return Ok(Array1::zeros(0));
        }
        Ok(network.predict(x))
    }

    fn reset(&mut self) {
        self.network = None;
        self.history = None;
    }

    fn is_trained(&self) -> bool {
        self.network.is_some()
    }

    fn fresh(&self) -> Self {
        Self::new(self.config.clone())
    }

    fn name(&self) -> &str {
        MODEL_NAME
    }
}
