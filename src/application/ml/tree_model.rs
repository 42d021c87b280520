//! Gradient-boosted regression trees on flattened windows.
//!
//! Squared-error boosting: every round fits a smartcore regression tree to
//! the current residuals on a row subsample and a column subsample, then
//! adds its shrunken output to the running prediction.

use super::predictor::Regressor;
use crate::config::TreeModelConfig;
use crate::domain::errors::{ForecastError, Result};
use crate::domain::ml::dataset::flatten_windows;
use ndarray::{Array1, Array2, Array3};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_regressor::{
    DecisionTreeRegressor, DecisionTreeRegressorParameters,
};
use std::fmt;
use tracing::{debug, info};

const MODEL_NAME: &str = "TreeModel";

type RegressionTree = DecisionTreeRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

#[derive(Serialize, Deserialize)]
struct BoostedTree {
    /// Feature columns this tree was grown on, ascending.
    columns: Vec<usize>,
    tree: RegressionTree,
}

/// Outcome of one boosting run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostingReport {
    pub trees_built: usize,
    pub trees_kept: usize,
    /// Round (0-based) with the lowest eval RMSE, when an eval set was given.
    pub best_iteration: Option<usize>,
    pub best_score: Option<f64>,
    pub eval_rmse: Vec<f64>,
}

#[derive(Serialize, Deserialize)]
pub struct TreeModel {
    config: TreeModelConfig,
    base_score: f64,
    n_features: Option<usize>,
    trees: Vec<BoostedTree>,
    report: Option<BoostingReport>,
}

impl fmt::Debug for TreeModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeModel")
            .field("config", &self.config)
            .field("base_score", &self.base_score)
            .field("n_features", &self.n_features)
            .field("trees", &self.trees.len())
            .finish()
    }
}

/// Dense smartcore matrix of the selected rows and columns.
fn to_dense(x: &Array2<f64>, rows: &[usize], columns: &[usize]) -> Result<DenseMatrix<f64>> {
    let data: Vec<Vec<f64>> = rows
        .iter()
        .map(|&r| columns.iter().map(|&c| x[[r, c]]).collect())
        .collect();
    DenseMatrix::from_2d_vec(&data).map_err(|e| ForecastError::backend(MODEL_NAME, e))
}

fn rmse(y: &Array1<f64>, pred: &Array1<f64>) -> f64 {
    let n = y.len().max(1) as f64;
    ((y - pred).mapv(|d| d * d).sum() / n).sqrt()
}

/// Sorted random subset of `0..n` of size `round(n * fraction)`, at least one.
fn subsample(rng: &mut StdRng, n: usize, fraction: f64) -> Vec<usize> {
    let amount = ((n as f64 * fraction).round() as usize).clamp(1, n);
    if amount == n {
        return (0..n).collect();
    }
    let mut picked = sample(rng, n, amount).into_vec();
    picked.sort_unstable();
    picked
}

impl TreeModel {
    pub fn new(config: TreeModelConfig) -> Self {
        Self {
            config,
            base_score: 0.0,
            n_features: None,
            trees: Vec::new(),
            report: None,
        }
    }

    pub fn config(&self) -> &TreeModelConfig {
        &self.config
    }

    pub fn report(&self) -> Option<&BoostingReport> {
        self.report.as_ref()
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    /// Boosts on a flat (samples, features) matrix.
    ///
    /// With an eval set, RMSE on it is tracked every round; when
    /// `early_stopping_rounds` rounds pass without improvement training stops
    /// and the ensemble is cut back to the best round.
    pub fn train(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        eval_set: Option<(&Array2<f64>, &Array1<f64>)>,
        early_stopping_rounds: Option<usize>,
    ) -> Result<BoostingReport> {
        let (n, d) = x.dim();
        if n != y.len() {
            return Err(ForecastError::ShapeMismatch {
                context: "tree model targets".to_string(),
                expected: n,
                actual: y.len(),
            });
        }
        if n == 0 || d == 0 {
            return Err(ForecastError::insufficient("tree model training", 1, n));
        }
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(ForecastError::InvalidData {
                reason: "non-finite value in tree model input".to_string(),
            });
        }
        if let Some((ex, ey)) = eval_set {
            if ex.ncols() != d || ex.nrows() != ey.len() {
                return Err(ForecastError::ShapeMismatch {
                    context: "tree model eval set".to_string(),
                    expected: d,
                    actual: ex.ncols(),
                });
            }
        }

        self.reset();
        let cfg = &self.config;
        let params = DecisionTreeRegressorParameters::default()
            .with_max_depth(cfg.max_depth)
            .with_min_samples_leaf(cfg.min_child_weight.max(1))
            .with_min_samples_split(2);

        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let base_score = y.mean().unwrap_or(0.0);
        let all_rows: Vec<usize> = (0..n).collect();

        let mut train_pred = Array1::from_elem(n, base_score);
        let mut eval_pred = eval_set.map(|(_, ey)| Array1::from_elem(ey.len(), base_score));
        let eval_rows: Vec<usize> = eval_set.map(|(ex, _)| (0..ex.nrows()).collect()).unwrap_or_default();

        let mut trees = Vec::new();
        let mut eval_rmse = Vec::new();
        let mut best: Option<(usize, f64)> = None;

        for round in 0..cfg.n_estimators {
            let residual = y - &train_pred;
            let rows = subsample(&mut rng, n, cfg.subsample);
            let columns = subsample(&mut rng, d, cfg.colsample_bytree);

            let fit_x = to_dense(x, &rows, &columns)?;
            let fit_y: Vec<f64> = rows.iter().map(|&r| residual[r]).collect();
            let tree = RegressionTree::fit(&fit_x, &fit_y, params.clone())
                .map_err(|e| ForecastError::backend(MODEL_NAME, e))?;

            let step = tree
                .predict(&to_dense(x, &all_rows, &columns)?)
                .map_err(|e| ForecastError::backend(MODEL_NAME, e))?;
            train_pred.scaled_add(cfg.learning_rate, &Array1::from(step));

            let mut stop = false;
            if let (Some((ex, ey)), Some(pred)) = (eval_set, eval_pred.as_mut()) {
                let step = tree
                    .predict(&to_dense(ex, &eval_rows, &columns)?)
                    .map_err(|e| ForecastError::backend(MODEL_NAME, e))?;
                pred.scaled_add(cfg.learning_rate, &Array1::from(step));

                let score = rmse(ey, pred);
                eval_rmse.push(score);
                match best {
                    Some((_, best_score)) if score >= best_score => {
                        if let (Some(patience), Some((best_round, _))) = (early_stopping_rounds, best) {
                            if round - best_round >= patience {
                                info!(
                                    "TreeModel: early stopping at round {}, best round {} (rmse {:.6})",
                                    round, best_round, best_score
                                );
                                stop = true;
                            }
                        }
                    }
                    _ => best = Some((round, score)),
                }
                debug!("TreeModel round {}: eval rmse {:.6}", round, score);
            }

            trees.push(BoostedTree { columns, tree });
            if stop {
                break;
            }
        }

        let trees_built = trees.len();
        if let (Some(_), Some((best_round, _))) = (early_stopping_rounds, best) {
            trees.truncate(best_round + 1);
        }

        let report = BoostingReport {
            trees_built,
            trees_kept: trees.len(),
            best_iteration: best.map(|(round, _)| round),
            best_score: best.map(|(_, score)| score),
            eval_rmse,
        };
        info!(
            "TreeModel: built {} trees, kept {}, base score {:.4}",
            report.trees_built, report.trees_kept, base_score
        );

        self.base_score = base_score;
        self.n_features = Some(d);
        self.trees = trees;
        self.report = Some(report.clone());
        Ok(report)
    }

    /// Predicts from a flat (samples, features) matrix.
    pub fn predict_flat(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let n_features = self
            .n_features
            .ok_or_else(|| ForecastError::not_trained(MODEL_NAME))?;
        if x.ncols() != n_features {
            return Err(ForecastError::ShapeMismatch {
                context: "tree model features".to_string(),
                expected: n_features,
                actual: x.ncols(),
            });
        }

        let rows: Vec<usize> = (0..x.nrows()).collect();
        let mut pred = Array1::from_elem(x.nrows(), self.base_score);
        if rows.is_empty() {
            return Ok(pred);
        }
        for boosted in &self.trees {
            let step = boosted
                .tree
                .predict(&to_dense(x, &rows, &boosted.columns)?)
                .map_err(|e| ForecastError::backend(MODEL_NAME, e))?;
            pred.scaled_add(self.config.learning_rate, &Array1::from(step));
        }
        Ok(pred)
    }
}

impl Regressor for TreeModel {
    /// Flattens each window into one row and boosts with the training
    /// partition itself as the early-stopping eval set.
    fn fit(&mut self, x: &Array3<f64>, y: &Array1<f64>) -> Result<()> {
        let flat = flatten_windows(x)?;
        let patience = self.config.early_stopping_rounds;
        self.train(&flat, y, Some((&flat, y)), patience).map(|_| ())
    }

    fn predict(&self, x: &Array3<f64>) -> Result<Array1<f64>> {
        self.predict_flat(&flatten_windows(x)?)
    }

    fn reset(&mut self) {
        self.base_score = 0.0;
        self.n_features = None;
        self.trees.clear();
        self.report = None;
    }

    fn is_trained(&self) -> bool {
        self.n_features.is_some()
    }

    fn fresh(&self) -> Self {
        Self::new(self.config.clone())
    }

    fn name(&self) -> &str {
        MODEL_NAME
    }
}
