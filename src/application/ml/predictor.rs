use crate::domain::errors::Result;
use ndarray::{Array1, Array3};

/// Interface for the regressors combined by the ensemble.
///
/// Inputs are windowed feature tensors of shape
/// (windows, sequence_length, features); targets are raw closes.
pub trait Regressor: Send + Sync {
    /// Train from scratch on the given windows.
    fn fit(&mut self, x: &Array3<f64>, y: &Array1<f64>) -> Result<()>;

    /// One prediction per window. Fails with `ModelNotTrained` before `fit`.
    fn predict(&self, x: &Array3<f64>) -> Result<Array1<f64>>;

    /// Drop learned parameters, keeping the configuration.
    fn reset(&mut self);

    fn is_trained(&self) -> bool;

    /// An untrained model with the same configuration.
    fn fresh(&self) -> Self
    where
        Self: Sized;

    /// Get model name/type
    fn name(&self) -> &str;
}
