//! Adam optimizer over dense ndarray parameters.
//!
//! ```text
//! m = beta1 * m + (1 - beta1) * g
//! v = beta2 * v + (1 - beta2) * g^2
//! lr_t = lr * sqrt(1 - beta2^t) / (1 - beta1^t)
//! p = p - lr_t * m / (sqrt(v) + epsilon)
//! ```

use crate::domain::errors::{ForecastError, Result};
use ndarray::{ArrayD, ArrayViewMutD, Zip};

pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    /// First moment estimates, one per parameter tensor.
    m: Vec<ArrayD<f64>>,
    /// Second moment estimates, one per parameter tensor.
    v: Vec<ArrayD<f64>>,
    t: i32,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Self::with_params(learning_rate, 0.9, 0.999, 1e-7)
    }

    pub fn with_params(learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            m: Vec::new(),
            v: Vec::new(),
            t: 0,
        }
    }

    pub fn timestep(&self) -> i32 {
        self.t
    }

    /// Applies one update. `params` and `grads` must list the same tensors in
    /// the same order on every call.
    pub fn step(&mut self, params: Vec<ArrayViewMutD<'_, f64>>, grads: &[ArrayD<f64>]) -> Result<()> {
        if params.len() != grads.len() {
            return Err(ForecastError::ShapeMismatch {
                context: "optimizer parameter count".to_string(),
                expected: params.len(),
                actual: grads.len(),
            });
        }
        for (p, g) in params.iter().zip(grads) {
            if p.shape() != g.shape() {
                return Err(ForecastError::ShapeMismatch {
                    context: "optimizer gradient size".to_string(),
                    expected: p.len(),
                    actual: g.len(),
                });
            }
        }

        if self.m.is_empty() {
            self.m = grads.iter().map(|g| ArrayD::zeros(g.raw_dim())).collect();
            self.v = grads.iter().map(|g| ArrayD::zeros(g.raw_dim())).collect();
        }

        self.t += 1;
        let bias_1 = 1.0 - self.beta1.powi(self.t);
        let bias_2 = 1.0 - self.beta2.powi(self.t);
        let lr_t = self.learning_rate * bias_2.sqrt() / bias_1;
        let (beta1, beta2, eps) = (self.beta1, self.beta2, self.epsilon);

        for ((param, grad), (m, v)) in params
            .into_iter()
            .zip(grads)
            .zip(self.m.iter_mut().zip(self.v.iter_mut()))
        {
            Zip::from(param)
                .and(grad)
                .and(m)
                .and(v)
                .for_each(|p, &g, m, v| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                    *p -= lr_t * *m / (v.sqrt() + eps);
                });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, array};

    #[test]
    fn test_first_step_moves_by_learning_rate() {
        let mut adam = Adam::new(0.1);
        let mut w: Array1<f64> = array![1.0, -1.0];
        let grad = array![0.5, -2.0].into_dyn();

        adam.step(vec![w.view_mut().into_dyn()], &[grad]).unwrap();

        // First Adam step is lr * sign(g) up to epsilon.
        assert!((w[0] - 0.9).abs() < 1e-6);
        assert!((w[1] + 0.9).abs() < 1e-6);
        assert_eq!(adam.timestep(), 1);
    }

    #[test]
    fn test_minimizes_quadratic() {
        let mut adam = Adam::new(0.05);
        let mut w: Array1<f64> = array![3.0];

        for _ in 0..500 {
            // d/dw (w - 1)^2
            let grad = w.mapv(|x| 2.0 * (x - 1.0)).into_dyn();
            adam.step(vec![w.view_mut().into_dyn()], &[grad]).unwrap();
        }
        assert!((w[0] - 1.0).abs() < 0.1);
    }

    #[test]
    fn test_mismatched_gradients_rejected() {
        let mut adam = Adam::new(0.1);
        let mut w: Array1<f64> = array![1.0, 2.0];
        let grad = array![1.0].into_dyn();
        assert!(adam.step(vec![w.view_mut().into_dyn()], &[grad]).is_err());
    }
}
