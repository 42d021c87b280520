//! Stacked LSTM regressor built on ndarray.
//!
//! Gate layout follows the usual fused convention: the kernel has shape
//! (input, 4H) and the recurrent kernel (H, 4H) with columns ordered as
//! input, forget, cell candidate and output gates.
//!
//! Network: LSTM(h1, full sequence) -> Dropout -> LSTM(h2, last step)
//! -> Dropout -> Dense(units, relu) -> Dense(1).

use ndarray::{Array, Array1, Array2, Array3, ArrayD, ArrayViewMutD, Axis, Dimension, s};
use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Glorot uniform initialization.
fn glorot_uniform(rows: usize, cols: usize, rng: &mut StdRng) -> Array2<f64> {
    let limit = (6.0 / (rows + cols) as f64).sqrt();
    Array2::from_shape_fn((rows, cols), |_| rng.random_range(-limit..limit))
}

/// Inverted dropout mask: zeros with probability `rate`, else `1 / (1 - rate)`.
fn dropout_mask<D: Dimension>(shape: D, rate: f64, rng: &mut StdRng) -> Array<f64, D> {
    let keep = 1.0 / (1.0 - rate);
    Array::from_shape_fn(shape, |_| {
        if rng.random::<f64>() < rate {
            0.0
        } else {
            keep
        }
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LstmLayer {
    input_size: usize,
    hidden_size: usize,
    kernel: Array2<f64>,
    recurrent_kernel: Array2<f64>,
    bias: Array1<f64>,
}

struct LstmStep {
    x: Array2<f64>,
    h_prev: Array2<f64>,
    c_prev: Array2<f64>,
    i: Array2<f64>,
    f: Array2<f64>,
    g: Array2<f64>,
    o: Array2<f64>,
    tanh_c: Array2<f64>,
}

pub struct LstmCache {
    steps: Vec<LstmStep>,
}

pub struct LstmGradients {
    kernel: Array2<f64>,
    recurrent_kernel: Array2<f64>,
    bias: Array1<f64>,
}

impl LstmLayer {
    pub fn new(input_size: usize, hidden_size: usize, rng: &mut StdRng) -> Self {
        let gates = 4 * hidden_size;
        let mut bias = Array1::zeros(gates);
        // unit forget bias
        bias.slice_mut(s![hidden_size..2 * hidden_size]).fill(1.0);

        Self {
            input_size,
            hidden_size,
            kernel: glorot_uniform(input_size, gates, rng),
            recurrent_kernel: glorot_uniform(hidden_size, gates, rng),
            bias,
        }
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    /// Runs the layer over (batch, steps, input) and returns every hidden
    /// state as (batch, steps, hidden).
    pub fn forward(&self, x: &Array3<f64>) -> (Array3<f64>, LstmCache) {
        let (batch, steps, _) = x.dim();
        let h = self.hidden_size;

        let mut h_t = Array2::<f64>::zeros((batch, h));
        let mut c_t = Array2::<f64>::zeros((batch, h));
        let mut outputs = Array3::<f64>::zeros((batch, steps, h));
        let mut cache = Vec::with_capacity(steps);

        for t in 0..steps {
            let x_t = x.slice(s![.., t, ..]).to_owned();
            let z = x_t.dot(&self.kernel) + h_t.dot(&self.recurrent_kernel) + &self.bias;

            let i = z.slice(s![.., 0..h]).mapv(sigmoid);
            let f = z.slice(s![.., h..2 * h]).mapv(sigmoid);
            let g = z.slice(s![.., 2 * h..3 * h]).mapv(f64::tanh);
            let o = z.slice(s![.., 3 * h..4 * h]).mapv(sigmoid);

            let c_next = &f * &c_t + &i * &g;
            let tanh_c = c_next.mapv(f64::tanh);
            let h_next = &o * &tanh_c;

            outputs.slice_mut(s![.., t, ..]).assign(&h_next);
            cache.push(LstmStep {
                x: x_t,
                h_prev: h_t,
                c_prev: c_t,
                i,
                f,
                g,
                o,
                tanh_c,
            });

            h_t = h_next;
            c_t = c_next;
        }

        (outputs, LstmCache { steps: cache })
    }

    /// Backpropagation through time. `d_out` is the loss gradient for every
    /// hidden state; returns the input gradient and parameter gradients.
    pub fn backward(&self, cache: &LstmCache, d_out: &Array3<f64>) -> (Array3<f64>, LstmGradients) {
        let (batch, steps, _) = d_out.dim();
        let h = self.hidden_size;

        let mut grads = LstmGradients {
            kernel: Array2::zeros(self.kernel.raw_dim()),
            recurrent_kernel: Array2::zeros(self.recurrent_kernel.raw_dim()),
            bias: Array1::zeros(self.bias.raw_dim()),
        };
        let mut dx = Array3::<f64>::zeros((batch, steps, self.input_size));
        let mut dh_next = Array2::<f64>::zeros((batch, h));
        let mut dc_next = Array2::<f64>::zeros((batch, h));

        for t in (0..steps).rev() {
            let step = &cache.steps[t];

            let dh = &d_out.slice(s![.., t, ..]) + &dh_next;
            let d_o = &dh * &step.tanh_c;
            let dc = &dh * &step.o * &step.tanh_c.mapv(|v| 1.0 - v * v) + &dc_next;

            let d_i = &dc * &step.g;
            let d_f = &dc * &step.c_prev;
            let d_g = &dc * &step.i;
            dc_next = &dc * &step.f;

            let mut dz = Array2::<f64>::zeros((batch, 4 * h));
            dz.slice_mut(s![.., 0..h])
                .assign(&(&d_i * &step.i.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![.., h..2 * h])
                .assign(&(&d_f * &step.f.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![.., 2 * h..3 * h])
                .assign(&(&d_g * &step.g.mapv(|v| 1.0 - v * v)));
            dz.slice_mut(s![.., 3 * h..4 * h])
                .assign(&(&d_o * &step.o.mapv(|v| v * (1.0 - v))));

            grads.kernel += &step.x.t().dot(&dz);
            grads.recurrent_kernel += &step.h_prev.t().dot(&dz);
            grads.bias += &dz.sum_axis(Axis(0));

            dx.slice_mut(s![.., t, ..]).assign(&dz.dot(&self.kernel.t()));
            dh_next = dz.dot(&self.recurrent_kernel.t());
        }

        (dx, grads)
    }

    fn params_mut(&mut self) -> [ArrayViewMutD<'_, f64>; 3] {
        [
            self.kernel.view_mut().into_dyn(),
            self.recurrent_kernel.view_mut().into_dyn(),
            self.bias.view_mut().into_dyn(),
        ]
    }
}

impl LstmGradients {
    fn into_dyn(self) -> [ArrayD<f64>; 3] {
        [
            self.kernel.into_dyn(),
            self.recurrent_kernel.into_dyn(),
            self.bias.into_dyn(),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    Relu,
    Linear,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseLayer {
    weights: Array2<f64>,
    bias: Array1<f64>,
    activation: Activation,
}

pub struct DenseCache {
    input: Array2<f64>,
    pre_activation: Array2<f64>,
}

pub struct DenseGradients {
    weights: Array2<f64>,
    bias: Array1<f64>,
}

impl DenseLayer {
    pub fn new(inputs: usize, outputs: usize, activation: Activation, rng: &mut StdRng) -> Self {
        Self {
            weights: glorot_uniform(inputs, outputs, rng),
            bias: Array1::zeros(outputs),
            activation,
        }
    }

    pub fn forward(&self, x: &Array2<f64>) -> (Array2<f64>, DenseCache) {
        let pre_activation = x.dot(&self.weights) + &self.bias;
        let out = match self.activation {
            Activation::Relu => pre_activation.mapv(|v| v.max(0.0)),
            Activation::Linear => pre_activation.clone(),
        };
        (
            out,
            DenseCache {
                input: x.clone(),
                pre_activation,
            },
        )
    }

    pub fn backward(&self, cache: &DenseCache, d_out: &Array2<f64>) -> (Array2<f64>, DenseGradients) {
        let d_pre = match self.activation {
            Activation::Relu => {
                d_out * &cache.pre_activation.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 })
            }
            Activation::Linear => d_out.clone(),
        };
        let grads = DenseGradients {
            weights: cache.input.t().dot(&d_pre),
            bias: d_pre.sum_axis(Axis(0)),
        };
        (d_pre.dot(&self.weights.t()), grads)
    }

    fn params_mut(&mut self) -> [ArrayViewMutD<'_, f64>; 2] {
        [
            self.weights.view_mut().into_dyn(),
            self.bias.view_mut().into_dyn(),
        ]
    }
}

impl DenseGradients {
    fn into_dyn(self) -> [ArrayD<f64>; 2] {
        [self.weights.into_dyn(), self.bias.into_dyn()]
    }
}

/// Two stacked LSTM layers followed by a small dense head.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LstmNetwork {
    lower: LstmLayer,
    upper: LstmLayer,
    hidden: DenseLayer,
    output: DenseLayer,
    dropout: f64,
}

pub struct NetworkCache {
    lower: LstmCache,
    lower_mask: Option<Array3<f64>>,
    upper: LstmCache,
    steps: usize,
    upper_mask: Option<Array2<f64>>,
    hidden: DenseCache,
    output: DenseCache,
}

pub struct NetworkGradients {
    lower: LstmGradients,
    upper: LstmGradients,
    hidden: DenseGradients,
    output: DenseGradients,
}

impl NetworkGradients {
    /// Flattens into the same order as [`LstmNetwork::params_mut`].
    pub fn into_vec(self) -> Vec<ArrayD<f64>> {
        let mut out = Vec::with_capacity(10);
        out.extend(self.lower.into_dyn());
        out.extend(self.upper.into_dyn());
        out.extend(self.hidden.into_dyn());
        out.extend(self.output.into_dyn());
        out
    }
}

impl LstmNetwork {
    pub fn new(
        n_features: usize,
        hidden_sizes: (usize, usize),
        dense_units: usize,
        dropout: f64,
        rng: &mut StdRng,
    ) -> Self {
        let (h1, h2) = hidden_sizes;
        Self {
            lower: LstmLayer::new(n_features, h1, rng),
            upper: LstmLayer::new(h1, h2, rng),
            hidden: DenseLayer::new(h2, dense_units, Activation::Relu, rng),
            output: DenseLayer::new(dense_units, 1, Activation::Linear, rng),
            dropout,
        }
    }

    pub fn n_features(&self) -> usize {
        self.lower.input_size()
    }

    pub fn hidden_sizes(&self) -> (usize, usize) {
        (self.lower.hidden_size(), self.upper.hidden_size())
    }

    /// Inference pass with dropout disabled.
    pub fn predict(&self, x: &Array3<f64>) -> Array1<f64> {
        let (lower_out, _) = self.lower.forward(x);
        let (upper_out, _) = self.upper.forward(&lower_out);
        let last = upper_out.index_axis(Axis(1), x.dim().1 - 1).to_owned();
        let (a, _) = self.hidden.forward(&last);
        let (out, _) = self.output.forward(&a);
        out.column(0).to_owned()
    }

    /// Training pass with dropout active.
    pub fn forward_train(&self, x: &Array3<f64>, rng: &mut StdRng) -> (Array1<f64>, NetworkCache) {
        let steps = x.dim().1;
        let (lower_out, lower) = self.lower.forward(x);

        let lower_mask =
            (self.dropout > 0.0).then(|| dropout_mask(lower_out.raw_dim(), self.dropout, rng));
        let lower_out = match &lower_mask {
            Some(mask) => lower_out * mask,
            None => lower_out,
        };

        let (upper_out, upper) = self.upper.forward(&lower_out);
        let last = upper_out.index_axis(Axis(1), steps - 1).to_owned();

        let upper_mask =
            (self.dropout > 0.0).then(|| dropout_mask(last.raw_dim(), self.dropout, rng));
        let last = match &upper_mask {
            Some(mask) => last * mask,
            None => last,
        };

        let (a, hidden) = self.hidden.forward(&last);
        let (out, output) = self.output.forward(&a);

        (
            out.column(0).to_owned(),
            NetworkCache {
                lower,
                lower_mask,
                upper,
                steps,
                upper_mask,
                hidden,
                output,
            },
        )
    }

    /// Gradients of the loss given `d_pred`, its derivative per prediction.
    pub fn backward(&self, cache: &NetworkCache, d_pred: &Array1<f64>) -> NetworkGradients {
        let batch = d_pred.len();
        let d_out = d_pred.view().insert_axis(Axis(1)).to_owned();

        let (d_a, output) = self.output.backward(&cache.output, &d_out);
        let (d_last, hidden) = self.hidden.backward(&cache.hidden, &d_a);
        let d_last = match &cache.upper_mask {
            Some(mask) => d_last * mask,
            None => d_last,
        };

        let mut d_upper_out = Array3::<f64>::zeros((batch, cache.steps, self.upper.hidden_size()));
        d_upper_out
            .index_axis_mut(Axis(1), cache.steps - 1)
            .assign(&d_last);
        let (d_lower_out, upper) = self.upper.backward(&cache.upper, &d_upper_out);

        let d_lower_out = match &cache.lower_mask {
            Some(mask) => d_lower_out * mask,
            None => d_lower_out,
        };
        let (_, lower) = self.lower.backward(&cache.lower, &d_lower_out);

        NetworkGradients {
            lower,
            upper,
            hidden,
            output,
        }
    }

    pub fn params_mut(&mut self) -> Vec<ArrayViewMutD<'_, f64>> {
        let mut out = Vec::with_capacity(10);
        out.extend(self.lower.params_mut());
        out.extend(self.upper.params_mut());
        out.extend(self.hidden.params_mut());
        out.extend(self.output.params_mut());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn sample_input(batch: usize, steps: usize, features: usize) -> Array3<f64> {
        Array3::from_shape_fn((batch, steps, features), |(b, t, f)| {
            ((b * 7 + t * 3 + f) as f64 * 0.37).sin() * 0.5
        })
    }

    #[test]
    fn test_lstm_forward_shapes() {
        let mut rng = StdRng::seed_from_u64(1);
        let layer = LstmLayer::new(3, 4, &mut rng);
        let (out, cache) = layer.forward(&sample_input(2, 5, 3));
        assert_eq!(out.dim(), (2, 5, 4));
        assert_eq!(cache.steps.len(), 5);
        // Hidden states are bounded by tanh * sigmoid.
        assert!(out.iter().all(|v| v.abs() < 1.0));
    }

    #[test]
    fn test_forget_bias_initialized_to_one() {
        let mut rng = StdRng::seed_from_u64(1);
        let layer = LstmLayer::new(2, 3, &mut rng);
        assert!(layer.bias.slice(s![0..3]).iter().all(|&v| v == 0.0));
        assert!(layer.bias.slice(s![3..6]).iter().all(|&v| v == 1.0));
        assert!(layer.bias.slice(s![6..12]).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_network_predict_shape() {
        let mut rng = StdRng::seed_from_u64(3);
        let net = LstmNetwork::new(4, (6, 5), 3, 0.2, &mut rng);
        let pred = net.predict(&sample_input(7, 4, 4));
        assert_eq!(pred.len(), 7);
        assert!(pred.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut net = LstmNetwork::new(2, (3, 2), 2, 0.0, &mut rng);
        let x = sample_input(3, 4, 2);
        let y = Array1::from(vec![0.3, -0.2, 0.1]);

        let loss = |net: &LstmNetwork| -> f64 {
            let pred = net.predict(&x);
            (&pred - &y).mapv(|d| d * d).sum()
        };

        let (pred, cache) = net.forward_train(&x, &mut rng);
        let d_pred = (&pred - &y) * 2.0;
        let analytic = net.backward(&cache, &d_pred).into_vec();

        // Lower-layer kernel entry (0, 0) and output bias.
        let eps = 1e-6;
        for (param_idx, flat_idx) in [(0usize, 0usize), (9, 0)] {
            let original = {
                let mut params = net.params_mut();
                let p = params[param_idx].as_slice_mut().unwrap();
                let v = p[flat_idx];
                p[flat_idx] = v + eps;
                v
            };
            let plus = loss(&net);
            {
                let mut params = net.params_mut();
                params[param_idx].as_slice_mut().unwrap()[flat_idx] = original - eps;
            }
            let minus = loss(&net);
            {
                let mut params = net.params_mut();
                params[param_idx].as_slice_mut().unwrap()[flat_idx] = original;
            }

            let numeric = (plus - minus) / (2.0 * eps);
            let computed = analytic[param_idx].as_slice().unwrap()[flat_idx];
            assert!(
                (numeric - computed).abs() < 1e-5,
                "param {}: numeric {} vs analytic {}",
                param_idx,
                numeric,
                computed
            );
        }
    }

    #[test]
    fn test_dropout_mask_scaling() {
        let mut rng = StdRng::seed_from_u64(9);
        let mask = dropout_mask(ndarray::Dim([1000]), 0.5, &mut rng);
        assert!(mask.iter().all(|&v| v == 0.0 || v == 2.0));
        let kept = mask.iter().filter(|&&v| v > 0.0).count();
        assert!(kept > 350 && kept < 650);
    }
}
