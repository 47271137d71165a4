//! Feed-forward Q-network on plain `ndarray`
//!
//! The network maps a feature vector to one raw Q-value per action: hidden
//! layers use a saturating activation, the output layer is linear so values
//! can go negative. Gradients of the DQN loss are computed by hand; the
//! network is small enough that a batch of 32 costs well under a millisecond.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use robo_rl_core::{ActionValueFunction, RLError, Result};

/// Hidden-layer non-linearity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    /// Hyperbolic tangent
    #[default]
    Tanh,
    /// Rectified linear unit
    Relu,
}

impl Activation {
    fn apply(self, z: &mut Array2<f32>) {
        match self {
            Self::Tanh => z.mapv_inplace(f32::tanh),
            Self::Relu => z.mapv_inplace(|v| v.max(0.0)),
        }
    }

    /// Derivative expressed through the activation's output
    fn derivative_from_output(self, a: &Array2<f32>) -> Array2<f32> {
        match self {
            Self::Tanh => a.mapv(|v| 1.0 - v * v),
            Self::Relu => a.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
        }
    }
}

/// Weights and biases of every layer, input side first
///
/// Weight matrices are laid out `(fan_in, fan_out)` so a batch of row vectors
/// multiplies on the left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkParams {
    /// One weight matrix per layer
    pub weights: Vec<Array2<f32>>,
    /// One bias vector per layer
    pub biases: Vec<Array1<f32>>,
}

impl NetworkParams {
    /// Same shapes, all zeros
    #[must_use]
    pub fn zeros_like(&self) -> Self {
        Self {
            weights: self.weights.iter().map(|w| Array2::zeros(w.raw_dim())).collect(),
            biases: self.biases.iter().map(|b| Array1::zeros(b.raw_dim())).collect(),
        }
    }

    /// Layer widths from input to output, e.g. `[17, 32, 32, 28]`
    #[must_use]
    pub fn layer_sizes(&self) -> Vec<usize> {
        let mut sizes = Vec::with_capacity(self.weights.len() + 1);
        if let Some(first) = self.weights.first() {
            sizes.push(first.nrows());
        }
        sizes.extend(self.weights.iter().map(Array2::ncols));
        sizes
    }

    /// Total number of scalars
    #[must_use]
    pub fn num_parameters(&self) -> usize {
        self.weights.iter().map(Array2::len).sum::<usize>()
            + self.biases.iter().map(Array1::len).sum::<usize>()
    }

    /// Euclidean norm over every scalar
    #[must_use]
    pub fn l2_norm(&self) -> f32 {
        let sq: f32 = self.weights.iter().map(|w| w.iter().map(|v| v * v).sum::<f32>()).sum::<f32>()
            + self.biases.iter().map(|b| b.iter().map(|v| v * v).sum::<f32>()).sum::<f32>();
        sq.sqrt()
    }

    /// Multiply every scalar by `factor`
    pub fn scale(&mut self, factor: f32) {
        for w in &mut self.weights {
            w.mapv_inplace(|v| v * factor);
        }
        for b in &mut self.biases {
            b.mapv_inplace(|v| v * factor);
        }
    }

    /// Whether `other` has identical layer shapes
    #[must_use]
    pub fn same_shape(&self, other: &Self) -> bool {
        self.weights.len() == other.weights.len()
            && self.biases.len() == other.biases.len()
            && self.weights.iter().zip(&other.weights).all(|(a, b)| a.dim() == b.dim())
            && self.biases.iter().zip(&other.biases).all(|(a, b)| a.dim() == b.dim())
    }
}

/// Multi-layer perceptron producing one Q-value per action
#[derive(Debug, Clone)]
pub struct QNetwork {
    params: NetworkParams,
    activation: Activation,
}

impl QNetwork {
    /// Create a network with Xavier-uniform weights and zero biases
    pub fn new<R: Rng + ?Sized>(
        input_dim: usize,
        hidden_dims: &[usize],
        output_dim: usize,
        activation: Activation,
        rng: &mut R,
    ) -> Result<Self> {
        if input_dim == 0 || output_dim == 0 || hidden_dims.is_empty() || hidden_dims.contains(&0) {
            return Err(RLError::config(format!(
                "invalid network shape: input {input_dim}, hidden {hidden_dims:?}, output {output_dim}"
            )));
        }

        let mut weights = Vec::with_capacity(hidden_dims.len() + 1);
        let mut biases = Vec::with_capacity(hidden_dims.len() + 1);

        let mut prev_dim = input_dim;
        for &dim in hidden_dims.iter().chain(std::iter::once(&output_dim)) {
            weights.push(Self::xavier_init(prev_dim, dim, rng));
            biases.push(Array1::zeros(dim));
            prev_dim = dim;
        }

        Ok(Self {
            params: NetworkParams { weights, biases },
            activation,
        })
    }

    /// Xavier initialization for weights
    #[allow(clippy::cast_precision_loss)]
    fn xavier_init<R: Rng + ?Sized>(in_dim: usize, out_dim: usize, rng: &mut R) -> Array2<f32> {
        let limit = (6.0 / (in_dim + out_dim) as f32).sqrt();
        Array2::from_shape_fn((in_dim, out_dim), |_| rng.gen_range(-limit..limit))
    }

    /// Hidden-layer activation
    #[must_use]
    pub fn activation(&self) -> Activation {
        self.activation
    }

    /// Current parameters
    #[must_use]
    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    /// Mutable parameters, for the optimizer
    pub fn params_mut(&mut self) -> &mut NetworkParams {
        &mut self.params
    }

    /// Replace every parameter; shapes must match exactly
    pub fn set_params(&mut self, params: NetworkParams) -> Result<()> {
        if !self.params.same_shape(&params) {
            return Err(RLError::DimensionMismatch {
                expected: self.params.num_parameters(),
                actual: params.num_parameters(),
            });
        }
        self.params = params;
        Ok(())
    }

    /// Hard copy of another network's parameters
    pub fn copy_from(&mut self, other: &QNetwork) {
        self.params.clone_from(&other.params);
        self.activation = other.activation;
    }

    /// Batched forward pass: `(batch, input_dim)` in, `(batch, num_actions)` out
    pub fn forward(&self, input: &ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check_batch(input)?;
        let mut layers = self.forward_layers(input);
        layers.pop().ok_or_else(|| RLError::Computation("network has no layers".into()))
    }

    /// Row-wise maximum Q-value, as used for bootstrapped targets
    pub fn max_q(&self, input: &ArrayView2<f32>) -> Result<Array1<f32>> {
        let q = self.forward(input)?;
        Ok(q.map_axis(Axis(1), |row| row.fold(f32::NEG_INFINITY, |a, &b| a.max(b))))
    }

    /// Mean squared error between `Q(states)[actions]` and `targets`, with
    /// the gradient of that loss for every parameter
    pub fn loss_and_gradients(
        &self,
        states: &ArrayView2<f32>,
        actions: &[usize],
        targets: &ArrayView1<f32>,
    ) -> Result<(f32, NetworkParams)> {
        self.check_batch(states)?;
        let batch = states.nrows();
        if actions.len() != batch || targets.len() != batch {
            return Err(RLError::DimensionMismatch {
                expected: batch,
                actual: actions.len().min(targets.len()),
            });
        }
        let num_actions = self.num_actions();
        if let Some(&bad) = actions.iter().find(|&&a| a >= num_actions) {
            return Err(RLError::InvalidAction {
                index: bad,
                count: num_actions,
            });
        }

        let layers = self.forward_layers(states);
        let q = layers.last().ok_or_else(|| RLError::Computation("network has no layers".into()))?;

        #[allow(clippy::cast_precision_loss)]
        let scale = 2.0 / batch as f32;
        let mut loss = 0.0;
        let mut delta = Array2::<f32>::zeros(q.raw_dim());
        for (i, (&action, &target)) in actions.iter().zip(targets.iter()).enumerate() {
            let error = q[[i, action]] - target;
            loss += error * error;
            delta[[i, action]] = scale * error;
        }
        #[allow(clippy::cast_precision_loss)]
        let loss = loss / batch as f32;

        let mut grads = self.params.zeros_like();
        for layer in (0..self.params.weights.len()).rev() {
            let input = if layer == 0 {
                states.view()
            } else {
                layers[layer - 1].view()
            };
            grads.weights[layer] = input.t().dot(&delta);
            grads.biases[layer] = delta.sum_axis(Axis(0));

            if layer > 0 {
                let back = delta.dot(&self.params.weights[layer].t());
                delta = back * self.activation.derivative_from_output(&layers[layer - 1]);
            }
        }

        Ok((loss, grads))
    }

    /// Output of every layer after its activation; the last entry is the
    /// linear Q-value layer
    fn forward_layers(&self, input: &ArrayView2<f32>) -> Vec<Array2<f32>> {
        let last = self.params.weights.len() - 1;
        let mut outputs: Vec<Array2<f32>> = Vec::with_capacity(self.params.weights.len());
        for (i, (w, b)) in self.params.weights.iter().zip(&self.params.biases).enumerate() {
            let mut z = match outputs.last() {
                Some(prev) => prev.dot(w),
                None => input.dot(w),
            };
            z += b;
            if i < last {
                self.activation.apply(&mut z);
            }
            outputs.push(z);
        }
        outputs
    }

    fn check_batch(&self, input: &ArrayView2<f32>) -> Result<()> {
        if input.ncols() == self.input_dim() {
            Ok(())
        } else {
            Err(RLError::DimensionMismatch {
                expected: self.input_dim(),
                actual: input.ncols(),
            })
        }
    }
}

impl ActionValueFunction for QNetwork {
    fn input_dim(&self) -> usize {
        self.params.weights[0].nrows()
    }

    fn num_actions(&self) -> usize {
        self.params.weights[self.params.weights.len() - 1].ncols()
    }

    fn q_values(&self, features: &[f32]) -> Result<Vec<f32>> {
        if features.len() != self.input_dim() {
            return Err(RLError::DimensionMismatch {
                expected: self.input_dim(),
                actual: features.len(),
            });
        }
        let row = ArrayView1::from(features).insert_axis(Axis(0));
        Ok(self.forward(&row)?.into_raw_vec())
    }
}
