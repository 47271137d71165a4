//! Adam optimizer and gradient clipping

use ndarray::{Array, Dimension, Zip};

use crate::network::NetworkParams;

/// Adam optimizer state
#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    momentum: NetworkParams,
    velocity: NetworkParams,
    t: i32,
}

impl Adam {
    /// Create optimizer state shaped like `params`
    #[must_use]
    pub fn new(learning_rate: f32, params: &NetworkParams) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            momentum: params.zeros_like(),
            velocity: params.zeros_like(),
            t: 0,
        }
    }

    /// Apply one update in place
    pub fn step(&mut self, params: &mut NetworkParams, grads: &NetworkParams) {
        self.t = self.t.saturating_add(1);
        let step_size = self.learning_rate * (1.0 - self.beta2.powi(self.t)).sqrt()
            / (1.0 - self.beta1.powi(self.t));
        let hyper = (self.beta1, self.beta2, self.epsilon, step_size);

        for (((p, m), v), g) in params
            .weights
            .iter_mut()
            .zip(&mut self.momentum.weights)
            .zip(&mut self.velocity.weights)
            .zip(&grads.weights)
        {
            adam_update(p, m, v, g, hyper);
        }
        for (((p, m), v), g) in params
            .biases
            .iter_mut()
            .zip(&mut self.momentum.biases)
            .zip(&mut self.velocity.biases)
            .zip(&grads.biases)
        {
            adam_update(p, m, v, g, hyper);
        }
    }

    /// Forget accumulated moments, e.g. after loading new parameters
    pub fn reset(&mut self) {
        self.momentum = self.momentum.zeros_like();
        self.velocity = self.velocity.zeros_like();
        self.t = 0;
    }

    /// Number of updates applied since creation or the last reset
    #[must_use]
    pub fn steps(&self) -> i32 {
        self.t
    }
}

fn adam_update<D: Dimension>(
    param: &mut Array<f32, D>,
    momentum: &mut Array<f32, D>,
    velocity: &mut Array<f32, D>,
    grad: &Array<f32, D>,
    (beta1, beta2, epsilon, step_size): (f32, f32, f32, f32),
) {
    Zip::from(param)
        .and(momentum)
        .and(velocity)
        .and(grad)
        .for_each(|p, m, v, &g| {
            *m = beta1 * *m + (1.0 - beta1) * g;
            *v = beta2 * *v + (1.0 - beta2) * g * g;
            *p -= step_size * *m / (v.sqrt() + epsilon);
        });
}

/// Rescale `grads` so their global L2 norm is at most `max_norm`
///
/// Returns the norm before clipping.
pub fn clip_grad_norm(grads: &mut NetworkParams, max_norm: f32) -> f32 {
    let norm = grads.l2_norm();
    if norm.is_finite() && norm > max_norm && norm > 0.0 {
        grads.scale(max_norm / norm);
    }
    norm
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{arr1, arr2};

    fn params(w: f32, b: f32) -> NetworkParams {
        NetworkParams {
            weights: vec![arr2(&[[w, w], [w, w]])],
            biases: vec![arr1(&[b, b])],
        }
    }

    #[test]
    fn clipping_caps_global_norm() {
        let mut grads = params(3.0, 4.0);
        let before = clip_grad_norm(&mut grads, 1.0);
        assert_relative_eq!(before, (4.0f32 * 9.0 + 2.0 * 16.0).sqrt(), epsilon = 1e-5);
        assert_relative_eq!(grads.l2_norm(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn small_gradients_are_untouched() {
        let mut grads = params(0.1, 0.1);
        let expected = grads.clone();
        clip_grad_norm(&mut grads, 10.0);
        assert_eq!(grads, expected);
    }

    #[test]
    fn first_step_moves_against_gradient_by_learning_rate() {
        let mut p = params(1.0, 1.0);
        let grads = params(0.5, -2.0);
        let mut adam = Adam::new(0.01, &p);
        adam.step(&mut p, &grads);
        // Bias-corrected first Adam step has magnitude ~lr regardless of gradient scale.
        assert_relative_eq!(p.weights[0][[0, 0]], 0.99, epsilon = 1e-4);
        assert_relative_eq!(p.biases[0][0], 1.01, epsilon = 1e-4);
        assert_eq!(adam.steps(), 1);
        adam.reset();
        assert_eq!(adam.steps(), 0);
    }
}
