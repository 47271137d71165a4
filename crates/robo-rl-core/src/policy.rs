//! Epsilon-greedy action selection

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{ActionValueFunction, RLError, Result};

/// Epsilon-greedy policy with multiplicative decay toward a floor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpsilonGreedy {
    /// Current exploration rate
    epsilon: f64,
    /// Lowest value decay can reach
    min_epsilon: f64,
    /// Factor applied per decay step
    decay: f64,
}

impl EpsilonGreedy {
    /// Create a new epsilon-greedy policy
    pub fn new(start: f64, min_epsilon: f64, decay: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&min_epsilon) || !(min_epsilon..=1.0).contains(&start) {
            return Err(RLError::config(format!(
                "epsilon range invalid: start {start}, min {min_epsilon}"
            )));
        }
        if !(0.0..=1.0).contains(&decay) {
            return Err(RLError::config(format!("epsilon decay {decay} outside [0, 1]")));
        }
        Ok(Self {
            epsilon: start,
            min_epsilon,
            decay,
        })
    }

    /// Current exploration rate
    #[must_use]
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Set the exploration rate
    pub fn set_epsilon(&mut self, epsilon: f64) {
        self.epsilon = epsilon.clamp(0.0, 1.0);
    }

    /// Apply one multiplicative decay step, never going below the floor
    pub fn decay(&mut self) -> f64 {
        if self.epsilon > self.min_epsilon {
            self.epsilon = (self.epsilon * self.decay).max(self.min_epsilon);
        }
        self.epsilon
    }

    /// Choose an action: random with probability epsilon, greedy otherwise
    pub fn act<Q, R>(&self, q: &Q, features: &[f32], rng: &mut R) -> Result<usize>
    where
        Q: ActionValueFunction + ?Sized,
        R: Rng + ?Sized,
    {
        if rng.gen::<f64>() < self.epsilon {
            Ok(rng.gen_range(0..q.num_actions()))
        } else {
            q.best_action_value(features).map(|(action, _)| action)
        }
    }
}
