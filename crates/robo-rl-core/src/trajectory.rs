//! Transitions stored for experience replay

use serde::{Deserialize, Serialize};

/// Encoded, normalized observation
pub type FeatureVector = Vec<f32>;

/// One (state, action, reward, next state, terminal) learning sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Features of the state the action was chosen in
    pub state: FeatureVector,
    /// Action index taken
    pub action: usize,
    /// Shaped reward credited to the action
    pub reward: f64,
    /// Features of the resulting state
    pub next_state: FeatureVector,
    /// Whether `next_state` is absorbing (round over)
    pub terminal: bool,
}

impl Transition {
    /// Create a transition
    #[must_use]
    pub fn new(
        state: FeatureVector,
        action: usize,
        reward: f64,
        next_state: FeatureVector,
        terminal: bool,
    ) -> Self {
        Self {
            state,
            action,
            reward,
            next_state,
            terminal,
        }
    }

    /// Multiplier on the bootstrapped term: 0 for terminal transitions
    #[must_use]
    pub fn continuation(&self) -> f32 {
        if self.terminal {
            0.0
        } else {
            1.0
        }
    }
}
