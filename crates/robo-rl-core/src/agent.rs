//! Learner configuration shared by every agent

use serde::{Deserialize, Serialize};

use crate::{RLError, Result};

/// Configuration for agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Learning rate
    pub learning_rate: f64,
    /// Discount factor
    pub gamma: f64,
    /// Batch size for training
    pub batch_size: usize,
    /// Buffer size for experience replay
    pub buffer_size: usize,
    /// Hard target sync every N completed episodes
    pub target_update_freq: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            gamma: 0.9,
            batch_size: 32,
            buffer_size: 1000,
            target_update_freq: 5,
        }
    }
}

impl AgentConfig {
    /// Reject values that would make training undefined
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(RLError::config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(RLError::config(format!("gamma {} outside [0, 1]", self.gamma)));
        }
        if self.batch_size == 0 {
            return Err(RLError::config("batch_size must be at least 1"));
        }
        if self.buffer_size < self.batch_size {
            return Err(RLError::config(format!(
                "buffer_size {} smaller than batch_size {}",
                self.buffer_size, self.batch_size
            )));
        }
        if self.target_update_freq == 0 {
            return Err(RLError::config("target_update_freq must be at least 1"));
        }
        Ok(())
    }
}
