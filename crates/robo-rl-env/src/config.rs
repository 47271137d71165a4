//! Trainer configuration
//!
//! Every section has defaults, so a JSON file only needs the values it
//! overrides.

use serde::{Deserialize, Serialize};
use std::path::Path;

use robo_rl_agent::DqnConfig;
use robo_rl_core::{RLError, Result};

use crate::encoder::EncoderConfig;
use crate::episode::EpisodeConfig;
use crate::shaper::ShapingConfig;

/// Complete trainer configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Learner settings
    pub agent: DqnConfig,
    /// Feature normalization
    pub encoder: EncoderConfig,
    /// Reward shaping scales
    pub shaping: ShapingConfig,
    /// Training cadence within rounds
    pub episode: EpisodeConfig,
}

impl TrainerConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| RLError::config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.agent.validate()?;
        self.encoder.validate()?;
        self.shaping.validate()?;
        if self.episode.min_buffer_before_training < self.agent.base.batch_size {
            return Err(RLError::config(format!(
                "min_buffer_before_training ({}) is below batch_size ({})",
                self.episode.min_buffer_before_training, self.agent.base.batch_size
            )));
        }
        Ok(())
    }

    /// Pretty JSON rendering, e.g. to seed a config file
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
