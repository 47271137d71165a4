//! Combat robot environment for the DQN trainer
//!
//! This crate provides:
//! - Telemetry encoding into fixed-length feature vectors
//! - Reward shaping with a named per-component breakdown
//! - The per-round episode state machine
//! - A multi-session training service behind the `RoundHandler` boundary
//! - Layered JSON configuration and logging bootstrap

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod encoder;
pub mod episode;
pub mod logging;
pub mod service;
pub mod shaper;

// Re-export the round-facing surface
pub use config::TrainerConfig;
pub use encoder::{EncoderConfig, TelemetryEncoder, FEATURE_DIM};
pub use episode::{EpisodeConfig, EpisodeController, EpisodeSummary, RoundOutcome, RoundPhase};
pub use logging::init_logging;
pub use service::{RoundHandler, SessionId, TrainingService};
pub use shaper::{RewardShaper, ShapingConfig};

// Re-export core types
pub use robo_rl_core::{
    ActionTable, EngineCommand, EnemySnapshot, GameEvent, Observation, RLError, Result,
    RewardBreakdown, RobotState,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        RoundHandler, RoundOutcome, SessionId, TelemetryEncoder, TrainerConfig, TrainingService,
    };
    pub use robo_rl_agent::prelude::*;
}
