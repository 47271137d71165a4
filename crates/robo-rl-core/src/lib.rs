//! Core reinforcement learning types for the combat robot trainer
//!
//! This crate holds the domain vocabulary shared by the learner and the
//! environment: actions and the action table, telemetry snapshots, rewards,
//! transitions, the value-function seam, and the epsilon-greedy policy.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod action;
pub mod agent;
pub mod error;
pub mod geometry;
pub mod metrics;
pub mod observation;
pub mod policy;
pub mod reward;
pub mod trajectory;
pub mod value;

// Re-export core traits and types
pub use action::{ActionSpec, ActionTable, EngineCommand};
pub use agent::AgentConfig;
pub use error::{RLError, Result};
pub use metrics::{MetricsFacadeSink, MetricsSink, NullSink, TracingSink};
pub use observation::{EnemySnapshot, GameEvent, Observation, RobotState, MISSING_BEARING};
pub use policy::EpsilonGreedy;
pub use reward::{Reward, RewardBreakdown, RewardFunction};
pub use trajectory::{FeatureVector, Transition};
pub use value::{argmax, ActionValueFunction};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        ActionTable, ActionValueFunction, AgentConfig, EpsilonGreedy, FeatureVector,
        Observation, Result, Reward, RewardBreakdown, Transition,
    };
}
