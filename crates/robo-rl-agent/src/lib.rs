//! DQN learning engine for the combat robot trainer
//!
//! This crate provides:
//! - A fixed-capacity experience replay buffer
//! - A small multi-layer Q-network with hand-written backprop
//! - Adam with global gradient-norm clipping
//! - Atomic JSON checkpoints of the online network
//! - The DQN learner tying these together

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod buffer;
pub mod checkpoint;
pub mod dqn;
pub mod network;
pub mod optimizer;

// Re-export the learner
pub use dqn::{bellman_targets, DqnAgent, DqnConfig, RestoreOutcome, TrainStats};

// Re-export building blocks
pub use buffer::ReplayBuffer;
pub use checkpoint::{CheckpointBlob, CheckpointStore, CHECKPOINT_VERSION};
pub use network::{Activation, NetworkParams, QNetwork};
pub use optimizer::{clip_grad_norm, Adam};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{DqnAgent, DqnConfig, ReplayBuffer, RestoreOutcome, TrainStats};
    pub use robo_rl_core::prelude::*;
}
