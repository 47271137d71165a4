//! Deep Q-Network (DQN) learner
//!
//! Owns the online and target networks, the optimizer, the replay buffer and
//! the exploration schedule. The online network is trained against Bellman
//! targets computed from the target network, which only changes on an
//! explicit hard sync.

use ndarray::{Array1, Array2, ArrayView1, Zip};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use robo_rl_core::{
    ActionValueFunction, AgentConfig, EpsilonGreedy, MetricsSink, NullSink, RLError, Result,
    Transition,
};

use crate::buffer::ReplayBuffer;
use crate::checkpoint::CheckpointStore;
use crate::network::{Activation, QNetwork};
use crate::optimizer::{clip_grad_norm, Adam};

/// DQN-specific configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DqnConfig {
    /// Base agent configuration
    #[serde(flatten)]
    pub base: AgentConfig,
    /// Initial exploration rate
    pub epsilon_start: f64,
    /// Exploration floor
    pub epsilon_end: f64,
    /// Multiplicative decay applied after every training step
    pub epsilon_decay: f64,
    /// Hidden layer widths
    pub hidden_dims: Vec<usize>,
    /// Hidden-layer non-linearity
    pub activation: Activation,
    /// Ceiling on the global gradient L2 norm
    pub max_grad_norm: f32,
    /// Where online parameters are persisted; `None` disables checkpoints
    pub checkpoint_path: Option<PathBuf>,
    /// Save a checkpoint every N training steps; 0 disables periodic saves
    pub save_interval: u64,
    /// Seed for initialization, exploration and sampling
    pub seed: Option<u64>,
}

impl Default for DqnConfig {
    fn default() -> Self {
        Self {
            base: AgentConfig::default(),
            epsilon_start: 1.0,
            epsilon_end: 0.01,
            epsilon_decay: 0.995,
            hidden_dims: vec![32, 32],
            activation: Activation::Tanh,
            max_grad_norm: 10.0,
            checkpoint_path: Some(PathBuf::from("dqn_model.json")),
            save_interval: 50,
            seed: None,
        }
    }
}

impl DqnConfig {
    /// Reject values that would make training undefined
    pub fn validate(&self) -> Result<()> {
        self.base.validate()?;
        EpsilonGreedy::new(self.epsilon_start, self.epsilon_end, self.epsilon_decay)?;
        if self.hidden_dims.is_empty() || self.hidden_dims.contains(&0) {
            return Err(RLError::config(format!(
                "hidden_dims must be non-empty and positive, got {:?}",
                self.hidden_dims
            )));
        }
        if !(self.max_grad_norm > 0.0 && self.max_grad_norm.is_finite()) {
            return Err(RLError::config(format!(
                "max_grad_norm must be positive, got {}",
                self.max_grad_norm
            )));
        }
        Ok(())
    }
}

/// What happened when loading the configured checkpoint at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// No checkpoint path is configured
    NoCheckpointConfigured,
    /// No checkpoint exists yet; parameters are freshly initialized
    Fresh,
    /// Online parameters were loaded and the target resynchronized
    Restored {
        /// Checkpoint location
        path: PathBuf,
    },
    /// The checkpoint could not be used; parameters are freshly initialized
    Failed {
        /// Checkpoint location
        path: PathBuf,
        /// Why it was rejected
        reason: String,
    },
}

/// Result of one completed training step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainStats {
    /// Training step counter after this step
    pub step: u64,
    /// Mean squared TD error of the batch
    pub loss: f32,
    /// Gradient norm before clipping
    pub grad_norm: f32,
    /// Exploration rate after decay
    pub epsilon: f64,
}

/// DQN agent with a hard-synced target network
pub struct DqnAgent {
    config: DqnConfig,
    online: QNetwork,
    target: QNetwork,
    optimizer: Adam,
    buffer: ReplayBuffer,
    policy: EpsilonGreedy,
    rng: StdRng,
    training_steps: u64,
    transitions: u64,
    episodes: u64,
    wins: u64,
    checkpoints: Option<CheckpointStore>,
    metrics: Arc<dyn MetricsSink>,
}

impl DqnAgent {
    /// Create a new DQN agent with freshly initialized parameters
    pub fn new(config: DqnConfig, input_dim: usize, num_actions: usize) -> Result<Self> {
        config.validate()?;

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let online = QNetwork::new(
            input_dim,
            &config.hidden_dims,
            num_actions,
            config.activation,
            &mut rng,
        )?;
        // Target starts as an exact copy; it only changes on sync.
        let target = online.clone();

        #[allow(clippy::cast_possible_truncation)]
        let optimizer = Adam::new(config.base.learning_rate as f32, online.params());
        let buffer = ReplayBuffer::new(config.base.buffer_size)?;
        let policy = EpsilonGreedy::new(config.epsilon_start, config.epsilon_end, config.epsilon_decay)?;
        let checkpoints = config.checkpoint_path.clone().map(CheckpointStore::new);

        info!(
            input_dim,
            num_actions,
            hidden = ?config.hidden_dims,
            parameters = online.params().num_parameters(),
            "DQN agent initialized"
        );

        Ok(Self {
            config,
            online,
            target,
            optimizer,
            buffer,
            policy,
            rng,
            training_steps: 0,
            transitions: 0,
            episodes: 0,
            wins: 0,
            checkpoints,
            metrics: Arc::new(NullSink),
        })
    }

    /// Route learner series to `sink`
    #[must_use]
    pub fn with_metrics(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = sink;
        self
    }

    /// Load the configured checkpoint if one exists
    ///
    /// Never fails: an unusable checkpoint is reported and the freshly
    /// initialized parameters stay in place.
    pub fn restore(&mut self) -> RestoreOutcome {
        let Some(store) = self.checkpoints.clone() else {
            return RestoreOutcome::NoCheckpointConfigured;
        };
        let path = store.path().to_path_buf();
        match self.load_from(&store) {
            Ok(true) => RestoreOutcome::Restored { path },
            Ok(false) => {
                info!(path = %path.display(), "no checkpoint found, starting fresh");
                RestoreOutcome::Fresh
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "checkpoint unusable, starting fresh");
                RestoreOutcome::Failed {
                    path,
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Load online parameters from `store` and resync the target network
    ///
    /// Returns `Ok(false)` when the store holds nothing. On error the agent is
    /// left exactly as it was.
    pub fn load_from(&mut self, store: &CheckpointStore) -> Result<bool> {
        let Some(blob) = store.load()? else {
            return Ok(false);
        };
        blob.check_compatible(&self.online)?;
        self.online.set_params(blob.parameters)?;
        self.sync_target_from_online();
        self.optimizer.reset();
        info!(path = %store.path().display(), saved_at = %blob.saved_at, "checkpoint loaded");
        Ok(true)
    }

    /// Persist online parameters to `store`
    pub fn save_to(&self, store: &CheckpointStore) -> Result<()> {
        store.save(&self.online)?;
        info!(path = %store.path().display(), step = self.training_steps, "checkpoint saved");
        Ok(())
    }

    /// Persist online parameters to the configured checkpoint
    pub fn save_checkpoint(&self) -> Result<()> {
        match &self.checkpoints {
            Some(store) => self.save_to(store),
            None => Err(RLError::config("no checkpoint path configured")),
        }
    }

    /// Epsilon-greedy action for `features`
    pub fn select_action(&mut self, features: &[f32]) -> Result<usize> {
        self.check_features(features)?;
        self.policy.act(&self.online, features, &mut self.rng)
    }

    /// Greedy action for `features`, ignoring epsilon
    pub fn greedy_action(&self, features: &[f32]) -> Result<usize> {
        self.online.best_action_value(features).map(|(action, _)| action)
    }

    /// Online Q-values for `features`
    pub fn q_values(&self, features: &[f32]) -> Result<Vec<f32>> {
        self.online.q_values(features)
    }

    /// Store a transition for replay
    pub fn remember(&mut self, transition: Transition) -> Result<()> {
        self.check_features(&transition.state)?;
        self.check_features(&transition.next_state)?;
        let count = self.num_actions();
        if transition.action >= count {
            return Err(RLError::InvalidAction {
                index: transition.action,
                count,
            });
        }
        self.buffer.push(transition);
        self.transitions += 1;
        Ok(())
    }

    /// Run one gradient step on a sampled batch
    ///
    /// Returns `Ok(None)` without touching any state when the buffer holds
    /// fewer than `batch_size` transitions, or when the batch produces a
    /// non-finite loss or gradient.
    pub fn train_step(&mut self, batch_size: usize) -> Result<Option<TrainStats>> {
        if batch_size == 0 {
            return Err(RLError::config("batch_size must be at least 1"));
        }
        let batch = match self.buffer.sample(batch_size, &mut self.rng) {
            Ok(batch) => batch,
            Err(e) if e.is_insufficient_data() => {
                debug!(batch_size, held = self.buffer.len(), "skipping training step");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let input_dim = self.input_dim();
        let states = stack_features(batch.iter().map(|t| t.state.as_slice()), input_dim)?;
        let next_states = stack_features(batch.iter().map(|t| t.next_state.as_slice()), input_dim)?;
        let actions: Vec<usize> = batch.iter().map(|t| t.action).collect();
        #[allow(clippy::cast_possible_truncation)]
        let rewards: Array1<f32> = batch.iter().map(|t| t.reward as f32).collect();
        let continuation: Array1<f32> = batch.iter().map(Transition::continuation).collect();

        let next_max = self.target.max_q(&next_states.view())?;
        #[allow(clippy::cast_possible_truncation)]
        let gamma = self.config.base.gamma as f32;
        let targets = bellman_targets(&rewards.view(), &continuation.view(), &next_max.view(), gamma);

        let (loss, mut grads) =
            self.online
                .loss_and_gradients(&states.view(), &actions, &targets.view())?;
        let grad_norm = clip_grad_norm(&mut grads, self.config.max_grad_norm);
        if !(loss.is_finite() && grad_norm.is_finite()) {
            warn!(loss, grad_norm, "non-finite batch, skipping update");
            return Ok(None);
        }
        self.optimizer.step(self.online.params_mut(), &grads);

        let epsilon = self.policy.decay();
        self.training_steps += 1;
        let step = self.training_steps;

        self.metrics.record("learner.loss", f64::from(loss), step);
        self.metrics.record("learner.epsilon", epsilon, step);
        self.metrics.record("learner.grad_norm", f64::from(grad_norm), step);
        debug!(step, loss, grad_norm, epsilon, "training step");

        if self.config.save_interval > 0 && step % self.config.save_interval == 0 {
            if let Some(store) = &self.checkpoints {
                if let Err(e) = self.save_to(store) {
                    warn!(step, error = %e, "periodic checkpoint failed");
                }
            }
        }

        Ok(Some(TrainStats {
            step,
            loss,
            grad_norm,
            epsilon,
        }))
    }

    /// Hard copy of online parameters into the target network
    pub fn sync_target_from_online(&mut self) {
        self.target.copy_from(&self.online);
    }

    /// Sync the target when the episode counter is a multiple of `every_n`
    pub fn sync_target(&mut self, every_n: usize) -> bool {
        let every_n = every_n as u64;
        if every_n == 0 || self.episodes == 0 || self.episodes % every_n != 0 {
            return false;
        }
        self.sync_target_from_online();
        info!(episode = self.episodes, "target network synchronized");
        true
    }

    /// Count a completed episode; returns the new total
    pub fn finish_episode(&mut self, won: bool) -> u64 {
        self.episodes += 1;
        if won {
            self.wins += 1;
        }
        self.episodes
    }

    /// Fraction of completed episodes won
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn win_rate(&self) -> f64 {
        if self.episodes == 0 {
            0.0
        } else {
            self.wins as f64 / self.episodes as f64
        }
    }

    /// Configuration the agent was built with
    #[must_use]
    pub fn config(&self) -> &DqnConfig {
        &self.config
    }

    /// Current exploration rate
    #[must_use]
    pub fn epsilon(&self) -> f64 {
        self.policy.epsilon()
    }

    /// Override the exploration rate, e.g. 0 for evaluation
    pub fn set_epsilon(&mut self, epsilon: f64) {
        self.policy.set_epsilon(epsilon);
    }

    /// Completed training steps
    #[must_use]
    pub fn training_steps(&self) -> u64 {
        self.training_steps
    }

    /// Transitions ever stored, evicted ones included
    #[must_use]
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// Completed episodes
    #[must_use]
    pub fn episodes(&self) -> u64 {
        self.episodes
    }

    /// Replay buffer
    #[must_use]
    pub fn buffer(&self) -> &ReplayBuffer {
        &self.buffer
    }

    /// Online network
    #[must_use]
    pub fn online(&self) -> &QNetwork {
        &self.online
    }

    /// Target network
    #[must_use]
    pub fn target(&self) -> &QNetwork {
        &self.target
    }

    /// Feature vector length the networks accept
    #[must_use]
    pub fn input_dim(&self) -> usize {
        self.online.input_dim()
    }

    /// Number of discrete actions
    #[must_use]
    pub fn num_actions(&self) -> usize {
        self.online.num_actions()
    }

    fn check_features(&self, features: &[f32]) -> Result<()> {
        let expected = self.input_dim();
        if features.len() == expected {
            Ok(())
        } else {
            Err(RLError::DimensionMismatch {
                expected,
                actual: features.len(),
            })
        }
    }
}

impl std::fmt::Debug for DqnAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DqnAgent")
            .field("layers", &self.online.params().layer_sizes())
            .field("epsilon", &self.policy.epsilon())
            .field("training_steps", &self.training_steps)
            .field("episodes", &self.episodes)
            .field("wins", &self.wins)
            .field("buffered", &self.buffer.len())
            .finish_non_exhaustive()
    }
}

/// `reward + continuation * gamma * next_max`, elementwise
///
/// A zero continuation marks a terminal transition; its target is the reward
/// alone, whatever the target network predicts for the next state.
#[must_use]
pub fn bellman_targets(
    rewards: &ArrayView1<f32>,
    continuation: &ArrayView1<f32>,
    next_max: &ArrayView1<f32>,
    gamma: f32,
) -> Array1<f32> {
    Zip::from(rewards)
        .and(continuation)
        .and(next_max)
        .map_collect(|&r, &c, &m| if c > 0.0 { r + c * gamma * m } else { r })
}

fn stack_features<'a>(rows: impl Iterator<Item = &'a [f32]>, dim: usize) -> Result<Array2<f32>> {
    let mut flat = Vec::new();
    let mut count = 0;
    for row in rows {
        if row.len() != dim {
            return Err(RLError::DimensionMismatch {
                expected: dim,
                actual: row.len(),
            });
        }
        flat.extend_from_slice(row);
        count += 1;
    }
    Array2::from_shape_vec((count, dim), flat).map_err(|e| RLError::Computation(e.to_string()))
}
