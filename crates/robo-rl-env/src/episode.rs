//! Round state machine
//!
//! One [`EpisodeController`] per active round drives the learner: each tick
//! scores the previous action, stores the transition, optionally trains, and
//! picks the next action. Round end pushes the terminal transition and may
//! sync the target network.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use robo_rl_agent::DqnAgent;
use robo_rl_core::{FeatureVector, MetricsSink, NullSink, Observation, Result, RewardBreakdown, Transition};

use crate::encoder::TelemetryEncoder;
use crate::service::SessionId;
use crate::shaper::{RewardShaper, OUTCOME};

/// How a round ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RoundOutcome {
    /// The controlled robot survived
    Win,
    /// The controlled robot was destroyed
    Loss,
    /// Any other ending, e.g. the battle was aborted
    Other,
}

/// Training cadence within a round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpisodeConfig {
    /// Train on every Nth tick; 0 disables per-tick training
    pub train_every: u64,
    /// Buffered transitions required before any training step
    pub min_buffer_before_training: usize,
    /// Run one more training step after the terminal transition
    pub train_on_round_end: bool,
}

impl Default for EpisodeConfig {
    fn default() -> Self {
        Self {
            train_every: 1,
            min_buffer_before_training: 33,
            train_on_round_end: true,
        }
    }
}

/// Whether a round is in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    /// Waiting for a round to start
    Idle,
    /// Accepting ticks
    InRound,
}

/// Result of a completed round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    /// Session that played the round
    pub session: SessionId,
    /// Learner episode counter after this round
    pub episode: u64,
    /// Ticks received
    pub ticks: u64,
    /// Sum of every reward pushed this round, terminal included
    pub total_reward: f64,
    /// Round result
    pub outcome: RoundOutcome,
    /// Whether the target network was synced at this boundary
    pub target_synced: bool,
    /// Completion time
    pub finished_at: DateTime<Utc>,
}

/// Last observation and the action chosen for it
#[derive(Debug, Clone)]
struct PendingStep {
    observation: Observation,
    features: FeatureVector,
    action: usize,
}

/// Per-session round state
pub struct EpisodeController {
    session: SessionId,
    config: EpisodeConfig,
    encoder: TelemetryEncoder,
    shaper: Arc<RewardShaper>,
    metrics: Arc<dyn MetricsSink>,
    phase: RoundPhase,
    pending: Option<PendingStep>,
    round_reward: f64,
    ticks: u64,
}

impl EpisodeController {
    /// Create an idle controller
    pub fn new(
        session: SessionId,
        config: EpisodeConfig,
        encoder: TelemetryEncoder,
        shaper: Arc<RewardShaper>,
    ) -> Self {
        Self {
            session,
            config,
            encoder,
            shaper,
            metrics: Arc::new(NullSink),
            phase: RoundPhase::Idle,
            pending: None,
            round_reward: 0.0,
            ticks: 0,
        }
    }

    /// Route reward and episode series to `sink`
    #[must_use]
    pub fn with_metrics(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = sink;
        self
    }

    /// Begin a round, discarding anything left from an unfinished one
    pub fn start_round(&mut self) {
        if self.pending.take().is_some() {
            warn!(session = %self.session, ticks = self.ticks, "previous round never ended, discarding its last step");
        }
        self.round_reward = 0.0;
        self.ticks = 0;
        self.phase = RoundPhase::InRound;
        info!(session = %self.session, "round started");
    }

    /// Handle one tick and return the action to play
    ///
    /// The previous step is only released once its transition is stored, so
    /// a failed push leaves it in place for the next tick. Training failures
    /// are logged and never fail the tick.
    pub fn tick(&mut self, learner: &mut DqnAgent, observation: Observation) -> Result<usize> {
        if self.phase == RoundPhase::Idle {
            warn!(session = %self.session, "tick outside a round, starting one");
            self.start_round();
        }
        let features = self.encoder.encode(&observation)?;
        self.ticks += 1;

        if let Some(pending) = &self.pending {
            let breakdown = self.score(&pending.observation, pending.action, &observation, None);
            let transition = Transition::new(
                pending.features.clone(),
                pending.action,
                breakdown.total().0,
                features.clone(),
                false,
            );
            self.push(learner, transition, &breakdown)?;
            self.pending = None;
            if self.should_train(learner) {
                self.train(learner);
            }
        }

        let action = learner.select_action(&features)?;
        debug!(session = %self.session, tick = self.ticks, action, "action selected");
        self.pending = Some(PendingStep {
            observation,
            features,
            action,
        });
        Ok(action)
    }

    /// Close the round with a terminal transition
    ///
    /// Returns `Ok(None)` when no tick was received since the round started;
    /// nothing is pushed and the episode counter is untouched.
    pub fn end_round(&mut self, learner: &mut DqnAgent, outcome: RoundOutcome) -> Result<Option<EpisodeSummary>> {
        self.phase = RoundPhase::Idle;
        let Some(last) = self.pending.take() else {
            debug!(session = %self.session, ?outcome, "round ended before any tick");
            return Ok(None);
        };

        // No telemetry arrives at round end, so the last observation stands
        // in for both sides of the terminal transition.
        let breakdown = self.score(&last.observation, last.action, &last.observation, Some(outcome));
        let transition = Transition::new(
            last.features.clone(),
            last.action,
            breakdown.total().0,
            last.features,
            true,
        );
        self.push(learner, transition, &breakdown)?;
        if self.config.train_on_round_end && learner.buffer().len() >= self.config.min_buffer_before_training {
            self.train(learner);
        }

        let episode = learner.finish_episode(outcome == RoundOutcome::Win);
        let sync_every = learner.config().base.target_update_freq;
        let target_synced = learner.sync_target(sync_every);

        #[allow(clippy::cast_precision_loss)]
        let ticks = self.ticks as f64;
        self.metrics.record("episode.reward", self.round_reward, episode);
        self.metrics.record("episode.ticks", ticks, episode);
        self.metrics.record("episode.win_rate", learner.win_rate(), episode);

        info!(
            session = %self.session,
            episode,
            ticks = self.ticks,
            reward = self.round_reward,
            ?outcome,
            epsilon = learner.epsilon(),
            "round finished"
        );

        Ok(Some(EpisodeSummary {
            session: self.session,
            episode,
            ticks: self.ticks,
            total_reward: self.round_reward,
            outcome,
            target_synced,
            finished_at: Utc::now(),
        }))
    }

    fn score(
        &self,
        previous: &Observation,
        action: usize,
        current: &Observation,
        outcome: Option<RoundOutcome>,
    ) -> RewardBreakdown {
        let mut breakdown = self.shaper.shape(Some(previous), Some(action), Some(current));
        if let Some(outcome) = outcome {
            breakdown.set(OUTCOME, self.shaper.config().outcome_reward(outcome));
        }
        breakdown
    }

    /// Store a transition, then record its breakdown under the learner's
    /// global transition index
    fn push(&mut self, learner: &mut DqnAgent, transition: Transition, breakdown: &RewardBreakdown) -> Result<()> {
        let reward = transition.reward;
        learner.remember(transition)?;
        self.metrics.record_breakdown("reward", breakdown, learner.transitions());
        self.round_reward += reward;
        Ok(())
    }

    fn train(&self, learner: &mut DqnAgent) {
        let batch_size = learner.config().base.batch_size;
        if let Err(e) = learner.train_step(batch_size) {
            warn!(session = %self.session, error = %e, "training step failed");
        }
    }

    fn should_train(&self, learner: &DqnAgent) -> bool {
        self.config.train_every > 0
            && self.ticks % self.config.train_every == 0
            && learner.buffer().len() >= self.config.min_buffer_before_training
    }

    /// Session this controller serves
    #[must_use]
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    /// Ticks received this round
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Reward accumulated this round
    #[must_use]
    pub fn round_reward(&self) -> f64 {
        self.round_reward
    }

    /// Whether a previous observation/action pair is held
    #[must_use]
    pub fn has_pending_step(&self) -> bool {
        self.pending.is_some()
    }

}

impl std::fmt::Debug for EpisodeController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EpisodeController")
            .field("session", &self.session)
            .field("phase", &self.phase)
            .field("ticks", &self.ticks)
            .field("round_reward", &self.round_reward)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::FEATURE_DIM;
    use crate::shaper::ShapingConfig;
    use approx::assert_relative_eq;
    use robo_rl_agent::DqnConfig;
    use robo_rl_core::{ActionTable, AgentConfig, EnemySnapshot, RLError, RobotState};

    fn learner(batch_size: usize) -> DqnAgent {
        let config = DqnConfig {
            base: AgentConfig {
                batch_size,
                buffer_size: 100,
                ..AgentConfig::default()
            },
            hidden_dims: vec![8, 8],
            checkpoint_path: None,
            seed: Some(17),
            ..DqnConfig::default()
        };
        DqnAgent::new(config, FEATURE_DIM, ActionTable::standard().len()).unwrap()
    }

    fn controller(config: EpisodeConfig) -> EpisodeController {
        let shaper = RewardShaper::new(ShapingConfig::default(), ActionTable::standard()).unwrap();
        EpisodeController::new(SessionId::new(), config, TelemetryEncoder::default(), Arc::new(shaper))
    }

    fn observation(time: u64) -> Observation {
        #[allow(clippy::cast_precision_loss)]
        let x = 100.0 + time as f64;
        let robot = RobotState {
            x,
            y: 300.0,
            energy: 100.0,
            battlefield_width: 800.0,
            battlefield_height: 600.0,
            time,
            ..RobotState::default()
        };
        let enemy = EnemySnapshot {
            bearing: 45.0,
            distance: 300.0,
            energy: 100.0,
            ..EnemySnapshot::default()
        };
        Observation::new(robot, Some(enemy), Vec::new())
    }

    #[test]
    fn consecutive_starts_drop_dangling_step() {
        let mut agent = learner(4);
        let mut ctl = controller(EpisodeConfig::default());
        ctl.start_round();
        ctl.tick(&mut agent, observation(1)).unwrap();
        assert!(ctl.has_pending_step());

        ctl.start_round();
        assert!(!ctl.has_pending_step());
        assert_eq!(ctl.ticks(), 0);

        // First tick of the new round has nothing to pair with.
        ctl.tick(&mut agent, observation(2)).unwrap();
        assert!(agent.buffer().is_empty());
    }

    #[test]
    fn end_before_any_tick_is_noop() {
        let mut agent = learner(4);
        let mut ctl = controller(EpisodeConfig::default());
        ctl.start_round();
        assert!(ctl.end_round(&mut agent, RoundOutcome::Win).unwrap().is_none());
        assert!(agent.buffer().is_empty());
        assert_eq!(agent.episodes(), 0);
    }

    #[test]
    fn round_pushes_transitions_and_terminal() {
        let mut agent = learner(4);
        let mut ctl = controller(EpisodeConfig::default());
        ctl.start_round();
        for t in 1..=3 {
            let action = ctl.tick(&mut agent, observation(t)).unwrap();
            assert!(action < 28);
        }
        assert_eq!(agent.buffer().len(), 2);
        assert!(agent.buffer().iter().all(|t| !t.terminal));

        let summary = ctl.end_round(&mut agent, RoundOutcome::Win).unwrap().unwrap();
        assert_eq!(agent.buffer().len(), 3);
        let terminal = agent.buffer().newest().unwrap();
        assert!(terminal.terminal);
        assert_eq!(terminal.state, terminal.next_state);
        assert!(terminal.reward > 1000.0);

        assert_eq!(summary.episode, 1);
        assert_eq!(summary.ticks, 3);
        assert_eq!(summary.outcome, RoundOutcome::Win);
        let pushed: f64 = agent.buffer().iter().map(|t| t.reward).sum();
        assert_relative_eq!(summary.total_reward, pushed, epsilon = 1e-9);
        assert_eq!(ctl.phase(), RoundPhase::Idle);
        assert_relative_eq!(agent.win_rate(), 1.0);
    }

    #[test]
    fn tick_while_idle_starts_round() {
        let mut agent = learner(4);
        let mut ctl = controller(EpisodeConfig::default());
        assert_eq!(ctl.phase(), RoundPhase::Idle);
        ctl.tick(&mut agent, observation(1)).unwrap();
        assert_eq!(ctl.phase(), RoundPhase::InRound);
        assert_eq!(ctl.ticks(), 1);
    }

    #[test]
    fn bad_telemetry_fails_the_tick_without_side_effects() {
        let mut agent = learner(4);
        let mut ctl = controller(EpisodeConfig::default());
        ctl.start_round();
        let mut bad = observation(1);
        bad.robot.battlefield_width = -5.0;
        assert!(matches!(ctl.tick(&mut agent, bad), Err(RLError::Configuration(_))));
        assert_eq!(ctl.ticks(), 0);
        assert!(!ctl.has_pending_step());
    }

    #[test]
    fn trains_once_buffer_is_warm() {
        let mut agent = learner(2);
        let mut ctl = controller(EpisodeConfig {
            train_every: 1,
            min_buffer_before_training: 3,
            train_on_round_end: false,
        });
        ctl.start_round();
        for t in 1..=3 {
            ctl.tick(&mut agent, observation(t)).unwrap();
        }
        assert_eq!(agent.training_steps(), 0);
        ctl.tick(&mut agent, observation(4)).unwrap();
        assert_eq!(agent.training_steps(), 1);
        ctl.tick(&mut agent, observation(5)).unwrap();
        assert_eq!(agent.training_steps(), 2);
    }

    #[test]
    fn target_syncs_every_n_rounds() {
        let mut agent = learner(2);
        let mut ctl = controller(EpisodeConfig {
            train_every: 1,
            min_buffer_before_training: 2,
            train_on_round_end: true,
        });
        let mut synced = Vec::new();
        for round in 0..5 {
            ctl.start_round();
            for t in 0..4 {
                ctl.tick(&mut agent, observation(round * 10 + t)).unwrap();
            }
            let outcome = if round % 2 == 0 { RoundOutcome::Win } else { RoundOutcome::Loss };
            synced.push(ctl.end_round(&mut agent, outcome).unwrap().unwrap().target_synced);
        }
        assert_eq!(synced, vec![false, false, false, false, true]);
        assert_eq!(agent.online().params(), agent.target().params());
        assert_relative_eq!(agent.win_rate(), 0.6);
    }

    #[test]
    fn failed_push_keeps_previous_step() {
        let mut agent = learner(4);
        let mut narrow = DqnAgent::new(
            DqnConfig {
                hidden_dims: vec![4],
                checkpoint_path: None,
                seed: Some(3),
                ..DqnConfig::default()
            },
            5,
            ActionTable::standard().len(),
        )
        .unwrap();
        let mut ctl = controller(EpisodeConfig::default());
        ctl.start_round();
        ctl.tick(&mut agent, observation(1)).unwrap();

        assert!(matches!(
            ctl.tick(&mut narrow, observation(2)),
            Err(RLError::DimensionMismatch { .. })
        ));
        assert!(ctl.has_pending_step());
        assert!(narrow.buffer().is_empty());
        assert_relative_eq!(ctl.round_reward(), 0.0);

        ctl.tick(&mut agent, observation(3)).unwrap();
        assert_eq!(agent.buffer().len(), 1);
        let first = TelemetryEncoder::default().encode(&observation(1)).unwrap();
        assert_eq!(agent.buffer().newest().unwrap().state, first);
    }

    #[test]
    fn reward_series_use_global_indices_across_sessions() {
        #[derive(Default)]
        struct Recorder(std::sync::Mutex<Vec<(String, f64, u64)>>);

        impl MetricsSink for Recorder {
            fn record(&self, name: &str, value: f64, step: u64) {
                self.0.lock().unwrap().push((name.to_string(), value, step));
            }
        }

        let recorder = Arc::new(Recorder::default());
        let mut agent = learner(4);
        let mut a = controller(EpisodeConfig::default()).with_metrics(recorder.clone());
        let mut b = controller(EpisodeConfig::default()).with_metrics(recorder.clone());
        a.start_round();
        b.start_round();
        for t in 1..=3 {
            a.tick(&mut agent, observation(t)).unwrap();
            b.tick(&mut agent, observation(t)).unwrap();
        }
        a.end_round(&mut agent, RoundOutcome::Win).unwrap();
        b.end_round(&mut agent, RoundOutcome::Loss).unwrap();

        let records = recorder.0.lock().unwrap();
        let series = |name: &str| -> Vec<(f64, u64)> {
            records.iter().filter(|r| r.0 == name).map(|r| (r.1, r.2)).collect()
        };
        let steps: Vec<u64> = series("reward.total").into_iter().map(|(_, step)| step).collect();
        assert_eq!(steps, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(series("episode.win_rate"), vec![(1.0, 1), (0.5, 2)]);
    }
}
