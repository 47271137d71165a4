//! Multi-session training service
//!
//! Every concurrent round gets its own [`EpisodeController`]; all of them
//! share one learner and its replay buffer. Learner access is serialized by
//! an async mutex, so a tick's transition push, training step and action
//! selection happen as one unit.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use robo_rl_agent::{DqnAgent, RestoreOutcome};
use robo_rl_core::{ActionTable, EngineCommand, MetricsSink, NullSink, Observation, RLError, Result};

use crate::config::TrainerConfig;
use crate::encoder::TelemetryEncoder;
use crate::episode::{EpisodeConfig, EpisodeController, EpisodeSummary, RoundOutcome};
use crate::shaper::RewardShaper;

/// Identifies one round-playing client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Fresh random id
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for SessionId {
    type Err = RLError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| RLError::UnknownSession(s.to_string()))
    }
}

/// Inbound calls from the battle engine's transport
#[async_trait]
pub trait RoundHandler: Send + Sync {
    /// A round is starting for `session`
    async fn start_round(&self, session: SessionId) -> Result<()>;

    /// New telemetry; returns the action index to play
    async fn tick(&self, session: SessionId, observation: Observation) -> Result<usize>;

    /// The round is over
    async fn end_round(&self, session: SessionId, outcome: RoundOutcome) -> Result<Option<EpisodeSummary>>;
}

/// Shared learner plus per-session round state
pub struct TrainingService {
    learner: Arc<Mutex<DqnAgent>>,
    sessions: DashMap<SessionId, EpisodeController>,
    encoder: TelemetryEncoder,
    shaper: Arc<RewardShaper>,
    episode: EpisodeConfig,
    metrics: Arc<dyn MetricsSink>,
    restore_outcome: RestoreOutcome,
}

impl TrainingService {
    /// Build the learner and restore its checkpoint, if any
    pub fn new(config: &TrainerConfig) -> Result<Self> {
        Self::with_metrics(config, Arc::new(NullSink))
    }

    /// Like [`TrainingService::new`], routing every series to `metrics`
    pub fn with_metrics(config: &TrainerConfig, metrics: Arc<dyn MetricsSink>) -> Result<Self> {
        config.validate()?;
        let actions = ActionTable::standard();
        let encoder = TelemetryEncoder::new(config.encoder.clone())?;
        let shaper = RewardShaper::new(config.shaping.clone(), actions.clone())?;

        let mut learner =
            DqnAgent::new(config.agent.clone(), encoder.dim(), actions.len())?.with_metrics(Arc::clone(&metrics));
        let restore_outcome = learner.restore();
        info!(?restore_outcome, "training service ready");

        Ok(Self {
            learner: Arc::new(Mutex::new(learner)),
            sessions: DashMap::new(),
            encoder,
            shaper: Arc::new(shaper),
            episode: config.episode.clone(),
            metrics,
            restore_outcome,
        })
    }

    /// Register a new client
    pub fn open_session(&self) -> SessionId {
        let session = SessionId::new();
        let controller = EpisodeController::new(
            session,
            self.episode.clone(),
            self.encoder.clone(),
            Arc::clone(&self.shaper),
        )
        .with_metrics(Arc::clone(&self.metrics));
        self.sessions.insert(session, controller);
        info!(%session, active = self.sessions.len(), "session opened");
        session
    }

    /// Forget a client; an unfinished round is dropped without a terminal
    /// transition
    pub fn close_session(&self, session: SessionId) -> Result<()> {
        let (_, controller) = self
            .sessions
            .remove(&session)
            .ok_or_else(|| RLError::UnknownSession(session.to_string()))?;
        if controller.has_pending_step() {
            warn!(%session, "session closed mid-round");
        }
        info!(%session, active = self.sessions.len(), "session closed");
        Ok(())
    }

    /// Open sessions
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Engine command for an action index
    pub fn command(&self, action: usize) -> Result<(EngineCommand, f64)> {
        self.shaper.actions().command(action)
    }

    /// Shared learner handle
    #[must_use]
    pub fn learner(&self) -> Arc<Mutex<DqnAgent>> {
        Arc::clone(&self.learner)
    }

    /// What happened to the checkpoint at startup
    #[must_use]
    pub fn restore_outcome(&self) -> &RestoreOutcome {
        &self.restore_outcome
    }

    /// Persist the learner's online parameters
    pub async fn save_checkpoint(&self) -> Result<()> {
        self.learner.lock().await.save_checkpoint()
    }

    fn unknown(session: SessionId) -> RLError {
        RLError::UnknownSession(session.to_string())
    }
}

#[async_trait]
impl RoundHandler for TrainingService {
    async fn start_round(&self, session: SessionId) -> Result<()> {
        let mut controller = self.sessions.get_mut(&session).ok_or_else(|| Self::unknown(session))?;
        controller.start_round();
        Ok(())
    }

    async fn tick(&self, session: SessionId, observation: Observation) -> Result<usize> {
        if !self.sessions.contains_key(&session) {
            return Err(Self::unknown(session));
        }
        let mut learner = self.learner.lock().await;
        // Shard guard is taken after the last await point.
        let mut controller = self.sessions.get_mut(&session).ok_or_else(|| Self::unknown(session))?;
        controller.tick(&mut learner, observation)
    }

    async fn end_round(&self, session: SessionId, outcome: RoundOutcome) -> Result<Option<EpisodeSummary>> {
        if !self.sessions.contains_key(&session) {
            return Err(Self::unknown(session));
        }
        let mut learner = self.learner.lock().await;
        let mut controller = self.sessions.get_mut(&session).ok_or_else(|| Self::unknown(session))?;
        controller.end_round(&mut learner, outcome)
    }
}

impl fmt::Debug for TrainingService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrainingService")
            .field("sessions", &self.sessions.len())
            .field("restore_outcome", &self.restore_outcome)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use robo_rl_core::{EnemySnapshot, RobotState};

    fn config() -> TrainerConfig {
        let mut config = TrainerConfig::default();
        config.agent.checkpoint_path = None;
        config.agent.seed = Some(21);
        config.agent.hidden_dims = vec![8, 8];
        config.agent.base.batch_size = 4;
        config.episode.min_buffer_before_training = 4;
        config
    }

    fn observation(time: u64, enemy: bool) -> Observation {
        #[allow(clippy::cast_precision_loss)]
        let robot = RobotState {
            x: 50.0 + time as f64,
            y: 80.0,
            energy: 100.0,
            battlefield_width: 800.0,
            battlefield_height: 600.0,
            time,
            ..RobotState::default()
        };
        let enemy = enemy.then(|| EnemySnapshot {
            bearing: -20.0,
            distance: 250.0,
            energy: 90.0,
            ..EnemySnapshot::default()
        });
        Observation::new(robot, enemy, Vec::new())
    }

    #[tokio::test]
    async fn unknown_session_is_rejected() {
        let service = TrainingService::new(&config()).unwrap();
        let stranger = SessionId::new();
        assert!(matches!(service.start_round(stranger).await, Err(RLError::UnknownSession(_))));
        assert!(matches!(
            service.tick(stranger, observation(1, true)).await,
            Err(RLError::UnknownSession(_))
        ));
        assert!(service.close_session(stranger).is_err());
    }

    #[tokio::test]
    async fn full_round_through_handler() {
        let service = TrainingService::new(&config()).unwrap();
        assert_eq!(service.restore_outcome(), &RestoreOutcome::NoCheckpointConfigured);
        let session = service.open_session();
        service.start_round(session).await.unwrap();
        for t in 0..10 {
            let action = service.tick(session, observation(t, t % 3 != 0)).await.unwrap();
            assert!(service.command(action).is_ok());
        }
        let summary = service.end_round(session, RoundOutcome::Loss).await.unwrap().unwrap();
        assert_eq!(summary.session, session);
        assert_eq!(summary.ticks, 10);

        let learner = service.learner();
        let learner = learner.lock().await;
        assert_eq!(learner.buffer().len(), 10);
        assert_eq!(learner.episodes(), 1);
        assert!(learner.training_steps() > 0);
    }

    #[tokio::test]
    async fn concurrent_sessions_share_one_learner() {
        let service = Arc::new(TrainingService::new(&config()).unwrap());
        let sessions: Vec<_> = (0..4).map(|_| service.open_session()).collect();
        assert_eq!(service.session_count(), 4);

        let mut handles = Vec::new();
        for session in sessions.clone() {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                service.start_round(session).await?;
                for t in 0..6 {
                    service.tick(session, observation(t, true)).await?;
                }
                service.end_round(session, RoundOutcome::Win).await
            }));
        }
        for handle in handles {
            let summary = handle.await.unwrap().unwrap().unwrap();
            assert_eq!(summary.ticks, 6);
        }

        let learner = service.learner();
        let learner = learner.lock().await;
        // Six transitions per session: five ticks paired plus the terminal.
        assert_eq!(learner.buffer().len(), 24);
        assert_eq!(learner.episodes(), 4);
        drop(learner);

        for session in sessions {
            service.close_session(session).unwrap();
        }
        assert_eq!(service.session_count(), 0);
    }

    #[test]
    fn session_ids_parse_from_transport_strings() {
        let id = SessionId::new();
        assert_eq!(id.to_string().parse::<SessionId>().unwrap(), id);
        assert!(matches!("nope".parse::<SessionId>(), Err(RLError::UnknownSession(_))));
    }
}
