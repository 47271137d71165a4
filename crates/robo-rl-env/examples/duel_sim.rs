//! Example: DQN robot dueling a scripted circler
//!
//! A tiny kinematic stand-in for the battle engine drives the training
//! service through the same `RoundHandler` calls a real transport would make.
//!
//! Run with `RUST_LOG=info cargo run --example duel_sim -- 20` for 20 rounds.

use rand::Rng;
use std::sync::Arc;

use robo_rl_core::geometry::{aim_tolerance, bearing_from_gun, normalize_relative_angle};
use robo_rl_core::TracingSink;
use robo_rl_env::{
    init_logging, EngineCommand, EnemySnapshot, GameEvent, Observation, RobotState, RoundHandler,
    RoundOutcome, TrainerConfig, TrainingService,
};

const WIDTH: f64 = 800.0;
const HEIGHT: f64 = 600.0;
const MAX_TICKS: u64 = 400;
const ROBOT_SIZE: f64 = 36.0;

struct Arena {
    me: RobotState,
    enemy_angle: f64,
    enemy_energy: f64,
    pending_events: Vec<GameEvent>,
}

impl Arena {
    fn new(round: u32) -> Self {
        Self {
            me: RobotState {
                x: 150.0,
                y: 150.0,
                energy: 100.0,
                battlefield_width: WIDTH,
                battlefield_height: HEIGHT,
                round,
                ..RobotState::default()
            },
            enemy_angle: 0.0,
            enemy_energy: 100.0,
            pending_events: Vec::new(),
        }
    }

    fn enemy_position(&self) -> (f64, f64) {
        let a = self.enemy_angle.to_radians();
        (WIDTH / 2.0 + 200.0 * a.sin(), HEIGHT / 2.0 + 150.0 * a.cos())
    }

    fn observe(&mut self) -> Observation {
        let (ex, ey) = self.enemy_position();
        let (dx, dy) = (ex - self.me.x, ey - self.me.y);
        let absolute = dx.atan2(dy).to_degrees();
        let enemy = EnemySnapshot {
            x: ex,
            y: ey,
            velocity: 5.0,
            heading: (self.enemy_angle + 90.0).rem_euclid(360.0),
            bearing: normalize_relative_angle(absolute - self.me.heading),
            distance: dx.hypot(dy),
            energy: self.enemy_energy,
        };
        let events = std::mem::take(&mut self.pending_events);
        Observation::new(self.me.clone(), Some(enemy), events)
    }

    fn apply(&mut self, command: EngineCommand, magnitude: f64, rng: &mut impl Rng) {
        self.me.time += 1;
        self.me.gun_heat = (self.me.gun_heat - 0.1).max(0.0);
        match command {
            EngineCommand::MoveForward => self.drive(magnitude.min(8.0)),
            EngineCommand::MoveBackward => self.drive(-magnitude.min(8.0)),
            EngineCommand::TurnLeft => self.me.heading = (self.me.heading - magnitude).rem_euclid(360.0),
            EngineCommand::TurnRight => self.me.heading = (self.me.heading + magnitude).rem_euclid(360.0),
            EngineCommand::TurnGunLeft => self.me.gun_heading = (self.me.gun_heading - magnitude).rem_euclid(360.0),
            EngineCommand::TurnGunRight => self.me.gun_heading = (self.me.gun_heading + magnitude).rem_euclid(360.0),
            EngineCommand::Fire => self.fire(magnitude),
            EngineCommand::RotateRadarLeft => self.me.radar_heading = (self.me.radar_heading - magnitude).rem_euclid(360.0),
            EngineCommand::RotateRadarRight => self.me.radar_heading = (self.me.radar_heading + magnitude).rem_euclid(360.0),
            EngineCommand::DoNothing => {}
        }

        self.enemy_angle = (self.enemy_angle + 1.5).rem_euclid(360.0);
        if self.me.time % 25 == 0 && rng.gen_bool(0.4) {
            self.me.energy -= 4.0;
            self.pending_events.push(GameEvent::HitByBullet { power: 1.0, bearing: 0.0 });
        }
    }

    fn drive(&mut self, distance: f64) {
        let h = self.me.heading.to_radians();
        let (x, y) = (self.me.x + distance * h.sin(), self.me.y + distance * h.cos());
        let half = ROBOT_SIZE / 2.0;
        self.me.x = x.clamp(half, WIDTH - half);
        self.me.y = y.clamp(half, HEIGHT - half);
        self.me.velocity = distance;
        #[allow(clippy::float_cmp)]
        let hit_wall = self.me.x != x || self.me.y != y;
        if hit_wall {
            self.me.energy -= 1.0;
            self.pending_events.push(GameEvent::HitWall { bearing: 0.0 });
        }
    }

    fn fire(&mut self, power: f64) {
        if self.me.gun_heat > 0.0 || self.me.energy <= power {
            return;
        }
        self.me.energy -= power;
        self.me.gun_heat = 1.0 + power / 5.0;

        let (ex, ey) = self.enemy_position();
        let (dx, dy) = (ex - self.me.x, ey - self.me.y);
        let bearing = normalize_relative_angle(dx.atan2(dy).to_degrees() - self.me.heading);
        let error = bearing_from_gun(self.me.heading, bearing, self.me.gun_heading).abs();
        if error <= aim_tolerance(ROBOT_SIZE, dx.hypot(dy)) {
            self.enemy_energy -= 4.0 * power;
            self.pending_events.push(GameEvent::BulletHit {
                power,
                enemy_energy: self.enemy_energy,
            });
        } else {
            self.pending_events.push(GameEvent::BulletMissed { power });
        }
    }

    fn outcome(&self) -> Option<RoundOutcome> {
        if self.enemy_energy <= 0.0 {
            Some(RoundOutcome::Win)
        } else if self.me.energy <= 0.0 {
            Some(RoundOutcome::Loss)
        } else if self.me.time >= MAX_TICKS {
            Some(RoundOutcome::Other)
        } else {
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    init_logging("info");

    let rounds: u32 = std::env::args().nth(1).map_or(Ok(10), |s| s.parse())?;

    let mut config = TrainerConfig::default();
    config.agent.checkpoint_path = None;
    config.agent.seed = Some(7);
    let service = TrainingService::with_metrics(&config, Arc::new(TracingSink))?;
    let session = service.open_session();
    let mut rng = rand::thread_rng();

    let mut wins = 0;
    for round in 0..rounds {
        let mut arena = Arena::new(round);
        service.start_round(session).await?;

        let outcome = loop {
            let action = service.tick(session, arena.observe()).await?;
            let (command, magnitude) = service.command(action)?;
            arena.apply(command, magnitude, &mut rng);
            if let Some(outcome) = arena.outcome() {
                break outcome;
            }
        };

        if let Some(summary) = service.end_round(session, outcome).await? {
            if summary.outcome == RoundOutcome::Win {
                wins += 1;
            }
            println!(
                "Round {}: {:?} after {} ticks, total reward = {:.2}",
                round + 1,
                summary.outcome,
                summary.ticks,
                summary.total_reward
            );
        }
    }

    let learner = service.learner();
    let learner = learner.lock().await;
    println!(
        "\nWon {wins}/{rounds} rounds; {} training steps, epsilon = {:.3}",
        learner.training_steps(),
        learner.epsilon()
    );

    Ok(())
}
