//! Per-tick telemetry snapshots
//!
//! All angles are in degrees, matching what the battle engine reports.

use serde::{Deserialize, Serialize};

/// Bearing value the engine uses when it has no bearing for a scanned enemy
pub const MISSING_BEARING: f64 = 360.0;

/// Kinematic, gun and radar state of the controlled robot
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RobotState {
    /// Position in pixels
    pub x: f64,
    /// Position in pixels
    pub y: f64,
    /// Signed speed in pixels per tick
    pub velocity: f64,
    /// Body heading
    pub heading: f64,
    /// Gun heading
    pub gun_heading: f64,
    /// Radar heading
    pub radar_heading: f64,
    /// Gun cannot fire until this cools to zero
    pub gun_heat: f64,
    /// Pending gun rotation
    pub gun_turn_remaining: f64,
    /// Pending radar rotation
    pub radar_turn_remaining: f64,
    /// Remaining energy
    pub energy: f64,
    /// Battlefield width in pixels
    pub battlefield_width: f64,
    /// Battlefield height in pixels
    pub battlefield_height: f64,
    /// Round number within the battle
    #[serde(default)]
    pub round: u32,
    /// Engine time in ticks
    #[serde(default)]
    pub time: u64,
}

/// Last radar contact with the opponent
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EnemySnapshot {
    /// Position in pixels
    pub x: f64,
    /// Position in pixels
    pub y: f64,
    /// Signed speed in pixels per tick
    pub velocity: f64,
    /// Body heading
    pub heading: f64,
    /// Bearing relative to the controlled robot's heading, in (-180, 180]
    pub bearing: f64,
    /// Distance in pixels
    pub distance: f64,
    /// Remaining energy
    pub energy: f64,
}

impl EnemySnapshot {
    /// Bearing, unless the engine flagged it as unknown
    #[must_use]
    pub fn known_bearing(&self) -> Option<f64> {
        #[allow(clippy::float_cmp)]
        let missing = self.bearing == MISSING_BEARING;
        (!missing).then_some(self.bearing)
    }
}

/// Combat events reported since the previous observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GameEvent {
    /// An enemy bullet struck the controlled robot
    HitByBullet { power: f64, bearing: f64 },
    /// One of our bullets struck the enemy
    BulletHit { power: f64, enemy_energy: f64 },
    /// One of our bullets left the battlefield
    BulletMissed { power: f64 },
    /// Two bullets collided mid-air
    BulletHitBullet { power: f64 },
    /// The controlled robot drove into a wall
    HitWall { bearing: f64 },
    /// The controlled robot collided with another robot
    HitRobot { bearing: f64, energy: f64, at_fault: bool },
    /// Some robot was destroyed
    RobotDeath { name: String },
    /// Event kind this build does not know about
    #[serde(other)]
    Unknown,
}

impl GameEvent {
    /// Short name for logs
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::HitByBullet { .. } => "hit_by_bullet",
            Self::BulletHit { .. } => "bullet_hit",
            Self::BulletMissed { .. } => "bullet_missed",
            Self::BulletHitBullet { .. } => "bullet_hit_bullet",
            Self::HitWall { .. } => "hit_wall",
            Self::HitRobot { .. } => "hit_robot",
            Self::RobotDeath { .. } => "robot_death",
            Self::Unknown => "unknown",
        }
    }
}

/// Immutable snapshot delivered once per tick
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Observation {
    /// State of the controlled robot
    pub robot: RobotState,
    /// Absent when no enemy is currently on radar
    #[serde(default)]
    pub enemy: Option<EnemySnapshot>,
    /// Events in the order the engine raised them
    #[serde(default)]
    pub events: Vec<GameEvent>,
}

impl Observation {
    /// Create an observation
    #[must_use]
    pub fn new(robot: RobotState, enemy: Option<EnemySnapshot>, events: Vec<GameEvent>) -> Self {
        Self { robot, enemy, events }
    }

    /// Enemy snapshot with a usable bearing
    #[must_use]
    pub fn visible_enemy(&self) -> Option<&EnemySnapshot> {
        self.enemy.as_ref().filter(|e| e.known_bearing().is_some())
    }
}
