//! Telemetry encoding
//!
//! Turns an [`Observation`] into the fixed-length feature vector the
//! Q-network consumes: ten robot features followed by seven enemy features.

use serde::{Deserialize, Serialize};

use robo_rl_core::{FeatureVector, Observation, RLError, Result};

/// Robot-derived features
pub const ROBOT_FEATURES: usize = 10;
/// Enemy-derived features
pub const ENEMY_FEATURES: usize = 7;
/// Length of every encoded feature vector
pub const FEATURE_DIM: usize = ROBOT_FEATURES + ENEMY_FEATURES;

/// Normalization constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Top speed in pixels per tick
    pub max_velocity: f64,
    /// Starting energy
    pub max_energy: f64,
    /// Gun heat right after firing at full power
    pub max_gun_heat: f64,
    /// Divisor for headings and turn-remaining values (degrees)
    pub full_turn: f64,
    /// Bearing feature used when no bearing is known
    pub missing_bearing_feature: f64,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            max_velocity: 8.0,
            max_energy: 100.0,
            max_gun_heat: 3.0,
            full_turn: 360.0,
            missing_bearing_feature: 2.0,
        }
    }
}

impl EncoderConfig {
    /// Every divisor must be positive
    pub fn validate(&self) -> Result<()> {
        let divisors = [
            ("max_velocity", self.max_velocity),
            ("max_energy", self.max_energy),
            ("max_gun_heat", self.max_gun_heat),
            ("full_turn", self.full_turn),
        ];
        for (name, value) in divisors {
            if !(value > 0.0 && value.is_finite()) {
                return Err(RLError::config(format!("{name} must be positive, got {value}")));
            }
        }
        Ok(())
    }
}

/// Pure observation-to-features mapping
#[derive(Debug, Clone, Default)]
pub struct TelemetryEncoder {
    config: EncoderConfig,
}

impl TelemetryEncoder {
    /// Create an encoder
    pub fn new(config: EncoderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Feature vector length
    #[must_use]
    pub fn dim(&self) -> usize {
        FEATURE_DIM
    }

    /// Encode one observation
    ///
    /// Fails with a configuration error when the battlefield has a
    /// non-positive dimension, since positions and distances are normalized
    /// by it.
    #[allow(clippy::cast_possible_truncation)]
    pub fn encode(&self, observation: &Observation) -> Result<FeatureVector> {
        let robot = &observation.robot;
        let (width, height) = (robot.battlefield_width, robot.battlefield_height);
        if !(width > 0.0 && height > 0.0 && width.is_finite() && height.is_finite()) {
            return Err(RLError::config(format!(
                "battlefield must have positive dimensions, got {width}x{height}"
            )));
        }
        let diagonal = width.hypot(height);
        let c = &self.config;

        let mut features = Vec::with_capacity(FEATURE_DIM);
        features.extend([
            robot.x / width,
            robot.y / height,
            robot.velocity / c.max_velocity,
            robot.heading / c.full_turn,
            robot.gun_heading / c.full_turn,
            robot.radar_heading / c.full_turn,
            robot.gun_heat / c.max_gun_heat,
            robot.gun_turn_remaining / c.full_turn,
            robot.radar_turn_remaining / c.full_turn,
            robot.energy / c.max_energy,
        ]);

        match &observation.enemy {
            Some(enemy) => features.extend([
                enemy.x / width,
                enemy.y / height,
                enemy.velocity / c.max_velocity,
                enemy.heading / c.full_turn,
                enemy
                    .known_bearing()
                    .map_or(c.missing_bearing_feature, |bearing| bearing / 180.0),
                enemy.distance / diagonal,
                enemy.energy / c.max_energy,
            ]),
            None => features.extend([-1.0, -1.0, 0.0, -1.0, c.missing_bearing_feature, -1.0, -1.0]),
        }

        Ok(features.into_iter().map(|v| v as f32).collect())
    }

    /// Encode observations in order
    pub fn encode_batch<'a, I>(&self, observations: I) -> Result<Vec<FeatureVector>>
    where
        I: IntoIterator<Item = &'a Observation>,
    {
        observations.into_iter().map(|obs| self.encode(obs)).collect()
    }
}
