//! Discrete actions and the action table
//!
//! The learner only ever sees an index in `0..N`. The [`ActionTable`] resolves
//! that index once into everything the rest of the system needs: the engine
//! command to send upstream, its magnitude, and whether (and how strongly) the
//! reward shaper treats it as a shot.

use serde::{Deserialize, Serialize};

use crate::{RLError, Result};

/// Command kinds understood by the battle engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineCommand {
    /// Drive forward by `magnitude` pixels
    MoveForward,
    /// Drive backward by `magnitude` pixels
    MoveBackward,
    /// Turn the body left by `magnitude` degrees
    TurnLeft,
    /// Turn the body right by `magnitude` degrees
    TurnRight,
    /// Turn the gun left by `magnitude` degrees
    TurnGunLeft,
    /// Turn the gun right by `magnitude` degrees
    TurnGunRight,
    /// Fire a bullet of power `magnitude`
    Fire,
    /// Rotate the radar left by `magnitude` degrees
    RotateRadarLeft,
    /// Rotate the radar right by `magnitude` degrees
    RotateRadarRight,
    /// Idle for the tick
    DoNothing,
}

/// Metadata attached to one action index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSpec {
    /// Stable, human-readable name
    pub name: String,
    /// Engine command to emit
    pub command: EngineCommand,
    /// Command argument (distance, degrees or bullet power)
    pub magnitude: f64,
    /// Reward weight when this action fires; `None` for non-fire actions
    pub fire_weight: Option<f64>,
}

impl ActionSpec {
    fn new(name: &str, command: EngineCommand, magnitude: f64) -> Self {
        let fire_weight = (command == EngineCommand::Fire).then_some(magnitude);
        Self {
            name: name.to_string(),
            command,
            magnitude,
            fire_weight,
        }
    }

    /// Whether the action fires the gun
    #[must_use]
    pub fn is_fire(&self) -> bool {
        self.fire_weight.is_some()
    }
}

/// Static, total lookup from action index to [`ActionSpec`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionTable {
    specs: Vec<ActionSpec>,
}

impl ActionTable {
    /// Build a table from explicit specs
    pub fn new(specs: Vec<ActionSpec>) -> Result<Self> {
        if specs.is_empty() {
            return Err(RLError::config("action table must not be empty"));
        }
        Ok(Self { specs })
    }

    /// The 28-action maneuver set: three magnitudes for every movement, turn,
    /// gun, fire and radar command, plus an idle action.
    #[must_use]
    pub fn standard() -> Self {
        use EngineCommand::*;

        const DISTANCES: [(&str, f64); 3] = [("SMALL", 25.0), ("MEDIUM", 50.0), ("LARGE", 100.0)];
        const ANGLES: [(&str, f64); 3] = [("SMALL", 5.0), ("MEDIUM", 15.0), ("LARGE", 45.0)];
        const POWERS: [(&str, f64); 3] = [("SMALL", 0.1), ("MEDIUM", 1.0), ("LARGE", 3.0)];

        let groups: [(&str, EngineCommand, &[(&str, f64); 3]); 9] = [
            ("MOVE_FORWARD", MoveForward, &DISTANCES),
            ("MOVE_BACKWARD", MoveBackward, &DISTANCES),
            ("TURN_LEFT", TurnLeft, &ANGLES),
            ("TURN_RIGHT", TurnRight, &ANGLES),
            ("TURN_GUN_LEFT", TurnGunLeft, &ANGLES),
            ("TURN_GUN_RIGHT", TurnGunRight, &ANGLES),
            ("FIRE", Fire, &POWERS),
            ("ROTATE_RADAR_LEFT", RotateRadarLeft, &ANGLES),
            ("ROTATE_RADAR_RIGHT", RotateRadarRight, &ANGLES),
        ];

        let mut specs = Vec::with_capacity(28);
        for (prefix, command, sizes) in groups {
            for (size, magnitude) in sizes {
                specs.push(ActionSpec::new(&format!("{prefix}_{size}"), command, *magnitude));
            }
        }
        specs.push(ActionSpec::new("DO_NOTHING", DoNothing, 0.0));

        Self { specs }
    }

    /// Number of actions
    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Always false; construction rejects empty tables
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Look up an action; out-of-range indices are an error, never clamped
    pub fn get(&self, index: usize) -> Result<&ActionSpec> {
        self.specs.get(index).ok_or(RLError::InvalidAction {
            index,
            count: self.specs.len(),
        })
    }

    /// Engine command and magnitude for an action index
    pub fn command(&self, index: usize) -> Result<(EngineCommand, f64)> {
        let spec = self.get(index)?;
        Ok((spec.command, spec.magnitude))
    }

    /// Iterate over all specs in index order
    pub fn iter(&self) -> impl Iterator<Item = &ActionSpec> {
        self.specs.iter()
    }
}

impl Default for ActionTable {
    fn default() -> Self {
        Self::standard()
    }
}
