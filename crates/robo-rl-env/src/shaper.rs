//! Reward shaping for the duel
//!
//! Every tick is scored as a named [`RewardBreakdown`]; the scalar reward is
//! always the sum of its components.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use robo_rl_core::geometry::{aim_tolerance, bearing_from_gun};
use robo_rl_core::{ActionTable, GameEvent, Observation, RLError, Result, RewardBreakdown, RewardFunction};

use crate::episode::RoundOutcome;

/// Flat per-tick cost
pub const STEP_PENALTY: &str = "step_penalty";
/// Gun rotation toward or away from the enemy
pub const GUN_TURN: &str = "gun_turn";
/// Margin bonus while the gun is on target
pub const AIM_ACCURACY: &str = "aim_accuracy";
/// Fired while on target
pub const FIRING_ACCURACY: &str = "firing_accuracy";
/// Bullet-power bonus for an on-target shot
pub const FIRING_POWER: &str = "firing_power";
/// Fired while off target
pub const FIRING_PENALTY: &str = "firing_penalty";
/// Damage taken
pub const HIT_BY_BULLET: &str = "hit_by_bullet";
/// Damage dealt
pub const BULLET_HIT: &str = "bullet_hit";
/// Wall collisions
pub const HIT_WALL: &str = "hit_wall";
/// Wasted bullets
pub const BULLET_MISSED: &str = "bullet_missed";
/// Robot collisions
pub const COLLISION: &str = "collision";
/// Round result, terminal transitions only
pub const OUTCOME: &str = "outcome";

const COMPONENTS: [&str; 11] = [
    STEP_PENALTY,
    GUN_TURN,
    AIM_ACCURACY,
    FIRING_ACCURACY,
    FIRING_POWER,
    FIRING_PENALTY,
    HIT_BY_BULLET,
    BULLET_HIT,
    HIT_WALL,
    BULLET_MISSED,
    COLLISION,
];

/// Shaping scales; penalties are given as positive magnitudes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapingConfig {
    /// Subtracted every tick
    pub step_penalty: f64,
    /// Per unit of incoming bullet power
    pub damage_taken_scale: f64,
    /// Per unit of outgoing bullet power that hit
    pub damage_dealt_scale: f64,
    /// Per wall collision
    pub wall_hit_penalty: f64,
    /// Per unit of power of a bullet that missed
    pub bullet_miss_penalty: f64,
    /// Per robot collision, doubled when at fault
    pub collision_penalty: f64,
    /// Per degree of aim-error reduction
    pub gun_turn_improvement_scale: f64,
    /// Per degree of aim-error growth; must exceed the improvement scale
    pub gun_turn_penalty_scale: f64,
    /// Charged when aim error is unchanged and outside tolerance
    pub stagnation_penalty: f64,
    /// Flat bonus for holding aim, and per-degree margin bonus within tolerance
    pub accuracy_reward_scale: f64,
    /// Bonus for firing on target
    pub firing_accuracy_reward: f64,
    /// Multiplies the fire action's power weight for on-target shots
    pub firing_power_reward_scale: f64,
    /// Charged for firing off target
    pub firing_penalty: f64,
    /// Robot width in pixels, for the aim tolerance
    pub robot_size: f64,
    /// Terminal reward for a win
    pub win_reward: f64,
    /// Terminal reward for a loss
    pub loss_reward: f64,
    /// Terminal reward for any other ending
    pub other_outcome_reward: f64,
}

impl Default for ShapingConfig {
    fn default() -> Self {
        Self {
            step_penalty: 0.1,
            damage_taken_scale: 7.0,
            damage_dealt_scale: 15.0,
            wall_hit_penalty: 10.0,
            bullet_miss_penalty: 5.0,
            collision_penalty: 5.0,
            gun_turn_improvement_scale: 0.1,
            gun_turn_penalty_scale: 0.15,
            stagnation_penalty: 0.75,
            accuracy_reward_scale: 5.0,
            firing_accuracy_reward: 10.0,
            firing_power_reward_scale: 5.0,
            firing_penalty: 2.0,
            robot_size: 36.0,
            win_reward: 2000.0,
            loss_reward: -1000.0,
            other_outcome_reward: 0.0,
        }
    }
}

impl ShapingConfig {
    /// Check scale relationships
    pub fn validate(&self) -> Result<()> {
        if self.gun_turn_penalty_scale <= self.gun_turn_improvement_scale {
            return Err(RLError::config(format!(
                "gun_turn_penalty_scale ({}) must exceed gun_turn_improvement_scale ({})",
                self.gun_turn_penalty_scale, self.gun_turn_improvement_scale
            )));
        }
        if !(self.robot_size > 0.0) {
            return Err(RLError::config(format!(
                "robot_size must be positive, got {}",
                self.robot_size
            )));
        }
        Ok(())
    }

    /// Terminal adjustment for a round result
    #[must_use]
    pub fn outcome_reward(&self, outcome: RoundOutcome) -> f64 {
        match outcome {
            RoundOutcome::Win => self.win_reward,
            RoundOutcome::Loss => self.loss_reward,
            RoundOutcome::Other => self.other_outcome_reward,
        }
    }
}

/// Scores `(previous observation, action, current observation)` triples
#[derive(Debug, Clone)]
pub struct RewardShaper {
    config: ShapingConfig,
    actions: ActionTable,
}

impl RewardShaper {
    /// Create a shaper over the given action table
    pub fn new(config: ShapingConfig, actions: ActionTable) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, actions })
    }

    /// Shaping configuration
    #[must_use]
    pub fn config(&self) -> &ShapingConfig {
        &self.config
    }

    /// Action table used to recognize fire actions
    #[must_use]
    pub fn actions(&self) -> &ActionTable {
        &self.actions
    }

    /// All-zero breakdown with every component present
    #[must_use]
    pub fn empty_breakdown() -> RewardBreakdown {
        RewardBreakdown::zeroed(&COMPONENTS)
    }

    /// Score the action taken after `previous`, given what `current` shows
    ///
    /// Events are read from `previous`: they were raised while the previous
    /// action played out. Any missing input yields an all-zero breakdown.
    #[must_use]
    pub fn shape(
        &self,
        previous: Option<&Observation>,
        action: Option<usize>,
        current: Option<&Observation>,
    ) -> RewardBreakdown {
        let mut breakdown = Self::empty_breakdown();
        let (Some(previous), Some(action), Some(current)) = (previous, action, current) else {
            return breakdown;
        };
        let c = &self.config;

        breakdown.set(STEP_PENALTY, -c.step_penalty);

        let previous_bearing = gun_bearing(previous);
        let current_bearing = gun_bearing(current);
        if let (Some(previous_bearing), Some(current_bearing), Some(enemy)) =
            (previous_bearing, current_bearing, current.visible_enemy())
        {
            let tolerance = aim_tolerance(c.robot_size, enemy.distance);
            let (turn, accuracy) = self.aim_reward(previous_bearing.abs(), current_bearing.abs(), tolerance);
            breakdown.set(GUN_TURN, turn);
            breakdown.set(AIM_ACCURACY, accuracy);
            self.firing_reward(&mut breakdown, action, current_bearing.abs(), tolerance);
        }

        for event in &previous.events {
            match event {
                GameEvent::HitByBullet { power, .. } => {
                    breakdown.add(HIT_BY_BULLET, -c.damage_taken_scale * power);
                }
                GameEvent::BulletHit { power, .. } => {
                    breakdown.add(BULLET_HIT, c.damage_dealt_scale * power);
                }
                GameEvent::HitWall { .. } => breakdown.add(HIT_WALL, -c.wall_hit_penalty),
                GameEvent::BulletMissed { power } => {
                    breakdown.add(BULLET_MISSED, -c.bullet_miss_penalty * power);
                }
                GameEvent::HitRobot { at_fault, .. } => {
                    let penalty = if *at_fault {
                        2.0 * c.collision_penalty
                    } else {
                        c.collision_penalty
                    };
                    breakdown.add(COLLISION, -penalty);
                }
                GameEvent::BulletHitBullet { .. } | GameEvent::RobotDeath { .. } | GameEvent::Unknown => {
                    warn!(kind = event.kind(), "event not scored");
                }
            }
        }

        debug!(target: "reward_breakdown", "{breakdown}");
        breakdown
    }

    /// Gun-turn component and on-target margin bonus
    fn aim_reward(&self, previous_error: f64, current_error: f64, tolerance: f64) -> (f64, f64) {
        let c = &self.config;
        let on_target = current_error <= tolerance;
        let improvement = previous_error - current_error;

        let turn = if improvement > 0.0 {
            improvement * c.gun_turn_improvement_scale
        } else if improvement < 0.0 {
            improvement * c.gun_turn_penalty_scale
        } else if on_target {
            c.accuracy_reward_scale
        } else {
            -c.stagnation_penalty
        };
        let accuracy = if on_target {
            (tolerance - current_error) * c.accuracy_reward_scale
        } else {
            0.0
        };
        (turn, accuracy)
    }

    fn firing_reward(&self, breakdown: &mut RewardBreakdown, action: usize, aim_error: f64, tolerance: f64) {
        let spec = match self.actions.get(action) {
            Ok(spec) => spec,
            Err(e) => {
                warn!(action, error = %e, "cannot score firing for unknown action");
                return;
            }
        };
        let Some(weight) = spec.fire_weight else {
            return;
        };
        let c = &self.config;
        if aim_error <= tolerance {
            breakdown.set(FIRING_ACCURACY, c.firing_accuracy_reward);
            breakdown.set(FIRING_POWER, c.firing_power_reward_scale * weight);
        } else {
            breakdown.set(FIRING_PENALTY, -c.firing_penalty);
        }
    }
}

impl RewardFunction for RewardShaper {
    type State = Observation;
    type Action = usize;

    fn breakdown(&self, state: &Observation, action: &usize, next_state: &Observation) -> RewardBreakdown {
        self.shape(Some(state), Some(*action), Some(next_state))
    }
}

/// Signed angle from the gun to the enemy, if the enemy's bearing is known
fn gun_bearing(observation: &Observation) -> Option<f64> {
    let enemy = observation.visible_enemy()?;
    let robot = &observation.robot;
    Some(bearing_from_gun(robot.heading, enemy.bearing, robot.gun_heading))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use robo_rl_core::{EnemySnapshot, RobotState, MISSING_BEARING};

    const FIRE_LARGE: usize = 20;
    const DO_NOTHING: usize = 27;

    fn shaper() -> RewardShaper {
        RewardShaper::new(ShapingConfig::default(), ActionTable::standard()).unwrap()
    }

    /// Robot facing north with the enemy 30 degrees to the right, 200px away
    fn obs(gun_heading: f64, events: Vec<GameEvent>) -> Observation {
        let robot = RobotState {
            x: 400.0,
            y: 300.0,
            gun_heading,
            energy: 100.0,
            battlefield_width: 800.0,
            battlefield_height: 600.0,
            ..RobotState::default()
        };
        let enemy = EnemySnapshot {
            bearing: 30.0,
            distance: 200.0,
            energy: 100.0,
            ..EnemySnapshot::default()
        };
        Observation::new(robot, Some(enemy), events)
    }

    fn blind(events: Vec<GameEvent>) -> Observation {
        let mut o = obs(0.0, events);
        o.enemy = None;
        o
    }

    #[test]
    fn missing_inputs_score_zero() {
        let s = shaper();
        let o = obs(0.0, Vec::new());
        for b in [
            s.shape(None, Some(0), Some(&o)),
            s.shape(Some(&o), None, Some(&o)),
            s.shape(Some(&o), Some(0), None),
        ] {
            assert_eq!(b.len(), COMPONENTS.len());
            assert!(b.iter().all(|(_, v)| v == 0.0));
        }
    }

    #[test]
    fn step_penalty_always_applies() {
        let b = shaper().shape(Some(&blind(Vec::new())), Some(DO_NOTHING), Some(&blind(Vec::new())));
        assert_relative_eq!(b.get(STEP_PENALTY), -0.1);
        assert_relative_eq!(b.total().0, -0.1);
    }

    #[test]
    fn closing_aim_error_is_rewarded_every_tick() {
        let s = shaper();
        // Aim error 30, 20, 12, 6 degrees.
        let ticks: Vec<_> = [0.0, 10.0, 18.0, 24.0].iter().map(|&g| obs(g, Vec::new())).collect();
        for pair in ticks.windows(2) {
            let b = s.shape(Some(&pair[0]), Some(DO_NOTHING), Some(&pair[1]));
            assert!(b.get(GUN_TURN) > 0.0, "{b}");
        }
        let b = s.shape(Some(&ticks[0]), Some(DO_NOTHING), Some(&ticks[1]));
        assert_relative_eq!(b.get(GUN_TURN), 10.0 * 0.1, epsilon = 1e-9);
    }

    #[test]
    fn widening_aim_error_costs_more_than_closing_earns() {
        let s = shaper();
        let b = s.shape(Some(&obs(10.0, Vec::new())), Some(DO_NOTHING), Some(&obs(0.0, Vec::new())));
        assert_relative_eq!(b.get(GUN_TURN), -10.0 * 0.15, epsilon = 1e-9);
    }

    #[test]
    fn holding_aim_depends_on_tolerance() {
        let s = shaper();
        let tolerance = aim_tolerance(36.0, 200.0);

        let on = obs(29.0, Vec::new());
        let b = s.shape(Some(&on), Some(DO_NOTHING), Some(&on));
        assert_relative_eq!(b.get(GUN_TURN), 5.0);
        assert_relative_eq!(b.get(AIM_ACCURACY), (tolerance - 1.0) * 5.0, epsilon = 1e-9);

        let off = obs(0.0, Vec::new());
        let b = s.shape(Some(&off), Some(DO_NOTHING), Some(&off));
        assert_relative_eq!(b.get(GUN_TURN), -0.75);
        assert_relative_eq!(b.get(AIM_ACCURACY), 0.0);
    }

    #[test]
    fn firing_off_target_is_penalized() {
        let s = shaper();
        let b = s.shape(Some(&obs(0.0, Vec::new())), Some(FIRE_LARGE), Some(&obs(5.0, Vec::new())));
        assert_relative_eq!(b.get(FIRING_PENALTY), -2.0);
        assert_relative_eq!(b.get(FIRING_ACCURACY), 0.0);
        assert_relative_eq!(b.get(FIRING_POWER), 0.0);
    }

    #[test]
    fn firing_on_target_scales_with_power() {
        let s = shaper();
        let b = s.shape(Some(&obs(25.0, Vec::new())), Some(FIRE_LARGE), Some(&obs(30.0, Vec::new())));
        assert_relative_eq!(b.get(FIRING_ACCURACY), 10.0);
        assert_relative_eq!(b.get(FIRING_POWER), 15.0);
        assert_relative_eq!(b.get(FIRING_PENALTY), 0.0);

        let fire_small = 18;
        let b = s.shape(Some(&obs(25.0, Vec::new())), Some(fire_small), Some(&obs(30.0, Vec::new())));
        assert_relative_eq!(b.get(FIRING_POWER), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn no_aim_or_firing_terms_without_bearing() {
        let s = shaper();
        let mut hidden = obs(30.0, Vec::new());
        if let Some(enemy) = hidden.enemy.as_mut() {
            enemy.bearing = MISSING_BEARING;
        }
        let b = s.shape(Some(&obs(25.0, Vec::new())), Some(FIRE_LARGE), Some(&hidden));
        for name in [GUN_TURN, AIM_ACCURACY, FIRING_ACCURACY, FIRING_POWER, FIRING_PENALTY] {
            assert_relative_eq!(b.get(name), 0.0);
        }
    }

    #[test]
    fn events_come_from_previous_tick() {
        let s = shaper();
        let events = vec![
            GameEvent::HitByBullet { power: 2.0, bearing: 0.0 },
            GameEvent::BulletHit { power: 3.0, enemy_energy: 50.0 },
            GameEvent::HitWall { bearing: 90.0 },
            GameEvent::BulletMissed { power: 1.0 },
            GameEvent::HitRobot { bearing: 0.0, energy: 80.0, at_fault: true },
            GameEvent::HitRobot { bearing: 0.0, energy: 80.0, at_fault: false },
            GameEvent::RobotDeath { name: "sitting_duck".into() },
            GameEvent::Unknown,
        ];
        let b = s.shape(Some(&blind(events.clone())), Some(DO_NOTHING), Some(&blind(Vec::new())));
        assert_relative_eq!(b.get(HIT_BY_BULLET), -14.0);
        assert_relative_eq!(b.get(BULLET_HIT), 45.0);
        assert_relative_eq!(b.get(HIT_WALL), -10.0);
        assert_relative_eq!(b.get(BULLET_MISSED), -5.0);
        assert_relative_eq!(b.get(COLLISION), -15.0);

        let b = s.shape(Some(&blind(Vec::new())), Some(DO_NOTHING), Some(&blind(events)));
        assert_relative_eq!(b.total().0, -0.1);
    }

    #[test]
    fn rejects_penalty_scale_below_improvement() {
        let config = ShapingConfig {
            gun_turn_penalty_scale: 0.1,
            ..ShapingConfig::default()
        };
        assert!(RewardShaper::new(config, ActionTable::standard()).is_err());
    }

    #[test]
    fn outcome_rewards_follow_config() {
        let c = ShapingConfig::default();
        assert_relative_eq!(c.outcome_reward(RoundOutcome::Win), 2000.0);
        assert_relative_eq!(c.outcome_reward(RoundOutcome::Loss), -1000.0);
        assert_relative_eq!(c.outcome_reward(RoundOutcome::Other), 0.0);
    }

    proptest! {
        #[test]
        fn total_is_exact_sum(
            g0 in 0.0f64..360.0,
            g1 in 0.0f64..360.0,
            action in 0usize..28,
            power in 0.1f64..3.0,
            at_fault in any::<bool>(),
        ) {
            let s = shaper();
            let events = vec![
                GameEvent::HitByBullet { power, bearing: 0.0 },
                GameEvent::HitRobot { bearing: 0.0, energy: 10.0, at_fault },
            ];
            let b = s.shape(Some(&obs(g0, events)), Some(action), Some(&obs(g1, Vec::new())));
            let sum: f64 = b.iter().map(|(_, v)| v).sum();
            prop_assert_eq!(b.total().0, sum);
            prop_assert_eq!(s.reward(&obs(g0, Vec::new()), &action, &obs(g1, Vec::new())).0,
                s.breakdown(&obs(g0, Vec::new()), &action, &obs(g1, Vec::new())).total().0);
        }
    }
}
