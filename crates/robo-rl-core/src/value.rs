//! Action-value functions

use crate::{RLError, Result};

/// Action value function Q(s, ·) over a fixed discrete action set
pub trait ActionValueFunction: Send + Sync {
    /// Length of the feature vectors this function accepts
    fn input_dim(&self) -> usize;

    /// Number of actions, i.e. the length of every Q-value vector
    fn num_actions(&self) -> usize;

    /// Q-values for every action
    fn q_values(&self, features: &[f32]) -> Result<Vec<f32>>;

    /// Greedy action and its value; ties go to the lowest index
    fn best_action_value(&self, features: &[f32]) -> Result<(usize, f32)> {
        let q = self.q_values(features)?;
        argmax(&q).ok_or_else(|| RLError::Computation("empty Q-value vector".into()))
    }
}

/// Index and value of the largest element, first occurrence on ties
///
/// NaN entries never win. Returns `None` for an empty slice or one with only NaNs.
#[must_use]
pub fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argmax_prefers_first_on_ties() {
        assert_eq!(argmax(&[1.0, 3.0, 3.0, 2.0]), Some((1, 3.0)));
        assert_eq!(argmax(&[-5.0, -5.0]), Some((0, -5.0)));
    }

    #[test]
    fn argmax_skips_nan() {
        assert_eq!(argmax(&[f32::NAN, -1.0, f32::NAN]), Some((1, -1.0)));
        assert_eq!(argmax(&[]), None);
        assert_eq!(argmax(&[f32::NAN]), None);
    }
}
