//! Reward signals and reward functions

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Reward signal fed to the learner
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Reward(pub f64);

/// Named reward components, kept in insertion order for stable logs
///
/// The total is always derived from the components, so there is no way for a
/// term to contribute to the reward without showing up here.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RewardBreakdown {
    components: IndexMap<String, f64>,
}

impl RewardBreakdown {
    /// Breakdown with every listed component present and zero
    #[must_use]
    pub fn zeroed(names: &[&str]) -> Self {
        Self {
            components: names.iter().map(|n| ((*n).to_string(), 0.0)).collect(),
        }
    }

    /// Add `value` to a component, creating it if needed
    pub fn add(&mut self, name: &str, value: f64) {
        *self.components.entry(name.to_string()).or_insert(0.0) += value;
    }

    /// Overwrite a component
    pub fn set(&mut self, name: &str, value: f64) {
        self.components.insert(name.to_string(), value);
    }

    /// Component value; absent components read as zero
    #[must_use]
    pub fn get(&self, name: &str) -> f64 {
        self.components.get(name).copied().unwrap_or(0.0)
    }

    /// Whether a component is tracked at all
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.components.contains_key(name)
    }

    /// Exact sum of all components
    #[must_use]
    pub fn total(&self) -> Reward {
        Reward(self.components.values().sum())
    }

    /// Iterate components in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.components.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Number of components
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether no component is tracked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl std::fmt::Display for RewardBreakdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (name, value) in self.iter() {
            write!(f, "{name}: {value:.2}, ")?;
        }
        write!(f, "total: {:.2}", self.total().0)
    }
}

/// Trait for reward functions
pub trait RewardFunction: Send + Sync {
    /// State type
    type State;
    /// Action type
    type Action;

    /// Score a state-action-next_state transition, component by component
    fn breakdown(
        &self,
        state: &Self::State,
        action: &Self::Action,
        next_state: &Self::State,
    ) -> RewardBreakdown;

    /// Scalar reward for a transition
    fn reward(
        &self,
        state: &Self::State,
        action: &Self::Action,
        next_state: &Self::State,
    ) -> Reward {
        self.breakdown(state, action, next_state).total()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn total_is_sum_of_components() {
        let mut b = RewardBreakdown::zeroed(&["step", "aim"]);
        b.add("step", -0.1);
        b.add("aim", 2.5);
        b.add("aim", 0.5);
        b.add("extra", 1.0);
        assert_eq!(b.len(), 3);
        assert_relative_eq!(b.total().0, 3.9);
        assert_relative_eq!(b.get("aim"), 3.0);
        assert_relative_eq!(b.get("missing"), 0.0);
    }

    #[test]
    fn display_lists_components_in_order() {
        let mut b = RewardBreakdown::default();
        b.set("a", 1.0);
        b.set("b", -2.0);
        assert_eq!(b.to_string(), "a: 1.00, b: -2.00, total: -1.00");
    }
}
