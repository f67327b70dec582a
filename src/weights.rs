//! Rule weights.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::WeightConfig;
use crate::rules::{RuleId, RuleSet};

/// Non-negative weight per rule.
///
/// The key set is fixed when the vector is built from a rule set; weights
/// are changed in place and never drop below the floor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightVector {
    weights: BTreeMap<RuleId, f64>,
    floor: f64,
}

impl WeightVector {
    /// Initial weights for a rule set: the rule's profile importance when
    /// enabled and present, otherwise `config.initial_weight`.
    #[must_use]
    pub fn initial(rules: &RuleSet, config: &WeightConfig) -> Self {
        let weights = rules
            .iter()
            .map(|rule| {
                let weight = match rule.importance {
                    Some(importance) if config.use_profile_importance => importance,
                    _ => config.initial_weight,
                };
                (rule.id.clone(), weight.max(config.floor))
            })
            .collect();
        Self {
            weights,
            floor: config.floor,
        }
    }

    /// Equal weights with a zero floor.
    #[must_use]
    pub fn uniform(rules: &RuleSet, weight: f64) -> Self {
        Self::initial(
            rules,
            &WeightConfig {
                initial_weight: weight,
                floor: 0.0,
                use_profile_importance: false,
            },
        )
    }

    /// Weight of a rule; 0 for rules outside this vector.
    #[must_use]
    pub fn get(&self, id: &RuleId) -> f64 {
        self.weights.get(id).copied().unwrap_or(0.0)
    }

    /// Sets a rule's weight, clamped to the floor.
    ///
    /// Returns the stored value, or `None` if the rule is not part of this vector.
    pub fn set(&mut self, id: &RuleId, weight: f64) -> Option<f64> {
        let floor = self.floor;
        let slot = self.weights.get_mut(id)?;
        *slot = if weight.is_nan() { floor } else { weight.max(floor) };
        Some(*slot)
    }

    /// Lower bound of every weight.
    #[must_use]
    pub const fn floor(&self) -> f64 {
        self.floor
    }

    /// Sum of all weights.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.weights.values().sum()
    }

    /// Weights by rule id.
    pub fn iter(&self) -> impl Iterator<Item = (&RuleId, f64)> {
        self.weights.iter().map(|(id, w)| (id, *w))
    }

    /// Number of weighted rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    /// True if there are no weights.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{OpenDomain, Preference, Profile};
    use crate::relation::Relation;

    fn rules() -> RuleSet {
        let profile = Profile::builder()
            .set(Relation::Genre, Preference::any_of(["rock"]))
            .set(Relation::Loudness, Preference::between(-15.0, -5.0))
            .importance(Relation::Genre, 3.0)
            .build(&OpenDomain)
            .unwrap();
        RuleSet::from_profile(&profile)
    }

    #[test]
    fn test_profile_importance_seeds_weight() {
        let weights = WeightVector::initial(&rules(), &WeightConfig::default());
        assert_eq!(weights.get(&RuleId::from("genre.intersects")), 3.0);
        assert_eq!(weights.get(&RuleId::from("loudness.in_range")), 1.0);
        assert_eq!(weights.total(), 4.0);
    }

    #[test]
    fn test_importance_ignored_when_disabled() {
        let config = WeightConfig {
            use_profile_importance: false,
            ..WeightConfig::default()
        };
        let weights = WeightVector::initial(&rules(), &config);
        assert!(weights.iter().all(|(_, w)| w == 1.0));
    }

    #[test]
    fn test_set_clamps_to_floor() {
        let config = WeightConfig {
            floor: 0.25,
            ..WeightConfig::default()
        };
        let mut weights = WeightVector::initial(&rules(), &config);
        let id = RuleId::from("loudness.in_range");
        assert_eq!(weights.set(&id, -3.0), Some(0.25));
        assert_eq!(weights.set(&id, f64::NAN), Some(0.25));
        assert_eq!(weights.set(&id, 2.0), Some(2.0));
    }

    #[test]
    fn test_unknown_rule() {
        let mut weights = WeightVector::uniform(&rules(), 1.0);
        let id = RuleId::from("mood.intersects");
        assert_eq!(weights.get(&id), 0.0);
        assert_eq!(weights.set(&id, 1.0), None);
        assert_eq!(weights.len(), 2);
    }
}
