//! Weighted rule scoring.

use serde::{Deserialize, Serialize};

use crate::entity::EntityId;
use crate::rules::{RuleId, RuleSet};
use crate::storage::FactStore;
use crate::weights::WeightVector;

/// One entity with its score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredEntity {
    /// Scored entity.
    pub entity: EntityId,
    /// Weighted sum of its rule scores.
    pub score: f64,
}

/// What one rule added to an entity's score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleContribution {
    /// Contributing rule.
    pub rule: RuleId,
    /// Rule score in `[0, 1]`.
    pub rule_score: f64,
    /// Current weight of the rule.
    pub weight: f64,
    /// `weight * rule_score`.
    pub contribution: f64,
}

/// Combines rule scores with weights over a read-only store.
#[derive(Debug, Clone, Copy)]
pub struct Scorer<'a> {
    store: &'a FactStore,
    rules: &'a RuleSet,
    weights: &'a WeightVector,
}

impl<'a> Scorer<'a> {
    /// Binds a scorer to a store, rules and weights.
    #[must_use]
    pub const fn new(store: &'a FactStore, rules: &'a RuleSet, weights: &'a WeightVector) -> Self {
        Self {
            store,
            rules,
            weights,
        }
    }

    /// The store being scored against.
    #[must_use]
    pub const fn store(&self) -> &'a FactStore {
        self.store
    }

    /// Weighted sum of rule scores. Not normalized.
    #[must_use]
    pub fn score(&self, entity: &str) -> f64 {
        self.rules
            .iter()
            .map(|rule| rule.evaluate(self.store, entity) * self.weights.get(&rule.id))
            .sum()
    }

    /// Score divided by the total weight; 0 when every weight is 0.
    #[must_use]
    pub fn normalized_score(&self, entity: &str) -> f64 {
        let total = self.weights.total();
        if total > 0.0 {
            self.score(entity) / total
        } else {
            0.0
        }
    }

    /// Per-rule breakdown of [`Scorer::score`], in rule order.
    #[must_use]
    pub fn explain(&self, entity: &str) -> Vec<RuleContribution> {
        self.rules
            .iter()
            .map(|rule| {
                let rule_score = rule.evaluate(self.store, entity);
                let weight = self.weights.get(&rule.id);
                RuleContribution {
                    rule: rule.id.clone(),
                    rule_score,
                    weight,
                    contribution: rule_score * weight,
                }
            })
            .collect()
    }

    /// Scores every entity, highest first.
    ///
    /// The sort is stable: equal scores keep the order the caller supplied.
    pub fn score_all<'e, I>(&self, entities: I) -> Vec<ScoredEntity>
    where
        I: IntoIterator<Item = &'e EntityId>,
    {
        let mut scored: Vec<ScoredEntity> = entities
            .into_iter()
            .map(|entity| ScoredEntity {
                entity: entity.clone(),
                score: self.score(entity),
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored
    }
}
