//! Hill-climbing weight refinement.
//!
//! One call is one step: each rule's weight moves by `alpha` times the gap
//! between the mean rating of rated entities the rule is satisfied by and
//! the mean rating of all rated entities. Repeated calls across batches do
//! the climbing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::RefinerConfig;
use crate::error::ValidationError;
use crate::ledger::RatingLedger;
use crate::rules::{RuleId, RuleSet};
use crate::storage::FactStore;
use crate::weights::WeightVector;

/// What a refinement call did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefinementOutcome {
    /// Weights updated; `deltas` holds the applied change per rule that had signal.
    Applied { deltas: BTreeMap<RuleId, f64> },
    /// Too little signal; weights returned unchanged.
    Skipped { distinct_ratings: usize },
}

impl RefinementOutcome {
    /// True if weights were updated.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Applies refinement steps with a fixed configuration.
#[derive(Debug, Clone)]
pub struct WeightRefiner {
    config: RefinerConfig,
}

impl WeightRefiner {
    /// # Errors
    /// If the configuration does not validate.
    pub fn new(config: RefinerConfig) -> Result<Self, ValidationError> {
        Ok(Self {
            config: config.validate()?,
        })
    }

    /// The validated configuration.
    #[must_use]
    pub const fn config(&self) -> &RefinerConfig {
        &self.config
    }

    /// Computes updated weights from the ratings collected so far.
    ///
    /// Rules no rated entity satisfies keep their weight. With fewer than
    /// two distinct rating values the input weights come back unchanged.
    #[must_use]
    pub fn refine(
        &self,
        weights: &WeightVector,
        rules: &RuleSet,
        ledger: &RatingLedger,
        store: &FactStore,
    ) -> (WeightVector, RefinementOutcome) {
        let distinct_ratings = ledger.distinct_values();
        let Some(overall) = ledger.mean().filter(|_| distinct_ratings >= 2) else {
            debug!(distinct_ratings, "refinement skipped");
            return (weights.clone(), RefinementOutcome::Skipped { distinct_ratings });
        };

        let mut updated = weights.clone();
        let mut deltas = BTreeMap::new();
        for rule in rules {
            let satisfying = rule.matching(store);
            let (sum, count) = ledger
                .iter()
                .filter(|entry| satisfying.contains(&entry.entity))
                .fold((0.0, 0usize), |(sum, count), entry| (sum + entry.rating.value(), count + 1));
            if count == 0 {
                continue;
            }
            #[allow(clippy::cast_precision_loss)]
            let satisfied = sum / count as f64;
            let before = weights.get(&rule.id);
            let target = (before + self.config.alpha * (satisfied - overall)).max(self.config.floor);
            if let Some(after) = updated.set(&rule.id, target) {
                deltas.insert(rule.id.clone(), after - before);
            }
        }

        info!(
            ratings = ledger.len(),
            rules_updated = deltas.len(),
            mean_rating = overall,
            "weights refined"
        );
        (updated, RefinementOutcome::Applied { deltas })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Rating;
    use crate::profile::{OpenDomain, Preference, Profile};
    use crate::relation::Relation;
    use crate::storage::FactRecord;
    use crate::value::FactValue;

    fn store() -> FactStore {
        FactStore::from_records(vec![
            FactRecord::new(Relation::Genre, "a", FactValue::categories(["rock", "pop"])),
            FactRecord::new(Relation::Loudness, "a", -8.0),
            FactRecord::new(Relation::Genre, "b", FactValue::categories(["jazz"])),
            FactRecord::new(Relation::Loudness, "b", -20.0),
            FactRecord::new(Relation::Genre, "c", FactValue::categories(["rock"])),
            FactRecord::new(Relation::Loudness, "c", -30.0),
        ])
        .unwrap()
    }

    fn rules() -> RuleSet {
        let profile = Profile::builder()
            .set(Relation::Genre, Preference::any_of(["rock"]))
            .set(Relation::Loudness, Preference::between(-15.0, -5.0))
            .set(Relation::Mood, Preference::any_of(["happy"]))
            .build(&OpenDomain)
            .unwrap();
        RuleSet::from_profile(&profile)
    }

    fn refiner(alpha: f64, floor: f64) -> WeightRefiner {
        WeightRefiner::new(RefinerConfig { alpha, floor }).unwrap()
    }

    #[test]
    fn test_liked_rule_gains_weight() {
        let (store, rules) = (store(), rules());
        let weights = WeightVector::uniform(&rules, 1.0);
        let mut ledger = RatingLedger::new();
        ledger.record("a".into(), Rating::Like);
        ledger.record("b".into(), Rating::Dislike);

        let (updated, outcome) = refiner(0.1, 0.0).refine(&weights, &rules, &ledger, &store);
        let genre = RuleId::from("genre.intersects");
        assert!(updated.get(&genre) > weights.get(&genre));
        assert!((updated.get(&genre) - 1.1).abs() < 1e-12);
        assert!(outcome.is_applied());
    }

    #[test]
    fn test_unsatisfied_rule_unchanged() {
        let (store, rules) = (store(), rules());
        let weights = WeightVector::uniform(&rules, 1.0);
        let mut ledger = RatingLedger::new();
        ledger.record("a".into(), Rating::Like);
        ledger.record("b".into(), Rating::Dislike);

        let (updated, outcome) = refiner(0.1, 0.0).refine(&weights, &rules, &ledger, &store);
        let mood = RuleId::from("mood.intersects");
        assert_eq!(updated.get(&mood), 1.0);
        let RefinementOutcome::Applied { deltas } = outcome else {
            panic!("expected an applied refinement");
        };
        assert!(!deltas.contains_key(&mood));
    }

    #[test]
    fn test_mixed_signal() {
        let (store, rules) = (store(), rules());
        let weights = WeightVector::uniform(&rules, 1.0);
        let mut ledger = RatingLedger::new();
        ledger.record("a".into(), Rating::Like);
        ledger.record("c".into(), Rating::Dislike);

        // Genre: both rated satisfy it, no gap. Loudness: only the liked one.
        let (updated, _) = refiner(0.5, 0.0).refine(&weights, &rules, &ledger, &store);
        assert!((updated.get(&RuleId::from("genre.intersects")) - 1.0).abs() < 1e-12);
        assert!((updated.get(&RuleId::from("loudness.in_range")) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_partial_credit_counts_as_satisfied() {
        let store = store();
        let profile = Profile::builder()
            .set(Relation::Genre, Preference::any_of(["pop", "metal"]))
            .build(&OpenDomain)
            .unwrap();
        let rules = RuleSet::from_profile(&profile);
        let weights = WeightVector::uniform(&rules, 1.0);
        let mut ledger = RatingLedger::new();
        ledger.record("a".into(), Rating::Like);
        ledger.record("b".into(), Rating::Dislike);

        // "a" carries pop but not metal, so it still counts for the rule.
        let (updated, _) = refiner(0.1, 0.0).refine(&weights, &rules, &ledger, &store);
        assert!((updated.get(&RuleId::from("genre.intersects")) - 1.1).abs() < 1e-12);
    }

    #[test]
    fn test_single_rating_value_is_noop() {
        let (store, rules) = (store(), rules());
        let weights = WeightVector::uniform(&rules, 1.0);
        let mut ledger = RatingLedger::new();
        ledger.record("a".into(), Rating::Like);
        ledger.record("c".into(), Rating::Like);

        let (updated, outcome) = refiner(0.1, 0.0).refine(&weights, &rules, &ledger, &store);
        assert_eq!(updated, weights);
        assert_eq!(outcome, RefinementOutcome::Skipped { distinct_ratings: 1 });

        let (_, outcome) = refiner(0.1, 0.0).refine(&weights, &rules, &RatingLedger::new(), &store);
        assert_eq!(outcome, RefinementOutcome::Skipped { distinct_ratings: 0 });
    }

    #[test]
    fn test_weights_never_drop_below_floor() {
        let (store, rules) = (store(), rules());
        let mut weights = WeightVector::uniform(&rules, 0.3);
        let mut ledger = RatingLedger::new();
        ledger.record("a".into(), Rating::Dislike);
        ledger.record("b".into(), Rating::Like);
        ledger.record("c".into(), Rating::Neutral);

        let refiner = refiner(1.0, 0.2);
        for _ in 0..10 {
            weights = refiner.refine(&weights, &rules, &ledger, &store).0;
            assert!(weights.iter().all(|(_, w)| w >= 0.2));
        }
        assert_eq!(weights.get(&RuleId::from("loudness.in_range")), 0.2);
    }
}
