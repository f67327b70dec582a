//! Adaptive batch selection.
//!
//! Before any rating exists the sampler either takes the top-scoring
//! entities or stratifies over one indexed relation so the first round
//! covers several buckets. Once ratings arrive it mixes two tiers of the
//! unrated entities:
//!
//! - exploit: the best-ranked `exploit_fraction` of them
//! - boundary: the `boundary_fraction` whose scores sit nearest the
//!   midpoint of the observed score range
//!
//! Entities are never presented twice. Equal ranks are ordered by a keyed
//! hash of the seed and the entity id.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{InitialPolicy, SamplerConfig};
use crate::entity::EntityId;
use crate::error::ValidationError;
use crate::ledger::RatingLedger;
use crate::relation::Relation;
use crate::scorer::{ScoredEntity, Scorer};

/// Which selection strategy applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplerPhase {
    /// No ratings yet.
    Initial,
    /// At least one rating recorded.
    Adaptive,
}

/// Entities chosen for presentation.
///
/// A batch may be smaller than requested when the corpus runs out; that
/// is how callers detect the end of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    /// Chosen entities, in presentation order.
    pub entities: Vec<EntityId>,
    /// Batch size asked for.
    pub requested: usize,
}

impl Batch {
    /// How many entities short of the request this batch is.
    #[must_use]
    pub fn shortfall(&self) -> usize {
        self.requested.saturating_sub(self.entities.len())
    }

    /// True when fewer entities remained than were requested.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.shortfall() > 0
    }

    /// Number of entities in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// True if nothing was left to present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Chooses batches for one session.
#[derive(Debug, Clone)]
pub struct Sampler {
    config: SamplerConfig,
    tiebreak_key: [u8; 32],
    presented: HashSet<EntityId>,
}

impl Sampler {
    /// # Errors
    /// If the configuration does not validate.
    pub fn new(config: SamplerConfig) -> Result<Self, ValidationError> {
        let config = config.validate()?;
        let mut tiebreak_key = [0u8; 32];
        tiebreak_key[..8].copy_from_slice(&config.seed.to_le_bytes());
        Ok(Self {
            config,
            tiebreak_key,
            presented: HashSet::new(),
        })
    }

    /// The validated configuration.
    #[must_use]
    pub const fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Phase implied by the ledger.
    #[must_use]
    pub fn phase(&self, ledger: &RatingLedger) -> SamplerPhase {
        if ledger.is_empty() {
            SamplerPhase::Initial
        } else {
            SamplerPhase::Adaptive
        }
    }

    /// Number of entities presented so far.
    #[must_use]
    pub fn presented(&self) -> usize {
        self.presented.len()
    }

    /// True if the entity was part of an earlier batch.
    #[must_use]
    pub fn was_presented(&self, entity: &str) -> bool {
        self.presented.contains(entity)
    }

    /// Unrated entities that have not been presented yet, in store order.
    fn candidates<'s>(&self, scorer: &Scorer<'s>, ledger: &RatingLedger) -> Vec<&'s EntityId> {
        scorer
            .store()
            .entities()
            .iter()
            .filter(|e| !ledger.contains(e) && !self.presented.contains(e.as_str()))
            .collect()
    }

    /// Picks the next batch and marks it presented.
    pub fn next_batch(&mut self, scorer: &Scorer<'_>, ledger: &RatingLedger) -> Batch {
        let requested = self.config.batch_size;
        let candidates = self.candidates(scorer, ledger);
        let ranked = self.rank(scorer, candidates);

        let entities = if ranked.len() <= requested {
            ranked.into_iter().map(|s| s.entity).collect()
        } else {
            match (self.phase(ledger), self.config.initial_policy) {
                (SamplerPhase::Initial, InitialPolicy::TopK) => {
                    ranked.into_iter().take(requested).map(|s| s.entity).collect()
                }
                (SamplerPhase::Initial, InitialPolicy::Stratified { relation }) => {
                    self.stratified(scorer, relation, &ranked)
                }
                (SamplerPhase::Adaptive, _) => self.adaptive(&ranked),
            }
        };

        self.presented.extend(entities.iter().cloned());
        let batch = Batch {
            entities,
            requested,
        };
        debug!(
            size = batch.len(),
            shortfall = batch.shortfall(),
            presented = self.presented.len(),
            "batch selected"
        );
        batch
    }

    fn tiebreak(&self, entity: &EntityId) -> u64 {
        let hash = blake3::keyed_hash(&self.tiebreak_key, entity.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(prefix)
    }

    /// Scores candidates, best first, equal scores in tiebreak order.
    fn rank(&self, scorer: &Scorer<'_>, candidates: Vec<&EntityId>) -> Vec<ScoredEntity> {
        let mut keyed: Vec<(ScoredEntity, u64)> = scorer
            .score_all(candidates)
            .into_iter()
            .map(|s| {
                let key = self.tiebreak(&s.entity);
                (s, key)
            })
            .collect();
        keyed.sort_by(|(a, ka), (b, kb)| b.score.total_cmp(&a.score).then(ka.cmp(kb)));
        keyed.into_iter().map(|(s, _)| s).collect()
    }

    /// Round-robin over the relation's index groups, best-ranked member of
    /// each group first, then the remaining candidates by rank.
    fn stratified(&self, scorer: &Scorer<'_>, relation: Relation, ranked: &[ScoredEntity]) -> Vec<EntityId> {
        let requested = self.config.batch_size;
        let position: HashMap<&EntityId, usize> =
            ranked.iter().enumerate().map(|(i, s)| (&s.entity, i)).collect();

        let mut queues: Vec<Vec<&EntityId>> = scorer
            .store()
            .index(relation)
            .map(|index| {
                index
                    .groups()
                    .into_iter()
                    .map(|(_, members)| {
                        let mut queue: Vec<&EntityId> =
                            members.iter().filter(|e| position.contains_key(e)).collect();
                        queue.sort_by_key(|e| position.get(e).copied().unwrap_or(usize::MAX));
                        queue
                    })
                    .collect()
            })
            .unwrap_or_default();
        queues.retain(|q| !q.is_empty());
        debug!(relation = %relation, strata = queues.len(), "stratified initial batch");

        let mut chosen: HashSet<&EntityId> = HashSet::new();
        let mut picked: Vec<EntityId> = Vec::with_capacity(requested);
        let mut cursors = vec![0usize; queues.len()];
        while picked.len() < requested {
            let mut progressed = false;
            for (queue, cursor) in queues.iter().zip(cursors.iter_mut()) {
                if picked.len() == requested {
                    break;
                }
                while *cursor < queue.len() && chosen.contains(&queue[*cursor]) {
                    *cursor += 1;
                }
                if let Some(entity) = queue.get(*cursor) {
                    chosen.insert(*entity);
                    picked.push((*entity).clone());
                    *cursor += 1;
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }

        for scored in ranked {
            if picked.len() == requested {
                break;
            }
            if chosen.insert(&scored.entity) {
                picked.push(scored.entity.clone());
            }
        }
        picked
    }

    /// Exploit and boundary tiers mixed by `exploit_share`.
    ///
    /// `ranked` holds more candidates than the batch size.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn adaptive(&self, ranked: &[ScoredEntity]) -> Vec<EntityId> {
        let requested = self.config.batch_size;
        let n = ranked.len();
        let tier_len = |fraction: f64| ((n as f64 * fraction).ceil() as usize).min(n);

        let exploit: Vec<usize> = (0..tier_len(self.config.exploit_fraction)).collect();

        let (max, min) = (ranked[0].score, ranked[n - 1].score);
        let midpoint = (max + min) / 2.0;
        let mut by_distance: Vec<usize> = (0..n).collect();
        by_distance.sort_by(|&a, &b| {
            let da = (ranked[a].score - midpoint).abs();
            let db = (ranked[b].score - midpoint).abs();
            da.partial_cmp(&db).unwrap_or(Ordering::Equal).then(a.cmp(&b))
        });
        by_distance.truncate(tier_len(self.config.boundary_fraction));
        let boundary = by_distance;

        let exploit_quota = ((requested as f64 * self.config.exploit_share).round() as usize).min(requested);
        let boundary_quota = requested - exploit_quota;
        debug!(
            candidates = n,
            exploit_tier = exploit.len(),
            boundary_tier = boundary.len(),
            exploit_quota,
            boundary_quota,
            midpoint,
            "adaptive tiers"
        );

        let mut chosen: HashSet<usize> = HashSet::new();
        let mut order: Vec<usize> = Vec::with_capacity(requested);
        let mut take = |pool: &mut dyn Iterator<Item = usize>, limit: usize, order: &mut Vec<usize>| {
            let mut taken = 0;
            for idx in pool {
                if taken == limit || order.len() == requested {
                    break;
                }
                if chosen.insert(idx) {
                    order.push(idx);
                    taken += 1;
                }
            }
        };
        take(&mut exploit.iter().copied(), exploit_quota, &mut order);
        take(&mut boundary.iter().copied(), boundary_quota, &mut order);
        // Shortfalls from overlapping or small tiers.
        let mut fill = exploit.iter().copied().chain(boundary.iter().copied()).chain(0..n);
        take(&mut fill, requested, &mut order);

        order.into_iter().map(|i| ranked[i].entity.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Rating;
    use crate::profile::{OpenDomain, Preference, Profile};
    use crate::rules::RuleSet;
    use crate::storage::{FactRecord, FactStore};
    use crate::value::FactValue;
    use crate::weights::WeightVector;

    /// e00..e19: rock for i < 8, in loudness range for even i.
    fn graded_store() -> FactStore {
        let mut records = Vec::new();
        for i in 0..20 {
            let id = format!("e{i:02}");
            let genre = if i < 8 { "rock" } else { "jazz" };
            let loudness = if i % 2 == 0 { -8.0 } else { -30.0 };
            records.push(FactRecord::new(Relation::Genre, id.as_str(), FactValue::categories([genre])));
            records.push(FactRecord::new(Relation::Loudness, id.as_str(), loudness));
        }
        FactStore::from_records(records).unwrap()
    }

    fn rules() -> RuleSet {
        let profile = Profile::builder()
            .set(Relation::Genre, Preference::any_of(["rock"]))
            .set(Relation::Loudness, Preference::between(-15.0, -5.0))
            .build(&OpenDomain)
            .unwrap();
        RuleSet::from_profile(&profile)
    }

    fn sampler(batch_size: usize, initial_policy: InitialPolicy) -> Sampler {
        Sampler::new(SamplerConfig {
            batch_size,
            initial_policy,
            ..SamplerConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_initial_top_k() {
        let (store, rules) = (graded_store(), rules());
        let weights = WeightVector::uniform(&rules, 1.0);
        let scorer = Scorer::new(&store, &rules, &weights);
        let mut sampler = sampler(4, InitialPolicy::TopK);
        let ledger = RatingLedger::new();
        assert_eq!(sampler.phase(&ledger), SamplerPhase::Initial);

        let batch = sampler.next_batch(&scorer, &ledger);
        let mut ids: Vec<&str> = batch.entities.iter().map(EntityId::as_str).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["e00", "e02", "e04", "e06"]);
        assert!(!batch.is_exhausted());
    }

    #[test]
    fn test_initial_stratified_covers_groups() {
        let store = FactStore::from_records(vec![
            FactRecord::new(Relation::Genre, "r1", FactValue::categories(["rock"])),
            FactRecord::new(Relation::Genre, "r2", FactValue::categories(["rock"])),
            FactRecord::new(Relation::Genre, "r3", FactValue::categories(["rock"])),
            FactRecord::new(Relation::Genre, "j1", FactValue::categories(["jazz"])),
            FactRecord::new(Relation::Genre, "p1", FactValue::categories(["pop"])),
            FactRecord::new(Relation::Tempo, "t1", 120.0),
        ])
        .unwrap();
        let rules = rules();
        let weights = WeightVector::uniform(&rules, 1.0);
        let scorer = Scorer::new(&store, &rules, &weights);
        let ledger = RatingLedger::new();

        let mut stratified = sampler(
            3,
            InitialPolicy::Stratified {
                relation: Relation::Genre,
            },
        );
        let batch = stratified.next_batch(&scorer, &ledger);
        let genres: HashSet<String> = batch
            .entities
            .iter()
            .flat_map(|e| store.get(Relation::Genre, e).unwrap().labels().map(str::to_string).collect::<Vec<_>>())
            .collect();
        assert_eq!(genres.len(), 3);

        let mut top = sampler(3, InitialPolicy::TopK);
        let batch = top.next_batch(&scorer, &ledger);
        assert!(batch.entities.iter().all(|e| e.starts_with('r')));
    }

    #[test]
    fn test_stratified_fills_from_ungrouped() {
        let store = FactStore::from_records(vec![
            FactRecord::new(Relation::Genre, "r1", FactValue::categories(["rock"])),
            FactRecord::new(Relation::Tempo, "t1", 120.0),
            FactRecord::new(Relation::Tempo, "t2", 125.0),
        ])
        .unwrap();
        let rules = rules();
        let weights = WeightVector::uniform(&rules, 1.0);
        let scorer = Scorer::new(&store, &rules, &weights);
        let mut sampler = Sampler::new(SamplerConfig {
            batch_size: 2,
            initial_policy: InitialPolicy::Stratified {
                relation: Relation::Genre,
            },
            ..SamplerConfig::default()
        })
        .unwrap();
        let batch = sampler.next_batch(&scorer, &RatingLedger::new());
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.entities[0].as_str(), "r1");
    }

    #[test]
    fn test_adaptive_mixes_tiers() {
        let (store, rules) = (graded_store(), rules());
        let weights = WeightVector::uniform(&rules, 1.0);
        let scorer = Scorer::new(&store, &rules, &weights);
        let mut ledger = RatingLedger::new();
        ledger.record("e00".into(), Rating::Like);

        let mut sampler = sampler(5, InitialPolicy::TopK);
        assert_eq!(sampler.phase(&ledger), SamplerPhase::Adaptive);
        let batch = sampler.next_batch(&scorer, &ledger);
        assert_eq!(batch.len(), 5);
        assert!(!batch.entities.iter().any(|e| e.as_str() == "e00"));

        let scores: Vec<f64> = batch.entities.iter().map(|e| scorer.score(e)).collect();
        assert_eq!(scores.iter().filter(|s| **s == 2.0).count(), 3);
        assert_eq!(scores.iter().filter(|s| **s == 1.0).count(), 2);
    }

    /// s00..s20 score 0, 1 or 3 under `range_rules` for `i % 3` of 0, 1, 2.
    fn spread_store() -> FactStore {
        let mut records = Vec::new();
        for i in 0..21 {
            let id = format!("s{i:02}");
            let (tempo, loudness, duration) = match i % 3 {
                0 => (80.0, -30.0, 600.0),
                1 => (120.0, -30.0, 600.0),
                _ => (120.0, -10.0, 200.0),
            };
            records.push(FactRecord::new(Relation::Tempo, id.as_str(), tempo));
            records.push(FactRecord::new(Relation::Loudness, id.as_str(), loudness));
            records.push(FactRecord::new(Relation::Duration, id.as_str(), duration));
        }
        FactStore::from_records(records).unwrap()
    }

    fn range_rules() -> RuleSet {
        let profile = Profile::builder()
            .set(Relation::Tempo, Preference::between(110.0, 130.0))
            .set(Relation::Loudness, Preference::between(-15.0, -5.0))
            .set(Relation::Duration, Preference::between(180.0, 240.0))
            .build(&OpenDomain)
            .unwrap();
        RuleSet::from_profile(&profile)
    }

    /// Scores of one adaptive batch after rating `s00`.
    fn adaptive_scores(config: SamplerConfig) -> Vec<f64> {
        let (store, rules) = (spread_store(), range_rules());
        let weights = WeightVector::uniform(&rules, 1.0);
        let scorer = Scorer::new(&store, &rules, &weights);
        let mut ledger = RatingLedger::new();
        ledger.record("s00".into(), Rating::Dislike);

        let mut sampler = Sampler::new(config).unwrap();
        let batch = sampler.next_batch(&scorer, &ledger);
        assert_eq!(batch.len(), 5);
        batch.entities.iter().map(|e| scorer.score(e)).collect()
    }

    #[test]
    fn test_adaptive_boundary_differs_from_top_k() {
        // Unrated scores: seven 3.0, seven 1.0, six 0.0. Midpoint 1.5.
        let scores = adaptive_scores(SamplerConfig {
            batch_size: 5,
            ..SamplerConfig::default()
        });
        // round(5 * 0.6) from the top, the rest nearest the midpoint.
        assert_eq!(&scores[..3], &[3.0, 3.0, 3.0]);
        assert_eq!(&scores[3..], &[1.0, 1.0]);
    }

    #[test]
    fn test_adaptive_honours_custom_shares() {
        let scores = adaptive_scores(SamplerConfig {
            batch_size: 5,
            exploit_share: 0.2,
            boundary_fraction: 0.5,
            ..SamplerConfig::default()
        });
        assert_eq!(scores.iter().filter(|s| **s == 3.0).count(), 1);
        assert_eq!(scores.iter().filter(|s| **s == 1.0).count(), 4);
        assert!(!scores.contains(&0.0));
    }

    #[test]
    fn test_shortfall_when_corpus_runs_out() {
        let store = FactStore::from_records(vec![
            FactRecord::new(Relation::Tempo, "a", 100.0),
            FactRecord::new(Relation::Tempo, "b", 110.0),
            FactRecord::new(Relation::Tempo, "c", 120.0),
        ])
        .unwrap();
        let rules = rules();
        let weights = WeightVector::uniform(&rules, 1.0);
        let scorer = Scorer::new(&store, &rules, &weights);
        let mut sampler = sampler(5, InitialPolicy::TopK);

        let batch = sampler.next_batch(&scorer, &RatingLedger::new());
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.shortfall(), 2);
        assert!(batch.is_exhausted());

        let empty = sampler.next_batch(&scorer, &RatingLedger::new());
        assert!(empty.is_empty());
        assert_eq!(empty.shortfall(), 5);
    }

    #[test]
    fn test_never_presents_twice() {
        let (store, rules) = (graded_store(), rules());
        let weights = WeightVector::uniform(&rules, 1.0);
        let scorer = Scorer::new(&store, &rules, &weights);
        let mut ledger = RatingLedger::new();
        let mut sampler = sampler(3, InitialPolicy::TopK);

        let mut seen = HashSet::new();
        loop {
            let batch = sampler.next_batch(&scorer, &ledger);
            for entity in &batch.entities {
                assert!(seen.insert(entity.clone()), "{entity} presented twice");
                ledger.record(entity.clone(), Rating::Neutral);
            }
            if batch.is_exhausted() {
                break;
            }
        }
        assert_eq!(seen.len(), store.len());
        assert_eq!(sampler.presented(), store.len());
    }

    #[test]
    fn test_same_seed_same_batches() {
        let (store, rules) = (graded_store(), rules());
        let weights = WeightVector::uniform(&rules, 1.0);
        let scorer = Scorer::new(&store, &rules, &weights);
        let mut ledger = RatingLedger::new();
        ledger.record("e01".into(), Rating::Dislike);

        let mut first = sampler(6, InitialPolicy::TopK);
        let mut second = sampler(6, InitialPolicy::TopK);
        for _ in 0..3 {
            assert_eq!(first.next_batch(&scorer, &ledger), second.next_batch(&scorer, &ledger));
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = Sampler::new(SamplerConfig {
            batch_size: 0,
            ..SamplerConfig::default()
        });
        assert!(result.is_err());
    }
}
