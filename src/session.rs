//! Interactive preference sessions.
//!
//! A session owns everything that changes while one user rates songs:
//! the rule set, the weights, the ratings and the sampler state. The fact
//! store is shared read-only, so any number of sessions can run over the
//! same store.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::entity::EntityId;
use crate::error::ValidationError;
use crate::ledger::{Rating, RatingLedger};
use crate::profile::Profile;
use crate::refiner::{RefinementOutcome, WeightRefiner};
use crate::rules::RuleSet;
use crate::sampler::{Batch, Sampler, SamplerPhase};
use crate::scorer::{ScoredEntity, Scorer};
use crate::storage::FactStore;
use crate::weights::WeightVector;

/// Unique identifier for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Creates a new random session ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One user's present-rate-refine loop over a shared store.
///
/// # Examples
///
/// ```
/// use tastekb::{FactRecord, FactStore, FactValue, OpenDomain, PreferenceSession, Preference,
///     Profile, Rating, Relation, SessionConfig};
///
/// let store = FactStore::from_records(vec![
///     FactRecord::new(Relation::Genre, "a", FactValue::categories(["rock"])),
///     FactRecord::new(Relation::Genre, "b", FactValue::categories(["jazz"])),
/// ])
/// .unwrap();
/// let profile = Profile::builder()
///     .set(Relation::Genre, Preference::any_of(["rock"]))
///     .build(&OpenDomain)
///     .unwrap();
///
/// let mut session = PreferenceSession::new(&store, &profile, SessionConfig::default()).unwrap();
/// let batch = session.next_batch();
/// assert_eq!(batch.len(), 2);
/// session.submit([("a", Rating::Like), ("b", Rating::Dislike)]).unwrap();
/// assert_eq!(session.rankings()[0].entity.as_str(), "a");
/// ```
#[derive(Debug)]
pub struct PreferenceSession<'a> {
    id: SessionId,
    store: &'a FactStore,
    rules: RuleSet,
    weights: WeightVector,
    ledger: RatingLedger,
    sampler: Sampler,
    refiner: WeightRefiner,
    max_rounds: Option<usize>,
    round: usize,
    last_outcome: Option<RefinementOutcome>,
}

impl<'a> PreferenceSession<'a> {
    /// Starts a session for a validated profile.
    ///
    /// # Errors
    /// If the configuration does not validate.
    pub fn new(store: &'a FactStore, profile: &Profile, config: SessionConfig) -> Result<Self, ValidationError> {
        let config = config.validate()?;
        let rules = RuleSet::from_profile(profile);
        let weights = WeightVector::initial(&rules, &config.weights);
        let session = Self {
            id: SessionId::new(),
            store,
            sampler: Sampler::new(config.sampler)?,
            refiner: WeightRefiner::new(config.refiner)?,
            rules,
            weights,
            ledger: RatingLedger::new(),
            max_rounds: config.max_rounds,
            round: 0,
            last_outcome: None,
        };
        info!(
            session_id = %session.id,
            rules = session.rules.len(),
            entities = store.len(),
            "preference session started"
        );
        Ok(session)
    }

    /// Session identifier.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Rules derived from the profile.
    #[must_use]
    pub const fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Current weights.
    #[must_use]
    pub const fn weights(&self) -> &WeightVector {
        &self.weights
    }

    /// Ratings recorded so far.
    #[must_use]
    pub const fn ledger(&self) -> &RatingLedger {
        &self.ledger
    }

    /// Phase of the next batch.
    #[must_use]
    pub fn phase(&self) -> SamplerPhase {
        self.sampler.phase(&self.ledger)
    }

    /// Scorer over the current weights.
    #[must_use]
    pub fn scorer(&self) -> Scorer<'_> {
        Scorer::new(self.store, &self.rules, &self.weights)
    }

    /// Chooses the next entities to present.
    pub fn next_batch(&mut self) -> Batch {
        let scorer = Scorer::new(self.store, &self.rules, &self.weights);
        self.sampler.next_batch(&scorer, &self.ledger)
    }

    /// Records one rating, returning the rating it replaced.
    ///
    /// # Errors
    /// `ValidationError::UnknownEntity` if the store has no such entity.
    pub fn record(&mut self, entity: &str, rating: Rating) -> Result<Option<Rating>, ValidationError> {
        let id = self.resolve(entity)?;
        Ok(self.ledger.record(id, rating))
    }

    fn resolve(&self, entity: &str) -> Result<EntityId, ValidationError> {
        self.store
            .entity_id(entity)
            .cloned()
            .ok_or_else(|| ValidationError::UnknownEntity {
                id: entity.to_string(),
            })
    }

    /// Records a batch of feedback, then refines once.
    ///
    /// Nothing is recorded if any entity is unknown.
    ///
    /// # Errors
    /// `ValidationError::UnknownEntity` for the first unknown entity.
    pub fn submit<I, S>(&mut self, feedback: I) -> Result<RefinementOutcome, ValidationError>
    where
        I: IntoIterator<Item = (S, Rating)>,
        S: AsRef<str>,
    {
        let resolved = feedback
            .into_iter()
            .map(|(entity, rating)| Ok((self.resolve(entity.as_ref())?, rating)))
            .collect::<Result<Vec<_>, ValidationError>>()?;
        for (id, rating) in resolved {
            self.ledger.record(id, rating);
        }
        Ok(self.refine())
    }

    /// Runs one refinement step over all ratings so far.
    pub fn refine(&mut self) -> RefinementOutcome {
        let (weights, outcome) = self
            .refiner
            .refine(&self.weights, &self.rules, &self.ledger, self.store);
        self.weights = weights;
        self.round += 1;
        info!(
            session_id = %self.id,
            round = self.round,
            applied = outcome.is_applied(),
            "refinement round finished"
        );
        self.last_outcome = Some(outcome.clone());
        outcome
    }

    /// Outcome of the most recent refinement.
    #[must_use]
    pub const fn last_outcome(&self) -> Option<&RefinementOutcome> {
        self.last_outcome.as_ref()
    }

    /// Every entity scored with the current weights, highest first.
    #[must_use]
    pub fn rankings(&self) -> Vec<ScoredEntity> {
        self.scorer().score_all(self.store.entities())
    }

    /// Refinement rounds run so far.
    #[must_use]
    pub const fn round(&self) -> usize {
        self.round
    }

    /// Entities neither rated nor presented yet.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.store
            .entities()
            .iter()
            .filter(|e| !self.ledger.contains(e) && !self.sampler.was_presented(e))
            .count()
    }

    /// True once the round limit is reached or nothing is left to present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.max_rounds.is_some_and(|max| self.round >= max) || self.remaining() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SamplerConfig;
    use crate::profile::{OpenDomain, Preference};
    use crate::relation::Relation;
    use crate::rules::RuleId;
    use crate::storage::FactRecord;
    use crate::value::FactValue;

    fn store() -> FactStore {
        let mut records = Vec::new();
        for i in 0..6 {
            let id = format!("s{i}");
            let genre = if i % 2 == 0 { "rock" } else { "jazz" };
            records.push(FactRecord::new(Relation::Genre, id.as_str(), FactValue::categories([genre])));
            records.push(FactRecord::new(Relation::Tempo, id.as_str(), 100.0 + f64::from(i) * 10.0));
        }
        FactStore::from_records(records).unwrap()
    }

    fn profile() -> Profile {
        Profile::builder()
            .set(Relation::Genre, Preference::any_of(["rock"]))
            .set(Relation::Tempo, Preference::between(120.0, 160.0))
            .build(&OpenDomain)
            .unwrap()
    }

    fn config(batch_size: usize, max_rounds: Option<usize>) -> SessionConfig {
        SessionConfig {
            sampler: SamplerConfig {
                batch_size,
                ..SamplerConfig::default()
            },
            max_rounds,
            ..SessionConfig::default()
        }
    }

    #[test]
    fn test_session_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn test_unknown_entity_rejected() {
        let store = store();
        let mut session = PreferenceSession::new(&store, &profile(), config(2, None)).unwrap();
        let err = session.record("nope", Rating::Like).unwrap_err();
        assert!(matches!(err, ValidationError::UnknownEntity { .. }));
    }

    #[test]
    fn test_submit_is_all_or_nothing() {
        let store = store();
        let mut session = PreferenceSession::new(&store, &profile(), config(2, None)).unwrap();
        let result = session.submit([("s0", Rating::Like), ("ghost", Rating::Dislike)]);
        assert!(result.is_err());
        assert!(session.ledger().is_empty());
        assert_eq!(session.round(), 0);
    }

    #[test]
    fn test_loop_runs_until_exhausted() {
        let store = store();
        let mut session = PreferenceSession::new(&store, &profile(), config(4, None)).unwrap();
        assert_eq!(session.phase(), SamplerPhase::Initial);

        let mut rounds = 0;
        while !session.is_complete() {
            let batch = session.next_batch();
            let feedback: Vec<(EntityId, Rating)> = batch
                .entities
                .iter()
                .map(|e| {
                    let liked = store.get(Relation::Genre, e).is_some_and(|v| v.has_category("rock"));
                    (e.clone(), if liked { Rating::Like } else { Rating::Dislike })
                })
                .collect();
            session.submit(feedback).unwrap();
            rounds += 1;
        }
        assert_eq!(rounds, 2);
        assert_eq!(session.ledger().len(), 6);
        assert_eq!(session.phase(), SamplerPhase::Adaptive);
        assert!(session.weights().get(&RuleId::from("genre.intersects")) > 1.0);
    }

    #[test]
    fn test_max_rounds_completes_session() {
        let store = store();
        let mut session = PreferenceSession::new(&store, &profile(), config(1, Some(1))).unwrap();
        assert!(!session.is_complete());
        session.record("s0", Rating::Like).unwrap();
        let outcome = session.refine();
        assert_eq!(outcome, RefinementOutcome::Skipped { distinct_ratings: 1 });
        assert_eq!(session.last_outcome(), Some(&outcome));
        assert!(session.is_complete());
    }

    #[test]
    fn test_rankings_cover_every_entity() {
        let store = store();
        let session = PreferenceSession::new(&store, &profile(), config(2, None)).unwrap();
        let rankings = session.rankings();
        assert_eq!(rankings.len(), store.len());
        // s2 and s4 are rock and inside the tempo range.
        let top: Vec<&str> = rankings.iter().take(2).map(|s| s.entity.as_str()).collect();
        assert_eq!(top, vec!["s2", "s4"]);
    }
}
