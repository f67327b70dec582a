//! In-memory fact store.
//!
//! Holds the song catalog, one fact map per relation and the secondary
//! indexes derived from those maps. The store is built once per session
//! and read-only afterwards; `&self` queries can be shared freely across
//! threads without locking.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::entity::{EntityId, Song};
use crate::error::SchemaError;
use crate::relation::{normalize_category, Relation, ValueKind};
use crate::storage::index::ValueIndex;
use crate::value::FactValue;

/// One (relation, entity, value) triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactRecord {
    /// Relation the fact belongs to.
    pub relation: Relation,
    /// Entity the fact describes.
    pub entity: EntityId,
    /// The fact value.
    pub value: FactValue,
}

impl FactRecord {
    /// Creates a typed record. Schema conformance is checked on load.
    pub fn new(relation: Relation, entity: impl Into<EntityId>, value: impl Into<FactValue>) -> Self {
        Self {
            relation,
            entity: entity.into(),
            value: value.into(),
        }
    }

    /// Parses a record whose relation name and value come from untyped input.
    ///
    /// # Errors
    /// `SchemaError::UnknownRelation` for an unrecognized relation name, or a
    /// value-shape error naming the relation and entity.
    pub fn parse(relation: &str, entity: &str, raw: &serde_json::Value) -> Result<Self, SchemaError> {
        let relation: Relation = relation.parse()?;
        let entity = EntityId::from(entity);
        if entity.is_blank() {
            return Err(SchemaError::EmptyEntityId);
        }
        let value = FactValue::from_json(relation, &entity, raw)?;
        Ok(Self {
            relation,
            entity,
            value,
        })
    }
}

/// Fact coverage of one relation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationCoverage {
    /// Covered relation.
    pub relation: Relation,
    /// Entities with a recorded value.
    pub facts: usize,
    /// `facts` as a fraction of all entities.
    pub coverage: f64,
    /// Distinct index keys, for indexed relations.
    pub distinct_values: Option<usize>,
}

/// Min/max/mean of a numeric relation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NumericSummary {
    /// Entities with a value.
    pub count: usize,
    /// Smallest value.
    pub min: f64,
    /// Largest value.
    pub max: f64,
    /// Arithmetic mean.
    pub mean: f64,
}

/// Store-wide statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreStats {
    /// Registered entities.
    pub entities: usize,
    /// Per-relation coverage in schema order.
    pub relations: Vec<RelationCoverage>,
}

/// Indexed, in-memory fact store.
#[derive(Debug, Clone, Default)]
pub struct FactStore {
    order: Vec<EntityId>,
    catalog: HashMap<EntityId, Song>,
    facts: HashMap<Relation, HashMap<EntityId, FactValue>>,
    indexes: HashMap<Relation, ValueIndex>,
}

impl FactStore {
    /// Creates an empty store with empty indexes.
    #[must_use]
    pub fn new() -> Self {
        let mut store = Self::default();
        store.rebuild_indexes();
        store
    }

    /// Builds a store from a batch of records.
    ///
    /// # Errors
    /// Fails on the first record that does not conform to the schema.
    pub fn from_records<I>(records: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = FactRecord>,
    {
        let mut store = Self::new();
        store.load(records)?;
        Ok(store)
    }

    /// Registers a song with its catalog metadata.
    ///
    /// Registering an id twice keeps its original position and replaces the
    /// metadata.
    ///
    /// # Errors
    /// `SchemaError::EmptyEntityId` for a blank id.
    pub fn add_song(&mut self, id: impl Into<EntityId>, song: Song) -> Result<EntityId, SchemaError> {
        let id = id.into();
        if id.is_blank() {
            return Err(SchemaError::EmptyEntityId);
        }
        self.register(&id);
        self.catalog.insert(id.clone(), song);
        Ok(id)
    }

    fn register(&mut self, id: &EntityId) {
        if !self.catalog.contains_key(id) {
            self.catalog.insert(id.clone(), Song::default());
            self.order.push(id.clone());
        }
    }

    /// Loads a batch of facts and rebuilds every index.
    ///
    /// The whole batch is checked before anything is written, so a failing
    /// batch leaves the store unchanged. Entities first seen here are
    /// registered with empty catalog metadata.
    ///
    /// # Errors
    /// The first schema violation in the batch.
    pub fn load<I>(&mut self, records: I) -> Result<usize, SchemaError>
    where
        I: IntoIterator<Item = FactRecord>,
    {
        let mut staged = Vec::new();
        for record in records {
            if record.entity.is_blank() {
                return Err(SchemaError::EmptyEntityId);
            }
            let value = record.value.conform(record.relation, &record.entity)?;
            staged.push((record.relation, record.entity, value));
        }

        let loaded = staged.len();
        for (relation, entity, value) in staged {
            self.register(&entity);
            self.facts.entry(relation).or_default().insert(entity, value);
        }
        self.rebuild_indexes();
        info!(facts = loaded, entities = self.order.len(), "fact batch loaded");
        Ok(loaded)
    }

    /// Rebuilds all indexes from the fact maps. Idempotent.
    pub fn rebuild_indexes(&mut self) {
        let empty = HashMap::new();
        self.indexes.clear();
        for relation in Relation::ALL {
            let facts = self.facts.get(&relation).unwrap_or(&empty);
            if let Some(index) = ValueIndex::build(relation.index_kind(), facts) {
                debug!(relation = %relation, keys = index.len(), "index rebuilt");
                self.indexes.insert(relation, index);
            }
        }
    }

    /// Inserts or replaces one fact, updating its index in the same step.
    ///
    /// Returns the previous value, if any.
    ///
    /// # Errors
    /// A schema error if the value does not conform to the relation.
    pub fn upsert_fact(
        &mut self,
        relation: Relation,
        entity: impl Into<EntityId>,
        value: FactValue,
    ) -> Result<Option<FactValue>, SchemaError> {
        let entity = entity.into();
        if entity.is_blank() {
            return Err(SchemaError::EmptyEntityId);
        }
        let value = value.conform(relation, &entity)?;
        self.register(&entity);

        let previous = self
            .facts
            .entry(relation)
            .or_default()
            .insert(entity.clone(), value.clone());
        if let Some(index) = self.indexes.get_mut(&relation) {
            if let Some(old) = previous.as_ref() {
                index.remove(&entity, old);
            }
            index.insert(&entity, &value);
        }
        Ok(previous)
    }

    /// Value of `relation` for `entity`, or `None` when nothing is recorded.
    #[must_use]
    pub fn get(&self, relation: Relation, entity: &str) -> Option<&FactValue> {
        self.facts.get(&relation)?.get(entity)
    }

    /// Like [`FactStore::get`], for a relation named by a string.
    ///
    /// # Errors
    /// `SchemaError::UnknownRelation` if the name is not part of the schema.
    pub fn get_named(&self, relation: &str, entity: &str) -> Result<Option<&FactValue>, SchemaError> {
        let relation: Relation = relation.parse()?;
        Ok(self.get(relation, entity))
    }

    /// True if the entity has a fact for `relation`.
    #[must_use]
    pub fn has_fact(&self, relation: Relation, entity: &str) -> bool {
        self.get(relation, entity).is_some()
    }

    /// Entities whose value for `relation` is `value`.
    ///
    /// A single category against a set-valued relation matches by
    /// membership; a number matches exactly. Mismatched kinds match nothing.
    #[must_use]
    pub fn entities_by_value(&self, relation: Relation, value: &FactValue) -> BTreeSet<EntityId> {
        match value {
            FactValue::Number(v) => self.entities_in_range(relation, *v, *v),
            FactValue::Category(label) => {
                if relation.value_kind() == ValueKind::Number {
                    return BTreeSet::new();
                }
                let label = normalize_category(label);
                match self.indexes.get(&relation) {
                    Some(index) => index.lookup(&label).cloned().unwrap_or_default(),
                    None => self.scan(relation, |v| v.has_category(&label)),
                }
            }
            FactValue::Categories(set) => {
                if relation.value_kind() != ValueKind::CategorySet {
                    return BTreeSet::new();
                }
                let wanted: BTreeSet<String> = set.iter().map(|s| normalize_category(s)).collect();
                let matches = |v: &FactValue| v.as_categories() == Some(&wanted);
                match (wanted.iter().next(), self.indexes.get(&relation)) {
                    (Some(first), Some(index)) => index
                        .lookup(first)
                        .into_iter()
                        .flatten()
                        .filter(|e| self.get(relation, e).is_some_and(matches))
                        .cloned()
                        .collect(),
                    _ => self.scan(relation, matches),
                }
            }
        }
    }

    /// Entities whose numeric value for `relation` lies in `[lo, hi]`.
    ///
    /// Bucketed relations only visit buckets overlapping the range; other
    /// numeric relations scan their fact map. Non-numeric relations and
    /// empty or NaN ranges yield nothing.
    #[must_use]
    pub fn entities_in_range(&self, relation: Relation, lo: f64, hi: f64) -> BTreeSet<EntityId> {
        if relation.value_kind() != ValueKind::Number || lo.is_nan() || hi.is_nan() || lo > hi {
            return BTreeSet::new();
        }
        let in_range = |v: &FactValue| v.as_number().is_some_and(|x| lo <= x && x <= hi);
        match self.indexes.get(&relation) {
            Some(index) => index
                .buckets_overlapping(lo, hi)
                .into_iter()
                .flatten()
                .filter(|e| self.get(relation, e).is_some_and(in_range))
                .cloned()
                .collect(),
            None => self.scan(relation, in_range),
        }
    }

    fn scan(&self, relation: Relation, pred: impl Fn(&FactValue) -> bool) -> BTreeSet<EntityId> {
        self.facts
            .get(&relation)
            .map(|facts| {
                facts
                    .iter()
                    .filter(|(_, v)| pred(*v))
                    .map(|(e, _)| e.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Distinct category labels recorded for `relation`. Empty for numbers.
    #[must_use]
    pub fn domain(&self, relation: Relation) -> BTreeSet<String> {
        if relation.value_kind() == ValueKind::Number {
            return BTreeSet::new();
        }
        if let Some(ValueIndex::Categorical(map)) = self.indexes.get(&relation) {
            return map.keys().cloned().collect();
        }
        self.facts
            .get(&relation)
            .map(|facts| {
                facts
                    .values()
                    .flat_map(FactValue::labels)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The index over `relation`, if it has one.
    #[must_use]
    pub fn index(&self, relation: Relation) -> Option<&ValueIndex> {
        self.indexes.get(&relation)
    }

    /// Recomputes every index from the facts and compares with the live ones.
    #[must_use]
    pub fn indexes_consistent(&self) -> bool {
        let empty = HashMap::new();
        Relation::ALL.into_iter().all(|relation| {
            let facts = self.facts.get(&relation).unwrap_or(&empty);
            ValueIndex::build(relation.index_kind(), facts).as_ref() == self.indexes.get(&relation)
        })
    }

    /// All entities in the order they were first registered.
    #[must_use]
    pub fn entities(&self) -> &[EntityId] {
        &self.order
    }

    /// True if the entity is registered.
    #[must_use]
    pub fn contains(&self, entity: &str) -> bool {
        self.catalog.contains_key(entity)
    }

    /// Canonical id for an entity, sharing the store's allocation.
    #[must_use]
    pub fn entity_id(&self, entity: &str) -> Option<&EntityId> {
        self.catalog.get_key_value(entity).map(|(id, _)| id)
    }

    /// Number of registered entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True if no entity is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Catalog metadata of an entity.
    #[must_use]
    pub fn song(&self, entity: &str) -> Option<&Song> {
        self.catalog.get(entity)
    }

    /// Number of entities with a recorded value for `relation`.
    #[must_use]
    pub fn fact_count(&self, relation: Relation) -> usize {
        self.facts.get(&relation).map_or(0, HashMap::len)
    }

    /// Finds a song by title, optionally narrowed by artist.
    ///
    /// Exact (case-insensitive) matches win; otherwise the first song whose
    /// title contains, or is contained in, the query.
    #[must_use]
    pub fn find_song(&self, track: &str, artist: Option<&str>) -> Option<&EntityId> {
        let track = normalize_category(track);
        if track.is_empty() {
            return None;
        }
        let artist = artist.map(normalize_category).filter(|a| !a.is_empty());

        let exact = self.order.iter().find(|id| {
            let song = &self.catalog[*id];
            normalize_category(&song.track) == track
                && artist
                    .as_deref()
                    .map_or(true, |a| normalize_category(&song.artist) == a)
        });
        exact.or_else(|| self.songs_matching(&track, artist.as_deref()).next())
    }

    /// Every song whose title (and artist, when given) partially matches.
    #[must_use]
    pub fn find_songs_by_name(&self, track: &str, artist: Option<&str>) -> Vec<&EntityId> {
        let track = normalize_category(track);
        if track.is_empty() {
            return Vec::new();
        }
        let artist = artist.map(normalize_category).filter(|a| !a.is_empty());
        self.songs_matching(&track, artist.as_deref()).collect()
    }

    fn songs_matching<'s: 'q, 'q>(
        &'s self,
        track: &'q str,
        artist: Option<&'q str>,
    ) -> impl Iterator<Item = &'s EntityId> + 'q {
        self.order.iter().filter(move |id| {
            let song = &self.catalog[*id];
            partial_match(&normalize_category(&song.track), track)
                && artist.map_or(true, |a| partial_match(&normalize_category(&song.artist), a))
        })
    }

    /// Per-relation fact coverage.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let total = self.order.len();
        let relations = Relation::ALL
            .into_iter()
            .map(|relation| {
                let facts = self.fact_count(relation);
                #[allow(clippy::cast_precision_loss)]
                let coverage = if total == 0 { 0.0 } else { facts as f64 / total as f64 };
                RelationCoverage {
                    relation,
                    facts,
                    coverage,
                    distinct_values: self.indexes.get(&relation).map(ValueIndex::len),
                }
            })
            .collect();
        StoreStats {
            entities: total,
            relations,
        }
    }

    /// Min/max/mean over a numeric relation, or `None` without data.
    #[must_use]
    pub fn numeric_summary(&self, relation: Relation) -> Option<NumericSummary> {
        let facts = self.facts.get(&relation)?;
        let values: Vec<f64> = facts.values().filter_map(FactValue::as_number).collect();
        if values.is_empty() {
            return None;
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        #[allow(clippy::cast_precision_loss)]
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        Some(NumericSummary {
            count: values.len(),
            min,
            max,
            mean,
        })
    }

    /// Largest index keys of `relation` by entity count, ties by label.
    #[must_use]
    pub fn top_values(&self, relation: Relation, limit: usize) -> Vec<(String, usize)> {
        let Some(index) = self.indexes.get(&relation) else {
            return Vec::new();
        };
        let mut counts: Vec<(String, usize)> = index
            .groups()
            .into_iter()
            .map(|(label, set)| (label, set.len()))
            .collect();
        counts.sort_by(|(la, ca), (lb, cb)| cb.cmp(ca).then_with(|| la.cmp(lb)));
        counts.truncate(limit);
        counts
    }
}

fn partial_match(candidate: &str, query: &str) -> bool {
    !candidate.is_empty() && (candidate.contains(query) || query.contains(candidate))
}
