//! Secondary indexes over fact maps.
//!
//! An index is a derived view: value (or numeric bucket) to the set of
//! entities holding it. Its key set is always exactly the set of distinct
//! values present in the fact map it was built from; empty buckets are
//! removed as soon as their last entity leaves.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::entity::EntityId;
use crate::relation::{bucket_label, bucket_of, IndexKind};
use crate::value::FactValue;

/// Index over one relation.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueIndex {
    /// Category label to entities. Set-valued facts index every member.
    Categorical(BTreeMap<String, BTreeSet<EntityId>>),
    /// Fixed-width numeric buckets.
    Bucketed {
        width: f64,
        buckets: BTreeMap<i64, BTreeSet<EntityId>>,
    },
}

impl ValueIndex {
    /// Builds an index of the given kind from a relation's fact map.
    ///
    /// Returns `None` for relations that are not indexed.
    #[must_use]
    pub fn build(kind: IndexKind, facts: &HashMap<EntityId, FactValue>) -> Option<Self> {
        let mut index = match kind {
            IndexKind::None => return None,
            IndexKind::Categorical => Self::Categorical(BTreeMap::new()),
            IndexKind::Bucketed { width } => Self::Bucketed {
                width,
                buckets: BTreeMap::new(),
            },
        };
        for (entity, value) in facts {
            index.insert(entity, value);
        }
        Some(index)
    }

    pub(crate) fn insert(&mut self, entity: &EntityId, value: &FactValue) {
        match self {
            Self::Categorical(map) => {
                for label in value.labels() {
                    map.entry(label.to_string()).or_default().insert(entity.clone());
                }
            }
            Self::Bucketed { width, buckets } => {
                if let Some(v) = value.as_number() {
                    buckets.entry(bucket_of(v, *width)).or_default().insert(entity.clone());
                }
            }
        }
    }

    pub(crate) fn remove(&mut self, entity: &EntityId, value: &FactValue) {
        match self {
            Self::Categorical(map) => {
                for label in value.labels() {
                    if let Some(set) = map.get_mut(label) {
                        set.remove(entity);
                        if set.is_empty() {
                            map.remove(label);
                        }
                    }
                }
            }
            Self::Bucketed { width, buckets } => {
                if let Some(v) = value.as_number() {
                    let bucket = bucket_of(v, *width);
                    if let Some(set) = buckets.get_mut(&bucket) {
                        set.remove(entity);
                        if set.is_empty() {
                            buckets.remove(&bucket);
                        }
                    }
                }
            }
        }
    }

    /// Entities carrying a category label. Always `None` for bucketed indexes.
    #[must_use]
    pub fn lookup(&self, label: &str) -> Option<&BTreeSet<EntityId>> {
        match self {
            Self::Categorical(map) => map.get(label),
            Self::Bucketed { .. } => None,
        }
    }

    /// Buckets that may hold values in `[lo, hi]`, in ascending order.
    ///
    /// Callers still filter on the exact value: edge buckets overlap the
    /// range only partially.
    pub fn buckets_overlapping(&self, lo: f64, hi: f64) -> Vec<&BTreeSet<EntityId>> {
        match self {
            Self::Bucketed { width, buckets } => {
                let (first, last) = (bucket_of(lo, *width), bucket_of(hi, *width));
                if first > last {
                    return Vec::new();
                }
                buckets.range(first..=last).map(|(_, set)| set).collect()
            }
            Self::Categorical(_) => Vec::new(),
        }
    }

    /// Every key with its entities, labelled for display and stratification.
    #[must_use]
    pub fn groups(&self) -> Vec<(String, &BTreeSet<EntityId>)> {
        match self {
            Self::Categorical(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
            Self::Bucketed { width, buckets } => buckets
                .iter()
                .map(|(b, v)| (bucket_label(*b, *width), v))
                .collect(),
        }
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Categorical(map) => map.len(),
            Self::Bucketed { buckets, .. } => buckets.len(),
        }
    }

    /// True if no entity is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
