//! Feedback collected during a session.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::EntityId;

/// Ordinal feedback on one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    /// Value 1.
    Dislike,
    /// Value 2.
    Neutral,
    /// Value 3.
    Like,
}

impl Rating {
    /// Numeric value used in refinement arithmetic.
    #[must_use]
    pub const fn value(self) -> f64 {
        match self {
            Self::Dislike => 1.0,
            Self::Neutral => 2.0,
            Self::Like => 3.0,
        }
    }
}

/// One recorded rating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingEntry {
    /// Rated entity.
    pub entity: EntityId,
    /// Latest rating.
    pub rating: Rating,
    /// When the latest rating was recorded.
    pub recorded_at: DateTime<Utc>,
}

/// Ratings of a session, at most one per entity.
///
/// Rating an entity again replaces its rating but keeps its position.
#[derive(Debug, Clone, Default)]
pub struct RatingLedger {
    entries: Vec<RatingEntry>,
    positions: HashMap<EntityId, usize>,
}

impl RatingLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a rating, returning the one it replaced.
    pub fn record(&mut self, entity: EntityId, rating: Rating) -> Option<Rating> {
        let recorded_at = Utc::now();
        if let Some(&pos) = self.positions.get(&entity) {
            let entry = &mut self.entries[pos];
            let previous = entry.rating;
            entry.rating = rating;
            entry.recorded_at = recorded_at;
            return Some(previous);
        }
        self.positions.insert(entity.clone(), self.entries.len());
        self.entries.push(RatingEntry {
            entity,
            rating,
            recorded_at,
        });
        None
    }

    /// Current rating of an entity.
    #[must_use]
    pub fn get(&self, entity: &str) -> Option<Rating> {
        self.positions.get(entity).map(|&pos| self.entries[pos].rating)
    }

    /// True if the entity has been rated.
    #[must_use]
    pub fn contains(&self, entity: &str) -> bool {
        self.positions.contains_key(entity)
    }

    /// Entries in first-rated order.
    pub fn iter(&self) -> std::slice::Iter<'_, RatingEntry> {
        self.entries.iter()
    }

    /// Mean numeric rating, `None` when empty.
    #[must_use]
    pub fn mean(&self) -> Option<f64> {
        if self.entries.is_empty() {
            return None;
        }
        let sum: f64 = self.entries.iter().map(|e| e.rating.value()).sum();
        #[allow(clippy::cast_precision_loss)]
        let count = self.entries.len() as f64;
        Some(sum / count)
    }

    /// Number of different rating values seen.
    #[must_use]
    pub fn distinct_values(&self) -> usize {
        self.entries.iter().map(|e| e.rating).collect::<BTreeSet<_>>().len()
    }

    /// Number of rated entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing has been rated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a RatingLedger {
    type Item = &'a RatingEntry;
    type IntoIter = std::slice::Iter<'a, RatingEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
