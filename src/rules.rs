//! Rules derived from a profile.
//!
//! One rule per supplied profile field. Every rule evaluates to a score in
//! `[0, 1]`; an entity with no fact for the rule's relation scores 0.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::EntityId;
use crate::profile::{Preference, Profile};
use crate::relation::Relation;
use crate::storage::FactStore;
use crate::value::FactValue;

/// Stable identifier of a rule, `"<relation>.<comparison>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(String);

impl RuleId {
    fn for_rule(relation: Relation, comparison: &Comparison) -> Self {
        Self(format!("{}.{}", relation.name(), comparison.name()))
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RuleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// How a rule compares an entity's fact with its target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Comparison {
    /// Fraction of the target labels the entity carries.
    SetIntersect { targets: BTreeSet<String> },
    /// 1 if the entity's label equals the target.
    Equals { target: String },
    /// 1 if the entity's number lies within `[min, max]`.
    InRange { min: f64, max: f64 },
}

impl Comparison {
    /// Short name used in rule ids.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SetIntersect { .. } => "intersects",
            Self::Equals { .. } => "equals",
            Self::InRange { .. } => "in_range",
        }
    }

    /// Scores a fact value (or its absence) against this comparison.
    #[must_use]
    pub fn evaluate(&self, value: Option<&FactValue>) -> f64 {
        let Some(value) = value else {
            return 0.0;
        };
        match self {
            Self::SetIntersect { targets } => {
                if targets.is_empty() {
                    return 0.0;
                }
                let hits = value.labels().filter(|l| targets.contains(*l)).count();
                hits as f64 / targets.len() as f64
            }
            Self::Equals { target } => match value.as_category() {
                Some(label) if label == target => 1.0,
                _ => 0.0,
            },
            Self::InRange { min, max } => match value.as_number() {
                Some(v) if *min <= v && v <= *max => 1.0,
                _ => 0.0,
            },
        }
    }
}

impl From<&Preference> for Comparison {
    fn from(preference: &Preference) -> Self {
        match preference {
            Preference::AnyOf { values } => Self::SetIntersect {
                targets: values.clone(),
            },
            Preference::Exactly { value } => Self::Equals {
                target: value.clone(),
            },
            Preference::Between { min, max } => Self::InRange {
                min: *min,
                max: *max,
            },
        }
    }
}

/// An evaluable predicate bound to one relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Stable id, `"<relation>.<comparison>"`.
    pub id: RuleId,
    /// Relation the rule reads.
    pub relation: Relation,
    /// How the fact is compared.
    pub comparison: Comparison,
    /// Importance stated in the profile, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<f64>,
}

impl Rule {
    /// Creates a rule with no stated importance.
    #[must_use]
    pub fn new(relation: Relation, comparison: Comparison) -> Self {
        Self {
            id: RuleId::for_rule(relation, &comparison),
            relation,
            comparison,
            importance: None,
        }
    }

    /// Scores one entity in `[0, 1]`.
    #[must_use]
    pub fn evaluate(&self, store: &FactStore, entity: &str) -> f64 {
        self.comparison.evaluate(store.get(self.relation, entity))
    }

    /// Entities scoring above zero, found through the store's indexes.
    #[must_use]
    pub fn matching(&self, store: &FactStore) -> BTreeSet<EntityId> {
        match &self.comparison {
            Comparison::SetIntersect { targets } => targets
                .iter()
                .flat_map(|t| store.entities_by_value(self.relation, &FactValue::Category(t.clone())))
                .collect(),
            Comparison::Equals { target } => {
                store.entities_by_value(self.relation, &FactValue::Category(target.clone()))
            }
            Comparison::InRange { min, max } => store.entities_in_range(self.relation, *min, *max),
        }
    }
}

/// The fixed list of rules for one profile, in schema order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Derives one rule per supplied profile field.
    #[must_use]
    pub fn from_profile(profile: &Profile) -> Self {
        let rules = profile
            .iter()
            .map(|(relation, field)| {
                let mut rule = Rule::new(relation, Comparison::from(&field.preference));
                rule.importance = field.importance;
                rule
            })
            .collect();
        Self { rules }
    }

    /// Rules in schema order.
    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }

    /// Looks up a rule by id.
    #[must_use]
    pub fn get(&self, id: &RuleId) -> Option<&Rule> {
        self.rules.iter().find(|r| &r.id == id)
    }

    /// Rule ids in schema order.
    pub fn ids(&self) -> impl Iterator<Item = &RuleId> {
        self.rules.iter().map(|r| &r.id)
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True if the profile produced no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}
