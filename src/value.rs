//! Values that facts can hold.
//!
//! A fact value is a number, a single category label, or a set of
//! category labels. Which one is legal depends on the relation; the store
//! rejects mismatches instead of coercing them.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::EntityId;
use crate::error::SchemaError;
use crate::relation::{normalize_category, Relation, ValueKind};

/// A single fact value.
///
/// # Examples
///
/// ```
/// use tastekb::FactValue;
///
/// let genres = FactValue::categories(["rock", "pop"]);
/// assert!(genres.has_category("rock"));
/// assert_eq!(FactValue::Number(-8.0).as_number(), Some(-8.0));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FactValue {
    /// Numeric attribute.
    Number(f64),
    /// Single label.
    Category(String),
    /// Set of labels.
    Categories(BTreeSet<String>),
}

impl FactValue {
    /// Builds a category-set value from labels.
    pub fn categories<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::Categories(labels.into_iter().map(|s| s.as_ref().to_string()).collect())
    }

    /// Kind of this value.
    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Number(_) => ValueKind::Number,
            Self::Category(_) => ValueKind::Category,
            Self::Categories(_) => ValueKind::CategorySet,
        }
    }

    /// The number, if this is one.
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// The label, if this is a single category.
    pub fn as_category(&self) -> Option<&str> {
        match self {
            Self::Category(v) => Some(v),
            _ => None,
        }
    }

    /// The labels, if this is a category set.
    pub const fn as_categories(&self) -> Option<&BTreeSet<String>> {
        match self {
            Self::Categories(v) => Some(v),
            _ => None,
        }
    }

    /// Returns true if this value is, or contains, the given label.
    #[must_use]
    pub fn has_category(&self, label: &str) -> bool {
        match self {
            Self::Category(v) => v == label,
            Self::Categories(set) => set.contains(label),
            Self::Number(_) => false,
        }
    }

    /// Labels carried by this value, in sorted order. Empty for numbers.
    pub fn labels(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        match self {
            Self::Category(v) => Box::new(std::iter::once(v.as_str())),
            Self::Categories(set) => Box::new(set.iter().map(String::as_str)),
            Self::Number(_) => Box::new(std::iter::empty()),
        }
    }

    /// Checks this value against the relation's schema and normalizes labels.
    ///
    /// # Errors
    /// `SchemaError::ValueType` if the value kind does not match the relation,
    /// `SchemaError::NonFinite` for NaN or infinite numbers.
    pub fn conform(self, relation: Relation, entity: &EntityId) -> Result<Self, SchemaError> {
        let expected = relation.value_kind();
        if self.kind() != expected {
            return Err(type_error(relation, entity, self.kind().name()));
        }
        match self {
            Self::Number(v) if !v.is_finite() => Err(SchemaError::NonFinite {
                relation: relation.name().to_string(),
                entity: entity.to_string(),
            }),
            Self::Number(v) => Ok(Self::Number(v)),
            Self::Category(label) => {
                let label = normalize_category(&label);
                if label.is_empty() {
                    return Err(type_error(relation, entity, "empty string"));
                }
                Ok(Self::Category(label))
            }
            Self::Categories(set) => Ok(Self::Categories(
                set.iter()
                    .map(|s| normalize_category(s))
                    .filter(|s| !s.is_empty())
                    .collect(),
            )),
        }
    }

    /// Parses a raw JSON fact value for a relation.
    ///
    /// Numbers must be JSON numbers, categories JSON strings and category
    /// sets JSON arrays of strings. Nothing is coerced.
    ///
    /// # Errors
    /// Returns a `SchemaError` naming the relation and entity on mismatch.
    pub fn from_json(
        relation: Relation,
        entity: &EntityId,
        raw: &serde_json::Value,
    ) -> Result<Self, SchemaError> {
        use serde_json::Value as Json;

        let value = match (relation.value_kind(), raw) {
            (ValueKind::Number, Json::Number(n)) => {
                let v = n.as_f64().ok_or_else(|| type_error(relation, entity, "number out of range"))?;
                Self::Number(v)
            }
            (ValueKind::Category, Json::String(s)) => Self::Category(s.clone()),
            (ValueKind::CategorySet, Json::Array(items)) => {
                let mut set = BTreeSet::new();
                for item in items {
                    let Json::String(s) = item else {
                        return Err(type_error(relation, entity, json_type_name(item)));
                    };
                    set.insert(s.clone());
                }
                Self::Categories(set)
            }
            (_, other) => return Err(type_error(relation, entity, json_type_name(other))),
        };
        value.conform(relation, entity)
    }
}

fn type_error(relation: Relation, entity: &EntityId, actual: &str) -> SchemaError {
    SchemaError::ValueType {
        relation: relation.name().to_string(),
        entity: entity.to_string(),
        expected: relation.value_kind().name(),
        actual: actual.to_string(),
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

impl fmt::Display for FactValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{v}"),
            Self::Category(v) => write!(f, "{v}"),
            Self::Categories(set) => {
                let joined: Vec<&str> = set.iter().map(String::as_str).collect();
                write!(f, "{{{}}}", joined.join(", "))
            }
        }
    }
}

impl From<f64> for FactValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<&str> for FactValue {
    fn from(v: &str) -> Self {
        Self::Category(v.to_string())
    }
}

impl From<String> for FactValue {
    fn from(v: String) -> Self {
        Self::Category(v)
    }
}

impl From<BTreeSet<String>> for FactValue {
    fn from(v: BTreeSet<String>) -> Self {
        Self::Categories(v)
    }
}
