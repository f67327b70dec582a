//! User preference profiles.
//!
//! A profile holds at most one stated preference per relation: a set of
//! acceptable labels, a single label, or a numeric range. Profiles are
//! validated as a whole before any rule is derived from them; a profile
//! value is never silently repaired or defaulted.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::relation::{normalize_category, Relation, ValueKind};
use crate::storage::FactStore;
use crate::value::FactValue;

/// Source of the legal labels for each relation.
///
/// Relations with a closed vocabulary in the schema are always checked
/// against it; this trait only decides the open ones.
pub trait KnownDomain {
    /// Returns true if `label` (already normalized) is a known value of `relation`.
    fn is_known(&self, relation: Relation, label: &str) -> bool;
}

impl KnownDomain for FactStore {
    fn is_known(&self, relation: Relation, label: &str) -> bool {
        !self
            .entities_by_value(relation, &FactValue::Category(label.to_string()))
            .is_empty()
    }
}

/// Domain that accepts every label outside the schema's closed vocabularies.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenDomain;

impl KnownDomain for OpenDomain {
    fn is_known(&self, _relation: Relation, _label: &str) -> bool {
        true
    }
}

fn in_domain(domain: &dyn KnownDomain, relation: Relation, label: &str) -> bool {
    match relation.closed_domain() {
        Some(vocabulary) => vocabulary.contains(&label),
        None => domain.is_known(relation, label),
    }
}

/// A stated preference for one relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Preference {
    /// Any of these labels (set-valued relations).
    AnyOf { values: BTreeSet<String> },
    /// Exactly this label (single-category relations).
    Exactly { value: String },
    /// A value within `[min, max]` (numeric relations).
    Between { min: f64, max: f64 },
}

impl Preference {
    /// Builds an `AnyOf` preference.
    pub fn any_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::AnyOf {
            values: values.into_iter().map(|s| s.as_ref().to_string()).collect(),
        }
    }

    /// Builds an `Exactly` preference.
    pub fn exactly(value: impl Into<String>) -> Self {
        Self::Exactly {
            value: value.into(),
        }
    }

    /// Builds a `Between` preference.
    #[must_use]
    pub const fn between(min: f64, max: f64) -> Self {
        Self::Between { min, max }
    }

    const fn expected_for(kind: ValueKind) -> &'static str {
        match kind {
            ValueKind::Number => "a [min, max] range",
            ValueKind::Category => "a single value",
            ValueKind::CategorySet => "a value or list of values",
        }
    }

    fn validate(self, relation: Relation, domain: &dyn KnownDomain) -> Result<Self, ValidationError> {
        let name = || relation.name().to_string();
        let shape_error = || ValidationError::PreferenceShape {
            relation: name(),
            expected: Self::expected_for(relation.value_kind()),
        };

        match (relation.value_kind(), self) {
            (ValueKind::CategorySet, Self::AnyOf { values }) => {
                let values: BTreeSet<String> = values
                    .iter()
                    .map(|v| normalize_category(v))
                    .filter(|v| !v.is_empty())
                    .collect();
                if values.is_empty() {
                    return Err(ValidationError::EmptyPreference { relation: name() });
                }
                if let Some(unknown) = values.iter().find(|v| !in_domain(domain, relation, v)) {
                    return Err(ValidationError::OutsideDomain {
                        relation: name(),
                        value: unknown.clone(),
                    });
                }
                Ok(Self::AnyOf { values })
            }
            (ValueKind::Category, Self::Exactly { value }) => {
                let value = normalize_category(&value);
                if value.is_empty() {
                    return Err(ValidationError::EmptyPreference { relation: name() });
                }
                if !in_domain(domain, relation, &value) {
                    return Err(ValidationError::OutsideDomain {
                        relation: name(),
                        value,
                    });
                }
                Ok(Self::Exactly { value })
            }
            (ValueKind::Number, Self::Between { min, max }) => {
                if !min.is_finite() || !max.is_finite() {
                    return Err(ValidationError::NonFiniteBound { relation: name() });
                }
                if min > max {
                    return Err(ValidationError::InvalidRange {
                        relation: name(),
                        min,
                        max,
                    });
                }
                Ok(Self::Between { min, max })
            }
            _ => Err(shape_error()),
        }
    }
}

/// One validated profile entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileField {
    /// What the user asked for.
    pub preference: Preference,
    /// How much the user cares about this field; seeds the rule's weight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<f64>,
}

/// A validated user profile.
///
/// # Examples
///
/// ```
/// use tastekb::{OpenDomain, Preference, Profile, Relation};
///
/// let profile = Profile::builder()
///     .set(Relation::Genre, Preference::any_of(["rock"]))
///     .set(Relation::Loudness, Preference::between(-15.0, -5.0))
///     .build(&OpenDomain)
///     .unwrap();
/// assert_eq!(profile.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Profile {
    fields: BTreeMap<Relation, ProfileField>,
}

impl Profile {
    /// Starts building a profile.
    #[must_use]
    pub fn builder() -> ProfileBuilder {
        ProfileBuilder::default()
    }

    /// Parses and validates a flat survey mapping of relation name to answer.
    ///
    /// Accepted answers per relation kind:
    /// - numeric: `[min, max]` or `{"min": .., "max": .., "importance": ..}`
    /// - single category: `"label"` or `{"value": "label", "importance": ..}`
    /// - category set: `"label"`, `["a", "b"]` or `{"values": [..], "importance": ..}`
    ///
    /// `null` answers leave the field unset.
    ///
    /// # Errors
    /// Unknown relation names, malformed answers, or any validation failure.
    pub fn from_survey(raw: &serde_json::Value, domain: &dyn KnownDomain) -> Result<Self, ValidationError> {
        let serde_json::Value::Object(answers) = raw else {
            return Err(ValidationError::PreferenceShape {
                relation: "profile".to_string(),
                expected: "a JSON object",
            });
        };

        let mut builder = Self::builder();
        for (name, answer) in answers {
            let relation: Relation = name.parse()?;
            if answer.is_null() {
                continue;
            }
            let (preference, importance) = parse_answer(relation, answer)?;
            builder = builder.set(relation, preference);
            if let Some(importance) = importance {
                builder = builder.importance(relation, importance);
            }
        }
        builder.build(domain)
    }

    /// Parses survey answers from JSON text, then as [`Profile::from_survey`].
    ///
    /// # Errors
    /// `ValidationError::MalformedSurvey` for invalid JSON, otherwise as
    /// [`Profile::from_survey`].
    pub fn from_survey_str(json: &str, domain: &dyn KnownDomain) -> Result<Self, ValidationError> {
        let raw: serde_json::Value =
            serde_json::from_str(json).map_err(|e| ValidationError::MalformedSurvey {
                reason: e.to_string(),
            })?;
        Self::from_survey(&raw, domain)
    }

    /// The field for a relation, if supplied.
    #[must_use]
    pub fn get(&self, relation: Relation) -> Option<&ProfileField> {
        self.fields.get(&relation)
    }

    /// Fields in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (Relation, &ProfileField)> {
        self.fields.iter().map(|(r, f)| (*r, f))
    }

    /// Number of supplied fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if no field was supplied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn parse_answer(
    relation: Relation,
    answer: &serde_json::Value,
) -> Result<(Preference, Option<f64>), ValidationError> {
    use serde_json::Value as Json;

    let shape_error = || ValidationError::PreferenceShape {
        relation: relation.name().to_string(),
        expected: Preference::expected_for(relation.value_kind()),
    };
    let as_labels = |items: &[Json]| -> Result<Vec<String>, ValidationError> {
        items
            .iter()
            .map(|v| v.as_str().map(str::to_string).ok_or_else(shape_error))
            .collect()
    };

    let importance = match answer.get("importance") {
        None | Some(Json::Null) => None,
        Some(v) => Some(v.as_f64().ok_or_else(shape_error)?),
    };

    let preference = match (relation.value_kind(), answer) {
        (ValueKind::Number, Json::Array(items)) if items.len() == 2 => {
            let min = items[0].as_f64().ok_or_else(shape_error)?;
            let max = items[1].as_f64().ok_or_else(shape_error)?;
            Preference::between(min, max)
        }
        (ValueKind::Number, Json::Object(map)) => {
            let min = map.get("min").and_then(Json::as_f64).ok_or_else(shape_error)?;
            let max = map.get("max").and_then(Json::as_f64).ok_or_else(shape_error)?;
            Preference::between(min, max)
        }
        (ValueKind::Category, Json::String(s)) => Preference::exactly(s.clone()),
        (ValueKind::Category, Json::Object(map)) => {
            let value = map.get("value").and_then(Json::as_str).ok_or_else(shape_error)?;
            Preference::exactly(value)
        }
        (ValueKind::CategorySet, Json::String(s)) => Preference::any_of([s]),
        (ValueKind::CategorySet, Json::Array(items)) => Preference::any_of(as_labels(items)?),
        (ValueKind::CategorySet, Json::Object(map)) => match map.get("values").or_else(|| map.get("value")) {
            Some(Json::Array(items)) => Preference::any_of(as_labels(items)?),
            Some(Json::String(s)) => Preference::any_of([s]),
            _ => return Err(shape_error()),
        },
        _ => return Err(shape_error()),
    };
    Ok((preference, importance))
}

/// Accumulates profile fields; nothing is checked until [`ProfileBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct ProfileBuilder {
    preferences: BTreeMap<Relation, Preference>,
    importance: BTreeMap<Relation, f64>,
}

impl ProfileBuilder {
    /// Sets (or replaces) the preference for a relation.
    #[must_use]
    pub fn set(mut self, relation: Relation, preference: Preference) -> Self {
        self.preferences.insert(relation, preference);
        self
    }

    /// Sets the importance of a relation's preference.
    #[must_use]
    pub fn importance(mut self, relation: Relation, importance: f64) -> Self {
        self.importance.insert(relation, importance);
        self
    }

    /// Validates every field against the schema and the given domain.
    ///
    /// # Errors
    /// An importance for a relation without a preference, otherwise the
    /// first invalid field, in schema order.
    pub fn build(self, domain: &dyn KnownDomain) -> Result<Profile, ValidationError> {
        if let Some(orphan) = self.importance.keys().find(|r| !self.preferences.contains_key(*r)) {
            return Err(ValidationError::ImportanceWithoutPreference {
                relation: orphan.name().to_string(),
            });
        }
        let mut fields = BTreeMap::new();
        for (relation, preference) in self.preferences {
            let preference = preference.validate(relation, domain)?;
            let importance = match self.importance.get(&relation) {
                Some(&value) if !value.is_finite() || value < 0.0 => {
                    return Err(ValidationError::InvalidImportance {
                        relation: relation.name().to_string(),
                        value,
                    });
                }
                other => other.copied(),
            };
            fields.insert(
                relation,
                ProfileField {
                    preference,
                    importance,
                },
            );
        }
        Ok(Profile { fields })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FactRecord;
    use serde_json::json;

    fn store() -> FactStore {
        FactStore::from_records(vec![
            FactRecord::new(Relation::Genre, "a", FactValue::categories(["rock", "pop"])),
            FactRecord::new(Relation::Genre, "b", FactValue::categories(["jazz"])),
            FactRecord::new(Relation::Timbre, "a", "bright"),
        ])
        .unwrap()
    }

    #[test]
    fn test_builder_normalizes() {
        let profile = Profile::builder()
            .set(Relation::Genre, Preference::any_of([" Rock", "POP"]))
            .build(&store())
            .unwrap();
        assert_eq!(
            profile.get(Relation::Genre).unwrap().preference,
            Preference::any_of(["pop", "rock"])
        );
    }

    #[test]
    fn test_inverted_range_rejected() {
        let err = Profile::builder()
            .set(Relation::Loudness, Preference::between(-5.0, -15.0))
            .build(&OpenDomain)
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidRange { .. }));
    }

    #[test]
    fn test_non_finite_bound_rejected() {
        let err = Profile::builder()
            .set(Relation::Tempo, Preference::between(f64::NEG_INFINITY, 120.0))
            .build(&OpenDomain)
            .unwrap_err();
        assert!(matches!(err, ValidationError::NonFiniteBound { .. }));
    }

    #[test]
    fn test_degenerate_range_allowed() {
        let profile = Profile::builder()
            .set(Relation::Tempo, Preference::between(120.0, 120.0))
            .build(&OpenDomain)
            .unwrap();
        assert_eq!(profile.len(), 1);
    }

    #[test]
    fn test_value_outside_store_domain() {
        let err = Profile::builder()
            .set(Relation::Genre, Preference::any_of(["rock", "polka"]))
            .build(&store())
            .unwrap_err();
        assert!(matches!(err, ValidationError::OutsideDomain { ref value, .. } if value == "polka"));
    }

    #[test]
    fn test_closed_domain_applies_even_when_open() {
        let err = Profile::builder()
            .set(Relation::Danceable, Preference::exactly("very"))
            .build(&OpenDomain)
            .unwrap_err();
        assert!(matches!(err, ValidationError::OutsideDomain { .. }));

        // Closed vocabulary wins over the store: no song is "sad", it is still valid.
        Profile::builder()
            .set(Relation::Mood, Preference::any_of(["sad"]))
            .build(&store())
            .unwrap();
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let err = Profile::builder()
            .set(Relation::Loudness, Preference::exactly("loud"))
            .build(&OpenDomain)
            .unwrap_err();
        assert!(matches!(err, ValidationError::PreferenceShape { .. }));
    }

    #[test]
    fn test_empty_set_rejected() {
        let err = Profile::builder()
            .set(Relation::Genre, Preference::any_of(["  "]))
            .build(&OpenDomain)
            .unwrap_err();
        assert!(matches!(err, ValidationError::EmptyPreference { .. }));
    }

    #[test]
    fn test_negative_importance_rejected() {
        let err = Profile::builder()
            .set(Relation::Genre, Preference::any_of(["rock"]))
            .importance(Relation::Genre, -1.0)
            .build(&OpenDomain)
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidImportance { .. }));
    }

    #[test]
    fn test_importance_without_preference_rejected() {
        let err = Profile::builder()
            .set(Relation::Genre, Preference::any_of(["rock"]))
            .importance(Relation::Tempo, 2.0)
            .build(&OpenDomain)
            .unwrap_err();
        assert!(matches!(
            err,
            ValidationError::ImportanceWithoutPreference { ref relation } if relation == "tempo"
        ));
    }

    #[test]
    fn test_from_survey() {
        let raw = json!({
            "genre": "rock",
            "has_loudness": [-15, -5],
            "timbre": {"value": "Bright", "importance": 2.5},
            "mood": null
        });
        let profile = Profile::from_survey(&raw, &store()).unwrap();
        assert_eq!(profile.len(), 3);
        assert!(profile.get(Relation::Mood).is_none());
        assert_eq!(profile.get(Relation::Timbre).unwrap().importance, Some(2.5));
        assert_eq!(
            profile.get(Relation::Loudness).unwrap().preference,
            Preference::between(-15.0, -5.0)
        );
    }

    #[test]
    fn test_from_survey_str() {
        let profile = Profile::from_survey_str(r#"{"genre": ["rock"]}"#, &store()).unwrap();
        assert_eq!(profile.len(), 1);

        let err = Profile::from_survey_str("{genre: rock", &store()).unwrap_err();
        assert!(matches!(err, ValidationError::MalformedSurvey { .. }));
    }

    #[test]
    fn test_from_survey_unknown_relation() {
        let err = Profile::from_survey(&json!({"colour": "red"}), &OpenDomain).unwrap_err();
        assert!(matches!(err, ValidationError::Schema(_)));
    }

    #[test]
    fn test_from_survey_bad_shapes() {
        assert!(Profile::from_survey(&json!({"tempo": [100]}), &OpenDomain).is_err());
        assert!(Profile::from_survey(&json!({"tempo": "fast"}), &OpenDomain).is_err());
        assert!(Profile::from_survey(&json!({"genre": ["rock", 1]}), &OpenDomain).is_err());
        assert!(Profile::from_survey(&json!(["genre"]), &OpenDomain).is_err());
    }

    #[test]
    fn test_from_survey_object_range() {
        let profile =
            Profile::from_survey(&json!({"tempo": {"min": 100, "max": 130, "importance": 0.5}}), &OpenDomain)
                .unwrap();
        let field = profile.get(Relation::Tempo).unwrap();
        assert_eq!(field.preference, Preference::between(100.0, 130.0));
        assert_eq!(field.importance, Some(0.5));
    }

    #[test]
    fn test_iteration_in_schema_order() {
        let profile = Profile::builder()
            .set(Relation::Mood, Preference::any_of(["happy"]))
            .set(Relation::Tempo, Preference::between(90.0, 110.0))
            .build(&OpenDomain)
            .unwrap();
        let order: Vec<Relation> = profile.iter().map(|(r, _)| r).collect();
        assert_eq!(order, vec![Relation::Tempo, Relation::Mood]);
    }
}
