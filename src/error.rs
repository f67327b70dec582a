//! Error types for TasteKB.
//!
//! All errors are strongly typed using thiserror, split along the same
//! lines callers need to react to them: schema problems are fatal at load
//! time, validation problems are reported back to whoever supplied the
//! profile, configuration or feedback.
//!
//! Missing facts, short sampler batches and skipped refinements are not
//! errors and never appear here.

use thiserror::Error;

/// Schema errors raised while loading or querying facts.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Relation name outside the schema.
    #[error("Unknown relation '{name}'")]
    UnknownRelation {
        name: String,
    },

    /// Value of the wrong kind for its relation.
    #[error("Relation '{relation}' expects a {expected} value for entity '{entity}', got {actual}")]
    ValueType {
        relation: String,
        entity: String,
        expected: &'static str,
        actual: String,
    },

    /// NaN or infinite number.
    #[error("Relation '{relation}' has a non-finite value for entity '{entity}'")]
    NonFinite {
        relation: String,
        entity: String,
    },

    /// Blank entity id.
    #[error("Entity id cannot be empty")]
    EmptyEntityId,

    /// Document that is not valid JSON of the expected shape.
    #[error("Malformed knowledge base document: {reason}")]
    MalformedDocument {
        reason: String,
    },
}

/// Validation errors for profiles, configuration and feedback.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Range with `min > max`.
    #[error("Invalid range for '{relation}': min ({min}) must not exceed max ({max})")]
    InvalidRange {
        relation: String,
        min: f64,
        max: f64,
    },

    /// NaN or infinite range bound.
    #[error("Range bound for '{relation}' must be finite")]
    NonFiniteBound {
        relation: String,
    },

    /// Label outside the relation's known values.
    #[error("Value '{value}' is not in the known domain of '{relation}'")]
    OutsideDomain {
        relation: String,
        value: String,
    },

    /// Preference with no usable value.
    #[error("Preference for '{relation}' cannot be empty")]
    EmptyPreference {
        relation: String,
    },

    /// Preference of the wrong shape for its relation.
    #[error("Preference for '{relation}' must be {expected}")]
    PreferenceShape {
        relation: String,
        expected: &'static str,
    },

    /// Negative or non-finite importance.
    #[error("Importance for '{relation}' must be finite and non-negative (got {value})")]
    InvalidImportance {
        relation: String,
        value: f64,
    },

    /// Importance stated for a relation with no preference.
    #[error("Importance given for '{relation}' but no preference is set")]
    ImportanceWithoutPreference {
        relation: String,
    },

    /// Survey answers that are not valid JSON.
    #[error("Malformed survey: {reason}")]
    MalformedSurvey {
        reason: String,
    },

    /// Configuration value out of bounds.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },

    /// Entity not present in the store.
    #[error("Unknown entity: {id}")]
    UnknownEntity {
        id: String,
    },

    /// Schema error raised while validating.
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl ValidationError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}

/// Top-level error type for TasteKB.
#[derive(Debug, Error)]
pub enum TasteError {
    /// Schema error.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Validation error.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unexpected internal failure.
    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl TasteError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a schema error.
    #[must_use]
    pub const fn is_schema(&self) -> bool {
        matches!(self, Self::Schema(_))
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an I/O error.
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

/// Result type alias for TasteKB operations.
pub type TasteResult<T> = Result<T, TasteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_relation_message() {
        let err = SchemaError::UnknownRelation {
            name: "has_colour".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("has_colour"));
        assert!(msg.contains("Unknown relation"));
    }

    #[test]
    fn test_value_type_names_relation_and_entity() {
        let err = SchemaError::ValueType {
            relation: "tempo".to_string(),
            entity: "song-1".to_string(),
            expected: "number",
            actual: "string".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("tempo"));
        assert!(msg.contains("song-1"));
        assert!(msg.contains("number"));
    }

    #[test]
    fn test_invalid_range_message() {
        let err = ValidationError::InvalidRange {
            relation: "loudness".to_string(),
            min: -5.0,
            max: -15.0,
        };
        let msg = format!("{err}");
        assert!(msg.contains("-5"));
        assert!(msg.contains("-15"));
    }

    #[test]
    fn test_taste_error_from_schema() {
        let err: TasteError = SchemaError::EmptyEntityId.into();
        assert!(err.is_schema());
        assert!(!err.is_validation());
    }

    #[test]
    fn test_taste_error_from_validation() {
        let err: TasteError = ValidationError::config("batch_size must be positive").into();
        assert!(err.is_validation());
        assert!(format!("{err}").contains("batch_size"));
    }

    #[test]
    fn test_validation_wraps_schema() {
        let err: ValidationError = SchemaError::UnknownRelation {
            name: "colour".to_string(),
        }
        .into();
        assert!(format!("{err}").contains("colour"));
    }

    #[test]
    fn test_taste_error_internal() {
        let err = TasteError::internal("unexpected state");
        assert!(!err.is_schema());
        assert!(format!("{err}").contains("unexpected state"));
    }
}
