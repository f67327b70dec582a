//! The fixed relation schema.
//!
//! Every fact names one of a known set of relations. A relation fixes the
//! shape of its values and how (or whether) the store indexes them, so a
//! fact can be checked against the schema without looking at any other
//! fact.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// Shape of the values a relation holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// A single real number.
    Number,
    /// A single category label.
    Category,
    /// A set of category labels.
    CategorySet,
}

impl ValueKind {
    /// Human-readable name used in error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Category => "category",
            Self::CategorySet => "category set",
        }
    }
}

/// How the store indexes a relation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IndexKind {
    /// No secondary index; range queries scan the fact map.
    None,
    /// One bucket per distinct category (set members are indexed individually).
    Categorical,
    /// Numeric values grouped into fixed-width buckets.
    Bucketed {
        /// Bucket width in the relation's unit.
        width: f64,
    },
}

/// Known relations over songs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// Beats per minute.
    #[serde(alias = "has_tempo")]
    Tempo,
    /// Musical key, e.g. "c# minor".
    #[serde(alias = "has_key")]
    Key,
    /// Major or minor.
    #[serde(alias = "has_mode")]
    Mode,
    /// Average loudness.
    #[serde(alias = "has_loudness")]
    Loudness,
    /// Length in seconds.
    #[serde(alias = "has_duration")]
    Duration,
    /// Genre labels.
    #[serde(alias = "has_genre")]
    Genre,
    /// "danceable" or "not_danceable".
    #[serde(alias = "has_danceable")]
    Danceable,
    /// "voice" or "instrumental".
    #[serde(alias = "has_voice_instrumental")]
    VoiceInstrumental,
    /// Timbre label.
    #[serde(alias = "has_timbre")]
    Timbre,
    /// Mood labels.
    #[serde(alias = "has_mood")]
    Mood,
    /// Producer names.
    #[serde(alias = "has_producer")]
    Producer,
    /// Language codes.
    #[serde(alias = "has_language")]
    Language,
}

const TEMPO_BUCKET_WIDTH: f64 = 10.0;

const DANCEABLE_DOMAIN: &[&str] = &["danceable", "not_danceable"];
const VOICE_INSTRUMENTAL_DOMAIN: &[&str] = &["voice", "instrumental"];
const MODE_DOMAIN: &[&str] = &["major", "minor"];
const MOOD_DOMAIN: &[&str] = &["relaxed", "sad", "happy", "party", "acoustic", "electronic"];

impl Relation {
    /// Every relation, in schema order.
    pub const ALL: [Self; 12] = [
        Self::Tempo,
        Self::Key,
        Self::Mode,
        Self::Loudness,
        Self::Duration,
        Self::Genre,
        Self::Danceable,
        Self::VoiceInstrumental,
        Self::Timbre,
        Self::Mood,
        Self::Producer,
        Self::Language,
    ];

    /// Canonical short name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Tempo => "tempo",
            Self::Key => "key",
            Self::Mode => "mode",
            Self::Loudness => "loudness",
            Self::Duration => "duration",
            Self::Genre => "genre",
            Self::Danceable => "danceable",
            Self::VoiceInstrumental => "voice_instrumental",
            Self::Timbre => "timbre",
            Self::Mood => "mood",
            Self::Producer => "producer",
            Self::Language => "language",
        }
    }

    /// Key of this relation's fact map in a knowledge-base document.
    #[must_use]
    pub const fn document_key(self) -> &'static str {
        match self {
            Self::Tempo => "has_tempo",
            Self::Key => "has_key",
            Self::Mode => "has_mode",
            Self::Loudness => "has_loudness",
            Self::Duration => "has_duration",
            Self::Genre => "has_genre",
            Self::Danceable => "has_danceable",
            Self::VoiceInstrumental => "has_voice_instrumental",
            Self::Timbre => "has_timbre",
            Self::Mood => "has_mood",
            Self::Producer => "has_producer",
            Self::Language => "has_language",
        }
    }

    /// Kind of value this relation holds.
    #[must_use]
    pub const fn value_kind(self) -> ValueKind {
        match self {
            Self::Tempo | Self::Loudness | Self::Duration => ValueKind::Number,
            Self::Genre | Self::Mood | Self::Producer => ValueKind::CategorySet,
            Self::Key
            | Self::Mode
            | Self::Danceable
            | Self::VoiceInstrumental
            | Self::Timbre
            | Self::Language => ValueKind::Category,
        }
    }

    /// How this relation is indexed.
    #[must_use]
    pub const fn index_kind(self) -> IndexKind {
        match self {
            Self::Tempo => IndexKind::Bucketed {
                width: TEMPO_BUCKET_WIDTH,
            },
            Self::Loudness | Self::Duration | Self::Key => IndexKind::None,
            Self::Mode
            | Self::Genre
            | Self::Danceable
            | Self::VoiceInstrumental
            | Self::Timbre
            | Self::Mood
            | Self::Producer
            | Self::Language => IndexKind::Categorical,
        }
    }

    /// Returns true if the relation has a secondary index.
    #[must_use]
    pub const fn is_indexed(self) -> bool {
        !matches!(self.index_kind(), IndexKind::None)
    }

    /// Fixed vocabulary for relations whose labels come from a closed classifier.
    ///
    /// Relations without one take their domain from the loaded facts.
    #[must_use]
    pub const fn closed_domain(self) -> Option<&'static [&'static str]> {
        match self {
            Self::Danceable => Some(DANCEABLE_DOMAIN),
            Self::VoiceInstrumental => Some(VOICE_INSTRUMENTAL_DOMAIN),
            Self::Mode => Some(MODE_DOMAIN),
            Self::Mood => Some(MOOD_DOMAIN),
            _ => None,
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Relation {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace('-', "_");
        let bare = key.strip_prefix("has_").unwrap_or(&key);
        Self::ALL
            .into_iter()
            .find(|r| r.name() == bare)
            .ok_or_else(|| SchemaError::UnknownRelation {
                name: s.to_string(),
            })
    }
}

/// Normalizes a category label the way the store indexes it.
#[must_use]
pub fn normalize_category(label: &str) -> String {
    label.trim().to_lowercase()
}

/// Bucket number for a value under a bucketed index.
#[must_use]
pub fn bucket_of(value: f64, width: f64) -> i64 {
    #[allow(clippy::cast_possible_truncation)]
    let bucket = (value / width).floor() as i64;
    bucket
}

/// Human-readable label of a bucket, e.g. `"120-130"`.
#[must_use]
pub fn bucket_label(bucket: i64, width: f64) -> String {
    #[allow(clippy::cast_precision_loss)]
    let lo = bucket as f64 * width;
    format!("{lo}-{}", lo + width)
}
