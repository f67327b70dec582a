//! Knowledge-base JSON documents.
//!
//! The document is the exchange format with the knowledge-base build step:
//!
//! ```json
//! {
//!   "songs":   { "<id>": { "artist": "...", "track": "...", "album": "..." } },
//!   "facts":   { "has_genre": { "<id>": ["rock"] }, "has_tempo": { "<id>": 120.0 } },
//!   "indexes": { "by_genre": { "rock": ["<id>"] } }
//! }
//! ```
//!
//! Stored indexes are never trusted on load; the store rebuilds its own
//! from the facts.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::entity::{EntityId, Song};
use crate::error::{SchemaError, TasteResult};
use crate::relation::Relation;
use crate::storage::memory::{FactRecord, FactStore};
use crate::value::FactValue;

/// Serialized form of a knowledge base.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBaseDocument {
    /// Catalog metadata by entity id.
    #[serde(default)]
    pub songs: BTreeMap<String, Song>,
    /// Raw values by relation key, then entity id.
    #[serde(default)]
    pub facts: BTreeMap<String, BTreeMap<String, serde_json::Value>>,
    /// Indexes written by the exporter; ignored on load.
    #[serde(default)]
    pub indexes: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

impl KnowledgeBaseDocument {
    /// Parses a document without checking its facts.
    ///
    /// # Errors
    /// `SchemaError::MalformedDocument` for invalid JSON or a wrong shape.
    pub fn parse(json: &str) -> Result<Self, SchemaError> {
        serde_json::from_str(json).map_err(|e| SchemaError::MalformedDocument {
            reason: e.to_string(),
        })
    }

    fn records(&self) -> impl Iterator<Item = Result<FactRecord, SchemaError>> + '_ {
        self.facts.iter().flat_map(|(relation, by_entity)| {
            by_entity
                .iter()
                .map(move |(entity, raw)| FactRecord::parse(relation, entity, raw))
        })
    }
}

impl FactStore {
    /// Builds a store from a parsed document, failing on any schema violation.
    ///
    /// # Errors
    /// The first unknown relation or malformed value in the document.
    pub fn from_document(doc: &KnowledgeBaseDocument) -> Result<Self, SchemaError> {
        let mut store = Self::new();
        for (id, song) in &doc.songs {
            store.add_song(id.as_str(), song.clone())?;
        }
        let records = doc.records().collect::<Result<Vec<_>, _>>()?;
        store.load(records)?;
        Ok(store)
    }

    /// Builds a store from a document, skipping facts that violate the schema.
    ///
    /// Skipped facts are logged and returned so the caller can report them.
    #[must_use]
    pub fn from_document_lenient(doc: &KnowledgeBaseDocument) -> (Self, Vec<SchemaError>) {
        let mut store = Self::new();
        let mut rejected = Vec::new();
        for (id, song) in &doc.songs {
            if let Err(e) = store.add_song(id.as_str(), song.clone()) {
                warn!(error = %e, "skipping song");
                rejected.push(e);
            }
        }
        let mut records = Vec::new();
        for record in doc.records() {
            match record {
                Ok(r) => records.push(r),
                Err(e) => {
                    warn!(error = %e, "skipping fact");
                    rejected.push(e);
                }
            }
        }
        if let Err(e) = store.load(records) {
            // Parsed records already conform; this only trips on internal drift.
            warn!(error = %e, "fact batch rejected");
            rejected.push(e);
        }
        (store, rejected)
    }

    /// Parses a JSON document and builds a store from it.
    ///
    /// # Errors
    /// `SchemaError::MalformedDocument` for invalid JSON, otherwise as
    /// [`FactStore::from_document`].
    pub fn from_json_str(json: &str) -> TasteResult<Self> {
        Ok(Self::from_document(&KnowledgeBaseDocument::parse(json)?)?)
    }

    /// Parses a JSON document and builds a store, skipping facts that
    /// violate the schema.
    ///
    /// # Errors
    /// `SchemaError::MalformedDocument` for invalid JSON only.
    pub fn from_json_str_lenient(json: &str) -> Result<(Self, Vec<SchemaError>), SchemaError> {
        Ok(Self::from_document_lenient(&KnowledgeBaseDocument::parse(json)?))
    }

    /// Reads and loads a knowledge-base file.
    ///
    /// # Errors
    /// I/O failures, malformed JSON, or schema violations.
    pub fn open(path: impl AsRef<Path>) -> TasteResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let store = Self::from_json_str(&json)?;
        info!(path = %path.display(), entities = store.len(), "knowledge base opened");
        Ok(store)
    }

    /// Renders the store as a document, including its indexes.
    #[must_use]
    pub fn to_document(&self) -> KnowledgeBaseDocument {
        let mut doc = KnowledgeBaseDocument::default();
        for id in self.entities() {
            let song = self.song(id).cloned().unwrap_or_default();
            doc.songs.insert(id.to_string(), song);
        }
        for relation in Relation::ALL {
            let mut by_entity = BTreeMap::new();
            for id in self.entities() {
                if let Some(value) = self.get(relation, id) {
                    by_entity.insert(id.to_string(), value_to_json(value));
                }
            }
            if !by_entity.is_empty() {
                doc.facts.insert(relation.document_key().to_string(), by_entity);
            }
            if let Some(index) = self.index(relation) {
                let rendered = index
                    .groups()
                    .into_iter()
                    .map(|(label, ids)| (label, ids.iter().map(EntityId::to_string).collect()))
                    .collect();
                doc.indexes.insert(index_key(relation), rendered);
            }
        }
        doc
    }

    /// Serializes the store as a pretty-printed JSON document.
    ///
    /// # Errors
    /// Only if serialization itself fails.
    pub fn to_json_string(&self) -> TasteResult<String> {
        serde_json::to_string_pretty(&self.to_document())
            .map_err(|e| crate::error::TasteError::internal(e.to_string()))
    }
}

fn index_key(relation: Relation) -> String {
    match relation {
        Relation::Tempo => "by_tempo_range".to_string(),
        other => format!("by_{}", other.name()),
    }
}

fn value_to_json(value: &FactValue) -> serde_json::Value {
    match value {
        FactValue::Number(v) => serde_json::json!(v),
        FactValue::Category(v) => serde_json::Value::String(v.clone()),
        FactValue::Categories(set) => serde_json::Value::Array(
            set.iter().cloned().map(serde_json::Value::String).collect(),
        ),
    }
}
