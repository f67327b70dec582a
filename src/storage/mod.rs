//! Fact storage for TasteKB.
//!
//! The in-memory [`FactStore`] owns the catalog, the per-relation fact maps
//! and the secondary indexes derived from them. Documents are the JSON
//! exchange format with the knowledge-base build step.

mod document;
mod index;
mod memory;

pub use document::KnowledgeBaseDocument;
pub use index::ValueIndex;
pub use memory::{FactRecord, FactStore, NumericSummary, RelationCoverage, StoreStats};
