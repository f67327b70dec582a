//! # TasteKB - Indexed Song Facts and Adaptive Preference Scoring
//!
//! TasteKB keeps a knowledge base of song attributes in memory, indexed for
//! multi-criteria queries, and learns what a listener likes from a handful
//! of ratings.
//!
//! ## Core Concepts
//!
//! - **FactStore**: typed facts per (relation, song), with secondary indexes
//!   that never drift from the facts they summarize
//! - **Profile**: a validated set of stated preferences
//! - **RuleSet / WeightVector / Scorer**: one weighted rule per preference,
//!   combined into a score per song
//! - **PreferenceSession**: presents batches, records ratings and refines
//!   the weights between batches
//!
//! ## Usage
//!
//! ```rust
//! use tastekb::{FactRecord, FactStore, FactValue, Preference, Profile, Relation, RuleSet, Scorer,
//!     WeightVector};
//!
//! let store = FactStore::from_records(vec![
//!     FactRecord::new(Relation::Genre, "a", FactValue::categories(["rock", "pop"])),
//!     FactRecord::new(Relation::Loudness, "a", -8.0),
//!     FactRecord::new(Relation::Genre, "b", FactValue::categories(["jazz"])),
//!     FactRecord::new(Relation::Loudness, "b", -20.0),
//! ])?;
//!
//! let profile = Profile::builder()
//!     .set(Relation::Genre, Preference::any_of(["rock"]))
//!     .set(Relation::Loudness, Preference::between(-15.0, -5.0))
//!     .build(&store)?;
//!
//! let rules = RuleSet::from_profile(&profile);
//! let weights = WeightVector::uniform(&rules, 1.0);
//! let scorer = Scorer::new(&store, &rules, &weights);
//! assert!(scorer.score("a") > scorer.score("b"));
//! # Ok::<(), tastekb::TasteError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Facts and storage
pub mod entity;
pub mod error;
pub mod relation;
pub mod storage;
pub mod value;

// Preferences and scoring
pub mod config;
pub mod ledger;
pub mod profile;
pub mod refiner;
pub mod rules;
pub mod sampler;
pub mod scorer;
pub mod session;
pub mod weights;

pub use entity::{EntityId, Song};
pub use error::{SchemaError, TasteError, TasteResult, ValidationError};
pub use relation::{IndexKind, Relation, ValueKind};
pub use storage::{
    FactRecord, FactStore, KnowledgeBaseDocument, NumericSummary, RelationCoverage, StoreStats,
    ValueIndex,
};
pub use value::FactValue;

pub use config::{InitialPolicy, RefinerConfig, SamplerConfig, SessionConfig, WeightConfig};
pub use ledger::{Rating, RatingEntry, RatingLedger};
pub use profile::{KnownDomain, OpenDomain, Preference, Profile, ProfileBuilder, ProfileField};
pub use refiner::{RefinementOutcome, WeightRefiner};
pub use rules::{Comparison, Rule, RuleId, RuleSet};
pub use sampler::{Batch, Sampler, SamplerPhase};
pub use scorer::{RuleContribution, ScoredEntity, Scorer};
pub use session::{PreferenceSession, SessionId};
pub use weights::WeightVector;
