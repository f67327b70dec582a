//! Configuration for weights, sampling, refinement and sessions.
//!
//! Every config has a `Default` with the documented values and a
//! `validate` step; nothing downstream re-checks these fields.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::relation::Relation;

fn check_fraction(field: &str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::config(format!("{field} must be within [0, 1] (got {value})")))
    }
}

fn check_non_negative(field: &str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ValidationError::config(format!("{field} must be finite and >= 0 (got {value})")))
    }
}

/// Initial weight assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightConfig {
    /// Weight of every rule without a stated importance.
    pub initial_weight: f64,
    /// Lower bound no weight ever drops below.
    pub floor: f64,
    /// Seed a rule's weight from its profile importance when present.
    pub use_profile_importance: bool,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            initial_weight: 1.0,
            floor: 0.0,
            use_profile_importance: true,
        }
    }
}

impl WeightConfig {
    /// # Errors
    /// Negative or non-finite weights or floor.
    pub fn validate(self) -> Result<Self, ValidationError> {
        check_non_negative("initial_weight", self.initial_weight)?;
        check_non_negative("weight floor", self.floor)?;
        Ok(self)
    }
}

/// Weight refinement parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinerConfig {
    /// Step size of each update.
    pub alpha: f64,
    /// Weights are clamped to at least this value.
    pub floor: f64,
}

impl Default for RefinerConfig {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            floor: 0.0,
        }
    }
}

impl RefinerConfig {
    /// # Errors
    /// Negative or non-finite alpha or floor.
    pub fn validate(self) -> Result<Self, ValidationError> {
        check_non_negative("alpha", self.alpha)?;
        check_non_negative("refiner floor", self.floor)?;
        Ok(self)
    }
}

/// How the first batch is chosen, before any rating exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum InitialPolicy {
    /// Highest-scoring entities.
    #[default]
    TopK,
    /// One entity per index bucket of `relation`, round-robin.
    Stratified { relation: Relation },
}

/// Batch selection parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Entities per batch.
    pub batch_size: usize,
    /// Selection before the first rating.
    pub initial_policy: InitialPolicy,
    /// Share of unrated entities, by rank, forming the exploit tier.
    pub exploit_fraction: f64,
    /// Share of unrated entities nearest the score midpoint forming the boundary tier.
    pub boundary_fraction: f64,
    /// Share of each adaptive batch drawn from the exploit tier.
    pub exploit_share: f64,
    /// Seed for tie-breaking between equally ranked entities.
    pub seed: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            initial_policy: InitialPolicy::TopK,
            exploit_fraction: 0.4,
            boundary_fraction: 0.2,
            exploit_share: 0.6,
            seed: 0,
        }
    }
}

impl SamplerConfig {
    /// # Errors
    /// Zero batch size, fractions outside `[0, 1]`, or stratifying over a
    /// relation without an index.
    pub fn validate(self) -> Result<Self, ValidationError> {
        if self.batch_size == 0 {
            return Err(ValidationError::config("batch_size must be at least 1"));
        }
        check_fraction("exploit_fraction", self.exploit_fraction)?;
        check_fraction("boundary_fraction", self.boundary_fraction)?;
        check_fraction("exploit_share", self.exploit_share)?;
        if let InitialPolicy::Stratified { relation } = self.initial_policy {
            if !relation.is_indexed() {
                return Err(ValidationError::config(format!(
                    "cannot stratify over unindexed relation '{relation}'"
                )));
            }
        }
        Ok(self)
    }
}

/// Everything a preference session needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Batch selection.
    pub sampler: SamplerConfig,
    /// Weight refinement.
    pub refiner: RefinerConfig,
    /// Initial weights.
    pub weights: WeightConfig,
    /// Stop after this many refinement rounds.
    pub max_rounds: Option<usize>,
}

impl SessionConfig {
    /// Validates every section.
    ///
    /// # Errors
    /// The first invalid section, or `max_rounds` of zero.
    pub fn validate(self) -> Result<Self, ValidationError> {
        if self.max_rounds == Some(0) {
            return Err(ValidationError::config("max_rounds must be at least 1"));
        }
        Ok(Self {
            sampler: self.sampler.validate()?,
            refiner: self.refiner.validate()?,
            weights: self.weights.validate()?,
            max_rounds: self.max_rounds,
        })
    }
}
