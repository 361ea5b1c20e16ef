// Model Selector - RAM-based tier selection
// Picks the Big or Small model once at startup from available system memory.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Model size tiers — Small is the floor, Big the preferred tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    /// Accurate, memory-hungry model
    Big,
    /// Fast model that runs wherever anything runs
    Small,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTier::Big => "big",
            ModelTier::Small => "small",
        }
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static data attached to a tier for the lifetime of the process
#[derive(Debug, Clone, PartialEq)]
pub struct TierSpec {
    /// Model identifier understood by the runtime (e.g., "tinyllama:1.1b")
    pub model_id: String,
    /// Minimum available RAM in GiB
    pub min_ram_gib: f64,
}

impl TierSpec {
    pub fn new(model_id: impl Into<String>, min_ram_gib: f64) -> Self {
        Self {
            model_id: model_id.into(),
            min_ram_gib,
        }
    }
}

/// Model id and RAM floor for both tiers
#[derive(Debug, Clone, PartialEq)]
pub struct TierTable {
    big: TierSpec,
    small: TierSpec,
}

impl TierTable {
    pub fn new(big: TierSpec, small: TierSpec) -> Self {
        Self { big, small }
    }

    pub fn spec(&self, tier: ModelTier) -> &TierSpec {
        match tier {
            ModelTier::Big => &self.big,
            ModelTier::Small => &self.small,
        }
    }

    pub fn model_id(&self, tier: ModelTier) -> &str {
        &self.spec(tier).model_id
    }
}

/// No tier fits in the memory that is currently available
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Insufficient RAM ({available_gib:.2} GiB) - need at least {required_gib} GiB")]
pub struct InsufficientResources {
    /// Measured available RAM
    pub available_gib: f64,
    /// Smallest tier's requirement
    pub required_gib: f64,
}

/// Model selection based on system resources
pub struct ModelSelector;

impl ModelSelector {
    /// Select a tier for `available_gib` of free memory.
    ///
    /// - `>= big.min_ram_gib`   → Big
    /// - `>= small.min_ram_gib` → Small
    /// - otherwise              → `InsufficientResources`
    pub fn select(
        table: &TierTable,
        available_gib: f64,
    ) -> Result<ModelTier, InsufficientResources> {
        let tier = if available_gib >= table.big.min_ram_gib {
            ModelTier::Big
        } else if available_gib >= table.small.min_ram_gib {
            ModelTier::Small
        } else {
            tracing::warn!(
                available_gib,
                required_gib = table.small.min_ram_gib,
                "Not enough RAM for any model tier"
            );
            return Err(InsufficientResources {
                available_gib,
                required_gib: table.small.min_ram_gib,
            });
        };

        tracing::info!(
            "{:.2} GiB RAM available → {} tier ({})",
            available_gib,
            tier,
            table.model_id(tier)
        );
        Ok(tier)
    }
}
