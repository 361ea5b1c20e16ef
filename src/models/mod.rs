// Model tiers and startup selection

pub mod model_selector;

pub use model_selector::{InsufficientResources, ModelSelector, ModelTier, TierSpec, TierTable};
