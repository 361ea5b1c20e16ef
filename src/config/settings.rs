// Configuration structs

use anyhow::{anyhow, bail, Result};
use std::time::Duration;

use super::constants::*;
use crate::models::{ModelTier, TierSpec, TierTable};

/// Model runtime connection settings
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Ollama base URL (e.g., "http://ollama:11434")
    pub base_url: String,
    /// Startup readiness probe budget
    pub ready_timeout: Duration,
    /// Send the code-producing system prompt
    pub enable_code_exec: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            ready_timeout: Duration::from_secs_f64(DEFAULT_READY_TIMEOUT_SECS),
            enable_code_exec: true,
        }
    }
}

impl RuntimeConfig {
    /// System prompt matching the code-execution flag
    pub fn system_prompt(&self) -> &'static str {
        if self.enable_code_exec {
            SYSTEM_PROMPT_CODE
        } else {
            SYSTEM_PROMPT_PLAIN
        }
    }
}

/// Gateway configuration, resolved from the environment at startup
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Big tier model id
    pub big_model: String,
    /// Small tier model id
    pub small_model: String,
    /// Available RAM (GiB) needed for the Big tier
    pub big_model_ram_gib: f64,
    /// Available RAM (GiB) needed for the Small tier
    pub small_model_ram_gib: f64,
    /// Deadline for a single inference attempt
    pub timeout: Duration,
    /// Reserved for a latency-based fallback trigger; the active policy
    /// downgrades on timeout only.
    pub fallback_threshold: Duration,
    /// Model runtime settings
    pub runtime: RuntimeConfig,
    /// Log verbosity (e.g., "INFO", "debug")
    pub log_level: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            big_model: DEFAULT_BIG_MODEL.to_string(),
            small_model: DEFAULT_SMALL_MODEL.to_string(),
            big_model_ram_gib: DEFAULT_BIG_MODEL_RAM_GIB,
            small_model_ram_gib: DEFAULT_SMALL_MODEL_RAM_GIB,
            timeout: Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS),
            fallback_threshold: Duration::from_secs_f64(DEFAULT_FALLBACK_THRESHOLD_SECS),
            runtime: RuntimeConfig::default(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl GatewayConfig {
    /// Tier table (model ids + RAM floors) derived from this config
    pub fn tier_table(&self) -> TierTable {
        TierTable::new(
            TierSpec::new(self.big_model.clone(), self.big_model_ram_gib),
            TierSpec::new(self.small_model.clone(), self.small_model_ram_gib),
        )
    }

    /// Overall HTTP client timeout: the attempt deadline plus a grace period,
    /// so the dispatch deadline always fires first.
    pub fn client_timeout(&self) -> Result<Duration> {
        self.timeout
            .checked_add(Duration::from_secs_f64(CLIENT_TIMEOUT_GRACE_SECS))
            .ok_or_else(|| anyhow!("LLM_TIMEOUT ({:?}) is out of range", self.timeout))
    }

    /// Model id bound to `tier`
    pub fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Big => &self.big_model,
            ModelTier::Small => &self.small_model,
        }
    }

    /// Reject configurations the controller cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.big_model.trim().is_empty() || self.small_model.trim().is_empty() {
            bail!("BIG_MODEL and SMALL_MODEL must not be empty");
        }
        for (name, value) in [
            ("BIG_MODEL_RAM_GIB", self.big_model_ram_gib),
            ("SMALL_MODEL_RAM_GIB", self.small_model_ram_gib),
        ] {
            if !value.is_finite() || value < 0.0 {
                bail!("{} must be a non-negative number, got {}", name, value);
            }
        }
        if self.small_model_ram_gib > self.big_model_ram_gib {
            bail!(
                "SMALL_MODEL_RAM_GIB ({}) must not exceed BIG_MODEL_RAM_GIB ({})",
                self.small_model_ram_gib,
                self.big_model_ram_gib
            );
        }
        if self.timeout.is_zero() {
            bail!("LLM_TIMEOUT must be greater than zero");
        }
        self.client_timeout()?;
        if !(self.runtime.base_url.starts_with("http://")
            || self.runtime.base_url.starts_with("https://"))
        {
            bail!(
                "OLLAMA_URL must start with http:// or https://, got '{}'",
                self.runtime.base_url
            );
        }
        Ok(())
    }
}
