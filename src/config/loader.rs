// Configuration loader
// Reads gateway settings from environment variables, falling back to defaults

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use super::constants::*;
use super::settings::{GatewayConfig, RuntimeConfig};

/// Raw environment view. Field names are the lowercased variable names.
#[derive(Debug, Deserialize)]
struct EnvSettings {
    big_model: String,
    small_model: String,
    big_model_ram_gib: f64,
    small_model_ram_gib: f64,
    llm_timeout: f64,
    llm_fallback_threshold: f64,
    ollama_url: String,
    ollama_ready_timeout: f64,
    enable_code_exec: String,
    log_level: String,
}

/// Load configuration from the process environment
pub fn load_config() -> Result<GatewayConfig> {
    load_config_from(None)
}

/// Load configuration from an explicit variable map instead of the process
/// environment. `None` reads the real environment.
pub fn load_config_from(vars: Option<HashMap<String, String>>) -> Result<GatewayConfig> {
    let settings = ::config::Config::builder()
        .set_default("big_model", DEFAULT_BIG_MODEL)?
        .set_default("small_model", DEFAULT_SMALL_MODEL)?
        .set_default("big_model_ram_gib", DEFAULT_BIG_MODEL_RAM_GIB)?
        .set_default("small_model_ram_gib", DEFAULT_SMALL_MODEL_RAM_GIB)?
        .set_default("llm_timeout", DEFAULT_TIMEOUT_SECS)?
        .set_default("llm_fallback_threshold", DEFAULT_FALLBACK_THRESHOLD_SECS)?
        .set_default("ollama_url", DEFAULT_OLLAMA_URL)?
        .set_default("ollama_ready_timeout", DEFAULT_READY_TIMEOUT_SECS)?
        .set_default("enable_code_exec", "true")?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .add_source(::config::Environment::default().source(vars))
        .build()
        .context("Failed to read gateway configuration")?;

    let env: EnvSettings = settings
        .try_deserialize()
        .context("Invalid gateway configuration")?;

    let config = GatewayConfig {
        big_model: env.big_model,
        small_model: env.small_model,
        big_model_ram_gib: env.big_model_ram_gib,
        small_model_ram_gib: env.small_model_ram_gib,
        timeout: seconds("LLM_TIMEOUT", env.llm_timeout)?,
        fallback_threshold: seconds("LLM_FALLBACK_THRESHOLD", env.llm_fallback_threshold)?,
        runtime: RuntimeConfig {
            base_url: env.ollama_url.trim_end_matches('/').to_string(),
            ready_timeout: seconds("OLLAMA_READY_TIMEOUT", env.ollama_ready_timeout)?,
            // Case-insensitive `true` enables it; anything else disables.
            enable_code_exec: env.enable_code_exec.trim().eq_ignore_ascii_case("true"),
        },
        log_level: env.log_level.trim().to_uppercase(),
    };

    config.validate()?;
    Ok(config)
}

fn seconds(name: &str, value: f64) -> Result<Duration> {
    if !value.is_finite() || value < 0.0 {
        bail!("{} must be a non-negative number of seconds, got {}", name, value);
    }
    Duration::try_from_secs_f64(value).with_context(|| format!("{} is out of range", name))
}
