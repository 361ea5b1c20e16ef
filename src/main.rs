// Ollama Gateway - Main entry point

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use ollama_gateway::config::constants::DEFAULT_HTTP_ADDR;
use ollama_gateway::config::{load_config, GatewayConfig};
use ollama_gateway::inference::ollama::model_is_pulled;
use ollama_gateway::inference::OllamaClientFactory;
use ollama_gateway::models::ModelTier;
use ollama_gateway::monitoring::{MemoryInfo, SystemMemory};
use ollama_gateway::server::Gateway;

#[derive(Parser, Debug)]
#[command(name = "ollama-gateway")]
#[command(about = "Inference gateway with memory-aware model selection and timeout fallback", long_about = None)]
#[command(version)]
struct Cli {
    /// Address to bind the HTTP server to
    #[arg(long, default_value = DEFAULT_HTTP_ADDR)]
    bind: SocketAddr,

    /// Log verbosity; overrides LOG_LEVEL
    #[arg(long)]
    log_level: Option<String>,

    /// Skip waiting for the model runtime at startup
    #[arg(long)]
    no_wait: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config()?;

    init_tracing(cli.log_level.as_deref().unwrap_or(&config.log_level));

    tracing::info!(
        big_model = %config.big_model,
        small_model = %config.small_model,
        big_model_ram_gib = config.big_model_ram_gib,
        small_model_ram_gib = config.small_model_ram_gib,
        timeout_secs = config.timeout.as_secs_f64(),
        fallback_threshold_secs = config.fallback_threshold.as_secs_f64(),
        ollama_url = %config.runtime.base_url,
        code_exec = config.runtime.enable_code_exec,
        "Loaded configuration"
    );

    let memory = MemoryInfo::current();
    tracing::info!(
        total_gib = memory.total_gib(),
        available_gib = memory.available_gib(),
        "Host memory"
    );

    let factory = OllamaClientFactory::new(&config.runtime, config.client_timeout()?)
        .context("Failed to create HTTP client")?;

    if !cli.no_wait {
        probe_runtime(&config, &factory).await;
    }

    let gateway = Gateway::bootstrap(&config, Arc::new(SystemMemory), Arc::new(factory));
    gateway.serve(cli.bind).await
}

fn init_tracing(level: &str) {
    // RUST_LOG wins over LOG_LEVEL when both are set.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter_directive(level)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Accept Python-style level names (WARNING, CRITICAL) as well as tracing's.
fn filter_directive(level: &str) -> String {
    match level.trim().to_lowercase().as_str() {
        "warning" => "warn".to_string(),
        "critical" | "fatal" => "error".to_string(),
        other => other.to_string(),
    }
}

/// Wait for Ollama to come up and report tier models it does not have.
/// Never fatal: the gateway starts either way.
async fn probe_runtime(config: &GatewayConfig, factory: &OllamaClientFactory) {
    match factory.wait_until_ready(config.runtime.ready_timeout).await {
        Ok(models) => {
            tracing::info!(url = %factory.base_url(), "Ollama is reachable");
            for tier in [ModelTier::Big, ModelTier::Small] {
                let model = config.model_for(tier);
                if !model_is_pulled(model, &models) {
                    tracing::warn!("Model '{}' is not pulled. Pull it with: ollama pull {}", model, model);
                }
            }
        }
        Err(e) => tracing::warn!("{}; requests will fail until it is reachable", e),
    }
}
