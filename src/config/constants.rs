// Project-wide constants
//
// Centralised here so default model ids, thresholds and addresses have one
// source of truth. Import via `use crate::config::constants::*;`.

/// Default Big tier model (accurate, memory hungry).
pub const DEFAULT_BIG_MODEL: &str = "mistral:7b-instruct-q4_K_M";

/// Default Small tier model (fast, runs almost anywhere).
pub const DEFAULT_SMALL_MODEL: &str = "tinyllama:1.1b";

/// Available RAM (GiB) required before the Big tier is selected.
pub const DEFAULT_BIG_MODEL_RAM_GIB: f64 = 2.5;

/// Available RAM (GiB) required before the Small tier is selected.
pub const DEFAULT_SMALL_MODEL_RAM_GIB: f64 = 1.0;

/// Per-attempt inference deadline in seconds.
pub const DEFAULT_TIMEOUT_SECS: f64 = 60.0;

/// Reserved. Not consulted by the unconditional downgrade policy.
pub const DEFAULT_FALLBACK_THRESHOLD_SECS: f64 = 20.0;

/// Default Ollama base URL (docker-compose service name).
///
/// Ollama listens on 11434.
pub const DEFAULT_OLLAMA_URL: &str = "http://ollama:11434";

/// How long startup waits for the runtime to answer `/api/tags`.
pub const DEFAULT_READY_TIMEOUT_SECS: f64 = 30.0;

/// Default log verbosity when neither `LOG_LEVEL` nor `RUST_LOG` is set.
pub const DEFAULT_LOG_LEVEL: &str = "INFO";

/// Default bind address for the HTTP gateway (all interfaces).
pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8000";

/// Sampling temperature sent with every chat request.
pub const CHAT_TEMPERATURE: f32 = 0.2;

/// Extra time the HTTP client allows past the dispatch deadline before it
/// aborts the request on its own.
pub const CLIENT_TIMEOUT_GRACE_SECS: f64 = 5.0;

/// System prompt used when code execution is enabled.
pub const SYSTEM_PROMPT_CODE: &str = "You are a helpful operations assistant. \
When a task is best solved with code, reply with a complete, runnable code block \
followed by a short explanation.";

/// System prompt used when code execution is disabled.
pub const SYSTEM_PROMPT_PLAIN: &str = "You are a helpful operations assistant. \
Answer directly in prose. Do not produce code meant to be executed.";
