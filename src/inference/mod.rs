// Inference client abstraction
//
// One round-trip to the model runtime for a fixed model id. The fallback
// controller holds an `Arc<dyn InferenceClient>` per tier and asks a
// `ClientFactory` for a new one when it changes tier.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, OnceLock};
use thiserror::Error;

pub mod ollama;

pub use ollama::{OllamaClient, OllamaClientFactory};

/// Errors from the inference client.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Ollama server not reachable at {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Ollama server at {0} did not become ready in time")]
    NotReady(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Ollama API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Model '{model}' cannot run with the memory available: {message}")]
    OutOfMemory { model: String, message: String },
    #[error("Malformed response from Ollama: {0}")]
    Malformed(String),
}

impl InferenceError {
    /// True when the runtime refused the request for lack of memory
    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self, InferenceError::OutOfMemory { .. })
    }
}

/// Instrumentation hook passed into a chat call.
pub trait ChatHook: Send + Sync {
    /// Called once, when the first chunk of the response arrives
    fn on_first_chunk(&self);
}

/// Records when the first response chunk arrived
#[derive(Debug, Default)]
pub struct FirstChunkTimer {
    at: OnceLock<DateTime<Utc>>,
}

impl FirstChunkTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timestamp of the first chunk, if one arrived
    pub fn first_chunk_at(&self) -> Option<DateTime<Utc>> {
        self.at.get().copied()
    }
}

impl ChatHook for FirstChunkTimer {
    fn on_first_chunk(&self) {
        let _ = self.at.set(Utc::now());
    }
}

/// A client bound to one model on the runtime
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Model id this client talks to
    fn model(&self) -> &str;

    /// Send `prompt` and wait for the complete answer.
    ///
    /// Dropping the returned future aborts the underlying request.
    async fn chat(&self, prompt: &str, hook: Option<&dyn ChatHook>)
        -> Result<String, InferenceError>;
}

/// Builds clients for a given model id. Building is synchronous and cheap.
pub trait ClientFactory: Send + Sync {
    fn build(&self, model: &str) -> Result<Arc<dyn InferenceClient>, InferenceError>;
}
