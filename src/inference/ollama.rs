// Ollama chat client
//
// Streams `/api/chat` (NDJSON) so the first response chunk can be timed.

use async_trait::async_trait;
use futures::stream::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use super::{ChatHook, ClientFactory, InferenceClient, InferenceError};
use crate::config::constants::CHAT_TEMPERATURE;
use crate::config::RuntimeConfig;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const PROBE_TIMEOUT_SECS: u64 = 3;
const PROBE_INTERVAL_SECS: u64 = 1;

/// Substrings Ollama uses when a model does not fit in memory
const OOM_MARKERS: &[&str] = &[
    "requires more system memory",
    "out of memory",
    "insufficient memory",
];

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

/// One NDJSON line of a streamed chat response
#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Response from Ollama tags API (list models).
#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
}

/// Chat client bound to one Ollama model.
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    system_prompt: Option<String>,
}

impl OllamaClient {
    /// Create a client sharing `client`'s connection pool.
    pub fn new(client: Client, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
            system_prompt: None,
        }
    }

    /// Prepend a system message to every chat.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    fn request<'a>(&'a self, prompt: &'a str) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        ChatRequest {
            model: &self.model,
            messages,
            stream: true,
            options: ChatOptions {
                temperature: CHAT_TEMPERATURE,
            },
        }
    }

    /// Apply one NDJSON line to `answer`. Returns true on the final chunk.
    fn consume_line(&self, line: &[u8], answer: &mut String) -> Result<bool, InferenceError> {
        let line = String::from_utf8_lossy(line);
        let line = line.trim();
        if line.is_empty() {
            return Ok(false);
        }

        let chunk: ChatChunk = serde_json::from_str(line)
            .map_err(|e| InferenceError::Malformed(format!("{}: {}", e, line)))?;

        if let Some(message) = chunk.error {
            return Err(classify_api_error(&self.model, 200, message));
        }
        if let Some(message) = chunk.message {
            answer.push_str(&message.content);
        }
        Ok(chunk.done)
    }
}

#[async_trait]
impl InferenceClient for OllamaClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        prompt: &str,
        hook: Option<&dyn ChatHook>,
    ) -> Result<String, InferenceError> {
        let url = format!("{}/api/chat", self.base_url);
        tracing::debug!(model = %self.model, %url, "Sending chat request");

        let response = self
            .client
            .post(&url)
            .json(&self.request(prompt))
            .send()
            .await
            .map_err(|e| transport_error(&self.base_url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or(body);
            return Err(classify_api_error(&self.model, status.as_u16(), message));
        }

        let mut stream = response.bytes_stream();
        let mut pending: Vec<u8> = Vec::new();
        let mut answer = String::new();
        let mut first = true;
        let mut done = false;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if first {
                if let Some(hook) = hook {
                    hook.on_first_chunk();
                }
                first = false;
            }

            pending.extend_from_slice(&chunk);
            while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                done |= self.consume_line(&line, &mut answer)?;
            }
        }
        if !pending.is_empty() {
            done |= self.consume_line(&pending, &mut answer)?;
        }

        if !done {
            return Err(InferenceError::Malformed(
                "stream ended before the final chunk".to_string(),
            ));
        }

        tracing::debug!(model = %self.model, chars = answer.len(), "Chat complete");
        Ok(answer)
    }
}

/// Builds `OllamaClient`s that share one HTTP connection pool.
#[derive(Clone)]
pub struct OllamaClientFactory {
    client: Client,
    base_url: String,
    system_prompt: String,
}

impl OllamaClientFactory {
    /// `request_timeout` bounds every HTTP call at the transport layer, so an
    /// abandoned request cannot outlive it.
    pub fn new(runtime: &RuntimeConfig, request_timeout: Duration) -> Result<Self, InferenceError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: runtime.base_url.trim_end_matches('/').to_string(),
            system_prompt: runtime.system_prompt().to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// List the models the runtime has pulled.
    pub async fn list_models(&self) -> Result<Vec<String>, InferenceError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(PROBE_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| transport_error(&self.base_url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(InferenceError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let tags: TagsResponse = response.json().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Poll `/api/tags` once a second until the runtime answers or `timeout`
    /// elapses. Returns the pulled model names.
    pub async fn wait_until_ready(&self, timeout: Duration) -> Result<Vec<String>, InferenceError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.list_models().await {
                Ok(models) => return Ok(models),
                Err(e) => tracing::debug!("Ollama not ready yet: {}", e),
            }
            if Instant::now() + Duration::from_secs(PROBE_INTERVAL_SECS) > deadline {
                return Err(InferenceError::NotReady(self.base_url.clone()));
            }
            sleep(Duration::from_secs(PROBE_INTERVAL_SECS)).await;
        }
    }
}

impl ClientFactory for OllamaClientFactory {
    fn build(&self, model: &str) -> Result<Arc<dyn InferenceClient>, InferenceError> {
        let client = OllamaClient::new(self.client.clone(), self.base_url.clone(), model)
            .with_system_prompt(self.system_prompt.clone());
        Ok(Arc::new(client))
    }
}

/// True if `model` (e.g. "mistral:7b") is among `available`. A bare name
/// matches any tag of that model.
pub fn model_is_pulled(model: &str, available: &[String]) -> bool {
    if model.contains(':') {
        available.iter().any(|m| m == model)
    } else {
        available
            .iter()
            .any(|m| m == model || m.starts_with(&format!("{}:", model)))
    }
}

fn transport_error(base_url: &str, e: reqwest::Error) -> InferenceError {
    if e.is_connect() {
        InferenceError::Connect {
            url: base_url.to_string(),
            source: e,
        }
    } else {
        InferenceError::Http(e)
    }
}

fn classify_api_error(model: &str, status: u16, message: String) -> InferenceError {
    let lower = message.to_lowercase();
    if OOM_MARKERS.iter().any(|m| lower.contains(m)) {
        InferenceError::OutOfMemory {
            model: model.to_string(),
            message,
        }
    } else {
        InferenceError::Api { status, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::FirstChunkTimer;

    fn factory(url: &str) -> OllamaClientFactory {
        let runtime = RuntimeConfig {
            base_url: url.to_string(),
            ..Default::default()
        };
        OllamaClientFactory::new(&runtime, Duration::from_secs(5)).unwrap()
    }

    const STREAM_BODY: &str = concat!(
        "{\"model\":\"tinyllama:1.1b\",\"message\":{\"role\":\"assistant\",\"content\":\"po\"},\"done\":false}\n",
        "{\"model\":\"tinyllama:1.1b\",\"message\":{\"role\":\"assistant\",\"content\":\"ng\"},\"done\":false}\n",
        "{\"model\":\"tinyllama:1.1b\",\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}\n",
    );

    #[tokio::test]
    async fn test_chat_concatenates_stream() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/chat")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"model":"tinyllama:1.1b","stream":true}"#.to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "application/x-ndjson")
            .with_body(STREAM_BODY)
            .create_async()
            .await;

        let client = factory(&server.url()).build("tinyllama:1.1b").unwrap();
        let timer = FirstChunkTimer::new();
        let answer = client.chat("ping", Some(&timer)).await.unwrap();

        assert_eq!(answer, "pong");
        assert!(timer.first_chunk_at().is_some());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_chat_sends_system_prompt() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/chat")
            .match_body(mockito::Matcher::Regex(r#""role":"system""#.to_string()))
            .with_status(200)
            .with_body(STREAM_BODY)
            .create_async()
            .await;

        let client = factory(&server.url()).build("tinyllama:1.1b").unwrap();
        client.chat("ping", None).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_chat_memory_error_is_resource_exhausted() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/chat")
            .with_status(500)
            .with_body(r#"{"error":"model requires more system memory (5.5 GiB) than is available (2.1 GiB)"}"#)
            .create_async()
            .await;

        let client = factory(&server.url()).build("mistral:7b-instruct-q4_K_M").unwrap();
        let err = client.chat("ping", None).await.unwrap_err();
        assert!(err.is_resource_exhausted(), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_chat_api_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/chat")
            .with_status(404)
            .with_body(r#"{"error":"model 'nope' not found"}"#)
            .create_async()
            .await;

        let client = factory(&server.url()).build("nope").unwrap();
        match client.chat("ping", None).await {
            Err(InferenceError::Api { status, message }) => {
                assert_eq!(status, 404);
                assert!(message.contains("not found"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_chat_error_inside_stream() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/chat")
            .with_status(200)
            .with_body("{\"error\":\"llama runner process has terminated\"}\n")
            .create_async()
            .await;

        let client = factory(&server.url()).build("tinyllama:1.1b").unwrap();
        let err = client.chat("ping", None).await.unwrap_err();
        assert!(matches!(err, InferenceError::Api { .. }));
    }

    #[tokio::test]
    async fn test_chat_truncated_stream_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/chat")
            .with_status(200)
            .with_body("{\"message\":{\"role\":\"assistant\",\"content\":\"po\"},\"done\":false}\n")
            .create_async()
            .await;

        let client = factory(&server.url()).build("tinyllama:1.1b").unwrap();
        let err = client.chat("ping", None).await.unwrap_err();
        assert!(matches!(err, InferenceError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_chat_connection_refused() {
        let client = factory("http://127.0.0.1:1").build("tinyllama:1.1b").unwrap();
        let err = client.chat("ping", None).await.unwrap_err();
        assert!(!err.is_resource_exhausted());
        assert!(
            matches!(err, InferenceError::Connect { .. } | InferenceError::Http(_)),
            "unexpected error: {err}"
        );
    }

    #[tokio::test]
    async fn test_wait_until_ready_lists_models() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/tags")
            .with_status(200)
            .with_body(r#"{"models":[{"name":"tinyllama:1.1b"},{"name":"mistral:7b-instruct-q4_K_M"}]}"#)
            .create_async()
            .await;

        let models = factory(&server.url())
            .wait_until_ready(Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(models.len(), 2);
        assert!(model_is_pulled("tinyllama:1.1b", &models));
    }

    #[tokio::test]
    async fn test_wait_until_ready_gives_up() {
        let err = factory("http://127.0.0.1:1")
            .wait_until_ready(Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::NotReady(_)));
    }

    #[test]
    fn test_model_is_pulled() {
        let available = vec!["tinyllama:1.1b".to_string(), "mistral:latest".to_string()];
        assert!(model_is_pulled("tinyllama:1.1b", &available));
        assert!(model_is_pulled("mistral", &available));
        assert!(!model_is_pulled("mistral:7b-instruct-q4_K_M", &available));
        assert!(!model_is_pulled("llama3", &available));
    }

    #[test]
    fn test_classify_api_error() {
        let err = classify_api_error("m", 500, "CUDA error: out of memory".to_string());
        assert!(err.is_resource_exhausted());
        let err = classify_api_error("m", 500, "unexpected EOF".to_string());
        assert!(!err.is_resource_exhausted());
    }
}
