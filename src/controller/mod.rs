// Fallback controller - owns the active model tier
//
// Every dispatch snapshots (tier, client) under a short lock and runs the
// inference call without holding it. A Big-tier timeout demotes the process to
// Small (once, for good) and retries the request a single time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::inference::{ChatHook, ClientFactory, FirstChunkTimer, InferenceClient, InferenceError};
use crate::metrics::{AttemptPhase, PhaseRecord};
use crate::models::{ModelTier, TierTable};

/// Text produced by a dispatch and the tier that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    pub tier: ModelTier,
    pub model: String,
}

/// Why a dispatch failed
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Deadline expired with no further fallback available
    #[error("LLM request timed out after {after:?} on model '{model}'")]
    Timeout { model: String, after: Duration },
    /// The runtime could not run the model with the memory available
    #[error("{0}")]
    ResourceExhausted(String),
    /// The call failed for a reason other than the deadline
    #[error("Inference call failed: {0}")]
    Transport(#[source] InferenceError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<InferenceError> for DispatchError {
    fn from(e: InferenceError) -> Self {
        if e.is_resource_exhausted() {
            DispatchError::ResourceExhausted(e.to_string())
        } else {
            DispatchError::Transport(e)
        }
    }
}

struct ControllerState {
    tier: ModelTier,
    client: Arc<dyn InferenceClient>,
}

/// Shared, process-wide tier state machine: Big → Small, never back.
pub struct FallbackController {
    state: Mutex<ControllerState>,
    tiers: TierTable,
    factory: Arc<dyn ClientFactory>,
    timeout: Duration,
    switches: AtomicU64,
}

impl FallbackController {
    /// Bind a client for `tier` and start in that tier.
    pub fn new(
        tier: ModelTier,
        tiers: TierTable,
        factory: Arc<dyn ClientFactory>,
        timeout: Duration,
    ) -> Result<Self, InferenceError> {
        let client = factory.build(tiers.model_id(tier))?;
        tracing::info!(
            tier = %tier,
            model = %client.model(),
            timeout_secs = timeout.as_secs_f64(),
            "Fallback controller ready"
        );

        Ok(Self {
            state: Mutex::new(ControllerState { tier, client }),
            tiers,
            factory,
            timeout,
            switches: AtomicU64::new(0),
        })
    }

    pub async fn active_tier(&self) -> ModelTier {
        self.state.lock().await.tier
    }

    /// Model id of the active tier
    pub async fn active_model(&self) -> String {
        self.state.lock().await.client.model().to_string()
    }

    /// Active tier and its model id, read under one lock
    pub async fn active(&self) -> (ModelTier, String) {
        let state = self.state.lock().await;
        (state.tier, state.client.model().to_string())
    }

    /// Number of downgrades applied (0 or 1)
    pub fn switch_count(&self) -> u64 {
        self.switches.load(Ordering::SeqCst)
    }

    async fn snapshot(&self) -> (ModelTier, Arc<dyn InferenceClient>) {
        let state = self.state.lock().await;
        (state.tier, Arc::clone(&state.client))
    }

    /// Answer `question`, demoting Big → Small and retrying once if the Big
    /// tier misses the deadline. Attempts are appended to `phases`.
    pub async fn dispatch(
        &self,
        question: &str,
        phases: &mut PhaseRecord,
    ) -> Result<Answer, DispatchError> {
        let (tier, client) = self.snapshot().await;

        match self.attempt(tier, client, question, phases).await {
            Err(DispatchError::Timeout { .. }) if tier == ModelTier::Big => {
                if self.downgrade().await? {
                    let small = self.tiers.model_id(ModelTier::Small).to_string();
                    phases.model_switched = Some(small);
                    tracing::info!(
                        phases = %phases.to_json(),
                        event = "forced big→small on timeout",
                        "Model switched"
                    );
                }

                let (tier, client) = self.snapshot().await;
                self.attempt(tier, client, question, phases).await
            }
            outcome => outcome,
        }
    }

    /// One call under one full deadline window.
    async fn attempt(
        &self,
        tier: ModelTier,
        client: Arc<dyn InferenceClient>,
        question: &str,
        phases: &mut PhaseRecord,
    ) -> Result<Answer, DispatchError> {
        let mut phase = AttemptPhase::start(tier, client.model());
        let timer = FirstChunkTimer::new();

        // Dropping the chat future on expiry cancels the HTTP request.
        let hook: &dyn ChatHook = &timer;
        let outcome = tokio::time::timeout(self.timeout, client.chat(question, Some(hook))).await;

        let result = match outcome {
            Ok(Ok(text)) => {
                phase.complete(timer.first_chunk_at());
                Ok(Answer {
                    text,
                    tier,
                    model: client.model().to_string(),
                })
            }
            Ok(Err(e)) => {
                phase.abort(timer.first_chunk_at());
                tracing::warn!(tier = %tier, model = %client.model(), "Inference call failed: {}", e);
                Err(DispatchError::from(e))
            }
            Err(_) => {
                phase.expire(timer.first_chunk_at());
                tracing::warn!(
                    tier = %tier,
                    model = %client.model(),
                    timeout_secs = self.timeout.as_secs_f64(),
                    "Inference call hit the deadline"
                );
                Err(DispatchError::Timeout {
                    model: client.model().to_string(),
                    after: self.timeout,
                })
            }
        };

        phases.attempts.push(phase);
        result
    }

    /// Switch to Small and rebind the client. Returns false when another
    /// request already did it.
    async fn downgrade(&self) -> Result<bool, DispatchError> {
        let mut state = self.state.lock().await;
        if state.tier == ModelTier::Small {
            return Ok(false);
        }

        let small = self.tiers.model_id(ModelTier::Small);
        let client = self.factory.build(small).map_err(|e| {
            DispatchError::Internal(format!("failed to rebuild client for '{}': {}", small, e))
        })?;

        state.tier = ModelTier::Small;
        state.client = client;
        self.switches.fetch_add(1, Ordering::SeqCst);
        tracing::warn!(model = %small, "Downgraded to the small tier for the rest of the process");
        Ok(true)
    }
}
