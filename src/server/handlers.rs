// HTTP handlers: /ask, /healthz, /metrics

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::time::Instant;

use super::error::ApiError;
use super::AppState;
use crate::controller::DispatchError;
use crate::metrics::{PhaseRecord, PhaseStatus};

/// Body of `POST /ask`
#[derive(Debug, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub question: Option<String>,
}

/// Query string of `POST /ask`
#[derive(Debug, Default, Deserialize)]
pub struct AskParams {
    /// "true" attaches the phase record to the response
    #[serde(default)]
    pub debug: Option<String>,
}

impl AskParams {
    fn debug(&self) -> bool {
        self.debug.as_deref() == Some("true")
    }
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub answer: String,
    /// Wall-clock seconds from request start to response
    pub latency: f64,
    /// Model that produced the answer
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phases: Option<PhaseRecord>,
}

/// Routes served after a successful startup
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ask", post(handle_ask))
        .route("/healthz", get(health_check))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state)
}

/// Routes served when startup selection failed: health only
pub fn degraded_router(reason: Arc<str>) -> Router {
    Router::new()
        .route("/healthz", get(degraded_health))
        .with_state(reason)
}

/// `POST /ask`
pub async fn handle_ask(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AskParams>,
    body: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, ApiError> {
    let started = Instant::now();
    let mut phases = PhaseRecord::open(
        state.controller().active_model().await,
        state.memory().available_gib(),
    );

    let question = match validate_question(body) {
        Ok(question) => question,
        Err(msg) => {
            phases.fail(PhaseStatus::InvalidRequest, msg.clone());
            state.metrics().record_failure();
            tracing::warn!(phases = %phases.to_json(), "Rejected /ask request");
            return Err(ApiError::InvalidRequest(msg));
        }
    };

    let outcome = state.controller().dispatch(&question, &mut phases).await;
    if phases.model_switched.is_some() {
        state.metrics().record_model_switch();
    }

    match outcome {
        Ok(answer) => {
            let latency = started.elapsed().as_secs_f64();
            phases.succeed(state.memory().available_gib());
            state.metrics().record_success(latency);
            tracing::debug!(phases = %phases.to_json(), latency, "Answered /ask");

            Ok(Json(AskResponse {
                answer: answer.text,
                latency,
                model: answer.model,
                phases: params.debug().then_some(phases),
            }))
        }
        Err(e) => {
            state.metrics().record_failure();
            Err(dispatch_failure(e, &mut phases))
        }
    }
}

fn validate_question(body: Result<Json<AskRequest>, JsonRejection>) -> Result<String, String> {
    let Json(request) = body.map_err(|rejection| rejection.body_text())?;
    match request.question {
        Some(q) if !q.trim().is_empty() => Ok(q),
        Some(_) => Err("question must not be empty".to_string()),
        None => Err("missing field `question`".to_string()),
    }
}

/// Tag the phase record, log it, and pick the HTTP error
fn dispatch_failure(error: DispatchError, phases: &mut PhaseRecord) -> ApiError {
    let status = match &error {
        DispatchError::Timeout { .. } => PhaseStatus::Timeout,
        DispatchError::ResourceExhausted(_) => PhaseStatus::RamError,
        DispatchError::Transport(_) => PhaseStatus::TransportError,
        DispatchError::Internal(_) => PhaseStatus::InternalError,
    };
    phases.fail(status, error.to_string());

    let record = phases.to_json();
    tracing::error!(phases = %record, "/ask failed: {}", error);

    match error {
        DispatchError::Timeout { .. } => ApiError::Timeout { phases: record },
        DispatchError::ResourceExhausted(msg) => ApiError::ResourceExhausted(msg),
        DispatchError::Transport(e) => ApiError::Transport(e.to_string()),
        DispatchError::Internal(msg) => ApiError::Internal(msg),
    }
}

/// `GET /healthz`
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    let (tier, model) = state.controller().active().await;
    Json(json!({
        "status": "ok",
        "model": model,
        "tier": tier,
        "free_ram_gib": state.memory().available_gib(),
    }))
}

/// `GET /healthz` in degraded mode
pub async fn degraded_health(State(reason): State<Arc<str>>) -> Json<Value> {
    Json(json!({ "error": &*reason }))
}

/// `GET /metrics`
pub async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> Response {
    let metrics = state.metrics();
    match metrics.render() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, metrics.content_type())],
            text,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
