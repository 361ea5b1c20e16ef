// Metrics data types
//
// PhaseRecord is the per-request diagnostic timeline. It is owned by the
// request handler, filled in by the fallback controller, logged as JSON and
// optionally returned to the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ModelTier;

/// Terminal status of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Ok,
    Timeout,
    RamError,
    TransportError,
    InvalidRequest,
    InternalError,
}

/// One dispatch attempt against one tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptPhase {
    /// Tier snapshotted for this attempt
    pub tier: ModelTier,
    /// Model id snapshotted for this attempt
    pub model: String,
    pub chat_start: DateTime<Utc>,
    /// First response chunk; equals `chat_start` if none was observed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_token: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<DateTime<Utc>>,
}

impl AttemptPhase {
    pub fn start(tier: ModelTier, model: impl Into<String>) -> Self {
        Self {
            tier,
            model: model.into(),
            chat_start: Utc::now(),
            first_token: None,
            chat_end: None,
            timeout: None,
        }
    }

    /// Close the attempt after the runtime answered
    pub fn complete(&mut self, first_token: Option<DateTime<Utc>>) {
        self.first_token = Some(first_token.unwrap_or(self.chat_start));
        self.chat_end = Some(Utc::now());
    }

    /// Close the attempt after a failure other than a timeout
    pub fn abort(&mut self, first_token: Option<DateTime<Utc>>) {
        self.first_token = first_token;
        self.chat_end = Some(Utc::now());
    }

    /// Close the attempt after its deadline expired
    pub fn expire(&mut self, first_token: Option<DateTime<Utc>>) {
        self.first_token = first_token;
        self.timeout = Some(Utc::now());
    }

    pub fn timed_out(&self) -> bool {
        self.timeout.is_some()
    }
}

/// Per-request diagnostic timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub request_id: Uuid,
    pub start: DateTime<Utc>,
    /// Available RAM (GiB) when the request arrived
    pub ram_before: f64,
    /// Model active when the request arrived
    pub model: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<AttemptPhase>,
    /// Set when this request performed the Big → Small downgrade
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_switched: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ram_after: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PhaseStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PhaseRecord {
    pub fn open(model: impl Into<String>, ram_before: f64) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            start: Utc::now(),
            ram_before,
            model: model.into(),
            attempts: Vec::new(),
            model_switched: None,
            ram_after: None,
            status: None,
            error: None,
        }
    }

    pub fn succeed(&mut self, ram_after: f64) {
        self.ram_after = Some(ram_after);
        self.status = Some(PhaseStatus::Ok);
    }

    pub fn fail(&mut self, status: PhaseStatus, error: impl Into<String>) {
        self.status = Some(status);
        self.error = Some(error.into());
    }

    /// Compact JSON for logs and the `X-Phases` header
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::warn!("Failed to serialize phase record: {}", e);
            format!("{{\"request_id\":\"{}\"}}", self.request_id)
        })
    }
}
