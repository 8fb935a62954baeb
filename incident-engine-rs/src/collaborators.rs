//! # External Collaborators
//!
//! The engine reaches the outside world only through these traits: the
//! model backend, data gathering, incident persistence, notifications and
//! tool execution. Default implementations live in [`crate::llm_client`],
//! [`crate::simulation`], [`crate::store`] and [`crate::notification`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use error_handling_rs::Result;

use crate::data::{AlertRecord, LogEntry, MetricSample, Runbook, ServiceStatus};
use crate::models::{Incident, IncidentUpdate};
use crate::notification::NotificationEvent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// One completion request against a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Model backend
///
/// Overload must surface as `ErrorKind::CapacityExceeded`; it is the only
/// failure retried at this layer.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn run(&self, model_id: &str, request: &ModelRequest) -> Result<String>;
}

/// Retrieval of diagnostic data for an incident
///
/// Each call is independent; one failing must not affect the others.
#[async_trait]
pub trait DataGatherer: Send + Sync {
    async fn get_logs(&self, incident: &Incident) -> Result<Vec<LogEntry>>;
    async fn get_metrics(&self, incident: &Incident) -> Result<Vec<MetricSample>>;
    async fn get_alerts(&self, incident: &Incident) -> Result<Vec<AlertRecord>>;
    async fn get_system_status(&self, incident: &Incident) -> Result<Vec<ServiceStatus>>;
    async fn search_runbooks(&self, incident: &Incident) -> Result<Vec<Runbook>>;
}

/// Keyed incident persistence
#[async_trait]
pub trait IncidentStore: Send + Sync {
    async fn create(&self, incident: Incident) -> Result<Incident>;
    /// Missing ids fail with `ErrorKind::NotFound`
    async fn get(&self, id: Uuid) -> Result<Incident>;
    /// Applies a partial update, merging metadata shallowly
    ///
    /// A status change whose `from` is not the stored status fails with
    /// `ErrorKind::Conflict` and leaves the record untouched.
    async fn update(&self, id: Uuid, update: IncidentUpdate) -> Result<Incident>;
    async fn list(&self) -> Result<Vec<Incident>>;
}

/// Fire-and-forget event delivery; callers log failures and carry on
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, event: &NotificationEvent) -> Result<()>;
}

/// Remediation tool execution
///
/// Unknown services or tools fail with `ErrorKind::NotFound`.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute_tool(&self, service: &str, tool: &str, args: Value) -> Result<Value>;
}
