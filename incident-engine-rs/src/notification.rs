//! Notification events and the logging notifier

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use error_handling_rs::Result;

use crate::collaborators::Notifier;
use crate::models::Severity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// An action ran; `success` reflects verification
    ActionExecuted {
        incident_id: Uuid,
        action_type: String,
        target: String,
        success: bool,
        detail: Option<String>,
    },
    /// An action waits for a human decision
    ApprovalRequested {
        incident_id: Uuid,
        action_type: String,
        target: String,
        description: String,
        risk_factors: Vec<String>,
    },
    IncidentEscalated {
        incident_id: Uuid,
        severity: Severity,
        reason: String,
    },
}

impl NotificationEvent {
    pub fn incident_id(&self) -> Uuid {
        match self {
            NotificationEvent::ActionExecuted { incident_id, .. }
            | NotificationEvent::ApprovalRequested { incident_id, .. }
            | NotificationEvent::IncidentEscalated { incident_id, .. } => *incident_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            NotificationEvent::ActionExecuted { .. } => "action_executed",
            NotificationEvent::ApprovalRequested { .. } => "approval_requested",
            NotificationEvent::IncidentEscalated { .. } => "incident_escalated",
        }
    }
}

/// Emits every event as a structured log record
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, event: &NotificationEvent) -> Result<()> {
        let payload = serde_json::to_string(event)?;
        match event {
            NotificationEvent::IncidentEscalated { .. } => warn!(
                incident_id = %event.incident_id(),
                event = event.kind(),
                payload = %payload,
                "Notification"
            ),
            _ => info!(
                incident_id = %event.incident_id(),
                event = event.kind(),
                payload = %payload,
                "Notification"
            ),
        }
        Ok(())
    }
}
