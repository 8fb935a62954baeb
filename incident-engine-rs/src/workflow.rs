//! # Workflow State Machine
//!
//! Validates and applies incident lifecycle transitions and answers the
//! escalation questions. Everything here is a pure function of its inputs.
//!
//! ## Escalation clocks
//!
//! Two threshold tables exist, both measured from `created_at`
//! (or from the latest reopen):
//!
//! | Severity | Processing | Idle   |
//! |----------|------------|--------|
//! | P0       | 2 min      | 5 min  |
//! | P1       | 5 min      | 15 min |
//! | P2       | 15 min     | 1 h    |
//! | P3       | 30 min     | 4 h    |
//!
//! The orchestrator uses [`EscalationClock::Processing`] at phase boundaries
//! while it drives an incident. The stale-incident sweep uses
//! [`EscalationClock::Idle`] for incidents nobody is driving.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use error_handling_rs::{Error, Result};

use crate::models::{Incident, IncidentStatus, Severity, StatusChange};

/// Recorded failures that force escalation regardless of time
pub const MAX_FAILED_ATTEMPTS: u32 = 3;

/// Which escalation threshold table applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationClock {
    /// Time spent in automated processing
    Processing,
    /// Time without resolution while nobody is driving the incident
    Idle,
}

impl EscalationClock {
    pub fn threshold(&self, severity: Severity) -> Duration {
        match (self, severity) {
            (EscalationClock::Processing, Severity::P0) => Duration::minutes(2),
            (EscalationClock::Processing, Severity::P1) => Duration::minutes(5),
            (EscalationClock::Processing, Severity::P2) => Duration::minutes(15),
            (EscalationClock::Processing, Severity::P3) => Duration::minutes(30),
            (EscalationClock::Idle, Severity::P0) => Duration::minutes(5),
            (EscalationClock::Idle, Severity::P1) => Duration::minutes(15),
            (EscalationClock::Idle, Severity::P2) => Duration::hours(1),
            (EscalationClock::Idle, Severity::P3) => Duration::hours(4),
        }
    }
}

/// Incident lifecycle rules
pub struct WorkflowStateMachine;

impl WorkflowStateMachine {
    /// States reachable from `from` in one step
    pub fn allowed_targets(from: IncidentStatus) -> &'static [IncidentStatus] {
        use IncidentStatus::*;

        match from {
            Received => &[Investigating, Escalated],
            Investigating => &[Analyzing, Escalated, Investigating],
            Analyzing => &[Remediating, Escalated, Analyzing],
            Remediating => &[Resolved, Escalated, Remediating],
            Resolved => &[Resolved],
            Escalated => &[Investigating, Escalated],
        }
    }

    pub fn valid_transition(from: IncidentStatus, to: IncidentStatus) -> bool {
        Self::allowed_targets(from).contains(&to)
    }

    /// Same as [`valid_transition`](Self::valid_transition) for raw state names;
    /// unknown names are a validation error
    pub fn valid_transition_str(from: &str, to: &str) -> Result<bool> {
        let from: IncidentStatus = from.parse()?;
        let to: IncidentStatus = to.parse()?;
        Ok(Self::valid_transition(from, to))
    }

    /// Deadlines run from creation, or from the latest reopen
    pub fn escalation_deadline(incident: &Incident, clock: EscalationClock) -> DateTime<Utc> {
        incident.active_since() + clock.threshold(incident.severity)
    }

    /// Whether `incident` must be escalated at `now`
    ///
    /// Resolved and already-escalated incidents never require escalation.
    pub fn requires_escalation(
        incident: &Incident,
        now: DateTime<Utc>,
        clock: EscalationClock,
    ) -> bool {
        if incident.status.is_settled() {
            return false;
        }

        if incident.failed_attempts() >= MAX_FAILED_ATTEMPTS {
            debug!(
                incident_id = %incident.id,
                failed_attempts = incident.failed_attempts(),
                "Failure ceiling reached"
            );
            return true;
        }

        now >= Self::escalation_deadline(incident, clock)
    }

    /// Applies `to` to `incident`, recording the change in its history
    pub fn transition(
        incident: &mut Incident,
        to: IncidentStatus,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<StatusChange> {
        let from = incident.status;

        if !Self::valid_transition(from, to) {
            return Err(Error::validation(format!(
                "invalid transition from {} to {}",
                from, to
            ))
            .context("incident_id", incident.id.to_string())
            .context("from", from.as_str())
            .context("to", to.as_str()));
        }

        let change = StatusChange {
            from,
            to,
            at: now,
            reason,
        };

        incident.status = to;
        incident.updated_at = now;
        incident.status_history.push(change.clone());

        info!(
            incident_id = %incident.id,
            from = %from,
            to = %to,
            reason = change.reason.as_deref().unwrap_or(""),
            "Incident status changed"
        );

        Ok(change)
    }
}
