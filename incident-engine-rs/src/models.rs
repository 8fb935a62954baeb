//! # Incident Data Model
//!
//! Incidents, the alerts that create them, and the partial updates the
//! persistence collaborator applies.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use error_handling_rs::{Error, Result};

use crate::rca::RcaResult;

/// Metadata key counting successful restarts performed for an incident
pub const RESTART_ATTEMPTS_KEY: &str = "restart_attempts";
/// Metadata key counting remediation actions that failed for an incident
pub const FAILED_ATTEMPTS_KEY: &str = "failed_attempts";
/// Metadata key holding the error that ended automated handling
pub const ERROR_KEY: &str = "error";

/// Incident severity tier, P0 most critical
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    P0,
    P1,
    P2,
    P3,
}

impl Severity {
    /// Header label used in analysis prompts
    pub fn label(&self) -> &'static str {
        match self {
            Severity::P0 => "CRITICAL",
            Severity::P1 => "HIGH",
            Severity::P2 => "MEDIUM",
            Severity::P3 => "LOW",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::P0 => "P0",
            Severity::P1 => "P1",
            Severity::P2 => "P2",
            Severity::P3 => "P3",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "P0" => Ok(Severity::P0),
            "P1" => Ok(Severity::P1),
            "P2" => Ok(Severity::P2),
            "P3" => Ok(Severity::P3),
            other => Err(Error::validation(format!("unknown severity '{}'", other))
                .context("field", "severity")),
        }
    }
}

/// Incident lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentStatus {
    Received,
    Investigating,
    Analyzing,
    Remediating,
    Resolved,
    Escalated,
}

impl IncidentStatus {
    pub const ALL: [IncidentStatus; 6] = [
        IncidentStatus::Received,
        IncidentStatus::Investigating,
        IncidentStatus::Analyzing,
        IncidentStatus::Remediating,
        IncidentStatus::Resolved,
        IncidentStatus::Escalated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Received => "RECEIVED",
            IncidentStatus::Investigating => "INVESTIGATING",
            IncidentStatus::Analyzing => "ANALYZING",
            IncidentStatus::Remediating => "REMEDIATING",
            IncidentStatus::Resolved => "RESOLVED",
            IncidentStatus::Escalated => "ESCALATED",
        }
    }

    /// Resolution is one-way
    pub fn is_terminal(&self) -> bool {
        matches!(self, IncidentStatus::Resolved)
    }

    /// No automated work remains: resolved, or handed to a human
    pub fn is_settled(&self) -> bool {
        matches!(self, IncidentStatus::Resolved | IncidentStatus::Escalated)
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IncidentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_uppercase();
        IncidentStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == wanted)
            .ok_or_else(|| {
                Error::validation(format!("unknown incident status '{}'", s))
                    .context("field", "status")
            })
    }
}

/// One applied lifecycle transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: IncidentStatus,
    pub to: IncidentStatus,
    pub at: DateTime<Utc>,
    pub reason: Option<String>,
}

/// An inbound alert; the trigger for a new incident
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub severity: Severity,
    pub source: String,
    #[serde(default)]
    pub affected_services: Vec<String>,
}

impl Alert {
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::validation("alert title must not be empty").context("field", "title"));
        }
        if self.source.trim().is_empty() {
            return Err(
                Error::validation("alert source must not be empty").context("field", "source")
            );
        }
        if self.affected_services.iter().any(|s| s.trim().is_empty()) {
            return Err(Error::validation("affected service names must not be empty")
                .context("field", "affected_services"));
        }
        Ok(())
    }
}

/// An incident driven through the response lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub status: IncidentStatus,
    pub source: String,
    pub affected_services: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub status_history: Vec<StatusChange>,
    /// Latest root-cause analysis; a new one supersedes it
    #[serde(default)]
    pub rca: Option<RcaResult>,
}

impl Incident {
    /// Creates a `RECEIVED` incident from an alert
    pub fn from_alert(alert: Alert, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: alert.title.trim().to_string(),
            description: alert.description,
            severity: alert.severity,
            status: IncidentStatus::Received,
            source: alert.source,
            affected_services: alert
                .affected_services
                .into_iter()
                .map(|s| s.trim().to_string())
                .collect(),
            created_at: now,
            updated_at: now,
            metadata: Map::new(),
            status_history: Vec::new(),
            rca: None,
        }
    }

    fn counter(&self, key: &str) -> u32 {
        self.metadata
            .get(key)
            .and_then(Value::as_u64)
            .map(|n| n.min(u32::MAX as u64) as u32)
            .unwrap_or(0)
    }

    fn increment(&mut self, key: &str) -> u32 {
        let next = self.counter(key).saturating_add(1);
        self.metadata.insert(key.to_string(), Value::from(next));
        next
    }

    pub fn restart_attempts(&self) -> u32 {
        self.counter(RESTART_ATTEMPTS_KEY)
    }

    pub fn failed_attempts(&self) -> u32 {
        self.counter(FAILED_ATTEMPTS_KEY)
    }

    pub fn record_restart(&mut self) -> u32 {
        self.increment(RESTART_ATTEMPTS_KEY)
    }

    pub fn record_failure(&mut self) -> u32 {
        self.increment(FAILED_ATTEMPTS_KEY)
    }

    /// Start of the current handling run: the latest reopen, else creation
    pub fn active_since(&self) -> DateTime<Utc> {
        self.status_history
            .iter()
            .rev()
            .find(|c| c.from == IncidentStatus::Escalated && c.to == IncidentStatus::Investigating)
            .map(|c| c.at)
            .unwrap_or(self.created_at)
    }

    /// Combined title and description, lower-cased, for keyword matching
    pub fn search_text(&self) -> String {
        format!("{} {}", self.title, self.description).to_lowercase()
    }
}

/// Partial update applied by the incident store
///
/// Metadata merges shallowly: supplied keys overwrite, others are kept.
#[derive(Debug, Clone, Default)]
pub struct IncidentUpdate {
    pub status_change: Option<StatusChange>,
    pub rca: Option<RcaResult>,
    pub metadata: Map<String, Value>,
}

impl IncidentUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status_change(mut self, change: StatusChange) -> Self {
        self.status_change = Some(change);
        self
    }

    pub fn rca(mut self, rca: RcaResult) -> Self {
        self.rca = Some(rca);
        self
    }

    pub fn metadata<K: Into<String>>(mut self, key: K, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn merge_metadata(mut self, fields: &Map<String, Value>) -> Self {
        for (key, value) in fields {
            self.metadata.insert(key.clone(), value.clone());
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.status_change.is_none() && self.rca.is_none() && self.metadata.is_empty()
    }

    pub fn apply_to(self, incident: &mut Incident, now: DateTime<Utc>) {
        if let Some(change) = self.status_change {
            incident.status = change.to;
            incident.status_history.push(change);
        }
        if let Some(rca) = self.rca {
            incident.rca = Some(rca);
        }
        for (key, value) in self.metadata {
            incident.metadata.insert(key, value);
        }
        incident.updated_at = now;
    }
}
