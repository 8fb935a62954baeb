//! # Incident Orchestrator
//!
//! Drives one incident at a time from alert to a settled state:
//!
//! ```text
//! RECEIVED → INVESTIGATING (gather) → ANALYZING (RCA) → REMEDIATING → RESOLVED
//!                 └──────────────┴─────────────┴──────────────┴──→ ESCALATED
//! ```
//!
//! Every status change is persisted as it happens. An error in any phase is
//! recorded under `metadata.error` and the incident is escalated, so a run
//! never ends in an intermediate state. The store refuses a transition that
//! does not start from the stored status; a run that loses such a race (for
//! example to the stale-incident sweep) stops and reports the stored state.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use config_rs::EngineConfig;
use error_handling_rs::{CircuitBreakerConfig, CircuitBreakerRegistry, Error, ErrorKind, Result};

use crate::collaborators::{DataGatherer, IncidentStore, ModelClient, Notifier, ToolExecutor};
use crate::gathering::gather;
use crate::models::{
    Alert, Incident, IncidentStatus, IncidentUpdate, ERROR_KEY, FAILED_ATTEMPTS_KEY,
};
use crate::notification::{LogNotifier, NotificationEvent};
use crate::rca::{RcaAnalyzer, RcaAnalyzerConfig, RcaResult};
use crate::remediation::{RemediationConfig, RemediationEngine, RemediationResult};
use crate::store::InMemoryIncidentStore;
use crate::workflow::{EscalationClock, WorkflowStateMachine, MAX_FAILED_ATTEMPTS};

pub const REMEDIATION_KEY: &str = "remediation";
pub const RESOLUTION_KEY: &str = "resolution";
pub const ESCALATION_REASON_KEY: &str = "escalation_reason";
pub const DATA_QUALITY_KEY: &str = "data_quality";

/// Result of driving one incident
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentOutcome {
    /// The incident as last persisted
    pub incident: Incident,
    pub rca: Option<RcaResult>,
    pub remediation: Option<RemediationResult>,
    /// Set when the incident ended in `ESCALATED`
    pub escalation_reason: Option<String>,
}

enum Decision {
    Resolve,
    Escalate(String),
}

#[derive(Default)]
struct Progress {
    rca: Option<RcaResult>,
    remediation: Option<RemediationResult>,
}

/// Why `incident` must be escalated at `now`, if it must
fn escalation_reason(
    incident: &Incident,
    now: DateTime<Utc>,
    clock: EscalationClock,
) -> Option<String> {
    if !WorkflowStateMachine::requires_escalation(incident, now, clock) {
        return None;
    }
    if incident.failed_attempts() >= MAX_FAILED_ATTEMPTS {
        Some(format!(
            "{} failed remediation attempts",
            incident.failed_attempts()
        ))
    } else {
        Some(format!(
            "{} incident exceeded its {} escalation window",
            incident.severity,
            match clock {
                EscalationClock::Processing => "processing",
                EscalationClock::Idle => "idle",
            }
        ))
    }
}

/// Assembles an [`IncidentOrchestrator`] from configuration and collaborators
///
/// The model client, data gatherer and tool executor are required. The
/// store defaults to [`InMemoryIncidentStore`] and the notifier to
/// [`LogNotifier`].
pub struct OrchestratorBuilder {
    config: EngineConfig,
    model: Option<Arc<dyn ModelClient>>,
    gatherer: Option<Arc<dyn DataGatherer>>,
    tools: Option<Arc<dyn ToolExecutor>>,
    store: Option<Arc<dyn IncidentStore>>,
    notifier: Option<Arc<dyn Notifier>>,
    breakers: Option<Arc<CircuitBreakerRegistry>>,
}

impl OrchestratorBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            model: None,
            gatherer: None,
            tools: None,
            store: None,
            notifier: None,
            breakers: None,
        }
    }

    pub fn model(mut self, model: Arc<dyn ModelClient>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn gatherer(mut self, gatherer: Arc<dyn DataGatherer>) -> Self {
        self.gatherer = Some(gatherer);
        self
    }

    pub fn tools(mut self, tools: Arc<dyn ToolExecutor>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn store(mut self, store: Arc<dyn IncidentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Shares an existing breaker registry, e.g. between orchestrators
    pub fn breakers(mut self, breakers: Arc<CircuitBreakerRegistry>) -> Self {
        self.breakers = Some(breakers);
        self
    }

    pub fn build(self) -> Result<IncidentOrchestrator> {
        self.config.validate().map_err(Error::configuration)?;

        let model = self
            .model
            .ok_or_else(|| Error::configuration("orchestrator requires a model client"))?;
        let gatherer = self
            .gatherer
            .ok_or_else(|| Error::configuration("orchestrator requires a data gatherer"))?;
        let tools = self
            .tools
            .ok_or_else(|| Error::configuration("orchestrator requires a tool executor"))?;
        let store: Arc<dyn IncidentStore> = match self.store {
            Some(store) => store,
            None => Arc::new(InMemoryIncidentStore::new()),
        };
        let notifier: Arc<dyn Notifier> = match self.notifier {
            Some(notifier) => notifier,
            None => Arc::new(LogNotifier),
        };

        let breakers = self.breakers.unwrap_or_else(|| {
            Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig {
                failure_threshold: self.config.breaker_failure_threshold,
                cooldown: self.config.breaker_cooldown,
            }))
        });

        let analyzer = RcaAnalyzer::new(
            model,
            breakers.clone(),
            RcaAnalyzerConfig::from(&self.config),
        );
        let remediation = RemediationEngine::new(
            tools,
            notifier.clone(),
            breakers,
            RemediationConfig::from(&self.config),
        );

        Ok(IncidentOrchestrator {
            store,
            gatherer,
            notifier,
            analyzer,
            remediation,
            gather_timeout: Some(self.config.gather_timeout),
            history_limit: self.config.history_limit,
        })
    }
}

/// Top-level incident driver
///
/// Incidents are independent; the circuit-breaker registry is the only
/// state shared between concurrent runs.
pub struct IncidentOrchestrator {
    store: Arc<dyn IncidentStore>,
    gatherer: Arc<dyn DataGatherer>,
    notifier: Arc<dyn Notifier>,
    analyzer: RcaAnalyzer,
    remediation: RemediationEngine,
    gather_timeout: Option<Duration>,
    history_limit: usize,
}

impl IncidentOrchestrator {
    pub fn builder(config: EngineConfig) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
    }

    pub fn store(&self) -> &Arc<dyn IncidentStore> {
        &self.store
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        self.remediation.breakers()
    }

    /// Opens an incident for `alert` and drives it to a settled state
    ///
    /// An invalid alert is rejected before anything is stored.
    pub async fn handle_alert(&self, alert: Alert) -> Result<IncidentOutcome> {
        alert.validate()?;

        let incident = self
            .store
            .create(Incident::from_alert(alert, Utc::now()))
            .await?;
        counter!("incidents_received_total", 1, "severity" => incident.severity.to_string());
        info!(
            incident_id = %incident.id,
            severity = %incident.severity,
            title = %incident.title,
            "Incident opened"
        );

        self.process_incident(incident.id).await
    }

    /// Handles several alerts concurrently; results keep input order
    pub async fn handle_alerts(&self, alerts: Vec<Alert>) -> Vec<Result<IncidentOutcome>> {
        join_all(alerts.into_iter().map(|alert| self.handle_alert(alert))).await
    }

    /// Drives a stored `RECEIVED` or `INVESTIGATING` incident to a settled state
    #[instrument(skip(self))]
    pub async fn process_incident(&self, id: Uuid) -> Result<IncidentOutcome> {
        let mut incident = self.store.get(id).await?;
        if !matches!(
            incident.status,
            IncidentStatus::Received | IncidentStatus::Investigating
        ) {
            return Err(Error::validation(format!(
                "incident {} cannot be processed from {}",
                id, incident.status
            ))
            .context("status", incident.status.as_str()));
        }

        let mut progress = Progress::default();
        let driven = self.drive(&mut incident, &mut progress).await;
        let decision = match driven {
            Ok(decision) => decision,
            Err(err) if err.is_kind(ErrorKind::Conflict) => {
                return self.superseded(id, progress, &err).await;
            }
            Err(err) => {
                error!(
                    incident_id = %id,
                    status = %incident.status,
                    error = %err,
                    "Incident processing failed"
                );
                let payload = json!({
                    "kind": err.kind,
                    "message": err.message,
                    "status": incident.status,
                });
                incident.metadata.insert(ERROR_KEY.to_string(), payload.clone());
                if let Err(store_err) = self
                    .store
                    .update(id, IncidentUpdate::new().metadata(ERROR_KEY, payload))
                    .await
                {
                    warn!(incident_id = %id, error = %store_err, "Failed to record processing error");
                }
                Decision::Escalate(format!("processing failed: {}", err.message))
            }
        };

        let finished = self.finish(&mut incident, decision, &progress).await;
        let escalation_reason = match finished {
            Ok(reason) => reason,
            Err(err) if err.is_kind(ErrorKind::Conflict) => {
                return self.superseded(id, progress, &err).await;
            }
            Err(err) => return Err(err),
        };

        Ok(IncidentOutcome {
            incident: self.store.get(id).await?,
            rca: progress.rca,
            remediation: progress.remediation,
            escalation_reason,
        })
    }

    /// Reports the stored incident after another writer moved it first
    async fn superseded(
        &self,
        id: Uuid,
        progress: Progress,
        err: &Error,
    ) -> Result<IncidentOutcome> {
        let incident = self.store.get(id).await?;
        warn!(
            incident_id = %id,
            status = %incident.status,
            error = %err,
            "Incident changed during processing; stopping run"
        );
        counter!("incidents_processed_total", 1, "outcome" => "superseded");

        let escalation_reason = match incident.status {
            IncidentStatus::Escalated => incident
                .metadata
                .get(ESCALATION_REASON_KEY)
                .and_then(|reason| reason.as_str())
                .map(str::to_string),
            _ => None,
        };

        Ok(IncidentOutcome {
            incident,
            rca: progress.rca,
            remediation: progress.remediation,
            escalation_reason,
        })
    }

    async fn drive(&self, incident: &mut Incident, progress: &mut Progress) -> Result<Decision> {
        if incident.status == IncidentStatus::Received {
            self.advance(
                incident,
                IncidentStatus::Investigating,
                Some("gathering diagnostic data".to_string()),
                IncidentUpdate::new(),
            )
            .await?;
        }

        let data = gather(self.gatherer.as_ref(), incident, self.gather_timeout).await;
        if let Some(reason) = escalation_reason(incident, Utc::now(), EscalationClock::Processing)
        {
            return Ok(Decision::Escalate(reason));
        }

        self.advance(
            incident,
            IncidentStatus::Analyzing,
            Some("requesting root-cause analysis".to_string()),
            IncidentUpdate::new(),
        )
        .await?;

        let history = self.historical_context(incident).await;
        let rca = self.analyzer.analyze(incident, &data, &history).await?;
        let quality = serde_json::to_value(data.quality())?;

        incident.rca = Some(rca.clone());
        incident
            .metadata
            .insert(DATA_QUALITY_KEY.to_string(), quality.clone());
        self.store
            .update(
                incident.id,
                IncidentUpdate::new()
                    .rca(rca.clone())
                    .metadata(DATA_QUALITY_KEY, quality),
            )
            .await?;
        progress.rca = Some(rca.clone());

        if let Some(reason) = escalation_reason(incident, Utc::now(), EscalationClock::Processing)
        {
            return Ok(Decision::Escalate(reason));
        }
        if rca.recommended_actions().is_empty() {
            return Ok(Decision::Escalate(
                "analysis recommended no actions".to_string(),
            ));
        }

        self.advance(
            incident,
            IncidentStatus::Remediating,
            Some(format!(
                "executing {} recommended actions",
                rca.recommended_actions().len()
            )),
            IncidentUpdate::new(),
        )
        .await?;

        let result = self
            .remediation
            .execute(rca.recommended_actions(), incident)
            .await;

        incident
            .metadata
            .insert(REMEDIATION_KEY.to_string(), result.summary());
        self.store
            .update(
                incident.id,
                IncidentUpdate::new().merge_metadata(&incident.metadata),
            )
            .await?;

        let decision = if !result.failed.is_empty() {
            Decision::Escalate(format!("{} actions failed", result.failed.len()))
        } else if !result.pending_approval.is_empty() {
            Decision::Escalate("awaiting approval".to_string())
        } else if let Some(reason) =
            escalation_reason(incident, Utc::now(), EscalationClock::Processing)
        {
            Decision::Escalate(reason)
        } else {
            Decision::Resolve
        };

        progress.remediation = Some(result);
        Ok(decision)
    }

    /// Applies the final transition; returns the escalation reason if escalated
    async fn finish(
        &self,
        incident: &mut Incident,
        decision: Decision,
        progress: &Progress,
    ) -> Result<Option<String>> {
        match decision {
            Decision::Resolve => {
                let executed = progress
                    .remediation
                    .as_ref()
                    .map(|r| r.executed.len())
                    .unwrap_or(0);
                let resolution = json!({
                    "root_cause": progress.rca.as_ref().map(|r| r.root_cause()),
                    "confidence": progress.rca.as_ref().map(|r| r.confidence_score()),
                    "actions_executed": executed,
                    "resolved_at": Utc::now(),
                });

                self.advance(
                    incident,
                    IncidentStatus::Resolved,
                    Some("remediation verified".to_string()),
                    IncidentUpdate::new().metadata(RESOLUTION_KEY, resolution),
                )
                .await?;

                counter!("incidents_processed_total", 1, "outcome" => "resolved");
                info!(incident_id = %incident.id, actions_executed = executed, "Incident resolved");
                Ok(None)
            }
            Decision::Escalate(reason) => {
                self.escalate(incident, &reason).await?;
                counter!("incidents_processed_total", 1, "outcome" => "escalated");
                Ok(Some(reason))
            }
        }
    }

    async fn escalate(&self, incident: &mut Incident, reason: &str) -> Result<()> {
        self.advance(
            incident,
            IncidentStatus::Escalated,
            Some(reason.to_string()),
            IncidentUpdate::new().metadata(ESCALATION_REASON_KEY, json!(reason)),
        )
        .await?;

        warn!(
            incident_id = %incident.id,
            severity = %incident.severity,
            reason = %reason,
            "Incident escalated"
        );

        let event = NotificationEvent::IncidentEscalated {
            incident_id: incident.id,
            severity: incident.severity,
            reason: reason.to_string(),
        };
        if let Err(err) = self.notifier.send(&event).await {
            warn!(incident_id = %incident.id, error = %err, "Failed to send escalation notice");
        }
        Ok(())
    }

    /// Persists a transition together with `update`; the local copy only
    /// moves once the store accepted it
    async fn advance(
        &self,
        incident: &mut Incident,
        to: IncidentStatus,
        reason: Option<String>,
        update: IncidentUpdate,
    ) -> Result<()> {
        let mut next = incident.clone();
        let change = WorkflowStateMachine::transition(&mut next, to, reason, Utc::now())?;
        *incident = self
            .store
            .update(incident.id, update.status_change(change))
            .await?;
        Ok(())
    }

    /// Root causes of resolved incidents that share an affected service, newest first
    async fn historical_context(&self, incident: &Incident) -> Vec<String> {
        if self.history_limit == 0 {
            return Vec::new();
        }

        let incidents = match self.store.list().await {
            Ok(incidents) => incidents,
            Err(err) => {
                warn!(incident_id = %incident.id, error = %err, "Historical context unavailable");
                return Vec::new();
            }
        };

        incidents
            .iter()
            .rev()
            .filter(|other| {
                other.id != incident.id
                    && other.status == IncidentStatus::Resolved
                    && !other.affected_services.is_disjoint(&incident.affected_services)
            })
            .filter_map(|other| {
                other
                    .rca
                    .as_ref()
                    .map(|rca| format!("{}: {}", other.title, rca.root_cause()))
            })
            .take(self.history_limit)
            .collect()
    }

    /// Escalates stored incidents that sat unsettled past their idle window
    ///
    /// Returns the ids escalated by this sweep.
    #[instrument(skip(self))]
    pub async fn escalate_stale_incidents(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let mut escalated = Vec::new();

        for mut incident in self.store.list().await? {
            let Some(reason) = escalation_reason(&incident, now, EscalationClock::Idle) else {
                continue;
            };
            match self.escalate(&mut incident, &reason).await {
                Ok(()) => {
                    counter!("incidents_processed_total", 1, "outcome" => "stale_escalated");
                    escalated.push(incident.id);
                }
                Err(err) => {
                    error!(incident_id = %incident.id, error = %err, "Stale escalation failed");
                }
            }
        }

        if !escalated.is_empty() {
            info!(count = escalated.len(), "Escalated stale incidents");
        }
        Ok(escalated)
    }

    /// Returns an escalated incident to investigation
    ///
    /// The failure counter is cleared and escalation windows restart from now.
    pub async fn reopen(&self, id: Uuid, reason: &str) -> Result<Incident> {
        let mut incident = self.store.get(id).await?;
        if incident.status != IncidentStatus::Escalated {
            return Err(Error::validation(format!(
                "only escalated incidents can be reopened; {} is {}",
                id, incident.status
            ))
            .context("status", incident.status.as_str()));
        }

        let change = WorkflowStateMachine::transition(
            &mut incident,
            IncidentStatus::Investigating,
            Some(reason.to_string()),
            Utc::now(),
        )?;
        let updated = self
            .store
            .update(
                id,
                IncidentUpdate::new()
                    .status_change(change)
                    .metadata(FAILED_ATTEMPTS_KEY, json!(0)),
            )
            .await?;

        info!(incident_id = %id, reason = %reason, "Incident reopened");
        Ok(updated)
    }
}
