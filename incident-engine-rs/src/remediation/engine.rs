use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use error_handling_rs::{
    with_timeout, CircuitBreakerRegistry, Error, ErrorKind, Result, RetryConfig, RetryPolicy,
};

use crate::actions::{ActionParams, RecommendedAction, RiskAssessment, ToolCall};
use crate::collaborators::{Notifier, ToolExecutor};
use crate::models::Incident;
use crate::notification::NotificationEvent;
use crate::risk::{RiskClassifier, RiskContext};

use super::rollback::RollbackPlan;
use super::verification::{OutcomeVerifier, Verification};
use super::{ExecutedAction, FailedAction, PendingApproval, RemediationResult, RollbackRecord};

/// Execution settings for remediation tool calls
#[derive(Debug, Clone)]
pub struct RemediationConfig {
    pub retry: RetryConfig,
    pub tool_timeout: Option<Duration>,
    pub require_explicit_success: bool,
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            tool_timeout: Some(Duration::from_secs(30)),
            require_explicit_success: false,
        }
    }
}

impl From<&config_rs::EngineConfig> for RemediationConfig {
    fn from(config: &config_rs::EngineConfig) -> Self {
        Self {
            retry: RetryConfig {
                max_attempts: config.retry_max_attempts,
                base_delay: config.retry_base_delay,
                ..RetryConfig::default()
            },
            tool_timeout: Some(config.tool_timeout),
            require_explicit_success: config.require_explicit_success,
        }
    }
}

fn retryable_tool_error(err: &Error) -> bool {
    !matches!(
        err.kind,
        ErrorKind::Validation | ErrorKind::NotFound | ErrorKind::Unavailable
    )
}

/// Executes or defers recommended actions for one incident at a time
///
/// Actions run strictly in input order. The circuit-breaker registry is
/// the only state shared between incidents.
pub struct RemediationEngine {
    tools: Arc<dyn ToolExecutor>,
    notifier: Arc<dyn Notifier>,
    breakers: Arc<CircuitBreakerRegistry>,
    classifier: RiskClassifier,
    verifier: OutcomeVerifier,
    retry: RetryPolicy,
    tool_timeout: Option<Duration>,
}

impl RemediationEngine {
    pub fn new(
        tools: Arc<dyn ToolExecutor>,
        notifier: Arc<dyn Notifier>,
        breakers: Arc<CircuitBreakerRegistry>,
        config: RemediationConfig,
    ) -> Self {
        Self {
            tools,
            notifier,
            breakers,
            classifier: RiskClassifier::new(),
            verifier: OutcomeVerifier::new(config.require_explicit_success),
            retry: RetryPolicy::new("tool_call", config.retry).retry_if(retryable_tool_error),
            tool_timeout: config.tool_timeout,
        }
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    /// Runs one remediation pass
    ///
    /// Counters on `incident` are updated as actions complete so that later
    /// actions are classified against them.
    #[instrument(skip_all, fields(incident_id = %incident.id, actions = actions.len()))]
    pub async fn execute(
        &self,
        actions: &[RecommendedAction],
        incident: &mut Incident,
    ) -> RemediationResult {
        let mut result = RemediationResult::default();

        for action in actions {
            if let Err(err) = action.validate() {
                warn!(
                    action_type = %action.action_type,
                    error = %err,
                    "Rejecting invalid action"
                );
                counter!("remediation_actions_total", 1, "outcome" => "invalid");
                result
                    .errors
                    .push(format!("{}: {}", action.action_type, err.message));
                result.failed.push(FailedAction {
                    action: action.clone(),
                    reason: err.message,
                    rollback: Vec::new(),
                });
                continue;
            }

            let assessment = self
                .classifier
                .assess(action, &RiskContext::from_incident(incident));
            let mut action = action.clone();
            action.risk_level = assessment.risk_level;

            if assessment.requires_approval {
                self.defer(incident, action, assessment, &mut result).await;
            } else {
                self.run_action(incident, action, &mut result).await;
            }
        }

        info!(
            executed = result.executed.len(),
            failed = result.failed.len(),
            pending_approval = result.pending_approval.len(),
            success = result.success(),
            "Remediation pass complete"
        );

        result
    }

    async fn defer(
        &self,
        incident: &Incident,
        action: RecommendedAction,
        assessment: RiskAssessment,
        result: &mut RemediationResult,
    ) {
        info!(
            action_type = %action.action_type,
            target = %action.target,
            risk_factors = ?assessment.risk_factors,
            "Action requires approval"
        );
        counter!("remediation_actions_total", 1, "outcome" => "pending_approval");

        self.notify(NotificationEvent::ApprovalRequested {
            incident_id: incident.id,
            action_type: action.action_type.clone(),
            target: action.target.clone(),
            description: action.description.clone(),
            risk_factors: assessment.risk_factors.clone(),
        })
        .await;

        result
            .pending_approval
            .push(PendingApproval { action, assessment });
    }

    async fn call_tool(&self, call: &ToolCall) -> Result<Value> {
        let label = format!("{}/{}", call.service, call.tool);

        self.retry
            .retry(&label, |attempt| {
                debug!(tool = %label, attempt = attempt, "Invoking tool");
                self.breakers.call(
                    &call.service,
                    with_timeout(
                        self.tool_timeout,
                        &label,
                        self.tools
                            .execute_tool(&call.service, &call.tool, call.args.clone()),
                    ),
                )
            })
            .await
    }

    async fn run_action(
        &self,
        incident: &mut Incident,
        action: RecommendedAction,
        result: &mut RemediationResult,
    ) {
        let call = action.tool_call();

        let err = match self.call_tool(&call).await {
            Ok(outcome) => match self.verifier.verify(&outcome) {
                Verification::Verified => {
                    if action.params.is_restart() {
                        incident.record_restart();
                    }
                    counter!("remediation_actions_total", 1, "outcome" => "executed");
                    info!(
                        action_type = %action.action_type,
                        target = %action.target,
                        "Action executed and verified"
                    );
                    self.notify(NotificationEvent::ActionExecuted {
                        incident_id: incident.id,
                        action_type: action.action_type.clone(),
                        target: action.target.clone(),
                        success: true,
                        detail: None,
                    })
                    .await;
                    result.executed.push(ExecutedAction { action, outcome });
                    return;
                }
                Verification::Failed(reason) => {
                    let action = with_outcome_hints(action, &outcome);
                    let rollback = self.rollback(&action).await;
                    self.record_failure(incident, action, reason, rollback, result)
                        .await;
                    return;
                }
            },
            Err(err) => err,
        };

        // The dependency never acted: nothing to undo
        let rollback = if err.is_kind(ErrorKind::Unavailable) || err.is_caller_error() {
            debug!(
                action_type = %action.action_type,
                error = %err,
                "Skipping rollback"
            );
            Vec::new()
        } else {
            self.rollback(&action).await
        };

        self.record_failure(incident, action, err.to_string(), rollback, result)
            .await;
    }

    async fn record_failure(
        &self,
        incident: &mut Incident,
        action: RecommendedAction,
        reason: String,
        rollback: Vec<RollbackRecord>,
        result: &mut RemediationResult,
    ) {
        let failures = incident.record_failure();
        counter!("remediation_actions_total", 1, "outcome" => "failed");
        warn!(
            action_type = %action.action_type,
            target = %action.target,
            failed_attempts = failures,
            error = %reason,
            "Action failed"
        );

        self.notify(NotificationEvent::ActionExecuted {
            incident_id: incident.id,
            action_type: action.action_type.clone(),
            target: action.target.clone(),
            success: false,
            detail: Some(reason.clone()),
        })
        .await;

        result
            .errors
            .push(format!("{}: {}", action.action_type, reason));
        result.failed.push(FailedAction {
            action,
            reason,
            rollback,
        });
    }

    /// Runs the rollback plan for `action`; failures are logged, never raised
    async fn rollback(&self, action: &RecommendedAction) -> Vec<RollbackRecord> {
        let plan = RollbackPlan::for_action(action);
        if plan.is_empty() {
            debug!(action_type = %action.action_type, "No rollback defined");
            return Vec::new();
        }

        let mut records = Vec::with_capacity(plan.rollback_actions.len());
        for step in &plan.rollback_actions {
            let call = step.tool_call();
            let label = format!("rollback {}/{}", call.service, call.tool);

            let outcome = self
                .breakers
                .call(
                    &call.service,
                    with_timeout(
                        Some(plan.rollback_timeout),
                        &label,
                        self.tools
                            .execute_tool(&call.service, &call.tool, call.args.clone()),
                    ),
                )
                .await
                .and_then(|value| match self.verifier.verify(&value) {
                    Verification::Verified => Ok(()),
                    Verification::Failed(reason) => Err(Error::external(reason)),
                });

            match outcome {
                Ok(()) => {
                    info!(
                        action_type = %action.action_type,
                        rollback_action = %step.action_type,
                        "Rollback step succeeded"
                    );
                    records.push(RollbackRecord {
                        action_type: step.action_type.clone(),
                        succeeded: true,
                        error: None,
                    });
                }
                Err(err) => {
                    error!(
                        action_type = %action.action_type,
                        rollback_action = %step.action_type,
                        error = %err,
                        "Rollback step failed"
                    );
                    records.push(RollbackRecord {
                        action_type: step.action_type.clone(),
                        succeeded: false,
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        records
    }

    async fn notify(&self, event: NotificationEvent) {
        if let Err(err) = self.notifier.send(&event).await {
            warn!(
                incident_id = %event.incident_id(),
                event = event.kind(),
                error = %err,
                "Failed to send notification"
            );
        }
    }
}

// Tool outcomes may report state the rollback plan needs
fn with_outcome_hints(mut action: RecommendedAction, outcome: &Value) -> RecommendedAction {
    if let ActionParams::ScaleResources {
        previous_replicas, ..
    } = &mut action.params
    {
        if previous_replicas.is_none() {
            *previous_replicas = outcome
                .get("previous_replicas")
                .and_then(Value::as_u64)
                .map(|n| n as u32);
        }
    }
    action
}
