//! # Remediation
//!
//! Routes recommended actions to execution or approval, runs them through
//! retry and the per-dependency circuit breakers, verifies outcomes and
//! rolls back failures.

mod engine;
mod rollback;
mod verification;

pub use engine::{RemediationConfig, RemediationEngine};
pub use rollback::RollbackPlan;
pub use verification::{OutcomeVerifier, Verification};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::actions::{RecommendedAction, RiskAssessment};

/// An action that ran and passed verification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutedAction {
    pub action: RecommendedAction,
    pub outcome: Value,
}

/// An action that failed validation, execution or verification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedAction {
    pub action: RecommendedAction,
    pub reason: String,
    /// Rollback steps attempted for this action
    #[serde(default)]
    pub rollback: Vec<RollbackRecord>,
}

/// An action held for a human decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingApproval {
    pub action: RecommendedAction,
    pub assessment: RiskAssessment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackRecord {
    pub action_type: String,
    pub succeeded: bool,
    pub error: Option<String>,
}

/// Outcome of one remediation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemediationResult {
    pub executed: Vec<ExecutedAction>,
    pub failed: Vec<FailedAction>,
    pub pending_approval: Vec<PendingApproval>,
    pub errors: Vec<String>,
}

impl RemediationResult {
    /// At least one action executed or deferred, and none failed
    pub fn success(&self) -> bool {
        let handled = self.executed.len() + self.pending_approval.len();
        handled > 0 && self.failed.is_empty()
    }

    /// Compact summary persisted onto the incident
    pub fn summary(&self) -> Value {
        let types = |actions: Vec<&RecommendedAction>| {
            actions
                .into_iter()
                .map(|a| format!("{} on {}", a.action_type, a.target))
                .collect::<Vec<_>>()
        };

        serde_json::json!({
            "success": self.success(),
            "executed": types(self.executed.iter().map(|e| &e.action).collect()),
            "failed": types(self.failed.iter().map(|f| &f.action).collect()),
            "pending_approval": types(self.pending_approval.iter().map(|p| &p.action).collect()),
            "errors": self.errors,
        })
    }
}
