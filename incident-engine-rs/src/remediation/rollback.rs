//! Rollback plans derived from an action's type

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::actions::{ActionParams, ActionRiskLevel, RecommendedAction};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackPlan {
    pub rollback_actions: Vec<RecommendedAction>,
    pub rollback_conditions: Vec<String>,
    pub rollback_timeout: Duration,
}

impl RollbackPlan {
    /// Counter-actions for `action`; empty when there is nothing to undo
    pub fn for_action(action: &RecommendedAction) -> Self {
        let target = action.target.as_str();
        let counter = |action_type: &str, description: String, params: ActionParams| {
            RecommendedAction::new(
                action_type,
                description,
                target,
                ActionRiskLevel::RequiresApproval,
            )
            .with_params(params)
        };

        match &action.params {
            ActionParams::ScaleResources {
                previous_replicas: Some(previous),
                ..
            } => Self {
                rollback_actions: vec![counter(
                    "scale_resources",
                    format!("Scale {} back to {} replicas", target, previous),
                    ActionParams::ScaleResources {
                        replicas: Some(*previous),
                        previous_replicas: None,
                    },
                )],
                rollback_conditions: vec![
                    "scaled deployment failed verification".to_string(),
                    "replica count differs from request".to_string(),
                ],
                rollback_timeout: Duration::from_secs(120),
            },
            ActionParams::UpdateConfig { .. } => Self {
                rollback_actions: vec![counter(
                    "rollback_deployment",
                    format!("Roll {} back to its previous revision", target),
                    ActionParams::RollbackDeployment { revision: None },
                )],
                rollback_conditions: vec![
                    "configuration change failed verification".to_string(),
                    "error rate rose after configuration change".to_string(),
                ],
                rollback_timeout: Duration::from_secs(300),
            },
            ActionParams::DatabaseOperation { database, .. } => Self {
                rollback_actions: vec![counter(
                    "restore_snapshot",
                    format!("Restore the pre-operation snapshot of {}", target),
                    ActionParams::Other {
                        values: database
                            .iter()
                            .map(|db| ("database".to_string(), serde_json::Value::from(db.clone())))
                            .collect::<Map<_, _>>(),
                    },
                )],
                rollback_conditions: vec!["database operation failed verification".to_string()],
                rollback_timeout: Duration::from_secs(600),
            },
            _ => Self::empty(),
        }
    }

    pub fn empty() -> Self {
        Self {
            rollback_actions: Vec::new(),
            rollback_conditions: Vec::new(),
            rollback_timeout: Duration::from_secs(60),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rollback_actions.is_empty()
    }
}
