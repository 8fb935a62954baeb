//! # Remediation Actions
//!
//! Recommended actions carry a typed parameter payload selected by their
//! `action_type`; only unrecognized types fall back to an opaque map.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use error_handling_rs::{Error, Result};

static REPLICAS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+)\s+replicas?").expect("replica pattern is valid"));

/// Risk tier of a recommended action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionRiskLevel {
    AutonomousSafe,
    RequiresApproval,
    /// Any label outside the two known tiers; fails validation
    #[serde(other)]
    Unrecognized,
}

impl fmt::Display for ActionRiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionRiskLevel::AutonomousSafe => "AUTONOMOUS_SAFE",
            ActionRiskLevel::RequiresApproval => "REQUIRES_APPROVAL",
            ActionRiskLevel::Unrecognized => "UNRECOGNIZED",
        };
        f.write_str(s)
    }
}

impl FromStr for ActionRiskLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "autonomous_safe" => Ok(ActionRiskLevel::AutonomousSafe),
            "requires_approval" => Ok(ActionRiskLevel::RequiresApproval),
            other => Err(Error::validation(format!("unknown risk level '{}'", other))
                .context("field", "risk_level")),
        }
    }
}

/// Typed parameters, one variant per well-known action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionParams {
    RestartService,
    ScaleResources {
        replicas: Option<u32>,
        previous_replicas: Option<u32>,
    },
    ClearCache,
    UpdateConfig {
        #[serde(default)]
        settings: Map<String, Value>,
    },
    DatabaseOperation {
        operation: Option<String>,
        database: Option<String>,
    },
    RollbackDeployment {
        revision: Option<String>,
    },
    Other {
        #[serde(default)]
        values: Map<String, Value>,
    },
}

impl ActionParams {
    /// Picks the payload variant for an action type, extracting what the
    /// description states (e.g. "to 6 replicas")
    pub fn for_action(action_type: &str, description: &str) -> Self {
        let kind = action_type.trim().to_ascii_lowercase();

        match kind.as_str() {
            "restart_service" | "restart" | "restart_pod" | "reboot" => ActionParams::RestartService,
            "scale_resources" | "scale_up" | "scale_down" | "scale" => {
                ActionParams::ScaleResources {
                    replicas: extract_replicas(description),
                    previous_replicas: None,
                }
            }
            "clear_cache" | "flush_cache" | "flush" => ActionParams::ClearCache,
            "update_config" | "update_configuration" | "modify_config" | "change_config" => {
                ActionParams::UpdateConfig {
                    settings: Map::new(),
                }
            }
            "rollback_deployment" | "rollback" => ActionParams::RollbackDeployment { revision: None },
            k if k.starts_with("database") || k.starts_with("db_") => {
                ActionParams::DatabaseOperation {
                    operation: Some(k.to_string()),
                    database: None,
                }
            }
            _ => ActionParams::Other { values: Map::new() },
        }
    }

    pub fn replicas(&self) -> Option<u32> {
        match self {
            ActionParams::ScaleResources { replicas, .. } => *replicas,
            _ => None,
        }
    }

    pub fn is_restart(&self) -> bool {
        matches!(self, ActionParams::RestartService)
    }
}

fn extract_replicas(description: &str) -> Option<u32> {
    REPLICAS
        .captures(description)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// One remediation step recommended by root-cause analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedAction {
    pub action_type: String,
    pub description: String,
    pub target: String,
    pub risk_level: ActionRiskLevel,
    pub params: ActionParams,
    #[serde(default)]
    pub estimated_impact: Option<String>,
}

impl RecommendedAction {
    pub fn new(
        action_type: impl Into<String>,
        description: impl Into<String>,
        target: impl Into<String>,
        risk_level: ActionRiskLevel,
    ) -> Self {
        let action_type = action_type.into();
        let description = description.into();
        let params = ActionParams::for_action(&action_type, &description);
        Self {
            action_type,
            description,
            target: target.into(),
            risk_level,
            params,
            estimated_impact: None,
        }
    }

    pub fn with_params(mut self, params: ActionParams) -> Self {
        self.params = params;
        self
    }

    /// Checks the fields required before an action may be classified or run
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("action_type", &self.action_type),
            ("target", &self.target),
            ("description", &self.description),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(Error::validation(format!("action field '{}' is empty", field))
                    .context("field", field));
            }
        }
        if self.risk_level == ActionRiskLevel::Unrecognized {
            return Err(Error::validation(format!(
                "action '{}' has an unrecognized risk level",
                self.action_type
            ))
            .context("field", "risk_level"));
        }
        Ok(())
    }

    /// Resolves the tool invocation that carries out this action
    pub fn tool_call(&self) -> ToolCall {
        let (service, tool, args) = match &self.params {
            ActionParams::RestartService => (
                "kubernetes",
                "restart_deployment",
                json!({ "deployment": self.target }),
            ),
            ActionParams::ScaleResources { replicas, .. } => (
                "kubernetes",
                "scale_deployment",
                json!({ "deployment": self.target, "replicas": replicas }),
            ),
            ActionParams::RollbackDeployment { revision } => (
                "kubernetes",
                "rollback_deployment",
                json!({ "deployment": self.target, "revision": revision }),
            ),
            ActionParams::ClearCache => ("cache", "clear_cache", json!({ "target": self.target })),
            ActionParams::UpdateConfig { settings } => (
                "config",
                "update_config",
                json!({ "target": self.target, "settings": settings }),
            ),
            ActionParams::DatabaseOperation {
                operation,
                database,
            } => (
                "database",
                "run_operation",
                json!({
                    "target": self.target,
                    "operation": operation,
                    "database": database,
                }),
            ),
            ActionParams::Other { values } => (
                "runbook",
                "execute_action",
                json!({
                    "action_type": self.action_type,
                    "target": self.target,
                    "description": self.description,
                    "params": values,
                }),
            ),
        };

        ToolCall {
            service: service.to_string(),
            tool: tool.to_string(),
            args,
        }
    }
}

/// A concrete call against the tool-execution collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub service: String,
    pub tool: String,
    pub args: Value,
}

/// Outcome of classifying one action for one execution attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_level: ActionRiskLevel,
    pub risk_factors: Vec<String>,
    pub mitigation_steps: Vec<String>,
    pub requires_approval: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use error_handling_rs::ErrorKind;

    #[test]
    fn test_params_follow_action_type() {
        assert_eq!(
            ActionParams::for_action("restart_service", "Restart checkout-api"),
            ActionParams::RestartService
        );
        assert_eq!(
            ActionParams::for_action("scale_resources", "Scale checkout-api to 15 replicas").replicas(),
            Some(15)
        );
        assert!(matches!(
            ActionParams::for_action("db_failover", "Fail over orders-db"),
            ActionParams::DatabaseOperation { .. }
        ));
        assert!(matches!(
            ActionParams::for_action("page_oncall", "Page the database team"),
            ActionParams::Other { .. }
        ));
    }

    #[test]
    fn test_risk_level_labels() {
        assert_eq!(
            "AUTONOMOUS_SAFE".parse::<ActionRiskLevel>().unwrap(),
            ActionRiskLevel::AutonomousSafe
        );
        assert!("maybe".parse::<ActionRiskLevel>().is_err());

        let level: ActionRiskLevel = serde_json::from_str("\"YOLO\"").unwrap();
        assert_eq!(level, ActionRiskLevel::Unrecognized);
    }

    #[test]
    fn test_validate_requires_fields() {
        let action = RecommendedAction::new(
            "restart_service",
            "Restart checkout-api",
            "",
            ActionRiskLevel::AutonomousSafe,
        );
        let err = action.validate().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(err.message.contains("target"));

        let unknown = RecommendedAction::new(
            "restart_service",
            "Restart checkout-api",
            "checkout-api",
            ActionRiskLevel::Unrecognized,
        );
        assert!(unknown.validate().is_err());
    }

    #[test]
    fn test_tool_call_mapping() {
        let scale = RecommendedAction::new(
            "scale_up",
            "Scale checkout-api to 6 replicas",
            "checkout-api",
            ActionRiskLevel::AutonomousSafe,
        );
        let call = scale.tool_call();
        assert_eq!(call.service, "kubernetes");
        assert_eq!(call.tool, "scale_deployment");
        assert_eq!(call.args["replicas"], json!(6));

        let other = RecommendedAction::new(
            "notify_team",
            "Tell the payments team",
            "payments",
            ActionRiskLevel::RequiresApproval,
        );
        assert_eq!(other.tool_call().service, "runbook");
    }
}
