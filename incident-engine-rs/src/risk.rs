//! # Risk Classification
//!
//! Deterministic risk tiers for recommended actions. Two business rules
//! override the table: a restart after three earlier restarts, and scaling
//! beyond ten replicas, always need approval. The table is then evaluated
//! top to bottom and the first matching row wins:
//!
//! 1. high-risk term in action type or target: approval
//! 2. P0 incident and a configuration change: approval
//! 3. safe term in action type: autonomous
//! 4. P2/P3 incident and a configuration change: autonomous
//! 5. anything else: approval
//!
//! Terms match as case-insensitive substrings, so `restart_mongodb` counts as
//! a database action.

use serde::{Deserialize, Serialize};

use crate::actions::{ActionParams, ActionRiskLevel, RecommendedAction, RiskAssessment};
use crate::models::{Incident, Severity};

pub const HIGH_RISK_TERMS: &[&str] = &[
    "database",
    "db",
    "schema",
    "delete",
    "drop",
    "truncate",
    "firewall",
    "security",
    "credential",
    "network",
    "dns",
    "certificate",
];

pub const CONFIG_TERMS: &[&str] = &["config", "configuration", "update", "modify", "change"];

pub const SAFE_TERMS: &[&str] = &[
    "restart",
    "reboot",
    "scale_up",
    "scale_down",
    "clear_cache",
    "flush",
];

/// Restarts allowed before further restarts need approval
pub const MAX_AUTONOMOUS_RESTARTS: u32 = 3;
/// Largest replica count reachable without approval
pub const MAX_AUTONOMOUS_REPLICAS: u32 = 10;

const NETWORK_TERMS: &[&str] = &["network", "dns", "firewall", "certificate"];

/// The incident facts classification depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskContext {
    pub severity: Severity,
    pub restart_attempts: u32,
}

impl RiskContext {
    pub fn from_incident(incident: &Incident) -> Self {
        Self {
            severity: incident.severity,
            restart_attempts: incident.restart_attempts(),
        }
    }
}

fn find_term(text: &str, terms: &[&'static str]) -> Option<&'static str> {
    let lowered = text.to_lowercase();
    terms.iter().copied().find(|term| lowered.contains(term))
}

#[derive(Debug, Default, Clone)]
pub struct RiskClassifier;

impl RiskClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Risk tier for `action` in the given incident context
    pub fn classify(&self, action: &RecommendedAction, context: &RiskContext) -> ActionRiskLevel {
        self.evaluate(action, context).0
    }

    /// Risk tier plus the factors that produced it and how to mitigate them
    pub fn assess(&self, action: &RecommendedAction, context: &RiskContext) -> RiskAssessment {
        let (risk_level, mut risk_factors) = self.evaluate(action, context);
        let requires_approval = risk_level != ActionRiskLevel::AutonomousSafe;

        if action.risk_level != risk_level && action.risk_level != ActionRiskLevel::Unrecognized {
            risk_factors.push(format!(
                "model suggested {} but rules require {}",
                action.risk_level, risk_level
            ));
        }

        let action_text = format!("{} {}", action.action_type, action.target);
        if matches!(action.params, ActionParams::DatabaseOperation { .. }) {
            risk_factors.push("database operation".to_string());
        }
        if let Some(term) = find_term(&action_text, NETWORK_TERMS) {
            risk_factors.push(format!("network change ({})", term));
        }

        let mut mitigation_steps = Vec::new();
        if requires_approval {
            mitigation_steps.push("obtain approval from the on-call engineer".to_string());
        }
        match &action.params {
            ActionParams::RestartService => {
                mitigation_steps.push("confirm service health checks after restart".to_string())
            }
            ActionParams::ScaleResources { .. } => {
                mitigation_steps.push("record current replica count for rollback".to_string())
            }
            ActionParams::UpdateConfig { .. } => {
                mitigation_steps.push("keep the previous configuration revision".to_string())
            }
            ActionParams::DatabaseOperation { .. } => {
                mitigation_steps.push("take a database snapshot first".to_string())
            }
            _ => {}
        }

        risk_factors.dedup();

        RiskAssessment {
            risk_level,
            risk_factors,
            mitigation_steps,
            requires_approval,
        }
    }

    fn evaluate(
        &self,
        action: &RecommendedAction,
        context: &RiskContext,
    ) -> (ActionRiskLevel, Vec<String>) {
        use ActionRiskLevel::{AutonomousSafe, RequiresApproval};

        if action.params.is_restart() && context.restart_attempts >= MAX_AUTONOMOUS_RESTARTS {
            return (
                RequiresApproval,
                vec![format!(
                    "restart ceiling reached ({} prior restarts)",
                    context.restart_attempts
                )],
            );
        }

        if let Some(replicas) = action.params.replicas() {
            if replicas > MAX_AUTONOMOUS_REPLICAS {
                return (
                    RequiresApproval,
                    vec![format!(
                        "scaling to {} replicas exceeds {}",
                        replicas, MAX_AUTONOMOUS_REPLICAS
                    )],
                );
            }
        }

        let type_and_target = format!("{} {}", action.action_type, action.target);
        if let Some(term) = find_term(&type_and_target, HIGH_RISK_TERMS) {
            return (RequiresApproval, vec![format!("high-risk term '{}'", term)]);
        }

        let type_and_description = format!("{} {}", action.action_type, action.description);
        let config_term = find_term(&type_and_description, CONFIG_TERMS);

        if let (Severity::P0, Some(term)) = (context.severity, config_term) {
            return (
                RequiresApproval,
                vec![format!("configuration change ('{}') during P0 incident", term)],
            );
        }

        if find_term(&action.action_type, SAFE_TERMS).is_some() {
            return (AutonomousSafe, Vec::new());
        }

        if matches!(context.severity, Severity::P2 | Severity::P3) && config_term.is_some() {
            return (AutonomousSafe, Vec::new());
        }

        (
            RequiresApproval,
            vec!["no rule marks this action safe".to_string()],
        )
    }
}
