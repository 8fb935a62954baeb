//! # Incident Response Engine
//!
//! Receives alerts, drives incidents through a bounded lifecycle, asks a
//! language model for a root-cause analysis, classifies the recommended
//! actions by risk and executes the safe ones under retry, circuit-breaker
//! and rollback discipline.
//!
//! ## Modules
//!
//! - [`workflow`]: lifecycle transitions and escalation clocks
//! - [`rca`]: prompt rendering, reply parsing and the model-backed analyzer
//! - [`risk`]: autonomous-vs-approval classification of actions
//! - [`remediation`]: action execution, verification and rollback
//! - [`orchestrator`]: the end-to-end driver
//!
//! External systems sit behind the traits in [`collaborators`].

pub mod actions;
pub mod collaborators;
pub mod data;
pub mod gathering;
pub mod llm_client;
pub mod models;
pub mod notification;
pub mod orchestrator;
pub mod rca;
pub mod remediation;
pub mod risk;
pub mod simulation;
pub mod store;
pub mod workflow;

pub use actions::{ActionParams, ActionRiskLevel, RecommendedAction, RiskAssessment, ToolCall};
pub use collaborators::{
    ChatMessage, DataGatherer, IncidentStore, ModelClient, ModelRequest, Notifier, ToolExecutor,
};
pub use data::{DataGap, DataQualityReport, DataSource, GatheredData};
pub use llm_client::HttpModelClient;
pub use models::{Alert, Incident, IncidentStatus, IncidentUpdate, Severity, StatusChange};
pub use notification::{LogNotifier, NotificationEvent};
pub use orchestrator::{IncidentOrchestrator, IncidentOutcome, OrchestratorBuilder};
pub use rca::{RcaAnalyzer, RcaAnalyzerConfig, RcaError, RcaProtocolCodec, RcaResult};
pub use remediation::{RemediationConfig, RemediationEngine, RemediationResult};
pub use risk::{RiskClassifier, RiskContext};
pub use simulation::{SimulatedDataGatherer, SimulatedToolExecutor};
pub use store::InMemoryIncidentStore;
pub use workflow::{EscalationClock, WorkflowStateMachine};

#[cfg(test)]
mod tests {
    pub mod parser_tests;
    pub mod remediation_tests;
    pub mod risk_tests;
}
