//! # Simulated Collaborators
//!
//! Deterministic data gathering and tool execution for local runs and
//! tests. The orchestrator is the same whichever strategy is injected.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use error_handling_rs::{Error, Result};

use crate::collaborators::{DataGatherer, ToolExecutor};
use crate::data::{
    AlertRecord, DataSource, GatheredData, LogEntry, MetricSample, Runbook, ServiceStatus,
};
use crate::models::Incident;

/// Serves fixed data, or synthesizes a plausible set per incident
#[derive(Debug, Default)]
pub struct SimulatedDataGatherer {
    fixed: Option<GatheredData>,
    failing: HashSet<DataSource>,
}

impl SimulatedDataGatherer {
    /// Synthesizes data from each incident's affected services
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `data` for every incident
    pub fn with_data(data: GatheredData) -> Self {
        Self {
            fixed: Some(data),
            failing: HashSet::new(),
        }
    }

    /// Makes one source fail with an external error
    pub fn failing(mut self, source: DataSource) -> Self {
        self.failing.insert(source);
        self
    }

    fn check(&self, source: DataSource) -> Result<()> {
        if self.failing.contains(&source) {
            return Err(Error::external(format!("{} backend unavailable", source))
                .service("data-gatherer"));
        }
        Ok(())
    }

    fn synthesize(incident: &Incident) -> GatheredData {
        let now = Utc::now();
        let services: Vec<&String> = incident.affected_services.iter().collect();

        GatheredData {
            logs: services
                .iter()
                .map(|service| LogEntry {
                    timestamp: now,
                    level: "ERROR".to_string(),
                    service: service.to_string(),
                    message: format!("{}: {}", incident.title, incident.description),
                })
                .collect(),
            metrics: services
                .iter()
                .flat_map(|service| {
                    [("error_rate", 0.12, "ratio"), ("p99_latency", 2400.0, "ms")]
                        .into_iter()
                        .map(move |(name, value, unit)| MetricSample {
                            name: name.to_string(),
                            service: service.to_string(),
                            value,
                            unit: Some(unit.to_string()),
                            timestamp: now,
                        })
                })
                .collect(),
            alerts: services
                .iter()
                .map(|service| AlertRecord {
                    name: "HighErrorRate".to_string(),
                    severity: incident.severity.label().to_lowercase(),
                    service: service.to_string(),
                    message: incident.title.clone(),
                    fired_at: incident.created_at,
                })
                .collect(),
            system_status: services
                .iter()
                .map(|service| ServiceStatus {
                    service: service.to_string(),
                    status: "degraded".to_string(),
                    details: None,
                })
                .collect(),
            runbooks: vec![Runbook {
                title: "Service degradation triage".to_string(),
                url: None,
                steps: vec![
                    "check recent deployments".to_string(),
                    "restart unhealthy pods".to_string(),
                ],
            }],
            gaps: Vec::new(),
        }
    }

    fn data_for(&self, incident: &Incident) -> GatheredData {
        match &self.fixed {
            Some(data) => data.clone(),
            None => Self::synthesize(incident),
        }
    }
}

#[async_trait]
impl DataGatherer for SimulatedDataGatherer {
    async fn get_logs(&self, incident: &Incident) -> Result<Vec<LogEntry>> {
        self.check(DataSource::Logs)?;
        Ok(self.data_for(incident).logs)
    }

    async fn get_metrics(&self, incident: &Incident) -> Result<Vec<MetricSample>> {
        self.check(DataSource::Metrics)?;
        Ok(self.data_for(incident).metrics)
    }

    async fn get_alerts(&self, incident: &Incident) -> Result<Vec<AlertRecord>> {
        self.check(DataSource::Alerts)?;
        Ok(self.data_for(incident).alerts)
    }

    async fn get_system_status(&self, incident: &Incident) -> Result<Vec<ServiceStatus>> {
        self.check(DataSource::SystemStatus)?;
        Ok(self.data_for(incident).system_status)
    }

    async fn search_runbooks(&self, incident: &Incident) -> Result<Vec<Runbook>> {
        self.check(DataSource::Runbooks)?;
        Ok(self.data_for(incident).runbooks)
    }
}

/// One recorded tool call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub service: String,
    pub tool: String,
    pub args: Value,
}

/// Scripted result for one tool
#[derive(Debug, Clone)]
pub enum SimulatedOutcome {
    Respond(Value),
    Fail(Error),
}

const KNOWN_TOOLS: &[(&str, &str)] = &[
    ("kubernetes", "restart_deployment"),
    ("kubernetes", "scale_deployment"),
    ("kubernetes", "rollback_deployment"),
    ("cache", "clear_cache"),
    ("config", "update_config"),
    ("database", "run_operation"),
    ("runbook", "execute_action"),
];

/// Answers the known tools with explicit success and records every call
#[derive(Debug, Default)]
pub struct SimulatedToolExecutor {
    outcomes: HashMap<(String, String), SimulatedOutcome>,
    invocations: Mutex<Vec<ToolInvocation>>,
}

impl SimulatedToolExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outcome(mut self, service: &str, tool: &str, outcome: SimulatedOutcome) -> Self {
        self.outcomes
            .insert((service.to_string(), tool.to_string()), outcome);
        self
    }

    pub fn invocations(&self) -> Vec<ToolInvocation> {
        self.invocations
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    fn default_response(service: &str, tool: &str, args: &Value) -> Value {
        let mut response = json!({
            "success": true,
            "service": service,
            "tool": tool,
        });
        if tool == "scale_deployment" {
            response["replicas"] = args.get("replicas").cloned().unwrap_or(Value::Null);
            response["previous_replicas"] = json!(3);
        }
        response
    }
}

#[async_trait]
impl ToolExecutor for SimulatedToolExecutor {
    async fn execute_tool(&self, service: &str, tool: &str, args: Value) -> Result<Value> {
        if let Ok(mut calls) = self.invocations.lock() {
            calls.push(ToolInvocation {
                service: service.to_string(),
                tool: tool.to_string(),
                args: args.clone(),
            });
        }

        if let Some(outcome) = self.outcomes.get(&(service.to_string(), tool.to_string())) {
            return match outcome {
                SimulatedOutcome::Respond(value) => Ok(value.clone()),
                SimulatedOutcome::Fail(err) => Err(err.clone()),
            };
        }

        if !KNOWN_TOOLS.contains(&(service, tool)) {
            return Err(Error::not_found(format!("unknown tool {}/{}", service, tool))
                .service(service.to_string()));
        }

        Ok(Self::default_response(service, tool, &args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Alert, Severity};
    use error_handling_rs::ErrorKind;

    fn incident() -> Incident {
        Incident::from_alert(
            Alert {
                title: "Checkout errors".to_string(),
                description: "5xx spike".to_string(),
                severity: Severity::P1,
                source: "datadog".to_string(),
                affected_services: vec!["checkout-api".to_string()],
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_synthesized_data_covers_affected_services() {
        let gatherer = SimulatedDataGatherer::new();
        let inc = incident();

        let logs = gatherer.get_logs(&inc).await.unwrap();
        assert_eq!(logs[0].service, "checkout-api");
        assert_eq!(gatherer.get_metrics(&inc).await.unwrap().len(), 2);
        assert!(!gatherer.search_runbooks(&inc).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failing_source() {
        let gatherer = SimulatedDataGatherer::with_data(GatheredData::default())
            .failing(DataSource::Alerts);
        let inc = incident();

        assert!(gatherer.get_alerts(&inc).await.is_err());
        assert!(gatherer.get_logs(&inc).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_tool_is_not_found_and_recorded() {
        let tools = SimulatedToolExecutor::new();
        let err = tools
            .execute_tool("kubernetes", "delete_cluster", json!({}))
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(tools.invocations().len(), 1);
    }

    #[tokio::test]
    async fn test_scripted_outcome_overrides_default() {
        let tools = SimulatedToolExecutor::new().with_outcome(
            "cache",
            "clear_cache",
            SimulatedOutcome::Respond(json!({ "status": "failed" })),
        );
        let value = tools
            .execute_tool("cache", "clear_cache", json!({}))
            .await
            .unwrap();
        assert_eq!(value["status"], "failed");

        let ok = tools
            .execute_tool("kubernetes", "scale_deployment", json!({ "replicas": 5 }))
            .await
            .unwrap();
        assert_eq!(ok["success"], true);
        assert_eq!(ok["previous_replicas"], 3);
    }
}
