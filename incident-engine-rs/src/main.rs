// incident-engine-rs/src/main.rs
// Entry point for the incident-responder binary
// Reads one alert as JSON, drives it through the orchestrator, prints the outcome

use std::env;
use std::fs;
use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::info;

use config_rs::EngineConfig;
use error_handling_rs::{init_logging, LoggingConfig};
use incident_engine::{
    Alert, HttpModelClient, InMemoryIncidentStore, IncidentOrchestrator, LogNotifier,
    SimulatedDataGatherer, SimulatedToolExecutor,
};

fn usage() -> String {
    let program = env::args()
        .next()
        .unwrap_or_else(|| "incident-responder".to_string());
    format!("usage: {} <alert.json>", program)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = EngineConfig::from_env();
    if let Err(problem) = config.validate() {
        bail!("invalid configuration: {}", problem);
    }

    init_logging(Some(LoggingConfig {
        level: config.log_level.clone(),
        service_name: "incident-responder".to_string(),
        json_format: config.log_json,
    }))?;

    let Some(path) = env::args().nth(1) else {
        bail!(usage());
    };

    let raw = fs::read_to_string(&path).with_context(|| format!("failed to read {}", path))?;
    let alert: Alert =
        serde_json::from_str(&raw).with_context(|| format!("failed to parse alert in {}", path))?;

    let orchestrator = IncidentOrchestrator::builder(config.clone())
        .model(Arc::new(HttpModelClient::from_config(&config)?))
        .gatherer(Arc::new(SimulatedDataGatherer::new()))
        .tools(Arc::new(SimulatedToolExecutor::new()))
        .store(Arc::new(InMemoryIncidentStore::new()))
        .notifier(Arc::new(LogNotifier))
        .build()?;

    info!(
        primary_model = %config.primary_model,
        fallback_model = %config.fallback_model,
        "Incident responder ready"
    );

    let outcome = orchestrator.handle_alert(alert).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    Ok(())
}
