//! Concurrent data gathering
//!
//! The five collaborator calls run together, each under its own deadline.
//! A failed call never aborts the others; it is recorded as a gap.

use std::time::Duration;

use metrics::counter;
use tracing::{debug, instrument, warn};

use error_handling_rs::{with_timeout, Result};

use crate::collaborators::DataGatherer;
use crate::data::{DataGap, DataSource, GatheredData};
use crate::models::Incident;

fn collect<T>(source: DataSource, outcome: Result<Vec<T>>, gaps: &mut Vec<DataGap>) -> Vec<T> {
    match outcome {
        Ok(records) => {
            debug!(source = %source, records = records.len(), "Data source gathered");
            records
        }
        Err(err) => {
            warn!(source = %source, error = %err, "Data source failed, continuing without it");
            counter!("data_gathering_failures_total", 1, "source" => source.to_string());
            gaps.push(DataGap {
                source,
                reason: err.to_string(),
            });
            Vec::new()
        }
    }
}

/// Gathers everything available for `incident`
#[instrument(skip_all, fields(incident_id = %incident.id))]
pub async fn gather(
    gatherer: &dyn DataGatherer,
    incident: &Incident,
    timeout: Option<Duration>,
) -> GatheredData {
    let (logs, metrics, alerts, system_status, runbooks) = tokio::join!(
        with_timeout(timeout, "get_logs", gatherer.get_logs(incident)),
        with_timeout(timeout, "get_metrics", gatherer.get_metrics(incident)),
        with_timeout(timeout, "get_alerts", gatherer.get_alerts(incident)),
        with_timeout(timeout, "get_system_status", gatherer.get_system_status(incident)),
        with_timeout(timeout, "search_runbooks", gatherer.search_runbooks(incident)),
    );

    let mut gaps = Vec::new();
    GatheredData {
        logs: collect(DataSource::Logs, logs, &mut gaps),
        metrics: collect(DataSource::Metrics, metrics, &mut gaps),
        alerts: collect(DataSource::Alerts, alerts, &mut gaps),
        system_status: collect(DataSource::SystemStatus, system_status, &mut gaps),
        runbooks: collect(DataSource::Runbooks, runbooks, &mut gaps),
        gaps,
    }
}
