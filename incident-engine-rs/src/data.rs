//! # Gathered Data
//!
//! Typed records returned by the data-gathering collaborator, bundled once
//! per analysis pass, plus the data-quality report that scales confidence.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub service: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub name: String,
    pub service: String,
    pub value: f64,
    #[serde(default)]
    pub unit: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub name: String,
    pub severity: String,
    pub service: String,
    pub message: String,
    pub fired_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub service: String,
    pub status: String,
    #[serde(default)]
    pub details: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Runbook {
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub steps: Vec<String>,
}

/// The five data-gathering calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Logs,
    Metrics,
    Alerts,
    SystemStatus,
    Runbooks,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataSource::Logs => "logs",
            DataSource::Metrics => "metrics",
            DataSource::Alerts => "alerts",
            DataSource::SystemStatus => "system status",
            DataSource::Runbooks => "runbooks",
        };
        f.write_str(s)
    }
}

/// A gathering call that failed or timed out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataGap {
    pub source: DataSource,
    pub reason: String,
}

/// Everything gathered for one analysis pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatheredData {
    pub logs: Vec<LogEntry>,
    pub metrics: Vec<MetricSample>,
    pub alerts: Vec<AlertRecord>,
    pub system_status: Vec<ServiceStatus>,
    pub runbooks: Vec<Runbook>,
    #[serde(default)]
    pub gaps: Vec<DataGap>,
}

impl GatheredData {
    pub fn quality(&self) -> DataQualityReport {
        DataQualityReport::assess(self)
    }
}

/// Data-quality findings for one `GatheredData`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataQualityReport {
    pub issues: Vec<String>,
    /// Any of logs, metrics or alerts came back empty
    pub is_incomplete: bool,
}

impl DataQualityReport {
    pub fn assess(data: &GatheredData) -> Self {
        let mut issues = Vec::new();
        let core = [
            (DataSource::Logs, data.logs.is_empty()),
            (DataSource::Metrics, data.metrics.is_empty()),
            (DataSource::Alerts, data.alerts.is_empty()),
        ];

        let is_incomplete = core.iter().any(|(_, empty)| *empty);
        // A failed call is reported once, through its gap
        for (source, empty) in core {
            if empty && !data.gaps.iter().any(|gap| gap.source == source) {
                issues.push(format!("no {} available", source));
            }
        }

        for gap in &data.gaps {
            issues.push(format!("{} unavailable: {}", gap.source, gap.reason));
        }

        Self {
            issues,
            is_incomplete,
        }
    }

    pub fn error_count(&self) -> usize {
        self.issues.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log() -> LogEntry {
        LogEntry {
            timestamp: Utc::now(),
            level: "ERROR".to_string(),
            service: "api".to_string(),
            message: "connection refused".to_string(),
        }
    }

    #[test]
    fn test_empty_data_is_incomplete_with_three_issues() {
        let report = GatheredData::default().quality();
        assert!(report.is_incomplete);
        assert_eq!(report.error_count(), 3);
        assert!(report.issues[0].contains("logs"));
    }

    #[test]
    fn test_gaps_count_as_issues() {
        let data = GatheredData {
            logs: vec![log()],
            gaps: vec![DataGap {
                source: DataSource::Metrics,
                reason: "timed out".to_string(),
            }],
            ..Default::default()
        };

        let report = data.quality();
        assert!(report.is_incomplete);
        // empty alerts, plus the metrics gap counted once
        assert_eq!(report.error_count(), 2);
        assert!(report.issues.iter().any(|i| i.contains("timed out")));
        assert!(!report.issues.iter().any(|i| i == "no metrics available"));
    }

    #[test]
    fn test_gap_alone_does_not_mark_incomplete() {
        let data = GatheredData {
            logs: vec![log()],
            metrics: vec![MetricSample {
                name: "cpu".to_string(),
                service: "api".to_string(),
                value: 0.9,
                unit: None,
                timestamp: Utc::now(),
            }],
            alerts: vec![AlertRecord {
                name: "HighCpu".to_string(),
                severity: "warning".to_string(),
                service: "api".to_string(),
                message: "cpu above 90%".to_string(),
                fired_at: Utc::now(),
            }],
            gaps: vec![DataGap {
                source: DataSource::Runbooks,
                reason: "search index offline".to_string(),
            }],
            ..Default::default()
        };

        let report = data.quality();
        assert!(!report.is_incomplete);
        assert_eq!(report.error_count(), 1);
    }
}
