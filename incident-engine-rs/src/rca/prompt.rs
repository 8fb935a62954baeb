use std::fmt::Write;

use crate::data::GatheredData;
use crate::models::Incident;

pub(crate) const SYSTEM_PROMPT: &str = "You are an expert site reliability engineer performing \
root-cause analysis for production incidents. Answer only in the requested section format.";

const REPLY_FORMAT: &str = "\
Respond using exactly these sections, each label at the start of its own line:
ROOT_CAUSE: <one sentence naming the most likely root cause>
EVIDENCE:
- <observation from the data above supporting the root cause>
CONFIDENCE: <number between 0.0 and 1.0>
CONTRIBUTING_FACTORS:
- <factor>
RECOMMENDED_ACTIONS:
- <action_type>: <description naming the target service> (autonomous_safe|requires_approval)
TIMELINE:
- <time>: <event>
PREVENTION:
- <strategy>
A CONFIDENCE of 0.8 or higher must be backed by at least three EVIDENCE items.";

// Keyword groups on title/description and the focus they trigger
const FOCUS_HINTS: &[(&[&str], &str)] = &[
    (
        &["memory", "oom", "heap"],
        "Memory: inspect heap growth, leaks, garbage-collection pressure and OOM kills.",
    ),
    (
        &["network", "connection", "timeout", "dns"],
        "Connectivity: inspect connection refusals, timeouts, DNS resolution and network partitions.",
    ),
    (
        &["database", "db", "query", "sql"],
        "Database: inspect connection-pool saturation, slow queries, locks and replication lag.",
    ),
];

/// Renders the analysis prompt for one incident
///
/// Every data section is present; empty ones say so explicitly.
/// `historical_context` entries are listed under `HISTORICAL CONTEXT:`.
pub fn render_prompt(
    incident: &Incident,
    data: &GatheredData,
    historical_context: &[String],
) -> String {
    let mut prompt = String::new();

    let _ = writeln!(
        prompt,
        "[{}] INCIDENT ANALYSIS REQUEST",
        incident.severity.label()
    );
    let _ = writeln!(prompt, "Incident ID: {}", incident.id);
    let _ = writeln!(prompt, "Title: {}", incident.title);
    if !incident.description.trim().is_empty() {
        let _ = writeln!(prompt, "Description: {}", incident.description.trim());
    }
    let _ = writeln!(
        prompt,
        "Severity: {} ({})",
        incident.severity,
        incident.severity.label()
    );
    let _ = writeln!(prompt, "Source: {}", incident.source);
    let services = if incident.affected_services.is_empty() {
        "none reported".to_string()
    } else {
        incident
            .affected_services
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    };
    let _ = writeln!(prompt, "Affected services: {}", services);
    let _ = writeln!(prompt, "Detected at: {}", incident.created_at.to_rfc3339());

    prompt.push_str("\nFOCUS:\n");
    for hint in focus_hints(incident) {
        let _ = writeln!(prompt, "- {}", hint);
    }

    section(
        &mut prompt,
        "LOGS",
        "No log data available",
        data.logs.iter().map(|l| {
            format!(
                "[{}] {} {}: {}",
                l.timestamp.to_rfc3339(),
                l.level,
                l.service,
                l.message
            )
        }),
    );
    section(
        &mut prompt,
        "METRICS",
        "No metrics data available",
        data.metrics.iter().map(|m| {
            format!(
                "{} {} = {}{} at {}",
                m.service,
                m.name,
                m.value,
                m.unit.as_deref().map(|u| format!(" {}", u)).unwrap_or_default(),
                m.timestamp.to_rfc3339()
            )
        }),
    );
    section(
        &mut prompt,
        "ALERTS",
        "No alert data available",
        data.alerts.iter().map(|a| {
            format!(
                "{} [{}] on {}: {} (fired {})",
                a.name,
                a.severity,
                a.service,
                a.message,
                a.fired_at.to_rfc3339()
            )
        }),
    );
    section(
        &mut prompt,
        "SYSTEM STATUS",
        "No system status data available",
        data.system_status.iter().map(|s| match &s.details {
            Some(details) => format!("{}: {} ({})", s.service, s.status, details),
            None => format!("{}: {}", s.service, s.status),
        }),
    );
    section(
        &mut prompt,
        "RUNBOOKS",
        "No runbook data available",
        data.runbooks.iter().map(|r| {
            if r.steps.is_empty() {
                r.title.clone()
            } else {
                format!("{}: {}", r.title, r.steps.join(" -> "))
            }
        }),
    );

    if !data.gaps.is_empty() {
        prompt.push_str("\nDATA GAPS:\n");
        for gap in &data.gaps {
            let _ = writeln!(prompt, "- {} could not be collected: {}", gap.source, gap.reason);
        }
    }

    if !historical_context.is_empty() {
        prompt.push_str("\nHISTORICAL CONTEXT:\n");
        for (i, entry) in historical_context.iter().enumerate() {
            let _ = writeln!(prompt, "{}. {}", i + 1, entry);
        }
    }

    prompt.push('\n');
    prompt.push_str(REPLY_FORMAT);
    prompt
}

fn focus_hints(incident: &Incident) -> Vec<&'static str> {
    let text = incident.search_text();
    let words: Vec<&str> = text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let hints: Vec<&'static str> = FOCUS_HINTS
        .iter()
        .filter(|(keywords, _)| {
            keywords.iter().any(|k| {
                if k.len() <= 3 {
                    words.contains(k)
                } else {
                    text.contains(k)
                }
            })
        })
        .map(|(_, hint)| *hint)
        .collect();

    if hints.is_empty() {
        vec!["General: correlate the first errors with recent deployments, configuration and traffic changes."]
    } else {
        hints
    }
}

fn section<I>(prompt: &mut String, label: &str, empty: &str, lines: I)
where
    I: Iterator<Item = String>,
{
    let _ = writeln!(prompt, "\n{}:", label);
    let mut any = false;
    for line in lines {
        any = true;
        let _ = writeln!(prompt, "- {}", line);
    }
    if !any {
        let _ = writeln!(prompt, "{}", empty);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataGap, DataSource, LogEntry};
    use crate::models::{Alert, Severity};
    use chrono::Utc;

    fn incident(title: &str, severity: Severity) -> Incident {
        Incident::from_alert(
            Alert {
                title: title.to_string(),
                description: "p99 latency above SLO".to_string(),
                severity,
                source: "pagerduty".to_string(),
                affected_services: vec!["orders-db".to_string(), "checkout-api".to_string()],
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_critical_header_and_identity() {
        let inc = incident("Checkout outage", Severity::P0);
        let prompt = render_prompt(&inc, &GatheredData::default(), &[]);

        assert!(prompt.starts_with("[CRITICAL] INCIDENT ANALYSIS REQUEST"));
        assert!(prompt.contains(&inc.id.to_string()));
        assert!(prompt.contains("Affected services: checkout-api, orders-db"));
        assert!(prompt.contains("ROOT_CAUSE:"));
        assert!(prompt.contains("PREVENTION:"));
    }

    #[test]
    fn test_empty_sections_say_no_data() {
        let prompt = render_prompt(
            &incident("Slow page", Severity::P3),
            &GatheredData::default(),
            &[],
        );
        for empty in [
            "No log data available",
            "No metrics data available",
            "No alert data available",
            "No system status data available",
            "No runbook data available",
        ] {
            assert!(prompt.contains(empty), "missing '{}'", empty);
        }
        assert!(!prompt.contains("HISTORICAL CONTEXT:"));
    }

    #[test]
    fn test_focus_hints_follow_keywords() {
        let db = render_prompt(
            &incident("Database connection timeout", Severity::P1),
            &GatheredData::default(),
            &[],
        );
        assert!(db.contains("Database: inspect connection-pool"));
        assert!(db.contains("Connectivity:"));
        assert!(!db.contains("Memory:"));

        let mem = render_prompt(
            &incident("Memory leak in worker", Severity::P2),
            &GatheredData::default(),
            &[],
        );
        assert!(mem.contains("Memory: inspect heap"));
    }

    #[test]
    fn test_data_history_and_gaps_are_listed() {
        let data = GatheredData {
            logs: vec![LogEntry {
                timestamp: Utc::now(),
                level: "ERROR".to_string(),
                service: "checkout-api".to_string(),
                message: "pool timeout after 30s".to_string(),
            }],
            gaps: vec![DataGap {
                source: DataSource::Metrics,
                reason: "timed out".to_string(),
            }],
            ..Default::default()
        };
        let history = vec![
            "Checkout outage: connection pool exhausted".to_string(),
            "Orders lag: replica lag".to_string(),
        ];

        let prompt = render_prompt(&incident("Checkout errors", Severity::P1), &data, &history);

        assert!(prompt.contains("pool timeout after 30s"));
        assert!(prompt.contains("metrics could not be collected: timed out"));
        assert!(prompt.contains("HISTORICAL CONTEXT:\n1. Checkout outage: connection pool exhausted\n2. Orders lag"));
    }
}
