//! Reply protocol parsing
//!
//! Grammar, applied line by line:
//!
//! ```text
//! header  = ^([A-Z_]+):\s*(.*)$          starts a section, rest is inline content
//! item    = ^\s*-\s+(.+)$                 list item inside the current section
//! action  = action_type ":" description "(" autonomous_safe | requires_approval ")"
//! ```
//!
//! Unknown headers close the current section. A repeated header appends to
//! the section it names.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::actions::{ActionRiskLevel, RecommendedAction};
use crate::data::GatheredData;
use crate::models::Incident;

use super::prompt::render_prompt;
use super::{RcaDraft, RcaError, RcaResult, DEFAULT_CONFIDENCE};

static SECTION_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z_]+):\s*(.*)$").expect("header pattern is valid"));

static LIST_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*-\s+(.+)$").expect("list item pattern is valid"));

static ACTION_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^([a-z0-9_]+)\s*:\s*(.+?)\s*\((autonomous_safe|requires_approval)\)\s*$")
        .expect("action pattern is valid")
});

/// The seven labeled sections of a model reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplySection {
    RootCause,
    Evidence,
    Confidence,
    ContributingFactors,
    RecommendedActions,
    Timeline,
    Prevention,
}

impl ReplySection {
    pub fn label(&self) -> &'static str {
        match self {
            ReplySection::RootCause => "ROOT_CAUSE",
            ReplySection::Evidence => "EVIDENCE",
            ReplySection::Confidence => "CONFIDENCE",
            ReplySection::ContributingFactors => "CONTRIBUTING_FACTORS",
            ReplySection::RecommendedActions => "RECOMMENDED_ACTIONS",
            ReplySection::Timeline => "TIMELINE",
            ReplySection::Prevention => "PREVENTION",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        match label {
            "ROOT_CAUSE" => Some(ReplySection::RootCause),
            "EVIDENCE" => Some(ReplySection::Evidence),
            "CONFIDENCE" => Some(ReplySection::Confidence),
            "CONTRIBUTING_FACTORS" => Some(ReplySection::ContributingFactors),
            "RECOMMENDED_ACTIONS" => Some(ReplySection::RecommendedActions),
            "TIMELINE" => Some(ReplySection::Timeline),
            "PREVENTION" => Some(ReplySection::Prevention),
            _ => None,
        }
    }
}

// Raw non-empty lines per section, inline header content first
type Sections = HashMap<ReplySection, Vec<String>>;

fn split_sections(reply: &str) -> Sections {
    let mut sections: Sections = HashMap::new();
    let mut current: Option<ReplySection> = None;

    for raw in reply.lines() {
        let line = raw.trim_end();
        if line.trim().is_empty() {
            continue;
        }

        if let Some(caps) = SECTION_HEADER.captures(line.trim_start()) {
            current = ReplySection::from_label(&caps[1]);
            if current.is_none() {
                debug!(label = &caps[1], "Ignoring unknown reply section");
            }
            if let Some(section) = current {
                let entry = sections.entry(section).or_default();
                let inline = caps[2].trim();
                if !inline.is_empty() {
                    entry.push(inline.to_string());
                }
            }
            continue;
        }

        if let Some(section) = current {
            sections.entry(section).or_default().push(line.to_string());
        }
    }

    sections
}

/// Lines of a section that start with `- `; anything else is dropped
fn list_items(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|line| match LIST_ITEM.captures(line) {
            Some(caps) => Some(caps[1].trim().to_string()),
            None => {
                debug!(line = %line.trim(), "Skipping non-list line in reply section");
                None
            }
        })
        .filter(|item| !item.is_empty())
        .collect()
}

fn parse_confidence(lines: Option<&Vec<String>>) -> Result<f64, RcaError> {
    let raw = match lines.and_then(|l| l.first()) {
        Some(raw) => raw.trim(),
        None => return Ok(DEFAULT_CONFIDENCE),
    };

    let token = raw.split_whitespace().next().unwrap_or(raw);
    let value: f64 = token
        .parse()
        .map_err(|_| RcaError::InvalidConfidence(raw.to_string()))?;

    if !(0.0..=1.0).contains(&value) {
        return Err(RcaError::ConfidenceOutOfRange(value));
    }
    Ok(value)
}

/// Chooses the affected service an action refers to: the one named in its
/// description, else the incident's first affected service
fn bind_target(incident: &Incident, description: &str) -> String {
    let lowered = description.to_lowercase();
    incident
        .affected_services
        .iter()
        .find(|service| lowered.contains(&service.to_lowercase()))
        .or_else(|| incident.affected_services.iter().next())
        .cloned()
        .unwrap_or_default()
}

fn parse_actions(incident: &Incident, lines: &[String]) -> Vec<RecommendedAction> {
    let mut actions = Vec::new();

    for item in list_items(lines) {
        let caps = match ACTION_LINE.captures(&item) {
            Some(caps) => caps,
            None => {
                warn!(incident_id = %incident.id, line = %item, "Skipping malformed action line");
                continue;
            }
        };

        let action_type = caps[1].to_ascii_lowercase();
        let description = caps[2].trim().to_string();
        let risk_level = caps[3]
            .parse::<ActionRiskLevel>()
            .unwrap_or(ActionRiskLevel::Unrecognized);
        let target = bind_target(incident, &description);

        actions.push(RecommendedAction::new(action_type, description, target, risk_level));
    }

    actions
}

/// Encodes analysis requests and decodes model replies
pub struct RcaProtocolCodec;

impl RcaProtocolCodec {
    pub fn render_prompt(
        incident: &Incident,
        data: &GatheredData,
        historical_context: &[String],
    ) -> String {
        render_prompt(incident, data, historical_context)
    }

    /// Decodes a model reply into a validated result for `incident`
    pub fn parse(incident: &Incident, reply: &str) -> Result<RcaResult, RcaError> {
        let sections = split_sections(reply);

        let root_cause = sections
            .get(&ReplySection::RootCause)
            .map(|lines| {
                lines
                    .iter()
                    .map(|l| l.trim())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .filter(|text| !text.trim().is_empty())
            .ok_or(RcaError::MissingSection(ReplySection::RootCause.label()))?;

        let confidence = parse_confidence(sections.get(&ReplySection::Confidence))?;

        let items = |section: ReplySection| {
            sections
                .get(&section)
                .map(|lines| list_items(lines))
                .unwrap_or_default()
        };

        let recommended_actions = sections
            .get(&ReplySection::RecommendedActions)
            .map(|lines| parse_actions(incident, lines))
            .unwrap_or_default();

        RcaDraft {
            incident_id: incident.id,
            root_cause,
            evidence: items(ReplySection::Evidence),
            confidence_score: confidence,
            contributing_factors: items(ReplySection::ContributingFactors),
            recommended_actions,
            analysis_timeline: items(ReplySection::Timeline),
            prevention_strategies: items(ReplySection::Prevention),
        }
        .build()
    }
}
