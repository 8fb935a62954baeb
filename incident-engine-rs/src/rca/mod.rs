//! # Root-Cause Analysis
//!
//! The analysis prompt, the line-oriented reply protocol, and the analyzer
//! that talks to the model backend with a fallback model.
//!
//! An [`RcaResult`] can only be built through [`RcaDraft`], which enforces
//! the result invariants: a non-empty root cause, a confidence in `[0, 1]`,
//! and at least three evidence items behind any confidence of 0.8 or more.

mod analyzer;
mod parser;
mod prompt;

pub use analyzer::{RcaAnalyzer, RcaAnalyzerConfig};
pub use parser::{ReplySection, RcaProtocolCodec};
pub use prompt::render_prompt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use error_handling_rs::Error;

use crate::actions::RecommendedAction;
use crate::data::DataQualityReport;

/// Confidence at or above which strong evidence is required
pub const HIGH_CONFIDENCE: f64 = 0.8;
/// Evidence items required for high confidence
pub const MIN_HIGH_CONFIDENCE_EVIDENCE: usize = 3;
/// Confidence used when the reply carries no CONFIDENCE section
pub const DEFAULT_CONFIDENCE: f64 = 0.5;
/// Lowest confidence a data-quality reduction can produce
pub const MIN_ADJUSTED_CONFIDENCE: f64 = 0.1;
/// Largest total data-quality reduction
pub const MAX_QUALITY_REDUCTION: f64 = 0.3;
/// Reduction per data-quality issue
pub const REDUCTION_PER_ISSUE: f64 = 0.1;

/// Failures decoding or validating a model reply
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RcaError {
    #[error("missing {0} section in model reply")]
    MissingSection(&'static str),

    #[error("CONFIDENCE value '{0}' is not a number")]
    InvalidConfidence(String),

    #[error("CONFIDENCE {0} is out of range [0, 1]")]
    ConfidenceOutOfRange(f64),

    #[error("confidence {confidence} requires at least {required} evidence items, found {found}")]
    InsufficientEvidence {
        confidence: f64,
        required: usize,
        found: usize,
    },
}

impl From<RcaError> for Error {
    fn from(err: RcaError) -> Self {
        Error::processing(err.to_string()).service("rca").cause(err)
    }
}

/// Unvalidated analysis fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RcaDraft {
    pub incident_id: Uuid,
    pub root_cause: String,
    #[serde(default)]
    pub evidence: Vec<String>,
    pub confidence_score: f64,
    #[serde(default)]
    pub contributing_factors: Vec<String>,
    #[serde(default)]
    pub recommended_actions: Vec<RecommendedAction>,
    #[serde(default)]
    pub analysis_timeline: Vec<String>,
    #[serde(default)]
    pub prevention_strategies: Vec<String>,
}

impl RcaDraft {
    pub fn build(self) -> Result<RcaResult, RcaError> {
        RcaResult::try_from(self)
    }
}

/// A validated root-cause analysis; immutable once built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RcaDraft")]
pub struct RcaResult {
    incident_id: Uuid,
    root_cause: String,
    evidence: Vec<String>,
    confidence_score: f64,
    contributing_factors: Vec<String>,
    recommended_actions: Vec<RecommendedAction>,
    analysis_timeline: Vec<String>,
    prevention_strategies: Vec<String>,
}

impl TryFrom<RcaDraft> for RcaResult {
    type Error = RcaError;

    fn try_from(draft: RcaDraft) -> Result<Self, RcaError> {
        if draft.root_cause.trim().is_empty() {
            return Err(RcaError::MissingSection("ROOT_CAUSE"));
        }

        let confidence = draft.confidence_score;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(RcaError::ConfidenceOutOfRange(confidence));
        }

        if confidence >= HIGH_CONFIDENCE && draft.evidence.len() < MIN_HIGH_CONFIDENCE_EVIDENCE {
            return Err(RcaError::InsufficientEvidence {
                confidence,
                required: MIN_HIGH_CONFIDENCE_EVIDENCE,
                found: draft.evidence.len(),
            });
        }

        Ok(Self {
            incident_id: draft.incident_id,
            root_cause: draft.root_cause.trim().to_string(),
            evidence: draft.evidence,
            confidence_score: confidence,
            contributing_factors: draft.contributing_factors,
            recommended_actions: draft.recommended_actions,
            analysis_timeline: draft.analysis_timeline,
            prevention_strategies: draft.prevention_strategies,
        })
    }
}

impl RcaResult {
    pub fn incident_id(&self) -> Uuid {
        self.incident_id
    }

    pub fn root_cause(&self) -> &str {
        &self.root_cause
    }

    pub fn evidence(&self) -> &[String] {
        &self.evidence
    }

    pub fn confidence_score(&self) -> f64 {
        self.confidence_score
    }

    pub fn contributing_factors(&self) -> &[String] {
        &self.contributing_factors
    }

    pub fn recommended_actions(&self) -> &[RecommendedAction] {
        &self.recommended_actions
    }

    pub fn analysis_timeline(&self) -> &[String] {
        &self.analysis_timeline
    }

    pub fn prevention_strategies(&self) -> &[String] {
        &self.prevention_strategies
    }

    /// Lowers confidence for incomplete input data
    ///
    /// Complete data leaves the result unchanged. Otherwise confidence drops
    /// by `min(0.3, 0.1 × issues)`, never below 0.1 and never upwards, and a
    /// "Limited data available" factor is added unless one is present. Only
    /// lowering confidence keeps the evidence invariant intact.
    pub fn with_data_quality(mut self, report: &DataQualityReport) -> Self {
        if !report.is_incomplete {
            return self;
        }

        let reduction =
            (REDUCTION_PER_ISSUE * report.error_count() as f64).min(MAX_QUALITY_REDUCTION);
        let original = self.confidence_score;
        self.confidence_score = (original - reduction)
            .max(MIN_ADJUSTED_CONFIDENCE)
            .min(original);

        let noted = self
            .contributing_factors
            .iter()
            .any(|f| f.to_lowercase().contains("limited data"));
        if !noted {
            self.contributing_factors.push(format!(
                "Limited data available: {}",
                report.issues.join("; ")
            ));
        }

        self
    }
}
