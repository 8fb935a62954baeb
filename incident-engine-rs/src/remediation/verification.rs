//! Tool outcome verification
//!
//! Lenient mode accepts any outcome without a failure indicator. That is an
//! approximation, not proof of success; strict mode requires the tool to say
//! it succeeded.

use serde_json::Value;

const SUCCESS_STATUSES: &[&str] = &["success", "succeeded", "ok", "completed"];
const FAILURE_STATUSES: &[&str] = &["failed", "failure", "error"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Verified,
    Failed(String),
}

impl Verification {
    pub fn is_verified(&self) -> bool {
        matches!(self, Verification::Verified)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OutcomeVerifier {
    require_explicit_success: bool,
}

impl OutcomeVerifier {
    pub fn new(require_explicit_success: bool) -> Self {
        Self {
            require_explicit_success,
        }
    }

    pub fn strict() -> Self {
        Self::new(true)
    }

    pub fn verify(&self, outcome: &Value) -> Verification {
        if has_explicit_success(outcome) {
            return Verification::Verified;
        }

        if let Some(reason) = failure_indicator(outcome) {
            return Verification::Failed(reason);
        }

        if self.require_explicit_success {
            Verification::Failed("tool result carries no explicit success indicator".to_string())
        } else {
            Verification::Verified
        }
    }
}

fn status_of(outcome: &Value) -> Option<String> {
    outcome
        .get("status")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_ascii_lowercase())
}

fn has_explicit_success(outcome: &Value) -> bool {
    if outcome.get("success").and_then(Value::as_bool) == Some(true) {
        return true;
    }
    status_of(outcome).map_or(false, |s| SUCCESS_STATUSES.contains(&s.as_str()))
}

fn failure_indicator(outcome: &Value) -> Option<String> {
    if outcome.get("success").and_then(Value::as_bool) == Some(false) {
        return Some("tool reported success=false".to_string());
    }

    match outcome.get("error") {
        None | Some(Value::Null) => {}
        Some(Value::String(message)) => return Some(format!("tool reported error: {}", message)),
        Some(other) => return Some(format!("tool reported error: {}", other)),
    }

    let has_errors = match outcome.get("errors") {
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
        Some(Value::String(s)) => !s.is_empty(),
        _ => false,
    };
    if has_errors {
        return Some("tool reported errors".to_string());
    }

    if outcome.get("failed").and_then(Value::as_bool) == Some(true) {
        return Some("tool reported failed=true".to_string());
    }

    match status_of(outcome) {
        Some(status) if FAILURE_STATUSES.contains(&status.as_str()) => {
            Some(format!("tool reported status '{}'", status))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_explicit_success_wins() {
        let verifier = OutcomeVerifier::strict();
        assert!(verifier.verify(&json!({ "success": true })).is_verified());
        assert!(verifier.verify(&json!({ "status": "Completed" })).is_verified());
    }

    #[test]
    fn test_failure_indicators() {
        let verifier = OutcomeVerifier::default();
        for outcome in [
            json!({ "success": false }),
            json!({ "error": "pod not found" }),
            json!({ "errors": ["quota exceeded"] }),
            json!({ "failed": true }),
            json!({ "status": "failure" }),
        ] {
            assert!(
                !verifier.verify(&outcome).is_verified(),
                "{} should fail",
                outcome
            );
        }
    }

    #[test]
    fn test_null_error_and_empty_errors_are_not_failures() {
        let verifier = OutcomeVerifier::default();
        assert!(verifier
            .verify(&json!({ "error": null, "errors": [] }))
            .is_verified());
    }

    #[test]
    fn test_silent_outcome_depends_on_mode() {
        let silent = json!({ "replicas": 4 });
        assert!(OutcomeVerifier::default().verify(&silent).is_verified());
        assert!(!OutcomeVerifier::strict().verify(&silent).is_verified());
    }
}
