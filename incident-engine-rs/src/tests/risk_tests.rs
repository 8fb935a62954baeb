use crate::actions::{ActionRiskLevel, RecommendedAction};
use crate::models::Severity;
use crate::risk::{RiskClassifier, RiskContext};

use ActionRiskLevel::{AutonomousSafe, RequiresApproval};

fn ctx(severity: Severity, restart_attempts: u32) -> RiskContext {
    RiskContext {
        severity,
        restart_attempts,
    }
}

fn action(action_type: &str, description: &str, target: &str) -> RecommendedAction {
    RecommendedAction::new(action_type, description, target, AutonomousSafe)
}

#[test]
fn test_high_risk_terms_require_approval() {
    let classifier = RiskClassifier::new();
    let delete = action("delete_corrupted_data", "Remove corrupted rows", "orders-api");

    for severity in [Severity::P0, Severity::P3] {
        assert_eq!(classifier.classify(&delete, &ctx(severity, 0)), RequiresApproval);
    }
}

#[test]
fn test_high_risk_term_in_target_requires_approval() {
    let classifier = RiskClassifier::new();
    let restart = action("restart_service", "Restart the replica", "orders-db");

    assert_eq!(
        classifier.classify(&restart, &ctx(Severity::P3, 0)),
        RequiresApproval
    );
}

#[test]
fn test_high_risk_terms_match_inside_words() {
    let classifier = RiskClassifier::new();
    let mongo = action("restart_mongodb", "Restart the mongo primary", "orders-api");
    let dns = action("flush_dnscache", "Flush resolver cache", "edge-proxy");

    assert_eq!(classifier.classify(&mongo, &ctx(Severity::P3, 0)), RequiresApproval);
    assert_eq!(classifier.classify(&dns, &ctx(Severity::P3, 0)), RequiresApproval);
    assert!(classifier
        .assess(&mongo, &ctx(Severity::P3, 0))
        .risk_factors
        .contains(&"high-risk term 'db'".to_string()));
}

#[test]
fn test_restart_ceiling() {
    let classifier = RiskClassifier::new();
    let restart = action("restart_service", "Restart checkout-api", "checkout-api");

    assert_eq!(classifier.classify(&restart, &ctx(Severity::P1, 2)), AutonomousSafe);
    assert_eq!(
        classifier.classify(&restart, &ctx(Severity::P1, 3)),
        RequiresApproval
    );
}

#[test]
fn test_replica_ceiling() {
    let classifier = RiskClassifier::new();
    let small = action("scale_up", "Scale checkout-api to 8 replicas", "checkout-api");
    let large = action("scale_up", "Scale checkout-api to 15 replicas", "checkout-api");

    assert_eq!(classifier.classify(&small, &ctx(Severity::P2, 0)), AutonomousSafe);
    assert_eq!(classifier.classify(&large, &ctx(Severity::P2, 0)), RequiresApproval);
}

#[test]
fn test_config_change_depends_on_severity() {
    let classifier = RiskClassifier::new();
    let update = action("update_config", "Raise the pool size", "checkout-api");

    assert_eq!(classifier.classify(&update, &ctx(Severity::P0, 0)), RequiresApproval);
    assert_eq!(classifier.classify(&update, &ctx(Severity::P1, 0)), RequiresApproval);
    assert_eq!(classifier.classify(&update, &ctx(Severity::P2, 0)), AutonomousSafe);
    assert_eq!(classifier.classify(&update, &ctx(Severity::P3, 0)), AutonomousSafe);
}

#[test]
fn test_unknown_actions_default_to_approval() {
    let classifier = RiskClassifier::new();
    let drain = action("drain_node", "Drain node 7", "checkout-api");

    assert_eq!(classifier.classify(&drain, &ctx(Severity::P3, 0)), RequiresApproval);
}

#[test]
fn test_assessment_records_disagreement_and_mitigation() {
    let classifier = RiskClassifier::new();
    let migrate = action("database_migration", "Apply index migration", "orders-api");

    let assessment = classifier.assess(&migrate, &ctx(Severity::P2, 0));

    assert!(assessment.requires_approval);
    assert_eq!(assessment.risk_level, RequiresApproval);
    assert!(assessment
        .risk_factors
        .iter()
        .any(|f| f.contains("high-risk term 'database'")));
    assert!(assessment
        .risk_factors
        .iter()
        .any(|f| f.starts_with("model suggested")));
    assert!(assessment
        .mitigation_steps
        .contains(&"take a database snapshot first".to_string()));
}

#[test]
fn test_safe_assessment_needs_no_approval() {
    let classifier = RiskClassifier::new();
    let flush = action("clear_cache", "Flush checkout-api cache", "checkout-api");

    let assessment = classifier.assess(&flush, &ctx(Severity::P0, 0));

    assert!(!assessment.requires_approval);
    assert!(assessment.risk_factors.is_empty());
}
