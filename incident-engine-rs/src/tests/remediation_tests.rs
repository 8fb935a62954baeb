use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use mockall::mock;
use serde_json::{json, Value};

use error_handling_rs::{
    CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState, Error, Result, RetryConfig,
};

use crate::actions::{ActionRiskLevel, RecommendedAction};
use crate::collaborators::{Notifier, ToolExecutor};
use crate::models::{Alert, Incident, Severity};
use crate::notification::NotificationEvent;
use crate::remediation::{RemediationConfig, RemediationEngine};

mock! {
    pub Tools {}

    #[async_trait]
    impl ToolExecutor for Tools {
        async fn execute_tool(&self, service: &str, tool: &str, args: Value) -> Result<Value>;
    }
}

mock! {
    pub Notifications {}

    #[async_trait]
    impl Notifier for Notifications {
        async fn send(&self, event: &NotificationEvent) -> Result<()>;
    }
}

type Events = Arc<Mutex<Vec<NotificationEvent>>>;

fn recording_notifier() -> (MockNotifications, Events) {
    let events: Events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let mut notifier = MockNotifications::new();
    notifier.expect_send().returning(move |event| {
        sink.lock().unwrap().push(event.clone());
        Ok(())
    });
    (notifier, events)
}

fn config(max_attempts: u32, strict: bool) -> RemediationConfig {
    RemediationConfig {
        retry: RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
        tool_timeout: Some(Duration::from_secs(1)),
        require_explicit_success: strict,
    }
}

fn engine(tools: MockTools, notifier: MockNotifications, config: RemediationConfig) -> RemediationEngine {
    let breakers = Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig {
        failure_threshold: 3,
        cooldown: Duration::from_secs(60),
    }));
    RemediationEngine::new(Arc::new(tools), Arc::new(notifier), breakers, config)
}

fn incident(severity: Severity) -> Incident {
    Incident::from_alert(
        Alert {
            title: "Checkout errors".to_string(),
            description: "5xx spike after deploy".to_string(),
            severity,
            source: "datadog".to_string(),
            affected_services: vec!["checkout-api".to_string()],
        },
        Utc::now(),
    )
}

fn safe(action_type: &str, description: &str) -> RecommendedAction {
    RecommendedAction::new(
        action_type,
        description,
        "checkout-api",
        ActionRiskLevel::AutonomousSafe,
    )
}

#[tokio::test]
async fn test_actions_execute_in_order_and_count_restarts() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let seen = calls.clone();
    let mut tools = MockTools::new();
    tools
        .expect_execute_tool()
        .times(2)
        .returning(move |service, tool, _args| {
            seen.lock().unwrap().push(format!("{}/{}", service, tool));
            Ok(json!({ "success": true }))
        });
    let (notifier, events) = recording_notifier();
    let engine = engine(tools, notifier, config(3, false));

    let mut inc = incident(Severity::P2);
    let actions = vec![
        safe("restart_service", "Restart checkout-api"),
        safe("clear_cache", "Flush checkout-api cache"),
    ];
    let result = engine.execute(&actions, &mut inc).await;

    assert!(result.success());
    assert_eq!(result.executed.len(), 2);
    assert_eq!(
        *calls.lock().unwrap(),
        vec!["kubernetes/restart_deployment", "cache/clear_cache"]
    );
    assert_eq!(inc.restart_attempts(), 1);
    assert_eq!(inc.failed_attempts(), 0);
    assert_eq!(events.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_invalid_action_fails_without_stopping_the_pass() {
    let mut tools = MockTools::new();
    tools
        .expect_execute_tool()
        .times(1)
        .returning(|_, _, _| Ok(json!({ "status": "ok" })));
    let (notifier, _) = recording_notifier();
    let engine = engine(tools, notifier, config(3, false));

    let mut inc = incident(Severity::P2);
    let mut invalid = safe("restart_service", "Restart something");
    invalid.target = String::new();
    let actions = vec![invalid, safe("clear_cache", "Flush checkout-api cache")];

    let result = engine.execute(&actions, &mut inc).await;

    assert_eq!(result.failed.len(), 1);
    assert!(result.failed[0].reason.contains("target"));
    assert_eq!(result.executed.len(), 1);
    assert!(!result.success());
}

#[tokio::test]
async fn test_risky_action_is_deferred_with_notification() {
    let mut tools = MockTools::new();
    tools.expect_execute_tool().never();
    let (notifier, events) = recording_notifier();
    let engine = engine(tools, notifier, config(3, false));

    let mut inc = incident(Severity::P2);
    let actions = vec![safe("delete_stale_sessions", "Delete stale sessions")];
    let result = engine.execute(&actions, &mut inc).await;

    assert_eq!(result.pending_approval.len(), 1);
    assert_eq!(
        result.pending_approval[0].action.risk_level,
        ActionRiskLevel::RequiresApproval
    );
    assert!(result.success());

    let events = events.lock().unwrap();
    assert!(matches!(
        &events[0],
        NotificationEvent::ApprovalRequested { action_type, .. } if action_type == "delete_stale_sessions"
    ));
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();
    let mut tools = MockTools::new();
    tools.expect_execute_tool().returning(move |_, _, _| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(Error::timeout("tool timed out"))
        } else {
            Ok(json!({ "success": true }))
        }
    });
    let (notifier, _) = recording_notifier();
    let engine = engine(tools, notifier, config(3, false));

    let mut inc = incident(Severity::P2);
    let result = engine
        .execute(&[safe("clear_cache", "Flush checkout-api cache")], &mut inc)
        .await;

    assert_eq!(result.executed.len(), 1);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_open_circuit_stops_retries() {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();
    let mut tools = MockTools::new();
    tools.expect_execute_tool().returning(move |_, _, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        Err(Error::external("cache cluster refused connection"))
    });
    let (notifier, _) = recording_notifier();
    let engine = engine(tools, notifier, config(5, false));

    let mut inc = incident(Severity::P2);
    let result = engine
        .execute(&[safe("clear_cache", "Flush checkout-api cache")], &mut inc)
        .await;

    // Third failure opens the breaker; the fourth attempt is short-circuited
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(engine.breakers().state("cache").await, CircuitState::Open);
    assert_eq!(result.failed.len(), 1);
    assert!(result.failed[0].rollback.is_empty());
    assert_eq!(inc.failed_attempts(), 1);
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let mut tools = MockTools::new();
    tools
        .expect_execute_tool()
        .times(1)
        .returning(|service, tool, _| Err(Error::not_found(format!("no tool {}/{}", service, tool))));
    let (notifier, _) = recording_notifier();
    let engine = engine(tools, notifier, config(3, false));

    let mut inc = incident(Severity::P2);
    let result = engine
        .execute(&[safe("restart_service", "Restart checkout-api")], &mut inc)
        .await;

    assert_eq!(result.failed.len(), 1);
    assert_eq!(inc.restart_attempts(), 0);
    assert_eq!(inc.failed_attempts(), 1);
    assert_eq!(engine.breakers().state("kubernetes").await, CircuitState::Closed);
}

#[tokio::test]
async fn test_verification_failure_rolls_back_scaling() {
    let calls = Arc::new(Mutex::new(Vec::<Value>::new()));
    let seen = calls.clone();
    let mut tools = MockTools::new();
    tools
        .expect_execute_tool()
        .times(2)
        .returning(move |_, tool, args| {
            assert_eq!(tool, "scale_deployment");
            let mut seen = seen.lock().unwrap();
            seen.push(args);
            if seen.len() == 1 {
                Ok(json!({ "status": "failed", "previous_replicas": 3 }))
            } else {
                Ok(json!({ "success": true }))
            }
        });
    let (notifier, events) = recording_notifier();
    let engine = engine(tools, notifier, config(3, false));

    let mut inc = incident(Severity::P2);
    let result = engine
        .execute(&[safe("scale_up", "Scale checkout-api to 6 replicas")], &mut inc)
        .await;

    assert_eq!(result.failed.len(), 1);
    let rollback = &result.failed[0].rollback;
    assert_eq!(rollback.len(), 1);
    assert!(rollback[0].succeeded);

    let calls = calls.lock().unwrap();
    assert_eq!(calls[0]["replicas"], 6);
    assert_eq!(calls[1]["replicas"], 3);
    assert_eq!(inc.failed_attempts(), 1);

    let events = events.lock().unwrap();
    assert!(matches!(
        &events[0],
        NotificationEvent::ActionExecuted { success: false, .. }
    ));
}

#[tokio::test]
async fn test_strict_mode_requires_explicit_success() {
    let mut tools = MockTools::new();
    tools
        .expect_execute_tool()
        .times(2)
        .returning(|_, _, _| Ok(json!({ "message": "cache flushed" })));
    let (notifier, _) = recording_notifier();
    let engine = engine(tools, notifier, config(3, true));

    let mut inc = incident(Severity::P2);
    let actions = vec![
        safe("clear_cache", "Flush checkout-api cache"),
        safe("clear_cache", "Flush checkout-api cache again"),
    ];
    let result = engine.execute(&actions, &mut inc).await;

    assert_eq!(result.failed.len(), 2);
    assert!(result.failed[0].reason.contains("explicit success"));
    assert_eq!(inc.failed_attempts(), 2);
}

#[tokio::test]
async fn test_lenient_mode_accepts_outcome_without_failure_indicator() {
    let mut tools = MockTools::new();
    tools
        .expect_execute_tool()
        .returning(|_, _, _| Ok(json!({ "message": "cache flushed" })));
    let (notifier, _) = recording_notifier();
    let engine = engine(tools, notifier, config(3, false));

    let mut inc = incident(Severity::P2);
    let result = engine
        .execute(&[safe("clear_cache", "Flush checkout-api cache")], &mut inc)
        .await;

    assert!(result.success());
}

#[tokio::test]
async fn test_restart_ceiling_defers_fourth_restart() {
    let mut tools = MockTools::new();
    tools.expect_execute_tool().never();
    let (notifier, _) = recording_notifier();
    let engine = engine(tools, notifier, config(3, false));

    let mut inc = incident(Severity::P1);
    for _ in 0..3 {
        inc.record_restart();
    }
    let result = engine
        .execute(&[safe("restart_service", "Restart checkout-api")], &mut inc)
        .await;

    assert_eq!(result.pending_approval.len(), 1);
    assert!(result.pending_approval[0]
        .assessment
        .risk_factors
        .iter()
        .any(|f| f.contains("restart ceiling")));
}
