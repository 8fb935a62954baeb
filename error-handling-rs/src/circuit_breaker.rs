//! # Circuit Breaker Registry
//!
//! One breaker per external dependency name. A breaker opens after
//! `failure_threshold` consecutive failures and rejects every call without
//! touching the dependency until `cooldown` has elapsed; the first call after
//! the cooldown closes the breaker again and is let through. Any success
//! resets the failure counter.
//!
//! The registry is shared by all incidents processed concurrently. Each
//! dependency's state sits behind its own async mutex, so concurrent failures
//! against the same dependency never lose updates, while unrelated
//! dependencies never contend.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::types::{Error, Result};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation, requests allowed
    Closed,
    /// Failing, requests rejected
    Open,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
        }
    }
}

/// Configuration shared by every breaker in a registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// Time the circuit stays open before a call is let through again
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(60),
        }
    }
}

/// Breaker bookkeeping for one dependency
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CircuitBreakerState {
    pub failures: u32,
    pub last_failure_time: Option<Instant>,
    pub is_open: bool,
}

impl CircuitBreakerState {
    pub fn state(&self) -> CircuitState {
        if self.is_open {
            CircuitState::Open
        } else {
            CircuitState::Closed
        }
    }

    fn cooldown_elapsed(&self, cooldown: Duration) -> bool {
        self.last_failure_time
            .map_or(true, |at| at.elapsed() >= cooldown)
    }
}

/// Registry of circuit breakers keyed by dependency name
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    circuits: RwLock<HashMap<String, Arc<Mutex<CircuitBreakerState>>>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            circuits: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    async fn circuit(&self, dependency: &str) -> Arc<Mutex<CircuitBreakerState>> {
        if let Some(circuit) = self.circuits.read().await.get(dependency) {
            return Arc::clone(circuit);
        }

        let mut circuits = self.circuits.write().await;
        Arc::clone(
            circuits
                .entry(dependency.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(CircuitBreakerState::default()))),
        )
    }

    /// Checks whether a call to `dependency` may proceed
    ///
    /// An open breaker whose cooldown has elapsed is closed here, so the
    /// caller's call is the one let through.
    pub async fn check(&self, dependency: &str) -> Result<()> {
        let circuit = self.circuit(dependency).await;
        let mut state = circuit.lock().await;

        if !state.is_open {
            return Ok(());
        }

        if state.cooldown_elapsed(self.config.cooldown) {
            state.is_open = false;
            state.failures = 0;
            info!(dependency = %dependency, "Circuit CLOSED: cooldown elapsed, allowing call");
            return Ok(());
        }

        counter!("circuit_breaker_rejections_total", 1, "dependency" => dependency.to_string());
        debug!(dependency = %dependency, "Circuit open, call rejected");
        Err(Error::circuit_open(dependency))
    }

    /// Records a successful call, resetting the failure counter
    pub async fn record_success(&self, dependency: &str) {
        let circuit = self.circuit(dependency).await;
        let mut state = circuit.lock().await;
        state.failures = 0;
        state.is_open = false;
    }

    /// Records a failed call, opening the circuit at the threshold
    pub async fn record_failure(&self, dependency: &str) {
        let circuit = self.circuit(dependency).await;
        let mut state = circuit.lock().await;

        state.failures = state.failures.saturating_add(1);
        state.last_failure_time = Some(Instant::now());

        if !state.is_open && state.failures >= self.config.failure_threshold {
            state.is_open = true;
            counter!("circuit_breaker_opened_total", 1, "dependency" => dependency.to_string());
            warn!(
                dependency = %dependency,
                failures = state.failures,
                cooldown_secs = self.config.cooldown.as_secs(),
                "Circuit OPEN: failure threshold reached"
            );
        }
    }

    /// Executes `operation` with circuit breaker protection
    ///
    /// Rejected calls never poll `operation`. Caller errors (validation,
    /// not found) pass through without counting against the dependency.
    pub async fn call<T, Fut>(&self, dependency: &str, operation: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        self.check(dependency).await?;

        match operation.await {
            Ok(value) => {
                self.record_success(dependency).await;
                Ok(value)
            }
            Err(err) => {
                if !err.is_caller_error() {
                    self.record_failure(dependency).await;
                }
                Err(err)
            }
        }
    }

    /// Gets a copy of the breaker bookkeeping for a dependency
    pub async fn snapshot(&self, dependency: &str) -> CircuitBreakerState {
        match self.circuits.read().await.get(dependency) {
            Some(circuit) => circuit.lock().await.clone(),
            None => CircuitBreakerState::default(),
        }
    }

    pub async fn state(&self, dependency: &str) -> CircuitState {
        self.snapshot(dependency).await.state()
    }

    /// Resets a circuit to closed state
    pub async fn reset(&self, dependency: &str) {
        if let Some(circuit) = self.circuits.read().await.get(dependency) {
            *circuit.lock().await = CircuitBreakerState::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn registry(cooldown: Duration) -> CircuitBreakerRegistry {
        CircuitBreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: 3,
            cooldown,
        })
    }

    async fn fail(registry: &CircuitBreakerRegistry, dependency: &str) {
        let result: Result<()> = registry
            .call(dependency, async { Err(Error::external("boom")) })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_opens_after_three_failures_and_fails_fast() {
        let registry = registry(Duration::from_secs(60));
        for _ in 0..3 {
            fail(&registry, "kubernetes").await;
        }
        assert_eq!(registry.state("kubernetes").await, CircuitState::Open);

        let invoked = Arc::new(AtomicU32::new(0));
        let calls = Arc::clone(&invoked);
        let result: Result<()> = registry
            .call("kubernetes", async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unavailable);
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cooldown_lets_one_call_through_and_success_resets() {
        let registry = registry(Duration::from_millis(30));
        for _ in 0..3 {
            fail(&registry, "database").await;
        }
        assert!(registry.check("database").await.is_err());

        tokio::time::sleep(Duration::from_millis(50)).await;

        let result = registry.call("database", async { Ok::<_, Error>("up") }).await;
        assert_eq!(result.unwrap(), "up");

        let snapshot = registry.snapshot("database").await;
        assert_eq!(snapshot.failures, 0);
        assert!(!snapshot.is_open);
    }

    #[tokio::test]
    async fn test_success_resets_consecutive_failures() {
        let registry = registry(Duration::from_secs(60));
        fail(&registry, "cache").await;
        fail(&registry, "cache").await;
        registry.call("cache", async { Ok::<_, Error>(()) }).await.unwrap();
        fail(&registry, "cache").await;

        let snapshot = registry.snapshot("cache").await;
        assert_eq!(snapshot.failures, 1);
        assert_eq!(snapshot.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_dependencies_are_isolated() {
        let registry = registry(Duration::from_secs(60));
        for _ in 0..3 {
            fail(&registry, "dns").await;
        }
        assert_eq!(registry.state("dns").await, CircuitState::Open);
        assert_eq!(registry.state("kubernetes").await, CircuitState::Closed);
        assert!(registry.check("kubernetes").await.is_ok());
    }

    #[tokio::test]
    async fn test_caller_errors_do_not_trip_breaker() {
        let registry = registry(Duration::from_secs(60));
        for _ in 0..5 {
            let _: Result<()> = registry
                .call("runbook", async { Err(Error::not_found("no such tool")) })
                .await;
        }
        assert_eq!(registry.snapshot("runbook").await.failures, 0);
    }

    #[tokio::test]
    async fn test_concurrent_failures_are_all_counted() {
        let registry = Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: 100,
            cooldown: Duration::from_secs(60),
        }));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry.record_failure("shared").await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(registry.snapshot("shared").await.failures, 20);
    }

    #[tokio::test]
    async fn test_reset_closes_circuit() {
        let registry = registry(Duration::from_secs(60));
        for _ in 0..3 {
            fail(&registry, "network").await;
        }
        registry.reset("network").await;
        assert_eq!(registry.snapshot("network").await, CircuitBreakerState::default());
    }
}
