//! # Error Handling Framework
//!
//! Shared error taxonomy and resilience primitives used by the incident
//! response engine.
//!
//! ## Features
//!
//! - A single structured error type whose `ErrorKind` separates caller
//!   mistakes (validation), business-rule failures (processing), missing
//!   records and transient infrastructure conditions
//! - Retry with exponential backoff (`base × 2^(attempt-1)`) and a
//!   pluggable retry predicate
//! - A circuit-breaker registry keyed by dependency name with serialized
//!   per-key access
//! - A primary/fallback combinator
//! - Structured logging bootstrap on top of `tracing-subscriber`

pub mod types;
pub mod logging;
pub mod retry;
pub mod circuit_breaker;
pub mod fallback;

// Re-export commonly used types
pub use types::{Error, ErrorKind, Result};
pub use logging::{init_logging, LoggingConfig};
pub use retry::{with_timeout, RetryConfig, RetryPolicy};
pub use circuit_breaker::{
    CircuitBreakerConfig, CircuitBreakerRegistry, CircuitBreakerState, CircuitState,
};
pub use fallback::{with_fallback, FallbackResult};
