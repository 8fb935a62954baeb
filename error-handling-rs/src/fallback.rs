//! # Fallback Strategies
//!
//! Graceful degradation when a primary operation fails: run an alternative
//! and report which of the two produced the value.

use std::future::Future;

use metrics::counter;
use tracing::{debug, warn};

use crate::types::{Error, ErrorKind, Result};

/// Result of a fallback operation
#[derive(Debug, Clone)]
pub enum FallbackResult<T> {
    /// The primary operation succeeded
    Primary(T),
    /// The primary operation failed but the fallback succeeded
    Fallback(T),
    /// Both primary and fallback operations failed
    Failure(Vec<Error>),
}

impl<T> FallbackResult<T> {
    /// Converts to a standard Result
    ///
    /// A failure yields the last error with earlier messages attached as
    /// `previous_error_{i}` context entries.
    pub fn into_result(self) -> Result<T> {
        match self {
            FallbackResult::Primary(value) | FallbackResult::Fallback(value) => Ok(value),
            FallbackResult::Failure(mut errors) => match errors.pop() {
                Some(mut last) => {
                    for (i, err) in errors.iter().enumerate() {
                        last = last.context(format!("previous_error_{}", i), err.message.clone());
                    }
                    Err(last)
                }
                None => Err(Error::new(
                    ErrorKind::Internal,
                    "Fallback failed with no specific errors",
                )),
            },
        }
    }

    /// Returns true if the result used a fallback
    pub fn is_fallback(&self) -> bool {
        matches!(self, FallbackResult::Fallback(_))
    }

    /// Returns true if the result is from the primary operation
    pub fn is_primary(&self) -> bool {
        matches!(self, FallbackResult::Primary(_))
    }

    /// Returns true if all operations failed
    pub fn is_failure(&self) -> bool {
        matches!(self, FallbackResult::Failure(_))
    }
}

/// Runs `primary`, and `fallback` only if the primary fails
///
/// The fallback future is not polled when the primary succeeds.
pub async fn with_fallback<T, P, F>(label: &str, primary: P, fallback: F) -> FallbackResult<T>
where
    P: Future<Output = Result<T>>,
    F: Future<Output = Result<T>>,
{
    let primary_err = match primary.await {
        Ok(value) => return FallbackResult::Primary(value),
        Err(err) => err,
    };

    warn!(
        operation = %label,
        error = %primary_err,
        "Primary operation failed, trying fallback"
    );
    counter!("fallback_invocations_total", 1, "operation" => label.to_string());

    match fallback.await {
        Ok(value) => {
            debug!(operation = %label, "Fallback succeeded");
            FallbackResult::Fallback(value)
        }
        Err(fallback_err) => {
            counter!("fallback_failures_total", 1, "operation" => label.to_string());
            FallbackResult::Failure(vec![primary_err, fallback_err])
        }
    }
}
