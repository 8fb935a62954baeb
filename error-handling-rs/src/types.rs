//! # Standardized Error Types
//!
//! One structured error type is shared by every crate in the workspace.
//! The `ErrorKind` decides how callers react: validation and processing
//! errors surface to the caller, not-found errors come from record lookups,
//! and the infrastructure kinds drive retry and circuit-breaker decisions.

use std::error::Error as StdError;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A type alias for Result with the error type defaulting to our Error
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Categorizes different kinds of errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed input data, invalid transition arguments, invalid action fields
    Validation,
    /// Business-rule violation, parse failure, all models failed
    Processing,
    /// Missing record or unknown tool/service
    NotFound,
    /// The model backend is temporarily over capacity
    CapacityExceeded,
    /// An outbound call did not finish in time
    Timeout,
    /// An external dependency returned an error
    External,
    /// The dependency is short-circuited
    Unavailable,
    /// Persistence failure
    Storage,
    /// The stored record changed since the writer last read it
    Conflict,
    /// Invalid or missing configuration
    Configuration,
    /// Unexpected internal failure
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "Validation Error"),
            ErrorKind::Processing => write!(f, "Processing Error"),
            ErrorKind::NotFound => write!(f, "Not Found Error"),
            ErrorKind::CapacityExceeded => write!(f, "Capacity Exceeded Error"),
            ErrorKind::Timeout => write!(f, "Timeout Error"),
            ErrorKind::External => write!(f, "External Service Error"),
            ErrorKind::Unavailable => write!(f, "Service Unavailable Error"),
            ErrorKind::Storage => write!(f, "Storage Error"),
            ErrorKind::Conflict => write!(f, "Conflict Error"),
            ErrorKind::Configuration => write!(f, "Configuration Error"),
            ErrorKind::Internal => write!(f, "Internal Error"),
        }
    }
}

/// Core error type for the incident response engine
///
/// `Clone` is implemented manually: clones keep every structured field but
/// drop the opaque `cause`, which is only meaningful at the creation site.
#[derive(Debug, Serialize, Deserialize)]
pub struct Error {
    /// A unique identifier for this error instance
    pub id: Uuid,
    /// The kind of error that occurred
    pub kind: ErrorKind,
    /// Detailed error message
    pub message: String,
    /// The time when the error occurred
    pub timestamp: DateTime<Utc>,
    /// The component or dependency where the error originated
    pub service: Option<String>,
    /// Additional context as key-value pairs
    #[serde(default)]
    pub context: serde_json::Map<String, serde_json::Value>,
    /// Chain of causes (not serialized)
    #[serde(skip)]
    pub cause: Option<Box<dyn StdError + Send + Sync>>,
    /// Flag indicating if this is a transient error that might succeed on retry
    pub transient: bool,
}

impl Clone for Error {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            kind: self.kind,
            message: self.message.clone(),
            timestamp: self.timestamp,
            service: self.service.clone(),
            context: self.context.clone(),
            cause: None,
            transient: self.transient,
        }
    }
}

impl Error {
    /// Creates a new error with the specified kind and message
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            message: message.into(),
            timestamp: Utc::now(),
            service: None,
            context: serde_json::Map::new(),
            cause: None,
            transient: false,
        }
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn processing<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::Processing, message)
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Model backend overload; always transient
    pub fn capacity_exceeded<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::CapacityExceeded, message).transient()
    }

    /// Deadline expiry; always transient
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::Timeout, message).transient()
    }

    pub fn external<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::External, message)
    }

    /// Rejection by an open circuit for `dependency`
    pub fn circuit_open(dependency: &str) -> Self {
        Self::new(
            ErrorKind::Unavailable,
            format!("circuit breaker open for dependency '{}'", dependency),
        )
        .service(dependency)
    }

    pub fn storage<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::Storage, message)
    }

    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Sets the service name
    pub fn service<S: Into<String>>(mut self, service: S) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Adds context information to the error
    pub fn context<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Serialize,
    {
        if let Ok(value) = serde_json::to_value(value) {
            self.context.insert(key.into(), value);
        }
        self
    }

    /// Chains this error with its cause
    pub fn cause<E>(mut self, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Marks this error as transient (can be retried)
    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }

    /// Returns true if this error is transient and might succeed on retry
    pub fn is_transient(&self) -> bool {
        self.transient
    }

    pub fn is_kind(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    /// Caller-side mistakes say nothing about the health of a dependency
    pub fn is_caller_error(&self) -> bool {
        matches!(self.kind, ErrorKind::Validation | ErrorKind::NotFound)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;

        if let Some(service) = &self.service {
            write!(f, " [Service: {}]", service)?;
        }

        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let status = err.status().map(|s| s.as_u16());

        let mut error = if err.is_timeout() {
            Self::timeout(format!("HTTP request timed out: {}", err))
        } else if matches!(status, Some(429) | Some(503) | Some(529)) {
            Self::capacity_exceeded(format!("HTTP backend over capacity: {}", err))
        } else {
            let transient = err.is_connect() || status.map_or(false, |s| s >= 500);
            let error = Self::external(format!("HTTP request error: {}", err));
            if transient {
                error.transient()
            } else {
                error
            }
        };

        if let Some(status) = status {
            error = error.context("status", status);
        }
        error.cause(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::processing(format!("JSON error: {}", err)).cause(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::new(ErrorKind::Validation, "Invalid input format")
            .service("incident-store")
            .context("field", "severity");

        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.message, "Invalid input format");
        assert_eq!(err.service, Some("incident-store".to_string()));
        assert_eq!(err.context.get("field").and_then(|v| v.as_str()), Some("severity"));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = Error::processing("all models failed").service("rca");

        let display = format!("{}", err);
        assert!(display.contains("Processing Error"));
        assert!(display.contains("all models failed"));
        assert!(display.contains("Service: rca"));
    }

    #[test]
    fn test_transient_constructors() {
        assert!(Error::capacity_exceeded("busy").is_transient());
        assert!(Error::timeout("slow").is_transient());
        assert!(!Error::validation("bad").is_transient());
    }

    #[test]
    fn test_circuit_open_names_dependency() {
        let err = Error::circuit_open("kubernetes");
        assert_eq!(err.kind, ErrorKind::Unavailable);
        assert!(err.message.contains("kubernetes"));
        assert!(!err.is_caller_error());
    }

    #[test]
    fn test_clone_drops_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        let err = Error::storage("write failed").cause(io);
        assert!(err.source().is_some());

        let cloned = err.clone();
        assert!(cloned.source().is_none());
        assert_eq!(cloned.id, err.id);
    }
}
