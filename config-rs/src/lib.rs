//! config-rs/lib.rs
//! Shared configuration for the incident response engine
//! Every setting is read from the environment (a `.env` file is honored) and
//! falls back to a documented default when missing or unparseable.

use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PRIMARY_MODEL: &str = "@cf/meta/llama-3.1-70b-instruct";
pub const DEFAULT_FALLBACK_MODEL: &str = "@cf/meta/llama-3.1-8b-instruct";
pub const DEFAULT_LLM_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Engine configuration with typed, defaulted fields
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    // Model invocation
    pub primary_model: String,
    pub fallback_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub model_timeout: Duration,

    // Retry and circuit breaker
    pub retry_max_attempts: u32,
    pub retry_base_delay: Duration,
    pub breaker_failure_threshold: u32,
    pub breaker_cooldown: Duration,

    // Collaborator calls
    pub tool_timeout: Duration,
    pub gather_timeout: Duration,
    pub require_explicit_success: bool,
    pub history_limit: usize,

    // Logging
    pub log_level: String,
    pub log_json: bool,

    // HTTP model backend
    pub llm_api_url: String,
    pub llm_api_key: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            primary_model: DEFAULT_PRIMARY_MODEL.to_string(),
            fallback_model: DEFAULT_FALLBACK_MODEL.to_string(),
            max_tokens: 2048,
            temperature: 0.1,
            model_timeout: Duration::from_millis(60_000),

            retry_max_attempts: 3,
            retry_base_delay: Duration::from_millis(1000),
            breaker_failure_threshold: 3,
            breaker_cooldown: Duration::from_secs(60),

            tool_timeout: Duration::from_millis(30_000),
            gather_timeout: Duration::from_millis(15_000),
            require_explicit_success: false,
            history_limit: 5,

            log_level: "info".to_string(),
            log_json: true,

            llm_api_url: DEFAULT_LLM_API_URL.to_string(),
            llm_api_key: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from the process environment, after `.env`
    pub fn from_env() -> Self {
        if let Err(e) = dotenv::dotenv() {
            log::debug!("No .env file loaded: {}", e);
        }
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Self {
            primary_model: get("INCIDENT_PRIMARY_MODEL").unwrap_or(defaults.primary_model),
            fallback_model: get("INCIDENT_FALLBACK_MODEL").unwrap_or(defaults.fallback_model),
            max_tokens: parse_or(&get, "INCIDENT_MODEL_MAX_TOKENS", defaults.max_tokens),
            temperature: parse_or(&get, "INCIDENT_MODEL_TEMPERATURE", defaults.temperature),
            model_timeout: millis_or(&get, "INCIDENT_MODEL_TIMEOUT_MS", defaults.model_timeout),

            retry_max_attempts: parse_or(
                &get,
                "INCIDENT_RETRY_MAX_ATTEMPTS",
                defaults.retry_max_attempts,
            ),
            retry_base_delay: millis_or(
                &get,
                "INCIDENT_RETRY_BASE_DELAY_MS",
                defaults.retry_base_delay,
            ),
            breaker_failure_threshold: parse_or(
                &get,
                "INCIDENT_BREAKER_FAILURE_THRESHOLD",
                defaults.breaker_failure_threshold,
            ),
            breaker_cooldown: Duration::from_secs(parse_or(
                &get,
                "INCIDENT_BREAKER_COOLDOWN_SECS",
                defaults.breaker_cooldown.as_secs(),
            )),

            tool_timeout: millis_or(&get, "INCIDENT_TOOL_TIMEOUT_MS", defaults.tool_timeout),
            gather_timeout: millis_or(&get, "INCIDENT_GATHER_TIMEOUT_MS", defaults.gather_timeout),
            require_explicit_success: parse_or(
                &get,
                "INCIDENT_REQUIRE_EXPLICIT_SUCCESS",
                defaults.require_explicit_success,
            ),
            history_limit: parse_or(&get, "INCIDENT_HISTORY_LIMIT", defaults.history_limit),

            log_level: get("INCIDENT_LOG_LEVEL").unwrap_or(defaults.log_level),
            log_json: parse_or(&get, "INCIDENT_LOG_JSON", defaults.log_json),

            llm_api_url: get("LLM_API_URL").unwrap_or(defaults.llm_api_url),
            llm_api_key: get("LLM_API_KEY"),
        }
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), String> {
        if self.retry_max_attempts == 0 {
            return Err("INCIDENT_RETRY_MAX_ATTEMPTS must be at least 1".to_string());
        }
        if self.breaker_failure_threshold == 0 {
            return Err("INCIDENT_BREAKER_FAILURE_THRESHOLD must be at least 1".to_string());
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(format!(
                "INCIDENT_MODEL_TEMPERATURE {} is outside [0, 2]",
                self.temperature
            ));
        }
        if self.max_tokens == 0 {
            return Err("INCIDENT_MODEL_MAX_TOKENS must be at least 1".to_string());
        }
        if self.primary_model.trim().is_empty() || self.fallback_model.trim().is_empty() {
            return Err("model identifiers must not be empty".to_string());
        }
        Ok(())
    }
}

// Parse a variable, warning and falling back to the default on bad input
fn parse_or<T, G>(get: &G, name: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(raw) => raw.trim().parse::<T>().unwrap_or_else(|_| {
            log::warn!("Invalid value '{}' in {}, using default {}", raw, name, default);
            default
        }),
        None => default,
    }
}

fn millis_or<G>(get: &G, name: &str, default: Duration) -> Duration
where
    G: Fn(&str) -> Option<String>,
{
    Duration::from_millis(parse_or(get, name, default.as_millis() as u64))
}
