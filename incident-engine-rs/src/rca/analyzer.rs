use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tracing::{info, instrument, warn};

use error_handling_rs::{
    with_fallback, with_timeout, CircuitBreakerRegistry, Error, ErrorKind, FallbackResult, Result,
    RetryConfig, RetryPolicy,
};

use crate::collaborators::{ChatMessage, ModelClient, ModelRequest};
use crate::data::GatheredData;
use crate::models::Incident;

use super::parser::RcaProtocolCodec;
use super::prompt::{render_prompt, SYSTEM_PROMPT};
use super::RcaResult;

/// Model invocation settings
#[derive(Debug, Clone)]
pub struct RcaAnalyzerConfig {
    pub primary_model: String,
    pub fallback_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub model_timeout: Option<Duration>,
    pub retry: RetryConfig,
}

impl Default for RcaAnalyzerConfig {
    fn default() -> Self {
        Self {
            primary_model: config_rs::DEFAULT_PRIMARY_MODEL.to_string(),
            fallback_model: config_rs::DEFAULT_FALLBACK_MODEL.to_string(),
            max_tokens: 2048,
            temperature: 0.1,
            model_timeout: Some(Duration::from_secs(60)),
            retry: RetryConfig::default(),
        }
    }
}

impl From<&config_rs::EngineConfig> for RcaAnalyzerConfig {
    fn from(config: &config_rs::EngineConfig) -> Self {
        Self {
            primary_model: config.primary_model.clone(),
            fallback_model: config.fallback_model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            model_timeout: Some(config.model_timeout),
            retry: RetryConfig {
                max_attempts: config.retry_max_attempts,
                base_delay: config.retry_base_delay,
                ..RetryConfig::default()
            },
        }
    }
}

/// Produces root-cause analyses through the model backend
///
/// Each model retries only `CapacityExceeded`; any remaining failure of the
/// primary model hands over to the fallback model once. A reply that fails
/// to parse is not retried against the other model.
pub struct RcaAnalyzer {
    model: Arc<dyn ModelClient>,
    breakers: Arc<CircuitBreakerRegistry>,
    config: RcaAnalyzerConfig,
    retry: RetryPolicy,
}

impl RcaAnalyzer {
    pub fn new(
        model: Arc<dyn ModelClient>,
        breakers: Arc<CircuitBreakerRegistry>,
        config: RcaAnalyzerConfig,
    ) -> Self {
        let retry = RetryPolicy::new("model_call", config.retry.clone())
            .retry_if(|err| err.is_kind(ErrorKind::CapacityExceeded));
        Self {
            model,
            breakers,
            config,
            retry,
        }
    }

    async fn invoke(&self, model_id: &str, request: &ModelRequest) -> Result<String> {
        let dependency = format!("model:{}", model_id);
        self.retry
            .retry(&dependency, |attempt| {
                let dependency = dependency.clone();
                async move {
                    counter!("model_calls_total", 1, "model" => model_id.to_string());
                    self.breakers
                        .call(
                            &dependency,
                            with_timeout(
                                self.config.model_timeout,
                                &dependency,
                                self.model.run(model_id, request),
                            ),
                        )
                        .await
                        .map_err(|e| e.context("attempt", attempt))
                }
            })
            .await
    }

    /// Returns the raw reply and which model produced it
    async fn complete(&self, request: &ModelRequest) -> Result<(String, String)> {
        let primary = &self.config.primary_model;
        let fallback = &self.config.fallback_model;

        let outcome = with_fallback(
            "rca_model",
            self.invoke(primary, request),
            self.invoke(fallback, request),
        )
        .await;

        match outcome {
            FallbackResult::Primary(reply) => Ok((reply, primary.clone())),
            FallbackResult::Fallback(reply) => {
                warn!(model = %fallback, "Analysis produced by fallback model");
                Ok((reply, fallback.clone()))
            }
            FallbackResult::Failure(errors) => {
                let summary = errors
                    .iter()
                    .map(|e| e.message.as_str())
                    .collect::<Vec<_>>()
                    .join("; ");
                Err(Error::processing(format!("all models failed: {}", summary))
                    .service("rca")
                    .context("models", vec![primary.clone(), fallback.clone()]))
            }
        }
    }

    /// Runs one analysis pass: prompt, model call, parse, data-quality adjustment
    #[instrument(skip_all, fields(incident_id = %incident.id))]
    pub async fn analyze(
        &self,
        incident: &Incident,
        data: &GatheredData,
        historical_context: &[String],
    ) -> Result<RcaResult> {
        let request = ModelRequest {
            messages: vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(render_prompt(incident, data, historical_context)),
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let (reply, model) = self.complete(&request).await?;
        let quality = data.quality();

        let rca = RcaProtocolCodec::parse(incident, &reply)?.with_data_quality(&quality);

        info!(
            model = %model,
            confidence = rca.confidence_score(),
            evidence = rca.evidence().len(),
            actions = rca.recommended_actions().len(),
            data_issues = quality.error_count(),
            "Root-cause analysis complete"
        );

        Ok(rca)
    }
}
