//! Resilient model decorator: retry, circuit breaking, and failover
//! layered around a primary [`Model`] and an ordered list of alternatives.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::ModelError;
use crate::event::{EventBus, EventKind};
use crate::message::ChatMessage;
use crate::model::{GenerateOptions, Model, ModelResponse};

use super::circuit::CircuitBreaker;
use super::classify::ErrorCategory;
use super::retry::RetryPolicy;

/// Wraps a primary model with retry, per-model circuit breaking, and
/// one-shot failover across alternatives.
///
/// Authentication errors are never retried and never fail over. Rate
/// limits suspend the caller for at least the server-suggested interval
/// without blocking unrelated work (the wait is an async sleep).
pub struct ResilientModel {
    primary: Arc<dyn Model>,
    fallbacks: Vec<Arc<dyn Model>>,
    retry: RetryPolicy,
    breakers: HashMap<String, CircuitBreaker>,
    bus: Arc<EventBus>,
}

impl ResilientModel {
    /// Wrap a primary model.
    #[must_use]
    pub fn new(primary: Arc<dyn Model>, bus: Arc<EventBus>) -> Self {
        let mut breakers = HashMap::new();
        breakers.insert(primary.model_id().to_owned(), CircuitBreaker::default());
        Self {
            primary,
            fallbacks: Vec::new(),
            retry: RetryPolicy::default(),
            breakers,
            bus,
        }
    }

    /// Add ordered fallback models, each tried once after the primary
    /// exhausts its retries on a non-auth error.
    #[must_use]
    pub fn with_fallbacks(mut self, fallbacks: Vec<Arc<dyn Model>>) -> Self {
        for fb in &fallbacks {
            self.breakers
                .entry(fb.model_id().to_owned())
                .or_default();
        }
        self.fallbacks = fallbacks;
        self
    }

    /// Use a custom retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Use custom circuit breaker settings for every wrapped model.
    #[must_use]
    pub fn with_breaker(mut self, failure_threshold: u32, cooldown: Duration) -> Self {
        for breaker in self.breakers.values_mut() {
            *breaker = CircuitBreaker::new(failure_threshold, cooldown);
        }
        self
    }

    /// Run one model through the retry loop.
    async fn try_model(
        &self,
        model: &dyn Model,
        messages: &[ChatMessage],
        options: &GenerateOptions,
        max_attempts: u32,
    ) -> Result<ModelResponse, ModelError> {
        let model_id = model.model_id().to_owned();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            if let Some(breaker) = self.breakers.get(&model_id)
                && !breaker.try_acquire()
            {
                return Err(ModelError::new(&model_id, "service unavailable: circuit open"));
            }

            let call = model.generate(messages.to_vec(), options.clone());
            let outcome = match options.timeout_secs {
                Some(secs) => match tokio::time::timeout(Duration::from_secs_f64(secs), call).await
                {
                    Ok(result) => result,
                    Err(_) => Err(ModelError::new(
                        &model_id,
                        format!("request timed out after {secs}s"),
                    )),
                },
                None => call.await,
            };

            match outcome {
                Ok(response) => {
                    if let Some(breaker) = self.breakers.get(&model_id) {
                        breaker.record_success();
                    }
                    if attempt > 1 {
                        self.bus.emit(EventKind::RecoveryCompleted {
                            model_id: model_id.clone(),
                            attempts_before_recovery: attempt - 1,
                        });
                    }
                    return Ok(response);
                }
                Err(err) => {
                    if let Some(breaker) = self.breakers.get(&model_id) {
                        breaker.record_failure();
                    }
                    let category = ErrorCategory::classify(&err);
                    debug!(model = %model_id, attempt, ?category, error = %err, "Model call failed");

                    match category {
                        ErrorCategory::Authentication => return Err(err),
                        ErrorCategory::RateLimit if attempt < max_attempts => {
                            let wait = err
                                .retry_after_secs
                                .unwrap_or_else(|| self.retry.backoff_interval(attempt).as_secs_f64());
                            self.bus.emit(EventKind::RateLimitHit {
                                tool_name: model_id.clone(),
                                retry_after_secs: wait,
                                original_request: "model.generate".to_owned(),
                            });
                            tokio::time::sleep(Duration::from_secs_f64(wait.max(0.0))).await;
                        }
                        category if category.is_transient() && attempt < max_attempts => {
                            let interval = self.retry.backoff_interval(attempt);
                            self.bus.emit(EventKind::RetryRequested {
                                model_id: model_id.clone(),
                                attempt,
                                max_attempts,
                                suggested_interval_secs: interval.as_secs_f64(),
                            });
                            tokio::time::sleep(interval).await;
                        }
                        _ => return Err(err),
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Model for ResilientModel {
    fn model_id(&self) -> &str {
        self.primary.model_id()
    }

    async fn generate(
        &self,
        messages: Vec<ChatMessage>,
        options: GenerateOptions,
    ) -> Result<ModelResponse, ModelError> {
        let primary_result = self
            .try_model(&*self.primary, &messages, &options, self.retry.max_attempts)
            .await;

        let mut last_err = match primary_result {
            Ok(response) => return Ok(response),
            Err(err) => err,
        };

        if ErrorCategory::classify(&last_err) == ErrorCategory::Authentication {
            return Err(last_err);
        }

        for (i, fallback) in self.fallbacks.iter().enumerate() {
            warn!(
                from = %last_err.model_id,
                to = %fallback.model_id(),
                "Failing over to alternative model",
            );
            self.bus.emit(EventKind::FailoverOccurred {
                from_model_id: last_err.model_id.clone(),
                to_model_id: fallback.model_id().to_owned(),
                attempt: u32::try_from(i + 1).unwrap_or(u32::MAX),
            });

            // Each alternative gets a single attempt.
            match self.try_model(&**fallback, &messages, &options, 1).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    if ErrorCategory::classify(&err) == ErrorCategory::Authentication {
                        return Err(err);
                    }
                    last_err = err;
                }
            }
        }

        Err(last_err)
    }

    fn supports_tool_calling(&self) -> bool {
        self.primary.supports_tool_calling()
    }
}

impl std::fmt::Debug for ResilientModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientModel")
            .field("primary", &self.primary.model_id())
            .field(
                "fallbacks",
                &self.fallbacks.iter().map(|m| m.model_id()).collect::<Vec<_>>(),
            )
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
