//! Generation client
//!
//! Rate-limited, retrying wrapper around a single external content-generation
//! call. Every call:
//! 1. Acquires one slot of the process-wide concurrency cap (released on return)
//! 2. Waits for the optional request-rate quota before each attempt
//! 3. Retries rate-limit and transient server failures with exponential backoff
//! 4. Parses and validates the payload against the expected [`OutputShape`]
//!
//! A call returns either a structurally valid payload or a classified
//! [`GenerationError`], never a partially-parsed payload.

use crate::services::output_shape::{OutputShape, Shaped};
use crate::utils::{retry_with_backoff, RetryPolicy, Retryable};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use newln_common::config::GenerationSettings;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;

/// Classified generation failure
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerationError {
    /// Provider rejected the request for quota reasons (HTTP 429)
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Transient provider failure (HTTP 5xx)
    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// Request did not complete within the client timeout
    #[error("Request timed out")]
    Timeout,

    /// Non-retryable HTTP status
    #[error("API error {status}: {message}")]
    Status { status: u16, message: String },

    /// Connection or request-building failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Response carried no content
    #[error("No content generated")]
    EmptyResponse,

    /// Response was not JSON or did not match the expected shape
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// All attempts failed with retryable errors
    #[error("Generation failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<GenerationError>,
    },
}

impl Retryable for GenerationError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            GenerationError::RateLimited(_)
                | GenerationError::ServerError { .. }
                | GenerationError::Timeout
        )
    }

    fn exhausted(attempts: u32, last: Self) -> Self {
        GenerationError::RetriesExhausted {
            attempts,
            last: Box::new(last),
        }
    }
}

impl GenerationError {
    /// Classify an HTTP status the way the provider uses them
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            429 => GenerationError::RateLimited(message),
            500 | 502 | 503 | 504 => GenerationError::ServerError { status, message },
            _ => GenerationError::Status { status, message },
        }
    }
}

/// One raw call to an external generation service
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Send `prompt` and return the raw response text
    ///
    /// `shape` is `None` for free-text calls.
    async fn complete(
        &self,
        prompt: &str,
        shape: Option<&OutputShape>,
    ) -> Result<String, GenerationError>;
}

/// Client tuning knobs
#[derive(Debug, Clone)]
pub struct GenerationClientConfig {
    pub max_concurrent_calls: usize,
    pub retry_policy: RetryPolicy,
    pub requests_per_minute: Option<u32>,
}

impl Default for GenerationClientConfig {
    fn default() -> Self {
        Self {
            max_concurrent_calls: 3,
            retry_policy: RetryPolicy::default(),
            requests_per_minute: None,
        }
    }
}

impl GenerationClientConfig {
    pub fn from_settings(settings: &GenerationSettings) -> Self {
        Self {
            max_concurrent_calls: settings.max_concurrent_calls,
            retry_policy: RetryPolicy {
                max_attempts: settings.max_attempts,
                base_delay: Duration::from_millis(settings.backoff_base_ms),
                factor: settings.backoff_factor,
                max_jitter: Duration::from_millis(settings.max_jitter_ms),
            },
            requests_per_minute: settings.requests_per_minute,
        }
    }
}

/// Shared generation client
///
/// Clone the surrounding `Arc`, not the client: the concurrency cap must be
/// one semaphore for the whole process.
pub struct GenerationClient {
    backend: Arc<dyn GenerationBackend>,
    permits: Arc<Semaphore>,
    max_concurrent_calls: usize,
    retry_policy: RetryPolicy,
    rate_limiter: Option<DefaultDirectRateLimiter>,
}

impl GenerationClient {
    pub fn new(backend: Arc<dyn GenerationBackend>, config: GenerationClientConfig) -> Self {
        let max_concurrent_calls = config.max_concurrent_calls.max(1);
        let rate_limiter = config
            .requests_per_minute
            .and_then(NonZeroU32::new)
            .map(|rpm| RateLimiter::direct(Quota::per_minute(rpm)));

        Self {
            backend,
            permits: Arc::new(Semaphore::new(max_concurrent_calls)),
            max_concurrent_calls,
            retry_policy: config.retry_policy,
            rate_limiter,
        }
    }

    /// Configured concurrency cap
    pub fn max_concurrent_calls(&self) -> usize {
        self.max_concurrent_calls
    }

    /// Calls currently holding a concurrency slot
    pub fn in_flight(&self) -> usize {
        self.max_concurrent_calls - self.permits.available_permits()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Generate a JSON payload matching `shape`
    pub async fn generate(&self, prompt: &str, shape: &OutputShape) -> Result<Value, GenerationError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| GenerationError::Transport("Concurrency limiter closed".to_string()))?;

        let backend = &self.backend;
        let rate_limiter = &self.rate_limiter;

        retry_with_backoff("generate", &self.retry_policy, move || async move {
            if let Some(limiter) = rate_limiter {
                limiter.until_ready().await;
            }
            let raw = backend.complete(prompt, Some(shape)).await?;
            parse_payload(&raw, shape)
        })
        .await
    }

    /// Generate and decode a typed payload
    pub async fn generate_as<T>(&self, prompt: &str) -> Result<T, GenerationError>
    where
        T: DeserializeOwned + Shaped,
    {
        let value = self.generate(prompt, &T::output_shape()).await?;
        serde_json::from_value(value).map_err(|e| GenerationError::MalformedPayload(e.to_string()))
    }

    /// Free-text generation sharing the cap and retry policy
    pub async fn generate_text(&self, prompt: &str) -> Result<String, GenerationError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| GenerationError::Transport("Concurrency limiter closed".to_string()))?;

        let backend = &self.backend;
        let rate_limiter = &self.rate_limiter;

        retry_with_backoff("generate_text", &self.retry_policy, move || async move {
            if let Some(limiter) = rate_limiter {
                limiter.until_ready().await;
            }
            let text = backend.complete(prompt, None).await?;
            if text.trim().is_empty() {
                return Err(GenerationError::EmptyResponse);
            }
            Ok(text)
        })
        .await
    }
}

/// Parse raw provider text into a validated JSON value
///
/// Tolerates a surrounding markdown code fence.
pub fn parse_payload(raw: &str, shape: &OutputShape) -> Result<Value, GenerationError> {
    let trimmed = strip_code_fence(raw.trim());
    if trimmed.is_empty() {
        return Err(GenerationError::EmptyResponse);
    }

    let value: Value = serde_json::from_str(trimmed)
        .map_err(|e| GenerationError::MalformedPayload(format!("Invalid JSON: {}", e)))?;

    shape
        .validate(&value)
        .map_err(GenerationError::MalformedPayload)?;

    Ok(value)
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
