//! Gemini generateContent backend
//!
//! One HTTP call per [`GenerationBackend::complete`]; retries, concurrency
//! and rate limiting belong to [`GenerationClient`](super::GenerationClient).

use crate::services::generation_client::{GenerationBackend, GenerationError};
use crate::services::output_shape::OutputShape;
use async_trait::async_trait;
use newln_common::config::GenerationSettings;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const USER_AGENT: &str = concat!("newln-ai/", env!("CARGO_PKG_VERSION"));
const MAX_ERROR_BODY: usize = 512;

/// Gemini REST client
pub struct GeminiBackend {
    http_client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiBackend {
    pub fn new(settings: &GenerationSettings, api_key: String) -> Result<Self, GenerationError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key,
        })
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    async fn complete(
        &self,
        prompt: &str,
        shape: Option<&OutputShape>,
    ) -> Result<String, GenerationError> {
        tracing::debug!(model = %self.model, prompt_len = prompt.len(), "Gemini request");

        let response = self
            .http_client
            .post(self.url())
            .query(&[("key", self.api_key.as_str())])
            .json(&build_request(prompt, shape))
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::from_status(
                status.as_u16(),
                truncate(&body, MAX_ERROR_BODY),
            ));
        }

        let parsed: GenerateContentResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout
            } else {
                GenerationError::MalformedPayload(format!("Unreadable response: {}", e))
            }
        })?;

        extract_text(parsed)
    }
}

/// generateContent request body
pub fn build_request(prompt: &str, shape: Option<&OutputShape>) -> Value {
    let mut generation_config = json!({
        "temperature": 1.0,
        "topK": 40,
        "topP": 0.95,
        "maxOutputTokens": 8192,
    });

    if let Some(shape) = shape {
        generation_config["responseMimeType"] = json!("application/json");
        generation_config["responseSchema"] = shape.to_schema();
    } else {
        generation_config["responseMimeType"] = json!("text/plain");
    }

    json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": prompt }],
        }],
        "generationConfig": generation_config,
    })
}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Debug, Deserialize)]
struct ResponseCandidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Text of the first candidate's first part
fn extract_text(response: GenerateContentResponse) -> Result<String, GenerationError> {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|content| content.parts.into_iter().next())
        .and_then(|part| part.text)
        .filter(|text| !text.trim().is_empty())
        .ok_or(GenerationError::EmptyResponse)
}

fn classify_transport_error(err: reqwest::Error) -> GenerationError {
    if err.is_timeout() {
        GenerationError::Timeout
    } else {
        GenerationError::Transport(err.to_string())
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
