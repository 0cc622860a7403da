//! Text generation boundary: the `Generator` capability, the retry/timeout
//! policy every call goes through, the prompt template and a Gemini
//! `generateContent` client.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use ragdb_core::config::GenerationSettings;
use ragdb_core::{Error, Result};

#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;

    /// Produce a completion for `prompt`. Transient failures must come back
    /// as `Error::Generation { retryable: true, .. }`.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Bound on each individual attempt.
    pub timeout: Duration,
    /// Delay before retry `n` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, timeout: Duration::from_secs(30), backoff: Duration::from_millis(500) }
    }
}

impl From<&GenerationSettings> for RetryPolicy {
    fn from(s: &GenerationSettings) -> Self {
        Self {
            max_attempts: s.max_attempts.max(1),
            timeout: Duration::from_secs(s.timeout_secs),
            backoff: Duration::from_millis(s.backoff_ms),
        }
    }
}

/// Call `generator` under `policy`: each attempt is timed out, and timeouts
/// or retryable errors are retried until attempts run out.
pub async fn generate_with_retry(generator: &dyn Generator, prompt: &str, policy: &RetryPolicy) -> Result<String> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let outcome = match tokio::time::timeout(policy.timeout, generator.generate(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(policy.timeout)),
        };
        match outcome {
            Ok(text) => {
                debug!(generator = generator.name(), attempt, chars = text.len(), "generation complete");
                return Ok(text);
            }
            Err(e) if e.is_retryable() && attempt < attempts => {
                warn!(generator = generator.name(), attempt, error = %e, "generation failed, retrying");
                tokio::time::sleep(policy.backoff * attempt).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

pub fn build_prompt(system_prompt: &str, context: &str, question: &str) -> String {
    format!("{system_prompt}\n\nContext:\n{context}\n\nQuestion: {question}\n\nAnswer:")
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

fn response_text(body: GenerateResponse) -> Option<String> {
    let content = body.candidates.into_iter().next()?.content?;
    let text: String = content.parts.into_iter().map(|p| p.text).collect();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Gemini REST client (`models/{model}:generateContent`).
pub struct GeminiGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    max_tokens: u32,
    temperature: f32,
}

impl GeminiGenerator {
    pub fn from_settings(settings: &GenerationSettings) -> Result<Self> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::InvalidConfig("generation.api_key is not set (APP_GENERATION__API_KEY)".into()))?;
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key,
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }
}

fn transport_error(e: &reqwest::Error) -> Error {
    Error::Generation { message: e.to_string(), retryable: e.is_timeout() || e.is_connect() || e.is_request() }
}

#[async_trait]
impl Generator for GeminiGenerator {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = GenerateRequest {
            contents: [Content { parts: [Part { text: prompt }] }],
            generation_config: GenerationConfig { max_output_tokens: self.max_tokens, temperature: self.temperature },
        };
        let response = self
            .client
            .post(format!("{}/models/{}:generateContent", self.endpoint, self.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let retryable = status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            return Err(Error::Generation { message: format!("{status}: {detail}"), retryable });
        }
        let parsed: GenerateResponse = response.json().await.map_err(|e| transport_error(&e))?;
        response_text(parsed)
            .ok_or_else(|| Error::Generation { message: "response contained no text".into(), retryable: false })
    }
}
