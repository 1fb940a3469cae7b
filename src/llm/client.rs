//! Vision client for batched alt text generation.
//!
//! Talks to the Anthropic Messages API. The pipeline depends only on the
//! [`VisionGenerator`] trait so tests can substitute a recording fake.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::prompt::{self, ContentBlock};
use crate::scrapers::retry::{with_backoff, RetryPolicy, Retryable};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Pause after a rate limit response that carries no `retry-after`.
const RATE_LIMIT_PAUSE: Duration = Duration::from_secs(60);

/// Configuration for the vision client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    /// API base URL (default: https://api.anthropic.com)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Response token budget per image; multiplied by batch size.
    #[serde(default = "default_max_tokens_per_image")]
    pub max_tokens_per_image: u32,
    /// Sampling temperature. Unset uses the API default.
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Attempts per batch before the whole batch is failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_endpoint() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}
fn default_max_tokens_per_image() -> u32 {
    300
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_max_attempts() -> u32 {
    3
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            max_tokens_per_image: default_max_tokens_per_image(),
            temperature: None,
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl VisionConfig {
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.trim_end_matches('/').to_string();
        self
    }
}

/// One image submitted in a batch, with its page context.
#[derive(Debug, Clone)]
pub struct VisionImage {
    pub image_url: String,
    pub bytes: Vec<u8>,
    pub media_type: String,
    pub title: String,
    pub heading: String,
    pub adjacent_text: String,
}

/// Terminal outcome for one submitted image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisionResult {
    pub image_url: String,
    pub alt_text: Option<String>,
    pub error: Option<String>,
}

impl VisionResult {
    pub fn success(image_url: &str, alt_text: impl Into<String>) -> Self {
        Self {
            image_url: image_url.to_string(),
            alt_text: Some(alt_text.into()),
            error: None,
        }
    }

    pub fn failure(image_url: &str, error: impl Into<String>) -> Self {
        Self {
            image_url: image_url.to_string(),
            alt_text: None,
            error: Some(error.into()),
        }
    }
}

/// Tokens reported by the API for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, other: Self) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// Results of one vision call. `results` may be in any order.
#[derive(Debug, Clone, Default)]
pub struct VisionBatch {
    pub results: Vec<VisionResult>,
    pub usage: TokenUsage,
}

/// Turns a batch of images plus context into alt text.
///
/// Implementations retry internally; an `Err` fails every image in the batch.
#[async_trait]
pub trait VisionGenerator: Send + Sync {
    async fn generate(&self, images: &[VisionImage]) -> Result<VisionBatch, VisionError>;
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
    #[serde(default)]
    usage: TokenUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

/// Anthropic Messages API client.
pub struct VisionClient {
    config: VisionConfig,
    api_key: String,
    instructions: String,
    client: Client,
    retry: RetryPolicy,
}

impl VisionClient {
    /// Create a client. Fails if the API key is blank.
    pub fn new(config: VisionConfig, api_key: &str) -> Result<Self, VisionError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(VisionError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");
        let retry = RetryPolicy::vision().with_max_attempts(config.max_attempts);

        Ok(Self {
            config,
            api_key: api_key.to_string(),
            instructions: String::new(),
            client,
            retry,
        })
    }

    /// Site-specific guidance appended to the system prompt.
    pub fn with_instructions(mut self, instructions: &str) -> Self {
        self.instructions = instructions.to_string();
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn headers(&self) -> Result<HeaderMap, VisionError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key).map_err(|_| VisionError::MissingApiKey)?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    async fn call_messages(&self, request: &MessagesRequest<'_>) -> Result<MessagesResponse, VisionError> {
        let url = format!("{}/v1/messages", self.config.endpoint);
        let resp = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(request)
            .send()
            .await
            .map_err(|e| VisionError::Connection(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 429 {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            warn!("Vision API rate limited (retry-after: {:?})", retry_after);
            return Err(VisionError::RateLimited { retry_after });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(VisionError::Api {
                status: status.as_u16(),
                body,
            });
        }

        resp.json()
            .await
            .map_err(|e| VisionError::Parse(e.to_string()))
    }
}

#[async_trait]
impl VisionGenerator for VisionClient {
    async fn generate(&self, images: &[VisionImage]) -> Result<VisionBatch, VisionError> {
        if images.is_empty() {
            return Ok(VisionBatch::default());
        }

        let system = prompt::system_prompt(&self.instructions);
        let request = MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens_per_image * images.len() as u32,
            system: &system,
            messages: vec![Message {
                role: "user",
                content: prompt::user_content(images),
            }],
            temperature: self.config.temperature,
        };

        debug!("Sending {} image(s) to {}", images.len(), self.config.model);
        let response = with_backoff(&self.retry, "vision request", || self.call_messages(&request)).await?;

        let text = response
            .content
            .into_iter()
            .filter_map(|block| match block {
                ResponseBlock::Text { text } => Some(text),
                ResponseBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        let results = prompt::parse_response(&text, images);
        info!(
            "Vision batch of {} done ({} in / {} out tokens)",
            images.len(),
            response.usage.input_tokens,
            response.usage.output_tokens
        );

        Ok(VisionBatch {
            results,
            usage: response.usage,
        })
    }
}

/// Errors that can occur during vision calls.
#[derive(Debug)]
pub enum VisionError {
    /// No API key configured
    MissingApiKey,
    /// Failed to reach the API
    Connection(String),
    /// HTTP 429
    RateLimited { retry_after: Option<Duration> },
    /// API returned a non-success status
    Api { status: u16, body: String },
    /// Failed to parse response
    Parse(String),
}

impl std::fmt::Display for VisionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VisionError::MissingApiKey => write!(f, "ANTHROPIC_API_KEY is not set"),
            VisionError::Connection(msg) => write!(f, "Connection error: {}", msg),
            VisionError::RateLimited { .. } => write!(f, "Rate limited by vision API"),
            VisionError::Api { status, body } => write!(f, "API error: HTTP {}: {}", status, body),
            VisionError::Parse(msg) => write!(f, "Parse error: {}", msg),
        }
    }
}

impl std::error::Error for VisionError {}

impl Retryable for VisionError {
    fn is_retryable(&self) -> bool {
        match self {
            VisionError::Connection(_) | VisionError::RateLimited { .. } => true,
            // 529 is the API's "overloaded" status
            VisionError::Api { status, .. } => *status >= 500,
            VisionError::MissingApiKey | VisionError::Parse(_) => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            VisionError::RateLimited { retry_after } => Some(retry_after.unwrap_or(RATE_LIMIT_PAUSE)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(url: &str) -> VisionImage {
        VisionImage {
            image_url: url.to_string(),
            bytes: vec![0xFF, 0xD8, 0xFF],
            media_type: "image/jpeg".to_string(),
            title: "Page".to_string(),
            heading: String::new(),
            adjacent_text: String::new(),
        }
    }

    #[test]
    fn test_default_config() {
        let config = VisionConfig::default();
        assert_eq!(config.max_tokens_per_image, 300);
        assert!(config.model.starts_with("claude-"));
        assert!(config.temperature.is_none());
    }

    #[test]
    fn test_blank_key_rejected() {
        assert!(matches!(
            VisionClient::new(VisionConfig::default(), "  "),
            Err(VisionError::MissingApiKey)
        ));
    }

    #[test]
    fn test_retry_classification() {
        assert!(VisionError::Api { status: 529, body: String::new() }.is_retryable());
        assert!(!VisionError::Api { status: 400, body: String::new() }.is_retryable());
        assert_eq!(
            VisionError::RateLimited { retry_after: None }.retry_after(),
            Some(RATE_LIMIT_PAUSE)
        );
    }

    #[tokio::test]
    async fn test_generate_against_mock_api() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "test-key")
            .match_header("anthropic-version", ANTHROPIC_VERSION)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"content":[{"type":"text","text":"Image 1: A lighthouse at dusk\nImage 2: A map"}],
                    "usage":{"input_tokens":1200,"output_tokens":30}}"#,
            )
            .create_async()
            .await;

        let config = VisionConfig::default().with_endpoint(&server.url());
        let client = VisionClient::new(config, "test-key").unwrap();
        let batch = client.generate(&[image("a"), image("b")]).await.unwrap();

        mock.assert_async().await;
        assert_eq!(batch.results.len(), 2);
        assert_eq!(batch.results[0].alt_text.as_deref(), Some("A lighthouse at dusk"));
        assert_eq!(batch.results[1].image_url, "b");
        assert_eq!(batch.usage.input_tokens, 1200);
    }

    #[tokio::test]
    async fn test_client_error_fails_batch() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .with_status(400)
            .with_body("bad request")
            .expect(1)
            .create_async()
            .await;

        let config = VisionConfig::default().with_endpoint(&server.url());
        let client = VisionClient::new(config, "k")
            .unwrap()
            .with_retry_policy(RetryPolicy::immediate(3));
        let err = client.generate(&[image("a")]).await.unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, VisionError::Api { status: 400, .. }));
    }
}
