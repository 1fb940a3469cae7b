//! Shared HTTP client for page and image downloads.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use reqwest::{Client, Response, StatusCode};
use tracing::debug;

use super::rate_limiter::RateLimiter;

const USER_AGENT: &str = "altscribe/0.4 (accessibility alt text generator)";

/// Real browser user agents for impersonate mode.
const IMPERSONATE_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15",
];

fn random_user_agent() -> &'static str {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos() as usize)
        .unwrap_or(0);
    IMPERSONATE_USER_AGENTS[nanos % IMPERSONATE_USER_AGENTS.len()]
}

/// Resolve user agent from config value.
/// - None => default altscribe user agent
/// - "impersonate" => random real browser user agent
/// - other => custom user agent string
pub fn resolve_user_agent(config: Option<&str>) -> String {
    match config {
        None => USER_AGENT.to_string(),
        Some("impersonate") => random_user_agent().to_string(),
        Some(custom) => custom.to_string(),
    }
}

/// HTTP client with adaptive per-domain pacing.
///
/// Clones share the underlying connection pool and rate limiter.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    request_delay: Duration,
    rate_limiter: RateLimiter,
}

impl HttpClient {
    pub fn new(timeout: Duration, request_delay: Duration) -> Self {
        Self::with_user_agent(timeout, request_delay, None)
    }

    /// Create a client with custom user agent configuration
    /// (see [`resolve_user_agent`]).
    pub fn with_user_agent(
        timeout: Duration,
        request_delay: Duration,
        user_agent_config: Option<&str>,
    ) -> Self {
        Self::with_rate_limiter_and_user_agent(
            timeout,
            request_delay,
            RateLimiter::new(),
            user_agent_config,
        )
    }

    /// Create a client that paces requests through an existing limiter.
    pub fn with_rate_limiter_and_user_agent(
        timeout: Duration,
        request_delay: Duration,
        rate_limiter: RateLimiter,
        user_agent_config: Option<&str>,
    ) -> Self {
        let user_agent = resolve_user_agent(user_agent_config);
        let client = Client::builder()
            .user_agent(&user_agent)
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            request_delay,
            rate_limiter,
        }
    }

    /// Make a GET request. Uses adaptive rate limiting per domain.
    pub async fn get(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
        let domain = self.rate_limiter.acquire(url).await;

        let start = Instant::now();
        let response = self.client.get(url).send().await?;
        let status_code = response.status().as_u16();
        debug!(
            "GET {} -> {} in {}ms",
            url,
            status_code,
            start.elapsed().as_millis()
        );

        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.to_string(), v.to_string());
            }
        }

        if let Some(ref domain) = domain {
            self.rate_limiter.report_status(domain, status_code).await;
        }

        // Base delay on top of whatever the rate limiter imposes
        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }

        Ok(HttpResponse {
            status: response.status(),
            headers,
            response,
        })
    }
}

/// HTTP response wrapper.
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HashMap<String, String>,
    response: Response,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(|s| s.as_str())
    }

    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get("content-length")
            .and_then(|s| s.parse().ok())
    }

    pub async fn bytes(self) -> Result<Vec<u8>, reqwest::Error> {
        self.response.bytes().await.map(|b| b.to_vec())
    }

    pub async fn text(self) -> Result<String, reqwest::Error> {
        self.response.text().await
    }
}
