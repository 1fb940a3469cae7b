//! Adaptive per-domain rate limiter.
//!
//! Tracks request timing per domain and adapts delays based on responses.
//! Backs off on 429/503, gradually recovers on success.

mod domain_state;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use domain_state::DomainState;

/// Configuration for rate limiting behavior.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Base delay between requests to the same domain.
    pub base_delay: Duration,
    /// Minimum delay (floor).
    pub min_delay: Duration,
    /// Maximum delay (ceiling for backoff).
    pub max_delay: Duration,
    /// Multiplier for exponential backoff on rate limit.
    pub backoff_multiplier: f64,
    /// Multiplier for recovery on success (< 1.0 to decrease delay).
    pub recovery_multiplier: f64,
    /// Number of consecutive successes before reducing delay.
    pub recovery_threshold: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(250),
            min_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            recovery_multiplier: 0.8,
            recovery_threshold: 5,
        }
    }
}

/// Adaptive rate limiter that tracks per-domain request timing.
///
/// Clones share state, so page scraping and image downloads against the same
/// host are paced together.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    domains: Arc<RwLock<HashMap<String, DomainState>>>,
}

impl RateLimiter {
    /// Create a new rate limiter with default config.
    pub fn new() -> Self {
        Self::with_config(RateLimitConfig::default())
    }

    /// Create a new rate limiter with custom config.
    pub fn with_config(config: RateLimitConfig) -> Self {
        Self {
            config,
            domains: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Extract domain from URL.
    pub fn extract_domain(url: &str) -> Option<String> {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|s| s.to_string()))
    }

    /// Wait until the domain is ready, then mark request as started.
    pub async fn acquire(&self, url: &str) -> Option<String> {
        let domain = Self::extract_domain(url)?;

        let wait_time = {
            let domains = self.domains.read().await;
            domains
                .get(&domain)
                .map(|s| s.time_until_ready())
                .unwrap_or(Duration::ZERO)
        };

        if wait_time > Duration::ZERO {
            debug!("Rate limiting {}: waiting {:?}", domain, wait_time);
            tokio::time::sleep(wait_time).await;
        }

        {
            let mut domains = self.domains.write().await;
            let state = domains
                .entry(domain.clone())
                .or_insert_with(|| DomainState::new(self.config.base_delay));
            state.last_request = Some(Instant::now());
            state.total_requests += 1;
        }

        Some(domain)
    }

    /// Report a response status for a domain and adjust its delay.
    pub async fn report_status(&self, domain: &str, status_code: u16) {
        if Self::is_rate_limit(status_code) {
            self.report_rate_limit(domain, status_code).await;
        } else if status_code >= 500 {
            self.report_server_error(domain).await;
        } else if (200..400).contains(&status_code) {
            self.report_success(domain).await;
        }
    }

    /// Report a successful request - may decrease delay.
    pub async fn report_success(&self, domain: &str) {
        let mut domains = self.domains.write().await;
        if let Some(state) = domains.get_mut(domain) {
            state.consecutive_successes += 1;

            if state.in_backoff && state.consecutive_successes >= self.config.recovery_threshold {
                let new_delay = Duration::from_secs_f64(
                    state.current_delay.as_secs_f64() * self.config.recovery_multiplier,
                );
                state.current_delay = new_delay.max(self.config.min_delay);

                if state.current_delay <= self.config.base_delay {
                    state.in_backoff = false;
                    state.current_delay = self.config.base_delay;
                    info!("Domain {} recovered from rate limit backoff", domain);
                } else {
                    debug!(
                        "Domain {} delay reduced to {:?}",
                        domain, state.current_delay
                    );
                }

                state.consecutive_successes = 0;
            }
        }
    }

    /// Whether a status code is a definite rate limit signal.
    pub fn is_rate_limit(status_code: u16) -> bool {
        matches!(status_code, 429 | 503)
    }

    /// Report a definite rate limit hit (429 or 503) - increases delay.
    pub async fn report_rate_limit(&self, domain: &str, status_code: u16) {
        let mut domains = self.domains.write().await;
        if let Some(state) = domains.get_mut(domain) {
            state.rate_limit_hits += 1;
            state.consecutive_successes = 0;
            state.in_backoff = true;

            let new_delay = Duration::from_secs_f64(
                state.current_delay.as_secs_f64() * self.config.backoff_multiplier,
            );
            state.current_delay = new_delay.min(self.config.max_delay);

            warn!(
                "Rate limited by {} (HTTP {}), backing off to {:?}",
                domain, status_code, state.current_delay
            );
        }
    }

    /// Report a server error (5xx other than 503) - mild backoff.
    pub async fn report_server_error(&self, domain: &str) {
        let mut domains = self.domains.write().await;
        if let Some(state) = domains.get_mut(domain) {
            let new_delay = Duration::from_secs_f64(state.current_delay.as_secs_f64() * 1.5);
            state.current_delay = new_delay.min(self.config.max_delay);
            debug!(
                "Server error for {}, delay increased to {:?}",
                domain, state.current_delay
            );
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
