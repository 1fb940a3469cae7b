//! Per-domain rate limiting state.

use std::time::{Duration, Instant};

/// State for a single domain.
#[derive(Debug, Clone)]
pub struct DomainState {
    /// Current delay for this domain.
    pub current_delay: Duration,
    /// Last request time.
    pub last_request: Option<Instant>,
    /// Consecutive successes since last rate limit.
    pub consecutive_successes: u32,
    /// Whether currently in backoff.
    pub in_backoff: bool,
    /// Total requests made.
    pub total_requests: u64,
    /// Total rate limit hits.
    pub rate_limit_hits: u64,
}

impl DomainState {
    pub fn new(base_delay: Duration) -> Self {
        Self {
            current_delay: base_delay,
            last_request: None,
            consecutive_successes: 0,
            in_backoff: false,
            total_requests: 0,
            rate_limit_hits: 0,
        }
    }

    /// Time until this domain is ready for another request.
    pub fn time_until_ready(&self) -> Duration {
        match self.last_request {
            Some(last) => self.current_delay.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        }
    }
}
