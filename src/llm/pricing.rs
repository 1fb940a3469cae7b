//! Token and cost model for vision requests.

use serde::{Deserialize, Serialize};

use super::client::TokenUsage;

/// Per-image token assumptions and per-million-token prices (USD).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingModel {
    #[serde(default = "default_input_price")]
    pub input_per_million: f64,
    #[serde(default = "default_output_price")]
    pub output_per_million: f64,
    /// Average image payload, roughly one token per 0.75 KB.
    #[serde(default = "default_avg_image_kb")]
    pub avg_image_kb: f64,
    #[serde(default = "default_context_tokens")]
    pub context_tokens_per_image: f64,
    #[serde(default = "default_output_tokens")]
    pub output_tokens_per_image: f64,
}

fn default_input_price() -> f64 {
    3.0
}
fn default_output_price() -> f64 {
    15.0
}
fn default_avg_image_kb() -> f64 {
    500.0
}
fn default_context_tokens() -> f64 {
    200.0
}
fn default_output_tokens() -> f64 {
    50.0
}

impl Default for PricingModel {
    fn default() -> Self {
        Self {
            input_per_million: default_input_price(),
            output_per_million: default_output_price(),
            avg_image_kb: default_avg_image_kb(),
            context_tokens_per_image: default_context_tokens(),
            output_tokens_per_image: default_output_tokens(),
        }
    }
}

impl PricingModel {
    /// Estimated spend for `images` vision requests.
    pub fn estimate(&self, images: usize) -> f64 {
        let n = images as f64;
        let input_tokens = n * (self.avg_image_kb / 0.75 + self.context_tokens_per_image);
        let output_tokens = n * self.output_tokens_per_image;
        self.price(input_tokens, output_tokens)
    }

    /// Spend for tokens actually reported by the API.
    pub fn cost_of(&self, usage: &TokenUsage) -> f64 {
        self.price(usage.input_tokens as f64, usage.output_tokens as f64)
    }

    fn price(&self, input_tokens: f64, output_tokens: f64) -> f64 {
        input_tokens / 1_000_000.0 * self.input_per_million
            + output_tokens / 1_000_000.0 * self.output_per_million
    }
}

/// Estimate with the default pricing model.
pub fn estimate_cost(images: usize) -> f64 {
    PricingModel::default().estimate(images)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_scales_linearly() {
        assert_eq!(estimate_cost(0), 0.0);
        let one = estimate_cost(1);
        assert!((one - 0.00335).abs() < 1e-9);
        assert!((estimate_cost(1000) - 3.35).abs() < 1e-6);
    }

    #[test]
    fn test_cost_of_usage() {
        let usage = TokenUsage {
            input_tokens: 1_000_000,
            output_tokens: 100_000,
        };
        assert!((PricingModel::default().cost_of(&usage) - 4.5).abs() < 1e-9);
    }
}
