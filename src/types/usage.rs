//! Usage and cost accounting.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::capability::Operation;
use super::catalog::Pricing;

const PER_MILLION: f64 = 1_000_000.0;

/// Usage reported by a provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
    /// Generated images, for image endpoints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<u32>,
}

impl Usage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            images: None,
        }
    }

    pub fn images(count: u32) -> Self {
        Self {
            images: Some(count),
            ..Default::default()
        }
    }

    /// Add another usage report onto this one.
    pub fn add(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
        self.images = match (self.images, other.images) {
            (Some(a), Some(b)) => Some(a + b),
            (a, b) => a.or(b),
        };
    }

    /// Cost in USD under `pricing`; token prices missing from the catalog
    /// fall back to `default_per_million`.
    pub fn cost(&self, pricing: &Pricing, default_per_million: f64) -> f64 {
        let input = pricing.input_per_million.unwrap_or(default_per_million);
        let output = pricing
            .output_per_million
            .or(pricing.input_per_million)
            .unwrap_or(default_per_million);
        let mut cost = self.prompt_tokens as f64 / PER_MILLION * input
            + self.completion_tokens as f64 / PER_MILLION * output;
        if let (Some(images), Some(per_image)) = (self.images, pricing.per_image) {
            cost += f64::from(images) * per_image;
        }
        cost
    }
}

/// Pre-dispatch estimate handed to `before_request`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageEstimate {
    pub input_tokens: u64,
    /// Output tokens the caller asked for (e.g. `max_tokens`), if bounded.
    pub output_tokens: u64,
    /// Billable units that are not tokens (images to generate).
    pub units: u32,
    pub cost: f64,
}

/// Final accounting handed to `after_request`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestUsage {
    pub request_id: String,
    pub operation: Operation,
    pub provider: String,
    pub model: String,
    pub estimate: UsageEstimate,
    /// Usage reported by the provider, if any.
    pub usage: Option<Usage>,
    /// Cost from reported usage, else the estimate's cost.
    pub cost: f64,
    pub streamed: bool,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_uses_catalog_prices() {
        let usage = Usage::new(1_000_000, 500_000);
        let pricing = Pricing::per_million(2.0, 8.0);
        assert!((usage.cost(&pricing, 99.0) - 6.0).abs() < 1e-9);
    }

    #[test]
    fn cost_falls_back_to_default_price() {
        let usage = Usage::new(2_000_000, 0);
        assert!((usage.cost(&Pricing::default(), 1.5) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn image_usage_is_priced_per_image() {
        let usage = Usage::images(3);
        let pricing = Pricing::default().with_per_image(0.04);
        assert!((usage.cost(&pricing, 0.0) - 0.12).abs() < 1e-9);
    }

    #[test]
    fn add_sums_counters() {
        let mut a = Usage::new(10, 5);
        a.add(&Usage::new(1, 2));
        assert_eq!(a, Usage::new(11, 7));
    }
}
