//! Configuration consumed by the registry and the request pipeline.
//!
//! Only the values the core needs live here: pricing fallback, token
//! estimation divisors and scoring weights. How a caller stores them is up to
//! the caller; the struct derives serde so any format can be used.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::types::{ScoringWeights, SelectionCriteria};

/// Divisors turning a content size into an approximate token count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContentEstimate {
    /// Characters (text) or raw bytes (media) per token.
    pub divisor: f64,
    /// Base64 characters per token.
    pub base64_divisor: f64,
    /// Tokens assumed when the size is unknown (e.g. a remote URL).
    pub fallback_tokens: u64,
}

impl ContentEstimate {
    pub const fn new(divisor: f64, base64_divisor: f64, fallback_tokens: u64) -> Self {
        Self {
            divisor,
            base64_divisor,
            fallback_tokens,
        }
    }

    pub fn raw_tokens(&self, len: usize) -> u64 {
        divide(len, self.divisor)
    }

    pub fn base64_tokens(&self, len: usize) -> u64 {
        divide(len, self.base64_divisor)
    }

    fn is_valid(&self) -> bool {
        self.divisor > 0.0 && self.base64_divisor > 0.0
    }
}

fn divide(len: usize, divisor: f64) -> u64 {
    if len == 0 {
        return 0;
    }
    (len as f64 / divisor).ceil() as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TokenEstimation {
    pub text: ContentEstimate,
    pub image: ContentEstimate,
    pub audio: ContentEstimate,
    pub file: ContentEstimate,
}

impl Default for TokenEstimation {
    fn default() -> Self {
        Self {
            text: ContentEstimate::new(4.0, 4.0, 0),
            image: ContentEstimate::new(750.0, 1000.0, 85),
            audio: ContentEstimate::new(400.0, 533.0, 300),
            file: ContentEstimate::new(4.0, 5.33, 500),
        }
    }
}

/// Core configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Price (USD) applied when a model has no token pricing.
    pub default_cost_per_million_tokens: f64,
    #[serde(default)]
    pub token_estimation: TokenEstimation,
    #[serde(default = "builtin_weight_profiles")]
    pub weight_profiles: BTreeMap<String, ScoringWeights>,
    #[serde(default)]
    pub default_weights: ScoringWeights,
    /// Score added per matched optional capability.
    #[serde(default = "default_optional_bonus")]
    pub optional_capability_bonus: f64,
    /// Score added when a model's tier equals the requested tier hint.
    #[serde(default = "default_tier_bonus")]
    pub tier_match_bonus: f64,
}

fn default_optional_bonus() -> f64 {
    0.1
}

fn default_tier_bonus() -> f64 {
    0.15
}

/// Named profiles available out of the box.
pub fn builtin_weight_profiles() -> BTreeMap<String, ScoringWeights> {
    BTreeMap::from([
        ("balanced".to_string(), ScoringWeights::balanced()),
        ("cheapest".to_string(), ScoringWeights::new(1.0, 0.0, 0.0, 0.0)),
        ("fastest".to_string(), ScoringWeights::new(0.1, 0.8, 0.1, 0.0)),
        ("smartest".to_string(), ScoringWeights::new(0.0, 0.1, 0.8, 0.1)),
        ("long_context".to_string(), ScoringWeights::new(0.1, 0.1, 0.2, 0.6)),
    ])
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            default_cost_per_million_tokens: 1.0,
            token_estimation: TokenEstimation::default(),
            weight_profiles: builtin_weight_profiles(),
            default_weights: ScoringWeights::default(),
            optional_capability_bonus: default_optional_bonus(),
            tier_match_bonus: default_tier_bonus(),
        }
    }
}

impl CoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_cost_per_million(mut self, cost: f64) -> Self {
        self.default_cost_per_million_tokens = cost;
        self
    }

    pub fn with_token_estimation(mut self, estimation: TokenEstimation) -> Self {
        self.token_estimation = estimation;
        self
    }

    pub fn with_weight_profile(mut self, name: impl Into<String>, weights: ScoringWeights) -> Self {
        self.weight_profiles.insert(name.into(), weights);
        self
    }

    pub fn with_default_weights(mut self, weights: ScoringWeights) -> Self {
        self.default_weights = weights;
        self
    }

    pub fn with_optional_capability_bonus(mut self, bonus: f64) -> Self {
        self.optional_capability_bonus = bonus;
        self
    }

    /// Weights for a search: explicit weights, else the named profile, else
    /// the default vector.
    pub fn resolve_weights(&self, criteria: &SelectionCriteria) -> Result<ScoringWeights, LlmError> {
        if let Some(weights) = criteria.weights {
            if !weights.is_valid() {
                return Err(LlmError::InvalidParameter(format!(
                    "Scoring weights must be finite and non-negative: {weights:?}"
                )));
            }
            return Ok(weights);
        }
        if let Some(profile) = &criteria.weight_profile {
            return self.weight_profiles.get(profile).copied().ok_or_else(|| {
                LlmError::ConfigurationError(format!("Unknown weight profile: {profile}"))
            });
        }
        Ok(self.default_weights)
    }

    pub fn validate(&self) -> Result<(), LlmError> {
        if !self.default_cost_per_million_tokens.is_finite()
            || self.default_cost_per_million_tokens < 0.0
        {
            return Err(LlmError::ConfigurationError(
                "default_cost_per_million_tokens must be a non-negative number".into(),
            ));
        }
        let est = &self.token_estimation;
        for (kind, entry) in [
            ("text", est.text),
            ("image", est.image),
            ("audio", est.audio),
            ("file", est.file),
        ] {
            if !entry.is_valid() {
                return Err(LlmError::ConfigurationError(format!(
                    "token_estimation.{kind} divisors must be positive"
                )));
            }
        }
        if !self.default_weights.is_valid() {
            return Err(LlmError::ConfigurationError(
                "default_weights must be non-negative".into(),
            ));
        }
        if let Some((name, _)) = self.weight_profiles.iter().find(|(_, w)| !w.is_valid()) {
            return Err(LlmError::ConfigurationError(format!(
                "weight profile '{name}' has negative weights"
            )));
        }
        Ok(())
    }
}
