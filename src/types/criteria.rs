//! Selection criteria handed to the registry.

use serde::{Deserialize, Serialize};

use super::capability::{Capability, ModelTier, Operation};

/// Provider allow/deny lists. An empty allow-list allows every provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderFilter {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

impl ProviderFilter {
    pub fn permits(&self, provider: &str) -> bool {
        if self.deny.iter().any(|p| p == provider) {
            return false;
        }
        self.allow.is_empty() || self.allow.iter().any(|p| p == provider)
    }
}

/// Relative weights of the scoring factors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub accuracy: f64,
    #[serde(default)]
    pub context: f64,
}

impl ScoringWeights {
    pub const fn new(cost: f64, speed: f64, accuracy: f64, context: f64) -> Self {
        Self {
            cost,
            speed,
            accuracy,
            context,
        }
    }

    pub const fn balanced() -> Self {
        Self::new(0.3, 0.2, 0.35, 0.15)
    }

    pub fn is_valid(&self) -> bool {
        [self.cost, self.speed, self.accuracy, self.context]
            .iter()
            .all(|w| w.is_finite() && *w >= 0.0)
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self::balanced()
    }
}

/// Everything the registry needs to pick a model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionCriteria {
    /// Explicit model (bare id or `provider/id`); disables searching.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub required: Vec<Capability>,
    #[serde(default)]
    pub optional: Vec<Capability>,
    /// Request-option tags the model must list in `supported_parameters`.
    #[serde(default)]
    pub parameters: Vec<String>,
    #[serde(default)]
    pub providers: ProviderFilter,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_context_window: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<ModelTier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<ScoringWeights>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_profile: Option<String>,
    /// When set, only models whose provider (or handler) implements this
    /// endpoint are eligible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,
}

impl SelectionCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_model(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            ..Default::default()
        }
    }

    pub fn require(mut self, capability: Capability) -> Self {
        push_unique(&mut self.required, capability);
        self
    }

    pub fn prefer(mut self, capability: Capability) -> Self {
        push_unique(&mut self.optional, capability);
        self
    }

    pub fn require_parameter(mut self, parameter: impl Into<String>) -> Self {
        let parameter = parameter.into();
        if !self.parameters.contains(&parameter) {
            self.parameters.push(parameter);
        }
        self
    }

    pub fn allow_provider(mut self, provider: impl Into<String>) -> Self {
        self.providers.allow.push(provider.into());
        self
    }

    pub fn deny_provider(mut self, provider: impl Into<String>) -> Self {
        self.providers.deny.push(provider.into());
        self
    }

    pub fn with_min_context_window(mut self, tokens: u64) -> Self {
        self.min_context_window = Some(tokens);
        self
    }

    pub fn with_tier(mut self, tier: ModelTier) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn with_weights(mut self, weights: ScoringWeights) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn with_weight_profile(mut self, profile: impl Into<String>) -> Self {
        self.weight_profile = Some(profile.into());
        self
    }

    pub fn for_operation(mut self, operation: Operation) -> Self {
        self.operation = Some(operation);
        self
    }

    /// Union another criteria's capability and parameter lists into this one.
    /// Scalar fields already set here are kept.
    pub fn merge_from(&mut self, other: &SelectionCriteria) {
        for cap in &other.required {
            push_unique(&mut self.required, *cap);
        }
        for cap in &other.optional {
            push_unique(&mut self.optional, *cap);
        }
        for param in &other.parameters {
            if !self.parameters.contains(param) {
                self.parameters.push(param.clone());
            }
        }
        self.providers.allow.extend(other.providers.allow.iter().cloned());
        self.providers.deny.extend(other.providers.deny.iter().cloned());
        if self.model.is_none() {
            self.model = other.model.clone();
        }
        if self.min_context_window.is_none() {
            self.min_context_window = other.min_context_window;
        }
        if self.tier.is_none() {
            self.tier = other.tier;
        }
        if self.weights.is_none() {
            self.weights = other.weights;
        }
        if self.weight_profile.is_none() {
            self.weight_profile = other.weight_profile.clone();
        }
        if self.operation.is_none() {
            self.operation = other.operation;
        }
    }
}

fn push_unique(list: &mut Vec<Capability>, capability: Capability) {
    if !list.contains(&capability) {
        list.push(capability);
    }
}
