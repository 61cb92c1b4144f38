//! Post-merge catalog overrides.

use std::collections::BTreeSet;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::types::{Capability, ModelCatalogEntry, ModelMetrics, ModelTier, Pricing};

/// Which entries an override applies to. Every condition that is set must
/// hold; an empty selector matches every entry.
#[derive(Debug, Clone, Default)]
pub struct ModelSelector {
    pub provider: Option<String>,
    pub model_id: Option<String>,
    /// Matched against both the bare id and the `provider/id` key.
    pub pattern: Option<Regex>,
}

impl ModelSelector {
    pub fn matches(&self, entry: &ModelCatalogEntry) -> bool {
        if self.provider.as_ref().is_some_and(|p| *p != entry.provider) {
            return false;
        }
        if self.model_id.as_ref().is_some_and(|m| *m != entry.id) {
            return false;
        }
        match &self.pattern {
            Some(re) => re.is_match(&entry.id) || re.is_match(&entry.qualified_id()),
            None => true,
        }
    }
}

/// Field replacements. `id` and `provider` can never be overridden.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<BTreeSet<Capability>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<ModelTier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<Pricing>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ModelMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supported_parameters: Option<BTreeSet<String>>,
}

impl ModelPatch {
    pub fn apply(&self, entry: &mut ModelCatalogEntry) {
        if let Some(name) = &self.name {
            entry.name = name.clone();
        }
        if let Some(caps) = &self.capabilities {
            entry.capabilities = caps.clone();
        }
        if let Some(tier) = self.tier {
            entry.tier = Some(tier);
        }
        if let Some(pricing) = &self.pricing {
            entry.pricing = pricing.clone();
        }
        if let Some(window) = self.context_window {
            entry.context_window = window;
        }
        if let Some(max) = self.max_output_tokens {
            entry.max_output_tokens = Some(max);
        }
        if let Some(metrics) = &self.metrics {
            entry.metrics = Some(metrics.clone());
        }
        if let Some(params) = &self.supported_parameters {
            entry.supported_parameters = params.clone();
        }
    }
}

/// A selector plus the fields to replace on every matching entry.
///
/// Overrides are replayed against the freshly merged catalog on every
/// rebuild, in registration order, so applying them twice is the same as
/// applying them once and later overrides win on conflicting fields.
#[derive(Debug, Clone, Default)]
pub struct ModelOverride {
    pub selector: ModelSelector,
    pub patch: ModelPatch,
}

impl ModelOverride {
    pub fn for_model(model_id: impl Into<String>) -> Self {
        Self {
            selector: ModelSelector {
                model_id: Some(model_id.into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn for_provider(provider: impl Into<String>) -> Self {
        Self {
            selector: ModelSelector {
                provider: Some(provider.into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn matching(pattern: &str) -> Result<Self, LlmError> {
        let re = Regex::new(pattern).map_err(|e| {
            LlmError::InvalidParameter(format!("Invalid override pattern '{pattern}': {e}"))
        })?;
        Ok(Self {
            selector: ModelSelector {
                pattern: Some(re),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.selector.provider = Some(provider.into());
        self
    }

    pub fn with_patch(mut self, patch: ModelPatch) -> Self {
        self.patch = patch;
        self
    }

    pub fn set_name(mut self, name: impl Into<String>) -> Self {
        self.patch.name = Some(name.into());
        self
    }

    pub fn set_capabilities(mut self, caps: impl IntoIterator<Item = Capability>) -> Self {
        self.patch.capabilities = Some(caps.into_iter().collect());
        self
    }

    pub fn set_tier(mut self, tier: ModelTier) -> Self {
        self.patch.tier = Some(tier);
        self
    }

    pub fn set_pricing(mut self, pricing: Pricing) -> Self {
        self.patch.pricing = Some(pricing);
        self
    }

    pub fn set_context_window(mut self, tokens: u64) -> Self {
        self.patch.context_window = Some(tokens);
        self
    }

    pub fn set_max_output_tokens(mut self, tokens: u64) -> Self {
        self.patch.max_output_tokens = Some(tokens);
        self
    }

    pub fn set_metrics(mut self, metrics: ModelMetrics) -> Self {
        self.patch.metrics = Some(metrics);
        self
    }

    pub fn set_supported_parameters<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.patch.supported_parameters = Some(params.into_iter().map(Into::into).collect());
        self
    }

    pub fn apply(&self, entry: &mut ModelCatalogEntry) -> bool {
        if !self.selector.matches(entry) {
            return false;
        }
        self.patch.apply(entry);
        true
    }
}
