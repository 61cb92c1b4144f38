//! Model catalog entries and the registration merge rule.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::capability::{Capability, ModelTier};

/// Separator between provider and model id in a qualified key.
pub const QUALIFIED_SEPARATOR: char = '/';

/// Build the provider-qualified key (`provider/id`).
pub fn qualified_key(provider: &str, id: &str) -> String {
    format!("{provider}{QUALIFIED_SEPARATOR}{id}")
}

/// Per-modality prices in USD. Unset prices are `None`, never zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_per_million: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_per_million: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_input_per_million: Option<f64>,
    /// Price of one generated image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_image: Option<f64>,
}

impl Pricing {
    pub fn per_million(input: f64, output: f64) -> Self {
        Self {
            input_per_million: Some(input),
            output_per_million: Some(output),
            ..Default::default()
        }
    }

    pub fn with_per_image(mut self, price: f64) -> Self {
        self.per_image = Some(price);
        self
    }

    pub fn with_audio_input_per_million(mut self, price: f64) -> Self {
        self.audio_input_per_million = Some(price);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.input_per_million.is_none()
            && self.output_per_million.is_none()
            && self.audio_input_per_million.is_none()
            && self.per_image.is_none()
    }

    /// Single comparable price used for ranking: the mean of the known token
    /// prices, else the per-image price.
    pub fn blended_per_million(&self) -> Option<f64> {
        match (self.input_per_million, self.output_per_million) {
            (Some(i), Some(o)) => Some((i + o) / 2.0),
            (Some(p), None) | (None, Some(p)) => Some(p),
            (None, None) => self.audio_input_per_million.or(self.per_image),
        }
    }

    /// Field-wise merge; a price already known wins.
    pub fn merge(&self, incoming: &Pricing) -> Pricing {
        Pricing {
            input_per_million: self.input_per_million.or(incoming.input_per_million),
            output_per_million: self.output_per_million.or(incoming.output_per_million),
            audio_input_per_million: self
                .audio_input_per_million
                .or(incoming.audio_input_per_million),
            per_image: self.per_image.or(incoming.per_image),
        }
    }
}

/// Rolling performance statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_per_second: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_rate: Option<f64>,
    #[serde(default)]
    pub samples: u64,
}

impl ModelMetrics {
    pub fn throughput(tokens_per_second: f64) -> Self {
        Self {
            tokens_per_second: Some(tokens_per_second),
            ..Default::default()
        }
    }
}

/// A provider's description of one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCatalogEntry {
    /// Provider-local model id; unique per provider only.
    pub id: String,
    pub provider: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub capabilities: BTreeSet<Capability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<ModelTier>,
    #[serde(default)]
    pub pricing: Pricing,
    #[serde(default)]
    pub context_window: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ModelMetrics>,
    #[serde(default)]
    pub supported_parameters: BTreeSet<String>,
}

impl ModelCatalogEntry {
    pub fn new(provider: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            provider: provider.into(),
            name: String::new(),
            capabilities: BTreeSet::new(),
            tier: None,
            pricing: Pricing::default(),
            context_window: 0,
            max_output_tokens: None,
            metrics: None,
            supported_parameters: BTreeSet::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_capabilities(mut self, caps: impl IntoIterator<Item = Capability>) -> Self {
        self.capabilities.extend(caps);
        self
    }

    pub fn with_tier(mut self, tier: ModelTier) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn with_pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_context_window(mut self, tokens: u64) -> Self {
        self.context_window = tokens;
        self
    }

    pub fn with_max_output_tokens(mut self, tokens: u64) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    pub fn with_metrics(mut self, metrics: ModelMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_parameters<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supported_parameters
            .extend(params.into_iter().map(Into::into));
        self
    }

    pub fn qualified_id(&self) -> String {
        qualified_key(&self.provider, &self.id)
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Merge two registrations of the same model.
///
/// Capability and parameter sets are unioned. Every other field keeps the
/// value that is already set; an unset (empty/zero/`None`) existing field
/// takes the incoming value. The first registration therefore wins ties,
/// which keeps the result deterministic for a fixed registration order.
pub fn merge_entries(existing: &ModelCatalogEntry, incoming: &ModelCatalogEntry) -> ModelCatalogEntry {
    let mut capabilities = existing.capabilities.clone();
    capabilities.extend(incoming.capabilities.iter().copied());

    let mut supported_parameters = existing.supported_parameters.clone();
    supported_parameters.extend(incoming.supported_parameters.iter().cloned());

    ModelCatalogEntry {
        id: existing.id.clone(),
        provider: existing.provider.clone(),
        name: if existing.name.is_empty() {
            incoming.name.clone()
        } else {
            existing.name.clone()
        },
        capabilities,
        tier: existing.tier.or(incoming.tier),
        pricing: existing.pricing.merge(&incoming.pricing),
        context_window: if existing.context_window == 0 {
            incoming.context_window
        } else {
            existing.context_window
        },
        max_output_tokens: existing.max_output_tokens.or(incoming.max_output_tokens),
        metrics: existing.metrics.clone().or_else(|| incoming.metrics.clone()),
        supported_parameters,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn base() -> ModelCatalogEntry {
        ModelCatalogEntry::new("openai", "gpt-4o")
            .with_name("GPT-4o")
            .with_capabilities([Capability::Chat, Capability::Vision])
            .with_context_window(128_000)
    }

    #[test]
    fn merge_fills_unset_fields_from_incoming() {
        let incoming = ModelCatalogEntry::new("openai", "gpt-4o")
            .with_tier(ModelTier::Flagship)
            .with_pricing(Pricing::per_million(2.5, 10.0))
            .with_capabilities([Capability::Tools]);

        let merged = merge_entries(&base(), &incoming);
        assert_eq!(merged.name, "GPT-4o");
        assert_eq!(merged.tier, Some(ModelTier::Flagship));
        assert_eq!(merged.pricing.input_per_million, Some(2.5));
        assert_eq!(merged.context_window, 128_000);
        assert!(merged.has(Capability::Tools));
        assert!(merged.has(Capability::Vision));
    }

    #[test]
    fn merge_keeps_first_value_on_conflict() {
        let incoming = ModelCatalogEntry::new("openai", "gpt-4o")
            .with_name("Renamed")
            .with_context_window(8_000);
        let merged = merge_entries(&base(), &incoming);
        assert_eq!(merged.name, "GPT-4o");
        assert_eq!(merged.context_window, 128_000);
    }

    #[test]
    fn pricing_merges_field_by_field() {
        let a = Pricing {
            input_per_million: Some(1.0),
            ..Default::default()
        };
        let b = Pricing::per_million(3.0, 4.0).with_per_image(0.04);
        let merged = a.merge(&b);
        assert_eq!(merged.input_per_million, Some(1.0));
        assert_eq!(merged.output_per_million, Some(4.0));
        assert_eq!(merged.per_image, Some(0.04));
    }

    #[test]
    fn blended_price_prefers_token_prices() {
        assert_eq!(Pricing::per_million(2.0, 4.0).blended_per_million(), Some(3.0));
        assert_eq!(
            Pricing::default().with_per_image(0.02).blended_per_million(),
            Some(0.02)
        );
        assert_eq!(Pricing::default().blended_per_million(), None);
    }

    fn capability_set() -> impl Strategy<Value = BTreeSet<Capability>> {
        proptest::collection::btree_set(proptest::sample::select(Capability::ALL.to_vec()), 0..8)
    }

    proptest! {
        #[test]
        fn merged_capabilities_are_the_union(a in capability_set(), b in capability_set()) {
            let first = ModelCatalogEntry::new("p", "m").with_capabilities(a.clone());
            let second = ModelCatalogEntry::new("p", "m").with_capabilities(b.clone());
            let merged = merge_entries(&first, &second);
            let union: BTreeSet<Capability> = a.union(&b).copied().collect();
            prop_assert_eq!(merged.capabilities, union);
        }
    }
}
