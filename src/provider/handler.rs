//! Per-model dispatch overrides.

use crate::provider::ProviderOperations;

/// Routes selected models of a provider to custom functions instead of the
/// provider's own implementation.
///
/// When a handler offers any function for the requested endpoint it wins;
/// otherwise the provider's implementation is used.
#[derive(Debug, Clone)]
pub struct ModelHandler {
    pub provider: String,
    /// Provider-local model ids this handler serves.
    pub models: Vec<String>,
    pub operations: ProviderOperations,
}

impl ModelHandler {
    pub fn new<I, S>(provider: impl Into<String>, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            provider: provider.into(),
            models: models.into_iter().map(Into::into).collect(),
            operations: ProviderOperations::default(),
        }
    }

    pub fn with_operations(mut self, operations: ProviderOperations) -> Self {
        self.operations = operations;
        self
    }

    pub fn handles(&self, model: &str) -> bool {
        self.models.iter().any(|m| m == model)
    }

    /// Model ids this handler shares with `other`, when both belong to the
    /// same provider.
    pub fn overlap_with(&self, other: &ModelHandler) -> Vec<String> {
        if self.provider != other.provider {
            return Vec::new();
        }
        self.models
            .iter()
            .filter(|m| other.handles(m))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_is_per_provider() {
        let a = ModelHandler::new("openai", ["gpt-4o", "gpt-4o-mini"]);
        let b = ModelHandler::new("openai", ["gpt-4o-mini", "o3"]);
        let c = ModelHandler::new("azure", ["gpt-4o"]);
        assert_eq!(a.overlap_with(&b), vec!["gpt-4o-mini".to_string()]);
        assert!(a.overlap_with(&c).is_empty());
        assert!(a.handles("gpt-4o"));
        assert!(!a.handles("o3"));
    }
}
