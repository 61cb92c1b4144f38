//! Provider adapter trait

use async_trait::async_trait;

use crate::error::LlmError;
use crate::provider::{ProviderConfig, ProviderOperations};
use crate::traits::ProviderCapabilities;
use crate::types::ModelCatalogEntry;

/// One backend (OpenAI, Anthropic, a local server...).
///
/// Every endpoint family is optional: [`ProviderAdapter::operations`] returns
/// whatever request/response and streaming functions the provider has, and the
/// registry derives [`ProviderCapabilities`] from their presence.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Unique provider name, used as the `provider` of its catalog entries.
    fn name(&self) -> &str;

    /// Settings handed to every execution on this provider.
    fn config(&self) -> ProviderConfig {
        ProviderConfig::default()
    }

    fn supports_model_listing(&self) -> bool {
        false
    }

    /// Models this provider currently serves. Only called when
    /// [`ProviderAdapter::supports_model_listing`] is true.
    async fn list_models(&self) -> Result<Vec<ModelCatalogEntry>, LlmError> {
        Ok(Vec::new())
    }

    async fn check_health(&self) -> bool {
        true
    }

    fn operations(&self) -> &ProviderOperations;

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::from_operations(self.operations())
            .with_model_listing(self.supports_model_listing())
    }
}
