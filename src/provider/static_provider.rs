//! In-memory provider and catalog source.
//!
//! `StaticProvider` wraps a fixed model list and a function table. It is what
//! embedders reach for when an integration is a handful of closures, and what
//! the tests build their fixtures from.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::error::LlmError;
use crate::provider::{ProviderConfig, ProviderOperations};
use crate::traits::{ModelSource, ProviderAdapter};
use crate::types::ModelCatalogEntry;

#[derive(Debug)]
pub struct StaticProvider {
    name: String,
    config: ProviderConfig,
    models: Vec<ModelCatalogEntry>,
    listing: bool,
    listing_error: Option<String>,
    healthy: AtomicBool,
    operations: ProviderOperations,
}

impl StaticProvider {
    pub fn builder(name: impl Into<String>) -> StaticProviderBuilder {
        StaticProviderBuilder::new(name)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProviderAdapter for StaticProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> ProviderConfig {
        self.config.clone()
    }

    fn supports_model_listing(&self) -> bool {
        self.listing
    }

    async fn list_models(&self) -> Result<Vec<ModelCatalogEntry>, LlmError> {
        if let Some(message) = &self.listing_error {
            return Err(LlmError::provider(&self.name, message));
        }
        Ok(self.models.clone())
    }

    async fn check_health(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    fn operations(&self) -> &ProviderOperations {
        &self.operations
    }
}

pub struct StaticProviderBuilder {
    name: String,
    config: ProviderConfig,
    models: Vec<ModelCatalogEntry>,
    listing: Option<bool>,
    listing_error: Option<String>,
    operations: ProviderOperations,
}

impl StaticProviderBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: ProviderConfig::default(),
            models: Vec::new(),
            listing: None,
            listing_error: None,
            operations: ProviderOperations::default(),
        }
    }

    pub fn config(mut self, config: ProviderConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a listed model. Its provider is forced to this provider's name.
    pub fn model(mut self, entry: ModelCatalogEntry) -> Self {
        self.models.push(entry);
        self
    }

    pub fn models(mut self, entries: impl IntoIterator<Item = ModelCatalogEntry>) -> Self {
        self.models.extend(entries);
        self
    }

    /// Override whether the provider advertises model listing. Defaults to
    /// true when at least one model was added.
    pub fn listing(mut self, enabled: bool) -> Self {
        self.listing = Some(enabled);
        self
    }

    /// Make `list_models` fail with a provider error.
    pub fn failing_listing(mut self, message: impl Into<String>) -> Self {
        self.listing = Some(true);
        self.listing_error = Some(message.into());
        self
    }

    pub fn operations(mut self, operations: ProviderOperations) -> Self {
        self.operations = operations;
        self
    }

    pub fn build(self) -> StaticProvider {
        let name = self.name;
        let models = self
            .models
            .into_iter()
            .map(|mut m| {
                m.provider = name.clone();
                m
            })
            .collect::<Vec<_>>();
        StaticProvider {
            listing: self.listing.unwrap_or(!models.is_empty()),
            name,
            config: self.config,
            models,
            listing_error: self.listing_error,
            healthy: AtomicBool::new(true),
            operations: self.operations.cancellable(),
        }
    }

    pub fn build_arc(self) -> Arc<StaticProvider> {
        Arc::new(self.build())
    }
}

/// A [`ModelSource`] backed by a fixed entry list.
#[derive(Debug, Clone)]
pub struct StaticModelSource {
    name: String,
    models: Vec<ModelCatalogEntry>,
}

impl StaticModelSource {
    pub fn new(name: impl Into<String>, models: Vec<ModelCatalogEntry>) -> Self {
        Self {
            name: name.into(),
            models,
        }
    }
}

#[async_trait]
impl ModelSource for StaticModelSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_models(&self) -> Result<Vec<ModelCatalogEntry>, LlmError> {
        Ok(self.models.clone())
    }
}
