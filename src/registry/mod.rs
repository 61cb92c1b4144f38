//! Model registry
//!
//! Owns the merged model catalog, the override and handler lists, and the
//! installed providers and sources. The catalog is rebuilt wholesale on every
//! change and published as one `Arc<Catalog>`, so concurrent readers never
//! observe a half-applied refresh.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::FutureExt;
use futures::future::join_all;

use crate::config::CoreConfig;
use crate::error::LlmError;
use crate::provider::{ModelHandler, ProviderConfig};
use crate::traits::{ModelSource, ProviderAdapter, ProviderCapabilities};
use crate::types::{ModelCatalogEntry, Operation, SelectionCriteria};

pub mod catalog;
pub mod overrides;
pub mod scoring;

pub use catalog::Catalog;
pub use overrides::{ModelOverride, ModelPatch, ModelSelector};
pub use scoring::{RejectReason, Rejection, ScoredModel, SearchReport};

use catalog::insert_merged;

const TARGET: &str = "modelgate::registry";

/// The execution target chosen for one request.
#[derive(Clone)]
pub struct SelectedModel {
    pub entry: ModelCatalogEntry,
    pub provider: Arc<dyn ProviderAdapter>,
    pub provider_config: ProviderConfig,
    /// `None` for explicit selections, which are not ranked.
    pub score: Option<f64>,
}

impl SelectedModel {
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }
}

impl fmt::Debug for SelectedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectedModel")
            .field("entry", &self.entry.qualified_id())
            .field("provider", &self.provider.name())
            .field("provider_config", &self.provider_config)
            .field("score", &self.score)
            .finish()
    }
}

/// Outcome of a refresh. Failures are reported here and in the logs, never
/// as an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub entries: usize,
    /// Providers and sources whose listing failed.
    pub failed: Vec<String>,
}

#[derive(Default)]
struct RegistryState {
    catalog: Arc<Catalog>,
    manual: Vec<ModelCatalogEntry>,
    overrides: Vec<ModelOverride>,
    handlers: Vec<ModelHandler>,
}

pub struct ModelRegistry {
    state: RwLock<RegistryState>,
    providers: Vec<Arc<dyn ProviderAdapter>>,
    sources: Vec<Arc<dyn ModelSource>>,
    refresh_lock: tokio::sync::Mutex<()>,
    config: CoreConfig,
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRegistry")
            .field(
                "providers",
                &self.providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field(
                "sources",
                &self.sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("models", &self.snapshot().len())
            .finish()
    }
}

impl ModelRegistry {
    pub fn builder() -> ModelRegistryBuilder {
        ModelRegistryBuilder::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// A consistent view of the current catalog.
    pub fn snapshot(&self) -> Arc<Catalog> {
        self.read().catalog.clone()
    }

    fn provider_capabilities_map(&self) -> BTreeMap<String, ProviderCapabilities> {
        self.providers
            .iter()
            .map(|p| (p.name().to_string(), p.capabilities()))
            .collect()
    }

    /// Rebuild the catalog from every provider and source.
    ///
    /// All listings run concurrently and each one is isolated: a failing or
    /// panicking provider contributes nothing and is logged at `warn`. The new
    /// catalog is published only after every call has settled. Concurrent
    /// refreshes are serialized.
    pub async fn refresh(&self) -> RefreshSummary {
        let _guard = self.refresh_lock.lock().await;

        let provider_calls = self.providers.iter().map(|provider| async move {
            let name = provider.name().to_string();
            if !provider.supports_model_listing() {
                return (name, Ok(Vec::new()));
            }
            let result = AssertUnwindSafe(provider.list_models())
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    Err(LlmError::InternalError("list_models panicked".into()))
                })
                .map(|models| {
                    models
                        .into_iter()
                        .map(|mut m| {
                            m.provider = name.clone();
                            m
                        })
                        .collect::<Vec<_>>()
                });
            (name, result)
        });
        let source_calls = self.sources.iter().map(|source| async move {
            let result = AssertUnwindSafe(source.fetch_models())
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    Err(LlmError::InternalError("fetch_models panicked".into()))
                });
            (source.name().to_string(), result)
        });
        let (provider_results, source_results) =
            futures::join!(join_all(provider_calls), join_all(source_calls));

        let mut summary = RefreshSummary::default();
        let mut fetched = Vec::new();
        for (kind, (name, result)) in provider_results
            .into_iter()
            .map(|r| ("provider", r))
            .chain(source_results.into_iter().map(|r| ("source", r)))
        {
            match result {
                Ok(models) => {
                    tracing::debug!(target: TARGET, kind, name = %name, count = models.len(), "listed models");
                    fetched.push(models);
                }
                Err(e) => {
                    tracing::warn!(target: TARGET, kind, name = %name, error = %e, "model listing failed, skipping");
                    summary.failed.push(name);
                }
            }
        }

        let caps = self.provider_capabilities_map();
        let mut state = self.write();
        let mut raw = Vec::new();
        for entry in state.manual.iter().cloned() {
            insert_merged(&mut raw, entry);
        }
        for entry in fetched.into_iter().flatten() {
            insert_merged(&mut raw, entry);
        }
        let catalog = Catalog::build(raw, &state.overrides, caps);
        summary.entries = catalog.len();
        state.catalog = Arc::new(catalog);
        tracing::info!(target: TARGET, entries = summary.entries, failed = summary.failed.len(), "catalog refreshed");
        summary
    }

    /// Register one entry by hand. It is merged into the current catalog and
    /// kept across refreshes.
    pub fn register_model(&self, entry: ModelCatalogEntry) {
        let mut state = self.write();
        state.manual.push(entry.clone());
        let mut raw = state.catalog.raw().to_vec();
        insert_merged(&mut raw, entry);
        let caps = self.provider_capabilities_map();
        state.catalog = Arc::new(Catalog::build(raw, &state.overrides, caps));
    }

    /// Add an override and re-derive the catalog. Overrides always apply to
    /// the merged entries, in registration order.
    pub fn add_override(&self, rule: ModelOverride) {
        let mut state = self.write();
        state.overrides.push(rule);
        let catalog = state.catalog.with_overrides(&state.overrides);
        state.catalog = Arc::new(catalog);
    }

    /// Register a per-model handler. Fails when one of its models is already
    /// handled for the same provider.
    pub fn register_handler(&self, handler: ModelHandler) -> Result<(), LlmError> {
        let mut state = self.write();
        check_overlap(&state.handlers, &handler)?;
        tracing::debug!(target: TARGET, provider = %handler.provider, models = ?handler.models, "handler registered");
        state.handlers.push(handler);
        Ok(())
    }

    /// First handler registered for `(provider, model)`.
    pub fn get_handler(&self, provider: &str, model: &str) -> Option<ModelHandler> {
        self.read()
            .handlers
            .iter()
            .find(|h| h.provider == provider && h.handles(model))
            .cloned()
    }

    pub fn providers(&self) -> &[Arc<dyn ProviderAdapter>] {
        &self.providers
    }

    pub fn provider(&self, name: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.providers.iter().find(|p| p.name() == name).cloned()
    }

    pub fn provider_capabilities(&self, name: &str) -> Option<ProviderCapabilities> {
        self.snapshot().provider_capabilities(name).cloned()
    }

    pub fn list_models(&self) -> Vec<ModelCatalogEntry> {
        self.snapshot().entries().to_vec()
    }

    /// Look up by bare id or `provider/id`.
    pub fn get_model(&self, key: &str) -> Option<ModelCatalogEntry> {
        self.snapshot().get(key).cloned()
    }

    /// Whether an installed provider or a handler can serve `op` for `entry`.
    pub fn can_serve(&self, entry: &ModelCatalogEntry, op: Operation) -> bool {
        let catalog = self.snapshot();
        let state = self.read();
        serves(&catalog, &state.handlers, self, entry, op)
    }

    pub fn explain_search(&self, criteria: &SelectionCriteria) -> Result<SearchReport, LlmError> {
        let weights = self.config.resolve_weights(criteria)?;
        let catalog = self.snapshot();
        let handlers = self.read().handlers.clone();
        Ok(scoring::search(
            catalog.entries(),
            criteria,
            weights,
            &self.config,
            |entry, op| serves(&catalog, &handlers, self, entry, op),
        ))
    }

    /// Entries satisfying `criteria`, best first.
    pub fn search_models(&self, criteria: &SelectionCriteria) -> Result<Vec<ScoredModel>, LlmError> {
        Ok(self.explain_search(criteria)?.results)
    }

    /// Pick the execution target for `criteria`.
    ///
    /// An explicit `criteria.model` is looked up directly (bare id, then
    /// `provider/id`) and never falls back to search. Either way, `None` means
    /// no entry with an installed provider matched.
    pub fn select_model(&self, criteria: &SelectionCriteria) -> Result<Option<SelectedModel>, LlmError> {
        if let Some(model) = &criteria.model {
            let selected = self
                .get_model(model)
                .and_then(|entry| self.target(entry, None));
            if selected.is_none() {
                tracing::debug!(target: TARGET, model = %model, "explicit model not found");
            }
            return Ok(selected);
        }
        Ok(self
            .search_models(criteria)?
            .into_iter()
            .find_map(|hit| self.target(hit.entry, Some(hit.score))))
    }

    fn target(&self, entry: ModelCatalogEntry, score: Option<f64>) -> Option<SelectedModel> {
        let provider = self.provider(&entry.provider)?;
        Some(SelectedModel {
            provider_config: provider.config(),
            provider,
            entry,
            score,
        })
    }

    /// Probe every provider concurrently. A probe that panics counts as
    /// unhealthy.
    pub async fn check_health(&self) -> BTreeMap<String, bool> {
        let probes = self.providers.iter().map(|provider| async move {
            let healthy = AssertUnwindSafe(provider.check_health())
                .catch_unwind()
                .await
                .unwrap_or(false);
            if !healthy {
                tracing::warn!(target: TARGET, provider = %provider.name(), "provider unhealthy");
            }
            (provider.name().to_string(), healthy)
        });
        join_all(probes).await.into_iter().collect()
    }
}

fn serves(
    catalog: &Catalog,
    handlers: &[ModelHandler],
    registry: &ModelRegistry,
    entry: &ModelCatalogEntry,
    op: Operation,
) -> bool {
    if registry.provider(&entry.provider).is_none() {
        return false;
    }
    let by_provider = catalog
        .provider_capabilities(&entry.provider)
        .is_some_and(|caps| caps.supports(op));
    by_provider
        || handlers.iter().any(|h| {
            h.provider == entry.provider && h.handles(&entry.id) && h.operations.support(op).any()
        })
}

fn check_overlap(existing: &[ModelHandler], handler: &ModelHandler) -> Result<(), LlmError> {
    for other in existing {
        let overlap = other.overlap_with(handler);
        if !overlap.is_empty() {
            return Err(LlmError::InvalidParameter(format!(
                "Handler models {overlap:?} are already handled for provider '{}'",
                handler.provider
            )));
        }
    }
    Ok(())
}

#[derive(Default)]
pub struct ModelRegistryBuilder {
    providers: Vec<Arc<dyn ProviderAdapter>>,
    sources: Vec<Arc<dyn ModelSource>>,
    models: Vec<ModelCatalogEntry>,
    overrides: Vec<ModelOverride>,
    handlers: Vec<ModelHandler>,
    config: CoreConfig,
}

impl ModelRegistryBuilder {
    pub fn provider(mut self, provider: Arc<dyn ProviderAdapter>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn source(mut self, source: Arc<dyn ModelSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn model(mut self, entry: ModelCatalogEntry) -> Self {
        self.models.push(entry);
        self
    }

    pub fn override_rule(mut self, rule: ModelOverride) -> Self {
        self.overrides.push(rule);
        self
    }

    pub fn handler(mut self, handler: ModelHandler) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn config(mut self, config: CoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate and build. The catalog starts with the hand-registered models
    /// only; call [`ModelRegistry::refresh`] to pull provider listings.
    pub fn build(self) -> Result<ModelRegistry, LlmError> {
        self.config.validate()?;

        let mut names = std::collections::HashSet::new();
        for provider in &self.providers {
            if !names.insert(provider.name().to_string()) {
                return Err(LlmError::ConfigurationError(format!(
                    "Provider '{}' registered twice",
                    provider.name()
                )));
            }
        }

        let mut handlers: Vec<ModelHandler> = Vec::new();
        for handler in self.handlers {
            check_overlap(&handlers, &handler)?;
            handlers.push(handler);
        }

        let caps = self
            .providers
            .iter()
            .map(|p| (p.name().to_string(), p.capabilities()))
            .collect();
        let mut raw = Vec::new();
        for entry in self.models.iter().cloned() {
            insert_merged(&mut raw, entry);
        }
        let catalog = Catalog::build(raw, &self.overrides, caps);

        Ok(ModelRegistry {
            state: RwLock::new(RegistryState {
                catalog: Arc::new(catalog),
                manual: self.models,
                overrides: self.overrides,
                handlers,
            }),
            providers: self.providers,
            sources: self.sources,
            refresh_lock: tokio::sync::Mutex::new(()),
            config: self.config,
        })
    }
}
