//! Immutable catalog snapshot.

use std::collections::{BTreeMap, HashMap};

use crate::registry::ModelOverride;
use crate::traits::ProviderCapabilities;
use crate::types::{ModelCatalogEntry, merge_entries, qualified_key};

/// Merge `incoming` into `raw`, keyed by `provider/id`. The first
/// registration keeps its position.
pub(crate) fn insert_merged(raw: &mut Vec<ModelCatalogEntry>, incoming: ModelCatalogEntry) {
    match raw
        .iter_mut()
        .find(|e| e.provider == incoming.provider && e.id == incoming.id)
    {
        Some(existing) => *existing = merge_entries(existing, &incoming),
        None => raw.push(incoming),
    }
}

/// One published view of the registry.
///
/// A catalog is built once and never mutated; the registry swaps in a new
/// `Arc<Catalog>` on every change, so a reader always sees either the old or
/// the new snapshot in full.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    raw: Vec<ModelCatalogEntry>,
    entries: Vec<ModelCatalogEntry>,
    index: HashMap<String, usize>,
    provider_capabilities: BTreeMap<String, ProviderCapabilities>,
}

impl Catalog {
    pub(crate) fn build(
        raw: Vec<ModelCatalogEntry>,
        overrides: &[ModelOverride],
        provider_capabilities: BTreeMap<String, ProviderCapabilities>,
    ) -> Self {
        let mut entries = raw.clone();
        for rule in overrides {
            for entry in entries.iter_mut() {
                rule.apply(entry);
            }
        }

        let mut index = HashMap::with_capacity(entries.len() * 2);
        for (i, entry) in entries.iter().enumerate() {
            index.insert(entry.qualified_id(), i);
        }
        // A bare id shared by several providers resolves to the first one
        // registered. Qualified keys take precedence over bare ones.
        for (i, entry) in entries.iter().enumerate() {
            index.entry(entry.id.clone()).or_insert(i);
        }

        Self {
            raw,
            entries,
            index,
            provider_capabilities,
        }
    }

    /// Re-derive with a different override list, keeping the merged entries.
    pub(crate) fn with_overrides(&self, overrides: &[ModelOverride]) -> Self {
        Self::build(
            self.raw.clone(),
            overrides,
            self.provider_capabilities.clone(),
        )
    }

    pub(crate) fn raw(&self) -> &[ModelCatalogEntry] {
        &self.raw
    }

    /// Effective entries in registration order.
    pub fn entries(&self) -> &[ModelCatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up by bare id or `provider/id`.
    pub fn get(&self, key: &str) -> Option<&ModelCatalogEntry> {
        self.index.get(key).map(|i| &self.entries[*i])
    }

    pub fn get_qualified(&self, provider: &str, id: &str) -> Option<&ModelCatalogEntry> {
        self.get(&qualified_key(provider, id))
    }

    pub fn provider_capabilities(&self, provider: &str) -> Option<&ProviderCapabilities> {
        self.provider_capabilities.get(provider)
    }

    pub fn all_provider_capabilities(&self) -> &BTreeMap<String, ProviderCapabilities> {
        &self.provider_capabilities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Capability;

    #[test]
    fn same_id_on_two_providers_stays_distinct() {
        let mut raw = Vec::new();
        insert_merged(&mut raw, ModelCatalogEntry::new("openai", "gpt-4o"));
        insert_merged(&mut raw, ModelCatalogEntry::new("azure", "gpt-4o"));
        let catalog = Catalog::build(raw, &[], BTreeMap::new());

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("gpt-4o").unwrap().provider, "openai");
        assert_eq!(catalog.get("azure/gpt-4o").unwrap().provider, "azure");
    }

    #[test]
    fn same_provider_registrations_merge() {
        let mut raw = Vec::new();
        insert_merged(
            &mut raw,
            ModelCatalogEntry::new("openai", "gpt-4o").with_capabilities([Capability::Chat]),
        );
        insert_merged(
            &mut raw,
            ModelCatalogEntry::new("openai", "gpt-4o").with_capabilities([Capability::Vision]),
        );
        assert_eq!(raw.len(), 1);
        assert!(raw[0].has(Capability::Chat) && raw[0].has(Capability::Vision));
    }

    #[test]
    fn overrides_run_against_the_raw_entries() {
        let mut raw = Vec::new();
        insert_merged(
            &mut raw,
            ModelCatalogEntry::new("openai", "gpt-4o").with_context_window(128_000),
        );
        let rule = ModelOverride::for_model("gpt-4o").set_context_window(8_000);
        let catalog = Catalog::build(raw, std::slice::from_ref(&rule), BTreeMap::new());
        assert_eq!(catalog.get("gpt-4o").unwrap().context_window, 8_000);
        assert_eq!(catalog.raw()[0].context_window, 128_000);

        let reset = catalog.with_overrides(&[]);
        assert_eq!(reset.get("gpt-4o").unwrap().context_window, 128_000);
    }
}
