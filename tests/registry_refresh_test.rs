mod support;

use std::sync::Arc;

use modelgate::prelude::*;
use tracing_test::traced_test;

use support::{chat_models, echo_chat, provider};

#[tokio::test]
async fn refresh_merges_every_provider_and_source() {
    let registry = ModelRegistry::builder()
        .provider(provider("alpha", ProviderOperations::new().with_chat(echo_chat())))
        .provider(provider("beta", ProviderOperations::new().with_chat(echo_chat())))
        .source(Arc::new(StaticModelSource::new("empty", Vec::new())))
        .build()
        .unwrap();

    let summary = registry.refresh().await;
    assert_eq!(summary.entries, 8);
    assert!(summary.failed.is_empty());
    assert_eq!(registry.list_models().len(), 8);
    assert!(registry.get_model("beta/beta-model-3").is_some());
    assert!(registry.get_model("alpha-model-1").is_some());
}

#[tokio::test]
#[traced_test]
async fn failing_listing_is_logged_and_skipped() {
    let broken = StaticProvider::builder("broken")
        .models(chat_models("broken"))
        .failing_listing("upstream returned 503")
        .build_arc();
    let registry = ModelRegistry::builder()
        .provider(provider("alpha", ProviderOperations::new().with_chat(echo_chat())))
        .provider(broken)
        .build()
        .unwrap();

    let summary = registry.refresh().await;
    assert_eq!(summary.entries, 4);
    assert_eq!(summary.failed, vec!["broken".to_string()]);
    assert!(registry.list_models().iter().all(|m| m.provider == "alpha"));
    assert!(logs_contain("model listing failed"));
}

#[tokio::test]
async fn source_entries_merge_into_provider_entries() {
    let enrichment = ModelCatalogEntry::new("alpha", "alpha-model-1")
        .with_capabilities([Capability::Tools])
        .with_tier(ModelTier::Flagship);
    let registry = ModelRegistry::builder()
        .provider(provider("alpha", ProviderOperations::new().with_chat(echo_chat())))
        .source(Arc::new(StaticModelSource::new("catalog", vec![enrichment])))
        .build()
        .unwrap();
    registry.refresh().await;

    let merged = registry.get_model("alpha/alpha-model-1").unwrap();
    assert!(merged.has(Capability::Chat));
    assert!(merged.has(Capability::Tools));
    assert_eq!(merged.tier, Some(ModelTier::Flagship));
    assert_eq!(registry.list_models().len(), 4);
}

#[tokio::test]
async fn override_changes_only_its_field() {
    let registry = ModelRegistry::builder()
        .provider(provider("alpha", ProviderOperations::new().with_chat(echo_chat())))
        .build()
        .unwrap();
    registry.refresh().await;
    let before = registry.get_model("alpha/alpha-model-2").unwrap();

    registry.add_override(ModelOverride::for_model("alpha-model-2").set_context_window(1_000_000));
    let after = registry.get_model("alpha/alpha-model-2").unwrap();

    assert_eq!(after.context_window, 1_000_000);
    assert_eq!(after.capabilities, before.capabilities);
    assert_eq!(after.pricing, before.pricing);
    assert_eq!(after.tier, before.tier);
    assert_eq!(
        registry.get_model("alpha/alpha-model-1").unwrap().context_window,
        8_000
    );

    // Overrides survive the next refresh.
    registry.refresh().await;
    assert_eq!(
        registry.get_model("alpha/alpha-model-2").unwrap().context_window,
        1_000_000
    );
}

#[tokio::test]
async fn health_check_reports_each_provider() {
    let sick = StaticProvider::builder("sick").build_arc();
    sick.set_healthy(false);
    let registry = ModelRegistry::builder()
        .provider(provider("alpha", ProviderOperations::new()))
        .provider(sick)
        .build()
        .unwrap();

    let health = registry.check_health().await;
    assert_eq!(health.get("alpha"), Some(&true));
    assert_eq!(health.get("sick"), Some(&false));
}

#[tokio::test]
async fn concurrent_refreshes_leave_a_consistent_catalog() {
    let registry = Arc::new(
        ModelRegistry::builder()
            .provider(provider("alpha", ProviderOperations::new().with_chat(echo_chat())))
            .provider(provider("beta", ProviderOperations::new().with_chat(echo_chat())))
            .build()
            .unwrap(),
    );
    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move { registry.refresh().await })
        })
        .collect();
    for t in tasks {
        assert_eq!(t.await.unwrap().entries, 8);
    }
    assert_eq!(registry.snapshot().len(), 8);
}
