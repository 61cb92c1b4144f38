//! # modelgate
//!
//! Capability-driven model selection and one shared request pipeline for
//! multi-provider AI access.
//!
#![deny(unsafe_code)]

//! ## Overview
//!
//! - **Registry**: merges model listings from every provider and catalog
//!   source into one catalog, applies override rules, and scores entries
//!   against [`SelectionCriteria`](types::SelectionCriteria).
//! - **Pipeline**: chat, image, image edit, speech, transcription and
//!   embedding requests all run through the same steps: derive criteria,
//!   select, estimate, dispatch, account.
//! - **Hooks**: steer or observe each request at fixed lifecycle points
//!   (budgets, tenancy policy, tracing).
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use modelgate::prelude::*;
//!
//! let provider = StaticProvider::builder("openai")
//!     .model(ModelCatalogEntry::new("openai", "gpt-4o").with_capabilities([Capability::Chat]))
//!     .operations(ProviderOperations::new().with_chat(
//!         ChatOperation::new().with_get(|req: ChatRequest, _ctx| async move {
//!             Ok(ChatResponse::text(format!("{} messages", req.messages.len())))
//!         }),
//!     ))
//!     .build_arc();
//!
//! let registry = Arc::new(ModelRegistry::builder().provider(provider).build()?);
//! registry.refresh().await;
//!
//! let client = AiClient::new(registry).with_hook(Arc::new(TracingHook));
//! let response = client
//!     .chat(ChatRequest::new(vec![ChatMessage::user("hi")]), RequestOptions::new())
//!     .await?;
//! ```

pub mod config;
pub mod error;
pub mod hooks;
pub mod observability;
pub mod pipeline;
pub mod provider;
pub mod registry;
pub mod streaming;
pub mod traits;
pub mod types;
pub mod utils;

pub use config::CoreConfig;
pub use error::{ErrorCategory, LlmError, Result};
pub use hooks::{AiHooks, HookChain, HookContext, HookStage};
pub use pipeline::{AiClient, Endpoint, RequestOptions};
pub use registry::{ModelRegistry, ModelRegistryBuilder, SelectedModel};

/// Everything needed to wire providers, build a registry and run requests.
pub mod prelude {
    pub use crate::config::{ContentEstimate, CoreConfig, TokenEstimation};
    pub use crate::error::{LlmError, Result};
    pub use crate::hooks::{
        AiHooks, BudgetHook, HookChain, HookContext, HookStage, ProviderPolicyHook, TracingHook,
    };
    pub use crate::pipeline::{
        AiClient, ChatEndpoint, EmbeddingEndpoint, Endpoint, ImageEditEndpoint, ImageEndpoint,
        RequestOptions, SpeechEndpoint, TranscriptionEndpoint,
    };
    pub use crate::provider::{
        ChatOperation, EmbeddingOperation, ExecutionContext, ImageEditOperation, ImageOperation,
        ModelHandler, OperationImpl, ProviderConfig, ProviderOperations, SpeechOperation,
        StaticModelSource, StaticProvider, TranscriptionOperation,
    };
    pub use crate::registry::{
        ModelOverride, ModelRegistry, ModelSelector, RefreshSummary, ScoredModel, SearchReport,
        SelectedModel,
    };
    pub use crate::streaming::ChunkStream;
    pub use crate::traits::{ModelSource, ProviderAdapter, ProviderCapabilities};
    pub use crate::types::*;
    pub use crate::utils::CancelHandle;
}
