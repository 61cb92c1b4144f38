//! Request pipeline
//!
//! One generic algorithm serves every endpoint family:
//!
//! 1. derive criteria from the endpoint and the request, merged with the
//!    caller's criteria
//! 2. `before_model_selection`
//! 3. select a model (miss: `NoModelFound`)
//! 4. `on_model_selected`
//! 5. estimate usage
//! 6. `before_request`
//! 7. dispatch to the model's handler, else the provider
//! 8. execute, synthesizing the missing get/stream mode when possible
//! 9. `after_request`, once, on success only
//!
//! Every failure goes through `on_error` before it is returned.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;

use crate::error::LlmError;
use crate::hooks::{AiHooks, HookChain, HookContext};
use crate::provider::{ExecutionContext, OperationImpl};
use crate::registry::{ModelRegistry, SelectedModel};
use crate::streaming::{self, ChunkStream};
use crate::types::{
    ChatChunk, ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse, ImageChunk,
    ImageEditRequest, ImageRequest, ImageResponse, Operation, Pricing, RequestUsage,
    SelectionCriteria, SpeechRequest, SpeechResponse, TranscriptionChunk, TranscriptionRequest,
    TranscriptionResponse, Usage, UsageEstimate,
};
use crate::utils::CancelHandle;

pub mod endpoint;
pub mod endpoints;
pub mod estimate;

pub use endpoint::Endpoint;
pub use endpoints::{
    ChatEndpoint, EmbeddingEndpoint, ImageEditEndpoint, ImageEndpoint, SpeechEndpoint,
    TranscriptionEndpoint,
};

const TARGET: &str = "modelgate::pipeline";

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Merged with the criteria the endpoint derives from the request.
    pub criteria: SelectionCriteria,
    /// Forwarded untouched to the handler or provider.
    pub cancel: Option<CancelHandle>,
    /// Visible to every hook through [`HookContext::metadata`] and to the
    /// dispatch target through [`ExecutionContext::metadata`].
    pub metadata: HashMap<String, serde_json::Value>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_criteria(mut self, criteria: SelectionCriteria) -> Self {
        self.criteria = criteria;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.criteria.model = Some(model.into());
        self
    }

    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Cost bookkeeping carried from dispatch to the final `after_request`.
#[derive(Debug, Clone)]
struct Accounting {
    request_id: String,
    operation: Operation,
    provider: String,
    model: String,
    pricing: Pricing,
    default_cost_per_million: f64,
    estimate: UsageEstimate,
    started_at: chrono::DateTime<chrono::Utc>,
    started: Instant,
}

impl Accounting {
    /// Actual cost when the target reported usage, else the estimate.
    fn record(&self, usage: Option<Usage>, streamed: bool) -> RequestUsage {
        let cost = usage
            .as_ref()
            .map(|u| u.cost(&self.pricing, self.default_cost_per_million))
            .unwrap_or(self.estimate.cost);
        RequestUsage {
            request_id: self.request_id.clone(),
            operation: self.operation,
            provider: self.provider.clone(),
            model: self.model.clone(),
            estimate: self.estimate.clone(),
            usage,
            cost,
            streamed,
            started_at: self.started_at,
            duration: self.started.elapsed(),
        }
    }
}

struct Dispatch<E: Endpoint> {
    selected: SelectedModel,
    op: OperationImpl<E>,
    exec: ExecutionContext,
    accounting: Accounting,
}

/// Classify an error raised by the dispatch target.
fn execution_error(err: LlmError, cancel: &CancelHandle, exec: &ExecutionContext, streaming: bool) -> LlmError {
    if err.is_abort() {
        return err;
    }
    if cancel.is_cancelled() {
        return if streaming {
            exec.stream_aborted()
        } else {
            LlmError::Cancelled {
                operation: exec.operation,
            }
        };
    }
    LlmError::ProviderExecution {
        operation: exec.operation,
        provider: exec.provider.clone(),
        model: exec.model.clone(),
        source: Box::new(err),
    }
}

fn unsupported(selected: &SelectedModel, operation: Operation, reason: &str) -> LlmError {
    LlmError::UnsupportedOperation {
        operation,
        provider: selected.entry.provider.clone(),
        model: selected.entry.id.clone(),
        reason: reason.to_string(),
    }
}

fn stamp<E: Endpoint>(response: &mut E::Response, provider: &str, model: &str) {
    let metadata = E::metadata_mut(response);
    if metadata.provider.is_empty() {
        metadata.provider = provider.to_string();
    }
    if metadata.model.is_none() {
        metadata.model = Some(model.to_string());
    }
}

/// Executes requests against the models of a [`ModelRegistry`].
#[derive(Clone)]
pub struct AiClient {
    registry: Arc<ModelRegistry>,
    hooks: HookChain,
}

impl std::fmt::Debug for AiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiClient")
            .field("registry", &self.registry)
            .field("hooks", &self.hooks)
            .finish()
    }
}

impl AiClient {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self {
            registry,
            hooks: HookChain::new(),
        }
    }

    pub fn with_hooks(mut self, hooks: HookChain) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn AiHooks>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn hooks(&self) -> &HookChain {
        &self.hooks
    }

    async fn fail(&self, ctx: &HookContext, err: LlmError) -> LlmError {
        tracing::debug!(target: TARGET, request_id = %ctx.request_id, code = %err.code(), error = %err, "request failed");
        self.hooks.on_error(ctx, &err).await;
        err
    }

    /// Steps 1 to 7: everything up to, but excluding, the provider call.
    async fn prepare<E: Endpoint>(
        &self,
        request: &E::Request,
        options: &RequestOptions,
        ctx: &HookContext,
        cancel: &CancelHandle,
    ) -> Result<Dispatch<E>, LlmError> {
        let mut criteria = E::derive_criteria(request);
        criteria.merge_from(&options.criteria);
        let criteria = self.hooks.before_model_selection(ctx, criteria).await?;

        let selection_failed = |source: LlmError| LlmError::SelectionFailed {
            operation: E::OPERATION,
            source: Box::new(source),
        };
        let selected = match self.registry.select_model(&criteria).map_err(selection_failed)? {
            Some(selected) => selected,
            None => {
                let rejected = if criteria.model.is_some() {
                    Vec::new()
                } else {
                    self.registry
                        .explain_search(&criteria)
                        .map_err(selection_failed)?
                        .rejected
                };
                return Err(LlmError::NoModelFound {
                    operation: E::OPERATION,
                    criteria: Box::new(criteria),
                    rejected,
                });
            }
        };
        let selected = self.hooks.on_model_selected(ctx, selected).await?;

        let config = self.registry.config();
        let estimate = E::estimate(request, &selected.entry, config);
        self.hooks.before_request(ctx, &selected, &estimate).await?;

        let provider = selected.entry.provider.clone();
        let model = selected.entry.id.clone();
        let op = match self.registry.get_handler(&provider, &model) {
            Some(handler) if !E::operation(&handler.operations).is_empty() => {
                tracing::debug!(target: TARGET, provider = %provider, model = %model, "dispatching to handler");
                E::operation(&handler.operations).clone()
            }
            _ => E::operation(selected.provider.operations()).clone(),
        };
        if op.is_empty() {
            return Err(unsupported(
                &selected,
                E::OPERATION,
                "neither a handler nor the provider implements it",
            ));
        }
        if ctx.streaming && op.stream.is_none() && !E::OPERATION.can_synthesize_stream() {
            return Err(unsupported(
                &selected,
                E::OPERATION,
                "no native stream and a stream cannot be synthesized from a single response",
            ));
        }

        let exec = ExecutionContext {
            request_id: ctx.request_id.clone(),
            operation: E::OPERATION,
            provider: provider.clone(),
            model: model.clone(),
            config: selected.provider_config.clone(),
            cancel: cancel.clone(),
            metadata: options.metadata.clone(),
        };
        let accounting = Accounting {
            request_id: ctx.request_id.clone(),
            operation: E::OPERATION,
            provider,
            model,
            pricing: selected.entry.pricing.clone(),
            default_cost_per_million: config.default_cost_per_million_tokens,
            estimate,
            started_at: chrono::Utc::now(),
            started: Instant::now(),
        };
        Ok(Dispatch {
            selected,
            op,
            exec,
            accounting,
        })
    }

    /// Run one request/response call.
    ///
    /// A target that only streams is drained and its chunks folded into one
    /// response.
    pub async fn execute<E: Endpoint>(
        &self,
        request: E::Request,
        options: RequestOptions,
    ) -> Result<E::Response, LlmError> {
        let ctx = HookContext::new(E::OPERATION, false).with_metadata(options.metadata.clone());
        let cancel = options.cancel.clone().unwrap_or_default();

        let dispatch = match self.prepare::<E>(&request, &options, &ctx, &cancel).await {
            Ok(d) => d,
            Err(e) => return Err(self.fail(&ctx, e).await),
        };
        let Dispatch {
            selected,
            op,
            exec,
            accounting,
        } = dispatch;

        let result = match (&op.get, &op.stream) {
            (Some(get), _) => get(request, exec.clone()).await,
            (None, Some(stream)) => match stream(request, exec.clone()).await {
                Ok(mut chunks) => {
                    let mut fold = E::Fold::default();
                    let mut failed = None;
                    while let Some(item) = chunks.next().await {
                        match item {
                            Ok(chunk) => E::fold(&mut fold, &chunk),
                            Err(e) => {
                                failed = Some(e);
                                break;
                            }
                        }
                    }
                    match failed {
                        Some(e) => Err(e),
                        None => Ok(E::finish(fold)),
                    }
                }
                Err(e) => Err(e),
            },
            (None, None) => Err(unsupported(&selected, E::OPERATION, "no implementation")),
        };

        let mut response = match result {
            // A target may honor cancellation by ending its stream early;
            // the folded remainder is partial and never billed.
            Ok(_) if op.get.is_none() && cancel.is_cancelled() => {
                let err = LlmError::Cancelled {
                    operation: E::OPERATION,
                };
                return Err(self.fail(&ctx, err).await);
            }
            Ok(response) => response,
            Err(e) => {
                let err = execution_error(e, &cancel, &exec, false);
                return Err(self.fail(&ctx, err).await);
            }
        };
        stamp::<E>(&mut response, &exec.provider, &exec.model);

        let usage = accounting.record(E::usage(&response), false);
        self.hooks.after_request(&ctx, &usage).await;
        Ok(response)
    }

    /// Run one streaming call.
    ///
    /// Chunks are forwarded verbatim while being folded; `after_request`
    /// fires once the stream has fully drained. A target that only answers
    /// with a single response is turned into one content chunk followed by
    /// one terminal chunk.
    pub async fn execute_stream<E: Endpoint>(
        &self,
        request: E::Request,
        options: RequestOptions,
    ) -> Result<ChunkStream<E::Chunk>, LlmError> {
        let ctx = HookContext::new(E::OPERATION, true).with_metadata(options.metadata.clone());
        let cancel = options.cancel.clone().unwrap_or_default();

        let dispatch = match self.prepare::<E>(&request, &options, &ctx, &cancel).await {
            Ok(d) => d,
            Err(e) => return Err(self.fail(&ctx, e).await),
        };
        let Dispatch {
            selected,
            op,
            exec,
            accounting,
        } = dispatch;

        let opened = match (&op.stream, &op.get) {
            (Some(stream), _) => stream(request, exec.clone()).await,
            (None, Some(get)) => get(request, exec.clone()).await.and_then(|response| {
                E::into_chunks(response)
                    .map(|chunks| streaming::from_results(chunks.into_iter().map(Ok).collect()))
                    .ok_or_else(|| unsupported(&selected, E::OPERATION, "response cannot be split into chunks"))
            }),
            (None, None) => Err(unsupported(&selected, E::OPERATION, "no implementation")),
        };
        let mut inner = match opened {
            Ok(inner) => inner,
            Err(e) => {
                let err = execution_error(e, &cancel, &exec, true);
                return Err(self.fail(&ctx, err).await);
            }
        };

        let hooks = self.hooks.clone();
        let s = async_stream::stream! {
            let mut fold = E::Fold::default();
            while let Some(item) = inner.next().await {
                match item {
                    Ok(chunk) => {
                        E::fold(&mut fold, &chunk);
                        yield Ok(chunk);
                    }
                    Err(e) => {
                        let err = execution_error(e, &cancel, &exec, true);
                        hooks.on_error(&ctx, &err).await;
                        yield Err(err);
                        return;
                    }
                }
            }
            // A target may honor cancellation by simply ending its stream.
            if cancel.is_cancelled() {
                let err = exec.stream_aborted();
                hooks.on_error(&ctx, &err).await;
                yield Err(err);
                return;
            }
            let response = E::finish(fold);
            let usage = accounting.record(E::usage(&response), true);
            hooks.after_request(&ctx, &usage).await;
        };
        Ok(Box::pin(s))
    }

    pub async fn chat(&self, request: ChatRequest, options: RequestOptions) -> Result<ChatResponse, LlmError> {
        self.execute::<ChatEndpoint>(request, options).await
    }

    pub async fn chat_stream(
        &self,
        request: ChatRequest,
        options: RequestOptions,
    ) -> Result<ChunkStream<ChatChunk>, LlmError> {
        self.execute_stream::<ChatEndpoint>(request, options).await
    }

    pub async fn generate_image(
        &self,
        request: ImageRequest,
        options: RequestOptions,
    ) -> Result<ImageResponse, LlmError> {
        self.execute::<ImageEndpoint>(request, options).await
    }

    pub async fn generate_image_stream(
        &self,
        request: ImageRequest,
        options: RequestOptions,
    ) -> Result<ChunkStream<ImageChunk>, LlmError> {
        self.execute_stream::<ImageEndpoint>(request, options).await
    }

    pub async fn edit_image(
        &self,
        request: ImageEditRequest,
        options: RequestOptions,
    ) -> Result<ImageResponse, LlmError> {
        self.execute::<ImageEditEndpoint>(request, options).await
    }

    pub async fn edit_image_stream(
        &self,
        request: ImageEditRequest,
        options: RequestOptions,
    ) -> Result<ChunkStream<ImageChunk>, LlmError> {
        self.execute_stream::<ImageEditEndpoint>(request, options).await
    }

    pub async fn speech(
        &self,
        request: SpeechRequest,
        options: RequestOptions,
    ) -> Result<SpeechResponse, LlmError> {
        self.execute::<SpeechEndpoint>(request, options).await
    }

    pub async fn transcribe(
        &self,
        request: TranscriptionRequest,
        options: RequestOptions,
    ) -> Result<TranscriptionResponse, LlmError> {
        self.execute::<TranscriptionEndpoint>(request, options).await
    }

    pub async fn transcribe_stream(
        &self,
        request: TranscriptionRequest,
        options: RequestOptions,
    ) -> Result<ChunkStream<TranscriptionChunk>, LlmError> {
        self.execute_stream::<TranscriptionEndpoint>(request, options).await
    }

    pub async fn embed(
        &self,
        request: EmbeddingRequest,
        options: RequestOptions,
    ) -> Result<EmbeddingResponse, LlmError> {
        self.execute::<EmbeddingEndpoint>(request, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{
        ChatOperation, EmbeddingOperation, ModelHandler, ProviderOperations, StaticProvider,
    };
    use crate::types::{Capability, ChatMessage, FinishReason, ModelCatalogEntry};

    fn client(ops: ProviderOperations) -> AiClient {
        let provider = StaticProvider::builder("openai")
            .model(
                ModelCatalogEntry::new("openai", "gpt-4o")
                    .with_capabilities([Capability::Chat, Capability::Embedding]),
            )
            .operations(ops)
            .build_arc();
        let registry = ModelRegistry::builder().provider(provider).build().unwrap();
        AiClient::new(Arc::new(registry))
    }

    fn hello() -> ChatRequest {
        ChatRequest::new(vec![ChatMessage::user("hello")])
    }

    #[tokio::test]
    async fn response_metadata_is_stamped() {
        let client = client(ProviderOperations::new().with_chat(
            ChatOperation::new().with_get(|_req: ChatRequest, _ctx| async { Ok(ChatResponse::text("hi")) }),
        ));
        client.registry().refresh().await;
        let response = client.chat(hello(), RequestOptions::new()).await.unwrap();
        assert_eq!(response.metadata.provider, "openai");
        assert_eq!(response.metadata.model.as_deref(), Some("gpt-4o"));
    }

    #[tokio::test]
    async fn embed_stream_without_native_stream_is_unsupported() {
        let client = client(ProviderOperations::new().with_embed(
            EmbeddingOperation::new().with_get(|_req: EmbeddingRequest, _ctx| async {
                Ok(EmbeddingResponse::default())
            }),
        ));
        client.registry().refresh().await;
        let err = client
            .execute_stream::<EmbeddingEndpoint>(EmbeddingRequest::single("x"), RequestOptions::new())
            .await
            .err()
            .unwrap();
        assert_eq!(err.code(), "embed.unsupported_operation");
    }

    #[tokio::test]
    async fn handler_wins_over_provider() {
        let client = client(ProviderOperations::new().with_chat(
            ChatOperation::new().with_get(|_req: ChatRequest, _ctx| async { Ok(ChatResponse::text("provider")) }),
        ));
        client.registry().refresh().await;
        client
            .registry()
            .register_handler(ModelHandler::new("openai", ["gpt-4o"]).with_operations(
                ProviderOperations::new().with_chat(ChatOperation::new().with_get(
                    |_req: ChatRequest, ctx: ExecutionContext| async move {
                        Ok(ChatResponse::text(format!("handler:{}", ctx.model)))
                    },
                )),
            ))
            .unwrap();
        let response = client.chat(hello(), RequestOptions::new()).await.unwrap();
        assert_eq!(response.content, "handler:gpt-4o");
    }

    #[tokio::test]
    async fn provider_failure_is_wrapped_with_its_cause() {
        let client = client(ProviderOperations::new().with_chat(
            ChatOperation::new().with_get(|_req: ChatRequest, _ctx| async {
                Err(LlmError::ProviderError {
                    provider: "openai".into(),
                    message: "rate limited".into(),
                    status: Some(429),
                })
            }),
        ));
        client.registry().refresh().await;
        let err = client.chat(hello(), RequestOptions::new()).await.unwrap_err();
        assert_eq!(err.code(), "chat.provider_execution_error");
        assert_eq!(err.status_code(), Some(429));
    }

    #[tokio::test]
    async fn cancelled_get_surfaces_cancelled() {
        let client = client(ProviderOperations::new().with_chat(
            ChatOperation::new().with_get(|_req: ChatRequest, ctx: ExecutionContext| async move {
                ctx.cancel.cancelled().await;
                Err(LlmError::InternalError("request dropped".into()))
            }),
        ));
        client.registry().refresh().await;
        let cancel = CancelHandle::new();
        cancel.cancel();
        let err = client
            .chat(hello(), RequestOptions::new().with_cancel(cancel))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Cancelled { operation: Operation::Chat }));
    }

    #[tokio::test]
    async fn no_model_found_carries_criteria() {
        let client = client(ProviderOperations::new());
        client.registry().refresh().await;
        let err = client.chat(hello(), RequestOptions::new()).await.unwrap_err();
        match err {
            LlmError::NoModelFound { criteria, rejected, .. } => {
                assert!(criteria.required.contains(&Capability::Chat));
                assert_eq!(rejected.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn synthesized_stream_has_content_then_terminal_chunk() {
        let client = client(ProviderOperations::new().with_chat(
            ChatOperation::new().with_get(|_req: ChatRequest, _ctx| async {
                Ok(ChatResponse::text("whole").with_finish_reason(FinishReason::Length))
            }),
        ));
        client.registry().refresh().await;
        let chunks: Vec<_> = client
            .chat_stream(hello(), RequestOptions::new())
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(chunks.len(), 2);
        let first = chunks[0].as_ref().unwrap();
        let last = chunks[1].as_ref().unwrap();
        assert_eq!(first.content.as_deref(), Some("whole"));
        assert_eq!(last.finish_reason, Some(FinishReason::Length));
    }

    #[test]
    fn client_is_shareable() {
        static_assertions::assert_impl_all!(AiClient: Send, Sync, Clone);
    }
}
