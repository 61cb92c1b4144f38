//! In-memory providers shared by the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::stream;
use modelgate::prelude::*;

/// Four chat models priced 1..=4 USD per million tokens.
pub fn chat_models(provider: &str) -> Vec<ModelCatalogEntry> {
    (1..=4)
        .map(|i| {
            ModelCatalogEntry::new(provider, format!("{provider}-model-{i}"))
                .with_capabilities([Capability::Chat, Capability::Streaming])
                .with_pricing(Pricing::per_million(i as f64, i as f64))
                .with_context_window(8_000 * i as u64)
        })
        .collect()
}

/// Chat that answers with the concatenated user text.
pub fn echo_chat() -> ChatOperation {
    ChatOperation::new().with_get(|req: ChatRequest, _ctx| async move {
        let text = req
            .parts()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(" ");
        Ok(ChatResponse::text(text)
            .with_finish_reason(FinishReason::Stop)
            .with_usage(Usage::new(10, 5)))
    })
}

/// Native chat stream emitting `words` one chunk each, then a terminal chunk.
pub fn streaming_chat(words: &'static [&'static str]) -> ChatOperation {
    ChatOperation::new().with_stream(move |_req: ChatRequest, _ctx| async move {
        let mut chunks: Vec<Result<ChatChunk>> =
            words.iter().map(|w| Ok(ChatChunk::delta(*w))).collect();
        chunks.push(Ok(ChatChunk::finish(FinishReason::Stop, Some(Usage::new(3, words.len() as u64)))));
        Ok(modelgate::streaming::from_results(chunks))
    })
}

/// Native chat stream that never yields, for cancellation tests.
pub fn stalled_chat() -> ChatOperation {
    ChatOperation::new().with_stream(|_req: ChatRequest, _ctx| async move {
        let pending: ChunkStream<ChatChunk> = Box::pin(stream::pending());
        Ok(pending)
    })
}

pub fn provider(name: &str, ops: ProviderOperations) -> Arc<StaticProvider> {
    StaticProvider::builder(name)
        .models(chat_models(name))
        .operations(ops)
        .build_arc()
}

pub fn hello() -> ChatRequest {
    ChatRequest::new(vec![ChatMessage::user("hello"), ChatMessage::user("world")])
}

/// Records the lifecycle calls it sees, in order.
#[derive(Default)]
pub struct RecordingHook {
    pub events: Mutex<Vec<String>>,
    pub usages: Mutex<Vec<RequestUsage>>,
    pub errors: Mutex<Vec<String>>,
}

impl RecordingHook {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: &str) {
        self.events.lock().unwrap().push(event.to_string());
    }
}

#[async_trait]
impl AiHooks for RecordingHook {
    fn name(&self) -> &str {
        "recording"
    }

    async fn before_model_selection(
        &self,
        _ctx: &HookContext,
        criteria: SelectionCriteria,
    ) -> Result<SelectionCriteria> {
        self.push("before_model_selection");
        Ok(criteria)
    }

    async fn on_model_selected(&self, _ctx: &HookContext, selected: SelectedModel) -> Result<SelectedModel> {
        self.push("on_model_selected");
        Ok(selected)
    }

    async fn before_request(
        &self,
        _ctx: &HookContext,
        _selected: &SelectedModel,
        _estimate: &UsageEstimate,
    ) -> Result<()> {
        self.push("before_request");
        Ok(())
    }

    async fn after_request(&self, _ctx: &HookContext, usage: &RequestUsage) -> Result<()> {
        self.push("after_request");
        self.usages.lock().unwrap().push(usage.clone());
        Ok(())
    }

    async fn on_error(&self, _ctx: &HookContext, error: &LlmError) -> Result<()> {
        self.push("on_error");
        self.errors.lock().unwrap().push(error.code());
        Ok(())
    }
}
