//! Provider-side surface: adapter settings, the per-call execution context
//! and the optional per-operation function table.
//!
//! A provider (or a [`ModelHandler`]) exposes each endpoint family through an
//! [`OperationImpl`] holding an optional request/response function and an
//! optional streaming function. Either one is enough; the pipeline derives
//! the missing mode from the one that exists.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use secrecy::{ExposeSecret, SecretString};

use crate::error::LlmError;
use crate::pipeline::Endpoint;
use crate::pipeline::endpoints::{
    ChatEndpoint, EmbeddingEndpoint, ImageEditEndpoint, ImageEndpoint, SpeechEndpoint,
    TranscriptionEndpoint,
};
use crate::streaming::ChunkStream;
use crate::traits::OperationSupport;
use crate::types::Operation;
use crate::utils::{CancelHandle, abort_on_cancel};

pub mod handler;
pub mod static_provider;

pub use handler::ModelHandler;
pub use static_provider::{StaticModelSource, StaticProvider, StaticProviderBuilder};

/// Connection settings an adapter passes to every execution.
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub base_url: Option<String>,
    api_key: Option<Arc<SecretString>>,
    pub headers: BTreeMap<String, String>,
    /// Provider-specific settings the core never interprets.
    pub options: serde_json::Map<String, serde_json::Value>,
}

impl ProviderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(Arc::new(SecretString::from(key.into())));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_ref().map(|k| k.expose_secret())
    }
}

/// Everything a dispatch target receives besides the request itself.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub request_id: String,
    pub operation: Operation,
    pub provider: String,
    /// Provider-local model id.
    pub model: String,
    pub config: ProviderConfig,
    /// Forwarded to the target; the pipeline never polls it.
    pub cancel: CancelHandle,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ExecutionContext {
    pub fn new(operation: Operation, provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            operation,
            provider: provider.into(),
            model: model.into(),
            config: ProviderConfig::default(),
            cancel: CancelHandle::new(),
            metadata: HashMap::new(),
        }
    }

    /// The error a target reports when it stops a stream because of
    /// cancellation.
    pub fn stream_aborted(&self) -> LlmError {
        LlmError::StreamAborted {
            operation: self.operation,
            provider: self.provider.clone(),
            model: self.model.clone(),
        }
    }
}

pub type GetFn<E> = Arc<
    dyn Fn(
            <E as Endpoint>::Request,
            ExecutionContext,
        ) -> BoxFuture<'static, Result<<E as Endpoint>::Response, LlmError>>
        + Send
        + Sync,
>;

pub type StreamFn<E> = Arc<
    dyn Fn(
            <E as Endpoint>::Request,
            ExecutionContext,
        ) -> BoxFuture<'static, Result<ChunkStream<<E as Endpoint>::Chunk>, LlmError>>
        + Send
        + Sync,
>;

/// Optional request/response and streaming functions for one endpoint family.
pub struct OperationImpl<E: Endpoint> {
    pub get: Option<GetFn<E>>,
    pub stream: Option<StreamFn<E>>,
}

pub type ChatOperation = OperationImpl<ChatEndpoint>;
pub type ImageOperation = OperationImpl<ImageEndpoint>;
pub type ImageEditOperation = OperationImpl<ImageEditEndpoint>;
pub type SpeechOperation = OperationImpl<SpeechEndpoint>;
pub type TranscriptionOperation = OperationImpl<TranscriptionEndpoint>;
pub type EmbeddingOperation = OperationImpl<EmbeddingEndpoint>;

impl<E: Endpoint> OperationImpl<E> {
    pub fn new() -> Self {
        Self {
            get: None,
            stream: None,
        }
    }

    pub fn with_get<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(E::Request, ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<E::Response, LlmError>> + Send + 'static,
    {
        self.get = Some(Arc::new(move |req, ctx| f(req, ctx).boxed()));
        self
    }

    pub fn with_stream<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(E::Request, ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ChunkStream<E::Chunk>, LlmError>> + Send + 'static,
    {
        self.stream = Some(Arc::new(move |req, ctx| f(req, ctx).boxed()));
        self
    }

    /// Make the streaming function end with `StreamAborted` as soon as the
    /// execution's cancel handle fires.
    pub fn cancellable(mut self) -> Self {
        if let Some(inner) = self.stream.take() {
            self.stream = Some(Arc::new(move |req, ctx: ExecutionContext| {
                let inner = inner.clone();
                async move {
                    let cancel = ctx.cancel.clone();
                    let (operation, provider, model) =
                        (ctx.operation, ctx.provider.clone(), ctx.model.clone());
                    let stream = inner(req, ctx).await?;
                    Ok(abort_on_cancel(stream, cancel, move || {
                        LlmError::StreamAborted {
                            operation,
                            provider: provider.clone(),
                            model: model.clone(),
                        }
                    }))
                }
                .boxed()
            }));
        }
        self
    }

    pub fn support(&self) -> OperationSupport {
        OperationSupport {
            get: self.get.is_some(),
            stream: self.stream.is_some(),
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.support().any()
    }
}

impl<E: Endpoint> Default for OperationImpl<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Endpoint> Clone for OperationImpl<E> {
    fn clone(&self) -> Self {
        Self {
            get: self.get.clone(),
            stream: self.stream.clone(),
        }
    }
}

impl<E: Endpoint> fmt::Debug for OperationImpl<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationImpl")
            .field("operation", &E::OPERATION)
            .field("get", &self.get.is_some())
            .field("stream", &self.stream.is_some())
            .finish()
    }
}

/// The full function table of a provider or handler. Absent entries mean the
/// operation is not offered.
#[derive(Debug, Clone, Default)]
pub struct ProviderOperations {
    pub chat: ChatOperation,
    pub image: ImageOperation,
    pub image_edit: ImageEditOperation,
    pub speech: SpeechOperation,
    pub transcribe: TranscriptionOperation,
    pub embed: EmbeddingOperation,
}

impl ProviderOperations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chat(mut self, op: ChatOperation) -> Self {
        self.chat = op;
        self
    }

    pub fn with_image(mut self, op: ImageOperation) -> Self {
        self.image = op;
        self
    }

    pub fn with_image_edit(mut self, op: ImageEditOperation) -> Self {
        self.image_edit = op;
        self
    }

    pub fn with_speech(mut self, op: SpeechOperation) -> Self {
        self.speech = op;
        self
    }

    pub fn with_transcribe(mut self, op: TranscriptionOperation) -> Self {
        self.transcribe = op;
        self
    }

    pub fn with_embed(mut self, op: EmbeddingOperation) -> Self {
        self.embed = op;
        self
    }

    pub fn support(&self, op: Operation) -> OperationSupport {
        match op {
            Operation::Chat => self.chat.support(),
            Operation::Image => self.image.support(),
            Operation::ImageEdit => self.image_edit.support(),
            Operation::Speech => self.speech.support(),
            Operation::Transcribe => self.transcribe.support(),
            Operation::Embed => self.embed.support(),
        }
    }

    pub fn is_empty(&self) -> bool {
        Operation::ALL.iter().all(|op| !self.support(*op).any())
    }

    /// Apply [`OperationImpl::cancellable`] to every streaming function.
    pub fn cancellable(self) -> Self {
        Self {
            chat: self.chat.cancellable(),
            image: self.image.cancellable(),
            image_edit: self.image_edit.cancellable(),
            speech: self.speech.cancellable(),
            transcribe: self.transcribe.cancellable(),
            embed: self.embed.cancellable(),
        }
    }
}
