mod support;

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use modelgate::prelude::*;

use support::{RecordingHook, echo_chat, hello, provider, stalled_chat, streaming_chat};

async fn client_with(ops: ProviderOperations, hook: Arc<RecordingHook>) -> AiClient {
    let registry = ModelRegistry::builder()
        .provider(provider("alpha", ops))
        .build()
        .unwrap();
    registry.refresh().await;
    AiClient::new(Arc::new(registry)).with_hook(hook)
}

fn pinned() -> RequestOptions {
    RequestOptions::new().with_model("alpha-model-1")
}

#[tokio::test]
async fn get_only_target_streams_one_content_chunk_then_terminal() {
    let hook = RecordingHook::new();
    let client = client_with(ProviderOperations::new().with_chat(echo_chat()), hook.clone()).await;

    let chunks: Vec<ChatChunk> = client
        .chat_stream(hello(), pinned())
        .await
        .unwrap()
        .map(|c| c.unwrap())
        .collect()
        .await;

    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].content.as_deref(), Some("hello world"));
    assert!(!chunks[0].is_terminal());
    assert!(chunks[1].is_terminal());
    assert_eq!(chunks[1].finish_reason, Some(FinishReason::Stop));

    let usages = hook.usages.lock().unwrap().clone();
    assert_eq!(usages.len(), 1);
    assert!(usages[0].streamed);
    assert_eq!(usages[0].usage, Some(Usage::new(10, 5)));
}

#[tokio::test]
async fn stream_only_target_is_folded_for_get() {
    let hook = RecordingHook::new();
    let client = client_with(
        ProviderOperations::new().with_chat(streaming_chat(&["Hel", "lo", "!"])),
        hook.clone(),
    )
    .await;

    let response = client.chat(hello(), pinned()).await.unwrap();
    assert_eq!(response.content, "Hello!");
    assert_eq!(response.finish_reason, Some(FinishReason::Stop));
    assert_eq!(response.usage, Some(Usage::new(3, 3)));
    assert_eq!(response.metadata.provider, "alpha");
    assert_eq!(response.metadata.model.as_deref(), Some("alpha-model-1"));
    assert_eq!(
        hook.events(),
        vec![
            "before_model_selection",
            "on_model_selected",
            "before_request",
            "after_request"
        ]
    );
}

#[tokio::test]
async fn native_stream_is_forwarded_and_accounted_after_drain() {
    let hook = RecordingHook::new();
    let client = client_with(
        ProviderOperations::new().with_chat(streaming_chat(&["a", "b"])),
        hook.clone(),
    )
    .await;

    let mut stream = client.chat_stream(hello(), pinned()).await.unwrap();
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.content.as_deref(), Some("a"));
    assert!(hook.usages.lock().unwrap().is_empty());

    let rest: Vec<_> = stream.collect().await;
    assert_eq!(rest.len(), 2);
    assert_eq!(hook.usages.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn actual_usage_prices_the_request() {
    let hook = RecordingHook::new();
    let client = client_with(ProviderOperations::new().with_chat(echo_chat()), hook.clone()).await;
    client.chat(hello(), pinned()).await.unwrap();

    let usage = hook.usages.lock().unwrap()[0].clone();
    assert_eq!(usage.provider, "alpha");
    assert_eq!(usage.model, "alpha-model-1");
    // 10 prompt + 5 completion tokens at 1 USD per million each.
    assert!((usage.cost - 15.0 / 1_000_000.0).abs() < 1e-12);
    assert!(usage.estimate.input_tokens > 0);
}

#[tokio::test]
async fn abort_before_first_chunk_surfaces_stream_aborted() {
    let hook = RecordingHook::new();
    let client = client_with(ProviderOperations::new().with_chat(stalled_chat()), hook.clone()).await;

    let cancel = CancelHandle::new();
    cancel.cancel();
    let items: Vec<_> = client
        .chat_stream(hello(), pinned().with_cancel(cancel))
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(items.len(), 1);
    let err = items.into_iter().next().unwrap().unwrap_err();
    assert_eq!(err.code(), "chat.stream_aborted");
    assert!(hook.usages.lock().unwrap().is_empty());
    assert_eq!(*hook.errors.lock().unwrap(), vec!["chat.stream_aborted"]);
}

#[tokio::test]
async fn abort_while_waiting_wakes_the_consumer() {
    let hook = RecordingHook::new();
    let client = client_with(ProviderOperations::new().with_chat(stalled_chat()), hook.clone()).await;

    let cancel = CancelHandle::new();
    let mut stream = client
        .chat_stream(hello(), pinned().with_cancel(cancel.clone()))
        .await
        .unwrap();
    let waiter = tokio::spawn(async move { stream.next().await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    cancel.cancel();

    let item = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(item, Some(Err(LlmError::StreamAborted { .. }))));
    assert!(hook.usages.lock().unwrap().is_empty());
}

#[tokio::test]
async fn streams_that_cannot_be_synthesized_are_unsupported() {
    let hook = RecordingHook::new();
    let ops = ProviderOperations::new()
        .with_chat(echo_chat())
        .with_embed(EmbeddingOperation::new().with_get(|req: EmbeddingRequest, _ctx| async move {
            Ok(EmbeddingResponse {
                embeddings: req.input.iter().map(|_| vec![0.0; 3]).collect(),
                ..Default::default()
            })
        }));
    let registry = ModelRegistry::builder()
        .provider(provider("alpha", ops))
        .model(
            ModelCatalogEntry::new("alpha", "embedder").with_capabilities([Capability::Embedding]),
        )
        .build()
        .unwrap();
    registry.refresh().await;
    let client = AiClient::new(Arc::new(registry)).with_hook(hook.clone());

    let embedded = client
        .embed(EmbeddingRequest::new(vec!["a".into(), "b".into()]), RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(embedded.embeddings.len(), 2);

    let err = client
        .execute_stream::<EmbeddingEndpoint>(EmbeddingRequest::single("a"), RequestOptions::new())
        .await
        .err()
        .unwrap();
    assert_eq!(err.code(), "embed.unsupported_operation");
    assert_eq!(hook.errors.lock().unwrap().last().unwrap(), "embed.unsupported_operation");
}

#[tokio::test]
async fn handler_serves_models_its_provider_cannot() {
    let registry = ModelRegistry::builder()
        .provider(provider("alpha", ProviderOperations::new()))
        .handler(
            ModelHandler::new("alpha", ["alpha-model-2"]).with_operations(
                ProviderOperations::new().with_chat(ChatOperation::new().with_get(
                    |_req: ChatRequest, ctx: ExecutionContext| async move {
                        Ok(ChatResponse::text(format!("handled {}", ctx.model)))
                    },
                )),
            ),
        )
        .build()
        .unwrap();
    registry.refresh().await;
    let client = AiClient::new(Arc::new(registry));

    // Only the handled model can serve chat, so search lands on it.
    let response = client.chat(hello(), RequestOptions::new()).await.unwrap();
    assert_eq!(response.content, "handled alpha-model-2");

    let err = client.chat(hello(), pinned()).await.unwrap_err();
    assert_eq!(err.code(), "chat.unsupported_operation");
}

#[tokio::test]
async fn explicit_model_never_falls_back() {
    let hook = RecordingHook::new();
    let client = client_with(ProviderOperations::new().with_chat(echo_chat()), hook.clone()).await;

    let err = client
        .chat(hello(), RequestOptions::new().with_model("missing-model"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "chat.no_model_found");
    assert_eq!(
        hook.events(),
        vec!["before_model_selection", "on_error"]
    );

    let response = client
        .chat(hello(), RequestOptions::new().with_model("alpha/alpha-model-4"))
        .await
        .unwrap();
    assert_eq!(response.metadata.model.as_deref(), Some("alpha-model-4"));
}

#[tokio::test]
async fn provider_errors_mid_stream_are_wrapped() {
    let failing = ChatOperation::new().with_stream(|_req: ChatRequest, _ctx| async move {
        Ok(modelgate::streaming::from_results(vec![
            Ok(ChatChunk::delta("partial")),
            Err(LlmError::provider("alpha", "connection reset")),
        ]))
    });
    let hook = RecordingHook::new();
    let client = client_with(ProviderOperations::new().with_chat(failing), hook.clone()).await;

    let items: Vec<_> = client
        .chat_stream(hello(), pinned())
        .await
        .unwrap()
        .collect()
        .await;
    assert_eq!(items.len(), 2);
    assert!(items[0].is_ok());
    let err = items[1].as_ref().unwrap_err();
    assert_eq!(err.code(), "chat.provider_execution_error");
    assert!(std::error::Error::source(err).is_some());
    assert!(hook.usages.lock().unwrap().is_empty());
}

#[tokio::test]
async fn cancelled_stream_folded_for_get_is_not_a_success() {
    // Handlers are not wrapped by `cancellable()`, so this one just ends its
    // stream once cancellation is requested.
    let partial = ChatOperation::new().with_stream(|_req: ChatRequest, ctx: ExecutionContext| async move {
        let cancel = ctx.cancel.clone();
        let tail = futures_util::stream::once(async move { cancel.cancelled().await })
            .filter_map(|_| async { None::<Result<ChatChunk>> });
        let chunks: ChunkStream<ChatChunk> =
            Box::pin(futures_util::stream::iter(vec![Ok(ChatChunk::delta("par"))]).chain(tail));
        Ok(chunks)
    });
    let registry = ModelRegistry::builder()
        .provider(provider("alpha", ProviderOperations::new()))
        .handler(
            ModelHandler::new("alpha", ["alpha-model-1"])
                .with_operations(ProviderOperations::new().with_chat(partial)),
        )
        .build()
        .unwrap();
    registry.refresh().await;
    let hook = RecordingHook::new();
    let client = AiClient::new(Arc::new(registry)).with_hook(hook.clone());

    let cancel = CancelHandle::new();
    let (result, _) = tokio::join!(
        client.chat(hello(), pinned().with_cancel(cancel.clone())),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel.cancel();
        }
    );

    let err = result.unwrap_err();
    assert_eq!(err.code(), "chat.cancelled");
    assert!(hook.usages.lock().unwrap().is_empty());
    assert_eq!(*hook.errors.lock().unwrap(), vec!["chat.cancelled"]);
}

#[tokio::test]
async fn unresolvable_weight_profile_keeps_the_operation_code() {
    let hook = RecordingHook::new();
    let client = client_with(ProviderOperations::new().with_chat(echo_chat()), hook.clone()).await;

    let options = RequestOptions::new().with_criteria(SelectionCriteria::new().with_weight_profile("vibes"));
    let err = client.chat(hello(), options).await.unwrap_err();

    assert_eq!(err.code(), "chat.selection_failed");
    let cause = std::error::Error::source(&err).unwrap();
    assert!(cause.to_string().contains("vibes"));
    assert_eq!(*hook.errors.lock().unwrap(), vec!["chat.selection_failed"]);
}
