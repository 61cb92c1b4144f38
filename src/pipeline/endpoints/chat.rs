//! Chat completions.

use crate::config::CoreConfig;
use crate::pipeline::Endpoint;
use crate::pipeline::estimate::{InputTokens, priced, text_tokens};
use crate::provider::{ChatOperation, ProviderOperations};
use crate::types::{
    Capability, ChatChunk, ChatRequest, ChatResponse, ContentPart, FinishReason,
    ModelCatalogEntry, Operation, ResponseFormat, ResponseMetadata, SelectionCriteria, ToolCall,
    Usage, UsageEstimate,
};

pub struct ChatEndpoint;

/// Accumulated state of a chat stream.
#[derive(Debug, Default)]
pub struct ChatFold {
    content: String,
    reasoning: Option<String>,
    tool_calls: Vec<ToolCall>,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
}

impl ChatFold {
    /// Tool calls are unioned by id; a fragment repeating a known id (or
    /// carrying no id at all) extends the matching call's arguments.
    fn merge_tool_call(&mut self, call: &ToolCall) {
        let existing = if call.id.is_empty() {
            self.tool_calls.last_mut()
        } else {
            self.tool_calls.iter_mut().find(|c| c.id == call.id)
        };
        match existing {
            Some(c) => {
                if c.name.is_empty() {
                    c.name = call.name.clone();
                }
                c.arguments.push_str(&call.arguments);
            }
            None => self.tool_calls.push(call.clone()),
        }
    }
}

impl Endpoint for ChatEndpoint {
    type Request = ChatRequest;
    type Response = ChatResponse;
    type Chunk = ChatChunk;
    type Fold = ChatFold;

    const OPERATION: Operation = Operation::Chat;
    const BASE_CAPABILITY: Capability = Capability::Chat;

    fn derive_criteria(request: &ChatRequest) -> SelectionCriteria {
        let mut criteria = Self::base_criteria();
        for part in request.parts() {
            match part {
                ContentPart::Image { .. } => criteria = criteria.require(Capability::Vision),
                ContentPart::Audio { .. } => criteria = criteria.require(Capability::Hearing),
                _ => {}
            }
        }
        if !request.tools.is_empty() {
            criteria = criteria
                .require(Capability::Tools)
                .require_parameter("tools");
        }
        match &request.response_format {
            Some(ResponseFormat::JsonSchema { .. }) => {
                criteria = criteria
                    .require(Capability::Structured)
                    .require_parameter("response_format");
            }
            Some(ResponseFormat::JsonObject) => {
                criteria = criteria
                    .require(Capability::Json)
                    .require_parameter("response_format");
            }
            Some(ResponseFormat::Text) | None => {}
        }
        if request.reasoning.is_some() {
            criteria = criteria.require(Capability::Reasoning);
        }
        if request.temperature.is_some() {
            criteria = criteria.require_parameter("temperature");
        }
        if request.max_tokens.is_some() {
            criteria = criteria.require_parameter("max_tokens");
        }
        criteria
    }

    fn estimate(request: &ChatRequest, entry: &ModelCatalogEntry, config: &CoreConfig) -> UsageEstimate {
        let mut input = InputTokens::default();
        for part in request.parts() {
            input.add_part(part, config);
        }
        for tool in &request.tools {
            input.text += text_tokens(&tool.name, config)
                + text_tokens(&tool.description, config)
                + text_tokens(&tool.parameters.to_string(), config);
        }
        let output = request
            .max_tokens
            .map(u64::from)
            .or(entry.max_output_tokens)
            .unwrap_or(0);
        priced(input, output, 0, entry, config)
    }

    fn operation(ops: &ProviderOperations) -> &ChatOperation {
        &ops.chat
    }

    fn fold(state: &mut ChatFold, chunk: &ChatChunk) {
        if let Some(content) = &chunk.content {
            state.content.push_str(content);
        }
        if let Some(reasoning) = &chunk.reasoning {
            state
                .reasoning
                .get_or_insert_with(String::new)
                .push_str(reasoning);
        }
        for call in &chunk.tool_calls {
            state.merge_tool_call(call);
        }
        if chunk.finish_reason.is_some() {
            state.finish_reason = chunk.finish_reason.clone();
        }
        if chunk.usage.is_some() {
            state.usage = chunk.usage.clone();
        }
    }

    fn finish(state: ChatFold) -> ChatResponse {
        ChatResponse {
            content: state.content,
            reasoning: state.reasoning,
            tool_calls: state.tool_calls,
            finish_reason: state.finish_reason,
            usage: state.usage,
            metadata: ResponseMetadata::default(),
        }
    }

    fn into_chunks(response: ChatResponse) -> Option<[ChatChunk; 2]> {
        let content = ChatChunk {
            content: Some(response.content),
            reasoning: response.reasoning,
            tool_calls: response.tool_calls,
            finish_reason: None,
            usage: None,
        };
        let terminal = ChatChunk::finish(
            response.finish_reason.unwrap_or(FinishReason::Stop),
            response.usage,
        );
        Some([content, terminal])
    }

    fn usage(response: &ChatResponse) -> Option<Usage> {
        response.usage.clone()
    }

    fn metadata_mut(response: &mut ChatResponse) -> &mut ResponseMetadata {
        &mut response.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatMessage, MediaSource, ReasoningEffort, Tool};

    #[test]
    fn image_parts_and_schema_derive_capabilities() {
        let request = ChatRequest::new(vec![
            ChatMessage::user("what is this?")
                .with_part(ContentPart::image(MediaSource::url("https://x/cat.png"))),
        ])
        .with_response_format(ResponseFormat::JsonSchema {
            name: "answer".into(),
            schema: serde_json::json!({"type": "object"}),
            strict: true,
        })
        .with_reasoning(ReasoningEffort::High);

        let criteria = ChatEndpoint::derive_criteria(&request);
        for cap in [
            Capability::Chat,
            Capability::Vision,
            Capability::Structured,
            Capability::Reasoning,
        ] {
            assert!(criteria.required.contains(&cap), "missing {cap}");
        }
        assert!(!criteria.required.contains(&Capability::Tools));
        assert_eq!(criteria.operation, Some(Operation::Chat));
        assert_eq!(criteria.parameters, vec!["response_format".to_string()]);
    }

    #[test]
    fn tools_and_options_become_parameters() {
        let request = ChatRequest::new(vec![ChatMessage::user("hi")])
            .with_tools(vec![Tool::function("lookup", "Look something up")])
            .with_temperature(0.2)
            .with_max_tokens(64);
        let criteria = ChatEndpoint::derive_criteria(&request);
        assert!(criteria.required.contains(&Capability::Tools));
        for p in ["tools", "temperature", "max_tokens"] {
            assert!(criteria.parameters.iter().any(|x| x == p), "missing {p}");
        }
    }

    #[test]
    fn fold_concatenates_and_unions_tool_calls() {
        let mut state = ChatFold::default();
        let chunks = [
            ChatChunk::delta("Hel"),
            ChatChunk {
                tool_calls: vec![ToolCall::new("call_1", "lookup", "{\"q\":")],
                ..Default::default()
            },
            ChatChunk::delta("lo"),
            ChatChunk {
                tool_calls: vec![ToolCall::new("call_1", "", "\"rust\"}")],
                ..Default::default()
            },
            ChatChunk {
                finish_reason: Some(FinishReason::ToolCalls),
                usage: Some(Usage::new(3, 1)),
                ..Default::default()
            },
            ChatChunk {
                usage: Some(Usage::new(3, 5)),
                ..Default::default()
            },
        ];
        for chunk in &chunks {
            ChatEndpoint::fold(&mut state, chunk);
        }
        let response = ChatEndpoint::finish(state);
        assert_eq!(response.content, "Hello");
        assert_eq!(response.finish_reason, Some(FinishReason::ToolCalls));
        assert_eq!(response.usage, Some(Usage::new(3, 5)));
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].arguments, "{\"q\":\"rust\"}");
    }

    #[test]
    fn response_splits_into_content_and_terminal_chunk() {
        let response = ChatResponse::text("done").with_usage(Usage::new(1, 1));
        let [content, terminal] = ChatEndpoint::into_chunks(response).unwrap();
        assert_eq!(content.content.as_deref(), Some("done"));
        assert!(!content.is_terminal());
        assert_eq!(terminal.finish_reason, Some(FinishReason::Stop));
        assert_eq!(terminal.usage, Some(Usage::new(1, 1)));
    }

    #[test]
    fn estimate_counts_text_and_max_tokens() {
        let config = CoreConfig::default();
        let entry = ModelCatalogEntry::new("openai", "gpt-4o");
        let request = ChatRequest::new(vec![ChatMessage::user("12345678")]).with_max_tokens(100);
        let est = ChatEndpoint::estimate(&request, &entry, &config);
        assert_eq!(est.input_tokens, 2);
        assert_eq!(est.output_tokens, 100);
    }
}
