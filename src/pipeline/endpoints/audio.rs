//! Text-to-speech and speech-to-text.

use crate::config::CoreConfig;
use crate::pipeline::Endpoint;
use crate::pipeline::estimate::{InputTokens, media_tokens, priced, text_tokens};
use crate::provider::{ProviderOperations, SpeechOperation, TranscriptionOperation};
use crate::types::{
    Capability, FinishReason, ModelCatalogEntry, Operation, ResponseMetadata, SelectionCriteria,
    SpeechRequest, SpeechResponse, TranscriptionChunk, TranscriptionRequest,
    TranscriptionResponse, Usage, UsageEstimate,
};

/// Speech synthesis. A native stream yields audio segments as partial
/// [`SpeechResponse`]s; a stream is never synthesized from a single response.
pub struct SpeechEndpoint;

pub struct TranscriptionEndpoint;

#[derive(Debug, Default)]
pub struct SpeechFold {
    audio: Vec<u8>,
    format: String,
    usage: Option<Usage>,
}

impl Endpoint for SpeechEndpoint {
    type Request = SpeechRequest;
    type Response = SpeechResponse;
    type Chunk = SpeechResponse;
    type Fold = SpeechFold;

    const OPERATION: Operation = Operation::Speech;
    const BASE_CAPABILITY: Capability = Capability::Audio;

    fn derive_criteria(request: &SpeechRequest) -> SelectionCriteria {
        let mut criteria = Self::base_criteria();
        if request.voice.is_some() {
            criteria = criteria.require_parameter("voice");
        }
        if request.speed.is_some() {
            criteria = criteria.require_parameter("speed");
        }
        criteria
    }

    fn estimate(request: &SpeechRequest, entry: &ModelCatalogEntry, config: &CoreConfig) -> UsageEstimate {
        let input = InputTokens {
            text: text_tokens(&request.input, config),
            audio: 0,
        };
        priced(input, 0, 0, entry, config)
    }

    fn operation(ops: &ProviderOperations) -> &SpeechOperation {
        &ops.speech
    }

    fn fold(state: &mut SpeechFold, chunk: &SpeechResponse) {
        state.audio.extend_from_slice(&chunk.audio);
        if state.format.is_empty() {
            state.format = chunk.format.clone();
        }
        if chunk.usage.is_some() {
            state.usage = chunk.usage.clone();
        }
    }

    fn finish(state: SpeechFold) -> SpeechResponse {
        SpeechResponse {
            audio: state.audio,
            format: state.format,
            usage: state.usage,
            metadata: ResponseMetadata::default(),
        }
    }

    fn into_chunks(_response: SpeechResponse) -> Option<[SpeechResponse; 2]> {
        None
    }

    fn usage(response: &SpeechResponse) -> Option<Usage> {
        response.usage.clone()
    }

    fn metadata_mut(response: &mut SpeechResponse) -> &mut ResponseMetadata {
        &mut response.metadata
    }
}

#[derive(Debug, Default)]
pub struct TranscriptionFold {
    text: String,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
}

impl Endpoint for TranscriptionEndpoint {
    type Request = TranscriptionRequest;
    type Response = TranscriptionResponse;
    type Chunk = TranscriptionChunk;
    type Fold = TranscriptionFold;

    const OPERATION: Operation = Operation::Transcribe;
    const BASE_CAPABILITY: Capability = Capability::Hearing;

    fn derive_criteria(request: &TranscriptionRequest) -> SelectionCriteria {
        let mut criteria = Self::base_criteria();
        if request.language.is_some() {
            criteria = criteria.require_parameter("language");
        }
        criteria
    }

    fn estimate(
        request: &TranscriptionRequest,
        entry: &ModelCatalogEntry,
        config: &CoreConfig,
    ) -> UsageEstimate {
        let mut input = InputTokens {
            text: 0,
            audio: media_tokens(&request.audio, &config.token_estimation.audio),
        };
        if let Some(prompt) = &request.prompt {
            input.text += text_tokens(prompt, config);
        }
        priced(input, 0, 0, entry, config)
    }

    fn operation(ops: &ProviderOperations) -> &TranscriptionOperation {
        &ops.transcribe
    }

    fn fold(state: &mut TranscriptionFold, chunk: &TranscriptionChunk) {
        if let Some(text) = &chunk.text {
            state.text.push_str(text);
        }
        if chunk.finish_reason.is_some() {
            state.finish_reason = chunk.finish_reason.clone();
        }
        if chunk.usage.is_some() {
            state.usage = chunk.usage.clone();
        }
    }

    fn finish(state: TranscriptionFold) -> TranscriptionResponse {
        TranscriptionResponse {
            text: state.text,
            finish_reason: state.finish_reason,
            usage: state.usage,
            ..Default::default()
        }
    }

    fn into_chunks(response: TranscriptionResponse) -> Option<[TranscriptionChunk; 2]> {
        let content = TranscriptionChunk {
            text: Some(response.text),
            ..Default::default()
        };
        let terminal = TranscriptionChunk {
            text: None,
            finish_reason: Some(response.finish_reason.unwrap_or(FinishReason::Stop)),
            usage: response.usage,
        };
        Some([content, terminal])
    }

    fn usage(response: &TranscriptionResponse) -> Option<Usage> {
        response.usage.clone()
    }

    fn metadata_mut(response: &mut TranscriptionResponse) -> &mut ResponseMetadata {
        &mut response.metadata
    }
}
