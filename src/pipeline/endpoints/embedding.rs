//! Text embeddings.

use crate::config::CoreConfig;
use crate::pipeline::Endpoint;
use crate::pipeline::estimate::{InputTokens, priced, text_tokens};
use crate::provider::{EmbeddingOperation, ProviderOperations};
use crate::types::{
    Capability, EmbeddingRequest, EmbeddingResponse, ModelCatalogEntry, Operation,
    ResponseMetadata, SelectionCriteria, Usage, UsageEstimate,
};

/// Embeddings. A native stream yields batches of vectors; there is nothing to
/// synthesize a stream from.
pub struct EmbeddingEndpoint;

#[derive(Debug, Default)]
pub struct EmbeddingFold {
    embeddings: Vec<Vec<f32>>,
    usage: Option<Usage>,
}

impl Endpoint for EmbeddingEndpoint {
    type Request = EmbeddingRequest;
    type Response = EmbeddingResponse;
    type Chunk = EmbeddingResponse;
    type Fold = EmbeddingFold;

    const OPERATION: Operation = Operation::Embed;
    const BASE_CAPABILITY: Capability = Capability::Embedding;

    fn derive_criteria(request: &EmbeddingRequest) -> SelectionCriteria {
        let criteria = Self::base_criteria();
        if request.dimensions.is_some() {
            return criteria.require_parameter("dimensions");
        }
        criteria
    }

    fn estimate(
        request: &EmbeddingRequest,
        entry: &ModelCatalogEntry,
        config: &CoreConfig,
    ) -> UsageEstimate {
        let text = request.input.iter().map(|s| text_tokens(s, config)).sum();
        priced(InputTokens { text, audio: 0 }, 0, 0, entry, config)
    }

    fn operation(ops: &ProviderOperations) -> &EmbeddingOperation {
        &ops.embed
    }

    /// Batches are appended in order and their usage summed.
    fn fold(state: &mut EmbeddingFold, chunk: &EmbeddingResponse) {
        state.embeddings.extend(chunk.embeddings.iter().cloned());
        if let Some(usage) = &chunk.usage {
            state.usage.get_or_insert_with(Usage::default).add(usage);
        }
    }

    fn finish(state: EmbeddingFold) -> EmbeddingResponse {
        EmbeddingResponse {
            embeddings: state.embeddings,
            usage: state.usage,
            metadata: ResponseMetadata::default(),
        }
    }

    fn into_chunks(_response: EmbeddingResponse) -> Option<[EmbeddingResponse; 2]> {
        None
    }

    fn usage(response: &EmbeddingResponse) -> Option<Usage> {
        response.usage.clone()
    }

    fn metadata_mut(response: &mut EmbeddingResponse) -> &mut ResponseMetadata {
        &mut response.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batches_fold_in_order() {
        let mut state = EmbeddingFold::default();
        for (vector, usage) in [(vec![0.1f32], Usage::new(2, 0)), (vec![0.2], Usage::new(3, 0))] {
            EmbeddingEndpoint::fold(
                &mut state,
                &EmbeddingResponse {
                    embeddings: vec![vector],
                    usage: Some(usage),
                    ..Default::default()
                },
            );
        }
        let response = EmbeddingEndpoint::finish(state);
        assert_eq!(response.embeddings, vec![vec![0.1], vec![0.2]]);
        assert_eq!(response.usage, Some(Usage::new(5, 0)));
    }

    #[test]
    fn dimensions_become_a_parameter() {
        let criteria =
            EmbeddingEndpoint::derive_criteria(&EmbeddingRequest::single("hi").with_dimensions(256));
        assert_eq!(criteria.required, vec![Capability::Embedding]);
        assert_eq!(criteria.parameters, vec!["dimensions".to_string()]);
    }
}
