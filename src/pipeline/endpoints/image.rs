//! Image generation and image editing.
//!
//! Both families share the response and chunk shapes, so they share the
//! fold as well.

use crate::config::CoreConfig;
use crate::pipeline::Endpoint;
use crate::pipeline::estimate::{InputTokens, media_tokens, priced, text_tokens};
use crate::provider::{ImageEditOperation, ImageOperation, ProviderOperations};
use crate::types::{
    Capability, FinishReason, GeneratedImage, ImageChunk, ImageEditRequest, ImageRequest,
    ImageResponse, ModelCatalogEntry, Operation, ResponseMetadata, SelectionCriteria, Usage,
    UsageEstimate,
};

pub struct ImageEndpoint;

pub struct ImageEditEndpoint;

#[derive(Debug, Default)]
pub struct ImageFold {
    images: Vec<GeneratedImage>,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
}

fn fold_image(state: &mut ImageFold, chunk: &ImageChunk) {
    if !chunk.partial {
        state.images.extend(chunk.images.iter().cloned());
    }
    if chunk.finish_reason.is_some() {
        state.finish_reason = chunk.finish_reason.clone();
    }
    if chunk.usage.is_some() {
        state.usage = chunk.usage.clone();
    }
}

fn finish_image(state: ImageFold) -> ImageResponse {
    ImageResponse {
        images: state.images,
        finish_reason: state.finish_reason,
        usage: state.usage,
        metadata: ResponseMetadata::default(),
    }
}

fn split_image(response: ImageResponse) -> [ImageChunk; 2] {
    let content = ImageChunk {
        images: response.images,
        ..Default::default()
    };
    let terminal = ImageChunk {
        finish_reason: Some(response.finish_reason.unwrap_or(FinishReason::Stop)),
        usage: response.usage,
        ..Default::default()
    };
    [content, terminal]
}

fn with_size(mut criteria: SelectionCriteria, size: &Option<String>) -> SelectionCriteria {
    if size.is_some() {
        criteria = criteria.require_parameter("size");
    }
    criteria
}

impl Endpoint for ImageEndpoint {
    type Request = ImageRequest;
    type Response = ImageResponse;
    type Chunk = ImageChunk;
    type Fold = ImageFold;

    const OPERATION: Operation = Operation::Image;
    const BASE_CAPABILITY: Capability = Capability::Image;

    fn derive_criteria(request: &ImageRequest) -> SelectionCriteria {
        let mut criteria = with_size(Self::base_criteria(), &request.size);
        if request.quality.is_some() {
            criteria = criteria.require_parameter("quality");
        }
        criteria
    }

    fn estimate(request: &ImageRequest, entry: &ModelCatalogEntry, config: &CoreConfig) -> UsageEstimate {
        let input = InputTokens {
            text: text_tokens(&request.prompt, config),
            audio: 0,
        };
        priced(input, 0, request.n, entry, config)
    }

    fn operation(ops: &ProviderOperations) -> &ImageOperation {
        &ops.image
    }

    fn fold(state: &mut ImageFold, chunk: &ImageChunk) {
        fold_image(state, chunk);
    }

    fn finish(state: ImageFold) -> ImageResponse {
        finish_image(state)
    }

    fn into_chunks(response: ImageResponse) -> Option<[ImageChunk; 2]> {
        Some(split_image(response))
    }

    fn usage(response: &ImageResponse) -> Option<Usage> {
        response.usage.clone()
    }

    fn metadata_mut(response: &mut ImageResponse) -> &mut ResponseMetadata {
        &mut response.metadata
    }
}

impl Endpoint for ImageEditEndpoint {
    type Request = ImageEditRequest;
    type Response = ImageResponse;
    type Chunk = ImageChunk;
    type Fold = ImageFold;

    const OPERATION: Operation = Operation::ImageEdit;
    const BASE_CAPABILITY: Capability = Capability::Image;

    fn derive_criteria(request: &ImageEditRequest) -> SelectionCriteria {
        let mut criteria = with_size(Self::base_criteria(), &request.size);
        if request.mask.is_some() {
            criteria = criteria.require_parameter("mask");
        }
        criteria
    }

    fn estimate(
        request: &ImageEditRequest,
        entry: &ModelCatalogEntry,
        config: &CoreConfig,
    ) -> UsageEstimate {
        let image = &config.token_estimation.image;
        let mut text = text_tokens(&request.prompt, config) + media_tokens(&request.image, image);
        if let Some(mask) = &request.mask {
            text += media_tokens(mask, image);
        }
        priced(InputTokens { text, audio: 0 }, 0, request.n, entry, config)
    }

    fn operation(ops: &ProviderOperations) -> &ImageEditOperation {
        &ops.image_edit
    }

    fn fold(state: &mut ImageFold, chunk: &ImageChunk) {
        fold_image(state, chunk);
    }

    fn finish(state: ImageFold) -> ImageResponse {
        finish_image(state)
    }

    fn into_chunks(response: ImageResponse) -> Option<[ImageChunk; 2]> {
        Some(split_image(response))
    }

    fn usage(response: &ImageResponse) -> Option<Usage> {
        response.usage.clone()
    }

    fn metadata_mut(response: &mut ImageResponse) -> &mut ResponseMetadata {
        &mut response.metadata
    }
}
