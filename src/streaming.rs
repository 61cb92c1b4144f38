//! Stream types shared by every endpoint family.

use futures::Stream;
use std::pin::Pin;

use crate::error::LlmError;

/// A pinned, boxed stream of chunks.
///
/// Every streaming dispatch target returns this type, and the pipeline hands
/// the same shape back to the caller.
pub type ChunkStream<T> = Pin<Box<dyn Stream<Item = Result<T, LlmError>> + Send>>;

/// Box any `Send` stream into a [`ChunkStream`].
pub fn boxed<T, S>(stream: S) -> ChunkStream<T>
where
    S: Stream<Item = Result<T, LlmError>> + Send + 'static,
{
    Box::pin(stream)
}

/// A stream that yields the given items in order.
pub fn from_results<T>(items: Vec<Result<T, LlmError>>) -> ChunkStream<T>
where
    T: Send + 'static,
{
    Box::pin(futures::stream::iter(items))
}
