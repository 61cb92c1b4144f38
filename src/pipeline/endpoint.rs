//! Per-endpoint parameterization of the request pipeline.

use crate::config::CoreConfig;
use crate::provider::{OperationImpl, ProviderOperations};
use crate::types::{
    Capability, ModelCatalogEntry, Operation, ResponseMetadata, SelectionCriteria, Usage,
    UsageEstimate,
};

/// Everything the pipeline needs to know about one endpoint family.
///
/// Implementors are zero-sized markers; all methods are associated functions,
/// so `execute::<ChatEndpoint>` is monomorphized rather than dispatched
/// through a vtable.
pub trait Endpoint: Sized + Send + Sync + 'static {
    type Request: Send + 'static;
    type Response: Send + 'static;
    type Chunk: Send + 'static;
    /// Accumulator used while draining a stream.
    type Fold: Default + Send + 'static;

    const OPERATION: Operation;
    const BASE_CAPABILITY: Capability;

    /// Capabilities and parameters implied by the request content. The base
    /// capability and the operation are always included.
    fn derive_criteria(_request: &Self::Request) -> SelectionCriteria {
        Self::base_criteria()
    }

    fn base_criteria() -> SelectionCriteria {
        SelectionCriteria::new()
            .require(Self::BASE_CAPABILITY)
            .for_operation(Self::OPERATION)
    }

    fn estimate(
        request: &Self::Request,
        entry: &ModelCatalogEntry,
        config: &CoreConfig,
    ) -> UsageEstimate;

    fn operation(ops: &ProviderOperations) -> &OperationImpl<Self>;

    fn fold(state: &mut Self::Fold, chunk: &Self::Chunk);

    fn finish(state: Self::Fold) -> Self::Response;

    /// Split a complete response into one content chunk and one terminal
    /// chunk carrying the finish reason and usage. `None` when the family has
    /// no incremental form.
    fn into_chunks(response: Self::Response) -> Option<[Self::Chunk; 2]>;

    fn usage(response: &Self::Response) -> Option<Usage>;

    fn metadata_mut(response: &mut Self::Response) -> &mut ResponseMetadata;
}
