//! ProviderCapabilities structure

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::provider::ProviderOperations;
use crate::types::Operation;

/// How a provider can serve one endpoint family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSupport {
    /// Has a request/response implementation.
    pub get: bool,
    /// Has a native streaming implementation.
    pub stream: bool,
}

impl OperationSupport {
    pub fn any(&self) -> bool {
        self.get || self.stream
    }
}

/// Which operations a provider implements, derived from its
/// [`ProviderOperations`] and recomputed on every registry refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    pub operations: BTreeMap<Operation, OperationSupport>,
    pub model_listing: bool,
}

impl ProviderCapabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_operations(ops: &ProviderOperations) -> Self {
        let mut caps = Self::new();
        for op in Operation::ALL {
            let support = ops.support(op);
            if support.any() {
                caps.operations.insert(op, support);
            }
        }
        caps
    }

    pub fn with_operation(mut self, op: Operation, support: OperationSupport) -> Self {
        self.operations.insert(op, support);
        self
    }

    pub fn with_model_listing(mut self, enabled: bool) -> Self {
        self.model_listing = enabled;
        self
    }

    /// Whether the operation can be served in any mode. A streaming-only or
    /// get-only implementation is enough, the pipeline synthesizes the other.
    pub fn supports(&self, op: Operation) -> bool {
        self.operations.get(&op).is_some_and(OperationSupport::any)
    }

    pub fn supports_native_streaming(&self, op: Operation) -> bool {
        self.operations.get(&op).is_some_and(|s| s.stream)
    }

    pub fn supported_operations(&self) -> impl Iterator<Item = Operation> + '_ {
        self.operations
            .iter()
            .filter(|(_, s)| s.any())
            .map(|(op, _)| *op)
    }
}
