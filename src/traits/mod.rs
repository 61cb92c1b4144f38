//! Traits implemented by provider adapters and catalog sources.

pub mod capabilities;
pub mod model_source;
pub mod provider;

pub use capabilities::{OperationSupport, ProviderCapabilities};
pub use model_source::ModelSource;
pub use provider::ProviderAdapter;
