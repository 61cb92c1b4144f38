//! Core data types: catalog entries, criteria, usage and per-endpoint
//! request/response/chunk shapes.

pub mod audio;
pub mod capability;
pub mod catalog;
pub mod chat;
pub mod common;
pub mod criteria;
pub mod embedding;
pub mod image;
pub mod usage;

pub use audio::*;
pub use capability::{Capability, ModelTier, Operation};
pub use catalog::{
    ModelCatalogEntry, ModelMetrics, Pricing, QUALIFIED_SEPARATOR, merge_entries, qualified_key,
};
pub use chat::*;
pub use common::{FinishReason, ResponseMetadata};
pub use criteria::{ProviderFilter, ScoringWeights, SelectionCriteria};
pub use embedding::*;
pub use image::*;
pub use usage::{RequestUsage, Usage, UsageEstimate};
