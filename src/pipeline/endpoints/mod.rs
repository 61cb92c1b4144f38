//! Endpoint families served by the pipeline.

pub mod audio;
pub mod chat;
pub mod embedding;
pub mod image;

pub use audio::{SpeechEndpoint, TranscriptionEndpoint};
pub use chat::ChatEndpoint;
pub use embedding::EmbeddingEndpoint;
pub use image::{ImageEditEndpoint, ImageEndpoint};
