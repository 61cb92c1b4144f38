//! Utilities shared by adapters and the pipeline.

pub mod cancel;

pub use cancel::{CancelHandle, abort_on_cancel};
