//! Logging setup.
//!
//! The crate itself only emits `tracing` events under the `modelgate::*`
//! targets; installing a subscriber is left to the application. The helpers
//! in [`subscriber`] cover the common cases.

pub mod subscriber;

pub use subscriber::{
    OutputFormat, SubscriberConfig, SubscriberConfigBuilder, init_debug, init_default,
    init_from_env, init_subscriber,
};
