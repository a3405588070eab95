//! Metrics module for the Emissary server.

pub mod http;
pub mod setup;

pub use setup::{detached_handle, init_metrics};
