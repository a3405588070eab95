//! Test helpers para emissary-server.

#![allow(dead_code, unused_imports)]

pub mod client;
pub mod plugins;

pub use client::{TestClient, TestResponse, client, client_with};
pub use plugins::registry;
