//! # Emissary Server
//!
//! HTTP front-end for the Emissary cache service, built on Axum.
//!
//! Handlers never touch the cache directly: every operation is a request
//! on the message bus to the single cache worker, carrying the HTTP
//! request's correlation id.
//!
//! ## Routes
//!
//! | Method | Path | Bus address |
//! |--------|------|-------------|
//! | `POST` | `/api` | `add.to.cache` |
//! | `GET` | `/api` | `retrieve.from.cache` (local only, `Limit-Entities` → `max`) |
//! | `GET` | `/api/{key}` | `get.from.cache` |
//! | `GET` | `/alive`, `/health` | |
//! | `GET` | `/metrics` | |

pub mod app;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod server;
pub mod settings;
pub mod state;

pub use app::{Application, StartupError};
pub use error::AppError;
pub use server::{create_router_with_state, run_server_with_state, serve};
pub use settings::Settings;
pub use state::AppState;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_defined() {
        assert!(!version().is_empty());
    }
}
