//! Emissary Core - Domain types, correlation context and errors
//!
//! This crate provides the foundational types shared by the message bus,
//! the cache worker and the HTTP front-end:
//!
//! - [`Entity`] and [`CacheEntry`]: the records flowing through the cache
//! - [`CorrelationId`] and the call-scoped [`correlation`] context
//! - [`EmissaryError`]: the error taxonomy used across every crate

pub mod correlation;
pub mod entity;
pub mod error;

pub use correlation::{CORRELATION_ID_HEADER, CorrelationId};
pub use entity::{CacheEntry, Entity, SharedEntity, entity_from_value};
pub use error::{EmissaryError, Result};

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

    #[test]
    fn version_is_semver() {
        let v = version();
        assert_eq!(v.split('.').count(), 3, "Version should be semver");
    }
}
