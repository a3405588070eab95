//! Entity transformations applied before an entity is cached.

pub mod builtins;
pub mod chain;

use async_trait::async_trait;
use emissary_core::SharedEntity;
use thiserror::Error;

pub use builtins::{Identity, RandomAgeOffset, UppercaseName};
pub use chain::TransformationChain;

/// Why a transformation refused an entity.
#[derive(Debug, Error)]
pub enum TransformError {
    /// A field the transformation works on holds an unexpected type.
    #[error("field '{field}' must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },

    /// A computed value does not fit the field.
    #[error("field '{field}' overflowed")]
    Overflow { field: &'static str },

    #[error("{0}")]
    Other(String),
}

impl TransformError {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

/// An in-place entity mutator.
///
/// All members of a chain run concurrently against the same entity. By
/// convention each transformation touches its own fields only; two members
/// writing the same field race.
///
/// # Example
///
/// ```ignore
/// use emissary_cache::{TransformError, Transformation};
///
/// struct Stamp;
///
/// #[async_trait]
/// impl Transformation for Stamp {
///     fn name(&self) -> &str {
///         "stamp"
///     }
///
///     async fn apply(&self, entity: &SharedEntity) -> Result<(), TransformError> {
///         entity.with_mut(|e| e.insert("stamped".into(), true.into()));
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Transformation: Send + Sync + 'static {
    /// Identifier used in logs, metrics and failure messages.
    fn name(&self) -> &str;

    /// Mutates `entity` in place.
    ///
    /// Mutations made before an error is returned are not rolled back.
    async fn apply(&self, entity: &SharedEntity) -> Result<(), TransformError>;
}
