//! Error types for Emissary.
//!
//! This module defines the error hierarchy used throughout the system.
//! All errors implement `std::error::Error` via `thiserror`.
//!
//! # Error classes
//!
//! - **Startup fatal**: no cache backend could be resolved. The cache worker
//!   never becomes ready.
//! - **Transformation**: a member of the transformation chain failed. Nothing
//!   is committed to the cache.
//! - **Channel**: the message bus could not deliver a request or the reply
//!   did not arrive in time. These are retriable and must stay distinguishable
//!   from transformation failures.
//! - Eviction is never an error.
//!
//! # Example
//!
//! ```
//! use emissary_core::{EmissaryError, Result};
//!
//! fn deliver(address: &str) -> Result<()> {
//!     Err(EmissaryError::no_handlers(address))
//! }
//!
//! let err = deliver("add.to.cache").unwrap_err();
//! assert!(err.is_channel_failure());
//! assert!(err.is_transient());
//! ```

use thiserror::Error;

/// Main error type for Emissary operations.
#[derive(Debug, Error)]
pub enum EmissaryError {
    /// The process cannot reach a serving state (missing or unknown plugin).
    #[error("startup failed: {reason}")]
    StartupFatal {
        /// Why startup could not complete
        reason: String,
    },

    /// A transformation in the chain failed; the entity was not committed.
    #[error("transformation '{name}' failed: {message}")]
    Transformation {
        /// Name of the failing transformation
        name: String,
        /// Underlying cause text
        message: String,
    },

    /// No consumer is registered (or reachable) for the address.
    #[error("no handlers registered for address '{address}'")]
    NoHandlers {
        /// Target address
        address: String,
    },

    /// The reply did not arrive within the allowed time.
    #[error("reply from '{address}' timed out after {millis}ms")]
    Timeout {
        /// Target address
        address: String,
        /// Elapsed bound in milliseconds
        millis: u64,
    },

    /// The consumer went away without replying.
    #[error("reply from '{address}' was lost")]
    ReplyLost {
        /// Target address
        address: String,
    },

    /// An exclusive consumer could not be registered.
    #[error("address '{address}' already has a consumer")]
    AddressInUse {
        /// Contested address
        address: String,
    },

    /// The recipient explicitly replied with a failure.
    #[error("recipient failure ({code}): {message}")]
    RecipientFailure {
        /// HTTP-like status code chosen by the recipient
        code: u16,
        /// Failure description
        message: String,
    },

    /// A message header carried an unusable value.
    #[error("invalid header '{name}': {reason}")]
    InvalidHeader {
        /// Header name
        name: String,
        /// Why the value was rejected
        reason: String,
    },

    /// The supplied payload is not a structured entity.
    #[error("invalid entity: {0}")]
    InvalidEntity(String),

    /// Wire encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EmissaryError {
    // ============================================
    // Convenience constructors
    // ============================================

    /// Creates a StartupFatal error.
    pub fn startup_fatal(reason: impl Into<String>) -> Self {
        Self::StartupFatal {
            reason: reason.into(),
        }
    }

    /// Creates a Transformation error.
    pub fn transformation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transformation {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates a NoHandlers error.
    pub fn no_handlers(address: impl Into<String>) -> Self {
        Self::NoHandlers {
            address: address.into(),
        }
    }

    /// Creates a Timeout error.
    pub fn timeout(address: impl Into<String>, millis: u64) -> Self {
        Self::Timeout {
            address: address.into(),
            millis,
        }
    }

    /// Creates a ReplyLost error.
    pub fn reply_lost(address: impl Into<String>) -> Self {
        Self::ReplyLost {
            address: address.into(),
        }
    }

    /// Creates an AddressInUse error.
    pub fn address_in_use(address: impl Into<String>) -> Self {
        Self::AddressInUse {
            address: address.into(),
        }
    }

    /// Creates a RecipientFailure error.
    pub fn recipient_failure(code: u16, message: impl Into<String>) -> Self {
        Self::RecipientFailure {
            code,
            message: message.into(),
        }
    }

    /// Creates an InvalidHeader error.
    pub fn invalid_header(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidHeader {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates an Internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================
    // Query methods
    // ============================================

    /// Returns true if the failure happened on the message channel itself.
    pub fn is_channel_failure(&self) -> bool {
        matches!(
            self,
            Self::NoHandlers { .. } | Self::Timeout { .. } | Self::ReplyLost { .. }
        )
    }

    /// Returns true if retrying the same request might succeed.
    pub fn is_transient(&self) -> bool {
        self.is_channel_failure()
    }

    /// Returns true if this error prevents the process from serving.
    pub fn is_startup_fatal(&self) -> bool {
        matches!(self, Self::StartupFatal { .. })
    }

    /// Returns true if a transformation rejected the entity.
    pub fn is_transformation_failure(&self) -> bool {
        matches!(self, Self::Transformation { .. })
    }
}

/// Type alias for Results with EmissaryError.
pub type Result<T> = std::result::Result<T, EmissaryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transformation_display() {
        let error = EmissaryError::transformation("random-age", "age is not an integer");
        assert_eq!(
            error.to_string(),
            "transformation 'random-age' failed: age is not an integer"
        );
        assert!(error.is_transformation_failure());
    }

    #[test]
    fn test_channel_failures_are_transient() {
        assert!(EmissaryError::timeout("add.to.cache", 5000).is_transient());
        assert!(EmissaryError::no_handlers("add.to.cache").is_transient());
        assert!(EmissaryError::reply_lost("add.to.cache").is_transient());
    }

    #[test]
    fn test_recipient_failure_is_not_a_channel_failure() {
        let error = EmissaryError::recipient_failure(500, "transformation 'x' failed: boom");

        assert!(!error.is_channel_failure());
        assert!(!error.is_transient());
        assert!(error.to_string().contains("boom"));
    }

    #[test]
    fn test_startup_fatal() {
        let error = EmissaryError::startup_fatal("no CacheBackend entry in plugin manifest");

        assert!(error.is_startup_fatal());
        assert!(!error.is_transient());
    }

    #[test]
    fn test_codec_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{nope").unwrap_err();
        let error: EmissaryError = json_error.into();

        assert!(matches!(error, EmissaryError::Codec(_)));
    }

    #[test]
    fn test_result_with_question_mark() {
        fn inner() -> Result<()> {
            Err(EmissaryError::internal("test"))
        }

        fn outer() -> Result<String> {
            inner()?;
            Ok("success".into())
        }

        assert!(outer().is_err());
    }
}
