//! Correlation ids and the call-scoped correlation context.
//!
//! A [`CorrelationId`] identifies one logical request across every
//! asynchronous hop it takes. The id is carried explicitly in message and
//! HTTP headers under [`CORRELATION_ID_HEADER`], and restored on the
//! receiving side into an ambient context bound to the handling future:
//!
//! ```
//! use emissary_core::correlation::{self, CorrelationId};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let id = CorrelationId::from("req-42");
//!
//! let seen = correlation::scope(id.clone(), async { correlation::current() }).await;
//! assert_eq!(seen, Some(id));
//!
//! // Outside the scope nothing leaks.
//! assert_eq!(correlation::current(), None);
//! # }
//! ```
//!
//! The context is task-local, not thread-local: two unrelated requests whose
//! futures are interleaved on the same worker thread never observe each
//! other's id.

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Header key used for the correlation id on the bus and at the HTTP boundary.
pub const CORRELATION_ID_HEADER: &str = "Correlation-ID";

/// Opaque token identifying one logical request.
///
/// The value is kept verbatim; it is never normalized or trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Wraps an existing token.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generates a fresh random token (UUID v4).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the id, returning the raw token.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CorrelationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for CorrelationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

tokio::task_local! {
    static CURRENT: CorrelationId;
}

/// Runs `future` with `id` installed as the ambient correlation id.
///
/// The id is visible to [`current`] for every poll of `future` and gone as
/// soon as it completes. Nested scopes shadow the outer id.
pub async fn scope<F>(id: CorrelationId, future: F) -> F::Output
where
    F: Future,
{
    CURRENT.scope(id, future).await
}

/// Runs `future` inside [`scope`] when an id is present, or as-is otherwise.
pub async fn scope_opt<F>(id: Option<CorrelationId>, future: F) -> F::Output
where
    F: Future,
{
    match id {
        Some(id) => CURRENT.scope(id, future).await,
        None => future.await,
    }
}

/// Synchronous counterpart of [`scope`].
pub fn sync_scope<R>(id: CorrelationId, f: impl FnOnce() -> R) -> R {
    CURRENT.sync_scope(id, f)
}

/// Returns the ambient correlation id of the calling task, if any.
pub fn current() -> Option<CorrelationId> {
    CURRENT.try_with(CorrelationId::clone).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_generated_ids_are_unique_and_non_empty() {
        let a = CorrelationId::generate();
        let b = CorrelationId::generate();

        assert!(!a.as_str().is_empty());
        assert_ne!(a, b);
        assert!(Uuid::parse_str(a.as_str()).is_ok());
    }

    #[test]
    fn test_value_is_kept_verbatim() {
        let raw = "  Mixed-Case id with spaces  ";
        let id = CorrelationId::from(raw);

        assert_eq!(id.as_str(), raw);
        assert_eq!(id.to_string(), raw);
    }

    #[test]
    fn test_sync_scope() {
        assert_eq!(current(), None);

        let inside = sync_scope(CorrelationId::from("sync"), current);

        assert_eq!(inside, Some(CorrelationId::from("sync")));
        assert_eq!(current(), None);
    }

    #[tokio::test]
    async fn test_nested_scope_shadows_outer() {
        let outer = CorrelationId::from("outer");
        let inner = CorrelationId::from("inner");

        let (before, during, after) = scope(outer.clone(), async {
            let before = current();
            let during = scope(inner.clone(), async { current() }).await;
            (before, during, current())
        })
        .await;

        assert_eq!(before, Some(outer.clone()));
        assert_eq!(during, Some(inner));
        assert_eq!(after, Some(outer));
    }

    #[tokio::test]
    async fn test_scope_opt_without_id() {
        let seen = scope_opt(None, async { current() }).await;
        assert_eq!(seen, None);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_interleaved_requests_do_not_leak() {
        // Both futures run on the same thread and yield to each other.
        let first = scope(CorrelationId::from("first"), async {
            let mut seen = Vec::new();
            for _ in 0..3 {
                seen.push(current());
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            seen
        });
        let second = scope(CorrelationId::from("second"), async {
            let mut seen = Vec::new();
            for _ in 0..3 {
                seen.push(current());
                tokio::task::yield_now().await;
            }
            seen
        });

        let (a, b) = tokio::join!(first, second);

        assert!(a.iter().all(|id| id.as_ref().map(CorrelationId::as_str) == Some("first")));
        assert!(b.iter().all(|id| id.as_ref().map(CorrelationId::as_str) == Some("second")));
    }
}
