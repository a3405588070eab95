//! Consumer-side message handler trait.

use std::future::Future;

use async_trait::async_trait;

use crate::delivery::Delivery;

/// Handles deliveries for one consumer registration.
///
/// The bus gives each registration its own task and mailbox and calls
/// `handle` for one delivery at a time, awaiting it to completion before
/// taking the next. State owned by the handler therefore needs no locking.
///
/// # Example
///
/// ```ignore
/// use emissary_bus::{Delivery, MessageHandler};
///
/// struct Counter {
///     seen: u64,
/// }
///
/// #[async_trait]
/// impl MessageHandler for Counter {
///     async fn handle(&mut self, delivery: Delivery) {
///         self.seen += 1;
///         delivery.reply(serde_json::json!(self.seen));
///     }
/// }
/// ```
#[async_trait]
pub trait MessageHandler: Send + 'static {
    /// Processes one delivery.
    async fn handle(&mut self, delivery: Delivery);
}

#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: FnMut(Delivery) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&mut self, delivery: Delivery) {
        (self)(delivery).await
    }
}
