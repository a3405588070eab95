//! Delivery interceptors.
//!
//! Interceptors run on every hop: outbound ones before a message (request,
//! publish or reply) leaves a node, inbound ones before a message reaches
//! its handler. The two correlation interceptors together keep a request's
//! [`CorrelationId`] coherent across the bus:
//!
//! - [`OutboundCorrelationInterceptor`] copies the ambient id into the
//!   `Correlation-ID` header.
//! - [`InboundCorrelationInterceptor`] copies the header back into the
//!   ambient slot, which the consumer installs for the handler's duration.

use emissary_core::{CORRELATION_ID_HEADER, CorrelationId};

use crate::message::Message;

/// What an interceptor sees of a delivery.
pub struct DeliveryContext<'a> {
    message: &'a mut Message,
    ambient: &'a mut Option<CorrelationId>,
}

impl<'a> DeliveryContext<'a> {
    /// Creates a context over a message and its ambient correlation slot.
    pub fn new(message: &'a mut Message, ambient: &'a mut Option<CorrelationId>) -> Self {
        Self { message, ambient }
    }

    /// The message being delivered.
    pub fn message(&self) -> &Message {
        self.message
    }

    /// Mutable access to the message.
    pub fn message_mut(&mut self) -> &mut Message {
        self.message
    }

    /// The ambient correlation id for this hop.
    ///
    /// Outbound: the sender's id. Inbound: the id the handler will run with.
    pub fn ambient(&self) -> Option<&CorrelationId> {
        self.ambient.as_ref()
    }

    /// Replaces the ambient correlation id for this hop.
    pub fn set_ambient(&mut self, id: CorrelationId) {
        *self.ambient = Some(id);
    }
}

/// A hook run on every delivery in one direction.
pub trait Interceptor: Send + Sync + 'static {
    /// Inspects or rewrites the delivery.
    fn handle(&self, ctx: &mut DeliveryContext<'_>);
}

impl<F> Interceptor for F
where
    F: Fn(&mut DeliveryContext<'_>) + Send + Sync + 'static,
{
    fn handle(&self, ctx: &mut DeliveryContext<'_>) {
        self(ctx)
    }
}

/// Adds the ambient correlation id to outgoing message headers.
///
/// A header set explicitly by the sender is left untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutboundCorrelationInterceptor;

impl Interceptor for OutboundCorrelationInterceptor {
    fn handle(&self, ctx: &mut DeliveryContext<'_>) {
        let Some(id) = ctx.ambient().cloned() else {
            return;
        };

        let headers = ctx.message_mut().headers_mut();
        if !headers.contains(CORRELATION_ID_HEADER) {
            headers.insert(CORRELATION_ID_HEADER, id.into_inner());
        }
    }
}

/// Restores the correlation id from incoming message headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct InboundCorrelationInterceptor;

impl Interceptor for InboundCorrelationInterceptor {
    fn handle(&self, ctx: &mut DeliveryContext<'_>) {
        if let Some(id) = ctx.message().correlation_id() {
            ctx.set_ambient(id);
        }
    }
}
