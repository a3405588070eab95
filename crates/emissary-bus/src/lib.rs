//! # Emissary Bus
//!
//! Asynchronous request/reply and publish substrate for Emissary.
//!
//! Workers never call each other directly; they exchange [`Message`]s on
//! named addresses through a [`MessageBus`]. Each message carries string
//! [`Headers`] and an opaque JSON body.
//!
//! ## Features
//!
//! - Request/reply with a bounded wait, fire-and-forget send, publish
//! - Consumers that serve several addresses from one task, one delivery at a time
//! - Exclusive (cluster-wide singleton) consumer registration
//! - Inbound/outbound interceptors, including correlation id propagation
//! - Multi-node clusters with wire-encoded forwarding and `local_only` delivery

pub mod bus;
pub mod delivery;
pub mod handler;
pub mod interceptor;
pub mod message;

// Re-exports
pub use bus::{BusConfig, ConsumerHandle, ConsumerOptions, MessageBus};
pub use delivery::Delivery;
pub use handler::MessageHandler;
pub use interceptor::{
    DeliveryContext, InboundCorrelationInterceptor, Interceptor, OutboundCorrelationInterceptor,
};
pub use message::{DeliveryOptions, Headers, Message};

/// Installs both correlation interceptors on `bus`.
pub fn install_correlation_interceptors(bus: &MessageBus) {
    bus.add_inbound_interceptor(InboundCorrelationInterceptor);
    bus.add_outbound_interceptor(OutboundCorrelationInterceptor);
}
