//! Deliveries handed to consumers, and the replies they send back.

use emissary_core::{CorrelationId, EmissaryError, Result, correlation};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::bus::MessageBus;
use crate::message::{Headers, Message};

/// Channel on which a requester waits for its reply.
pub(crate) type ReplySender = oneshot::Sender<Result<Message>>;

/// What travels through a consumer mailbox.
pub(crate) struct Envelope {
    pub(crate) message: Message,
    pub(crate) reply: Option<ReplySender>,
    /// Set when the message crossed from another node.
    pub(crate) remote: bool,
}

/// A message delivered to a consumer.
///
/// A delivery that expects a reply must be answered with [`reply`](Self::reply)
/// or [`fail`](Self::fail). Dropping it unanswered is reported to the
/// requester as a lost reply.
pub struct Delivery {
    message: Message,
    correlation: Option<CorrelationId>,
    reply: Option<ReplySender>,
    remote: bool,
    bus: MessageBus,
}

impl Delivery {
    pub(crate) fn new(
        message: Message,
        correlation: Option<CorrelationId>,
        reply: Option<ReplySender>,
        remote: bool,
        bus: MessageBus,
    ) -> Self {
        Self {
            message,
            correlation,
            reply,
            remote,
            bus,
        }
    }

    /// The address the message was sent to.
    pub fn address(&self) -> &str {
        self.message.address()
    }

    /// The message headers.
    pub fn headers(&self) -> &Headers {
        self.message.headers()
    }

    /// The message body.
    pub fn body(&self) -> &Value {
        self.message.body()
    }

    /// The full message.
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Takes the body out of the message, leaving `null` behind.
    pub fn take_body(&mut self) -> Value {
        std::mem::take(self.message.body_mut())
    }

    /// The correlation id restored by the inbound interceptors.
    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        self.correlation.as_ref()
    }

    /// Whether the sender is waiting for a reply.
    pub fn expects_reply(&self) -> bool {
        self.reply.is_some()
    }

    /// Whether the message arrived from another node.
    pub fn is_remote(&self) -> bool {
        self.remote
    }

    /// Replies with a body.
    pub fn reply(self, body: Value) {
        self.reply_with(body, Headers::new());
    }

    /// Replies with a body and headers.
    ///
    /// The reply goes through this node's outbound interceptors with the
    /// delivery's correlation id as the ambient one.
    pub fn reply_with(mut self, body: Value, headers: Headers) {
        let Some(sender) = self.reply.take() else {
            debug!(address = %self.address(), "Reply dropped, sender did not wait for one");
            return;
        };

        let mut reply = Message::new(self.message.address(), body).with_headers(headers);
        let ambient = self.correlation.clone().or_else(correlation::current);
        self.bus.run_outbound(&mut reply, ambient);

        let reply = if self.remote {
            reply.over_wire()
        } else {
            Ok(reply)
        };

        if sender.send(reply).is_err() {
            debug!(address = %self.message.address(), "Requester stopped waiting for reply");
        }
    }

    /// Replies with a failure carrying an HTTP-like status code.
    pub fn fail(mut self, code: u16, message: impl Into<String>) {
        let Some(sender) = self.reply.take() else {
            return;
        };

        if sender
            .send(Err(EmissaryError::recipient_failure(code, message)))
            .is_err()
        {
            debug!(address = %self.message.address(), "Requester stopped waiting for failure");
        }
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("message", &self.message)
            .field("correlation", &self.correlation)
            .field("expects_reply", &self.reply.is_some())
            .field("remote", &self.remote)
            .finish()
    }
}
