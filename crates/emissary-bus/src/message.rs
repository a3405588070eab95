//! Messages, headers and delivery options.

use std::time::Duration;

use emissary_core::{CORRELATION_ID_HEADER, CorrelationId, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ordered string headers carried alongside a message body.
///
/// Keys are matched exactly. Values are opaque and travel unchanged across
/// every hop, including hops to other nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(IndexMap<String, String>);

impl Headers {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Sets `name` to `value`, returning the previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(name.into(), value.into())
    }

    /// Removes `name`, keeping the order of the remaining headers.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.shift_remove(name)
    }

    /// Returns true if `name` is present.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Iterates headers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of headers.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no headers.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A message travelling on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    address: String,
    #[serde(default)]
    headers: Headers,
    body: Value,
}

impl Message {
    /// Creates a message without headers.
    pub fn new(address: impl Into<String>, body: Value) -> Self {
        Self {
            address: address.into(),
            headers: Headers::new(),
            body,
        }
    }

    /// Replaces the headers.
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// The address this message was sent to.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The message headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Mutable access to the headers.
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// The message body.
    pub fn body(&self) -> &Value {
        &self.body
    }

    pub(crate) fn body_mut(&mut self) -> &mut Value {
        &mut self.body
    }

    /// Consumes the message, returning the body.
    pub fn into_body(self) -> Value {
        self.body
    }

    /// The correlation id carried in the headers, if any.
    pub fn correlation_id(&self) -> Option<CorrelationId> {
        self.headers.get(CORRELATION_ID_HEADER).map(CorrelationId::from)
    }

    /// Encodes the message for transfer to another node.
    pub fn to_wire(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes a message received from another node.
    pub fn from_wire(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Sends the message through the wire codec, as a hop to another node would.
    pub(crate) fn over_wire(self) -> Result<Self> {
        Self::from_wire(&self.to_wire()?)
    }
}

/// Per-call delivery options.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use emissary_bus::DeliveryOptions;
///
/// let options = DeliveryOptions::new()
///     .header("max", "5")
///     .local_only(true)
///     .timeout(Duration::from_secs(2));
///
/// assert!(options.is_local_only());
/// assert_eq!(options.headers().get("max"), Some("5"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct DeliveryOptions {
    headers: Headers,
    local_only: bool,
    timeout: Option<Duration>,
}

impl DeliveryOptions {
    /// Creates default options: no headers, cluster-wide, bus default timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets an explicit correlation id header, taking precedence over the ambient one.
    pub fn correlation_id(self, id: &CorrelationId) -> Self {
        self.header(CORRELATION_ID_HEADER, id.as_str())
    }

    /// Restricts delivery to consumers on this node.
    pub fn local_only(mut self, local_only: bool) -> Self {
        self.local_only = local_only;
        self
    }

    /// Bounds the wait for a reply.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The headers to attach.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Whether delivery is restricted to this node.
    pub fn is_local_only(&self) -> bool {
        self.local_only
    }

    /// The reply timeout, if overridden.
    pub fn reply_timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_headers_keep_insertion_order() {
        let mut headers = Headers::new();
        headers.insert("b", "2");
        headers.insert("a", "1");
        headers.insert("c", "3");
        headers.remove("a");

        let keys: Vec<_> = headers.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "c"]);
    }

    #[test]
    fn test_wire_preserves_headers_byte_for_byte() {
        let raw = "ünïcode id / with spaces ";
        let message = Message::new("add.to.cache", json!({"name": "x"}))
            .with_headers(Headers::from_iter([(CORRELATION_ID_HEADER, raw)]));

        let decoded = message.clone().over_wire().unwrap();

        assert_eq!(decoded, message);
        assert_eq!(decoded.correlation_id().unwrap().as_str(), raw);
    }

    #[test]
    fn test_from_wire_rejects_garbage() {
        assert!(Message::from_wire(b"not json").is_err());
    }

    #[test]
    fn test_delivery_options_correlation_header() {
        let id = CorrelationId::from("abc");
        let options = DeliveryOptions::new().correlation_id(&id);

        assert_eq!(options.headers().get(CORRELATION_ID_HEADER), Some("abc"));
        assert!(!options.is_local_only());
        assert!(options.reply_timeout().is_none());
    }
}
