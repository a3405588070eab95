//! The message bus.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use emissary_core::{CorrelationId, EmissaryError, Result, correlation};
use metrics::counter;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{Instrument, debug, debug_span, warn};

use crate::delivery::{Delivery, Envelope};
use crate::handler::MessageHandler;
use crate::interceptor::{DeliveryContext, Interceptor};
use crate::message::{DeliveryOptions, Message};

/// Configuration for a bus node.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Identifier of this node within a cluster.
    pub node_id: String,
    /// Default bound on reply waits.
    pub request_timeout: Duration,
    /// Default mailbox size for consumer registrations.
    pub mailbox_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            node_id: uuid::Uuid::new_v4().to_string(),
            request_timeout: Duration::from_secs(30),
            mailbox_capacity: 1024,
        }
    }
}

/// Options for a consumer registration.
#[derive(Debug, Clone, Default)]
pub struct ConsumerOptions {
    /// Only reachable from this node.
    pub local_only: bool,
    /// Refuse registration if any node already consumes one of the addresses.
    pub exclusive: bool,
    /// Mailbox size, defaults to the bus setting.
    pub mailbox_capacity: Option<usize>,
}

impl ConsumerOptions {
    /// A consumer only reachable from this node.
    pub fn local() -> Self {
        Self {
            local_only: true,
            ..Self::default()
        }
    }

    /// Marks the registration as the single consumer of its addresses cluster-wide.
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }
}

#[derive(Clone)]
struct Registration {
    id: u64,
    local_only: bool,
    mailbox: mpsc::Sender<Envelope>,
}

struct Target {
    mailbox: mpsc::Sender<Envelope>,
    remote: bool,
}

/// Owner of an exclusive address: a registration on one node instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Claim {
    node: u64,
    registration: u64,
}

/// Exclusive addresses of a cluster. Joined nodes share one table.
#[derive(Default)]
struct ClaimTable {
    owners: HashMap<String, Claim>,
    /// Set once the table has been merged into another one at join.
    retired: bool,
}

type SharedClaims = Arc<Mutex<ClaimTable>>;

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// Serializes joins so claim tables are merged one pair at a time.
static JOIN_LOCK: Mutex<()> = Mutex::new(());

struct BusInner {
    config: BusConfig,
    instance: u64,
    claims: RwLock<SharedClaims>,
    consumers: RwLock<HashMap<String, Vec<Registration>>>,
    inbound: RwLock<Vec<Arc<dyn Interceptor>>>,
    outbound: RwLock<Vec<Arc<dyn Interceptor>>>,
    peers: RwLock<Vec<Weak<BusInner>>>,
    next_id: AtomicU64,
    cursor: AtomicUsize,
}

impl Drop for BusInner {
    fn drop(&mut self) {
        let instance = self.instance;
        self.with_claims(|claims| claims.owners.retain(|_, claim| claim.node != instance));
    }
}

impl BusInner {
    /// Picks one consumer for `address`, round robin.
    fn pick(&self, address: &str, include_local_only: bool) -> Option<mpsc::Sender<Envelope>> {
        let consumers = self.consumers.read();
        let candidates: Vec<&Registration> = consumers
            .get(address)?
            .iter()
            .filter(|r| include_local_only || !r.local_only)
            .collect();

        if candidates.is_empty() {
            return None;
        }

        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % candidates.len();
        Some(candidates[index].mailbox.clone())
    }

    fn all(&self, address: &str, include_local_only: bool) -> Vec<mpsc::Sender<Envelope>> {
        self.consumers
            .read()
            .get(address)
            .map(|registrations| {
                registrations
                    .iter()
                    .filter(|r| include_local_only || !r.local_only)
                    .map(|r| r.mailbox.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn has_consumer(&self, address: &str) -> bool {
        self.consumers
            .read()
            .get(address)
            .is_some_and(|registrations| !registrations.is_empty())
    }

    fn register(&self, addresses: &[&str], registration: &Registration) {
        let mut consumers = self.consumers.write();
        for address in addresses {
            consumers
                .entry((*address).to_string())
                .or_default()
                .push(registration.clone());
        }
    }

    fn unregister(&self, id: u64) {
        {
            let mut consumers = self.consumers.write();
            for registrations in consumers.values_mut() {
                registrations.retain(|r| r.id != id);
            }
            consumers.retain(|_, registrations| !registrations.is_empty());
        }

        let instance = self.instance;
        self.with_claims(|claims| {
            claims
                .owners
                .retain(|_, claim| !(claim.node == instance && claim.registration == id));
        });
    }

    /// Runs `f` on the cluster claim table, holding its lock.
    ///
    /// Never called with `consumers` write-locked.
    fn with_claims<R>(&self, f: impl FnOnce(&mut ClaimTable) -> R) -> R {
        loop {
            let table = Arc::clone(&self.claims.read());
            let mut guard = table.lock();
            if guard.retired {
                continue;
            }
            return f(&mut guard);
        }
    }

    /// This node and every node reachable through peers.
    fn cluster(self: &Arc<Self>) -> Vec<Arc<BusInner>> {
        let mut seen = vec![Arc::clone(self)];
        let mut index = 0;
        while index < seen.len() {
            let peers: Vec<Arc<BusInner>> = seen[index]
                .peers
                .read()
                .iter()
                .filter_map(Weak::upgrade)
                .collect();
            for peer in peers {
                if !seen.iter().any(|n| Arc::ptr_eq(n, &peer)) {
                    seen.push(peer);
                }
            }
            index += 1;
        }
        seen
    }

    fn is_registered(&self, id: u64) -> bool {
        self.consumers
            .read()
            .values()
            .any(|registrations| registrations.iter().any(|r| r.id == id))
    }
}

/// An asynchronous message bus node.
///
/// The bus connects senders and consumers through named addresses. It is
/// cheap to clone; every clone refers to the same node. Nodes can be
/// [`join`](Self::join)ed into a cluster, in which case messages for an
/// address with no local consumer are forwarded, encoded on the wire, to a
/// peer that has one.
///
/// # Example
///
/// ```no_run
/// use emissary_bus::{ConsumerOptions, Delivery, DeliveryOptions, MessageBus};
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> emissary_core::Result<()> {
/// let bus = MessageBus::with_defaults();
///
/// bus.consumer(
///     &["echo"],
///     |delivery: Delivery| async move {
///         let body = delivery.body().clone();
///         delivery.reply(body);
///     },
///     ConsumerOptions::default(),
/// )?;
///
/// let reply = bus.request("echo", json!("hi"), DeliveryOptions::new()).await?;
/// assert_eq!(reply.body(), &json!("hi"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

impl MessageBus {
    /// Creates a bus node with the given configuration.
    pub fn new(config: BusConfig) -> Self {
        Self {
            inner: Arc::new(BusInner {
                config,
                instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
                claims: RwLock::new(SharedClaims::default()),
                consumers: RwLock::new(HashMap::new()),
                inbound: RwLock::new(Vec::new()),
                outbound: RwLock::new(Vec::new()),
                peers: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
                cursor: AtomicUsize::new(0),
            }),
        }
    }

    /// Creates a bus node with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(BusConfig::default())
    }

    /// Returns this node's identifier.
    pub fn node_id(&self) -> &str {
        &self.inner.config.node_id
    }

    /// Returns the default reply timeout.
    pub fn request_timeout(&self) -> Duration {
        self.inner.config.request_timeout
    }

    /// Adds an interceptor run before each message reaches a handler on this node.
    pub fn add_inbound_interceptor(&self, interceptor: impl Interceptor) {
        self.inner.inbound.write().push(Arc::new(interceptor));
    }

    /// Adds an interceptor run before each message leaves this node.
    pub fn add_outbound_interceptor(&self, interceptor: impl Interceptor) {
        self.inner.outbound.write().push(Arc::new(interceptor));
    }

    /// Links this node and `other` into the same cluster.
    ///
    /// Both sides end up sharing one table of exclusive addresses.
    pub fn join(&self, other: &MessageBus) {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return;
        }
        let _serial = JOIN_LOCK.lock();
        link(&self.inner, &other.inner);
        link(&other.inner, &self.inner);
        merge_claims(&self.inner, &other.inner);
    }

    /// Returns the live peers of this node.
    pub fn peers(&self) -> Vec<MessageBus> {
        self.inner
            .peers
            .read()
            .iter()
            .filter_map(Weak::upgrade)
            .map(|inner| MessageBus { inner })
            .collect()
    }

    /// Returns true if a consumer on this node listens on `address`.
    pub fn has_local_consumer(&self, address: &str) -> bool {
        self.inner.has_consumer(address)
    }

    /// Returns true if a consumer anywhere in the cluster listens on `address`.
    pub fn has_consumer_in_cluster(&self, address: &str) -> bool {
        self.has_local_consumer(address) || self.peers().iter().any(|p| p.has_local_consumer(address))
    }

    /// Registers `handler` on one or more addresses.
    ///
    /// All addresses share one mailbox and one task: deliveries are handled
    /// strictly one after another, whichever address they arrive on. Each
    /// handler call runs inside the correlation scope restored by the
    /// inbound interceptors.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn consumer<H>(
        &self,
        addresses: &[&str],
        handler: H,
        options: ConsumerOptions,
    ) -> Result<ConsumerHandle>
    where
        H: MessageHandler,
    {
        if addresses.is_empty() {
            return Err(EmissaryError::internal(
                "a consumer needs at least one address",
            ));
        }

        let capacity = options
            .mailbox_capacity
            .unwrap_or(self.inner.config.mailbox_capacity)
            .max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        let registration = Registration {
            id,
            local_only: options.local_only,
            mailbox: tx,
        };

        if options.exclusive {
            // Check and claim in one critical section shared by the cluster
            let peers = self.peers();
            let instance = self.inner.instance;
            self.inner.with_claims(|claims| {
                let taken = addresses.iter().find(|a| {
                    claims.owners.contains_key(**a)
                        || self.inner.has_consumer(a)
                        || peers.iter().any(|p| p.has_local_consumer(a))
                });
                if let Some(address) = taken {
                    return Err(EmissaryError::address_in_use(*address));
                }

                for address in addresses {
                    claims.owners.insert(
                        (*address).to_string(),
                        Claim {
                            node: instance,
                            registration: id,
                        },
                    );
                }
                self.inner.register(addresses, &registration);
                Ok(())
            })?;
        } else {
            self.inner.register(addresses, &registration);
        }

        debug!(
            node = %self.node_id(),
            addresses = ?addresses,
            local_only = options.local_only,
            exclusive = options.exclusive,
            "Consumer registered"
        );

        tokio::spawn(run_consumer(Arc::downgrade(&self.inner), rx, handler));

        Ok(ConsumerHandle {
            id,
            addresses: addresses.iter().map(|a| (*a).to_string()).collect(),
            bus: Arc::downgrade(&self.inner),
        })
    }

    /// Sends a request and waits for its reply.
    ///
    /// # Errors
    ///
    /// - `NoHandlers` if no consumer is reachable for `address`
    /// - `Timeout` if the reply does not arrive in time
    /// - `ReplyLost` if the consumer dropped the request unanswered
    /// - `RecipientFailure` if the consumer replied with a failure
    pub async fn request(
        &self,
        address: &str,
        body: Value,
        options: DeliveryOptions,
    ) -> Result<Message> {
        counter!("emissary_bus_requests_total", "address" => address.to_string()).increment(1);

        let wait = options
            .reply_timeout()
            .unwrap_or(self.inner.config.request_timeout);
        let result = tokio::time::timeout(wait, self.exchange(address, body, &options))
            .await
            .unwrap_or_else(|_| Err(EmissaryError::timeout(address, wait.as_millis() as u64)));

        if let Err(e) = &result {
            record_failure(address, e);
        }

        result
    }

    async fn exchange(
        &self,
        address: &str,
        body: Value,
        options: &DeliveryOptions,
    ) -> Result<Message> {
        let target = self
            .route(address, options.is_local_only())
            .ok_or_else(|| EmissaryError::no_handlers(address))?;

        let mut message = self.outgoing(address, body, options);
        if target.remote {
            message = message.over_wire()?;
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        target
            .mailbox
            .send(Envelope {
                message,
                reply: Some(reply_tx),
                remote: target.remote,
            })
            .await
            .map_err(|_| EmissaryError::no_handlers(address))?;

        reply_rx
            .await
            .map_err(|_| EmissaryError::reply_lost(address))?
    }

    /// Sends a message to one consumer without waiting for a reply.
    ///
    /// A full mailbox is waited on for at most the request timeout.
    ///
    /// # Errors
    ///
    /// `NoHandlers` if no consumer is reachable, `Timeout` if its mailbox
    /// stays full.
    pub async fn send(&self, address: &str, body: Value, options: DeliveryOptions) -> Result<()> {
        let target = self
            .route(address, options.is_local_only())
            .ok_or_else(|| EmissaryError::no_handlers(address))?;

        let mut message = self.outgoing(address, body, &options);
        if target.remote {
            message = message.over_wire()?;
        }

        let envelope = Envelope {
            message,
            reply: None,
            remote: target.remote,
        };
        let wait = options
            .reply_timeout()
            .unwrap_or(self.inner.config.request_timeout);

        let result = enqueue(address, &target.mailbox, envelope, wait).await;
        if let Err(e) = &result {
            record_failure(address, e);
        }
        result
    }

    /// Delivers a message to every consumer of `address`.
    ///
    /// Returns the number of consumers reached. Publishing to an address
    /// nobody listens on is not an error. Consumers whose mailbox stays full
    /// past the request timeout are skipped.
    pub async fn publish(
        &self,
        address: &str,
        body: Value,
        options: DeliveryOptions,
    ) -> Result<usize> {
        let message = self.outgoing(address, body, &options);

        let mut targets: Vec<Target> = self
            .inner
            .all(address, true)
            .into_iter()
            .map(|mailbox| Target {
                mailbox,
                remote: false,
            })
            .collect();

        if !options.is_local_only() {
            for peer in self.peers() {
                targets.extend(peer.inner.all(address, false).into_iter().map(|mailbox| Target {
                    mailbox,
                    remote: true,
                }));
            }
        }

        let wait = options
            .reply_timeout()
            .unwrap_or(self.inner.config.request_timeout);

        let mut reached = 0;
        for target in targets {
            let copy = if target.remote {
                message.clone().over_wire()?
            } else {
                message.clone()
            };

            let envelope = Envelope {
                message: copy,
                reply: None,
                remote: target.remote,
            };
            match enqueue(address, &target.mailbox, envelope, wait).await {
                Ok(()) => reached += 1,
                Err(e) => record_failure(address, &e),
            }
        }

        Ok(reached)
    }

    fn route(&self, address: &str, local_only: bool) -> Option<Target> {
        if let Some(mailbox) = self.inner.pick(address, true) {
            return Some(Target {
                mailbox,
                remote: false,
            });
        }

        if local_only {
            return None;
        }

        self.peers().into_iter().find_map(|peer| {
            peer.inner.pick(address, false).map(|mailbox| Target {
                mailbox,
                remote: true,
            })
        })
    }

    /// Builds an outgoing message and runs the outbound interceptors with the
    /// caller's ambient correlation id.
    fn outgoing(&self, address: &str, body: Value, options: &DeliveryOptions) -> Message {
        let mut message = Message::new(address, body).with_headers(options.headers().clone());
        self.run_outbound(&mut message, correlation::current());
        message
    }

    pub(crate) fn run_outbound(&self, message: &mut Message, ambient: Option<CorrelationId>) {
        let interceptors = self.inner.outbound.read().clone();
        let mut ambient = ambient;
        let mut ctx = DeliveryContext::new(message, &mut ambient);
        for interceptor in &interceptors {
            interceptor.handle(&mut ctx);
        }
    }

    fn run_inbound(&self, message: &mut Message) -> Option<CorrelationId> {
        let interceptors = self.inner.inbound.read().clone();
        let mut ambient = None;
        let mut ctx = DeliveryContext::new(message, &mut ambient);
        for interceptor in &interceptors {
            interceptor.handle(&mut ctx);
        }
        ambient
    }
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("node_id", &self.inner.config.node_id)
            .field("addresses", &self.inner.consumers.read().len())
            .finish()
    }
}

fn link(from: &Arc<BusInner>, to: &Arc<BusInner>) {
    let mut peers = from.peers.write();
    peers.retain(|p| p.strong_count() > 0);
    if !peers.iter().any(|p| p.as_ptr() == Arc::as_ptr(to)) {
        peers.push(Arc::downgrade(to));
    }
}

/// Puts `envelope` in `mailbox`, waiting at most `wait` for room.
async fn enqueue(
    address: &str,
    mailbox: &mpsc::Sender<Envelope>,
    envelope: Envelope,
    wait: Duration,
) -> Result<()> {
    match tokio::time::timeout(wait, mailbox.send(envelope)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) => Err(EmissaryError::no_handlers(address)),
        Err(_) => Err(EmissaryError::timeout(address, wait.as_millis() as u64)),
    }
}

/// Moves every node on `from`'s claim table onto `into`'s table.
fn merge_claims(from: &Arc<BusInner>, into: &Arc<BusInner>) {
    let retired = Arc::clone(&from.claims.read());
    let kept = Arc::clone(&into.claims.read());
    if Arc::ptr_eq(&retired, &kept) {
        return;
    }

    // Collected first so no peer is dropped while the tables are locked
    let nodes = from.cluster();

    let mut old = retired.lock();
    let mut new = kept.lock();
    for (address, claim) in old.owners.drain() {
        if new.owners.contains_key(&address) {
            warn!(address = %address, "Exclusive address claimed on both sides of a join");
            continue;
        }
        new.owners.insert(address, claim);
    }
    old.retired = true;

    for node in &nodes {
        let mut slot = node.claims.write();
        if Arc::ptr_eq(&slot, &retired) {
            *slot = Arc::clone(&kept);
        }
    }
}

fn record_failure(address: &str, error: &EmissaryError) {
    let kind = match error {
        EmissaryError::NoHandlers { .. } => "no_handlers",
        EmissaryError::Timeout { .. } => "timeout",
        EmissaryError::ReplyLost { .. } => "reply_lost",
        EmissaryError::RecipientFailure { .. } => "recipient",
        _ => "other",
    };
    counter!(
        "emissary_bus_failures_total",
        "address" => address.to_string(),
        "kind" => kind
    )
    .increment(1);

    if error.is_channel_failure() {
        warn!(address = %address, error = %error, "Request failed on the bus");
    }
}

/// Consumer task: one delivery at a time, each inside its correlation scope.
async fn run_consumer<H>(bus: Weak<BusInner>, mut mailbox: mpsc::Receiver<Envelope>, mut handler: H)
where
    H: MessageHandler,
{
    while let Some(envelope) = mailbox.recv().await {
        let Some(inner) = bus.upgrade() else {
            break;
        };
        let bus = MessageBus { inner };

        let Envelope {
            mut message,
            reply,
            remote,
        } = envelope;
        let ambient = bus.run_inbound(&mut message);

        let span = debug_span!(
            "delivery",
            node = %bus.node_id(),
            address = %message.address(),
            correlation_id = ambient.as_ref().map(CorrelationId::as_str).unwrap_or("-"),
        );

        let delivery = Delivery::new(message, ambient.clone(), reply, remote, bus);
        correlation::scope_opt(ambient, handler.handle(delivery))
            .instrument(span)
            .await;
    }

    debug!("Consumer stopped");
}

/// Handle to a consumer registration.
#[derive(Debug)]
pub struct ConsumerHandle {
    id: u64,
    addresses: Vec<String>,
    bus: Weak<BusInner>,
}

impl ConsumerHandle {
    /// The addresses this registration listens on.
    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    /// Returns true while the registration is active.
    pub fn is_registered(&self) -> bool {
        self.bus
            .upgrade()
            .is_some_and(|inner| inner.is_registered(self.id))
    }

    /// Removes the registration.
    ///
    /// Messages already in the mailbox are still handled; the consumer task
    /// stops once they are drained.
    pub fn unregister(self) {
        if let Some(inner) = self.bus.upgrade() {
            inner.unregister(self.id);
            debug!(addresses = ?self.addresses, "Consumer unregistered");
        }
    }
}
