// src/domain/transport.rs

//! Transport domain abstractions.
//!
//! This module defines the channel-level contract the typed subscription
//! layer is written against. It intentionally avoids any reference to
//! concrete brokers or client libraries.
//!
//! The transport layer is responsible only for registering interest in a
//! channel and delivering opaque payloads to the callbacks attached to it.
//! Typed decoding and handler dispatch are handled by
//! [`TypedSubscriber`](crate::TypedSubscriber).
//!
//! Concrete implementations of this interface live under `src/transport/`.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{log_debug, log_error, Error, Result};

/// Default capacity of a subscription inbox.
pub const DEFAULT_INBOX_CAPACITY: usize = 16;

/// A validated channel identifier.
///
/// A `Channel` names a logical broadcast topic. It is never empty; the check
/// happens once, at subscription time, and never again during delivery.
///
/// Channels are immutable, cheap to clone, and safe to share across threads.
/// The domain layer makes no assumptions about channel syntax; matching is
/// exact string equality in every bundled transport.
///
/// ```
/// # use typed_sub::Channel;
/// let channel = Channel::new("orders").unwrap();
/// assert_eq!(channel.as_str(), "orders");
/// assert!(Channel::new("").is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Channel(Arc<str>);

impl Channel {
    /// Validate and wrap a channel name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `name` is empty.
    pub fn new(name: impl Into<Arc<str>>) -> Result<Self> {
        // ---
        let name = name.into();
        if name.is_empty() {
            return Err(Error::InvalidArgument {
                param: "channel",
                reason: "value cannot be empty".into(),
            });
        }
        Ok(Channel(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for Channel {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Channel::new(value)
    }
}

impl TryFrom<String> for Channel {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Channel::new(value)
    }
}

/// A raw message as delivered by a transport.
///
/// The payload is opaque to the transport. Ownership is transient: the
/// message is received, decoded, then dropped.
#[derive(Clone, Debug)]
pub struct RawMessage {
    /// Channel the message was published on.
    pub channel: Channel,

    /// Undecoded payload bytes.
    pub payload: Bytes,
}

impl RawMessage {
    pub fn new(channel: Channel, payload: impl Into<Bytes>) -> Self {
        Self {
            channel,
            payload: payload.into(),
        }
    }
}

/// A failure raised by a message callback inside a delivery context.
#[derive(Debug)]
pub struct DeliveryFault {
    pub channel: Channel,
    pub error: Error,
}

/// Sink that a delivery context reports callback failures to.
pub type FaultSender = mpsc::UnboundedSender<DeliveryFault>;

/// Raw-message callback attached to a subscription.
///
/// Returning `Err` hands the failure back to the transport's delivery
/// context, which decides what to do with it.
pub type MessageCallback = Arc<dyn Fn(RawMessage) -> Result<()> + Send + Sync>;

/// Handle returned from a successful registration.
///
/// The handle owns the subscription's inbox. Messages can be read directly
/// from [`inbox`](Self::inbox), or a callback can be attached with
/// [`on_message`](Self::on_message), which moves the inbox into a dedicated
/// delivery task.
///
/// Dropping the handle (or the delivery task) closes the inbox; transports
/// evict closed inboxes on their next delivery attempt.
pub struct SubscriptionHandle {
    // ---
    /// Channel this subscription was registered for.
    pub channel: Channel,

    /// Receiver for raw messages delivered on `channel`.
    pub inbox: mpsc::Receiver<RawMessage>,

    faults: Option<FaultSender>,
}

impl SubscriptionHandle {
    // ---
    pub fn new(channel: Channel, inbox: mpsc::Receiver<RawMessage>) -> Self {
        Self {
            channel,
            inbox,
            faults: None,
        }
    }

    /// Route callback failures from the delivery task to `faults`.
    pub fn with_fault_sender(mut self, faults: FaultSender) -> Self {
        self.faults = Some(faults);
        self
    }

    /// Attach a raw-message callback and start delivering.
    ///
    /// Spawns the delivery task for this subscription on the current tokio
    /// runtime. Messages are handed to `callback` one at a time, in inbox
    /// order. This task is the delivery context:
    ///
    /// - an `Err` from `callback` is logged, forwarded to the fault sender if
    ///   one is set, and delivery continues with the next message;
    /// - a panic in `callback` is not caught and ends the task, and with it
    ///   the subscription.
    ///
    /// # Panics
    ///
    /// Panics if called outside the context of a tokio runtime.
    pub fn on_message<F>(self, callback: F) -> JoinHandle<()>
    where
        F: Fn(RawMessage) -> Result<()> + Send + Sync + 'static,
    {
        // ---
        let SubscriptionHandle {
            channel,
            mut inbox,
            faults,
        } = self;

        tokio::spawn(async move {
            log_debug!("delivery started for channel {channel}");

            while let Some(msg) = inbox.recv().await {
                if let Err(error) = callback(msg) {
                    log_error!("delivery fault on channel {channel}: {error}");

                    if let Some(faults) = &faults {
                        let _ = faults.send(DeliveryFault {
                            channel: channel.clone(),
                            error,
                        });
                    }
                }
            }

            log_debug!("delivery stopped for channel {channel}");
        })
    }
}

/// Shared base state for all transport implementations.
///
/// Each concrete transport embeds this as a field named `base` and returns
/// it from [`Transport::base`].
pub struct TransportBase {
    /// Unique identifier for this transport instance (the node_id).
    pub transport_id: String,
    /// Capacity of each subscription inbox.
    pub inbox_capacity: usize,
}

impl From<&TransportConfig> for TransportBase {
    fn from(config: &TransportConfig) -> Self {
        // ---
        Self {
            transport_id: config.node_id.clone(),
            inbox_capacity: config.inbox_capacity,
        }
    }
}

/// Configuration for creating a transport instance.
///
/// Passed to transport factory functions (`create_*_transport()`), usually
/// via [`TransportBuilder`](crate::TransportBuilder).
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// Broker URI (e.g. `"redis://localhost:6379"`). Empty for the memory transport.
    pub uri: String,
    /// Node ID for this transport instance, used in logs.
    pub node_id: String,
    /// Optional transport type override (`"memory"`, `"redis"`).
    /// If `None`, the type is inferred from the URI scheme.
    pub transport_type: Option<String>,
    /// Capacity of each subscription inbox.
    pub inbox_capacity: usize,
}

impl TransportConfig {
    /// Config for an in-process memory transport.
    pub fn memory(node_id: impl Into<String>) -> Self {
        Self {
            uri: String::new(),
            node_id: node_id.into(),
            transport_type: Some("memory".into()),
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
        }
    }
}

/// Transport abstraction.
///
/// A `Transport` registers interest in channels and delivers raw payloads
/// published on them. It makes no promise beyond per-channel delivery order,
/// and only to the extent the underlying broker provides it.
///
/// Implementations must ensure that:
/// - Once `subscribe()` returns successfully, messages published *after* that
///   point on the same channel are deliverable.
/// - Each subscription receives its own copy of every message (fanout);
///   subscribing twice yields two independent subscriptions.
///
/// # Notes
///
/// This trait uses `async_trait`; consumers should treat methods as normal
/// `async fn`s.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    // ---
    /// Returns a reference to the shared base state.
    fn base(&self) -> &TransportBase;

    /// Returns the transport_id of the transport.
    fn transport_id(&self) -> &str {
        &self.base().transport_id
    }

    /// Register interest in `channel` and return a handle for its messages.
    ///
    /// Resolves once the broker has acknowledged the subscription.
    async fn subscribe(&self, channel: Channel) -> Result<SubscriptionHandle>;

    /// Register interest in `channel` and attach `on_message` in one step.
    ///
    /// Resolves once the broker has acknowledged the subscription; the
    /// callback may be invoked zero or more times afterwards. The default
    /// implementation composes [`subscribe`](Self::subscribe) with
    /// [`SubscriptionHandle::on_message`].
    async fn subscribe_with(&self, channel: Channel, on_message: MessageCallback) -> Result<()> {
        // ---
        let handle = self.subscribe(channel).await?;
        handle.on_message(move |msg| on_message(msg));
        Ok(())
    }

    /// Publish a raw payload on `channel`.
    async fn publish(&self, channel: Channel, payload: bytes::Bytes) -> Result<()>;

    /// Close the transport and release any associated resources.
    async fn close(&self) -> Result<()>;
}

/// Shared transport pointer.
///
/// `.clone()` is cheap and every clone shares the same connection.
pub type TransportPtr = Arc<dyn Transport>;
