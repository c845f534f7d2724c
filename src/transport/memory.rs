//! In-memory transport implementation.
//!
//! This module provides a pure in-process implementation of the domain-level
//! `Transport` trait. It is intended primarily for testing, local execution,
//! and as a reference for transport semantics.
//!
//! ## Reference Semantics
//!
//! The in-memory transport defines the **reference behavior** for the transport
//! layer. All other transport implementations are expected to approximate this
//! behavior as closely as their underlying systems allow and to document any
//! unavoidable deviations.
//!
//! - Once `subscribe()` returns successfully, messages published *after* that
//!   point on the same channel are deliverable.
//! - Messages on one channel reach each subscriber in publish order.
//! - A publisher waits for inbox room rather than dropping messages.
//! - Callback failures are logged, reported to the hub's fault channel if it
//!   has one, and delivery continues.
//!
//! ## Non-Goals
//!
//! This transport does not attempt to emulate the failure modes, persistence,
//! or delivery guarantees of any specific broker.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use tokio::sync::{mpsc, RwLock};

use crate::{
    // ---
    log_debug,
    log_info,
    Channel,
    DeliveryFault,
    FaultSender,
    Result,
    SubscriptionHandle,
    Transport,
    TransportBase,
    TransportConfig,
    TransportPtr,
};

/// Shared message bus for the in-memory transport.
///
/// Simulates a broker within a single process. All memory transports that
/// share a `MemoryHub` see each other's publishes, exactly as clients of one
/// real broker would.
///
/// For isolation between parallel tests, construct a hub explicitly and pass
/// it to [`create_memory_transport_with_hub`]:
///
/// ```
/// # use typed_sub::{MemoryHub, TransportConfig};
/// # async fn example() -> typed_sub::Result<()> {
/// let (hub, mut faults) = MemoryHub::with_fault_channel();
///
/// let transport =
///     typed_sub::create_memory_transport_with_hub(TransportConfig::memory("node-a"), hub.clone())
///         .await?;
/// # Ok(())
/// # }
/// ```
pub struct MemoryHub {
    // ---
    subscriptions: RwLock<HashMap<Channel, Vec<mpsc::Sender<crate::RawMessage>>>>,
    faults: Option<FaultSender>,
}

impl MemoryHub {
    /// Create a new, empty hub.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a hub whose delivery contexts report callback failures.
    ///
    /// Every fault raised by a message callback on a subscription created
    /// through this hub is sent to the returned receiver.
    pub fn with_fault_channel() -> (Arc<Self>, mpsc::UnboundedReceiver<DeliveryFault>) {
        // ---
        let (tx, rx) = mpsc::unbounded_channel();

        let hub = Self {
            subscriptions: RwLock::new(HashMap::new()),
            faults: Some(tx),
        };

        (Arc::new(hub), rx)
    }

    /// Number of live subscriptions on `channel`.
    pub async fn subscriber_count(&self, channel: &Channel) -> usize {
        // ---
        let subs = self.subscriptions.read().await;
        subs.get(channel)
            .map(|senders| senders.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    async fn publish(&self, _transport_id: &str, channel: Channel, payload: Bytes) -> Result<()> {
        // ---
        let senders = {
            let subs = self.subscriptions.read().await;
            subs.get(&channel).cloned()
        };

        let Some(senders) = senders else {
            log_debug!("{_transport_id}: publish to {channel}: no subscribers");
            return Ok(());
        };

        log_debug!(
            "{_transport_id}: publish to {channel}: {} subscriber(s)",
            senders.len()
        );

        let msg = crate::RawMessage::new(channel.clone(), payload);
        let mut evict = false;

        for sender in &senders {
            // A closed channel indicates a dropped SubscriptionHandle.
            if sender.send(msg.clone()).await.is_err() {
                evict = true;
            }
        }

        if evict {
            let mut subs = self.subscriptions.write().await;
            if let Some(live) = subs.get_mut(&channel) {
                live.retain(|tx| !tx.is_closed());
                if live.is_empty() {
                    subs.remove(&channel);
                }
            }
        }

        Ok(())
    }

    async fn subscribe(
        &self,
        _transport_id: &str,
        channel: Channel,
        capacity: usize,
    ) -> Result<SubscriptionHandle> {
        // ---
        log_debug!("{_transport_id}: subscribe to {channel}");

        let (tx, rx) = mpsc::channel(capacity);

        {
            let mut subs = self.subscriptions.write().await;
            subs.entry(channel.clone()).or_default().push(tx);
        }

        let handle = SubscriptionHandle::new(channel, rx);

        Ok(match &self.faults {
            Some(faults) => handle.with_fault_sender(faults.clone()),
            None => handle,
        })
    }

    async fn close(&self, _transport_id: &str) -> Result<()> {
        // ---
        log_info!("{_transport_id}: closing memory transport");

        let mut subs = self.subscriptions.write().await;
        subs.clear();
        Ok(())
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        // ---
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            faults: None,
        }
    }
}

/// Process-global hub used by [`create_memory_transport`].
static GLOBAL_HUB: OnceLock<Arc<MemoryHub>> = OnceLock::new();

fn global_hub() -> Arc<MemoryHub> {
    GLOBAL_HUB.get_or_init(MemoryHub::new).clone()
}

/// In-memory transport.
///
/// Routes messages through a shared [`MemoryHub`]. Channel matching is exact
/// string equality.
struct MemoryTransport {
    // ---
    base: TransportBase,
    hub: Arc<MemoryHub>,
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    // ---
    fn base(&self) -> &TransportBase {
        &self.base
    }

    /// Register a subscription on the shared hub.
    ///
    /// Registration is immediate; once this returns, subsequent publishes on
    /// `channel` are deliverable to the returned inbox.
    async fn subscribe(&self, channel: Channel) -> Result<SubscriptionHandle> {
        self.hub
            .subscribe(self.transport_id(), channel, self.base.inbox_capacity)
            .await
    }

    async fn publish(&self, channel: Channel, payload: Bytes) -> Result<()> {
        self.hub.publish(self.transport_id(), channel, payload).await
    }

    /// Close the transport.
    ///
    /// Clears all subscriptions from the shared hub, including those made by
    /// other transports on the same hub.
    async fn close(&self) -> Result<()> {
        self.hub.close(self.transport_id()).await
    }
}

/// Create a new in-memory transport on the process-global hub.
///
/// # Errors
///
/// Currently infallible — always returns `Ok`.
pub async fn create_memory_transport(config: TransportConfig) -> Result<TransportPtr> {
    create_memory_transport_with_hub(config, global_hub()).await
}

/// Create a new in-memory transport on the provided hub.
///
/// # Errors
///
/// Currently infallible — always returns `Ok`.
pub async fn create_memory_transport_with_hub(
    config: TransportConfig,
    hub: Arc<MemoryHub>,
) -> Result<TransportPtr> {
    // ---
    log_debug!("{}: create memory transport", config.node_id);

    let transport = MemoryTransport {
        base: TransportBase::from(&config),
        hub,
    };

    Ok(Arc::new(transport))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use tokio::time::{timeout, Duration};

    fn channel(name: &str) -> Channel {
        Channel::new(name).unwrap()
    }

    #[tokio::test]
    async fn dropped_handle_is_evicted_on_publish() {
        // ---
        let hub = MemoryHub::new();
        let transport =
            create_memory_transport_with_hub(TransportConfig::memory("evict"), hub.clone())
                .await
                .unwrap();

        let orders = channel("orders");
        let handle = transport.subscribe(orders.clone()).await.unwrap();
        assert_eq!(hub.subscriber_count(&orders).await, 1);

        drop(handle);
        transport
            .publish(orders.clone(), Bytes::from_static(b"1"))
            .await
            .unwrap();

        assert_eq!(hub.subscriber_count(&orders).await, 0);
    }

    #[tokio::test]
    async fn publish_only_reaches_exact_channel() {
        // ---
        let hub = MemoryHub::new();
        let transport =
            create_memory_transport_with_hub(TransportConfig::memory("exact"), hub)
                .await
                .unwrap();

        let mut orders = transport.subscribe(channel("orders")).await.unwrap();
        let mut all = transport.subscribe(channel("orders/*")).await.unwrap();

        transport
            .publish(channel("orders"), Bytes::from_static(b"x"))
            .await
            .unwrap();

        let got = timeout(Duration::from_millis(100), orders.inbox.recv())
            .await
            .expect("timed out waiting for message")
            .expect("inbox closed");
        assert_eq!(got.payload.as_ref(), b"x");
        assert!(all.inbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn close_drops_every_subscription() {
        // ---
        let hub = MemoryHub::new();
        let transport =
            create_memory_transport_with_hub(TransportConfig::memory("close"), hub.clone())
                .await
                .unwrap();

        let mut handle = transport.subscribe(channel("orders")).await.unwrap();
        transport.close().await.unwrap();

        assert_eq!(hub.subscriber_count(&channel("orders")).await, 0);
        assert!(handle.inbox.recv().await.is_none());
    }
}
