// tests/common/mod.rs

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use typed_sub::{
    // ---
    create_memory_transport_with_hub,
    Channel,
    DeliveryFault,
    Error,
    MemoryHub,
    Result,
    SubscriptionHandle,
    Transport,
    TransportBase,
    TransportConfig,
    TransportPtr,
};

pub fn init_logging() {
    // ---
    use tracing_subscriber::{fmt as tracing_format, EnvFilter};

    let _ = tracing_format()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Knobs for [`RecordingTransport`].
#[derive(Debug, Default, Clone)]
pub struct Behavior {
    /// Time every registration takes before it is acknowledged.
    pub registration_delay: Duration,
    /// Number of registrations that fail with a retryable error first.
    pub retryable_failures: u32,
    /// Every registration fails with a non-retryable error.
    pub refuse: bool,
}

/// Transport double that records registrations and captures delivery faults.
///
/// Delivery is delegated to a private memory hub; faults raised by message
/// callbacks arrive on the receiver returned from [`RecordingTransport::start`].
pub struct RecordingTransport {
    base: TransportBase,
    inner: TransportPtr,
    behavior: Behavior,
    retryable_left: AtomicU32,
    subscribe_calls: AtomicUsize,
    registrations: AtomicUsize,
}

impl RecordingTransport {
    // ---
    pub async fn start(
        behavior: Behavior,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<DeliveryFault>) {
        // ---
        init_logging();

        let (hub, faults) = MemoryHub::with_fault_channel();
        let config = TransportConfig::memory("recording");

        let inner = create_memory_transport_with_hub(config.clone(), hub)
            .await
            .expect("memory transport");

        let transport = Self {
            base: TransportBase::from(&config),
            inner,
            retryable_left: AtomicU32::new(behavior.retryable_failures),
            behavior,
            subscribe_calls: AtomicUsize::new(0),
            registrations: AtomicUsize::new(0),
        };

        (Arc::new(transport), faults)
    }

    pub fn ptr(self: &Arc<Self>) -> TransportPtr {
        self.clone()
    }

    /// Number of times registration was requested.
    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    /// Number of registrations that were acknowledged.
    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    /// Deliver `payload` on `channel` to every subscription.
    pub async fn deliver(&self, channel: &str, payload: &'static str) {
        // ---
        let channel = Channel::new(channel).expect("valid channel");
        self.inner
            .publish(channel, Bytes::from_static(payload.as_bytes()))
            .await
            .expect("deliver");
    }
}

#[async_trait::async_trait]
impl Transport for RecordingTransport {
    // ---
    fn base(&self) -> &TransportBase {
        &self.base
    }

    async fn subscribe(&self, channel: Channel) -> Result<SubscriptionHandle> {
        // ---
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);

        if !self.behavior.registration_delay.is_zero() {
            tokio::time::sleep(self.behavior.registration_delay).await;
        }

        if self.behavior.refuse {
            return Err(Error::Transport(format!("broker refused {channel}")));
        }

        let retry = self
            .retryable_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if retry {
            return Err(Error::TransportRetryable("broker not ready".into()));
        }

        let handle = self.inner.subscribe(channel).await?;
        self.registrations.fetch_add(1, Ordering::SeqCst);
        Ok(handle)
    }

    async fn publish(&self, channel: Channel, payload: Bytes) -> Result<()> {
        self.inner.publish(channel, payload).await
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }
}

/// Wait for the next value on `rx`, failing the test after 500ms.
pub async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_millis(500), rx.recv())
        .await
        .expect("timed out waiting for value")
        .expect("channel closed")
}

/// Assert nothing else arrives on `rx` within 50ms.
pub async fn assert_quiet<T: std::fmt::Debug>(rx: &mut mpsc::UnboundedReceiver<T>) {
    let extra = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
    assert!(extra.is_err(), "unexpected value: {extra:?}");
}
