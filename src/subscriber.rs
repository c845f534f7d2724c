//! Typed channel subscriptions.
//!
//! [`TypedSubscriber`] bridges a byte-oriented [`Transport`](crate::Transport)
//! to strongly-typed handlers, one channel per call. It offers two entry
//! points over the same registration path:
//!
//! - [`subscribe_async`](TypedSubscriber::subscribe_async) validates its
//!   arguments immediately and returns a future that resolves once the
//!   transport has accepted the subscription.
//! - [`subscribe`](TypedSubscriber::subscribe) blocks the calling thread until
//!   the transport has accepted the subscription, then attaches the handler
//!   and returns.
//!
//! In both cases delivery happens later, in the transport's delivery context.
//! A payload that does not decode becomes [`Error::Deserialization`] in that
//! context and the handler is not called. A panicking handler unwinds there
//! too. Neither is ever reported to the caller that created the
//! subscription: a successful subscribe proves registration, nothing more.

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::runtime::{Handle, RuntimeFlavor};

use crate::retry::retry_with_backoff;
use crate::{
    // ---
    log_debug,
    log_info,
    Channel,
    Codec,
    Error,
    JsonCodec,
    MessageCallback,
    RawMessage,
    Result,
    RetryConfig,
    SubscriberBuilder,
    TransportPtr,
};

const SUBSCRIBE_ASYNC: &str = "subscribe_async";
const SUBSCRIBE: &str = "subscribe";

/// Typed subscriber over a shared transport.
///
/// Cloning is cheap; clones share the transport, codec and runtime handle.
///
/// # Example
///
/// ```
/// use serde::Deserialize;
/// use typed_sub::{TransportBuilder, TypedSubscriber};
///
/// #[derive(Debug, Deserialize)]
/// struct Order {
///     id: u64,
/// }
///
/// # async fn example() -> typed_sub::Result<()> {
/// let transport = TransportBuilder::new().node_id("orders").build().await?;
/// let subscriber = TypedSubscriber::new(transport)?;
///
/// subscriber
///     .subscribe_async("orders", |order: Order| println!("order {}", order.id))?
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct TypedSubscriber<C = JsonCodec> {
    inner: Arc<Inner<C>>,
}

struct Inner<C> {
    transport: TransportPtr,
    codec: Arc<C>,
    runtime: Handle,
    retry_config: Option<RetryConfig>,
}

impl<C> Clone for TypedSubscriber<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl TypedSubscriber<JsonCodec> {
    /// JSON subscriber on the current tokio runtime, without retry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingConfig`] when called outside a tokio runtime;
    /// use [`SubscriberBuilder::runtime`] there.
    pub fn new(transport: TransportPtr) -> Result<Self> {
        SubscriberBuilder::new(transport).build()
    }
}

impl<C: Codec> TypedSubscriber<C> {
    // ---
    pub(crate) fn from_parts(
        transport: TransportPtr,
        codec: C,
        runtime: Handle,
        retry_config: Option<RetryConfig>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                codec: Arc::new(codec),
                runtime,
                retry_config,
            }),
        }
    }

    /// The transport every subscription of this subscriber registers with.
    pub fn transport(&self) -> &TransportPtr {
        &self.inner.transport
    }

    /// Subscribe `handler` to `channel` without blocking.
    ///
    /// The channel is validated before this returns, so an empty channel is
    /// reported without awaiting anything and without touching the transport.
    /// The returned future performs the registration and resolves once the
    /// transport acknowledges it; it does not resolve per message.
    ///
    /// For each message later delivered on `channel`, the payload is decoded
    /// into `T` and `handler` is called with it, synchronously, in the
    /// transport's delivery context. A payload that decodes to nothing is
    /// reported there as [`Error::Deserialization`] and `handler` is skipped.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] immediately, if `channel` is empty.
    /// - [`Error::Registration`] from the future, if the transport rejects
    ///   the subscription (after retries, when configured).
    pub fn subscribe_async<T, F>(
        &self,
        channel: &str,
        handler: F,
    ) -> Result<impl Future<Output = Result<()>> + Send + 'static>
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        // ---
        let channel = Channel::new(channel)?;
        let on_message = dispatcher(self.inner.codec.clone(), handler, SUBSCRIBE_ASYNC);
        let inner = self.inner.clone();

        Ok(async move {
            log_debug!(
                "{}: {SUBSCRIBE_ASYNC}: registering channel {channel}",
                inner.transport.transport_id()
            );

            retry_with_backoff(inner.retry_config.as_ref(), || {
                inner
                    .transport
                    .subscribe_with(channel.clone(), on_message.clone())
            })
            .await
            .map_err(|source| registration_failed(&channel, source))?;

            log_info!(
                "{}: {SUBSCRIBE_ASYNC}: subscribed to channel {channel}",
                inner.transport.transport_id()
            );
            Ok(())
        })
    }

    /// Subscribe `handler` to `channel`, blocking until registration completes.
    ///
    /// Blocks the calling thread (it is not yielded to a scheduler) until the
    /// transport acknowledges the subscription, then attaches the handler and
    /// returns at once. Delivery, decoding and fault behavior are exactly those
    /// of [`subscribe_async`](Self::subscribe_async).
    ///
    /// May be called from a plain thread or from a worker of a multi-threaded
    /// tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `channel` is empty.
    /// - [`Error::InvalidContext`] when called on a current-thread runtime, or
    ///   when the subscriber itself is bound to one: nothing would drive
    ///   registration while this thread blocks.
    /// - [`Error::Registration`] if the transport rejects the subscription.
    pub fn subscribe<T, F>(&self, channel: &str, handler: F) -> Result<()>
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        // ---
        let channel = Channel::new(channel)?;
        let on_message = dispatcher(self.inner.codec.clone(), handler, SUBSCRIBE);
        let inner = &self.inner;

        log_debug!(
            "{}: {SUBSCRIBE}: registering channel {channel}",
            inner.transport.transport_id()
        );

        let registration = retry_with_backoff(inner.retry_config.as_ref(), || {
            inner.transport.subscribe(channel.clone())
        });

        let handle = self
            .block_on(registration)?
            .map_err(|source| registration_failed(&channel, source))?;

        let _guard = inner.runtime.enter();
        handle.on_message(move |msg| on_message(msg));

        log_info!(
            "{}: {SUBSCRIBE}: subscribed to channel {channel}",
            inner.transport.transport_id()
        );
        Ok(())
    }

    /// Drive `fut` to completion on the subscriber's runtime, blocking this thread.
    fn block_on<Fut: Future>(&self, fut: Fut) -> Result<Fut::Output> {
        // ---
        let runtime = &self.inner.runtime;

        // Nothing drives a current-thread runtime's tasks while another
        // thread sits in `Handle::block_on`.
        if runtime.runtime_flavor() == RuntimeFlavor::CurrentThread {
            return Err(Error::InvalidContext(
                "blocking subscribe needs a subscriber bound to a multi-threaded runtime; \
                 use subscribe_async here"
                    .into(),
            ));
        }

        match Handle::try_current() {
            Err(_) => Ok(runtime.block_on(fut)),
            Ok(current) => match current.runtime_flavor() {
                RuntimeFlavor::MultiThread => {
                    Ok(tokio::task::block_in_place(|| runtime.block_on(fut)))
                }
                _ => Err(Error::InvalidContext(
                    "blocking subscribe needs a multi-threaded runtime or no runtime at all; \
                     use subscribe_async here"
                        .into(),
                )),
            },
        }
    }
}

/// Build the raw-message callback that decodes into `T` and calls `handler`.
fn dispatcher<T, C, F>(codec: Arc<C>, handler: F, operation: &'static str) -> MessageCallback
where
    T: DeserializeOwned + 'static,
    C: Codec,
    F: Fn(T) + Send + Sync + 'static,
{
    Arc::new(move |msg: RawMessage| {
        let Some(value) = codec.decode::<T>(&msg.payload) else {
            return Err(Error::Deserialization {
                channel: msg.channel.to_string(),
                operation,
                payload: String::from_utf8_lossy(&msg.payload).into_owned(),
            });
        };

        handler(value);
        Ok(())
    })
}

fn registration_failed(channel: &Channel, source: Error) -> Error {
    Error::Registration {
        channel: channel.to_string(),
        source: Box::new(source),
    }
}
