//! Redis Pub/Sub transport implementation using `redis`.
//!
//! This module provides an implementation of the `Transport` trait backed by
//! a Redis Pub/Sub connection, using an **actor-based concurrency model**.
//!
//! ## Concurrency model
//!
//! - A single background **actor task** owns both Redis connections.
//! - The actor is responsible for:
//!   - publishing raw payloads via `publish_conn`,
//!   - registering broker subscriptions via `pubsub_sink`,
//!   - polling `pubsub_stream` for incoming data messages,
//!   - clean shutdown of both connections.
//! - No other task ever touches the connections directly.
//!
//! ## Two connections required
//!
//! A connection in Pub/Sub mode cannot issue regular commands like
//! `PUBLISH`, so two async connections are maintained:
//!
//! - `publish_conn` — `MultiplexedConnection`, used only for `PUBLISH`
//! - `pubsub_sink` / `pubsub_stream` — split from `aio::PubSub`, used for
//!   `SUBSCRIBE` and receiving incoming messages respectively
//!
//! ## Subscription confirmation
//!
//! `PubSubSink::subscribe()` resolves only after the broker confirms the
//! subscription, so `subscribe()` on this transport returning `Ok` means the
//! broker has acknowledged it. The actor awaits each confirmation before it
//! takes the next command, which serializes concurrent subscribes.
//!
//! ## Message delivery semantics
//!
//! Incoming publishes are demultiplexed by channel name and fanned out to all
//! local subscriptions on that channel. Payloads are delivered untouched.
//!
//! - Delivery is best-effort and non-durable.
//! - A full inbox loses the message; a closed inbox is evicted.
//! - If the pub/sub stream ends, every local inbox is closed and the
//!   delivery tasks finish. Reconnection is left to the caller.

use futures_util::StreamExt;

use redis::aio::{MultiplexedConnection, PubSubSink, PubSubStream};

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;

use crate::{
    //
    log_debug,
    log_error,
    log_info,
    log_warn,
    Channel,
    Error,
    RawMessage,
    Result,
    SubscriptionHandle,
    Transport,
    TransportBase,
    TransportConfig,
    TransportPtr,
};

type SubscriberMap = Arc<RwLock<HashMap<String, Vec<mpsc::Sender<RawMessage>>>>>;

/// Keep only the senders on `topic` matching `keep`; forget the topic once none remain.
fn prune_senders(
    map: &mut HashMap<String, Vec<mpsc::Sender<RawMessage>>>,
    topic: &str,
    keep: impl Fn(&mpsc::Sender<RawMessage>) -> bool,
) {
    // ---
    if let Some(senders) = map.get_mut(topic) {
        senders.retain(|tx| keep(tx));
        if senders.is_empty() {
            map.remove(topic);
        }
    }
}

//
// Actor commands
//

enum Cmd {
    //
    Publish {
        channel: Channel,
        payload: Bytes,
        resp: oneshot::Sender<Result<()>>,
    },
    Subscribe {
        topic: String,
        resp: oneshot::Sender<Result<()>>,
    },
    Close {
        resp: oneshot::Sender<()>,
    },
}

enum ActorStep {
    //
    Continue,
    Stop,
}

/// Redis Pub/Sub implementation of the `Transport` trait.
pub struct RedisTransport {
    // ---
    base: TransportBase,
    cmd_tx: mpsc::Sender<Cmd>,
    subscribers: SubscriberMap,
    actor: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl RedisTransport {
    // ---

    /// Spawns the actor over already-established connections.
    fn create(
        base: TransportBase,
        publish_conn: MultiplexedConnection,
        pubsub_sink: PubSubSink,
        pubsub_stream: PubSubStream,
    ) -> TransportPtr {
        // ---
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let subscribers: SubscriberMap = Arc::new(RwLock::new(HashMap::new()));

        let actor = RedisActor {
            transport_id: base.transport_id.clone(),
            publish_conn,
            pubsub_sink,
            pubsub_stream,
            stream_open: true,
            cmd_rx,
            subscribers: Arc::clone(&subscribers),
        };

        let handle = tokio::spawn(actor.run());

        Arc::new(Self {
            base,
            cmd_tx,
            subscribers,
            actor: tokio::sync::Mutex::new(Some(handle)),
        })
    }

    async fn send_cmd(&self, cmd: Cmd) -> Result<()> {
        self.cmd_tx.send(cmd).await.map_err(|e| {
            let msg = format!(
                "{}: actor command channel closed: {e}",
                self.base.transport_id
            );
            Error::Transport(msg)
        })
    }

    async fn drop_local(&self, topic: &str, tx: &mpsc::Sender<RawMessage>) {
        // ---
        let mut map = self.subscribers.write().await;
        prune_senders(&mut map, topic, |s| !s.same_channel(tx));
    }
}

struct RedisActor {
    // ---
    transport_id: String, // for logging only
    publish_conn: MultiplexedConnection,
    pubsub_sink: PubSubSink,
    pubsub_stream: PubSubStream,
    stream_open: bool,
    cmd_rx: mpsc::Receiver<Cmd>,
    subscribers: SubscriberMap,
}

impl RedisActor {
    // ---

    async fn run(mut self) {
        // ---
        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if matches!(self.handle(cmd).await, ActorStep::Stop) {
                                break;
                            }
                        }
                        None => break,
                    }
                }

                maybe_msg = self.pubsub_stream.next(), if self.stream_open => {
                    match maybe_msg {
                        Some(msg) => self.handle_incoming(msg).await,
                        None => {
                            log_error!("{}: pubsub stream ended", self.transport_id);
                            self.stream_open = false;
                            // Closing every inbox ends the delivery tasks.
                            self.subscribers.write().await.clear();
                        }
                    }
                }
            }
        }

        log_debug!("{}: redis actor stopped", self.transport_id);
    }

    async fn handle(&mut self, cmd: Cmd) -> ActorStep {
        // ---
        match cmd {
            Cmd::Publish {
                channel,
                payload,
                resp,
            } => {
                let result = self.handle_publish(channel, payload).await;
                let _ = resp.send(result);
                ActorStep::Continue
            }
            Cmd::Subscribe { topic, resp } => {
                let result = self.handle_subscribe(topic).await;
                let _ = resp.send(result);
                ActorStep::Continue
            }
            Cmd::Close { resp } => {
                self.handle_close().await;
                let _ = resp.send(());
                ActorStep::Stop
            }
        }
    }

    /// Issues a Redis PUBLISH of the raw payload on the publish connection.
    async fn handle_publish(&mut self, channel: Channel, payload: Bytes) -> Result<()> {
        // ---
        redis::cmd("PUBLISH")
            .arg(channel.as_str())
            .arg(&payload[..])
            .query_async::<i64>(&mut self.publish_conn)
            .await
            .map(|_receivers| {
                log_debug!(
                    "{}: published to {channel}, {_receivers} receiver(s)",
                    self.transport_id
                );
            })
            .map_err(|err| {
                let msg = format!(
                    "{}: publish failed for channel {channel}: {err}",
                    self.transport_id
                );
                log_error!("{msg}");
                Error::Transport(msg)
            })
    }

    /// Registers a broker subscription and awaits sink confirmation.
    async fn handle_subscribe(&mut self, topic: String) -> Result<()> {
        // ---
        let transport_id = self.transport_id.as_str();

        if !self.stream_open {
            let msg = format!("{transport_id}: cannot subscribe to {topic}: pubsub stream closed");
            log_error!("{msg}");
            return Err(Error::Transport(msg));
        }

        match self.pubsub_sink.subscribe(&topic).await {
            Ok(()) => {
                log_info!("{transport_id}: subscribed to channel {topic}");
                Ok(())
            }
            Err(err) => {
                let msg = format!("{transport_id}: failed to subscribe to channel {topic}: {err}");
                log_error!("{msg}");
                Err(Error::Transport(msg))
            }
        }
    }

    async fn handle_close(&mut self) {
        // ---
        log_debug!("{}: disconnecting redis client", self.transport_id);
        self.subscribers.write().await.clear();
    }

    /// Fans an incoming Redis message out to the local inboxes for its channel.
    async fn handle_incoming(&mut self, msg: redis::Msg) {
        // ---
        let topic = msg.get_channel_name().to_string();

        let channel = match Channel::new(topic.as_str()) {
            Ok(channel) => channel,
            Err(_err) => {
                log_debug!("{}: ignoring message: {_err}", self.transport_id);
                return;
            }
        };

        let raw = RawMessage::new(channel, Bytes::copy_from_slice(msg.get_payload_bytes()));

        let senders = {
            let map = self.subscribers.read().await;
            map.get(&topic).cloned()
        };

        let Some(senders) = senders else {
            return;
        };

        let mut evicted = false;

        for tx in &senders {
            match tx.try_send(raw.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    log_warn!("{}: inbox full on {topic}, message dropped", self.transport_id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    evicted = true;
                }
            }
        }

        if evicted {
            let mut map = self.subscribers.write().await;
            prune_senders(&mut map, &topic, |tx| !tx.is_closed());
        }
    }
} // RedisActor

#[async_trait::async_trait]
impl Transport for RedisTransport {
    // ---

    fn base(&self) -> &TransportBase {
        &self.base
    }

    async fn subscribe(&self, channel: Channel) -> Result<SubscriptionHandle> {
        // ---
        let topic = channel.as_str().to_string();

        // Register locally first so nothing published right after the broker
        // ack is missed.
        let (tx, rx) = mpsc::channel(self.base.inbox_capacity);
        {
            let mut map = self.subscribers.write().await;
            map.entry(topic.clone()).or_default().push(tx.clone());
        }

        let (resp_tx, resp_rx) = oneshot::channel();

        let sent = self
            .send_cmd(Cmd::Subscribe {
                topic: topic.clone(),
                resp: resp_tx,
            })
            .await;

        let confirmed = match sent {
            Ok(()) => resp_rx.await.unwrap_or_else(|e| {
                Err(Error::Transport(format!(
                    "actor responder channel read failed: {e}"
                )))
            }),
            Err(err) => Err(err),
        };

        if let Err(err) = confirmed {
            self.drop_local(&topic, &tx).await;
            return Err(err);
        }

        Ok(SubscriptionHandle::new(channel, rx))
    }

    async fn publish(&self, channel: Channel, payload: Bytes) -> Result<()> {
        // ---
        let (tx, rx) = oneshot::channel();

        self.send_cmd(Cmd::Publish {
            channel,
            payload,
            resp: tx,
        })
        .await?;

        rx.await.map_err(|e| {
            let msg = format!("actor responder channel read failed: {e}");
            Error::Transport(msg)
        })?
    }

    async fn close(&self) -> Result<()> {
        // ---
        let (tx, rx) = oneshot::channel();

        if self.send_cmd(Cmd::Close { resp: tx }).await.is_ok() {
            let _ = rx.await;
        }

        if let Some(handle) = self.actor.lock().await.take() {
            let _ = handle.await;
        }

        Ok(())
    }
}

/// Creates a Redis Pub/Sub transport from the given configuration.
///
/// # Errors
///
/// Returns an error if:
/// - The broker URI is missing or cannot be parsed
/// - Connection to the Redis broker fails (both connections are eager)
pub async fn create_transport(config: TransportConfig) -> Result<TransportPtr> {
    // ---
    if config.uri.is_empty() {
        return Err(Error::MissingConfig("redis transport requires a URI".into()));
    }
    let uri = config.uri.as_str();

    let client = redis::Client::open(uri).map_err(|err| {
        let msg = format!("redis: failed to open client for URI {uri}: {err}");
        log_error!("{msg}");
        Error::Transport(msg)
    })?;

    let publish_conn = client
        .get_multiplexed_async_connection()
        .await
        .map_err(|err| {
            let msg = format!("redis: failed to connect publish connection to {uri}: {err}");
            log_error!("{msg}");
            Error::Transport(msg)
        })?;

    let (pubsub_sink, pubsub_stream) = client
        .get_async_pubsub()
        .await
        .map_err(|err| {
            let msg = format!("redis: failed to connect pubsub connection to {uri}: {err}");
            log_error!("{msg}");
            Error::Transport(msg)
        })?
        .split();

    log_info!("{}: connected to Redis broker at {uri}", config.node_id);

    Ok(RedisTransport::create(
        TransportBase::from(&config),
        publish_conn,
        pubsub_sink,
        pubsub_stream,
    ))
}
