//! Typed subscriptions over pub/sub transports.
//!
//! This library lets callers subscribe to a named channel and receive
//! strongly-typed values instead of raw bytes. Registration goes through a
//! pluggable [`Transport`]; payloads are decoded by a [`Codec`] and handed to
//! the caller's handler in the transport's delivery context.
//!
//! Two subscription styles share one registration path:
//!
//! - [`TypedSubscriber::subscribe_async`] for callers already in async code;
//! - [`TypedSubscriber::subscribe`] for synchronous callers that must know the
//!   subscription is live before they continue.
//!

// Import all sub modules once...
mod macros;

mod domain;
mod transport;

mod codec;
mod error;
mod retry;

mod subscriber;
mod subscriber_builder;
mod transport_builder;

#[allow(unused_imports)]
pub(crate) use macros::{log_debug, log_error, log_info, log_warn};

// Re-export main types
pub use subscriber::TypedSubscriber;
pub use subscriber_builder::SubscriberBuilder;
pub use transport_builder::TransportBuilder;

pub use codec::JsonCodec;
pub use error::{Error, Result};
pub use retry::RetryConfig;

pub use transport::{
    //
    create_memory_transport,
    create_memory_transport_with_hub,
    create_redis_transport,
    MemoryHub,
};

// --- public re-exports
pub use domain::{
    //
    Channel,
    Codec,
    DeliveryFault,
    FaultSender,
    MessageCallback,
    RawMessage,
    SubscriptionHandle,
    Transport,
    TransportBase,
    TransportConfig,
    TransportPtr,
    DEFAULT_INBOX_CAPACITY,
};
