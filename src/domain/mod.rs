//! Domain layer public interface.
//!
//! This module defines domain-level abstractions that are independent of
//! transport implementations, brokers, or wire formats.
//!
//! All domain consumers must import symbols via this module, not by
//! referencing individual files directly.

mod codec;
mod transport;

pub use codec::Codec;

pub use transport::{
    //
    Channel,
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
