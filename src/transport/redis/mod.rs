//! Redis Pub/Sub transport.
//!
//! Backed by the `redis` crate and compiled only with the `transport_redis`
//! feature. Without it the factory below reports that the feature is off.

#[cfg(feature = "transport_redis")]
#[allow(clippy::module_inception)]
mod redis;

#[cfg(feature = "transport_redis")]
pub use self::redis::create_transport as create_redis_transport;

#[cfg(not(feature = "transport_redis"))]
pub async fn create_redis_transport(
    _config: crate::TransportConfig,
) -> crate::Result<crate::TransportPtr> {
    Err(crate::Error::Transport(
        "transport_redis feature is not enabled".into(),
    ))
}
