//! Transport builder for creating transport instances.
//!
//! Provides a fluent builder API for constructing transports with clear
//! separation between required and optional configuration.

use crate::{Error, Result, TransportConfig, TransportPtr, DEFAULT_INBOX_CAPACITY};

/// Builder for creating transport instances.
///
/// # Examples
///
/// ## In-process memory transport
/// ```
/// use typed_sub::TransportBuilder;
///
/// # async fn example() -> typed_sub::Result<()> {
/// let transport = TransportBuilder::new()
///     .node_id("orders-service")
///     .transport_type("memory")
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
///
/// ## Redis, inferred from the URI scheme
/// ```no_run
/// use typed_sub::TransportBuilder;
///
/// # async fn example() -> typed_sub::Result<()> {
/// let transport = TransportBuilder::new()
///     .uri("redis://localhost:6379")
///     .node_id("orders-service")
///     .inbox_capacity(256)
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct TransportBuilder {
    uri: Option<String>,
    node_id: Option<String>,
    transport_type: Option<String>,
    inbox_capacity: Option<usize>,
}

impl TransportBuilder {
    /// Create a new transport builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the broker URI.
    ///
    /// Examples:
    /// - `"redis://localhost:6379"`
    /// - `"memory://"` (or leave unset for the memory transport)
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Set the node ID (required). Used to tag log lines.
    pub fn node_id(mut self, id: impl Into<String>) -> Self {
        self.node_id = Some(id.into());
        self
    }

    /// Set explicit transport type.
    ///
    /// Valid values: `"memory"`, `"redis"`
    ///
    /// If not specified, a Redis URI scheme selects Redis and anything else memory.
    pub fn transport_type(mut self, flag: impl Into<String>) -> Self {
        self.transport_type = Some(flag.into());
        self
    }

    /// Set the capacity of each subscription inbox.
    ///
    /// Default: 16.
    pub fn inbox_capacity(mut self, capacity: usize) -> Self {
        self.inbox_capacity = Some(capacity);
        self
    }

    /// Build the transport (consumes self).
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - `node_id` is missing
    /// - `inbox_capacity` is zero
    /// - the explicit transport type is unknown
    /// - transport creation fails
    pub async fn build(self) -> Result<TransportPtr> {
        // ---
        let node_id = self
            .node_id
            .ok_or_else(|| Error::MissingConfig("node_id".into()))?;

        let inbox_capacity = self.inbox_capacity.unwrap_or(DEFAULT_INBOX_CAPACITY);
        if inbox_capacity == 0 {
            return Err(Error::ConfigConflict(
                "inbox_capacity must be at least 1".into(),
            ));
        }

        let uri = self.uri.unwrap_or_default();

        let transport_type = match self.transport_type {
            Some(explicit) => explicit,
            None => infer_transport_type(&uri).to_string(),
        };

        let config = TransportConfig {
            uri,
            node_id,
            transport_type: Some(transport_type.clone()),
            inbox_capacity,
        };

        match transport_type.as_str() {
            "memory" => crate::create_memory_transport(config).await,
            "redis" => crate::create_redis_transport(config).await,
            other => Err(Error::Transport(format!(
                "unrecognized transport_type: {other}, valid values: memory, redis"
            ))),
        }
    }
}

/// Broker transport named by the URI scheme, or memory when none matches.
fn infer_transport_type(uri: &str) -> &'static str {
    // ---
    match uri.split_once("://").map(|(scheme, _)| scheme) {
        Some("redis") | Some("rediss") | Some("redis+unix") => "redis",
        _ => "memory",
    }
}
