use thiserror::Error;

/// Errors produced while setting up or servicing typed subscriptions.
#[derive(Error, Debug)]
pub enum Error {
    /// A caller-supplied argument was rejected before any transport call.
    #[error("invalid argument `{param}`: {reason}")]
    InvalidArgument {
        /// Name of the offending parameter.
        param: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The transport refused or failed to register a subscription.
    #[error("registration failed for channel {channel}: {source}")]
    Registration {
        channel: String,
        #[source]
        source: Box<Error>,
    },

    /// A delivered payload could not be decoded into the requested type.
    ///
    /// Raised inside the transport's delivery context, never returned to the
    /// caller that created the subscription.
    #[error("in {operation}: cannot deserialize payload on channel {channel}: {payload}")]
    Deserialization {
        channel: String,
        operation: &'static str,
        payload: String,
    },

    /// Transport-level failure (connection, broker, actor channel).
    #[error("transport error: {0}")]
    Transport(String),

    /// Transient transport failure; eligible for retry when retry is configured.
    #[error("transport error (retryable): {0}")]
    TransportRetryable(String),

    /// JSON serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Required configuration value missing.
    #[error("missing required configuration: {0}")]
    MissingConfig(String),

    /// Configuration values are mutually inconsistent.
    #[error("configuration conflict: {0}")]
    ConfigConflict(String),

    /// The operation cannot run on the calling thread's execution context.
    #[error("invalid execution context: {0}")]
    InvalidContext(String),
}

/// Result type alias for subscription operations
pub type Result<T> = std::result::Result<T, Error>;
