//! Typed subscriber builder.
//!
//! Provides a fluent builder API for configuring [`TypedSubscriber`]
//! instances with a codec, a runtime handle and registration retry.

use std::time::Duration;

use tokio::runtime::Handle;

use crate::{Codec, Error, JsonCodec, Result, RetryConfig, TransportPtr, TypedSubscriber};

/// Builder for creating typed subscribers.
///
/// # Examples
///
/// ## Retrying registration against a broker that may still be starting
/// ```no_run
/// use typed_sub::{SubscriberBuilder, TransportBuilder};
/// use std::time::Duration;
///
/// # async fn example() -> typed_sub::Result<()> {
/// let transport = TransportBuilder::new()
///     .uri("redis://localhost:6379")
///     .node_id("billing")
///     .build()
///     .await?;
///
/// let subscriber = SubscriberBuilder::new(transport)
///     .retry_max_attempts(10)
///     .retry_initial_delay(Duration::from_millis(200))
///     .build()?;
/// # Ok(())
/// # }
/// ```
///
/// ## Blocking subscriptions from a thread outside the runtime
/// ```no_run
/// use typed_sub::{SubscriberBuilder, TransportBuilder};
///
/// # fn example() -> typed_sub::Result<()> {
/// let runtime = tokio::runtime::Runtime::new().expect("runtime");
/// let transport = runtime.block_on(TransportBuilder::new().node_id("sync").build())?;
///
/// let subscriber = SubscriberBuilder::new(transport)
///     .runtime(runtime.handle().clone())
///     .build()?;
///
/// subscriber.subscribe("alerts", |alert: String| eprintln!("{alert}"))?;
/// # Ok(())
/// # }
/// ```
pub struct SubscriberBuilder<C = JsonCodec> {
    // ---
    transport: TransportPtr,
    codec: C,
    runtime: Option<Handle>,

    // Retry configuration (all optional)
    retry_max_attempts: Option<u32>,
    retry_multiplier: Option<f32>,
    retry_initial_delay: Option<Duration>,
    retry_max_delay: Option<Duration>,
}

impl SubscriberBuilder<JsonCodec> {
    /// Create a new builder using [`JsonCodec`].
    pub fn new(transport: TransportPtr) -> Self {
        // ---
        Self {
            transport,
            codec: JsonCodec,
            runtime: None,
            retry_max_attempts: None,
            retry_multiplier: None,
            retry_initial_delay: None,
            retry_max_delay: None,
        }
    }
}

impl<C: Codec> SubscriberBuilder<C> {
    // ---
    /// Decode payloads with `codec` instead.
    pub fn codec<C2: Codec>(self, codec: C2) -> SubscriberBuilder<C2> {
        // ---
        SubscriberBuilder {
            transport: self.transport,
            codec,
            runtime: self.runtime,
            retry_max_attempts: self.retry_max_attempts,
            retry_multiplier: self.retry_multiplier,
            retry_initial_delay: self.retry_initial_delay,
            retry_max_delay: self.retry_max_delay,
        }
    }

    /// Runtime that blocking subscriptions register and deliver on.
    ///
    /// Default: the runtime current when [`build`](Self::build) is called.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Set maximum retry attempts.
    ///
    /// Default: no retries (single attempt).
    pub fn retry_max_attempts(mut self, attempts: u32) -> Self {
        self.retry_max_attempts = Some(attempts);
        self
    }

    /// Set retry backoff multiplier.
    ///
    /// Default: 2.0.
    pub fn retry_multiplier(mut self, multiplier: f32) -> Self {
        self.retry_multiplier = Some(multiplier);
        self
    }

    /// Set initial delay before first retry.
    ///
    /// Default: 100ms.
    pub fn retry_initial_delay(mut self, delay: Duration) -> Self {
        self.retry_initial_delay = Some(delay);
        self
    }

    /// Set maximum delay between retry attempts.
    ///
    /// Default: 5s.
    pub fn retry_max_delay(mut self, delay: Duration) -> Self {
        self.retry_max_delay = Some(delay);
        self
    }

    /// Build the subscriber (consumes self).
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingConfig`] if no runtime handle was given and
    /// none is current.
    pub fn build(self) -> Result<TypedSubscriber<C>> {
        // ---
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current()
                .map_err(|_| Error::MissingConfig("tokio runtime handle".into()))?,
        };

        // Build retry config only if at least one retry parameter was set
        let retry_config = if self.retry_max_attempts.is_some()
            || self.retry_multiplier.is_some()
            || self.retry_initial_delay.is_some()
            || self.retry_max_delay.is_some()
        {
            let defaults = RetryConfig::default();
            Some(RetryConfig {
                max_attempts: self.retry_max_attempts.unwrap_or(defaults.max_attempts),
                multiplier: self.retry_multiplier.unwrap_or(defaults.multiplier),
                initial_delay: self.retry_initial_delay.unwrap_or(defaults.initial_delay),
                max_delay: self.retry_max_delay.unwrap_or(defaults.max_delay),
            })
        } else {
            None
        };

        Ok(TypedSubscriber::from_parts(
            self.transport,
            self.codec,
            runtime,
            retry_config,
        ))
    }
}
