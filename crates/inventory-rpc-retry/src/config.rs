//! Configuration for the retry executor.

use crate::events::{AttemptEvent, AttemptOutcome};
use inventory_rpc_core::events::BoxedEventListener;
use inventory_rpc_core::{EventListeners, FnListener};
use std::time::Duration;

/// Configuration for the retry executor.
pub struct RetryConfig {
    pub(crate) max_retries: u32,
    pub(crate) attempt_timeout: Duration,
    pub(crate) retry_routing_key: String,
    pub(crate) event_listeners: EventListeners<AttemptEvent>,
    pub(crate) name: String,
}

impl RetryConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Number of recirculations allowed before the fallback is replied.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Upper bound for a single upstream call.
    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Upstream time a request can consume across all its attempts.
    ///
    /// Delay-queue waits between attempts are not included.
    pub fn upstream_budget(&self) -> Duration {
        self.attempt_timeout.saturating_mul(self.max_retries.saturating_add(1))
    }
}

/// Builder for [`RetryConfig`].
pub struct RetryConfigBuilder {
    max_retries: u32,
    attempt_timeout: Duration,
    retry_routing_key: String,
    event_listeners: EventListeners<AttemptEvent>,
    name: String,
}

impl RetryConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            max_retries: 2,
            attempt_timeout: Duration::from_millis(1500),
            retry_routing_key: String::from("inventory.retry"),
            event_listeners: EventListeners::new(),
            name: String::from("<unnamed>"),
        }
    }

    /// Sets how many times a failed message is recirculated.
    ///
    /// A message whose attempt counter has reached this value is answered
    /// from the fallback store instead.
    ///
    /// Default: 2
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the timeout for a single upstream call.
    ///
    /// Default: 1.5 seconds
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Sets the routing key of the delay queue.
    ///
    /// Default: `"inventory.retry"`
    pub fn retry_routing_key(mut self, key: impl Into<String>) -> Self {
        self.retry_routing_key = key.into();
        self
    }

    /// Sets the name of this executor instance for observability.
    ///
    /// Default: `"<unnamed>"`
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback invoked after every upstream attempt.
    pub fn on_attempt<F>(mut self, f: F) -> Self
    where
        F: Fn(u32, AttemptOutcome) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let AttemptEvent::Attempt {
                attempt, outcome, ..
            } = event
            {
                f(*attempt, *outcome);
            }
        }));
        self
    }

    /// Registers a callback invoked when a message is recirculated.
    ///
    /// The callback receives the attempt counter of the republished copy.
    pub fn on_recirculate<F>(mut self, f: F) -> Self
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let AttemptEvent::Recirculated { next_attempt, .. } = event {
                f(*next_attempt);
            }
        }));
        self
    }

    /// Registers a callback invoked when the fallback record is replied.
    pub fn on_fallback<F>(mut self, f: F) -> Self
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let AttemptEvent::Fallback { attempt, .. } = event {
                f(*attempt);
            }
        }));
        self
    }

    /// Registers a listener receiving every executor event.
    pub fn event_listener(mut self, listener: BoxedEventListener<AttemptEvent>) -> Self {
        self.event_listeners.add_shared(listener);
        self
    }

    /// Builds the executor configuration.
    pub fn build(self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            attempt_timeout: self.attempt_timeout,
            retry_routing_key: self.retry_routing_key,
            event_listeners: self.event_listeners,
            name: self.name,
        }
    }
}

impl Default for RetryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
