//! Configuration for the reply router.

use crate::events::{RouterEvent, RouterOutcome};
use inventory_rpc_core::events::BoxedEventListener;
use inventory_rpc_core::{EventListeners, FnListener, EMPTY_QUERY};
use std::time::Duration;

/// Configuration for the reply router.
pub struct ReplyRouterConfig {
    pub(crate) deadline: Duration,
    pub(crate) poll_slice: Duration,
    pub(crate) query_routing_key: String,
    pub(crate) payload: Vec<u8>,
    pub(crate) event_listeners: EventListeners<RouterEvent>,
    pub(crate) name: String,
}

impl ReplyRouterConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ReplyRouterConfigBuilder {
        ReplyRouterConfigBuilder::new()
    }

    /// Caller-facing deadline for one request.
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Longest single wait on the reply queue.
    pub fn poll_slice(&self) -> Duration {
        self.poll_slice
    }
}

/// Builder for [`ReplyRouterConfig`].
pub struct ReplyRouterConfigBuilder {
    deadline: Duration,
    poll_slice: Duration,
    query_routing_key: String,
    payload: Vec<u8>,
    event_listeners: EventListeners<RouterEvent>,
    name: String,
}

impl ReplyRouterConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            deadline: Duration::from_millis(1800),
            poll_slice: Duration::from_millis(50),
            query_routing_key: String::from("inventory.query"),
            payload: EMPTY_QUERY.to_vec(),
            event_listeners: EventListeners::new(),
            name: String::from("<unnamed>"),
        }
    }

    /// Sets how long a caller waits for a correlated reply.
    ///
    /// The deadline is computed once when the request starts; opening the
    /// session and publishing count against it.
    ///
    /// Default: 1.8 seconds
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Sets the longest single wait on the reply queue.
    ///
    /// Default: 50 milliseconds
    pub fn poll_slice(mut self, slice: Duration) -> Self {
        self.poll_slice = slice.max(Duration::from_millis(1));
        self
    }

    /// Sets the routing key queries are published under.
    ///
    /// Default: `"inventory.query"`
    pub fn query_routing_key(mut self, key: impl Into<String>) -> Self {
        self.query_routing_key = key.into();
        self
    }

    /// Sets the query body.
    ///
    /// Default: `{}`
    pub fn payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Sets the name of this router instance for observability.
    ///
    /// Default: `"<unnamed>"`
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback invoked when a correlated reply is returned.
    ///
    /// The callback receives the request duration and the reply's provenance flag.
    pub fn on_reply<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration, bool) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RouterEvent::Replied {
                duration,
                from_cache,
                ..
            } = event
            {
                f(*duration, *from_cache);
            }
        }));
        self
    }

    /// Registers a callback invoked when the fallback record is served.
    pub fn on_fallback<F>(mut self, f: F) -> Self
    where
        F: Fn(RouterOutcome) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RouterEvent::Fallback { outcome, .. } = event {
                f(*outcome);
            }
        }));
        self
    }

    /// Registers a listener receiving every router event.
    pub fn event_listener(mut self, listener: BoxedEventListener<RouterEvent>) -> Self {
        self.event_listeners.add_shared(listener);
        self
    }

    /// Builds the router configuration.
    pub fn build(self) -> ReplyRouterConfig {
        ReplyRouterConfig {
            deadline: self.deadline,
            poll_slice: self.poll_slice,
            query_routing_key: self.query_routing_key,
            payload: self.payload,
            event_listeners: self.event_listeners,
            name: self.name,
        }
    }
}

impl Default for ReplyRouterConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
