//! Observation hooks for routed requests and worker attempts.
//!
//! The router and the retry executor report each outcome as an [`RpcEvent`].
//! Audit logging, metrics and test assertions all hang off
//! [`EventListeners`], so the protocol code has no logging of its own beyond
//! debug tracing.

use std::fmt;
use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

/// An outcome reported by a router or an executor.
pub trait RpcEvent: Send + Sync + fmt::Debug {
    /// Record kind in the audit log, `"request"` or `"attempt"`.
    fn event_type(&self) -> &'static str;

    /// When the outcome was reached.
    fn timestamp(&self) -> Instant;

    /// Configured name of the router or executor.
    fn source_name(&self) -> &str;

    /// Correlation id of the external request; `None` for foreign producers.
    fn correlation_id(&self) -> Option<&str>;
}

/// Receives events of one kind.
pub trait EventListener<E: RpcEvent>: Send + Sync {
    /// Observes `event`. Panics are contained by [`EventListeners::emit`].
    fn on_event(&self, event: &E);
}

/// A listener that may be registered on several components.
pub type BoxedEventListener<E> = Arc<dyn EventListener<E>>;

/// The listeners registered on one router or executor.
#[derive(Clone)]
pub struct EventListeners<E: RpcEvent> {
    listeners: Vec<BoxedEventListener<E>>,
}

impl<E: RpcEvent> EventListeners<E> {
    /// No listeners.
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    /// Registers `listener`, taking ownership.
    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Registers a listener that is also held elsewhere.
    pub fn add_shared(&mut self, listener: BoxedEventListener<E>) {
        self.listeners.push(listener);
    }

    /// Delivers `event` to every listener in registration order.
    ///
    /// A listener that panics is skipped; later listeners still see the event
    /// and the request or delivery carries on.
    pub fn emit(&self, event: &E) {
        for listener in &self.listeners {
            let _ = catch_unwind(AssertUnwindSafe(|| listener.on_event(event)));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }
}

impl<E: RpcEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: RpcEvent> fmt::Debug for EventListeners<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventListeners")
            .field("len", &self.listeners.len())
            .finish()
    }
}

/// Adapts a closure into an [`EventListener`]; used by the `on_*` builder callbacks.
pub struct FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    f: F,
    _event: PhantomData<fn(&E)>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _event: PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: RpcEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}
