//! Per-delivery handling contract between the worker loop and the executor.

use futures::future::BoxFuture;
use inventory_rpc_core::{Destination, Envelope};
use std::fmt;

/// Where a delivery ended up once handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminalState {
    /// A live upstream answer was replied.
    RepliedLive,
    /// The message went back through the delay queue.
    Recirculated,
    /// Retries were exhausted and the fallback record was replied.
    RepliedFallback,
}

impl TerminalState {
    /// Returns the state label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminalState::RepliedLive => "replied_live",
            TerminalState::Recirculated => "recirculated",
            TerminalState::RepliedFallback => "replied_fallback",
        }
    }
}

impl fmt::Display for TerminalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A handler's verdict for one delivery.
///
/// Either way the delivery is acknowledged once the outbound message, if
/// any, has been published.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// Answer the caller, then ack.
    ///
    /// Without a reply address there is nobody to answer and only the ack
    /// happens.
    Reply {
        reply_to: Option<String>,
        envelope: Envelope,
        from_cache: bool,
    },
    /// Republish `envelope` under `routing_key`, then ack.
    Recirculate {
        routing_key: String,
        envelope: Envelope,
    },
}

impl Disposition {
    /// Returns the terminal state this disposition represents.
    pub fn state(&self) -> TerminalState {
        match self {
            Disposition::Reply {
                from_cache: false, ..
            } => TerminalState::RepliedLive,
            Disposition::Reply { .. } => TerminalState::RepliedFallback,
            Disposition::Recirculate { .. } => TerminalState::Recirculated,
        }
    }

    /// Returns the message to publish before acknowledging, if any.
    pub fn outbound(&self) -> Option<(Destination, &Envelope)> {
        match self {
            Disposition::Reply {
                reply_to: Some(reply_to),
                envelope,
                ..
            } => Some((Destination::ReplyTo(reply_to.clone()), envelope)),
            Disposition::Reply { reply_to: None, .. } => None,
            Disposition::Recirculate {
                routing_key,
                envelope,
            } => Some((Destination::Route(routing_key.clone()), envelope)),
        }
    }
}

/// Processes one delivered envelope.
///
/// Implementations never touch the broker; the [`Worker`](crate::Worker)
/// publishes and acknowledges according to the returned [`Disposition`].
pub trait MessageHandler: Send {
    /// Handles `envelope` and decides what happens to it.
    fn handle(&mut self, envelope: Envelope) -> BoxFuture<'_, Disposition>;
}
