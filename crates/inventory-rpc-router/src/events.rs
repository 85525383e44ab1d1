//! Events emitted once per routed request.

use inventory_rpc_core::RpcEvent;
use std::fmt;
use std::time::{Duration, Instant};

/// How a routed request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouterOutcome {
    /// A correlated reply arrived before the deadline.
    Ok,
    /// The deadline elapsed and the fallback record was served.
    TimeoutFallback,
    /// The broker or the reply failed and the fallback record was served.
    ErrorFallback,
}

impl RouterOutcome {
    /// Returns the outcome label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            RouterOutcome::Ok => "ok",
            RouterOutcome::TimeoutFallback => "timeout_fallback",
            RouterOutcome::ErrorFallback => "error_fallback",
        }
    }
}

impl fmt::Display for RouterOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events emitted by the reply router, one per request.
#[derive(Debug, Clone)]
pub enum RouterEvent {
    /// A correlated reply was handed to the caller.
    Replied {
        source_name: String,
        timestamp: Instant,
        correlation_id: String,
        from_cache: bool,
        duration: Duration,
    },
    /// The fallback record was served instead of a reply.
    Fallback {
        source_name: String,
        timestamp: Instant,
        correlation_id: String,
        outcome: RouterOutcome,
        error: Option<String>,
        duration: Duration,
    },
}

impl RouterEvent {
    /// Returns the request outcome.
    pub fn outcome(&self) -> RouterOutcome {
        match self {
            RouterEvent::Replied { .. } => RouterOutcome::Ok,
            RouterEvent::Fallback { outcome, .. } => *outcome,
        }
    }

    /// Returns the provenance flag of the reply handed to the caller.
    pub fn from_cache(&self) -> bool {
        match self {
            RouterEvent::Replied { from_cache, .. } => *from_cache,
            RouterEvent::Fallback { .. } => true,
        }
    }

    /// Returns the time from the start of the request to its answer.
    pub fn duration(&self) -> Duration {
        match self {
            RouterEvent::Replied { duration, .. } | RouterEvent::Fallback { duration, .. } => {
                *duration
            }
        }
    }

    /// Returns the failure text for `error_fallback` outcomes.
    pub fn error(&self) -> Option<&str> {
        match self {
            RouterEvent::Replied { .. } => None,
            RouterEvent::Fallback { error, .. } => error.as_deref(),
        }
    }
}

impl RpcEvent for RouterEvent {
    fn event_type(&self) -> &'static str {
        "request"
    }

    fn timestamp(&self) -> Instant {
        match self {
            RouterEvent::Replied { timestamp, .. } | RouterEvent::Fallback { timestamp, .. } => {
                *timestamp
            }
        }
    }

    fn source_name(&self) -> &str {
        match self {
            RouterEvent::Replied { source_name, .. }
            | RouterEvent::Fallback { source_name, .. } => source_name,
        }
    }

    fn correlation_id(&self) -> Option<&str> {
        match self {
            RouterEvent::Replied { correlation_id, .. }
            | RouterEvent::Fallback { correlation_id, .. } => Some(correlation_id),
        }
    }
}
