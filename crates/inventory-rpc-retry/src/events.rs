//! Events emitted per upstream attempt and per delivery outcome.

use crate::handler::TerminalState;
use inventory_rpc_core::RpcEvent;
use std::fmt;
use std::time::{Duration, Instant};

/// Result of one upstream attempt, as logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttemptOutcome {
    /// The upstream answered.
    Ok,
    /// The upstream did not answer within the per-attempt timeout.
    UpstreamTimeout,
    /// The upstream failed.
    Error,
    /// Retries were exhausted and the fallback record was replied.
    FallbackCache,
}

impl AttemptOutcome {
    /// Returns the outcome label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Ok => "ok",
            AttemptOutcome::UpstreamTimeout => "upstream_timeout",
            AttemptOutcome::Error => "error",
            AttemptOutcome::FallbackCache => "fallback_cache",
        }
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events emitted by the retry executor.
#[derive(Debug, Clone)]
pub enum AttemptEvent {
    /// An upstream attempt finished.
    Attempt {
        source_name: String,
        timestamp: Instant,
        correlation_id: Option<String>,
        attempt: u32,
        outcome: AttemptOutcome,
        error: Option<String>,
        duration: Duration,
    },
    /// The message was republished to the delay queue.
    ///
    /// `cause` is the outcome of the attempt that failed; the attempt itself
    /// was already reported by an [`AttemptEvent::Attempt`].
    Recirculated {
        source_name: String,
        timestamp: Instant,
        correlation_id: Option<String>,
        next_attempt: u32,
        cause: AttemptOutcome,
    },
    /// Retries were exhausted and the fallback record was replied.
    Fallback {
        source_name: String,
        timestamp: Instant,
        correlation_id: Option<String>,
        attempt: u32,
    },
}

impl AttemptEvent {
    /// Returns the outcome label for this event.
    pub fn outcome(&self) -> AttemptOutcome {
        match self {
            AttemptEvent::Attempt { outcome, .. } => *outcome,
            AttemptEvent::Recirculated { cause, .. } => *cause,
            AttemptEvent::Fallback { .. } => AttemptOutcome::FallbackCache,
        }
    }

    /// Returns the attempt counter the event refers to.
    pub fn attempt(&self) -> u32 {
        match self {
            AttemptEvent::Attempt { attempt, .. } | AttemptEvent::Fallback { attempt, .. } => {
                *attempt
            }
            AttemptEvent::Recirculated { next_attempt, .. } => *next_attempt,
        }
    }

    /// Returns the terminal state reached, if this event ends the delivery.
    pub fn terminal_state(&self) -> Option<TerminalState> {
        match self {
            AttemptEvent::Attempt {
                outcome: AttemptOutcome::Ok,
                ..
            } => Some(TerminalState::RepliedLive),
            AttemptEvent::Attempt { .. } => None,
            AttemptEvent::Recirculated { .. } => Some(TerminalState::Recirculated),
            AttemptEvent::Fallback { .. } => Some(TerminalState::RepliedFallback),
        }
    }
}

impl RpcEvent for AttemptEvent {
    fn event_type(&self) -> &'static str {
        "attempt"
    }

    fn timestamp(&self) -> Instant {
        match self {
            AttemptEvent::Attempt { timestamp, .. }
            | AttemptEvent::Recirculated { timestamp, .. }
            | AttemptEvent::Fallback { timestamp, .. } => *timestamp,
        }
    }

    fn source_name(&self) -> &str {
        match self {
            AttemptEvent::Attempt { source_name, .. }
            | AttemptEvent::Recirculated { source_name, .. }
            | AttemptEvent::Fallback { source_name, .. } => source_name,
        }
    }

    fn correlation_id(&self) -> Option<&str> {
        match self {
            AttemptEvent::Attempt { correlation_id, .. }
            | AttemptEvent::Recirculated { correlation_id, .. }
            | AttemptEvent::Fallback { correlation_id, .. } => correlation_id.as_deref(),
        }
    }
}
