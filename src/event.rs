//! Structured breaker events and the listener registry.
//!
//! The core never formats log text. It hands plain records to whoever
//! subscribed; a logging collaborator decides what becomes of them.

use crate::error::RejectReason;
use crate::metrics::Outcome;
use crate::state::State;
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::sync::Arc;
use std::time::Duration;

/// A structured record describing something the breaker did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BreakerEvent {
    /// The status word moved from one state to another.
    StateChanged {
        /// Status before the transition.
        from: State,
        /// Status after the transition.
        to: State,
    },

    /// An admitted call finished and its outcome was recorded.
    OutcomeRecorded {
        /// How the attempt ended.
        outcome: Outcome,
        /// Whether the attempt ran as a half-open probe.
        probe: bool,
        /// Wall time the attempt occupied the caller.
        elapsed: Duration,
    },

    /// A call was declined without running the protected work.
    CallRejected {
        /// Why the breaker declined.
        reason: RejectReason,
    },
}

type ListenerFn = Arc<dyn Fn(&BreakerEvent) + Send + Sync + 'static>;

/// Registry of event listeners attached to one supervisor.
///
/// Listeners run on the calling thread, outside the breaker's lock paths,
/// so a slow listener delays its own call but never the admission decision
/// of concurrent callers.
#[derive(Default)]
pub struct EventListeners {
    listeners: RwLock<SmallVec<[ListenerFn; 2]>>,
}

impl EventListeners {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener invoked for every emitted event.
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&BreakerEvent) + Send + Sync + 'static,
    {
        self.listeners.write().push(Arc::new(listener));
    }

    pub(crate) fn emit(&self, event: &BreakerEvent) {
        let listeners = self.listeners.read();
        for listener in listeners.iter() {
            listener(event);
        }
    }
}

/// A listener that forwards events as structured `tracing` records.
///
/// Transitions are emitted at `info`, per-call records at `debug`.
#[cfg(feature = "tracing")]
pub fn tracing_listener() -> impl Fn(&BreakerEvent) + Send + Sync + 'static {
    |event| match event {
        BreakerEvent::StateChanged { from, to } => {
            tracing::info!(from = %from, to = %to, "breaker state changed");
        }
        BreakerEvent::OutcomeRecorded {
            outcome,
            probe,
            elapsed,
        } => {
            tracing::debug!(?outcome, probe, ?elapsed, "call outcome recorded");
        }
        BreakerEvent::CallRejected { reason } => {
            tracing::debug!(reason = %reason, "call rejected");
        }
    }
}
