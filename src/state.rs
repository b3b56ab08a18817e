//! Breaker status word and the transitions allowed on it.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::time::{Duration, Instant};

/// Operating status of a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Calls are admitted normally.
    Closed = 0,

    /// Calls are rejected until the reset timeout elapses.
    Open = 1,

    /// A bounded number of trial calls are admitted to test recovery.
    HalfOpen = 2,
}

impl From<u8> for State {
    fn from(value: u8) -> Self {
        match value {
            0 => State::Closed,
            1 => State::Open,
            2 => State::HalfOpen,
            _ => State::Closed,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Closed => write!(f, "closed"),
            State::Open => write!(f, "open"),
            State::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// The shared status word plus probe accounting.
///
/// Every transition is a compare-and-swap from an expected status, so two
/// racing calls can never perform the same transition twice; a transition
/// that loses its race reports `false` and the loser re-reads the status.
pub(crate) struct StateMachine {
    status: AtomicU8,
    changed_at: parking_lot::Mutex<Instant>,
    active_probes: AtomicU32,
}

impl StateMachine {
    pub(crate) fn new() -> Self {
        Self {
            status: AtomicU8::new(State::Closed as u8),
            changed_at: parking_lot::Mutex::new(Instant::now()),
            active_probes: AtomicU32::new(0),
        }
    }

    pub(crate) fn current(&self) -> State {
        State::from(self.status.load(Ordering::Acquire))
    }

    /// Time spent in the current status since the last transition.
    pub(crate) fn time_in_status(&self) -> Duration {
        self.changed_at.lock().elapsed()
    }

    fn swap(&self, from: State, to: State) -> bool {
        let moved = self
            .status
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if moved {
            *self.changed_at.lock() = Instant::now();
        }

        moved
    }

    /// Closed -> Open, after the trip policy fires.
    pub(crate) fn trip(&self) -> bool {
        self.swap(State::Closed, State::Open)
    }

    /// Open -> HalfOpen, once the reset timeout has elapsed. Performed by
    /// the first call to arrive after expiry, never by a background timer.
    pub(crate) fn begin_recovery(&self) -> bool {
        self.swap(State::Open, State::HalfOpen)
    }

    /// HalfOpen -> Closed, after a probe succeeded.
    pub(crate) fn close_after_probe(&self) -> bool {
        self.swap(State::HalfOpen, State::Closed)
    }

    /// HalfOpen -> Open, after a probe failed or timed out. Re-stamps the
    /// instant the reset timeout is measured from.
    pub(crate) fn reopen_after_probe(&self) -> bool {
        self.swap(State::HalfOpen, State::Open)
    }

    /// Claims one probe slot if fewer than `limit` probes are in flight.
    pub(crate) fn try_begin_probe(&self, limit: u32) -> bool {
        self.active_probes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |probes| {
                (probes < limit).then_some(probes + 1)
            })
            .is_ok()
    }

    /// Releases a probe slot once the probe's outcome has been recorded.
    pub(crate) fn end_probe(&self) {
        let _ = self
            .active_probes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |probes| {
                probes.checked_sub(1)
            });
    }
}
