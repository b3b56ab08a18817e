//! Trip policies: deciding when recorded faults open the circuit.

use crate::metrics::{CallStats, WindowCounts};

/// Decides whether the circuit should trip open.
///
/// Evaluated after each fault recorded while the breaker is closed. The
/// half-open-to-closed decision is not a policy concern: a single
/// successful probe closes the circuit.
pub trait TripPolicy: Send + Sync + 'static {
    /// Returns `true` when the recorded history warrants opening.
    fn should_trip(&self, stats: &CallStats, window: &WindowCounts) -> bool;
}

/// Trips after an unbroken run of failures. The default policy.
pub struct ConsecutivePolicy {
    threshold: u32,
}

impl ConsecutivePolicy {
    /// Trips once `threshold` consecutive faults have been recorded.
    pub fn new(threshold: u32) -> Self {
        Self { threshold }
    }
}

impl TripPolicy for ConsecutivePolicy {
    fn should_trip(&self, stats: &CallStats, _window: &WindowCounts) -> bool {
        stats.consecutive_failures() >= self.threshold
    }
}

/// Trips when the rolling window holds enough faults, regardless of how
/// they interleave with successes.
pub struct WindowedCountPolicy {
    threshold: u64,
}

impl WindowedCountPolicy {
    /// Trips once the window holds at least `threshold` faults.
    pub fn new(threshold: u64) -> Self {
        Self { threshold }
    }
}

impl TripPolicy for WindowedCountPolicy {
    fn should_trip(&self, _stats: &CallStats, window: &WindowCounts) -> bool {
        window.faults() >= self.threshold
    }
}

/// Trips on the windowed failure ratio, once enough calls have been seen
/// to make the ratio meaningful.
pub struct WindowedRatioPolicy {
    ratio: f64,
    min_calls: u64,
}

impl WindowedRatioPolicy {
    /// Trips once at least `min_calls` executed outcomes sit in the window
    /// and the fraction of faults among them reaches `ratio`.
    pub fn new(ratio: f64, min_calls: u64) -> Self {
        Self { ratio, min_calls }
    }
}

impl TripPolicy for WindowedRatioPolicy {
    fn should_trip(&self, _stats: &CallStats, window: &WindowCounts) -> bool {
        window.total() >= self.min_calls && window.failure_ratio() >= self.ratio
    }
}
