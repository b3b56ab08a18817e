//! Rolling outcome records backing trip decisions and snapshots.

use parking_lot::Mutex;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Terminal classification of one call attempt.
///
/// Exactly one outcome is recorded per attempt, and an outcome is never
/// revised after recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The work completed and reported success.
    Success,

    /// The work completed and reported a domain error, or panicked.
    Failure,

    /// The work missed the configured deadline.
    Timeout,

    /// The breaker declined to run the work.
    Rejected,
}

impl Outcome {
    /// Whether this outcome counts toward failure thresholds.
    ///
    /// Timeouts count like failures; rejections never do.
    pub fn is_fault(&self) -> bool {
        matches!(self, Outcome::Failure | Outcome::Timeout)
    }
}

/// Aggregate counts over a window of executed outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowCounts {
    successes: u64,
    failures: u64,
    timeouts: u64,
}

impl WindowCounts {
    /// Successes currently inside the window.
    pub fn successes(&self) -> u64 {
        self.successes
    }

    /// Failures currently inside the window.
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Timeouts currently inside the window.
    pub fn timeouts(&self) -> u64 {
        self.timeouts
    }

    /// All executed outcomes inside the window.
    pub fn total(&self) -> u64 {
        self.successes + self.failures + self.timeouts
    }

    /// Failures plus timeouts, the quantity thresholds are evaluated on.
    pub fn faults(&self) -> u64 {
        self.failures + self.timeouts
    }

    /// Fraction of executed outcomes that were faults, 0.0 when empty.
    pub fn failure_ratio(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }

        self.faults() as f64 / total as f64
    }

    fn add(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Success => self.successes += 1,
            Outcome::Failure => self.failures += 1,
            Outcome::Timeout => self.timeouts += 1,
            Outcome::Rejected => {}
        }
    }

    fn remove(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Success => self.successes = self.successes.saturating_sub(1),
            Outcome::Failure => self.failures = self.failures.saturating_sub(1),
            Outcome::Timeout => self.timeouts = self.timeouts.saturating_sub(1),
            Outcome::Rejected => {}
        }
    }

    fn merge(&mut self, other: &WindowCounts) {
        self.successes += other.successes;
        self.failures += other.failures;
        self.timeouts += other.timeouts;
    }
}

struct RingInner {
    slots: Vec<Outcome>,
    head: usize,
    counts: WindowCounts,
}

/// Count-based rolling window: the last `capacity` executed outcomes.
///
/// Running counts are maintained on insert, so both recording and querying
/// are O(1) under a single short lock.
pub struct RingWindow {
    inner: Mutex<RingInner>,
    capacity: usize,
}

impl RingWindow {
    /// Creates a window remembering the last `capacity` executed outcomes.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(RingInner {
                slots: Vec::with_capacity(capacity),
                head: 0,
                counts: WindowCounts::default(),
            }),
            capacity,
        }
    }

    /// Records an executed outcome, evicting the oldest slot when full.
    /// Rejected outcomes are not window material and are ignored.
    pub fn record(&self, outcome: Outcome) {
        if outcome == Outcome::Rejected {
            return;
        }

        let mut inner = self.inner.lock();
        if inner.slots.len() == self.capacity {
            let head = inner.head;
            let evicted = inner.slots[head];
            inner.counts.remove(evicted);
            inner.slots[head] = outcome;
        } else {
            inner.slots.push(outcome);
        }

        inner.head = (inner.head + 1) % self.capacity;
        inner.counts.add(outcome);
    }

    /// Current aggregate counts.
    pub fn counts(&self) -> WindowCounts {
        self.inner.lock().counts
    }

    /// Forgets all recorded outcomes.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.slots.clear();
        inner.head = 0;
        inner.counts = WindowCounts::default();
    }
}

#[derive(Clone, Copy)]
struct Bucket {
    started: Instant,
    counts: WindowCounts,
}

/// Time-bucketed rolling window: fixed-width buckets over a rolling span.
///
/// Expired buckets are evicted lazily on write; reads aggregate the
/// non-expired buckets without mutating anything.
pub struct BucketWindow {
    buckets: Mutex<SmallVec<[Bucket; 16]>>,
    span: Duration,
    bucket_span: Duration,
}

impl BucketWindow {
    /// Creates a window covering `span`, divided into `buckets` slots.
    pub fn new(span: Duration, buckets: usize) -> Self {
        let buckets = buckets.max(1);
        Self {
            buckets: Mutex::new(SmallVec::new()),
            span,
            bucket_span: span / buckets as u32,
        }
    }

    /// Records an executed outcome into the current bucket.
    /// Rejected outcomes are not window material and are ignored.
    pub fn record(&self, outcome: Outcome) {
        if outcome == Outcome::Rejected {
            return;
        }

        let mut buckets = self.buckets.lock();
        let now = Instant::now();
        self.evict_expired(&mut buckets, now);

        if let Some(bucket) = buckets.last_mut() {
            if now.duration_since(bucket.started) < self.bucket_span {
                bucket.counts.add(outcome);
                return;
            }
        }

        let mut counts = WindowCounts::default();
        counts.add(outcome);
        buckets.push(Bucket {
            started: now,
            counts,
        });
    }

    /// Aggregate counts over the non-expired buckets.
    pub fn counts(&self) -> WindowCounts {
        let buckets = self.buckets.lock();
        let cutoff = Instant::now().checked_sub(self.span);

        let mut total = WindowCounts::default();
        for bucket in buckets.iter() {
            if cutoff.map_or(true, |cutoff| bucket.started >= cutoff) {
                total.merge(&bucket.counts);
            }
        }

        total
    }

    /// Forgets all recorded outcomes.
    pub fn reset(&self) {
        self.buckets.lock().clear();
    }

    fn evict_expired(&self, buckets: &mut SmallVec<[Bucket; 16]>, now: Instant) {
        let Some(cutoff) = now.checked_sub(self.span) else {
            return;
        };

        while let Some(bucket) = buckets.first() {
            if bucket.started < cutoff {
                buckets.remove(0);
            } else {
                break;
            }
        }
    }
}

/// Either window mode behind one dispatch point.
pub(crate) enum MetricsWindow {
    Counts(RingWindow),
    Buckets(BucketWindow),
}

impl MetricsWindow {
    pub(crate) fn record(&self, outcome: Outcome) {
        match self {
            MetricsWindow::Counts(window) => window.record(outcome),
            MetricsWindow::Buckets(window) => window.record(outcome),
        }
    }

    pub(crate) fn counts(&self) -> WindowCounts {
        match self {
            MetricsWindow::Counts(window) => window.counts(),
            MetricsWindow::Buckets(window) => window.counts(),
        }
    }

    pub(crate) fn reset(&self) {
        match self {
            MetricsWindow::Counts(window) => window.reset(),
            MetricsWindow::Buckets(window) => window.reset(),
        }
    }
}

/// Per-supervisor counters that outlive any rolling window.
#[derive(Debug, Default)]
pub struct CallStats {
    consecutive_failures: AtomicU32,
    rejected_calls: AtomicU64,
}

impl CallStats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Faults recorded since the last success.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Calls declined without executing work, over the supervisor's lifetime.
    pub fn rejected_calls(&self) -> u64 {
        self.rejected_calls.load(Ordering::Relaxed)
    }

    pub(crate) fn record(&self, outcome: Outcome) {
        match outcome {
            Outcome::Success => self.consecutive_failures.store(0, Ordering::Relaxed),
            Outcome::Failure | Outcome::Timeout => {
                self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::Rejected => {
                self.rejected_calls.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
