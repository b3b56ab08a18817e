//! Builder-style configuration for breaker supervisors.

use std::marker::PhantomData;
use std::time::Duration;

use crate::error::ConfigError;
use crate::event::{BreakerEvent, EventListeners};
use crate::metrics::{BucketWindow, MetricsWindow, RingWindow};
use crate::policy::{ConsecutivePolicy, TripPolicy};
use crate::supervisor::BreakerSupervisor;

/// Rolling-window selection held until `build` turns it into a window.
#[derive(Debug, Clone, Copy)]
enum WindowShape {
    Counts { size: usize },
    Buckets { span: Duration, buckets: usize },
}

/// Builder for breaker supervisors.
///
/// Every invalid parameter is caught at `build` time and mapped to a
/// distinct [`ConfigError`]; a supervisor that exists is always validly
/// configured.
pub struct BreakerBuilder<P, E>
where
    P: TripPolicy,
    E: std::error::Error + 'static,
{
    failure_threshold: u32,
    call_timeout: Duration,
    reset_timeout: Duration,
    window: WindowShape,
    half_open_max_probes: u32,
    policy: Option<P>,
    listeners: EventListeners,
    _error_type: PhantomData<E>,
}

impl<E> Default for BreakerBuilder<ConsecutivePolicy, E>
where
    E: std::error::Error + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E> BreakerBuilder<ConsecutivePolicy, E>
where
    E: std::error::Error + 'static,
{
    /// Creates a builder with default settings: 5 consecutive failures to
    /// trip, 30 second call and reset timeouts, a 32-slot count window,
    /// and a single half-open probe.
    pub fn new() -> Self {
        Self {
            failure_threshold: 5,
            call_timeout: Duration::from_secs(30),
            reset_timeout: Duration::from_secs(30),
            window: WindowShape::Counts { size: 32 },
            half_open_max_probes: 1,
            policy: None,
            listeners: EventListeners::new(),
            _error_type: PhantomData,
        }
    }

    /// Builds a supervisor with the default consecutive-failure policy.
    pub fn build(self) -> Result<BreakerSupervisor<ConsecutivePolicy, E>, ConfigError> {
        self.validate()?;
        let window = self.assemble_window();
        let policy = ConsecutivePolicy::new(self.failure_threshold);

        Ok(BreakerSupervisor::assemble(
            policy,
            self.call_timeout,
            self.reset_timeout,
            self.half_open_max_probes,
            window,
            self.listeners,
        ))
    }
}

impl<P, E> BreakerBuilder<P, E>
where
    P: TripPolicy,
    E: std::error::Error + 'static,
{
    /// Sets how many failures trip the breaker. Consecutive for the default
    /// policy; windowed policies read it through their own constructors.
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Sets the deadline raced against the work by `execute`.
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Sets how long the breaker stays open before a trial call is allowed.
    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    /// Uses a count-based rolling window over the last `size` outcomes.
    pub fn count_window(mut self, size: usize) -> Self {
        self.window = WindowShape::Counts { size };
        self
    }

    /// Uses a time-bucketed rolling window: `span` split into `buckets`.
    pub fn time_window(mut self, span: Duration, buckets: usize) -> Self {
        self.window = WindowShape::Buckets { span, buckets };
        self
    }

    /// Sets how many trial calls may run concurrently while half-open.
    pub fn max_probes(mut self, probes: u32) -> Self {
        self.half_open_max_probes = probes;
        self
    }

    /// Subscribes a listener to the supervisor's structured events.
    pub fn on_event<F>(self, listener: F) -> Self
    where
        F: Fn(&BreakerEvent) + Send + Sync + 'static,
    {
        self.listeners.subscribe(listener);
        self
    }

    /// Subscribes the bundled `tracing` listener.
    #[cfg(feature = "tracing")]
    pub fn with_tracing(self) -> Self {
        self.listeners.subscribe(crate::event::tracing_listener());
        self
    }

    /// Sets a custom trip policy; build with
    /// [`build_with_policy`](Self::build_with_policy).
    pub fn policy<NewP: TripPolicy>(self, policy: NewP) -> BreakerBuilder<NewP, E> {
        BreakerBuilder {
            failure_threshold: self.failure_threshold,
            call_timeout: self.call_timeout,
            reset_timeout: self.reset_timeout,
            window: self.window,
            half_open_max_probes: self.half_open_max_probes,
            policy: Some(policy),
            listeners: self.listeners,
            _error_type: PhantomData,
        }
    }

    /// Changes the error type the supervisor is parameterized over.
    pub fn with_error_type<NewE: std::error::Error + 'static>(self) -> BreakerBuilder<P, NewE> {
        BreakerBuilder {
            failure_threshold: self.failure_threshold,
            call_timeout: self.call_timeout,
            reset_timeout: self.reset_timeout,
            window: self.window,
            half_open_max_probes: self.half_open_max_probes,
            policy: self.policy,
            listeners: self.listeners,
            _error_type: PhantomData,
        }
    }

    /// Builds a supervisor with the policy supplied via
    /// [`policy`](Self::policy).
    pub fn build_with_policy(mut self) -> Result<BreakerSupervisor<P, E>, ConfigError> {
        self.validate()?;
        let window = self.assemble_window();
        let policy = self.policy.take().ok_or(ConfigError::MissingPolicy)?;

        Ok(BreakerSupervisor::assemble(
            policy,
            self.call_timeout,
            self.reset_timeout,
            self.half_open_max_probes,
            window,
            self.listeners,
        ))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::ZeroFailureThreshold);
        }
        if self.call_timeout.is_zero() {
            return Err(ConfigError::ZeroCallTimeout);
        }
        if self.reset_timeout.is_zero() {
            return Err(ConfigError::ZeroResetTimeout);
        }
        if self.half_open_max_probes == 0 {
            return Err(ConfigError::ZeroProbeLimit);
        }

        match self.window {
            WindowShape::Counts { size: 0 } => Err(ConfigError::EmptyWindow),
            WindowShape::Buckets { span, buckets } if span.is_zero() || buckets == 0 => {
                Err(ConfigError::EmptyWindow)
            }
            _ => Ok(()),
        }
    }

    fn assemble_window(&self) -> MetricsWindow {
        match self.window {
            WindowShape::Counts { size } => MetricsWindow::Counts(RingWindow::new(size)),
            WindowShape::Buckets { span, buckets } => {
                MetricsWindow::Buckets(BucketWindow::new(span, buckets))
            }
        }
    }
}
