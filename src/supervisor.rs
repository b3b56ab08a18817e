//! The guarded-call supervisor: admission, execution, outcome recording.

use std::any::Any;
use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{BreakerError, BreakerResult, RejectReason};
use crate::event::{BreakerEvent, EventListeners};
use crate::metrics::{CallStats, MetricsWindow, Outcome};
use crate::policy::TripPolicy;
use crate::state::{State, StateMachine};

/// One attempt to execute protected work.
///
/// Carries the arguments for the work and for the fallback, created by the
/// caller per call and consumed by [`BreakerSupervisor::execute`]. Never
/// shared or reused across calls.
#[derive(Debug)]
pub struct Invocation<A, F> {
    /// Arguments handed to the protected work when the call is admitted.
    pub work_args: A,

    /// Arguments handed to the fallback on any failure or rejection path.
    pub fallback_args: F,
}

impl<A, F> Invocation<A, F> {
    /// Bundles work and fallback arguments for one call.
    pub fn new(work_args: A, fallback_args: F) -> Self {
        Self {
            work_args,
            fallback_args,
        }
    }
}

impl Invocation<(), ()> {
    /// An invocation for work and fallbacks that take no arguments.
    pub fn empty() -> Self {
        Self::new((), ())
    }
}

/// Read-only diagnostic view of a supervisor.
///
/// Safe to take concurrently with calls; taking one never mutates breaker
/// state. "Recent" counts are whatever currently sits inside the rolling
/// window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSnapshot {
    /// Current operating status.
    pub status: State,

    /// Faults recorded since the last success.
    pub consecutive_failures: u32,

    /// Successes inside the rolling window.
    pub recent_successes: u64,

    /// Failures inside the rolling window.
    pub recent_failures: u64,

    /// Timeouts inside the rolling window.
    pub recent_timeouts: u64,

    /// Calls declined without executing work, over the supervisor's lifetime.
    pub rejected_calls: u64,
}

/// How an admitted call was let through.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Probe,
}

/// How the timeout guard ended an attempt that produced no domain result.
enum GuardFault {
    TimedOut,
    Panicked(String),
}

struct SupervisorInner<P>
where
    P: TripPolicy,
{
    state: StateMachine,
    policy: P,
    stats: CallStats,
    window: MetricsWindow,
    call_timeout: Duration,
    reset_timeout: Duration,
    half_open_max_probes: u32,
    listeners: Arc<EventListeners>,
}

/// A circuit breaker supervising one unreliable operation type.
///
/// Construct one supervisor per protected operation at startup and hold it
/// for the process lifetime; clones share the same breaker state. Multiple
/// threads may call into the same supervisor concurrently.
pub struct BreakerSupervisor<P, E>
where
    P: TripPolicy,
    E: std::error::Error + 'static,
{
    inner: Arc<SupervisorInner<P>>,
    _error_type: PhantomData<E>,
}

impl<P, E> Clone for BreakerSupervisor<P, E>
where
    P: TripPolicy,
    E: std::error::Error + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _error_type: PhantomData,
        }
    }
}

impl<P, E> BreakerSupervisor<P, E>
where
    P: TripPolicy,
    E: std::error::Error + 'static,
{
    pub(crate) fn assemble(
        policy: P,
        call_timeout: Duration,
        reset_timeout: Duration,
        half_open_max_probes: u32,
        window: MetricsWindow,
        listeners: EventListeners,
    ) -> Self {
        let inner = SupervisorInner {
            state: StateMachine::new(),
            policy,
            stats: CallStats::new(),
            window,
            call_timeout,
            reset_timeout,
            half_open_max_probes,
            listeners: Arc::new(listeners),
        };

        Self {
            inner: Arc::new(inner),
            _error_type: PhantomData,
        }
    }

    /// Creates a builder for customizing a supervisor.
    pub fn builder() -> crate::config::BreakerBuilder<crate::policy::ConsecutivePolicy, E> {
        crate::config::BreakerBuilder::new()
    }

    /// Current operating status.
    pub fn state(&self) -> State {
        self.inner.state.current()
    }

    /// Takes a read-only diagnostic view.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let counts = self.inner.window.counts();
        BreakerSnapshot {
            status: self.inner.state.current(),
            consecutive_failures: self.inner.stats.consecutive_failures(),
            recent_successes: counts.successes(),
            recent_failures: counts.failures(),
            recent_timeouts: counts.timeouts(),
            rejected_calls: self.inner.stats.rejected_calls(),
        }
    }

    /// Runs `work` under the breaker without a timeout guard or fallback.
    ///
    /// This is the direct call-style entry: the work runs on the caller's
    /// thread and errors come back as `Err` instead of being routed through
    /// a fallback. A panic inside `work` is caught and surfaced as
    /// [`BreakerError::Panicked`]. The configured deadline applies only to
    /// [`execute`](Self::execute), which can race the work against a timer.
    pub fn call<T, W>(&self, work: W) -> BreakerResult<T, E>
    where
        W: FnOnce() -> Result<T, E>,
    {
        let admission = match self.admit() {
            Ok(admission) => admission,
            Err(reason) => {
                self.reject(reason);
                return Err(BreakerError::Rejected(reason));
            }
        };

        let start = Instant::now();
        let verdict = catch_unwind(AssertUnwindSafe(work));
        let elapsed = start.elapsed();

        match verdict {
            Ok(Ok(value)) => {
                self.settle(Outcome::Success, admission, elapsed);
                Ok(value)
            }
            Ok(Err(err)) => {
                self.settle(Outcome::Failure, admission, elapsed);
                Err(BreakerError::Operation(err))
            }
            Err(payload) => {
                self.settle(Outcome::Failure, admission, elapsed);
                Err(BreakerError::Panicked {
                    message: panic_message(payload),
                })
            }
        }
    }

    /// Executes one guarded call: admit, run under the deadline, record the
    /// outcome, and return either the work's value or the fallback's.
    ///
    /// The work runs on a guard thread and races the configured
    /// `call_timeout`; whichever resolves first wins. On a deadline miss the
    /// attempt is abandoned best-effort: the worker thread keeps running,
    /// but its late result is discarded and recorded nowhere, so work that
    /// mutates external state is at-most-once-observed, not
    /// exactly-once-effected.
    ///
    /// Every failure kind reaches the caller through `fallback`, tagged
    /// with the [`BreakerError`] that caused it; `execute` itself never
    /// returns an error and never lets a panic escape.
    pub fn execute<A, F, T, W, FB>(
        &self,
        work: W,
        fallback: FB,
        invocation: Invocation<A, F>,
    ) -> T
    where
        W: FnOnce(A) -> Result<T, E> + Send + 'static,
        FB: FnOnce(BreakerError<E>, F) -> T,
        A: Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let Invocation {
            work_args,
            fallback_args,
        } = invocation;

        let admission = match self.admit() {
            Ok(admission) => admission,
            Err(reason) => {
                self.reject(reason);
                return fallback(BreakerError::Rejected(reason), fallback_args);
            }
        };

        let start = Instant::now();
        match self.run_guarded(work, work_args) {
            Ok(Ok(value)) => {
                self.settle(Outcome::Success, admission, start.elapsed());
                value
            }
            Ok(Err(err)) => {
                self.settle(Outcome::Failure, admission, start.elapsed());
                fallback(BreakerError::Operation(err), fallback_args)
            }
            Err(GuardFault::TimedOut) => {
                self.settle(Outcome::Timeout, admission, start.elapsed());
                fallback(
                    BreakerError::Timeout {
                        limit: self.inner.call_timeout,
                    },
                    fallback_args,
                )
            }
            Err(GuardFault::Panicked(message)) => {
                self.settle(Outcome::Failure, admission, start.elapsed());
                fallback(BreakerError::Panicked { message }, fallback_args)
            }
        }
    }

    /// Races `work` against the configured deadline on a guard thread.
    fn run_guarded<A, T, W>(&self, work: W, args: A) -> Result<Result<T, E>, GuardFault>
    where
        W: FnOnce(A) -> Result<T, E> + Send + 'static,
        A: Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        let spawned = thread::Builder::new()
            .name("guarded-call".into())
            .spawn(move || {
                let verdict = catch_unwind(AssertUnwindSafe(move || work(args)));
                // the supervisor may have stopped listening at the deadline
                let _ = tx.send(verdict);
            });

        if let Err(err) = spawned {
            return Err(GuardFault::Panicked(format!(
                "guard thread unavailable: {}",
                err
            )));
        }

        match rx.recv_timeout(self.inner.call_timeout) {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(payload)) => Err(GuardFault::Panicked(panic_message(payload))),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(GuardFault::TimedOut),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(GuardFault::Panicked(
                "work finished without reporting an outcome".into(),
            )),
        }
    }

    /// Consults the state machine before any work runs.
    fn admit(&self) -> Result<Admission, RejectReason> {
        let inner = &self.inner;
        match inner.state.current() {
            State::Closed => Ok(Admission::Normal),
            State::Open => {
                if inner.state.time_in_status() < inner.reset_timeout {
                    return Err(RejectReason::Open {
                        retry_in: inner.reset_timeout.saturating_sub(inner.state.time_in_status()),
                    });
                }

                // The reset timeout has elapsed. Whoever wins this swap
                // performs the transition; winner and simultaneous arrivals
                // then race for the probe slots on equal terms.
                if inner.state.begin_recovery() {
                    inner.listeners.emit(&BreakerEvent::StateChanged {
                        from: State::Open,
                        to: State::HalfOpen,
                    });
                }

                match inner.state.current() {
                    State::HalfOpen => {
                        if inner.state.try_begin_probe(inner.half_open_max_probes) {
                            Ok(Admission::Probe)
                        } else {
                            Err(RejectReason::ProbeLimit)
                        }
                    }
                    // A probe already finished in the meantime.
                    State::Closed => Ok(Admission::Normal),
                    State::Open => Err(RejectReason::Open {
                        retry_in: inner.reset_timeout.saturating_sub(inner.state.time_in_status()),
                    }),
                }
            }
            State::HalfOpen => {
                if inner.state.try_begin_probe(inner.half_open_max_probes) {
                    Ok(Admission::Probe)
                } else {
                    Err(RejectReason::ProbeLimit)
                }
            }
        }
    }

    /// Records a rejection. Rejections never feed failure thresholds.
    fn reject(&self, reason: RejectReason) {
        self.inner.stats.record(Outcome::Rejected);
        self.inner
            .listeners
            .emit(&BreakerEvent::CallRejected { reason });
    }

    /// Records an executed outcome, then applies any transition it causes.
    ///
    /// The outcome is visible in the counters before the status word moves.
    fn settle(&self, outcome: Outcome, admission: Admission, elapsed: Duration) {
        let inner = &self.inner;
        inner.stats.record(outcome);
        inner.window.record(outcome);
        inner.listeners.emit(&BreakerEvent::OutcomeRecorded {
            outcome,
            probe: admission == Admission::Probe,
            elapsed,
        });

        match admission {
            Admission::Probe => {
                if outcome.is_fault() {
                    if inner.state.reopen_after_probe() {
                        inner.listeners.emit(&BreakerEvent::StateChanged {
                            from: State::HalfOpen,
                            to: State::Open,
                        });
                    }
                } else if inner.state.close_after_probe() {
                    // A fresh start: stale pre-trip faults must not re-trip
                    // a windowed policy on the next recorded failure.
                    inner.window.reset();
                    inner.listeners.emit(&BreakerEvent::StateChanged {
                        from: State::HalfOpen,
                        to: State::Closed,
                    });
                }
                inner.state.end_probe();
            }
            Admission::Normal => {
                if outcome.is_fault()
                    && inner.state.current() == State::Closed
                    && inner
                        .policy
                        .should_trip(&inner.stats, &inner.window.counts())
                    && inner.state.trip()
                {
                    inner.listeners.emit(&BreakerEvent::StateChanged {
                        from: State::Closed,
                        to: State::Open,
                    });
                }
            }
        }
    }
}

#[cfg(feature = "async")]
impl<P, E> BreakerSupervisor<P, E>
where
    P: TripPolicy,
    E: std::error::Error + 'static,
{
    /// Async counterpart of [`call`](Self::call): admission and recording
    /// without a timeout guard, errors surfaced as `Err`.
    pub async fn call_async<W, Fut, T>(&self, work: W) -> BreakerResult<T, E>
    where
        W: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        use futures::FutureExt;

        let admission = match self.admit() {
            Ok(admission) => admission,
            Err(reason) => {
                self.reject(reason);
                return Err(BreakerError::Rejected(reason));
            }
        };

        let start = Instant::now();
        let verdict = AssertUnwindSafe(work()).catch_unwind().await;
        let elapsed = start.elapsed();

        match verdict {
            Ok(Ok(value)) => {
                self.settle(Outcome::Success, admission, elapsed);
                Ok(value)
            }
            Ok(Err(err)) => {
                self.settle(Outcome::Failure, admission, elapsed);
                Err(BreakerError::Operation(err))
            }
            Err(payload) => {
                self.settle(Outcome::Failure, admission, elapsed);
                Err(BreakerError::Panicked {
                    message: panic_message(payload),
                })
            }
        }
    }

    /// Async counterpart of [`execute`](Self::execute).
    ///
    /// The timeout guard is `tokio::time::timeout`; at the deadline the
    /// work future is dropped, which cancels it outright rather than merely
    /// abandoning it.
    pub async fn execute_async<A, F, T, W, Fut, FB>(
        &self,
        work: W,
        fallback: FB,
        invocation: Invocation<A, F>,
    ) -> T
    where
        W: FnOnce(A) -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        FB: FnOnce(BreakerError<E>, F) -> T,
    {
        use futures::FutureExt;

        let Invocation {
            work_args,
            fallback_args,
        } = invocation;

        let admission = match self.admit() {
            Ok(admission) => admission,
            Err(reason) => {
                self.reject(reason);
                return fallback(BreakerError::Rejected(reason), fallback_args);
            }
        };

        let start = Instant::now();
        let guarded = tokio::time::timeout(
            self.inner.call_timeout,
            AssertUnwindSafe(work(work_args)).catch_unwind(),
        )
        .await;

        match guarded {
            Ok(Ok(Ok(value))) => {
                self.settle(Outcome::Success, admission, start.elapsed());
                value
            }
            Ok(Ok(Err(err))) => {
                self.settle(Outcome::Failure, admission, start.elapsed());
                fallback(BreakerError::Operation(err), fallback_args)
            }
            Ok(Err(payload)) => {
                self.settle(Outcome::Failure, admission, start.elapsed());
                fallback(
                    BreakerError::Panicked {
                        message: panic_message(payload),
                    },
                    fallback_args,
                )
            }
            Err(_deadline) => {
                self.settle(Outcome::Timeout, admission, start.elapsed());
                fallback(
                    BreakerError::Timeout {
                        limit: self.inner.call_timeout,
                    },
                    fallback_args,
                )
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "opaque panic payload".to_string()
    }
}
