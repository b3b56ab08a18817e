use callguard::{
    BreakerError, BreakerEvent, BreakerSupervisor, ConfigError, ConsecutivePolicy, Invocation,
    RejectReason, State, WindowedCountPolicy, WindowedRatioPolicy,
};
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

// Domain error type for the protected operations under test
#[derive(Debug)]
struct TestError(String);

impl TestError {
    fn new(msg: &str) -> Self {
        TestError(msg.to_string())
    }
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "test error: {}", self.0)
    }
}

impl Error for TestError {}

fn breaker(
    threshold: u32,
    reset: Duration,
) -> BreakerSupervisor<ConsecutivePolicy, TestError> {
    BreakerSupervisor::<ConsecutivePolicy, TestError>::builder()
        .failure_threshold(threshold)
        .reset_timeout(reset)
        .build()
        .expect("valid test config")
}

fn fail(breaker: &BreakerSupervisor<ConsecutivePolicy, TestError>) {
    let result = breaker.call(|| -> Result<(), TestError> { Err(TestError::new("down")) });
    assert!(matches!(result, Err(BreakerError::Operation(_))));
}

fn succeed(breaker: &BreakerSupervisor<ConsecutivePolicy, TestError>) {
    let result = breaker.call(|| -> Result<(), TestError> { Ok(()) });
    assert!(result.is_ok());
}

#[test]
fn trips_after_exact_consecutive_failures() {
    let breaker = breaker(3, Duration::from_secs(60));
    assert_eq!(breaker.state(), State::Closed);

    fail(&breaker);
    fail(&breaker);
    assert_eq!(breaker.state(), State::Closed);

    fail(&breaker);
    assert_eq!(breaker.state(), State::Open);
    assert_eq!(breaker.snapshot().consecutive_failures, 3);
}

#[test]
fn intervening_success_resets_the_consecutive_counter() {
    let breaker = breaker(3, Duration::from_secs(60));

    succeed(&breaker);
    fail(&breaker);
    fail(&breaker);
    assert_eq!(breaker.state(), State::Closed);

    // A success wipes the run; two more failures are not enough
    succeed(&breaker);
    fail(&breaker);
    fail(&breaker);
    assert_eq!(breaker.state(), State::Closed);

    fail(&breaker);
    assert_eq!(breaker.state(), State::Open);
}

#[test]
fn open_breaker_rejects_without_running_work() {
    let breaker = breaker(1, Duration::from_secs(60));
    fail(&breaker);
    assert_eq!(breaker.state(), State::Open);

    let ran = AtomicBool::new(false);
    let result = breaker.call(|| -> Result<(), TestError> {
        ran.store(true, Ordering::SeqCst);
        Ok(())
    });

    assert!(!ran.load(Ordering::SeqCst));
    match result {
        Err(BreakerError::Rejected(RejectReason::Open { retry_in })) => {
            assert!(retry_in <= Duration::from_secs(60));
        }
        other => panic!("expected an open rejection, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn probe_runs_after_reset_timeout_and_success_closes() {
    let breaker = breaker(1, Duration::from_millis(100));
    fail(&breaker);
    assert_eq!(breaker.state(), State::Open);

    thread::sleep(Duration::from_millis(150));

    let ran = AtomicBool::new(false);
    let result = breaker.call(|| -> Result<(), TestError> {
        ran.store(true, Ordering::SeqCst);
        Ok(())
    });

    assert!(ran.load(Ordering::SeqCst), "probe must execute real work");
    assert!(result.is_ok());
    assert_eq!(breaker.state(), State::Closed);
    assert_eq!(breaker.snapshot().consecutive_failures, 0);
}

#[test]
fn failed_probe_reopens_until_a_later_probe_succeeds() {
    let breaker = breaker(1, Duration::from_millis(100));

    // Call 1: failure trips the breaker
    fail(&breaker);
    assert_eq!(breaker.state(), State::Open);

    // Call 2, immediately after: rejected
    let result = breaker.call(|| -> Result<(), TestError> { Ok(()) });
    assert!(matches!(result, Err(BreakerError::Rejected(_))));

    // Call 3, after the reset timeout: the probe runs and fails again
    thread::sleep(Duration::from_millis(150));
    fail(&breaker);
    assert_eq!(breaker.state(), State::Open);

    // The open stopwatch restarted, so the very next call is rejected
    let result = breaker.call(|| -> Result<(), TestError> { Ok(()) });
    assert!(matches!(result, Err(BreakerError::Rejected(_))));

    // And a successful probe after another wait closes the circuit
    thread::sleep(Duration::from_millis(150));
    succeed(&breaker);
    assert_eq!(breaker.state(), State::Closed);
}

#[test]
fn rejections_do_not_feed_failure_accounting() {
    let breaker = breaker(2, Duration::from_secs(60));
    fail(&breaker);
    fail(&breaker);
    assert_eq!(breaker.state(), State::Open);

    for _ in 0..5 {
        let result = breaker.call(|| -> Result<(), TestError> { Ok(()) });
        assert!(matches!(result, Err(BreakerError::Rejected(_))));
    }

    let snapshot = breaker.snapshot();
    assert_eq!(snapshot.status, State::Open);
    assert_eq!(snapshot.consecutive_failures, 2);
    assert_eq!(snapshot.recent_failures, 2);
    assert_eq!(snapshot.rejected_calls, 5);
}

#[test]
fn half_open_admits_at_most_the_probe_limit() {
    let breaker = breaker(1, Duration::from_millis(50));
    fail(&breaker);
    thread::sleep(Duration::from_millis(100));

    let probe_started = Arc::new(AtomicBool::new(false));
    let in_probe = Arc::clone(&probe_started);
    let slow = breaker.clone();
    let probe = thread::spawn(move || {
        slow.call(|| -> Result<(), TestError> {
            in_probe.store(true, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(300));
            Ok(())
        })
    });

    while !probe_started.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(5));
    }

    // The single probe slot is taken; this call must lose
    let result = breaker.call(|| -> Result<(), TestError> { Ok(()) });
    assert!(matches!(
        result,
        Err(BreakerError::Rejected(RejectReason::ProbeLimit))
    ));

    let probe_result = probe.join().expect("probe thread must not panic");
    assert!(probe_result.is_ok());
    assert_eq!(breaker.state(), State::Closed);
}

#[test]
fn execute_times_out_slow_work_and_falls_back() {
    let breaker = BreakerSupervisor::<ConsecutivePolicy, TestError>::builder()
        .failure_threshold(1)
        .call_timeout(Duration::from_millis(100))
        .reset_timeout(Duration::from_secs(60))
        .build()
        .expect("valid test config");

    let started = Instant::now();
    let reply = breaker.execute(
        |_: ()| -> Result<String, TestError> {
            thread::sleep(Duration::from_millis(500));
            Ok("late success".to_string())
        },
        |err, _: ()| match err {
            BreakerError::Timeout { limit } => format!("timed out after {:?}", limit),
            other => format!("unexpected: {}", other),
        },
        Invocation::empty(),
    );

    assert_eq!(reply, "timed out after 100ms");
    assert!(
        started.elapsed() < Duration::from_millis(400),
        "the caller must get control back at the deadline"
    );

    // A timeout counts like a failure: threshold 1 has tripped
    let snapshot = breaker.snapshot();
    assert_eq!(snapshot.status, State::Open);
    assert_eq!(snapshot.recent_timeouts, 1);
    assert_eq!(snapshot.consecutive_failures, 1);
}

#[test]
fn panicking_work_is_caught_and_counted_as_failure() {
    let breaker = breaker(2, Duration::from_secs(60));

    let reply = breaker.execute(
        |_: ()| -> Result<String, TestError> { panic!("boom") },
        |err, _: ()| match err {
            BreakerError::Panicked { message } => message,
            other => format!("unexpected: {}", other),
        },
        Invocation::empty(),
    );

    assert_eq!(reply, "boom");
    assert_eq!(breaker.snapshot().consecutive_failures, 1);
    assert_eq!(breaker.state(), State::Closed);

    // The supervisor survives and keeps serving calls
    succeed(&breaker);
    assert_eq!(breaker.snapshot().consecutive_failures, 0);
}

#[test]
fn fallback_distinguishes_rejection_from_work_failure() {
    let breaker = breaker(1, Duration::from_secs(60));

    let first = breaker.execute(
        |_: ()| -> Result<bool, TestError> { Err(TestError::new("down")) },
        |err, _: ()| err.is_rejection(),
        Invocation::empty(),
    );
    assert!(!first, "a work failure is not a rejection");

    let second = breaker.execute(
        |_: ()| -> Result<bool, TestError> { Ok(true) },
        |err, _: ()| err.is_rejection(),
        Invocation::empty(),
    );
    assert!(second, "an open breaker rejects");
}

#[test]
fn execute_routes_invocation_arguments() {
    let breaker = breaker(5, Duration::from_secs(60));

    let reply = breaker.execute(
        |name: String| Ok(format!("hello, {}", name)),
        |err, tag: &str| format!("{}: {}", tag, err),
        Invocation::new("world".to_string(), "degraded"),
    );
    assert_eq!(reply, "hello, world");

    let reply = breaker.execute(
        |_: String| -> Result<String, TestError> { Err(TestError::new("down")) },
        |err, tag: &str| format!("{}: {}", tag, err),
        Invocation::new("world".to_string(), "degraded"),
    );
    assert_eq!(reply, "degraded: operation error: test error: down");
}

#[test]
fn builder_rejects_invalid_parameters() {
    fn new_builder() -> callguard::BreakerBuilder<ConsecutivePolicy, TestError> {
        BreakerSupervisor::<ConsecutivePolicy, TestError>::builder()
    }

    assert_eq!(
        new_builder().failure_threshold(0).build().err(),
        Some(ConfigError::ZeroFailureThreshold)
    );
    assert_eq!(
        new_builder().call_timeout(Duration::ZERO).build().err(),
        Some(ConfigError::ZeroCallTimeout)
    );
    assert_eq!(
        new_builder().reset_timeout(Duration::ZERO).build().err(),
        Some(ConfigError::ZeroResetTimeout)
    );
    assert_eq!(
        new_builder().count_window(0).build().err(),
        Some(ConfigError::EmptyWindow)
    );
    assert_eq!(
        new_builder().time_window(Duration::ZERO, 4).build().err(),
        Some(ConfigError::EmptyWindow)
    );
    assert_eq!(
        new_builder()
            .time_window(Duration::from_secs(10), 0)
            .build()
            .err(),
        Some(ConfigError::EmptyWindow)
    );
    assert_eq!(
        new_builder().max_probes(0).build().err(),
        Some(ConfigError::ZeroProbeLimit)
    );
    assert_eq!(
        new_builder().build_with_policy().err(),
        Some(ConfigError::MissingPolicy)
    );
}

#[test]
fn snapshot_is_idempotent_between_calls() {
    let breaker = breaker(5, Duration::from_secs(60));
    succeed(&breaker);
    fail(&breaker);
    succeed(&breaker);

    let first = breaker.snapshot();
    let second = breaker.snapshot();
    let third = breaker.snapshot();
    assert_eq!(first, second);
    assert_eq!(second, third);
}

#[test]
fn concurrent_successes_lose_no_updates() {
    const THREADS: usize = 8;
    const CALLS_PER_THREAD: usize = 50;

    let breaker = BreakerSupervisor::<ConsecutivePolicy, TestError>::builder()
        .failure_threshold(5)
        .count_window(THREADS * CALLS_PER_THREAD)
        .build()
        .expect("valid test config");

    let mut handles = Vec::with_capacity(THREADS);
    for _ in 0..THREADS {
        let shared = breaker.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..CALLS_PER_THREAD {
                let result = shared.call(|| -> Result<(), TestError> { Ok(()) });
                assert!(result.is_ok());
            }
        }));
    }
    for handle in handles {
        handle.join().expect("worker threads must not panic");
    }

    let snapshot = breaker.snapshot();
    assert_eq!(snapshot.status, State::Closed);
    assert_eq!(snapshot.recent_successes, (THREADS * CALLS_PER_THREAD) as u64);
    assert_eq!(snapshot.consecutive_failures, 0);
}

#[test]
fn windowed_count_policy_trips_on_interleaved_failures() {
    let breaker = BreakerSupervisor::<WindowedCountPolicy, TestError>::builder()
        .policy(WindowedCountPolicy::new(3))
        .count_window(8)
        .build_with_policy()
        .expect("valid test config");

    for outcome in [false, true, false, true] {
        if outcome {
            let _ = breaker.call(|| -> Result<(), TestError> { Ok(()) });
        } else {
            let _ = breaker.call(|| -> Result<(), TestError> { Err(TestError::new("down")) });
        }
    }
    assert_eq!(breaker.state(), State::Closed);

    // Third fault inside the window, despite the interleaved successes
    let _ = breaker.call(|| -> Result<(), TestError> { Err(TestError::new("down")) });
    assert_eq!(breaker.state(), State::Open);
}

#[test]
fn windowed_ratio_policy_waits_for_minimum_calls() {
    let breaker = BreakerSupervisor::<WindowedRatioPolicy, TestError>::builder()
        .policy(WindowedRatioPolicy::new(0.5, 4))
        .count_window(16)
        .build_with_policy()
        .expect("valid test config");

    // Three straight failures: ratio 1.0 but below the minimum call count
    for _ in 0..3 {
        let _ = breaker.call(|| -> Result<(), TestError> { Err(TestError::new("down")) });
    }
    assert_eq!(breaker.state(), State::Closed);

    let _ = breaker.call(|| -> Result<(), TestError> { Err(TestError::new("down")) });
    assert_eq!(breaker.state(), State::Open);
}

#[test]
fn listeners_observe_transitions_and_outcomes() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);

    let breaker = BreakerSupervisor::<ConsecutivePolicy, TestError>::builder()
        .failure_threshold(1)
        .reset_timeout(Duration::from_millis(100))
        .on_event(move |event| sink.lock().expect("event sink").push(*event))
        .build()
        .expect("valid test config");

    fail(&breaker);
    thread::sleep(Duration::from_millis(150));
    succeed(&breaker);

    let seen = events.lock().expect("event sink").clone();
    let changes: Vec<(State, State)> = seen
        .iter()
        .filter_map(|event| match event {
            BreakerEvent::StateChanged { from, to } => Some((*from, *to)),
            _ => None,
        })
        .collect();

    assert_eq!(
        changes,
        vec![
            (State::Closed, State::Open),
            (State::Open, State::HalfOpen),
            (State::HalfOpen, State::Closed),
        ]
    );

    let probes = seen.iter().any(|event| {
        matches!(
            event,
            BreakerEvent::OutcomeRecorded {
                probe: true,
                ..
            }
        )
    });
    assert!(probes, "the recovery probe must be flagged as such");
}

#[cfg(feature = "async")]
mod async_tests {
    use super::*;

    #[tokio::test]
    async fn async_calls_share_the_same_machine() {
        let breaker = breaker(2, Duration::from_secs(60));

        for _ in 0..3 {
            let result = breaker
                .call_async(|| async { Result::<&str, TestError>::Ok("up") })
                .await;
            assert!(result.is_ok());
        }

        for _ in 0..2 {
            let result = breaker
                .call_async(|| async { Result::<&str, TestError>::Err(TestError::new("down")) })
                .await;
            assert!(matches!(result, Err(BreakerError::Operation(_))));
        }
        assert_eq!(breaker.state(), State::Open);

        let result = breaker
            .call_async(|| async { Result::<&str, TestError>::Ok("up") })
            .await;
        assert!(matches!(result, Err(BreakerError::Rejected(_))));
    }

    #[tokio::test]
    async fn execute_async_times_out_and_falls_back() {
        let breaker = BreakerSupervisor::<ConsecutivePolicy, TestError>::builder()
            .failure_threshold(1)
            .call_timeout(Duration::from_millis(100))
            .build()
            .expect("valid test config");

        let reply = breaker
            .execute_async(
                |_: ()| async {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    Result::<bool, TestError>::Ok(false)
                },
                |err, _: ()| matches!(err, BreakerError::Timeout { .. }),
                Invocation::empty(),
            )
            .await;

        assert!(reply, "the deadline must win the race");
        assert_eq!(breaker.snapshot().recent_timeouts, 1);
        assert_eq!(breaker.state(), State::Open);
    }

    #[tokio::test]
    async fn execute_async_success_path() {
        let breaker = breaker(3, Duration::from_secs(60));

        let reply = breaker
            .execute_async(
                |name: &str| async move { Result::<String, TestError>::Ok(format!("hi {}", name)) },
                |err, _: ()| format!("fallback: {}", err),
                Invocation::new("async", ()),
            )
            .await;
        assert_eq!(reply, "hi async");
    }
}
