use callguard::{BreakerError, BreakerSupervisor, ConsecutivePolicy};
use std::error::Error;
use std::fmt;
use std::thread;
use std::time::Duration;

// Domain error type for the simulated service
#[derive(Debug)]
struct ServiceError(String);

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "service error: {}", self.0)
    }
}

impl Error for ServiceError {}

// A service that fails for a stretch and then recovers
fn flaky_service(call_count: &mut u32) -> Result<String, ServiceError> {
    *call_count += 1;
    match *call_count {
        1..=2 => Ok("initial success".to_string()),
        3..=5 => Err(ServiceError("temporarily unavailable".to_string())),
        _ => Ok("stable again".to_string()),
    }
}

fn main() {
    let breaker = BreakerSupervisor::<ConsecutivePolicy, ServiceError>::builder()
        .failure_threshold(3)
        .reset_timeout(Duration::from_secs(2))
        .call_timeout(Duration::from_secs(1))
        .on_event(|event| println!("  [event] {:?}", event))
        .build()
        .expect("breaker config is valid");

    println!("initial state: {}", breaker.state());

    let mut call_count = 0;

    for attempt in 1..=12 {
        println!("\nattempt {}:", attempt);

        match breaker.call(|| flaky_service(&mut call_count)) {
            Ok(reply) => println!("  call succeeded: {}", reply),
            Err(BreakerError::Rejected(reason)) => {
                println!("  not attempted: {}", reason);
            }
            Err(BreakerError::Operation(err)) => println!("  call failed: {}", err),
            Err(other) => println!("  other error: {}", other),
        }

        let snapshot = breaker.snapshot();
        println!(
            "  state={} consecutive_failures={} recent: {}ok/{}err/{}to rejected={}",
            snapshot.status,
            snapshot.consecutive_failures,
            snapshot.recent_successes,
            snapshot.recent_failures,
            snapshot.recent_timeouts,
            snapshot.rejected_calls,
        );

        thread::sleep(Duration::from_millis(400));
    }
}
