//! Three guarded-call scenarios against a mock backend: instant success,
//! success on retry after a timeout, and a guaranteed failure that trips
//! the breaker. Each scenario gets its own supervisor, one breaker per
//! protected operation.

use callguard::{BreakerSupervisor, ConsecutivePolicy, Invocation};
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug)]
struct BackendError(String);

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "backend error: {}", self.0)
    }
}

impl Error for BackendError {}

// Stand-in for a remote service with three behaviors
struct MockService;

impl MockService {
    fn fetch(&self) -> Result<String, BackendError> {
        Ok("backend replied".to_string())
    }

    fn fetch_slowly(&self, delay: Duration) -> Result<String, BackendError> {
        thread::sleep(delay);
        Ok("backend replied, eventually".to_string())
    }

    fn fetch_broken(&self) -> Result<String, BackendError> {
        Err(BackendError("backend is down".to_string()))
    }
}

fn demonstrate_success(service: Arc<MockService>) {
    println!("\n== success ==");

    let breaker = BreakerSupervisor::<ConsecutivePolicy, BackendError>::builder()
        .build()
        .expect("breaker config is valid");

    let reply = breaker.execute(
        move |_: ()| service.fetch(),
        |err, _: ()| format!("degraded response: {}", err),
        Invocation::empty(),
    );
    println!("{}", reply);
}

fn demonstrate_success_after_timeout(service: Arc<MockService>) {
    println!("\n== success after timeout ==");

    let breaker = BreakerSupervisor::<ConsecutivePolicy, BackendError>::builder()
        .failure_threshold(3)
        .call_timeout(Duration::from_millis(200))
        .build()
        .expect("breaker config is valid");

    // First attempt is far too slow and loses to the deadline
    let slow = Arc::clone(&service);
    let reply = breaker.execute(
        move |_: ()| slow.fetch_slowly(Duration::from_secs(2)),
        |err, _: ()| format!("degraded response: {}", err),
        Invocation::empty(),
    );
    println!("{}", reply);

    // The retry answers promptly
    let reply = breaker.execute(
        move |_: ()| service.fetch(),
        |err, _: ()| format!("degraded response: {}", err),
        Invocation::empty(),
    );
    println!("{}", reply);
}

fn demonstrate_failure(service: Arc<MockService>) {
    println!("\n== failure ==");

    let breaker = BreakerSupervisor::<ConsecutivePolicy, BackendError>::builder()
        .failure_threshold(1)
        .reset_timeout(Duration::from_secs(30))
        .build()
        .expect("breaker config is valid");

    let broken = Arc::clone(&service);
    let reply = breaker.execute(
        move |_: ()| broken.fetch_broken(),
        |err, _: ()| format!("degraded response: {}", err),
        Invocation::empty(),
    );
    println!("{}", reply);

    // The breaker tripped; this call is answered without touching the backend
    let reply = breaker.execute(
        move |_: ()| service.fetch(),
        |err, _: ()| {
            if err.is_rejection() {
                format!("shed load: {}", err)
            } else {
                format!("degraded response: {}", err)
            }
        },
        Invocation::empty(),
    );
    println!("{}", reply);
    println!("final state: {}", breaker.state());
}

fn main() {
    let service = Arc::new(MockService);

    demonstrate_success(Arc::clone(&service));
    demonstrate_success_after_timeout(Arc::clone(&service));
    demonstrate_failure(service);
}
