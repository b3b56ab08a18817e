//! # callguard
//!
//! A concurrency-safe circuit breaker and guarded-call supervisor for
//! wrapping unreliable operations.
//!
//! A supervisor owns one breaker state machine and exposes two call-styles
//! over it: a direct [`call`](BreakerSupervisor::call) that surfaces errors,
//! and a guarded [`execute`](BreakerSupervisor::execute) that races the work
//! against a deadline and routes every failure kind through a caller-supplied
//! fallback. Construct one supervisor per protected operation type at
//! startup and hold it for the process lifetime.
//!
//! ## What is a Circuit Breaker?
//!
//! The circuit breaker pattern prevents cascading failures by temporarily
//! refusing to attempt operations that are likely to fail. The machine runs
//! in three states:
//!
//! - **Closed**: normal operation, calls pass through.
//! - **Open**: calls are rejected immediately; the fallback answers instead.
//! - **Half-Open**: after the reset timeout, a bounded number of trial calls
//!   probe whether the underlying resource has recovered.
//!
//! ## Basic usage
//!
//! ```rust
//! use callguard::{BreakerError, BreakerSupervisor, ConsecutivePolicy, Invocation};
//! use std::error::Error;
//! use std::fmt;
//! use std::time::Duration;
//!
//! // A domain error type for the protected operation.
//! #[derive(Debug)]
//! struct UpstreamError(String);
//!
//! impl fmt::Display for UpstreamError {
//!     fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
//!         write!(f, "upstream error: {}", self.0)
//!     }
//! }
//!
//! impl Error for UpstreamError {}
//!
//! let breaker = BreakerSupervisor::<ConsecutivePolicy, UpstreamError>::builder()
//!     .failure_threshold(3)
//!     .call_timeout(Duration::from_secs(2))
//!     .reset_timeout(Duration::from_secs(30))
//!     .build()?;
//!
//! // The guarded call-style: work and fallback each get their arguments
//! // from the per-call invocation, and the fallback answers on every
//! // failure or rejection path.
//! let reply = breaker.execute(
//!     |name: String| Ok(format!("hello, {}", name)),
//!     |err, tag: &str| format!("{}: {}", tag, err),
//!     Invocation::new("world".to_string(), "degraded"),
//! );
//! assert_eq!(reply, "hello, world");
//!
//! // The direct call-style surfaces the error instead.
//! match breaker.call(|| -> Result<String, UpstreamError> {
//!     Err(UpstreamError("service unavailable".into()))
//! }) {
//!     Ok(value) => println!("succeeded: {}", value),
//!     Err(BreakerError::Rejected(reason)) => println!("not attempted: {}", reason),
//!     Err(BreakerError::Operation(err)) => println!("failed: {}", err),
//!     Err(other) => println!("other: {}", other),
//! }
//! # Ok::<(), callguard::ConfigError>(())
//! ```
//!
//! ## Async support
//!
//! With the `async` feature enabled, the same supervisor guards futures;
//! the deadline is enforced with `tokio::time::timeout` and a timed-out
//! future is dropped:
//!
//! ```rust,ignore
//! let reply = breaker
//!     .execute_async(
//!         |req| async move { client.fetch(req).await },
//!         |err, _| degraded_response(err),
//!         Invocation::new(request, ()),
//!     )
//!     .await;
//! ```
//!
//! ## Observability
//!
//! The core never formats log text. Subscribe to structured
//! [`BreakerEvent`] records via [`BreakerBuilder::on_event`], or enable the
//! `tracing` feature and use the bundled listener.
//!
//! ## Features
//!
//! - `std` - standard library support (default)
//! - `async` - async entry points backed by Tokio
//! - `tracing` - a ready-made structured event listener

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod config;
mod error;
mod event;
mod metrics;
mod policy;
pub mod prelude;
mod state;
mod supervisor;

// Re-exports
pub use config::BreakerBuilder;
pub use error::{BreakerError, BreakerResult, ConfigError, RejectReason};
#[cfg(feature = "tracing")]
pub use event::tracing_listener;
pub use event::{BreakerEvent, EventListeners};
pub use metrics::{BucketWindow, CallStats, Outcome, RingWindow, WindowCounts};
pub use policy::{ConsecutivePolicy, TripPolicy, WindowedCountPolicy, WindowedRatioPolicy};
pub use state::State;
pub use supervisor::{BreakerSnapshot, BreakerSupervisor, Invocation};
