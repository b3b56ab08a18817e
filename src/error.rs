//! Error types for the guarded-call supervisor.

use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::time::Duration;

/// Result type returned by the direct call-style entry points.
pub type BreakerResult<T, E> = Result<T, BreakerError<E>>;

/// Why a call was declined without the protected work being run.
///
/// The two variants let callers tell "the system is protecting itself"
/// apart from "your call lost the race for a probe slot".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The breaker is open and the reset timeout has not yet elapsed.
    Open {
        /// Time remaining until the next trial call may be admitted.
        retry_in: Duration,
    },

    /// The breaker is probing and every probe slot is already taken.
    ProbeLimit,
}

impl Display for RejectReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Open { retry_in } => {
                write!(f, "breaker is open, next probe in {:?}", retry_in)
            }
            RejectReason::ProbeLimit => write!(f, "breaker is probing at capacity"),
        }
    }
}

/// Error surfaced by a guarded call.
///
/// Every variant is also the reason tag handed to the fallback by
/// [`execute`](crate::BreakerSupervisor::execute).
#[derive(Debug)]
pub enum BreakerError<E> {
    /// The breaker declined to attempt the operation.
    Rejected(RejectReason),

    /// The protected operation reported a domain error.
    Operation(E),

    /// The protected operation did not complete within the configured bound.
    Timeout {
        /// The deadline the operation missed.
        limit: Duration,
    },

    /// The protected operation panicked. The panic is caught at the
    /// boundary and counts as an ordinary failure.
    Panicked {
        /// Best-effort rendering of the panic payload.
        message: String,
    },
}

impl<E> BreakerError<E> {
    /// Whether the error came from the breaker declining the call, rather
    /// than from an attempt that ran and went wrong.
    pub fn is_rejection(&self) -> bool {
        matches!(self, BreakerError::Rejected(_))
    }
}

impl<E> Display for BreakerError<E>
where
    E: Display,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BreakerError::Rejected(reason) => write!(f, "call rejected: {}", reason),
            BreakerError::Operation(e) => write!(f, "operation error: {}", e),
            BreakerError::Timeout { limit } => {
                write!(f, "operation exceeded its {:?} deadline", limit)
            }
            BreakerError::Panicked { message } => {
                write!(f, "operation panicked: {}", message)
            }
        }
    }
}

impl<E: Error + 'static> Error for BreakerError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BreakerError::Operation(e) => Some(e),
            _ => None,
        }
    }
}

/// Invalid construction parameters, reported by
/// [`BreakerBuilder`](crate::BreakerBuilder) before any supervisor exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// `failure_threshold` must be at least 1.
    ZeroFailureThreshold,

    /// `call_timeout` must be a positive duration.
    ZeroCallTimeout,

    /// `reset_timeout` must be a positive duration.
    ZeroResetTimeout,

    /// The rolling window needs a nonzero size, span, and bucket count.
    EmptyWindow,

    /// `max_probes` must be at least 1.
    ZeroProbeLimit,

    /// `build_with_policy` was called without a policy being supplied.
    MissingPolicy,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroFailureThreshold => {
                write!(f, "failure threshold must be at least 1")
            }
            ConfigError::ZeroCallTimeout => write!(f, "call timeout must be positive"),
            ConfigError::ZeroResetTimeout => write!(f, "reset timeout must be positive"),
            ConfigError::EmptyWindow => {
                write!(f, "rolling window needs a nonzero size, span, and bucket count")
            }
            ConfigError::ZeroProbeLimit => write!(f, "probe limit must be at least 1"),
            ConfigError::MissingPolicy => {
                write!(f, "a custom policy must be supplied before build_with_policy")
            }
        }
    }
}

impl Error for ConfigError {}
