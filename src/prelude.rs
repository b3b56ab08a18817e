//! Re-exports the types most callers need.
//!
//! # Example
//! ```rust,no_run
//! use callguard::prelude::*;
//! ```

pub use crate::{
    BreakerBuilder, BreakerError, BreakerResult, BreakerSnapshot, BreakerSupervisor, ConfigError,
    ConsecutivePolicy, Invocation, RejectReason, State,
};
