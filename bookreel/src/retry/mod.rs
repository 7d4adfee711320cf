//! Bounded retry for rate-limited external calls.
//!
//! This module provides:
//! - [`RetryPolicy`]: attempt limit and cooldown schedule
//! - [`Operation`]: a named, re-invocable unit of work with a cost estimate
//! - [`RetryGovernor`]: runs operations, cooling down on capacity exhaustion
//! - [`Sleeper`]: the wait primitive, injectable for tests

mod governor;
mod policy;
mod sleeper;

pub use governor::{GovernorState, Operation, OperationFuture, RetryGovernor, RetryOutcome};
pub use policy::RetryPolicy;
pub use sleeper::{Sleeper, TokioSleeper};
