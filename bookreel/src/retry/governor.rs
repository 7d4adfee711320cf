//! The retry governor.
//!
//! Capacity errors (quota or rate limit) put the governor into a fixed
//! cooldown before the next attempt; any other error is returned at once.
//! Running out of attempts is not an error: it is reported as
//! [`RetryOutcome::Exhausted`] and callers must check for it.

use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::policy::RetryPolicy;
use super::sleeper::{Sleeper, TokioSleeper};
use crate::errors::{CapabilityError, HardFailure};
use crate::events::{event_data, EventSink, NoOpEventSink};

/// Future returned by one invocation of an [`Operation`].
pub type OperationFuture<'a, T> = BoxFuture<'a, Result<T, CapabilityError>>;

/// A named unit of work submitted to the governor.
///
/// The closure is invoked once per attempt, so it must be able to rebuild
/// the call from what it captured.
pub struct Operation<'a, T> {
    name: String,
    estimated_tokens: u64,
    call: Box<dyn FnMut() -> OperationFuture<'a, T> + Send + 'a>,
}

impl<'a, T> Operation<'a, T> {
    /// Creates an operation with no cost estimate.
    pub fn new<F>(name: impl Into<String>, call: F) -> Self
    where
        F: FnMut() -> OperationFuture<'a, T> + Send + 'a,
    {
        Self {
            name: name.into(),
            estimated_tokens: 0,
            call: Box::new(call),
        }
    }

    /// Attaches an estimated resource cost in tokens.
    ///
    /// The estimate is only logged; it never delays or blocks the call.
    #[must_use]
    pub fn with_estimated_tokens(mut self, tokens: u64) -> Self {
        self.estimated_tokens = tokens;
        self
    }
}

impl<T> std::fmt::Debug for Operation<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("estimated_tokens", &self.estimated_tokens)
            .finish_non_exhaustive()
    }
}

/// Result of running an operation through the governor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T> {
    /// The operation returned a value.
    Success {
        /// The returned value.
        value: T,
        /// Attempts made, including the successful one.
        attempts: u32,
    },
    /// Every attempt hit a capacity limit (soft failure).
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// Error from the final attempt.
        last_error: CapabilityError,
    },
}

/// Governor state, traced on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GovernorState {
    /// Nothing attempted yet.
    Idle,
    /// Calling the operation.
    Attempting {
        /// 1-based attempt number.
        attempt: u32,
    },
    /// The last attempt hit a capacity limit.
    CapacityExhausted {
        /// Attempt that failed.
        attempt: u32,
    },
    /// Waiting before the next attempt.
    Cooldown {
        /// Attempt that will follow the wait.
        next_attempt: u32,
    },
    /// The operation succeeded.
    Success,
    /// A non-capacity error stopped the operation.
    HardFailure,
    /// Attempts ran out.
    MaxRetriesReached,
}

/// Runs operations with bounded retry on capacity exhaustion.
///
/// No state is kept between `execute` calls.
#[derive(Clone)]
pub struct RetryGovernor {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for RetryGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryGovernor")
            .field("policy", &self.policy)
            .field("sleeper", &self.sleeper)
            .finish_non_exhaustive()
    }
}

impl Default for RetryGovernor {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl RetryGovernor {
    /// Creates a governor that sleeps on the tokio timer and emits no events.
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            sleeper: Arc::new(TokioSleeper),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Replaces the wait primitive.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Returns the policy.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs the operation until it succeeds, fails hard, or runs out of attempts.
    ///
    /// # Errors
    ///
    /// Returns [`HardFailure`] as soon as an attempt fails with an error that
    /// is not capacity exhaustion. Exhausting the attempts is reported as
    /// `Ok(RetryOutcome::Exhausted)`.
    pub async fn execute<T: Send>(
        &self,
        operation: Operation<'_, T>,
    ) -> Result<RetryOutcome<T>, HardFailure> {
        let Operation {
            name,
            estimated_tokens,
            mut call,
        } = operation;
        let max_attempts = self.policy.effective_max_attempts();
        let mut state = GovernorState::Idle;

        info!(
            operation = %name,
            estimated_tokens,
            max_attempts,
            "Submitting API request"
        );

        let mut attempt = 0;
        loop {
            attempt += 1;
            state = Self::advance(&name, state, GovernorState::Attempting { attempt });
            info!(operation = %name, "Attempt {} of {}: executing API call", attempt, max_attempts);
            self.events
                .emit(
                    "retry.attempt",
                    Some(event_data(serde_json::json!({
                        "operation": name,
                        "attempt": attempt,
                        "max_attempts": max_attempts,
                        "estimated_tokens": estimated_tokens,
                    }))),
                )
                .await;

            match call().await {
                Ok(value) => {
                    Self::advance(&name, state, GovernorState::Success);
                    info!(operation = %name, attempts = attempt, "API call successful");
                    self.events
                        .emit(
                            "retry.succeeded",
                            Some(event_data(serde_json::json!({
                                "operation": name,
                                "attempts": attempt,
                            }))),
                        )
                        .await;
                    return Ok(RetryOutcome::Success {
                        value,
                        attempts: attempt,
                    });
                }
                Err(err) if err.is_capacity_exhausted() => {
                    state =
                        Self::advance(&name, state, GovernorState::CapacityExhausted { attempt });
                    warn!(
                        operation = %name,
                        attempt,
                        max_attempts,
                        estimated_tokens,
                        error = %err,
                        "API limit exceeded"
                    );
                    self.events
                        .emit(
                            "retry.capacity_exhausted",
                            Some(event_data(serde_json::json!({
                                "operation": name,
                                "attempt": attempt,
                                "reason": err.capacity_reason().map(|r| r.as_str()),
                                "error": err.to_string(),
                            }))),
                        )
                        .await;

                    if attempt >= max_attempts {
                        Self::advance(&name, state, GovernorState::MaxRetriesReached);
                        warn!(operation = %name, "Maximum retries ({}) reached", max_attempts);
                        self.events
                            .emit(
                                "retry.exhausted",
                                Some(event_data(serde_json::json!({
                                    "operation": name,
                                    "attempts": attempt,
                                    "error": err.to_string(),
                                }))),
                            )
                            .await;
                        return Ok(RetryOutcome::Exhausted {
                            attempts: attempt,
                            last_error: err,
                        });
                    }

                    state = Self::advance(
                        &name,
                        state,
                        GovernorState::Cooldown {
                            next_attempt: attempt + 1,
                        },
                    );
                    self.cool_down(&name, attempt + 1).await;
                }
                Err(err) => {
                    Self::advance(&name, state, GovernorState::HardFailure);
                    error!(operation = %name, attempt, error = %err, "Unexpected API error");
                    self.events
                        .emit(
                            "retry.hard_failure",
                            Some(event_data(serde_json::json!({
                                "operation": name,
                                "attempts": attempt,
                                "error": err.to_string(),
                            }))),
                        )
                        .await;
                    return Err(HardFailure {
                        error: err,
                        attempts: attempt,
                    });
                }
            }
        }
    }

    fn advance(name: &str, from: GovernorState, to: GovernorState) -> GovernorState {
        debug!(operation = %name, from = ?from, to = ?to, "Governor transition");
        to
    }

    /// Waits out the cooldown, notifying at most once per progress interval.
    async fn cool_down(&self, name: &str, next_attempt: u32) {
        let total = self.policy.cooldown();
        let interval = self.policy.progress_interval();

        info!(
            operation = %name,
            cooldown_secs = total.as_secs(),
            "Waiting {:.0} minutes before retry",
            total.as_secs_f64() / 60.0
        );
        self.events
            .emit(
                "retry.cooldown_started",
                Some(event_data(serde_json::json!({
                    "operation": name,
                    "cooldown_secs": total.as_secs(),
                    "next_attempt": next_attempt,
                }))),
            )
            .await;

        let mut remaining = total;
        while !remaining.is_zero() {
            info!(
                operation = %name,
                "Time until next attempt: {:.1} minutes",
                remaining.as_secs_f64() / 60.0
            );
            self.events
                .emit(
                    "retry.cooldown_progress",
                    Some(event_data(serde_json::json!({
                        "operation": name,
                        "remaining_secs": remaining.as_secs(),
                        "next_attempt": next_attempt,
                    }))),
                )
                .await;

            let step = Self::next_step(remaining, interval);
            self.sleeper.sleep(step).await;
            remaining = remaining.saturating_sub(step);
        }
    }

    fn next_step(remaining: Duration, interval: Duration) -> Duration {
        if interval.is_zero() {
            remaining
        } else {
            remaining.min(interval)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;
    use crate::testing::RecordingSleeper;
    use futures::FutureExt;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn governor(policy: RetryPolicy) -> (RetryGovernor, Arc<RecordingSleeper>, Arc<CollectingEventSink>) {
        let sleeper = Arc::new(RecordingSleeper::new());
        let events = Arc::new(CollectingEventSink::new());
        let governor = RetryGovernor::new(policy)
            .with_sleeper(sleeper.clone())
            .with_event_sink(events.clone());
        (governor, sleeper, events)
    }

    /// Fails with `errors` in order, then succeeds with the attempt number.
    fn scripted(calls: &Arc<AtomicU32>, errors: Vec<CapabilityError>) -> Operation<'static, u32> {
        let calls = calls.clone();
        Operation::new("scripted", move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            let result = errors.get(n as usize).cloned().map_or(Ok(n + 1), Err);
            async move { result }.boxed()
        })
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let (governor, sleeper, _) = governor(RetryPolicy::default());
        let calls = Arc::new(AtomicU32::new(0));

        let outcome = governor.execute(scripted(&calls, vec![])).await.unwrap();

        assert_eq!(outcome, RetryOutcome::Success { value: 1, attempts: 1 });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_always_exhausted_makes_exactly_max_attempts() {
        let (governor, sleeper, events) = governor(RetryPolicy::default());
        let calls = Arc::new(AtomicU32::new(0));
        let errors = vec![CapabilityError::quota("insufficient_quota"); 20];

        let outcome = governor.execute(scripted(&calls, errors)).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 10);
        assert_eq!(
            outcome,
            RetryOutcome::Exhausted {
                attempts: 10,
                last_error: CapabilityError::quota("insufficient_quota"),
            }
        );
        // No cooldown after the final attempt.
        assert_eq!(events.count("retry.cooldown_started"), 9);
        assert_eq!(events.count("retry.exhausted"), 1);
        assert_eq!(sleeper.total(), Duration::from_secs(9 * 3600));
    }

    #[tokio::test]
    async fn test_hard_failure_propagates_after_one_attempt() {
        let (governor, sleeper, events) = governor(RetryPolicy::default());
        let calls = Arc::new(AtomicU32::new(0));

        let failure = governor
            .execute(scripted(&calls, vec![CapabilityError::other("invalid request")]))
            .await
            .unwrap_err();

        assert_eq!(failure.attempts, 1);
        assert_eq!(failure.error, CapabilityError::other("invalid request"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.sleeps().is_empty());
        assert_eq!(events.count("retry.hard_failure"), 1);
    }

    #[tokio::test]
    async fn test_succeeds_after_two_capacity_errors() {
        let (governor, sleeper, _) = governor(RetryPolicy::default());
        let calls = Arc::new(AtomicU32::new(0));
        let errors = vec![
            CapabilityError::rate_limited("429"),
            CapabilityError::quota("exceeded your current quota"),
        ];

        let outcome = governor.execute(scripted(&calls, errors)).await.unwrap();

        assert_eq!(outcome, RetryOutcome::Success { value: 3, attempts: 3 });
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(sleeper.total(), Duration::from_secs(2 * 3600));
    }

    #[tokio::test]
    async fn test_hard_failure_after_capacity_error_is_not_retried() {
        let (governor, _, _) = governor(RetryPolicy::default());
        let calls = Arc::new(AtomicU32::new(0));
        let errors = vec![
            CapabilityError::rate_limited("429"),
            CapabilityError::other("500 internal error"),
        ];

        let failure = governor.execute(scripted(&calls, errors)).await.unwrap_err();

        assert_eq!(failure.attempts, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cooldown_progress_at_most_every_interval() {
        let policy = RetryPolicy::new().with_max_attempts(2);
        let (governor, sleeper, events) = governor(policy);
        let calls = Arc::new(AtomicU32::new(0));

        governor
            .execute(scripted(&calls, vec![CapabilityError::rate_limited("429")]))
            .await
            .unwrap();

        let sleeps = sleeper.sleeps();
        assert_eq!(sleeps.len(), 12);
        assert!(sleeps.iter().all(|d| *d <= Duration::from_secs(300)));
        assert_eq!(events.count("retry.cooldown_progress"), 12);

        let first = &events.events_of_type("retry.cooldown_progress")[0];
        let data = first.1.as_ref().unwrap();
        assert_eq!(data["remaining_secs"], 3600);
        assert_eq!(data["next_attempt"], 2);
    }

    #[tokio::test]
    async fn test_cooldown_with_uneven_interval() {
        let policy = RetryPolicy::new()
            .with_max_attempts(2)
            .with_cooldown_secs(1000)
            .with_progress_interval_secs(300);
        let (governor, sleeper, _) = governor(policy);
        let calls = Arc::new(AtomicU32::new(0));

        governor
            .execute(scripted(&calls, vec![CapabilityError::quota("quota")]))
            .await
            .unwrap();

        assert_eq!(
            sleeper.sleeps(),
            vec![
                Duration::from_secs(300),
                Duration::from_secs(300),
                Duration::from_secs(300),
                Duration::from_secs(100),
            ]
        );
    }

    #[tokio::test]
    async fn test_zero_progress_interval_sleeps_once() {
        let policy = RetryPolicy::new()
            .with_max_attempts(2)
            .with_cooldown_secs(90)
            .with_progress_interval_secs(0);
        let (governor, sleeper, _) = governor(policy);
        let calls = Arc::new(AtomicU32::new(0));

        governor
            .execute(scripted(&calls, vec![CapabilityError::quota("quota")]))
            .await
            .unwrap();

        assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(90)]);
    }

    #[tokio::test]
    async fn test_estimated_tokens_are_reported_not_enforced() {
        let (governor, _, events) = governor(RetryPolicy::default());
        let calls = Arc::new(AtomicU32::new(0));
        let operation = scripted(&calls, vec![]).with_estimated_tokens(u64::MAX);

        let outcome = governor.execute(operation).await.unwrap();

        assert!(matches!(outcome, RetryOutcome::Success { .. }));
        let attempt = &events.events_of_type("retry.attempt")[0];
        assert_eq!(attempt.1.as_ref().unwrap()["estimated_tokens"], u64::MAX);
    }

    #[tokio::test]
    async fn test_calls_do_not_share_state() {
        let policy = RetryPolicy::new().with_max_attempts(2).with_cooldown_secs(1);
        let (governor, _, _) = governor(policy);

        for _ in 0..3 {
            let calls = Arc::new(AtomicU32::new(0));
            let outcome = governor
                .execute(scripted(&calls, vec![CapabilityError::rate_limited("429")]))
                .await
                .unwrap();
            assert!(matches!(outcome, RetryOutcome::Success { attempts: 2, .. }));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_sleeper_waits_on_tokio_timer() {
        let policy = RetryPolicy::new().with_max_attempts(2).with_cooldown_secs(600);
        let governor = RetryGovernor::new(policy);
        let calls = Arc::new(AtomicU32::new(0));
        let start = tokio::time::Instant::now();

        let outcome = governor
            .execute(scripted(&calls, vec![CapabilityError::rate_limited("429")]))
            .await
            .unwrap();

        assert!(matches!(outcome, RetryOutcome::Success { .. }));
        assert!(start.elapsed() >= Duration::from_secs(600));
    }

    #[test]
    fn test_operation_debug() {
        let op: Operation<'_, ()> =
            Operation::new("tts", || async { Ok(()) }.boxed()).with_estimated_tokens(42);
        let debug = format!("{op:?}");
        assert!(debug.contains("tts"));
        assert!(debug.contains("42"));
    }
}
