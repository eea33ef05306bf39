//! Retry engine: bounded or deadline-driven attempt loops over classified
//! failures, with identical observable semantics for the blocking and the
//! cooperative execution model.
//!
//! Only [`crate::Error::Api`] failures participate in the retry contract;
//! the engine inspects their `requires_retry` verdict and stops at the
//! first terminal one. Every other error kind is a transport or programmer
//! fault and propagates unwrapped immediately.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::error::RetryHistory;
use crate::{Error, Result};

/// Attempt budget for one logical operation.
///
/// `max_attempts: None` loops until success, a terminal failure, or an
/// external deadline - the shape used when polling a deferred prediction.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: Option<u32>,
    pub poll_interval: Duration,
}

impl RetryPolicy {
    pub fn attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            poll_interval: Duration::ZERO,
        }
    }

    pub fn polling(poll_interval: Duration) -> Self {
        Self {
            max_attempts: None,
            poll_interval,
        }
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.map_or(false, |max| attempts >= max)
    }
}

/// Drive `operation` under `policy`, returning the accumulated failure
/// history alongside the first success.
pub async fn run_async<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<(RetryHistory, T)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut history = RetryHistory::new();
    let mut attempts = 0u32;
    while !policy.exhausted(attempts) {
        attempts += 1;
        match operation().await {
            Ok(value) => return Ok((history, value)),
            Err(Error::Api(failure)) => {
                debug!(
                    attempt = attempts,
                    requires_retry = failure.requires_retry,
                    error = %failure,
                    "attempt failed"
                );
                let terminal = !failure.requires_retry;
                history.push(failure);
                if terminal {
                    return Err(Error::RetryExhausted(history));
                }
                if !policy.poll_interval.is_zero() {
                    tokio::time::sleep(policy.poll_interval).await;
                }
            }
            Err(other) => return Err(other),
        }
    }
    Err(Error::RetryExhausted(history))
}

/// Deadline variant for the cooperative model: the whole loop runs under a
/// scheduler timeout, and expiry cancels the in-flight attempt.
pub async fn run_async_with_deadline<T, F, Fut>(
    policy: &RetryPolicy,
    deadline: Duration,
    operation: F,
) -> Result<(RetryHistory, T)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, run_async(policy, operation)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(Error::RetryTimeout { waited: deadline }),
    }
}

/// Blocking counterpart of [`run_async`].
pub fn run<T, F>(policy: &RetryPolicy, operation: F) -> Result<(RetryHistory, T)>
where
    F: FnMut() -> Result<T>,
{
    run_guarded(policy, &AtomicBool::new(false), Duration::ZERO, operation)
}

/// Deadline variant for the blocking model: the loop runs on a background
/// worker joined with the deadline. Expiry signals the worker through a
/// cooperative flag checked between attempts - the in-flight attempt is
/// never killed, its eventual outcome is simply discarded.
pub fn run_with_deadline<T, F>(
    policy: &RetryPolicy,
    deadline: Duration,
    operation: F,
) -> Result<(RetryHistory, T)>
where
    T: Send + 'static,
    F: FnMut() -> Result<T> + Send + 'static,
{
    let cancelled = Arc::new(AtomicBool::new(false));
    let (sender, receiver) = mpsc::channel();
    let worker_policy = policy.clone();
    let worker_flag = cancelled.clone();
    thread::spawn(move || {
        let _ = sender.send(run_guarded(&worker_policy, &worker_flag, deadline, operation));
    });
    match receiver.recv_timeout(deadline) {
        Ok(outcome) => outcome,
        Err(RecvTimeoutError::Timeout) => {
            cancelled.store(true, Ordering::Relaxed);
            debug!(?deadline, "retry deadline elapsed; worker signalled to stop");
            Err(Error::RetryTimeout { waited: deadline })
        }
        Err(RecvTimeoutError::Disconnected) => {
            panic!("retry worker exited without reporting an outcome")
        }
    }
}

fn run_guarded<T, F>(
    policy: &RetryPolicy,
    cancelled: &AtomicBool,
    deadline: Duration,
    mut operation: F,
) -> Result<(RetryHistory, T)>
where
    F: FnMut() -> Result<T>,
{
    let mut history = RetryHistory::new();
    let mut attempts = 0u32;
    while !policy.exhausted(attempts) {
        if cancelled.load(Ordering::Relaxed) {
            // The joining side already reported the deadline; this outcome
            // is dropped on the floor.
            return Err(Error::RetryTimeout { waited: deadline });
        }
        attempts += 1;
        match operation() {
            Ok(value) => return Ok((history, value)),
            Err(Error::Api(failure)) => {
                debug!(
                    attempt = attempts,
                    requires_retry = failure.requires_retry,
                    error = %failure,
                    "attempt failed"
                );
                let terminal = !failure.requires_retry;
                history.push(failure);
                if terminal {
                    return Err(Error::RetryExhausted(history));
                }
                if !policy.poll_interval.is_zero() {
                    thread::sleep(policy.poll_interval);
                }
            }
            Err(other) => return Err(other),
        }
    }
    Err(Error::RetryExhausted(history))
}
