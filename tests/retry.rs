//! Retry engine properties, exercised through both execution models:
//! termination, short-circuit on terminal failures, and the distinction
//! between running out of attempts and running out of time.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use skyinfer::retry::{self, RetryPolicy};
use skyinfer::{ApiError, Error};

fn retryable(message: &str) -> Error {
    Error::Api(ApiError {
        message: message.to_owned(),
        requires_retry: true,
        envelope: None,
    })
}

fn terminal(message: &str) -> Error {
    Error::Api(ApiError {
        message: message.to_owned(),
        requires_retry: false,
        envelope: None,
    })
}

#[tokio::test]
async fn always_failing_operation_exhausts_exactly_n_attempts() {
    let attempts = AtomicU32::new(0);
    let outcome = retry::run_async(&RetryPolicy::attempts(3), || {
        attempts.fetch_add(1, Ordering::SeqCst);
        async { Err::<(), _>(retryable("busy")) }
    })
    .await;

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    match outcome {
        Err(Error::RetryExhausted(history)) => assert_eq!(history.len(), 3),
        other => panic!("expected exhaustion, got {other:?}"),
    }
}

#[tokio::test]
async fn terminal_failure_short_circuits_remaining_attempts() {
    let attempts = AtomicU32::new(0);
    let outcome = retry::run_async(&RetryPolicy::attempts(5), || {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            if attempt == 1 {
                Err::<(), _>(retryable("busy"))
            } else {
                Err(terminal("credentials rejected"))
            }
        }
    })
    .await;

    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    match outcome {
        Err(Error::RetryExhausted(history)) => {
            assert_eq!(history.len(), 2);
            assert!(!history.errors()[1].requires_retry);
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
}

#[tokio::test]
async fn success_after_transient_failures_keeps_the_history() {
    let attempts = AtomicU32::new(0);
    let (history, value) = retry::run_async(&RetryPolicy::attempts(3), || {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            if attempt < 3 {
                Err(retryable("gateway timed out"))
            } else {
                Ok(attempt)
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(value, 3);
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn immediate_success_has_empty_history() {
    let (history, value) =
        retry::run_async(&RetryPolicy::attempts(3), || async { Ok(7) })
            .await
            .unwrap();
    assert_eq!(value, 7);
    assert!(history.is_empty());
}

#[tokio::test]
async fn unclassified_errors_propagate_unwrapped() {
    let attempts = AtomicU32::new(0);
    let outcome = retry::run_async(&RetryPolicy::attempts(5), || {
        attempts.fetch_add(1, Ordering::SeqCst);
        async { Err::<(), _>(Error::Config("bad model".to_owned())) }
    })
    .await;

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert!(matches!(outcome, Err(Error::Config(_))));
}

#[tokio::test]
async fn deadline_expiry_is_a_timeout_not_an_exhaustion() {
    let policy = RetryPolicy {
        max_attempts: None,
        poll_interval: Duration::from_millis(10),
    };
    let outcome = retry::run_async_with_deadline(&policy, Duration::from_millis(100), || async {
        Err::<(), _>(retryable("still pending"))
    })
    .await;

    assert!(matches!(outcome, Err(Error::RetryTimeout { .. })));
}

#[tokio::test]
async fn deadline_cancels_an_operation_that_never_resolves() {
    let policy = RetryPolicy::polling(Duration::from_millis(10));
    let outcome = retry::run_async_with_deadline(&policy, Duration::from_millis(100), || async {
        std::future::pending::<skyinfer::Result<()>>().await
    })
    .await;

    assert!(matches!(outcome, Err(Error::RetryTimeout { .. })));
}

#[test]
fn blocking_engine_exhausts_exactly_n_attempts() {
    let mut attempts = 0u32;
    let outcome = retry::run(&RetryPolicy::attempts(3), || {
        attempts += 1;
        Err::<(), _>(retryable("busy"))
    });

    assert_eq!(attempts, 3);
    match outcome {
        Err(Error::RetryExhausted(history)) => assert_eq!(history.len(), 3),
        other => panic!("expected exhaustion, got {other:?}"),
    }
}

#[test]
fn blocking_engine_short_circuits_on_terminal_failure() {
    let mut attempts = 0u32;
    let outcome = retry::run(&RetryPolicy::attempts(5), || {
        attempts += 1;
        if attempts < 2 {
            Err::<(), _>(retryable("busy"))
        } else {
            Err(terminal("rejected"))
        }
    });

    assert_eq!(attempts, 2);
    match outcome {
        Err(Error::RetryExhausted(history)) => assert_eq!(history.len(), 2),
        other => panic!("expected exhaustion, got {other:?}"),
    }
}

#[test]
fn blocking_deadline_reports_timeout_while_worker_winds_down() {
    let outcome = retry::run_with_deadline(
        &RetryPolicy::polling(Duration::from_millis(20)),
        Duration::from_millis(100),
        || {
            std::thread::sleep(Duration::from_millis(30));
            Err::<(), _>(retryable("still pending"))
        },
    );

    assert!(matches!(outcome, Err(Error::RetryTimeout { .. })));
}

#[test]
fn blocking_deadline_returns_a_result_that_beats_the_clock() {
    let (history, value) = retry::run_with_deadline(
        &RetryPolicy::polling(Duration::from_millis(5)),
        Duration::from_secs(5),
        {
            let mut attempts = 0u32;
            move || {
                attempts += 1;
                if attempts < 3 {
                    Err(retryable("pending"))
                } else {
                    Ok("done")
                }
            }
        },
    )
    .unwrap();

    assert_eq!(value, "done");
    assert_eq!(history.len(), 2);
}

#[test]
fn zero_attempt_budget_exhausts_immediately() {
    let outcome = retry::run(&RetryPolicy::attempts(0), || Ok::<_, Error>(1));
    match outcome {
        Err(Error::RetryExhausted(history)) => assert!(history.is_empty()),
        other => panic!("expected exhaustion, got {other:?}"),
    }
}
