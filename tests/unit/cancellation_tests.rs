//! Unit tests for the session cancellation token.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pipeline_progress::orchestrator::CancellationToken;

#[test]
fn new_token_is_not_cancelled() {
    let token = CancellationToken::new();
    assert!(!token.is_cancelled());
    assert!(!token.observer().is_cancelled());
}

#[test]
fn cancel_is_idempotent() {
    let token = CancellationToken::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    token.on_cancelled(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    assert!(token.cancel(), "first cancel should trigger");
    assert!(!token.cancel(), "second cancel should be a no-op");
    assert!(!token.cancel());

    assert!(token.is_cancelled());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn callbacks_run_in_registration_order() {
    let token = CancellationToken::new();
    let order = Arc::new(Mutex::new(Vec::new()));
    for n in 0..4 {
        let order = Arc::clone(&order);
        token.on_cancelled(move || order.lock().unwrap().push(n));
    }

    token.cancel();

    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
}

#[test]
fn late_registration_runs_immediately() {
    let token = CancellationToken::new();
    token.cancel();

    let ran = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ran);
    token.on_cancelled(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[test]
fn callback_may_query_token_without_deadlock() {
    let token = Arc::new(CancellationToken::new());
    let seen = Arc::new(Mutex::new(None));
    let inner_token = Arc::clone(&token);
    let inner_seen = Arc::clone(&seen);
    token.on_cancelled(move || {
        *inner_seen.lock().unwrap() = Some(inner_token.is_cancelled());
    });

    token.cancel();

    assert_eq!(*seen.lock().unwrap(), Some(true));
}

#[test]
fn observer_shares_state_with_token() {
    let token = CancellationToken::new();
    let observer = token.observer();
    let observer_clone = observer.clone();

    let ran = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ran);
    observer.on_cancelled(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    token.cancel();

    assert!(observer.is_cancelled());
    assert!(observer_clone.is_cancelled());
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cancelled_future_resolves_after_cancel() {
    let token = Arc::new(CancellationToken::new());
    let observer = token.observer();

    let waiter = tokio::spawn(async move {
        observer.cancelled().await;
        true
    });

    tokio::task::yield_now().await;
    assert!(!waiter.is_finished());

    token.cancel();

    let woke = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("waiter should wake")
        .expect("waiter should not panic");
    assert!(woke);
}

#[tokio::test]
async fn cancelled_future_is_ready_when_already_cancelled() {
    let token = CancellationToken::new();
    token.cancel();

    tokio::time::timeout(Duration::from_millis(100), token.cancelled())
        .await
        .expect("already-cancelled token should resolve immediately");
}
