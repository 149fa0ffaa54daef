//! Keyed request coalescing.
//!
//! Collapses N concurrent demands for the same key into one flight: the
//! first caller spawns the work on a detached task, and every caller
//! (the electing one included) waits on the shared result. A cancelled
//! waiter detaches with the cancellation fault without affecting the
//! flight, which always runs to completion and publishes its result.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::{TokenError, TokenResult};

type FlightResult = TokenResult<String>;
type FlightReceiver = watch::Receiver<Option<FlightResult>>;

/// Table of in-flight refreshes, one slot per key.
#[derive(Clone)]
pub(crate) struct FlightGroup {
    flights: Arc<Mutex<HashMap<String, FlightReceiver>>>,
    tracker: TaskTracker,
}

impl FlightGroup {
    pub(crate) fn new() -> Self {
        Self {
            flights: Arc::new(Mutex::new(HashMap::new())),
            tracker: TaskTracker::new(),
        }
    }

    /// Tracker carrying every flight and proactive-refresh task, so shutdown
    /// can drain them.
    pub(crate) fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Runs `work` under `key`, or joins the flight already in progress.
    ///
    /// `work` executes on a detached task; the caller's `cancel` token only
    /// governs how long this caller waits for the shared result.
    pub(crate) async fn run<F>(&self, key: &str, cancel: &CancellationToken, work: F) -> FlightResult
    where
        F: std::future::Future<Output = FlightResult> + Send + 'static,
    {
        let mut rx = {
            let mut flights = self.flights.lock();
            if let Some(rx) = flights.get(key) {
                rx.clone()
            } else {
                let (tx, rx) = watch::channel(None);
                flights.insert(key.to_string(), rx.clone());

                let table = Arc::clone(&self.flights);
                let key = key.to_string();
                let _flight = self.tracker.spawn(async move {
                    let result = work.await;
                    // Remove the slot before publishing so a caller arriving
                    // after the result can only start a fresh flight.
                    table.lock().remove(&key);
                    let _ = tx.send(Some(result));
                });
                rx
            }
        };

        wait(&mut rx, cancel).await
    }
}

async fn wait(rx: &mut FlightReceiver, cancel: &CancellationToken) -> FlightResult {
    loop {
        if let Some(result) = rx.borrow_and_update().clone() {
            return result;
        }
        tokio::select! {
            () = cancel.cancelled() => return Err(TokenError::Cancelled),
            changed = rx.changed() => {
                if changed.is_err() {
                    return Err(TokenError::Internal(
                        "refresh flight dropped without publishing a result".to_string(),
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_callers_share_one_execution() {
        let group = FlightGroup::new();
        let runs = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let group = group.clone();
            let runs = Arc::clone(&runs);
            handles.push(tokio::spawn(async move {
                let cancel = CancellationToken::new();
                group
                    .run("k", &cancel, async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok("value".to_string())
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "value");
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_keys_run_independently() {
        let group = FlightGroup::new();
        let runs = Arc::new(AtomicU32::new(0));

        for key in ["a", "b"] {
            let runs = Arc::clone(&runs);
            let cancel = CancellationToken::new();
            group
                .run(key, &cancel, async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(key.to_string())
                })
                .await
                .unwrap();
        }
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn faults_fan_out_to_every_waiter() {
        let group = FlightGroup::new();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let group = group.clone();
            handles.push(tokio::spawn(async move {
                let cancel = CancellationToken::new();
                group
                    .run("k", &cancel, async {
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Err(TokenError::Internal("boom".to_string()))
                    })
                    .await
            }));
        }

        for handle in handles {
            assert!(matches!(
                handle.await.unwrap(),
                Err(TokenError::Internal(_))
            ));
        }
    }

    #[tokio::test]
    async fn a_cancelled_waiter_does_not_abort_the_flight() {
        let group = FlightGroup::new();
        let runs = Arc::new(AtomicU32::new(0));

        let cancelled = CancellationToken::new();
        cancelled.cancel();
        let flight_runs = Arc::clone(&runs);
        let result = group
            .run("k", &cancelled, async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                flight_runs.fetch_add(1, Ordering::SeqCst);
                Ok("value".to_string())
            })
            .await;
        assert!(matches!(result, Err(TokenError::Cancelled)));

        // A second caller joins the same flight and sees its result; the
        // work ran exactly once despite the first caller detaching.
        let cancel = CancellationToken::new();
        let value = group
            .run("k", &cancel, async {
                panic!("flight already in progress; this work must not run")
            })
            .await
            .unwrap();
        assert_eq!(value, "value");
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn a_completed_flight_does_not_serve_later_callers() {
        let group = FlightGroup::new();
        let cancel = CancellationToken::new();

        let first = group
            .run("k", &cancel, async { Ok("first".to_string()) })
            .await
            .unwrap();
        assert_eq!(first, "first");

        let second = group
            .run("k", &cancel, async { Ok("second".to_string()) })
            .await
            .unwrap();
        assert_eq!(second, "second");
    }
}
