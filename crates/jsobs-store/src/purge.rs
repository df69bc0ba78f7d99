//! Single-flight purge coordination.
//!
//! Each backend instance owns one [`PurgeCoordinator`]. A purge request
//! either takes the guard and runs, or fails immediately with
//! `AlreadyPurging`. Shutdown waits for an in-flight purge and reports its
//! outcome instead of starting a second one.

use crate::error::{Result, StoreError};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
struct PurgeState {
    /// Outcome of the most recent purge that ran to completion. Cleared when
    /// a purge starts, so a cancelled purge leaves `None` behind.
    last: Option<Result<u64>>,
}

/// Guard ensuring at most one purge executes per backend instance.
#[derive(Debug, Default)]
pub struct PurgeCoordinator {
    state: Mutex<PurgeState>,
    purging: AtomicBool,
}

/// Clears the purging flag however the purge future ends.
struct PurgingFlag<'a>(&'a AtomicBool);

impl<'a> PurgingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for PurgingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl PurgeCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a purge currently holds the guard
    pub fn is_purging(&self) -> bool {
        self.purging.load(Ordering::SeqCst)
    }

    /// Run `purge` unless another purge is in flight.
    ///
    /// The guard is released when `purge` finishes, fails or is dropped.
    pub async fn try_purge<F, Fut>(&self, purge: F) -> Result<u64>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<u64>>,
    {
        let mut state = self
            .state
            .try_lock()
            .map_err(|_| StoreError::AlreadyPurging)?;
        self.run(&mut state, purge).await
    }

    /// Make sure a purge has run to completion, joining one that is already
    /// in flight rather than racing a second one in.
    pub async fn purge_for_shutdown<F, Fut>(&self, purge: F) -> Result<u64>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<u64>>,
    {
        if let Ok(mut state) = self.state.try_lock() {
            return self.run(&mut state, purge).await;
        }

        debug!("Purge in flight, waiting for it to finish");
        let mut state = self.state.lock().await;
        match state.last.clone() {
            Some(outcome) => outcome,
            // The in-flight purge was cancelled before finishing
            None => self.run(&mut state, purge).await,
        }
    }

    async fn run<F, Fut>(&self, state: &mut PurgeState, purge: F) -> Result<u64>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<u64>>,
    {
        let _flag = PurgingFlag::raise(&self.purging);
        state.last = None;
        let outcome = purge().await;
        state.last = Some(outcome.clone());
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::oneshot;

    async fn wait_until_purging(coordinator: &PurgeCoordinator) {
        while !coordinator.is_purging() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    #[tokio::test]
    async fn test_idle_purge_runs() {
        let coordinator = PurgeCoordinator::new();
        let removed = coordinator.try_purge(|| async { Ok(5) }).await.unwrap();
        assert_eq!(removed, 5);
        assert!(!coordinator.is_purging());
    }

    #[tokio::test]
    async fn test_second_purge_rejected_while_first_in_flight() {
        let coordinator = Arc::new(PurgeCoordinator::new());
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let first = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .try_purge(|| async move {
                        let _ = release_rx.await;
                        Ok(3)
                    })
                    .await
            })
        };
        wait_until_purging(&coordinator).await;

        let second_ran = AtomicBool::new(false);
        let err = coordinator
            .try_purge(|| async {
                second_ran.store(true, Ordering::SeqCst);
                Ok(0)
            })
            .await
            .unwrap_err();
        assert!(err.is_already_purging());
        assert!(!second_ran.load(Ordering::SeqCst));

        release_tx.send(()).unwrap();
        assert_eq!(first.await.unwrap().unwrap(), 3);
        assert!(!coordinator.is_purging());
    }

    #[tokio::test]
    async fn test_failed_purge_releases_guard() {
        let coordinator = PurgeCoordinator::new();
        let err = coordinator
            .try_purge(|| async { Err(StoreError::Closed) })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Closed));

        let removed = coordinator.try_purge(|| async { Ok(1) }).await.unwrap();
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn test_cancelled_purge_releases_guard() {
        let coordinator = Arc::new(PurgeCoordinator::new());
        let stuck = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .try_purge(|| std::future::pending::<Result<u64>>())
                    .await
            })
        };
        wait_until_purging(&coordinator).await;
        stuck.abort();
        let _ = stuck.await;

        let removed = coordinator.try_purge(|| async { Ok(2) }).await.unwrap();
        assert_eq!(removed, 2);
    }

    #[tokio::test]
    async fn test_shutdown_purge_runs_when_idle() {
        let coordinator = PurgeCoordinator::new();
        let removed = coordinator
            .purge_for_shutdown(|| async { Ok(4) })
            .await
            .unwrap();
        assert_eq!(removed, 4);
    }

    #[tokio::test]
    async fn test_shutdown_joins_in_flight_purge() {
        let coordinator = Arc::new(PurgeCoordinator::new());
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let first = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .try_purge(|| async move {
                        let _ = release_rx.await;
                        Ok(7)
                    })
                    .await
            })
        };
        wait_until_purging(&coordinator).await;

        let second_ran = Arc::new(AtomicBool::new(false));
        let shutdown = {
            let coordinator = coordinator.clone();
            let second_ran = second_ran.clone();
            tokio::spawn(async move {
                coordinator
                    .purge_for_shutdown(|| async move {
                        second_ran.store(true, Ordering::SeqCst);
                        Ok(0)
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!shutdown.is_finished());

        release_tx.send(()).unwrap();
        assert_eq!(first.await.unwrap().unwrap(), 7);
        assert_eq!(shutdown.await.unwrap().unwrap(), 7);
        assert!(!second_ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_shutdown_observes_failed_in_flight_purge() {
        let coordinator = Arc::new(PurgeCoordinator::new());
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let first = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .try_purge(|| async move {
                        let _ = release_rx.await;
                        Err(StoreError::Closed)
                    })
                    .await
            })
        };
        wait_until_purging(&coordinator).await;

        let shutdown = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.purge_for_shutdown(|| async { Ok(0) }).await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;

        release_tx.send(()).unwrap();
        assert!(first.await.unwrap().is_err());
        assert!(matches!(
            shutdown.await.unwrap().unwrap_err(),
            StoreError::Closed
        ));
    }
}
