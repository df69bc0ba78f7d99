//! Background purge sweeper
//!
//! Periodically asks a backend to purge expired entries. Visibility never
//! depends on the sweeper; it only reclaims rows that reads already skip.

use crate::backend::StorageBackend;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Handle to a running purge sweeper. Dropping it stops the task.
#[derive(Debug)]
pub struct PurgeSweeper {
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl PurgeSweeper {
    /// Spawn a task purging `backend` every `period`, first after one period.
    pub fn start(backend: Arc<dyn StorageBackend>, period: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        info!(backend = %backend, period_ms = period.as_millis() as u64, "Purge sweeper started");
        let task = tokio::spawn(sweep_loop(backend, period, shutdown_rx));
        Self {
            shutdown_tx,
            task: Some(task),
        }
    }

    /// Signal the task to stop after its current purge
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Stop the task and wait for it to exit
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        info!("Purge sweeper stopped");
    }
}

impl Drop for PurgeSweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweep_loop(
    backend: Arc<dyn StorageBackend>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
                continue;
            }
        }

        match backend.purge().await {
            Ok(removed) => debug!(removed, "Sweep complete"),
            Err(e) if e.is_already_purging() => debug!("Purge already running, skipping sweep"),
            Err(e) => warn!(error = %e, "Sweep failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use chrono::{Duration as ChronoDuration, Utc};

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_purges_expired_entries() {
        let memory = Arc::new(MemoryBackend::new());
        let past = Utc::now() - ChronoDuration::hours(1);
        memory.save_with_expiry("/old/1", b"{}", past).await.unwrap();
        memory.save_with_expiry("/old/2", b"{}", past).await.unwrap();
        memory.save("/keep", b"{}").await.unwrap();

        let sweeper = PurgeSweeper::start(memory.clone(), Duration::from_secs(60));
        assert_eq!(memory.len_physical().await, 3);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(memory.len_physical().await, 1);

        sweeper.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_sweeper_does_not_purge() {
        let memory = Arc::new(MemoryBackend::new());
        let past = Utc::now() - ChronoDuration::hours(1);
        memory.save_with_expiry("/old", b"{}", past).await.unwrap();

        let sweeper = PurgeSweeper::start(memory.clone(), Duration::from_secs(60));
        sweeper.shutdown().await;

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(memory.len_physical().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_survives_failed_purge() {
        let memory = Arc::new(MemoryBackend::new().with_purge_on_shutdown(false));
        memory.shutdown().await.unwrap();

        let sweeper = PurgeSweeper::start(memory.clone(), Duration::from_secs(1));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!sweeper.task.as_ref().unwrap().is_finished());
        sweeper.shutdown().await;
    }
}
