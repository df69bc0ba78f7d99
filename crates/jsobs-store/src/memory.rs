//! In-memory storage backend.
//!
//! Same visibility, purge and shutdown semantics as the PostgreSQL backend,
//! with the process clock standing in for the database clock.

use crate::backend::StorageBackend;
use crate::error::{Result, StoreError};
use crate::purge::PurgeCoordinator;
use crate::types::Detail;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Clone)]
struct Entry {
    data: Vec<u8>,
    expiry: Option<DateTime<Utc>>,
    modified: DateTime<Utc>,
}

impl Entry {
    fn is_visible(&self, now: DateTime<Utc>) -> bool {
        self.expiry.map_or(true, |expiry| expiry > now)
    }

    fn detail(&self, path: &str) -> Detail {
        // Sizes above i32::MAX are rejected on save
        Detail::new(path, self.data.len() as i32, self.expiry, self.modified)
    }
}

/// `StorageBackend` keeping entries in an ordered map.
#[derive(Debug)]
pub struct MemoryBackend {
    entries: RwLock<BTreeMap<String, Entry>>,
    purge_on_shutdown: bool,
    closed: AtomicBool,
    purges: PurgeCoordinator,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            purge_on_shutdown: true,
            closed: AtomicBool::new(false),
            purges: PurgeCoordinator::new(),
        }
    }

    pub fn with_purge_on_shutdown(mut self, purge: bool) -> Self {
        self.purge_on_shutdown = purge;
        self
    }

    /// Rows physically held, expired or not
    pub async fn len_physical(&self) -> usize {
        self.entries.read().await.len()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    async fn upsert(&self, path: &str, data: &[u8], expiry: Option<DateTime<Utc>>) -> Result<()> {
        self.ensure_open()?;
        if i32::try_from(data.len()).is_err() {
            return Err(StoreError::PayloadTooLarge {
                path: path.to_string(),
                size: data.len(),
            });
        }
        let entry = Entry {
            data: data.to_vec(),
            expiry,
            modified: Utc::now(),
        };
        self.entries.write().await.insert(path.to_string(), entry);
        Ok(())
    }

    /// Visible entries under `prefix`, in path order
    async fn visible<T>(&self, prefix: &str, f: impl Fn(&str, &Entry) -> T) -> Result<Vec<T>> {
        self.ensure_open()?;
        let now = Utc::now();
        let entries = self.entries.read().await;
        Ok(entries
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(path, _)| path.starts_with(prefix))
            .filter(|(_, entry)| entry.is_visible(now))
            .map(|(path, entry)| f(path.as_str(), entry))
            .collect())
    }

    async fn delete_expired(&self) -> Result<u64> {
        self.ensure_open()?;
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_visible(now));
        let removed = (before - entries.len()) as u64;
        info!(removed, "Purged expired entries");
        Ok(removed)
    }
}

impl fmt::Display for MemoryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "memory")
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn save(&self, path: &str, data: &[u8]) -> Result<()> {
        debug!("Saving {}", path);
        self.upsert(path, data, None).await
    }

    async fn save_with_expiry(
        &self,
        path: &str,
        data: &[u8],
        expiry: DateTime<Utc>,
    ) -> Result<()> {
        debug!(%expiry, "Saving {}", path);
        self.upsert(path, data, Some(expiry)).await
    }

    async fn load(&self, path: &str) -> Result<Vec<u8>> {
        self.ensure_open()?;
        let now = Utc::now();
        let entries = self.entries.read().await;
        entries
            .get(path)
            .filter(|entry| entry.is_visible(now))
            .map(|entry| entry.data.clone())
            .ok_or_else(|| StoreError::not_visible(path))
    }

    async fn load_detail(&self, path: &str) -> Result<Detail> {
        self.ensure_open()?;
        let now = Utc::now();
        let entries = self.entries.read().await;
        entries
            .get(path)
            .filter(|entry| entry.is_visible(now))
            .map(|entry| entry.detail(path))
            .ok_or_else(|| StoreError::not_visible(path))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.ensure_open()?;
        debug!("Deleting {}", path);
        match self.entries.write().await.remove(path) {
            Some(_) => Ok(()),
            None => Err(StoreError::not_present(path)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.visible(prefix, |path, _| path.to_string()).await
    }

    async fn list_detail(&self, prefix: &str) -> Result<Vec<Detail>> {
        self.visible(prefix, |path, entry| entry.detail(path)).await
    }

    async fn count(&self, prefix: &str) -> Result<u64> {
        Ok(self.visible(prefix, |_, _| ()).await?.len() as u64)
    }

    async fn count_all(&self) -> Result<u64> {
        self.count("").await
    }

    async fn purge(&self) -> Result<u64> {
        self.purges.try_purge(|| self.delete_expired()).await
    }

    async fn shutdown(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        let outcome = if self.purge_on_shutdown {
            self.purges
                .purge_for_shutdown(|| self.delete_expired())
                .await
                .map(|_| ())
        } else {
            Ok(())
        };
        self.closed.store(true, Ordering::SeqCst);
        info!("Memory backend shut down");
        outcome
    }
}
