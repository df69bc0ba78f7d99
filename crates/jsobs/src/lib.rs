//! JSON object storage with expiry
//!
//! [`Client`] marshals values to JSON and hands the bytes to a
//! [`StorageBackend`]; everything about visibility, expiry and purging is
//! the backend's business.
//!
//! ```ignore
//! let client = jsobs::Client::connect_pg()?;
//! client.save("/demo/t0.json", &thing).await?;
//! let back: Thing = client.load("/demo/t0.json").await?;
//! client.shutdown().await?;
//! ```

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

pub use jsobs_store::{
    Detail, Lookup, MemoryBackend, PgBackend, PgConfig, PurgeSweeper, Result, StorageBackend,
    StoreError,
};

/// True if `err` means nothing visible (load) or nothing present (delete)
/// lives at the requested path.
pub fn is_not_found(err: &StoreError) -> bool {
    err.is_not_found()
}

/// Save, load, list and delete JSON objects through a storage backend.
#[derive(Clone)]
pub struct Client {
    backend: Arc<dyn StorageBackend>,
}

impl Client {
    pub fn new(backend: impl StorageBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    pub fn from_arc(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Client over PostgreSQL, configured from the environment
    /// (`DATABASE_URL` by default).
    ///
    /// Must be called from within a tokio runtime; otherwise this returns
    /// a configuration error.
    pub fn connect_pg() -> Result<Self> {
        Self::connect_pg_with(&PgConfig::from_env())
    }

    /// Like [`connect_pg`](Self::connect_pg) with explicit configuration
    pub fn connect_pg_with(config: &PgConfig) -> Result<Self> {
        Ok(Self::new(PgBackend::new(config)?))
    }

    /// Shared handle to the backend, e.g. for a [`PurgeSweeper`]
    pub fn backend(&self) -> Arc<dyn StorageBackend> {
        self.backend.clone()
    }

    /// Marshal `value` to JSON and store it at `path` with no expiry,
    /// replacing anything already there.
    pub async fn save<T: Serialize + ?Sized>(&self, path: &str, value: &T) -> Result<()> {
        let data = to_json(value)?;
        self.save_raw(path, &data).await
    }

    /// Like [`save`](Self::save), visible only until `expiry`.
    pub async fn save_expiry<T: Serialize + ?Sized>(
        &self,
        path: &str,
        value: &T,
        expiry: DateTime<Utc>,
    ) -> Result<()> {
        let data = to_json(value)?;
        self.save_raw_expiry(path, &data, expiry).await
    }

    /// Store bytes as-is. Nothing checks that they are JSON.
    pub async fn save_raw(&self, path: &str, data: &[u8]) -> Result<()> {
        self.backend.save(path, data).await
    }

    pub async fn save_raw_expiry(
        &self,
        path: &str,
        data: &[u8],
        expiry: DateTime<Utc>,
    ) -> Result<()> {
        self.backend.save_with_expiry(path, data, expiry).await
    }

    /// Load the object at `path` and unmarshal it.
    pub async fn load<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let data = self.load_raw(path).await?;
        serde_json::from_slice(&data).map_err(|e| {
            debug!(path, error = %e, "Stored object did not unmarshal");
            StoreError::Serialization(format!("failed to unmarshal {}: {}", path, e))
        })
    }

    pub async fn load_raw(&self, path: &str) -> Result<Vec<u8>> {
        self.backend.load(path).await
    }

    pub async fn load_detail(&self, path: &str) -> Result<Detail> {
        self.backend.load_detail(path).await
    }

    /// Delete the object at `path`, expired or not.
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.backend.delete(path).await
    }

    /// Paths of visible objects beginning with `prefix`, in order. An empty
    /// result is not an error.
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.backend.list(prefix).await
    }

    pub async fn list_detail(&self, prefix: &str) -> Result<Vec<Detail>> {
        self.backend.list_detail(prefix).await
    }

    pub async fn count(&self, prefix: &str) -> Result<u64> {
        self.backend.count(prefix).await
    }

    pub async fn count_all(&self) -> Result<u64> {
        self.backend.count_all().await
    }

    pub async fn purge(&self) -> Result<u64> {
        self.backend.purge().await
    }

    /// Shut the backend down, purging expired objects if it is configured to.
    pub async fn shutdown(&self) -> Result<()> {
        self.backend.shutdown().await
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("backend", &self.backend.to_string())
            .finish()
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value)
        .map_err(|e| StoreError::Serialization(format!("failed to marshal JSON: {}", e)))
}
