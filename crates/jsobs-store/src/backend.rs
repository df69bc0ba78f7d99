//! Storage engine contract.
//!
//! Callers program against [`StorageBackend`] only; the PostgreSQL and
//! in-memory implementations are interchangeable behind it.

use crate::error::Result;
use crate::types::Detail;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Display;

/// Capability set every storage backend implements.
///
/// An entry is *visible* when it has no expiry or its expiry is strictly in
/// the future at query time. Loads, lists and counts only see visible
/// entries. Expired entries stay physically present until [`purge`] removes
/// them, and [`delete`] can still remove them before that.
///
/// Prefixes are literal string prefixes; the empty prefix matches every path.
///
/// [`purge`]: StorageBackend::purge
/// [`delete`]: StorageBackend::delete
#[async_trait]
pub trait StorageBackend: Display + Send + Sync {
    /// Upsert `data` at `path` with no expiry.
    async fn save(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Upsert `data` at `path`, visible until `expiry`.
    ///
    /// An expiry in the past is accepted; the entry is invisible at once.
    async fn save_with_expiry(&self, path: &str, data: &[u8], expiry: DateTime<Utc>)
        -> Result<()>;

    /// Payload of the visible entry at `path`.
    ///
    /// Fails with `NotFound` when no row exists or the row has expired.
    async fn load(&self, path: &str) -> Result<Vec<u8>>;

    /// Metadata of the visible entry at `path`, same visibility as [`load`].
    ///
    /// [`load`]: StorageBackend::load
    async fn load_detail(&self, path: &str) -> Result<Detail>;

    /// Remove the row at `path` whether or not it is visible.
    ///
    /// Fails with `NotFound` only when no row exists at all.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Visible paths starting with `prefix`, ascending.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Details of visible entries starting with `prefix`, ascending by path.
    async fn list_detail(&self, prefix: &str) -> Result<Vec<Detail>>;

    /// Number of visible entries starting with `prefix`.
    async fn count(&self, prefix: &str) -> Result<u64>;

    /// Number of visible entries.
    async fn count_all(&self) -> Result<u64>;

    /// Remove every entry whose expiry is at or before now.
    ///
    /// At most one purge runs per backend instance; a concurrent request
    /// fails with `AlreadyPurging` instead of waiting.
    async fn purge(&self) -> Result<u64>;

    /// Release resources, purging first when the backend's policy says so.
    ///
    /// Safe to call more than once.
    async fn shutdown(&self) -> Result<()>;
}
