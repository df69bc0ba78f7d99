//! PostgreSQL storage backend.
//!
//! Entries are rows in one table (see [`PgBackend::schema`]). Every
//! operation is a single statement on the shared pool; only purges are
//! serialized, through the backend's [`PurgeCoordinator`].

use crate::backend::StorageBackend;
use crate::config::{validate_table, PgConfig};
use crate::error::{Result, StoreError};
use crate::purge::PurgeCoordinator;
use crate::sql::Statements;
use crate::types::Detail;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::fmt;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

/// `StorageBackend` over one PostgreSQL table.
pub struct PgBackend {
    pool: PgPool,
    table: String,
    purge_on_shutdown: bool,
    sql: Statements,
    purges: PurgeCoordinator,
}

impl PgBackend {
    /// Build a backend from configuration.
    ///
    /// The URL is read and parsed here, so a missing or malformed value
    /// fails construction. Connections are opened lazily on first use, by
    /// the tokio runtime current at construction; outside one this fails
    /// with [`StoreError::Config`].
    pub fn new(config: &PgConfig) -> Result<Self> {
        validate_table(&config.table)?;
        let options = config.connect_options()?;
        Handle::try_current().map_err(|e| {
            StoreError::Config(format!("PostgreSQL backend needs a tokio runtime: {}", e))
        })?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_lazy_with(options);
        info!(table = %config.table, "PostgreSQL backend configured");
        Ok(Self::build(
            pool,
            config.table.clone(),
            config.purge_on_shutdown,
        ))
    }

    /// Build a backend over an existing pool, with purge on shutdown enabled.
    pub fn from_pool(pool: PgPool, table: &str) -> Result<Self> {
        validate_table(table)?;
        Ok(Self::build(pool, table.to_string(), true))
    }

    fn build(pool: PgPool, table: String, purge_on_shutdown: bool) -> Self {
        let sql = Statements::for_table(&table);
        Self {
            pool,
            table,
            purge_on_shutdown,
            sql,
            purges: PurgeCoordinator::new(),
        }
    }

    pub fn with_purge_on_shutdown(mut self, purge: bool) -> Self {
        self.purge_on_shutdown = purge;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn purge_on_shutdown(&self) -> bool {
        self.purge_on_shutdown
    }

    pub fn is_purging(&self) -> bool {
        self.purges.is_purging()
    }

    /// SQL creating this backend's table and its expiry index
    pub fn schema(&self) -> String {
        self.sql.schema.clone()
    }

    /// Execute [`schema`](Self::schema). Fails if the table already exists.
    pub async fn create_table(&self) -> Result<()> {
        info!(table = %self.table, "Creating table");
        sqlx::raw_sql(&self.sql.schema)
            .execute(&self.pool)
            .await
            .map_err(StoreError::database(format!("create table {}", self.table)))?;
        Ok(())
    }

    async fn upsert(&self, path: &str, data: &[u8], expiry: Option<DateTime<Utc>>) -> Result<()> {
        let size = i32::try_from(data.len()).map_err(|_| StoreError::PayloadTooLarge {
            path: path.to_string(),
            size: data.len(),
        })?;
        sqlx::query(&self.sql.save)
            .bind(path)
            .bind(data)
            .bind(size)
            .bind(expiry)
            .execute(&self.pool)
            .await
            .map_err(StoreError::database(format!("save {}", path)))?;
        Ok(())
    }

    async fn delete_expired(&self) -> Result<u64> {
        let result = sqlx::query(&self.sql.purge)
            .execute(&self.pool)
            .await
            .map_err(StoreError::database(format!("purge {}", self.table)))?;
        let removed = result.rows_affected();
        info!(table = %self.table, removed, "Purged expired entries");
        Ok(removed)
    }
}

impl fmt::Display for PgBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pgclient (table={})", self.table)
    }
}

impl fmt::Debug for PgBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgBackend")
            .field("table", &self.table)
            .field("purge_on_shutdown", &self.purge_on_shutdown)
            .field("purging", &self.purges.is_purging())
            .finish()
    }
}

#[async_trait]
impl StorageBackend for PgBackend {
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
        let row: Option<(Vec<u8>,)> = sqlx::query_as(&self.sql.load)
            .bind(path)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::database(format!("load {}", path)))?;
        row.map(|r| r.0).ok_or_else(|| StoreError::not_visible(path))
    }

    async fn load_detail(&self, path: &str) -> Result<Detail> {
        sqlx::query_as::<_, Detail>(&self.sql.load_detail)
            .bind(path)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::database(format!("load detail {}", path)))?
            .ok_or_else(|| StoreError::not_visible(path))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        debug!("Deleting {}", path);
        let result = sqlx::query(&self.sql.delete)
            .bind(path)
            .execute(&self.pool)
            .await
            .map_err(StoreError::database(format!("delete {}", path)))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_present(path));
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        sqlx::query_scalar(&self.sql.list)
            .bind(prefix)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::database(format!("list {}", prefix)))
    }

    async fn list_detail(&self, prefix: &str) -> Result<Vec<Detail>> {
        sqlx::query_as::<_, Detail>(&self.sql.list_detail)
            .bind(prefix)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::database(format!("list detail {}", prefix)))
    }

    async fn count(&self, prefix: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(&self.sql.count)
            .bind(prefix)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::database(format!("count {}", prefix)))?;
        Ok(count.max(0) as u64)
    }

    async fn count_all(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(&self.sql.count_all)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::database("count all"))?;
        Ok(count.max(0) as u64)
    }

    async fn purge(&self) -> Result<u64> {
        self.purges.try_purge(|| self.delete_expired()).await
    }

    async fn shutdown(&self) -> Result<()> {
        if self.pool.is_closed() {
            debug!(table = %self.table, "Backend already shut down");
            return Ok(());
        }
        if self.purge_on_shutdown {
            if let Err(e) = self
                .purges
                .purge_for_shutdown(|| self.delete_expired())
                .await
            {
                warn!(table = %self.table, error = %e, "Purge on shutdown failed");
                self.pool.close().await;
                return Err(e);
            }
        }
        info!(table = %self.table, "Closing database connection...");
        self.pool.close().await;
        Ok(())
    }
}
