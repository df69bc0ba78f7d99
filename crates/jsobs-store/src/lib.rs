//! TTL-aware blob storage engine
//!
//! Stores opaque byte payloads under path strings with an optional expiry.
//! Expired entries disappear from every read at once and are physically
//! removed later by a purge.

pub mod backend;
pub mod config;
pub mod error;
pub mod memory;
pub mod pg;
pub mod purge;
mod sql;
pub mod sweeper;
pub mod types;

pub use backend::StorageBackend;
pub use config::PgConfig;
pub use error::{Lookup, Result, StoreError};
pub use memory::MemoryBackend;
pub use pg::PgBackend;
pub use purge::PurgeCoordinator;
pub use sqlx::postgres::PgPool;
pub use sweeper::PurgeSweeper;
pub use types::Detail;
