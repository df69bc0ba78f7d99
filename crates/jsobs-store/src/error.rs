//! Error types for the storage engine

use std::fmt;
use std::sync::Arc;

/// Which rows a lookup was allowed to see when it reported `NotFound`.
///
/// Loads only see visible rows, so an expired row that has not been purged
/// yet is reported as absent. Deletes see every physically present row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Visibility-based absence: no row, or the row has expired.
    Visible,
    /// Existence-based absence: no row at all.
    Present,
}

#[derive(Debug, Clone)]
pub enum StoreError {
    NotFound { path: String, lookup: Lookup },
    AlreadyPurging,
    Database {
        context: String,
        source: Arc<sqlx::Error>,
    },
    Config(String),
    PayloadTooLarge { path: String, size: usize },
    Serialization(String),
    Closed,
}

impl StoreError {
    pub(crate) fn database(context: impl Into<String>) -> impl FnOnce(sqlx::Error) -> Self {
        let context = context.into();
        move |err| StoreError::Database {
            context,
            source: Arc::new(err),
        }
    }

    pub(crate) fn not_visible(path: &str) -> Self {
        StoreError::NotFound {
            path: path.to_string(),
            lookup: Lookup::Visible,
        }
    }

    pub(crate) fn not_present(path: &str) -> Self {
        StoreError::NotFound {
            path: path.to_string(),
            lookup: Lookup::Present,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_already_purging(&self) -> bool {
        matches!(self, StoreError::AlreadyPurging)
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound { path, .. } => write!(f, "Not found: {}", path),
            StoreError::AlreadyPurging => write!(f, "Purge already in progress"),
            StoreError::Database { context, source } => {
                write!(f, "Database error ({}): {}", context, source)
            }
            StoreError::Config(msg) => write!(f, "Configuration error: {}", msg),
            StoreError::PayloadTooLarge { path, size } => {
                write!(f, "Payload too large for {}: {} bytes", path, size)
            }
            StoreError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            StoreError::Closed => write!(f, "Backend is shut down"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Database { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database {
            context: "query".to_string(),
            source: Arc::new(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display_ignores_lookup() {
        let load = StoreError::not_visible("/a/b.json");
        let delete = StoreError::not_present("/a/b.json");
        assert_eq!(format!("{}", load), "Not found: /a/b.json");
        assert_eq!(format!("{}", load), format!("{}", delete));
        assert!(load.is_not_found());
        assert!(delete.is_not_found());
    }

    #[test]
    fn test_not_found_keeps_lookup_kind() {
        match StoreError::not_visible("/x") {
            StoreError::NotFound { lookup, .. } => assert_eq!(lookup, Lookup::Visible),
            other => panic!("unexpected error: {other:?}"),
        }
        match StoreError::not_present("/x") {
            StoreError::NotFound { lookup, .. } => assert_eq!(lookup, Lookup::Present),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_already_purging_display() {
        let err = StoreError::AlreadyPurging;
        assert_eq!(format!("{}", err), "Purge already in progress");
        assert!(err.is_already_purging());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_database_error_carries_context_and_source() {
        let err = StoreError::database("load /a")(sqlx::Error::RowNotFound);
        let msg = format!("{}", err);
        assert!(msg.starts_with("Database error (load /a): "));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_config_error_display() {
        let err = StoreError::Config("DATABASE_URL not defined in env".to_string());
        assert_eq!(
            format!("{}", err),
            "Configuration error: DATABASE_URL not defined in env"
        );
    }

    #[test]
    fn test_payload_too_large_display() {
        let err = StoreError::PayloadTooLarge {
            path: "/big".to_string(),
            size: 3_000_000_000,
        };
        assert_eq!(
            format!("{}", err),
            "Payload too large for /big: 3000000000 bytes"
        );
    }

    #[test]
    fn test_error_is_debug() {
        let err = StoreError::Closed;
        let debug_str = format!("{:?}", err);
        assert!(debug_str.contains("Closed"));
    }
}
