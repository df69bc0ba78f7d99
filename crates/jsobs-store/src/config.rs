use crate::error::{Result, StoreError};
use sqlx::postgres::PgConnectOptions;
use std::env;
use std::str::FromStr;

pub const DEFAULT_DATABASE_URL_VAR: &str = "DATABASE_URL";
pub const DEFAULT_TABLE: &str = "obj_store";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// PostgreSQL backend configuration
#[derive(Debug, Clone)]
pub struct PgConfig {
    /// Environment variable holding the connection URL
    pub database_url_var: String,
    /// Explicit connection URL; takes precedence over `database_url_var`
    pub database_url: Option<String>,
    pub table: String,
    pub purge_on_shutdown: bool,
    pub max_connections: u32,
}

impl Default for PgConfig {
    fn default() -> Self {
        Self {
            database_url_var: DEFAULT_DATABASE_URL_VAR.to_string(),
            database_url: None,
            table: DEFAULT_TABLE.to_string(),
            purge_on_shutdown: true,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl PgConfig {
    /// Parse configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Parse configuration from any key/value source shaped like the
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let database_url_var = lookup("JSOBS_DATABASE_URL_VAR")
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.database_url_var);

        let table = lookup("JSOBS_TABLE")
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.table);

        let purge_on_shutdown = lookup("JSOBS_PURGE_ON_SHUTDOWN")
            .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no"))
            .unwrap_or(defaults.purge_on_shutdown);

        let max_connections = lookup("JSOBS_MAX_CONNECTIONS")
            .and_then(|v| v.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_connections);

        // The URL itself is read at construction, from `database_url_var`
        Self {
            database_url_var,
            database_url: None,
            table,
            purge_on_shutdown,
            max_connections,
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn with_database_url_var(mut self, var: impl Into<String>) -> Self {
        self.database_url_var = var.into();
        self
    }

    pub fn with_purge_on_shutdown(mut self, purge: bool) -> Self {
        self.purge_on_shutdown = purge;
        self
    }

    /// Resolve and parse the connection URL.
    ///
    /// Missing or malformed values are configuration errors.
    pub fn connect_options(&self) -> Result<PgConnectOptions> {
        let (url, source) = match &self.database_url {
            Some(url) => (url.clone(), "configuration".to_string()),
            None => {
                let url = env::var(&self.database_url_var).unwrap_or_default();
                (url, self.database_url_var.clone())
            }
        };
        if url.trim().is_empty() {
            return Err(StoreError::Config(format!("{} not defined in env", source)));
        }
        PgConnectOptions::from_str(&url)
            .map_err(|e| StoreError::Config(format!("invalid database URL in {}: {}", source, e)))
    }
}

/// Check that `table` is safe to interpolate into SQL: a plain identifier,
/// optionally qualified with one schema name.
pub fn validate_table(table: &str) -> Result<()> {
    let parts: Vec<&str> = table.split('.').collect();
    if parts.len() > 2 || !parts.iter().all(|p| is_identifier(p)) {
        return Err(StoreError::Config(format!("invalid table name: {:?}", table)));
    }
    Ok(())
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    s.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
