//! jsobs demo
//!
//! Stores two objects with a short expiry, reads them back, waits for them
//! to expire and shuts down, which purges them.

mod error;

use crate::error::{DemoError, Result};
use chrono::Utc;
use jsobs::{Client, PgBackend, PgConfig, PurgeSweeper, StorageBackend};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Exit code when the backend fails to shut down cleanly
const SHUTDOWN_FAILED: i32 = 99;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Thing {
    name: String,
    age: f64,
}

impl fmt::Display for Thing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{} age {:.2}}}", self.name, self.age)
    }
}

#[derive(Debug, Clone)]
struct DemoConfig {
    create_table: bool,
    expire_after: Duration,
    sweep_every: Option<Duration>,
}

impl DemoConfig {
    fn from_env() -> Self {
        let create_table = std::env::var("JSOBS_CREATE_TABLE")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let expire_after = std::env::var("JSOBS_DEMO_EXPIRE_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(2));

        let sweep_every = std::env::var("JSOBS_SWEEP_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|s| *s > 0)
            .map(Duration::from_secs);

        Self {
            create_table,
            expire_after,
            sweep_every,
        }
    }
}

fn init_logging() -> Result<()> {
    let env_filter = EnvFilter::from_default_env()
        .add_directive("jsobs=info".parse()?)
        .add_directive("jsobs_store=info".parse()?)
        .add_directive("jsobs_demo=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };
    Ok(())
}

async fn run(client: &Client, config: &DemoConfig) -> Result<()> {
    let things = [
        (
            "/demo/t0.json",
            Thing {
                name: "Papa Thing".to_string(),
                age: 42.0,
            },
        ),
        (
            "/demo/t1.json",
            Thing {
                name: "Baby Thing".to_string(),
                age: 1.23,
            },
        ),
    ];

    let expire_after = chrono::Duration::from_std(config.expire_after)
        .map_err(|e| DemoError::Config(e.to_string()))?;
    let expiry = Utc::now() + expire_after;

    for (path, thing) in &things {
        info!("Storing {} at {}", thing, path);
        client.save_expiry(path, thing, expiry).await?;
    }

    info!("Retrieving");
    for (path, thing) in &things {
        let back: Thing = client.load(path).await?;
        if &back != thing {
            return Err(DemoError::Mismatch(path.to_string()));
        }
        info!("{}", back);
    }
    info!("Visible under /demo/: {}", client.count("/demo/").await?);

    info!("Waiting for expiry");
    tokio::time::sleep(config.expire_after).await;
    info!("Visible under /demo/: {}", client.count("/demo/").await?);

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = init_logging() {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    let config = DemoConfig::from_env();
    let client = match Client::connect_pg_with(&PgConfig::from_env()) {
        Ok(client) => client,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    info!("Using {}", client.backend());

    let mut code = 0;
    if config.create_table {
        if let Err(e) = create_table().await {
            error!("Failed to create table: {}", e);
            code = 1;
        }
    }

    let sweeper = config
        .sweep_every
        .map(|every| PurgeSweeper::start(client.backend(), every));

    if code == 0 {
        if let Err(e) = run(&client, &config).await {
            error!("{}", e);
            code = 1;
        }
    }

    if let Some(sweeper) = sweeper {
        sweeper.shutdown().await;
    }

    info!("Shutting down");
    if let Err(e) = client.shutdown().await {
        error!("Shutdown failed: {}", e);
        code = SHUTDOWN_FAILED;
    }
    std::process::exit(code);
}

/// Create the table on its own short-lived backend
async fn create_table() -> Result<()> {
    let backend = PgBackend::new(&PgConfig::from_env().with_purge_on_shutdown(false))?;
    backend.create_table().await?;
    backend.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsobs::MemoryBackend;

    #[test]
    fn test_thing_display() {
        let thing = Thing {
            name: "Baby Thing".to_string(),
            age: 1.23,
        };
        assert_eq!(thing.to_string(), "{Baby Thing age 1.23}");
    }

    #[tokio::test]
    async fn test_run_round_trips_then_expires() {
        let client = Client::new(MemoryBackend::new());
        let config = DemoConfig {
            create_table: false,
            expire_after: Duration::from_millis(50),
            sweep_every: None,
        };
        run(&client, &config).await.unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(client.count("/demo/").await.unwrap(), 0);
        client.shutdown().await.unwrap();
    }
}
