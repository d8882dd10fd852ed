//! Stockroom Daemon
//!
//! Runtime orchestrator for the stock reservation core and its event stream.
//!
//! # Usage
//!
//! ```bash
//! # Start with default configuration (in-memory store)
//! cargo run -p stockroomd
//!
//! # Start with custom environment
//! STOCKROOM_ENV=test STOCKROOM_API_PORT=8081 cargo run -p stockroomd
//! ```
//!
//! # Environment Variables
//!
//! - `STOCKROOM_ENV`: Environment (test, development, production)
//! - `STOCKROOM_API_HOST`: API host (default: 0.0.0.0)
//! - `STOCKROOM_API_PORT`: API port (default: 8080)
//! - `STOCKROOM_RESERVATION_TTL_SECS`: Hold time-to-live (default: 300)
//! - `STOCKROOM_SWEEP_INTERVAL_SECS`: Expiry sweep period (default: 60)
//! - `STOCKROOM_RECONCILE_INTERVAL_SECS`: Counter reconcile period, 0 disables (default: 900)
//! - `STOCKROOM_KEEPALIVE_INTERVAL_SECS`: Subscriber keep-alive period (default: 30)
//! - `STOCKROOM_EVENT_BUS_CAPACITY`: Internal event bus capacity (default: 1000)
//! - `STOCKROOM_DATABASE_URL`: Postgres connection string (requires the `postgres` feature)

use stockroomd::{Config, Daemon};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("stockroomd=info".parse()?))
        .init();

    // Load configuration
    let config = Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        api_host = %config.api.host,
        api_port = config.api.port,
        "Stockroom Daemon"
    );

    #[cfg(feature = "postgres")]
    if let Some(database_url) = config.database_url.clone() {
        use std::sync::Arc;

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(&database_url)
            .await?;
        info!("Connected to Postgres");

        let store = Arc::new(stockroom_store::PgStore::new(pool));
        let daemon = Daemon::with_store(config, store);
        daemon.run().await?;
        return Ok(());
    }

    // Default: in-memory store
    let daemon = Daemon::new_memory(config);
    daemon.run().await?;

    Ok(())
}
