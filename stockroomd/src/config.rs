//! Daemon configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::error::{DaemonError, DaemonResult};
use std::env;
use stockroom_domain::Reservation;

/// Default hold TTL in seconds, shared with the domain's definition.
const DEFAULT_TTL_SECS: u64 = Reservation::DEFAULT_TTL_SECS as u64;

// =============================================================================
// Configuration
// =============================================================================

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Reservation lifecycle configuration
    pub reservation: ReservationConfig,

    /// Event fan-out configuration
    pub events: EventConfig,

    /// PostgreSQL connection string (postgres feature; memory store if unset)
    pub database_url: Option<String>,

    /// Environment (test, development, production)
    pub environment: Environment,
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
}

/// Reservation lifecycle configuration.
#[derive(Debug, Clone)]
pub struct ReservationConfig {
    /// Hold TTL in seconds (default: 300 = 5 minutes)
    pub ttl_secs: u64,
    /// Expiry sweep period in seconds (default: 60)
    pub sweep_interval_secs: u64,
    /// Counter reconcile period in seconds (default: 900, 0 = disabled)
    pub reconcile_interval_secs: u64,
}

/// Event fan-out configuration.
#[derive(Debug, Clone)]
pub struct EventConfig {
    /// Keep-alive period in seconds (default: 30)
    pub keepalive_interval_secs: u64,
    /// Process-local broadcast channel capacity
    pub bus_capacity: usize,
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment
    Test,
    /// Development environment
    Development,
    /// Production environment
    Production,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> DaemonResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let environment = Self::load_environment()?;
        let api = Self::load_api_config()?;
        let reservation = Self::load_reservation_config()?;
        let events = Self::load_event_config()?;
        let database_url = env::var("STOCKROOM_DATABASE_URL").ok();

        Ok(Self {
            api,
            reservation,
            events,
            database_url,
            environment,
        })
    }

    /// Create test configuration.
    pub fn test() -> Self {
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
            },
            reservation: ReservationConfig {
                ttl_secs: DEFAULT_TTL_SECS,
                sweep_interval_secs: 60,
                reconcile_interval_secs: 0,
            },
            events: EventConfig {
                keepalive_interval_secs: 30,
                bus_capacity: 100,
            },
            database_url: None,
            environment: Environment::Test,
        }
    }

    fn load_environment() -> DaemonResult<Environment> {
        let env_str = env::var("STOCKROOM_ENV").unwrap_or_else(|_| "development".to_string());

        match env_str.to_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(DaemonError::Config(format!(
                "Invalid STOCKROOM_ENV: {}. Expected: test, development, production",
                other
            ))),
        }
    }

    fn load_api_config() -> DaemonResult<ApiConfig> {
        let host = env::var("STOCKROOM_API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port_str = env::var("STOCKROOM_API_PORT").unwrap_or_else(|_| "8080".to_string());

        let port = port_str.parse::<u16>().map_err(|_| {
            DaemonError::Config(format!("Invalid STOCKROOM_API_PORT: {}", port_str))
        })?;

        Ok(ApiConfig { host, port })
    }

    fn load_reservation_config() -> DaemonResult<ReservationConfig> {
        Ok(ReservationConfig {
            ttl_secs: Self::load_u64_env("STOCKROOM_RESERVATION_TTL_SECS", DEFAULT_TTL_SECS)?,
            sweep_interval_secs: Self::load_u64_env("STOCKROOM_SWEEP_INTERVAL_SECS", 60)?,
            reconcile_interval_secs: Self::load_u64_env("STOCKROOM_RECONCILE_INTERVAL_SECS", 900)?,
        })
    }

    fn load_event_config() -> DaemonResult<EventConfig> {
        Ok(EventConfig {
            keepalive_interval_secs: Self::load_u64_env("STOCKROOM_KEEPALIVE_INTERVAL_SECS", 30)?,
            bus_capacity: Self::load_u64_env("STOCKROOM_EVENT_BUS_CAPACITY", 1000)? as usize,
        })
    }

    fn load_u64_env(key: &str, default: u64) -> DaemonResult<u64> {
        match env::var(key) {
            Ok(val) => val
                .parse::<u64>()
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(default),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            reservation: ReservationConfig {
                ttl_secs: DEFAULT_TTL_SECS,
                sweep_interval_secs: 60,
                reconcile_interval_secs: 900,
            },
            events: EventConfig {
                keepalive_interval_secs: 30,
                bus_capacity: 1000,
            },
            database_url: None,
            environment: Environment::Development,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
