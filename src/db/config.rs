//! Connection pool configuration.

use std::env;
use std::str::FromStr;

/// Pool configuration for [`super::Database`]
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub database_url: String,

    /// Maximum number of pooled connections
    pub max_connections: u32,

    /// Minimum number of pooled connections kept warm
    pub min_connections: u32,

    /// Seconds to wait for a connection before giving up
    pub acquire_timeout_secs: u64,

    /// Seconds an idle connection may linger before it is dropped
    pub idle_timeout_secs: u64,
}

impl DatabaseConfig {
    /// Read the configuration from the environment
    ///
    /// `DATABASE_URL` is required. `ARENA_DB_MAX_CONNECTIONS`,
    /// `ARENA_DB_MIN_CONNECTIONS`, `ARENA_DB_ACQUIRE_TIMEOUT` and
    /// `ARENA_DB_IDLE_TIMEOUT` override the pool defaults.
    ///
    /// # Panics
    ///
    /// Panics when `DATABASE_URL` is unset or an override does not parse.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            max_connections: env_or("ARENA_DB_MAX_CONNECTIONS", defaults.max_connections),
            min_connections: env_or("ARENA_DB_MIN_CONNECTIONS", defaults.min_connections),
            acquire_timeout_secs: env_or("ARENA_DB_ACQUIRE_TIMEOUT", defaults.acquire_timeout_secs),
            idle_timeout_secs: env_or("ARENA_DB_IDLE_TIMEOUT", defaults.idle_timeout_secs),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/knockout_arena".to_string(),
            max_connections: 16,
            min_connections: 2,
            acquire_timeout_secs: 10,
            idle_timeout_secs: 600,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{name} must be a valid number")),
        Err(_) => default,
    }
}
