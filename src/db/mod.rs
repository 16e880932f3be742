//! PostgreSQL pool construction for the Postgres-backed stores.
//!
//! `Database` owns the shared connection pool and hands out the store and
//! ledger backends built over it. Embedded and test deployments use the
//! in-memory backends and skip this module entirely.

use crate::ledger::PgLedger;
use crate::store::PgStore;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::Arc;
use std::time::Duration;

pub mod config;

pub use config::DatabaseConfig;

/// Shared connection pool behind the Postgres store and ledger
#[derive(Clone)]
pub struct Database {
    pool: Arc<PgPool>,
}

impl Database {
    /// Connect a pool with the given configuration
    ///
    /// # Errors
    ///
    /// Returns the underlying `sqlx` error when the pool cannot reach
    /// the database.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .connect(&config.database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Tournament store backed by this pool
    pub fn store(&self) -> PgStore {
        PgStore::new(self.pool.clone())
    }

    /// Stake ledger backed by this pool
    pub fn ledger(&self) -> PgLedger {
        PgLedger::new(self.pool.clone())
    }

    /// Verify the pool can reach the database
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(self.pool.as_ref()).await?;
        Ok(())
    }

    /// Close all pooled connections
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
