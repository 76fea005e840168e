//! Persistence: the [`Store`] abstraction, an in-memory store and a PostgreSQL store.
//!
//! The round controller and the automation worker only talk to `dyn Store`.
//! [`Database`] owns the PostgreSQL pool behind [`PgStore`].

use sqlx::postgres::PgPool;
use std::sync::Arc;

pub mod config;
pub mod memory;
pub mod postgres;
pub mod store;
#[cfg(test)]
pub(crate) mod testing;
pub mod timeouts;

pub use config::DatabaseConfig;
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::{ChangeSet, Store, StoreError, StoreResult};

/// A connected PostgreSQL pool
#[derive(Clone)]
pub struct Database {
    pool: Arc<PgPool>,
}

impl Database {
    /// Open the pool and make sure the server answers.
    ///
    /// ```no_run
    /// use courtside::db::{Database, DatabaseConfig};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), courtside::db::StoreError> {
    ///     let db = Database::connect(&DatabaseConfig::from_env()).await?;
    ///     let store = db.store();
    ///     store.migrate().await.map_err(sqlx::Error::from)?;
    ///     Ok(())
    /// }
    /// ```
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let pool = config
            .pool_options()
            .connect(&config.database_url)
            .await?;
        let db = Self {
            pool: Arc::new(pool),
        };
        db.health_check().await?;
        log::debug!(
            "Connected to PostgreSQL (pool {}..{})",
            config.min_connections,
            config.max_connections
        );
        Ok(db)
    }

    /// Store sharing this pool
    pub fn store(&self) -> PgStore {
        PgStore::new(self.pool.clone())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> StoreResult<()> {
        timeouts::with_default_timeout(sqlx::query("SELECT 1").execute(self.pool.as_ref()))
            .await?;
        Ok(())
    }

    /// Wait for checked-out connections and close the pool
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
