//! PostgreSQL pool settings.

use sqlx::postgres::PgPoolOptions;
use std::{env, time::Duration};

/// Connection pool settings for [`super::Database`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long to wait for a free connection
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl DatabaseConfig {
    /// Read pool settings from the environment.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `DATABASE_URL` | `postgres://postgres@localhost/courtside` |
    /// | `DB_MAX_CONNECTIONS` | 20 |
    /// | `DB_MIN_CONNECTIONS` | 2 |
    /// | `DB_ACQUIRE_TIMEOUT_SECS` | 10 |
    /// | `DB_IDLE_TIMEOUT_SECS` | 600 |
    /// | `DB_MAX_LIFETIME_SECS` | 1800 |
    ///
    /// Values that do not parse keep their default.
    pub fn from_env() -> Self {
        let base = Self::development();
        Self {
            database_url: env::var("DATABASE_URL").unwrap_or(base.database_url),
            max_connections: env_or("DB_MAX_CONNECTIONS", base.max_connections),
            min_connections: env_or("DB_MIN_CONNECTIONS", base.min_connections),
            acquire_timeout: secs_or("DB_ACQUIRE_TIMEOUT_SECS", base.acquire_timeout),
            idle_timeout: secs_or("DB_IDLE_TIMEOUT_SECS", base.idle_timeout),
            max_lifetime: secs_or("DB_MAX_LIFETIME_SECS", base.max_lifetime),
        }
    }

    /// Local database with a small pool
    pub fn development() -> Self {
        Self {
            database_url: "postgres://postgres@localhost/courtside".to_string(),
            max_connections: 20,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }

    pub(crate) fn pool_options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(self.idle_timeout)
            .max_lifetime(self.max_lifetime)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::development()
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn secs_or(key: &str, default: Duration) -> Duration {
    Duration::from_secs(env_or(key, default.as_secs()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_development_defaults() {
        let config = DatabaseConfig::default();
        assert_eq!(config.max_connections, 20);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.acquire_timeout, Duration::from_secs(10));
        assert!(config.database_url.ends_with("/courtside"));
    }

    #[test]
    fn test_unparseable_values_keep_defaults() {
        assert_eq!(env_or("COURTSIDE_TEST_UNSET_VAR", 7u32), 7);
        assert_eq!(
            secs_or("COURTSIDE_TEST_UNSET_VAR", Duration::from_secs(3)),
            Duration::from_secs(3)
        );
    }
}
