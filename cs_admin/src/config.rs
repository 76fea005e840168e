//! Admin console configuration.
//!
//! Environment first, `.env` via dotenvy, then command-line overrides on top.

use courtside::{automation::AutomationConfig, db::DatabaseConfig, round::ScheduleConfig};
use std::net::SocketAddr;

/// Complete console configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// Database configuration
    pub database: DatabaseConfig,
    /// Event queue and worker settings
    pub automation: AutomationConfig,
    /// Court defaults for new rounds
    pub schedule: ScheduleConfig,
    /// Prometheus exporter address, disabled when unset
    pub metrics_bind: Option<SocketAddr>,
    /// Actor recorded on every change
    pub performed_by: String,
}

/// Values given on the command line, which win over the environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub database_url: Option<String>,
    pub queue_capacity: Option<usize>,
    pub metrics_bind: Option<SocketAddr>,
    pub performed_by: Option<String>,
}

impl AdminConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns error if `DATABASE_URL` is missing or `METRICS_BIND` does not parse
    pub fn from_env(overrides: Overrides) -> Result<Self, ConfigError> {
        let database_url = overrides
            .database_url
            .or_else(|| std::env::var("DATABASE_URL").ok())
            .ok_or_else(|| ConfigError::MissingRequired {
                var: "DATABASE_URL".to_string(),
                hint: "Set it in .env, e.g. postgres://postgres@localhost/courtside".to_string(),
            })?;

        let database = DatabaseConfig {
            database_url,
            ..DatabaseConfig::from_env()
        };

        let automation = AutomationConfig {
            queue_capacity: overrides
                .queue_capacity
                .unwrap_or_else(|| parse_env_or("QUEUE_CAPACITY", 1000)),
            drain_on_shutdown: parse_env_or("DRAIN_ON_SHUTDOWN", true),
        };

        let defaults = ScheduleConfig::default();
        let schedule = ScheduleConfig {
            slot_minutes: parse_env_or("SLOT_MINUTES", defaults.slot_minutes),
            court_count: parse_env_or("COURT_COUNT", defaults.court_count),
            first_court: parse_env_or("FIRST_COURT", defaults.first_court),
        };

        let metrics_bind = match overrides.metrics_bind {
            Some(addr) => Some(addr),
            None => match std::env::var("METRICS_BIND") {
                Ok(value) if !value.is_empty() => {
                    Some(value.parse().map_err(|_| ConfigError::Invalid {
                        var: "METRICS_BIND".to_string(),
                        reason: format!("'{value}' is not an IP:PORT address"),
                    })?)
                }
                _ => None,
            },
        };

        let performed_by = overrides
            .performed_by
            .or_else(|| std::env::var("ADMIN_USER").ok())
            .unwrap_or_else(|| "cs_admin".to_string());

        Ok(AdminConfig {
            database,
            automation,
            schedule,
            metrics_bind,
            performed_by,
        })
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.automation
            .validate()
            .map_err(|reason| ConfigError::Invalid {
                var: "QUEUE_CAPACITY".to_string(),
                reason,
            })?;

        if self.schedule.court_count == 0 {
            return Err(ConfigError::Invalid {
                var: "COURT_COUNT".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.schedule.slot_minutes == 0 {
            return Err(ConfigError::Invalid {
                var: "SLOT_MINUTES".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.database.max_connections < self.database.min_connections {
            return Err(ConfigError::Invalid {
                var: "DB_MAX_CONNECTIONS".to_string(),
                reason: format!(
                    "Must be at least the minimum pool size ({})",
                    self.database.min_connections
                ),
            });
        }

        if self.performed_by.trim().is_empty() {
            return Err(ConfigError::Invalid {
                var: "ADMIN_USER".to_string(),
                reason: "Must not be empty".to_string(),
            });
        }

        Ok(())
    }
}

/// Why the console refused to start
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Parse `key`, keeping `default` when unset or malformed
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AdminConfig {
        AdminConfig {
            database: DatabaseConfig::development(),
            automation: AutomationConfig::default(),
            schedule: ScheduleConfig::default(),
            metrics_bind: None,
            performed_by: "desk".to_string(),
        }
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingRequired {
            var: "DATABASE_URL".to_string(),
            hint: "Use a local database".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("DATABASE_URL"));
        assert!(msg.contains("Use a local database"));
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_capacity() {
        let mut config = config();
        config.automation.queue_capacity = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref var, .. } if var == "QUEUE_CAPACITY"));
    }

    #[test]
    fn test_config_validation_zero_courts() {
        let mut config = config();
        config.schedule.court_count = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref var, .. } if var == "COURT_COUNT"));
    }

    #[test]
    fn test_config_validation_zero_slot() {
        let mut config = config();
        config.schedule.slot_minutes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides_win() {
        let config = AdminConfig::from_env(Overrides {
            database_url: Some("postgres://override@localhost/cs".to_string()),
            queue_capacity: Some(7),
            metrics_bind: Some("127.0.0.1:9100".parse().unwrap()),
            performed_by: Some("referee".to_string()),
        })
        .unwrap();
        assert_eq!(config.database.database_url, "postgres://override@localhost/cs");
        assert_eq!(config.automation.queue_capacity, 7);
        assert_eq!(config.metrics_bind, Some("127.0.0.1:9100".parse().unwrap()));
        assert_eq!(config.performed_by, "referee");
    }
}
