//! Automation pipeline configuration.

use serde::{Deserialize, Serialize};

/// Event queue and worker settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationConfig {
    /// Maximum number of queued events before producers wait
    pub queue_capacity: usize,

    /// Process already queued events when the worker is told to stop
    pub drain_on_shutdown: bool,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            drain_on_shutdown: true,
        }
    }
}

impl AutomationConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.queue_capacity == 0 {
            return Err("Queue capacity must be greater than zero".to_string());
        }
        Ok(())
    }

    /// Shutdown mode implied by `drain_on_shutdown`
    pub fn shutdown_mode(&self) -> super::ShutdownMode {
        if self.drain_on_shutdown {
            super::ShutdownMode::Drain
        } else {
            super::ShutdownMode::Abandon
        }
    }
}
