//! Console logging.
//!
//! Library records arrive through the `log` facade and are bridged into the
//! tracing subscriber installed here.

use std::time::Duration;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Commands slower than this are reported at warn level
pub const SLOW_COMMAND: Duration = Duration::from_secs(1);

/// Install the subscriber.
///
/// `RUST_LOG` wins when set; otherwise `info,sqlx=warn`.
pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .init();
}

/// One finished console command
#[derive(Debug, Clone)]
pub struct CommandRecord<'a> {
    pub command: &'static str,
    /// Id of the tournament, division, round or match acted on
    pub target: &'a str,
    pub performed_by: &'a str,
    pub elapsed: Duration,
    /// Queries are only timed, not written to the operation log
    pub mutating: bool,
}

impl CommandRecord<'_> {
    /// Emit the timing event and, for mutating commands, the operation event
    pub fn log(&self, success: bool) {
        let elapsed_ms = self.elapsed.as_millis() as u64;
        if self.elapsed > SLOW_COMMAND {
            tracing::warn!(
                command = self.command,
                target_id = self.target,
                elapsed_ms,
                "Slow command"
            );
        } else {
            tracing::debug!(
                command = self.command,
                target_id = self.target,
                elapsed_ms,
                "Command timing"
            );
        }

        if !self.mutating {
            return;
        }
        if success {
            tracing::info!(
                command = self.command,
                target_id = self.target,
                performed_by = self.performed_by,
                "Operation completed"
            );
        } else {
            tracing::warn!(
                command = self.command,
                target_id = self.target,
                performed_by = self.performed_by,
                "Operation rejected"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(elapsed: Duration, mutating: bool) -> CommandRecord<'static> {
        CommandRecord {
            command: "finalize",
            target: "9b1d",
            performed_by: "desk",
            elapsed,
            mutating,
        }
    }

    #[test]
    fn test_log_without_subscriber() {
        record(Duration::from_millis(12), true).log(true);
        record(Duration::from_millis(12), true).log(false);
        record(Duration::from_secs(3), false).log(true);
    }

    #[test]
    fn test_slow_threshold() {
        assert!(record(Duration::from_millis(1500), false).elapsed > SLOW_COMMAND);
    }
}
