//! Prometheus export.
//!
//! The library records through the `metrics` facade only. Installing the
//! exporter here makes those series, plus the console's own command timings,
//! scrapeable at `http://<addr>/metrics` for as long as the command runs.

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::{net::SocketAddr, time::Duration};

/// Install the Prometheus exporter and describe every series.
///
/// # Errors
///
/// Returns a message when the listener cannot be bound or a recorder is
/// already installed.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter on {}: {}", addr, e))?;
    describe();
    Ok(())
}

fn describe() {
    describe_counter!(
        "automation_events_enqueued_total",
        "Events accepted by the automation queue"
    );
    describe_counter!(
        "automation_events_processed_total",
        "Events the automation worker applied"
    );
    describe_counter!(
        "automation_events_failed_total",
        "Events dropped after a failed apply"
    );
    describe_gauge!("automation_queue_depth", "Events waiting in the queue");
    describe_counter!("rounds_finalized_total", "Rounds marked finished");
    describe_counter!("matches_generated_total", "Matches scheduled");
    describe_histogram!(
        "admin_command_duration_seconds",
        Unit::Seconds,
        "Wall time of console commands"
    );
}

/// Record how long a console command took.
pub fn command_duration(command: &'static str, success: bool, elapsed: Duration) {
    metrics::histogram!("admin_command_duration_seconds",
        "command" => command,
        "outcome" => if success { "ok" } else { "rejected" }
    )
    .record(elapsed.as_secs_f64());
}
