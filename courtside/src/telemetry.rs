//! Metrics recorded by the round controller and the automation pipeline.
//!
//! Only the `metrics` facade is used here; installing an exporter is left to
//! the binary. Without an installed recorder every call is a no-op.

// ============================================================================
// Automation Metrics
// ============================================================================

/// Increment the enqueued events counter.
pub fn automation_events_enqueued(kind: &str) {
    metrics::counter!("automation_events_enqueued_total",
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Increment the processed events counter.
pub fn automation_events_processed(kind: &str) {
    metrics::counter!("automation_events_processed_total",
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Increment the failed events counter.
pub fn automation_events_failed(kind: &str) {
    metrics::counter!("automation_events_failed_total",
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Set the number of events waiting in the queue.
pub fn automation_queue_depth(depth: usize) {
    metrics::gauge!("automation_queue_depth").set(depth as f64);
}

// ============================================================================
// Round Metrics
// ============================================================================

/// Increment the finalized rounds counter.
pub fn rounds_finalized() {
    metrics::counter!("rounds_finalized_total").increment(1);
}

/// Add generated matches to the counter.
pub fn matches_generated(count: usize) {
    metrics::counter!("matches_generated_total").increment(count as u64);
}
