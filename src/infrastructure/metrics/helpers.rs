//! Metrics helper structs for convenient metric recording

use std::time::Duration;

use prometheus::{Encoder, TextEncoder};

use super::{
    DEVICES_PRUNED_TOTAL, DEVICES_SKIPPED_TOTAL, PRUNE_FAILURES_TOTAL, RECEIPTS_SUBMITTED_TOTAL,
    RUNS_IN_FLIGHT, RUNS_TOTAL, SENDS_TOTAL, SEND_FAILURES_TOTAL, SEND_LATENCY,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording intake metrics
pub struct IntakeMetrics;

impl IntakeMetrics {
    pub fn record_accepted() {
        RECEIPTS_SUBMITTED_TOTAL.with_label_values(&["accepted"]).inc();
    }

    /// Record a receipt dropped because the queue was full
    pub fn record_queue_full() {
        RECEIPTS_SUBMITTED_TOTAL.with_label_values(&["queue_full"]).inc();
    }

    /// Record a receipt rejected because the dispatcher is not running
    pub fn record_closed() {
        RECEIPTS_SUBMITTED_TOTAL.with_label_values(&["closed"]).inc();
    }
}

/// Helper struct for recording pipeline metrics
pub struct PushMetrics;

impl PushMetrics {
    pub fn run_started() {
        RUNS_IN_FLIGHT.inc();
    }

    pub fn run_finished(outcome: &str) {
        RUNS_IN_FLIGHT.dec();
        RUNS_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn record_send(platform: &str, latency: Duration) {
        SENDS_TOTAL.with_label_values(&[platform]).inc();
        SEND_LATENCY.observe(latency.as_secs_f64());
    }

    pub fn record_send_failure(kind: &str) {
        SEND_FAILURES_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn record_skipped() {
        DEVICES_SKIPPED_TOTAL.inc();
    }

    pub fn record_pruned() {
        DEVICES_PRUNED_TOTAL.inc();
    }

    pub fn record_prune_failed() {
        PRUNE_FAILURES_TOTAL.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_includes_push_metrics() {
        IntakeMetrics::record_accepted();
        PushMetrics::record_send("android", Duration::from_millis(12));

        let output = encode_metrics().unwrap();
        assert!(output.contains("push_receipts_submitted_total"));
        assert!(output.contains("push_sends_total"));
    }
}
