//! Prometheus metrics for the push dispatcher.
//!
//! - Intake metrics (receipts accepted or dropped at the queue)
//! - Pipeline metrics (runs by outcome, sends by platform, failures by kind)
//! - Remediation metrics (pruned registrations, aborted batches)

mod helpers;

pub use helpers::{encode_metrics, IntakeMetrics, PushMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "push";

lazy_static! {
    // ============================================================================
    // Intake Metrics
    // ============================================================================

    /// Receipts offered to the intake queue, by result
    pub static ref RECEIPTS_SUBMITTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_receipts_submitted_total", METRIC_PREFIX),
        "Receipts offered to the intake queue",
        &["result"]
    ).unwrap();

    /// Receipts waiting in the intake queue
    pub static ref QUEUE_DEPTH: IntGauge = register_int_gauge!(
        format!("{}_queue_depth", METRIC_PREFIX),
        "Receipts waiting in the intake queue"
    ).unwrap();

    // ============================================================================
    // Pipeline Metrics
    // ============================================================================

    /// Pipeline runs by outcome
    pub static ref RUNS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_runs_total", METRIC_PREFIX),
        "Completed pipeline runs by outcome",
        &["outcome"]
    ).unwrap();

    /// Pipeline runs currently executing
    pub static ref RUNS_IN_FLIGHT: IntGauge = register_int_gauge!(
        format!("{}_runs_in_flight", METRIC_PREFIX),
        "Pipeline runs currently executing"
    ).unwrap();

    /// Successful sends by device platform
    pub static ref SENDS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_sends_total", METRIC_PREFIX),
        "Sends accepted by the push gateway",
        &["platform"]
    ).unwrap();

    /// Failed sends by gateway error kind
    pub static ref SEND_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_send_failures_total", METRIC_PREFIX),
        "Failed sends by gateway error kind",
        &["kind"]
    ).unwrap();

    /// Gateway send latency
    pub static ref SEND_LATENCY: Histogram = register_histogram!(
        format!("{}_send_latency_seconds", METRIC_PREFIX),
        "Push gateway send latency in seconds",
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    ).unwrap();

    /// Devices skipped because they already received the event or have no token
    pub static ref DEVICES_SKIPPED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_devices_skipped_total", METRIC_PREFIX),
        "Devices skipped during a pipeline run"
    ).unwrap();

    // ============================================================================
    // Remediation Metrics
    // ============================================================================

    /// Registrations deleted after the gateway reported them unregistered
    pub static ref DEVICES_PRUNED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_devices_pruned_total", METRIC_PREFIX),
        "Device registrations deleted as no longer valid"
    ).unwrap();

    /// Failed attempts to delete an invalid registration
    pub static ref PRUNE_FAILURES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_prune_failures_total", METRIC_PREFIX),
        "Failed deletions of invalid device registrations"
    ).unwrap();
}
