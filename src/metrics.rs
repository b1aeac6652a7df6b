//! Prometheus metrics for the deposit relayer
//!
//! Exposed on the /metrics endpoint for Prometheus scraping.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, CounterVec, Gauge, GaugeVec,
};

lazy_static! {
    // Feed metrics
    pub static ref DEPOSITS_FETCHED: CounterVec = register_counter_vec!(
        "relayer_deposits_fetched_total",
        "Total number of deposit records fetched from the feed",
        &["chain"]
    ).unwrap();

    pub static ref FETCH_FAILURES: CounterVec = register_counter_vec!(
        "relayer_fetch_failures_total",
        "Total number of failed deposit fetches",
        &["chain"]
    ).unwrap();

    // Translation / routing
    pub static ref MESSAGES_ROUTED: CounterVec = register_counter_vec!(
        "relayer_messages_routed_total",
        "Total number of messages handed to the router",
        &["chain", "kind", "status"]
    ).unwrap();

    pub static ref TRANSLATION_ERRORS: CounterVec = register_counter_vec!(
        "relayer_translation_errors_total",
        "Total number of deposits that failed validation",
        &["chain", "reason"]
    ).unwrap();

    pub static ref DEPOSITS_SKIPPED: CounterVec = register_counter_vec!(
        "relayer_deposits_skipped_total",
        "Total number of deposits skipped (unknown kind or already processed)",
        &["chain", "reason"]
    ).unwrap();

    // Loop health
    pub static ref RETRIES_REMAINING: GaugeVec = register_gauge_vec!(
        "relayer_retries_remaining",
        "Remaining fetch retry budget",
        &["chain"]
    ).unwrap();

    pub static ref LAST_SUCCESSFUL_POLL: GaugeVec = register_gauge_vec!(
        "relayer_last_successful_poll_timestamp",
        "Unix timestamp of last successful poll",
        &["chain"]
    ).unwrap();

    pub static ref UP: Gauge = register_gauge!(
        "relayer_up",
        "Whether the deposit listener is running"
    ).unwrap();
}

pub fn record_deposits_fetched(chain: &str, count: usize) {
    DEPOSITS_FETCHED
        .with_label_values(&[chain])
        .inc_by(count as f64);
}

pub fn record_fetch_failure(chain: &str) {
    FETCH_FAILURES.with_label_values(&[chain]).inc();
}

pub fn record_message_routed(chain: &str, kind: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    MESSAGES_ROUTED
        .with_label_values(&[chain, kind, status])
        .inc();
}

pub fn record_translation_error(chain: &str, reason: &str) {
    TRANSLATION_ERRORS.with_label_values(&[chain, reason]).inc();
}

pub fn record_deposit_skipped(chain: &str, reason: &str) {
    DEPOSITS_SKIPPED.with_label_values(&[chain, reason]).inc();
}

pub fn set_retries_remaining(chain: &str, remaining: u32) {
    RETRIES_REMAINING
        .with_label_values(&[chain])
        .set(remaining as f64);
}

pub fn record_successful_poll(chain: &str) {
    LAST_SUCCESSFUL_POLL
        .with_label_values(&[chain])
        .set(chrono::Utc::now().timestamp() as f64);
}

pub fn set_up(up: bool) {
    UP.set(if up { 1.0 } else { 0.0 });
}

/// Render the default registry in Prometheus text format
pub fn render() -> String {
    use prometheus::{Encoder, TextEncoder};

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
