//! Metrics collection.
//!
//! # Responsibilities
//! - Define breaker metrics (transitions, rejections, call outcomes)
//! - Record through the `metrics` facade; exposition is the host's concern
//!
//! # Metrics
//! - `breaker_transitions_total` (counter): by breaker, transition (tripped, reset, ready)
//! - `breaker_rejections_total` (counter): calls refused while open, by breaker
//! - `breaker_timeouts_total` (counter): calls abandoned on timeout, by breaker
//! - `breaker_calls_total` (counter): admitted calls by breaker, outcome
//! - `breaker_call_duration_seconds` (histogram): admitted call latency by breaker
//! - `breaker_events_dropped_total` (counter): events lost to full subscriber queues, by policy
//!
//! # Design Decisions
//! - Low-overhead metric updates (no-ops without a recorder)
//! - Labels limited to breaker name and a small fixed set of values

use std::time::Instant;

pub fn record_transition(breaker: &str, transition: &'static str) {
    metrics::counter!(
        "breaker_transitions_total",
        "breaker" => breaker.to_string(),
        "transition" => transition
    )
    .increment(1);
}

pub fn record_rejection(breaker: &str) {
    metrics::counter!("breaker_rejections_total", "breaker" => breaker.to_string()).increment(1);
}

pub fn record_timeout(breaker: &str) {
    metrics::counter!("breaker_timeouts_total", "breaker" => breaker.to_string()).increment(1);
}

/// Record an admitted call's outcome and latency.
pub fn record_call(breaker: &str, outcome: &'static str, started: Instant) {
    metrics::counter!(
        "breaker_calls_total",
        "breaker" => breaker.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!("breaker_call_duration_seconds", "breaker" => breaker.to_string())
        .record(started.elapsed().as_secs_f64());
}

pub fn record_dropped_event(policy: &'static str) {
    metrics::counter!("breaker_events_dropped_total", "policy" => policy).increment(1);
}
