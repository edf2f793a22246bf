//! VLM client metrics.

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Total model queries by outcome.
    pub const REQUESTS_TOTAL: &str = "vlm_requests_total";

    /// Total retry attempts.
    pub const RETRIES_TOTAL: &str = "vlm_retries_total";

    /// End-to-end query latency in seconds, retries included.
    pub const LATENCY_SECONDS: &str = "vlm_request_latency_seconds";
}

/// Record a finished query.
pub fn record_request(outcome: &'static str, latency_secs: f64) {
    counter!(names::REQUESTS_TOTAL, "outcome" => outcome).increment(1);
    histogram!(names::LATENCY_SECONDS).record(latency_secs);
}

/// Record a retry attempt.
pub fn record_retry() {
    counter!(names::RETRIES_TOTAL).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(names::REQUESTS_TOTAL.starts_with("vlm_"));
        assert!(names::RETRIES_TOTAL.contains("retries"));
        assert!(names::LATENCY_SECONDS.ends_with("_seconds"));
    }
}
