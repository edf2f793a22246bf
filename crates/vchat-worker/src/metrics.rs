//! Job and conversation metrics.

use metrics::counter;

pub mod names {
    /// Finished analysis jobs by outcome.
    pub const ANALYSIS_JOBS_TOTAL: &str = "analysis_jobs_total";

    /// Conversation turns evicted to stay within budget.
    pub const CONTEXT_EVICTIONS_TOTAL: &str = "context_evictions_total";
}

pub fn record_job(outcome: &'static str) {
    counter!(names::ANALYSIS_JOBS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_evictions(count: usize) {
    if count > 0 {
        counter!(names::CONTEXT_EVICTIONS_TOTAL).increment(count as u64);
    }
}
