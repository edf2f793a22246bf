//! Event extraction metrics.

use metrics::counter;

pub mod names {
    /// Events surviving the merge pass, across all jobs.
    pub const EXTRACTED_EVENTS_TOTAL: &str = "extracted_events_total";
}

pub fn record_extracted_events(count: usize) {
    counter!(names::EXTRACTED_EVENTS_TOTAL).increment(count as u64);
}
