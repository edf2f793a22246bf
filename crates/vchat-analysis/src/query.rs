//! Lookups over a job's finished event sequence.

use vchat_models::{Event, EventId, EventType, Severity};

pub fn events_by_type(events: &[Event], event_type: EventType) -> Vec<&Event> {
    events.iter().filter(|e| e.event_type() == event_type).collect()
}

/// Events whose interval intersects `[start, end]`.
pub fn events_in_range(events: &[Event], start: f64, end: f64) -> Vec<&Event> {
    events
        .iter()
        .filter(|e| e.start_ts() <= end && e.end_ts() >= start)
        .collect()
}

pub fn high_severity_events(events: &[Event]) -> Vec<&Event> {
    events
        .iter()
        .filter(|e| e.severity() == Severity::High)
        .collect()
}

pub fn find_event(events: &[Event], id: EventId) -> Option<&Event> {
    events.iter().find(|e| e.id() == id)
}
