//! Video summary models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{EventId, EventSubtype, EventType, Severity};

/// Where the narrative text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum NarrativeSource {
    /// Generated by the model
    Model,
    /// Model unavailable; fixed notice used instead
    Fallback,
    /// Nothing to narrate (no events)
    Empty,
}

/// One timeline row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TimelineEntry {
    pub event_id: EventId,
    /// `MM:SS` rendering of the start timestamp
    pub time: String,
    pub event_type: EventType,
    pub description: String,
}

/// An event as listed under its type in [`Summary::categorized`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CategorizedEvent {
    pub event_id: EventId,
    pub time: String,
    pub subtype: EventSubtype,
    pub description: String,
    pub severity: Severity,
    pub objects: Vec<String>,
}

/// Aggregate statistics over a job's events.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Statistics {
    pub total_events: usize,
    pub events_per_minute: f64,
    pub duration_minutes: f64,
    pub severity_distribution: BTreeMap<Severity, usize>,
}

/// Derived summary of an analysis job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Summary {
    pub narrative: String,
    pub narrative_source: NarrativeSource,
    /// Events ordered by start timestamp
    pub timeline: Vec<TimelineEntry>,
    /// Highest-confidence events, best first
    pub highlights: Vec<EventId>,
    /// Event count per type; types with no events are absent
    pub counts: BTreeMap<EventType, usize>,
    /// Events grouped by type, each group in timeline order
    pub categorized: BTreeMap<EventType, Vec<CategorizedEvent>>,
    pub statistics: Statistics,
}

impl Summary {
    pub fn count_of(&self, event_type: EventType) -> usize {
        self.counts.get(&event_type).copied().unwrap_or(0)
    }
}
