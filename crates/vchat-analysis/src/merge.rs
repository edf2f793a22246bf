//! Merging of per-frame candidate events into a job's event sequence.

use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::debug;

use vchat_models::{Event, EventDraft, EventError, EventId};

use crate::error::{AnalysisError, AnalysisResult};
use crate::metrics::record_extracted_events;
use crate::text::similarity;

/// Merge thresholds.
#[derive(Debug, Clone)]
pub struct MergeConfig {
    /// Largest gap (seconds) between two same-type events that may merge
    pub merge_gap: f64,
    /// Minimum description similarity for a gap merge
    pub similarity_threshold: f64,
    /// Same-type events overlapping longer than this always merge
    pub max_overlap: f64,
}

impl MergeConfig {
    /// Defaults for a given sampling interval.
    pub fn for_interval(interval: f64) -> Self {
        Self {
            merge_gap: interval,
            similarity_threshold: 0.6,
            max_overlap: interval,
        }
    }

    /// Create config from environment variables; gaps default to `interval`.
    pub fn from_env(interval: f64) -> Self {
        let defaults = Self::for_interval(interval);
        let var = |name: &str| std::env::var(name).ok().and_then(|s| s.parse::<f64>().ok());
        Self {
            merge_gap: var("MERGE_GAP_SECS").unwrap_or(defaults.merge_gap),
            similarity_threshold: var("MERGE_SIMILARITY").unwrap_or(defaults.similarity_threshold),
            max_overlap: var("MERGE_MAX_OVERLAP_SECS").unwrap_or(defaults.max_overlap),
        }
    }

    pub fn validate(&self) -> AnalysisResult<()> {
        if !(self.merge_gap >= 0.0 && self.max_overlap >= 0.0) {
            return Err(AnalysisError::InvalidConfig(
                "merge gap and overlap must be non-negative".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(AnalysisError::InvalidConfig(format!(
                "similarity threshold {} is outside [0, 1]",
                self.similarity_threshold
            )));
        }
        Ok(())
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self::for_interval(1.0)
    }
}

/// Order by start, then end, type and description so the result does not
/// depend on the order extractions finished in.
fn chronological(a: &Event, b: &Event) -> Ordering {
    a.start_ts()
        .total_cmp(&b.start_ts())
        .then(a.end_ts().total_cmp(&b.end_ts()))
        .then(a.event_type().cmp(&b.event_type()))
        .then_with(|| a.description().cmp(b.description()))
}

enum MergeKind {
    /// Near-duplicate descriptions close in time
    Similar,
    /// Same-type intervals overlapping beyond the limit
    Overlap,
}

fn merge_kind(earlier: &Event, later: &Event, config: &MergeConfig) -> Option<MergeKind> {
    if earlier.event_type() != later.event_type() {
        return None;
    }
    if earlier.gap_to(later) <= config.merge_gap
        && similarity(earlier.description(), later.description()) >= config.similarity_threshold
    {
        return Some(MergeKind::Similar);
    }
    if earlier.overlap_with(later) > config.max_overlap {
        return Some(MergeKind::Overlap);
    }
    None
}

fn combine(a: &Event, b: &Event, kind: MergeKind) -> Result<Event, EventError> {
    // Keep the stronger observation's wording
    let (primary, secondary) = if b.confidence() > a.confidence() {
        (b, a)
    } else {
        (a, b)
    };
    let secondary = secondary.clone().into_draft();
    let mut draft: EventDraft = primary.clone().into_draft();

    draft.start_ts = draft.start_ts.min(secondary.start_ts);
    draft.end_ts = draft.end_ts.max(secondary.end_ts);
    draft.confidence = draft.confidence.max(secondary.confidence);
    draft.severity = draft.severity.max(secondary.severity);
    draft.source_frames.extend(secondary.source_frames);
    for object in secondary.objects {
        if !draft.objects.contains(&object) {
            draft.objects.push(object);
        }
    }

    if let MergeKind::Overlap = kind {
        let lower = draft.description.to_lowercase();
        if !lower.contains(&secondary.description.to_lowercase()) {
            draft.description = format!("{}; {}", draft.description, secondary.description);
        }
    }

    Event::new(draft)
}

fn merge_pass(events: Vec<Event>, config: &MergeConfig) -> Vec<Event> {
    let mut merged: Vec<Event> = Vec::with_capacity(events.len());

    for candidate in events {
        let target = merged
            .iter()
            .enumerate()
            .rev()
            .find_map(|(pos, existing)| merge_kind(existing, &candidate, config).map(|k| (pos, k)));

        match target {
            Some((pos, kind)) => match combine(&merged[pos], &candidate, kind) {
                Ok(event) => merged[pos] = event,
                Err(e) => {
                    debug!("Keeping events apart, merge rejected: {}", e);
                    merged.push(candidate);
                }
            },
            None => merged.push(candidate),
        }
    }

    merged
}

/// Merge candidate events into an ordered, deduplicated sequence.
///
/// Two same-type events merge when their gap is at most `merge_gap` and
/// their descriptions are similar, or when they overlap by more than
/// `max_overlap`. Merging repeats until stable; the result is sorted by
/// start time and numbered from `E1`.
pub fn merge_events(mut events: Vec<Event>, config: &MergeConfig) -> Vec<Event> {
    let input = events.len();

    loop {
        events.sort_by(chronological);
        let before = events.len();
        events = merge_pass(events, config);
        if events.len() == before {
            break;
        }
    }
    events.sort_by(chronological);

    debug!(candidates = input, merged = events.len(), "Merged events");
    record_extracted_events(events.len());

    events
        .into_iter()
        .enumerate()
        .map(|(i, e)| e.with_id(EventId(i as u32 + 1)))
        .collect()
}

/// Check the invariants of a finished event sequence.
pub fn validate_event_sequence(events: &[Event], max_overlap: f64) -> AnalysisResult<()> {
    let mut ids = HashSet::with_capacity(events.len());

    for (i, event) in events.iter().enumerate() {
        if event.start_ts() > event.end_ts() {
            return Err(AnalysisError::invalid_sequence(format!(
                "{} starts after it ends",
                event.id()
            )));
        }
        if !ids.insert(event.id()) {
            return Err(AnalysisError::invalid_sequence(format!(
                "duplicate id {}",
                event.id()
            )));
        }
        if let Some(prev) = i.checked_sub(1).map(|p| &events[p]) {
            if prev.start_ts() > event.start_ts() {
                return Err(AnalysisError::invalid_sequence(format!(
                    "{} is out of order",
                    event.id()
                )));
            }
        }
        for other in &events[..i] {
            if other.event_type() == event.event_type()
                && other.overlap_with(event) > max_overlap
            {
                return Err(AnalysisError::invalid_sequence(format!(
                    "{} and {} overlap by more than {}s",
                    other.id(),
                    event.id(),
                    max_overlap
                )));
            }
        }
    }

    Ok(())
}
