//! Timeline, highlight and statistics aggregation plus narrative prose.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use vchat_models::timestamp::format_clock;
use vchat_models::{CategorizedEvent, Event, NarrativeSource, Statistics, Summary, TimelineEntry};
use vchat_vlm_client::{ModelParams, VisionModel, VlmError, VlmRequest};

use crate::error::{AnalysisError, AnalysisResult};
use crate::prompts::narrative_prompt;

/// Narrative used when the model cannot produce one.
pub const FALLBACK_NARRATIVE: &str = "A narrative summary is unavailable because the vision \
model could not be reached. The timeline, highlights and statistics were computed from the \
detected events.";

/// Narrative for a video with no detected events.
pub const EMPTY_NARRATIVE: &str = "No significant events were detected in this video.";

#[derive(Debug, Clone)]
pub struct SummarizerConfig {
    /// Number of highlights to select
    pub highlight_count: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self { highlight_count: 5 }
    }
}

impl SummarizerConfig {
    pub fn from_env() -> Self {
        Self {
            highlight_count: std::env::var("HIGHLIGHT_COUNT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
        }
    }
}

/// Deterministic part of a summary; the narrative is left empty.
pub fn build_digest(events: &[Event], duration_secs: f64, highlight_count: usize) -> Summary {
    let mut ordered: Vec<&Event> = events.iter().collect();
    ordered.sort_by(|a, b| {
        a.start_ts()
            .total_cmp(&b.start_ts())
            .then(a.id().cmp(&b.id()))
    });

    let timeline = ordered
        .iter()
        .map(|e| TimelineEntry {
            event_id: e.id(),
            time: format_clock(e.start_ts()),
            event_type: e.event_type(),
            description: e.description().to_string(),
        })
        .collect();

    let mut categorized: BTreeMap<_, Vec<CategorizedEvent>> = BTreeMap::new();
    for e in &ordered {
        categorized
            .entry(e.event_type())
            .or_default()
            .push(CategorizedEvent {
                event_id: e.id(),
                time: format_clock(e.start_ts()),
                subtype: e.subtype(),
                description: e.description().to_string(),
                severity: e.severity(),
                objects: e.objects().to_vec(),
            });
    }

    let mut ranked = ordered.clone();
    ranked.sort_by(|a, b| {
        b.confidence()
            .total_cmp(&a.confidence())
            .then(a.start_ts().total_cmp(&b.start_ts()))
            .then(a.id().cmp(&b.id()))
    });
    let highlights = ranked
        .iter()
        .take(highlight_count)
        .map(|e| e.id())
        .collect();

    let mut counts = BTreeMap::new();
    let mut severity_distribution = BTreeMap::new();
    for event in events {
        *counts.entry(event.event_type()).or_insert(0) += 1;
        *severity_distribution.entry(event.severity()).or_insert(0) += 1;
    }

    let duration_minutes = duration_secs.max(0.0) / 60.0;
    let events_per_minute = if duration_minutes > 0.0 {
        events.len() as f64 / duration_minutes
    } else {
        0.0
    };

    Summary {
        narrative: String::new(),
        narrative_source: NarrativeSource::Empty,
        timeline,
        highlights,
        counts,
        categorized,
        statistics: Statistics {
            total_events: events.len(),
            events_per_minute,
            duration_minutes,
            severity_distribution,
        },
    }
}

/// Builds a [`Summary`] from a job's events.
pub struct Summarizer {
    model: Arc<dyn VisionModel>,
    config: SummarizerConfig,
}

impl Summarizer {
    pub fn new(model: Arc<dyn VisionModel>, config: SummarizerConfig) -> Self {
        Self { model, config }
    }

    /// Aggregate `events` and ask the model for narrative prose.
    ///
    /// A model failure never fails the summary: the narrative becomes
    /// [`FALLBACK_NARRATIVE`]. Only cancellation is returned as an error.
    pub async fn summarize(
        &self,
        events: &[Event],
        duration_secs: f64,
        cancel: &watch::Receiver<bool>,
    ) -> AnalysisResult<Summary> {
        let mut summary = build_digest(events, duration_secs, self.config.highlight_count);

        if events.is_empty() {
            summary.narrative = EMPTY_NARRATIVE.to_string();
            return Ok(summary);
        }

        let mut ordered: Vec<Event> = events.to_vec();
        ordered.sort_by(|a, b| a.start_ts().total_cmp(&b.start_ts()));
        let request = VlmRequest::new(
            narrative_prompt(duration_secs, &ordered),
            ModelParams::narrative(),
        );

        match self.model.query(&request, cancel).await {
            Ok(text) if !text.trim().is_empty() => {
                summary.narrative = text.trim().to_string();
                summary.narrative_source = NarrativeSource::Model;
            }
            Ok(_) => {
                warn!("Model returned an empty narrative, using fallback");
                summary.narrative = FALLBACK_NARRATIVE.to_string();
                summary.narrative_source = NarrativeSource::Fallback;
            }
            Err(VlmError::Cancelled) => return Err(AnalysisError::Vlm(VlmError::Cancelled)),
            Err(e) => {
                warn!("Narrative generation failed, using fallback: {}", e);
                summary.narrative = FALLBACK_NARRATIVE.to_string();
                summary.narrative_source = NarrativeSource::Fallback;
            }
        }

        info!(
            events = events.len(),
            highlights = summary.highlights.len(),
            narrative_source = ?summary.narrative_source,
            "Summary built"
        );

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vchat_models::{EventDraft, EventId, EventType, Severity};
    use vchat_vlm_client::VlmResult;

    struct StubModel {
        reply: fn() -> VlmResult<String>,
        calls: AtomicUsize,
    }

    impl StubModel {
        fn new(reply: fn() -> VlmResult<String>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl VisionModel for StubModel {
        async fn query(
            &self,
            request: &VlmRequest,
            _cancel: &watch::Receiver<bool>,
        ) -> VlmResult<String> {
            assert!(request.images.is_empty());
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.reply)()
        }
    }

    fn event(id: u32, ty: EventType, start: f64, confidence: f64, severity: Severity) -> Event {
        Event::new(EventDraft {
            event_type: ty,
            start_ts: start,
            end_ts: start + 1.0,
            description: format!("event at {}", start),
            confidence,
            severity,
            objects: vec![],
            source_frames: BTreeSet::new(),
        })
        .unwrap()
        .with_id(EventId(id))
    }

    fn sample() -> Vec<Event> {
        vec![
            event(1, EventType::Action, 0.0, 0.6, Severity::Low),
            event(2, EventType::Object, 10.0, 0.9, Severity::High),
            event(3, EventType::Action, 20.0, 0.9, Severity::Medium),
            event(4, EventType::Interaction, 30.0, 0.7, Severity::Medium),
        ]
    }

    #[test]
    fn test_digest_highlights_ties_break_on_start() {
        let digest = build_digest(&sample(), 60.0, 3);

        assert_eq!(digest.highlights, vec![EventId(2), EventId(3), EventId(4)]);
        assert_eq!(digest.count_of(EventType::Action), 2);
        assert_eq!(digest.count_of(EventType::SceneChange), 0);
        assert_eq!(digest.timeline[1].time, "00:10");
        assert_eq!(digest.statistics.total_events, 4);
        assert_eq!(digest.statistics.events_per_minute, 4.0);
        assert_eq!(digest.statistics.severity_distribution[&Severity::Medium], 2);
    }

    #[test]
    fn test_digest_groups_events_by_type() {
        let mut events = sample();
        events.push(
            Event::new(EventDraft {
                objects: vec!["Ball".into()],
                ..EventDraft::at_frame(EventType::Object, 1, 5.0, "A ball rolls into view")
            })
            .unwrap()
            .with_id(EventId(5)),
        );

        let digest = build_digest(&events, 60.0, 3);

        assert_eq!(digest.categorized.len(), 3);
        assert!(!digest.categorized.contains_key(&EventType::SceneChange));

        let objects = &digest.categorized[&EventType::Object];
        let ids: Vec<_> = objects.iter().map(|e| e.event_id).collect();
        assert_eq!(ids, vec![EventId(5), EventId(2)]);
        assert_eq!(objects[0].time, "00:05");
        assert_eq!(objects[0].objects, vec!["ball".to_string()]);
        assert_eq!(objects[1].severity, Severity::High);

        let actions = &digest.categorized[&EventType::Action];
        assert_eq!(actions.len(), digest.count_of(EventType::Action));
    }

    #[tokio::test]
    async fn test_narrative_from_model() {
        let model = StubModel::new(|| Ok("  A person walks, then runs.  ".to_string()));
        let summarizer = Summarizer::new(model.clone(), SummarizerConfig::default());
        let (_tx, cancel) = watch::channel(false);

        let summary = summarizer.summarize(&sample(), 60.0, &cancel).await.unwrap();

        assert_eq!(summary.narrative, "A person walks, then runs.");
        assert_eq!(summary.narrative_source, NarrativeSource::Model);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unavailable_model_degrades_to_fallback() {
        let model = StubModel::new(|| {
            Err(VlmError::Unavailable {
                attempts: 3,
                last: Box::new(VlmError::Timeout(60)),
            })
        });
        let summarizer = Summarizer::new(model, SummarizerConfig::default());
        let (_tx, cancel) = watch::channel(false);

        let summary = summarizer.summarize(&sample(), 60.0, &cancel).await.unwrap();

        assert_eq!(summary.narrative, FALLBACK_NARRATIVE);
        assert_eq!(summary.narrative_source, NarrativeSource::Fallback);
        assert_eq!(summary.timeline.len(), 4);
        assert_eq!(summary.highlights.len(), 4);
    }

    #[tokio::test]
    async fn test_no_events_skips_model() {
        let model = StubModel::new(|| Ok("unused".to_string()));
        let summarizer = Summarizer::new(model.clone(), SummarizerConfig::default());
        let (_tx, cancel) = watch::channel(false);

        let summary = summarizer.summarize(&[], 10.0, &cancel).await.unwrap();

        assert_eq!(summary.narrative, EMPTY_NARRATIVE);
        assert_eq!(summary.narrative_source, NarrativeSource::Empty);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancellation_is_propagated() {
        let model = StubModel::new(|| Err(VlmError::Cancelled));
        let summarizer = Summarizer::new(model, SummarizerConfig::default());
        let (_tx, cancel) = watch::channel(false);

        let err = summarizer.summarize(&sample(), 60.0, &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
