//! Detected event models.
//!
//! Events are built through [`Event::new`], the single validating
//! constructor; once built they are read-only.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Identifier of an event within one job's result set.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct EventId(pub u32);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

/// Event category.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Action,
    Object,
    Interaction,
    SceneChange,
    Activity,
    #[serde(other)]
    Other,
}

impl EventType {
    pub const ALL: [EventType; 6] = [
        EventType::Action,
        EventType::Object,
        EventType::Interaction,
        EventType::SceneChange,
        EventType::Activity,
        EventType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Action => "action",
            EventType::Object => "object",
            EventType::Interaction => "interaction",
            EventType::SceneChange => "scene_change",
            EventType::Activity => "activity",
            EventType::Other => "other",
        }
    }

    /// Map a loosely formatted label to an event type.
    ///
    /// Case, separators and an `_event` suffix are ignored
    /// (`ACTION_EVENT`, `Scene Change`, `scene-change`). Labels that match
    /// no category keyword map to [`EventType::Other`].
    pub fn from_label(label: &str) -> Self {
        let normalized: String = label
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let normalized = normalized.trim_matches('_');
        let normalized = normalized.strip_suffix("_event").unwrap_or(normalized);

        match normalized {
            "action" | "actions" | "movement" | "motion" => return EventType::Action,
            "object" | "objects" | "item" => return EventType::Object,
            "interaction" | "interactions" => return EventType::Interaction,
            "scene_change" | "scenechange" | "scene" | "transition" => {
                return EventType::SceneChange
            }
            "activity" | "activities" => return EventType::Activity,
            _ => {}
        }

        const KEYWORDS: [(EventType, &[&str]); 5] = [
            (EventType::Interaction, &["interact", "together", "between"]),
            (EventType::SceneChange, &["scene", "camera", "zoom", "transition"]),
            (EventType::Activity, &["activity", "process", "ongoing"]),
            (EventType::Action, &["action", "movement", "motion", "moving"]),
            (EventType::Object, &["object", "item", "entity", "presence"]),
        ];

        KEYWORDS
            .iter()
            .find(|(_, words)| words.iter().any(|w| normalized.contains(w)))
            .map(|(ty, _)| *ty)
            .unwrap_or(EventType::Other)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How notable an event is.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }

    /// Parse a severity label; unknown labels yield `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "low" | "minor" => Some(Severity::Low),
            "medium" | "moderate" | "med" => Some(Severity::Medium),
            "high" | "major" | "critical" => Some(Severity::High),
            _ => None,
        }
    }
}

/// Finer-grained label derived from an event's description.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum EventSubtype {
    Movement,
    ObjectDetected,
    Interaction,
    SceneChange,
    Activity,
    #[default]
    General,
}

impl EventSubtype {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSubtype::Movement => "movement",
            EventSubtype::ObjectDetected => "object_detected",
            EventSubtype::Interaction => "interaction",
            EventSubtype::SceneChange => "scene_change",
            EventSubtype::Activity => "activity",
            EventSubtype::General => "general",
        }
    }

    /// Classify a description by keyword; the first matching group wins.
    pub fn from_description(description: &str) -> Self {
        const KEYWORDS: [(EventSubtype, &[&str]); 5] = [
            (EventSubtype::Movement, &["moving", "motion", "action"]),
            (EventSubtype::ObjectDetected, &["object", "item", "thing"]),
            (EventSubtype::Interaction, &["interaction", "together"]),
            (EventSubtype::SceneChange, &["camera", "scene", "transition"]),
            (EventSubtype::Activity, &["activity", "process"]),
        ];

        let lowered = description.to_lowercase();
        KEYWORDS
            .iter()
            .find(|(_, words)| words.iter().any(|w| lowered.contains(w)))
            .map(|(subtype, _)| *subtype)
            .unwrap_or_default()
    }
}

impl fmt::Display for EventSubtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reasons an event draft is rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EventError {
    #[error("Event description is empty")]
    EmptyDescription,

    #[error("Event timestamps must be finite and non-negative (start={start}, end={end})")]
    InvalidTimestamp { start: f64, end: f64 },

    #[error("Event start {start} is after end {end}")]
    StartAfterEnd { start: f64, end: f64 },

    #[error("Event confidence is not a number")]
    InvalidConfidence,
}

/// Unvalidated event fields. Turned into an [`Event`] by [`Event::new`].
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    pub event_type: EventType,
    pub start_ts: f64,
    pub end_ts: f64,
    pub description: String,
    pub confidence: f64,
    pub severity: Severity,
    pub objects: Vec<String>,
    pub source_frames: BTreeSet<u32>,
}

impl EventDraft {
    /// Draft anchored at a single frame.
    pub fn at_frame(
        event_type: EventType,
        frame_index: u32,
        timestamp: f64,
        description: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            start_ts: timestamp,
            end_ts: timestamp,
            description: description.into(),
            confidence: 0.8,
            severity: Severity::default(),
            objects: Vec::new(),
            source_frames: BTreeSet::from([frame_index]),
        }
    }
}

/// A detected event.
///
/// Serialize-only: the one way in is [`Event::new`].
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct Event {
    id: EventId,
    event_type: EventType,
    subtype: EventSubtype,
    start_ts: f64,
    end_ts: f64,
    description: String,
    confidence: f64,
    severity: Severity,
    objects: Vec<String>,
    source_frames: BTreeSet<u32>,
}

impl Event {
    /// Validate a draft and build an event.
    ///
    /// Confidence is clamped into `[0, 1]`; descriptions are trimmed and
    /// objects are trimmed, lowercased and deduplicated. The subtype is
    /// derived from the trimmed description.
    pub fn new(draft: EventDraft) -> Result<Self, EventError> {
        let description = draft.description.trim().to_string();
        if description.is_empty() {
            return Err(EventError::EmptyDescription);
        }

        let (start, end) = (draft.start_ts, draft.end_ts);
        if !start.is_finite() || !end.is_finite() || start < 0.0 || end < 0.0 {
            return Err(EventError::InvalidTimestamp { start, end });
        }
        if start > end {
            return Err(EventError::StartAfterEnd { start, end });
        }

        if draft.confidence.is_nan() {
            return Err(EventError::InvalidConfidence);
        }

        let mut objects: Vec<String> = Vec::with_capacity(draft.objects.len());
        for object in draft.objects {
            let object = object.trim().to_lowercase();
            if !object.is_empty() && !objects.contains(&object) {
                objects.push(object);
            }
        }

        Ok(Self {
            id: EventId::default(),
            event_type: draft.event_type,
            subtype: EventSubtype::from_description(&description),
            start_ts: start,
            end_ts: end,
            description,
            confidence: draft.confidence.clamp(0.0, 1.0),
            severity: draft.severity,
            objects,
            source_frames: draft.source_frames,
        })
    }

    /// Assign the event's identifier within its result set.
    pub fn with_id(mut self, id: EventId) -> Self {
        self.id = id;
        self
    }

    /// Recover the draft, e.g. to build a merged event.
    pub fn into_draft(self) -> EventDraft {
        EventDraft {
            event_type: self.event_type,
            start_ts: self.start_ts,
            end_ts: self.end_ts,
            description: self.description,
            confidence: self.confidence,
            severity: self.severity,
            objects: self.objects,
            source_frames: self.source_frames,
        }
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn subtype(&self) -> EventSubtype {
        self.subtype
    }

    pub fn start_ts(&self) -> f64 {
        self.start_ts
    }

    pub fn end_ts(&self) -> f64 {
        self.end_ts
    }

    pub fn duration(&self) -> f64 {
        self.end_ts - self.start_ts
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn objects(&self) -> &[String] {
        &self.objects
    }

    pub fn source_frames(&self) -> &BTreeSet<u32> {
        &self.source_frames
    }

    /// Signed gap from the end of `self` to the start of `other`.
    /// Negative when the intervals overlap.
    pub fn gap_to(&self, other: &Event) -> f64 {
        other.start_ts - self.end_ts
    }

    /// Length of the intersection of both intervals (0 when disjoint).
    pub fn overlap_with(&self, other: &Event) -> f64 {
        let start = self.start_ts.max(other.start_ts);
        let end = self.end_ts.min(other.end_ts);
        (end - start).max(0.0)
    }
}
