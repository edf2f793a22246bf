//! Per-frame event extraction from free-form model text.
//!
//! Model output drifts between runs, so several shapes are accepted and
//! tried in order:
//!
//! 1. JSON: an object with an `events` array, a bare array, or a single
//!    object, optionally inside a Markdown code fence
//! 2. Pipe-delimited lines: `TYPE|DESCRIPTION|SEVERITY|OBJECTS`
//! 3. The literal `NONE`, meaning nothing notable (zero events)
//! 4. Natural-language prose, classified by keywords
//!
//! Anything else is a [`ParseError`].

use serde_json::{Map, Value};
use tracing::{debug, warn};

use vchat_models::timestamp::parse_timestamp;
use vchat_models::{Event, EventDraft, EventType, FrameSlot, Severity};

use crate::error::ParseError;
use crate::text::stated_range;

/// Prose shorter than this is too thin to become a scene event.
const MIN_PROSE_CHARS: usize = 50;

/// Longest description taken from prose.
const MAX_PROSE_DESCRIPTION: usize = 120;

const ACTION_WORDS: &[&str] = &[
    "moving", "moves", "motion", "movement", "walking", "walks", "running", "runs", "jumping",
    "action",
];
const INTERACTION_WORDS: &[&str] = &["interaction", "interacting", "together", "between", "talking"];
const OBJECT_WORDS: &[&str] = &["object", "item", "thing", "element", "entity"];

/// Extraction configuration.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Length given to an event seen on a single frame, in seconds
    pub inferred_span: f64,
    /// Confidence assigned to structured events that state none
    pub default_confidence: f64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            inferred_span: 0.0,
            default_confidence: 0.8,
        }
    }
}

/// Turns model text for one frame into validated events.
#[derive(Debug, Clone, Default)]
pub struct EventExtractor {
    config: ExtractorConfig,
}

impl EventExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    /// Parse one frame's model output.
    ///
    /// Events are anchored at the frame timestamp unless the text states a
    /// range. Individual malformed entries are skipped.
    pub fn extract(&self, slot: FrameSlot, raw: &str) -> Result<Vec<Event>, ParseError> {
        let text = raw.trim();
        if text.is_empty() {
            return Err(ParseError::Empty {
                frame_index: slot.index,
            });
        }

        let drafts = if let Some(drafts) = self.parse_json(slot, text) {
            drafts
        } else if let Some(drafts) = self.parse_pipe_lines(slot, text) {
            drafts
        } else if is_none_marker(text) {
            Vec::new()
        } else if let Some(drafts) = self.parse_prose(slot, text) {
            drafts
        } else {
            return Err(ParseError::Unrecognized {
                frame_index: slot.index,
                chars: text.chars().count(),
            });
        };

        Ok(drafts
            .into_iter()
            .filter_map(|draft| match Event::new(draft) {
                Ok(event) => Some(event),
                Err(e) => {
                    debug!(frame_index = slot.index, "Dropping invalid event: {}", e);
                    None
                }
            })
            .collect())
    }

    /// Like [`extract`](Self::extract), but a parse failure yields no
    /// events and a warning instead of an error.
    pub fn extract_lossy(&self, slot: FrameSlot, raw: &str) -> Vec<Event> {
        match self.extract(slot, raw) {
            Ok(events) => events,
            Err(e) => {
                warn!(
                    frame_index = slot.index,
                    timestamp = slot.timestamp,
                    "Failed to parse frame events: {}",
                    e
                );
                Vec::new()
            }
        }
    }

    fn anchored(&self, slot: FrameSlot, event_type: EventType, description: &str) -> EventDraft {
        let mut draft = EventDraft::at_frame(event_type, slot.index, slot.timestamp, description);
        draft.confidence = self.config.default_confidence;
        match stated_range(description) {
            Some((start, end)) => {
                draft.start_ts = start;
                draft.end_ts = end;
            }
            None => draft.end_ts = slot.timestamp + self.config.inferred_span.max(0.0),
        }
        draft
    }

    fn parse_json(&self, slot: FrameSlot, text: &str) -> Option<Vec<EventDraft>> {
        let value = parse_json_payload(text)?;
        let items = match value {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove("events") {
                Some(Value::Array(items)) => items,
                Some(_) => return None,
                None => vec![Value::Object(map)],
            },
            _ => return None,
        };

        let drafts: Vec<EventDraft> = items
            .iter()
            .filter_map(|item| self.draft_from_json(slot, item))
            .collect();

        // A non-empty payload in which nothing was usable is not a real answer
        if drafts.is_empty() && !items.is_empty() {
            return None;
        }
        Some(drafts)
    }

    fn draft_from_json(&self, slot: FrameSlot, item: &Value) -> Option<EventDraft> {
        let obj = item.as_object()?;

        let description = field(obj, &["description", "desc", "summary", "text"])?.as_str()?;
        let event_type = field(obj, &["type", "event_type", "category", "kind"])
            .and_then(Value::as_str)
            .map(EventType::from_label)
            .unwrap_or(EventType::Other);

        let mut draft = self.anchored(slot, event_type, description);

        if let Some(confidence) = field(obj, &["confidence", "score"]).and_then(json_number) {
            draft.confidence = confidence;
        }
        if let Some(severity) = field(obj, &["severity", "importance"])
            .and_then(Value::as_str)
            .and_then(Severity::from_label)
        {
            draft.severity = severity;
        }
        if let Some(objects) = field(obj, &["objects", "objects_involved", "entities"]) {
            draft.objects = match objects {
                Value::Array(list) => list
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
                Value::String(s) => split_objects(s),
                _ => Vec::new(),
            };
        }

        let start = field(obj, &["start", "start_ts", "start_time"]).and_then(json_time);
        let end = field(obj, &["end", "end_ts", "end_time"]).and_then(json_time);
        match (start, end) {
            (Some(start), Some(end)) if start <= end => {
                draft.start_ts = start;
                draft.end_ts = end;
            }
            (Some(start), None) => {
                draft.start_ts = start;
                draft.end_ts = start + self.config.inferred_span.max(0.0);
            }
            _ => {}
        }

        Some(draft)
    }

    fn parse_pipe_lines(&self, slot: FrameSlot, text: &str) -> Option<Vec<EventDraft>> {
        let drafts: Vec<EventDraft> = text
            .lines()
            .filter_map(|line| self.draft_from_pipe_line(slot, line))
            .collect();
        (!drafts.is_empty()).then_some(drafts)
    }

    fn draft_from_pipe_line(&self, slot: FrameSlot, line: &str) -> Option<EventDraft> {
        let line = strip_list_marker(line);
        if !line.contains('|') {
            return None;
        }

        let parts: Vec<&str> = line
            .trim_matches('|')
            .split('|')
            .map(str::trim)
            .collect();
        if parts.len() < 2 {
            return None;
        }

        let label = parts[0];
        let description = parts[1];
        // Header row echoed back from the prompt
        if label.eq_ignore_ascii_case("event_type") || description.is_empty() {
            return None;
        }

        let mut draft = self.anchored(slot, EventType::from_label(label), description);
        if let Some(severity) = parts.get(2).and_then(|s| Severity::from_label(s)) {
            draft.severity = severity;
        }
        if let Some(objects) = parts.get(3) {
            draft.objects = split_objects(objects);
        }
        Some(draft)
    }

    fn parse_prose(&self, slot: FrameSlot, text: &str) -> Option<Vec<EventDraft>> {
        let lower = text.to_lowercase();
        let description = first_sentence(text);
        let mentions = |words: &[&str]| words.iter().any(|w| lower.contains(w));

        let mut kinds = Vec::new();
        if mentions(ACTION_WORDS) {
            kinds.push((EventType::Action, 0.6, Severity::Low));
        }
        if mentions(INTERACTION_WORDS) {
            kinds.push((EventType::Interaction, 0.6, Severity::Medium));
        }
        if mentions(OBJECT_WORDS) {
            kinds.push((EventType::Object, 0.7, Severity::Medium));
        }
        if kinds.is_empty() && text.chars().count() > MIN_PROSE_CHARS {
            kinds.push((EventType::Other, 0.5, Severity::Low));
        }

        let drafts: Vec<EventDraft> = kinds
            .into_iter()
            .map(|(event_type, confidence, severity)| {
                let mut draft = self.anchored(slot, event_type, &description);
                draft.confidence = confidence;
                draft.severity = severity;
                draft
            })
            .collect();

        (!drafts.is_empty()).then_some(drafts)
    }
}

/// Strip an optional code fence and parse the first JSON value found.
fn parse_json_payload(text: &str) -> Option<Value> {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        body = rest.trim_end().strip_suffix("```").unwrap_or(rest).trim();
    }

    if let Ok(value) = serde_json::from_str::<Value>(body) {
        return matches!(value, Value::Object(_) | Value::Array(_)).then_some(value);
    }

    // JSON embedded in prose
    let start = body.find(['{', '['])?;
    let end = body.rfind(['}', ']'])?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&body[start..=end])
        .ok()
        .filter(|v| matches!(v, Value::Object(_) | Value::Array(_)))
}

fn field<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|n| obj.get(*n))
}

fn json_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_time(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_timestamp(s.trim_end_matches(['s', 'S'])).ok(),
        _ => None,
    }
}

fn split_objects(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn strip_list_marker(line: &str) -> &str {
    let line = line.trim();
    let line = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .unwrap_or(line);
    match line.split_once(". ") {
        Some((n, rest)) if !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()) => rest,
        _ => line,
    }
}

fn is_none_marker(text: &str) -> bool {
    text.lines().any(|line| {
        line.trim()
            .trim_matches(|c: char| !c.is_ascii_alphanumeric())
            .eq_ignore_ascii_case("none")
    })
}

fn first_sentence(text: &str) -> String {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    let sentence = match line.find(['.', '!', '?']) {
        Some(end) => &line[..end],
        None => line,
    };
    if sentence.chars().count() <= MAX_PROSE_DESCRIPTION {
        sentence.to_string()
    } else {
        let cut: String = sentence.chars().take(MAX_PROSE_DESCRIPTION).collect();
        format!("{}...", cut.trim_end())
    }
}
