//! Prompt templates for frame analysis and narrative generation.

use std::fmt::Write;

use vchat_models::timestamp::format_clock;
use vchat_models::Event;

/// Instruction sent with every sampled frame.
pub const FRAME_ANALYSIS_PROMPT: &str = r#"Analyze this video frame and identify any significant events, activities or objects. Look for:
1. Actions or movements
2. Objects and their presence
3. Interactions between people or things
4. Scene changes or camera transitions
5. Ongoing activities

Respond with one event per line in the format: EVENT_TYPE|DESCRIPTION|SEVERITY|OBJECTS
EVENT_TYPE is one of ACTION, OBJECT, INTERACTION, SCENE_CHANGE, ACTIVITY.
SEVERITY is low, medium or high. OBJECTS is a comma-separated list.
If nothing notable is visible, respond with: NONE

Examples:
ACTION|a person walks across the room|medium|person
INTERACTION|two people shake hands|high|person,person
SCENE_CHANGE|camera cuts to an outdoor view|low|camera"#;

/// Context line for the frame being analyzed.
pub fn frame_prompt(timestamp: f64) -> String {
    format!(
        "{}\n\nThis frame is at {} in the video.",
        FRAME_ANALYSIS_PROMPT,
        format_clock(timestamp)
    )
}

/// `[MM:SS-MM:SS] type: description (confidence 0.80)`
pub fn event_line(event: &Event) -> String {
    let span = if event.end_ts() > event.start_ts() {
        format!(
            "{}-{}",
            format_clock(event.start_ts()),
            format_clock(event.end_ts())
        )
    } else {
        format_clock(event.start_ts())
    };
    format!(
        "[{}] {}: {} (confidence {:.2})",
        span,
        event.event_type(),
        event.description(),
        event.confidence()
    )
}

/// Prompt asking for a short narrative over the compacted event list.
pub fn narrative_prompt(duration_secs: f64, events: &[Event]) -> String {
    let mut prompt = format!(
        "Write a concise, engaging summary of a video based on the events detected in it.\n\n\
         Video duration: {}\nEvents detected ({}):\n",
        format_clock(duration_secs),
        events.len()
    );
    for event in events {
        let _ = writeln!(prompt, "- {}", event_line(event));
    }
    prompt.push_str(
        "\nDescribe what happens in two or three short paragraphs, in chronological order. \
         Mention only what the events support.",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use vchat_models::{EventDraft, EventType, Severity};

    #[test]
    fn test_event_line() {
        let event = Event::new(EventDraft {
            event_type: EventType::SceneChange,
            start_ts: 65.0,
            end_ts: 70.0,
            description: "camera pans".into(),
            confidence: 0.8,
            severity: Severity::Low,
            objects: vec![],
            source_frames: BTreeSet::new(),
        })
        .unwrap();

        assert_eq!(
            event_line(&event),
            "[01:05-01:10] scene_change: camera pans (confidence 0.80)"
        );
    }

    #[test]
    fn test_frame_prompt_mentions_time() {
        assert!(frame_prompt(12.0).ends_with("at 00:12 in the video."));
    }
}
