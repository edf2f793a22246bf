//! Chat preamble and turn prompt assembly.

use std::fmt::Write;

use vchat_analysis::{find_event, high_severity_events};
use vchat_analysis::prompts::event_line;
use vchat_models::timestamp::format_clock;
use vchat_models::{ConversationTurn, Event, Role, Summary};

/// Timeline rows included in the preamble.
const PREAMBLE_TIMELINE_LIMIT: usize = 20;

const GUIDELINES: &str = "Guidelines:
- Answer only from the analysis above and the relevant events listed with each question.
- Refer to moments by their timestamps (MM:SS).
- If the analysis does not cover the question, say so instead of guessing.
- Keep answers short and conversational.";

/// System preamble grounding every turn of a conversation about one video.
pub fn chat_preamble(summary: &Summary, events: &[Event], duration_secs: f64) -> String {
    let mut out = String::from(
        "You are an assistant answering questions about a video that has already been analyzed.\n\n",
    );

    let _ = writeln!(out, "Video duration: {}", format_clock(duration_secs));
    let _ = writeln!(out, "\nOverview:\n{}", summary.narrative);

    let stats = &summary.statistics;
    let _ = writeln!(
        out,
        "\nStatistics: {} events, {:.1} per minute",
        stats.total_events, stats.events_per_minute
    );
    for (event_type, count) in &summary.counts {
        let _ = writeln!(out, "- {}: {}", event_type, count);
    }

    if !summary.highlights.is_empty() {
        out.push_str("\nHighlights:\n");
        for event in summary
            .highlights
            .iter()
            .filter_map(|id| find_event(events, *id))
        {
            let _ = writeln!(out, "- {}", event_line(event));
        }
    }

    let severe = high_severity_events(events);
    if !severe.is_empty() {
        out.push_str("\nHigh-severity events:\n");
        for event in severe {
            let _ = writeln!(out, "- {}", event_line(event));
        }
    }

    if !summary.timeline.is_empty() {
        out.push_str("\nTimeline:\n");
        for entry in summary.timeline.iter().take(PREAMBLE_TIMELINE_LIMIT) {
            let _ = writeln!(out, "- {} {}: {}", entry.time, entry.event_type, entry.description);
        }
        let hidden = summary.timeline.len().saturating_sub(PREAMBLE_TIMELINE_LIMIT);
        if hidden > 0 {
            let _ = writeln!(out, "- … {} more events", hidden);
        }
    }

    out.push('\n');
    out.push_str(GUIDELINES);
    out
}

/// Prompt for one turn: retained history, grounding events, then the question.
///
/// `history` must not include the pending user turn.
pub fn chat_prompt<'a>(
    history: impl IntoIterator<Item = &'a ConversationTurn>,
    grounding: &[&Event],
    question: &str,
) -> String {
    let mut out = String::new();

    let mut history = history.into_iter().peekable();
    if history.peek().is_some() {
        out.push_str("Conversation so far:\n");
        for turn in history {
            let speaker = match turn.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
                Role::System => continue,
            };
            let _ = writeln!(out, "{}: {}", speaker, turn.text);
        }
        out.push('\n');
    }

    if grounding.is_empty() {
        out.push_str("No detected events match this question.\n\n");
    } else {
        out.push_str("Relevant events:\n");
        for event in grounding {
            let _ = writeln!(out, "- {}", event_line(event));
        }
        out.push('\n');
    }

    let _ = write!(out, "User question: {}", question);
    out
}
