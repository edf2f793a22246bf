//! Deterministic grounding-event selection for chat turns.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use vchat_analysis::text::{content_words, mentioned_timestamps};
use vchat_models::Event;

/// Weight of lexical overlap when the query mentions a time.
const LEXICAL_WEIGHT: f64 = 0.6;
const TEMPORAL_WEIGHT: f64 = 1.0 - LEXICAL_WEIGHT;

/// Shared prefix length at which two words count as the same stem
/// (`walking` and `walks`).
const MIN_PREFIX_LEN: usize = 4;

fn words_match(query_word: &str, event_word: &str) -> bool {
    if query_word == event_word {
        return true;
    }
    query_word
        .chars()
        .zip(event_word.chars())
        .take_while(|(a, b)| a == b)
        .count()
        >= MIN_PREFIX_LEN
}

/// Query content words, minus anything numeric (times are scored separately).
fn query_terms(query: &str) -> BTreeSet<String> {
    content_words(query)
        .into_iter()
        .filter(|w| !w.chars().any(|c| c.is_ascii_digit()))
        .collect()
}

/// Fraction of query words found in the event's text, type or objects.
fn lexical_score(query_words: &BTreeSet<String>, event: &Event) -> f64 {
    if query_words.is_empty() {
        return 0.0;
    }
    let mut event_words = content_words(event.description());
    event_words.extend(content_words(&event.event_type().as_str().replace('_', " ")));
    for object in event.objects() {
        event_words.extend(content_words(object));
    }

    let hits = query_words
        .iter()
        .filter(|q| event_words.iter().any(|e| words_match(q, e)))
        .count();
    hits as f64 / query_words.len() as f64
}

/// `1 / (1 + d)` where `d` is the distance in seconds from the event's
/// interval to the nearest mentioned time.
fn temporal_score(mentions: &[f64], event: &Event) -> f64 {
    mentions
        .iter()
        .map(|&t| {
            let distance = if t < event.start_ts() {
                event.start_ts() - t
            } else if t > event.end_ts() {
                t - event.end_ts()
            } else {
                0.0
            };
            1.0 / (1.0 + distance)
        })
        .fold(0.0, f64::max)
}

/// Relevance of `event` to `query`, in `[0, 1]`.
pub fn relevance_score(query: &str, event: &Event) -> f64 {
    score(&query_terms(query), &mentioned_timestamps(query), event)
}

fn score(query_words: &BTreeSet<String>, mentions: &[f64], event: &Event) -> f64 {
    let lexical = lexical_score(query_words, event);
    if mentions.is_empty() {
        lexical
    } else {
        LEXICAL_WEIGHT * lexical + TEMPORAL_WEIGHT * temporal_score(mentions, event)
    }
}

/// Up to `k` events scoring above `floor`, best first.
///
/// Ties are broken by `start_ts`, then by id, so the result depends only
/// on the arguments.
pub fn select_relevant_events<'a>(
    query: &str,
    events: &'a [Event],
    k: usize,
    floor: f64,
) -> Vec<&'a Event> {
    let query_words = query_terms(query);
    let mentions = mentioned_timestamps(query);

    let mut scored: Vec<(f64, &Event)> = events
        .iter()
        .map(|e| (score(&query_words, &mentions, e), e))
        .filter(|(s, _)| *s > floor)
        .collect();

    scored.sort_by(|(sa, a), (sb, b)| {
        sb.partial_cmp(sa)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.start_ts().total_cmp(&b.start_ts()))
            .then_with(|| a.id().cmp(&b.id()))
    });
    scored.truncate(k);
    scored.into_iter().map(|(_, e)| e).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use vchat_models::{EventDraft, EventId, EventType, Severity};

    fn event(id: u32, kind: EventType, start: f64, end: f64, desc: &str, objects: &[&str]) -> Event {
        Event::new(EventDraft {
            event_type: kind,
            start_ts: start,
            end_ts: end,
            description: desc.into(),
            confidence: 0.8,
            severity: Severity::Medium,
            objects: objects.iter().map(|o| o.to_string()).collect(),
            source_frames: BTreeSet::new(),
        })
        .unwrap()
        .with_id(EventId(id))
    }

    fn sample() -> Vec<Event> {
        vec![
            event(1, EventType::Action, 0.0, 4.0, "a person walks", &["person"]),
            event(2, EventType::Object, 2.0, 3.0, "a red car parks", &["car"]),
            event(3, EventType::Action, 5.0, 9.0, "a person runs", &["person"]),
            event(4, EventType::SceneChange, 10.0, 10.0, "camera cuts outside", &[]),
        ]
    }

    #[test]
    fn test_lexical_match_with_prefix() {
        let events = sample();
        let picked = select_relevant_events("Who was walking?", &events, 5, 0.1);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].id(), EventId(1));
    }

    #[test]
    fn test_timestamp_mention_biases_nearby_events() {
        let events = sample();
        let picked = select_relevant_events("what does the person do at 0:07?", &events, 2, 0.1);
        assert_eq!(picked[0].id(), EventId(3));
        assert_eq!(picked[1].id(), EventId(1));
    }

    #[test]
    fn test_ties_break_by_start_ts() {
        let events = sample();
        let picked = select_relevant_events("person", &events, 5, 0.1);
        let ids: Vec<EventId> = picked.iter().map(|e| e.id()).collect();
        assert_eq!(ids, [EventId(1), EventId(3)]);
    }

    #[test]
    fn test_below_floor_is_empty() {
        let events = sample();
        assert!(select_relevant_events("tell me about the weather", &events, 5, 0.1).is_empty());
        assert!(select_relevant_events("", &events, 5, 0.1).is_empty());
    }

    #[test]
    fn test_deterministic() {
        let events = sample();
        let query = "is there a car or a person near 3s";
        let first: Vec<EventId> = select_relevant_events(query, &events, 3, 0.1)
            .iter()
            .map(|e| e.id())
            .collect();
        for _ in 0..10 {
            let again: Vec<EventId> = select_relevant_events(query, &events, 3, 0.1)
                .iter()
                .map(|e| e.id())
                .collect();
            assert_eq!(first, again);
        }
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn test_relevance_score_range() {
        let events = sample();
        let s = relevance_score("red car", &events[1]);
        assert!((s - 1.0).abs() < 1e-9);
        assert_eq!(relevance_score("red car", &events[0]), 0.0);
    }
}
