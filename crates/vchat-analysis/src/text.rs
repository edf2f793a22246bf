//! Cheap text heuristics: tokenization, similarity and timestamp mentions.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

use vchat_models::timestamp::parse_timestamp;

/// A clock (`1:05`, `00:01:05.5`) or a number with a seconds unit (`3s`, `4.5 sec`).
const TIME_PATTERN: &str =
    r"\d{1,2}:\d{2}(?::\d{2})?(?:\.\d+)?|\d+(?:\.\d+)?\s*(?:seconds?|secs?|s)\b";

static TIME_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?i)\b(?:{})", TIME_PATTERN)).unwrap());

static TIME_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b({t})\s*(?:-|–|to|until|through)\s*({t})",
        t = TIME_PATTERN
    ))
    .unwrap()
});

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "at", "be", "did", "do", "does", "for", "from", "how", "i", "in",
    "is", "it", "of", "on", "or", "the", "there", "this", "to", "was", "what", "when", "where",
    "which", "who", "why", "with", "you",
];

/// Lowercased alphanumeric words.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Tokens minus common function words, for relevance scoring.
pub fn content_words(text: &str) -> BTreeSet<String> {
    tokenize(text)
        .into_iter()
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Jaccard index of two token sets; two empty sets are identical.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let shared = a.intersection(b).count();
    let union = a.len() + b.len() - shared;
    shared as f64 / union as f64
}

/// Description similarity in `[0, 1]`.
///
/// Case-insensitive exact matches score 1; otherwise word-level Jaccard.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.trim().eq_ignore_ascii_case(b.trim()) {
        return 1.0;
    }
    jaccard(&tokenize(a), &tokenize(b))
}

fn parse_time_token(token: &str) -> Option<f64> {
    let token = token.trim();
    if token.contains(':') {
        return parse_timestamp(token).ok();
    }
    token
        .trim_end_matches(|c: char| c.is_ascii_alphabetic())
        .trim()
        .parse()
        .ok()
}

/// Every time position mentioned in `text`, in order of appearance.
pub fn mentioned_timestamps(text: &str) -> Vec<f64> {
    TIME_MENTION
        .find_iter(text)
        .filter_map(|m| parse_time_token(m.as_str()))
        .collect()
}

/// An explicit `start - end` range stated in `text`, if well-formed.
pub fn stated_range(text: &str) -> Option<(f64, f64)> {
    let caps = TIME_RANGE.captures(text)?;
    let start = parse_time_token(caps.get(1)?.as_str())?;
    let end = parse_time_token(caps.get(2)?.as_str())?;
    (start <= end).then_some((start, end))
}
