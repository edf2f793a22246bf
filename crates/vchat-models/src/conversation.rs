//! Conversation turn models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Speaker of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Grounding preamble
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Characters per approximate token.
const CHARS_PER_TOKEN: usize = 4;

/// Approximate token cost of a text: one token per four characters,
/// rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// One turn of a conversation. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Approximate token cost of `text`
    pub token_cost: usize,
}

impl ConversationTurn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            role,
            token_cost: estimate_tokens(&text),
            text,
            timestamp: Utc::now(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    /// Shorten the text so its cost is at most `max_cost`.
    ///
    /// A trailing ellipsis marks the cut. Returns `false` if no change
    /// was needed.
    pub fn truncate_to(&mut self, max_cost: usize) -> bool {
        if self.token_cost <= max_cost {
            return false;
        }

        let max_chars = max_cost * CHARS_PER_TOKEN;
        let mut text: String = self.text.chars().take(max_chars.saturating_sub(1)).collect();
        if max_chars > 0 {
            text.push('…');
        }
        self.token_cost = estimate_tokens(&text);
        self.text = text;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens(&"x".repeat(1200)), 300);
    }

    #[test]
    fn test_truncate_to() {
        let mut turn = ConversationTurn::user("y".repeat(1000));
        assert_eq!(turn.token_cost, 250);

        assert!(turn.truncate_to(100));
        assert_eq!(turn.token_cost, 100);
        assert!(turn.text.ends_with('…'));
        assert_eq!(turn.text.chars().count(), 400);

        assert!(!turn.truncate_to(100));
    }

    #[test]
    fn test_truncate_to_zero() {
        let mut turn = ConversationTurn::assistant("hello there");
        assert!(turn.truncate_to(0));
        assert_eq!(turn.token_cost, 0);
        assert!(turn.text.is_empty());
    }
}
