//! Budgeted conversation history.
//!
//! A context holds a fixed system preamble and an append-only run of
//! turns. After every mutation the summed token cost is at most the
//! budget: the oldest turns are evicted first, and a turn too large to fit
//! on its own is truncated rather than dropped. The preamble is never
//! evicted.

use std::collections::VecDeque;
use tracing::{debug, warn};

use vchat_models::{ConversationId, ConversationTurn, JobId, Role};

use crate::metrics::record_evictions;

/// What [`ConversationContext::add_turn`] had to do to stay in budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddTurnReport {
    /// Older turns evicted
    pub evicted: usize,
    /// Whether the new turn was truncated
    pub truncated: bool,
}

#[derive(Debug, Clone)]
pub struct ConversationContext {
    id: ConversationId,
    job_id: JobId,
    preamble: ConversationTurn,
    turns: VecDeque<ConversationTurn>,
    total_cost: usize,
    budget: usize,
}

impl ConversationContext {
    /// Create a context bound to `job_id`.
    ///
    /// A preamble larger than the budget is truncated to fit.
    pub fn new(
        id: ConversationId,
        job_id: JobId,
        preamble: impl Into<String>,
        budget: usize,
    ) -> Self {
        let mut preamble = ConversationTurn::system(preamble);
        if preamble.truncate_to(budget) {
            warn!(
                conversation_id = %id,
                budget,
                "Preamble exceeds context budget, truncated"
            );
        }

        Self {
            id,
            job_id,
            total_cost: preamble.token_cost,
            preamble,
            turns: VecDeque::new(),
            budget,
        }
    }

    /// Append a turn, evicting or truncating until the budget holds.
    pub fn add_turn(&mut self, mut turn: ConversationTurn) -> AddTurnReport {
        let mut report = AddTurnReport::default();

        let available = self.available();
        if turn.truncate_to(available) {
            warn!(
                conversation_id = %self.id,
                role = turn.role.as_str(),
                available,
                "Turn exceeds context budget on its own, truncated"
            );
            report.truncated = true;
        }

        self.total_cost += turn.token_cost;
        self.turns.push_back(turn);

        while self.total_cost > self.budget && self.turns.len() > 1 {
            if let Some(evicted) = self.turns.pop_front() {
                self.total_cost -= evicted.token_cost;
                report.evicted += 1;
            }
        }

        if report.evicted > 0 {
            debug!(
                conversation_id = %self.id,
                evicted = report.evicted,
                total_cost = self.total_cost,
                "Evicted oldest turns"
            );
            record_evictions(report.evicted);
        }

        report
    }

    pub fn id(&self) -> &ConversationId {
        &self.id
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn preamble(&self) -> &ConversationTurn {
        &self.preamble
    }

    /// Retained turns, oldest first, without the preamble.
    pub fn turns(&self) -> impl ExactSizeIterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    pub fn total_cost(&self) -> usize {
        self.total_cost
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// The latest turn if it is a user turn still waiting for an answer.
    pub fn pending_user_turn(&self) -> Option<&ConversationTurn> {
        self.turns.back().filter(|t| t.role == Role::User)
    }

    /// Whether `text`, recorded now, would equal the pending user turn.
    ///
    /// Compares against the text as [`add_turn`](Self::add_turn) would
    /// store it, so a message truncated on the way in still matches.
    pub fn is_pending_user_text(&self, text: &str) -> bool {
        let Some(pending) = self.pending_user_turn() else {
            return false;
        };
        let mut candidate = ConversationTurn::user(text);
        candidate.truncate_to(self.available());
        candidate.text == pending.text
    }

    /// Budget left for turns once the preamble is paid for.
    fn available(&self) -> usize {
        self.budget - self.preamble.token_cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(preamble_chars: usize, budget: usize) -> ConversationContext {
        ConversationContext::new(
            ConversationId::new(),
            JobId::from_string("job"),
            "p".repeat(preamble_chars),
            budget,
        )
    }

    #[test]
    fn test_fifo_eviction_keeps_preamble() {
        let mut ctx = context(2000, 4000);
        assert_eq!(ctx.total_cost(), 500);

        for i in 0..25 {
            let text = format!("{:02}{}", i, "x".repeat(1198));
            ctx.add_turn(ConversationTurn::user(text));
            assert!(ctx.total_cost() <= ctx.budget());
            assert_eq!(ctx.preamble().token_cost, 500);
        }

        let kept: Vec<&str> = ctx.turns().map(|t| &t.text[..2]).collect();
        assert_eq!(kept, ["14", "15", "16", "17", "18", "19", "20", "21", "22", "23", "24"]);
        assert_eq!(ctx.total_cost(), 500 + 11 * 300);
    }

    #[test]
    fn test_oversized_turn_is_truncated_not_dropped() {
        let mut ctx = context(400, 1000);
        ctx.add_turn(ConversationTurn::user("hello"));

        let report = ctx.add_turn(ConversationTurn::assistant("z".repeat(8000)));

        assert!(report.truncated);
        assert_eq!(report.evicted, 1);
        assert_eq!(ctx.turns().len(), 1);
        let last = ctx.turns().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert!(last.text.ends_with('…'));
        assert!(ctx.total_cost() <= 1000);
    }

    #[test]
    fn test_preamble_larger_than_budget() {
        let mut ctx = context(10_000, 100);
        assert_eq!(ctx.total_cost(), 100);

        let report = ctx.add_turn(ConversationTurn::user("still recorded"));
        assert!(report.truncated);
        assert_eq!(ctx.turns().len(), 1);
        assert!(ctx.total_cost() <= 100);
    }

    #[test]
    fn test_pending_user_turn() {
        let mut ctx = context(10, 1000);
        assert!(ctx.pending_user_turn().is_none());

        ctx.add_turn(ConversationTurn::user("what happens?"));
        assert_eq!(ctx.pending_user_turn().unwrap().text, "what happens?");

        ctx.add_turn(ConversationTurn::assistant("a person walks"));
        assert!(ctx.pending_user_turn().is_none());
    }

    #[test]
    fn test_truncated_pending_turn_still_matches_its_text() {
        let mut ctx = context(40, 100);
        let long = "why ".repeat(200);

        let report = ctx.add_turn(ConversationTurn::user(long.clone()));
        assert!(report.truncated);
        assert_ne!(ctx.pending_user_turn().unwrap().text, long);

        assert!(ctx.is_pending_user_text(&long));
        assert!(!ctx.is_pending_user_text("why"));
        assert!(!ctx.is_pending_user_text(&"how ".repeat(200)));

        ctx.add_turn(ConversationTurn::assistant("because"));
        assert!(!ctx.is_pending_user_text(&long));
    }
}
