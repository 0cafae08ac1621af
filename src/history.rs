//! Bounded conversation history.

use std::collections::VecDeque;

use crate::models::ConversationTurn;

/// The last `capacity` turns of one conversation, oldest first.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    capacity: usize,
    turns: VecDeque<ConversationTurn>,
}

impl ConversationHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            turns: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a turn, evicting the oldest when full. Capacity 0 keeps nothing.
    pub fn push(&mut self, turn: ConversationTurn) {
        if self.capacity == 0 {
            return;
        }
        while self.turns.len() >= self.capacity {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    /// Record a completed question/answer exchange.
    pub fn record_exchange(&mut self, question: &str, answer: &str) {
        self.push(ConversationTurn::user(question));
        self.push(ConversationTurn::assistant(answer));
    }

    pub fn turns(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    #[test]
    fn test_drops_oldest() {
        let mut h = ConversationHistory::new(3);
        for i in 0..5 {
            h.push(ConversationTurn::user(format!("q{}", i)));
        }
        let texts: Vec<&str> = h.turns().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["q2", "q3", "q4"]);
        assert_eq!(h.len(), 3);
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let mut h = ConversationHistory::new(0);
        h.record_exchange("hello", "hi");
        assert!(h.is_empty());
    }

    #[test]
    fn test_record_exchange_roles() {
        let mut h = ConversationHistory::new(4);
        h.record_exchange("What is a normal temperature?", "About 37 °C.");
        let roles: Vec<Role> = h.turns().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
        h.clear();
        assert!(h.is_empty());
        assert_eq!(h.capacity(), 4);
    }
}
