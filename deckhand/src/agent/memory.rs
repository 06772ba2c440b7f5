//! Conversation memory: completed (query, result) exchanges, oldest first.

use std::collections::VecDeque;

pub const DEFAULT_MEMORY_WINDOW: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub query: String,
    pub result: String,
}

/// Append-only history bounded to the most recent `window` exchanges.
/// A window of `0` keeps everything.
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    exchanges: VecDeque<Exchange>,
    window: usize,
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_WINDOW)
    }
}

impl ConversationMemory {
    pub fn new(window: usize) -> Self {
        Self {
            exchanges: VecDeque::new(),
            window,
        }
    }

    pub fn append(&mut self, query: impl Into<String>, result: impl Into<String>) {
        self.exchanges.push_back(Exchange {
            query: query.into(),
            result: result.into(),
        });
        if self.window > 0 {
            while self.exchanges.len() > self.window {
                self.exchanges.pop_front();
            }
        }
    }

    pub fn exchanges(&self) -> impl Iterator<Item = &Exchange> {
        self.exchanges.iter()
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    /// `Human:` / `<ai_prefix>:` transcript used as prompt history.
    pub fn render(&self, ai_prefix: &str) -> String {
        self.exchanges
            .iter()
            .map(|e| format!("Human: {}\n{}: {}", e.query, ai_prefix, e.result))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn renders_chronologically() {
        let mut memory = ConversationMemory::default();
        memory.append("list projects", "You have one project: default.");
        memory.append("and environments?", "dev and prod.");
        assert_eq!(
            memory.render("AI"),
            "Human: list projects\nAI: You have one project: default.\nHuman: and environments?\nAI: dev and prod."
        );
    }

    #[test]
    fn window_evicts_oldest() {
        let mut memory = ConversationMemory::new(2);
        for i in 0..5 {
            memory.append(format!("q{}", i), format!("r{}", i));
        }
        let queries: Vec<&str> = memory.exchanges().map(|e| e.query.as_str()).collect();
        assert_eq!(queries, vec!["q3", "q4"]);
    }

    #[test]
    fn zero_window_is_unbounded() {
        let mut memory = ConversationMemory::new(0);
        for i in 0..50 {
            memory.append(format!("q{}", i), "r");
        }
        assert_eq!(memory.len(), 50);
        assert!(ConversationMemory::new(0).render("AI").is_empty());
    }
}
