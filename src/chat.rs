//! Conversation history consumed by the chat flow.
//!
//! The history is owned by the caller (the web client keeps the message list).
//! The core only reads it: `ChatHistory` is an ordered, append-only log of
//! (speaker, text) turns. Appending produces a new log; existing logs never change.

use serde::{Deserialize, Serialize};

use crate::models::Speaker;

/// Maximum turns rendered into a prompt. Older turns are skipped.
pub const MAX_PROMPT_TURNS: usize = 20;

/// One message in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub speaker: Speaker,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: &str) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.to_string(),
        }
    }

    pub fn model(text: &str) -> Self {
        Self {
            speaker: Speaker::Model,
            text: text.to_string(),
        }
    }
}

/// Ordered, immutable conversation log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatHistory {
    turns: Vec<ChatTurn>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_turns(turns: Vec<ChatTurn>) -> Self {
        Self { turns }
    }

    /// Return a new log with `turn` appended.
    pub fn appended(&self, turn: ChatTurn) -> Self {
        let mut turns = self.turns.clone();
        turns.push(turn);
        Self { turns }
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The most recent `max` turns, oldest first. Blank turns are skipped.
    pub fn recent(&self, max: usize) -> impl Iterator<Item = &ChatTurn> {
        let non_blank: Vec<&ChatTurn> = self
            .turns
            .iter()
            .filter(|t| !t.text.trim().is_empty())
            .collect();
        let skip = non_blank.len().saturating_sub(max);
        non_blank.into_iter().skip(skip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appended_leaves_original_untouched() {
        let history = ChatHistory::new().appended(ChatTurn::user("Hi"));
        let longer = history.appended(ChatTurn::model("Hello"));
        assert_eq!(history.len(), 1);
        assert_eq!(longer.len(), 2);
        assert_eq!(longer.turns()[1].speaker, Speaker::Model);
    }

    #[test]
    fn recent_keeps_order_and_limits() {
        let turns = (0..5).map(|i| ChatTurn::user(&format!("msg {i}"))).collect();
        let history = ChatHistory::from_turns(turns);
        let recent: Vec<&str> = history.recent(2).map(|t| t.text.as_str()).collect();
        assert_eq!(recent, vec!["msg 3", "msg 4"]);
    }

    #[test]
    fn recent_skips_blank_turns() {
        let history = ChatHistory::from_turns(vec![
            ChatTurn::user("first"),
            ChatTurn::model("   "),
            ChatTurn::user("second"),
        ]);
        assert_eq!(history.recent(10).count(), 2);
    }

    #[test]
    fn deserializes_from_plain_array() {
        let history: ChatHistory = serde_json::from_str(
            r#"[{"speaker":"user","text":"What is the app for?"},{"speaker":"model","text":"It explains reports."}]"#,
        )
        .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.turns()[0].speaker, Speaker::User);
    }
}
