//! Thread keys, turns, and the bounded thread.

use serde::{Deserialize, Serialize};

/// Origin used in thread keys for direct messages.
pub const DIRECT_MESSAGE_ORIGIN: &str = "DM";

/// Identifies one conversation: `"{guild_id}_{user_id}"` or `"DM_{user_id}"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadKey(String);

impl ThreadKey {
    pub fn new(guild_id: Option<u64>, user_id: u64) -> Self {
        match guild_id {
            Some(guild_id) => Self(format!("{guild_id}_{user_id}")),
            None => Self(format!("{DIRECT_MESSAGE_ORIGIN}_{user_id}")),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ThreadKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ThreadKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Message author role, serialized the way chat-completion APIs expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message in a thread or prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Ordered turns capped at `max_turns`; oldest turns are dropped first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thread {
    turns: Vec<Turn>,
    max_turns: usize,
}

impl Thread {
    pub fn new(max_turns: usize) -> Self {
        Self {
            turns: Vec::new(),
            max_turns,
        }
    }

    /// Wrap existing turns, trimming them to the cap.
    pub fn from_turns(turns: Vec<Turn>, max_turns: usize) -> Self {
        let mut thread = Self { turns, max_turns };
        thread.trim();
        thread
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
        self.trim();
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn into_turns(self) -> Vec<Turn> {
        self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    fn trim(&mut self) {
        if self.turns.len() > self.max_turns {
            let excess = self.turns.len() - self.max_turns;
            self.turns.drain(..excess);
        }
    }
}
