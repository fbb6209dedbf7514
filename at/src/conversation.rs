//! Conversation - the append-only turn sequence sent to a generator
//!
//! A conversation opens with exactly one system turn, may carry few-shot
//! exchanges, and then alternates user and assistant turns starting with user.
//! Turns are only ever appended.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Who authored a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
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

/// A single turn of the dialogue
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

/// Rejected append
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConversationError {
    #[error("a conversation has exactly one system turn")]
    SystemTurn,

    #[error("expected a {expected} turn after turn {index}, got {got}")]
    OutOfOrder {
        index: usize,
        expected: &'static str,
        got: &'static str,
    },
}

/// Ordered, append-only dialogue context
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    /// Start a conversation with its system turn
    pub fn new(system: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::system(system)],
        }
    }

    /// Append one turn, enforcing user/assistant alternation
    pub fn push(&mut self, turn: Turn) -> Result<(), ConversationError> {
        debug!(role = turn.role.as_str(), len = turn.content.len(), "Conversation::push: called");
        let expected = match self.last_role() {
            Role::System | Role::Assistant => Role::User,
            Role::User => Role::Assistant,
        };

        if turn.role == Role::System {
            return Err(ConversationError::SystemTurn);
        }
        if turn.role != expected {
            return Err(ConversationError::OutOfOrder {
                index: self.turns.len() - 1,
                expected: expected.as_str(),
                got: turn.role.as_str(),
            });
        }

        self.turns.push(turn);
        Ok(())
    }

    /// Append a user turn
    pub fn push_user(&mut self, content: impl Into<String>) -> Result<(), ConversationError> {
        self.push(Turn::user(content))
    }

    /// Append an assistant turn
    pub fn push_assistant(&mut self, content: impl Into<String>) -> Result<(), ConversationError> {
        self.push(Turn::assistant(content))
    }

    /// Append a batch of few-shot turns (must themselves alternate)
    pub fn extend(&mut self, turns: impl IntoIterator<Item = Turn>) -> Result<(), ConversationError> {
        for turn in turns {
            self.push(turn)?;
        }
        Ok(())
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Always false: the system turn is present from construction
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> &Turn {
        // `turns` is never empty
        &self.turns[self.turns.len() - 1]
    }

    fn last_role(&self) -> Role {
        self.last().role
    }

    /// Concatenated text of every turn, used for token estimates
    pub fn text(&self) -> String {
        self.turns
            .iter()
            .map(|t| t.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
