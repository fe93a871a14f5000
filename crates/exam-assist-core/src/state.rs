use exam_assist_client::{types::QuestionItem, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub text: String,
    pub sender: Sender,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender: Sender::User,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender: Sender::Assistant,
        }
    }
}

/// A corpus question proposed when no exact match exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedQuestion {
    pub text: String,
    pub similarity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Closed,
    AwaitingName,
    Chatting,
}

/// Everything one conversation owns. Only the controller mutates it.
#[derive(Debug, Clone)]
pub struct ConversationState {
    pub phase: Phase,
    pub messages: Vec<ChatMessage>,
    pub input: String,
    pub busy: bool,
    pub suggestions: Vec<SuggestedQuestion>,
    pub user_id: Option<UserId>,
    pub name: Option<String>,
    pub name_error: Option<String>,
    /// Read-only once installed.
    pub corpus: Option<Vec<QuestionItem>>,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self {
            phase: Phase::Closed,
            messages: Vec::new(),
            input: String::new(),
            busy: false,
            suggestions: Vec::new(),
            user_id: None,
            name: None,
            name_error: None,
            corpus: None,
        }
    }
}

impl ConversationState {
    pub fn corpus(&self) -> &[QuestionItem] {
        self.corpus.as_deref().unwrap_or_default()
    }

    pub fn is_open(&self) -> bool {
        self.phase != Phase::Closed
    }
}
