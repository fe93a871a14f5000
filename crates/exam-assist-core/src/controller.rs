//! The conversation state machine.
//!
//! ```text
//! Closed --open--> AwaitingName --valid name--> Chatting(idle) <--> Chatting(busy)
//!    ^                                                |
//!    +---------------------- close -------------------+
//! ```
//!
//! The controller never performs I/O. Transitions that need the question store
//! hand back a ticket; whoever runs the ticket reports the result through
//! [`ConversationController::finish_search`] or
//! [`ConversationController::finish_registration`]. Each search ticket carries a
//! generation and only the newest outstanding generation is honored, so closing
//! the conversation or superseding a search turns late results into no-ops.

use exam_assist_client::{
    types::{QuestionItem, RegisteredUser},
    ClientError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    ranker::{rank, RankOptions},
    replies,
    state::{ChatMessage, ConversationState, Phase, SuggestedQuestion},
    text::normalize,
};

pub const DEFAULT_MIN_NAME_CHARS: usize = 2;

/// A user action, as delivered by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    Open,
    Close,
    Input { text: String },
    SubmitName { name: String },
    /// Sends `text` if given, otherwise whatever input is staged.
    Send {
        #[serde(default)]
        text: Option<String>,
    },
    SelectSuggestion { text: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerOptions {
    pub rank: RankOptions,
    pub min_name_chars: usize,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            rank: RankOptions::default(),
            min_name_chars: DEFAULT_MIN_NAME_CHARS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("name must have at least {min} characters")]
    TooShort { min: usize },
    #[error("conversation is not waiting for a name")]
    NotAwaitingName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("conversation is closed")]
    Closed,
    #[error("a name must be entered first")]
    AwaitingName,
    #[error("nothing to send")]
    EmptyInput,
    #[error("a search is already in flight")]
    Busy,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error(transparent)]
    Name(#[from] NameError),
    #[error(transparent)]
    Send(#[from] SendError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTicket {
    pub generation: u64,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterTicket {
    pub username: String,
}

/// Work a command asks the caller to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    None,
    Search(SearchTicket),
    Register(RegisterTicket),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchOutcome {
    Exact,
    Suggestions,
    NoAnswer,
    Error,
    /// Arrived after close or after being superseded.
    Discarded,
}

#[derive(Debug, Default)]
pub struct ConversationController {
    state: ConversationState,
    options: ControllerOptions,
    generation: u64,
    outstanding: Option<SearchTicket>,
}

impl ConversationController {
    pub fn new(options: ControllerOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.state.messages
    }

    pub fn suggestions(&self) -> &[SuggestedQuestion] {
        &self.state.suggestions
    }

    pub fn is_busy(&self) -> bool {
        self.state.busy
    }

    pub fn apply(&mut self, command: Command) -> Result<Effect, Rejection> {
        match command {
            Command::Open => {
                self.open();
                Ok(Effect::None)
            }
            Command::Close => {
                self.close();
                Ok(Effect::None)
            }
            Command::Input { text } => {
                self.set_input(text);
                Ok(Effect::None)
            }
            Command::SubmitName { name } => Ok(Effect::Register(self.submit_name(&name)?)),
            Command::Send { text } => {
                let draft = text.map(|text| std::mem::replace(&mut self.state.input, text));
                match self.send() {
                    Ok(ticket) => Ok(Effect::Search(ticket)),
                    Err(error) => {
                        // A refused send must not eat what the user had staged.
                        if let Some(draft) = draft {
                            self.state.input = draft;
                        }
                        Err(error.into())
                    }
                }
            }
            Command::SelectSuggestion { text } => {
                self.select_suggestion(&text)?;
                Ok(Effect::None)
            }
        }
    }

    /// Opens into the name gate the first time, straight into chat once a name is known.
    pub fn open(&mut self) {
        if self.state.is_open() {
            return;
        }
        self.state.phase = if self.state.name.is_some() {
            Phase::Chatting
        } else {
            Phase::AwaitingName
        };
        debug!(target: "exam_assist_controller", phase = ?self.state.phase, "conversation opened");
    }

    /// Keeps history; any outstanding search result will be dropped.
    pub fn close(&mut self) {
        if let Some(ticket) = self.outstanding.take() {
            debug!(
                target: "exam_assist_controller",
                generation = ticket.generation,
                "closing with a search in flight; its result will be dropped"
            );
        }
        self.state.busy = false;
        self.state.phase = Phase::Closed;
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.state.input = text.into();
    }

    pub fn submit_name(&mut self, name: &str) -> Result<RegisterTicket, NameError> {
        if self.state.phase != Phase::AwaitingName {
            return Err(NameError::NotAwaitingName);
        }

        let name = name.trim();
        let min = self.options.min_name_chars;
        if name.chars().count() < min {
            self.state.name_error = Some(replies::name_too_short(min));
            return Err(NameError::TooShort { min });
        }

        self.state.name_error = None;
        self.state.name = Some(name.to_string());
        self.state.phase = Phase::Chatting;
        self.state
            .messages
            .push(ChatMessage::assistant(replies::welcome(name)));

        Ok(RegisterTicket {
            username: name.to_string(),
        })
    }

    /// Echoes the staged input and issues a search for it.
    pub fn send(&mut self) -> Result<SearchTicket, SendError> {
        self.ensure_chatting()?;
        if self.state.busy {
            return Err(SendError::Busy);
        }
        let query = self.state.input.trim().to_string();
        if query.is_empty() {
            return Err(SendError::EmptyInput);
        }

        self.state.messages.push(ChatMessage::user(query.clone()));
        self.state.input.clear();
        self.state.suggestions.clear();
        self.state.busy = true;

        self.generation += 1;
        let ticket = SearchTicket {
            generation: self.generation,
            query,
        };
        self.outstanding = Some(ticket.clone());
        Ok(ticket)
    }

    pub fn finish_search(
        &mut self,
        generation: u64,
        result: Result<Vec<QuestionItem>, ClientError>,
    ) -> SearchOutcome {
        let ticket = match self.outstanding.take() {
            Some(ticket) if ticket.generation == generation && self.state.is_open() => ticket,
            other => {
                self.outstanding = other;
                debug!(target: "exam_assist_controller", generation, "dropping stale search result");
                return SearchOutcome::Discarded;
            }
        };

        let outcome = match result {
            Ok(items) if !items.is_empty() => self.answer_exact(&items[0]),
            Ok(_) => self.answer_fuzzy(&ticket.query),
            Err(error) => {
                warn!(
                    target: "exam_assist_controller",
                    error = %error,
                    query = %ticket.query,
                    "search failed"
                );
                self.state
                    .messages
                    .push(ChatMessage::assistant(replies::SEARCH_FAILED));
                SearchOutcome::Error
            }
        };

        self.state.busy = false;
        outcome
    }

    fn answer_exact(&mut self, item: &QuestionItem) -> SearchOutcome {
        if let Some(answer) = item.correct_option() {
            self.state.messages.push(ChatMessage::assistant(answer));
            SearchOutcome::Exact
        } else {
            warn!(
                target: "exam_assist_controller",
                question_id = item.id,
                index = item.correct_option_index,
                options = item.options.len(),
                "correct option index out of range"
            );
            self.state
                .messages
                .push(ChatMessage::assistant(replies::SEARCH_FAILED));
            SearchOutcome::Error
        }
    }

    fn answer_fuzzy(&mut self, query: &str) -> SearchOutcome {
        let suggestions = rank(query, self.state.corpus(), self.options.rank);
        if suggestions.is_empty() {
            self.state
                .messages
                .push(ChatMessage::assistant(replies::NO_ANSWER));
            return SearchOutcome::NoAnswer;
        }

        self.state
            .messages
            .push(ChatMessage::assistant(replies::CLARIFY));
        self.state.suggestions = suggestions;
        SearchOutcome::Suggestions
    }

    /// Resolves a suggestion locally against the cached corpus.
    ///
    /// This repeats the exact-match idea of the search path on the client side;
    /// the two can disagree if the store's matching rules differ from ours.
    pub fn select_suggestion(&mut self, text: &str) -> Result<(), SendError> {
        self.ensure_chatting()?;
        if let Some(ticket) = self.outstanding.take() {
            debug!(
                target: "exam_assist_controller",
                generation = ticket.generation,
                "suggestion supersedes outstanding search"
            );
        }

        self.state.messages.push(ChatMessage::user(text));
        self.state.input.clear();
        self.state.suggestions.clear();

        let wanted = normalize(text);
        let answer = self
            .state
            .corpus()
            .iter()
            .find(|item| normalize(&item.text) == wanted)
            .and_then(QuestionItem::correct_option)
            .map(str::to_string);

        match answer {
            Some(answer) => self.state.messages.push(ChatMessage::assistant(answer)),
            None => {
                warn!(target: "exam_assist_controller", text, "suggested question not in cached corpus");
                self.state
                    .messages
                    .push(ChatMessage::assistant(replies::LOOKUP_MISS));
            }
        }

        self.state.busy = false;
        Ok(())
    }

    pub fn finish_registration(&mut self, result: Result<RegisteredUser, ClientError>) {
        match result {
            Ok(user) => {
                info!(target: "exam_assist_controller", user_id = %user.id, "user registered");
                self.state.user_id = Some(user.id);
            }
            Err(error) => {
                warn!(target: "exam_assist_controller", error = %error, "user registration failed");
            }
        }
    }

    /// Installs the corpus once; later calls are ignored. Returns whether it was installed.
    pub fn install_corpus(&mut self, items: Vec<QuestionItem>) -> bool {
        if self.state.corpus.is_some() {
            debug!(target: "exam_assist_controller", "corpus already installed");
            return false;
        }
        info!(target: "exam_assist_controller", count = items.len(), "corpus installed");
        self.state.corpus = Some(items);
        true
    }

    fn ensure_chatting(&self) -> Result<(), SendError> {
        match self.state.phase {
            Phase::Closed => Err(SendError::Closed),
            Phase::AwaitingName => Err(SendError::AwaitingName),
            Phase::Chatting => Ok(()),
        }
    }
}
