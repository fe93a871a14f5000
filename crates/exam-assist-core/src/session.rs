use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use exam_assist_client::{
    types::{QuestionItem, RegisteredUser},
    ClientError,
};
use futures::{future::BoxFuture, stream::FuturesUnordered, Future, StreamExt};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::{
    controller::{
        Command, ControllerOptions, ConversationController, Effect, RegisterTicket, SearchOutcome,
        SearchTicket,
    },
    repository::QuestionRepository,
    state::{ChatMessage, Phase, SuggestedQuestion},
};

const MAX_TURN_RECORDS: usize = 200;

enum Completion {
    Corpus(Result<Vec<QuestionItem>, ClientError>),
    Search {
        ticket: SearchTicket,
        started: Instant,
        result: Result<Vec<QuestionItem>, ClientError>,
    },
    Registration(Result<RegisteredUser, ClientError>),
}

/// What a transport shows after each command or completion.
#[derive(Debug, Clone, Serialize)]
pub struct SessionEvent {
    /// Messages appended since the previous event, in order.
    pub messages: Vec<ChatMessage>,
    pub suggestions: Vec<SuggestedQuestion>,
    pub busy: bool,
    pub phase: Phase,
    pub corpus_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnRecord {
    pub query: String,
    pub outcome: SearchOutcome,
    pub latency_ms: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Runs one conversation against a repository on the caller's task.
///
/// Collaborator calls are polled from a `FuturesUnordered` owned by the driver,
/// so completions are applied strictly one at a time and nothing touches the
/// controller from another thread.
pub struct SessionDriver<R> {
    controller: ConversationController,
    repository: Arc<R>,
    request_timeout: Duration,
    pending: FuturesUnordered<BoxFuture<'static, Completion>>,
    turns: Vec<TurnRecord>,
    emitted: usize,
}

impl<R> SessionDriver<R>
where
    R: QuestionRepository + 'static,
{
    /// Creates the controller and starts the corpus bootstrap.
    pub fn new(repository: Arc<R>, options: ControllerOptions, request_timeout: Duration) -> Self {
        let mut driver = Self {
            controller: ConversationController::new(options),
            repository,
            request_timeout,
            pending: FuturesUnordered::new(),
            turns: Vec::new(),
            emitted: 0,
        };
        driver.schedule_corpus();
        driver
    }

    pub fn controller(&self) -> &ConversationController {
        &self.controller
    }

    pub fn turns(&self) -> &[TurnRecord] {
        &self.turns
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn dispatch(&mut self, command: Command) -> SessionEvent {
        debug!(target: "exam_assist_session", ?command, "dispatching command");
        match self.controller.apply(command) {
            Ok(Effect::None) => self.event(None),
            Ok(Effect::Search(ticket)) => {
                self.schedule_search(ticket);
                self.event(None)
            }
            Ok(Effect::Register(ticket)) => {
                self.schedule_registration(ticket);
                self.event(None)
            }
            Err(rejection) => {
                debug!(target: "exam_assist_session", %rejection, "command rejected");
                self.event(Some(rejection.to_string()))
            }
        }
    }

    /// Waits for the next collaborator completion; `None` when nothing is pending.
    pub async fn next_completion(&mut self) -> Option<SessionEvent> {
        let completion = self.pending.next().await?;
        Some(self.complete(completion))
    }

    /// Drains every pending completion.
    pub async fn settle(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next_completion().await {
            events.push(event);
        }
        events
    }

    fn schedule_corpus(&mut self) {
        let repository = self.repository.clone();
        let timeout = self.request_timeout;
        self.pending.push(Box::pin(async move {
            Completion::Corpus(with_timeout(timeout, repository.fetch_all()).await)
        }));
    }

    fn schedule_search(&mut self, ticket: SearchTicket) {
        let repository = self.repository.clone();
        let timeout = self.request_timeout;
        let started = Instant::now();
        self.pending.push(Box::pin(async move {
            let result = with_timeout(timeout, repository.search(&ticket.query)).await;
            Completion::Search {
                ticket,
                started,
                result,
            }
        }));
    }

    fn schedule_registration(&mut self, ticket: RegisterTicket) {
        let repository = self.repository.clone();
        let timeout = self.request_timeout;
        self.pending.push(Box::pin(async move {
            Completion::Registration(
                with_timeout(timeout, repository.register_user(&ticket.username)).await,
            )
        }));
    }

    fn complete(&mut self, completion: Completion) -> SessionEvent {
        match completion {
            Completion::Corpus(Ok(items)) => {
                self.controller.install_corpus(items);
            }
            Completion::Corpus(Err(error)) => {
                warn!(
                    target: "exam_assist_session",
                    error = %error,
                    "corpus bootstrap failed; suggestions unavailable this session"
                );
            }
            Completion::Search {
                ticket,
                started,
                result,
            } => {
                let outcome = self.controller.finish_search(ticket.generation, result);
                self.record_turn(ticket.query, outcome, started.elapsed());
            }
            Completion::Registration(result) => self.controller.finish_registration(result),
        }
        self.event(None)
    }

    fn record_turn(&mut self, query: String, outcome: SearchOutcome, elapsed: Duration) {
        let latency_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        info!(
            target: "exam_assist_session",
            query = %query,
            outcome = ?outcome,
            latency_ms,
            "search resolved"
        );
        self.turns.push(TurnRecord {
            query,
            outcome,
            latency_ms,
            timestamp: OffsetDateTime::now_utc(),
        });
        if self.turns.len() > MAX_TURN_RECORDS {
            let overflow = self.turns.len() - MAX_TURN_RECORDS;
            self.turns.drain(0..overflow);
        }
    }

    fn event(&mut self, rejected: Option<String>) -> SessionEvent {
        let state = self.controller.state();
        let messages = state.messages[self.emitted..].to_vec();
        self.emitted = state.messages.len();
        SessionEvent {
            messages,
            suggestions: state.suggestions.clone(),
            busy: state.busy,
            phase: state.phase,
            corpus_size: state.corpus().len(),
            name_error: state.name_error.clone(),
            user_id: state.user_id.as_ref().map(ToString::to_string),
            rejected,
        }
    }
}

async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, ClientError>
where
    F: Future<Output = Result<T, ClientError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ClientError::Http(format!(
            "request timed out after {}ms",
            limit.as_millis()
        ))),
    }
}
