mod support;

use std::{sync::Arc, time::Duration};

use exam_assist_core::{
    replies,
    state::{ChatMessage, Phase, Sender},
    Command, ControllerOptions, SearchOutcome, SessionDriver,
};
use support::FakeStore;

async fn chatting(store: FakeStore) -> (Arc<FakeStore>, SessionDriver<FakeStore>) {
    let store = Arc::new(store);
    let mut driver = SessionDriver::new(
        store.clone(),
        ControllerOptions::default(),
        Duration::from_secs(5),
    );
    driver.settle().await;
    driver.dispatch(Command::Open);
    driver.dispatch(Command::SubmitName {
        name: "سارة".to_string(),
    });
    driver.settle().await;
    (store, driver)
}

fn ask(text: &str) -> Command {
    Command::Send {
        text: Some(text.to_string()),
    }
}

#[tokio::test]
async fn exact_match_answers_with_correct_option() {
    let (store, mut driver) = chatting(FakeStore::with_capital()).await;

    let echoed = driver.dispatch(ask("ما عاصمة السعودية"));
    assert_eq!(echoed.messages, vec![ChatMessage::user("ما عاصمة السعودية")]);
    assert!(echoed.busy);

    let events = driver.settle().await;
    let answered: Vec<ChatMessage> = events.into_iter().flat_map(|e| e.messages).collect();
    assert_eq!(answered, vec![ChatMessage::assistant("الرياض")]);
    assert!(driver.controller().suggestions().is_empty());
    assert_eq!(store.searches(), vec!["ما عاصمة السعودية".to_string()]);
}

#[tokio::test]
async fn dialectal_query_yields_one_suggestion() {
    let (_store, mut driver) = chatting(FakeStore::with_capital()).await;

    driver.dispatch(ask("وين عاصمه السعوديه"));
    let event = driver.next_completion().await.expect("search completes");

    assert_eq!(event.messages, vec![ChatMessage::assistant(replies::CLARIFY)]);
    assert_eq!(event.suggestions.len(), 1);
    assert_eq!(event.suggestions[0].text, "ما عاصمة السعودية");
    assert!(event.suggestions[0].similarity > 0.4);
    assert!(!event.busy);
}

#[tokio::test]
async fn short_name_is_rejected_without_chat_messages() {
    let store = Arc::new(FakeStore::with_capital());
    let mut driver = SessionDriver::new(store.clone(), ControllerOptions::default(), Duration::from_secs(5));
    driver.dispatch(Command::Open);

    let event = driver.dispatch(Command::SubmitName {
        name: "A".to_string(),
    });

    assert_eq!(event.phase, Phase::AwaitingName);
    assert!(event.name_error.is_some());
    assert!(event.rejected.is_some());
    assert!(event.messages.is_empty());
    assert!(driver.controller().messages().is_empty());
    driver.settle().await;
    assert!(store.registrations().is_empty());
}

#[tokio::test]
async fn clicking_suggestion_echoes_then_answers() {
    let (store, mut driver) = chatting(FakeStore::with_capital()).await;
    driver.dispatch(ask("وين عاصمه السعوديه"));
    driver.settle().await;
    let searches_before = store.searches().len();

    let event = driver.dispatch(Command::SelectSuggestion {
        text: "ما عاصمة السعودية".to_string(),
    });

    assert_eq!(
        event.messages,
        vec![
            ChatMessage::user("ما عاصمة السعودية"),
            ChatMessage::assistant("الرياض"),
        ]
    );
    assert!(event.suggestions.is_empty());
    assert!(!driver.has_pending());
    assert_eq!(store.searches().len(), searches_before);
}

#[tokio::test]
async fn rejected_search_appends_single_error() {
    let (_store, mut driver) = chatting(FakeStore {
        fail_search: true,
        ..FakeStore::with_capital()
    })
    .await;

    driver.dispatch(ask("ما عاصمة السعودية"));
    let events = driver.settle().await;
    let appended: Vec<ChatMessage> = events.into_iter().flat_map(|e| e.messages).collect();

    assert_eq!(appended, vec![ChatMessage::assistant(replies::SEARCH_FAILED)]);
    assert!(!driver.controller().is_busy());
    assert!(driver.controller().suggestions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn slow_search_times_out_as_failure() {
    let store = Arc::new(FakeStore {
        search_delay: Some(Duration::from_secs(60)),
        ..FakeStore::with_capital()
    });
    let mut driver = SessionDriver::new(store, ControllerOptions::default(), Duration::from_secs(2));
    driver.settle().await;
    driver.dispatch(Command::Open);
    driver.dispatch(Command::SubmitName {
        name: "سارة".to_string(),
    });
    driver.settle().await;

    driver.dispatch(ask("ما عاصمة السعودية"));
    driver.settle().await;

    assert_eq!(
        driver.controller().messages().last(),
        Some(&ChatMessage::assistant(replies::SEARCH_FAILED))
    );
    assert!(!driver.controller().is_busy());
    assert_eq!(driver.turns().last().map(|t| t.outcome), Some(SearchOutcome::Error));
}

#[tokio::test]
async fn closing_drops_late_result() {
    let (_store, mut driver) = chatting(FakeStore::with_capital()).await;

    driver.dispatch(ask("ما عاصمة السعودية"));
    let closed = driver.dispatch(Command::Close);
    assert_eq!(closed.phase, Phase::Closed);
    let log_at_close = driver.controller().messages().to_vec();

    let late = driver.settle().await;
    assert!(late.iter().all(|event| event.messages.is_empty()));
    assert_eq!(driver.controller().messages(), log_at_close.as_slice());
    assert_eq!(
        driver.turns().last().map(|t| t.outcome),
        Some(SearchOutcome::Discarded)
    );

    let reopened = driver.dispatch(Command::Open);
    assert_eq!(reopened.phase, Phase::Chatting);
}

#[tokio::test]
async fn send_while_busy_is_refused() {
    let (_store, mut driver) = chatting(FakeStore::with_capital()).await;

    driver.dispatch(ask("ما عاصمة السعودية"));
    let second = driver.dispatch(ask("سؤال آخر"));

    assert!(second.rejected.is_some());
    assert!(second.messages.is_empty());
    driver.settle().await;

    let users: Vec<&ChatMessage> = driver
        .controller()
        .messages()
        .iter()
        .filter(|m| m.sender == Sender::User)
        .collect();
    assert_eq!(users.len(), 1);
}

#[tokio::test]
async fn corpus_failure_keeps_conversation_usable() {
    let (_store, mut driver) = chatting(FakeStore {
        fail_corpus: true,
        ..FakeStore::with_capital()
    })
    .await;
    assert!(driver.controller().state().corpus().is_empty());

    driver.dispatch(ask("وين عاصمه السعوديه"));
    driver.settle().await;
    assert_eq!(
        driver.controller().messages().last(),
        Some(&ChatMessage::assistant(replies::NO_ANSWER))
    );

    driver.dispatch(ask("ما عاصمة السعودية"));
    driver.settle().await;
    assert_eq!(
        driver.controller().messages().last(),
        Some(&ChatMessage::assistant("الرياض"))
    );
}

#[tokio::test]
async fn registration_sets_user_id_and_failure_does_not_block() {
    let (store, driver) = chatting(FakeStore::with_capital()).await;
    assert_eq!(store.registrations(), vec!["سارة".to_string()]);
    assert!(driver.controller().state().user_id.is_some());

    let (_store, mut driver) = chatting(FakeStore {
        fail_registration: true,
        ..FakeStore::with_capital()
    })
    .await;
    assert!(driver.controller().state().user_id.is_none());
    driver.dispatch(ask("ما عاصمة السعودية"));
    driver.settle().await;
    assert_eq!(
        driver.controller().messages().last(),
        Some(&ChatMessage::assistant("الرياض"))
    );
}

#[tokio::test]
async fn welcome_message_names_the_user() {
    let (_store, driver) = chatting(FakeStore::with_capital()).await;
    let first = &driver.controller().messages()[0];
    assert_eq!(first.sender, Sender::Assistant);
    assert_eq!(first.text, replies::welcome("سارة"));
}

#[tokio::test]
async fn turns_are_recorded_per_search() {
    let (_store, mut driver) = chatting(FakeStore::with_capital()).await;
    driver.dispatch(ask("ما عاصمة السعودية"));
    driver.settle().await;
    driver.dispatch(ask("وين عاصمه السعوديه"));
    driver.settle().await;

    let outcomes: Vec<SearchOutcome> = driver.turns().iter().map(|t| t.outcome).collect();
    assert_eq!(outcomes, vec![SearchOutcome::Exact, SearchOutcome::Suggestions]);
}
