#![allow(dead_code)]

use std::{collections::HashMap, sync::Mutex, time::Duration};

use async_trait::async_trait;
use exam_assist_client::{
    types::{QuestionItem, RegisteredUser},
    ClientError, StatusCode, UserId,
};
use exam_assist_core::QuestionRepository;

pub fn capital_question() -> QuestionItem {
    QuestionItem {
        id: 1,
        text: "ما عاصمة السعودية".to_string(),
        options: vec!["الرياض".to_string(), "جدة".to_string()],
        correct_option_index: 0,
    }
}

/// In-memory question store with switchable failure modes.
#[derive(Default)]
pub struct FakeStore {
    pub corpus: Vec<QuestionItem>,
    pub exact: HashMap<String, Vec<QuestionItem>>,
    pub fail_corpus: bool,
    pub fail_search: bool,
    pub fail_registration: bool,
    pub search_delay: Option<Duration>,
    pub searches: Mutex<Vec<String>>,
    pub registrations: Mutex<Vec<String>>,
}

impl FakeStore {
    pub fn with_capital() -> Self {
        let question = capital_question();
        let mut exact = HashMap::new();
        exact.insert(question.text.clone(), vec![question.clone()]);
        Self {
            corpus: vec![question],
            exact,
            ..Self::default()
        }
    }

    pub fn searches(&self) -> Vec<String> {
        self.searches.lock().map(|guard| guard.clone()).unwrap_or_default()
    }

    pub fn registrations(&self) -> Vec<String> {
        self.registrations
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl QuestionRepository for FakeStore {
    async fn fetch_all(&self) -> Result<Vec<QuestionItem>, ClientError> {
        if self.fail_corpus {
            return Err(ClientError::Http("connection refused".to_string()));
        }
        Ok(self.corpus.clone())
    }

    async fn search(&self, query: &str) -> Result<Vec<QuestionItem>, ClientError> {
        if let Ok(mut guard) = self.searches.lock() {
            guard.push(query.to_string());
        }
        if let Some(delay) = self.search_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_search {
            return Err(ClientError::Status(StatusCode::SERVICE_UNAVAILABLE));
        }
        Ok(self.exact.get(query).cloned().unwrap_or_default())
    }

    async fn register_user(&self, username: &str) -> Result<RegisteredUser, ClientError> {
        if let Ok(mut guard) = self.registrations.lock() {
            guard.push(username.to_string());
        }
        if self.fail_registration {
            return Err(ClientError::Status(StatusCode::INTERNAL_SERVER_ERROR));
        }
        Ok(RegisteredUser {
            id: UserId::Number(99),
        })
    }
}
