use async_trait::async_trait;
use exam_assist_client::{
    types::{QuestionItem, RegisteredUser},
    ClientError, QuestionClient,
};

/// The question store as seen by a conversation.
#[async_trait]
pub trait QuestionRepository: Send + Sync {
    /// Whole corpus; called once per session.
    async fn fetch_all(&self) -> Result<Vec<QuestionItem>, ClientError>;
    /// Server-side exact match. Empty means no match.
    async fn search(&self, query: &str) -> Result<Vec<QuestionItem>, ClientError>;
    async fn register_user(&self, username: &str) -> Result<RegisteredUser, ClientError>;
}

#[async_trait]
impl QuestionRepository for QuestionClient {
    async fn fetch_all(&self) -> Result<Vec<QuestionItem>, ClientError> {
        self.questions().await
    }

    async fn search(&self, query: &str) -> Result<Vec<QuestionItem>, ClientError> {
        QuestionClient::search(self, query).await
    }

    async fn register_user(&self, username: &str) -> Result<RegisteredUser, ClientError> {
        QuestionClient::register_user(self, username).await
    }
}
