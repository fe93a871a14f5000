use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A stored exam question as served by `/api/questions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionItem {
    pub id: i64,
    pub text: String,
    #[serde(default)]
    pub options: Vec<String>,
    pub correct_option_index: usize,
}

impl QuestionItem {
    /// The option marked correct, or `None` when the index is out of range.
    pub fn correct_option(&self) -> Option<&str> {
        self.options
            .get(self.correct_option_index)
            .map(String::as_str)
    }
}

/// Identifier handed back by `POST /api/users`.
///
/// The store has issued both numeric and string ids, so both are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Number(i64),
    Text(String),
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserId::Number(value) => write!(f, "{value}"),
            UserId::Text(value) => f.write_str(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegisteredUser {
    pub id: UserId,
}

#[derive(Debug, Serialize)]
pub(crate) struct RegisterUserRequest<'a> {
    pub username: &'a str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub value: T,
    pub stored_at: OffsetDateTime,
}
