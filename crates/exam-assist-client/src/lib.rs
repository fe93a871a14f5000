pub mod cache;
pub mod types;

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use cache::DiskCache;
use directories::ProjectDirs;
use reqwest::Client;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::types::{QuestionItem, RegisterUserRequest, RegisteredUser};

pub use reqwest::StatusCode;
pub use types::{CacheEntry, UserId};

const QUESTIONS_PATH: &str = "api/questions";
const SEARCH_PATH: &str = "api/questions/search";
const USERS_PATH: &str = "api/users";
pub const SNAPSHOT_FILE: &str = "questions.json";

#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("unexpected status code: {0}")]
    Status(StatusCode),
    #[error("malformed response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    /// Directory for the corpus snapshot; `None` disables it.
    pub cache_dir: Option<PathBuf>,
}

impl ClientConfig {
    /// Platform cache directory for snapshots, if the platform has one.
    pub fn default_cache_dir() -> Option<PathBuf> {
        ProjectDirs::from("com", "ExamAssist", "exam-assist")
            .map(|dirs| dirs.cache_dir().to_path_buf())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            timeout: Duration::from_secs(10),
            cache_dir: Self::default_cache_dir(),
        }
    }
}

/// Client for the question store endpoints.
#[derive(Debug, Clone)]
pub struct QuestionClient {
    http: Client,
    base_url: String,
    snapshot: Option<DiskCache>,
}

impl QuestionClient {
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("ExamAssist/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .gzip(true)
            .build()
            .context("failed to build HTTP client")?;

        if let Some(dir) = &config.cache_dir {
            if let Err(error) = std::fs::create_dir_all(dir) {
                warn!(
                    target: "exam_assist_client",
                    error = %error,
                    cache_dir = %dir.display(),
                    "failed to create cache directory; snapshot writes may fail"
                );
            }
        }

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            snapshot: config.cache_dir.map(DiskCache::new),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn snapshot_cache(&self) -> Option<&DiskCache> {
        self.snapshot.as_ref()
    }

    /// `GET /api/questions`, falling back to the last snapshot when the store is unreachable.
    #[instrument(name = "exam_assist_client.questions", skip(self))]
    pub async fn questions(&self) -> Result<Vec<QuestionItem>, ClientError> {
        match self.refresh_questions().await {
            Ok(items) => Ok(items),
            Err(error) => match self.load_snapshot().await {
                Ok(Some(entry)) => {
                    warn!(
                        target: "exam_assist_client",
                        error = %error,
                        stored_at = %entry.stored_at,
                        count = entry.value.len(),
                        "question store unavailable; serving corpus snapshot"
                    );
                    Ok(entry.value)
                }
                Ok(None) => Err(error),
                Err(snapshot_error) => {
                    warn!(
                        target: "exam_assist_client",
                        error = %snapshot_error,
                        "failed to read corpus snapshot"
                    );
                    Err(error)
                }
            },
        }
    }

    /// Always hits the network and rewrites the snapshot on success.
    #[instrument(name = "exam_assist_client.refresh_questions", skip(self))]
    pub async fn refresh_questions(&self) -> Result<Vec<QuestionItem>, ClientError> {
        let items: Vec<QuestionItem> = self.fetch_json(QUESTIONS_PATH, &[]).await?;
        if let Some(cache) = &self.snapshot {
            if let Err(error) = cache.store(SNAPSHOT_FILE, items.clone()).await {
                warn!(target: "exam_assist_client", error = %error, "failed to persist corpus snapshot");
            }
        }
        debug!(target: "exam_assist_client", count = items.len(), "fetched question corpus");
        Ok(items)
    }

    pub async fn load_snapshot(&self) -> Result<Option<CacheEntry<Vec<QuestionItem>>>> {
        match &self.snapshot {
            Some(cache) => cache.load(SNAPSHOT_FILE).await,
            None => Ok(None),
        }
    }

    /// `GET /api/questions/search?query=...`; an empty list means no exact match.
    #[instrument(name = "exam_assist_client.search", skip(self))]
    pub async fn search(&self, query: &str) -> Result<Vec<QuestionItem>, ClientError> {
        self.fetch_json(SEARCH_PATH, &[("query", query)]).await
    }

    #[instrument(name = "exam_assist_client.register_user", skip(self))]
    pub async fn register_user(&self, username: &str) -> Result<RegisteredUser, ClientError> {
        let url = self.url(USERS_PATH);
        let response = self
            .http
            .post(&url)
            .json(&RegisterUserRequest { username })
            .send()
            .await
            .map_err(|err| ClientError::Http(err.to_string()))?;
        Self::decode(response, &url).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn fetch_json<T>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|err| ClientError::Http(err.to_string()))?;
        Self::decode(response, &url).await
    }

    async fn decode<T>(response: reqwest::Response, url: &str) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
    {
        let status = response.status();
        if !status.is_success() {
            warn!(target: "exam_assist_client", status = %status, url, "question store request failed");
            return Err(ClientError::Status(status));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| ClientError::Http(err.to_string()))?;
        serde_json::from_slice::<T>(&bytes).map_err(|err| {
            warn!(target: "exam_assist_client", error = %err, url, "unexpected response shape");
            ClientError::Decode(err.to_string())
        })
    }
}
