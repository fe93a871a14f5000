use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use exam_assist_client::{ClientConfig, QuestionClient};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub mod controller;
pub mod ranker;
pub mod replies;
pub mod repository;
pub mod scoring;
pub mod session;
pub mod state;
pub mod text;
pub mod transport;

pub use controller::{
    Command, ControllerOptions, ConversationController, NameError, SearchOutcome, SendError,
};
pub use ranker::{rank, RankOptions};
pub use repository::QuestionRepository;
pub use session::{SessionDriver, SessionEvent, TurnRecord};

/// Runtime settings, usually layered from a config file and the environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantSettings {
    pub base_url: String,
    /// Applies to every store call; a timeout counts as a network failure.
    pub request_timeout_secs: u64,
    pub similarity_threshold: f64,
    pub suggestion_limit: usize,
    pub min_name_chars: usize,
    /// Where the corpus snapshot lives. `None` disables it.
    pub cache_dir: Option<PathBuf>,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        let client = ClientConfig::default();
        Self {
            base_url: client.base_url,
            request_timeout_secs: client.timeout.as_secs(),
            similarity_threshold: ranker::DEFAULT_THRESHOLD,
            suggestion_limit: ranker::DEFAULT_LIMIT,
            min_name_chars: controller::DEFAULT_MIN_NAME_CHARS,
            cache_dir: client.cache_dir,
        }
    }
}

impl AssistantSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn rank_options(&self) -> RankOptions {
        RankOptions {
            threshold: self.similarity_threshold,
            limit: self.suggestion_limit,
        }
    }

    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            rank: self.rank_options(),
            min_name_chars: self.min_name_chars,
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url.clone(),
            timeout: self.request_timeout(),
            cache_dir: self.cache_dir.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AssistantRuntime {
    settings: AssistantSettings,
    client: Arc<QuestionClient>,
}

impl AssistantRuntime {
    pub fn settings(&self) -> &AssistantSettings {
        &self.settings
    }

    pub fn client(&self) -> Arc<QuestionClient> {
        self.client.clone()
    }

    /// A fresh conversation; the corpus bootstrap starts immediately.
    pub fn session(&self) -> SessionDriver<QuestionClient> {
        SessionDriver::new(
            self.client.clone(),
            self.settings.controller_options(),
            self.settings.request_timeout(),
        )
    }

    pub async fn serve_stdio(&self) -> Result<()> {
        transport::serve_stdio(self.session()).await
    }
}

pub fn bootstrap(settings: AssistantSettings) -> Result<AssistantRuntime> {
    let client = QuestionClient::with_config(settings.client_config())?;

    debug!(
        target: "exam_assist_core",
        base_url = client.base_url(),
        snapshot_dir = ?settings.cache_dir,
        "question client initialized"
    );
    info!(
        target: "exam_assist_core",
        threshold = settings.similarity_threshold,
        limit = settings.suggestion_limit,
        timeout_secs = settings.request_timeout_secs,
        "assistant ready"
    );

    Ok(AssistantRuntime {
        settings,
        client: Arc::new(client),
    })
}
