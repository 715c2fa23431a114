pub mod controller;
pub mod encoder;
pub mod error;
pub mod gemini;
pub mod history;
pub mod logging;
pub mod prompts;
pub mod request;
pub mod service;
pub mod session;
pub mod settings;
pub mod storage;
pub mod utils;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use crate::encoder::UploadedImage;
use crate::gemini::GeminiClient;
use crate::history::{HistoryEntry, HistoryStore};
use crate::request::{GenerationConfig, GenerationMode, SourceSlot};
use crate::service::GenerationService;
use crate::session::{Session, SessionStatus, RESULT_DOWNLOAD_NAME};
use crate::settings::{load_settings_from_dir, HistoryBackend, Settings};
use crate::storage::{JsonFileStorage, RecordStorage, SqliteStorage};
use crate::utils::{db_path, ensure_data_dir};

/// What the presentation layer talks to. Session and history live behind
/// async locks that are never held across the network call.
pub struct App {
    session: Arc<Mutex<Session>>,
    history: Mutex<HistoryStore>,
    service: Arc<dyn GenerationService>,
    data_dir: PathBuf,
    settings: Settings,
    has_api_key: bool,
    _log_guard: Option<WorkerGuard>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AppHealth {
    pub ok: bool,
    pub data_dir: String,
    pub history_backend: HistoryBackend,
    pub has_api_key: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub mode: GenerationMode,
    pub status: SessionStatus,
    pub error: Option<String>,
    pub result_data_url: Option<String>,
    pub result_download_name: Option<String>,
    pub can_submit: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryItemView {
    pub id: String,
    pub prompt: String,
    pub aspect_ratio: String,
    pub created_at: String,
    pub view_only: bool,
    pub image_data_url: Option<String>,
    pub download_name: Option<String>,
}

impl From<&HistoryEntry> for HistoryItemView {
    fn from(e: &HistoryEntry) -> Self {
        Self {
            id: e.id.clone(),
            prompt: e.prompt_label.clone(),
            aspect_ratio: e
                .aspect_ratio
                .resolve()
                .unwrap_or_else(|_| e.aspect_ratio.key().to_string()),
            created_at: e.display_time(),
            view_only: e.is_view_only(),
            image_data_url: e.image.as_ref().map(|i| i.data_url()),
            download_name: e.image.as_ref().map(|_| e.download_file_name()),
        }
    }
}

impl App {
    /// Reads settings from `data_dir`, opens the configured history backend
    /// and rehydrates the history.
    pub async fn startup(data_dir: &Path) -> Result<App> {
        let settings = load_settings_from_dir(data_dir);
        let storage: Arc<dyn RecordStorage> = match settings.history_backend {
            HistoryBackend::Json => Arc::new(JsonFileStorage::new(data_dir.join("storage"))),
            HistoryBackend::Sqlite => Arc::new(
                SqliteStorage::open(&db_path(data_dir))
                    .await
                    .context("open history database")?,
            ),
        };
        let client = GeminiClient::from_settings(&settings);
        let has_api_key = client.has_credentials();
        let app = Self::with_parts(data_dir, settings, Arc::new(client), storage).await;
        Ok(App { has_api_key, ..app })
    }

    /// Startup against the platform data directory, with logging to its
    /// `logs` folder.
    pub async fn startup_default() -> Result<App> {
        let data_dir = ensure_data_dir()?;
        let guard = logging::init_tracing(&data_dir)?;
        let app = Self::startup(&data_dir).await?;
        Ok(App {
            _log_guard: Some(guard),
            ..app
        })
    }

    pub async fn with_parts(
        data_dir: &Path,
        settings: Settings,
        service: Arc<dyn GenerationService>,
        storage: Arc<dyn RecordStorage>,
    ) -> App {
        let mut history = HistoryStore::new(storage).with_limit(settings.history_limit);
        history.load_from_durable_storage().await;
        info!(data_dir = %data_dir.display(), backend = ?settings.history_backend, "app started");
        App {
            session: Arc::new(Mutex::new(Session::new())),
            history: Mutex::new(history),
            service,
            data_dir: data_dir.to_path_buf(),
            settings,
            has_api_key: true,
            _log_guard: None,
        }
    }

    pub fn health(&self) -> AppHealth {
        AppHealth {
            ok: true,
            data_dir: self.data_dir.display().to_string(),
            history_backend: self.settings.history_backend,
            has_api_key: self.has_api_key,
        }
    }

    pub async fn session_view(&self) -> SessionView {
        let session = self.session.lock().await;
        SessionView {
            mode: session.mode,
            status: session.status,
            error: session.error.clone(),
            result_data_url: session.result_data_url(),
            result_download_name: session
                .result
                .as_ref()
                .map(|_| RESULT_DOWNLOAD_NAME.to_string()),
            can_submit: session.can_submit(),
        }
    }

    pub async fn config(&self) -> GenerationConfig {
        self.session.lock().await.config.clone()
    }

    pub async fn set_mode(&self, mode: GenerationMode) {
        self.session.lock().await.set_mode(mode);
    }

    pub async fn upload(&self, slot: SourceSlot, image: UploadedImage) -> Result<(), String> {
        self.session
            .lock()
            .await
            .upload(slot, image)
            .map_err(|e| e.to_string())
    }

    pub async fn update_config(&self, edit: impl FnOnce(&mut GenerationConfig)) {
        edit(&mut self.session.lock().await.config);
    }

    /// Runs one generation. A call made while another is in flight is
    /// rejected without touching the session or history.
    pub async fn generate(&self) -> Result<String, String> {
        let request = {
            let mut session = self.session.lock().await;
            controller::begin(&mut session).map_err(|e| e.user_message())?
        };
        // Declared before the lock guards below so it drops after them.
        let mut in_flight = InFlight {
            session: Arc::clone(&self.session),
            armed: true,
        };

        let outcome = controller::execute(&request, self.service.as_ref()).await;

        let mut session = self.session.lock().await;
        let mut history = self.history.lock().await;
        let result = controller::finish(&mut session, &mut history, &request, outcome).await;
        in_flight.armed = false;
        result.map_err(|e| e.user_message())
    }

    pub async fn history(&self) -> Vec<HistoryItemView> {
        let history = self.history.lock().await;
        history.entries().iter().map(HistoryItemView::from).collect()
    }

    /// Restores the configuration of a past generation into the session.
    pub async fn reuse_history_item(&self, id: &str) -> Result<(), String> {
        let mut session = self.session.lock().await;
        let history = self.history.lock().await;
        let entry = history
            .get(id)
            .ok_or_else(|| "history item not found".to_string())?;
        let restored = history::reuse(entry, session.mode);
        session.apply(restored);
        Ok(())
    }

    /// Erases all history. The caller is expected to have confirmed.
    pub async fn clear_history(&self) {
        self.history.lock().await.clear().await;
    }
}

/// Lets the session leave `Submitting` when a `generate` future is dropped
/// before `finish` runs.
struct InFlight {
    session: Arc<Mutex<Session>>,
    armed: bool,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Ok(mut session) = self.session.try_lock() {
            controller::abandon(&mut session);
            return;
        }
        let session = Arc::clone(&self.session);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    controller::abandon(&mut *session.lock().await);
                });
            }
            Err(_) => warn!("no runtime to release an abandoned generation"),
        }
    }
}
