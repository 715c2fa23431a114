use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

use crate::error::StorageError;
use crate::prompts::parse_branding_label;
use crate::request::{
    AspectRatio, CustomAspectRatio, FontFamily, GenerationMode, GenerationRequest,
    TextOverlayConfig, TextSize, DEFAULT_TEXT_COLOR,
};
use crate::service::GeneratedImage;
use crate::storage::RecordStorage;

/// Name of the durable record holding the history metadata.
pub const HISTORY_RECORD_KEY: &str = "imageFusionHistory";

const DOWNLOAD_PREFIX: &str = "anh-sang-tao-ai";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: String,
    /// Present for the session that produced it; `None` once rehydrated.
    pub image: Option<GeneratedImage>,
    pub prompt_label: String,
    pub aspect_ratio: AspectRatio,
    pub created_at: OffsetDateTime,
    pub text_overlay: TextOverlayConfig,
}

impl HistoryEntry {
    pub fn from_request(request: &GenerationRequest, image: GeneratedImage) -> Self {
        let created_at = OffsetDateTime::now_utc();
        Self {
            id: created_at.format(&Rfc3339).unwrap_or_default(),
            image: Some(image),
            prompt_label: request.prompt_label.clone(),
            aspect_ratio: request.aspect_ratio,
            created_at,
            text_overlay: request.text_overlay.clone(),
        }
    }

    /// Rehydrated entries have no image and can only be reused.
    pub fn is_view_only(&self) -> bool {
        self.image.is_none()
    }

    pub fn download_file_name(&self) -> String {
        format!("{DOWNLOAD_PREFIX}-{}.png", self.id)
    }

    /// `dd/mm/yyyy HH:MM`, UTC.
    pub fn display_time(&self) -> String {
        self.created_at
            .format(format_description!("[day]/[month]/[year] [hour]:[minute]"))
            .unwrap_or_default()
    }

    fn to_persisted(&self) -> PersistedEntry {
        let overlay = &self.text_overlay;
        PersistedEntry {
            id: self.id.clone(),
            prompt: self.prompt_label.clone(),
            aspect_ratio: self.aspect_ratio.key().to_string(),
            custom_aspect_ratio: self.aspect_ratio.custom_dimensions(),
            timestamp: (self.created_at.unix_timestamp_nanos() / 1_000_000) as i64,
            is_text_overlay_enabled: Some(overlay.enabled),
            overlay_text: Some(overlay.text.clone()),
            text_color: Some(overlay.color.clone()),
            text_size: Some(overlay.size),
            font_family: Some(overlay.font),
        }
    }

    fn from_persisted(p: PersistedEntry) -> Self {
        let aspect_ratio = AspectRatio::from_key(&p.aspect_ratio, p.custom_aspect_ratio)
            .unwrap_or_else(|| {
                warn!(aspect_ratio = %p.aspect_ratio, "unknown aspect ratio in history");
                AspectRatio::default()
            });
        let created_at =
            OffsetDateTime::from_unix_timestamp_nanos(i128::from(p.timestamp) * 1_000_000)
                .unwrap_or(OffsetDateTime::UNIX_EPOCH);
        Self {
            id: p.id,
            image: None,
            prompt_label: p.prompt,
            aspect_ratio,
            created_at,
            text_overlay: TextOverlayConfig {
                enabled: p.is_text_overlay_enabled.unwrap_or(false),
                text: p.overlay_text.unwrap_or_default(),
                color: p
                    .text_color
                    .unwrap_or_else(|| DEFAULT_TEXT_COLOR.to_string()),
                size: p.text_size.unwrap_or_default(),
                font: p.font_family.unwrap_or_default(),
            },
        }
    }
}

/// Metadata-only form written to durable storage. Never carries image data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedEntry {
    id: String,
    prompt: String,
    aspect_ratio: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    custom_aspect_ratio: Option<CustomAspectRatio>,
    timestamp: i64,
    #[serde(default)]
    is_text_overlay_enabled: Option<bool>,
    #[serde(default)]
    overlay_text: Option<String>,
    #[serde(default)]
    text_color: Option<String>,
    #[serde(default)]
    text_size: Option<TextSize>,
    #[serde(default)]
    font_family: Option<FontFamily>,
}

/// Configuration recovered from a history entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredConfiguration {
    pub mode: GenerationMode,
    pub prompt: String,
    /// `None` leaves the current style selection untouched.
    pub branding_style: Option<String>,
    pub aspect_ratio: AspectRatio,
    pub text_overlay: TextOverlayConfig,
}

/// Branding labels restore branding mode with an empty prompt. Any other label
/// is a literal prompt; branding switches to single-edit, other modes stay.
pub fn reuse(entry: &HistoryEntry, current_mode: GenerationMode) -> RestoredConfiguration {
    let (mode, prompt, branding_style) = match parse_branding_label(&entry.prompt_label) {
        Some(style) => (GenerationMode::Branding, String::new(), Some(style.to_string())),
        None => {
            let mode = match current_mode {
                GenerationMode::Branding => GenerationMode::SingleEdit,
                other => other,
            };
            (mode, entry.prompt_label.clone(), None)
        }
    };
    RestoredConfiguration {
        mode,
        prompt,
        branding_style,
        aspect_ratio: entry.aspect_ratio,
        text_overlay: entry.text_overlay.clone(),
    }
}

/// Most-recent-first list of past generations, mirrored to durable storage.
pub struct HistoryStore {
    entries: Vec<HistoryEntry>,
    storage: Arc<dyn RecordStorage>,
    limit: Option<usize>,
}

impl HistoryStore {
    pub fn new(storage: Arc<dyn RecordStorage>) -> Self {
        Self {
            entries: Vec::new(),
            storage,
            limit: None,
        }
    }

    /// Evicts the oldest entries beyond `limit`. `Some(0)` means unbounded,
    /// so the entry just added is always retrievable.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit.filter(|n| *n > 0);
        self
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replaces the in-memory list with the persisted one. Missing or
    /// unreadable records yield an empty history. Colliding ids are suffixed
    /// and the limit applies, as for `add`.
    #[instrument(skip(self))]
    pub async fn load_from_durable_storage(&mut self) {
        let loaded = match self.storage.get(HISTORY_RECORD_KEY).await {
            Ok(Some(raw)) => match decode_record(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(error = %e, "history record is not a list");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "failed to load history");
                Vec::new()
            }
        };

        self.entries = Vec::with_capacity(loaded.len());
        for mut entry in loaded {
            entry.id = unique_id(&self.entries, &entry.id);
            self.entries.push(entry);
        }
        self.evict();
        info!(count = self.entries.len(), "history loaded");
    }

    /// Prepends `entry` and persists. Returns the id actually stored, which
    /// gains a `-N` suffix if it collides with an existing entry.
    pub async fn add(&mut self, mut entry: HistoryEntry) -> String {
        entry.id = unique_id(&self.entries, &entry.id);
        let id = entry.id.clone();
        self.entries.insert(0, entry);
        self.evict();
        self.persist().await;
        id
    }

    fn evict(&mut self) {
        if let Some(limit) = self.limit {
            self.entries.truncate(limit);
        }
    }

    /// Writes metadata for every entry. Failures are logged and ignored.
    pub async fn persist(&self) {
        let result = match encode_record(&self.entries) {
            Ok(json) => self.storage.set(HISTORY_RECORD_KEY, &json).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => debug!(count = self.entries.len(), "history persisted"),
            Err(e) => warn!(error = %e, "failed to save history"),
        }
    }

    /// Empties the list and erases the durable record. Confirmation is the
    /// caller's job.
    pub async fn clear(&mut self) {
        self.entries.clear();
        if let Err(e) = self.storage.remove(HISTORY_RECORD_KEY).await {
            warn!(error = %e, "failed to erase history");
        }
        info!("history cleared");
    }
}

fn unique_id(entries: &[HistoryEntry], id: &str) -> String {
    let taken = |candidate: &str| entries.iter().any(|e| e.id == candidate);
    if !taken(id) {
        return id.to_string();
    }
    let mut n = 1;
    while taken(&format!("{id}-{n}")) {
        n += 1;
    }
    format!("{id}-{n}")
}

fn encode_record(entries: &[HistoryEntry]) -> Result<String, StorageError> {
    let record: Vec<PersistedEntry> = entries.iter().map(|e| e.to_persisted()).collect();
    Ok(serde_json::to_string(&record)?)
}

/// Unreadable items are skipped; a record that is not an array is an error.
fn decode_record(raw: &str) -> Result<Vec<HistoryEntry>, StorageError> {
    let items = serde_json::from_str::<Vec<serde_json::Value>>(raw)?;
    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<PersistedEntry>(item) {
            Ok(p) => Some(HistoryEntry::from_persisted(p)),
            Err(e) => {
                warn!(error = %e, "skipping unreadable history item");
                None
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use time::macros::datetime;

    fn entry(id: &str, label: &str) -> HistoryEntry {
        HistoryEntry {
            id: id.to_string(),
            image: Some(GeneratedImage::png("SU1BR0VEQVRB")),
            prompt_label: label.to_string(),
            aspect_ratio: AspectRatio::Square,
            created_at: datetime!(2024-05-01 10:30 UTC),
            text_overlay: TextOverlayConfig::default(),
        }
    }

    fn store_with(storage: &Arc<MemoryStorage>) -> HistoryStore {
        HistoryStore::new(storage.clone())
    }

    #[tokio::test]
    async fn add_prepends_and_persists_metadata_only() {
        let storage = Arc::new(MemoryStorage::new());
        let mut store = store_with(&storage);
        store.add(entry("a", "first")).await;
        store.add(entry("b", "second")).await;

        let ids: Vec<_> = store.entries().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert!(store.entries()[0].image.is_some());

        let raw = storage.raw(HISTORY_RECORD_KEY).unwrap();
        assert!(!raw.contains("SU1BR0VEQVRB"));
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value[0]["id"], "b");
        assert_eq!(value[0]["prompt"], "second");
        assert_eq!(value[0]["aspectRatio"], "1:1");
        assert_eq!(value[0]["timestamp"], 1_714_559_400_000_i64);
        assert_eq!(value[0]["textSize"], "Vừa");
        assert!(value[0].get("customAspectRatio").is_none());
    }

    #[tokio::test]
    async fn rehydrated_entries_are_view_only() {
        let storage = Arc::new(MemoryStorage::new());
        let mut store = store_with(&storage);
        let mut custom = entry("a", "đổi nền");
        custom.aspect_ratio = AspectRatio::Custom { width: 21, height: 9 };
        store.add(custom).await;

        let mut reloaded = store_with(&storage);
        reloaded.load_from_durable_storage().await;
        assert_eq!(reloaded.len(), 1);
        let e = &reloaded.entries()[0];
        assert!(e.is_view_only());
        assert_eq!(e.aspect_ratio, AspectRatio::Custom { width: 21, height: 9 });
        assert_eq!(e.created_at, datetime!(2024-05-01 10:30 UTC));
        assert_eq!(e.display_time(), "01/05/2024 10:30");
    }

    #[tokio::test]
    async fn corrupt_or_missing_record_yields_empty_history() {
        let storage = Arc::new(MemoryStorage::with_record(HISTORY_RECORD_KEY, "{oops"));
        let mut store = store_with(&storage);
        store.load_from_durable_storage().await;
        assert!(store.is_empty());

        let mut store = HistoryStore::new(Arc::new(MemoryStorage::new()));
        store.load_from_durable_storage().await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn old_records_without_overlay_fields_get_defaults() {
        let raw = r#"[{"id":"x","prompt":"p","aspectRatio":"4:5","timestamp":0},{"bad":true}]"#;
        let storage = Arc::new(MemoryStorage::with_record(HISTORY_RECORD_KEY, raw));
        let mut store = store_with(&storage);
        store.load_from_durable_storage().await;
        assert_eq!(store.len(), 1);
        let e = &store.entries()[0];
        assert_eq!(e.aspect_ratio, AspectRatio::Portrait4x5);
        assert_eq!(e.text_overlay, TextOverlayConfig::default());
    }

    #[tokio::test]
    async fn write_failure_keeps_memory_authoritative() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_fail_writes(true);
        let mut store = store_with(&storage);
        store.add(entry("a", "p")).await;
        assert_eq!(store.len(), 1);
        assert!(storage.raw(HISTORY_RECORD_KEY).is_none());
    }

    #[tokio::test]
    async fn clear_erases_memory_and_record() {
        let storage = Arc::new(MemoryStorage::new());
        let mut store = store_with(&storage);
        store.add(entry("a", "p")).await;
        store.clear().await;
        assert!(store.is_empty());
        assert!(storage.raw(HISTORY_RECORD_KEY).is_none());

        let mut reloaded = store_with(&storage);
        reloaded.load_from_durable_storage().await;
        assert!(reloaded.is_empty());
    }

    #[tokio::test]
    async fn colliding_ids_get_suffixes() {
        let mut store = HistoryStore::new(Arc::new(MemoryStorage::new()));
        assert_eq!(store.add(entry("t", "p")).await, "t");
        assert_eq!(store.add(entry("t", "p")).await, "t-1");
        assert_eq!(store.add(entry("t", "p")).await, "t-2");
    }

    #[tokio::test]
    async fn limit_evicts_oldest() {
        let mut store = HistoryStore::new(Arc::new(MemoryStorage::new())).with_limit(Some(2));
        store.add(entry("a", "p")).await;
        store.add(entry("b", "p")).await;
        store.add(entry("c", "p")).await;
        let ids: Vec<_> = store.entries().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);
    }

    #[tokio::test]
    async fn zero_limit_keeps_everything() {
        let mut store = HistoryStore::new(Arc::new(MemoryStorage::new())).with_limit(Some(0));
        let id = store.add(entry("a", "p")).await;
        assert_eq!(store.len(), 1);
        assert!(store.get(&id).is_some());
    }

    #[tokio::test]
    async fn load_suffixes_duplicate_ids_and_applies_limit() {
        let raw = r#"[
            {"id":"x","prompt":"newest","aspectRatio":"1:1","timestamp":3},
            {"id":"x","prompt":"middle","aspectRatio":"1:1","timestamp":2},
            {"id":"y","prompt":"oldest","aspectRatio":"1:1","timestamp":1}
        ]"#;
        let storage = Arc::new(MemoryStorage::with_record(HISTORY_RECORD_KEY, raw));
        let mut store = store_with(&storage).with_limit(Some(2));
        store.load_from_durable_storage().await;

        let ids: Vec<_> = store.entries().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "x-1"]);
        assert_eq!(store.get("x-1").unwrap().prompt_label, "middle");
    }

    #[test]
    fn non_list_record_is_a_serde_error() {
        assert!(matches!(
            decode_record("{\"id\":1}"),
            Err(StorageError::Serde(_))
        ));
        assert_eq!(decode_record("[]").unwrap(), Vec::new());
    }

    #[test]
    fn reuse_branding_entry() {
        let e = entry("a", "Phong cách: Chuyên nghiệp");
        let restored = reuse(&e, GenerationMode::Fusion);
        assert_eq!(restored.mode, GenerationMode::Branding);
        assert_eq!(restored.branding_style.as_deref(), Some("Chuyên nghiệp"));
        assert_eq!(restored.prompt, "");
    }

    #[test]
    fn reuse_prompt_entry() {
        let e = entry("a", "đổi nền thành biển");
        let restored = reuse(&e, GenerationMode::Branding);
        assert_eq!(restored.mode, GenerationMode::SingleEdit);
        assert_eq!(restored.prompt, "đổi nền thành biển");
        assert_eq!(restored.branding_style, None);

        assert_eq!(reuse(&e, GenerationMode::Fusion).mode, GenerationMode::Fusion);
        assert_eq!(reuse(&e, GenerationMode::SingleEdit).mode, GenerationMode::SingleEdit);
    }

    #[test]
    fn download_name_uses_id() {
        assert_eq!(entry("x1", "p").download_file_name(), "anh-sang-tao-ai-x1.png");
    }
}
