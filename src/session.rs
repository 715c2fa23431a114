use serde::Serialize;

use crate::encoder::UploadedImage;
use crate::error::ValidationError;
use crate::history::RestoredConfiguration;
use crate::request::{GenerationConfig, GenerationMode, SourceSlot, Uploads};
use crate::service::GeneratedImage;

pub const RESULT_DOWNLOAD_NAME: &str = "anh-sang-tao-ai.png";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Idle,
    Submitting,
    Succeeded,
    Failed,
}

/// The single active form plus whatever the last generation produced.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub mode: GenerationMode,
    pub uploads: Uploads,
    pub config: GenerationConfig,
    pub result: Option<GeneratedImage>,
    pub status: SessionStatus,
    pub error: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_submitting(&self) -> bool {
        self.status == SessionStatus::Submitting
    }

    /// Keeps uploads; only the required fields change.
    pub fn set_mode(&mut self, mode: GenerationMode) {
        self.mode = mode;
    }

    /// Stores a picked file. Non-image files are refused. A new upload clears
    /// the previous result and error.
    pub fn upload(&mut self, slot: SourceSlot, image: UploadedImage) -> Result<(), ValidationError> {
        image.ensure_image()?;
        self.uploads.set(slot, image);
        self.result = None;
        self.error = None;
        Ok(())
    }

    /// Whether the generate action should be enabled.
    pub fn can_submit(&self) -> bool {
        let config = &self.config;
        !self.is_submitting()
            && self.uploads.has_all(self.mode.required_slots())
            && (!self.mode.requires_prompt() || !config.prompt.trim().is_empty())
            && (!config.text_overlay.enabled || !config.text_overlay.text.trim().is_empty())
            && config.aspect_ratio.is_valid()
    }

    /// Loads a reused history configuration. Uploads and previously entered
    /// custom dimensions are left alone.
    pub fn apply(&mut self, restored: RestoredConfiguration) {
        self.mode = restored.mode;
        self.config.prompt = restored.prompt;
        if let Some(style) = restored.branding_style {
            self.config.branding_style = style;
        }
        self.config.set_aspect_ratio(restored.aspect_ratio);
        self.config.text_overlay = restored.text_overlay;
    }

    pub fn result_data_url(&self) -> Option<String> {
        self.result.as_ref().map(GeneratedImage::data_url)
    }
}
