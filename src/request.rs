use serde::{Deserialize, Serialize};

use crate::encoder::UploadedImage;
use crate::error::ValidationError;
use crate::prompts::{self, DEFAULT_STYLE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// Background and subject images merged per a free-text prompt.
    Fusion,
    /// One image edited per a free-text prompt.
    #[serde(rename = "single")]
    SingleEdit,
    /// One portrait restyled with a named branding style.
    #[default]
    Branding,
}

/// Upload slots. Single-edit and branding share the `Single` slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceSlot {
    Background,
    Subject,
    Single,
}

impl GenerationMode {
    pub fn required_slots(self) -> &'static [SourceSlot] {
        match self {
            GenerationMode::Fusion => &[SourceSlot::Background, SourceSlot::Subject],
            GenerationMode::SingleEdit | GenerationMode::Branding => &[SourceSlot::Single],
        }
    }

    pub fn requires_prompt(self) -> bool {
        match self {
            GenerationMode::Fusion | GenerationMode::SingleEdit => true,
            GenerationMode::Branding => false,
        }
    }

    fn incomplete(self) -> ValidationError {
        match self {
            GenerationMode::Fusion => ValidationError::FusionIncomplete,
            GenerationMode::SingleEdit => ValidationError::SingleEditIncomplete,
            GenerationMode::Branding => ValidationError::BrandingMissingImage,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AspectRatio {
    Square,
    Landscape16x9,
    Portrait9x16,
    Portrait4x5,
    Portrait3x4,
    Landscape4x3,
    Custom { width: i64, height: i64 },
}

pub const CUSTOM_RATIO_KEY: &str = "custom";
pub const DEFAULT_CUSTOM_RATIO: CustomAspectRatio = CustomAspectRatio {
    width: 16,
    height: 9,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomAspectRatio {
    pub width: i64,
    pub height: i64,
}

impl Default for AspectRatio {
    fn default() -> Self {
        AspectRatio::Square
    }
}

impl AspectRatio {
    pub const PRESETS: [AspectRatio; 6] = [
        AspectRatio::Square,
        AspectRatio::Landscape16x9,
        AspectRatio::Portrait9x16,
        AspectRatio::Portrait4x5,
        AspectRatio::Portrait3x4,
        AspectRatio::Landscape4x3,
    ];

    /// Persisted key: the preset ratio itself, or `"custom"`.
    pub fn key(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Landscape16x9 => "16:9",
            AspectRatio::Portrait9x16 => "9:16",
            AspectRatio::Portrait4x5 => "4:5",
            AspectRatio::Portrait3x4 => "3:4",
            AspectRatio::Landscape4x3 => "4:3",
            AspectRatio::Custom { .. } => CUSTOM_RATIO_KEY,
        }
    }

    pub fn from_key(key: &str, custom: Option<CustomAspectRatio>) -> Option<Self> {
        if key == CUSTOM_RATIO_KEY {
            let c = custom.unwrap_or(DEFAULT_CUSTOM_RATIO);
            return Some(AspectRatio::Custom {
                width: c.width,
                height: c.height,
            });
        }
        Self::PRESETS.into_iter().find(|p| p.key() == key)
    }

    pub fn custom_dimensions(&self) -> Option<CustomAspectRatio> {
        match *self {
            AspectRatio::Custom { width, height } => Some(CustomAspectRatio { width, height }),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        match *self {
            AspectRatio::Custom { width, height } => width > 0 && height > 0,
            _ => true,
        }
    }

    /// Concrete `"W:H"` string sent to the service.
    pub fn resolve(&self) -> Result<String, ValidationError> {
        match *self {
            AspectRatio::Custom { width, height } if width > 0 && height > 0 => {
                Ok(format!("{width}:{height}"))
            }
            AspectRatio::Custom { width, height } => {
                Err(ValidationError::InvalidAspectRatio { width, height })
            }
            preset => Ok(preset.key().to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TextSize {
    #[serde(rename = "Nhỏ")]
    Small,
    #[default]
    #[serde(rename = "Vừa")]
    Medium,
    #[serde(rename = "Lớn")]
    Large,
}

impl TextSize {
    pub fn label(self) -> &'static str {
        match self {
            TextSize::Small => "Nhỏ",
            TextSize::Medium => "Vừa",
            TextSize::Large => "Lớn",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FontFamily {
    #[serde(rename = "Serif")]
    Serif,
    #[default]
    #[serde(rename = "Sans-serif")]
    SansSerif,
    #[serde(rename = "Thư pháp")]
    Decorative,
}

impl FontFamily {
    pub fn label(self) -> &'static str {
        match self {
            FontFamily::Serif => "Serif",
            FontFamily::SansSerif => "Sans-serif",
            FontFamily::Decorative => "Thư pháp",
        }
    }
}

pub const DEFAULT_TEXT_COLOR: &str = "#FFFFFF";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextOverlayConfig {
    pub enabled: bool,
    pub text: String,
    /// Hex color, e.g. `#FFFFFF`.
    pub color: String,
    pub size: TextSize,
    pub font: FontFamily,
}

impl Default for TextOverlayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            text: String::new(),
            color: DEFAULT_TEXT_COLOR.to_string(),
            size: TextSize::default(),
            font: FontFamily::default(),
        }
    }
}

impl TextOverlayConfig {
    /// Overlay that will actually be rendered: enabled with non-blank text.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.text.trim().is_empty()
    }
}

/// User-editable form fields of the active session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationConfig {
    pub prompt: String,
    pub branding_style: String,
    pub aspect_ratio: AspectRatio,
    /// Last custom dimensions entered; survives switching to a preset.
    pub custom_ratio: CustomAspectRatio,
    pub text_overlay: TextOverlayConfig,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            branding_style: DEFAULT_STYLE.to_string(),
            aspect_ratio: AspectRatio::default(),
            custom_ratio: DEFAULT_CUSTOM_RATIO,
            text_overlay: TextOverlayConfig::default(),
        }
    }
}

impl GenerationConfig {
    /// Changes the ratio, remembering custom dimensions on the way in and out.
    pub fn set_aspect_ratio(&mut self, ratio: AspectRatio) {
        if let Some(dims) = self.aspect_ratio.custom_dimensions() {
            self.custom_ratio = dims;
        }
        if let Some(dims) = ratio.custom_dimensions() {
            self.custom_ratio = dims;
        }
        self.aspect_ratio = ratio;
    }

    /// Switches to the custom ratio with the last dimensions entered.
    pub fn select_custom(&mut self) {
        let CustomAspectRatio { width, height } = self.custom_ratio;
        self.aspect_ratio = AspectRatio::Custom { width, height };
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Uploads {
    pub background: Option<UploadedImage>,
    pub subject: Option<UploadedImage>,
    pub single: Option<UploadedImage>,
}

impl Uploads {
    pub fn get(&self, slot: SourceSlot) -> Option<&UploadedImage> {
        match slot {
            SourceSlot::Background => self.background.as_ref(),
            SourceSlot::Subject => self.subject.as_ref(),
            SourceSlot::Single => self.single.as_ref(),
        }
    }

    pub fn set(&mut self, slot: SourceSlot, image: UploadedImage) {
        let target = match slot {
            SourceSlot::Background => &mut self.background,
            SourceSlot::Subject => &mut self.subject,
            SourceSlot::Single => &mut self.single,
        };
        *target = Some(image);
    }

    pub fn has_all(&self, slots: &[SourceSlot]) -> bool {
        slots.iter().all(|slot| self.get(*slot).is_some())
    }
}

/// An upload paired with the caption part that precedes it in the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePart {
    pub caption: &'static str,
    pub image: UploadedImage,
}

/// Built per submission, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub mode: GenerationMode,
    pub sources: Vec<SourcePart>,
    /// Free-text prompt, or the synthetic branding label.
    pub prompt_label: String,
    pub aspect_ratio: AspectRatio,
    pub resolved_aspect_ratio: String,
    pub text_overlay: TextOverlayConfig,
    pub instruction: String,
}

/// Validates the form for `mode` and assembles the instruction payload.
///
/// Rules are checked in order: required images and prompt for the mode, then
/// the custom aspect ratio, then overlay text. Nothing is read or encoded here.
pub fn build(
    mode: GenerationMode,
    uploads: &Uploads,
    config: &GenerationConfig,
) -> Result<GenerationRequest, ValidationError> {
    let prompt = config.prompt.trim();
    if !uploads.has_all(mode.required_slots()) || (mode.requires_prompt() && prompt.is_empty()) {
        return Err(mode.incomplete());
    }

    let resolved = config.aspect_ratio.resolve()?;

    let overlay = &config.text_overlay;
    if overlay.enabled && overlay.text.trim().is_empty() {
        return Err(ValidationError::EmptyOverlayText);
    }

    let source = |slot: SourceSlot, caption: &'static str| -> Result<SourcePart, ValidationError> {
        let image = uploads.get(slot).cloned().ok_or_else(|| mode.incomplete())?;
        Ok(SourcePart { caption, image })
    };

    let (sources, prompt_label, instruction) = match mode {
        GenerationMode::Fusion => (
            vec![
                source(SourceSlot::Background, prompts::CAPTION_BACKGROUND)?,
                source(SourceSlot::Subject, prompts::CAPTION_SUBJECT)?,
            ],
            config.prompt.clone(),
            prompts::fusion_instruction(&config.prompt, &resolved, overlay),
        ),
        GenerationMode::SingleEdit => (
            vec![source(SourceSlot::Single, prompts::CAPTION_ORIGINAL)?],
            config.prompt.clone(),
            prompts::single_edit_instruction(&config.prompt, &resolved, overlay),
        ),
        GenerationMode::Branding => (
            vec![source(SourceSlot::Single, prompts::CAPTION_ORIGINAL)?],
            prompts::branding_label(&config.branding_style),
            prompts::branding_instruction(&config.branding_style, &resolved, overlay),
        ),
    };

    Ok(GenerationRequest {
        mode,
        sources,
        prompt_label,
        aspect_ratio: config.aspect_ratio,
        resolved_aspect_ratio: resolved,
        text_overlay: overlay.clone(),
        instruction,
    })
}
