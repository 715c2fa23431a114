use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use serde::{Deserialize, Serialize};

use crate::encoder::EncodedImage;
use crate::error::ServiceError;

pub const RESULT_MIME_TYPE: &str = "image/png";

/// An encoded source image and the caption sent just before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionedImage {
    pub caption: String,
    pub image: EncodedImage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRequest {
    pub images: Vec<CaptionedImage>,
    pub instruction_text: String,
}

/// Image returned by the generation service, kept as base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImage {
    pub data: String,
    pub mime_type: String,
}

impl GeneratedImage {
    pub fn png(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: RESULT_MIME_TYPE.to_string(),
        }
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        B64.decode(self.data.as_bytes())
    }
}

/// Remote image generator. One call is one atomic request.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(&self, request: ServiceRequest) -> Result<GeneratedImage, ServiceError>;
}
