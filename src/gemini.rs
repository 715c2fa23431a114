use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::ServiceError;
use crate::service::{GeneratedImage, GenerationService, ServiceRequest, RESULT_MIME_TYPE};
use crate::settings::Settings;

static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(reqwest::Client::new);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineDataRequest {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum PartRequest {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Inline {
        inline_data: InlineDataRequest,
    },
}

#[derive(Debug, Serialize)]
struct ContentRequest {
    role: &'static str,
    parts: Vec<PartRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfigRequest {
    response_modalities: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestBody {
    contents: Vec<ContentRequest>,
    generation_config: GenerationConfigRequest,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineDataResponse {
    pub mime_type: Option<String>,
    pub data: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartResponse {
    pub text: Option<String>,
    #[serde(alias = "inline_data")]
    pub inline_data: Option<InlineDataResponse>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ContentResponse {
    pub parts: Option<Vec<PartResponse>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<ContentResponse>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseBody {
    pub candidates: Option<Vec<Candidate>>,
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

pub struct GeminiClient {
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            api_key: settings.resolve_api_key(),
            base_url: settings.gemini_base_url(),
            model: settings.gemini_model(),
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

fn build_body(request: ServiceRequest) -> RequestBody {
    let mut parts = Vec::with_capacity(request.images.len() * 2 + 1);
    for captioned in request.images {
        parts.push(PartRequest::Text {
            text: captioned.caption,
        });
        parts.push(PartRequest::Inline {
            inline_data: InlineDataRequest {
                mime_type: captioned.image.mime_type,
                data: captioned.image.data,
            },
        });
    }
    parts.push(PartRequest::Text {
        text: request.instruction_text,
    });
    RequestBody {
        contents: vec![ContentRequest {
            role: "user",
            parts,
        }],
        generation_config: GenerationConfigRequest {
            response_modalities: vec!["IMAGE", "TEXT"],
        },
    }
}

/// Picks the first inline image of the first candidate. A reply made only of
/// text is a failure carrying that text.
pub fn interpret_response(body: ResponseBody) -> Result<GeneratedImage, ServiceError> {
    let candidate = body.candidates.and_then(|c| c.into_iter().next());
    let mut text = String::new();
    if let Some(parts) = candidate
        .as_ref()
        .and_then(|c| c.content.as_ref())
        .and_then(|c| c.parts.as_ref())
    {
        for part in parts {
            if let Some(inline) = &part.inline_data {
                if let Some(data) = inline.data.as_deref().filter(|d| !d.is_empty()) {
                    return Ok(GeneratedImage {
                        data: data.to_string(),
                        mime_type: inline
                            .mime_type
                            .clone()
                            .unwrap_or_else(|| RESULT_MIME_TYPE.to_string()),
                    });
                }
            }
            if let Some(t) = &part.text {
                text.push_str(t);
            }
        }
    }

    if !text.trim().is_empty() {
        warn!(text = %text, "model returned text instead of an image");
        return Err(ServiceError::TextOnly(text));
    }
    if let Some(reason) = body.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ServiceError::Blocked(reason));
    }
    if let Some(reason) = candidate.and_then(|c| c.finish_reason) {
        if reason != "STOP" && reason != "MAX_TOKENS" {
            return Err(ServiceError::Blocked(reason));
        }
    }
    Err(ServiceError::Empty)
}

#[async_trait]
impl GenerationService for GeminiClient {
    #[instrument(skip_all, fields(model = %self.model, images = request.images.len()))]
    async fn generate(&self, request: ServiceRequest) -> Result<GeneratedImage, ServiceError> {
        let api_key = self.api_key.as_deref().ok_or(ServiceError::Unavailable)?;
        let body = build_body(request);

        let resp = HTTP_CLIENT
            .post(self.endpoint())
            .header("X-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        debug!(status = %status, len = text.len(), "gemini responded");

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .map(|b| b.error.message)
                .unwrap_or(text);
            return Err(ServiceError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let value: ResponseBody = serde_json::from_str(&text)
            .map_err(|e| ServiceError::Transport(format!("gemini parse error: {e}")))?;
        interpret_response(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::EncodedImage;
    use crate::service::CaptionedImage;

    fn parse(json: serde_json::Value) -> ResponseBody {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn picks_first_inline_image() {
        let body = parse(serde_json::json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "here you go" },
                    { "inlineData": { "mimeType": "image/png", "data": "AAAA" } }
                ]}
            }]
        }));
        assert_eq!(interpret_response(body), Ok(GeneratedImage::png("AAAA")));
    }

    #[test]
    fn text_only_reply_is_a_failure_with_that_text() {
        let body = parse(serde_json::json!({
            "candidates": [{ "content": { "parts": [ { "text": "Tôi không thể làm điều đó." } ] } }]
        }));
        let err = interpret_response(body).unwrap_err();
        assert_eq!(err, ServiceError::TextOnly("Tôi không thể làm điều đó.".into()));
        assert!(err.to_string().contains("Tôi không thể làm điều đó."));
    }

    #[test]
    fn blocked_and_empty_replies() {
        let body = parse(serde_json::json!({ "promptFeedback": { "blockReason": "SAFETY" } }));
        assert_eq!(
            interpret_response(body),
            Err(ServiceError::Blocked("SAFETY".into()))
        );
        assert_eq!(
            interpret_response(ResponseBody::default()),
            Err(ServiceError::Empty)
        );
    }

    #[test]
    fn body_interleaves_captions_and_images() {
        let body = build_body(ServiceRequest {
            images: vec![CaptionedImage {
                caption: "Ảnh gốc:".into(),
                image: EncodedImage {
                    data: "QQ==".into(),
                    mime_type: "image/jpeg".into(),
                },
            }],
            instruction_text: "do it".into(),
        });
        let value = serde_json::to_value(&body).unwrap();
        let parts = &value["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], "Ảnh gốc:");
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[2]["text"], "do it");
        assert_eq!(
            value["generationConfig"]["responseModalities"],
            serde_json::json!(["IMAGE", "TEXT"])
        );
    }

    #[tokio::test]
    async fn missing_key_is_unavailable() {
        let client = GeminiClient {
            api_key: None,
            base_url: "http://localhost".into(),
            model: "m".into(),
        };
        let err = client
            .generate(ServiceRequest {
                images: Vec::new(),
                instruction_text: String::new(),
            })
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::Unavailable);
    }
}
