use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{EncodingError, ValidationError};

/// Where the bytes of an upload live until it is encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageContent {
    Bytes(Vec<u8>),
    /// Read lazily when the upload is encoded.
    File(PathBuf),
    /// A `data:<mime>;base64,<payload>` string or a bare base64 payload.
    DataUri(String),
}

/// A file handed over by the picker or drop zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub name: String,
    pub mime_type: String,
    pub content: ImageContent,
}

/// Transmittable form of an image: bare base64 plus its MIME type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedImage {
    pub data: String,
    pub mime_type: String,
}

impl UploadedImage {
    pub fn from_bytes(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            content: ImageContent::Bytes(bytes),
        }
    }

    /// Reads `path` and sniffs its MIME type from the leading bytes.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, EncodingError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| EncodingError::Read(format!("{}: {e}", path.display())))?;
        let mime_type = guess_mime_type(&bytes)
            .or_else(|| mime_from_extension(path))
            .unwrap_or("application/octet-stream");
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::from_bytes(name, mime_type, bytes))
    }

    /// Only `image/*` uploads are accepted by the drop zone.
    pub fn ensure_image(&self) -> Result<(), ValidationError> {
        if self.mime_type.starts_with("image/") {
            Ok(())
        } else {
            Err(ValidationError::NotAnImage {
                mime_type: self.mime_type.clone(),
            })
        }
    }
}

pub async fn encode(image: &UploadedImage) -> Result<EncodedImage, EncodingError> {
    let data = match &image.content {
        ImageContent::Bytes(bytes) => encode_bytes(bytes)?,
        ImageContent::File(path) => {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| EncodingError::Read(format!("{}: {e}", path.display())))?;
            encode_bytes(&bytes)?
        }
        ImageContent::DataUri(uri) => {
            let payload = strip_data_uri(uri).trim();
            if payload.is_empty() {
                return Err(EncodingError::Empty);
            }
            B64.decode(payload)
                .map_err(|e| EncodingError::Malformed(format!("base64 decode: {e}")))?;
            payload.to_string()
        }
    };
    debug!(name = %image.name, mime_type = %image.mime_type, len = data.len(), "encoded upload");
    Ok(EncodedImage {
        data,
        mime_type: image.mime_type.clone(),
    })
}

fn encode_bytes(bytes: &[u8]) -> Result<String, EncodingError> {
    if bytes.is_empty() {
        return Err(EncodingError::Empty);
    }
    Ok(B64.encode(bytes))
}

/// Drops everything up to and including the first comma of a data URI.
pub fn strip_data_uri(s: &str) -> &str {
    if s.starts_with("data:") {
        if let Some(idx) = s.find(',') {
            return &s[(idx + 1)..];
        }
    }
    s
}

pub fn guess_mime_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() >= 8 && bytes[0..8] == [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A] {
        return Some("image/png");
    }
    if bytes.len() >= 3 && bytes[0..3] == [0xFF, 0xD8, 0xFF] {
        return Some("image/jpeg");
    }
    // RIFF....WEBP
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    if bytes.len() >= 6 && (&bytes[0..6] == b"GIF87a" || &bytes[0..6] == b"GIF89a") {
        return Some("image/gif");
    }
    None
}

fn mime_from_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    #[tokio::test]
    async fn encodes_bytes_without_prefix() {
        let upload = UploadedImage::from_bytes("a.png", "image/png", b"hello".to_vec());
        let encoded = encode(&upload).await.unwrap();
        assert_eq!(encoded.data, "aGVsbG8=");
        assert_eq!(encoded.mime_type, "image/png");
    }

    #[tokio::test]
    async fn strips_data_uri_prefix() {
        let upload = UploadedImage {
            name: "clip".into(),
            mime_type: "image/png".into(),
            content: ImageContent::DataUri("data:image/png;base64,aGVsbG8=".into()),
        };
        assert_eq!(encode(&upload).await.unwrap().data, "aGVsbG8=");
    }

    #[tokio::test]
    async fn rejects_undecodable_data_uri() {
        let upload = UploadedImage {
            name: "clip".into(),
            mime_type: "image/png".into(),
            content: ImageContent::DataUri("data:image/png;base64,!!!".into()),
        };
        assert!(matches!(
            encode(&upload).await,
            Err(EncodingError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn empty_file_fails() {
        let upload = UploadedImage::from_bytes("a.png", "image/png", Vec::new());
        assert_eq!(encode(&upload).await, Err(EncodingError::Empty));
    }

    #[tokio::test]
    async fn missing_file_fails_with_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let upload = UploadedImage {
            name: "gone.png".into(),
            mime_type: "image/png".into(),
            content: ImageContent::File(dir.path().join("gone.png")),
        };
        assert!(matches!(encode(&upload).await, Err(EncodingError::Read(_))));
    }

    #[tokio::test]
    async fn from_path_sniffs_mime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.bin");
        let mut bytes = PNG_HEADER.to_vec();
        bytes.extend_from_slice(b"rest");
        std::fs::write(&path, &bytes).unwrap();

        let upload = UploadedImage::from_path(&path).await.unwrap();
        assert_eq!(upload.mime_type, "image/png");
        assert_eq!(upload.name, "photo.bin");
        assert!(upload.ensure_image().is_ok());
    }

    #[test]
    fn non_image_mime_is_rejected() {
        let upload = UploadedImage::from_bytes("notes.txt", "text/plain", b"x".to_vec());
        assert!(matches!(
            upload.ensure_image(),
            Err(ValidationError::NotAnImage { .. })
        ));
    }
}
