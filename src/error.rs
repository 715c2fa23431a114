use thiserror::Error;

/// Rejected input, raised before anything is encoded or sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Vui lòng tải lên cả hai ảnh và nhập mô tả.")]
    FusionIncomplete,
    #[error("Vui lòng tải lên ảnh và nhập mô tả.")]
    SingleEditIncomplete,
    #[error("Vui lòng tải lên ảnh chân dung.")]
    BrandingMissingImage,
    #[error("Vui lòng nhập tỷ lệ khung hình tùy chỉnh hợp lệ (lớn hơn 0).")]
    InvalidAspectRatio { width: i64, height: i64 },
    #[error("Vui lòng nhập nội dung cho lớp phủ văn bản.")]
    EmptyOverlayText,
    #[error("Tệp \"{mime_type}\" không phải là ảnh.")]
    NotAnImage { mime_type: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("không thể đọc tệp ảnh: {0}")]
    Read(String),
    #[error("tệp ảnh rỗng")]
    Empty,
    #[error("dữ liệu ảnh không hợp lệ: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("API_KEY chưa được thiết lập trong biến môi trường.")]
    Unavailable,
    #[error("gemini request failed: {0}")]
    Transport(String),
    #[error("gemini error: HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("AI không thể tạo ảnh. Phản hồi từ AI: \"{0}\"")]
    TextOnly(String),
    #[error("yêu cầu bị từ chối: {0}")]
    Blocked(String),
    #[error("Không thể tạo ảnh. Vui lòng thử lại với một mô tả khác.")]
    Empty,
}

/// Durable history failures. Always recovered locally.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage serialization: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("storage database: {0}")]
    Database(#[from] sqlx::Error),
}

/// Everything that can end one generation cycle without a result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("một yêu cầu tạo ảnh khác đang được xử lý")]
    Busy,
    #[error("yêu cầu tạo ảnh đã bị hủy trước khi hoàn tất")]
    Abandoned,
}

impl GenerateError {
    /// Text shown to the user for this failure.
    pub fn user_message(&self) -> String {
        match self {
            GenerateError::Validation(e) => e.to_string(),
            GenerateError::Busy | GenerateError::Abandoned => self.to_string(),
            GenerateError::Service(ServiceError::Empty) => ServiceError::Empty.to_string(),
            other => format!("Đã xảy ra lỗi: {other}"),
        }
    }
}
