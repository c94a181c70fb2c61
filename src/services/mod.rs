//! Application services orchestrating decoding, notifications and side effects.
pub mod notifications;
pub mod uploads;
pub mod webhooks;

use crate::multipart::MultipartError;
use crate::services::notifications::DispatchError;

/// Convenience alias for service results.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors surfaced by service operations.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Decode(#[from] MultipartError),
    #[error("too many files: {count} exceeds limit of {max}")]
    TooManyFiles { count: usize, max: usize },
    #[error("file `{name}` is too large: {size} bytes exceeds limit of {max}")]
    FileTooLarge { name: String, size: usize, max: usize },
    #[error("file `{name}` has unsupported content type `{content_type}`")]
    UnsupportedContentType { name: String, content_type: String },
    #[error("invalid file name `{0}`")]
    InvalidFileName(String),
    #[error("failed to render email template: {0}")]
    Template(#[from] tera::Error),
    #[error("unexpected event object: {0}")]
    EventObject(#[from] serde_json::Error),
    #[error(transparent)]
    Delivery(#[from] DispatchError),
}
