use serde::Serialize;

use crate::domain::{ClientSubmission, FileDescriptor, PaymentKind, PaymentNotice, format_kilobytes};
use crate::services::notifications::DispatchReport;

const DATE_FORMAT: &str = "%d/%m/%Y %H:%M:%S UTC";

/// Serializable file line for template rendering.
#[derive(Clone, Debug, Serialize)]
pub struct FileLineDto {
    pub name: String,
    pub size_kb: String,
}

impl From<&FileDescriptor> for FileLineDto {
    fn from(file: &FileDescriptor) -> Self {
        Self {
            name: file.original_name.clone(),
            size_kb: format_kilobytes(file.size),
        }
    }
}

/// Context of both upload emails.
#[derive(Clone, Debug, Serialize)]
pub struct UploadEmailDto<'a> {
    pub client: &'a ClientSubmission,
    pub files: Vec<FileLineDto>,
    pub received_at: String,
}

impl<'a> From<&'a ClientSubmission> for UploadEmailDto<'a> {
    fn from(client: &'a ClientSubmission) -> Self {
        Self {
            client,
            files: client.files.iter().map(FileLineDto::from).collect(),
            received_at: client.submitted_at.format(DATE_FORMAT).to_string(),
        }
    }
}

/// Context of both payment emails.
#[derive(Clone, Debug, Serialize)]
pub struct PaymentEmailDto<'a> {
    pub kind: PaymentKind,
    pub amount: String,
    pub transaction_id: &'a str,
    pub customer_email: &'a str,
    pub received_at: String,
    pub upload_url: String,
    pub operator_email: &'a str,
}

impl<'a> PaymentEmailDto<'a> {
    pub fn new(notice: &'a PaymentNotice, upload_url: String, operator_email: &'a str) -> Self {
        Self {
            kind: notice.kind,
            amount: notice.amount_display(),
            transaction_id: &notice.transaction_id,
            customer_email: &notice.customer_email,
            received_at: notice.received_at.format(DATE_FORMAT).to_string(),
            upload_url,
            operator_email,
        }
    }
}

/// Body of a successful upload response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponseDto {
    pub success: bool,
    pub message: &'static str,
    pub client_id: String,
    pub files_processed: usize,
}

/// Body of an accepted webhook.
#[derive(Debug, Serialize)]
pub struct WebhookResponseDto {
    pub received: bool,
    #[serde(rename = "type")]
    pub event_type: String,
}

/// Uniform error body of both endpoints.
#[derive(Debug, Serialize)]
pub struct ErrorResponseDto {
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Present when some notification was already delivered before the failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery: Option<DispatchReport>,
}

impl ErrorResponseDto {
    pub fn new(error: &'static str) -> Self {
        Self {
            error,
            details: None,
            delivery: None,
        }
    }

    pub fn with_details(error: &'static str, details: impl Into<String>) -> Self {
        Self {
            error,
            details: Some(details.into()),
            delivery: None,
        }
    }
}
