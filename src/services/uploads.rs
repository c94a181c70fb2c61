use std::sync::Arc;

use crate::domain::SubmissionId;
use crate::forms::upload::UploadForm;
use crate::models::config::UploadConfig;
use crate::multipart::{self, Body, DecodedFile};
use crate::services::notifications::{DispatchReport, NotificationDispatcher};
use crate::services::{ServiceError, ServiceResult};

/// Result of a processed upload.
#[derive(Clone, Debug)]
pub struct UploadOutcome {
    pub submission_id: SubmissionId,
    pub files_processed: usize,
    pub delivery: DispatchReport,
}

/// Decodes an upload form, admits its files and relays them by email.
pub struct UploadService {
    dispatcher: Arc<NotificationDispatcher>,
    limits: UploadConfig,
}

impl UploadService {
    pub fn new(dispatcher: Arc<NotificationDispatcher>, limits: UploadConfig) -> Self {
        Self { dispatcher, limits }
    }

    /// Reject the whole request if any file breaks a limit; files are never
    /// dropped individually.
    fn admit(&self, files: &[DecodedFile]) -> ServiceResult<()> {
        if files.len() > self.limits.max_files {
            return Err(ServiceError::TooManyFiles {
                count: files.len(),
                max: self.limits.max_files,
            });
        }

        for file in files {
            if file.size() > self.limits.max_file_size {
                return Err(ServiceError::FileTooLarge {
                    name: file.file_name.clone(),
                    size: file.size(),
                    max: self.limits.max_file_size,
                });
            }

            if self.limits.allowed_content_types.is_empty() {
                continue;
            }
            let content_type = file.content_type.as_deref().unwrap_or_default();
            let allowed = self
                .limits
                .allowed_content_types
                .iter()
                .any(|pattern| content_type.contains(pattern.as_str()));
            if !allowed {
                return Err(ServiceError::UnsupportedContentType {
                    name: file.file_name.clone(),
                    content_type: content_type.to_string(),
                });
            }
        }

        Ok(())
    }

    pub async fn process(
        &self,
        content_type: &str,
        body: Body<'_>,
    ) -> ServiceResult<UploadOutcome> {
        let form = multipart::decode(content_type, body)?;
        log::info!(
            "Upload received: {} field(s), files: {:?}",
            form.field_count(),
            form.files().iter().map(|f| &f.file_name).collect::<Vec<_>>()
        );

        self.admit(form.files())?;

        let submission = UploadForm::from(&form).into_submission(form.files());
        let notifications = self.dispatcher.compose_upload(&submission, form.files())?;
        let delivery = self.dispatcher.dispatch(notifications).await?;

        log::info!(
            "Upload successful: client {} <{}>, {} file(s)",
            submission.id,
            submission.email,
            submission.files.len()
        );

        Ok(UploadOutcome {
            submission_id: submission.id,
            files_processed: submission.files.len(),
            delivery,
        })
    }
}
