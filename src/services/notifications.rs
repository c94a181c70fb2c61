use std::fmt;
use std::sync::Arc;

use lazy_static::lazy_static;
use serde::Serialize;
use tera::{Context, Tera};
use thiserror::Error;

use crate::domain::{
    Attachment, ClientSubmission, NotificationMessage, PaymentNotice, StoredFileName,
    deliverable_recipient,
};
use crate::dto::{PaymentEmailDto, UploadEmailDto};
use crate::mail::{MailError, Mailer, is_valid_content_type};
use crate::models::config::ServerConfig;
use crate::multipart::DecodedFile;
use crate::services::{ServiceError, ServiceResult};

const DEFAULT_ATTACHMENT_TYPE: &str = "application/octet-stream";

lazy_static! {
    static ref EMAIL_TEMPLATES: Tera = {
        let mut tera = Tera::default();
        let templates = vec![
            (
                "email/operator_upload.txt",
                include_str!("../../templates/email/operator_upload.txt"),
            ),
            (
                "email/submitter_upload.txt",
                include_str!("../../templates/email/submitter_upload.txt"),
            ),
            (
                "email/operator_payment.txt",
                include_str!("../../templates/email/operator_payment.txt"),
            ),
            (
                "email/customer_payment.txt",
                include_str!("../../templates/email/customer_payment.txt"),
            ),
        ];
        if let Err(e) = tera.add_raw_templates(templates) {
            log::error!("Parsing error(s): {}", e);
            ::std::process::exit(1);
        }
        tera
    };
}

/// Declared content type of `file` when the mail transport accepts it.
fn attachment_type(file: &DecodedFile) -> String {
    match file.content_type.as_deref() {
        Some(declared) if is_valid_content_type(declared) => declared.to_string(),
        Some(declared) => {
            log::warn!(
                "Sending `{}` as {DEFAULT_ATTACHMENT_TYPE}: invalid content type `{declared}`",
                file.file_name
            );
            DEFAULT_ATTACHMENT_TYPE.to_string()
        }
        None => DEFAULT_ATTACHMENT_TYPE.to_string(),
    }
}

fn render<T: Serialize>(template: &str, dto: &T) -> ServiceResult<String> {
    let context = Context::from_serialize(dto)?;
    Ok(EMAIL_TEMPLATES.render(template, &context)?)
}

/// Delivery state of one message of a pair.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Skipped,
    Failed,
    NotAttempted,
}

/// Per-recipient outcome of [`NotificationDispatcher::dispatch`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct DispatchReport {
    pub operator: DeliveryStatus,
    pub submitter: DeliveryStatus,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Recipient {
    Operator,
    Submitter,
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recipient::Operator => f.write_str("operator"),
            Recipient::Submitter => f.write_str("submitter"),
        }
    }
}

/// A failed send, with what had already gone out.
#[derive(Debug, Error)]
#[error("{recipient} notification failed: {source}")]
pub struct DispatchError {
    pub recipient: Recipient,
    pub report: DispatchReport,
    #[source]
    pub source: MailError,
}

/// The operator message and the optional confirmation for the submitter.
#[derive(Clone, Debug)]
pub struct Notifications {
    pub operator: NotificationMessage,
    pub submitter: Option<NotificationMessage>,
}

/// Composes and sends the operator/submitter email pair.
pub struct NotificationDispatcher {
    mailer: Arc<dyn Mailer>,
    sender: String,
    operator_email: String,
    placeholder_domains: Vec<String>,
    upload_url: String,
}

impl NotificationDispatcher {
    pub fn new(config: &ServerConfig, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            mailer,
            sender: config.mail.from.clone(),
            operator_email: config.operator_email.clone(),
            placeholder_domains: config.placeholder_domains.clone(),
            upload_url: format!(
                "{}?success=true",
                config.allowed_origin.trim_end_matches('/')
            ),
        }
    }

    pub fn operator_email(&self) -> &str {
        &self.operator_email
    }

    fn message(&self, to: &str, subject: String, body_text: String) -> NotificationMessage {
        NotificationMessage {
            from: self.sender.clone(),
            to: to.to_string(),
            subject,
            body_text,
            attachments: Vec::new(),
        }
    }

    /// Confirmation for `address`, or `None` when the address must not be mailed.
    fn confirmation(
        &self,
        address: &str,
        subject: &str,
        body_text: String,
    ) -> Option<NotificationMessage> {
        match deliverable_recipient(address, &self.placeholder_domains) {
            Ok(to) => Some(self.message(to, subject.to_string(), body_text)),
            Err(reason) => {
                log::info!("Skipping confirmation email to `{address}`: {reason}");
                None
            }
        }
    }

    /// Operator notification carrying every file, plus the client confirmation.
    pub fn compose_upload(
        &self,
        submission: &ClientSubmission,
        files: &[DecodedFile],
    ) -> ServiceResult<Notifications> {
        let attachments = files
            .iter()
            .map(|file| {
                let filename = StoredFileName::try_new(submission.id, &file.file_name)
                    .map_err(|_| ServiceError::InvalidFileName(file.file_name.clone()))?;
                Ok(Attachment {
                    filename: filename.into_string(),
                    content_type: attachment_type(file),
                    bytes: file.bytes.clone(),
                })
            })
            .collect::<ServiceResult<Vec<_>>>()?;

        let dto = UploadEmailDto::from(submission);
        let mut operator = self.message(
            &self.operator_email,
            format!("🔥 Nouveau client audit ROI - {}", submission.company),
            render("email/operator_upload.txt", &dto)?,
        );
        operator.attachments = attachments;

        let submitter = self.confirmation(
            &submission.email,
            "📊 Fichiers reçus - Votre audit ROI en cours",
            render("email/submitter_upload.txt", &dto)?,
        );

        Ok(Notifications {
            operator,
            submitter,
        })
    }

    /// Internal payment notice plus the customer's CSV export guide.
    pub fn compose_payment(&self, notice: &PaymentNotice) -> ServiceResult<Notifications> {
        let dto = PaymentEmailDto::new(notice, self.upload_url.clone(), &self.operator_email);

        let operator = self.message(
            &self.operator_email,
            format!("💰 Nouveau paiement - {}", dto.amount),
            render("email/operator_payment.txt", &dto)?,
        );
        let submitter = self.confirmation(
            &notice.customer_email,
            "🎉 Paiement confirmé - Vos guides d'export CSV",
            render("email/customer_payment.txt", &dto)?,
        );

        Ok(Notifications {
            operator,
            submitter,
        })
    }

    /// Send the operator message, then the confirmation. Stops at the first
    /// failure; messages already sent are not recalled.
    pub async fn dispatch(
        &self,
        notifications: Notifications,
    ) -> Result<DispatchReport, DispatchError> {
        let mut report = DispatchReport {
            operator: DeliveryStatus::NotAttempted,
            submitter: if notifications.submitter.is_some() {
                DeliveryStatus::NotAttempted
            } else {
                DeliveryStatus::Skipped
            },
        };

        if let Err(source) = self.mailer.send(&notifications.operator).await {
            report.operator = DeliveryStatus::Failed;
            log::error!("Operator notification failed: {source}");
            return Err(DispatchError {
                recipient: Recipient::Operator,
                report,
                source,
            });
        }
        report.operator = DeliveryStatus::Sent;

        if let Some(message) = &notifications.submitter {
            if let Err(source) = self.mailer.send(message).await {
                report.submitter = DeliveryStatus::Failed;
                log::error!(
                    "Confirmation to {} failed after the operator was notified: {source}",
                    message.to
                );
                return Err(DispatchError {
                    recipient: Recipient::Submitter,
                    report,
                    source,
                });
            }
            report.submitter = DeliveryStatus::Sent;
        }

        Ok(report)
    }
}
