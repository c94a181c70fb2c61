//! Outbound mail transport.
use async_trait::async_trait;
use lettre::address::AddressError;
use lettre::message::header::ContentType;
use lettre::message::{Attachment as MailAttachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use thiserror::Error;

use crate::domain::NotificationMessage;
use crate::models::config::MailConfig;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid mailbox `{address}`")]
    Address {
        address: String,
        #[source]
        source: AddressError,
    },
    #[error("invalid attachment content type `{0}`")]
    ContentType(String),
    #[error("failed to build message")]
    Build(#[from] lettre::error::Error),
    #[error("smtp delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("mail transport unavailable: {0}")]
    Unavailable(String),
}

/// Delivers a single message; each message is sent at most once.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &NotificationMessage) -> Result<(), MailError>;
}

/// SMTP relay with implicit TLS, credentials from [`MailConfig`].
#[derive(Clone)]
pub struct SmtpMailer {
    transport: SmtpTransport,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Result<Self, MailError> {
        let transport = SmtpTransport::relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();
        Ok(Self { transport })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: &NotificationMessage) -> Result<(), MailError> {
        let email = build_message(message)?;
        let transport = self.transport.clone();

        actix_web::web::block(move || transport.send(&email))
            .await
            .map_err(|err| MailError::Unavailable(err.to_string()))??;

        log::info!("Email sent to {}: {}", message.to, message.subject);
        Ok(())
    }
}

fn mailbox(address: &str) -> Result<Mailbox, MailError> {
    address.parse().map_err(|source| MailError::Address {
        address: address.to_string(),
        source,
    })
}

/// Whether `value` parses as a MIME content type.
pub fn is_valid_content_type(value: &str) -> bool {
    ContentType::parse(value).is_ok()
}

/// Render a [`NotificationMessage`] as a MIME message.
pub fn build_message(message: &NotificationMessage) -> Result<Message, MailError> {
    let builder = Message::builder()
        .from(mailbox(&message.from)?)
        .to(mailbox(&message.to)?)
        .subject(message.subject.clone());

    if message.attachments.is_empty() {
        return Ok(builder
            .header(ContentType::TEXT_PLAIN)
            .body(message.body_text.clone())?);
    }

    let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(message.body_text.clone()));
    for attachment in &message.attachments {
        let content_type = ContentType::parse(&attachment.content_type)
            .map_err(|_| MailError::ContentType(attachment.content_type.clone()))?;
        parts = parts.singlepart(
            MailAttachment::new(attachment.filename.clone())
                .body(attachment.bytes.clone(), content_type),
        );
    }
    Ok(builder.multipart(parts)?)
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Records messages instead of sending them; can fail for one recipient.
    #[derive(Default)]
    pub struct MemoryMailer {
        sent: Mutex<Vec<NotificationMessage>>,
        fail_for: Option<String>,
    }

    impl MemoryMailer {
        pub fn failing_for(recipient: &str) -> Self {
            Self {
                sent: Mutex::default(),
                fail_for: Some(recipient.to_string()),
            }
        }

        pub fn sent(&self) -> Vec<NotificationMessage> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Mailer for MemoryMailer {
        async fn send(&self, message: &NotificationMessage) -> Result<(), MailError> {
            if self.fail_for.as_deref() == Some(message.to.as_str()) {
                return Err(MailError::Unavailable(format!(
                    "connection refused for {}",
                    message.to
                )));
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Attachment;

    fn message(attachments: Vec<Attachment>) -> NotificationMessage {
        NotificationMessage {
            from: "audit@yukibuy.com".into(),
            to: "client@shop.fr".into(),
            subject: "Fichiers reçus".into(),
            body_text: "Bonjour".into(),
            attachments,
        }
    }

    #[test]
    fn plain_message_without_attachments() {
        let email = build_message(&message(vec![])).unwrap();
        let raw = String::from_utf8(email.formatted()).unwrap();

        assert!(raw.contains("To: client@shop.fr"));
        assert!(raw.contains("Content-Type: text/plain"));
        assert!(!raw.contains("multipart/mixed"));
    }

    #[test]
    fn attachments_become_mixed_parts() {
        let email = build_message(&message(vec![Attachment {
            filename: "id_data.csv".into(),
            content_type: "text/csv".into(),
            bytes: b"a,b\n1,2".to_vec(),
        }]))
        .unwrap();
        let raw = String::from_utf8(email.formatted()).unwrap();

        assert!(raw.contains("multipart/mixed"));
        assert!(raw.contains("id_data.csv"));
    }

    #[test]
    fn invalid_addresses_and_content_types_are_rejected() {
        let mut bad_to = message(vec![]);
        bad_to.to = "not an address".into();
        assert!(matches!(
            build_message(&bad_to),
            Err(MailError::Address { .. })
        ));

        let bad_type = message(vec![Attachment {
            filename: "x".into(),
            content_type: "???".into(),
            bytes: vec![1],
        }]);
        assert!(matches!(
            build_message(&bad_type),
            Err(MailError::ContentType(_))
        ));
    }
}
