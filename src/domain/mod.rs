//! Strongly-typed domain structures for submissions and notifications.
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Placeholder used for submission fields the client left empty.
pub const NOT_PROVIDED: &str = "Non renseigné";

/// Identifier of a single upload submission.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
pub struct SubmissionId(Uuid);

impl SubmissionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Metadata kept on the submission for every received file.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FileDescriptor {
    pub original_name: String,
    pub size: usize,
    pub content_type: Option<String>,
}

/// Normalized client upload. Built once per request and never mutated.
#[derive(Clone, Debug, Serialize)]
pub struct ClientSubmission {
    pub id: SubmissionId,
    pub name: String,
    pub email: String,
    pub company: String,
    pub phone: String,
    pub monthly_budget: String,
    pub notes: String,
    pub submitted_at: DateTime<Utc>,
    pub files: Vec<FileDescriptor>,
}

/// Attachment file name made unique per submission: `<id>_<original>`.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct StoredFileName(String);

impl StoredFileName {
    pub fn try_new(id: SubmissionId, original: &str) -> Result<Self, TypeConstraintError> {
        // Browsers on Windows may send full paths.
        let base = original.rsplit(['/', '\\']).next().unwrap_or("").trim();
        if base.is_empty() || base == "." || base == ".." || base.contains('\0') {
            return Err(TypeConstraintError::InvalidFileName);
        }
        Ok(Self(format!("{id}_{base}")))
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Outbound attachment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// A single email handed to the mail transport.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NotificationMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body_text: String,
    pub attachments: Vec<Attachment>,
}

/// Why a confirmation email was not sent.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingAddress,
    NoAtSign,
    PlaceholderDomain(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingAddress => f.write_str("no address provided"),
            SkipReason::NoAtSign => f.write_str("address has no `@`"),
            SkipReason::PlaceholderDomain(domain) => write!(f, "placeholder domain `{domain}`"),
        }
    }
}

/// Check whether `address` may receive a confirmation email.
pub fn deliverable_recipient<'a>(
    address: &'a str,
    placeholder_domains: &[String],
) -> Result<&'a str, SkipReason> {
    let address = address.trim();
    if address.is_empty() {
        return Err(SkipReason::MissingAddress);
    }
    let Some((_, domain)) = address.rsplit_once('@') else {
        return Err(SkipReason::NoAtSign);
    };

    let domain = domain.to_ascii_lowercase();
    let placeholder = placeholder_domains.iter().find(|candidate| {
        let candidate = candidate.to_ascii_lowercase();
        domain == candidate || domain.ends_with(&format!(".{candidate}"))
    });
    match placeholder {
        Some(candidate) => Err(SkipReason::PlaceholderDomain(candidate.clone())),
        None => Ok(address),
    }
}

/// File size in kilobytes with one decimal, e.g. `1.5`.
pub fn format_kilobytes(size: usize) -> String {
    format!("{:.1}", size as f64 / 1024.0)
}

/// Source object of a payment event.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    PaymentIntent,
    CheckoutSession,
}

/// Submission-like view of a successful payment.
#[derive(Clone, Debug, Serialize)]
pub struct PaymentNotice {
    pub kind: PaymentKind,
    pub transaction_id: String,
    /// Amount in the currency's minor unit (cents).
    pub amount_minor: i64,
    pub currency: String,
    pub customer_email: String,
    pub received_at: DateTime<Utc>,
}

impl PaymentNotice {
    /// Human amount, e.g. `49.00€` or `12.50 USD`.
    pub fn amount_display(&self) -> String {
        let amount = self.amount_minor as f64 / 100.0;
        if self.currency.eq_ignore_ascii_case("eur") {
            format!("{amount:.2}€")
        } else {
            format!("{amount:.2} {}", self.currency.to_ascii_uppercase())
        }
    }
}

#[derive(Debug, Error)]
pub enum TypeConstraintError {
    #[error("invalid file name")]
    InvalidFileName,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placeholders() -> Vec<String> {
        vec!["example.com".to_string()]
    }

    #[test]
    fn stored_file_name_is_prefixed_and_stripped_of_paths() {
        let id = SubmissionId::generate();

        let name = StoredFileName::try_new(id, "data.csv").unwrap();
        assert_eq!(name.into_string(), format!("{id}_data.csv"));

        let name = StoredFileName::try_new(id, "C:\\Users\\me\\ads.csv").unwrap();
        assert_eq!(name.into_string(), format!("{id}_ads.csv"));
    }

    #[test]
    fn stored_file_name_rejects_empty_and_parent() {
        let id = SubmissionId::generate();
        assert!(StoredFileName::try_new(id, "").is_err());
        assert!(StoredFileName::try_new(id, "dir/..").is_err());
    }

    #[test]
    fn recipient_rules() {
        let domains = placeholders();
        assert_eq!(
            deliverable_recipient("client@shop.fr", &domains),
            Ok("client@shop.fr")
        );
        assert_eq!(
            deliverable_recipient("  ", &domains),
            Err(SkipReason::MissingAddress)
        );
        assert_eq!(
            deliverable_recipient("client.shop.fr", &domains),
            Err(SkipReason::NoAtSign)
        );
        assert_eq!(
            deliverable_recipient("noreply@Example.com", &domains),
            Err(SkipReason::PlaceholderDomain("example.com".into()))
        );
        assert!(deliverable_recipient("a@mail.example.com", &domains).is_err());
        assert!(deliverable_recipient("a@notexample.com", &domains).is_ok());
    }

    #[test]
    fn kilobytes_have_one_decimal() {
        assert_eq!(format_kilobytes(7), "0.0");
        assert_eq!(format_kilobytes(1536), "1.5");
        assert_eq!(format_kilobytes(10 * 1024 * 1024), "10240.0");
    }

    #[test]
    fn payment_amount_display() {
        let mut notice = PaymentNotice {
            kind: PaymentKind::PaymentIntent,
            transaction_id: "pi_1".into(),
            amount_minor: 4900,
            currency: "eur".into(),
            customer_email: "a@b.fr".into(),
            received_at: Utc::now(),
        };
        assert_eq!(notice.amount_display(), "49.00€");

        notice.currency = "usd".into();
        notice.amount_minor = 1250;
        assert_eq!(notice.amount_display(), "12.50 USD");
    }
}
