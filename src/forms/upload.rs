use chrono::Utc;

use crate::domain::{ClientSubmission, FileDescriptor, NOT_PROVIDED, SubmissionId};
use crate::multipart::{DecodedFile, DecodedForm};

/// Form field names posted by the upload page.
pub mod field {
    pub const NAME: &str = "clientName";
    pub const EMAIL: &str = "clientEmail";
    pub const COMPANY: &str = "clientCompany";
    pub const PHONE: &str = "clientPhone";
    pub const MONTHLY_BUDGET: &str = "monthlyBudget";
    pub const NOTES: &str = "additionalNotes";
}

/// Client details posted alongside the CSV files.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadForm {
    pub name: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub monthly_budget: Option<String>,
    pub notes: Option<String>,
}

impl From<&DecodedForm> for UploadForm {
    fn from(form: &DecodedForm) -> Self {
        let get = |name: &str| form.field(name).map(str::to_string);
        Self {
            name: get(field::NAME),
            email: get(field::EMAIL),
            company: get(field::COMPANY),
            phone: get(field::PHONE),
            monthly_budget: get(field::MONTHLY_BUDGET),
            notes: get(field::NOTES),
        }
    }
}

impl UploadForm {
    /// Build the submission record, substituting defaults for absent fields.
    pub fn into_submission(self, files: &[DecodedFile]) -> ClientSubmission {
        let or_placeholder = |value: Option<String>| value.unwrap_or_else(|| NOT_PROVIDED.into());

        ClientSubmission {
            id: SubmissionId::generate(),
            name: or_placeholder(self.name),
            email: self.email.unwrap_or_default(),
            company: or_placeholder(self.company),
            phone: or_placeholder(self.phone),
            monthly_budget: or_placeholder(self.monthly_budget),
            notes: self.notes.unwrap_or_default(),
            submitted_at: Utc::now(),
            files: files
                .iter()
                .map(|file| FileDescriptor {
                    original_name: file.file_name.clone(),
                    size: file.size(),
                    content_type: file.content_type.clone(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multipart::{Body, MultipartDecoder};

    fn form(body: &str) -> DecodedForm {
        MultipartDecoder::new("B")
            .decode(Body::raw(body.as_bytes()))
            .unwrap()
    }

    #[test]
    fn maps_known_fields() {
        let decoded = form(concat!(
            "--B\r\nContent-Disposition: form-data; name=\"clientName\"\r\n\r\nAlice\r\n",
            "--B\r\nContent-Disposition: form-data; name=\"clientEmail\"\r\n\r\nalice@shop.fr\r\n",
            "--B\r\nContent-Disposition: form-data; name=\"clientCompany\"\r\n\r\nShop\r\n",
            "--B\r\nContent-Disposition: form-data; name=\"monthlyBudget\"\r\n\r\n5000\r\n",
            "--B\r\nContent-Disposition: form-data; name=\"additionalNotes\"\r\n\r\nUrgent\r\n",
            "--B\r\nContent-Disposition: form-data; name=\"csv\"; filename=\"ads.csv\"\r\n",
            "Content-Type: text/csv\r\n\r\nx,y\r\n",
            "--B--"
        ));
        let submission = UploadForm::from(&decoded).into_submission(decoded.files());

        assert_eq!(submission.name, "Alice");
        assert_eq!(submission.email, "alice@shop.fr");
        assert_eq!(submission.company, "Shop");
        assert_eq!(submission.phone, NOT_PROVIDED);
        assert_eq!(submission.monthly_budget, "5000");
        assert_eq!(submission.notes, "Urgent");
        assert_eq!(
            submission.files,
            vec![FileDescriptor {
                original_name: "ads.csv".into(),
                size: 3,
                content_type: Some("text/csv".into()),
            }]
        );
    }

    #[test]
    fn absent_fields_get_defaults() {
        let submission = UploadForm::default().into_submission(&[]);

        assert_eq!(submission.name, NOT_PROVIDED);
        assert_eq!(submission.company, NOT_PROVIDED);
        assert_eq!(submission.phone, NOT_PROVIDED);
        assert_eq!(submission.monthly_budget, NOT_PROVIDED);
        assert_eq!(submission.email, "");
        assert_eq!(submission.notes, "");
        assert!(submission.files.is_empty());
    }

    #[test]
    fn every_submission_gets_a_fresh_id() {
        let a = UploadForm::default().into_submission(&[]);
        let b = UploadForm::default().into_submission(&[]);
        assert_ne!(a.id, b.id);
    }
}
