use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Field name to raw value, as received from the request body.
pub type RawFields = BTreeMap<String, String>;

/// The forms the site exposes. Each kind has its own schema and destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionKind {
    Contact,
    Enquiry,
}

impl SubmissionKind {
    pub fn label(self) -> &'static str {
        match self {
            SubmissionKind::Contact => "contact",
            SubmissionKind::Enquiry => "enquiry",
        }
    }
}

impl fmt::Display for SubmissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Validated form data for one request. Values are trimmed and ordered by the
/// schema the submission was validated against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    kind: SubmissionKind,
    fields: Vec<(String, String)>,
}

impl Submission {
    pub(crate) fn new(kind: SubmissionKind, fields: Vec<(String, String)>) -> Self {
        Self { kind, fields }
    }

    pub fn kind(&self) -> SubmissionKind {
        self.kind
    }

    /// Value of a schema column, or an empty string for absent optional fields.
    pub fn field(&self, name: &str) -> &str {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
            .unwrap_or("")
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn name(&self) -> &str {
        self.field("name")
    }

    pub fn email(&self) -> &str {
        self.field("email")
    }

    pub fn phone(&self) -> &str {
        self.field("phone")
    }

    pub fn context(&self) -> SubmissionContext {
        SubmissionContext {
            kind: self.kind,
            submitter_name: self.name().to_string(),
            submitter_email: self.email().to_string(),
        }
    }
}

/// Descriptive metadata attached to uploaded files for auditing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionContext {
    pub kind: SubmissionKind,
    pub submitter_name: String,
    pub submitter_email: String,
}

/// Row appended to the tabular store. Append-only once written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRecord {
    pub kind: SubmissionKind,
    pub values: Vec<String>,
    pub attachment_name: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl SubmissionRecord {
    pub fn new(
        submission: &Submission,
        attachment_name: Option<&str>,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: submission.kind(),
            values: submission
                .fields()
                .map(|(_, value)| value.to_string())
                .collect(),
            attachment_name: attachment_name.map(str::to_string),
            submitted_at,
        }
    }

    /// Flat cell values: schema columns, the stored attachment name when one
    /// exists, then the server timestamp.
    pub fn row(&self) -> Vec<String> {
        let mut row = self.values.clone();
        if let Some(name) = &self.attachment_name {
            row.push(name.clone());
        }
        row.push(self.timestamp());
        row
    }

    pub fn timestamp(&self) -> String {
        self.submitted_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// Acknowledgement from the record sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordReceipt {
    pub destination: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_range: Option<String>,
}

/// Stable, dereferenceable reference to an uploaded attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReference {
    pub id: String,
    pub link: String,
}

/// What happened to the attachment after the record was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentStatus {
    None,
    Uploaded(FileReference),
    UploadFailed,
}

impl AttachmentStatus {
    pub fn label(&self) -> &'static str {
        match self {
            AttachmentStatus::None => "none",
            AttachmentStatus::Uploaded(_) => "uploaded",
            AttachmentStatus::UploadFailed => "upload_failed",
        }
    }

    pub fn reference(&self) -> Option<&FileReference> {
        match self {
            AttachmentStatus::Uploaded(reference) => Some(reference),
            _ => None,
        }
    }
}

/// Who a notification is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Internal,
    Submitter,
}

/// Human-readable summary of a submission, alive only for the send call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    pub audience: Audience,
    pub to: String,
    pub reply_to: Option<String>,
    pub sender_name: Option<String>,
    pub subject: String,
    pub body: String,
}

/// Acknowledgement from the mail relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyReceipt {
    pub recipient: String,
    pub response: String,
}
