use std::fmt::Write as _;

use super::domain::{Audience, AttachmentStatus, NotificationMessage, Submission};

/// Who gets told about a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPolicy {
    pub site_name: String,
    pub internal_recipient: Option<String>,
    pub confirm_submitter: bool,
}

impl Default for NotificationPolicy {
    fn default() -> Self {
        Self {
            site_name: "HighRiz".to_string(),
            internal_recipient: None,
            confirm_submitter: true,
        }
    }
}

impl NotificationPolicy {
    /// Messages for one submission: the internal alert first, then the
    /// submitter confirmation. Each is sent independently.
    pub fn messages_for(
        &self,
        submission: &Submission,
        attachment: &AttachmentStatus,
        stored_name: Option<&str>,
    ) -> Vec<NotificationMessage> {
        let summary = summary_lines(submission, attachment, stored_name);
        let mut messages = Vec::with_capacity(2);

        if let Some(inbox) = &self.internal_recipient {
            let mut body = summary.clone();
            if submission.field("message").is_empty() {
                body.push_str("\nMessage: New client registered\n");
            }
            messages.push(NotificationMessage {
                audience: Audience::Internal,
                to: inbox.clone(),
                reply_to: non_empty(submission.email()),
                sender_name: non_empty(submission.name()),
                subject: format!("Message from {} in {}", submission.name(), self.site_name),
                body,
            });
        }

        if self.confirm_submitter && !submission.email().is_empty() {
            let mut body = String::new();
            let _ = writeln!(body, "Hi {},", submission.name());
            let _ = writeln!(
                body,
                "\nThanks for reaching out to {}. We received your {} and will get back to you shortly.",
                self.site_name,
                submission.kind()
            );
            let _ = writeln!(body, "\nWhat you sent us:\n");
            body.push_str(&summary);
            messages.push(NotificationMessage {
                audience: Audience::Submitter,
                to: submission.email().to_string(),
                reply_to: self.internal_recipient.clone(),
                sender_name: Some(self.site_name.clone()),
                subject: format!("Thanks for contacting {}", self.site_name),
                body,
            });
        }

        messages
    }
}

fn summary_lines(
    submission: &Submission,
    attachment: &AttachmentStatus,
    stored_name: Option<&str>,
) -> String {
    let mut lines = String::new();
    for (name, value) in submission.fields() {
        if value.is_empty() {
            continue;
        }
        let _ = writeln!(lines, "{}: {}", field_label(name), value);
    }

    match attachment {
        AttachmentStatus::None => {}
        AttachmentStatus::Uploaded(reference) => {
            let _ = writeln!(lines, "Attachment: {}", reference.link);
        }
        AttachmentStatus::UploadFailed => {
            let _ = writeln!(
                lines,
                "Attachment: upload pending ({})",
                stored_name.unwrap_or("unnamed file")
            );
        }
    }
    lines
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn field_label(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
