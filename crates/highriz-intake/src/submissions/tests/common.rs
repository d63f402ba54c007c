use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request};
use axum::response::Response;
use serde_json::Value;
use tempfile::TempDir;

use crate::submissions::attachment::{AttachmentHandler, AttachmentPolicy, FilePart, StagedAttachment};
use crate::submissions::domain::{
    FileReference, NotificationMessage, NotifyReceipt, RawFields, RecordReceipt,
    SubmissionContext, SubmissionRecord,
};
use crate::submissions::notification::NotificationPolicy;
use crate::submissions::orchestrator::SubmissionOrchestrator;
use crate::submissions::sinks::{FileSink, Notifier, RecordSink, SinkError};
use crate::submissions::validator::Validator;

pub(super) const INBOX: &str = "inbox@highriz.example";
pub(super) const BOUNDARY: &str = "highriz-test-boundary";

#[derive(Default)]
pub(super) struct MemoryRecords {
    rows: Mutex<Vec<SubmissionRecord>>,
}

impl MemoryRecords {
    pub(super) fn rows(&self) -> Vec<SubmissionRecord> {
        self.rows.lock().expect("records mutex poisoned").clone()
    }
}

#[async_trait]
impl RecordSink for MemoryRecords {
    async fn append(&self, record: &SubmissionRecord) -> Result<RecordReceipt, SinkError> {
        let mut guard = self.rows.lock().expect("records mutex poisoned");
        guard.push(record.clone());
        Ok(RecordReceipt {
            destination: record.kind.label().to_string(),
            updated_range: Some(format!("Sheet1!A{}", guard.len())),
        })
    }

    async fn verify(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

pub(super) struct UnavailableRecords;

#[async_trait]
impl RecordSink for UnavailableRecords {
    async fn append(&self, _record: &SubmissionRecord) -> Result<RecordReceipt, SinkError> {
        Err(SinkError::unavailable("sheets offline"))
    }

    async fn verify(&self) -> Result<(), SinkError> {
        Err(SinkError::unavailable("sheets offline"))
    }
}

/// Captured upload call, including whether the staged copy was still on disk
/// while the sink was reading it.
#[derive(Debug, Clone)]
pub(super) struct UploadCall {
    pub(super) stored_name: String,
    pub(super) mime_type: String,
    pub(super) staged_file_present: bool,
    pub(super) context: SubmissionContext,
}

#[derive(Default)]
pub(super) struct MemoryFiles {
    fail: bool,
    calls: Mutex<Vec<UploadCall>>,
}

impl MemoryFiles {
    pub(super) fn failing() -> Self {
        Self {
            fail: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn calls(&self) -> Vec<UploadCall> {
        self.calls.lock().expect("files mutex poisoned").clone()
    }
}

#[async_trait]
impl FileSink for MemoryFiles {
    async fn upload(
        &self,
        attachment: &StagedAttachment,
        context: &SubmissionContext,
    ) -> Result<FileReference, SinkError> {
        self.calls
            .lock()
            .expect("files mutex poisoned")
            .push(UploadCall {
                stored_name: attachment.stored_name().to_string(),
                mime_type: attachment.mime_type().to_string(),
                staged_file_present: attachment.path().exists(),
                context: context.clone(),
            });

        if self.fail {
            return Err(SinkError::unavailable("drive offline"));
        }
        Ok(FileReference {
            id: "file-1".to_string(),
            link: "https://drive.example/file-1".to_string(),
        })
    }
}

#[derive(Default)]
pub(super) struct MemoryNotifier {
    reject_recipient: Option<String>,
    sent: Mutex<Vec<NotificationMessage>>,
}

impl MemoryNotifier {
    pub(super) fn rejecting(recipient: &str) -> Self {
        Self {
            reject_recipient: Some(recipient.to_string()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn sent(&self) -> Vec<NotificationMessage> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn notify(&self, message: &NotificationMessage) -> Result<NotifyReceipt, SinkError> {
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push(message.clone());
        if self.reject_recipient.as_deref() == Some(message.to.as_str()) {
            return Err(SinkError::rejected("mailbox unavailable"));
        }
        Ok(NotifyReceipt {
            recipient: message.to.clone(),
            response: "250".to_string(),
        })
    }
}

pub(super) struct Harness<R, F> {
    pub(super) orchestrator: Arc<SubmissionOrchestrator<R, F, MemoryNotifier>>,
    pub(super) records: Arc<R>,
    pub(super) files: Arc<F>,
    pub(super) notifier: Arc<MemoryNotifier>,
    staging: TempDir,
}

impl<R, F> Harness<R, F> {
    pub(super) fn staging_dir(&self) -> std::path::PathBuf {
        self.staging.path().join("staging")
    }

    pub(super) fn staged_files(&self) -> usize {
        count_files(&self.staging_dir())
    }
}

pub(super) fn harness<R, F>(records: R, files: F) -> Harness<R, F>
where
    R: RecordSink + 'static,
    F: FileSink + 'static,
{
    harness_with_notifier(records, files, MemoryNotifier::default())
}

pub(super) fn harness_with_notifier<R, F>(
    records: R,
    files: F,
    notifier: MemoryNotifier,
) -> Harness<R, F>
where
    R: RecordSink + 'static,
    F: FileSink + 'static,
{
    let staging = tempfile::tempdir().expect("staging tempdir");
    let records = Arc::new(records);
    let files = Arc::new(files);
    let notifier = Arc::new(notifier);
    let orchestrator = SubmissionOrchestrator::new(
        Validator::default(),
        AttachmentHandler::new(AttachmentPolicy::default(), staging.path().join("staging")),
        NotificationPolicy {
            internal_recipient: Some(INBOX.to_string()),
            ..NotificationPolicy::default()
        },
        records.clone(),
        files.clone(),
        notifier.clone(),
    );

    Harness {
        orchestrator: Arc::new(orchestrator),
        records,
        files,
        notifier,
        staging,
    }
}

pub(super) fn fields(pairs: &[(&str, &str)]) -> RawFields {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

pub(super) fn contact_fields() -> RawFields {
    fields(&[
        ("name", "Ann"),
        ("email", "a@x.com"),
        ("phone", "555"),
        ("service", "roofing"),
        ("message", "hi"),
    ])
}

pub(super) fn enquiry_fields() -> RawFields {
    fields(&[("name", "Bo"), ("email", "b@x.com"), ("phone", "555")])
}

pub(super) fn pdf_bytes(size: usize) -> Vec<u8> {
    let mut bytes = b"%PDF-1.7\n".to_vec();
    bytes.resize(size.max(bytes.len()), b'0');
    bytes
}

pub(super) fn pdf_part(size: usize) -> FilePart {
    FilePart::new(
        Some("quote.pdf".to_string()),
        Some("application/pdf".to_string()),
        pdf_bytes(size),
    )
}

pub(super) fn count_files(dir: &Path) -> usize {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.filter_map(Result::ok).count(),
        Err(_) => 0,
    }
}

/// Multipart part: (field name, optional (filename, content type), body).
pub(super) type Part<'a> = (&'a str, Option<(&'a str, &'a str)>, Vec<u8>);

pub(super) fn multipart_request(uri: &str, parts: Vec<Part<'_>>) -> Request<Body> {
    let mut body = Vec::new();
    for (name, file, data) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match file {
            Some((file_name, content_type)) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
            }
            None => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
            }
        }
        body.extend_from_slice(&data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("multipart request")
}

pub(super) fn enquiry_text_parts() -> Vec<Part<'static>> {
    vec![
        ("name", None, b"Bo".to_vec()),
        ("email", None, b"b@x.com".to_vec()),
        ("phone", None, b"555".to_vec()),
    ]
}

pub(super) fn json_request(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("json request")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
