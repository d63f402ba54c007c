use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use super::attachment::StagedAttachment;
use super::domain::{
    FileReference, NotificationMessage, NotifyReceipt, RecordReceipt, SubmissionContext,
    SubmissionRecord,
};

/// Append-only tabular store. A successful receipt means the row is visible
/// to later reads of the destination.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn append(&self, record: &SubmissionRecord) -> Result<RecordReceipt, SinkError>;

    /// Confirm the backing store is reachable and we are authorised to write.
    async fn verify(&self) -> Result<(), SinkError>;
}

/// Durable blob store for attachments.
#[async_trait]
pub trait FileSink: Send + Sync {
    async fn upload(
        &self,
        attachment: &StagedAttachment,
        context: &SubmissionContext,
    ) -> Result<FileReference, SinkError>;
}

/// Outbound mail relay.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &NotificationMessage) -> Result<NotifyReceipt, SinkError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkErrorKind {
    Unavailable,
    RejectedSchema,
    Unauthorized,
    Rejected,
}

impl fmt::Display for SinkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SinkErrorKind::Unavailable => "unavailable",
            SinkErrorKind::RejectedSchema => "rejected schema",
            SinkErrorKind::Unauthorized => "unauthorized",
            SinkErrorKind::Rejected => "rejected",
        };
        f.write_str(label)
    }
}

/// Failure reported by an external sink.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("sink {kind}: {detail}")]
pub struct SinkError {
    pub kind: SinkErrorKind,
    pub detail: String,
}

impl SinkError {
    pub fn new(kind: SinkErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self::new(SinkErrorKind::Unavailable, detail)
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(SinkErrorKind::Unauthorized, detail)
    }

    pub fn rejected(detail: impl Into<String>) -> Self {
        Self::new(SinkErrorKind::Rejected, detail)
    }
}
