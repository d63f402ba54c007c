//! Form submission intake: validation, attachment staging, the record, file
//! and notification sinks, and the orchestrator that orders them.

pub mod attachment;
pub mod domain;
pub mod notification;
pub mod orchestrator;
pub mod router;
pub mod sinks;
pub mod validator;

#[cfg(test)]
mod tests;

pub use attachment::{
    AttachmentError, AttachmentHandler, AttachmentPolicy, FilePart, StagedAttachment,
    DEFAULT_ALLOWED_TYPES, DEFAULT_MAX_UPLOAD_BYTES,
};
pub use domain::{
    Audience, AttachmentStatus, FileReference, NotificationMessage, NotifyReceipt, RawFields,
    RecordReceipt, Submission, SubmissionContext, SubmissionKind, SubmissionRecord,
};
pub use notification::NotificationPolicy;
pub use orchestrator::{
    FailureReason, NotificationReport, SubmissionError, SubmissionOrchestrator,
    SubmissionOutcome, SubmissionStage,
};
pub use router::submission_router;
pub use sinks::{FileSink, Notifier, RecordSink, SinkError, SinkErrorKind};
pub use validator::{FieldSpec, SubmissionSchema, ValidationError, Validator};
