use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::attachment::{AttachmentError, AttachmentHandler, AttachmentPolicy, FilePart};
use super::domain::{
    AttachmentStatus, NotificationMessage, NotifyReceipt, RawFields, RecordReceipt,
    SubmissionKind, SubmissionRecord,
};
use super::notification::NotificationPolicy;
use super::sinks::{FileSink, Notifier, RecordSink, SinkError};
use super::validator::{ValidationError, Validator};

/// Pipeline position of one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStage {
    Received,
    Validated,
    Recorded,
    FileUploaded,
    Notified,
    Responded,
    Failed(FailureReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Validation,
    Staging,
    SinkUnavailable,
}

/// Result of a submission that passed the durability gate.
#[derive(Debug)]
pub struct SubmissionOutcome {
    pub kind: SubmissionKind,
    pub receipt: RecordReceipt,
    pub attachment: AttachmentStatus,
    pub stages: Vec<SubmissionStage>,
    /// Detached notification task. Dropping the handle does not cancel it.
    pub notifications: JoinHandle<NotificationReport>,
}

/// What the detached notification task managed to send.
#[derive(Debug, Default)]
pub struct NotificationReport {
    pub delivered: Vec<NotifyReceipt>,
    pub failed: Vec<(String, SinkError)>,
}

/// Submission rejected before or at the durability gate.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Attachment(#[from] AttachmentError),
    #[error("submission could not be recorded: {0}")]
    Record(#[source] SinkError),
}

impl SubmissionError {
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            SubmissionError::Validation(_) => FailureReason::Validation,
            SubmissionError::Attachment(err) if err.is_client_error() => FailureReason::Validation,
            SubmissionError::Attachment(_) => FailureReason::Staging,
            SubmissionError::Record(_) => FailureReason::SinkUnavailable,
        }
    }
}

/// Walks one submission through validation, the record sink, the file sink
/// and the notifier. Collaborators are process-wide and read-only.
pub struct SubmissionOrchestrator<R, F, N> {
    validator: Arc<Validator>,
    attachments: Arc<AttachmentHandler>,
    notifications: Arc<NotificationPolicy>,
    records: Arc<R>,
    files: Arc<F>,
    notifier: Arc<N>,
}

impl<R, F, N> SubmissionOrchestrator<R, F, N>
where
    R: RecordSink + 'static,
    F: FileSink + 'static,
    N: Notifier + 'static,
{
    pub fn new(
        validator: Validator,
        attachments: AttachmentHandler,
        notifications: NotificationPolicy,
        records: Arc<R>,
        files: Arc<F>,
        notifier: Arc<N>,
    ) -> Self {
        Self {
            validator: Arc::new(validator),
            attachments: Arc::new(attachments),
            notifications: Arc::new(notifications),
            records,
            files,
            notifier,
        }
    }

    pub fn attachment_policy(&self) -> &AttachmentPolicy {
        self.attachments.policy()
    }

    pub fn records(&self) -> &Arc<R> {
        &self.records
    }

    /// Run one submission. Errors are returned only for failures at or
    /// before the record sink; later failures are logged and absorbed.
    pub async fn submit(
        &self,
        kind: SubmissionKind,
        raw: RawFields,
        file: Option<FilePart>,
    ) -> Result<SubmissionOutcome, SubmissionError> {
        let mut run = StageLog::new(kind);

        let submission = match self.validator.validate(kind, &raw) {
            Ok(submission) => submission,
            Err(err) => return Err(run.fail(err.into())),
        };
        run.advance(SubmissionStage::Validated);

        let mut staged = match self.attachments.accept(file).await {
            Ok(staged) => staged,
            Err(err) => return Err(run.fail(err.into())),
        };
        if staged.is_none() && self.validator.schema(kind).requires_attachment {
            return Err(run.fail(AttachmentError::Missing.into()));
        }

        let record = SubmissionRecord::new(
            &submission,
            staged.as_ref().map(|attachment| attachment.stored_name()),
            Utc::now(),
        );
        let receipt = match self.records.append(&record).await {
            Ok(receipt) => receipt,
            Err(err) => {
                if let Some(attachment) = staged.as_mut() {
                    attachment.release().await;
                }
                error!(%kind, error = %err, "record sink rejected submission");
                return Err(run.fail(SubmissionError::Record(err)));
            }
        };
        run.advance(SubmissionStage::Recorded);
        info!(%kind, destination = %receipt.destination, "submission recorded");

        let (attachment, stored_name) = match staged.take() {
            Some(mut staged) => {
                let status = match self.files.upload(&staged, &submission.context()).await {
                    Ok(reference) => {
                        run.advance(SubmissionStage::FileUploaded);
                        AttachmentStatus::Uploaded(reference)
                    }
                    Err(err) => {
                        warn!(
                            %kind,
                            stored_name = staged.stored_name(),
                            error = %err,
                            "attachment upload failed after record was written"
                        );
                        AttachmentStatus::UploadFailed
                    }
                };
                staged.release().await;
                (status, Some(staged.stored_name().to_string()))
            }
            None => (AttachmentStatus::None, None),
        };

        let messages =
            self.notifications
                .messages_for(&submission, &attachment, stored_name.as_deref());
        let notifications = tokio::spawn(dispatch(self.notifier.clone(), messages));
        run.advance(SubmissionStage::Notified);
        run.advance(SubmissionStage::Responded);

        Ok(SubmissionOutcome {
            kind,
            receipt,
            attachment,
            stages: run.into_stages(),
            notifications,
        })
    }
}

async fn dispatch<N>(notifier: Arc<N>, messages: Vec<NotificationMessage>) -> NotificationReport
where
    N: Notifier + ?Sized,
{
    let mut report = NotificationReport::default();
    for message in messages {
        match notifier.notify(&message).await {
            Ok(receipt) => {
                info!(recipient = %receipt.recipient, audience = ?message.audience, "notification sent");
                report.delivered.push(receipt);
            }
            Err(err) => {
                warn!(recipient = %message.to, audience = ?message.audience, error = %err, "notification failed");
                report.failed.push((message.to, err));
            }
        }
    }
    report
}

struct StageLog {
    kind: SubmissionKind,
    stages: Vec<SubmissionStage>,
}

impl StageLog {
    fn new(kind: SubmissionKind) -> Self {
        Self {
            kind,
            stages: vec![SubmissionStage::Received],
        }
    }

    fn advance(&mut self, stage: SubmissionStage) {
        debug!(kind = %self.kind, ?stage, "submission advanced");
        self.stages.push(stage);
    }

    fn fail(&mut self, err: SubmissionError) -> SubmissionError {
        let reason = err.failure_reason();
        debug!(kind = %self.kind, ?reason, error = %err, "submission failed");
        self.stages.push(SubmissionStage::Failed(reason));
        err
    }

    fn into_stages(self) -> Vec<SubmissionStage> {
        self.stages
    }
}
