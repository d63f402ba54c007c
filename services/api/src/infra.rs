use async_trait::async_trait;
use highriz_intake::config::{IntakeConfig, MailConfig};
use highriz_intake::submissions::{
    AttachmentHandler, FileReference, FileSink, NotificationMessage, NotificationPolicy, Notifier,
    NotifyReceipt, RecordReceipt, RecordSink, SinkError, StagedAttachment, SubmissionContext,
    SubmissionOrchestrator, SubmissionRecord, Validator,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) fn notification_policy(mail: &MailConfig) -> NotificationPolicy {
    NotificationPolicy {
        internal_recipient: Some(mail.internal_recipient.clone()),
        confirm_submitter: mail.confirm_submitter,
        ..NotificationPolicy::default()
    }
}

pub(crate) fn build_orchestrator<R, F, N>(
    intake: &IntakeConfig,
    notifications: NotificationPolicy,
    records: Arc<R>,
    files: Arc<F>,
    notifier: Arc<N>,
) -> Arc<SubmissionOrchestrator<R, F, N>>
where
    R: RecordSink + 'static,
    F: FileSink + 'static,
    N: Notifier + 'static,
{
    Arc::new(SubmissionOrchestrator::new(
        Validator::new(intake.contact_schema.clone(), intake.enquiry_schema.clone()),
        AttachmentHandler::new(intake.attachments.clone(), intake.staging_dir.clone()),
        notifications,
        records,
        files,
        notifier,
    ))
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryRecordSink {
    rows: Arc<Mutex<Vec<SubmissionRecord>>>,
}

impl InMemoryRecordSink {
    pub(crate) fn rows(&self) -> Vec<SubmissionRecord> {
        self.rows.lock().expect("record mutex poisoned").clone()
    }
}

#[async_trait]
impl RecordSink for InMemoryRecordSink {
    async fn append(&self, record: &SubmissionRecord) -> Result<RecordReceipt, SinkError> {
        let mut guard = self.rows.lock().expect("record mutex poisoned");
        guard.push(record.clone());
        Ok(RecordReceipt {
            destination: format!("memory:{}", record.kind.label()),
            updated_range: Some(format!("row {}", guard.len())),
        })
    }

    async fn verify(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryFileSink {
    uploads: Arc<Mutex<Vec<String>>>,
    unavailable: bool,
}

impl InMemoryFileSink {
    pub(crate) fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub(crate) fn uploads(&self) -> Vec<String> {
        self.uploads.lock().expect("upload mutex poisoned").clone()
    }
}

#[async_trait]
impl FileSink for InMemoryFileSink {
    async fn upload(
        &self,
        attachment: &StagedAttachment,
        _context: &SubmissionContext,
    ) -> Result<FileReference, SinkError> {
        if self.unavailable {
            return Err(SinkError::unavailable("file store offline"));
        }
        let mut guard = self.uploads.lock().expect("upload mutex poisoned");
        guard.push(attachment.stored_name().to_string());
        Ok(FileReference {
            id: format!("memory-{}", guard.len()),
            link: format!("memory://attachments/{}", attachment.stored_name()),
        })
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryNotifier {
    sent: Arc<Mutex<Vec<NotificationMessage>>>,
}

impl InMemoryNotifier {
    pub(crate) fn sent(&self) -> Vec<NotificationMessage> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn notify(&self, message: &NotificationMessage) -> Result<NotifyReceipt, SinkError> {
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push(message.clone());
        Ok(NotifyReceipt {
            recipient: message.to.clone(),
            response: "250".to_string(),
        })
    }
}
