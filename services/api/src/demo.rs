use crate::infra::{build_orchestrator, InMemoryFileSink, InMemoryNotifier, InMemoryRecordSink};
use clap::Args;
use highriz_intake::config::IntakeConfig;
use highriz_intake::error::AppError;
use highriz_intake::submissions::{
    FilePart, FileSink, NotificationPolicy, RawFields, SubmissionKind, SubmissionOrchestrator,
    SubmissionOutcome,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Simulate a Drive outage so the enquiry attachment is reported as upload_failed.
    #[arg(long)]
    pub(crate) fail_upload: bool,
    /// Directory used to stage the sample attachment (defaults to the system temp dir).
    #[arg(long)]
    pub(crate) staging_dir: Option<PathBuf>,
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        fail_upload,
        staging_dir,
    } = args;

    let mut intake = IntakeConfig::default();
    if let Some(dir) = staging_dir {
        intake.staging_dir = dir;
    }

    let records = Arc::new(InMemoryRecordSink::default());
    let files = Arc::new(if fail_upload {
        InMemoryFileSink::unavailable()
    } else {
        InMemoryFileSink::default()
    });
    let notifier = Arc::new(InMemoryNotifier::default());
    let orchestrator = build_orchestrator(
        &intake,
        NotificationPolicy {
            internal_recipient: Some("office@highriz.example".to_string()),
            ..NotificationPolicy::default()
        },
        records.clone(),
        files.clone(),
        notifier.clone(),
    );

    println!("HighRiz intake demo");

    println!("\nContact form");
    let contact = sample_fields(&[
        ("name", "Ann Example"),
        ("email", "ann@example.com"),
        ("phone", "555 0100"),
        ("service", "Roofing"),
        ("message", "Could someone call me about a quote?"),
    ]);
    submit_and_render(&orchestrator, SubmissionKind::Contact, contact, None).await;

    println!("\nEnquiry form");
    let enquiry = sample_fields(&[
        ("name", "Bo Example"),
        ("email", "bo@example.com"),
        ("phone", "555 0101"),
        ("subject", "Kitchen refit"),
    ]);
    let plans = FilePart::new(
        Some("plans.pdf".to_string()),
        Some("application/pdf".to_string()),
        b"%PDF-1.4 sample plans".to_vec(),
    );
    submit_and_render(&orchestrator, SubmissionKind::Enquiry, enquiry, Some(plans)).await;

    println!("\nInvalid contact form");
    let invalid = sample_fields(&[("name", "Cy Example")]);
    submit_and_render(&orchestrator, SubmissionKind::Contact, invalid, None).await;

    println!("\nRecorded rows");
    for row in records.rows() {
        println!("  [{}] {}", row.kind, row.row().join(" | "));
    }
    println!("Uploaded files: {}", files.uploads().len());
    println!("Messages relayed:");
    for message in notifier.sent() {
        println!("  {:?} -> {}: {}", message.audience, message.to, message.subject);
    }

    Ok(())
}

async fn submit_and_render<F>(
    orchestrator: &SubmissionOrchestrator<InMemoryRecordSink, F, InMemoryNotifier>,
    kind: SubmissionKind,
    fields: RawFields,
    file: Option<FilePart>,
) where
    F: FileSink + 'static,
{
    match orchestrator.submit(kind, fields, file).await {
        Ok(outcome) => render_outcome(outcome).await,
        Err(err) => println!("  Rejected ({:?}): {}", err.failure_reason(), err),
    }
}

async fn render_outcome(outcome: SubmissionOutcome) {
    println!(
        "  Recorded to {} ({})",
        outcome.receipt.destination,
        outcome.receipt.updated_range.as_deref().unwrap_or("range unknown")
    );
    println!("  Attachment: {}", outcome.attachment.label());
    if let Some(reference) = outcome.attachment.reference() {
        println!("  File link: {}", reference.link);
    }
    println!("  Stages: {:?}", outcome.stages);

    match outcome.notifications.await {
        Ok(report) => {
            println!(
                "  Notifications: {} delivered, {} failed",
                report.delivered.len(),
                report.failed.len()
            );
            for (recipient, err) in report.failed {
                println!("    {recipient}: {err}");
            }
        }
        Err(err) => println!("  Notification task failed: {err}"),
    }
}

fn sample_fields(pairs: &[(&str, &str)]) -> RawFields {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}
