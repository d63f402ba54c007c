use crate::cli::ServeArgs;
use crate::infra::{build_orchestrator, notification_policy, AppState};
use crate::routes::with_service_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use highriz_intake::config::{AppConfig, GoogleConfig, MailConfig};
use highriz_intake::error::AppError;
use highriz_intake::integrations::{
    self, GoogleConnector, GoogleDriveFileSink, GoogleSheetsRecordSink, SheetDestinations,
    SmtpNotifier,
};
use highriz_intake::submissions::RecordSink;
use highriz_intake::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

struct Sinks {
    records: GoogleSheetsRecordSink<GoogleConnector>,
    files: GoogleDriveFileSink<GoogleConnector>,
    notifier: SmtpNotifier,
}

async fn connect_sinks(google: &GoogleConfig, mail: &MailConfig) -> Result<Sinks, AppError> {
    let hubs = integrations::connect(&google.credentials_path)
        .await
        .map_err(|err| AppError::startup("google credentials", err))?;

    let records = GoogleSheetsRecordSink::new(
        hubs.sheets,
        google.spreadsheet_id.clone(),
        SheetDestinations {
            contact: google.contact_range.clone(),
            enquiry: google.enquiry_range.clone(),
        },
    );
    let files = GoogleDriveFileSink::new(hubs.drive, google.drive_folder_id.clone());
    let notifier =
        SmtpNotifier::from_config(mail).map_err(|err| AppError::startup("smtp relay", err))?;

    Ok(Sinks {
        records,
        files,
        notifier,
    })
}

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (google, mail) = config.integrations()?;
    let sinks = connect_sinks(google, mail).await?;
    sinks
        .records
        .verify()
        .await
        .map_err(|err| AppError::startup("record sink", err))?;
    if let Err(err) = sinks.notifier.test_connection().await {
        warn!(error = %err, "smtp relay check failed; notifications may not be delivered");
    }

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let orchestrator = build_orchestrator(
        &config.intake,
        notification_policy(mail),
        Arc::new(sinks.records),
        Arc::new(sinks.files),
        Arc::new(sinks.notifier),
    );

    let app = with_service_routes(orchestrator, &config.server, config.intake.max_body_bytes)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "highriz intake ready");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Verify every external dependency and report which ones answered.
pub(crate) async fn check() -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let (google, mail) = config.integrations()?;
    let sinks = connect_sinks(google, mail).await?;
    println!("Google credentials: ok ({})", google.credentials_path.display());

    sinks
        .records
        .verify()
        .await
        .map_err(|err| AppError::startup("record sink", err))?;
    println!("Spreadsheet {}: ok", google.spreadsheet_id);

    sinks
        .files
        .verify_folder()
        .await
        .map_err(|err| AppError::startup("file sink", err))?;
    println!("Drive folder {}: ok", google.drive_folder_id);

    sinks
        .notifier
        .test_connection()
        .await
        .map_err(|err| AppError::startup("smtp relay", err))?;
    println!("SMTP relay {}:{}: ok", mail.smtp_host, mail.smtp_port);

    Ok(())
}
