use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use google_drive3::hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use google_drive3::hyper_util::client::legacy::connect::HttpConnector;
use google_drive3::hyper_util::client::legacy::Client;
use google_drive3::hyper_util::rt::TokioExecutor;
use google_drive3::{yup_oauth2, DriveHub};
use google_sheets4::Sheets;
use serde_json::Value;

use crate::submissions::{SinkError, SinkErrorKind};

pub type GoogleConnector = HttpsConnector<HttpConnector>;

/// Drive and Sheets hubs sharing one HTTP client and one service-account
/// authenticator.
pub struct GoogleHubs {
    pub drive: DriveHub<GoogleConnector>,
    pub sheets: Sheets<GoogleConnector>,
}

/// Build both hubs from a service-account key. The key file may hold the raw
/// JSON or a base64 encoding of it.
pub async fn connect(credentials_path: &Path) -> Result<GoogleHubs, SinkError> {
    let raw = tokio::fs::read(credentials_path).await.map_err(|err| {
        SinkError::unauthorized(format!(
            "unable to read credentials at {}: {err}",
            credentials_path.display()
        ))
    })?;
    let key = yup_oauth2::parse_service_account_key(decode_credentials(&raw)?)
        .map_err(|err| SinkError::unauthorized(format!("invalid service account key: {err}")))?;

    let auth = yup_oauth2::ServiceAccountAuthenticator::builder(key)
        .build()
        .await
        .map_err(|err| SinkError::unauthorized(format!("authenticator setup failed: {err}")))?;

    let connector = HttpsConnectorBuilder::new()
        .with_native_roots()
        .map_err(|err| SinkError::unavailable(format!("tls roots unavailable: {err}")))?
        .https_or_http()
        .enable_http1()
        .build();
    let client = Client::builder(TokioExecutor::new()).build(connector);

    Ok(GoogleHubs {
        drive: DriveHub::new(client.clone(), auth.clone()),
        sheets: Sheets::new(client, auth),
    })
}

fn decode_credentials(raw: &[u8]) -> Result<Vec<u8>, SinkError> {
    let text = String::from_utf8_lossy(raw);
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        return Ok(trimmed.as_bytes().to_vec());
    }
    BASE64
        .decode(trimmed)
        .map_err(|err| SinkError::unauthorized(format!("credentials are neither JSON nor base64: {err}")))
}

/// Map a generated-client error onto the sink taxonomy. `rejected` is the kind
/// used when the API refused the request content.
pub(crate) fn classify(err: &google_drive3::Error, rejected: SinkErrorKind) -> SinkErrorKind {
    use google_drive3::Error;

    match err {
        Error::MissingToken(_) | Error::MissingAPIKey => SinkErrorKind::Unauthorized,
        Error::Failure(response) => classify_status(response.status().as_u16(), rejected),
        Error::BadRequest(body) => body
            .get("error")
            .and_then(|error| error.get("code"))
            .and_then(Value::as_u64)
            .and_then(|code| u16::try_from(code).ok())
            .map(|code| classify_status(code, rejected))
            .unwrap_or(rejected),
        Error::FieldClash(_) | Error::JsonDecodeError(..) => rejected,
        _ => SinkErrorKind::Unavailable,
    }
}

fn classify_status(status: u16, rejected: SinkErrorKind) -> SinkErrorKind {
    match status {
        401 | 403 => SinkErrorKind::Unauthorized,
        400..=499 => rejected,
        _ => SinkErrorKind::Unavailable,
    }
}
