use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        multipart::{Field, MultipartError},
        DefaultBodyLimit, FromRequest, Multipart, Request, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Form, Json, Router,
};
use serde_json::{json, Value};

use super::attachment::FilePart;
use super::domain::{RawFields, SubmissionKind};
use super::orchestrator::{SubmissionError, SubmissionOrchestrator, SubmissionOutcome};
use super::sinks::{FileSink, Notifier, RecordSink};

const FILE_FIELD: &str = "file";

/// Router exposing the contact and enquiry form endpoints.
///
/// `max_body_bytes` must leave room above the attachment limit so oversize
/// files reach the handler and get a descriptive 400 instead of a bare 413.
pub fn submission_router<R, F, N>(
    orchestrator: Arc<SubmissionOrchestrator<R, F, N>>,
    max_body_bytes: usize,
) -> Router
where
    R: RecordSink + 'static,
    F: FileSink + 'static,
    N: Notifier + 'static,
{
    Router::new()
        .route("/contact-form", post(contact_handler::<R, F, N>))
        // Path the legacy site script posts to.
        .route("/send-data", post(contact_handler::<R, F, N>))
        .route("/enquiry-form", post(enquiry_handler::<R, F, N>))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(orchestrator)
}

pub(crate) async fn contact_handler<R, F, N>(
    State(orchestrator): State<Arc<SubmissionOrchestrator<R, F, N>>>,
    request: Request,
) -> Response
where
    R: RecordSink + 'static,
    F: FileSink + 'static,
    N: Notifier + 'static,
{
    let fields = match read_form_fields(request).await {
        Ok(fields) => fields,
        Err(response) => return response,
    };

    submission_response(
        orchestrator
            .submit(SubmissionKind::Contact, fields, None)
            .await,
    )
}

pub(crate) async fn enquiry_handler<R, F, N>(
    State(orchestrator): State<Arc<SubmissionOrchestrator<R, F, N>>>,
    mut multipart: Multipart,
) -> Response
where
    R: RecordSink + 'static,
    F: FileSink + 'static,
    N: Notifier + 'static,
{
    let max_bytes = orchestrator.attachment_policy().max_bytes;
    let mut fields = RawFields::new();
    let mut file: Option<FilePart> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return multipart_error(err, max_bytes),
        };

        let name = field.name().unwrap_or_default().to_string();
        if field.file_name().is_some() || name == FILE_FIELD {
            let part = match read_file_part(field, max_bytes).await {
                Ok(part) => part,
                Err(response) => return response,
            };
            let Some(part) = part else { continue };
            if file.is_some() {
                let payload = json!({
                    "error": "only one file part is allowed",
                    "reason": "duplicate",
                });
                return (StatusCode::BAD_REQUEST, Json(payload)).into_response();
            }
            file = Some(part);
        } else {
            match field.text().await {
                Ok(value) => {
                    fields.insert(name, value);
                }
                Err(err) => return multipart_error(err, max_bytes),
            }
        }
    }

    submission_response(
        orchestrator
            .submit(SubmissionKind::Enquiry, fields, file)
            .await,
    )
}

/// Contact bodies arrive as JSON from the site script, or urlencoded from a
/// plain HTML form post.
async fn read_form_fields(request: Request) -> Result<RawFields, Response> {
    let is_urlencoded = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"));

    if is_urlencoded {
        let Form(fields) = Form::<RawFields>::from_request(request, &())
            .await
            .map_err(|rejection| error_response(rejection.status(), rejection.body_text()))?;
        return Ok(fields);
    }

    let Json(body) = Json::<BTreeMap<String, Value>>::from_request(request, &())
        .await
        .map_err(|rejection| error_response(rejection.status(), rejection.body_text()))?;

    Ok(body
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(text) => Some((key, text)),
            other => Some((key, other.to_string())),
        })
        .collect())
}

/// Buffers at most `max_bytes`, but keeps counting so the attachment handler
/// sees the real size. Browsers send an empty, unnamed part when no file was
/// chosen; that counts as no attachment.
async fn read_file_part(
    mut field: Field<'_>,
    max_bytes: u64,
) -> Result<Option<FilePart>, Response> {
    let file_name = field
        .file_name()
        .map(str::to_string)
        .filter(|name| !name.trim().is_empty());
    let content_type = field.content_type().map(str::to_string);

    let mut data = Vec::new();
    let mut size: u64 = 0;
    loop {
        match field.chunk().await {
            Ok(Some(chunk)) => {
                size += chunk.len() as u64;
                if size <= max_bytes {
                    data.extend_from_slice(&chunk);
                }
            }
            Ok(None) => break,
            Err(err) => return Err(multipart_error(err, max_bytes)),
        }
    }

    if size == 0 && file_name.is_none() {
        return Ok(None);
    }

    Ok(Some(FilePart {
        file_name,
        content_type,
        data: Bytes::from(data),
        size,
    }))
}

fn submission_response(result: Result<SubmissionOutcome, SubmissionError>) -> Response {
    match result {
        Ok(outcome) => {
            let mut payload = json!({
                "message": "Submission received",
                "record": outcome.receipt,
            });
            if outcome.kind == SubmissionKind::Enquiry {
                payload["attachment"] = json!(outcome.attachment.label());
                payload["file"] = json!(outcome.attachment.reference());
            }
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(SubmissionError::Validation(err)) => {
            let payload = json!({
                "error": err.to_string(),
                "missingFields": err.missing_fields,
            });
            (StatusCode::BAD_REQUEST, Json(payload)).into_response()
        }
        Err(SubmissionError::Attachment(err)) if err.is_client_error() => {
            let payload = json!({
                "error": err.to_string(),
                "reason": err.reason(),
            });
            (StatusCode::BAD_REQUEST, Json(payload)).into_response()
        }
        Err(SubmissionError::Attachment(_)) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "attachment could not be stored".to_string(),
        ),
        Err(SubmissionError::Record(_)) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "submission could not be recorded".to_string(),
        ),
    }
}

/// A body cut off at the request limit is an oversize attachment as far as
/// the client is concerned, so it gets the attachment size rejection.
fn multipart_error(err: MultipartError, max_bytes: u64) -> Response {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        let payload = json!({
            "error": format!("attachment is above the {max_bytes} byte limit"),
            "reason": "size",
        });
        return (StatusCode::BAD_REQUEST, Json(payload)).into_response();
    }
    error_response(err.status(), err.body_text())
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
