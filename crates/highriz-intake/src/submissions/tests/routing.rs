use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use super::common::*;
use crate::config::IntakeConfig;
use crate::submissions::router::submission_router;
use crate::submissions::sinks::{FileSink, RecordSink};

const BODY_LIMIT: usize = 32 * 1024 * 1024;

fn app<R, F>(harness: &Harness<R, F>) -> axum::Router
where
    R: RecordSink + 'static,
    F: FileSink + 'static,
{
    submission_router(harness.orchestrator.clone(), BODY_LIMIT)
}

#[tokio::test]
async fn contact_form_accepts_json() {
    let harness = harness(MemoryRecords::default(), MemoryFiles::default());

    let response = app(&harness)
        .oneshot(json_request(
            "/contact-form",
            json!({
                "name": "Ann",
                "email": "a@x.com",
                "phone": 555,
                "service": "roofing",
                "message": "hi",
            }),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["message"], "Submission received");
    assert!(body.get("file").is_none());
    assert_eq!(harness.records.rows()[0].values[2], "555");
}

#[tokio::test]
async fn legacy_send_data_path_accepts_urlencoded() {
    let harness = harness(MemoryRecords::default(), MemoryFiles::default());
    let request = Request::builder()
        .method("POST")
        .uri("/send-data")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(
            "name=Ann&email=a%40x.com&phone=555&service=roofing&message=hi",
        ))
        .expect("request");

    let response = app(&harness).oneshot(request).await.expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(harness.records.rows()[0].values[1], "a@x.com");
}

#[tokio::test]
async fn contact_form_lists_missing_fields() {
    let harness = harness(MemoryRecords::default(), MemoryFiles::default());

    let response = app(&harness)
        .oneshot(json_request("/contact-form", json!({ "name": "Ann" })))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json_body(response).await;
    assert_eq!(body["missingFields"], json!(["email", "phone", "message"]));
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn contact_form_reports_server_error_when_record_fails() {
    let harness = harness(UnavailableRecords, MemoryFiles::default());

    let response = app(&harness)
        .oneshot(json_request(
            "/contact-form",
            json!({ "name": "Ann", "email": "a@x.com", "phone": "555", "message": "hi" }),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = read_json_body(response).await;
    assert_eq!(body["error"], "submission could not be recorded");
    tokio::task::yield_now().await;
    assert!(harness.notifier.sent().is_empty());
}

#[tokio::test]
async fn enquiry_form_rejects_oversize_file() {
    let harness = harness(MemoryRecords::default(), MemoryFiles::default());
    let mut parts = enquiry_text_parts();
    parts.push((
        "file",
        Some(("plans.pdf", "application/pdf")),
        pdf_bytes(10 * 1000 * 1000),
    ));

    let response = app(&harness)
        .oneshot(multipart_request("/enquiry-form", parts))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json_body(response).await;
    assert_eq!(body["reason"], "size");
    assert!(harness.records.rows().is_empty());
    assert!(harness.files.calls().is_empty());
    assert_eq!(harness.staged_files(), 0);
}

#[tokio::test]
async fn enquiry_form_over_body_cap_reports_size() {
    let harness = harness(MemoryRecords::default(), MemoryFiles::default());
    let router = submission_router(
        harness.orchestrator.clone(),
        IntakeConfig::default().max_body_bytes,
    );
    let mut parts = enquiry_text_parts();
    parts.push((
        "file",
        Some(("plans.pdf", "application/pdf")),
        pdf_bytes(25 * 1000 * 1000),
    ));

    let response = router
        .oneshot(multipart_request("/enquiry-form", parts))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json_body(response).await;
    assert_eq!(body["reason"], "size");
    assert!(harness.records.rows().is_empty());
    assert!(harness.files.calls().is_empty());
    assert_eq!(harness.staged_files(), 0);
}

#[tokio::test]
async fn enquiry_form_reports_server_error_when_staging_fails() {
    let harness = harness(MemoryRecords::default(), MemoryFiles::default());
    std::fs::write(harness.staging_dir(), b"not a directory").expect("blocker file");
    let mut parts = enquiry_text_parts();
    parts.push((
        "file",
        Some(("plans.pdf", "application/pdf")),
        pdf_bytes(2048),
    ));

    let response = app(&harness)
        .oneshot(multipart_request("/enquiry-form", parts))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = read_json_body(response).await;
    assert_eq!(body["error"], "attachment could not be stored");
    assert!(harness.records.rows().is_empty());
    assert!(harness.files.calls().is_empty());
}

#[tokio::test]
async fn enquiry_form_succeeds_when_upload_fails() {
    let harness = harness(MemoryRecords::default(), MemoryFiles::failing());
    let mut parts = enquiry_text_parts();
    parts.push((
        "file",
        Some(("plans.pdf", "application/pdf")),
        pdf_bytes(1000 * 1000),
    ));

    let response = app(&harness)
        .oneshot(multipart_request("/enquiry-form", parts))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["attachment"], "upload_failed");
    assert!(body["file"].is_null());
    assert_eq!(harness.records.rows().len(), 1);
    assert_eq!(harness.staged_files(), 0);
}

#[tokio::test]
async fn enquiry_form_returns_file_reference() {
    let harness = harness(MemoryRecords::default(), MemoryFiles::default());
    let mut parts = enquiry_text_parts();
    parts.push(("subject", None, b"Kitchen refit".to_vec()));
    parts.push((
        "file",
        Some(("plan.pdf", "application/octet-stream")),
        pdf_bytes(4096),
    ));

    let response = app(&harness)
        .oneshot(multipart_request("/enquiry-form", parts))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["attachment"], "uploaded");
    assert_eq!(body["file"]["link"], "https://drive.example/file-1");
    assert_eq!(harness.files.calls()[0].mime_type, "application/pdf");
    assert_eq!(harness.records.rows()[0].values[3], "Kitchen refit");
}

#[tokio::test]
async fn enquiry_form_rejects_second_file_part() {
    let harness = harness(MemoryRecords::default(), MemoryFiles::default());
    let mut parts = enquiry_text_parts();
    parts.push(("file", Some(("a.pdf", "application/pdf")), pdf_bytes(512)));
    parts.push(("extra", Some(("b.pdf", "application/pdf")), pdf_bytes(512)));

    let response = app(&harness)
        .oneshot(multipart_request("/enquiry-form", parts))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json_body(response).await;
    assert_eq!(body["reason"], "duplicate");
    assert!(harness.records.rows().is_empty());
}

#[tokio::test]
async fn enquiry_form_without_file_reports_missing_attachment() {
    let harness = harness(MemoryRecords::default(), MemoryFiles::default());
    let mut parts = enquiry_text_parts();
    parts.push(("file", Some(("", "application/octet-stream")), Vec::new()));

    let response = app(&harness)
        .oneshot(multipart_request("/enquiry-form", parts))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json_body(response).await;
    assert_eq!(body["reason"], "missing");
}
