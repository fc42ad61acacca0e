//! API integration tests
//!
//! Drives the router in-process with `tower::ServiceExt::oneshot`.

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use questionnaire_bridge::address::CellAddress;
use questionnaire_bridge::api::{build_router, AppState};
use questionnaire_bridge::excel::{read_workbook_bytes, write_workbook, CellValue, Workbook, Worksheet};
use questionnaire_bridge::mapping;
use questionnaire_bridge::service::Questionnaire;

fn router() -> Router {
    let questionnaire = Arc::new(Questionnaire::in_memory().unwrap());
    build_router(AppState::new(questionnaire))
}

fn write_fixture(dir: &Path) -> String {
    let mut wb = Workbook::new();
    let mut ws = Worksheet::new(mapping::QUALIFICATION);
    for (reference, label) in [("B5", "Personal data"), ("B9", "Health data")] {
        ws.set_value(
            CellAddress::parse(reference).unwrap(),
            CellValue::Text(label.to_string()),
        );
    }
    wb.add_sheet(ws);

    let path = dir.join("questionnaire.xlsx");
    std::fs::write(&path, write_workbook(&wb).unwrap()).unwrap();
    path.to_string_lossy().into_owned()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

async fn post_json(app: &Router, uri: &str, payload: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

// ═══════════════════════════════════════════════════════════════════════════
// INFO ENDPOINTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_health() {
    let app = router();
    let (status, body) = get_json(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "healthy");
    assert_eq!(body["request_id"].as_str().unwrap().len(), 36);
}

#[tokio::test]
async fn test_version_and_root() {
    let app = router();
    let (_, version) = get_json(&app, "/version").await;
    assert_eq!(version["data"]["version"], env!("CARGO_PKG_VERSION"));

    let (status, root) = get_json(&app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(root["data"]["endpoints"].as_array().unwrap().len() >= 8);
}

// ═══════════════════════════════════════════════════════════════════════════
// ERROR STATUS MAPPING
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_export_before_import_is_404() {
    let app = router();
    let (status, body) = get_json(&app, "/api/v1/export").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("template"));
}

#[tokio::test]
async fn test_import_unreadable_file_is_400() {
    let dir = TempDir::new().unwrap();
    let bad = dir.path().join("bad.xlsx");
    std::fs::write(&bad, b"not a spreadsheet").unwrap();

    let app = router();
    let (status, body) = post_json(
        &app,
        "/api/v1/import",
        json!({ "file_path": bad.to_string_lossy() }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_unknown_question_is_404() {
    let app = router();
    let (status, _) = get_json(&app, "/api/v1/questions/404").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = post_json(
        &app,
        "/api/v1/questions/404/response",
        json!({ "response_text": "Yes" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_sheet_is_404() {
    let app = router();
    let (status, _) = get_json(&app, "/api/v1/sheets/3/questions").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ═══════════════════════════════════════════════════════════════════════════
// FULL FLOW
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_import_answer_export_flow() {
    let dir = TempDir::new().unwrap();
    let file_path = write_fixture(dir.path());
    let app = router();

    let (status, import) =
        post_json(&app, "/api/v1/import", json!({ "file_path": file_path })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(import["data"]["sheet_count"], 1);
    assert_eq!(import["data"]["question_count"], 2);

    let (_, sheets) = get_json(&app, "/api/v1/sheets").await;
    let sheet_id = sheets["data"][0]["id"].as_i64().unwrap();

    let (_, found) = get_json(
        &app,
        &format!("/api/v1/sheets/{}/questions?search=health", sheet_id),
    )
    .await;
    let questions = found["data"].as_array().unwrap();
    assert_eq!(questions.len(), 1);
    assert_eq!(questions[0]["row_number"], 9);
    assert_eq!(questions[0]["cell_column"], "C");
    let question_id = questions[0]["id"].as_i64().unwrap();

    let (status, saved) = post_json(
        &app,
        &format!("/api/v1/questions/{}/response", question_id),
        json!({ "response_text": "No" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["data"]["response_text"], "No");

    let (_, question) = get_json(&app, &format!("/api/v1/questions/{}", question_id)).await;
    assert_eq!(question["data"]["response"]["response_text"], "No");

    let request = Request::builder()
        .uri("/api/v1/export")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("Questionnaire-Completed-"));
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let exported = read_workbook_bytes(&bytes).unwrap();
    let sheet = exported.sheet(mapping::QUALIFICATION).unwrap();
    assert_eq!(
        sheet.value(CellAddress::parse("C9").unwrap()),
        &CellValue::Text("No".to_string())
    );
    assert!(sheet.value(CellAddress::parse("C5").unwrap()).is_blank());

    let (_, templates) = get_json(&app, "/api/v1/templates").await;
    assert_eq!(templates["data"].as_array().unwrap().len(), 1);
    assert_eq!(templates["data"][0]["version"], 1);
}
