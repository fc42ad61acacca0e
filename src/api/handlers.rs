//! API request handlers
//!
//! Every handler runs the blocking store and codec work on the blocking
//! pool and wraps the result in [`ApiResponse`].

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BridgeError, BridgeResult};
use crate::service::Questionnaire;
use crate::types::{
    ImportSummary, QuestionWithResponse, Response as StoredResponse, ResponseInput, Sheet,
    TemplateInfo, XLSX_CONTENT_TYPE,
};

use super::server::AppState;

/// Standard API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            request_id: Uuid::new_v4().to_string(),
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            request_id: Uuid::new_v4().to_string(),
            data: None,
            error: Some(message.into()),
        }
    }
}

/// A failed request: status code plus the message placed in the envelope
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

/// HTTP status for a library error
pub fn status_for(err: &BridgeError) -> StatusCode {
    match err {
        BridgeError::UnreadableDocument(_) => StatusCode::BAD_REQUEST,
        BridgeError::TemplateMissing(_) | BridgeError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<BridgeError> for ApiError {
    fn from(err: BridgeError) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::<()>::err(self.message))).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

async fn run_blocking<T, F>(state: &AppState, work: F) -> Result<T, ApiError>
where
    F: FnOnce(&Questionnaire) -> BridgeResult<T> + Send + 'static,
    T: Send + 'static,
{
    let questionnaire = Arc::clone(&state.questionnaire);
    tokio::task::spawn_blocking(move || work(&questionnaire))
        .await
        .map_err(|e| ApiError::internal(format!("worker failed: {}", e)))?
        .map_err(ApiError::from)
}

/// Root endpoint response
#[derive(Serialize)]
pub struct RootResponse {
    pub name: String,
    pub version: String,
    pub description: String,
    pub endpoints: Vec<EndpointInfo>,
}

#[derive(Serialize)]
pub struct EndpointInfo {
    pub path: String,
    pub method: String,
    pub description: String,
}

fn endpoint(method: &str, path: &str, description: &str) -> EndpointInfo {
    EndpointInfo {
        path: path.to_string(),
        method: method.to_string(),
        description: description.to_string(),
    }
}

/// GET / - Root info
pub async fn root(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ApiResponse::ok(RootResponse {
        name: "Questionnaire Bridge".to_string(),
        version: state.version.clone(),
        description: "Import, answer and export spreadsheet questionnaires".to_string(),
        endpoints: vec![
            endpoint("GET", "/health", "Health check endpoint"),
            endpoint("GET", "/version", "Get server version"),
            endpoint("GET", "/api/v1/sheets", "List imported sheets"),
            endpoint(
                "GET",
                "/api/v1/sheets/:id/questions",
                "Questions of a sheet, optional ?search=",
            ),
            endpoint("GET", "/api/v1/questions/:id", "One question with its answer"),
            endpoint(
                "POST",
                "/api/v1/questions/:id/response",
                "Create or update the answer to a question",
            ),
            endpoint("POST", "/api/v1/import", "Import a questionnaire file"),
            endpoint(
                "GET",
                "/api/v1/export",
                "Download the completed questionnaire, optional ?version=",
            ),
            endpoint("GET", "/api/v1/templates", "List stored template versions"),
        ],
    }))
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_message: String,
}

/// GET /health - Health check
pub async fn health() -> impl IntoResponse {
    Json(ApiResponse::ok(HealthResponse {
        status: "healthy".to_string(),
        uptime_message: "Server is running".to_string(),
    }))
}

/// Version response
#[derive(Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub features: Vec<String>,
}

/// GET /version - Server version
pub async fn version(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ApiResponse::ok(VersionResponse {
        version: state.version.clone(),
        features: ["import", "export", "responses", "templates"]
            .iter()
            .map(|f| f.to_string())
            .collect(),
    }))
}

/// GET /api/v1/sheets
pub async fn list_sheets(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Sheet>> {
    let sheets = run_blocking(&state, |q| q.sheets()).await?;
    Ok(Json(ApiResponse::ok(sheets)))
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub search: Option<String>,
}

/// GET /api/v1/sheets/:id/questions
pub async fn list_questions(
    State(state): State<Arc<AppState>>,
    Path(sheet_id): Path<i64>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Vec<QuestionWithResponse>> {
    let questions =
        run_blocking(&state, move |q| q.questions(sheet_id, params.search.as_deref())).await?;
    Ok(Json(ApiResponse::ok(questions)))
}

/// GET /api/v1/questions/:id
pub async fn get_question(
    State(state): State<Arc<AppState>>,
    Path(question_id): Path<i64>,
) -> ApiResult<QuestionWithResponse> {
    let question = run_blocking(&state, move |q| q.question(question_id)).await?;
    Ok(Json(ApiResponse::ok(question)))
}

/// POST /api/v1/questions/:id/response
pub async fn save_response(
    State(state): State<Arc<AppState>>,
    Path(question_id): Path<i64>,
    Json(input): Json<ResponseInput>,
) -> ApiResult<StoredResponse> {
    let response = run_blocking(&state, move |q| q.save_response(question_id, &input)).await?;
    Ok(Json(ApiResponse::ok(response)))
}

/// Import request
#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub file_path: String,
}

/// POST /api/v1/import - Replace the questionnaire with a spreadsheet
pub async fn import_questionnaire(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ImportRequest>,
) -> ApiResult<ImportSummary> {
    let path = std::path::PathBuf::from(req.file_path);
    let summary = run_blocking(&state, move |q| q.import(&path)).await?;
    Ok(Json(ApiResponse::ok(summary)))
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportParams {
    pub version: Option<i64>,
}

/// GET /api/v1/export - Completed workbook as an attachment
pub async fn export_questionnaire(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ExportParams>,
) -> Result<Response, ApiError> {
    let output = run_blocking(&state, move |q| q.export(params.version)).await?;
    let headers = [
        (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", output.filename),
        ),
    ];
    Ok((headers, output.bytes).into_response())
}

/// GET /api/v1/templates
pub async fn list_templates(State(state): State<Arc<AppState>>) -> ApiResult<Vec<TemplateInfo>> {
    let templates = run_blocking(&state, |q| q.templates()).await?;
    Ok(Json(ApiResponse::ok(templates)))
}
