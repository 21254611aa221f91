//! rowsift HTTP server: upload a CSV of connections, filter it with a
//! natural-language prompt, download the result.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use rowsift_core::{FilterPipeline, PipelineError};
use rowsift_infer::{CodeGenerator, HttpOpenAiGenerator, StaticCodeGenerator};
use rowsift_publish::ResultPublisher;
use rowsift_store::{InMemoryTableStore, TableStore};
use rowsift_types::{DownloadHandle, FilterRequest, PreviewRecord, UploadHandle};

#[derive(Clone)]
struct AppState {
    pipeline: Arc<FilterPipeline>,
}

#[derive(Debug, Deserialize)]
struct FilterBody {
    prompt: String,
    #[serde(default)]
    file_id: Option<String>,
}

#[derive(Serialize)]
struct UploadResponse {
    success: bool,
    message: String,
    total_rows: usize,
    columns: Vec<String>,
    preview_data: Vec<PreviewRecord>,
    file_id: UploadHandle,
}

#[derive(Serialize)]
struct FilterResponse {
    success: bool,
    message: String,
    filtered_count: usize,
    total_count: usize,
    preview_data: Vec<PreviewRecord>,
    download_url: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    message: &'static str,
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

struct ApiError(PipelineError);

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            PipelineError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            PipelineError::NotFound(name) => {
                (StatusCode::NOT_FOUND, format!("file not found: {name}"))
            }
            // Server-side failures: full context goes to the log, the
            // client gets the classified message without internals.
            other => {
                tracing::error!(error = %other, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        };
        (
            status,
            Json(ErrorBody {
                success: false,
                error: message,
            }),
        )
            .into_response()
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.into())
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false)
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn app(state: AppState, upload_limit_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(vec![header::CONTENT_TYPE]);

    Router::new()
        .route(
            "/api/upload",
            post(upload_csv).layer(DefaultBodyLimit::max(upload_limit_bytes)),
        )
        .route("/api/filter", post(filter_connections))
        .route("/api/download/:handle", get(download_results))
        .route("/api/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .init();

    let artifact_dir = std::env::var("ROWSIFT_ARTIFACT_DIR")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| std::env::temp_dir().join("rowsift"));
    let publisher = Arc::new(ResultPublisher::open(&artifact_dir)?);
    let store: Arc<dyn TableStore> = Arc::new(InMemoryTableStore::new());

    let generator: Arc<dyn CodeGenerator> = if env_flag("ROWSIFT_LLM_STUB") {
        tracing::warn!("LLM stub enabled; every filter keeps all rows");
        Arc::new(StaticCodeGenerator::match_all())
    } else {
        let api_key = std::env::var("ROWSIFT_LLM_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .ok();
        if api_key.is_none() {
            tracing::warn!("no API key configured; upstream calls may be rejected");
        }
        Arc::new(HttpOpenAiGenerator::new(
            env_or("ROWSIFT_LLM_URL", "https://api.openai.com/v1"),
            env_or("ROWSIFT_LLM_MODEL", "gpt-4o-mini"),
            api_key,
            Duration::from_secs(env_u64("ROWSIFT_LLM_TIMEOUT_SECS", 30)),
        ))
    };

    let pipeline = Arc::new(FilterPipeline::new(store, generator, publisher));

    // Periodic sweep over stored tables and published artifacts.
    let ttl = Duration::from_secs(env_u64("ROWSIFT_TTL_HOURS", 24) * 3600);
    let sweep_interval = Duration::from_secs(env_u64("ROWSIFT_SWEEP_INTERVAL_SECS", 3600));
    let sweeper = Arc::clone(&pipeline);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.tick().await; // first tick fires immediately; skip it
        loop {
            ticker.tick().await;
            if let Err(e) = sweeper.store().purge_older_than(ttl).await {
                tracing::warn!(error = %e, "upload sweep failed");
            }
            if let Err(e) = sweeper.publisher().purge(ttl) {
                tracing::warn!(error = %e, "artifact sweep failed");
            }
        }
    });

    let upload_limit_bytes = env_u64("ROWSIFT_UPLOAD_LIMIT_MB", 50) as usize * 1024 * 1024;
    let state = AppState { pipeline };
    let router = app(state, upload_limit_bytes);

    let addr: SocketAddr = env_or("ROWSIFT_BIND", "0.0.0.0:8000").parse()?;
    tracing::info!(%addr, artifact_dir = %artifact_dir.display(), "rowsift server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

async fn upload_csv(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut file_name: Option<String> = None;
    let mut file_data: Option<Vec<u8>> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        PipelineError::InvalidInput(format!("failed to read multipart field: {e}"))
    })? {
        if field.name() == Some("file") {
            file_name = field.file_name().map(|s| s.to_string());
            let bytes = field.bytes().await.map_err(|e| {
                PipelineError::InvalidInput(format!("failed to read file data: {e}"))
            })?;
            file_data = Some(bytes.to_vec());
        }
    }

    let file_name =
        file_name.ok_or_else(|| PipelineError::InvalidInput("no filename provided".into()))?;
    let file_data =
        file_data.ok_or_else(|| PipelineError::InvalidInput("no file provided".into()))?;

    let report = state.pipeline.upload(&file_name, &file_data).await?;
    Ok(Json(UploadResponse {
        success: true,
        message: format!("Successfully uploaded {file_name}"),
        total_rows: report.total_rows,
        columns: report.columns,
        preview_data: report.preview,
        file_id: report.file_id,
    }))
}

async fn filter_connections(
    State(state): State<AppState>,
    Json(body): Json<FilterBody>,
) -> Result<Json<FilterResponse>, ApiError> {
    let file_id = match body.file_id.as_deref() {
        Some(raw) => Some(raw.parse::<UploadHandle>().map_err(|_| {
            PipelineError::InvalidInput(format!("malformed file_id: {raw}"))
        })?),
        None => None,
    };

    let report = state
        .pipeline
        .filter(&FilterRequest {
            prompt: body.prompt,
            file_id,
        })
        .await?;

    Ok(Json(FilterResponse {
        success: true,
        message: format!(
            "Successfully filtered {} connections from {} total",
            report.filtered_count, report.total_count
        ),
        filtered_count: report.filtered_count,
        total_count: report.total_count,
        preview_data: report.preview,
        download_url: format!("/api/download/{}", report.download),
    }))
}

async fn download_results(
    State(state): State<AppState>,
    Path(handle): Path<String>,
) -> Result<Response, ApiError> {
    let handle = DownloadHandle(handle);
    let path = state.pipeline.resolve_download(&handle)?;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| PipelineError::Storage(e.to_string()))?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{handle}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        message: "rowsift is running",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    const CSV: &[u8] = b"Name,Position\n\
        Alice,Software Engineer\n\
        Bob,HR Manager\n\
        Carol,Talent Partner\n\
        Dave,Product Manager\n\
        Erin,Senior Recruiter\n";

    const HR_CODE: &str =
        "df = df[df['Position'].str.contains('HR|Talent|Recruiter|People', case=False, na=False)]";

    fn test_app(dir: &std::path::Path, code: &str) -> Router {
        let pipeline = Arc::new(FilterPipeline::new(
            Arc::new(InMemoryTableStore::new()),
            Arc::new(StaticCodeGenerator::new(code)),
            Arc::new(ResultPublisher::open(dir).unwrap()),
        ));
        app(AppState { pipeline }, 50 * 1024 * 1024)
    }

    fn multipart_body(filename: &str, content: &[u8]) -> (String, Vec<u8>) {
        let boundary = "----RowsiftTestBoundary42";
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: text/csv\r\n\r\n");
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        (boundary.to_string(), body)
    }

    async fn upload(app: &Router, filename: &str, content: &[u8]) -> (StatusCode, serde_json::Value) {
        let (boundary, body) = multipart_body(filename, content);
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/upload")
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={boundary}"),
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn post_filter(app: &Router, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/filter")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_is_always_ok() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path(), HR_CODE);
        let response = app
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn upload_filter_download_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path(), HR_CODE);

        let (status, uploaded) = upload(&app, "connections.csv", CSV).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(uploaded["success"], true);
        assert_eq!(uploaded["total_rows"], 5);
        let file_id = uploaded["file_id"].as_str().unwrap().to_string();

        let (status, filtered) = post_filter(
            &app,
            serde_json::json!({"prompt": "people in HR", "file_id": file_id}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(filtered["filtered_count"], 3);
        assert_eq!(filtered["total_count"], 5);
        assert_eq!(filtered["preview_data"].as_array().unwrap().len(), 3);

        let url = filtered["download_url"].as_str().unwrap().to_string();
        let response = app
            .oneshot(Request::builder().uri(url.as_str()).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.starts_with("Name,Position"));
        assert!(text.contains("Bob"));
        assert!(!text.contains("Alice"));
    }

    #[tokio::test]
    async fn non_csv_upload_is_rejected_with_400() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path(), HR_CODE);
        let (status, body) = upload(&app, "data.pdf", CSV).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn header_only_upload_is_rejected_with_400() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path(), HR_CODE);
        let (status, _) = upload(&app, "empty.csv", b"Name,Position\n").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn filter_with_unknown_file_id_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path(), HR_CODE);
        let (status, body) = post_filter(
            &app,
            serde_json::json!({
                "prompt": "people in HR",
                "file_id": "00000000-0000-4000-8000-000000000000"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn filter_without_file_id_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path(), HR_CODE);
        let (status, _) = post_filter(&app, serde_json::json!({"prompt": "anyone"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn misshapen_generated_code_is_500() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path(), "import os");

        let (_, uploaded) = upload(&app, "c.csv", CSV).await;
        let file_id = uploaded["file_id"].as_str().unwrap().to_string();
        let (status, body) = post_filter(
            &app,
            serde_json::json!({"prompt": "people in HR", "file_id": file_id}),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn download_with_unknown_handle_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path(), HR_CODE);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/download/filtered_results_never.csv")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
