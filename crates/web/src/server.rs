//! Web server implementation

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ws::WebSocketUpgrade, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use suiterun_common::{ExecutionRequest, FileEntry, LanguageFamily};
use suiterun_engine::workspace::resolve_relative_path;
use suiterun_engine::{detect, EngineConfig, Pipeline, PipelineStage};
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::run_socket::RunSocket;

/// Web server state
#[derive(Clone)]
pub struct WebServer {
    state: Arc<WebServerState>,
}

struct WebServerState {
    pipeline: Pipeline,
}

pub async fn serve(addr: SocketAddr, config: EngineConfig) -> anyhow::Result<()> {
    WebServer::new(config).serve(addr).await
}

impl WebServer {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            state: Arc::new(WebServerState {
                pipeline: Pipeline::new(config),
            }),
        }
    }

    /// Create router
    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/health", get(health_handler))
            .route("/api/detect", post(detect_handler))
            .route("/api/run", post(run_ndjson_handler))
            .route("/ws/run", get(run_ws_handler))
            .fallback(not_found_handler)
            .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Start the web server
    pub async fn serve(self, addr: SocketAddr) -> anyhow::Result<()> {
        info!("suiterun web listening on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.router()).await?;

        Ok(())
    }
}

impl Default for WebServer {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "suiterun-web",
        "version": suiterun_common::VERSION,
    }))
}

#[derive(Debug, Deserialize)]
struct DetectRequest {
    files: Vec<FileEntry>,
}

#[derive(Debug, Serialize)]
struct DetectResponse {
    family: LanguageFamily,
    matched: Option<String>,
}

/// Classify a manifest without writing anything to disk
async fn detect_handler(Json(req): Json<DetectRequest>) -> Response {
    let paths = match req
        .files
        .iter()
        .map(resolve_relative_path)
        .collect::<Result<Vec<_>, _>>()
    {
        Ok(paths) => paths,
        Err(e) => return bad_request(e.to_string()),
    };

    let detection = detect(&paths);
    Json(DetectResponse {
        family: detection.family,
        matched: detection
            .matched
            .map(|p| p.to_string_lossy().replace('\\', "/")),
    })
    .into_response()
}

async fn run_ws_handler(
    State(state): State<Arc<WebServerState>>,
    ws: WebSocketUpgrade,
) -> Response {
    let pipeline = state.pipeline.clone();
    ws.on_upgrade(move |socket| async move {
        if let Err(e) = RunSocket::new(pipeline).bridge(socket).await {
            error!("run websocket error: {}", e);
        }
    })
}

/// Aborts the run when the response body is dropped early
struct AbortOnDrop(JoinHandle<PipelineStage>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Same pipeline as the WebSocket, streamed as newline-delimited JSON
async fn run_ndjson_handler(State(state): State<Arc<WebServerState>>, body: String) -> Response {
    let request = match ExecutionRequest::from_json(&body) {
        Ok(request) => request,
        Err(e) => return bad_request(format!("Invalid execution request: {}", e)),
    };
    info!(files = request.files.len(), engine = %request.target_engine, "run requested over http");

    let (handle, events) = state.pipeline.spawn(request);
    let guard = AbortOnDrop(handle);
    let lines = events.map(move |event| {
        let _run = &guard;
        serde_json::to_string(&event).map(|mut line| {
            line.push('\n');
            line
        })
    });

    (
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(lines),
    )
        .into_response()
}

async fn not_found_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not found")
}

fn bad_request(message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::http::Request;
    use tower::ServiceExt;

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = WebServer::default().router();
        let response = app
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], suiterun_common::VERSION);
    }

    #[tokio::test]
    async fn test_detect() {
        let app = WebServer::default().router();
        let response = app
            .oneshot(post_json(
                "/api/detect",
                r#"{"files": [
                    {"name": "LoginTests.cs", "path": "E2E", "content": ""},
                    {"name": "E2E.csproj", "path": "E2E", "content": ""}
                ]}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json["family"], "dotnet");
        assert_eq!(json["matched"], "E2E/E2E.csproj");
    }

    #[tokio::test]
    async fn test_detect_rejects_escaping_paths() {
        let app = WebServer::default().router();
        let response = app
            .oneshot(post_json(
                "/api/detect",
                r#"{"files": [{"name": "../../etc/passwd", "path": "", "content": ""}]}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_run_rejects_malformed_request() {
        let app = WebServer::default().router();
        let response = app.oneshot(post_json("/api/run", "{not json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_run_streams_ndjson_until_terminal_event() {
        let work_root = tempfile::tempdir().unwrap();
        let app = WebServer::new(EngineConfig {
            work_root: Some(work_root.path().to_path_buf()),
            ..EngineConfig::default()
        })
        .router();

        // Fails during materialization, before any toolchain is needed
        let response = app
            .oneshot(post_json(
                "/api/run",
                r#"{"files": [{"name": "test_x.py", "path": "../escape", "content": ""}], "targetEngine": "firefox"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/x-ndjson"
        );

        let text = body_text(response).await;
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["kind"], "error");
        assert!(lines[0]["payload"]["message"]
            .as_str()
            .unwrap()
            .contains("escape"));
    }
}
