//! API Server module
//!
//! This module exposes a [`Core`] over HTTP: rendering, command batches,
//! statistics, snapshot export/import and a server-sent event stream.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::domain::Command;
use crate::session::{Core, Session, SessionError, DEFAULT_ROOT_NAME};
use crate::snapshot::Snapshot;
use crate::store::FileStore;

/// A batch of commands applied in order
#[derive(Debug, Serialize, Deserialize)]
pub struct CommandRequest {
    pub commands: Vec<Command>,
}

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub address: SocketAddr,
    /// Store directory; goals are kept in memory only when absent
    pub store_path: Option<PathBuf>,
    /// Name of the root goal of a fresh store
    pub root_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: ([127, 0, 0, 1], 3000).into(),
            store_path: None,
            root_name: DEFAULT_ROOT_NAME.to_string(),
        }
    }
}

impl ServerConfig {
    /// Opens the configured store and builds the shared core around it
    pub fn open_core(&self) -> Result<Core, SessionError> {
        let session = match &self.store_path {
            Some(path) => Session::open(FileStore::open(path)?, &self.root_name)?,
            None => Session::new(&self.root_name),
        };
        Ok(Core::new(session))
    }
}

/// API responses
#[derive(Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Helper function to map Core results to Axum responses
fn map_core_result_to_response<T: Serialize>(result: Result<T, SessionError>) -> Response {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::success(data))).into_response(),
        Err(SessionError::Consistency(e)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ApiResponse::<T>::error(format!("Inconsistent goals: {}", e))),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Request failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<T>::error(format!(
                    "Internal server error: {}",
                    e
                ))),
            )
                .into_response()
        }
    }
}

/// Builds the router with every API route
pub fn router(core: Core) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/render", get(render_handler))
        .route("/api/command", post(command_handler))
        .route("/api/stats", get(stats_handler))
        .route("/api/export", get(export_handler))
        .route("/api/import", post(import_handler))
        .route("/api/updates", get(events_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(core)
}

/// Starts the API server
pub async fn serve(core: Core, config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let app = router(core);

    tracing::info!("Starting server on {}", config.address);
    let listener = TcpListener::bind(config.address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn render_handler(State(core): State<Core>) -> impl IntoResponse {
    map_core_result_to_response(Ok(core.render()))
}

async fn command_handler(
    State(core): State<Core>,
    Json(payload): Json<CommandRequest>,
) -> impl IntoResponse {
    map_core_result_to_response(core.apply(payload.commands))
}

async fn stats_handler(State(core): State<Core>) -> impl IntoResponse {
    map_core_result_to_response(Ok(core.stats()))
}

async fn export_handler(State(core): State<Core>) -> impl IntoResponse {
    map_core_result_to_response(Ok(core.export()))
}

async fn import_handler(
    State(core): State<Core>,
    Json(snapshot): Json<Snapshot>,
) -> impl IntoResponse {
    map_core_result_to_response(core.import(snapshot))
}

async fn events_handler(State(core): State<Core>) -> impl IntoResponse {
    let receiver = core.subscribe();
    let stream = EventStream::new(core.clone(), receiver);

    // Set headers for event stream
    let headers = [
        (
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("text/event-stream"),
        ),
        (
            axum::http::header::CACHE_CONTROL,
            axum::http::HeaderValue::from_static("no-cache"),
        ),
    ];

    (headers, axum::body::Body::from_stream(stream))
}

struct EventStream {
    core: Core,
    receiver: tokio::sync::broadcast::Receiver<()>,
}

impl EventStream {
    fn new(core: Core, receiver: tokio::sync::broadcast::Receiver<()>) -> Self {
        Self { core, receiver }
    }
}

impl Stream for EventStream {
    type Item = Result<String, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.receiver.try_recv() {
            Ok(()) | Err(tokio::sync::broadcast::error::TryRecvError::Lagged(_)) => {
                // Missed notifications collapse into a single update
                Poll::Ready(Some(Ok("event: update\ndata: change\n\n".to_string())))
            }
            Err(tokio::sync::broadcast::error::TryRecvError::Empty) => {
                // Poll again shortly
                let waker = cx.waker().clone();
                tokio::spawn(async move {
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                    waker.wake();
                });
                Poll::Pending
            }
            Err(tokio::sync::broadcast::error::TryRecvError::Closed) => {
                // Resubscribe and poll the fresh receiver right away
                self.receiver = self.core.subscribe();
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EdgeType, RenderResult};
    use crate::session::GoalsResponse;
    use crate::stats::Stats;
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt; // for `collect`
    use serde::de::DeserializeOwned;
    use serde_json::json;
    use tower::ServiceExt; // for `oneshot`

    fn setup_test_app() -> (Core, Router) {
        let core = Core::default();
        let app = router(core.clone());
        (core, app)
    }

    // Makes a request and unwraps the `data` of a successful response
    async fn request_json<T: DeserializeOwned + Serialize>(
        app: &Router,
        method: &str,
        uri: &str,
        body: Body,
    ) -> Result<(StatusCode, Option<T>), String> {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header("Content-Type", "application/json")
                    .body(body)
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body_str = String::from_utf8_lossy(&body_bytes);

        match serde_json::from_slice::<ApiResponse<T>>(&body_bytes) {
            Ok(api_resp) if api_resp.success && status.is_success() => Ok((status, api_resp.data)),
            Ok(api_resp) => Err(format!(
                "API Error: {} (Status: {})",
                api_resp.error.unwrap_or_default(),
                status
            )),
            Err(e) => Err(format!("HTTP Error: {} {} Body: {}", status, e, body_str)),
        }
    }

    #[tokio::test]
    async fn test_render_fresh_core() {
        let (_core, app) = setup_test_app();
        let (status, result): (_, Option<RenderResult>) =
            request_json(&app, "GET", "/api/render", Body::empty())
                .await
                .expect("render failed");
        assert_eq!(status, StatusCode::OK);
        let result = result.expect("render result");
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].name, DEFAULT_ROOT_NAME);
        assert_eq!(result.selection(), Some(1));
    }

    #[tokio::test]
    async fn test_command_batch_and_messages() {
        let (core, app) = setup_test_app();
        let body = Body::from(
            json!({
                "commands": [
                    {"command": "add", "name": "A"},
                    {"command": "add", "name": "B"},
                    {"command": "toggle_link", "lower": 2, "upper": 3},
                    {"command": "delete", "goal_id": 1}
                ]
            })
            .to_string(),
        );
        let (_, response): (_, Option<GoalsResponse<RenderResult>>) =
            request_json(&app, "POST", "/api/command", body)
                .await
                .expect("command failed");
        let response = response.expect("command response");
        assert_eq!(response.messages, vec!["Root goal can't be deleted".to_string()]);
        assert!(response
            .res
            .by_id(2)
            .unwrap()
            .edges
            .contains(&(3, EdgeType::Blocker)));

        let (_, stats): (_, Option<Stats>) =
            request_json(&app, "GET", "/api/stats", Body::empty())
                .await
                .expect("stats failed");
        assert_eq!(stats, Some(core.stats()));
    }

    #[tokio::test]
    async fn test_malformed_command_is_rejected() {
        let (_core, app) = setup_test_app();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/command")
                    .header("Content-Type", "application/json")
                    .body(Body::from(r#"{"commands": [{"command": "fly"}]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_event_stream_resubscribes_after_closed_channel() {
        use futures::StreamExt;
        use std::time::Duration;

        let core = Core::default();
        let (sender, receiver) = tokio::sync::broadcast::channel(1);
        drop(sender);
        let mut stream = EventStream::new(core.clone(), receiver);

        let writer = core.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            writer.apply(vec![Command::add("A", 1)]).unwrap();
        });

        let item = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("event stream stalled");
        assert_eq!(item.unwrap().unwrap(), "event: update\ndata: change\n\n");
    }

    #[tokio::test]
    async fn test_export_import_round_trip() {
        let (core, app) = setup_test_app();
        core.apply(vec![Command::add("Exported", 1)]).unwrap();

        let (_, snapshot): (_, Option<Snapshot>) =
            request_json(&app, "GET", "/api/export", Body::empty())
                .await
                .expect("export failed");
        let snapshot = snapshot.expect("snapshot");

        let (_other_core, other_app) = setup_test_app();
        let (_, result): (_, Option<RenderResult>) = request_json(
            &other_app,
            "POST",
            "/api/import",
            Body::from(serde_json::to_string(&snapshot).unwrap()),
        )
        .await
        .expect("import failed");
        assert_eq!(result.unwrap().by_id(2).unwrap().name, "Exported");

        let mut broken = snapshot;
        broken.edges.clear();
        let error = request_json::<RenderResult>(
            &other_app,
            "POST",
            "/api/import",
            Body::from(serde_json::to_string(&broken).unwrap()),
        )
        .await
        .unwrap_err();
        assert!(error.contains("422"), "unexpected error: {}", error);
    }
}
