//! Axum router and request handlers.
//!
//! Routes:
//! - `POST /` (or any other path)  - Config extension hook called by the CI server
//! - `GET  /healthz`               - Health check
//! - `GET  /metrics`               - Prometheus metrics

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use tracing::{debug, error, info, instrument};

use super::wire::{ConfigFile, ConfigRequest, ConfigResponse};
use crate::metrics::RequestOutcome;
use crate::pipeline::Resolution;
use crate::AppState;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Upper bound on a config request body, which inlines the repository's own
/// pipeline files.
const MAX_HOOK_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Build the axum [`Router`] with all HTTP routes and shared state.
///
/// Methods other than the ones listed are answered with `405` by axum.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(crate::health::health_handler))
        .route("/metrics", get(handle_metrics))
        .route("/", post(handle_config).layer(DefaultBodyLimit::max(MAX_HOOK_BODY_BYTES)))
        .route(
            "/{*path}",
            post(handle_config).layer(DefaultBodyLimit::max(MAX_HOOK_BODY_BYTES)),
        )
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `POST /`
///
/// Answers `200` with the resolved pipeline, or `204` to tell the CI server
/// to use its own configuration.  Resolution failures never surface as 5xx.
#[instrument(skip_all)]
async fn handle_config(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, AppError> {
    let metrics = &state.metrics.metrics;

    let request: ConfigRequest = serde_json::from_slice(&body).map_err(|e| {
        metrics.record_request(RequestOutcome::BadRequest);
        AppError::BadRequest(format!("failed to parse JSON: {e}"))
    })?;

    let event = request.build_event();
    info!(
        repo = %event.repo,
        full_name = %request.repo.full_name,
        owner = %request.repo.owner,
        git_ref = %event.git_ref,
        commit = %event.commit,
        event = %request.pipeline.event,
        "config request received"
    );
    if let Some(configs) = &request.configs {
        debug!(count = configs.len(), "CI server sent its own configs");
    }

    if !state.gate.admits(&event.git_ref) {
        metrics.record_request(RequestOutcome::Filtered);
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    match state.resolver.resolve(&event).await {
        Ok(Resolution::Pipeline { name, data }) => {
            metrics.record_request(RequestOutcome::Resolved);
            let data = String::from_utf8_lossy(&data).into_owned();
            debug!(%name, pipeline = %data, "returning pipeline");
            Ok((
                StatusCode::OK,
                Json(ConfigResponse {
                    configs: vec![ConfigFile { name, data }],
                }),
            )
                .into_response())
        }
        Ok(Resolution::NoOverride) => {
            metrics.record_request(RequestOutcome::NoOverride);
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        Err(e) => {
            metrics.record_request(RequestOutcome::Failed);
            error!(
                error = %e,
                repo = %event.repo,
                branch = %event.branch,
                "pipeline resolution failed, falling back to default config"
            );
            Ok(StatusCode::NO_CONTENT.into_response())
        }
    }
}

/// `GET /metrics`
async fn handle_metrics(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let buf = state
        .metrics
        .encode()
        .map_err(|e| AppError::Internal(anyhow::anyhow!("metrics encoding failed: {e}")))?;

    Ok((
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        buf,
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Application-level error type that maps cleanly to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// The request body could not be understood.
    BadRequest(String),
    /// An unexpected internal error.
    Internal(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::BadRequest(msg) => {
                info!(error = %msg, "rejecting malformed request");
                (StatusCode::BAD_REQUEST, msg).into_response()
            }
            AppError::Internal(err) => {
                error!(error = %err, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error\n").into_response()
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const BASE: &str = "/ci/pipelines/raw/branch/master";

    async fn spawn_app(store: &MockServer, filter: &str) -> String {
        let config = crate::config::test_config(&format!("{}/ci/pipelines", store.uri()), filter);
        let state = AppState::new(config).unwrap();
        let app = create_router(Arc::new(state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn request_body(repo: &str, branch: &str) -> serde_json::Value {
        serde_json::json!({
            "repo": {"name": repo, "full_name": format!("acme/{repo}"), "owner": "acme"},
            "pipeline": {
                "branch": branch,
                "ref": format!("refs/heads/{branch}"),
                "commit": "0123abcd",
                "event": "push",
                "variables": {"Machine": "qemux86"}
            },
            "configs": []
        })
    }

    #[tokio::test]
    async fn resolved_pipeline_is_returned_as_json() {
        let store = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{BASE}/yocto-bsp-demo/release_v1_qemux86.yaml")))
            .respond_with(ResponseTemplate::new(200).set_body_string("steps:\n  build: {}\n"))
            .mount(&store)
            .await;
        let app = spawn_app(&store, "").await;

        let resp = reqwest::Client::new()
            .post(format!("{app}/"))
            .json(&request_body("yocto-bsp-demo", "release/v1"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(
            body,
            serde_json::json!({"configs": [{"name": "release_v1", "data": "steps:\n  build: {}\n"}]})
        );
    }

    #[tokio::test]
    async fn filtered_ref_gets_no_content_without_fetching() {
        let store = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x"))
            .expect(0)
            .mount(&store)
            .await;
        let app = spawn_app(&store, "^refs/heads/main$").await;

        let mut body = request_body("acme", "feature/x");
        body["pipeline"]["ref"] = serde_json::json!("feature/x");

        let resp = reqwest::Client::new()
            .post(format!("{app}/"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NO_CONTENT);
        assert!(resp.bytes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn exhausted_chain_gets_no_content() {
        let store = MockServer::start().await;
        let app = spawn_app(&store, "").await;

        let resp = reqwest::Client::new()
            .post(format!("{app}/"))
            .json(&request_body("acme", "feature/x"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NO_CONTENT);
        assert!(resp.bytes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_lookup_degrades_to_no_content() {
        let store = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{BASE}/lookup/bob_topic_x.toml")))
            .respond_with(ResponseTemplate::new(200).set_body_string("not = = toml"))
            .mount(&store)
            .await;
        let app = spawn_app(&store, "").await;

        let resp = reqwest::Client::new()
            .post(format!("{app}/"))
            .json(&request_body("acme", "bob/topic/x"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let store = MockServer::start().await;
        let app = spawn_app(&store, "").await;

        let resp = reqwest::Client::new()
            .post(format!("{app}/"))
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        assert!(resp
            .text()
            .await
            .unwrap()
            .starts_with("failed to parse JSON"));
    }

    #[tokio::test]
    async fn non_post_is_method_not_allowed() {
        let store = MockServer::start().await;
        let app = spawn_app(&store, "").await;

        let client = reqwest::Client::new();
        let resp = client.get(format!("{app}/")).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::METHOD_NOT_ALLOWED);

        let resp = client.put(format!("{app}/hook")).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn hook_is_served_on_any_path() {
        let store = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{BASE}/acme/default.yaml")))
            .respond_with(ResponseTemplate::new(200).set_body_string("default"))
            .mount(&store)
            .await;
        let app = spawn_app(&store, "").await;

        let resp = reqwest::Client::new()
            .post(format!("{app}/woodpecker/config"))
            .json(&request_body("acme", "main"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["configs"][0]["name"], "main");
        assert_eq!(body["configs"][0]["data"], "default");
    }

    #[tokio::test]
    async fn large_inline_configs_are_accepted() {
        let store = MockServer::start().await;
        let app = spawn_app(&store, "").await;

        let mut body = request_body("acme", "feature/x");
        body["configs"] = serde_json::json!([
            {"name": ".woodpecker/big.yaml", "data": "x".repeat(3 * 1024 * 1024)}
        ]);

        let resp = reqwest::Client::new()
            .post(format!("{app}/"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn metrics_reflect_request_outcomes() {
        let store = MockServer::start().await;
        let app = spawn_app(&store, "^refs/heads/main$").await;
        let client = reqwest::Client::new();

        client
            .post(format!("{app}/"))
            .json(&request_body("acme", "feature/x"))
            .send()
            .await
            .unwrap();

        let text = client
            .get(format!("{app}/metrics"))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(
            text.contains("pipeline_resolver_requests_total{outcome=\"Filtered\"} 1"),
            "{text}"
        );
    }
}
