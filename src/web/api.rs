//! 状态查询API
//!
//! 只读接口，所有数据来自端点状态快照

use crate::error::EngineError;
use crate::health::StatusRegistry;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tracing::debug;

/// 查询接口共享状态
#[derive(Debug, Clone)]
pub struct ApiState {
    /// 状态注册表
    pub registry: StatusRegistry,
    /// 对外可访问的基础URL，不含结尾的 `/`
    pub base_url: String,
}

impl ApiState {
    /// 创建共享状态
    pub fn new(registry: StatusRegistry, base_url: &str) -> Self {
        Self {
            registry,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

/// 构建查询API路由
pub fn routes() -> Router<ApiState> {
    Router::new()
        .route("/endpoints", get(list_endpoints))
        .route("/endpoints/{name}", get(endpoint_status))
        .route("/endpoints/{name}/output", get(endpoint_output))
        .route("/health", get(health))
}

/// 端点列表，返回每个端点状态接口的URL
async fn list_endpoints(State(state): State<ApiState>) -> Json<Vec<String>> {
    let urls = state
        .registry
        .list_endpoint_names()
        .into_iter()
        .map(|name| format!("{}/endpoints/{}", state.base_url, name))
        .collect();

    Json(urls)
}

async fn endpoint_status(State(state): State<ApiState>, Path(name): Path<String>) -> Response {
    debug!("查询端点状态: {}", name);
    match state.registry.get_status(&name) {
        Ok(status) => Json(status.as_ref().clone()).into_response(),
        Err(e) => error_response(e),
    }
}

async fn endpoint_output(State(state): State<ApiState>, Path(name): Path<String>) -> Response {
    debug!("查询端点输出: {}", name);
    match state.registry.get_latest_output(&name) {
        Ok(output) => ([(header::CONTENT_TYPE, "text/plain")], output).into_response(),
        Err(e) => error_response(e),
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": crate::VERSION,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

fn error_response(error: EngineError) -> Response {
    let message = match error {
        EngineError::NotFound(ref name) => format!("requested endpoint does not exist: {name}"),
        EngineError::NotAvailable(ref name) => {
            format!("no output has been recorded (yet) for endpoint: {name}")
        }
        EngineError::AlreadyStarted => error.to_string(),
    };
    let status = match error {
        EngineError::NotFound(_) | EngineError::NotAvailable(_) => StatusCode::NOT_FOUND,
        EngineError::AlreadyStarted => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (status, Json(json!({ "error": message }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{CheckOutcome, EndpointStatus, StatusHandle};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tokio::sync::watch;
    use tower::ServiceExt;

    fn app() -> (Router, watch::Sender<Arc<EndpointStatus>>) {
        let (api_tx, api_rx) = watch::channel(Arc::new(EndpointStatus::new()));
        let (_web_tx, web_rx) = watch::channel(Arc::new(EndpointStatus::new()));
        let mut handles = BTreeMap::new();
        handles.insert("web".to_string(), StatusHandle::new(web_rx));
        handles.insert("api".to_string(), StatusHandle::new(api_rx));

        let state = ApiState::new(
            StatusRegistry::new(handles),
            "https://watcher.example.com:8443/",
        );
        let router = routes().with_state(state);
        (router, api_tx)
    }

    async fn get_request(router: Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = router
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .header(header::HOST, "10.0.0.5:8080")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn test_list_endpoints() {
        let (router, _tx) = app();
        let (status, body) = get_request(router, "/endpoints").await;

        assert_eq!(status, StatusCode::OK);
        let urls: Vec<String> = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            urls,
            vec![
                "https://watcher.example.com:8443/endpoints/api",
                "https://watcher.example.com:8443/endpoints/web"
            ]
        );
    }

    #[tokio::test]
    async fn test_endpoint_status() {
        let (router, tx) = app();
        let mut status = EndpointStatus::new();
        status.record(CheckOutcome::nok("timeout"), Utc::now());
        tx.send_replace(Arc::new(status));

        let (code, body) = get_request(router, "/endpoints/api").await;
        assert_eq!(code, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["latest_outcome"]["status"], "NOK");
        assert_eq!(json["latest_outcome"]["error"], "timeout");
        assert_eq!(json["consecutive"], 1);
        assert!(json["latest_ok_at"].is_null());
        assert!(json["latest_nok_at"].is_string());
    }

    #[tokio::test]
    async fn test_unknown_endpoint_is_404() {
        let (router, _tx) = app();
        let (code, _) = get_request(router.clone(), "/endpoints/missing").await;
        assert_eq!(code, StatusCode::NOT_FOUND);

        let (code, _) = get_request(router, "/endpoints/missing/output").await;
        assert_eq!(code, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_endpoint_output() {
        let (router, tx) = app();

        let (code, body) = get_request(router.clone(), "/endpoints/api/output").await;
        assert_eq!(code, StatusCode::NOT_FOUND);
        assert!(String::from_utf8_lossy(&body).contains("no output"));

        let mut status = EndpointStatus::new();
        status.record(CheckOutcome::ok().with_output(b"pong".to_vec()), Utc::now());
        tx.send_replace(Arc::new(status));

        let (code, body) = get_request(router, "/endpoints/api/output").await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body, b"pong");
    }

    #[tokio::test]
    async fn test_health() {
        let (router, _tx) = app();
        let (code, body) = get_request(router, "/health").await;
        assert_eq!(code, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }
}
