//! HTTP transport for the runtime extension
//!
//! Plain HTTP; TLS is expected to be terminated in front of the listener.

use super::extension::{VipExtension, AFTER_CLUSTER_UPGRADE, BEFORE_CLUSTER_CREATE, BEFORE_CLUSTER_DELETE};
use super::types::{GeneratePatchesRequest, LifecycleRequest};
use anyhow::Context;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Path prefix of every Runtime SDK endpoint
pub const HOOKS_PATH: &str = "/hooks.runtime.cluster.x-k8s.io/v1alpha1";

type SharedExtension = Arc<VipExtension>;

/// Parse a hook request body, rejecting malformed JSON with 400.
fn decode<T: DeserializeOwned>(body: &Bytes) -> Result<T, Response> {
    serde_json::from_slice(body).map_err(|e| {
        warn!("Rejecting malformed hook request: {}", e);
        (StatusCode::BAD_REQUEST, format!("failed to unmarshal request: {}", e)).into_response()
    })
}

async fn discovery(State(extension): State<SharedExtension>) -> Response {
    Json(extension.discovery()).into_response()
}

async fn generate_patches(State(extension): State<SharedExtension>, body: Bytes) -> Response {
    match decode::<GeneratePatchesRequest>(&body) {
        Ok(request) => Json(extension.generate_patches(&request).await).into_response(),
        Err(rejection) => rejection,
    }
}

fn lifecycle(extension: &VipExtension, hook: &str, body: &Bytes) -> Response {
    match decode::<LifecycleRequest>(body) {
        Ok(request) => Json(extension.lifecycle(hook, &request)).into_response(),
        Err(rejection) => rejection,
    }
}

async fn before_cluster_create(State(extension): State<SharedExtension>, body: Bytes) -> Response {
    lifecycle(&extension, BEFORE_CLUSTER_CREATE, &body)
}

async fn before_cluster_delete(State(extension): State<SharedExtension>, body: Bytes) -> Response {
    lifecycle(&extension, BEFORE_CLUSTER_DELETE, &body)
}

async fn after_cluster_upgrade(State(extension): State<SharedExtension>, body: Bytes) -> Response {
    lifecycle(&extension, AFTER_CLUSTER_UPGRADE, &body)
}

/// Router serving discovery and the hook handlers.
///
/// Cluster API calls handlers at `<hook>/<handler-name>`; the bare hook path
/// is served too.
pub fn router(extension: SharedExtension) -> Router {
    let route = |hook: &str| format!("{}/{}", HOOKS_PATH, hook);
    let named = |hook: &str| format!("{}/{}/{{handler}}", HOOKS_PATH, hook);

    Router::new()
        .route(&route("discovery"), post(discovery))
        .route(&route("generatepatches"), post(generate_patches))
        .route(&named("generatepatches"), post(generate_patches))
        .route(&route("beforeclustercreate"), post(before_cluster_create))
        .route(&named("beforeclustercreate"), post(before_cluster_create))
        .route(&route("beforeclusterdelete"), post(before_cluster_delete))
        .route(&named("beforeclusterdelete"), post(before_cluster_delete))
        .route(&route("afterclusterupgrade"), post(after_cluster_upgrade))
        .route(&named("afterclusterupgrade"), post(after_cluster_upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(extension)
}

/// Serve the runtime extension until the task is cancelled.
pub async fn serve(addr: SocketAddr, extension: SharedExtension) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding runtime extension listener on {}", addr))?;
    info!(
        "Runtime extension {} listening on {}{}",
        extension.name(),
        addr,
        HOOKS_PATH
    );
    axum::serve(listener, router(extension))
        .await
        .context("runtime extension server failed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use capi_client::MockCapiClient;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app(mock: &MockCapiClient) -> Router {
        router(Arc::new(VipExtension::new(Arc::new(create_test_reconciler(mock)))))
    }

    async fn post_json(app: Router, path: &str, body: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri(format!("{}/{}", HOOKS_PATH, path))
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_discovery_lists_handlers() {
        let mock = MockCapiClient::new();
        let (status, body) = post_json(app(&mock), "discovery", "{}").await;

        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["status"], "Success");
        assert_eq!(body["handlers"][0]["name"], "vip-allocator-generate-patches");
        assert_eq!(body["handlers"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let mock = MockCapiClient::new();
        let (status, body) = post_json(app(&mock), "generatepatches", "{not json").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.starts_with("failed to unmarshal request"));
        assert_eq!(mock.claim_count(), 0);
    }

    #[tokio::test]
    async fn test_wrong_shape_is_bad_request() {
        let mock = MockCapiClient::new();
        let (status, _) = post_json(app(&mock), "beforeclusterdelete", r#"{"cluster": 5, "kind": []}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_named_handler_path_is_served() {
        let mock = MockCapiClient::new();
        let request = json!({
            "apiVersion": "hooks.runtime.cluster.x-k8s.io/v1alpha1",
            "kind": "GeneratePatchesRequest",
            "items": []
        });
        let (status, body) = post_json(
            app(&mock),
            "generatepatches/vip-allocator-generate-patches",
            &request.to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["status"], "Success");
        assert_eq!(body["kind"], "GeneratePatchesResponse");
    }

    #[tokio::test]
    async fn test_lifecycle_hooks_acknowledge() {
        let mock = MockCapiClient::new();
        let request = json!({"cluster": {"metadata": {"name": "c1", "namespace": "default"}}}).to_string();

        for path in ["beforeclustercreate", "beforeclusterdelete/x", "afterclusterupgrade"] {
            let (status, body) = post_json(app(&mock), path, &request).await;
            assert_eq!(status, StatusCode::OK);
            let body: Value = serde_json::from_str(&body).unwrap();
            assert_eq!(body["status"], "Success");
        }
    }
}
