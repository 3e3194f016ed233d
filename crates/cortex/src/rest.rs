//! The REST/HTTP surface (spec §1, "trivial adapter"): exposes the same
//! named operations the stdio JSON-RPC server does, over
//! `POST /api/v1/:operation` with a JSON body of arguments, through the
//! same `OperationDispatcher`.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::app::CortexApp;
use crate::mcp::OPERATIONS;

pub fn router(app: Arc<CortexApp>) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/api/v1/operations", get(list_operations))
        .route("/api/v1/{operation}", post(call_operation))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app)
}

async fn health() -> &'static str {
    "ok"
}

async fn list_operations() -> Json<Value> {
    let ops: Vec<Value> = OPERATIONS
        .iter()
        .map(|(name, description)| json!({ "name": name, "description": description }))
        .collect();
    Json(json!({ "operations": ops }))
}

async fn call_operation(
    State(app): State<Arc<CortexApp>>,
    Path(operation): Path<String>,
    body: Option<Json<Value>>,
) -> Response {
    let args = body.map(|Json(v)| v).unwrap_or_else(|| json!({}));
    match app.dispatcher.execute(&operation, args).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(err) => {
            let status = status_for_kind(&err.kind);
            let payload = json!({ "kind": err.kind, "message": err.message, "retriable": err.retriable });
            (status, Json(payload)).into_response()
        }
    }
}

fn status_for_kind(kind: &str) -> StatusCode {
    match kind {
        "InvalidArgument" => StatusCode::BAD_REQUEST,
        "NotFound" => StatusCode::NOT_FOUND,
        "AlreadyExists" => StatusCode::CONFLICT,
        "PreconditionFailed" => StatusCode::PRECONDITION_FAILED,
        "Unavailable" => StatusCode::SERVICE_UNAVAILABLE,
        "Cancelled" => StatusCode::from_u16(499).unwrap(),
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use cortex_core::GlobalConfig;
    use tower::ServiceExt;

    async fn test_router() -> Router {
        let mut config = GlobalConfig::new();
        config.set("docstore.uri", "mem://");
        let app = Arc::new(CortexApp::build(config).await.unwrap());
        router(app)
    }

    #[tokio::test]
    async fn health_check_responds_ok() {
        let router = test_router().await;
        let resp = router
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_human_task_round_trips_over_http() {
        let router = test_router().await;
        let resp = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/create_human_task")
                    .header("content-type", "application/json")
                    .body(Body::from(json!({ "prompt": "ship it" }).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn invalid_argument_maps_to_bad_request() {
        let router = test_router().await;
        let resp = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/create_human_task")
                    .header("content-type", "application/json")
                    .body(Body::from(json!({}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_operation_maps_to_internal_error() {
        let router = test_router().await;
        let resp = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/not_a_real_operation")
                    .header("content-type", "application/json")
                    .body(Body::from(json!({}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        // unknown operations come back from the dispatcher as InvalidArgument
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
