//! HTTP front door.

use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use inventory_rpc_core::Reply;
use inventory_rpc_router::ReplyRouter;
use serde_json::{json, Value};

/// Builds the proxy's routes.
///
/// - `GET /consulta`: one routed request; always `200 OK` with the reply,
///   live or cached
/// - `GET /health/live`: liveness check
pub fn app(router: ReplyRouter) -> Router {
    Router::new()
        .route("/consulta", get(consulta))
        .route("/health/live", get(health_live))
        .with_state(router)
}

async fn consulta(State(router): State<ReplyRouter>) -> Json<Reply> {
    Json(router.handle_request().await)
}

async fn health_live() -> Json<Value> {
    Json(json!({ "status": "alive" }))
}
