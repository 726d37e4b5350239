use crate::conversion::ConversionError;
use crate::server::AppContext;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use camrelay_common::Camera;
use serde::Deserialize;

pub fn api_routes() -> Router<AppContext> {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/availability", get(availability))
        .route("/switch", post(switch_camera))
        .route("/stop", post(stop))
}

async fn health(State(ctx): State<AppContext>) -> impl IntoResponse {
    let stats = ctx.orchestrator.get_stats().await;
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "session": {
            "state": stats.state,
            "is_converting": stats.is_converting,
        }
    }))
}

async fn stats(State(ctx): State<AppContext>) -> impl IntoResponse {
    Json(ctx.orchestrator.get_stats().await)
}

async fn availability(State(ctx): State<AppContext>) -> impl IntoResponse {
    let available = ctx.orchestrator.check_availability().await;
    Json(serde_json::json!({ "available": available }))
}

#[derive(Deserialize)]
struct SwitchRequest {
    camera: Camera,
}

async fn switch_camera(
    State(ctx): State<AppContext>,
    Json(req): Json<SwitchRequest>,
) -> impl IntoResponse {
    match ctx.orchestrator.switch_camera(req.camera).await {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "camera": req.camera })),
        ),
        Err(e) => error_response(e),
    }
}

async fn stop(State(ctx): State<AppContext>) -> impl IntoResponse {
    ctx.orchestrator.stop().await;
    StatusCode::NO_CONTENT
}

fn error_response(err: ConversionError) -> (StatusCode, Json<serde_json::Value>) {
    let status = match err {
        ConversionError::NotConverting => StatusCode::CONFLICT,
        ConversionError::AlreadyConverting => StatusCode::CONFLICT,
        ConversionError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        ConversionError::EngineUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({ "error": err.to_string() })))
}
