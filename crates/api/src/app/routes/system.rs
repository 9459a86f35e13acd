use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;

use crate::app::services::{AppServices, CheckStatus};
use crate::context::PrincipalContext;

pub async fn root(Extension(services): Extension<Arc<AppServices>>) -> impl IntoResponse {
    let config = services.config();
    Json(json!({
        "message": format!("{} API", config.app_name),
        "version": config.app_version,
    }))
}

/// Full report; 503 when the database check fails.
pub async fn health(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let report = services.health().await;
    let status = match report.status {
        CheckStatus::Healthy => StatusCode::OK,
        CheckStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(report)).into_response()
}

pub async fn live() -> impl IntoResponse {
    Json(json!({ "status": "alive" }))
}

pub async fn ready(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let database = services.check_database().await;
    match database.status {
        CheckStatus::Healthy => (StatusCode::OK, Json(json!({ "status": "ready" }))).into_response(),
        CheckStatus::Unhealthy => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not_ready", "database": database })),
        )
            .into_response(),
    }
}

pub async fn startup(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    if services.is_started() {
        (StatusCode::OK, Json(json!({ "status": "started" }))).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "starting" })),
        )
            .into_response()
    }
}

pub async fn whoami(Extension(principal): Extension<PrincipalContext>) -> impl IntoResponse {
    Json(json!({
        "subject": principal.subject(),
        "roles": principal.roles().iter().map(|r| r.as_str()).collect::<Vec<_>>(),
        "permissions": principal.permissions().iter().map(|p| p.as_str()).collect::<Vec<_>>(),
    }))
}
