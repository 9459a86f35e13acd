use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use calculaud_auth::permissions::AI_ASK;

use crate::app::dto::{AskRequest, AskResponse};
use crate::app::errors;
use crate::app::routes::common::ApiJson;
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new().route("/ask", post(ask))
}

/// Answers a free-form question; the caller's token is forwarded to the tool
/// server so tools see the same permissions.
pub async fn ask(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<AskRequest>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &AI_ASK) {
        return resp;
    }
    match services.ask(&body.question, principal.bearer_token()).await {
        Ok(answer) => (StatusCode::OK, Json(AskResponse { answer })).into_response(),
        Err(e) => errors::ai_error_to_response(e),
    }
}
