use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use calculaud_ai::AiError;
use calculaud_core::DomainError;
use calculaud_infra::StoreError;

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::InvariantViolation(msg) => {
            json_error(StatusCode::BAD_REQUEST, "invariant_violation", msg)
        }
        e @ DomainError::InvalidId(_) => json_error(StatusCode::BAD_REQUEST, "invalid_id", e.to_string()),
        DomainError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        DomainError::Conflict(msg) => json_error(StatusCode::BAD_REQUEST, "conflict", msg),
    }
}

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::Domain(e) => domain_error_to_response(e),
        StoreError::Conflict(msg) => json_error(StatusCode::BAD_REQUEST, "conflict", msg),
        StoreError::Database(e) => {
            tracing::error!(error = %e, "database error");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "database error")
        }
        StoreError::Unavailable(msg) => {
            tracing::error!(error = %msg, "store unavailable");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg)
        }
    }
}

pub fn ai_error_to_response(err: AiError) -> axum::response::Response {
    match err {
        AiError::InvalidRequest(_) => json_error(StatusCode::BAD_REQUEST, "validation_error", err.to_string()),
        AiError::NotConfigured(_) | AiError::Upstream(_) => {
            tracing::warn!(error = %err, "assistant request failed");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "ai_unavailable", err.to_string())
        }
    }
}

/// Unreadable or mistyped request bodies are validation errors like any other.
pub fn json_rejection_to_response(rejection: JsonRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", rejection.body_text())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_client_statuses() {
        let cases = [
            (DomainError::validation("bad"), StatusCode::BAD_REQUEST),
            (DomainError::missing("Purpose", 9), StatusCode::NOT_FOUND),
            (DomainError::conflict("dup"), StatusCode::BAD_REQUEST),
            (DomainError::invariant("cycle"), StatusCode::BAD_REQUEST),
        ];
        for (err, status) in cases {
            assert_eq!(domain_error_to_response(err).status(), status);
        }
    }

    #[test]
    fn assistant_failures_are_service_unavailable() {
        let resp = ai_error_to_response(AiError::Upstream("timeout".into()));
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let resp = ai_error_to_response(AiError::InvalidRequest("empty".into()));
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn unavailable_store_is_a_server_error() {
        let resp = store_error_to_response(StoreError::Unavailable("lock poisoned".into()));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
