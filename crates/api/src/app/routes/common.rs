use core::str::FromStr;

use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde::de::DeserializeOwned;

use calculaud_core::{DomainError, DomainResult};
use calculaud_infra::StoreResult;

use crate::app::errors;

/// JSON body extractor whose rejections use the API error envelope.
pub struct ApiJson<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(errors::json_rejection_to_response(rejection)),
        }
    }
}

/// Parse a path id; a malformed id is a 400 `invalid_id`.
pub fn parse_id<T>(raw: &str) -> Result<T, Response>
where
    T: FromStr<Err = DomainError>,
{
    raw.parse::<T>().map_err(errors::domain_error_to_response)
}

/// Unwrap a query-string parse or answer 400.
pub fn query<T>(parsed: DomainResult<T>) -> Result<T, Response> {
    parsed.map_err(errors::domain_error_to_response)
}

pub fn respond<T: Serialize>(status: StatusCode, result: StoreResult<T>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub fn no_content(result: StoreResult<()>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::header::CONTENT_TYPE;
    use calculaud_catalog::NewSupplier;
    use calculaud_purposes::PurposePatch;

    async fn extract<T: DeserializeOwned>(body: &'static str, content_type: Option<&str>) -> Result<T, Response> {
        let mut builder = axum::http::Request::builder().method("POST").uri("/");
        if let Some(content_type) = content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        let req = builder.body(Body::from(body)).unwrap();
        ApiJson::<T>::from_request(req, &()).await.map(|ApiJson(v)| v)
    }

    async fn error_code(resp: Response) -> (StatusCode, serde_json::Value) {
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn well_formed_bodies_pass_through() {
        let new: NewSupplier = extract(r#"{"name":"Acme"}"#, Some("application/json")).await.unwrap();
        assert_eq!(new.name, "Acme");
    }

    #[tokio::test]
    async fn unknown_enum_values_are_validation_errors() {
        let resp = extract::<PurposePatch>(r#"{"status":"BOGUS"}"#, Some("application/json"))
            .await
            .err()
            .unwrap();
        let (status, body) = error_code(resp).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
        assert!(body["message"].as_str().unwrap().contains("status"));
    }

    #[tokio::test]
    async fn malformed_or_untyped_bodies_are_validation_errors() {
        for (body, content_type) in [
            ("{", Some("application/json")),
            (r#"{"name":"Acme"}"#, None),
            (r#"{"name":7}"#, Some("application/json")),
        ] {
            let resp = extract::<NewSupplier>(body, content_type).await.err().unwrap();
            let (status, json) = error_code(resp).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(json["error"], "validation_error");
        }
    }
}
