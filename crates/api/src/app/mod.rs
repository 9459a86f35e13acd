//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store selection and the operations handlers call
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs and query-string parsing
//! - `errors.rs`: consistent error responses
//! - `export.rs`: CSV rendering

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use calculaud_auth::Hs256JwtValidator;
use calculaud_infra::AppConfig;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod export;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &AppConfig) -> anyhow::Result<(Router, Arc<services::AppServices>)> {
    let services = Arc::new(services::build_services(config).await?);
    Ok((router(services.clone()), services))
}

/// Router over already built services. Tests use this with an in-memory
/// store and fake assistant.
pub fn router(services: Arc<services::AppServices>) -> Router {
    let auth = &services.config().auth;
    let jwt = Hs256JwtValidator::new(auth.jwt_secret.as_bytes())
        .with_issuer(auth.issuer.clone())
        .with_audience(auth.audience.clone());
    let auth_state = middleware::AuthState {
        jwt: Arc::new(jwt),
        roles: Arc::new(services.roles().clone()),
    };

    // Protected routes: require a valid bearer token.
    let protected = routes::router().layer(axum::middleware::from_fn_with_state(
        auth_state,
        middleware::auth_middleware,
    ));

    Router::new()
        .route("/", get(routes::system::root))
        .route("/health", get(routes::system::health))
        .route("/health/live", get(routes::system::live))
        .route("/health/ready", get(routes::system::ready))
        .route("/health/startup", get(routes::system::startup))
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(Extension(services)),
        )
}
