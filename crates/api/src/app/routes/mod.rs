use axum::{routing::get, Router};

pub mod ai;
pub mod analytics;
pub mod catalog;
pub mod common;
pub mod hierarchies;
pub mod purposes;
pub mod system;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/hierarchies", hierarchies::router())
        .nest("/purposes", purposes::router())
        .nest("/emfs", purposes::emf_router())
        .nest("/costs", purposes::cost_router())
        .nest("/suppliers", catalog::supplier_router())
        .nest("/service-types", catalog::service_type_router())
        .nest("/services", catalog::service_router())
        .nest("/budget-sources", catalog::budget_source_router())
        .nest("/responsible-authorities", catalog::responsible_authority_router())
        .nest("/analytics", analytics::router())
        .nest("/ai", ai::router())
}
