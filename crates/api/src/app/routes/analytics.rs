//! Read-only dashboards. Every endpoint accepts the shared purpose filter.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    routing::get,
    Router,
};

use calculaud_auth::permissions::ANALYTICS_READ;
use calculaud_core::HierarchyId;
use calculaud_hierarchy::HierarchyType;
use calculaud_purposes::{PurposeFilter, PurposeStatus};

use crate::app::dto::QueryParams;
use crate::app::routes::common::{query, respond};
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/services/quantities", get(services_quantities))
        .route("/service-types/distribution", get(service_types_distribution))
        .route("/statuses/distribution", get(statuses_distribution))
        .route(
            "/service-types/:status/distribution",
            get(service_type_status_distribution),
        )
        .route(
            "/costs/distribution/by-service-type",
            get(cost_by_service_type),
        )
        .route(
            "/costs/distribution/by-budget-source",
            get(cost_by_budget_source),
        )
        .route("/expenditure/timeline", get(expenditure_timeline))
        .route("/hierarchies/distribution", get(hierarchy_distribution))
}

/// Authorize and parse the shared filter.
fn analytics_filter(
    principal: &PrincipalContext,
    params: &QueryParams,
) -> Result<PurposeFilter, axum::response::Response> {
    require(principal, &ANALYTICS_READ)?;
    query(params.purpose_filter())
}

pub async fn services_quantities(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> axum::response::Response {
    let filter = match analytics_filter(&principal, &QueryParams::new(pairs)) {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.services_quantities(&filter).await)
}

pub async fn service_types_distribution(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> axum::response::Response {
    let filter = match analytics_filter(&principal, &QueryParams::new(pairs)) {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.service_types_distribution(&filter).await)
}

pub async fn statuses_distribution(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> axum::response::Response {
    let filter = match analytics_filter(&principal, &QueryParams::new(pairs)) {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.statuses_distribution(&filter).await)
}

pub async fn service_type_status_distribution(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(status): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> axum::response::Response {
    let filter = match analytics_filter(&principal, &QueryParams::new(pairs)) {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    let target = match query(status.parse::<PurposeStatus>()) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    respond(
        StatusCode::OK,
        services.service_type_status_distribution(&filter, target).await,
    )
}

pub async fn cost_by_service_type(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> axum::response::Response {
    let filter = match analytics_filter(&principal, &QueryParams::new(pairs)) {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.cost_by_service_type(&filter).await)
}

pub async fn cost_by_budget_source(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> axum::response::Response {
    let filter = match analytics_filter(&principal, &QueryParams::new(pairs)) {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.cost_by_budget_source(&filter).await)
}

pub async fn expenditure_timeline(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> axum::response::Response {
    let params = QueryParams::new(pairs);
    let filter = match analytics_filter(&principal, &params) {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    let (grouping, currency) = match (query(params.time_grouping()), query(params.currency())) {
        (Ok(g), Ok(c)) => (g, c),
        (Err(resp), _) | (_, Err(resp)) => return resp,
    };
    respond(
        StatusCode::OK,
        services.expenditure_timeline(&filter, grouping, currency).await,
    )
}

pub async fn hierarchy_distribution(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> axum::response::Response {
    let params = QueryParams::new(pairs);
    let filter = match analytics_filter(&principal, &params) {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    let (parent_id, level) = match (
        query(params.parse::<HierarchyId>("parent_id")),
        query(params.parse::<HierarchyType>("level")),
    ) {
        (Ok(p), Ok(l)) => (p, l),
        (Err(resp), _) | (_, Err(resp)) => return resp,
    };
    respond(
        StatusCode::OK,
        services.hierarchy_distribution(&filter, parent_id, level).await,
    )
}
