use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    routing::get,
    Router,
};

use calculaud_auth::permissions::{PROCUREMENT_READ, PROCUREMENT_WRITE};
use calculaud_core::HierarchyId;
use calculaud_hierarchy::NewHierarchy;

use crate::app::dto::{self, QueryParams};
use crate::app::routes::common::{ApiJson, no_content, parse_id, query, respond};
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_hierarchies).post(create_hierarchy))
        .route("/tree", get(hierarchy_tree))
        .route(
            "/:id",
            get(get_hierarchy).patch(update_hierarchy).delete(delete_hierarchy),
        )
        .route("/:id/children", get(hierarchy_children))
}

pub async fn list_hierarchies(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_READ) {
        return resp;
    }
    let params = QueryParams::new(pairs);
    let (default_limit, max_limit) = services.page_limits();
    let (filter, page) = match (
        query(params.hierarchy_query()),
        query(params.page_request(default_limit, max_limit)),
    ) {
        (Ok(filter), Ok(page)) => (filter, page),
        (Err(resp), _) | (_, Err(resp)) => return resp,
    };
    respond(StatusCode::OK, services.list_hierarchies(&filter, page).await)
}

/// All roots with nested children, or the subtree under `parent_id`.
pub async fn hierarchy_tree(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_READ) {
        return resp;
    }
    let root = match query(QueryParams::new(pairs).parse::<HierarchyId>("parent_id")) {
        Ok(root) => root,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.hierarchy_tree(root).await)
}

pub async fn get_hierarchy(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_READ) {
        return resp;
    }
    let id: HierarchyId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.hierarchy(id).await)
}

pub async fn hierarchy_children(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_READ) {
        return resp;
    }
    let id: HierarchyId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.hierarchy_children(id).await)
}

pub async fn create_hierarchy(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<NewHierarchy>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_WRITE) {
        return resp;
    }
    respond(StatusCode::CREATED, services.create_hierarchy(body).await)
}

pub async fn update_hierarchy(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::UpdateHierarchyRequest>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_WRITE) {
        return resp;
    }
    let id: HierarchyId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.update_hierarchy(id, body.into()).await)
}

pub async fn delete_hierarchy(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_WRITE) {
        return resp;
    }
    let id: HierarchyId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    no_content(services.delete_hierarchy(id).await)
}
