//! Suppliers, service types, services, budget sources and responsible
//! authorities.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    routing::get,
    Router,
};

use calculaud_auth::permissions::{PROCUREMENT_READ, PROCUREMENT_WRITE};
use calculaud_catalog::{
    BudgetSourcePatch, NewBudgetSource, NewResponsibleAuthority, NewService, NewServiceType, NewSupplier,
    ResponsibleAuthorityPatch, ServicePatch, ServiceTypePatch, SupplierPatch,
};
use calculaud_core::{BudgetSourceId, PageRequest, ResponsibleAuthorityId, ServiceId, ServiceTypeId, SupplierId};

use crate::app::dto::QueryParams;
use crate::app::routes::common::{ApiJson, no_content, parse_id, query, respond};
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::PrincipalContext;

pub fn supplier_router() -> Router {
    Router::new()
        .route("/", get(list_suppliers).post(create_supplier))
        .route(
            "/:id",
            get(get_supplier).patch(update_supplier).delete(delete_supplier),
        )
}

pub fn service_type_router() -> Router {
    Router::new()
        .route("/", get(list_service_types).post(create_service_type))
        .route(
            "/:id",
            get(get_service_type)
                .patch(update_service_type)
                .delete(delete_service_type),
        )
        .route("/:id/services", get(service_type_services))
}

pub fn service_router() -> Router {
    Router::new()
        .route("/", get(list_services).post(create_service))
        .route(
            "/:id",
            get(get_service).patch(update_service).delete(delete_service),
        )
}

pub fn budget_source_router() -> Router {
    Router::new()
        .route("/", get(list_budget_sources).post(create_budget_source))
        .route(
            "/:id",
            get(get_budget_source)
                .patch(update_budget_source)
                .delete(delete_budget_source),
        )
}

pub fn responsible_authority_router() -> Router {
    Router::new()
        .route("/", get(list_responsible_authorities).post(create_responsible_authority))
        .route(
            "/:id",
            get(get_responsible_authority)
                .patch(update_responsible_authority)
                .delete(delete_responsible_authority),
        )
}

fn search_and_page(
    services: &AppServices,
    params: &QueryParams,
) -> Result<(Option<String>, PageRequest), axum::response::Response> {
    let (default_limit, max_limit) = services.page_limits();
    let page = query(params.page_request(default_limit, max_limit))?;
    Ok((params.search(), page))
}

// -------------------------
// Suppliers
// -------------------------

pub async fn list_suppliers(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_READ) {
        return resp;
    }
    let (search, page) = match search_and_page(&services, &QueryParams::new(pairs)) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.list_suppliers(search.as_deref(), page).await)
}

pub async fn get_supplier(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_READ) {
        return resp;
    }
    let id: SupplierId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.supplier(id).await)
}

pub async fn create_supplier(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<NewSupplier>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_WRITE) {
        return resp;
    }
    respond(StatusCode::CREATED, services.create_supplier(body).await)
}

pub async fn update_supplier(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<SupplierPatch>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_WRITE) {
        return resp;
    }
    let id: SupplierId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.update_supplier(id, body).await)
}

pub async fn delete_supplier(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_WRITE) {
        return resp;
    }
    let id: SupplierId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    no_content(services.delete_supplier(id).await)
}

// -------------------------
// Service types
// -------------------------

pub async fn list_service_types(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_READ) {
        return resp;
    }
    let (search, page) = match search_and_page(&services, &QueryParams::new(pairs)) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.list_service_types(search.as_deref(), page).await)
}

pub async fn get_service_type(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_READ) {
        return resp;
    }
    let id: ServiceTypeId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.service_type(id).await)
}

pub async fn service_type_services(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_READ) {
        return resp;
    }
    let id: ServiceTypeId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.services_of_type(id).await)
}

pub async fn create_service_type(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<NewServiceType>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_WRITE) {
        return resp;
    }
    respond(StatusCode::CREATED, services.create_service_type(body).await)
}

pub async fn update_service_type(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<ServiceTypePatch>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_WRITE) {
        return resp;
    }
    let id: ServiceTypeId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.update_service_type(id, body).await)
}

pub async fn delete_service_type(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_WRITE) {
        return resp;
    }
    let id: ServiceTypeId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    no_content(services.delete_service_type(id).await)
}

// -------------------------
// Services
// -------------------------

pub async fn list_services(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_READ) {
        return resp;
    }
    let params = QueryParams::new(pairs);
    let (search, page) = match search_and_page(&services, &params) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let service_type_id = match query(params.parse::<ServiceTypeId>("service_type_id")) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(
        StatusCode::OK,
        services
            .list_services(search.as_deref(), service_type_id, page)
            .await,
    )
}

pub async fn get_service(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_READ) {
        return resp;
    }
    let id: ServiceId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.service(id).await)
}

pub async fn create_service(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<NewService>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_WRITE) {
        return resp;
    }
    respond(StatusCode::CREATED, services.create_service(body).await)
}

pub async fn update_service(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<ServicePatch>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_WRITE) {
        return resp;
    }
    let id: ServiceId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.update_service(id, body).await)
}

pub async fn delete_service(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_WRITE) {
        return resp;
    }
    let id: ServiceId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    no_content(services.delete_service(id).await)
}

// -------------------------
// Budget sources
// -------------------------

pub async fn list_budget_sources(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_READ) {
        return resp;
    }
    let (search, page) = match search_and_page(&services, &QueryParams::new(pairs)) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.list_budget_sources(search.as_deref(), page).await)
}

pub async fn get_budget_source(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_READ) {
        return resp;
    }
    let id: BudgetSourceId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.budget_source(id).await)
}

pub async fn create_budget_source(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<NewBudgetSource>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_WRITE) {
        return resp;
    }
    respond(StatusCode::CREATED, services.create_budget_source(body).await)
}

pub async fn update_budget_source(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<BudgetSourcePatch>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_WRITE) {
        return resp;
    }
    let id: BudgetSourceId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.update_budget_source(id, body).await)
}

pub async fn delete_budget_source(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_WRITE) {
        return resp;
    }
    let id: BudgetSourceId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    no_content(services.delete_budget_source(id).await)
}

// -------------------------
// Responsible authorities
// -------------------------

pub async fn list_responsible_authorities(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_READ) {
        return resp;
    }
    let (search, page) = match search_and_page(&services, &QueryParams::new(pairs)) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(
        StatusCode::OK,
        services.list_responsible_authorities(search.as_deref(), page).await,
    )
}

pub async fn get_responsible_authority(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_READ) {
        return resp;
    }
    let id: ResponsibleAuthorityId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.responsible_authority(id).await)
}

pub async fn create_responsible_authority(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<NewResponsibleAuthority>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_WRITE) {
        return resp;
    }
    respond(StatusCode::CREATED, services.create_responsible_authority(body).await)
}

pub async fn update_responsible_authority(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<ResponsibleAuthorityPatch>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_WRITE) {
        return resp;
    }
    let id: ResponsibleAuthorityId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.update_responsible_authority(id, body).await)
}

pub async fn delete_responsible_authority(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_WRITE) {
        return resp;
    }
    let id: ResponsibleAuthorityId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    no_content(services.delete_responsible_authority(id).await)
}
