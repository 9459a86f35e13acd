use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::Utc;

use calculaud_auth::permissions::{PROCUREMENT_READ, PROCUREMENT_WRITE};
use calculaud_core::{CostId, EmfId, PurposeId};
use calculaud_purposes::{CostPatch, EmfPatch, NewCost, NewEmf, NewPurpose, PurposePatch};

use crate::app::dto::QueryParams;
use crate::app::routes::common::{ApiJson, no_content, parse_id, query, respond};
use crate::app::services::AppServices;
use crate::app::{errors, export};
use crate::authz::require;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_purposes).post(create_purpose))
        .route("/export_csv", get(export_purposes_csv))
        .route("/flag-stuck", post(flag_stuck_purposes))
        .route(
            "/:id",
            get(get_purpose).patch(update_purpose).delete(delete_purpose),
        )
        .route("/:id/status-history", get(status_history))
        .route("/:id/emfs", post(create_emf))
}

pub fn emf_router() -> Router {
    Router::new()
        .route("/:id", get(get_emf).put(update_emf).delete(delete_emf))
        .route("/:id/costs", post(create_cost))
}

pub fn cost_router() -> Router {
    Router::new().route("/:id", get(get_cost).put(update_cost).delete(delete_cost))
}

// -------------------------
// Purposes
// -------------------------

pub async fn list_purposes(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_READ) {
        return resp;
    }
    let params = QueryParams::new(pairs);
    let (default_limit, max_limit) = services.page_limits();
    let purpose_query = match query(params.purpose_query()) {
        Ok(q) => q,
        Err(resp) => return resp,
    };
    let page = match query(params.page_request(default_limit, max_limit)) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.list_purposes(purpose_query, page).await)
}

/// Same filters and order as the list, unpaginated, as a CSV attachment.
pub async fn export_purposes_csv(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_READ) {
        return resp;
    }
    let purpose_query = match query(QueryParams::new(pairs).purpose_query()) {
        Ok(q) => q,
        Err(resp) => return resp,
    };
    let records = match services.export_purposes(purpose_query).await {
        Ok(records) => records,
        Err(e) => return errors::store_error_to_response(e),
    };
    let body = match export::purposes_csv(&records, services.exchange_rate()) {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(error = %e, "csv export failed");
            return errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "export_error", e.to_string());
        }
    };
    tracing::info!(rows = records.len(), "purposes exported");

    let disposition = format!("attachment; filename={}", export::file_name(Utc::now()));
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response()
}

pub async fn flag_stuck_purposes(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_WRITE) {
        return resp;
    }
    respond(StatusCode::OK, services.flag_stuck_purposes().await)
}

pub async fn get_purpose(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_READ) {
        return resp;
    }
    let id: PurposeId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.purpose(id).await)
}

pub async fn create_purpose(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<NewPurpose>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_WRITE) {
        return resp;
    }
    respond(
        StatusCode::CREATED,
        services.create_purpose(body, principal.subject()).await,
    )
}

pub async fn update_purpose(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<PurposePatch>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_WRITE) {
        return resp;
    }
    let id: PurposeId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(
        StatusCode::OK,
        services.update_purpose(id, body, principal.subject()).await,
    )
}

pub async fn delete_purpose(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_WRITE) {
        return resp;
    }
    let id: PurposeId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    no_content(services.delete_purpose(id).await)
}

pub async fn status_history(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_READ) {
        return resp;
    }
    let id: PurposeId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.status_history(id).await)
}

// -------------------------
// EMFs
// -------------------------

pub async fn create_emf(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(purpose_id): Path<String>,
    ApiJson(body): ApiJson<NewEmf>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_WRITE) {
        return resp;
    }
    let purpose_id: PurposeId = match parse_id(&purpose_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(StatusCode::CREATED, services.create_emf(purpose_id, body).await)
}

pub async fn get_emf(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_READ) {
        return resp;
    }
    let id: EmfId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.emf(id).await)
}

pub async fn update_emf(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<EmfPatch>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_WRITE) {
        return resp;
    }
    let id: EmfId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.update_emf(id, body).await)
}

pub async fn delete_emf(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_WRITE) {
        return resp;
    }
    let id: EmfId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    no_content(services.delete_emf(id).await)
}

// -------------------------
// Costs
// -------------------------

pub async fn create_cost(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(emf_id): Path<String>,
    ApiJson(body): ApiJson<NewCost>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_WRITE) {
        return resp;
    }
    let emf_id: EmfId = match parse_id(&emf_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(StatusCode::CREATED, services.create_cost(emf_id, body).await)
}

pub async fn get_cost(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_READ) {
        return resp;
    }
    let id: CostId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.cost(id).await)
}

pub async fn update_cost(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<CostPatch>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_WRITE) {
        return resp;
    }
    let id: CostId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.update_cost(id, body).await)
}

pub async fn delete_cost(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, &PROCUREMENT_WRITE) {
        return resp;
    }
    let id: CostId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    no_content(services.delete_cost(id).await)
}
