//! Application services: the glue between HTTP handlers, the domain crates
//! and the store.
//!
//! Handlers stay thin; everything that needs more than one store call
//! (reference checks, uniqueness, hierarchy planning, analytics loading)
//! lives here.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use calculaud_ai::{AiError, Assistant, validate_question};
use calculaud_analytics::{
    BudgetSourceCostItem, Distribution, ExpenditureTimeline, HierarchyDistribution, ServiceTypeCostItem, ServiceTypeCount,
    ServiceTypeQuantities, StatusCount, StatusTransitionDistribution, TimeGrouping,
};
use calculaud_auth::RolePolicy;
use calculaud_catalog::{
    BudgetSource, BudgetSourcePatch, NewBudgetSource, NewResponsibleAuthority, NewService, NewServiceType,
    NewSupplier, ResponsibleAuthority, ResponsibleAuthorityPatch, Service, ServicePatch, ServiceType,
    ServiceTypePatch, Supplier, SupplierPatch, ensure_unique_name, name_matches,
};
use calculaud_core::{
    BudgetSourceId, CostId, DomainError, DomainResult, EmfId, HierarchyId, Page, PageRequest, PurposeId,
    ResponsibleAuthorityId, ServiceId, ServiceTypeId, SupplierId,
};
use calculaud_hierarchy::{
    Hierarchy, HierarchyForest, HierarchyPatch, HierarchyQuery, HierarchyTree, HierarchyType,
    NewHierarchy,
};
use calculaud_infra::ai::build_assistant;
use calculaud_infra::{
    AppConfig, InMemoryStore, PostgresStore, SharedStore, StoreError, StoreResult, run_stuck_scan,
};
use calculaud_purposes::purpose::{ContentLine, unknown_service};
use calculaud_purposes::{
    Cost, CostPatch, Currency, Emf, EmfPatch, ExchangeRate, NewCost, NewEmf, NewPurpose,
    PurposeFilter, PurposePatch, PurposeQuery, PurposeRecord, PurposeStatus, StatusChange,
    StuckPolicy, StuckReport,
};

use crate::app::dto::PurposeView;

pub struct AppServices {
    store: SharedStore,
    config: AppConfig,
    assistant: Option<Assistant>,
    rate: ExchangeRate,
    roles: RolePolicy,
    stuck_policy: StuckPolicy,
    // Serializes read-plan-write sequences that the store cannot check alone.
    hierarchy_writes: Mutex<()>,
    catalog_writes: Mutex<()>,
    started: AtomicBool,
    started_at: Instant,
}

/// Connect the configured store, run migrations and path backfill, and build
/// the assistant when an API key is present.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let store: SharedStore = match &config.database_url {
        Some(url) => {
            let store = PostgresStore::connect(url, config.database_max_connections).await?;
            store.migrate().await?;
            info!("connected to postgres");
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory store (data is lost on restart)");
            Arc::new(InMemoryStore::new())
        }
    };

    let assistant = build_assistant(&config.ai)?;
    if assistant.is_none() {
        info!("LLM_API_KEY not set, assistant disabled");
    }

    let services = AppServices::new(store, config.clone(), assistant)?;
    let repaired = services.backfill_hierarchy_paths().await?;
    if repaired > 0 {
        info!(repaired, "backfilled stale hierarchy paths");
    }
    services.mark_started();
    Ok(services)
}

fn unknown(entity: &str, id: impl core::fmt::Display) -> StoreError {
    StoreError::Domain(DomainError::validation(format!("{entity} with ID {id} does not exist")))
}

fn missing(entity: &str, id: impl core::fmt::Display) -> StoreError {
    StoreError::Domain(DomainError::missing(entity, id))
}

/// Ids a purpose write points at.
struct PurposeRefs<'a> {
    hierarchy_id: Option<HierarchyId>,
    supplier_id: Option<SupplierId>,
    service_type_id: Option<ServiceTypeId>,
    budget_source_id: Option<BudgetSourceId>,
    contents: Option<&'a [ContentLine]>,
}

/// Catalog list order: by name, then id.
fn page_by_name<T>(mut items: Vec<T>, name: impl Fn(&T) -> (&str, i64), page: PageRequest) -> Page<T> {
    items.sort_by(|a, b| name(a).cmp(&name(b)));
    page.slice(items)
}

impl AppServices {
    pub fn new(store: SharedStore, config: AppConfig, assistant: Option<Assistant>) -> DomainResult<Self> {
        let rate = ExchangeRate::new(config.usd_to_ils_rate)?;
        let roles = RolePolicy::new(config.auth.admin_role.clone(), config.auth.user_role.clone());
        let stuck_policy = StuckPolicy::new(config.stuck_threshold_days);
        Ok(Self {
            store,
            config,
            assistant,
            rate,
            roles,
            stuck_policy,
            hierarchy_writes: Mutex::new(()),
            catalog_writes: Mutex::new(()),
            started: AtomicBool::new(false),
            started_at: Instant::now(),
        })
    }

    pub fn store(&self) -> SharedStore {
        self.store.clone()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn roles(&self) -> &RolePolicy {
        &self.roles
    }

    pub fn stuck_policy(&self) -> StuckPolicy {
        self.stuck_policy
    }

    pub fn page_limits(&self) -> (u32, u32) {
        (self.config.default_page_size, self.config.max_page_size)
    }

    pub fn exchange_rate(&self) -> ExchangeRate {
        self.rate
    }

    pub fn mark_started(&self) {
        self.started.store(true, Ordering::SeqCst);
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    // -------------------------
    // Hierarchies
    // -------------------------

    async fn forest(&self) -> StoreResult<HierarchyForest> {
        Ok(HierarchyForest::new(self.store.hierarchies().await?))
    }

    pub async fn list_hierarchies(&self, query: &HierarchyQuery, page: PageRequest) -> StoreResult<Page<Hierarchy>> {
        let nodes = self.store.hierarchies().await?;
        Ok(page.slice(query.apply(nodes.iter())))
    }

    pub async fn hierarchy(&self, id: HierarchyId) -> StoreResult<Hierarchy> {
        let forest = self.forest().await?;
        Ok(forest.require(id)?.clone())
    }

    pub async fn hierarchy_children(&self, id: HierarchyId) -> StoreResult<Vec<Hierarchy>> {
        let forest = self.forest().await?;
        forest.require(id)?;
        Ok(forest.children(Some(id)).into_iter().cloned().collect())
    }

    pub async fn hierarchy_tree(&self, root: Option<HierarchyId>) -> StoreResult<Vec<HierarchyTree>> {
        Ok(self.forest().await?.tree(root)?)
    }

    pub async fn create_hierarchy(&self, new: NewHierarchy) -> StoreResult<Hierarchy> {
        let _guard = self.hierarchy_writes.lock().await;
        let prepared = self.forest().await?.prepare_create(&new)?;
        let created = self.store.insert_hierarchy(prepared).await?;
        info!(hierarchy_id = %created.id, path = %created.path, "hierarchy created");
        Ok(created)
    }

    pub async fn update_hierarchy(&self, id: HierarchyId, patch: HierarchyPatch) -> StoreResult<Hierarchy> {
        let _guard = self.hierarchy_writes.lock().await;
        let changed = self.forest().await?.prepare_update(id, &patch)?;
        self.store.save_hierarchies(&changed).await?;
        info!(hierarchy_id = %id, repathed = changed.len().saturating_sub(1), "hierarchy updated");
        changed.into_iter().next().ok_or_else(|| missing("Hierarchy", id))
    }

    pub async fn delete_hierarchy(&self, id: HierarchyId) -> StoreResult<()> {
        let _guard = self.hierarchy_writes.lock().await;
        self.forest().await?.ensure_deletable(id)?;
        let purposes = self.store.count_purposes_in_hierarchy(id).await?;
        if purposes > 0 {
            return Err(DomainError::invariant(format!(
                "Cannot delete hierarchy with {purposes} purposes. Please reassign or delete purposes first."
            ))
            .into());
        }
        self.store.delete_hierarchy(id).await?;
        info!(hierarchy_id = %id, "hierarchy deleted");
        Ok(())
    }

    /// Rewrite cached paths that disagree with the parent chain. Returns how
    /// many nodes were repaired.
    pub async fn backfill_hierarchy_paths(&self) -> StoreResult<usize> {
        let _guard = self.hierarchy_writes.lock().await;
        let stale = self.forest().await?.stale_paths();
        if !stale.is_empty() {
            self.store.save_hierarchies(&stale).await?;
        }
        Ok(stale.len())
    }

    // -------------------------
    // Suppliers
    // -------------------------

    pub async fn list_suppliers(&self, search: Option<&str>, page: PageRequest) -> StoreResult<Page<Supplier>> {
        let items: Vec<_> = self
            .store
            .suppliers()
            .await?
            .into_iter()
            .filter(|s| name_matches(&s.name, search))
            .collect();
        Ok(page_by_name(items, |s| (s.name.as_str(), s.id.get()), page))
    }

    pub async fn supplier(&self, id: SupplierId) -> StoreResult<Supplier> {
        self.store.supplier(id).await?.ok_or_else(|| missing("Supplier", id))
    }

    pub async fn create_supplier(&self, new: NewSupplier) -> StoreResult<Supplier> {
        let new = new.validated()?;
        let _guard = self.catalog_writes.lock().await;
        let existing = self.store.suppliers().await?;
        ensure_unique_name("Supplier", existing.iter().map(|s| (s.id, s.name.as_str())), &new.name, None)?;
        let created = self.store.insert_supplier(new).await?;
        info!(supplier_id = %created.id, "supplier created");
        Ok(created)
    }

    pub async fn update_supplier(&self, id: SupplierId, patch: SupplierPatch) -> StoreResult<Supplier> {
        let _guard = self.catalog_writes.lock().await;
        let updated = patch.apply(&self.supplier(id).await?)?;
        let existing = self.store.suppliers().await?;
        ensure_unique_name(
            "Supplier",
            existing.iter().map(|s| (s.id, s.name.as_str())),
            &updated.name,
            Some(id),
        )?;
        self.store.save_supplier(&updated).await?;
        Ok(updated)
    }

    pub async fn delete_supplier(&self, id: SupplierId) -> StoreResult<()> {
        self.store.delete_supplier(id).await?;
        info!(supplier_id = %id, "supplier deleted");
        Ok(())
    }

    // -------------------------
    // Service types
    // -------------------------

    pub async fn list_service_types(
        &self,
        search: Option<&str>,
        page: PageRequest,
    ) -> StoreResult<Page<ServiceType>> {
        let items: Vec<_> = self
            .store
            .service_types()
            .await?
            .into_iter()
            .filter(|t| name_matches(&t.name, search))
            .collect();
        Ok(page_by_name(items, |t| (t.name.as_str(), t.id.get()), page))
    }

    pub async fn service_type(&self, id: ServiceTypeId) -> StoreResult<ServiceType> {
        self.store.service_type(id).await?.ok_or_else(|| missing("Service type", id))
    }

    pub async fn create_service_type(&self, new: NewServiceType) -> StoreResult<ServiceType> {
        let new = new.validated()?;
        let _guard = self.catalog_writes.lock().await;
        let existing = self.store.service_types().await?;
        ensure_unique_name(
            "Service type",
            existing.iter().map(|t| (t.id, t.name.as_str())),
            &new.name,
            None,
        )?;
        let created = self.store.insert_service_type(new).await?;
        info!(service_type_id = %created.id, "service type created");
        Ok(created)
    }

    pub async fn update_service_type(&self, id: ServiceTypeId, patch: ServiceTypePatch) -> StoreResult<ServiceType> {
        let _guard = self.catalog_writes.lock().await;
        let updated = patch.apply(&self.service_type(id).await?)?;
        let existing = self.store.service_types().await?;
        ensure_unique_name(
            "Service type",
            existing.iter().map(|t| (t.id, t.name.as_str())),
            &updated.name,
            Some(id),
        )?;
        self.store.save_service_type(&updated).await?;
        Ok(updated)
    }

    pub async fn delete_service_type(&self, id: ServiceTypeId) -> StoreResult<()> {
        self.store.delete_service_type(id).await?;
        info!(service_type_id = %id, "service type deleted");
        Ok(())
    }

    pub async fn services_of_type(&self, id: ServiceTypeId) -> StoreResult<Vec<Service>> {
        self.service_type(id).await?;
        let mut services = self.store.services(Some(id)).await?;
        services.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(services)
    }

    // -------------------------
    // Services
    // -------------------------

    pub async fn list_services(
        &self,
        search: Option<&str>,
        service_type_id: Option<ServiceTypeId>,
        page: PageRequest,
    ) -> StoreResult<Page<Service>> {
        let items: Vec<_> = self
            .store
            .services(service_type_id)
            .await?
            .into_iter()
            .filter(|s| name_matches(&s.name, search))
            .collect();
        Ok(page_by_name(items, |s| (s.name.as_str(), s.id.get()), page))
    }

    pub async fn service(&self, id: ServiceId) -> StoreResult<Service> {
        self.store.service(id).await?.ok_or_else(|| missing("Service", id))
    }

    async fn ensure_unique_service(&self, service: &NewService, exclude: Option<ServiceId>) -> StoreResult<()> {
        let siblings = self.store.services(Some(service.service_type_id)).await?;
        ensure_unique_name(
            "Service",
            siblings.iter().map(|s| (s.id, s.name.as_str())),
            &service.name,
            exclude,
        )?;
        Ok(())
    }

    pub async fn create_service(&self, new: NewService) -> StoreResult<Service> {
        let new = new.validated()?;
        let _guard = self.catalog_writes.lock().await;
        self.service_type(new.service_type_id).await?;
        self.ensure_unique_service(&new, None).await?;
        let created = self.store.insert_service(new).await?;
        info!(service_id = %created.id, service_type_id = %created.service_type_id, "service created");
        Ok(created)
    }

    pub async fn update_service(&self, id: ServiceId, patch: ServicePatch) -> StoreResult<Service> {
        let _guard = self.catalog_writes.lock().await;
        let updated = patch.apply(&self.service(id).await?)?;
        self.service_type(updated.service_type_id).await?;
        let candidate = NewService {
            name: updated.name.clone(),
            service_type_id: updated.service_type_id,
        };
        self.ensure_unique_service(&candidate, Some(id)).await?;
        self.store.save_service(&updated).await?;
        Ok(updated)
    }

    pub async fn delete_service(&self, id: ServiceId) -> StoreResult<()> {
        self.store.delete_service(id).await?;
        info!(service_id = %id, "service deleted");
        Ok(())
    }

    // -------------------------
    // Budget sources
    // -------------------------

    pub async fn list_budget_sources(
        &self,
        search: Option<&str>,
        page: PageRequest,
    ) -> StoreResult<Page<BudgetSource>> {
        let items: Vec<_> = self
            .store
            .budget_sources()
            .await?
            .into_iter()
            .filter(|b| name_matches(&b.name, search))
            .collect();
        Ok(page_by_name(items, |b| (b.name.as_str(), b.id.get()), page))
    }

    pub async fn budget_source(&self, id: BudgetSourceId) -> StoreResult<BudgetSource> {
        self.store.budget_source(id).await?.ok_or_else(|| missing("Budget source", id))
    }

    pub async fn create_budget_source(&self, new: NewBudgetSource) -> StoreResult<BudgetSource> {
        let new = new.validated()?;
        let _guard = self.catalog_writes.lock().await;
        let existing = self.store.budget_sources().await?;
        ensure_unique_name(
            "Budget source",
            existing.iter().map(|b| (b.id, b.name.as_str())),
            &new.name,
            None,
        )?;
        let created = self.store.insert_budget_source(new).await?;
        info!(budget_source_id = %created.id, "budget source created");
        Ok(created)
    }

    pub async fn update_budget_source(&self, id: BudgetSourceId, patch: BudgetSourcePatch) -> StoreResult<BudgetSource> {
        let _guard = self.catalog_writes.lock().await;
        let updated = patch.apply(&self.budget_source(id).await?)?;
        let existing = self.store.budget_sources().await?;
        ensure_unique_name(
            "Budget source",
            existing.iter().map(|b| (b.id, b.name.as_str())),
            &updated.name,
            Some(id),
        )?;
        self.store.save_budget_source(&updated).await?;
        Ok(updated)
    }

    pub async fn delete_budget_source(&self, id: BudgetSourceId) -> StoreResult<()> {
        self.store.delete_budget_source(id).await?;
        info!(budget_source_id = %id, "budget source deleted");
        Ok(())
    }

    // -------------------------
    // Responsible authorities
    // -------------------------

    pub async fn list_responsible_authorities(
        &self,
        search: Option<&str>,
        page: PageRequest,
    ) -> StoreResult<Page<ResponsibleAuthority>> {
        let items: Vec<_> = self
            .store
            .responsible_authorities()
            .await?
            .into_iter()
            .filter(|a| name_matches(&a.name, search))
            .collect();
        Ok(page_by_name(items, |a| (a.name.as_str(), a.id.get()), page))
    }

    pub async fn responsible_authority(&self, id: ResponsibleAuthorityId) -> StoreResult<ResponsibleAuthority> {
        self.store
            .responsible_authority(id)
            .await?
            .ok_or_else(|| missing("Responsible authority", id))
    }

    pub async fn create_responsible_authority(
        &self,
        new: NewResponsibleAuthority,
    ) -> StoreResult<ResponsibleAuthority> {
        let new = new.validated()?;
        let _guard = self.catalog_writes.lock().await;
        let existing = self.store.responsible_authorities().await?;
        ensure_unique_name(
            "Responsible authority",
            existing.iter().map(|a| (a.id, a.name.as_str())),
            &new.name,
            None,
        )?;
        let created = self.store.insert_responsible_authority(new, Utc::now()).await?;
        info!(responsible_authority_id = %created.id, "responsible authority created");
        Ok(created)
    }

    pub async fn update_responsible_authority(
        &self,
        id: ResponsibleAuthorityId,
        patch: ResponsibleAuthorityPatch,
    ) -> StoreResult<ResponsibleAuthority> {
        let _guard = self.catalog_writes.lock().await;
        let updated = patch.apply(&self.responsible_authority(id).await?)?;
        let existing = self.store.responsible_authorities().await?;
        ensure_unique_name(
            "Responsible authority",
            existing.iter().map(|a| (a.id, a.name.as_str())),
            &updated.name,
            Some(id),
        )?;
        self.store.save_responsible_authority(&updated).await?;
        Ok(updated)
    }

    pub async fn delete_responsible_authority(&self, id: ResponsibleAuthorityId) -> StoreResult<()> {
        self.store.delete_responsible_authority(id).await?;
        info!(responsible_authority_id = %id, "responsible authority deleted");
        Ok(())
    }

    // -------------------------
    // Purposes
    // -------------------------

    /// Referenced rows must exist before a purpose may point at them. The
    /// store checks again while it writes.
    async fn check_purpose_refs(&self, refs: PurposeRefs<'_>) -> StoreResult<()> {
        let PurposeRefs {
            hierarchy_id,
            supplier_id,
            service_type_id,
            budget_source_id,
            contents,
        } = refs;
        if let Some(id) = hierarchy_id {
            if self.forest().await?.get(id).is_none() {
                return Err(unknown("Hierarchy", id));
            }
        }
        if let Some(id) = supplier_id {
            if self.store.supplier(id).await?.is_none() {
                return Err(unknown("Supplier", id));
            }
        }
        if let Some(id) = service_type_id {
            if self.store.service_type(id).await?.is_none() {
                return Err(unknown("Service type", id));
            }
        }
        if let Some(id) = budget_source_id {
            if self.store.budget_source(id).await?.is_none() {
                return Err(unknown("Budget source", id));
            }
        }
        for line in contents.unwrap_or_default() {
            if self.store.service(line.service_id).await?.is_none() {
                return Err(unknown_service(line.service_id).into());
            }
        }
        Ok(())
    }

    /// Filtered records in display order.
    async fn query_purposes(&self, query: PurposeQuery, now: DateTime<Utc>) -> StoreResult<Vec<PurposeRecord>> {
        let records = self.store.load_purposes(&query.filter).await?;
        // The store already applied the filter; only search and order remain.
        let rest = PurposeQuery {
            filter: PurposeFilter::default(),
            ..query
        };
        Ok(rest.apply(records, &[], now))
    }

    pub async fn list_purposes(&self, query: PurposeQuery, page: PageRequest) -> StoreResult<Page<PurposeView>> {
        let now = Utc::now();
        let records = self.query_purposes(query, now).await?;
        Ok(page.slice(records).map(|r| PurposeView::new(r, now)))
    }

    pub async fn export_purposes(&self, query: PurposeQuery) -> StoreResult<Vec<PurposeRecord>> {
        self.query_purposes(query, Utc::now()).await
    }

    async fn purpose_record(&self, id: PurposeId) -> StoreResult<PurposeRecord> {
        self.store.purpose(id).await?.ok_or_else(|| missing("Purpose", id))
    }

    pub async fn purpose(&self, id: PurposeId) -> StoreResult<PurposeView> {
        Ok(PurposeView::new(self.purpose_record(id).await?, Utc::now()))
    }

    pub async fn create_purpose(&self, new: NewPurpose, changed_by: &str) -> StoreResult<PurposeView> {
        new.validate()?;
        // A hierarchy delete must not land between the check and the insert.
        let _guard = match new.hierarchy_id {
            Some(_) => Some(self.hierarchy_writes.lock().await),
            None => None,
        };
        self.check_purpose_refs(PurposeRefs {
            hierarchy_id: new.hierarchy_id,
            supplier_id: new.supplier_id,
            service_type_id: new.service_type_id,
            budget_source_id: new.budget_source_id,
            contents: Some(&new.contents),
        })
        .await?;
        let now = Utc::now();
        let record = self.store.create_purpose(&new, now, Some(changed_by)).await?;
        info!(purpose_id = %record.purpose.id, status = %record.purpose.status, "purpose created");
        Ok(PurposeView::new(record, now))
    }

    pub async fn update_purpose(&self, id: PurposeId, patch: PurposePatch, changed_by: &str) -> StoreResult<PurposeView> {
        let _guard = match patch.hierarchy_id {
            Some(Some(_)) => Some(self.hierarchy_writes.lock().await),
            _ => None,
        };
        self.purpose_record(id).await?;
        self.check_purpose_refs(PurposeRefs {
            hierarchy_id: patch.hierarchy_id.flatten(),
            supplier_id: patch.supplier_id.flatten(),
            service_type_id: patch.service_type_id.flatten(),
            budget_source_id: patch.budget_source_id.flatten(),
            contents: patch.contents.as_deref(),
        })
        .await?;
        let now = Utc::now();
        let record = self.store.update_purpose(id, &patch, now, Some(changed_by)).await?;
        info!(purpose_id = %id, status = %record.purpose.status, "purpose updated");
        Ok(PurposeView::new(record, now))
    }

    pub async fn delete_purpose(&self, id: PurposeId) -> StoreResult<()> {
        self.store.delete_purpose(id).await?;
        info!(purpose_id = %id, "purpose deleted");
        Ok(())
    }

    /// Newest change first.
    pub async fn status_history(&self, id: PurposeId) -> StoreResult<Vec<StatusChange>> {
        let mut history = self.purpose_record(id).await?.status_history;
        // Stored oldest first; reversing before the stable sort keeps the
        // later row first when two changes share a timestamp.
        history.reverse();
        history.sort_by(|a, b| b.changed_at.cmp(&a.changed_at));
        Ok(history)
    }

    pub async fn flag_stuck_purposes(&self) -> StoreResult<StuckReport> {
        run_stuck_scan(self.store.as_ref(), self.stuck_policy, Utc::now()).await
    }

    // -------------------------
    // EMFs and costs
    // -------------------------

    pub async fn emf(&self, id: EmfId) -> StoreResult<Emf> {
        self.store.emf(id).await?.ok_or_else(|| missing("EMF", id))
    }

    pub async fn create_emf(&self, purpose_id: PurposeId, new: NewEmf) -> StoreResult<Emf> {
        let new = new.validated()?;
        let emf = self.store.create_emf(purpose_id, new, Utc::now()).await?;
        info!(purpose_id = %purpose_id, emf_id = %emf.emf_id, "emf created");
        Ok(emf)
    }

    pub async fn update_emf(&self, id: EmfId, patch: EmfPatch) -> StoreResult<Emf> {
        self.store.update_emf(id, &patch, Utc::now()).await
    }

    pub async fn delete_emf(&self, id: EmfId) -> StoreResult<()> {
        self.store.delete_emf(id, Utc::now()).await?;
        info!(emf = %id, "emf deleted");
        Ok(())
    }

    pub async fn cost(&self, id: CostId) -> StoreResult<Cost> {
        self.store.cost(id).await?.ok_or_else(|| missing("Cost", id))
    }

    pub async fn create_cost(&self, emf_id: EmfId, new: NewCost) -> StoreResult<Cost> {
        new.validate()?;
        self.store.create_cost(emf_id, &new, Utc::now()).await
    }

    pub async fn update_cost(&self, id: CostId, patch: CostPatch) -> StoreResult<Cost> {
        self.store.update_cost(id, &patch, Utc::now()).await
    }

    pub async fn delete_cost(&self, id: CostId) -> StoreResult<()> {
        self.store.delete_cost(id, Utc::now()).await
    }

    // -------------------------
    // Analytics
    // -------------------------

    pub async fn services_quantities(&self, filter: &PurposeFilter) -> StoreResult<Distribution<ServiceTypeQuantities>> {
        let records = self.store.load_purposes(filter).await?;
        Ok(calculaud_analytics::services_quantities(&records))
    }

    pub async fn service_types_distribution(
        &self,
        filter: &PurposeFilter,
    ) -> StoreResult<Distribution<ServiceTypeCount>> {
        let records = self.store.load_purposes(&filter.live()).await?;
        Ok(calculaud_analytics::service_types_distribution(&records))
    }

    pub async fn statuses_distribution(&self, filter: &PurposeFilter) -> StoreResult<Distribution<StatusCount>> {
        let records = self.store.load_purposes(&filter.live()).await?;
        Ok(calculaud_analytics::statuses_distribution(&records))
    }

    pub async fn service_type_status_distribution(
        &self,
        filter: &PurposeFilter,
        target: PurposeStatus,
    ) -> StoreResult<StatusTransitionDistribution> {
        // The date window applies to the status change, not to creation.
        let records = self.store.load_purposes(&filter.without_dates()).await?;
        Ok(calculaud_analytics::service_type_status_distribution(&records, target, filter))
    }

    pub async fn cost_by_service_type(&self, filter: &PurposeFilter) -> StoreResult<Distribution<ServiceTypeCostItem>> {
        let records = self.store.load_purposes(filter).await?;
        Ok(calculaud_analytics::cost_by_service_type(&records, self.rate))
    }

    pub async fn cost_by_budget_source(
        &self,
        filter: &PurposeFilter,
    ) -> StoreResult<Distribution<BudgetSourceCostItem>> {
        let records = self.store.load_purposes(filter).await?;
        Ok(calculaud_analytics::cost_by_budget_source(&records, self.rate))
    }

    pub async fn expenditure_timeline(
        &self,
        filter: &PurposeFilter,
        grouping: TimeGrouping,
        currency: Currency,
    ) -> StoreResult<ExpenditureTimeline> {
        let records = self.store.load_purposes(filter).await?;
        Ok(calculaud_analytics::expenditure_timeline(&records, grouping, currency, self.rate))
    }

    pub async fn hierarchy_distribution(
        &self,
        filter: &PurposeFilter,
        parent_id: Option<HierarchyId>,
        level: Option<HierarchyType>,
    ) -> StoreResult<HierarchyDistribution> {
        let forest = self.forest().await?;
        if let Some(parent_id) = parent_id {
            forest.require(parent_id)?;
        }
        let records = self.store.load_purposes(filter).await?;
        Ok(calculaud_analytics::hierarchy_distribution(&forest, &records, parent_id, level))
    }

    // -------------------------
    // Assistant
    // -------------------------

    pub async fn ask(&self, question: &str, token: &str) -> Result<String, AiError> {
        validate_question(question)?;
        let Some(assistant) = &self.assistant else {
            return Err(AiError::NotConfigured(
                "LLM is not configured. Set LLM_API_KEY to enable the assistant.".into(),
            ));
        };
        assistant.ask(question, token).await
    }

    // -------------------------
    // Health
    // -------------------------

    pub async fn check_database(&self) -> DatabaseCheck {
        let started = Instant::now();
        let outcome = self.store.ping().await;
        let response_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        let backend = self.store.backend();
        match outcome {
            Ok(()) => DatabaseCheck {
                status: CheckStatus::Healthy,
                backend,
                response_time_ms,
                error: None,
            },
            Err(e) => {
                warn!(error = %e, backend, "database health check failed");
                DatabaseCheck {
                    status: CheckStatus::Unhealthy,
                    backend,
                    response_time_ms,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    pub async fn health(&self) -> HealthReport {
        let database = self.check_database().await;
        let status = database.status;
        HealthReport {
            status,
            timestamp: Utc::now(),
            version: self.config.app_version.clone(),
            environment: self.config.environment.clone(),
            app_name: self.config.app_name.clone(),
            uptime_seconds: self.started_at.elapsed().as_secs_f64(),
            checks: HealthChecks {
                database,
                assistant: AssistantCheck {
                    status: if self.assistant.is_some() {
                        "configured"
                    } else {
                        "not_configured"
                    },
                    configured: self.assistant.is_some(),
                    model: self.config.ai.model_name.clone(),
                },
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseCheck {
    pub status: CheckStatus,
    pub backend: &'static str,
    pub response_time_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssistantCheck {
    pub status: &'static str,
    pub configured: bool,
    pub model: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthChecks {
    pub database: DatabaseCheck,
    pub assistant: AssistantCheck,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: CheckStatus,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub environment: String,
    pub app_name: String,
    pub uptime_seconds: f64,
    pub checks: HealthChecks,
}
