//! Procurement persistence seam.
//!
//! Two interchangeable backends: [`InMemoryStore`] (dev/test, default when no
//! `DATABASE_URL` is configured) and [`PostgresStore`]. Validation rules live
//! in the domain crates; stores persist what the domain prepared and enforce
//! referential rules that need a consistent view of the data.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use calculaud_catalog::{
    BudgetSource, NewBudgetSource, NewResponsibleAuthority, NewService, NewServiceType, NewSupplier,
    ResponsibleAuthority, Service, ServiceType, Supplier,
};
use calculaud_core::{
    BudgetSourceId, CostId, DomainError, EmfId, HierarchyId, PurposeId, ResponsibleAuthorityId, ServiceId,
    ServiceTypeId, SupplierId,
};
use calculaud_hierarchy::Hierarchy;
use calculaud_hierarchy::forest::PreparedHierarchy;
use calculaud_purposes::{
    Cost, CostPatch, Emf, EmfPatch, NewCost, NewEmf, NewPurpose, PurposeFilter, PurposePatch,
    PurposeRecord,
};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// A database constraint rejected the write (unique or foreign key).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Everything the API and the maintenance job read or write.
///
/// Mutations of EMFs and costs take `now` because they also touch the owning
/// purpose's `last_modified`.
#[async_trait]
pub trait ProcurementStore: Send + Sync {
    /// Short backend name reported by health checks.
    fn backend(&self) -> &'static str;

    async fn ping(&self) -> StoreResult<()>;

    // Hierarchies
    async fn hierarchies(&self) -> StoreResult<Vec<Hierarchy>>;
    async fn insert_hierarchy(&self, node: PreparedHierarchy) -> StoreResult<Hierarchy>;
    /// Persist already validated rows in one transaction.
    async fn save_hierarchies(&self, nodes: &[Hierarchy]) -> StoreResult<()>;
    async fn delete_hierarchy(&self, id: HierarchyId) -> StoreResult<()>;
    /// Purposes assigned directly to the node.
    async fn count_purposes_in_hierarchy(&self, id: HierarchyId) -> StoreResult<u64>;

    // Suppliers
    async fn suppliers(&self) -> StoreResult<Vec<Supplier>>;
    async fn supplier(&self, id: SupplierId) -> StoreResult<Option<Supplier>>;
    async fn insert_supplier(&self, new: NewSupplier) -> StoreResult<Supplier>;
    async fn save_supplier(&self, supplier: &Supplier) -> StoreResult<()>;
    async fn delete_supplier(&self, id: SupplierId) -> StoreResult<()>;

    // Service types
    async fn service_types(&self) -> StoreResult<Vec<ServiceType>>;
    async fn service_type(&self, id: ServiceTypeId) -> StoreResult<Option<ServiceType>>;
    async fn insert_service_type(&self, new: NewServiceType) -> StoreResult<ServiceType>;
    async fn save_service_type(&self, service_type: &ServiceType) -> StoreResult<()>;
    async fn delete_service_type(&self, id: ServiceTypeId) -> StoreResult<()>;

    // Services
    async fn services(&self, service_type_id: Option<ServiceTypeId>) -> StoreResult<Vec<Service>>;
    async fn service(&self, id: ServiceId) -> StoreResult<Option<Service>>;
    async fn insert_service(&self, new: NewService) -> StoreResult<Service>;
    async fn save_service(&self, service: &Service) -> StoreResult<()>;
    async fn delete_service(&self, id: ServiceId) -> StoreResult<()>;

    // Budget sources
    async fn budget_sources(&self) -> StoreResult<Vec<BudgetSource>>;
    async fn budget_source(&self, id: BudgetSourceId) -> StoreResult<Option<BudgetSource>>;
    async fn insert_budget_source(&self, new: NewBudgetSource) -> StoreResult<BudgetSource>;
    async fn save_budget_source(&self, budget_source: &BudgetSource) -> StoreResult<()>;
    async fn delete_budget_source(&self, id: BudgetSourceId) -> StoreResult<()>;

    // Responsible authorities
    async fn responsible_authorities(&self) -> StoreResult<Vec<ResponsibleAuthority>>;
    async fn responsible_authority(&self, id: ResponsibleAuthorityId) -> StoreResult<Option<ResponsibleAuthority>>;
    async fn insert_responsible_authority(
        &self,
        new: NewResponsibleAuthority,
        now: DateTime<Utc>,
    ) -> StoreResult<ResponsibleAuthority>;
    async fn save_responsible_authority(&self, authority: &ResponsibleAuthority) -> StoreResult<()>;
    async fn delete_responsible_authority(&self, id: ResponsibleAuthorityId) -> StoreResult<()>;

    // Purposes
    /// Fully hydrated purposes matching `filter`, in id order.
    async fn load_purposes(&self, filter: &PurposeFilter) -> StoreResult<Vec<PurposeRecord>>;
    async fn purpose(&self, id: PurposeId) -> StoreResult<Option<PurposeRecord>>;
    async fn create_purpose(
        &self,
        new: &NewPurpose,
        now: DateTime<Utc>,
        changed_by: Option<&str>,
    ) -> StoreResult<PurposeRecord>;
    async fn update_purpose(
        &self,
        id: PurposeId,
        patch: &PurposePatch,
        now: DateTime<Utc>,
        changed_by: Option<&str>,
    ) -> StoreResult<PurposeRecord>;
    async fn delete_purpose(&self, id: PurposeId) -> StoreResult<()>;
    /// Set `is_flagged` on every listed purpose; returns how many rows changed.
    async fn flag_purposes(&self, ids: &[PurposeId], now: DateTime<Utc>) -> StoreResult<u64>;

    // EMFs
    async fn emf(&self, id: EmfId) -> StoreResult<Option<Emf>>;
    async fn create_emf(&self, purpose_id: PurposeId, new: NewEmf, now: DateTime<Utc>) -> StoreResult<Emf>;
    async fn update_emf(&self, id: EmfId, patch: &EmfPatch, now: DateTime<Utc>) -> StoreResult<Emf>;
    async fn delete_emf(&self, id: EmfId, now: DateTime<Utc>) -> StoreResult<()>;

    // Costs
    async fn cost(&self, id: CostId) -> StoreResult<Option<Cost>>;
    async fn create_cost(&self, emf_id: EmfId, new: &NewCost, now: DateTime<Utc>) -> StoreResult<Cost>;
    async fn update_cost(&self, id: CostId, patch: &CostPatch, now: DateTime<Utc>) -> StoreResult<Cost>;
    async fn delete_cost(&self, id: CostId, now: DateTime<Utc>) -> StoreResult<()>;
}

pub type SharedStore = Arc<dyn ProcurementStore>;

pub(crate) fn still_referenced(entity: &str, id: impl core::fmt::Display, by: &str, count: u64) -> StoreError {
    StoreError::Domain(DomainError::conflict(format!(
        "Cannot delete {entity} with ID {id}: it is referenced by {count} {by}"
    )))
}
