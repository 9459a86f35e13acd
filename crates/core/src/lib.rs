//! `calculaud-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod entity;
pub mod error;
pub mod id;
pub mod page;
pub mod patch;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{
    BudgetSourceId, CostId, EmfId, HierarchyId, PurposeId, ResponsibleAuthorityId, ServiceId, ServiceTypeId,
    SupplierId,
};
pub use page::{Page, PageRequest, SortOrder};
