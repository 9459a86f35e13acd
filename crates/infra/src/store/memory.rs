//! In-memory store for tests/dev.
//!
//! One `RwLock` guards every table so multi-row writes are atomic just like
//! the Postgres transactions.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use calculaud_catalog::{
    BudgetSource, NewBudgetSource, NewResponsibleAuthority, NewService, NewServiceType, NewSupplier,
    ResponsibleAuthority, Service, ServiceType, Supplier,
};
use calculaud_core::{
    BudgetSourceId, CostId, DomainError, EmfId, Entity, HierarchyId, PurposeId, ResponsibleAuthorityId, ServiceId,
    ServiceTypeId, SupplierId,
};
use calculaud_hierarchy::Hierarchy;
use calculaud_hierarchy::forest::PreparedHierarchy;
use calculaud_purposes::emf::duplicate_emf_id;
use calculaud_purposes::purpose::unknown_service;
use calculaud_purposes::{
    ContentLine, Cost, CostPatch, Emf, EmfPatch, NewCost, NewEmf, NewPurpose, Purpose, PurposeContent,
    PurposeFilter, PurposePatch, PurposeRecord, StatusChange,
};

use super::{ProcurementStore, StoreError, StoreResult, still_referenced};

/// Rows keyed by id plus the id sequence (ids are never reused).
#[derive(Debug)]
struct Table<T: Entity> {
    rows: BTreeMap<T::Id, T>,
    last_id: i64,
}

impl<T: Entity> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            last_id: 0,
        }
    }
}

impl<T> Table<T>
where
    T: Entity + Clone,
    T::Id: From<i64>,
{
    fn next_id(&mut self) -> T::Id {
        self.last_id += 1;
        T::Id::from(self.last_id)
    }

    fn get(&self, id: T::Id) -> Option<&T> {
        self.rows.get(&id)
    }

    fn put(&mut self, row: T) {
        self.rows.insert(row.id(), row);
    }

    fn values(&self) -> impl Iterator<Item = &T> {
        self.rows.values()
    }

    fn remove(&mut self, id: T::Id) -> Option<T> {
        self.rows.remove(&id)
    }
}

#[derive(Debug, Default)]
struct Tables {
    hierarchies: Table<Hierarchy>,
    suppliers: Table<Supplier>,
    service_types: Table<ServiceType>,
    services: Table<Service>,
    budget_sources: Table<BudgetSource>,
    responsible_authorities: Table<ResponsibleAuthority>,
    purposes: Table<Purpose>,
    contents: HashMap<PurposeId, Vec<ContentLine>>,
    history: HashMap<PurposeId, Vec<StatusChange>>,
    emfs: Table<Emf>,
    costs: Table<Cost>,
}

impl Tables {
    fn hydrate(&self, purpose: &Purpose) -> PurposeRecord {
        let mut contents: Vec<PurposeContent> = self
            .contents
            .get(&purpose.id)
            .into_iter()
            .flatten()
            .filter_map(|line| {
                let service = self.services.get(line.service_id)?;
                let service_type = self.service_types.get(service.service_type_id)?;
                Some(PurposeContent {
                    service_id: line.service_id,
                    quantity: line.quantity,
                    service_name: service.name.clone(),
                    service_type_id: service.service_type_id,
                    service_type: service_type.name.clone(),
                })
            })
            .collect();
        contents.sort_by(|a, b| a.service_name.cmp(&b.service_name).then(a.service_id.cmp(&b.service_id)));

        let emfs = self
            .emfs
            .values()
            .filter(|e| e.purpose_id == purpose.id)
            .map(|e| self.emf_with_costs(e))
            .collect();

        PurposeRecord {
            purpose: purpose.clone(),
            supplier: purpose
                .supplier_id
                .and_then(|id| self.suppliers.get(id))
                .map(|s| s.name.clone()),
            service_type: purpose
                .service_type_id
                .and_then(|id| self.service_types.get(id))
                .map(|t| t.name.clone()),
            budget_source: purpose
                .budget_source_id
                .and_then(|id| self.budget_sources.get(id))
                .map(|b| b.name.clone()),
            hierarchy: purpose.hierarchy_id.and_then(|id| self.hierarchies.get(id)).cloned(),
            contents,
            emfs,
            status_history: self.history.get(&purpose.id).cloned().unwrap_or_default(),
        }
    }

    fn emf_with_costs(&self, emf: &Emf) -> Emf {
        Emf {
            costs: self.costs.values().filter(|c| c.emf_id == emf.id).cloned().collect(),
            ..emf.clone()
        }
    }

    fn scope_paths(&self, ids: &[HierarchyId]) -> Vec<String> {
        ids.iter()
            .filter_map(|id| self.hierarchies.get(*id))
            .map(|h| h.path.clone())
            .collect()
    }

    fn touch_purpose(&mut self, id: PurposeId, now: DateTime<Utc>) {
        if let Some(purpose) = self.purposes.rows.get_mut(&id) {
            purpose.last_modified = now;
        }
    }

    /// Every id a purpose points at must exist at the moment it is written.
    fn check_refs(&self, purpose: &Purpose, contents: &[ContentLine]) -> StoreResult<()> {
        if let Some(id) = purpose.hierarchy_id.filter(|id| self.hierarchies.get(*id).is_none()) {
            return Err(unknown("Hierarchy", id));
        }
        if let Some(id) = purpose.supplier_id.filter(|id| self.suppliers.get(*id).is_none()) {
            return Err(unknown("Supplier", id));
        }
        if let Some(id) = purpose.service_type_id.filter(|id| self.service_types.get(*id).is_none()) {
            return Err(unknown("Service type", id));
        }
        if let Some(id) = purpose.budget_source_id.filter(|id| self.budget_sources.get(*id).is_none()) {
            return Err(unknown("Budget source", id));
        }
        if let Some(line) = contents.iter().find(|l| self.services.get(l.service_id).is_none()) {
            return Err(unknown_service(line.service_id).into());
        }
        Ok(())
    }

    fn ensure_unique_emf_id(&self, emf_id: &str, exclude: Option<EmfId>) -> StoreResult<()> {
        let taken = self
            .emfs
            .values()
            .any(|e| e.emf_id == emf_id && Some(e.id) != exclude);
        if taken {
            return Err(duplicate_emf_id(emf_id).into());
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.inner
            .read()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".into()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.inner
            .write()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".into()))
    }
}

fn missing(entity: &str, id: impl core::fmt::Display) -> StoreError {
    DomainError::missing(entity, id).into()
}

fn unknown(entity: &str, id: impl core::fmt::Display) -> StoreError {
    DomainError::validation(format!("{entity} with ID {id} does not exist")).into()
}

#[async_trait]
impl ProcurementStore for InMemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> StoreResult<()> {
        self.read().map(|_| ())
    }

    async fn hierarchies(&self) -> StoreResult<Vec<Hierarchy>> {
        Ok(self.read()?.hierarchies.values().cloned().collect())
    }

    async fn insert_hierarchy(&self, node: PreparedHierarchy) -> StoreResult<Hierarchy> {
        let mut t = self.write()?;
        let id = t.hierarchies.next_id();
        let node = node.into_hierarchy(id);
        t.hierarchies.put(node.clone());
        Ok(node)
    }

    async fn save_hierarchies(&self, nodes: &[Hierarchy]) -> StoreResult<()> {
        let mut t = self.write()?;
        if let Some(node) = nodes.iter().find(|n| t.hierarchies.get(n.id).is_none()) {
            return Err(missing("Hierarchy", node.id));
        }
        for node in nodes {
            t.hierarchies.put(node.clone());
        }
        Ok(())
    }

    async fn delete_hierarchy(&self, id: HierarchyId) -> StoreResult<()> {
        let mut t = self.write()?;
        let used = t.purposes.values().filter(|p| p.hierarchy_id == Some(id)).count() as u64;
        if used > 0 {
            return Err(still_referenced("hierarchy", id, "purposes", used));
        }
        t.hierarchies.remove(id).map(|_| ()).ok_or_else(|| missing("Hierarchy", id))
    }

    async fn count_purposes_in_hierarchy(&self, id: HierarchyId) -> StoreResult<u64> {
        let t = self.read()?;
        Ok(t.purposes.values().filter(|p| p.hierarchy_id == Some(id)).count() as u64)
    }

    async fn suppliers(&self) -> StoreResult<Vec<Supplier>> {
        Ok(self.read()?.suppliers.values().cloned().collect())
    }

    async fn supplier(&self, id: SupplierId) -> StoreResult<Option<Supplier>> {
        Ok(self.read()?.suppliers.get(id).cloned())
    }

    async fn insert_supplier(&self, new: NewSupplier) -> StoreResult<Supplier> {
        let mut t = self.write()?;
        let supplier = Supplier {
            id: t.suppliers.next_id(),
            name: new.name,
        };
        t.suppliers.put(supplier.clone());
        Ok(supplier)
    }

    async fn save_supplier(&self, supplier: &Supplier) -> StoreResult<()> {
        let mut t = self.write()?;
        if t.suppliers.get(supplier.id).is_none() {
            return Err(missing("Supplier", supplier.id));
        }
        t.suppliers.put(supplier.clone());
        Ok(())
    }

    async fn delete_supplier(&self, id: SupplierId) -> StoreResult<()> {
        let mut t = self.write()?;
        let used = t.purposes.values().filter(|p| p.supplier_id == Some(id)).count() as u64;
        if used > 0 {
            return Err(still_referenced("supplier", id, "purposes", used));
        }
        t.suppliers.remove(id).map(|_| ()).ok_or_else(|| missing("Supplier", id))
    }

    async fn service_types(&self) -> StoreResult<Vec<ServiceType>> {
        Ok(self.read()?.service_types.values().cloned().collect())
    }

    async fn service_type(&self, id: ServiceTypeId) -> StoreResult<Option<ServiceType>> {
        Ok(self.read()?.service_types.get(id).cloned())
    }

    async fn insert_service_type(&self, new: NewServiceType) -> StoreResult<ServiceType> {
        let mut t = self.write()?;
        let service_type = ServiceType {
            id: t.service_types.next_id(),
            name: new.name,
        };
        t.service_types.put(service_type.clone());
        Ok(service_type)
    }

    async fn save_service_type(&self, service_type: &ServiceType) -> StoreResult<()> {
        let mut t = self.write()?;
        if t.service_types.get(service_type.id).is_none() {
            return Err(missing("Service type", service_type.id));
        }
        t.service_types.put(service_type.clone());
        Ok(())
    }

    async fn delete_service_type(&self, id: ServiceTypeId) -> StoreResult<()> {
        let mut t = self.write()?;
        let services = t.services.values().filter(|s| s.service_type_id == id).count() as u64;
        if services > 0 {
            return Err(still_referenced("service type", id, "services", services));
        }
        let purposes = t.purposes.values().filter(|p| p.service_type_id == Some(id)).count() as u64;
        if purposes > 0 {
            return Err(still_referenced("service type", id, "purposes", purposes));
        }
        t.service_types.remove(id).map(|_| ()).ok_or_else(|| missing("Service type", id))
    }

    async fn services(&self, service_type_id: Option<ServiceTypeId>) -> StoreResult<Vec<Service>> {
        Ok(self
            .read()?
            .services
            .values()
            .filter(|s| service_type_id.map_or(true, |t| s.service_type_id == t))
            .cloned()
            .collect())
    }

    async fn service(&self, id: ServiceId) -> StoreResult<Option<Service>> {
        Ok(self.read()?.services.get(id).cloned())
    }

    async fn insert_service(&self, new: NewService) -> StoreResult<Service> {
        let mut t = self.write()?;
        if t.service_types.get(new.service_type_id).is_none() {
            return Err(missing("Service type", new.service_type_id));
        }
        let service = Service {
            id: t.services.next_id(),
            name: new.name,
            service_type_id: new.service_type_id,
        };
        t.services.put(service.clone());
        Ok(service)
    }

    async fn save_service(&self, service: &Service) -> StoreResult<()> {
        let mut t = self.write()?;
        if t.services.get(service.id).is_none() {
            return Err(missing("Service", service.id));
        }
        if t.service_types.get(service.service_type_id).is_none() {
            return Err(missing("Service type", service.service_type_id));
        }
        t.services.put(service.clone());
        Ok(())
    }

    async fn delete_service(&self, id: ServiceId) -> StoreResult<()> {
        let mut t = self.write()?;
        let used = t
            .contents
            .values()
            .filter(|lines| lines.iter().any(|l| l.service_id == id))
            .count() as u64;
        if used > 0 {
            return Err(still_referenced("service", id, "purposes", used));
        }
        t.services.remove(id).map(|_| ()).ok_or_else(|| missing("Service", id))
    }

    async fn budget_sources(&self) -> StoreResult<Vec<BudgetSource>> {
        Ok(self.read()?.budget_sources.values().cloned().collect())
    }

    async fn budget_source(&self, id: BudgetSourceId) -> StoreResult<Option<BudgetSource>> {
        Ok(self.read()?.budget_sources.get(id).cloned())
    }

    async fn insert_budget_source(&self, new: NewBudgetSource) -> StoreResult<BudgetSource> {
        let mut t = self.write()?;
        let budget_source = BudgetSource {
            id: t.budget_sources.next_id(),
            name: new.name,
        };
        t.budget_sources.put(budget_source.clone());
        Ok(budget_source)
    }

    async fn save_budget_source(&self, budget_source: &BudgetSource) -> StoreResult<()> {
        let mut t = self.write()?;
        if t.budget_sources.get(budget_source.id).is_none() {
            return Err(missing("Budget source", budget_source.id));
        }
        t.budget_sources.put(budget_source.clone());
        Ok(())
    }

    async fn delete_budget_source(&self, id: BudgetSourceId) -> StoreResult<()> {
        let mut t = self.write()?;
        let used = t.purposes.values().filter(|p| p.budget_source_id == Some(id)).count() as u64;
        if used > 0 {
            return Err(still_referenced("budget source", id, "purposes", used));
        }
        t.budget_sources.remove(id).map(|_| ()).ok_or_else(|| missing("Budget source", id))
    }

    async fn responsible_authorities(&self) -> StoreResult<Vec<ResponsibleAuthority>> {
        Ok(self.read()?.responsible_authorities.values().cloned().collect())
    }

    async fn responsible_authority(&self, id: ResponsibleAuthorityId) -> StoreResult<Option<ResponsibleAuthority>> {
        Ok(self.read()?.responsible_authorities.get(id).cloned())
    }

    async fn insert_responsible_authority(
        &self,
        new: NewResponsibleAuthority,
        now: DateTime<Utc>,
    ) -> StoreResult<ResponsibleAuthority> {
        let mut t = self.write()?;
        let authority = ResponsibleAuthority {
            id: t.responsible_authorities.next_id(),
            name: new.name,
            description: new.description,
            created_at: now,
        };
        t.responsible_authorities.put(authority.clone());
        Ok(authority)
    }

    async fn save_responsible_authority(&self, authority: &ResponsibleAuthority) -> StoreResult<()> {
        let mut t = self.write()?;
        if t.responsible_authorities.get(authority.id).is_none() {
            return Err(missing("Responsible authority", authority.id));
        }
        t.responsible_authorities.put(authority.clone());
        Ok(())
    }

    async fn delete_responsible_authority(&self, id: ResponsibleAuthorityId) -> StoreResult<()> {
        let mut t = self.write()?;
        t.responsible_authorities
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| missing("Responsible authority", id))
    }

    async fn load_purposes(&self, filter: &PurposeFilter) -> StoreResult<Vec<PurposeRecord>> {
        let t = self.read()?;
        let scope = t.scope_paths(&filter.hierarchy_ids);
        Ok(t.purposes
            .values()
            .map(|p| t.hydrate(p))
            .filter(|r| filter.matches(r, &scope))
            .collect())
    }

    async fn purpose(&self, id: PurposeId) -> StoreResult<Option<PurposeRecord>> {
        let t = self.read()?;
        Ok(t.purposes.get(id).map(|p| t.hydrate(p)))
    }

    async fn create_purpose(
        &self,
        new: &NewPurpose,
        now: DateTime<Utc>,
        changed_by: Option<&str>,
    ) -> StoreResult<PurposeRecord> {
        let mut t = self.write()?;
        let id = t.purposes.next_id();
        let (purpose, initial) = new.into_purpose(id, now, changed_by);
        t.check_refs(&purpose, &new.contents)?;
        t.purposes.put(purpose.clone());
        t.contents.insert(id, new.contents.clone());
        t.history.insert(id, vec![initial]);
        Ok(t.hydrate(&purpose))
    }

    async fn update_purpose(
        &self,
        id: PurposeId,
        patch: &PurposePatch,
        now: DateTime<Utc>,
        changed_by: Option<&str>,
    ) -> StoreResult<PurposeRecord> {
        let mut t = self.write()?;
        let current = t.purposes.get(id).ok_or_else(|| missing("Purpose", id))?;
        let change = patch.apply(current, now, changed_by)?;
        let contents = match &change.contents {
            Some(lines) => lines.as_slice(),
            None => t.contents.get(&id).map(Vec::as_slice).unwrap_or_default(),
        };
        t.check_refs(&change.purpose, contents)?;

        if let Some(status_change) = change.status_change {
            t.history.entry(id).or_default().push(status_change);
        }
        if let Some(contents) = change.contents {
            t.contents.insert(id, contents);
        }
        t.purposes.put(change.purpose.clone());
        Ok(t.hydrate(&change.purpose))
    }

    async fn delete_purpose(&self, id: PurposeId) -> StoreResult<()> {
        let mut t = self.write()?;
        t.purposes.remove(id).ok_or_else(|| missing("Purpose", id))?;
        t.contents.remove(&id);
        t.history.remove(&id);
        let emf_ids: Vec<EmfId> = t.emfs.values().filter(|e| e.purpose_id == id).map(|e| e.id).collect();
        for emf_id in emf_ids {
            t.emfs.remove(emf_id);
            t.costs.rows.retain(|_, c| c.emf_id != emf_id);
        }
        Ok(())
    }

    async fn flag_purposes(&self, ids: &[PurposeId], now: DateTime<Utc>) -> StoreResult<u64> {
        let mut t = self.write()?;
        let mut flagged = 0;
        for id in ids {
            if let Some(purpose) = t.purposes.rows.get_mut(id) {
                if !purpose.is_flagged {
                    purpose.is_flagged = true;
                    purpose.last_modified = now;
                    flagged += 1;
                }
            }
        }
        Ok(flagged)
    }

    async fn emf(&self, id: EmfId) -> StoreResult<Option<Emf>> {
        let t = self.read()?;
        Ok(t.emfs.get(id).map(|e| t.emf_with_costs(e)))
    }

    async fn create_emf(&self, purpose_id: PurposeId, new: NewEmf, now: DateTime<Utc>) -> StoreResult<Emf> {
        let mut t = self.write()?;
        if t.purposes.get(purpose_id).is_none() {
            return Err(missing("Purpose", purpose_id));
        }
        t.ensure_unique_emf_id(&new.emf_id, None)?;
        let id = t.emfs.next_id();
        let emf = new.into_emf(id, purpose_id, now);
        t.emfs.put(emf.clone());
        t.touch_purpose(purpose_id, now);
        Ok(emf)
    }

    async fn update_emf(&self, id: EmfId, patch: &EmfPatch, now: DateTime<Utc>) -> StoreResult<Emf> {
        let mut t = self.write()?;
        let current = t.emfs.get(id).ok_or_else(|| missing("EMF", id))?;
        let updated = patch.apply(current)?;
        t.ensure_unique_emf_id(&updated.emf_id, Some(id))?;
        let purpose_id = updated.purpose_id;
        t.emfs.put(Emf {
            costs: Vec::new(),
            ..updated
        });
        t.touch_purpose(purpose_id, now);
        let stored = t.emfs.get(id).ok_or_else(|| missing("EMF", id))?;
        Ok(t.emf_with_costs(stored))
    }

    async fn delete_emf(&self, id: EmfId, now: DateTime<Utc>) -> StoreResult<()> {
        let mut t = self.write()?;
        let emf = t.emfs.remove(id).ok_or_else(|| missing("EMF", id))?;
        t.costs.rows.retain(|_, c| c.emf_id != id);
        t.touch_purpose(emf.purpose_id, now);
        Ok(())
    }

    async fn cost(&self, id: CostId) -> StoreResult<Option<Cost>> {
        Ok(self.read()?.costs.get(id).cloned())
    }

    async fn create_cost(&self, emf_id: EmfId, new: &NewCost, now: DateTime<Utc>) -> StoreResult<Cost> {
        new.validate()?;
        let mut t = self.write()?;
        let purpose_id = t.emfs.get(emf_id).ok_or_else(|| missing("EMF", emf_id))?.purpose_id;
        let cost = Cost {
            id: t.costs.next_id(),
            emf_id,
            currency: new.currency,
            amount: new.amount,
        };
        t.costs.put(cost.clone());
        t.touch_purpose(purpose_id, now);
        Ok(cost)
    }

    async fn update_cost(&self, id: CostId, patch: &CostPatch, now: DateTime<Utc>) -> StoreResult<Cost> {
        let mut t = self.write()?;
        let current = t.costs.get(id).ok_or_else(|| missing("Cost", id))?;
        let updated = patch.apply(current)?;
        let purpose_id = t.emfs.get(updated.emf_id).map(|e| e.purpose_id);
        t.costs.put(updated.clone());
        if let Some(purpose_id) = purpose_id {
            t.touch_purpose(purpose_id, now);
        }
        Ok(updated)
    }

    async fn delete_cost(&self, id: CostId, now: DateTime<Utc>) -> StoreResult<()> {
        let mut t = self.write()?;
        let cost = t.costs.remove(id).ok_or_else(|| missing("Cost", id))?;
        if let Some(purpose_id) = t.emfs.get(cost.emf_id).map(|e| e.purpose_id) {
            t.touch_purpose(purpose_id, now);
        }
        Ok(())
    }
}
