//! Postgres-backed procurement store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (foreign key violation) | `23503` | `Conflict` |
//! | Database (check constraint violation) | `23514` | `Domain(Validation)` |
//! | PoolClosed / PoolTimedOut | N/A | `Unavailable` |
//! | anything else | any | `Database` |
//!
//! Purpose hydration loads the base rows with the filter pushed into SQL, then
//! fetches contents, history, EMFs and costs for the whole page of ids with
//! `= ANY($1)` so a listing costs a fixed number of round trips.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use tracing::{Span, instrument};

use calculaud_catalog::{
    BudgetSource, NewBudgetSource, NewResponsibleAuthority, NewService, NewServiceType, NewSupplier,
    ResponsibleAuthority, Service, ServiceType, Supplier,
};
use calculaud_core::{
    BudgetSourceId, CostId, DomainError, EmfId, HierarchyId, PurposeId, ResponsibleAuthorityId, ServiceId,
    ServiceTypeId, SupplierId,
};
use calculaud_hierarchy::forest::PreparedHierarchy;
use calculaud_hierarchy::{Hierarchy, HierarchyType};
use calculaud_purposes::emf::duplicate_emf_id;
use calculaud_purposes::{
    ContentLine, Cost, CostPatch, Currency, Emf, EmfPatch, NewCost, NewEmf, NewPurpose, Purpose,
    PurposeContent, PurposeFilter, PurposePatch, PurposeRecord, PurposeStatus, StatusChange,
};

use super::{ProcurementStore, StoreError, StoreResult, still_referenced};

const INITIAL_MIGRATION: &str = include_str!("../../migrations/0001_initial.sql");

const PURPOSE_SELECT: &str = r#"
    SELECT
        p.id, p.hierarchy_id, p.expected_delivery, p.comments, p.description,
        p.status, p.supplier_id, p.service_type_id, p.budget_source_id, p.is_flagged,
        p.creation_time, p.last_modified,
        s.name AS supplier_name,
        st.name AS service_type_name,
        bs.name AS budget_source_name,
        h.type AS hierarchy_type,
        h.name AS hierarchy_name,
        h.parent_id AS hierarchy_parent_id,
        h.path AS hierarchy_path
    FROM purposes p
    LEFT JOIN suppliers s ON s.id = p.supplier_id
    LEFT JOIN service_types st ON st.id = p.service_type_id
    LEFT JOIN budget_sources bs ON bs.id = p.budget_source_id
    LEFT JOIN hierarchies h ON h.id = p.hierarchy_id
    WHERE TRUE
"#;

const EMF_COLUMNS: &str = "id, emf_id, purpose_id, creation_time, order_id, order_creation_date, \
     demand_id, demand_creation_date, bikushit_id, bikushit_creation_date";

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `url`.
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the embedded schema. Safe to run on every start.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::raw_sql(INITIAL_MIGRATION)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    async fn select_purposes(
        &self,
        filter: &PurposeFilter,
        only: Option<PurposeId>,
    ) -> StoreResult<Vec<PurposeRecord>> {
        let mut qb = QueryBuilder::<Postgres>::new(PURPOSE_SELECT);
        if let Some(id) = only {
            qb.push(" AND p.id = ").push_bind(id.get());
        }
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY p.id");

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("select_purposes", e))?;

        let mut records = rows.iter().map(record_from_row).collect::<StoreResult<Vec<_>>>()?;
        self.hydrate(&mut records).await?;
        Ok(records)
    }

    /// Attach contents, status history and EMFs (with costs).
    async fn hydrate(&self, records: &mut [PurposeRecord]) -> StoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let ids: Vec<i64> = records.iter().map(|r| r.purpose.id.get()).collect();

        let content_rows = sqlx::query(
            r#"
            SELECT pc.purpose_id, pc.service_id, pc.quantity,
                   s.name AS service_name, s.service_type_id, st.name AS service_type
            FROM purpose_contents pc
            JOIN services s ON s.id = pc.service_id
            JOIN service_types st ON st.id = s.service_type_id
            WHERE pc.purpose_id = ANY($1)
            ORDER BY s.name, s.id
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_contents", e))?;

        let mut contents: HashMap<i64, Vec<PurposeContent>> = HashMap::new();
        for row in &content_rows {
            contents.entry(row.try_get("purpose_id")?).or_default().push(PurposeContent {
                service_id: ServiceId::new(row.try_get("service_id")?),
                quantity: row.try_get("quantity")?,
                service_name: row.try_get("service_name")?,
                service_type_id: ServiceTypeId::new(row.try_get("service_type_id")?),
                service_type: row.try_get("service_type")?,
            });
        }

        let history_rows = sqlx::query(
            r#"
            SELECT purpose_id, previous_status, new_status, changed_at, changed_by
            FROM purpose_status_history
            WHERE purpose_id = ANY($1)
            ORDER BY changed_at, id
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_status_history", e))?;

        let mut history: HashMap<i64, Vec<StatusChange>> = HashMap::new();
        for row in &history_rows {
            history
                .entry(row.try_get("purpose_id")?)
                .or_default()
                .push(status_change_from_row(row)?);
        }

        let emf_rows = sqlx::query(&format!(
            "SELECT {EMF_COLUMNS} FROM emfs WHERE purpose_id = ANY($1) ORDER BY id"
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_emfs", e))?;
        let mut emfs = emf_rows.iter().map(emf_from_row).collect::<StoreResult<Vec<_>>>()?;
        self.attach_costs(&mut emfs).await?;

        let mut emfs_by_purpose: HashMap<PurposeId, Vec<Emf>> = HashMap::new();
        for emf in emfs {
            emfs_by_purpose.entry(emf.purpose_id).or_default().push(emf);
        }

        for record in records.iter_mut() {
            let id = record.purpose.id;
            record.contents = contents.remove(&id.get()).unwrap_or_default();
            record.status_history = history.remove(&id.get()).unwrap_or_default();
            record.emfs = emfs_by_purpose.remove(&id).unwrap_or_default();
        }
        Ok(())
    }

    async fn attach_costs(&self, emfs: &mut [Emf]) -> StoreResult<()> {
        if emfs.is_empty() {
            return Ok(());
        }
        let ids: Vec<i64> = emfs.iter().map(|e| e.id.get()).collect();
        let rows = sqlx::query("SELECT id, emf_id, currency, amount FROM costs WHERE emf_id = ANY($1) ORDER BY id")
            .bind(&ids)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_costs", e))?;

        let mut by_emf: HashMap<EmfId, Vec<Cost>> = HashMap::new();
        for row in &rows {
            let cost = cost_from_row(row)?;
            by_emf.entry(cost.emf_id).or_default().push(cost);
        }
        for emf in emfs.iter_mut() {
            emf.costs = by_emf.remove(&emf.id).unwrap_or_default();
        }
        Ok(())
    }

    async fn count(&self, operation: &str, sql: &str, id: i64) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar(sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        Ok(count.max(0) as u64)
    }

    async fn begin(&self) -> StoreResult<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &PurposeFilter) {
    if let Some(start) = filter.start_date {
        qb.push(" AND (p.creation_time AT TIME ZONE 'UTC')::date >= ").push_bind(start);
    }
    if let Some(end) = filter.end_date {
        qb.push(" AND (p.creation_time AT TIME ZONE 'UTC')::date <= ").push_bind(end);
    }
    if filter.live_only {
        qb.push(" AND p.status <> ").push_bind(PurposeStatus::Completed.as_str());
    }
    if !filter.statuses.is_empty() {
        let statuses: Vec<String> = filter.statuses.iter().map(|s| s.as_str().to_string()).collect();
        qb.push(" AND p.status = ANY(").push_bind(statuses).push(")");
    }
    if !filter.supplier_ids.is_empty() {
        let ids: Vec<i64> = filter.supplier_ids.iter().map(|id| id.get()).collect();
        qb.push(" AND p.supplier_id = ANY(").push_bind(ids).push(")");
    }
    if !filter.service_type_ids.is_empty() {
        let ids: Vec<i64> = filter.service_type_ids.iter().map(|id| id.get()).collect();
        qb.push(" AND p.service_type_id = ANY(").push_bind(ids).push(")");
    }
    if !filter.service_ids.is_empty() {
        let ids: Vec<i64> = filter.service_ids.iter().map(|id| id.get()).collect();
        qb.push(
            " AND EXISTS (SELECT 1 FROM purpose_contents pc WHERE pc.purpose_id = p.id AND pc.service_id = ANY(",
        )
        .push_bind(ids)
        .push("))");
    }
    if let Some(flagged) = filter.is_flagged {
        qb.push(" AND p.is_flagged = ").push_bind(flagged);
    }
    if !filter.hierarchy_ids.is_empty() {
        // Subtree by cached path: equal, or prefixed by "<ancestor> / ".
        let ids: Vec<i64> = filter.hierarchy_ids.iter().map(|id| id.get()).collect();
        qb.push(
            " AND EXISTS (SELECT 1 FROM hierarchies a WHERE a.id = ANY(",
        )
        .push_bind(ids)
        .push(") AND (h.path = a.path OR starts_with(h.path, a.path || ' / ')))");
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    let span = Span::current();
    span.record("operation", operation);

    match &err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // Unique violation
                Some("23505") => StoreError::Conflict(msg),
                // Foreign key violation
                Some("23503") => StoreError::Conflict(msg),
                // Check constraint violation
                Some("23514") => StoreError::Domain(DomainError::validation(msg)),
                _ => StoreError::Database(err),
            }
        }
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool unavailable in {}: {}", operation, err))
        }
        _ => StoreError::Database(err),
    }
}

fn parse<T>(value: &str) -> StoreResult<T>
where
    T: std::str::FromStr<Err = DomainError>,
{
    value.parse().map_err(StoreError::Domain)
}

fn hierarchy_from_row(row: &PgRow) -> StoreResult<Hierarchy> {
    let kind: String = row.try_get("type")?;
    Ok(Hierarchy {
        id: HierarchyId::new(row.try_get("id")?),
        kind: parse::<HierarchyType>(&kind)?,
        name: row.try_get("name")?,
        parent_id: row.try_get::<Option<i64>, _>("parent_id")?.map(HierarchyId::new),
        path: row.try_get("path")?,
    })
}

fn record_from_row(row: &PgRow) -> StoreResult<PurposeRecord> {
    let status: String = row.try_get("status")?;
    let hierarchy_id = row.try_get::<Option<i64>, _>("hierarchy_id")?.map(HierarchyId::new);

    let hierarchy = match (hierarchy_id, row.try_get::<Option<String>, _>("hierarchy_type")?) {
        (Some(id), Some(kind)) => Some(Hierarchy {
            id,
            kind: parse::<HierarchyType>(&kind)?,
            name: row.try_get("hierarchy_name")?,
            parent_id: row
                .try_get::<Option<i64>, _>("hierarchy_parent_id")?
                .map(HierarchyId::new),
            path: row.try_get("hierarchy_path")?,
        }),
        _ => None,
    };

    Ok(PurposeRecord {
        purpose: Purpose {
            id: PurposeId::new(row.try_get("id")?),
            hierarchy_id,
            expected_delivery: row.try_get::<Option<NaiveDate>, _>("expected_delivery")?,
            comments: row.try_get("comments")?,
            description: row.try_get("description")?,
            status: parse::<PurposeStatus>(&status)?,
            supplier_id: row.try_get::<Option<i64>, _>("supplier_id")?.map(SupplierId::new),
            service_type_id: row
                .try_get::<Option<i64>, _>("service_type_id")?
                .map(ServiceTypeId::new),
            budget_source_id: row
                .try_get::<Option<i64>, _>("budget_source_id")?
                .map(BudgetSourceId::new),
            is_flagged: row.try_get("is_flagged")?,
            creation_time: row.try_get::<DateTime<Utc>, _>("creation_time")?,
            last_modified: row.try_get::<DateTime<Utc>, _>("last_modified")?,
        },
        supplier: row.try_get("supplier_name")?,
        service_type: row.try_get("service_type_name")?,
        budget_source: row.try_get("budget_source_name")?,
        hierarchy,
        contents: Vec::new(),
        emfs: Vec::new(),
        status_history: Vec::new(),
    })
}

fn authority_from_row(row: &PgRow) -> StoreResult<ResponsibleAuthority> {
    Ok(ResponsibleAuthority {
        id: ResponsibleAuthorityId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

fn status_change_from_row(row: &PgRow) -> StoreResult<StatusChange> {
    let previous: Option<String> = row.try_get("previous_status")?;
    let new_status: String = row.try_get("new_status")?;
    Ok(StatusChange {
        previous_status: previous.as_deref().map(parse::<PurposeStatus>).transpose()?,
        new_status: parse::<PurposeStatus>(&new_status)?,
        changed_at: row.try_get("changed_at")?,
        changed_by: row.try_get("changed_by")?,
    })
}

fn emf_from_row(row: &PgRow) -> StoreResult<Emf> {
    Ok(Emf {
        id: EmfId::new(row.try_get("id")?),
        emf_id: row.try_get("emf_id")?,
        purpose_id: PurposeId::new(row.try_get("purpose_id")?),
        creation_time: row.try_get("creation_time")?,
        order_id: row.try_get("order_id")?,
        order_creation_date: row.try_get("order_creation_date")?,
        demand_id: row.try_get("demand_id")?,
        demand_creation_date: row.try_get("demand_creation_date")?,
        bikushit_id: row.try_get("bikushit_id")?,
        bikushit_creation_date: row.try_get("bikushit_creation_date")?,
        costs: Vec::new(),
    })
}

fn cost_from_row(row: &PgRow) -> StoreResult<Cost> {
    let currency: String = row.try_get("currency")?;
    Ok(Cost {
        id: CostId::new(row.try_get("id")?),
        emf_id: EmfId::new(row.try_get("emf_id")?),
        currency: parse::<Currency>(&currency)?,
        amount: row.try_get("amount")?,
    })
}

async fn touch_purpose(
    tx: &mut Transaction<'_, Postgres>,
    purpose_id: PurposeId,
    now: DateTime<Utc>,
) -> StoreResult<()> {
    sqlx::query("UPDATE purposes SET last_modified = $2 WHERE id = $1")
        .bind(purpose_id.get())
        .bind(now)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("touch_purpose", e))?;
    Ok(())
}

async fn replace_contents(
    tx: &mut Transaction<'_, Postgres>,
    purpose_id: PurposeId,
    contents: &[ContentLine],
) -> StoreResult<()> {
    sqlx::query("DELETE FROM purpose_contents WHERE purpose_id = $1")
        .bind(purpose_id.get())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("delete_contents", e))?;
    for line in contents {
        sqlx::query("INSERT INTO purpose_contents (purpose_id, service_id, quantity) VALUES ($1, $2, $3)")
            .bind(purpose_id.get())
            .bind(line.service_id.get())
            .bind(line.quantity)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("insert_content", e))?;
    }
    Ok(())
}

async fn insert_status_change(
    tx: &mut Transaction<'_, Postgres>,
    purpose_id: PurposeId,
    change: &StatusChange,
) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO purpose_status_history (purpose_id, previous_status, new_status, changed_at, changed_by)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(purpose_id.get())
    .bind(change.previous_status.map(|s| s.as_str()))
    .bind(change.new_status.as_str())
    .bind(change.changed_at)
    .bind(change.changed_by.as_deref())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_status_change", e))?;
    Ok(())
}

async fn ensure_unique_emf_id(
    tx: &mut Transaction<'_, Postgres>,
    emf_id: &str,
    exclude: Option<EmfId>,
) -> StoreResult<()> {
    let taken: Option<i64> = sqlx::query_scalar("SELECT id FROM emfs WHERE emf_id = $1 AND id <> $2")
        .bind(emf_id)
        .bind(exclude.map(|id| id.get()).unwrap_or(0))
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("check_emf_id", e))?;
    match taken {
        Some(_) => Err(duplicate_emf_id(emf_id).into()),
        None => Ok(()),
    }
}

fn missing(entity: &str, id: impl core::fmt::Display) -> StoreError {
    DomainError::missing(entity, id).into()
}

fn require_affected(rows: u64, entity: &str, id: impl core::fmt::Display) -> StoreResult<()> {
    if rows == 0 {
        return Err(missing(entity, id));
    }
    Ok(())
}

#[async_trait]
impl ProcurementStore for PostgresStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("ping", e))?;
        Ok(())
    }

    async fn hierarchies(&self) -> StoreResult<Vec<Hierarchy>> {
        let rows = sqlx::query("SELECT id, type, name, parent_id, path FROM hierarchies ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_hierarchies", e))?;
        rows.iter().map(hierarchy_from_row).collect()
    }

    #[instrument(skip(self, node), fields(name = %node.name), err)]
    async fn insert_hierarchy(&self, node: PreparedHierarchy) -> StoreResult<Hierarchy> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO hierarchies (type, name, parent_id, path) VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(node.kind.as_str())
        .bind(&node.name)
        .bind(node.parent_id.map(|p| p.get()))
        .bind(&node.path)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_hierarchy", e))?;
        Ok(node.into_hierarchy(HierarchyId::new(id)))
    }

    #[instrument(skip(self, nodes), fields(count = nodes.len()), err)]
    async fn save_hierarchies(&self, nodes: &[Hierarchy]) -> StoreResult<()> {
        let mut tx = self.begin().await?;
        for node in nodes {
            let result = sqlx::query(
                "UPDATE hierarchies SET type = $2, name = $3, parent_id = $4, path = $5 WHERE id = $1",
            )
            .bind(node.id.get())
            .bind(node.kind.as_str())
            .bind(&node.name)
            .bind(node.parent_id.map(|p| p.get()))
            .bind(&node.path)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_hierarchy", e))?;
            require_affected(result.rows_affected(), "Hierarchy", node.id)?;
        }
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    #[instrument(skip(self), err)]
    async fn delete_hierarchy(&self, id: HierarchyId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM hierarchies WHERE id = $1")
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_hierarchy", e))?;
        require_affected(result.rows_affected(), "Hierarchy", id)
    }

    async fn count_purposes_in_hierarchy(&self, id: HierarchyId) -> StoreResult<u64> {
        self.count(
            "count_purposes_in_hierarchy",
            "SELECT COUNT(*) FROM purposes WHERE hierarchy_id = $1",
            id.get(),
        )
        .await
    }

    async fn suppliers(&self) -> StoreResult<Vec<Supplier>> {
        let rows = sqlx::query("SELECT id, name FROM suppliers ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_suppliers", e))?;
        rows.iter()
            .map(|row| {
                Ok(Supplier {
                    id: SupplierId::new(row.try_get("id")?),
                    name: row.try_get("name")?,
                })
            })
            .collect()
    }

    async fn supplier(&self, id: SupplierId) -> StoreResult<Option<Supplier>> {
        let name: Option<String> = sqlx::query_scalar("SELECT name FROM suppliers WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_supplier", e))?;
        Ok(name.map(|name| Supplier { id, name }))
    }

    #[instrument(skip(self, new), err)]
    async fn insert_supplier(&self, new: NewSupplier) -> StoreResult<Supplier> {
        let id: i64 = sqlx::query_scalar("INSERT INTO suppliers (name) VALUES ($1) RETURNING id")
            .bind(&new.name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_supplier", e))?;
        Ok(Supplier {
            id: SupplierId::new(id),
            name: new.name,
        })
    }

    async fn save_supplier(&self, supplier: &Supplier) -> StoreResult<()> {
        let result = sqlx::query("UPDATE suppliers SET name = $2 WHERE id = $1")
            .bind(supplier.id.get())
            .bind(&supplier.name)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_supplier", e))?;
        require_affected(result.rows_affected(), "Supplier", supplier.id)
    }

    #[instrument(skip(self), err)]
    async fn delete_supplier(&self, id: SupplierId) -> StoreResult<()> {
        let used = self
            .count(
                "count_supplier_purposes",
                "SELECT COUNT(*) FROM purposes WHERE supplier_id = $1",
                id.get(),
            )
            .await?;
        if used > 0 {
            return Err(still_referenced("supplier", id, "purposes", used));
        }
        let result = sqlx::query("DELETE FROM suppliers WHERE id = $1")
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_supplier", e))?;
        require_affected(result.rows_affected(), "Supplier", id)
    }

    async fn service_types(&self) -> StoreResult<Vec<ServiceType>> {
        let rows = sqlx::query("SELECT id, name FROM service_types ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_service_types", e))?;
        rows.iter()
            .map(|row| {
                Ok(ServiceType {
                    id: ServiceTypeId::new(row.try_get("id")?),
                    name: row.try_get("name")?,
                })
            })
            .collect()
    }

    async fn service_type(&self, id: ServiceTypeId) -> StoreResult<Option<ServiceType>> {
        let name: Option<String> = sqlx::query_scalar("SELECT name FROM service_types WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_service_type", e))?;
        Ok(name.map(|name| ServiceType { id, name }))
    }

    #[instrument(skip(self, new), err)]
    async fn insert_service_type(&self, new: NewServiceType) -> StoreResult<ServiceType> {
        let id: i64 = sqlx::query_scalar("INSERT INTO service_types (name) VALUES ($1) RETURNING id")
            .bind(&new.name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_service_type", e))?;
        Ok(ServiceType {
            id: ServiceTypeId::new(id),
            name: new.name,
        })
    }

    async fn save_service_type(&self, service_type: &ServiceType) -> StoreResult<()> {
        let result = sqlx::query("UPDATE service_types SET name = $2 WHERE id = $1")
            .bind(service_type.id.get())
            .bind(&service_type.name)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_service_type", e))?;
        require_affected(result.rows_affected(), "Service type", service_type.id)
    }

    #[instrument(skip(self), err)]
    async fn delete_service_type(&self, id: ServiceTypeId) -> StoreResult<()> {
        let services = self
            .count(
                "count_type_services",
                "SELECT COUNT(*) FROM services WHERE service_type_id = $1",
                id.get(),
            )
            .await?;
        if services > 0 {
            return Err(still_referenced("service type", id, "services", services));
        }
        let purposes = self
            .count(
                "count_type_purposes",
                "SELECT COUNT(*) FROM purposes WHERE service_type_id = $1",
                id.get(),
            )
            .await?;
        if purposes > 0 {
            return Err(still_referenced("service type", id, "purposes", purposes));
        }
        let result = sqlx::query("DELETE FROM service_types WHERE id = $1")
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_service_type", e))?;
        require_affected(result.rows_affected(), "Service type", id)
    }

    async fn services(&self, service_type_id: Option<ServiceTypeId>) -> StoreResult<Vec<Service>> {
        let rows = sqlx::query(
            "SELECT id, name, service_type_id FROM services WHERE ($1::BIGINT IS NULL OR service_type_id = $1) ORDER BY id",
        )
        .bind(service_type_id.map(|id| id.get()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_services", e))?;
        rows.iter()
            .map(|row| {
                Ok(Service {
                    id: ServiceId::new(row.try_get("id")?),
                    name: row.try_get("name")?,
                    service_type_id: ServiceTypeId::new(row.try_get("service_type_id")?),
                })
            })
            .collect()
    }

    async fn service(&self, id: ServiceId) -> StoreResult<Option<Service>> {
        let row = sqlx::query("SELECT name, service_type_id FROM services WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_service", e))?;
        row.map(|row| {
            Ok(Service {
                id,
                name: row.try_get("name")?,
                service_type_id: ServiceTypeId::new(row.try_get("service_type_id")?),
            })
        })
        .transpose()
    }

    #[instrument(skip(self, new), err)]
    async fn insert_service(&self, new: NewService) -> StoreResult<Service> {
        let id: i64 =
            sqlx::query_scalar("INSERT INTO services (name, service_type_id) VALUES ($1, $2) RETURNING id")
                .bind(&new.name)
                .bind(new.service_type_id.get())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("insert_service", e))?;
        Ok(Service {
            id: ServiceId::new(id),
            name: new.name,
            service_type_id: new.service_type_id,
        })
    }

    async fn save_service(&self, service: &Service) -> StoreResult<()> {
        let result = sqlx::query("UPDATE services SET name = $2, service_type_id = $3 WHERE id = $1")
            .bind(service.id.get())
            .bind(&service.name)
            .bind(service.service_type_id.get())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_service", e))?;
        require_affected(result.rows_affected(), "Service", service.id)
    }

    #[instrument(skip(self), err)]
    async fn delete_service(&self, id: ServiceId) -> StoreResult<()> {
        let used = self
            .count(
                "count_service_purposes",
                "SELECT COUNT(DISTINCT purpose_id) FROM purpose_contents WHERE service_id = $1",
                id.get(),
            )
            .await?;
        if used > 0 {
            return Err(still_referenced("service", id, "purposes", used));
        }
        let result = sqlx::query("DELETE FROM services WHERE id = $1")
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_service", e))?;
        require_affected(result.rows_affected(), "Service", id)
    }

    async fn budget_sources(&self) -> StoreResult<Vec<BudgetSource>> {
        let rows = sqlx::query("SELECT id, name FROM budget_sources ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_budget_sources", e))?;
        rows.iter()
            .map(|row| {
                Ok(BudgetSource {
                    id: BudgetSourceId::new(row.try_get("id")?),
                    name: row.try_get("name")?,
                })
            })
            .collect()
    }

    async fn budget_source(&self, id: BudgetSourceId) -> StoreResult<Option<BudgetSource>> {
        let name: Option<String> = sqlx::query_scalar("SELECT name FROM budget_sources WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_budget_source", e))?;
        Ok(name.map(|name| BudgetSource { id, name }))
    }

    #[instrument(skip(self, new), err)]
    async fn insert_budget_source(&self, new: NewBudgetSource) -> StoreResult<BudgetSource> {
        let id: i64 = sqlx::query_scalar("INSERT INTO budget_sources (name) VALUES ($1) RETURNING id")
            .bind(&new.name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_budget_source", e))?;
        Ok(BudgetSource {
            id: BudgetSourceId::new(id),
            name: new.name,
        })
    }

    async fn save_budget_source(&self, budget_source: &BudgetSource) -> StoreResult<()> {
        let result = sqlx::query("UPDATE budget_sources SET name = $2 WHERE id = $1")
            .bind(budget_source.id.get())
            .bind(&budget_source.name)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_budget_source", e))?;
        require_affected(result.rows_affected(), "Budget source", budget_source.id)
    }

    #[instrument(skip(self), err)]
    async fn delete_budget_source(&self, id: BudgetSourceId) -> StoreResult<()> {
        let used = self
            .count(
                "count_budget_source_purposes",
                "SELECT COUNT(*) FROM purposes WHERE budget_source_id = $1",
                id.get(),
            )
            .await?;
        if used > 0 {
            return Err(still_referenced("budget source", id, "purposes", used));
        }
        let result = sqlx::query("DELETE FROM budget_sources WHERE id = $1")
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_budget_source", e))?;
        require_affected(result.rows_affected(), "Budget source", id)
    }

    async fn responsible_authorities(&self) -> StoreResult<Vec<ResponsibleAuthority>> {
        let rows = sqlx::query("SELECT id, name, description, created_at FROM responsible_authorities ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_responsible_authorities", e))?;
        rows.iter().map(authority_from_row).collect()
    }

    async fn responsible_authority(&self, id: ResponsibleAuthorityId) -> StoreResult<Option<ResponsibleAuthority>> {
        let row = sqlx::query("SELECT id, name, description, created_at FROM responsible_authorities WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_responsible_authority", e))?;
        row.as_ref().map(authority_from_row).transpose()
    }

    #[instrument(skip(self, new), err)]
    async fn insert_responsible_authority(
        &self,
        new: NewResponsibleAuthority,
        now: DateTime<Utc>,
    ) -> StoreResult<ResponsibleAuthority> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO responsible_authorities (name, description, created_at) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(&new.name)
        .bind(new.description.as_deref())
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_responsible_authority", e))?;
        Ok(ResponsibleAuthority {
            id: ResponsibleAuthorityId::new(id),
            name: new.name,
            description: new.description,
            created_at: now,
        })
    }

    async fn save_responsible_authority(&self, authority: &ResponsibleAuthority) -> StoreResult<()> {
        let result = sqlx::query("UPDATE responsible_authorities SET name = $2, description = $3 WHERE id = $1")
            .bind(authority.id.get())
            .bind(&authority.name)
            .bind(authority.description.as_deref())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_responsible_authority", e))?;
        require_affected(result.rows_affected(), "Responsible authority", authority.id)
    }

    #[instrument(skip(self), err)]
    async fn delete_responsible_authority(&self, id: ResponsibleAuthorityId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM responsible_authorities WHERE id = $1")
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_responsible_authority", e))?;
        require_affected(result.rows_affected(), "Responsible authority", id)
    }

    #[instrument(skip(self, filter), err)]
    async fn load_purposes(&self, filter: &PurposeFilter) -> StoreResult<Vec<PurposeRecord>> {
        let records = self.select_purposes(filter, None).await?;
        Span::current().record("purpose_count", records.len());
        Ok(records)
    }

    async fn purpose(&self, id: PurposeId) -> StoreResult<Option<PurposeRecord>> {
        let mut records = self.select_purposes(&PurposeFilter::default(), Some(id)).await?;
        Ok(records.pop())
    }

    #[instrument(skip(self, new), err)]
    async fn create_purpose(
        &self,
        new: &NewPurpose,
        now: DateTime<Utc>,
        changed_by: Option<&str>,
    ) -> StoreResult<PurposeRecord> {
        let mut tx = self.begin().await?;
        let id: i64 = sqlx::query_scalar("SELECT nextval(pg_get_serial_sequence('purposes', 'id'))")
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("next_purpose_id", e))?;
        let (purpose, initial) = new.into_purpose(PurposeId::new(id), now, changed_by);

        sqlx::query(
            r#"
            INSERT INTO purposes (
                id, hierarchy_id, expected_delivery, comments, description, status,
                supplier_id, service_type_id, budget_source_id, is_flagged, creation_time, last_modified
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(purpose.id.get())
        .bind(purpose.hierarchy_id.map(|h| h.get()))
        .bind(purpose.expected_delivery)
        .bind(purpose.comments.as_deref())
        .bind(purpose.description.as_deref())
        .bind(purpose.status.as_str())
        .bind(purpose.supplier_id.map(|s| s.get()))
        .bind(purpose.service_type_id.map(|s| s.get()))
        .bind(purpose.budget_source_id.map(|b| b.get()))
        .bind(purpose.is_flagged)
        .bind(purpose.creation_time)
        .bind(purpose.last_modified)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_purpose", e))?;

        replace_contents(&mut tx, purpose.id, &new.contents).await?;
        insert_status_change(&mut tx, purpose.id, &initial).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        self.purpose(purpose.id).await?.ok_or_else(|| missing("Purpose", purpose.id))
    }

    #[instrument(skip(self, patch), err)]
    async fn update_purpose(
        &self,
        id: PurposeId,
        patch: &PurposePatch,
        now: DateTime<Utc>,
        changed_by: Option<&str>,
    ) -> StoreResult<PurposeRecord> {
        let mut tx = self.begin().await?;
        // Row lock so concurrent status changes append history in order.
        let row = sqlx::query(&format!("{PURPOSE_SELECT} AND p.id = $1 FOR UPDATE OF p"))
            .bind(id.get())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_purpose", e))?
            .ok_or_else(|| missing("Purpose", id))?;
        let current = record_from_row(&row)?.purpose;
        let change = patch.apply(&current, now, changed_by)?;
        let purpose = &change.purpose;

        sqlx::query(
            r#"
            UPDATE purposes SET
                hierarchy_id = $2, expected_delivery = $3, comments = $4, description = $5,
                status = $6, supplier_id = $7, service_type_id = $8, budget_source_id = $9,
                is_flagged = $10, last_modified = $11
            WHERE id = $1
            "#,
        )
        .bind(id.get())
        .bind(purpose.hierarchy_id.map(|h| h.get()))
        .bind(purpose.expected_delivery)
        .bind(purpose.comments.as_deref())
        .bind(purpose.description.as_deref())
        .bind(purpose.status.as_str())
        .bind(purpose.supplier_id.map(|s| s.get()))
        .bind(purpose.service_type_id.map(|s| s.get()))
        .bind(purpose.budget_source_id.map(|b| b.get()))
        .bind(purpose.is_flagged)
        .bind(purpose.last_modified)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_purpose", e))?;

        if let Some(contents) = &change.contents {
            replace_contents(&mut tx, id, contents).await?;
        }
        if let Some(status_change) = &change.status_change {
            insert_status_change(&mut tx, id, status_change).await?;
        }
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        self.purpose(id).await?.ok_or_else(|| missing("Purpose", id))
    }

    #[instrument(skip(self), err)]
    async fn delete_purpose(&self, id: PurposeId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM purposes WHERE id = $1")
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_purpose", e))?;
        require_affected(result.rows_affected(), "Purpose", id)
    }

    #[instrument(skip(self, ids), fields(candidates = ids.len()), err)]
    async fn flag_purposes(&self, ids: &[PurposeId], now: DateTime<Utc>) -> StoreResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids: Vec<i64> = ids.iter().map(|id| id.get()).collect();
        let result = sqlx::query(
            "UPDATE purposes SET is_flagged = TRUE, last_modified = $2 WHERE id = ANY($1) AND NOT is_flagged",
        )
        .bind(&ids)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("flag_purposes", e))?;
        Ok(result.rows_affected())
    }

    async fn emf(&self, id: EmfId) -> StoreResult<Option<Emf>> {
        let row = sqlx::query(&format!("SELECT {EMF_COLUMNS} FROM emfs WHERE id = $1"))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_emf", e))?;
        let Some(row) = row else {
            return Ok(None);
        };
        let mut emfs = [emf_from_row(&row)?];
        self.attach_costs(&mut emfs).await?;
        let [emf] = emfs;
        Ok(Some(emf))
    }

    #[instrument(skip(self, new), fields(emf_id = %new.emf_id), err)]
    async fn create_emf(&self, purpose_id: PurposeId, new: NewEmf, now: DateTime<Utc>) -> StoreResult<Emf> {
        let mut tx = self.begin().await?;
        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM purposes WHERE id = $1 FOR UPDATE")
            .bind(purpose_id.get())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_purpose", e))?;
        if exists.is_none() {
            return Err(missing("Purpose", purpose_id));
        }
        ensure_unique_emf_id(&mut tx, &new.emf_id, None).await?;

        let id: i64 = sqlx::query_scalar("SELECT nextval(pg_get_serial_sequence('emfs', 'id'))")
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("next_emf_id", e))?;
        let emf = new.into_emf(EmfId::new(id), purpose_id, now);

        sqlx::query(&format!(
            "INSERT INTO emfs ({EMF_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(emf.id.get())
        .bind(&emf.emf_id)
        .bind(emf.purpose_id.get())
        .bind(emf.creation_time)
        .bind(emf.order_id.as_deref())
        .bind(emf.order_creation_date)
        .bind(emf.demand_id.as_deref())
        .bind(emf.demand_creation_date)
        .bind(emf.bikushit_id.as_deref())
        .bind(emf.bikushit_creation_date)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_emf", e))?;

        touch_purpose(&mut tx, purpose_id, now).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(emf)
    }

    #[instrument(skip(self, patch), err)]
    async fn update_emf(&self, id: EmfId, patch: &EmfPatch, now: DateTime<Utc>) -> StoreResult<Emf> {
        let mut tx = self.begin().await?;
        let row = sqlx::query(&format!("SELECT {EMF_COLUMNS} FROM emfs WHERE id = $1 FOR UPDATE"))
            .bind(id.get())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_emf", e))?
            .ok_or_else(|| missing("EMF", id))?;
        let current = emf_from_row(&row)?;
        let updated = patch.apply(&current)?;
        ensure_unique_emf_id(&mut tx, &updated.emf_id, Some(id)).await?;

        sqlx::query(
            r#"
            UPDATE emfs SET
                emf_id = $2, order_id = $3, order_creation_date = $4, demand_id = $5,
                demand_creation_date = $6, bikushit_id = $7, bikushit_creation_date = $8
            WHERE id = $1
            "#,
        )
        .bind(id.get())
        .bind(&updated.emf_id)
        .bind(updated.order_id.as_deref())
        .bind(updated.order_creation_date)
        .bind(updated.demand_id.as_deref())
        .bind(updated.demand_creation_date)
        .bind(updated.bikushit_id.as_deref())
        .bind(updated.bikushit_creation_date)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_emf", e))?;

        touch_purpose(&mut tx, updated.purpose_id, now).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        let mut emfs = [updated];
        self.attach_costs(&mut emfs).await?;
        let [emf] = emfs;
        Ok(emf)
    }

    #[instrument(skip(self), err)]
    async fn delete_emf(&self, id: EmfId, now: DateTime<Utc>) -> StoreResult<()> {
        let mut tx = self.begin().await?;
        let purpose_id: Option<i64> = sqlx::query_scalar("DELETE FROM emfs WHERE id = $1 RETURNING purpose_id")
            .bind(id.get())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_emf", e))?;
        let purpose_id = purpose_id.ok_or_else(|| missing("EMF", id))?;
        touch_purpose(&mut tx, PurposeId::new(purpose_id), now).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn cost(&self, id: CostId) -> StoreResult<Option<Cost>> {
        let row = sqlx::query("SELECT id, emf_id, currency, amount FROM costs WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_cost", e))?;
        row.as_ref().map(cost_from_row).transpose()
    }

    #[instrument(skip(self, new), err)]
    async fn create_cost(&self, emf_id: EmfId, new: &NewCost, now: DateTime<Utc>) -> StoreResult<Cost> {
        new.validate()?;
        let mut tx = self.begin().await?;
        let purpose_id: Option<i64> = sqlx::query_scalar("SELECT purpose_id FROM emfs WHERE id = $1")
            .bind(emf_id.get())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("get_cost_emf", e))?;
        let purpose_id = purpose_id.ok_or_else(|| missing("EMF", emf_id))?;

        let id: i64 =
            sqlx::query_scalar("INSERT INTO costs (emf_id, currency, amount) VALUES ($1, $2, $3) RETURNING id")
                .bind(emf_id.get())
                .bind(new.currency.as_str())
                .bind(new.amount)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("insert_cost", e))?;

        touch_purpose(&mut tx, PurposeId::new(purpose_id), now).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(Cost {
            id: CostId::new(id),
            emf_id,
            currency: new.currency,
            amount: new.amount,
        })
    }

    #[instrument(skip(self, patch), err)]
    async fn update_cost(&self, id: CostId, patch: &CostPatch, now: DateTime<Utc>) -> StoreResult<Cost> {
        let mut tx = self.begin().await?;
        let row = sqlx::query("SELECT id, emf_id, currency, amount FROM costs WHERE id = $1 FOR UPDATE")
            .bind(id.get())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_cost", e))?
            .ok_or_else(|| missing("Cost", id))?;
        let updated = patch.apply(&cost_from_row(&row)?)?;

        sqlx::query("UPDATE costs SET currency = $2, amount = $3 WHERE id = $1")
            .bind(id.get())
            .bind(updated.currency.as_str())
            .bind(updated.amount)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_cost", e))?;

        let purpose_id: i64 = sqlx::query_scalar("SELECT purpose_id FROM emfs WHERE id = $1")
            .bind(updated.emf_id.get())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("get_cost_emf", e))?;
        touch_purpose(&mut tx, PurposeId::new(purpose_id), now).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(updated)
    }

    #[instrument(skip(self), err)]
    async fn delete_cost(&self, id: CostId, now: DateTime<Utc>) -> StoreResult<()> {
        let mut tx = self.begin().await?;
        let purpose_id: Option<i64> = sqlx::query_scalar(
            r#"
            DELETE FROM costs c USING emfs e
            WHERE c.id = $1 AND e.id = c.emf_id
            RETURNING e.purpose_id
            "#,
        )
        .bind(id.get())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("delete_cost", e))?;
        let purpose_id = purpose_id.ok_or_else(|| missing("Cost", id))?;
        touch_purpose(&mut tx, PurposeId::new(purpose_id), now).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter_sql(filter: &PurposeFilter) -> String {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT p.id FROM purposes p WHERE TRUE");
        push_filter(&mut qb, filter);
        qb.sql().to_string()
    }

    #[test]
    fn empty_filter_adds_no_predicates() {
        assert_eq!(filter_sql(&PurposeFilter::default()), "SELECT p.id FROM purposes p WHERE TRUE");
    }

    #[test]
    fn date_window_is_inclusive_on_the_utc_day() {
        let filter = PurposeFilter {
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1),
            end_date: NaiveDate::from_ymd_opt(2025, 1, 31),
            ..PurposeFilter::default()
        };
        let sql = filter_sql(&filter);
        assert!(sql.contains(" AND (p.creation_time AT TIME ZONE 'UTC')::date >= $1"));
        assert!(sql.contains(" AND (p.creation_time AT TIME ZONE 'UTC')::date <= $2"));
    }

    #[test]
    fn live_only_excludes_completed_purposes() {
        let filter = PurposeFilter { live_only: true, ..PurposeFilter::default() };
        assert_eq!(
            filter_sql(&filter),
            "SELECT p.id FROM purposes p WHERE TRUE AND p.status <> $1"
        );
    }

    #[test]
    fn hierarchy_scope_matches_node_and_descendants_by_path() {
        let filter = PurposeFilter {
            hierarchy_ids: vec![HierarchyId::new(3), HierarchyId::new(7)],
            ..PurposeFilter::default()
        };
        assert_eq!(
            filter_sql(&filter),
            "SELECT p.id FROM purposes p WHERE TRUE AND EXISTS (SELECT 1 FROM hierarchies a \
             WHERE a.id = ANY($1) AND (h.path = a.path OR starts_with(h.path, a.path || ' / ')))"
        );
    }

    #[test]
    fn id_lists_bind_one_array_each() {
        let filter = PurposeFilter {
            statuses: vec![PurposeStatus::InProgress, PurposeStatus::Signed],
            supplier_ids: vec![SupplierId::new(1), SupplierId::new(2), SupplierId::new(2)],
            service_type_ids: vec![ServiceTypeId::new(4)],
            service_ids: vec![ServiceId::new(5), ServiceId::new(6)],
            is_flagged: Some(true),
            ..PurposeFilter::default()
        };
        let sql = filter_sql(&filter);
        assert!(sql.contains(" AND p.status = ANY($1)"));
        assert!(sql.contains(" AND p.supplier_id = ANY($2)"));
        assert!(sql.contains(" AND p.service_type_id = ANY($3)"));
        assert!(sql.contains("pc.purpose_id = p.id AND pc.service_id = ANY($4))"));
        assert!(sql.contains(" AND p.is_flagged = $5"));
        assert!(!sql.contains("$6"));
    }

    #[test]
    fn predicates_compose_in_bind_order() {
        let filter = PurposeFilter {
            start_date: NaiveDate::from_ymd_opt(2025, 3, 1),
            live_only: true,
            hierarchy_ids: vec![HierarchyId::new(1)],
            ..PurposeFilter::default()
        };
        let sql = filter_sql(&filter);
        let start = sql.find("::date >= $1").unwrap();
        let live = sql.find("p.status <> $2").unwrap();
        let scope = sql.find("a.id = ANY($3)").unwrap();
        assert!(start < live && live < scope);
    }
}
