//! Row types and queries shared by the services
//!
//! Every function takes a connection so callers decide the transaction
//! boundary. Balance and forecast writes are always deltas.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    ComponentLink, ForecastEntry, LinkAction, LinkAuditEntry, LinkStatus, MovementEvent,
    MovementKind, MovementOrigin, ProductClassification, ProductionOperation, StockBalance,
};
use shared::unification::CodeUnifier;

// ============================================================================
// Rows
// ============================================================================

#[derive(Debug, FromRow)]
pub struct BalanceRow {
    pub product_code: String,
    pub display_name: String,
    pub current_balance: Decimal,
    pub last_updated_at: DateTime<Utc>,
    pub min_projected_balance_7d: Option<Decimal>,
    pub stockout_date: Option<NaiveDate>,
    pub projection_stale: bool,
    pub projection_refreshed_at: Option<DateTime<Utc>>,
}

impl From<BalanceRow> for StockBalance {
    fn from(row: BalanceRow) -> Self {
        StockBalance {
            product_code: row.product_code,
            display_name: row.display_name,
            current_balance: row.current_balance,
            last_updated_at: row.last_updated_at,
            min_projected_balance_7d: row.min_projected_balance_7d,
            stockout_date: row.stockout_date,
            projection_stale: row.projection_stale,
            projection_refreshed_at: row.projection_refreshed_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct ForecastRow {
    pub product_code: String,
    pub forecast_date: NaiveDate,
    pub forecast_in: Decimal,
    pub forecast_out: Decimal,
}

impl From<ForecastRow> for ForecastEntry {
    fn from(row: ForecastRow) -> Self {
        ForecastEntry {
            product_code: row.product_code,
            date: row.forecast_date,
            forecast_in: row.forecast_in,
            forecast_out: row.forecast_out,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct ClassificationRow {
    pub product_code: String,
    pub display_name: String,
    pub is_manufactured: bool,
    pub is_purchased: bool,
    pub is_sellable: bool,
}

impl From<ClassificationRow> for ProductClassification {
    fn from(row: ClassificationRow) -> Self {
        ProductClassification {
            product_code: row.product_code,
            display_name: row.display_name,
            is_manufactured: row.is_manufactured,
            is_purchased: row.is_purchased,
            is_sellable: row.is_sellable,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct LinkRow {
    pub id: Uuid,
    pub parent_product_code: String,
    pub component_product_code: String,
    pub quantity_per_unit: Decimal,
    pub version_tag: String,
    pub status: String,
    pub superseded_by: Option<Uuid>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_by: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<LinkRow> for ComponentLink {
    fn from(row: LinkRow) -> Self {
        ComponentLink {
            id: row.id,
            parent_product_code: row.parent_product_code,
            component_product_code: row.component_product_code,
            quantity_per_unit: row.quantity_per_unit,
            version_tag: row.version_tag,
            status: LinkStatus::from_str(&row.status).unwrap_or(LinkStatus::Inactive),
            superseded_by: row.superseded_by,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_by: row.updated_by,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct AuditRow {
    pub id: Uuid,
    pub link_id: Uuid,
    pub action: String,
    pub quantity_per_unit: Decimal,
    pub actor: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl TryFrom<AuditRow> for LinkAuditEntry {
    type Error = AppError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        let action = LinkAction::from_str(&row.action)
            .ok_or_else(|| AppError::Internal(format!("Unknown link action: {}", row.action)))?;
        Ok(LinkAuditEntry {
            id: row.id,
            link_id: row.link_id,
            action,
            quantity_per_unit: row.quantity_per_unit,
            actor: row.actor,
            recorded_at: row.recorded_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct OperationRow {
    pub operation_id: Uuid,
    pub root_product_code: String,
    pub quantity: Decimal,
    pub movement_date: NaiveDate,
    pub requested_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<OperationRow> for ProductionOperation {
    fn from(row: OperationRow) -> Self {
        ProductionOperation {
            operation_id: row.operation_id,
            root_product_code: row.root_product_code,
            quantity: row.quantity,
            movement_date: row.movement_date,
            requested_by: row.requested_by,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct EventRow {
    pub id: Uuid,
    pub operation_id: Option<Uuid>,
    pub product_code: String,
    pub quantity: Decimal,
    pub kind: String,
    pub origin: String,
    pub root_product_code: Option<String>,
    pub parent_production_id: Option<Uuid>,
    pub movement_date: NaiveDate,
    pub depth: i32,
    pub note: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for MovementEvent {
    type Error = AppError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let kind = MovementKind::from_str(&row.kind)
            .ok_or_else(|| AppError::Internal(format!("Unknown movement kind: {}", row.kind)))?;
        let origin = MovementOrigin::from_str(&row.origin)
            .ok_or_else(|| AppError::Internal(format!("Unknown movement origin: {}", row.origin)))?;
        Ok(MovementEvent {
            id: row.id,
            operation_id: row.operation_id,
            product_code: row.product_code,
            quantity: row.quantity,
            kind,
            origin,
            root_product_code: row.root_product_code,
            parent_production_id: row.parent_production_id,
            movement_date: row.movement_date,
            depth: u32::try_from(row.depth).unwrap_or(0),
            note: row.note,
            recorded_at: row.recorded_at,
        })
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// All unification assignments as one resolver
pub async fn load_unifier(conn: &mut PgConnection) -> AppResult<CodeUnifier> {
    let rows = sqlx::query_as::<_, (String, String)>(
        "SELECT product_code, unification_code FROM product_unifications ORDER BY product_code",
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(CodeUnifier::from_assignments(rows))
}

pub async fn fetch_classifications(
    conn: &mut PgConnection,
    codes: &[String],
) -> AppResult<Vec<ProductClassification>> {
    let rows = sqlx::query_as::<_, ClassificationRow>(
        r#"
        SELECT product_code, display_name, is_manufactured, is_purchased, is_sellable
        FROM product_classifications
        WHERE product_code = ANY($1)
        "#,
    )
    .bind(codes)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Active links whose parent is one of `parents`
pub async fn fetch_active_links(conn: &mut PgConnection, parents: &[String]) -> AppResult<Vec<ComponentLink>> {
    let rows = sqlx::query_as::<_, LinkRow>(
        r#"
        SELECT id, parent_product_code, component_product_code, quantity_per_unit, version_tag,
               status, superseded_by, created_by, created_at, updated_by, updated_at
        FROM component_links
        WHERE status = 'active' AND parent_product_code = ANY($1)
        ORDER BY parent_product_code, component_product_code
        "#,
    )
    .bind(parents)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn fetch_link(conn: &mut PgConnection, id: Uuid, lock: bool) -> AppResult<ComponentLink> {
    let sql = if lock {
        r#"
        SELECT id, parent_product_code, component_product_code, quantity_per_unit, version_tag,
               status, superseded_by, created_by, created_at, updated_by, updated_at
        FROM component_links WHERE id = $1 FOR UPDATE
        "#
    } else {
        r#"
        SELECT id, parent_product_code, component_product_code, quantity_per_unit, version_tag,
               status, superseded_by, created_by, created_at, updated_by, updated_at
        FROM component_links WHERE id = $1
        "#
    };
    let row = sqlx::query_as::<_, LinkRow>(sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Component link {}", id)))?;

    Ok(row.into())
}

pub async fn insert_link(conn: &mut PgConnection, link: &ComponentLink) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO component_links (
            id, parent_product_code, component_product_code, quantity_per_unit, version_tag,
            status, superseded_by, created_by, created_at, updated_by, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(link.id)
    .bind(&link.parent_product_code)
    .bind(&link.component_product_code)
    .bind(link.quantity_per_unit)
    .bind(&link.version_tag)
    .bind(link.status.as_str())
    .bind(link.superseded_by)
    .bind(&link.created_by)
    .bind(link.created_at)
    .bind(&link.updated_by)
    .bind(link.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Write back the mutable lifecycle fields of a link
pub async fn update_link_status(conn: &mut PgConnection, link: &ComponentLink) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE component_links
        SET status = $2, superseded_by = $3, updated_by = $4, updated_at = $5
        WHERE id = $1
        "#,
    )
    .bind(link.id)
    .bind(link.status.as_str())
    .bind(link.superseded_by)
    .bind(&link.updated_by)
    .bind(link.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn insert_audit(conn: &mut PgConnection, entry: &LinkAuditEntry) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO component_link_audit (id, link_id, action, quantity_per_unit, actor, recorded_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(entry.id)
    .bind(entry.link_id)
    .bind(entry.action.as_str())
    .bind(entry.quantity_per_unit)
    .bind(&entry.actor)
    .bind(entry.recorded_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

// ============================================================================
// Ledger
// ============================================================================

/// Balance rows of `codes`, locked in code order when `lock` is set
pub async fn fetch_balances(conn: &mut PgConnection, codes: &[String], lock: bool) -> AppResult<Vec<StockBalance>> {
    let rows = sqlx::query_as::<_, BalanceRow>(balances_sql(lock))
        .bind(codes)
        .fetch_all(&mut *conn)
        .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Locked reads take rows in product code order, matching every other writer
fn balances_sql(lock: bool) -> &'static str {
    if lock {
        r#"
        SELECT product_code, display_name, current_balance, last_updated_at,
               min_projected_balance_7d, stockout_date, projection_stale, projection_refreshed_at
        FROM stock_balances
        WHERE product_code = ANY($1)
        ORDER BY product_code
        FOR UPDATE
        "#
    } else {
        r#"
        SELECT product_code, display_name, current_balance, last_updated_at,
               min_projected_balance_7d, stockout_date, projection_stale, projection_refreshed_at
        FROM stock_balances
        WHERE product_code = ANY($1)
        ORDER BY product_code
        "#
    }
}

/// Add `delta` to one balance row, creating it on first reference
pub async fn apply_balance_delta(
    conn: &mut PgConnection,
    product_code: &str,
    display_name: &str,
    delta: Decimal,
    at: DateTime<Utc>,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO stock_balances (product_code, display_name, current_balance, last_updated_at, projection_stale)
        VALUES ($1, $2, $3, $4, TRUE)
        ON CONFLICT (product_code) DO UPDATE SET
            current_balance = stock_balances.current_balance + EXCLUDED.current_balance,
            last_updated_at = EXCLUDED.last_updated_at,
            projection_stale = TRUE
        "#,
    )
    .bind(product_code)
    .bind(display_name)
    .bind(delta)
    .bind(at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Create a zero balance row if missing and mark its projection stale
pub async fn touch_balance(
    conn: &mut PgConnection,
    product_code: &str,
    display_name: &str,
    at: DateTime<Utc>,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO stock_balances (product_code, display_name, current_balance, last_updated_at, projection_stale)
        VALUES ($1, $2, 0, $3, TRUE)
        ON CONFLICT (product_code) DO UPDATE SET projection_stale = TRUE
        "#,
    )
    .bind(product_code)
    .bind(display_name)
    .bind(at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Add forecast deltas to one row; the row is deleted once both sides are spent
pub async fn apply_forecast_delta(
    conn: &mut PgConnection,
    product_code: &str,
    date: NaiveDate,
    delta_in: Decimal,
    delta_out: Decimal,
) -> AppResult<ForecastEntry> {
    let row = sqlx::query_as::<_, ForecastRow>(
        r#"
        INSERT INTO forecast_entries (product_code, forecast_date, forecast_in, forecast_out)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (product_code, forecast_date) DO UPDATE SET
            forecast_in = forecast_entries.forecast_in + EXCLUDED.forecast_in,
            forecast_out = forecast_entries.forecast_out + EXCLUDED.forecast_out,
            updated_at = NOW()
        RETURNING product_code, forecast_date, forecast_in, forecast_out
        "#,
    )
    .bind(product_code)
    .bind(date)
    .bind(delta_in)
    .bind(delta_out)
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        DELETE FROM forecast_entries
        WHERE product_code = $1 AND forecast_date = $2 AND forecast_in <= 0 AND forecast_out <= 0
        "#,
    )
    .bind(product_code)
    .bind(date)
    .execute(&mut *conn)
    .await?;

    Ok(row.into())
}

pub async fn fetch_forecasts(
    conn: &mut PgConnection,
    product_code: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> AppResult<Vec<ForecastEntry>> {
    let rows = sqlx::query_as::<_, ForecastRow>(
        r#"
        SELECT product_code, forecast_date, forecast_in, forecast_out
        FROM forecast_entries
        WHERE product_code = $1 AND forecast_date BETWEEN $2 AND $3
        ORDER BY forecast_date
        "#,
    )
    .bind(product_code)
    .bind(from)
    .bind(to)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn mark_projection_stale(conn: &mut PgConnection, codes: &[String]) -> AppResult<()> {
    sqlx::query("UPDATE stock_balances SET projection_stale = TRUE WHERE product_code = ANY($1)")
        .bind(codes)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Store a refreshed 7-day projection cache
pub async fn store_projection(conn: &mut PgConnection, balance: &StockBalance) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE stock_balances
        SET min_projected_balance_7d = $2, stockout_date = $3,
            projection_stale = FALSE, projection_refreshed_at = $4
        WHERE product_code = $1
        "#,
    )
    .bind(&balance.product_code)
    .bind(balance.min_projected_balance_7d)
    .bind(balance.stockout_date)
    .bind(balance.projection_refreshed_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

// ============================================================================
// Operations and events
// ============================================================================

pub async fn insert_operation(conn: &mut PgConnection, operation: &ProductionOperation) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO production_operations (
            operation_id, root_product_code, quantity, movement_date, requested_by, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(operation.operation_id)
    .bind(&operation.root_product_code)
    .bind(operation.quantity)
    .bind(operation.movement_date)
    .bind(&operation.requested_by)
    .bind(operation.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn fetch_operation(conn: &mut PgConnection, operation_id: Uuid) -> AppResult<ProductionOperation> {
    let row = sqlx::query_as::<_, OperationRow>(
        r#"
        SELECT operation_id, root_product_code, quantity, movement_date, requested_by, created_at
        FROM production_operations
        WHERE operation_id = $1
        "#,
    )
    .bind(operation_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Operation {}", operation_id)))?;

    Ok(row.into())
}

/// Append one event; insertion order is the trail order
pub async fn insert_event(conn: &mut PgConnection, event: &MovementEvent) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO movement_events (
            id, operation_id, product_code, quantity, kind, origin, root_product_code,
            parent_production_id, movement_date, depth, note, recorded_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(event.id)
    .bind(event.operation_id)
    .bind(&event.product_code)
    .bind(event.quantity)
    .bind(event.kind.as_str())
    .bind(event.origin.as_str())
    .bind(&event.root_product_code)
    .bind(event.parent_production_id)
    .bind(event.movement_date)
    .bind(i32::try_from(event.depth).unwrap_or(i32::MAX))
    .bind(&event.note)
    .bind(event.recorded_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn fetch_operation_events(conn: &mut PgConnection, operation_id: Uuid) -> AppResult<Vec<MovementEvent>> {
    let rows = sqlx::query_as::<_, EventRow>(
        r#"
        SELECT id, operation_id, product_code, quantity, kind, origin, root_product_code,
               parent_production_id, movement_date, depth, note, recorded_at
        FROM movement_events
        WHERE operation_id = $1
        ORDER BY sequence
        "#,
    )
    .bind(operation_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(MovementEvent::try_from).collect()
}

pub async fn fetch_product_events(
    conn: &mut PgConnection,
    product_code: &str,
    limit: i64,
    offset: i64,
) -> AppResult<Vec<MovementEvent>> {
    let rows = sqlx::query_as::<_, EventRow>(
        r#"
        SELECT id, operation_id, product_code, quantity, kind, origin, root_product_code,
               parent_production_id, movement_date, depth, note, recorded_at
        FROM movement_events
        WHERE product_code = $1
        ORDER BY sequence DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(product_code)
    .bind(limit)
    .bind(offset)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(MovementEvent::try_from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_row(kind: &str, origin: &str) -> EventRow {
        EventRow {
            id: Uuid::new_v4(),
            operation_id: Some(Uuid::new_v4()),
            product_code: "A".to_string(),
            quantity: Decimal::from(-4),
            kind: kind.to_string(),
            origin: origin.to_string(),
            root_product_code: Some("A".to_string()),
            parent_production_id: None,
            movement_date: NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
            depth: 2,
            note: None,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_event_row_conversion() {
        let event = MovementEvent::try_from(event_row("CONSUMO", "CONSUMO_AUTO")).unwrap();
        assert_eq!(event.kind, MovementKind::Consumption);
        assert_eq!(event.origin, MovementOrigin::AutoConsumption);
        assert_eq!(event.depth, 2);
    }

    #[test]
    fn test_event_row_rejects_unknown_tags() {
        assert!(MovementEvent::try_from(event_row("SOMETHING", "RAIZ")).is_err());
        assert!(MovementEvent::try_from(event_row("PRODUCAO", "SOMEWHERE")).is_err());
    }

    #[test]
    fn test_link_row_unknown_status_is_inactive() {
        let now = Utc::now();
        let row = LinkRow {
            id: Uuid::new_v4(),
            parent_product_code: "A".to_string(),
            component_product_code: "B".to_string(),
            quantity_per_unit: Decimal::ONE,
            version_tag: "v1".to_string(),
            status: "archived".to_string(),
            superseded_by: None,
            created_by: None,
            created_at: now,
            updated_by: None,
            updated_at: now,
        };
        let link = ComponentLink::from(row);
        assert!(!link.is_active());
    }

    #[test]
    fn test_locked_balance_read_orders_before_locking() {
        let locked = balances_sql(true);
        let order = locked.find("ORDER BY product_code").unwrap();
        let lock = locked.find("FOR UPDATE").unwrap();
        assert!(order < lock);
        assert!(!balances_sql(false).contains("FOR UPDATE"));
    }
}
