//! Stock ledger service: movements, forecasts, balances and projections

use std::collections::HashMap;

use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::error::{AppError, AppResult};
use crate::models::{MovementEvent, Projection, Ruptura, StockBalance};
use crate::services::snapshot::Snapshot;
use crate::services::store;
use shared::ledger::{merge_balances, StockLedger};
use shared::types::{PaginatedResponse, Pagination, PaginationMeta, RUPTURA_WINDOW_DAYS};
use shared::validation::{validate_horizon, validate_product_code, validate_signed_quantity};

/// Stock ledger service
#[derive(Clone)]
pub struct LedgerService {
    db: PgPool,
}

/// Input for posting a movement outside the production cascade
#[derive(Debug, Deserialize)]
pub struct ApplyMovementInput {
    pub product_code: String,
    /// Signed: positive adds stock, negative removes it
    pub quantity: Decimal,
    pub movement_date: Option<NaiveDate>,
    pub note: Option<String>,
}

/// Input for a forecast delta
#[derive(Debug, Deserialize)]
pub struct ForecastDeltaInput {
    pub product_code: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub delta_in: Decimal,
    #[serde(default)]
    pub delta_out: Decimal,
}

/// Result of a posted movement
#[derive(Debug, Clone, Serialize)]
pub struct MovementResult {
    pub event: MovementEvent,
    pub current_balance: Decimal,
}

/// Merged balance of a unified code set
#[derive(Debug, Clone, Serialize)]
pub struct BalanceView {
    pub product_code: String,
    pub canonical_code: String,
    pub unified_codes: Vec<String>,
    pub current_balance: Decimal,
    pub min_projected_balance_7d: Option<Decimal>,
    pub stockout_date: Option<NaiveDate>,
    pub projection_stale: bool,
}

/// Row for the stock-out listing
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RupturaAlert {
    pub product_code: String,
    pub display_name: String,
    pub current_balance: Decimal,
    pub min_projected_balance_7d: Option<Decimal>,
    pub stockout_date: Option<NaiveDate>,
    pub projection_refreshed_at: Option<DateTime<Utc>>,
}

impl LedgerService {
    /// Create a new LedgerService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Post a signed movement to a product and all its aliases
    pub async fn apply_movement(&self, input: ApplyMovementInput) -> AppResult<MovementResult> {
        validate_product_code(&input.product_code).map_err(|m| AppError::invalid("product_code", m))?;
        validate_signed_quantity(input.quantity).map_err(|m| AppError::invalid("quantity", m))?;

        let now = Utc::now();
        let movement_date = input.movement_date.unwrap_or_else(|| now.date_naive());
        let event = MovementEvent::external(input.product_code, input.quantity, movement_date, input.note, now);

        let mut tx = self.db.begin().await?;
        let mut snapshot = Snapshot::for_codes(&mut tx, &[event.product_code.as_str()]).await?;
        let current_balance = snapshot.ledger.apply_event(&event)?;
        snapshot.persist(&mut tx, std::slice::from_ref(&event)).await?;
        tx.commit().await?;

        tracing::info!(
            product_code = %event.product_code,
            quantity = %event.quantity,
            %current_balance,
            "movement applied"
        );
        if current_balance < Decimal::ZERO {
            tracing::warn!(product_code = %event.product_code, %current_balance, "balance is negative");
        }

        Ok(MovementResult { event, current_balance })
    }

    /// Add forecast deltas for a date on a product and all its aliases
    pub async fn update_forecast(&self, input: ForecastDeltaInput) -> AppResult<()> {
        validate_product_code(&input.product_code).map_err(|m| AppError::invalid("product_code", m))?;
        if input.delta_in.is_zero() && input.delta_out.is_zero() {
            return Err(AppError::Validation {
                field: "delta_in/delta_out".to_string(),
                message: "At least one forecast delta must be non-zero".to_string(),
                message_pt: "Pelo menos um delta de previsão deve ser diferente de zero".to_string(),
            });
        }

        let now = Utc::now();
        let mut tx = self.db.begin().await?;
        let unifier = store::load_unifier(&mut tx).await?;
        let codes: Vec<String> = unifier.resolve(&input.product_code).into_iter().collect();
        let names: HashMap<String, String> = store::fetch_classifications(&mut tx, &codes)
            .await?
            .into_iter()
            .map(|c| (c.product_code, c.display_name))
            .collect();
        for code in &codes {
            let entry =
                store::apply_forecast_delta(&mut tx, code, input.date, input.delta_in, input.delta_out).await?;
            if entry.forecast_in < Decimal::ZERO || entry.forecast_out < Decimal::ZERO {
                tracing::warn!(
                    product_code = %code,
                    date = %input.date,
                    forecast_in = %entry.forecast_in,
                    forecast_out = %entry.forecast_out,
                    "forecast retracted below zero"
                );
            }
            // a forecast alone is enough to need a projection
            let display_name = names.get(code).map_or(code.as_str(), String::as_str);
            store::touch_balance(&mut tx, code, display_name, now).await?;
        }
        tx.commit().await?;

        Ok(())
    }

    /// Merged balance of a product's unified code set
    ///
    /// A stale cached projection is recomputed for the response; the stored
    /// cache is left to the reconciliation job.
    pub async fn get_balance(&self, product_code: &str) -> AppResult<BalanceView> {
        let today = Utc::now().date_naive();
        let mut conn = self.db.acquire().await?;
        let unifier = store::load_unifier(&mut conn).await?;
        let codes: Vec<String> = unifier.resolve(product_code).into_iter().collect();
        let rows = store::fetch_balances(&mut conn, &codes, false).await?;
        let canonical = unifier.canonical(product_code);

        let stale = own_row(product_code, &canonical, &rows)
            .ok_or_else(|| AppError::NotFound(format!("Stock balance for {}", product_code)))?
            .projection_stale;
        let fresh = if stale {
            let ledger = load_projection_ledger(&mut conn, product_code, today, RUPTURA_WINDOW_DAYS, false).await?;
            Some(ledger.projection(product_code, today, RUPTURA_WINDOW_DAYS).ruptura())
        } else {
            None
        };

        balance_view(product_code, canonical, codes, &rows, fresh)
            .ok_or_else(|| AppError::NotFound(format!("Stock balance for {}", product_code)))
    }

    /// All balance rows, paginated by product code
    pub async fn list_balances(&self, pagination: Pagination) -> AppResult<PaginatedResponse<StockBalance>> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM stock_balances")
            .fetch_one(&self.db)
            .await?;

        let rows = sqlx::query_as::<_, store::BalanceRow>(
            r#"
            SELECT product_code, display_name, current_balance, last_updated_at,
                   min_projected_balance_7d, stockout_date, projection_stale, projection_refreshed_at
            FROM stock_balances
            ORDER BY product_code
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(PaginatedResponse {
            data: rows.into_iter().map(Into::into).collect(),
            pagination: PaginationMeta::new(&pagination, u64::try_from(total).unwrap_or(0)),
        })
    }

    /// Movement history of one code, most recent first
    pub async fn list_movements(&self, product_code: &str, pagination: Pagination) -> AppResult<Vec<MovementEvent>> {
        let mut conn = self.db.acquire().await?;
        store::fetch_product_events(&mut conn, product_code, pagination.limit(), pagination.offset()).await
    }

    /// Daily projection from today through `today + horizon_days`
    pub async fn get_projection(&self, product_code: &str, horizon_days: u32) -> AppResult<Projection> {
        let today = Utc::now().date_naive();
        self.get_projection_from(product_code, today, horizon_days).await
    }

    pub async fn get_projection_from(
        &self,
        product_code: &str,
        today: NaiveDate,
        horizon_days: u32,
    ) -> AppResult<Projection> {
        validate_product_code(product_code).map_err(|m| AppError::invalid("product_code", m))?;
        validate_horizon(horizon_days).map_err(|m| AppError::invalid("horizon_days", m))?;

        let mut conn = self.db.acquire().await?;
        let ledger = load_projection_ledger(&mut conn, product_code, today, horizon_days, false).await?;
        Ok(ledger.projection(product_code, today, horizon_days))
    }

    /// Recompute and store the cached 7-day projection of a code and its aliases
    pub async fn refresh_projection(&self, product_code: &str) -> AppResult<StockBalance> {
        let today = Utc::now().date_naive();
        let now = Utc::now();

        let mut tx = self.db.begin().await?;
        // rows stay locked until the refreshed cache is stored
        let mut ledger = load_projection_ledger(&mut tx, product_code, today, RUPTURA_WINDOW_DAYS, true).await?;
        ledger.refresh_projection(product_code, today, now);

        let mut refreshed = None;
        for code in ledger.unifier().resolve(product_code) {
            if let Some(balance) = ledger.balance(&code) {
                store::store_projection(&mut tx, balance).await?;
                if code == product_code {
                    refreshed = Some(balance.clone());
                }
            }
        }
        tx.commit().await?;

        refreshed.ok_or_else(|| AppError::NotFound(format!("Stock balance for {}", product_code)))
    }

    /// Balances whose cached projection shows a stock-out, earliest first
    pub async fn list_rupturas(&self, pagination: Pagination) -> AppResult<Vec<RupturaAlert>> {
        let rows = sqlx::query_as::<_, RupturaAlert>(
            r#"
            SELECT product_code, display_name, current_balance, min_projected_balance_7d,
                   stockout_date, projection_refreshed_at
            FROM stock_balances
            WHERE stockout_date IS NOT NULL
            ORDER BY stockout_date, product_code
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }
}

/// Row whose cached projection answers for `product_code`
fn own_row<'a>(product_code: &str, canonical: &str, rows: &'a [StockBalance]) -> Option<&'a StockBalance> {
    rows.iter()
        .find(|row| row.product_code == product_code)
        .or_else(|| rows.iter().find(|row| row.product_code == canonical))
        .or_else(|| rows.first())
}

/// Build the merged view, preferring a freshly computed projection
fn balance_view(
    product_code: &str,
    canonical: String,
    codes: Vec<String>,
    rows: &[StockBalance],
    fresh: Option<Ruptura>,
) -> Option<BalanceView> {
    let own = own_row(product_code, &canonical, rows)?;
    let refs: Vec<&StockBalance> = rows.iter().collect();
    let (min_projected_balance_7d, stockout_date, projection_stale) = match fresh {
        Some(ruptura) => (Some(ruptura.min_balance_7d), ruptura.stockout_date, false),
        None => (own.min_projected_balance_7d, own.stockout_date, own.projection_stale),
    };

    Some(BalanceView {
        product_code: product_code.to_string(),
        current_balance: merge_balances(&refs, &canonical),
        canonical_code: canonical,
        unified_codes: codes,
        min_projected_balance_7d,
        stockout_date,
        projection_stale,
    })
}

/// Ledger holding the balances of a unified set and the forecasts of every
/// code in it across the projection window
///
/// With `lock` the balance rows are held `FOR UPDATE` until the caller's
/// transaction ends.
pub(crate) async fn load_projection_ledger(
    conn: &mut sqlx::PgConnection,
    product_code: &str,
    today: NaiveDate,
    horizon_days: u32,
    lock: bool,
) -> AppResult<StockLedger> {
    let unifier = store::load_unifier(conn).await?;
    let codes: Vec<String> = unifier.resolve(product_code).into_iter().collect();
    let end = today
        .checked_add_days(Days::new(u64::from(horizon_days)))
        .unwrap_or(NaiveDate::MAX);

    let mut ledger = StockLedger::new(unifier);
    for balance in store::fetch_balances(conn, &codes, lock).await? {
        ledger.load_balance(balance);
    }
    for code in &codes {
        for entry in store::fetch_forecasts(conn, code, today, end).await? {
            ledger.load_forecast(entry);
        }
    }
    Ok(ledger)
}
