//! Production service: cascading productions and their event trail

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{MovementEvent, ProductionOperation};
use crate::services::snapshot::Snapshot;
use crate::services::store;
use shared::cascade::{AdvisoryKind, CascadeEngine, ProductionOutcome, ProductionRequest};
use shared::types::EngineLimits;

/// Production service
#[derive(Clone)]
pub struct ProductionService {
    db: PgPool,
    limits: EngineLimits,
}

/// Input for a root production
#[derive(Debug, Deserialize)]
pub struct ProduceInput {
    pub product_code: String,
    pub quantity: Decimal,
    pub movement_date: Option<NaiveDate>,
    pub requested_by: Option<String>,
}

/// Input for a consumption adjustment on an existing operation
#[derive(Debug, Deserialize)]
pub struct AdjustmentInput {
    pub product_code: String,
    /// Positive consumes more, negative returns stock
    pub quantity: Decimal,
    pub movement_date: Option<NaiveDate>,
    pub note: Option<String>,
}

/// An operation with every event recorded under it
#[derive(Debug, Clone, Serialize)]
pub struct OperationTrail {
    pub operation: ProductionOperation,
    pub events: Vec<MovementEvent>,
}

impl ProductionService {
    /// Create a new ProductionService instance
    pub fn new(db: PgPool, limits: EngineLimits) -> Self {
        Self { db, limits }
    }

    /// Produce a quantity of a product, cascading through its structure
    ///
    /// The operation header, every event and every balance delta are written
    /// in one transaction. Branch errors do not roll it back.
    pub async fn produce(&self, input: ProduceInput) -> AppResult<ProductionOutcome> {
        let now = Utc::now();
        let request = ProductionRequest {
            movement_date: input.movement_date.unwrap_or_else(|| now.date_naive()),
            product_code: input.product_code,
            quantity: input.quantity,
            requested_by: input.requested_by,
        };

        let mut tx = self.db.begin().await?;
        let mut snapshot = Snapshot::for_structure(&mut tx, &request.product_code).await?;
        let outcome = CascadeEngine::new(&snapshot.catalog, self.limits).produce(&mut snapshot.ledger, &request, now)?;

        store::insert_operation(&mut tx, &outcome.operation).await?;
        snapshot.persist(&mut tx, &outcome.events).await?;
        tx.commit().await?;

        tracing::info!(
            operation_id = %outcome.operation_id,
            product_code = %request.product_code,
            quantity = %request.quantity,
            events = outcome.events.len(),
            auto_productions = outcome.auto_production_events.len(),
            success = outcome.success,
            "production recorded"
        );
        for advisory in &outcome.advisories {
            if advisory.kind == AdvisoryKind::NegativeStock {
                tracing::warn!(
                    operation_id = %outcome.operation_id,
                    product_code = %advisory.product_code,
                    "{}",
                    advisory.message
                );
            }
        }
        for error in &outcome.branch_errors {
            tracing::warn!(
                operation_id = %outcome.operation_id,
                product_code = %error.product_code,
                depth = error.depth,
                error = error.kind.code(),
                "production branch aborted"
            );
        }

        Ok(outcome)
    }

    /// Append a manual consumption adjustment to an operation
    pub async fn adjust_consumption(&self, operation_id: Uuid, input: AdjustmentInput) -> AppResult<MovementEvent> {
        let now = Utc::now();

        let mut tx = self.db.begin().await?;
        let operation = store::fetch_operation(&mut tx, operation_id).await?;
        let mut snapshot = Snapshot::for_codes(&mut tx, &[input.product_code.as_str()]).await?;
        let event = CascadeEngine::new(&snapshot.catalog, self.limits).adjust_consumption(
            &mut snapshot.ledger,
            &operation,
            &input.product_code,
            input.quantity,
            input.note,
            input.movement_date.unwrap_or(operation.movement_date),
            now,
        )?;
        snapshot.persist(&mut tx, std::slice::from_ref(&event)).await?;
        tx.commit().await?;

        tracing::info!(
            operation_id = %operation_id,
            product_code = %event.product_code,
            quantity = %event.quantity,
            "consumption adjusted"
        );
        Ok(event)
    }

    pub async fn get_operation(&self, operation_id: Uuid) -> AppResult<ProductionOperation> {
        let mut conn = self.db.acquire().await?;
        store::fetch_operation(&mut conn, operation_id).await
    }

    /// Operation header and its events in emission order
    pub async fn operation_events(&self, operation_id: Uuid) -> AppResult<OperationTrail> {
        let mut conn = self.db.acquire().await?;
        let operation = store::fetch_operation(&mut conn, operation_id).await?;
        let events = store::fetch_operation_events(&mut conn, operation_id).await?;

        Ok(OperationTrail { operation, events })
    }
}
