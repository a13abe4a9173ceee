//! HTTP handlers for production endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{MovementEvent, ProductionOperation};
use crate::services::production::{AdjustmentInput, OperationTrail, ProduceInput, ProductionService};
use crate::AppState;
use shared::cascade::ProductionOutcome;

fn service(state: AppState) -> ProductionService {
    ProductionService::new(state.db, state.config.engine.limits())
}

/// Produce a quantity of a product, cascading through its structure
pub async fn produce(
    State(state): State<AppState>,
    Json(input): Json<ProduceInput>,
) -> AppResult<(StatusCode, Json<ProductionOutcome>)> {
    let outcome = service(state).produce(input).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn get_operation(
    State(state): State<AppState>,
    Path(operation_id): Path<Uuid>,
) -> AppResult<Json<ProductionOperation>> {
    let operation = service(state).get_operation(operation_id).await?;
    Ok(Json(operation))
}

/// Every event recorded under an operation, in emission order
pub async fn operation_events(
    State(state): State<AppState>,
    Path(operation_id): Path<Uuid>,
) -> AppResult<Json<OperationTrail>> {
    let trail = service(state).operation_events(operation_id).await?;
    Ok(Json(trail))
}

/// Record a consumption adjustment against an operation
pub async fn adjust_consumption(
    State(state): State<AppState>,
    Path(operation_id): Path<Uuid>,
    Json(input): Json<AdjustmentInput>,
) -> AppResult<(StatusCode, Json<MovementEvent>)> {
    let event = service(state).adjust_consumption(operation_id, input).await?;
    Ok((StatusCode::CREATED, Json(event)))
}
