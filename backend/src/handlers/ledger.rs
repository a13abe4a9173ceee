//! HTTP handlers for balances, movements, forecasts and projections

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::error::AppResult;
use crate::models::{MovementEvent, Projection, StockBalance};
use crate::services::ledger::{
    ApplyMovementInput, BalanceView, ForecastDeltaInput, LedgerService, MovementResult, RupturaAlert,
};
use crate::AppState;
use shared::types::{PaginatedResponse, Pagination};

/// Query parameters for a projection
#[derive(Debug, Deserialize)]
pub struct ProjectionQuery {
    pub horizon_days: Option<u32>,
}

/// Post a movement outside the production cascade
pub async fn apply_movement(
    State(state): State<AppState>,
    Json(input): Json<ApplyMovementInput>,
) -> AppResult<(StatusCode, Json<MovementResult>)> {
    let service = LedgerService::new(state.db);
    let result = service.apply_movement(input).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

/// Add a forecast delta for a date
pub async fn update_forecast(
    State(state): State<AppState>,
    Json(input): Json<ForecastDeltaInput>,
) -> AppResult<StatusCode> {
    let service = LedgerService::new(state.db);
    service.update_forecast(input).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_balances(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<PaginatedResponse<StockBalance>>> {
    let service = LedgerService::new(state.db);
    let balances = service.list_balances(pagination).await?;
    Ok(Json(balances))
}

/// Merged balance of a product and its aliases
pub async fn get_balance(
    State(state): State<AppState>,
    Path(product_code): Path<String>,
) -> AppResult<Json<BalanceView>> {
    let service = LedgerService::new(state.db);
    let balance = service.get_balance(&product_code).await?;
    Ok(Json(balance))
}

pub async fn list_movements(
    State(state): State<AppState>,
    Path(product_code): Path<String>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<Vec<MovementEvent>>> {
    let service = LedgerService::new(state.db);
    let events = service.list_movements(&product_code, pagination).await?;
    Ok(Json(events))
}

/// Daily projection with its stock-out summary
pub async fn get_projection(
    State(state): State<AppState>,
    Path(product_code): Path<String>,
    Query(query): Query<ProjectionQuery>,
) -> AppResult<Json<Projection>> {
    let horizon_days = query.horizon_days.unwrap_or(state.config.engine.projection_days);
    let service = LedgerService::new(state.db);
    let projection = service.get_projection(&product_code, horizon_days).await?;
    Ok(Json(projection))
}

/// Recompute the cached 7-day projection now
pub async fn refresh_projection(
    State(state): State<AppState>,
    Path(product_code): Path<String>,
) -> AppResult<Json<StockBalance>> {
    let service = LedgerService::new(state.db);
    let balance = service.refresh_projection(&product_code).await?;
    Ok(Json(balance))
}

/// Products heading for a stock-out within the cached window
pub async fn list_rupturas(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<Vec<RupturaAlert>>> {
    let service = LedgerService::new(state.db);
    let alerts = service.list_rupturas(pagination).await?;
    Ok(Json(alerts))
}
