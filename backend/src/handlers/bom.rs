//! HTTP handlers for product structure endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{BomNode, ComponentLink, LinkAuditEntry, ProductClassification};
use crate::services::bom::{
    BomService, ClassificationInput, CreateLinkInput, DeactivateLinkInput, RequantifyLinkInput, RequirementsReport,
    UnificationInput,
};
use crate::AppState;

/// Query parameters for an explosion
#[derive(Debug, Deserialize)]
pub struct ExplodeQuery {
    pub quantity: Option<Decimal>,
}

/// Query parameters for a requirements report
#[derive(Debug, Deserialize)]
pub struct RequirementsQuery {
    pub quantity: Decimal,
    pub as_of_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct UnificationGroup {
    pub product_code: String,
    pub unified_codes: Vec<String>,
}

fn service(state: AppState) -> BomService {
    BomService::new(state.db, state.config.engine.max_depth)
}

/// Register a component link
pub async fn create_link(
    State(state): State<AppState>,
    Json(input): Json<CreateLinkInput>,
) -> AppResult<(StatusCode, Json<ComponentLink>)> {
    let link = service(state).create_link(input).await?;
    Ok((StatusCode::CREATED, Json(link)))
}

pub async fn get_link(State(state): State<AppState>, Path(link_id): Path<Uuid>) -> AppResult<Json<ComponentLink>> {
    let link = service(state).get_link(link_id).await?;
    Ok(Json(link))
}

/// Replace the quantity of a link, returning the new active link
pub async fn requantify_link(
    State(state): State<AppState>,
    Path(link_id): Path<Uuid>,
    Json(input): Json<RequantifyLinkInput>,
) -> AppResult<Json<ComponentLink>> {
    let link = service(state).requantify_link(link_id, input).await?;
    Ok(Json(link))
}

pub async fn deactivate_link(
    State(state): State<AppState>,
    Path(link_id): Path<Uuid>,
    input: Option<Json<DeactivateLinkInput>>,
) -> AppResult<Json<ComponentLink>> {
    let input = input.map(|Json(input)| input).unwrap_or_default();
    let link = service(state).deactivate_link(link_id, input).await?;
    Ok(Json(link))
}

pub async fn link_audit(
    State(state): State<AppState>,
    Path(link_id): Path<Uuid>,
) -> AppResult<Json<Vec<LinkAuditEntry>>> {
    let entries = service(state).link_audit(link_id).await?;
    Ok(Json(entries))
}

/// Active links whose parent is the given product
pub async fn list_links(
    State(state): State<AppState>,
    Path(product_code): Path<String>,
) -> AppResult<Json<Vec<ComponentLink>>> {
    let links = service(state).list_links(&product_code).await?;
    Ok(Json(links))
}

/// Multi-level explosion; one unit when no quantity is given
pub async fn explode(
    State(state): State<AppState>,
    Path(product_code): Path<String>,
    Query(query): Query<ExplodeQuery>,
) -> AppResult<Json<BomNode>> {
    let quantity = query.quantity.unwrap_or(Decimal::ONE);
    let tree = service(state).explode(&product_code, quantity).await?;
    Ok(Json(tree))
}

/// Net component requirements of a production
pub async fn requirements(
    State(state): State<AppState>,
    Path(product_code): Path<String>,
    Query(query): Query<RequirementsQuery>,
) -> AppResult<Json<RequirementsReport>> {
    let report = service(state)
        .requirements(&product_code, query.quantity, query.as_of_date)
        .await?;
    Ok(Json(report))
}

pub async fn upsert_classification(
    State(state): State<AppState>,
    Json(input): Json<ClassificationInput>,
) -> AppResult<Json<ProductClassification>> {
    let classification = service(state).upsert_classification(input).await?;
    Ok(Json(classification))
}

pub async fn get_classification(
    State(state): State<AppState>,
    Path(product_code): Path<String>,
) -> AppResult<Json<ProductClassification>> {
    let classification = service(state).get_classification(&product_code).await?;
    Ok(Json(classification))
}

/// Put a product in a unification group
pub async fn assign_unification(
    State(state): State<AppState>,
    Json(input): Json<UnificationInput>,
) -> AppResult<Json<UnificationGroup>> {
    let product_code = input.product_code.clone();
    let unified_codes = service(state).assign_unification(input).await?;
    Ok(Json(UnificationGroup {
        product_code,
        unified_codes,
    }))
}
