//! Health check handlers

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: String,
    pub stale_projections: Option<i64>,
}

/// Readiness endpoint handler
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_status = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => "connected".to_string(),
        Err(_) => "disconnected".to_string(),
    };

    // Backlog of the reconciliation job
    let stale_projections =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM stock_balances WHERE projection_stale")
            .fetch_one(&state.db)
            .await
            .ok();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: db_status,
        stale_projections,
    })
}
