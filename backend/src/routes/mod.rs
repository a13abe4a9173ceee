//! Route definitions for the stock ledger server

use axum::{
    routing::{get, post},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        // Stock ledger
        .nest("/balances", balance_routes())
        .route("/movements", post(handlers::apply_movement))
        .route("/forecasts", post(handlers::update_forecast))
        .route("/rupturas", get(handlers::list_rupturas))
        // Product master data
        .route("/products", post(handlers::upsert_classification))
        .route("/products/:code", get(handlers::get_classification))
        .route("/unifications", post(handlers::assign_unification))
        // Product structure
        .nest("/bom", bom_routes())
        // Production
        .route("/production", post(handlers::produce))
        .nest("/operations", operation_routes())
}

fn balance_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_balances))
        .route("/:code", get(handlers::get_balance))
        .route("/:code/projection", get(handlers::get_projection))
        .route("/:code/refresh", post(handlers::refresh_projection))
        .route("/:code/movements", get(handlers::list_movements))
}

fn bom_routes() -> Router<AppState> {
    Router::new()
        .route("/links", post(handlers::create_link))
        .route(
            "/links/:link_id",
            get(handlers::get_link)
                .put(handlers::requantify_link)
                .delete(handlers::deactivate_link),
        )
        .route("/links/:link_id/audit", get(handlers::link_audit))
        .route("/:code/links", get(handlers::list_links))
        .route("/:code/explode", get(handlers::explode))
        .route("/:code/requirements", get(handlers::requirements))
}

fn operation_routes() -> Router<AppState> {
    Router::new()
        .route("/:operation_id", get(handlers::get_operation))
        .route("/:operation_id/events", get(handlers::operation_events))
        .route("/:operation_id/adjustments", post(handlers::adjust_consumption))
}
