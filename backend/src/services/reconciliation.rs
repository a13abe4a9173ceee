//! Background refresh of stale projection caches

use std::time::Duration;

use sqlx::PgPool;
use tokio::task::JoinHandle;

use crate::config::ReconciliationConfig;
use crate::error::AppResult;
use crate::services::ledger::LedgerService;

/// Reconciliation service
#[derive(Clone)]
pub struct ReconciliationService {
    db: PgPool,
}

impl ReconciliationService {
    /// Create a new ReconciliationService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Refresh up to `batch_size` stale projections, never-refreshed first
    ///
    /// Returns how many balances were refreshed. A failing code is logged and
    /// left stale for the next pass.
    pub async fn run_once(&self, batch_size: i64) -> AppResult<usize> {
        let codes = sqlx::query_scalar::<_, String>(
            r#"
            SELECT product_code
            FROM stock_balances
            WHERE projection_stale
            ORDER BY projection_refreshed_at NULLS FIRST, product_code
            LIMIT $1
            "#,
        )
        .bind(batch_size)
        .fetch_all(&self.db)
        .await?;

        let ledger = LedgerService::new(self.db.clone());
        let mut refreshed = 0;
        for code in &codes {
            match ledger.refresh_projection(code).await {
                Ok(_) => refreshed += 1,
                Err(e) => tracing::warn!(product_code = %code, "projection refresh failed: {}", e),
            }
        }

        if refreshed > 0 {
            tracing::debug!(refreshed, "stale projections refreshed");
        }
        Ok(refreshed)
    }

    /// Run `run_once` on a fixed interval until the runtime shuts down
    pub fn spawn(self, config: ReconciliationConfig) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(config.interval_secs.max(1)));
            loop {
                ticker.tick().await;
                if let Err(e) = self.run_once(config.batch_size).await {
                    tracing::error!("reconciliation pass failed: {}", e);
                }
            }
        })
    }
}
