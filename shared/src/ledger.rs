//! Stock ledger: incremental balance and forecast aggregates
//!
//! Every write is a delta replicated to each code of the unified set, so
//! movements recorded under any alias land on the same balance. This is the
//! in-process implementation; the backend mirrors the same arithmetic in SQL
//! and uses this type as the working set of a production cascade.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::error::{CoreError, CoreResult};
use crate::models::{ForecastEntry, MovementEvent, Projection, StockBalance};
use crate::ruptura;
use crate::types::RUPTURA_WINDOW_DAYS;
use crate::unification::CodeUnifier;

#[derive(Debug, Clone, Default)]
pub struct StockLedger {
    unifier: CodeUnifier,
    balances: HashMap<String, StockBalance>,
    forecasts: BTreeMap<(String, NaiveDate), ForecastEntry>,
}

impl StockLedger {
    pub fn new(unifier: CodeUnifier) -> Self {
        Self {
            unifier,
            balances: HashMap::new(),
            forecasts: BTreeMap::new(),
        }
    }

    pub fn unifier(&self) -> &CodeUnifier {
        &self.unifier
    }

    /// Load a persisted balance row as-is; used when building a snapshot
    pub fn load_balance(&mut self, balance: StockBalance) {
        self.balances.insert(balance.product_code.clone(), balance);
    }

    /// Load a persisted forecast row as-is; used when building a snapshot
    pub fn load_forecast(&mut self, entry: ForecastEntry) {
        self.forecasts.insert((entry.product_code.clone(), entry.date), entry);
    }

    /// Add `signed_quantity` to the balance of every code unified with `product_code`
    ///
    /// Returns the merged balance after the update. Nothing is written when
    /// any row of the set would leave the representable range.
    pub fn apply_movement(
        &mut self,
        product_code: &str,
        signed_quantity: Decimal,
        at: DateTime<Utc>,
    ) -> CoreResult<Decimal> {
        let codes = self.unifier.resolve(product_code);
        let mut updated = Vec::with_capacity(codes.len());
        for code in &codes {
            let current = self.balances.get(code).map_or(Decimal::ZERO, |b| b.current_balance);
            let next = current
                .checked_add(signed_quantity)
                .ok_or_else(|| CoreError::QuantityOverflow(code.clone()))?;
            updated.push((code, next));
        }

        for (code, next) in updated {
            let balance = self
                .balances
                .entry(code.clone())
                .or_insert_with(|| StockBalance::empty(code.clone(), code.clone(), at));
            balance.current_balance = next;
            balance.last_updated_at = at;
            balance.projection_stale = true;
        }
        Ok(self.current_balance(product_code))
    }

    /// Apply a recorded movement event to the balances
    pub fn apply_event(&mut self, event: &MovementEvent) -> CoreResult<Decimal> {
        self.apply_movement(&event.product_code, event.quantity, event.recorded_at)
    }

    /// Add forecast deltas for `date` on every unified code
    ///
    /// The row is created on first use and removed once both sides reach zero.
    /// Each code gets a stale balance row so its projection is recomputed even
    /// before any stock has moved.
    pub fn update_forecast(
        &mut self,
        product_code: &str,
        date: NaiveDate,
        delta_in: Decimal,
        delta_out: Decimal,
        at: DateTime<Utc>,
    ) -> CoreResult<()> {
        if delta_in.is_zero() && delta_out.is_zero() {
            return Err(CoreError::invalid("delta", "At least one forecast delta must be non-zero"));
        }

        let codes = self.unifier.resolve(product_code);
        let mut updated = Vec::with_capacity(codes.len());
        for code in &codes {
            let (current_in, current_out) = self
                .forecasts
                .get(&(code.clone(), date))
                .map_or((Decimal::ZERO, Decimal::ZERO), |e| (e.forecast_in, e.forecast_out));
            let forecast_in = current_in
                .checked_add(delta_in)
                .ok_or_else(|| CoreError::QuantityOverflow(code.clone()))?;
            let forecast_out = current_out
                .checked_add(delta_out)
                .ok_or_else(|| CoreError::QuantityOverflow(code.clone()))?;
            updated.push(ForecastEntry {
                product_code: code.clone(),
                date,
                forecast_in,
                forecast_out,
            });
        }

        for entry in updated {
            if entry.forecast_in < Decimal::ZERO || entry.forecast_out < Decimal::ZERO {
                tracing::warn!(
                    product_code = %entry.product_code,
                    %date,
                    forecast_in = %entry.forecast_in,
                    forecast_out = %entry.forecast_out,
                    "forecast retracted below zero"
                );
            }
            let code = entry.product_code.clone();
            let key = (code.clone(), date);
            if entry.is_exhausted() {
                self.forecasts.remove(&key);
            } else {
                self.forecasts.insert(key, entry);
            }
            self.balances
                .entry(code.clone())
                .or_insert_with(|| StockBalance::empty(code.clone(), code, at))
                .projection_stale = true;
        }
        Ok(())
    }

    /// Merged on-hand balance for the unified code set
    pub fn current_balance(&self, product_code: &str) -> Decimal {
        let codes = self.unifier.resolve(product_code);
        let rows: Vec<&StockBalance> = codes.iter().filter_map(|code| self.balances.get(code)).collect();
        merge_balances(&rows, &self.unifier.canonical(product_code))
    }

    pub fn balance(&self, product_code: &str) -> Option<&StockBalance> {
        self.balances.get(product_code)
    }

    pub fn balances(&self) -> impl Iterator<Item = &StockBalance> {
        self.balances.values()
    }

    pub fn forecast(&self, product_code: &str, date: NaiveDate) -> Option<&ForecastEntry> {
        self.forecasts.get(&(product_code.to_string(), date))
    }

    /// Forecast rows of one code between `from` and `to`, inclusive
    pub fn forecasts_between(&self, product_code: &str, from: NaiveDate, to: NaiveDate) -> Vec<ForecastEntry> {
        if from > to {
            return Vec::new();
        }
        self.forecasts
            .range((product_code.to_string(), from)..=(product_code.to_string(), to))
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    /// Daily projection from `today` through `today + horizon_days`
    pub fn projection(&self, product_code: &str, today: NaiveDate, horizon_days: u32) -> Projection {
        let end = today
            .checked_add_days(chrono::Days::new(u64::from(horizon_days)))
            .unwrap_or(NaiveDate::MAX);
        let forecasts = self.forecasts_between(product_code, today, end);
        ruptura::project(product_code, self.current_balance(product_code), &forecasts, today, horizon_days)
    }

    /// Recompute the cached 7-day projection of every unified code
    pub fn refresh_projection(&mut self, product_code: &str, today: NaiveDate, at: DateTime<Utc>) {
        for code in self.unifier.resolve(product_code) {
            let projection = self.projection(&code, today, RUPTURA_WINDOW_DAYS);
            let balance = self
                .balances
                .entry(code.clone())
                .or_insert_with(|| StockBalance::empty(code.clone(), code, at));
            balance.min_projected_balance_7d = Some(projection.min_balance_7d);
            balance.stockout_date = projection.stockout_date;
            balance.projection_stale = false;
            balance.projection_refreshed_at = Some(at);
        }
    }

    /// Codes whose cached projection is stale, oldest refresh first
    pub fn stale_codes(&self, limit: usize) -> Vec<String> {
        let mut stale: Vec<&StockBalance> = self.balances.values().filter(|b| b.projection_stale).collect();
        stale.sort_by(|a, b| {
            a.projection_refreshed_at
                .cmp(&b.projection_refreshed_at)
                .then_with(|| a.product_code.cmp(&b.product_code))
        });
        stale.into_iter().take(limit).map(|b| b.product_code.clone()).collect()
    }
}

/// Merge the balance rows of one unified code set into a single value
///
/// Rows normally agree because every delta is replicated. When legacy data
/// diverges, the canonical code's row wins, then the most recently updated.
pub fn merge_balances(rows: &[&StockBalance], canonical: &str) -> Decimal {
    let Some(first) = rows.first() else {
        return Decimal::ZERO;
    };
    if rows.iter().all(|row| row.current_balance == first.current_balance) {
        return first.current_balance;
    }

    tracing::warn!(
        canonical,
        rows = rows.len(),
        "unified balance rows diverge; merging"
    );
    rows.iter()
        .find(|row| row.product_code == canonical)
        .or_else(|| rows.iter().max_by_key(|row| row.last_updated_at))
        .map_or(Decimal::ZERO, |row| row.current_balance)
}
