//! Stock projection and stock-out ("ruptura") derivation

use std::collections::HashMap;

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;

use crate::models::{DailySnapshot, ForecastEntry, Projection, Ruptura};
use crate::types::RUPTURA_WINDOW_DAYS;
use crate::validation::MAX_HORIZON_DAYS;

/// Walk a product's forecast day by day from `today` to `today + horizon_days`
///
/// Entries outside the window are ignored. Entries for the same date are
/// summed, so callers may pass rows from several sources. Horizons beyond
/// `MAX_HORIZON_DAYS` are truncated.
pub fn project(
    product_code: &str,
    current_balance: Decimal,
    forecasts: &[ForecastEntry],
    today: NaiveDate,
    horizon_days: u32,
) -> Projection {
    let horizon_days = horizon_days.min(MAX_HORIZON_DAYS);
    let mut by_date: HashMap<NaiveDate, (Decimal, Decimal)> = HashMap::new();
    for entry in forecasts {
        let slot = by_date.entry(entry.date).or_insert((Decimal::ZERO, Decimal::ZERO));
        slot.0 = slot.0.saturating_add(entry.forecast_in);
        slot.1 = slot.1.saturating_add(entry.forecast_out);
    }

    let mut days = Vec::with_capacity(horizon_days as usize + 1);
    let mut balance = current_balance;
    for offset in 0..=horizon_days {
        let Some(date) = today.checked_add_days(Days::new(u64::from(offset))) else {
            break;
        };
        let (forecast_in, forecast_out) = by_date
            .get(&date)
            .copied()
            .unwrap_or((Decimal::ZERO, Decimal::ZERO));
        let balance_after = balance.saturating_add(forecast_in).saturating_sub(forecast_out);
        days.push(DailySnapshot {
            date,
            balance_before: balance,
            forecast_in,
            forecast_out,
            balance_after,
        });
        balance = balance_after;
    }

    let ruptura = compute_ruptura(&days);
    Projection {
        product_code: product_code.to_string(),
        as_of: today,
        horizon_days,
        current_balance,
        days,
        min_balance_7d: ruptura.min_balance_7d,
        stockout_date: ruptura.stockout_date,
    }
}

/// Minimum balance over the first 7 days and the first date below zero
///
/// The stock-out date is searched across the whole projection, the minimum
/// only across the ruptura window.
pub fn compute_ruptura(days: &[DailySnapshot]) -> Ruptura {
    let min_balance_7d = days
        .iter()
        .take(RUPTURA_WINDOW_DAYS as usize)
        .map(|day| day.balance_after)
        .min()
        .unwrap_or(Decimal::ZERO);

    let stockout_date = days
        .iter()
        .find(|day| day.balance_after < Decimal::ZERO)
        .map(|day| day.date);

    Ruptura {
        min_balance_7d,
        stockout_date,
    }
}
