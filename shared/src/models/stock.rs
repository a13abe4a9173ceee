//! Stock balance and forecast models

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Current on-hand balance for one product code
///
/// `current_balance` is only ever changed by deltas. The projection fields are
/// a cache over the next 7 days and are marked stale on every balance or
/// forecast change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockBalance {
    pub product_code: String,
    pub display_name: String,
    pub current_balance: Decimal,
    pub last_updated_at: DateTime<Utc>,
    pub min_projected_balance_7d: Option<Decimal>,
    pub stockout_date: Option<NaiveDate>,
    pub projection_stale: bool,
    pub projection_refreshed_at: Option<DateTime<Utc>>,
}

impl StockBalance {
    /// Empty balance row, created lazily on first reference
    pub fn empty(product_code: impl Into<String>, display_name: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            product_code: product_code.into(),
            display_name: display_name.into(),
            current_balance: Decimal::ZERO,
            last_updated_at: at,
            min_projected_balance_7d: None,
            stockout_date: None,
            projection_stale: true,
            projection_refreshed_at: None,
        }
    }

    pub fn is_negative(&self) -> bool {
        self.current_balance < Decimal::ZERO
    }
}

/// Forecasted entries and exits for one product on one future date
///
/// Sparse: a missing row means zero in and zero out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForecastEntry {
    pub product_code: String,
    pub date: NaiveDate,
    pub forecast_in: Decimal,
    pub forecast_out: Decimal,
}

impl ForecastEntry {
    pub fn net(&self) -> Decimal {
        self.forecast_in - self.forecast_out
    }

    /// A row with nothing left in either direction is removed
    pub fn is_exhausted(&self) -> bool {
        self.forecast_in <= Decimal::ZERO && self.forecast_out <= Decimal::ZERO
    }
}

/// One day of a stock projection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailySnapshot {
    pub date: NaiveDate,
    pub balance_before: Decimal,
    pub forecast_in: Decimal,
    pub forecast_out: Decimal,
    pub balance_after: Decimal,
}

/// Projected stock-out summary
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Ruptura {
    pub min_balance_7d: Decimal,
    pub stockout_date: Option<NaiveDate>,
}

/// Day-by-day projection of a product's balance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Projection {
    pub product_code: String,
    pub as_of: NaiveDate,
    pub horizon_days: u32,
    pub current_balance: Decimal,
    pub days: Vec<DailySnapshot>,
    pub min_balance_7d: Decimal,
    pub stockout_date: Option<NaiveDate>,
}

impl Projection {
    /// Projected balance at the end of `date`, accumulated through that day
    ///
    /// Dates before the projection start return the current balance; dates
    /// past the horizon return the last projected balance.
    pub fn balance_at(&self, date: NaiveDate) -> Decimal {
        if date < self.as_of {
            return self.current_balance;
        }
        self.days
            .iter()
            .take_while(|day| day.date <= date)
            .last()
            .map_or(self.current_balance, |day| day.balance_after)
    }

    pub fn ruptura(&self) -> Ruptura {
        Ruptura {
            min_balance_7d: self.min_balance_7d,
            stockout_date: self.stockout_date,
        }
    }
}
