//! Stock flow tests
//!
//! Tests the workflow the server runs inside one transaction:
//! - Production events replayed as per-code deltas reproduce the ledger
//! - Cached projections go stale on change and refresh oldest first
//! - Forecasts feed the stock-out date of the refreshed cache

use chrono::{Days, NaiveDate, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::str::FromStr;

use shared::bom::Catalog;
use shared::cascade::{consumption_adjustment, CascadeEngine, ProductionRequest};
use shared::ledger::StockLedger;
use shared::models::{MovementEvent, ProductClassification};
use shared::types::EngineLimits;
use shared::unification::CodeUnifier;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 5, 12).unwrap()
}

/// A <- 3 B, B <- 2 C
fn catalog() -> Catalog {
    let now = Utc::now();
    let mut catalog = Catalog::new();
    catalog.add_product(ProductClassification::finished("A", "Assembly"));
    catalog.add_product(ProductClassification::intermediate("B", "Subassembly"));
    catalog.add_product(ProductClassification::purchased("C", "Raw part"));
    catalog.add_link("A", "B", dec("3"), "v1", None, now).unwrap();
    catalog.add_link("B", "C", dec("2"), "v1", None, now).unwrap();
    catalog
}

fn produce(catalog: &Catalog, ledger: &mut StockLedger, qty: Decimal) -> Vec<MovementEvent> {
    let request = ProductionRequest {
        product_code: "A".to_string(),
        quantity: qty,
        movement_date: today(),
        requested_by: None,
    };
    CascadeEngine::new(catalog, EngineLimits::default())
        .produce(ledger, &request, Utc::now())
        .unwrap()
        .events
}

fn net_by_code(events: &[MovementEvent]) -> BTreeMap<String, Decimal> {
    let mut deltas = BTreeMap::new();
    for event in events {
        *deltas.entry(event.product_code.clone()).or_insert(Decimal::ZERO) += event.quantity;
    }
    deltas
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_production_marks_every_touched_balance_stale() {
        let catalog = catalog();
        let mut ledger = StockLedger::new(CodeUnifier::new());
        ledger.apply_movement("B", dec("4"), Utc::now()).unwrap();
        ledger.apply_movement("C", dec("100"), Utc::now()).unwrap();
        ledger.refresh_projection("B", today(), Utc::now());
        ledger.refresh_projection("C", today(), Utc::now());
        assert!(ledger.stale_codes(10).is_empty());

        produce(&catalog, &mut ledger, dec("2"));

        assert_eq!(ledger.stale_codes(10), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_stale_codes_never_refreshed_first() {
        let mut ledger = StockLedger::new(CodeUnifier::new());
        let t1 = Utc.with_ymd_and_hms(2025, 5, 1, 8, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2025, 5, 2, 8, 0, 0).unwrap();
        ledger.apply_movement("X", dec("1"), t1).unwrap();
        ledger.apply_movement("Y", dec("1"), t1).unwrap();
        ledger.refresh_projection("Y", today(), t1);
        ledger.refresh_projection("X", today(), t2);

        ledger.apply_movement("X", dec("1"), t2).unwrap();
        ledger.apply_movement("Y", dec("1"), t2).unwrap();
        ledger.apply_movement("W", dec("1"), t2).unwrap();

        assert_eq!(ledger.stale_codes(10), vec!["W", "Y", "X"]);
        assert_eq!(ledger.stale_codes(2), vec!["W", "Y"]);
    }

    #[test]
    fn test_refreshed_cache_follows_forecast() {
        let catalog = catalog();
        let mut ledger = StockLedger::new(CodeUnifier::new());
        ledger.apply_movement("B", dec("4"), Utc::now()).unwrap();
        ledger.apply_movement("C", dec("100"), Utc::now()).unwrap();
        let day2 = today().checked_add_days(Days::new(2)).unwrap();
        let day3 = today().checked_add_days(Days::new(3)).unwrap();
        ledger.update_forecast("C", day2, Decimal::ZERO, dec("90"), Utc::now()).unwrap();

        produce(&catalog, &mut ledger, dec("2"));
        ledger.refresh_projection("C", today(), Utc::now());

        let cached = ledger.balance("C").unwrap();
        assert_eq!(cached.current_balance, dec("96"));
        assert_eq!(cached.min_projected_balance_7d, Some(dec("6")));
        assert_eq!(cached.stockout_date, None);
        assert!(!cached.projection_stale);

        ledger.update_forecast("C", day3, Decimal::ZERO, dec("10"), Utc::now()).unwrap();
        assert!(ledger.balance("C").unwrap().projection_stale);

        ledger.refresh_projection("C", today(), Utc::now());
        let cached = ledger.balance("C").unwrap();
        assert_eq!(cached.min_projected_balance_7d, Some(dec("-4")));
        assert_eq!(cached.stockout_date, Some(day3));
    }

    #[test]
    fn test_forecast_only_alias_set_joins_refresh_queue() {
        let mut unifier = CodeUnifier::new();
        unifier.add_group(["N", "N-OLD"]);
        let mut ledger = StockLedger::new(unifier);
        let day1 = today().checked_add_days(Days::new(1)).unwrap();
        ledger.update_forecast("N-OLD", day1, Decimal::ZERO, dec("5"), Utc::now()).unwrap();

        assert_eq!(ledger.stale_codes(10), vec!["N", "N-OLD"]);
        ledger.refresh_projection("N", today(), Utc::now());

        for code in ["N", "N-OLD"] {
            let cached = ledger.balance(code).unwrap();
            assert_eq!(cached.current_balance, Decimal::ZERO);
            assert_eq!(cached.min_projected_balance_7d, Some(dec("-5")));
            assert_eq!(cached.stockout_date, Some(day1));
        }
        assert!(ledger.stale_codes(10).is_empty());
    }

    #[test]
    fn test_adjustment_delta_applies_like_any_event() {
        let catalog = catalog();
        let mut ledger = StockLedger::new(CodeUnifier::new());
        ledger.apply_movement("B", dec("4"), Utc::now()).unwrap();
        ledger.apply_movement("C", dec("100"), Utc::now()).unwrap();

        let request = ProductionRequest {
            product_code: "A".to_string(),
            quantity: dec("2"),
            movement_date: today(),
            requested_by: None,
        };
        let outcome = CascadeEngine::new(&catalog, EngineLimits::default())
            .produce(&mut ledger, &request, Utc::now())
            .unwrap();
        let adjustment = consumption_adjustment(
            &outcome.operation,
            "C",
            dec("1.5"),
            Some("scrap".to_string()),
            today(),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(adjustment.operation_id, Some(outcome.operation_id));
        assert_eq!(net_by_code(std::slice::from_ref(&adjustment))["C"], dec("-1.5"));
        ledger.apply_event(&adjustment).unwrap();
        assert_eq!(ledger.current_balance("C"), dec("94.5"));
    }

    #[test]
    fn test_unified_codes_receive_identical_deltas() {
        let catalog = catalog();
        let mut unifier = CodeUnifier::new();
        unifier.add_group(["C", "C-LEGACY"]);
        let mut ledger = StockLedger::new(unifier);
        ledger.apply_movement("B", dec("4"), Utc::now()).unwrap();
        ledger.apply_movement("C-LEGACY", dec("100"), Utc::now()).unwrap();

        produce(&catalog, &mut ledger, dec("2"));

        assert_eq!(ledger.balance("C").unwrap().current_balance, dec("96"));
        assert_eq!(ledger.balance("C-LEGACY").unwrap().current_balance, dec("96"));
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    proptest! {
        /// Summing a production's events per code reproduces the ledger change,
        /// which is what gets written back as balance deltas
        #[test]
        fn prop_event_deltas_reproduce_ledger(
            qty in 1i64..50,
            b_stock in -20i64..200,
            c_stock in -20i64..500,
        ) {
            let catalog = catalog();
            let mut ledger = StockLedger::new(CodeUnifier::new());
            ledger.apply_movement("B", Decimal::from(b_stock), Utc::now()).unwrap();
            ledger.apply_movement("C", Decimal::from(c_stock), Utc::now()).unwrap();
            let before: BTreeMap<String, Decimal> = ["A", "B", "C"]
                .iter()
                .map(|code| (code.to_string(), ledger.current_balance(code)))
                .collect();

            let events = produce(&catalog, &mut ledger, Decimal::from(qty));
            let deltas = net_by_code(&events);

            for (code, start) in &before {
                let delta = deltas.get(code).copied().unwrap_or(Decimal::ZERO);
                prop_assert_eq!(ledger.current_balance(code), *start + delta);
            }
            prop_assert_eq!(ledger.current_balance("A"), Decimal::from(qty));
        }
    }
}
