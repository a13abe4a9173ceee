//! Cascading production tests
//!
//! Covers:
//! - Exact event trail of a multi-level production
//! - Direct consumption vs auto-production vs negative stock
//! - Branch containment of cycle, depth and out-of-range failures
//! - Append-only consumption adjustments

use chrono::{NaiveDate, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;

use shared::bom::Catalog;
use shared::cascade::{AdvisoryKind, CascadeEngine, ProductionRequest};
use shared::error::BranchErrorKind;
use shared::ledger::StockLedger;
use shared::models::{MovementEvent, MovementKind, MovementOrigin, ProductClassification};
use shared::types::EngineLimits;
use shared::unification::CodeUnifier;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn request(code: &str, qty: &str) -> ProductionRequest {
    ProductionRequest {
        product_code: code.to_string(),
        quantity: dec(qty),
        movement_date: NaiveDate::from_ymd_opt(2025, 5, 12).unwrap(),
        requested_by: Some("planner".to_string()),
    }
}

fn trail(events: &[MovementEvent]) -> Vec<(String, Decimal, MovementOrigin)> {
    events
        .iter()
        .map(|e| (e.product_code.clone(), e.quantity, e.origin))
        .collect()
}

fn step(code: &str, qty: &str, origin: MovementOrigin) -> (String, Decimal, MovementOrigin) {
    (code.to_string(), dec(qty), origin)
}

/// A <- 3 B, B <- 2 C; B stock 4, C stock 100
fn end_to_end_setup() -> (Catalog, StockLedger) {
    let now = Utc::now();
    let mut catalog = Catalog::new();
    catalog.add_product(ProductClassification::finished("A", "Assembly"));
    catalog.add_product(ProductClassification::intermediate("B", "Subassembly"));
    catalog.add_product(ProductClassification::purchased("C", "Raw part"));
    catalog.add_link("A", "B", dec("3"), "v1", None, now).unwrap();
    catalog.add_link("B", "C", dec("2"), "v1", None, now).unwrap();

    let mut ledger = StockLedger::new(CodeUnifier::new());
    ledger.apply_movement("B", dec("4"), now).unwrap();
    ledger.apply_movement("C", dec("100"), now).unwrap();
    (catalog, ledger)
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_end_to_end_event_list() {
        let (catalog, mut ledger) = end_to_end_setup();
        let engine = CascadeEngine::new(&catalog, EngineLimits::default());

        let outcome = engine.produce(&mut ledger, &request("A", "2"), Utc::now()).unwrap();

        assert!(outcome.success);
        assert_eq!(
            trail(&outcome.events),
            vec![
                step("A", "2", MovementOrigin::Root),
                step("B", "-4", MovementOrigin::DirectConsumption),
                step("B", "2", MovementOrigin::AutoProduction),
                step("C", "-4", MovementOrigin::DirectConsumption),
                step("B", "-2", MovementOrigin::AutoConsumption),
            ]
        );
        assert!(outcome.events.iter().all(|e| e.operation_id == Some(outcome.operation_id)));
        assert!(outcome
            .events
            .iter()
            .all(|e| e.root_product_code.as_deref() == Some("A")));

        assert_eq!(ledger.current_balance("A"), dec("2"));
        assert_eq!(ledger.current_balance("B"), Decimal::ZERO);
        assert_eq!(ledger.current_balance("C"), dec("96"));
        assert!(outcome.advisories.is_empty());
    }

    #[test]
    fn test_event_parentage() {
        let (catalog, mut ledger) = end_to_end_setup();
        let engine = CascadeEngine::new(&catalog, EngineLimits::default());
        let outcome = engine.produce(&mut ledger, &request("A", "2"), Utc::now()).unwrap();

        let root = &outcome.events[0];
        let auto_b = &outcome.events[2];
        assert_eq!(root.id, outcome.production_event_id);
        assert_eq!(root.parent_production_id, None);
        assert_eq!(root.depth, 0);
        assert_eq!(auto_b.parent_production_id, Some(root.id));
        assert_eq!(auto_b.depth, 1);
        // C is consumed by the auto-production of B
        assert_eq!(outcome.events[3].parent_production_id, Some(auto_b.id));
        assert_eq!(outcome.events[3].depth, 2);

        assert_eq!(outcome.auto_production_events.len(), 1);
        assert_eq!(outcome.consumption_events.len(), 3);
        assert!(outcome
            .consumption_events
            .iter()
            .all(|e| e.kind == MovementKind::Consumption && e.quantity < Decimal::ZERO));
    }

    #[test]
    fn test_manufactured_component_is_auto_produced() {
        let now = Utc::now();
        let mut catalog = Catalog::new();
        catalog.add_product(ProductClassification::finished("P", "Product"));
        catalog.add_product(ProductClassification::intermediate("X", "Part"));
        catalog.add_product(ProductClassification::purchased("R", "Resin"));
        catalog.add_link("P", "X", dec("2"), "v1", None, now).unwrap();
        catalog.add_link("X", "R", dec("1"), "v1", None, now).unwrap();
        let mut ledger = StockLedger::default();
        ledger.apply_movement("X", dec("15"), now).unwrap();
        ledger.apply_movement("R", dec("50"), now).unwrap();

        let outcome = CascadeEngine::new(&catalog, EngineLimits::default())
            .produce(&mut ledger, &request("P", "10"), now)
            .unwrap();

        let direct: Vec<_> = outcome
            .events
            .iter()
            .filter(|e| e.product_code == "X" && e.origin == MovementOrigin::DirectConsumption)
            .collect();
        assert_eq!(direct.len(), 1);
        assert_eq!(direct[0].quantity, dec("-15"));
        assert_eq!(outcome.auto_production_events.len(), 1);
        assert_eq!(outcome.auto_production_events[0].quantity, dec("5"));
        assert_eq!(ledger.current_balance("X"), Decimal::ZERO);
        assert_eq!(ledger.current_balance("R"), dec("45"));
    }

    #[test]
    fn test_purchased_component_goes_negative_with_advisory() {
        let now = Utc::now();
        let mut catalog = Catalog::new();
        catalog.add_product(ProductClassification::finished("P", "Product"));
        catalog.add_product(ProductClassification::purchased("X", "Part"));
        catalog.add_link("P", "X", dec("2"), "v1", None, now).unwrap();
        let mut ledger = StockLedger::default();
        ledger.apply_movement("X", dec("15"), now).unwrap();

        let outcome = CascadeEngine::new(&catalog, EngineLimits::default())
            .produce(&mut ledger, &request("P", "10"), now)
            .unwrap();

        assert!(outcome.success);
        assert_eq!(
            trail(&outcome.events),
            vec![
                step("P", "10", MovementOrigin::Root),
                step("X", "-15", MovementOrigin::DirectConsumption),
                step("X", "-5", MovementOrigin::DirectConsumption),
            ]
        );
        assert!(outcome.auto_production_events.is_empty());
        assert_eq!(outcome.advisories.len(), 1);
        assert_eq!(outcome.advisories[0].kind, AdvisoryKind::NegativeStock);
        assert_eq!(outcome.advisories[0].projected_balance, Some(dec("-5")));
        assert_eq!(ledger.current_balance("X"), dec("-5"));
    }

    #[test]
    fn test_no_stock_skips_empty_direct_consumption() {
        let now = Utc::now();
        let mut catalog = Catalog::new();
        catalog.add_product(ProductClassification::finished("P", "Product"));
        catalog.add_product(ProductClassification::purchased("X", "Part"));
        catalog.add_link("P", "X", dec("1"), "v1", None, now).unwrap();
        let mut ledger = StockLedger::default();
        ledger.apply_movement("X", dec("-3"), now).unwrap();

        let outcome = CascadeEngine::new(&catalog, EngineLimits::default())
            .produce(&mut ledger, &request("P", "2"), now)
            .unwrap();

        assert_eq!(
            trail(&outcome.events),
            vec![
                step("P", "2", MovementOrigin::Root),
                step("X", "-2", MovementOrigin::DirectConsumption),
            ]
        );
        assert_eq!(ledger.current_balance("X"), dec("-5"));
    }

    #[test]
    fn test_unclassified_component_consumed_as_leaf() {
        let now = Utc::now();
        let mut catalog = Catalog::new();
        catalog.add_product(ProductClassification::finished("P", "Product"));
        catalog.add_link("P", "Q", dec("1"), "v1", None, now).unwrap();
        catalog.add_link("Q", "R", dec("1"), "v1", None, now).unwrap();
        let mut ledger = StockLedger::default();

        let outcome = CascadeEngine::new(&catalog, EngineLimits::default())
            .produce(&mut ledger, &request("P", "1"), now)
            .unwrap();

        assert!(outcome.auto_production_events.is_empty());
        assert_eq!(ledger.current_balance("Q"), dec("-1"));
        assert_eq!(ledger.current_balance("R"), Decimal::ZERO);
        assert_eq!(outcome.advisories[0].kind, AdvisoryKind::NegativeStock);
    }

    #[test]
    fn test_aliased_components_consumed_once_from_merged_balance() {
        let now = Utc::now();
        let mut catalog = Catalog::new();
        catalog.add_product(ProductClassification::finished("P", "Product"));
        catalog.add_product(ProductClassification::purchased("S", "Screw"));
        catalog.add_product(ProductClassification::purchased("S-OLD", "Screw (old)"));
        catalog.add_link("P", "S", dec("2"), "v1", None, now).unwrap();
        catalog.add_link("P", "S-OLD", dec("3"), "v1", None, now).unwrap();
        let mut unifier = CodeUnifier::new();
        unifier.add_group(["S", "S-OLD"]);
        let mut ledger = StockLedger::new(unifier);
        ledger.apply_movement("S-OLD", dec("20"), now).unwrap();

        let outcome = CascadeEngine::new(&catalog, EngineLimits::default())
            .produce(&mut ledger, &request("P", "2"), now)
            .unwrap();

        assert_eq!(
            trail(&outcome.events),
            vec![
                step("P", "2", MovementOrigin::Root),
                step("S", "-10", MovementOrigin::DirectConsumption),
            ]
        );
        assert_eq!(ledger.current_balance("S"), dec("10"));
        assert_eq!(ledger.current_balance("S-OLD"), dec("10"));
    }

    #[test]
    fn test_cycle_fails_branch_only() {
        let now = Utc::now();
        let mut catalog = Catalog::new();
        catalog.add_product(ProductClassification::finished("A", "Top"));
        catalog.add_product(ProductClassification::intermediate("B", "Loop"));
        catalog.add_link("A", "B", dec("1"), "v1", None, now).unwrap();
        catalog.add_link("B", "A", dec("5"), "v1", None, now).unwrap();
        let mut ledger = StockLedger::default();

        let outcome = CascadeEngine::new(&catalog, EngineLimits::default())
            .produce(&mut ledger, &request("A", "1"), now)
            .unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.branch_errors.len(), 1);
        assert_eq!(outcome.branch_errors[0].kind, BranchErrorKind::CycleDetected);
        assert_eq!(outcome.branch_errors[0].product_code, "A");
        assert_eq!(
            trail(&outcome.events),
            vec![
                step("A", "1", MovementOrigin::Root),
                step("B", "1", MovementOrigin::AutoProduction),
                step("A", "-1", MovementOrigin::DirectConsumption),
                step("B", "-1", MovementOrigin::AutoConsumption),
            ]
        );
    }

    #[test]
    fn test_depth_guard_contains_branch() {
        let now = Utc::now();
        let mut catalog = Catalog::new();
        for level in 0..5 {
            catalog.add_product(ProductClassification::intermediate(format!("L{level}"), "level"));
            catalog
                .add_link(&format!("L{level}"), &format!("L{}", level + 1), dec("1"), "v1", None, now)
                .unwrap();
        }
        let mut ledger = StockLedger::default();
        let limits = EngineLimits {
            max_depth: 2,
            ..EngineLimits::default()
        };

        let outcome = CascadeEngine::new(&catalog, limits)
            .produce(&mut ledger, &request("L0", "1"), now)
            .unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.branch_errors[0].kind, BranchErrorKind::DepthExceeded);
        assert_eq!(outcome.branch_errors[0].product_code, "L3");
        assert_eq!(outcome.branch_errors[0].depth, 3);
        assert_eq!(
            trail(&outcome.events),
            vec![
                step("L0", "1", MovementOrigin::Root),
                step("L1", "1", MovementOrigin::AutoProduction),
                step("L2", "1", MovementOrigin::AutoProduction),
                step("L2", "-1", MovementOrigin::AutoConsumption),
                step("L1", "-1", MovementOrigin::AutoConsumption),
            ]
        );
        assert_eq!(ledger.current_balance("L3"), Decimal::ZERO);
    }

    #[test]
    fn test_failed_sibling_does_not_stop_other_branches() {
        let now = Utc::now();
        let mut catalog = Catalog::new();
        catalog.add_product(ProductClassification::finished("A", "Top"));
        catalog.add_product(ProductClassification::intermediate("B", "Loop"));
        catalog.add_product(ProductClassification::purchased("Z", "Bolt"));
        catalog.add_link("A", "B", dec("1"), "v1", None, now).unwrap();
        catalog.add_link("B", "A", dec("5"), "v1", None, now).unwrap();
        catalog.add_link("A", "Z", dec("2"), "v1", None, now).unwrap();
        let mut ledger = StockLedger::default();
        ledger.apply_movement("Z", dec("10"), now).unwrap();

        let outcome = CascadeEngine::new(&catalog, EngineLimits::default())
            .produce(&mut ledger, &request("A", "1"), now)
            .unwrap();

        assert!(!outcome.success);
        assert_eq!(ledger.current_balance("Z"), dec("8"));
    }

    #[test]
    fn test_out_of_range_component_fails_branch_only() {
        let now = Utc::now();
        let mut catalog = Catalog::new();
        catalog.add_product(ProductClassification::finished("A", "Pallet"));
        catalog.add_product(ProductClassification::intermediate("B", "Crate"));
        catalog.add_product(ProductClassification::purchased("C", "Screw"));
        catalog.add_link("A", "B", dec("1000000000000000"), "v1", None, now).unwrap();
        catalog.add_link("B", "C", dec("1000000000000000"), "v1", None, now).unwrap();
        let mut ledger = StockLedger::default();

        let outcome = CascadeEngine::new(&catalog, EngineLimits::default())
            .produce(&mut ledger, &request("A", "1000"), now)
            .unwrap();

        assert!(!outcome.success);
        assert_eq!(
            trail(&outcome.events),
            vec![
                step("A", "1000", MovementOrigin::Root),
                step("B", "1000000000000000000", MovementOrigin::AutoProduction),
                step("B", "-1000000000000000000", MovementOrigin::AutoConsumption),
            ]
        );
        assert_eq!(outcome.branch_errors.len(), 1);
        let error = &outcome.branch_errors[0];
        assert_eq!(error.kind, BranchErrorKind::QuantityOverflow);
        assert_eq!(error.product_code, "C");
        assert_eq!(error.depth, 2);
        assert_eq!(error.parent_production_id, Some(outcome.events[1].id));
        assert_eq!(ledger.current_balance("C"), Decimal::ZERO);
    }

    #[test]
    fn test_adjustment_joins_operation_trail() {
        let (catalog, mut ledger) = end_to_end_setup();
        let engine = CascadeEngine::new(&catalog, EngineLimits::default());
        let outcome = engine.produce(&mut ledger, &request("A", "2"), Utc::now()).unwrap();

        let adjustment = engine
            .adjust_consumption(
                &mut ledger,
                &outcome.operation,
                "C",
                dec("0.5"),
                Some("scrap".to_string()),
                outcome.operation.movement_date,
                Utc::now(),
            )
            .unwrap();

        assert_eq!(adjustment.operation_id, Some(outcome.operation_id));
        assert_eq!(adjustment.kind, MovementKind::Adjustment);
        assert_eq!(ledger.current_balance("C"), dec("95.5"));
        // original events untouched
        assert_eq!(outcome.events[3].quantity, dec("-4"));
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Direct consumption never exceeds stock on hand, and the total
        /// consumed always equals the need
        #[test]
        fn prop_consumption_covers_need(
            qty in 1i64..200,
            per_unit in 1i64..10,
            stock in -50i64..500,
            manufactured in any::<bool>()
        ) {
            let now = Utc::now();
            let mut catalog = Catalog::new();
            catalog.add_product(ProductClassification::finished("P", "Product"));
            if manufactured {
                catalog.add_product(ProductClassification::intermediate("X", "Part"));
                catalog.add_product(ProductClassification::purchased("R", "Raw"));
                catalog.add_link("X", "R", Decimal::ONE, "v1", None, now).unwrap();
            } else {
                catalog.add_product(ProductClassification::purchased("X", "Part"));
            }
            catalog.add_link("P", "X", Decimal::from(per_unit), "v1", None, now).unwrap();
            let mut ledger = StockLedger::default();
            if stock != 0 {
                ledger.apply_movement("X", Decimal::from(stock), now).unwrap();
            }

            let outcome = CascadeEngine::new(&catalog, EngineLimits::default())
                .produce(&mut ledger, &request("P", &qty.to_string()), now)
                .unwrap();

            let needed = Decimal::from(qty * per_unit);
            let consumed: Decimal = outcome
                .consumption_events
                .iter()
                .filter(|e| e.product_code == "X")
                .map(|e| -e.quantity)
                .sum();
            let direct: Decimal = outcome
                .consumption_events
                .iter()
                .filter(|e| e.product_code == "X" && e.origin == MovementOrigin::DirectConsumption)
                .map(|e| -e.quantity)
                .sum();

            prop_assert!(outcome.success);
            prop_assert_eq!(consumed, needed);
            if manufactured {
                let on_hand = Decimal::from(stock);
                let expected = if on_hand >= needed { on_hand - needed } else { on_hand.min(Decimal::ZERO) };
                prop_assert!(direct <= on_hand.max(Decimal::ZERO));
                prop_assert_eq!(ledger.current_balance("X"), expected);
            } else {
                prop_assert_eq!(ledger.current_balance("X"), Decimal::from(stock) - needed);
            }
        }
    }
}
