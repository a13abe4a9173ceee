//! Cascading production and consumption
//!
//! Producing N units of a product consumes its direct components from stock
//! on hand. A manufactured component with its own structure that runs short
//! is produced automatically (recursively); a purchased or unstructured one is
//! driven negative with an advisory. All events of one root production share
//! an operation id and are emitted depth-first in a deterministic order.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bom::{classification_of, group_components, structure_of, CatalogSource};
use crate::error::{BranchErrorKind, CoreError, CoreResult};
use crate::ledger::StockLedger;
use crate::models::{MovementEvent, MovementKind, MovementOrigin, ProductionOperation};
use crate::types::EngineLimits;
use crate::validation::{validate_product_code, validate_quantity};

/// Request to produce `quantity` units of `product_code`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionRequest {
    pub product_code: String,
    pub quantity: Decimal,
    pub movement_date: NaiveDate,
    pub requested_by: Option<String>,
}

/// Non-blocking notice attached to a production
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdvisoryKind {
    /// Product has no active structure; nothing was consumed
    ProducedWithoutStructure,
    /// Component consumed beyond its stock on hand
    NegativeStock,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Advisory {
    pub product_code: String,
    pub kind: AdvisoryKind,
    pub message: String,
    pub projected_balance: Option<Decimal>,
}

/// A branch of the cascade that was aborted by a guard
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BranchError {
    pub product_code: String,
    pub kind: BranchErrorKind,
    pub depth: u32,
    pub parent_production_id: Option<Uuid>,
    pub message: String,
}

/// Result of a root production
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionOutcome {
    /// False when any branch was aborted
    pub success: bool,
    pub operation_id: Uuid,
    pub operation: ProductionOperation,
    pub production_event_id: Uuid,
    /// Every event in emission order
    pub events: Vec<MovementEvent>,
    pub consumption_events: Vec<MovementEvent>,
    pub auto_production_events: Vec<MovementEvent>,
    pub advisories: Vec<Advisory>,
    pub branch_errors: Vec<BranchError>,
}

/// Mutable state of one root production
struct CascadeRun {
    operation_id: Uuid,
    root_product_code: String,
    movement_date: NaiveDate,
    now: DateTime<Utc>,
    events: Vec<MovementEvent>,
    advisories: Vec<Advisory>,
    branch_errors: Vec<BranchError>,
    auto_productions: u32,
}

impl CascadeRun {
    #[allow(clippy::too_many_arguments)]
    fn emit(
        &mut self,
        ledger: &mut StockLedger,
        product_code: &str,
        quantity: Decimal,
        kind: MovementKind,
        origin: MovementOrigin,
        parent_production_id: Option<Uuid>,
        depth: u32,
        note: Option<String>,
    ) -> CoreResult<Uuid> {
        let event = MovementEvent {
            id: Uuid::new_v4(),
            operation_id: Some(self.operation_id),
            product_code: product_code.to_string(),
            quantity,
            kind,
            origin,
            root_product_code: Some(self.root_product_code.clone()),
            parent_production_id,
            movement_date: self.movement_date,
            depth,
            note,
            recorded_at: self.now,
        };
        ledger.apply_event(&event)?;
        let id = event.id;
        self.events.push(event);
        Ok(id)
    }

    fn consume(
        &mut self,
        ledger: &mut StockLedger,
        product_code: &str,
        quantity: Decimal,
        origin: MovementOrigin,
        production_id: Uuid,
        depth: u32,
    ) -> CoreResult<()> {
        self.emit(
            ledger,
            product_code,
            -quantity,
            MovementKind::Consumption,
            origin,
            Some(production_id),
            depth,
            None,
        )?;
        Ok(())
    }

    /// Record an aborted component branch
    fn abort_branch(&mut self, error: BranchError) {
        tracing::warn!(
            operation_id = %self.operation_id,
            product_code = %error.product_code,
            kind = error.kind.code(),
            "cascade branch aborted"
        );
        self.branch_errors.push(error);
    }
}

fn overflow_error(product_code: &str, depth: u32, parent_production_id: Option<Uuid>, what: String) -> BranchError {
    BranchError {
        product_code: product_code.to_string(),
        kind: BranchErrorKind::QuantityOverflow,
        depth,
        parent_production_id,
        message: format!("{} while {}", BranchErrorKind::QuantityOverflow, what),
    }
}

/// Production engine over a catalog and a stock ledger working set
pub struct CascadeEngine<'a, C: CatalogSource + ?Sized> {
    catalog: &'a C,
    limits: EngineLimits,
}

impl<'a, C: CatalogSource + ?Sized> CascadeEngine<'a, C> {
    pub fn new(catalog: &'a C, limits: EngineLimits) -> Self {
        Self { catalog, limits }
    }

    /// Produce the requested quantity, cascading through the structure
    ///
    /// Events are applied to `ledger` as they are emitted, so later branches
    /// see the stock consumed or produced by earlier ones.
    pub fn produce(
        &self,
        ledger: &mut StockLedger,
        request: &ProductionRequest,
        now: DateTime<Utc>,
    ) -> CoreResult<ProductionOutcome> {
        validate_product_code(&request.product_code).map_err(|m| CoreError::invalid("product_code", m))?;
        validate_quantity(request.quantity).map_err(|m| CoreError::invalid("quantity", m))?;

        let operation = ProductionOperation {
            operation_id: Uuid::new_v4(),
            root_product_code: request.product_code.clone(),
            quantity: request.quantity,
            movement_date: request.movement_date,
            requested_by: request.requested_by.clone(),
            created_at: now,
        };
        let mut run = CascadeRun {
            operation_id: operation.operation_id,
            root_product_code: request.product_code.clone(),
            movement_date: request.movement_date,
            now,
            events: Vec::new(),
            advisories: Vec::new(),
            branch_errors: Vec::new(),
            auto_productions: 0,
        };

        let root = self.produce_node(
            &mut run,
            ledger,
            &request.product_code,
            request.quantity,
            None,
            0,
            &BTreeSet::new(),
        );
        let production_event_id = match root {
            Ok(id) => id,
            Err(error) => {
                run.branch_errors.push(error);
                Uuid::nil()
            }
        };

        let consumption_events = run.events.iter().filter(|e| e.is_consumption()).cloned().collect();
        let auto_production_events = run
            .events
            .iter()
            .filter(|e| e.origin == MovementOrigin::AutoProduction)
            .cloned()
            .collect();

        Ok(ProductionOutcome {
            success: run.branch_errors.is_empty(),
            operation_id: operation.operation_id,
            operation,
            production_event_id,
            events: run.events,
            consumption_events,
            auto_production_events,
            advisories: run.advisories,
            branch_errors: run.branch_errors,
        })
    }

    /// Record one production and consume its direct components
    ///
    /// Guards are checked before anything is emitted, so an aborted branch
    /// leaves no events behind.
    #[allow(clippy::too_many_arguments)]
    fn produce_node(
        &self,
        run: &mut CascadeRun,
        ledger: &mut StockLedger,
        product_code: &str,
        quantity: Decimal,
        parent_production_id: Option<Uuid>,
        depth: u32,
        visited: &BTreeSet<String>,
    ) -> Result<Uuid, BranchError> {
        let key = ledger.unifier().canonical(product_code);
        let guard = if visited.contains(&key) {
            Some(BranchErrorKind::CycleDetected)
        } else if depth > self.limits.max_depth {
            Some(BranchErrorKind::DepthExceeded)
        } else if parent_production_id.is_some() && run.auto_productions >= self.limits.max_productions {
            Some(BranchErrorKind::BudgetExceeded)
        } else {
            None
        };
        if let Some(kind) = guard {
            return Err(BranchError {
                product_code: product_code.to_string(),
                kind,
                depth,
                parent_production_id,
                message: format!("{} while producing {} x {}", kind, quantity, product_code),
            });
        }

        let origin = if parent_production_id.is_some() {
            MovementOrigin::AutoProduction
        } else {
            MovementOrigin::Root
        };
        let production_id = run
            .emit(
                ledger,
                product_code,
                quantity,
                MovementKind::Production,
                origin,
                parent_production_id,
                depth,
                None,
            )
            .map_err(|_| {
                overflow_error(
                    product_code,
                    depth,
                    parent_production_id,
                    format!("producing {} x {}", quantity, product_code),
                )
            })?;
        if parent_production_id.is_some() {
            run.auto_productions += 1;
        }

        let links = structure_of(self.catalog, ledger.unifier(), product_code);
        if links.is_empty() {
            run.advisories.push(Advisory {
                product_code: product_code.to_string(),
                kind: AdvisoryKind::ProducedWithoutStructure,
                message: format!("{} produced without component consumption", product_code),
                projected_balance: None,
            });
            return Ok(production_id);
        }

        let mut path = visited.clone();
        path.insert(key);

        for group in group_components(&links, ledger.unifier()) {
            let component = group.component_code.as_str();
            let Some(needed) = quantity.checked_mul(group.quantity_per_unit) else {
                run.abort_branch(overflow_error(
                    component,
                    depth + 1,
                    Some(production_id),
                    format!("consuming {} x {} per {}", group.quantity_per_unit, component, quantity),
                ));
                continue;
            };
            if let Err(error) = self.consume_component(run, ledger, component, needed, production_id, depth, &path) {
                run.abort_branch(error);
            }
        }

        Ok(production_id)
    }

    /// Consume `needed` units of one component, auto-producing any shortfall
    #[allow(clippy::too_many_arguments)]
    fn consume_component(
        &self,
        run: &mut CascadeRun,
        ledger: &mut StockLedger,
        component: &str,
        needed: Decimal,
        production_id: Uuid,
        depth: u32,
        path: &BTreeSet<String>,
    ) -> Result<(), BranchError> {
        let overflow = |_: CoreError| {
            overflow_error(
                component,
                depth + 1,
                Some(production_id),
                format!("consuming {} x {}", needed, component),
            )
        };
        let available = ledger.current_balance(component);

        if available >= needed {
            return run
                .consume(ledger, component, needed, MovementOrigin::DirectConsumption, production_id, depth + 1)
                .map_err(overflow);
        }

        let usable = available.max(Decimal::ZERO);
        if usable > Decimal::ZERO {
            run.consume(ledger, component, usable, MovementOrigin::DirectConsumption, production_id, depth + 1)
                .map_err(overflow)?;
        }
        let missing = needed - usable;

        let manufactured = classification_of(self.catalog, ledger.unifier(), component)
            .is_some_and(|c| c.is_manufactured);
        let has_structure = !structure_of(self.catalog, ledger.unifier(), component).is_empty();

        if manufactured && has_structure {
            self.produce_node(run, ledger, component, missing, Some(production_id), depth + 1, path)?;
            run.consume(ledger, component, missing, MovementOrigin::AutoConsumption, production_id, depth + 1)
                .map_err(overflow)?;
        } else {
            run.consume(ledger, component, missing, MovementOrigin::DirectConsumption, production_id, depth + 1)
                .map_err(overflow)?;
            let balance = ledger.current_balance(component);
            run.advisories.push(Advisory {
                product_code: component.to_string(),
                kind: AdvisoryKind::NegativeStock,
                message: format!("component will carry negative stock: {}", balance),
                projected_balance: Some(balance),
            });
        }
        Ok(())
    }

    /// Record a manual consumption adjustment against an existing operation
    ///
    /// A positive `quantity` consumes more, a negative one returns stock. The
    /// original events are never touched.
    pub fn adjust_consumption(
        &self,
        ledger: &mut StockLedger,
        operation: &ProductionOperation,
        product_code: &str,
        quantity: Decimal,
        note: Option<String>,
        movement_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> CoreResult<MovementEvent> {
        let event = consumption_adjustment(operation, product_code, quantity, note, movement_date, now)?;
        ledger.apply_event(&event)?;
        Ok(event)
    }
}

/// Build the adjustment event for an operation without applying it
pub fn consumption_adjustment(
    operation: &ProductionOperation,
    product_code: &str,
    quantity: Decimal,
    note: Option<String>,
    movement_date: NaiveDate,
    now: DateTime<Utc>,
) -> CoreResult<MovementEvent> {
    validate_product_code(product_code).map_err(|m| CoreError::invalid("product_code", m))?;
    if quantity.is_zero() {
        return Err(CoreError::invalid("quantity", "Adjustment quantity must be non-zero"));
    }

    Ok(MovementEvent {
        id: Uuid::new_v4(),
        operation_id: Some(operation.operation_id),
        product_code: product_code.to_string(),
        quantity: -quantity,
        kind: MovementKind::Adjustment,
        origin: MovementOrigin::ManualAdjustment,
        root_product_code: Some(operation.root_product_code.clone()),
        parent_production_id: None,
        movement_date,
        depth: 0,
        note,
        recorded_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bom::Catalog;
    use crate::models::ProductClassification;
    use crate::unification::CodeUnifier;

    fn dec(n: i64) -> Decimal {
        Decimal::from(n)
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 1).unwrap()
    }

    fn request(code: &str, qty: i64) -> ProductionRequest {
        ProductionRequest {
            product_code: code.to_string(),
            quantity: dec(qty),
            movement_date: date(),
            requested_by: None,
        }
    }

    #[test]
    fn test_rejects_non_positive_quantity() {
        let catalog = Catalog::new();
        let mut ledger = StockLedger::default();
        let engine = CascadeEngine::new(&catalog, EngineLimits::default());
        assert!(engine.produce(&mut ledger, &request("A", 0), Utc::now()).is_err());
        assert!(engine.produce(&mut ledger, &request("A", -3), Utc::now()).is_err());
        assert!(ledger.balance("A").is_none());
    }

    #[test]
    fn test_no_structure_produces_with_advisory() {
        let mut catalog = Catalog::new();
        catalog.add_product(ProductClassification::finished("A", "Widget"));
        let mut ledger = StockLedger::default();
        let engine = CascadeEngine::new(&catalog, EngineLimits::default());

        let outcome = engine.produce(&mut ledger, &request("A", 3), Utc::now()).unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.events[0].origin, MovementOrigin::Root);
        assert_eq!(outcome.production_event_id, outcome.events[0].id);
        assert_eq!(outcome.advisories[0].kind, AdvisoryKind::ProducedWithoutStructure);
        assert_eq!(ledger.current_balance("A"), dec(3));
    }

    #[test]
    fn test_budget_guard_stops_auto_production() {
        let mut catalog = Catalog::new();
        let now = Utc::now();
        catalog.add_product(ProductClassification::finished("A", "top"));
        catalog.add_product(ProductClassification::intermediate("B", "mid"));
        catalog.add_product(ProductClassification::purchased("C", "raw"));
        catalog.add_link("A", "B", dec(1), "v1", None, now).unwrap();
        catalog.add_link("B", "C", dec(1), "v1", None, now).unwrap();
        let mut ledger = StockLedger::new(CodeUnifier::new());
        let limits = EngineLimits {
            max_depth: 10,
            max_productions: 0,
        };

        let outcome = CascadeEngine::new(&catalog, limits)
            .produce(&mut ledger, &request("A", 1), now)
            .unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.branch_errors[0].kind, BranchErrorKind::BudgetExceeded);
        assert!(outcome.auto_production_events.is_empty());
        // root still recorded
        assert_eq!(ledger.current_balance("A"), dec(1));
        assert_eq!(ledger.current_balance("C"), Decimal::ZERO);
    }

    #[test]
    fn test_adjustment_is_append_only() {
        let catalog = Catalog::new();
        let mut ledger = StockLedger::default();
        let engine = CascadeEngine::new(&catalog, EngineLimits::default());
        let outcome = engine.produce(&mut ledger, &request("A", 2), Utc::now()).unwrap();

        let event = engine
            .adjust_consumption(&mut ledger, &outcome.operation, "C", dec(3), Some("scrap".into()), date(), Utc::now())
            .unwrap();

        assert_eq!(event.operation_id, Some(outcome.operation_id));
        assert_eq!(event.origin, MovementOrigin::ManualAdjustment);
        assert_eq!(event.quantity, dec(-3));
        assert_eq!(ledger.current_balance("C"), dec(-3));

        let returned = engine
            .adjust_consumption(&mut ledger, &outcome.operation, "C", dec(-1), None, date(), Utc::now())
            .unwrap();
        assert_eq!(returned.quantity, dec(1));
        assert_eq!(ledger.current_balance("C"), dec(-2));
    }

    #[test]
    fn test_zero_adjustment_rejected() {
        let catalog = Catalog::new();
        let mut ledger = StockLedger::default();
        let engine = CascadeEngine::new(&catalog, EngineLimits::default());
        let outcome = engine.produce(&mut ledger, &request("A", 1), Utc::now()).unwrap();
        let result = engine.adjust_consumption(&mut ledger, &outcome.operation, "C", Decimal::ZERO, None, date(), Utc::now());
        assert!(result.is_err());
    }
}
