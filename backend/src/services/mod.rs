//! Business logic services for the stock ledger server

pub mod bom;
pub mod ledger;
pub mod production;
pub mod reconciliation;
pub mod snapshot;
pub mod store;

pub use bom::BomService;
pub use ledger::LedgerService;
pub use production::ProductionService;
pub use reconciliation::ReconciliationService;
