//! Shared types and core engines for the stock ledger
//!
//! This crate holds the in-process domain logic: the stock ledger and its
//! projection, BOM explosion, net requirements and the production cascade.
//! The backend persists what these engines compute.

pub mod bom;
pub mod cascade;
pub mod error;
pub mod ledger;
pub mod models;
pub mod requirement;
pub mod ruptura;
pub mod types;
pub mod unification;
pub mod validation;

pub use bom::{BomExplosion, Catalog, CatalogSource};
pub use cascade::{
    Advisory, AdvisoryKind, BranchError, CascadeEngine, ProductionOutcome, ProductionRequest,
};
pub use error::{BranchErrorKind, CoreError, CoreResult};
pub use ledger::StockLedger;
pub use models::*;
pub use requirement::{ComponentRequirement, NetRequirement};
pub use types::*;
pub use unification::CodeUnifier;
pub use validation::*;
