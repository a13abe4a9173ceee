//! HTTP handlers

mod bom;
mod health;
mod ledger;
mod production;

pub use bom::*;
pub use health::*;
pub use ledger::*;
pub use production::*;
