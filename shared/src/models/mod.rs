//! Domain models for the stock ledger and production engine

mod bom;
mod movement;
mod product;
mod stock;

pub use bom::*;
pub use movement::*;
pub use product::*;
pub use stock::*;
