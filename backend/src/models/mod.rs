//! Domain models for the stock ledger server
//!
//! Re-exports models from the shared crate

pub use shared::models::*;
