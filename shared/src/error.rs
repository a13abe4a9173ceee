//! Error types for the stock ledger and production engine

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Failure contained to one branch of a BOM traversal or production cascade
///
/// A branch error never aborts sibling branches or the root; it is reported
/// alongside the results.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchErrorKind {
    #[error("cycle detected")]
    CycleDetected,

    #[error("maximum depth exceeded")]
    DepthExceeded,

    #[error("product not classified")]
    ProductNotClassified,

    #[error("production budget exceeded")]
    BudgetExceeded,

    #[error("quantity overflow")]
    QuantityOverflow,
}

impl BranchErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            BranchErrorKind::CycleDetected => "cycle_detected",
            BranchErrorKind::DepthExceeded => "depth_exceeded",
            BranchErrorKind::ProductNotClassified => "product_not_classified",
            BranchErrorKind::BudgetExceeded => "budget_exceeded",
            BranchErrorKind::QuantityOverflow => "quantity_overflow",
        }
    }
}

/// Errors raised by the in-process core before any stock is touched
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid {field}: {message}")]
    Invalid {
        field: &'static str,
        message: &'static str,
    },

    #[error("quantity out of range for {0}")]
    QuantityOverflow(String),

    #[error("component link not found: {0}")]
    LinkNotFound(Uuid),

    #[error("component link {0} is inactive")]
    LinkInactive(Uuid),

    #[error("an active link {parent} -> {component} ({version}) already exists")]
    DuplicateLink {
        parent: String,
        component: String,
        version: String,
    },
}

impl CoreError {
    pub fn invalid(field: &'static str, message: &'static str) -> Self {
        CoreError::Invalid { field, message }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
