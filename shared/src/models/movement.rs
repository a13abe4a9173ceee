//! Stock movement events and production operations

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a movement does to stock
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MovementKind {
    #[serde(rename = "PRODUCAO")]
    Production,
    #[serde(rename = "CONSUMO")]
    Consumption,
    #[serde(rename = "AJUSTE")]
    Adjustment,
    /// Movement posted by a caller outside the production cascade
    #[serde(rename = "EXTERNO")]
    External,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Production => "PRODUCAO",
            MovementKind::Consumption => "CONSUMO",
            MovementKind::Adjustment => "AJUSTE",
            MovementKind::External => "EXTERNO",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PRODUCAO" => Some(MovementKind::Production),
            "CONSUMO" => Some(MovementKind::Consumption),
            "AJUSTE" => Some(MovementKind::Adjustment),
            "EXTERNO" => Some(MovementKind::External),
            _ => None,
        }
    }
}

/// Why a movement was emitted
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MovementOrigin {
    /// Root production requested by an external actor
    #[serde(rename = "RAIZ")]
    Root,
    /// Production triggered by a parent's shortage
    #[serde(rename = "PRODUCAO_AUTO")]
    AutoProduction,
    /// Consumption of stock on hand (or driven negative for leaves)
    #[serde(rename = "CONSUMO_DIRETO")]
    DirectConsumption,
    /// Consumption of what the cascade just auto-produced
    #[serde(rename = "CONSUMO_AUTO")]
    AutoConsumption,
    #[serde(rename = "AJUSTE_MANUAL")]
    ManualAdjustment,
    #[serde(rename = "EXTERNO")]
    External,
}

impl MovementOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementOrigin::Root => "RAIZ",
            MovementOrigin::AutoProduction => "PRODUCAO_AUTO",
            MovementOrigin::DirectConsumption => "CONSUMO_DIRETO",
            MovementOrigin::AutoConsumption => "CONSUMO_AUTO",
            MovementOrigin::ManualAdjustment => "AJUSTE_MANUAL",
            MovementOrigin::External => "EXTERNO",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "RAIZ" => Some(MovementOrigin::Root),
            "PRODUCAO_AUTO" => Some(MovementOrigin::AutoProduction),
            "CONSUMO_DIRETO" => Some(MovementOrigin::DirectConsumption),
            "CONSUMO_AUTO" => Some(MovementOrigin::AutoConsumption),
            "AJUSTE_MANUAL" => Some(MovementOrigin::ManualAdjustment),
            "EXTERNO" => Some(MovementOrigin::External),
            _ => None,
        }
    }
}

/// A single append-only stock movement
///
/// `quantity` is the signed delta applied to the balance: productions are
/// positive, consumptions negative.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovementEvent {
    pub id: Uuid,
    pub operation_id: Option<Uuid>,
    pub product_code: String,
    pub quantity: Decimal,
    pub kind: MovementKind,
    pub origin: MovementOrigin,
    pub root_product_code: Option<String>,
    /// Production this event hangs off: the parent production for a
    /// production event, the consuming production for a consumption
    pub parent_production_id: Option<Uuid>,
    pub movement_date: NaiveDate,
    pub depth: u32,
    pub note: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl MovementEvent {
    /// Movement posted directly to the ledger, outside any operation
    pub fn external(
        product_code: impl Into<String>,
        quantity: Decimal,
        movement_date: NaiveDate,
        note: Option<String>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation_id: None,
            product_code: product_code.into(),
            quantity,
            kind: MovementKind::External,
            origin: MovementOrigin::External,
            root_product_code: None,
            parent_production_id: None,
            movement_date,
            depth: 0,
            note,
            recorded_at,
        }
    }

    pub fn is_production(&self) -> bool {
        self.kind == MovementKind::Production
    }

    pub fn is_consumption(&self) -> bool {
        self.kind == MovementKind::Consumption
    }
}

/// Header of one top-level "produce N units of P" request
///
/// Immutable once written; corrections are new adjustment events under the
/// same `operation_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductionOperation {
    pub operation_id: Uuid,
    pub root_product_code: String,
    pub quantity: Decimal,
    pub movement_date: NaiveDate,
    pub requested_by: Option<String>,
    pub created_at: DateTime<Utc>,
}
