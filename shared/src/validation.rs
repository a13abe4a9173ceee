//! Validation utilities for stock and structure inputs

use rust_decimal::Decimal;

/// Longest product code accepted anywhere in the system
pub const MAX_PRODUCT_CODE_LEN: usize = 64;

/// Longest projection horizon a caller may request, in days
pub const MAX_HORIZON_DAYS: u32 = 366;

// ============================================================================
// Identifiers
// ============================================================================

/// Validate a product code: non-blank, bounded, no whitespace or control characters
pub fn validate_product_code(code: &str) -> Result<(), &'static str> {
    if code.trim().is_empty() {
        return Err("Product code is required");
    }
    if code.len() > MAX_PRODUCT_CODE_LEN {
        return Err("Product code must be at most 64 characters");
    }
    if code.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err("Product code cannot contain whitespace");
    }
    Ok(())
}

/// Validate a version tag of a component link
pub fn validate_version_tag(tag: &str) -> Result<(), &'static str> {
    if tag.trim().is_empty() {
        return Err("Version tag is required");
    }
    if tag.len() > 32 {
        return Err("Version tag must be at most 32 characters");
    }
    Ok(())
}

// ============================================================================
// Quantities
// ============================================================================

/// Validate a quantity that must be strictly positive
pub fn validate_quantity(quantity: Decimal) -> Result<(), &'static str> {
    if quantity <= Decimal::ZERO {
        return Err("Quantity must be positive");
    }
    Ok(())
}

/// Validate a signed stock delta; only zero is rejected
pub fn validate_signed_quantity(quantity: Decimal) -> Result<(), &'static str> {
    if quantity.is_zero() {
        return Err("Quantity must be non-zero");
    }
    Ok(())
}

/// Validate a projection horizon
pub fn validate_horizon(horizon_days: u32) -> Result<(), &'static str> {
    if horizon_days > MAX_HORIZON_DAYS {
        return Err("Horizon must be at most 366 days");
    }
    Ok(())
}

// ============================================================================
// Structure
// ============================================================================

/// Validate a parent -> component link before it is stored
pub fn validate_component_link(
    parent: &str,
    component: &str,
    quantity_per_unit: Decimal,
) -> Result<(), &'static str> {
    validate_product_code(parent)?;
    validate_product_code(component)?;
    if parent == component {
        return Err("A product cannot be a component of itself");
    }
    if quantity_per_unit <= Decimal::ZERO {
        return Err("Quantity per unit must be positive");
    }
    Ok(())
}
