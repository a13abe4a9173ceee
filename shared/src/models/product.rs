//! Product classification models

use serde::{Deserialize, Serialize};

/// Classification flags for a product code, as provided by the product catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProductClassification {
    pub product_code: String,
    pub display_name: String,
    pub is_manufactured: bool,
    pub is_purchased: bool,
    pub is_sellable: bool,
}

impl ProductClassification {
    pub fn new(product_code: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            product_code: product_code.into(),
            display_name: display_name.into(),
            is_manufactured: false,
            is_purchased: false,
            is_sellable: false,
        }
    }

    /// Finished good: manufactured and sold
    pub fn finished(product_code: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            is_manufactured: true,
            is_sellable: true,
            ..Self::new(product_code, display_name)
        }
    }

    /// Intermediate: manufactured, consumed internally
    pub fn intermediate(product_code: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            is_manufactured: true,
            ..Self::new(product_code, display_name)
        }
    }

    /// Purchased component
    pub fn purchased(product_code: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            is_purchased: true,
            ..Self::new(product_code, display_name)
        }
    }

    pub fn kind(&self) -> ProductKind {
        classify_product(self.is_manufactured, self.is_purchased, self.is_sellable)
    }
}

/// Role of a product inside a bill of materials
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ProductKind {
    /// Manufactured and sellable
    #[serde(rename = "ACABADO")]
    Finished,
    /// Manufactured, not sellable
    #[serde(rename = "INTERMEDIARIO")]
    Intermediate,
    /// Bought from a supplier
    #[serde(rename = "COMPONENTE")]
    Purchased,
    /// No classification on record
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl ProductKind {
    /// Kind for an optional classification; a missing record is `Unknown`
    pub fn of(classification: Option<&ProductClassification>) -> Self {
        classification.map_or(ProductKind::Unknown, ProductClassification::kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductKind::Finished => "ACABADO",
            ProductKind::Intermediate => "INTERMEDIARIO",
            ProductKind::Purchased => "COMPONENTE",
            ProductKind::Unknown => "UNKNOWN",
        }
    }

    pub fn is_manufactured(&self) -> bool {
        matches!(self, ProductKind::Finished | ProductKind::Intermediate)
    }
}

impl std::fmt::Display for ProductKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derive the product kind from the raw catalog flags
///
/// Manufacturing wins over purchasing: a part that is both bought and made
/// in-house is treated as made, so the cascade may produce it on shortage.
pub fn classify_product(is_manufactured: bool, is_purchased: bool, is_sellable: bool) -> ProductKind {
    match (is_manufactured, is_purchased, is_sellable) {
        (true, _, true) => ProductKind::Finished,
        (true, _, false) => ProductKind::Intermediate,
        (false, true, _) => ProductKind::Purchased,
        (false, false, _) => ProductKind::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_finished() {
        assert_eq!(classify_product(true, false, true), ProductKind::Finished);
        assert_eq!(classify_product(true, true, true), ProductKind::Finished);
    }

    #[test]
    fn test_classify_intermediate() {
        assert_eq!(classify_product(true, false, false), ProductKind::Intermediate);
    }

    #[test]
    fn test_classify_purchased() {
        assert_eq!(classify_product(false, true, false), ProductKind::Purchased);
        // resale items are still purchased components
        assert_eq!(classify_product(false, true, true), ProductKind::Purchased);
    }

    #[test]
    fn test_classify_unknown() {
        assert_eq!(classify_product(false, false, true), ProductKind::Unknown);
        assert_eq!(ProductKind::of(None), ProductKind::Unknown);
    }

    #[test]
    fn test_kind_serializes_to_catalog_labels() {
        let json = serde_json::to_string(&ProductKind::Intermediate).unwrap();
        assert_eq!(json, "\"INTERMEDIARIO\"");
        assert_eq!(ProductKind::Purchased.to_string(), "COMPONENTE");
    }
}
