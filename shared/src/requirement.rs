//! Net requirement: gross need netted against projected stock

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{BomNode, ProductKind, Projection};

/// Requirement of one product on one date
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetRequirement {
    pub product_code: String,
    pub as_of_date: NaiveDate,
    pub gross: Decimal,
    pub on_hand: Decimal,
    pub projected_at_date: Decimal,
    pub shortfall: Decimal,
}

/// `shortfall = max(0, gross - projected balance at as_of_date)`
pub fn net_requirement(gross: Decimal, projection: &Projection, as_of_date: NaiveDate) -> NetRequirement {
    let projected_at_date = projection.balance_at(as_of_date);
    NetRequirement {
        product_code: projection.product_code.clone(),
        as_of_date,
        gross,
        on_hand: projection.current_balance,
        projected_at_date,
        shortfall: gross.saturating_sub(projected_at_date).max(Decimal::ZERO),
    }
}

/// Horizon needed for a projection to reach `as_of_date`
pub fn horizon_to(today: NaiveDate, as_of_date: NaiveDate) -> u32 {
    u32::try_from((as_of_date - today).num_days()).unwrap_or(0)
}

/// Requirement line of a material requirements report
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComponentRequirement {
    pub product_code: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ProductKind,
    /// Shallowest level the component appears at
    pub level: u32,
    pub gross: Decimal,
    pub on_hand: Decimal,
    pub projected_at_date: Decimal,
    pub shortfall: Decimal,
}

/// Net every component of an exploded tree against its projection
///
/// Gross quantities of a component appearing in several branches are summed
/// before netting. The root itself is not part of the report. A component
/// with no projection is treated as having no stock.
pub fn material_requirements(
    tree: &BomNode,
    projections: &HashMap<String, Projection>,
    as_of_date: NaiveDate,
) -> Vec<ComponentRequirement> {
    let mut totals: BTreeMap<&str, (&BomNode, u32, Decimal)> = BTreeMap::new();
    for node in tree.flatten().into_iter().skip(1) {
        totals
            .entry(node.product_code.as_str())
            .and_modify(|(_, level, gross)| {
                *level = (*level).min(node.level);
                *gross = gross.saturating_add(node.required_quantity);
            })
            .or_insert((node, node.level, node.required_quantity));
    }

    totals
        .into_iter()
        .map(|(code, (node, level, gross))| {
            let (on_hand, projected) = projections
                .get(code)
                .map_or((Decimal::ZERO, Decimal::ZERO), |projection| {
                    (projection.current_balance, projection.balance_at(as_of_date))
                });
            ComponentRequirement {
                product_code: code.to_string(),
                name: node.name.clone(),
                kind: node.kind,
                level,
                gross,
                on_hand,
                projected_at_date: projected,
                shortfall: gross.saturating_sub(projected).max(Decimal::ZERO),
            }
        })
        .collect()
}
