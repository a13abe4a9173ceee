//! Bill of materials models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ProductKind;
use crate::error::BranchErrorKind;

/// Lifecycle state of a BOM edge. Inactive rows stay for audit history.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Active,
    Inactive,
}

impl LinkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStatus::Active => "active",
            LinkStatus::Inactive => "inactive",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(LinkStatus::Active),
            "inactive" => Some(LinkStatus::Inactive),
            _ => None,
        }
    }
}

/// A parent → component edge of the product structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComponentLink {
    pub id: Uuid,
    pub parent_product_code: String,
    pub component_product_code: String,
    pub quantity_per_unit: Decimal,
    pub version_tag: String,
    pub status: LinkStatus,
    /// Row that replaced this one when it was requantified
    pub superseded_by: Option<Uuid>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_by: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ComponentLink {
    pub fn new(
        parent_product_code: impl Into<String>,
        component_product_code: impl Into<String>,
        quantity_per_unit: Decimal,
        version_tag: impl Into<String>,
        actor: Option<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_product_code: parent_product_code.into(),
            component_product_code: component_product_code.into(),
            quantity_per_unit,
            version_tag: version_tag.into(),
            status: LinkStatus::Active,
            superseded_by: None,
            created_by: actor.clone(),
            created_at: at,
            updated_by: actor,
            updated_at: at,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == LinkStatus::Active
    }

    /// Same parent, component and version as `other`
    pub fn same_edge(&self, other: &ComponentLink) -> bool {
        self.parent_product_code == other.parent_product_code
            && self.component_product_code == other.component_product_code
            && self.version_tag == other.version_tag
    }
}

/// Change recorded against a component link
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LinkAction {
    Created,
    Requantified,
    Deactivated,
}

impl LinkAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkAction::Created => "created",
            LinkAction::Requantified => "requantified",
            LinkAction::Deactivated => "deactivated",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "created" => Some(LinkAction::Created),
            "requantified" => Some(LinkAction::Requantified),
            "deactivated" => Some(LinkAction::Deactivated),
            _ => None,
        }
    }
}

/// Append-only audit record for component link changes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkAuditEntry {
    pub id: Uuid,
    pub link_id: Uuid,
    pub action: LinkAction,
    pub quantity_per_unit: Decimal,
    pub actor: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl LinkAuditEntry {
    pub fn record(link: &ComponentLink, action: LinkAction, actor: Option<String>, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            link_id: link.id,
            action,
            quantity_per_unit: link.quantity_per_unit,
            actor,
            recorded_at: at,
        }
    }
}

/// Components of one parent after merging aliased codes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupedComponent {
    /// Canonical code of the component group
    pub component_code: String,
    /// Sum of `quantity_per_unit` across the grouped rows
    pub quantity_per_unit: Decimal,
    /// Component codes as written on the individual rows
    pub source_codes: Vec<String>,
}

/// A node of an exploded product structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BomNode {
    pub product_code: String,
    pub name: String,
    pub required_quantity: Decimal,
    /// Quantity per unit of the parent; `None` on the root
    pub quantity_per_unit: Option<Decimal>,
    #[serde(rename = "type")]
    pub kind: ProductKind,
    pub level: u32,
    pub children: Vec<BomNode>,
    pub has_structure: bool,
    pub error: Option<BranchErrorKind>,
}

impl BomNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Depth-first, pre-order list of this node and all descendants
    pub fn flatten(&self) -> Vec<&BomNode> {
        let mut nodes = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            nodes.push(node);
            stack.extend(node.children.iter().rev());
        }
        nodes
    }

    /// Every node in the tree that carries an error, with its code
    pub fn errors(&self) -> Vec<(&str, BranchErrorKind)> {
        self.flatten()
            .into_iter()
            .filter_map(|node| node.error.map(|kind| (node.product_code.as_str(), kind)))
            .collect()
    }

    pub fn find(&self, product_code: &str) -> Option<&BomNode> {
        self.flatten().into_iter().find(|node| node.product_code == product_code)
    }
}
