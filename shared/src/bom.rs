//! Bill of materials: catalog access, component grouping and explosion

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{BranchErrorKind, CoreError, CoreResult};
use crate::models::{
    BomNode, ComponentLink, GroupedComponent, LinkAction, LinkAuditEntry, LinkStatus,
    ProductClassification, ProductKind,
};
use crate::unification::CodeUnifier;
use crate::validation::{validate_component_link, validate_version_tag};

/// Read access to product classifications and product structures
pub trait CatalogSource {
    fn classification(&self, product_code: &str) -> Option<ProductClassification>;

    /// Active links whose parent is exactly `parent_code`
    fn active_links(&self, parent_code: &str) -> Vec<ComponentLink>;
}

/// Classification for a code, falling back to its aliases
pub fn classification_of<C: CatalogSource + ?Sized>(
    catalog: &C,
    unifier: &CodeUnifier,
    product_code: &str,
) -> Option<ProductClassification> {
    catalog.classification(product_code).or_else(|| {
        unifier
            .resolve(product_code)
            .iter()
            .find_map(|alias| catalog.classification(alias))
    })
}

/// Active structure of a code
///
/// A recipe registered under an alias is used when the code itself has none.
/// Only one alias's recipe is taken, so a structure duplicated across aliases
/// is not counted twice.
pub fn structure_of<C: CatalogSource + ?Sized>(
    catalog: &C,
    unifier: &CodeUnifier,
    product_code: &str,
) -> Vec<ComponentLink> {
    let own = catalog.active_links(product_code);
    if !own.is_empty() {
        return own;
    }
    unifier
        .resolve(product_code)
        .iter()
        .filter(|alias| alias.as_str() != product_code)
        .map(|alias| catalog.active_links(alias))
        .find(|links| !links.is_empty())
        .unwrap_or_default()
}

/// Merge links whose components unify to the same canonical code
///
/// Quantities per unit are summed so a BOM listing two aliases of one part is
/// not consumed twice. Groups are returned in canonical-code order.
pub fn group_components(links: &[ComponentLink], unifier: &CodeUnifier) -> Vec<GroupedComponent> {
    let mut groups: BTreeMap<String, GroupedComponent> = BTreeMap::new();
    for link in links.iter().filter(|link| link.is_active()) {
        let canonical = unifier.canonical(&link.component_product_code);
        let group = groups.entry(canonical.clone()).or_insert_with(|| GroupedComponent {
            component_code: canonical,
            quantity_per_unit: Decimal::ZERO,
            source_codes: Vec::new(),
        });
        group.quantity_per_unit = group.quantity_per_unit.saturating_add(link.quantity_per_unit);
        if !group.source_codes.contains(&link.component_product_code) {
            group.source_codes.push(link.component_product_code.clone());
        }
    }
    groups.into_values().collect()
}

/// In-memory catalog of classifications and component links
///
/// Holds the full link history; inactive rows are never removed.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    products: HashMap<String, ProductClassification>,
    links: Vec<ComponentLink>,
    audit: Vec<LinkAuditEntry>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_product(&mut self, classification: ProductClassification) {
        self.products.insert(classification.product_code.clone(), classification);
    }

    /// Load a persisted link row as-is; used when building a snapshot
    pub fn insert_link(&mut self, link: ComponentLink) {
        self.links.push(link);
    }

    pub fn links(&self) -> &[ComponentLink] {
        &self.links
    }

    pub fn link(&self, id: Uuid) -> Option<&ComponentLink> {
        self.links.iter().find(|link| link.id == id)
    }

    pub fn audit_log(&self) -> &[LinkAuditEntry] {
        &self.audit
    }

    /// Register a new active link
    pub fn add_link(
        &mut self,
        parent: &str,
        component: &str,
        quantity_per_unit: Decimal,
        version_tag: &str,
        actor: Option<String>,
        at: DateTime<Utc>,
    ) -> CoreResult<Uuid> {
        validate_component_link(parent, component, quantity_per_unit)
            .map_err(|message| CoreError::invalid("component_link", message))?;
        validate_version_tag(version_tag).map_err(|message| CoreError::invalid("version_tag", message))?;

        let link = ComponentLink::new(parent, component, quantity_per_unit, version_tag, actor.clone(), at);
        if self.links.iter().any(|l| l.is_active() && l.same_edge(&link)) {
            return Err(CoreError::DuplicateLink {
                parent: parent.to_string(),
                component: component.to_string(),
                version: version_tag.to_string(),
            });
        }

        self.audit.push(LinkAuditEntry::record(&link, LinkAction::Created, actor, at));
        let id = link.id;
        self.links.push(link);
        Ok(id)
    }

    /// Replace the quantity of an active link
    ///
    /// The old row is kept as inactive and points at its replacement.
    pub fn requantify_link(
        &mut self,
        id: Uuid,
        quantity_per_unit: Decimal,
        actor: Option<String>,
        at: DateTime<Utc>,
    ) -> CoreResult<Uuid> {
        let index = self.active_index(id)?;
        let old = &self.links[index];
        validate_component_link(&old.parent_product_code, &old.component_product_code, quantity_per_unit)
            .map_err(|message| CoreError::invalid("quantity_per_unit", message))?;

        let replacement = ComponentLink {
            created_by: old.created_by.clone(),
            created_at: old.created_at,
            ..ComponentLink::new(
                old.parent_product_code.clone(),
                old.component_product_code.clone(),
                quantity_per_unit,
                old.version_tag.clone(),
                actor.clone(),
                at,
            )
        };

        let old = &mut self.links[index];
        old.status = LinkStatus::Inactive;
        old.superseded_by = Some(replacement.id);
        old.updated_by = actor.clone();
        old.updated_at = at;

        self.audit.push(LinkAuditEntry::record(&replacement, LinkAction::Requantified, actor, at));
        let new_id = replacement.id;
        self.links.push(replacement);
        Ok(new_id)
    }

    /// Soft-delete an active link
    pub fn deactivate_link(&mut self, id: Uuid, actor: Option<String>, at: DateTime<Utc>) -> CoreResult<()> {
        let index = self.active_index(id)?;
        let link = &mut self.links[index];
        link.status = LinkStatus::Inactive;
        link.updated_by = actor.clone();
        link.updated_at = at;

        let entry = LinkAuditEntry::record(link, LinkAction::Deactivated, actor, at);
        self.audit.push(entry);
        Ok(())
    }

    fn active_index(&self, id: Uuid) -> CoreResult<usize> {
        let index = self
            .links
            .iter()
            .position(|link| link.id == id)
            .ok_or(CoreError::LinkNotFound(id))?;
        if !self.links[index].is_active() {
            return Err(CoreError::LinkInactive(id));
        }
        Ok(index)
    }
}

impl CatalogSource for Catalog {
    fn classification(&self, product_code: &str) -> Option<ProductClassification> {
        self.products.get(product_code).cloned()
    }

    fn active_links(&self, parent_code: &str) -> Vec<ComponentLink> {
        let mut links: Vec<ComponentLink> = self
            .links
            .iter()
            .filter(|link| link.is_active() && link.parent_product_code == parent_code)
            .cloned()
            .collect();
        links.sort_by(|a, b| a.component_product_code.cmp(&b.component_product_code));
        links
    }
}

/// Recursive BOM explosion with cycle and depth guards
pub struct BomExplosion<'a, C: CatalogSource + ?Sized> {
    catalog: &'a C,
    unifier: &'a CodeUnifier,
    max_depth: u32,
}

impl<'a, C: CatalogSource + ?Sized> BomExplosion<'a, C> {
    pub fn new(catalog: &'a C, unifier: &'a CodeUnifier, max_depth: u32) -> Self {
        Self {
            catalog,
            unifier,
            max_depth,
        }
    }

    /// Explode `product_code` for `required_quantity` units
    pub fn explode(&self, product_code: &str, required_quantity: Decimal) -> BomNode {
        self.explode_at(product_code, required_quantity, 0, None, &BTreeSet::new())
    }

    /// Explode one node at `depth`, given the canonical codes already on its path
    ///
    /// `visited` is borrowed and copied per child so sibling branches never
    /// see each other's codes.
    pub fn explode_at(
        &self,
        product_code: &str,
        required_quantity: Decimal,
        depth: u32,
        quantity_per_unit: Option<Decimal>,
        visited: &BTreeSet<String>,
    ) -> BomNode {
        let classification = classification_of(self.catalog, self.unifier, product_code);
        let kind = ProductKind::of(classification.as_ref());
        let links = structure_of(self.catalog, self.unifier, product_code);

        let mut node = BomNode {
            product_code: product_code.to_string(),
            name: classification.map_or_else(|| product_code.to_string(), |c| c.display_name),
            required_quantity,
            quantity_per_unit,
            kind,
            level: depth,
            children: Vec::new(),
            has_structure: !links.is_empty(),
            error: None,
        };

        let key = self.unifier.canonical(product_code);
        if visited.contains(&key) {
            node.error = Some(BranchErrorKind::CycleDetected);
            return node;
        }
        if depth > self.max_depth {
            node.error = Some(BranchErrorKind::DepthExceeded);
            return node;
        }
        if kind == ProductKind::Unknown {
            node.error = Some(BranchErrorKind::ProductNotClassified);
            return node;
        }

        let mut path = visited.clone();
        path.insert(key);
        node.children = group_components(&links, self.unifier)
            .into_iter()
            .map(|group| match required_quantity.checked_mul(group.quantity_per_unit) {
                Some(quantity) => self.explode_at(
                    &group.component_code,
                    quantity,
                    depth + 1,
                    Some(group.quantity_per_unit),
                    &path,
                ),
                None => self.out_of_range(&group.component_code, depth + 1, group.quantity_per_unit),
            })
            .collect();
        node
    }

    /// Leaf for a component whose required quantity cannot be represented
    fn out_of_range(&self, product_code: &str, depth: u32, quantity_per_unit: Decimal) -> BomNode {
        let classification = classification_of(self.catalog, self.unifier, product_code);
        tracing::warn!(product_code, depth, %quantity_per_unit, "required quantity out of range");
        BomNode {
            product_code: product_code.to_string(),
            kind: ProductKind::of(classification.as_ref()),
            name: classification.map_or_else(|| product_code.to_string(), |c| c.display_name),
            required_quantity: Decimal::ZERO,
            quantity_per_unit: Some(quantity_per_unit),
            level: depth,
            children: Vec::new(),
            has_structure: !structure_of(self.catalog, self.unifier, product_code).is_empty(),
            error: Some(BranchErrorKind::QuantityOverflow),
        }
    }
}
